//! Terminal chat client with OpenID Connect login.
//!
//! Signs in through the configured identity provider (the login URL is
//! printed; the redirect back is received on the redirect URI), connects to
//! the chat backend over STOMP and lets you chat with connected users.
//!
//! Run with:
//! ```not_rust
//! cargo run --bin stoop-client -- --issuer http://localhost:8080/realms/stoop
//! cargo run --bin stoop-client -- -a http://localhost:8090/ -u ws://localhost:8090/ws/websocket
//! ```

use clap::Parser;

use stoop_client::config::Cli;
use stoop_shared::logger::setup_logger;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize tracing
    setup_logger(env!("CARGO_PKG_NAME"), env!("CARGO_BIN_NAME"), &cli.log_level);

    let config = match cli.into_config() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("{}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = stoop_client::app::run(config).await {
        tracing::error!("Client error: {}", e);
        std::process::exit(1);
    }
}
