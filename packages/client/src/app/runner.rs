//! Client event loop.
//!
//! Terminal input comes from a rustyline thread over an mpsc channel; login
//! callbacks, transport events and the silent-renew timer are multiplexed on
//! the same task, so every state change goes through `&mut ChatClient`.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use stoop_shared::time::{SystemClock, local_offset};
use tokio::sync::mpsc;

use crate::api::HttpChatApi;
use crate::auth::{
    ConsoleNavigator, FileSessionStore, MemorySessionStore, OidcProvider, SessionManager,
    SessionStore, spawn_callback_listener,
};
use crate::config::ClientConfig;
use crate::error::{ClientError, SendError};
use crate::transport::{ConnectionManager, StompConnector};
use crate::view::MessageFormatter;

use super::client::ChatClient;
use super::command::Command;
use super::ui::print_lines;

/// Floor for the renewal timer when tokens live shorter than the renew lead.
const MIN_RENEW_DELAY: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    Continue,
    Quit,
}

/// Build the client from configuration and run until the user quits
pub async fn run(config: ClientConfig) -> Result<(), ClientError> {
    let http = reqwest::Client::builder()
        .user_agent(concat!("stoop-client/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| ClientError::Config(e.to_string()))?;
    let clock = Arc::new(SystemClock);

    let store: Arc<dyn SessionStore> = match &config.session_file {
        Some(path) => Arc::new(FileSessionStore::new(path)),
        None => Arc::new(MemorySessionStore::new()),
    };
    let auth = SessionManager::new(
        Arc::new(OidcProvider::new(http.clone(), config.identity.clone())),
        store,
        Arc::new(ConsoleNavigator),
        clock.clone(),
        config.identity.session_options(),
    );
    let api = Arc::new(HttpChatApi::new(http, config.api_url.clone()));
    let connection = ConnectionManager::new(
        Arc::new(StompConnector::new(config.ws_url.clone())),
        config.presence_topic.clone(),
    );
    let mut client = ChatClient::new(auth, api, connection, clock, local_offset());

    let (callback_tx, mut callback_rx) = mpsc::unbounded_channel();
    let _listener = spawn_callback_listener(&config.identity.redirect_uri, callback_tx).await?;

    client.initialize().await;
    let prompt = Arc::new(Mutex::new(client.prompt()));
    flush(&mut client, &prompt);

    let (input_tx, mut input_rx) = mpsc::unbounded_channel::<String>();
    spawn_line_reader(input_tx, prompt.clone());

    loop {
        let now = client.now();
        let renew_in = client.renew_due_at().map(|due| renew_delay(due, now));

        let step = tokio::select! {
            line = input_rx.recv() => match line {
                Some(line) => handle_line(&mut client, &line).await,
                None => Step::Quit,
            },
            Some(params) = callback_rx.recv() => {
                if let Err(e) = client.handle_callback(params).await {
                    tracing::debug!("Login callback not completed: {}", e);
                }
                Step::Continue
            }
            event = client.next_transport_event() => {
                client.handle_transport_event(event).await;
                Step::Continue
            }
            _ = renewal_timer(renew_in) => {
                client.renew_session().await;
                Step::Continue
            }
        };

        flush(&mut client, &prompt);
        if step == Step::Quit {
            break;
        }
    }

    client.shutdown().await;
    tracing::info!("Client session ended normally");
    Ok(())
}

async fn handle_line(client: &mut ChatClient, line: &str) -> Step {
    let Some(command) = Command::parse(line) else {
        return Step::Continue;
    };
    match command {
        Command::Users => client.refresh_roster().await,
        Command::Select(query) => client.select_peer(&query).await,
        Command::Connect => client.setup_and_connect().await,
        Command::Login => client.login().await,
        Command::Logout => client.logout().await,
        Command::Help => client.notify(MessageFormatter::format_help()),
        Command::Invalid(hint) => client.notify(hint),
        Command::Quit => return Step::Quit,
        Command::Send(content) => match client.send_message(&content).await {
            Ok(()) | Err(SendError::Empty) => {}
            Err(e) => tracing::debug!("Message not sent: {}", e),
        },
    }
    Step::Continue
}

/// Print pending output and publish the current prompt to the reader thread.
fn flush(client: &mut ChatClient, prompt: &Mutex<String>) {
    let current = client.prompt();
    if let Ok(mut shared) = prompt.lock() {
        shared.clone_from(&current);
    }
    print_lines(&client.take_output(), &current);
}

/// Time left until a renewal is due, never below [`MIN_RENEW_DELAY`].
fn renew_delay(due: DateTime<Utc>, now: DateTime<Utc>) -> Duration {
    (due - now)
        .to_std()
        .unwrap_or(Duration::ZERO)
        .max(MIN_RENEW_DELAY)
}

async fn renewal_timer(delay: Option<Duration>) {
    match delay {
        Some(delay) => tokio::time::sleep(delay).await,
        None => std::future::pending().await,
    }
}

/// Spawn a blocking thread for rustyline (synchronous readline)
fn spawn_line_reader(input_tx: mpsc::UnboundedSender<String>, prompt: Arc<Mutex<String>>) {
    std::thread::spawn(move || {
        let mut rl = match DefaultEditor::new() {
            Ok(rl) => rl,
            Err(e) => {
                eprintln!("Failed to initialize readline: {}", e);
                return;
            }
        };

        loop {
            let current = prompt
                .lock()
                .map(|p| p.clone())
                .unwrap_or_else(|_| "> ".to_string());
            match rl.readline(&current) {
                Ok(line) => {
                    let line = line.trim();
                    if !line.is_empty() {
                        rl.add_history_entry(line).ok();
                        if input_tx.send(line.to_string()).is_err() {
                            break;
                        }
                    }
                }
                Err(ReadlineError::Interrupted) => {
                    tracing::info!("Interrupted");
                    break;
                }
                Err(ReadlineError::Eof) => {
                    tracing::info!("EOF");
                    break;
                }
                Err(err) => {
                    tracing::error!("Readline error: {}", err);
                    break;
                }
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use stoop_shared::time::{Clock, FixedClock};

    use super::*;

    #[test]
    fn test_renew_delay_counts_from_clock() {
        // テスト項目: 更新までの待ち時間が注入された時計を基準に計算される
        // given (前提条件):
        let now = FixedClock::from_millis(1_700_000_000_000).now();
        let due = now + chrono::Duration::seconds(240);

        // when (操作):
        let delay = renew_delay(due, now);

        // then (期待する結果):
        assert_eq!(delay, Duration::from_secs(240));
    }

    #[test]
    fn test_renew_delay_has_floor() {
        // テスト項目: 期限を過ぎた更新でも最小待ち時間が守られる
        // given (前提条件):
        let now = FixedClock::from_millis(1_700_000_000_000).now();
        let due = now - chrono::Duration::seconds(30);

        // when (操作):
        let delay = renew_delay(due, now);

        // then (期待する結果):
        assert_eq!(delay, MIN_RENEW_DELAY);
    }
}
