//! Command-line and environment configuration.

use std::path::PathBuf;

use clap::Parser;
use reqwest::Url;

use crate::auth::SessionOptions;
use crate::error::ClientError;

/// Identity provider settings
#[derive(Debug, Clone)]
pub struct IdentityConfig {
    pub issuer: Url,
    pub client_id: String,
    pub redirect_uri: Url,
    pub post_logout_redirect_uri: Url,
    pub scope: String,
    pub automatic_silent_renew: bool,
    pub load_user_info: bool,
}

impl IdentityConfig {
    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            load_user_info: self.load_user_info,
            automatic_silent_renew: self.automatic_silent_renew,
        }
    }
}

/// Validated client configuration
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub identity: IdentityConfig,
    /// Base URL of the chat HTTP API (`/users`, `/messages/...`)
    pub api_url: Url,
    /// WebSocket endpoint of the STOMP broker
    pub ws_url: Url,
    pub presence_topic: String,
    pub session_file: Option<PathBuf>,
}

#[derive(Parser, Debug)]
#[command(name = "stoop-client")]
#[command(about = "Terminal direct-message client with OpenID Connect login", long_about = None)]
pub struct Cli {
    /// OpenID Connect issuer URL
    #[arg(
        long,
        env = "STOOP_ISSUER",
        default_value = "http://localhost:8080/realms/stoop"
    )]
    pub issuer: String,

    /// Client ID registered with the identity provider
    #[arg(long, env = "STOOP_CLIENT_ID", default_value = "stoop-client")]
    pub client_id: String,

    /// Where the identity provider redirects after login (served locally)
    #[arg(
        long,
        env = "STOOP_REDIRECT_URI",
        default_value = "http://localhost:8091/"
    )]
    pub redirect_uri: String,

    /// Where the identity provider redirects after logout (defaults to the redirect URI)
    #[arg(long, env = "STOOP_POST_LOGOUT_REDIRECT_URI")]
    pub post_logout_redirect_uri: Option<String>,

    /// Requested scopes
    #[arg(long, env = "STOOP_SCOPE", default_value = "openid profile email")]
    pub scope: String,

    /// Chat HTTP API base URL
    #[arg(
        short = 'a',
        long,
        env = "STOOP_API_URL",
        default_value = "http://localhost:8090/"
    )]
    pub api_url: String,

    /// STOMP WebSocket URL
    #[arg(
        short = 'u',
        long,
        env = "STOOP_WS_URL",
        default_value = "ws://localhost:8090/ws/websocket"
    )]
    pub ws_url: String,

    /// Shared presence topic
    #[arg(long, env = "STOOP_PRESENCE_TOPIC", default_value = "/topic/presence")]
    pub presence_topic: String,

    /// Disable automatic silent token renewal
    #[arg(long)]
    pub no_silent_renew: bool,

    /// Read the profile from the id token instead of the userinfo endpoint
    #[arg(long)]
    pub no_user_info: bool,

    /// Keep the session in this file so later runs skip the login
    #[arg(long, env = "STOOP_SESSION_FILE")]
    pub session_file: Option<PathBuf>,

    /// Default log level (overridden by RUST_LOG)
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

fn parse_url(name: &str, value: &str) -> Result<Url, ClientError> {
    Url::parse(value).map_err(|e| ClientError::Config(format!("invalid {name} '{value}': {e}")))
}

/// Base URLs are joined with relative paths, so they must end with '/'.
fn with_trailing_slash(mut url: Url) -> Url {
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url
}

impl Cli {
    pub fn into_config(self) -> Result<ClientConfig, ClientError> {
        let redirect_uri = parse_url("redirect URI", &self.redirect_uri)?;
        let post_logout_redirect_uri = match self.post_logout_redirect_uri.as_deref() {
            Some(value) => parse_url("post-logout redirect URI", value)?,
            None => redirect_uri.clone(),
        };

        let ws_url = parse_url("WebSocket URL", &self.ws_url)?;
        if !matches!(ws_url.scheme(), "ws" | "wss") {
            return Err(ClientError::Config(format!(
                "WebSocket URL must use ws:// or wss://: {}",
                self.ws_url
            )));
        }
        if !self.presence_topic.starts_with('/') {
            return Err(ClientError::Config(format!(
                "presence topic must start with '/': {}",
                self.presence_topic
            )));
        }

        Ok(ClientConfig {
            identity: IdentityConfig {
                issuer: parse_url("issuer", &self.issuer)?,
                client_id: self.client_id,
                redirect_uri,
                post_logout_redirect_uri,
                scope: self.scope,
                automatic_silent_renew: !self.no_silent_renew,
                load_user_info: !self.no_user_info,
            },
            api_url: with_trailing_slash(parse_url("API URL", &self.api_url)?),
            ws_url,
            presence_topic: self.presence_topic,
            session_file: self.session_file,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_produce_valid_config() {
        // テスト項目: 既定値のみで有効な設定が生成される
        // given (前提条件):
        let cli = Cli::try_parse_from(["stoop-client"]).unwrap();

        // when (操作):
        let config = cli.into_config().unwrap();

        // then (期待する結果):
        assert_eq!(config.identity.client_id, "stoop-client");
        assert_eq!(
            config.identity.post_logout_redirect_uri,
            config.identity.redirect_uri
        );
        assert!(config.identity.automatic_silent_renew);
        assert!(config.identity.load_user_info);
        assert_eq!(config.presence_topic, "/topic/presence");
    }

    #[test]
    fn test_api_url_gets_trailing_slash() {
        // テスト項目: API URL の末尾にスラッシュが補われる
        // given (前提条件):
        let cli = Cli::try_parse_from(["stoop-client", "--api-url", "http://chat.local/api"])
            .unwrap();

        // when (操作):
        let config = cli.into_config().unwrap();

        // then (期待する結果):
        assert_eq!(config.api_url.as_str(), "http://chat.local/api/");
    }

    #[test]
    fn test_rejects_http_websocket_url() {
        // テスト項目: ws/wss 以外の WebSocket URL は設定エラーとなる
        // given (前提条件):
        let cli =
            Cli::try_parse_from(["stoop-client", "--ws-url", "http://chat.local/ws"]).unwrap();

        // when (操作):
        let result = cli.into_config();

        // then (期待する結果):
        assert!(matches!(result, Err(ClientError::Config(_))));
    }

    #[test]
    fn test_flags_disable_renewal_and_userinfo() {
        // テスト項目: フラグでサイレント更新と userinfo 読み込みが無効になる
        // given (前提条件):
        let cli =
            Cli::try_parse_from(["stoop-client", "--no-silent-renew", "--no-user-info"]).unwrap();

        // when (操作):
        let options = cli.into_config().unwrap().identity.session_options();

        // then (期待する結果):
        assert!(!options.automatic_silent_renew);
        assert!(!options.load_user_info);
    }
}
