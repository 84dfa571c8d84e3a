//! Error types for the Stoop client.

use thiserror::Error;

/// Identity-provider and session errors
#[derive(Debug, Error)]
pub enum AuthError {
    /// The callback `state` is missing or matches no pending login
    #[error("Login state mismatch: {0}")]
    StateMismatch(String),

    /// The authorization code could not be exchanged for tokens
    #[error("Token exchange failed: {0}")]
    TokenExchange(String),

    /// The identity provider redirected back with an `error` parameter
    #[error("Identity provider error: {error}")]
    Provider {
        error: String,
        description: Option<String>,
    },

    /// Provider metadata could not be discovered or is incomplete
    #[error("Provider discovery failed: {0}")]
    Discovery(String),

    /// The user profile could not be loaded or lacks a subject
    #[error("Profile could not be loaded: {0}")]
    Profile(String),

    /// Silent renewal with the refresh token failed
    #[error("Token refresh failed: {0}")]
    Refresh(String),

    /// Reading or writing the persisted session failed
    #[error("Session store error: {0}")]
    Store(String),

    /// The loopback callback listener could not be started
    #[error("Callback listener error: {0}")]
    Callback(String),
}

impl AuthError {
    /// Whether the failure is recovered by starting a fresh login.
    pub fn should_retry_login(&self) -> bool {
        matches!(self, AuthError::StateMismatch(_))
    }
}

/// HTTP API errors
#[derive(Debug, Error)]
pub enum ApiError {
    /// The bearer token was rejected (HTTP 401)
    #[error("Unauthorized")]
    Unauthorized,

    /// No valid access token; a login has been started instead
    #[error("Failed to get access token")]
    MissingToken,

    /// The local user is not identified yet
    #[error("Current user not identified")]
    MissingIdentity,

    /// Any other non-success status
    #[error("HTTP error! status: {0}")]
    Status(u16),

    /// The request could not be sent or the body could not be read
    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The request URL could not be built
    #[error("Invalid URL: {0}")]
    Url(String),
}

/// Message-queue transport errors
#[derive(Debug, Error)]
pub enum TransportError {
    /// An operation needs an open transport session
    #[error("Transport is not connected")]
    NotConnected,

    /// `connect` was called while a session is already open
    #[error("Transport is already connected")]
    AlreadyConnected,

    /// The WebSocket could not be opened
    #[error("Connection error: {0}")]
    Connect(String),

    /// The broker refused the session (ERROR frame or HTTP rejection)
    #[error("Connection rejected: {0}")]
    Rejected(String),

    /// A frame could not be encoded or decoded
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Writing to the socket failed
    #[error("Send failed: {0}")]
    Send(String),

    /// The peer closed the connection
    #[error("Connection closed")]
    Closed,
}

/// A condition that must hold before a message can be sent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissingPrecondition {
    NotConnected,
    NoRecipient,
    NoIdentity,
}

impl std::fmt::Display for MissingPrecondition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::NotConnected => "WebSocket not connected",
            Self::NoRecipient => "No recipient selected",
            Self::NoIdentity => "Current user not identified",
        })
    }
}

fn join_missing(missing: &[MissingPrecondition]) -> String {
    missing
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Errors of the send operation
#[derive(Debug, Error)]
pub enum SendError {
    #[error("Message is empty")]
    Empty,

    /// Nothing was published; every unmet condition is listed
    #[error("Cannot send message: {}", join_missing(.0))]
    Unmet(Vec<MissingPrecondition>),

    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Client-level errors
#[derive(Debug, Error)]
pub enum ClientError {
    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Api(#[from] ApiError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Invalid command-line or environment configuration
    #[error("Configuration error: {0}")]
    Config(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_mismatch_should_retry_login() {
        // テスト項目: state 不一致エラーの場合、再ログインすべきと判定される
        // given (前提条件):
        let error = AuthError::StateMismatch("no matching state found".to_string());

        // when (操作):
        let result = error.should_retry_login();

        // then (期待する結果):
        assert!(result);
    }

    #[test]
    fn test_token_exchange_failure_is_terminal() {
        // テスト項目: トークン交換失敗は再ログインせず終端エラーとなる
        // given (前提条件):
        let error = AuthError::TokenExchange("400 Bad Request".to_string());

        // when (操作):
        let result = error.should_retry_login();

        // then (期待する結果):
        assert!(!result);
    }

    #[test]
    fn test_send_error_lists_every_missing_precondition() {
        // テスト項目: 送信エラーのメッセージに満たされない条件がすべて含まれる
        // given (前提条件):
        let error = SendError::Unmet(vec![
            MissingPrecondition::NotConnected,
            MissingPrecondition::NoRecipient,
        ]);

        // when (操作):
        let message = error.to_string();

        // then (期待する結果):
        assert_eq!(
            message,
            "Cannot send message: WebSocket not connected, No recipient selected"
        );
    }

    #[test]
    fn test_status_error_message() {
        // テスト項目: ステータスエラーのメッセージにステータスコードが含まれる
        // given (前提条件):
        let error = ApiError::Status(503);

        // when (操作):
        let message = error.to_string();

        // then (期待する結果):
        assert_eq!(message, "HTTP error! status: 503");
    }
}
