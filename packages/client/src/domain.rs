//! Domain types shared by every layer of the client.
//!
//! All identity comparisons go through [`UserId`], the identity provider's
//! opaque subject identifier. Usernames are display data only.

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Domain validation errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DomainError {
    #[error("User ID must not be empty")]
    EmptyUserId,

    #[error("User ID must not contain '/': {0}")]
    InvalidUserId(String),
}

/// Stable, opaque user identifier.
///
/// Used verbatim in the inbox destination and in the history URL, so it may
/// not be empty or contain a path separator.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct UserId(String);

impl UserId {
    pub fn new(value: impl Into<String>) -> Result<Self, DomainError> {
        let value = value.into();
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err(DomainError::EmptyUserId);
        }
        if trimmed.contains('/') {
            return Err(DomainError::InvalidUserId(value));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl TryFrom<String> for UserId {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<UserId> for String {
    fn from(id: UserId) -> Self {
        id.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Build the name shown for a user: "first last" when known, else the username.
pub fn display_name(username: &str, first_name: Option<&str>, last_name: Option<&str>) -> String {
    let full = [first_name, last_name]
        .into_iter()
        .flatten()
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ");
    if full.is_empty() {
        username.to_string()
    } else {
        full
    }
}

/// The authenticated user's profile
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub user_id: UserId,
    pub username: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

impl Profile {
    pub fn display_name(&self) -> String {
        display_name(
            &self.username,
            self.first_name.as_deref(),
            self.last_name.as_deref(),
        )
    }
}

/// Current authenticated identity and its credentials
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub profile: Profile,
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,
    pub expires_at: DateTime<Utc>,
}

impl Session {
    pub fn user_id(&self) -> &UserId {
        &self.profile.user_id
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Instant at which a silent renewal should run.
    pub fn renew_at(&self, lead: Duration) -> DateTime<Utc> {
        self.expires_at - lead
    }
}

/// A connected peer as listed by the server
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Peer {
    pub id: UserId,
    pub username: String,
    pub display_name: String,
}

/// A direct message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub sender: UserId,
    pub recipient: UserId,
    pub content: String,
    pub sent_at: Option<DateTime<Utc>>,
}
