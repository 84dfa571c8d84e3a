//! Terminal views: roster, conversation and the line buffer they render into.

pub mod conversation;
pub mod formatter;
pub mod roster;

use crate::auth::SessionManager;

pub use conversation::{Bubble, BubbleKind, ConversationView};
pub use formatter::MessageFormatter;
pub use roster::{RosterEntry, RosterView};

/// Rendered output waiting to be printed by the event loop
#[derive(Debug, Default)]
pub struct Screen {
    lines: Vec<String>,
}

impl Screen {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn print(&mut self, text: impl Into<String>) {
        self.lines.push(text.into());
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn drain(&mut self) -> Vec<String> {
        std::mem::take(&mut self.lines)
    }
}

/// A 401 means the token is no longer accepted: start one fresh login.
pub(crate) async fn relogin_after_unauthorized(auth: &mut SessionManager, what: &str) {
    tracing::warn!("Unauthorized fetching {}. Token might be expired.", what);
    if let Err(e) = auth.start_login().await {
        tracing::error!("Could not start login: {}", e);
    }
}
