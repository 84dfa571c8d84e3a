//! Conversation with the selected peer.

use chrono::{DateTime, FixedOffset, Utc};

use crate::api::ChatApi;
use crate::auth::SessionManager;
use crate::domain::{ChatMessage, Peer, UserId};
use crate::error::ApiError;

use super::{MessageFormatter, Screen, relogin_after_unauthorized};

const HISTORY_ERROR: &str = "Error fetching chat history.";
const HISTORY_AUTH_ERROR: &str = "Authentication error. Cannot load chat.";
const HISTORY_UNAVAILABLE: &str = "Could not load chat history.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BubbleKind {
    Sent,
    Received,
}

impl BubbleKind {
    /// Sent when the sender is the local user.
    pub fn for_sender(sender: &UserId, local: &UserId) -> Self {
        if sender == local {
            Self::Sent
        } else {
            Self::Received
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bubble {
    pub kind: BubbleKind,
    pub content: String,
    pub sent_at: Option<DateTime<Utc>>,
}

/// Messages with the selected peer; the newest is rendered last
pub struct ConversationView {
    peer: Option<Peer>,
    bubbles: Vec<Bubble>,
    placeholder: Option<String>,
    offset: FixedOffset,
}

impl ConversationView {
    pub fn new(offset: FixedOffset) -> Self {
        Self {
            peer: None,
            bubbles: Vec::new(),
            placeholder: None,
            offset,
        }
    }

    pub fn peer(&self) -> Option<&Peer> {
        self.peer.as_ref()
    }

    pub fn bubbles(&self) -> &[Bubble] {
        &self.bubbles
    }

    /// Empty-state or error text shown instead of messages.
    pub fn placeholder(&self) -> Option<&str> {
        self.placeholder.as_deref()
    }

    /// Switch to a peer and clear what was shown before.
    pub fn open(&mut self, peer: Peer, screen: &mut Screen) {
        screen.print(MessageFormatter::format_conversation_header(
            &peer.display_name,
        ));
        self.peer = Some(peer);
        self.bubbles.clear();
        self.placeholder = None;
    }

    pub fn close(&mut self) {
        self.peer = None;
        self.bubbles.clear();
        self.placeholder = None;
    }

    fn show_placeholder(&mut self, text: String, screen: &mut Screen) {
        screen.print(text.clone());
        self.placeholder = Some(text);
    }

    /// Fetch and render the history between the local user and `peer_id`.
    pub async fn load_history(
        &mut self,
        peer_id: &UserId,
        api: &dyn ChatApi,
        auth: &mut SessionManager,
        screen: &mut Screen,
    ) -> Result<(), ApiError> {
        let local = auth.identity().map(|p| p.user_id.clone());
        let (Some(local), Some(peer)) = (local, self.peer.clone()) else {
            tracing::error!("Cannot fetch chat: Missing selected user or current user.");
            self.show_placeholder(HISTORY_ERROR.to_string(), screen);
            return Err(ApiError::MissingIdentity);
        };
        let Some(bearer) = auth.bearer_token().await else {
            tracing::error!("Cannot fetch chat: Failed to get access token.");
            self.show_placeholder(HISTORY_AUTH_ERROR.to_string(), screen);
            return Err(ApiError::MissingToken);
        };

        tracing::debug!("Fetching chat between {} and {}", local, peer_id);
        let result = api.chat_history(&bearer, &local, peer_id).await;
        if self.peer.as_ref().map(|p| &p.id) != Some(peer_id) {
            tracing::debug!("Ignoring history for {}: selection changed", peer_id);
            return Ok(());
        }

        match result {
            Ok(messages) if messages.is_empty() => {
                self.bubbles.clear();
                self.show_placeholder(
                    format!("No messages with {} yet.", peer.display_name),
                    screen,
                );
                Ok(())
            }
            Ok(messages) => {
                self.bubbles.clear();
                self.placeholder = None;
                for message in &messages {
                    self.push(&local, message, screen);
                }
                tracing::debug!("Displayed {} messages.", messages.len());
                Ok(())
            }
            Err(ApiError::Unauthorized) => {
                relogin_after_unauthorized(auth, "chat history").await;
                self.show_placeholder(HISTORY_AUTH_ERROR.to_string(), screen);
                Err(ApiError::Unauthorized)
            }
            Err(e) => {
                tracing::error!("Error fetching chat history: {}", e);
                self.show_placeholder(HISTORY_UNAVAILABLE.to_string(), screen);
                Err(e)
            }
        }
    }

    /// Render a message the local user just sent.
    pub fn append_local(&mut self, message: &ChatMessage, screen: &mut Screen) {
        self.push(&message.sender, message, screen);
    }

    /// Render a message received from the selected peer.
    pub fn append_remote(&mut self, local: &UserId, message: &ChatMessage, screen: &mut Screen) {
        self.push(local, message, screen);
    }

    fn push(&mut self, local: &UserId, message: &ChatMessage, screen: &mut Screen) {
        let bubble = Bubble {
            kind: BubbleKind::for_sender(&message.sender, local),
            content: message.content.clone(),
            sent_at: message.sent_at,
        };
        let peer_name = self
            .peer
            .as_ref()
            .map_or_else(|| message.sender.to_string(), |p| p.display_name.clone());
        screen.print(MessageFormatter::format_bubble(&bubble, &peer_name, self.offset));
        self.placeholder = None;
        self.bubbles.push(bubble);
    }
}
