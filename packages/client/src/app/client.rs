//! Chat client view-model.
//!
//! One `ChatClient` is built at startup. It owns the session manager, the
//! connection, both views and the current selection; `logout` tears the
//! per-user state down without replacing the object.

use std::sync::Arc;

use chrono::{DateTime, FixedOffset, Utc};
use stoop_shared::time::Clock;

use crate::api::ChatApi;
use crate::auth::{CallbackParams, SessionManager};
use crate::domain::{ChatMessage, Peer, Profile, Session, UserId};
use crate::error::{AuthError, MissingPrecondition, SendError, TransportError};
use crate::transport::{ConnectionManager, ConnectionState, EventReceiver, Inbound, TransportEvent};
use crate::view::{ConversationView, MessageFormatter, RosterView, Screen};

const CONNECT_ERROR: &str = "Could not connect to the chat server. Check the backend connection and configuration; this may also mean the token was rejected.";

pub struct ChatClient {
    auth: SessionManager,
    api: Arc<dyn ChatApi>,
    connection: ConnectionManager,
    roster: RosterView,
    conversation: ConversationView,
    screen: Screen,
    clock: Arc<dyn Clock>,
    events: Option<EventReceiver>,
}

impl ChatClient {
    pub fn new(
        auth: SessionManager,
        api: Arc<dyn ChatApi>,
        connection: ConnectionManager,
        clock: Arc<dyn Clock>,
        offset: FixedOffset,
    ) -> Self {
        Self {
            auth,
            api,
            connection,
            roster: RosterView::new(),
            conversation: ConversationView::new(offset),
            screen: Screen::new(),
            clock,
            events: None,
        }
    }

    pub fn session(&self) -> Option<&Session> {
        self.auth.current()
    }

    pub fn identity(&self) -> Option<&Profile> {
        self.auth.identity()
    }

    /// Peer of the open conversation.
    pub fn selected(&self) -> Option<&UserId> {
        self.conversation.peer().map(|p| &p.id)
    }

    pub fn roster(&self) -> &RosterView {
        &self.roster
    }

    pub fn conversation(&self) -> &ConversationView {
        &self.conversation
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.connection.state()
    }

    pub fn screen(&self) -> &Screen {
        &self.screen
    }

    /// Show a line of text to the user.
    pub fn notify(&mut self, text: impl Into<String>) {
        self.screen.print(text);
    }

    pub fn take_output(&mut self) -> Vec<String> {
        self.screen.drain()
    }

    /// Current time from the injected clock.
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn renew_due_at(&self) -> Option<DateTime<Utc>> {
        self.auth.renew_due_at()
    }

    pub fn prompt(&self) -> String {
        let me = self
            .auth
            .identity()
            .map_or("stoop", |p| p.username.as_str());
        match self.conversation.peer() {
            Some(peer) => format!("{}@{}> ", me, peer.username),
            None => format!("{}> ", me),
        }
    }

    /// Resume a stored session, or start a login.
    pub async fn initialize(&mut self) {
        tracing::info!("Initializing client...");
        if self.auth.resolve_session().is_some() {
            self.setup_and_connect().await;
        } else {
            self.screen.print("Not logged in.");
            self.login().await;
        }
    }

    pub async fn login(&mut self) {
        if let Err(e) = self.auth.start_login().await {
            tracing::error!("Error during sign-in redirect: {}", e);
            self.screen
                .print("Could not start login. Check the identity provider configuration.");
        }
    }

    /// Finish a login from the redirect back.
    ///
    /// The transport is rebuilt when the new identity differs from the one
    /// it was opened for; the roster is reloaded before the pre-login
    /// selection is restored. A state mismatch starts a new login; every
    /// other failure is shown and left to the user.
    pub async fn handle_callback(&mut self, params: CallbackParams) -> Result<(), AuthError> {
        tracing::info!("Handling identity provider redirect callback...");
        match self.auth.complete_login_callback(params).await {
            Ok(completed) => {
                let user_id = completed.session.user_id().clone();
                let switched = self.connection.is_connected()
                    && self.connection.connected_as() != Some(&user_id);
                if switched {
                    tracing::info!("Signed in as {}; reconnecting", user_id);
                    self.connection.disconnect().await;
                    self.events = None;
                    self.roster.clear();
                    self.conversation.close();
                }
                if self.connection.is_connected() {
                    self.refresh_roster().await;
                } else {
                    self.setup_and_connect().await;
                }
                if let Some(peer) = completed
                    .return_to
                    .and_then(|id| UserId::new(id).ok())
                    .and_then(|id| self.roster.get(&id).map(|e| e.peer.clone()))
                {
                    self.select(peer).await;
                }
                Ok(())
            }
            Err(e) if e.should_retry_login() => {
                tracing::warn!("{}; starting a new login", e);
                self.login().await;
                Err(e)
            }
            Err(e) => {
                tracing::error!("Error during login callback: {}", e);
                let text = match &e {
                    AuthError::TokenExchange(_) => {
                        "Login failed: Could not get token from the identity provider."
                    }
                    _ => "Authentication error occurred. Use /login to try again.",
                };
                self.screen.print(text);
                Err(e)
            }
        }
    }

    /// Open the transport for the current session and load the roster.
    pub async fn setup_and_connect(&mut self) {
        if self.connection.is_connected() {
            tracing::info!("WebSocket already connected.");
            return;
        }
        if self.auth.bearer_token().await.is_none() {
            tracing::error!("Cannot connect WebSocket: Failed to get valid access token.");
            self.screen
                .print("Failed to get access token for chat connection.");
            return;
        }
        let Some(session) = self.auth.current().cloned() else {
            self.screen
                .print("Authentication failed. Cannot connect to chat.");
            return;
        };

        tracing::info!(
            "Setting up UI and connecting for user: {}",
            session.profile.username
        );
        self.screen
            .print(MessageFormatter::format_welcome(&session.profile));
        self.screen.print("Connecting to chat...");
        match self.connection.connect(&session).await {
            Ok(events) => {
                self.events = Some(events);
                self.screen.print("Connected. Type /help for commands.");
                self.refresh_roster().await;
            }
            Err(TransportError::AlreadyConnected) => {}
            Err(e) => {
                tracing::error!("Could not connect to WebSocket server: {}", e);
                self.screen.print(CONNECT_ERROR);
            }
        }
    }

    pub async fn refresh_roster(&mut self) {
        let selected = self.selected().cloned();
        if let Err(e) = self
            .roster
            .refresh(
                self.api.as_ref(),
                &mut self.auth,
                &mut self.screen,
                selected.as_ref(),
            )
            .await
        {
            tracing::debug!("Roster refresh failed: {}", e);
        }
    }

    /// Select a peer by position, identifier or name.
    pub async fn select_peer(&mut self, query: &str) {
        match self.roster.resolve(query).cloned() {
            Some(peer) => self.select(peer).await,
            None => self.screen.print(format!(
                "No such user: {}. Use /users to list who is online.",
                query
            )),
        }
    }

    async fn select(&mut self, peer: Peer) {
        tracing::info!("Selected user: {}", peer.id);
        let peer_id = peer.id.clone();
        self.roster.clear_unread(&peer_id);
        self.auth.set_location(Some(peer_id.to_string()));
        self.conversation.open(peer, &mut self.screen);
        if let Err(e) = self
            .conversation
            .load_history(
                &peer_id,
                self.api.as_ref(),
                &mut self.auth,
                &mut self.screen,
            )
            .await
        {
            tracing::debug!("History load failed: {}", e);
        }
    }

    /// Publish a message to the selected peer and render it as sent.
    ///
    /// Nothing is published unless the transport is connected, a peer is
    /// selected and the local user is identified.
    pub async fn send_message(&mut self, content: &str) -> Result<(), SendError> {
        let content = content.trim();
        if content.is_empty() {
            return Err(SendError::Empty);
        }

        let mut missing = Vec::new();
        if !self.connection.is_connected() {
            tracing::error!("Cannot send message: WebSocket not connected.");
            missing.push(MissingPrecondition::NotConnected);
        }
        let recipient = self.selected().cloned();
        if recipient.is_none() {
            tracing::error!("Cannot send message: No recipient selected.");
            missing.push(MissingPrecondition::NoRecipient);
        }
        let sender = self.auth.identity().map(|p| p.user_id.clone());
        if sender.is_none() {
            tracing::error!("Cannot send message: Current user not identified.");
            missing.push(MissingPrecondition::NoIdentity);
        }

        let (Some(sender), Some(recipient), true) = (sender, recipient, missing.is_empty()) else {
            let error = SendError::Unmet(missing);
            self.screen.print(error.to_string());
            return Err(error);
        };

        let now = self.clock.now();
        let message = ChatMessage {
            sender,
            recipient,
            content: content.to_string(),
            sent_at: Some(now),
        };
        tracing::debug!("Sending message to {}", message.recipient);
        if let Err(e) = self.connection.send_chat(&message, now).await {
            self.screen.print(format!("Message not sent: {}", e));
            return Err(e.into());
        }
        self.conversation.append_local(&message, &mut self.screen);
        Ok(())
    }

    /// Next event from the open transport; pending while disconnected.
    pub async fn next_transport_event(&mut self) -> TransportEvent {
        let Some(events) = self.events.as_mut() else {
            return std::future::pending().await;
        };
        match events.recv().await {
            Some(event) => event,
            None => {
                self.events = None;
                TransportEvent::Closed
            }
        }
    }

    pub async fn handle_transport_event(&mut self, event: TransportEvent) {
        match self.connection.handle_event(event) {
            Some(Inbound::Chat(message)) => self.dispatch_incoming(message).await,
            Some(Inbound::Presence) => self.refresh_roster().await,
            Some(Inbound::Lost(reason)) => {
                self.events = None;
                self.screen.print(format!(
                    "Connection lost: {}. Use /connect to reconnect.",
                    reason
                ));
            }
            None => {}
        }
    }

    /// Route a received message: open conversation, unread counter, or a
    /// roster refresh for an unknown sender.
    pub async fn dispatch_incoming(&mut self, message: ChatMessage) {
        let Some(local) = self.auth.identity().map(|p| p.user_id.clone()) else {
            tracing::warn!("Dropping message from {}: not logged in", message.sender);
            return;
        };

        if self.selected() == Some(&message.sender) {
            self.conversation
                .append_remote(&local, &message, &mut self.screen);
        } else if let Some(unread) = self.roster.note_unread(&message.sender) {
            tracing::info!("Notification: New message from {}", message.sender);
            let name = self
                .roster
                .get(&message.sender)
                .map(|e| e.peer.display_name.clone())
                .unwrap_or_else(|| message.sender.to_string());
            self.screen
                .print(MessageFormatter::format_unread_notice(&name, unread));
        } else {
            tracing::warn!(
                "Received message from unknown or offline user: {}",
                message.sender
            );
            self.refresh_roster().await;
        }
    }

    pub async fn renew_session(&mut self) {
        match self.auth.renew().await {
            Ok(()) => tracing::info!("Session renewed silently"),
            Err(e) => tracing::warn!("Silent renew failed, session will expire: {}", e),
        }
    }

    /// Disconnect, end the identity-provider session, then drop per-user state.
    pub async fn logout(&mut self) {
        tracing::info!("Logging out...");
        self.screen.print("Logging out...");
        self.connection.disconnect().await;
        self.events = None;

        match self.auth.end_session().await {
            Ok(_) => self.screen.print("Logged out. Use /login to sign in again."),
            Err(e) => {
                tracing::error!("Error during sign-out redirect: {}", e);
                self.screen
                    .print("Signed out locally; the identity provider could not be reached.");
            }
        }
        self.roster.clear();
        self.conversation.close();
    }

    /// Leave without ending the identity-provider session.
    pub async fn shutdown(&mut self) {
        self.connection.disconnect().await;
        self.events = None;
    }
}
