//! Connection manager: one STOMP session per authenticated identity.
//!
//! `Disconnected → Connecting → Connected → Disconnected`

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::domain::{ChatMessage, Profile, Session, UserId};
use crate::dto::{ChatNotificationDto, OutgoingChatMessage, UserPayload};
use crate::error::TransportError;

use super::{Connector, EventReceiver, Transport, TransportEvent};

pub const ADD_USER_DESTINATION: &str = "/app/user.addUser";
pub const DISCONNECT_USER_DESTINATION: &str = "/app/user.disconnectUser";
pub const CHAT_DESTINATION: &str = "/app/chat";

/// Private inbox of a user.
pub fn inbox_destination(user_id: &UserId) -> String {
    format!("/user/{user_id}/queue/messages")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// Inbound event after routing by subscription
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    /// A direct message on the private inbox
    Chat(ChatMessage),
    /// Someone joined or left
    Presence,
    /// The session ended without `disconnect`
    Lost(String),
}

#[derive(Debug, Clone)]
struct Subscriptions {
    inbox_id: String,
    inbox: String,
    presence_id: String,
}

pub struct ConnectionManager {
    connector: Arc<dyn Connector>,
    presence_topic: String,
    state: ConnectionState,
    transport: Option<Box<dyn Transport>>,
    profile: Option<Profile>,
    subscriptions: Option<Subscriptions>,
}

impl ConnectionManager {
    pub fn new(connector: Arc<dyn Connector>, presence_topic: impl Into<String>) -> Self {
        Self {
            connector,
            presence_topic: presence_topic.into(),
            state: ConnectionState::Disconnected,
            transport: None,
            profile: None,
            subscriptions: None,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    /// Identity the open session was set up for.
    pub fn connected_as(&self) -> Option<&UserId> {
        self.profile
            .as_ref()
            .filter(|_| self.is_connected())
            .map(|p| &p.user_id)
    }

    /// Inbox subscribed by the open session.
    pub fn inbox_destination(&self) -> Option<&str> {
        self.subscriptions.as_ref().map(|s| s.inbox.as_str())
    }

    /// Open the session, subscribe the inbox and presence feed, announce presence.
    ///
    /// On failure the manager is back in `Disconnected`.
    pub async fn connect(&mut self, session: &Session) -> Result<EventReceiver, TransportError> {
        if self.state != ConnectionState::Disconnected {
            tracing::warn!("Connect ignored: transport is {:?}", self.state);
            return Err(TransportError::AlreadyConnected);
        }

        self.state = ConnectionState::Connecting;
        tracing::info!("Connecting as {}", session.profile.username);
        match self.open(session).await {
            Ok((transport, subscriptions, events)) => {
                tracing::info!("Connected; inbox {}", subscriptions.inbox);
                self.transport = Some(transport);
                self.subscriptions = Some(subscriptions);
                self.profile = Some(session.profile.clone());
                self.state = ConnectionState::Connected;
                Ok(events)
            }
            Err(e) => {
                tracing::error!("Could not connect: {}", e);
                self.reset();
                Err(e)
            }
        }
    }

    async fn open(
        &self,
        session: &Session,
    ) -> Result<(Box<dyn Transport>, Subscriptions, EventReceiver), TransportError> {
        let (mut transport, events) = self.connector.open(&session.access_token).await?;
        match self.setup(transport.as_mut(), &session.profile).await {
            Ok(subscriptions) => Ok((transport, subscriptions, events)),
            Err(e) => {
                if let Err(close_error) = transport.close().await {
                    tracing::debug!("Close after failed setup: {}", close_error);
                }
                Err(e)
            }
        }
    }

    async fn setup(
        &self,
        transport: &mut dyn Transport,
        profile: &Profile,
    ) -> Result<Subscriptions, TransportError> {
        let inbox = inbox_destination(&profile.user_id);
        let inbox_id = transport.subscribe(&inbox).await?;
        let presence_id = transport.subscribe(&self.presence_topic).await?;
        transport
            .publish(ADD_USER_DESTINATION, to_json(&UserPayload::from(profile))?)
            .await?;
        Ok(Subscriptions {
            inbox_id,
            inbox,
            presence_id,
        })
    }

    /// Publish a JSON body. At most once; nothing is retried.
    pub async fn send(&mut self, destination: &str, body: String) -> Result<(), TransportError> {
        let connected = self.state == ConnectionState::Connected;
        let Some(transport) = self.transport.as_mut().filter(|_| connected) else {
            tracing::warn!("Cannot send to {}: transport is not connected", destination);
            return Err(TransportError::NotConnected);
        };
        transport.publish(destination, body).await.inspect_err(|e| {
            tracing::warn!("Send to {} failed: {}", destination, e);
        })
    }

    pub async fn send_chat(
        &mut self,
        message: &ChatMessage,
        at: DateTime<Utc>,
    ) -> Result<(), TransportError> {
        let body = to_json(&OutgoingChatMessage::new(message, at))?;
        self.send(CHAT_DESTINATION, body).await
    }

    /// Route a transport event.
    pub fn handle_event(&mut self, event: TransportEvent) -> Option<Inbound> {
        match event {
            TransportEvent::Message {
                subscription,
                destination,
                body,
            } => {
                let subs = self.subscriptions.as_ref()?;
                if subscription == subs.inbox_id || destination == subs.inbox {
                    parse_notification(&body).map(Inbound::Chat)
                } else if subscription == subs.presence_id || destination == self.presence_topic {
                    tracing::debug!("Presence update: {}", body);
                    Some(Inbound::Presence)
                } else {
                    tracing::debug!("Message on unknown subscription {}", subscription);
                    None
                }
            }
            TransportEvent::Error(reason) => {
                if self.state == ConnectionState::Disconnected {
                    return None;
                }
                self.reset();
                Some(Inbound::Lost(reason))
            }
            TransportEvent::Closed => {
                if self.state == ConnectionState::Disconnected {
                    return None;
                }
                tracing::warn!("Connection closed by the server");
                self.reset();
                Some(Inbound::Lost("Connection closed".to_string()))
            }
        }
    }

    /// Announce departure, then close the session.
    pub async fn disconnect(&mut self) {
        if self.state != ConnectionState::Connected {
            self.reset();
            return;
        }
        if let (Some(transport), Some(profile)) = (self.transport.as_mut(), self.profile.as_ref()) {
            match to_json(&UserPayload::departure(profile)) {
                Ok(body) => {
                    if let Err(e) = transport.publish(DISCONNECT_USER_DESTINATION, body).await {
                        tracing::warn!("Could not announce departure: {}", e);
                    }
                }
                Err(e) => tracing::warn!("Could not encode departure: {}", e),
            }
            if let Err(e) = transport.close().await {
                tracing::warn!("Could not close transport cleanly: {}", e);
            }
        }
        tracing::info!("Disconnected");
        self.reset();
    }

    fn reset(&mut self) {
        self.state = ConnectionState::Disconnected;
        self.transport = None;
        self.subscriptions = None;
        self.profile = None;
    }
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<String, TransportError> {
    serde_json::to_string(value).map_err(|e| TransportError::Protocol(e.to_string()))
}

fn parse_notification(body: &str) -> Option<ChatMessage> {
    let dto = match serde_json::from_str::<ChatNotificationDto>(body) {
        Ok(dto) => dto,
        Err(e) => {
            tracing::warn!("Dropping malformed notification: {}", e);
            return None;
        }
    };
    match ChatMessage::try_from(dto) {
        Ok(message) => Some(message),
        Err(e) => {
            tracing::warn!("Dropping notification with invalid sender: {}", e);
            None
        }
    }
}
