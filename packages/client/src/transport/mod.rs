//! Message-queue transport: STOMP over WebSocket.
//!
//! ## Layers
//!
//! - `frame`: STOMP frame codec
//! - `stomp`: [`Connector`]/[`Transport`] over tokio-tungstenite
//! - `connection`: connection state machine and chat destinations

pub mod connection;
pub mod frame;
pub mod stomp;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::TransportError;

pub use connection::{ConnectionManager, ConnectionState, Inbound};
pub use stomp::StompConnector;

/// Event delivered by the transport's read side
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// A MESSAGE frame
    Message {
        subscription: String,
        destination: String,
        body: String,
    },
    /// An ERROR frame; the broker closes the session after it
    Error(String),
    /// The socket closed or failed
    Closed,
}

/// Receiving half handed to the event loop
pub type EventReceiver = mpsc::UnboundedReceiver<TransportEvent>;

/// One open transport session
#[async_trait]
pub trait Transport: Send {
    /// Subscribe and return the subscription id.
    async fn subscribe(&mut self, destination: &str) -> Result<String, TransportError>;

    /// Publish a JSON body.
    async fn publish(&mut self, destination: &str, body: String) -> Result<(), TransportError>;

    /// End the session and close the socket.
    async fn close(&mut self) -> Result<(), TransportError>;
}

/// Opens transport sessions
#[async_trait]
pub trait Connector: Send + Sync {
    async fn open(&self, bearer: &str) -> Result<(Box<dyn Transport>, EventReceiver), TransportError>;
}
