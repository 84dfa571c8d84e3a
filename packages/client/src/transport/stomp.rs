//! STOMP session over a tokio-tungstenite WebSocket.

use std::time::Duration;

use async_trait::async_trait;
use futures_util::{
    SinkExt, StreamExt,
    stream::{SplitSink, SplitStream},
};
use reqwest::Url;
use tokio::{net::TcpStream, sync::mpsc, task::JoinHandle};
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream, connect_async,
    tungstenite::{
        self, Message,
        client::IntoClientRequest,
        http::{HeaderValue, header::AUTHORIZATION},
    },
};

use crate::error::TransportError;

use super::frame::{Command, Frame};
use super::{Connector, EventReceiver, Transport, TransportEvent};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;
type WsSource = SplitStream<WsStream>;

const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Opens STOMP sessions on one WebSocket endpoint
#[derive(Debug, Clone)]
pub struct StompConnector {
    url: Url,
}

impl StompConnector {
    pub fn new(url: Url) -> Self {
        Self { url }
    }

    fn host(&self) -> String {
        match (self.url.host_str(), self.url.port()) {
            (Some(host), Some(port)) => format!("{host}:{port}"),
            (Some(host), None) => host.to_string(),
            (None, _) => "localhost".to_string(),
        }
    }

    /// CONNECT frame carrying the bearer token as a native header.
    pub fn connect_frame(host: &str, bearer: &str) -> Frame {
        Frame::new(Command::Connect)
            .header("accept-version", "1.2")
            .header("host", host)
            .header("heart-beat", "0,0")
            .header("Authorization", format!("Bearer {bearer}"))
    }
}

fn classify_connect_error(error: tungstenite::Error) -> TransportError {
    match &error {
        tungstenite::Error::Http(response) => {
            let status = response.status();
            if status.as_u16() == 401 || status.as_u16() == 403 {
                TransportError::Rejected(format!("HTTP {status}"))
            } else {
                TransportError::Connect(format!("HTTP {status}"))
            }
        }
        _ => TransportError::Connect(error.to_string()),
    }
}

async fn send_frame(write: &mut WsSink, frame: &Frame) -> Result<(), TransportError> {
    write
        .send(Message::Text(frame.encode().into()))
        .await
        .map_err(|e| TransportError::Send(e.to_string()))
}

async fn await_connected(read: &mut WsSource) -> Result<Frame, TransportError> {
    while let Some(message) = read.next().await {
        match message {
            Ok(Message::Text(text)) => match Frame::decode(text.as_str())? {
                Some(frame) if frame.command == Command::Connected => return Ok(frame),
                Some(frame) if frame.command == Command::Error => {
                    let reason = frame
                        .get("message")
                        .map(str::to_string)
                        .unwrap_or_else(|| frame.body.clone());
                    return Err(TransportError::Rejected(reason));
                }
                Some(frame) => {
                    return Err(TransportError::Protocol(format!(
                        "expected CONNECTED, got {}",
                        frame.command
                    )));
                }
                None => continue,
            },
            Ok(Message::Close(_)) => return Err(TransportError::Closed),
            Ok(_) => continue,
            Err(e) => return Err(TransportError::Connect(e.to_string())),
        }
    }
    Err(TransportError::Closed)
}

/// Forward inbound frames until the socket closes.
async fn read_loop(mut read: WsSource, tx: mpsc::UnboundedSender<TransportEvent>) {
    while let Some(message) = read.next().await {
        match message {
            Ok(Message::Text(text)) => match Frame::decode(text.as_str()) {
                Ok(Some(frame)) => match frame.command {
                    Command::Message => {
                        let subscription = frame.get("subscription").unwrap_or_default().to_string();
                        let destination = frame.get("destination").unwrap_or_default().to_string();
                        let event = TransportEvent::Message {
                            subscription,
                            destination,
                            body: frame.body,
                        };
                        if tx.send(event).is_err() {
                            return;
                        }
                    }
                    Command::Error => {
                        let reason = frame
                            .get("message")
                            .map(str::to_string)
                            .unwrap_or(frame.body);
                        tracing::warn!("Broker sent ERROR: {}", reason);
                        let _ = tx.send(TransportEvent::Error(reason));
                        return;
                    }
                    Command::Receipt => {
                        tracing::debug!("Receipt {}", frame.get("receipt-id").unwrap_or("?"));
                    }
                    other => tracing::debug!("Ignoring {} frame", other),
                },
                Ok(None) => {}
                Err(e) => tracing::warn!("Dropping undecodable frame: {}", e),
            },
            Ok(Message::Close(_)) => {
                tracing::info!("Server closed the connection");
                break;
            }
            Ok(_) => {}
            Err(e) => {
                tracing::warn!("WebSocket read error: {}", e);
                break;
            }
        }
    }
    let _ = tx.send(TransportEvent::Closed);
}

#[async_trait]
impl Connector for StompConnector {
    async fn open(&self, bearer: &str) -> Result<(Box<dyn Transport>, EventReceiver), TransportError> {
        let mut request = self
            .url
            .as_str()
            .into_client_request()
            .map_err(|e| TransportError::Connect(e.to_string()))?;
        let auth = HeaderValue::from_str(&format!("Bearer {bearer}"))
            .map_err(|e| TransportError::Connect(e.to_string()))?;
        request.headers_mut().insert(AUTHORIZATION, auth);

        tracing::info!("Connecting to {}", self.url);
        let (ws_stream, _response) = connect_async(request)
            .await
            .map_err(classify_connect_error)?;
        let (mut write, mut read) = ws_stream.split();

        send_frame(&mut write, &Self::connect_frame(&self.host(), bearer)).await?;
        let connected = tokio::time::timeout(HANDSHAKE_TIMEOUT, await_connected(&mut read))
            .await
            .map_err(|_| TransportError::Connect("timed out waiting for CONNECTED".to_string()))??;
        tracing::info!(
            "STOMP session established (version {})",
            connected.get("version").unwrap_or("1.0")
        );

        let (tx, rx) = mpsc::unbounded_channel();
        let reader = tokio::spawn(read_loop(read, tx));
        let session = StompSession {
            write,
            reader,
            next_subscription: 0,
        };
        Ok((Box::new(session), rx))
    }
}

/// Open STOMP session; the read half runs in its own task
struct StompSession {
    write: WsSink,
    reader: JoinHandle<()>,
    next_subscription: u32,
}

#[async_trait]
impl Transport for StompSession {
    async fn subscribe(&mut self, destination: &str) -> Result<String, TransportError> {
        let id = format!("sub-{}", self.next_subscription);
        self.next_subscription += 1;
        let frame = Frame::new(Command::Subscribe)
            .header("id", &id)
            .header("destination", destination)
            .header("ack", "auto");
        send_frame(&mut self.write, &frame).await?;
        tracing::debug!("Subscribed to {} as {}", destination, id);
        Ok(id)
    }

    async fn publish(&mut self, destination: &str, body: String) -> Result<(), TransportError> {
        let frame = Frame::new(Command::Send)
            .header("destination", destination)
            .json_body(body);
        send_frame(&mut self.write, &frame).await
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        let frame = Frame::new(Command::Disconnect)
            .header("receipt", format!("disconnect-{}", uuid::Uuid::new_v4()));
        let result = send_frame(&mut self.write, &frame).await;
        if let Err(e) = self.write.close().await {
            tracing::debug!("WebSocket close: {}", e);
        }
        self.reader.abort();
        result
    }
}

impl Drop for StompSession {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connect_frame_carries_bearer_token() {
        // テスト項目: CONNECT フレームに Bearer トークンとバージョンが含まれる
        // given (前提条件):
        let host = "localhost:8090";

        // when (操作):
        let frame = StompConnector::connect_frame(host, "at-1");

        // then (期待する結果):
        assert_eq!(frame.command, Command::Connect);
        assert_eq!(frame.get("Authorization"), Some("Bearer at-1"));
        assert_eq!(frame.get("accept-version"), Some("1.2"));
        assert_eq!(frame.get("host"), Some("localhost:8090"));
    }

    #[test]
    fn test_host_includes_explicit_port() {
        // テスト項目: URL にポートがある場合、host ヘッダにポートが含まれる
        // given (前提条件):
        let connector = StompConnector::new(Url::parse("ws://chat.local:8090/ws").unwrap());

        // when (操作):
        let host = connector.host();

        // then (期待する結果):
        assert_eq!(host, "chat.local:8090");
    }
}
