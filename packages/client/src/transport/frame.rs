//! STOMP 1.2 frames, one per WebSocket text message.

use std::fmt;
use std::str::FromStr;

use crate::error::TransportError;

/// Frame commands used by the client
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Connect,
    Connected,
    Subscribe,
    Unsubscribe,
    Send,
    Message,
    Receipt,
    Error,
    Disconnect,
}

impl Command {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Connect => "CONNECT",
            Self::Connected => "CONNECTED",
            Self::Subscribe => "SUBSCRIBE",
            Self::Unsubscribe => "UNSUBSCRIBE",
            Self::Send => "SEND",
            Self::Message => "MESSAGE",
            Self::Receipt => "RECEIPT",
            Self::Error => "ERROR",
            Self::Disconnect => "DISCONNECT",
        }
    }

    /// CONNECT and CONNECTED headers are never escaped.
    fn escapes_headers(&self) -> bool {
        !matches!(self, Self::Connect | Self::Connected)
    }
}

impl FromStr for Command {
    type Err = TransportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "CONNECT" | "STOMP" => Self::Connect,
            "CONNECTED" => Self::Connected,
            "SUBSCRIBE" => Self::Subscribe,
            "UNSUBSCRIBE" => Self::Unsubscribe,
            "SEND" => Self::Send,
            "MESSAGE" => Self::Message,
            "RECEIPT" => Self::Receipt,
            "ERROR" => Self::Error,
            "DISCONNECT" => Self::Disconnect,
            other => {
                return Err(TransportError::Protocol(format!(
                    "unknown command: {other}"
                )));
            }
        })
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single STOMP frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub command: Command,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl Frame {
    pub fn new(command: Command) -> Self {
        Self {
            command,
            headers: Vec::new(),
            body: String::new(),
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Set a JSON body together with its content headers.
    pub fn json_body(mut self, body: String) -> Self {
        self.headers
            .push(("content-type".to_string(), "application/json".to_string()));
        self.headers
            .push(("content-length".to_string(), body.len().to_string()));
        self.body = body;
        self
    }

    /// Value of the first header with this name (repeated headers: first wins).
    pub fn get(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn encode(&self) -> String {
        let mut out = String::with_capacity(self.body.len() + 64);
        out.push_str(self.command.as_str());
        out.push('\n');
        for (name, value) in &self.headers {
            if self.command.escapes_headers() {
                out.push_str(&escape(name));
                out.push(':');
                out.push_str(&escape(value));
            } else {
                out.push_str(name);
                out.push(':');
                out.push_str(value);
            }
            out.push('\n');
        }
        out.push('\n');
        out.push_str(&self.body);
        out.push('\0');
        out
    }

    /// Parse one frame; `Ok(None)` for a heart-beat (end-of-line only).
    pub fn decode(text: &str) -> Result<Option<Self>, TransportError> {
        let text = text.trim_start_matches(['\r', '\n']);
        if text.is_empty() {
            return Ok(None);
        }

        let (head, rest) = split_head(text)
            .ok_or_else(|| TransportError::Protocol("frame has no header terminator".into()))?;
        let mut lines = head.lines();
        let command: Command = lines
            .next()
            .map(|l| l.trim_end_matches('\r'))
            .unwrap_or_default()
            .parse()?;

        let mut headers = Vec::new();
        for line in lines {
            let line = line.trim_end_matches('\r');
            if line.is_empty() {
                continue;
            }
            let (name, value) = line.split_once(':').ok_or_else(|| {
                TransportError::Protocol(format!("malformed header line: {line}"))
            })?;
            if command.escapes_headers() {
                headers.push((unescape(name)?, unescape(value)?));
            } else {
                headers.push((name.to_string(), value.to_string()));
            }
        }

        let mut frame = Self {
            command,
            headers,
            body: String::new(),
        };
        let length = frame
            .get("content-length")
            .and_then(|v| v.trim().parse::<usize>().ok());
        frame.body = match length {
            Some(len) if rest.len() >= len && rest.is_char_boundary(len) => rest[..len].to_string(),
            _ => rest.split('\0').next().unwrap_or_default().to_string(),
        };
        Ok(Some(frame))
    }
}

fn split_head(text: &str) -> Option<(&str, &str)> {
    let lf = text.find("\n\n").map(|i| (i, 2));
    let crlf = text.find("\r\n\r\n").map(|i| (i, 4));
    let (index, len) = match (lf, crlf) {
        (Some(a), Some(b)) => {
            if a.0 <= b.0 {
                a
            } else {
                b
            }
        }
        (Some(a), None) => a,
        (None, Some(b)) => b,
        (None, None) => return None,
    };
    Some((&text[..index], &text[index + len..]))
}

fn escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\r' => out.push_str("\\r"),
            '\n' => out.push_str("\\n"),
            ':' => out.push_str("\\c"),
            c => out.push(c),
        }
    }
    out
}

fn unescape(value: &str) -> Result<String, TransportError> {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('\\') => out.push('\\'),
            Some('r') => out.push('\r'),
            Some('n') => out.push('\n'),
            Some('c') => out.push(':'),
            other => {
                return Err(TransportError::Protocol(format!(
                    "invalid header escape: \\{}",
                    other.map(String::from).unwrap_or_default()
                )));
            }
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_send_frame_with_json_body() {
        // テスト項目: SEND フレームが JSON ボディと長さヘッダ付きでエンコードされる
        // given (前提条件):
        let frame = Frame::new(Command::Send)
            .header("destination", "/app/chat")
            .json_body(r#"{"content":"hi"}"#.to_string());

        // when (操作):
        let encoded = frame.encode();

        // then (期待する結果):
        assert_eq!(
            encoded,
            "SEND\ndestination:/app/chat\ncontent-type:application/json\ncontent-length:16\n\n{\"content\":\"hi\"}\0"
        );
    }

    #[test]
    fn test_connect_headers_are_not_escaped() {
        // テスト項目: CONNECT フレームのヘッダはエスケープされない
        // given (前提条件):
        let frame = Frame::new(Command::Connect).header("host", "localhost:8090");

        // when (操作):
        let encoded = frame.encode();

        // then (期待する結果):
        assert!(encoded.contains("host:localhost:8090\n"));
    }

    #[test]
    fn test_decode_message_frame() {
        // テスト項目: MESSAGE フレームのヘッダとボディがデコードされる
        // given (前提条件):
        let text = "MESSAGE\ndestination:/user/U1/queue/messages\nsubscription:sub-0\nmessage-id:m\\c1\n\n{\"senderId\":\"U2\"}\0";

        // when (操作):
        let frame = Frame::decode(text).unwrap().unwrap();

        // then (期待する結果):
        assert_eq!(frame.command, Command::Message);
        assert_eq!(frame.get("subscription"), Some("sub-0"));
        assert_eq!(frame.get("message-id"), Some("m:1"));
        assert_eq!(frame.body, "{\"senderId\":\"U2\"}");
    }

    #[test]
    fn test_decode_heartbeat_is_none() {
        // テスト項目: 改行のみのハートビートはフレームなしとして扱われる
        // given (前提条件):
        let text = "\n";

        // when (操作):
        let result = Frame::decode(text).unwrap();

        // then (期待する結果):
        assert!(result.is_none());
    }

    #[test]
    fn test_decode_crlf_and_content_length() {
        // テスト項目: CRLF 区切りと content-length 指定のフレームがデコードされる
        // given (前提条件):
        let text = "CONNECTED\r\nversion:1.2\r\ncontent-length:2\r\n\r\nokIGNORED\0";

        // when (操作):
        let frame = Frame::decode(text).unwrap().unwrap();

        // then (期待する結果):
        assert_eq!(frame.command, Command::Connected);
        assert_eq!(frame.get("version"), Some("1.2"));
        assert_eq!(frame.body, "ok");
    }

    #[test]
    fn test_repeated_header_first_wins() {
        // テスト項目: 同名ヘッダが重複した場合、最初の値が採用される
        // given (前提条件):
        let text = "MESSAGE\nfoo:first\nfoo:second\n\n\0";

        // when (操作):
        let frame = Frame::decode(text).unwrap().unwrap();

        // then (期待する結果):
        assert_eq!(frame.get("foo"), Some("first"));
    }

    #[test]
    fn test_decode_rejects_unknown_command() {
        // テスト項目: 未知のコマンドはプロトコルエラーとなる
        // given (前提条件):
        let text = "BOGUS\n\n\0";

        // when (操作):
        let result = Frame::decode(text);

        // then (期待する結果):
        assert!(matches!(result, Err(TransportError::Protocol(_))));
    }

    #[test]
    fn test_decode_rejects_invalid_escape() {
        // テスト項目: 不正なエスケープシーケンスはプロトコルエラーとなる
        // given (前提条件):
        let text = "ERROR\nmessage:bad\\t\n\n\0";

        // when (操作):
        let result = Frame::decode(text);

        // then (期待する結果):
        assert!(matches!(result, Err(TransportError::Protocol(_))));
    }

    #[test]
    fn test_escape_round_trip_for_special_header() {
        // テスト項目: 特殊文字を含むヘッダ値がエンコード後に復元される
        // given (前提条件):
        let frame = Frame::new(Command::Send).header("note", "a:b\\c\nd");

        // when (操作):
        let decoded = Frame::decode(&frame.encode()).unwrap().unwrap();

        // then (期待する結果):
        assert_eq!(decoded.get("note"), Some("a:b\\c\nd"));
    }
}
