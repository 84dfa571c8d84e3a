//! Data Transfer Objects for the chat backend.
//!
//! Field names follow the backend's camelCase JSON. Conversion into domain
//! types validates identifiers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::domain::{ChatMessage, DomainError, Peer, Profile, UserId, display_name};

// ========================================
// HTTP responses
// ========================================

/// Entry of `GET /users`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserDto {
    pub id: String,
    pub username: String,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

/// Entry of `GET /messages/{senderId}/{recipientId}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessageDto {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub chat_id: Option<String>,
    pub sender_id: String,
    pub recipient_id: String,
    pub content: String,
    #[serde(default, deserialize_with = "deserialize_timestamp")]
    pub timestamp: Option<DateTime<Utc>>,
}

// ========================================
// STOMP payloads
// ========================================

/// Body delivered on the private inbox
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatNotificationDto {
    #[serde(default)]
    pub id: Option<String>,
    pub sender_id: String,
    pub recipient_id: String,
    pub content: String,
}

/// Body published to `/app/chat`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutgoingChatMessage {
    pub sender_id: String,
    pub recipient_id: String,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

/// Body published to `/app/user.addUser` and `/app/user.disconnectUser`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserPayload {
    pub user_id: String,
    pub username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
}

/// Accepts epoch milliseconds or an RFC 3339 string.
fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawTimestamp {
        Millis(i64),
        Text(String),
    }

    let raw = Option::<RawTimestamp>::deserialize(deserializer)?;
    Ok(match raw {
        Some(RawTimestamp::Millis(millis)) => DateTime::from_timestamp_millis(millis),
        Some(RawTimestamp::Text(text)) => DateTime::parse_from_rfc3339(&text)
            .ok()
            .map(|dt| dt.with_timezone(&Utc)),
        None => None,
    })
}

// ========================================
// DTO → Domain
// ========================================

impl TryFrom<UserDto> for Peer {
    type Error = DomainError;

    fn try_from(dto: UserDto) -> Result<Self, Self::Error> {
        let display_name = display_name(
            &dto.username,
            dto.first_name.as_deref(),
            dto.last_name.as_deref(),
        );
        Ok(Self {
            id: UserId::new(dto.id)?,
            username: dto.username,
            display_name,
        })
    }
}

impl TryFrom<ChatMessageDto> for ChatMessage {
    type Error = DomainError;

    fn try_from(dto: ChatMessageDto) -> Result<Self, Self::Error> {
        Ok(Self {
            sender: UserId::new(dto.sender_id)?,
            recipient: UserId::new(dto.recipient_id)?,
            content: dto.content,
            sent_at: dto.timestamp,
        })
    }
}

impl TryFrom<ChatNotificationDto> for ChatMessage {
    type Error = DomainError;

    fn try_from(dto: ChatNotificationDto) -> Result<Self, Self::Error> {
        Ok(Self {
            sender: UserId::new(dto.sender_id)?,
            recipient: UserId::new(dto.recipient_id)?,
            content: dto.content,
            sent_at: None,
        })
    }
}

// ========================================
// Domain → DTO
// ========================================

impl OutgoingChatMessage {
    pub fn new(message: &ChatMessage, timestamp: DateTime<Utc>) -> Self {
        Self {
            sender_id: message.sender.as_str().to_string(),
            recipient_id: message.recipient.as_str().to_string(),
            content: message.content.clone(),
            timestamp: message.sent_at.unwrap_or(timestamp),
        }
    }
}

impl From<&Profile> for UserPayload {
    fn from(profile: &Profile) -> Self {
        Self {
            user_id: profile.user_id.as_str().to_string(),
            username: profile.username.clone(),
            first_name: profile.first_name.clone(),
            last_name: profile.last_name.clone(),
        }
    }
}

impl UserPayload {
    /// Departure payload: only the identifiers are sent.
    pub fn departure(profile: &Profile) -> Self {
        Self {
            user_id: profile.user_id.as_str().to_string(),
            username: profile.username.clone(),
            first_name: None,
            last_name: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_dto_to_peer_with_username_only() {
        // テスト項目: ユーザー名のみの DTO がユーザー名を表示名とする Peer に変換される
        // given (前提条件):
        let dto: UserDto = serde_json::from_str(r#"{"id":"U2","username":"bob"}"#).unwrap();

        // when (操作):
        let peer = Peer::try_from(dto).unwrap();

        // then (期待する結果):
        assert_eq!(peer.id, UserId::new("U2").unwrap());
        assert_eq!(peer.display_name, "bob");
    }

    #[test]
    fn test_user_dto_with_invalid_id_is_rejected() {
        // テスト項目: 空の ID を持つ DTO は変換に失敗する
        // given (前提条件):
        let dto: UserDto = serde_json::from_str(r#"{"id":"","username":"ghost"}"#).unwrap();

        // when (操作):
        let result = Peer::try_from(dto);

        // then (期待する結果):
        assert_eq!(result, Err(DomainError::EmptyUserId));
    }

    #[test]
    fn test_history_timestamp_accepts_epoch_millis() {
        // テスト項目: エポックミリ秒のタイムスタンプが読み取られる
        // given (前提条件):
        let json = r#"{"senderId":"U1","recipientId":"U2","content":"hi","timestamp":1672498800000}"#;

        // when (操作):
        let dto: ChatMessageDto = serde_json::from_str(json).unwrap();

        // then (期待する結果):
        assert_eq!(dto.timestamp.unwrap().timestamp_millis(), 1672498800000);
    }

    #[test]
    fn test_history_timestamp_accepts_iso_string() {
        // テスト項目: ISO 形式のタイムスタンプが読み取られる
        // given (前提条件):
        let json = r#"{"id":"m1","chatId":"U1_U2","senderId":"U1","recipientId":"U2","content":"hi","timestamp":"2023-01-01T00:00:00.000+09:00"}"#;

        // when (操作):
        let dto: ChatMessageDto = serde_json::from_str(json).unwrap();

        // then (期待する結果):
        assert_eq!(dto.timestamp.unwrap().timestamp_millis(), 1672498800000);
    }

    #[test]
    fn test_history_timestamp_null_is_none() {
        // テスト項目: null のタイムスタンプは None になる
        // given (前提条件):
        let json = r#"{"senderId":"U1","recipientId":"U2","content":"hi","timestamp":null}"#;

        // when (操作):
        let dto: ChatMessageDto = serde_json::from_str(json).unwrap();

        // then (期待する結果):
        assert_eq!(dto.timestamp, None);
    }

    #[test]
    fn test_outgoing_chat_message_uses_camel_case() {
        // テスト項目: 送信メッセージが camelCase の JSON になる
        // given (前提条件):
        let message = ChatMessage {
            sender: UserId::new("U1").unwrap(),
            recipient: UserId::new("U2").unwrap(),
            content: "hi".to_string(),
            sent_at: None,
        };
        let at = DateTime::from_timestamp_millis(1672498800000).unwrap();

        // when (操作):
        let json = serde_json::to_value(OutgoingChatMessage::new(&message, at)).unwrap();

        // then (期待する結果):
        assert_eq!(json["senderId"], "U1");
        assert_eq!(json["recipientId"], "U2");
        assert_eq!(json["content"], "hi");
        assert_eq!(json["timestamp"], "2022-12-31T15:00:00Z");
    }

    #[test]
    fn test_departure_payload_omits_names() {
        // テスト項目: 退出ペイロードには氏名が含まれない
        // given (前提条件):
        let profile = Profile {
            user_id: UserId::new("U1").unwrap(),
            username: "alice".to_string(),
            first_name: Some("Alice".to_string()),
            last_name: None,
        };

        // when (操作):
        let json = serde_json::to_value(UserPayload::departure(&profile)).unwrap();

        // then (期待する結果):
        assert_eq!(json, serde_json::json!({"userId": "U1", "username": "alice"}));
    }
}
