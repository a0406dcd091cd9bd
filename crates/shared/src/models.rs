//! Chat models and REST payloads exchanged with the backend.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identifier of a chat room. Also the key of the room's broker topic.
pub type RoomId = String;

/// When a message was recorded by the backend.
///
/// The backend stores a local date-time; other producers send epoch
/// milliseconds. Both are accepted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Timestamp {
    Millis(i64),
    DateTime(NaiveDateTime),
}

impl Timestamp {
    pub fn to_datetime(&self) -> Option<NaiveDateTime> {
        match self {
            Timestamp::Millis(ms) => DateTime::<Utc>::from_timestamp_millis(*ms).map(|d| d.naive_utc()),
            Timestamp::DateTime(dt) => Some(*dt),
        }
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_datetime() {
            Some(dt) => write!(f, "{}", dt.format("%Y-%m-%d %H:%M")),
            None => write!(f, "-"),
        }
    }
}

/// A chat message, either received from a room topic or loaded from history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub sender: String,
    pub content: String,
    /// Absent in history pages and broker echoes; filled in from the
    /// subscribed room on delivery.
    #[serde(default)]
    pub room_id: RoomId,
    #[serde(default, alias = "timeStamp", skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<Timestamp>,
}

impl Message {
    pub fn new(
        sender: impl Into<String>,
        content: impl Into<String>,
        room_id: impl Into<RoomId>,
    ) -> Self {
        Self {
            sender: sender.into(),
            content: content.into(),
            room_id: room_id.into(),
            timestamp: None,
        }
    }
}

/// An outbound message before it is addressed to a room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMessage {
    pub sender: String,
    pub content: String,
}

impl NewMessage {
    pub fn new(sender: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            sender: sender.into(),
            content: content.into(),
        }
    }
}

/// Body of a `SEND` frame to `/app/sendMessage/{roomId}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageRequest {
    pub sender: String,
    pub content: String,
    pub room_id: RoomId,
}

impl MessageRequest {
    pub fn new(room_id: &str, message: &NewMessage) -> Self {
        Self {
            sender: message.sender.clone(),
            content: message.content.clone(),
            room_id: room_id.to_string(),
        }
    }
}

/// A room as returned by the room endpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Room {
    #[serde(default)]
    pub id: Option<String>,
    pub room_id: RoomId,
    #[serde(default)]
    pub messages: Vec<Message>,
    /// Participant user id to role name.
    #[serde(default)]
    pub participants: HashMap<String, String>,
}

/// Body of the room create/join/leave/promote/demote requests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomUserRequest {
    pub room_id: RoomId,
    pub user_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Successful login. The token is split off and stored separately from the
/// profile fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub user_id: String,
    pub name: String,
    pub email: String,
    #[serde(default, alias = "emailVerified")]
    pub is_email_verified: bool,
    #[serde(default)]
    pub token: Option<String>,
}

impl LoginResponse {
    /// Split into the bearer token and the user profile.
    pub fn into_parts(self) -> (Option<String>, UserProfile) {
        let profile = UserProfile {
            user_id: self.user_id,
            name: self.name,
            email: self.email,
            is_email_verified: self.is_email_verified,
        };
        (self.token, profile)
    }
}

/// The signed-in user, as kept in session storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub user_id: String,
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub is_email_verified: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignupRequest {
    pub name: String,
    pub email: String,
    pub password: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProfileRequest {
    pub user_id: String,
    pub name: String,
    /// Left unchanged when absent or empty.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserStatusUpdateRequest {
    pub user_id: String,
    pub is_active: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResetPasswordRequest {
    pub email: String,
    pub new_password: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailRequest {
    pub email: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifyOtpRequest {
    pub email: String,
    pub otp: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_accepts_backend_local_datetime() {
        let json = r#"{"sender":"bob","content":"hi","timeStamp":"2024-05-01T10:15:30.123"}"#;
        let msg: Message = serde_json::from_str(json).unwrap();
        assert_eq!(msg.sender, "bob");
        assert_eq!(msg.room_id, "");
        let dt = msg.timestamp.unwrap().to_datetime().unwrap();
        assert_eq!(dt.format("%H:%M:%S").to_string(), "10:15:30");
    }

    #[test]
    fn message_accepts_epoch_millis() {
        let json = r#"{"sender":"bob","content":"hi","roomId":"room1","timestamp":1700000000000}"#;
        let msg: Message = serde_json::from_str(json).unwrap();
        assert_eq!(msg.room_id, "room1");
        assert_eq!(msg.timestamp, Some(Timestamp::Millis(1_700_000_000_000)));
    }

    #[test]
    fn message_requires_sender_and_content() {
        assert!(serde_json::from_str::<Message>(r#"{"content":"hi"}"#).is_err());
        assert!(serde_json::from_str::<Message>(r#"{"sender":"bob"}"#).is_err());
    }

    #[test]
    fn message_request_uses_camel_case() {
        let req = MessageRequest::new("room1", &NewMessage::new("alice", "yo"));
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"sender": "alice", "content": "yo", "roomId": "room1"})
        );
    }

    #[test]
    fn login_response_splits_token() {
        let json = r#"{"userId":"u1","name":"Alice","email":"a@x.io","emailVerified":true,"token":"jwt"}"#;
        let resp: LoginResponse = serde_json::from_str(json).unwrap();
        let (token, profile) = resp.into_parts();
        assert_eq!(token.as_deref(), Some("jwt"));
        assert_eq!(profile.user_id, "u1");
        assert!(profile.is_email_verified);
    }
}
