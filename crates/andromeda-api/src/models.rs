// Wire models shared by the REST client and the WebSocket frame codec.
//
// Every struct keeps unknown fields in a flattened `extra` map so that a
// server-side addition never breaks decoding, and persisted users round-trip
// whatever the server sent.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Numeric chat room identifier.
pub type RoomId = u64;

/// Numeric chat message identifier.
pub type MessageId = u64;

/// Profile of an Andromeda user, as returned by `GET auth/me/`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: u64,
    pub username: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub full_name: String,
    #[serde(default)]
    pub bio: String,
    #[serde(default)]
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub is_verified: bool,
    #[serde(default)]
    pub followers_count: u64,
    #[serde(default)]
    pub following_count: u64,
    #[serde(default)]
    pub friends_count: u64,
    #[serde(default)]
    pub posts_count: u64,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,

    /// All remaining fields the server sends.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl User {
    /// Full name if the server provided one, otherwise the username.
    pub fn display_name(&self) -> &str {
        if self.full_name.trim().is_empty() {
            &self.username
        } else {
            &self.full_name
        }
    }
}

/// A notification pushed over the notifications channel.
///
/// Push payloads are looser than the REST representation: `sender` is a
/// username string on the socket and a user object over REST, so it stays
/// an untyped [`Value`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    #[serde(default)]
    pub id: Option<u64>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub notification_type: Option<String>,
    #[serde(default)]
    pub sender: Option<Value>,
    #[serde(default)]
    pub created_at: Option<String>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A chat message broadcast to a room.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub message_id: MessageId,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub message_type: Option<String>,
    pub sender_id: u64,
    #[serde(default)]
    pub sender_username: String,
    #[serde(default)]
    pub sender_avatar: Option<String>,
    #[serde(default)]
    pub reply_to: Option<MessageId>,
    #[serde(default)]
    pub created_at: Option<String>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Another member started or stopped typing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypingIndicator {
    pub user_id: u64,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub is_typing: bool,
}

/// A member read a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadReceipt {
    pub message_id: MessageId,
    pub user_id: u64,
}

/// A member joined or left the room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresenceStatus {
    pub user_id: u64,
    #[serde(default)]
    pub username: String,
    pub status: String,
}

impl PresenceStatus {
    pub fn is_online(&self) -> bool {
        self.status == "online"
    }
}

/// Body of `GET notifications/unread-count/`.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct UnreadCount {
    pub unread_count: u64,
}
