use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{MessageId, RequestId, UserId};

/// Uniform `{success, data|message}` body returned by every backend route.
/// A reachable server can still report domain-level failure, so callers
/// must branch on `success` rather than on transport status alone.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiEnvelope<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

/// Authenticated identity, as returned in the login `data` field and
/// persisted across restarts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub user_id: UserId,
    pub username: String,
}

/// One row of the friends list. `unread_count` is server-computed; the
/// client never increments it locally, it only reloads the list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Friend {
    pub id: UserId,
    pub username: String,
    #[serde(default)]
    pub unread_count: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub sender_id: UserId,
    pub sender_name: String,
    pub recipient_id: UserId,
    pub message: String,
    #[serde(default)]
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

/// A pending friend request. Accepting turns it into a friendship and
/// removes it; rejecting just removes it. There are no other states.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FriendRequest {
    pub id: RequestId,
    pub user_id: UserId,
    pub username: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserMatch {
    pub username: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendMessageRequest {
    pub sender_id: UserId,
    pub recipient_id: UserId,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FriendRequestBody {
    pub user_id: UserId,
    pub username: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FriendRequestNotice {
    pub user_id: UserId,
    pub username: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FriendAcceptedNotice {
    pub friend_id: UserId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FriendRemovedNotice {
    pub user_id: UserId,
}

/// Inbound push frame `{type, data}`. Only `message` carries a payload the
/// reconciliation logic inspects; the other tags are pure invalidation
/// signals.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum PushEvent {
    Message(Message),
    FriendRequest(FriendRequestNotice),
    FriendAccepted(FriendAcceptedNotice),
    FriendRemoved(FriendRemovedNotice),
}
