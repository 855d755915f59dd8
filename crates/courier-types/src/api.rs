use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

use crate::models::{NotificationKind, Participant, Role, TokenKind, User};

// -- JWT Claims --

/// Claims carried by both access and refresh tokens. `kind` keeps a refresh
/// token from being accepted as a bearer credential and vice versa.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub username: String,
    pub role: Role,
    pub kind: TokenKind,
    pub jti: Uuid,
    pub iat: usize,
    pub exp: usize,
}

// -- Auth --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    pub phone_number: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TokenPairResponse {
    pub access: String,
    pub refresh: String,
    pub user: User,
}

#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub refresh: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RefreshResponse {
    pub access: String,
    pub user: User,
}

#[derive(Debug, Deserialize)]
pub struct LogoutRequest {
    pub refresh: Option<String>,
}

/// Generic `{ "message": ... }` acknowledgement body.
#[derive(Debug, Serialize, Deserialize)]
pub struct StatusMessage {
    pub message: String,
}

impl StatusMessage {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into() }
    }
}

// -- Pagination --

#[derive(Debug, Serialize, Deserialize)]
pub struct Page<T> {
    pub count: u64,
    pub next: Option<String>,
    pub previous: Option<String>,
    pub results: Vec<T>,
}

// -- Conversations --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateConversationRequest {
    pub participants: Vec<Uuid>,
    pub title: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateConversationRequest {
    /// `None` when absent (keep the title), `Some(None)` for an explicit null.
    #[serde(default, deserialize_with = "present")]
    pub title: Option<Option<String>>,
}

/// Wraps a field that was present in the body, so `null` stays distinguishable
/// from a missing key.
fn present<'de, D, T>(de: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    T::deserialize(de).map(Some)
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ConversationResponse {
    pub conversation_id: i64,
    pub title: Option<String>,
    pub participants: Vec<Participant>,
    pub participant_count: usize,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ConversationDetailResponse {
    #[serde(flatten)]
    pub conversation: ConversationResponse,
    pub messages: Vec<MessageResponse>,
}

// -- Messages --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateMessageRequest {
    /// Required on `/api/messages/`, taken from the path on the nested route.
    pub conversation: Option<i64>,
    pub content: String,
    pub receiver: Option<Uuid>,
    pub parent_message: Option<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateMessageRequest {
    pub content: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReplyRequest {
    pub content: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message_id: i64,
    pub conversation: i64,
    pub sender: Participant,
    pub receiver: Option<Uuid>,
    pub parent_message_id: Option<i64>,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    pub edited: bool,
    pub edited_at: Option<DateTime<Utc>>,
    pub read: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub old_content: String,
    pub edited_by: String,
    pub edited_at: DateTime<Utc>,
}

/// One level of replies, as returned by the threaded conversation view.
#[derive(Debug, Serialize, Deserialize)]
pub struct ThreadedMessage {
    pub message_id: i64,
    pub sender: String,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    pub edited: bool,
    pub replies: Vec<ThreadedReply>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ThreadedReply {
    pub message_id: i64,
    pub sender: String,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    pub edited: bool,
    pub parent_message_id: Option<i64>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ThreadedConversationResponse {
    pub conversation_id: i64,
    pub messages: Vec<ThreadedMessage>,
}

/// A node of the fully recursive thread view.
#[derive(Debug, Serialize, Deserialize)]
pub struct ThreadNode {
    pub message_id: i64,
    pub sender: String,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    pub edited: bool,
    pub is_reply: bool,
    pub replies: Vec<ThreadNode>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ThreadResponse {
    pub thread: ThreadNode,
    pub total_messages_in_thread: usize,
}

// -- Unread --

#[derive(Debug, Serialize, Deserialize)]
pub struct UnreadMessage {
    pub message_id: i64,
    pub sender: String,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<i64>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UnreadInboxResponse {
    pub unread_count: usize,
    pub messages: Vec<UnreadMessage>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UnreadDirectResponse {
    pub unread_direct_count: usize,
    pub messages: Vec<UnreadMessage>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UnreadConversationResponse {
    pub conversation_id: i64,
    pub unread_count: usize,
    pub messages: Vec<UnreadMessage>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UnreadCountResponse {
    pub unread_count: u64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MarkReadRequest {
    #[serde(default)]
    pub message_ids: Option<Vec<i64>>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MarkReadResponse {
    pub message: String,
    pub updated_count: usize,
}

// -- Notifications --

#[derive(Debug, Serialize, Deserialize)]
pub struct NotificationResponse {
    pub id: i64,
    pub message_id: Option<i64>,
    pub notification_type: NotificationKind,
    pub title: String,
    pub content: String,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MarkAllReadResponse {
    pub updated_count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conversation_update_tells_missing_from_null() {
        let req: UpdateConversationRequest = serde_json::from_str("{}").unwrap();
        assert_eq!(req.title, None);

        let req: UpdateConversationRequest = serde_json::from_str(r#"{"title": null}"#).unwrap();
        assert_eq!(req.title, Some(None));

        let req: UpdateConversationRequest = serde_json::from_str(r#"{"title": "Plans"}"#).unwrap();
        assert_eq!(req.title, Some(Some("Plans".to_string())));

        assert!(serde_json::from_str::<UpdateConversationRequest>(r#"{"name": "x"}"#).is_err());
    }
}
