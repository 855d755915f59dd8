//! Database row types. These map directly to SQLite rows and are kept apart
//! from the courier-types API models so the DB layer stays independent.

#[derive(Debug, Clone)]
pub struct UserRow {
    pub id: String,
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub password: String,
    pub phone_number: Option<String>,
    pub role: String,
    pub created_at: String,
    pub updated_at: String,
}

/// Insert payload for `Database::create_user`. `password` is already hashed.
#[derive(Debug, Clone)]
pub struct NewUser<'a> {
    pub id: &'a str,
    pub username: &'a str,
    pub email: &'a str,
    pub first_name: &'a str,
    pub last_name: &'a str,
    pub password_hash: &'a str,
    pub phone_number: Option<&'a str>,
    pub role: &'a str,
}

#[derive(Debug, Clone)]
pub struct ConversationRow {
    pub id: i64,
    pub title: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone)]
pub struct ParticipantRow {
    pub conversation_id: i64,
    pub user_id: String,
    pub username: String,
    pub email: String,
}

#[derive(Debug, Clone)]
pub struct MessageRow {
    pub id: i64,
    pub conversation_id: i64,
    pub sender_id: String,
    pub sender_username: String,
    pub sender_email: String,
    pub receiver_id: Option<String>,
    pub parent_id: Option<i64>,
    pub content: String,
    pub created_at: String,
    pub edited: bool,
    pub edited_at: Option<String>,
    pub read: bool,
}

#[derive(Debug, Clone)]
pub struct NewMessage<'a> {
    pub conversation_id: i64,
    pub sender_id: &'a str,
    pub receiver_id: Option<&'a str>,
    pub parent_id: Option<i64>,
    pub content: &'a str,
}

#[derive(Debug, Clone)]
pub struct HistoryRow {
    pub id: i64,
    pub message_id: i64,
    pub old_content: String,
    pub edited_by: String,
    pub edited_by_username: String,
    pub edited_at: String,
}

#[derive(Debug, Clone)]
pub struct NotificationRow {
    pub id: i64,
    pub user_id: String,
    pub message_id: Option<i64>,
    pub kind: String,
    pub title: String,
    pub content: String,
    pub is_read: bool,
    pub created_at: String,
}
