//! Side effects that accompany message writes. Each hook runs on the
//! connection of the enclosing transaction, so it commits or rolls back
//! together with the write that triggered it.
//!
//! User deletion needs no hook: every table referencing `users` cascades.

use anyhow::Result;
use courier_types::models::NotificationKind;
use rusqlite::Connection;
use tracing::debug;

use crate::models::NewMessage;
use crate::now_timestamp;

/// Notify the receiver of a newly created direct message. Returns the new
/// notification id, or `None` when there is no receiver or the sender wrote
/// to themselves.
pub(crate) fn on_message_created(
    conn: &Connection,
    message_id: i64,
    message: &NewMessage<'_>,
) -> Result<Option<i64>> {
    let Some(receiver_id) = message.receiver_id else {
        return Ok(None);
    };
    if receiver_id == message.sender_id {
        return Ok(None);
    }

    let sender: String = conn.query_row(
        "SELECT username FROM users WHERE id = ?1",
        [message.sender_id],
        |row| row.get(0),
    )?;

    conn.execute(
        "INSERT INTO notifications (user_id, message_id, kind, title, content)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        rusqlite::params![
            receiver_id,
            message_id,
            NotificationKind::Message.as_str(),
            format!("New Message from {sender}"),
            format!(
                "{sender} sent you a message in Conversation {}",
                message.conversation_id
            ),
        ],
    )?;

    let id = conn.last_insert_rowid();
    debug!("Notification {} created for {} (message {})", id, receiver_id, message_id);
    Ok(Some(id))
}

/// Record the previous content of an edited message and flag it as edited.
/// Returns `false` without touching anything when the content is unchanged.
pub(crate) fn on_message_edited(
    conn: &Connection,
    message_id: i64,
    old_content: &str,
    new_content: &str,
    editor_id: &str,
) -> Result<bool> {
    if old_content == new_content {
        return Ok(false);
    }

    let now = now_timestamp();
    conn.execute(
        "INSERT INTO message_history (message_id, old_content, edited_by, edited_at)
         VALUES (?1, ?2, ?3, ?4)",
        rusqlite::params![message_id, old_content, editor_id, now],
    )?;
    conn.execute(
        "UPDATE messages SET edited = 1, edited_at = ?2 WHERE id = ?1",
        rusqlite::params![message_id, now],
    )?;

    Ok(true)
}
