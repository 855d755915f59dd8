use anyhow::Result;
use rusqlite::Connection;
use rusqlite::types::Value;
use tracing::debug;

use super::{MESSAGE_SELECT, map_message, placeholders};
use crate::Database;
use crate::filters::WhereClause;
use crate::models::MessageRow;

/// Unread messages addressed to `user_id` directly or posted in one of their
/// conversations, excluding their own.
fn unread_for_user_clause(user_id: &str) -> WhereClause {
    let mut w = WhereClause::new();
    w.push("m.read = ?", 0i64);
    w.push("m.sender_id != ?", user_id.to_string());
    w.push_repeated(
        "(m.receiver_id = ? OR m.conversation_id IN
            (SELECT conversation_id FROM conversation_participants WHERE user_id = ?))",
        user_id.to_string(),
    );
    w
}

fn select_unread(conn: &Connection, w: &WhereClause) -> Result<Vec<MessageRow>> {
    let sql = format!("{MESSAGE_SELECT}{} ORDER BY m.created_at DESC, m.id DESC", w.sql());
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(rusqlite::params_from_iter(w.params().iter()), map_message)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

impl Database {
    /// Every unread message for `user_id`, newest first.
    pub fn unread_for_user(&self, user_id: &str) -> Result<Vec<MessageRow>> {
        let w = unread_for_user_clause(user_id);
        self.with_conn(|conn| select_unread(conn, &w))
    }

    /// Unread messages whose receiver is `user_id`.
    pub fn unread_direct(&self, user_id: &str) -> Result<Vec<MessageRow>> {
        let mut w = WhereClause::new();
        w.push("m.receiver_id = ?", user_id.to_string());
        w.push("m.read = ?", 0i64);
        self.with_conn(|conn| select_unread(conn, &w))
    }

    /// Unread messages in one conversation that `user_id` did not send.
    pub fn unread_in_conversation(&self, user_id: &str, conversation_id: i64) -> Result<Vec<MessageRow>> {
        let mut w = WhereClause::new();
        w.push("m.conversation_id = ?", conversation_id);
        w.push("m.read = ?", 0i64);
        w.push("m.sender_id != ?", user_id.to_string());
        self.with_conn(|conn| select_unread(conn, &w))
    }

    pub fn unread_count(&self, user_id: &str) -> Result<u64> {
        let w = unread_for_user_clause(user_id);
        self.with_conn(|conn| super::count(conn, &format!("SELECT COUNT(*) FROM messages m{}", w.sql()), w.params()))
    }

    /// Mark messages from `unread_for_user` as read. With `None` or an empty
    /// list every such message is marked, otherwise only the listed ids.
    /// Returns the number of messages updated.
    pub fn mark_as_read(&self, user_id: &str, message_ids: Option<&[i64]>) -> Result<usize> {
        let w = unread_for_user_clause(user_id);
        let mut sql = format!("UPDATE messages SET read = 1 WHERE id IN (SELECT m.id FROM messages m{}", w.sql());
        let mut params: Vec<Value> = w.params().to_vec();

        if let Some(ids) = message_ids.filter(|ids| !ids.is_empty()) {
            sql.push_str(&format!(" AND m.id IN ({})", placeholders(ids.len())));
            params.extend(ids.iter().map(|&id| Value::Integer(id)));
        }
        sql.push(')');

        let updated = self.with_conn_mut(|conn| {
            Ok(conn.execute(&sql, rusqlite::params_from_iter(params.iter()))?)
        })?;
        debug!("Marked {} messages read for {}", updated, user_id);
        Ok(updated)
    }
}
