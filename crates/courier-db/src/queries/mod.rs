mod conversations;
mod messages;
mod notifications;
mod tokens;
mod unread;
mod users;

use anyhow::Result;
use rusqlite::Connection;
use rusqlite::types::Value;

pub(crate) use messages::{MESSAGE_SELECT, map_message};

/// Extension trait for optional query results
pub(crate) trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

pub(crate) fn count(conn: &Connection, sql: &str, params: &[Value]) -> Result<u64> {
    let n: i64 = conn.query_row(sql, rusqlite::params_from_iter(params.iter()), |r| r.get(0))?;
    Ok(n as u64)
}

/// `?, ?, ?` with `n` placeholders.
pub(crate) fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

#[cfg(test)]
pub(crate) mod fixtures {
    use crate::{Database, NewMessage, NewUser};

    pub fn user(db: &Database, id: &str, username: &str) {
        db.create_user(&NewUser {
            id,
            username,
            email: &format!("{username}@example.com"),
            first_name: "",
            last_name: "",
            password_hash: "hash",
            phone_number: None,
            role: "user",
        })
        .unwrap();
    }

    pub fn message(db: &Database, conversation_id: i64, sender: &str, receiver: Option<&str>, content: &str) -> i64 {
        db.insert_message(&NewMessage {
            conversation_id,
            sender_id: sender,
            receiver_id: receiver,
            parent_id: None,
            content,
        })
        .unwrap()
    }

    pub fn reply(db: &Database, conversation_id: i64, sender: &str, parent: i64, content: &str) -> i64 {
        db.insert_message(&NewMessage {
            conversation_id,
            sender_id: sender,
            receiver_id: None,
            parent_id: Some(parent),
            content,
        })
        .unwrap()
    }

    /// Two users, `alice` and `bob`, sharing conversation 1.
    pub fn pair() -> (Database, i64) {
        let db = Database::open_in_memory().unwrap();
        user(&db, "alice", "alice");
        user(&db, "bob", "bob");
        let conv = db
            .create_conversation(None, &["alice".to_string(), "bob".to_string()])
            .unwrap();
        (db, conv)
    }
}
