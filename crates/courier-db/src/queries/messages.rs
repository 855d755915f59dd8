use anyhow::{Result, anyhow};
use rusqlite::{Connection, Params, Row};
use tracing::debug;

use super::OptionalExt;
use crate::filters::{MessageFilter, WhereClause, contains_pattern};
use crate::hooks;
use crate::models::{HistoryRow, MessageRow, NewMessage};
use crate::{Database, now_timestamp};

// JOIN users to fetch the sender in a single query (no N+1)
pub(crate) const MESSAGE_SELECT: &str = "SELECT m.id, m.conversation_id, m.sender_id, u.username, u.email,
        m.receiver_id, m.parent_id, m.content, m.created_at, m.edited, m.edited_at, m.read
     FROM messages m
     JOIN users u ON u.id = m.sender_id";

pub(crate) fn map_message(row: &Row<'_>) -> rusqlite::Result<MessageRow> {
    Ok(MessageRow {
        id: row.get(0)?,
        conversation_id: row.get(1)?,
        sender_id: row.get(2)?,
        sender_username: row.get(3)?,
        sender_email: row.get(4)?,
        receiver_id: row.get(5)?,
        parent_id: row.get(6)?,
        content: row.get(7)?,
        created_at: row.get(8)?,
        edited: row.get(9)?,
        edited_at: row.get(10)?,
        read: row.get(11)?,
    })
}

/// Delete the messages picked by `seed` (a `SELECT id FROM messages ...`)
/// together with every reply below them. Rows go leaf first so the
/// `parent_id` cascade never recurses down a long reply chain; a reply
/// always has a higher id than its parent.
pub(crate) fn delete_message_trees<P: Params>(conn: &Connection, seed: &str, params: P) -> Result<usize> {
    let ids = {
        let mut stmt = conn.prepare(&format!(
            "WITH RECURSIVE tree(id) AS (
                 {seed}
                 UNION
                 SELECT m.id FROM messages m JOIN tree ON m.parent_id = tree.id
             )
             SELECT id FROM tree ORDER BY id DESC"
        ))?;
        stmt.query_map(params, |row| row.get::<_, i64>(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?
    };

    let mut delete = conn.prepare("DELETE FROM messages WHERE id = ?1")?;
    for id in &ids {
        delete.execute([id])?;
    }
    Ok(ids.len())
}

impl Database {
    /// Insert a message, bump the conversation's `updated_at` and run the
    /// creation hook, all in one transaction. Returns the new message id.
    pub fn insert_message(&self, message: &NewMessage<'_>) -> Result<i64> {
        self.with_tx(|tx| {
            let now = now_timestamp();
            tx.execute(
                "INSERT INTO messages (conversation_id, sender_id, receiver_id, parent_id, content, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                rusqlite::params![
                    message.conversation_id,
                    message.sender_id,
                    message.receiver_id,
                    message.parent_id,
                    message.content,
                    now,
                ],
            )?;
            let id = tx.last_insert_rowid();

            tx.execute(
                "UPDATE conversations SET updated_at = ?2 WHERE id = ?1",
                rusqlite::params![message.conversation_id, now],
            )?;

            hooks::on_message_created(tx, id, message)?;
            debug!("Message {} created in conversation {}", id, message.conversation_id);
            Ok(id)
        })
    }

    pub fn get_message(&self, id: i64) -> Result<Option<MessageRow>> {
        self.with_conn(|conn| {
            conn.query_row(&format!("{MESSAGE_SELECT} WHERE m.id = ?1"), [id], map_message)
                .optional()
        })
    }

    /// Replace a message's content, recording the previous content through
    /// the edit hook. Returns whether the content actually changed.
    pub fn update_message_content(&self, id: i64, content: &str, editor_id: &str) -> Result<bool> {
        self.with_tx(|tx| {
            let old: String = tx
                .query_row("SELECT content FROM messages WHERE id = ?1", [id], |row| row.get(0))
                .optional()?
                .ok_or_else(|| anyhow!("Message not found: {}", id))?;

            let changed = hooks::on_message_edited(tx, id, &old, content, editor_id)?;
            if changed {
                tx.execute(
                    "UPDATE messages SET content = ?2 WHERE id = ?1",
                    rusqlite::params![id, content],
                )?;
            }
            Ok(changed)
        })
    }

    /// Delete a message and all replies below it.
    pub fn delete_message(&self, id: i64) -> Result<bool> {
        self.with_tx(|tx| {
            let n = delete_message_trees(tx, "SELECT id FROM messages WHERE id = ?1", [id])?;
            Ok(n > 0)
        })
    }

    /// Number of ancestors above a message: 0 for a top-level message,
    /// `None` if it does not exist.
    pub fn message_depth(&self, id: i64) -> Result<Option<usize>> {
        self.with_conn(|conn| {
            let n: i64 = conn.query_row(
                "WITH RECURSIVE up(id, parent_id) AS (
                     SELECT id, parent_id FROM messages WHERE id = ?1
                     UNION
                     SELECT m.id, m.parent_id FROM messages m JOIN up ON m.id = up.parent_id
                 )
                 SELECT COUNT(*) FROM up",
                [id],
                |row| row.get(0),
            )?;
            Ok((n > 0).then(|| n as usize - 1))
        })
    }

    /// Every message in a conversation, oldest first.
    pub fn messages_in_conversation(&self, conversation_id: i64) -> Result<Vec<MessageRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "{MESSAGE_SELECT} WHERE m.conversation_id = ?1 ORDER BY m.created_at ASC, m.id ASC"
            ))?;
            let rows = stmt
                .query_map([conversation_id], map_message)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Messages visible to `user_id` (those in conversations they take part
    /// in), filtered and paged. Returns `(total matching, page)`.
    pub fn list_messages(
        &self,
        user_id: &str,
        filter: &MessageFilter,
        limit: u32,
        offset: u64,
    ) -> Result<(u64, Vec<MessageRow>)> {
        let mut w = WhereClause::new();
        w.push(
            "m.conversation_id IN (SELECT conversation_id FROM conversation_participants WHERE user_id = ?)",
            user_id.to_string(),
        );
        if let Some(cid) = filter.conversation_id {
            w.push("m.conversation_id = ?", cid);
        }
        if let Some(sid) = &filter.sender_id {
            w.push("m.sender_id = ?", sid.clone());
        }
        if let Some(name) = &filter.sender_username {
            w.push("u.username LIKE ? ESCAPE '\\'", contains_pattern(name));
        }
        if let Some(after) = &filter.sent_after {
            w.push("m.created_at >= ?", after.clone());
        }
        if let Some(before) = &filter.sent_before {
            w.push("m.created_at <= ?", before.clone());
        }
        if let Some(text) = &filter.content {
            w.push("m.content LIKE ? ESCAPE '\\'", contains_pattern(text));
        }
        if let Some(term) = &filter.search {
            w.push_repeated(
                "(m.content LIKE ? ESCAPE '\\' OR u.username LIKE ? ESCAPE '\\')",
                contains_pattern(term),
            );
        }
        let order = if filter.oldest_first {
            "m.created_at ASC, m.id ASC"
        } else {
            "m.created_at DESC, m.id DESC"
        };

        self.with_conn(|conn| {
            let total = super::count(
                conn,
                &format!(
                    "SELECT COUNT(*) FROM messages m JOIN users u ON u.id = m.sender_id{}",
                    w.sql()
                ),
                w.params(),
            )?;

            let sql = format!("{MESSAGE_SELECT}{} ORDER BY {order} LIMIT ? OFFSET ?", w.sql());
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(
                    rusqlite::params_from_iter(w.params_with_page(limit, offset)),
                    map_message,
                )?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok((total, rows))
        })
    }

    /// Edit history of a message, newest first.
    pub fn history_for_message(&self, message_id: i64) -> Result<Vec<HistoryRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT h.id, h.message_id, h.old_content, h.edited_by, u.username, h.edited_at
                 FROM message_history h
                 JOIN users u ON u.id = h.edited_by
                 WHERE h.message_id = ?1
                 ORDER BY h.edited_at DESC, h.id DESC",
            )?;
            let rows = stmt
                .query_map([message_id], |row| {
                    Ok(HistoryRow {
                        id: row.get(0)?,
                        message_id: row.get(1)?,
                        old_content: row.get(2)?,
                        edited_by: row.get(3)?,
                        edited_by_username: row.get(4)?,
                        edited_at: row.get(5)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::filters::MessageFilter;
    use crate::queries::fixtures::{message, pair, reply, user};

    #[test]
    fn direct_message_creates_one_notification() {
        let (db, conv) = pair();
        let id = message(&db, conv, "alice", Some("bob"), "Hello!");

        let (total, rows) = db.notifications_for_user("bob", false, 10, 0).unwrap();
        assert_eq!(total, 1);
        let n = &rows[0];
        assert_eq!(n.message_id, Some(id));
        assert_eq!(n.kind, "message");
        assert_eq!(n.title, "New Message from alice");
        assert_eq!(n.content, format!("alice sent you a message in Conversation {conv}"));
        assert!(!n.is_read);

        let (sender_total, _) = db.notifications_for_user("alice", false, 10, 0).unwrap();
        assert_eq!(sender_total, 0);
    }

    #[test]
    fn no_notification_without_receiver_or_to_self() {
        let (db, conv) = pair();
        message(&db, conv, "alice", None, "broadcast");
        message(&db, conv, "alice", Some("alice"), "note to self");

        assert_eq!(db.notifications_for_user("alice", false, 10, 0).unwrap().0, 0);
        assert_eq!(db.notifications_for_user("bob", false, 10, 0).unwrap().0, 0);
    }

    #[test]
    fn edit_records_history_and_sets_flag() {
        let (db, conv) = pair();
        let id = message(&db, conv, "alice", None, "first");

        assert!(db.update_message_content(id, "second", "alice").unwrap());
        assert!(db.update_message_content(id, "third", "alice").unwrap());

        let msg = db.get_message(id).unwrap().unwrap();
        assert_eq!(msg.content, "third");
        assert!(msg.edited);
        assert!(msg.edited_at.is_some());

        let history = db.history_for_message(id).unwrap();
        let old: Vec<_> = history.iter().map(|h| h.old_content.as_str()).collect();
        assert_eq!(old, vec!["second", "first"]);
        assert_eq!(history[0].edited_by_username, "alice");
    }

    #[test]
    fn unchanged_edit_is_a_noop() {
        let (db, conv) = pair();
        let id = message(&db, conv, "alice", None, "same");

        assert!(!db.update_message_content(id, "same", "alice").unwrap());
        assert!(db.history_for_message(id).unwrap().is_empty());
        assert!(!db.get_message(id).unwrap().unwrap().edited);
    }

    #[test]
    fn edit_of_missing_message_fails() {
        let (db, _) = pair();
        assert!(db.update_message_content(999, "x", "alice").is_err());
    }

    #[test]
    fn list_messages_filters_and_scopes() {
        let (db, conv) = pair();
        user(&db, "carol", "carol");
        let hidden = db
            .create_conversation(None, &["carol".into(), "bob".into()])
            .unwrap();
        message(&db, conv, "alice", None, "Hello world");
        message(&db, conv, "bob", None, "hey alice");
        message(&db, hidden, "carol", None, "secret hello");

        let (total, rows) = db.list_messages("alice", &MessageFilter::default(), 20, 0).unwrap();
        assert_eq!(total, 2);
        assert_eq!(rows[0].content, "hey alice");

        let filter = MessageFilter {
            content: Some("HELLO".into()),
            ..Default::default()
        };
        let (total, rows) = db.list_messages("alice", &filter, 20, 0).unwrap();
        assert_eq!(total, 1);
        assert_eq!(rows[0].sender_username, "alice");

        let filter = MessageFilter {
            search: Some("ali".into()),
            oldest_first: true,
            ..Default::default()
        };
        let (total, rows) = db.list_messages("alice", &filter, 20, 0).unwrap();
        assert_eq!(total, 2);
        assert_eq!(rows[0].content, "Hello world");

        let filter = MessageFilter {
            sender_username: Some("bo".into()),
            ..Default::default()
        };
        assert_eq!(db.list_messages("alice", &filter, 20, 0).unwrap().0, 1);
    }

    #[test]
    fn replies_keep_parent() {
        let (db, conv) = pair();
        let root = message(&db, conv, "alice", None, "root");
        let child = reply(&db, conv, "bob", root, "child");

        let row = db.get_message(child).unwrap().unwrap();
        assert_eq!(row.parent_id, Some(root));

        // Deleting the root takes the whole thread with it
        db.delete_message(root).unwrap();
        assert!(db.get_message(child).unwrap().is_none());
    }

    fn chain(db: &crate::Database, conv: i64, sender: &str, len: usize) -> Vec<i64> {
        let mut ids = vec![message(db, conv, sender, None, "root")];
        for i in 1..len {
            let parent = ids[i - 1];
            ids.push(reply(db, conv, sender, parent, "again"));
        }
        ids
    }

    #[test]
    fn depth_counts_ancestors() {
        let (db, conv) = pair();
        let ids = chain(&db, conv, "alice", 4);
        assert_eq!(db.message_depth(ids[0]).unwrap(), Some(0));
        assert_eq!(db.message_depth(ids[3]).unwrap(), Some(3));
        assert_eq!(db.message_depth(999).unwrap(), None);
    }

    #[test]
    fn deep_reply_chain_can_be_deleted() {
        let (db, conv) = pair();
        let ids = chain(&db, conv, "bob", 1500);

        assert!(db.delete_message(ids[0]).unwrap());
        assert!(db.messages_in_conversation(conv).unwrap().is_empty());
        assert!(!db.delete_message(ids[0]).unwrap());
    }

    #[test]
    fn deleting_a_middle_message_keeps_its_ancestors() {
        let (db, conv) = pair();
        let ids = chain(&db, conv, "alice", 5);
        db.delete_message(ids[2]).unwrap();
        let left: Vec<i64> = db.messages_in_conversation(conv).unwrap().iter().map(|m| m.id).collect();
        assert_eq!(left, ids[..2].to_vec());
    }
}
