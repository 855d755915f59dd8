use anyhow::Result;
use rusqlite::Row;

use super::messages::delete_message_trees;
use super::{OptionalExt, placeholders};
use crate::filters::{ConversationFilter, WhereClause, contains_pattern};
use crate::models::{ConversationRow, ParticipantRow};
use crate::{Database, now_timestamp};

const PARTICIPANT_USERNAME_MATCH: &str = "EXISTS (SELECT 1 FROM conversation_participants fp
     JOIN users fu ON fu.id = fp.user_id
     WHERE fp.conversation_id = c.id AND fu.username LIKE ? ESCAPE '\\')";

impl Database {
    /// Create a conversation and its participant set atomically.
    pub fn create_conversation(&self, title: Option<&str>, participant_ids: &[String]) -> Result<i64> {
        self.with_tx(|tx| {
            tx.execute("INSERT INTO conversations (title) VALUES (?1)", [title])?;
            let id = tx.last_insert_rowid();

            let mut stmt = tx.prepare(
                "INSERT OR IGNORE INTO conversation_participants (conversation_id, user_id) VALUES (?1, ?2)",
            )?;
            for user_id in participant_ids {
                stmt.execute(rusqlite::params![id, user_id])?;
            }
            Ok(id)
        })
    }

    pub fn get_conversation(&self, id: i64) -> Result<Option<ConversationRow>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT c.id, c.title, c.created_at, c.updated_at FROM conversations c WHERE c.id = ?1",
                [id],
                map_conversation,
            )
            .optional()
        })
    }

    pub fn update_conversation_title(&self, id: i64, title: Option<&str>) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let n = conn.execute(
                "UPDATE conversations SET title = ?2, updated_at = ?3 WHERE id = ?1",
                rusqlite::params![id, title, now_timestamp()],
            )?;
            Ok(n > 0)
        })
    }

    pub fn delete_conversation(&self, id: i64) -> Result<bool> {
        self.with_tx(|tx| {
            delete_message_trees(tx, "SELECT id FROM messages WHERE conversation_id = ?1", [id])?;
            let n = tx.execute("DELETE FROM conversations WHERE id = ?1", [id])?;
            Ok(n > 0)
        })
    }

    pub fn is_participant(&self, conversation_id: i64, user_id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let found = conn
                .query_row(
                    "SELECT 1 FROM conversation_participants WHERE conversation_id = ?1 AND user_id = ?2",
                    rusqlite::params![conversation_id, user_id],
                    |_| Ok(()),
                )
                .optional()?;
            Ok(found.is_some())
        })
    }

    /// Batch-fetch participants for a set of conversations, ordered by username.
    pub fn participants_for(&self, conversation_ids: &[i64]) -> Result<Vec<ParticipantRow>> {
        if conversation_ids.is_empty() {
            return Ok(vec![]);
        }

        self.with_conn(|conn| {
            let sql = format!(
                "SELECT p.conversation_id, u.id, u.username, u.email
                 FROM conversation_participants p
                 JOIN users u ON u.id = p.user_id
                 WHERE p.conversation_id IN ({})
                 ORDER BY p.conversation_id, u.username",
                placeholders(conversation_ids.len())
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(rusqlite::params_from_iter(conversation_ids.iter()), |row| {
                    Ok(ParticipantRow {
                        conversation_id: row.get(0)?,
                        user_id: row.get(1)?,
                        username: row.get(2)?,
                        email: row.get(3)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Conversations `user_id` participates in, filtered and paged.
    /// Returns `(total matching, page)`.
    pub fn list_conversations(
        &self,
        user_id: &str,
        filter: &ConversationFilter,
        limit: u32,
        offset: u64,
    ) -> Result<(u64, Vec<ConversationRow>)> {
        let mut w = WhereClause::new();
        w.push(
            "c.id IN (SELECT conversation_id FROM conversation_participants WHERE user_id = ?)",
            user_id.to_string(),
        );
        if let Some(pid) = &filter.participant_id {
            w.push(
                "c.id IN (SELECT conversation_id FROM conversation_participants WHERE user_id = ?)",
                pid.clone(),
            );
        }
        if let Some(name) = &filter.participant_username {
            w.push(PARTICIPANT_USERNAME_MATCH, contains_pattern(name));
        }
        if let Some(term) = &filter.search {
            w.push(PARTICIPANT_USERNAME_MATCH, contains_pattern(term));
        }
        if let Some(after) = &filter.created_after {
            w.push("c.created_at >= ?", after.clone());
        }
        if let Some(before) = &filter.created_before {
            w.push("c.created_at <= ?", before.clone());
        }

        self.with_conn(|conn| {
            let total = super::count(
                conn,
                &format!("SELECT COUNT(*) FROM conversations c{}", w.sql()),
                w.params(),
            )?;

            let sql = format!(
                "SELECT c.id, c.title, c.created_at, c.updated_at FROM conversations c{} ORDER BY {} LIMIT ? OFFSET ?",
                w.sql(),
                filter.order.sql()
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(
                    rusqlite::params_from_iter(w.params_with_page(limit, offset)),
                    map_conversation,
                )?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok((total, rows))
        })
    }
}

fn map_conversation(row: &Row<'_>) -> rusqlite::Result<ConversationRow> {
    Ok(ConversationRow {
        id: row.get(0)?,
        title: row.get(1)?,
        created_at: row.get(2)?,
        updated_at: row.get(3)?,
    })
}

#[cfg(test)]
mod tests {
    use crate::filters::{ConversationFilter, ConversationOrder};
    use crate::queries::fixtures::{message, pair, reply, user};

    #[test]
    fn participants_are_listed_per_conversation() {
        let (db, conv) = pair();
        let rows = db.participants_for(&[conv]).unwrap();
        let names: Vec<_> = rows.iter().map(|p| p.username.as_str()).collect();
        assert_eq!(names, vec!["alice", "bob"]);
        assert!(db.is_participant(conv, "alice").unwrap());
        assert!(!db.is_participant(conv, "carol").unwrap());
    }

    #[test]
    fn list_only_returns_own_conversations() {
        let (db, conv) = pair();
        user(&db, "carol", "carol");
        let other = db
            .create_conversation(Some("carol+bob"), &["carol".into(), "bob".into()])
            .unwrap();

        let (total, rows) = db.list_conversations("alice", &ConversationFilter::default(), 20, 0).unwrap();
        assert_eq!(total, 1);
        assert_eq!(rows[0].id, conv);

        let (total, _) = db.list_conversations("bob", &ConversationFilter::default(), 20, 0).unwrap();
        assert_eq!(total, 2);

        let filter = ConversationFilter {
            participant_username: Some("CAR".into()),
            ..Default::default()
        };
        let (total, rows) = db.list_conversations("bob", &filter, 20, 0).unwrap();
        assert_eq!(total, 1);
        assert_eq!(rows[0].id, other);
    }

    #[test]
    fn new_message_bumps_updated_at_ordering() {
        let (db, first) = pair();
        let second = db
            .create_conversation(None, &["alice".into(), "bob".into()])
            .unwrap();
        std::thread::sleep(std::time::Duration::from_millis(5));
        message(&db, first, "alice", None, "bump");

        let filter = ConversationFilter {
            order: ConversationOrder::UpdatedDesc,
            ..Default::default()
        };
        let (_, rows) = db.list_conversations("alice", &filter, 20, 0).unwrap();
        assert_eq!(rows.iter().map(|c| c.id).collect::<Vec<_>>(), vec![first, second]);
    }

    #[test]
    fn delete_conversation_removes_messages() {
        let (db, conv) = pair();
        let m = message(&db, conv, "alice", None, "hi");
        let mut last = m;
        for _ in 0..1200 {
            last = reply(&db, conv, "bob", last, "deeper");
        }
        assert!(db.delete_conversation(conv).unwrap());
        assert!(db.get_message(m).unwrap().is_none());
        assert!(db.get_message(last).unwrap().is_none());
        assert!(!db.delete_conversation(conv).unwrap());
    }
}
