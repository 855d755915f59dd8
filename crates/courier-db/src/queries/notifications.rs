use anyhow::Result;

use crate::Database;
use crate::models::NotificationRow;

impl Database {
    /// Notifications for `user_id`, newest first. Returns `(total, page)`.
    pub fn notifications_for_user(
        &self,
        user_id: &str,
        unread_only: bool,
        limit: u32,
        offset: u64,
    ) -> Result<(u64, Vec<NotificationRow>)> {
        let unread_clause = if unread_only { " AND is_read = 0" } else { "" };

        self.with_conn(|conn| {
            let total: i64 = conn.query_row(
                &format!("SELECT COUNT(*) FROM notifications WHERE user_id = ?1{unread_clause}"),
                [user_id],
                |r| r.get(0),
            )?;

            let mut stmt = conn.prepare(&format!(
                "SELECT id, user_id, message_id, kind, title, content, is_read, created_at
                 FROM notifications
                 WHERE user_id = ?1{unread_clause}
                 ORDER BY created_at DESC, id DESC
                 LIMIT ?2 OFFSET ?3"
            ))?;
            let rows = stmt
                .query_map(rusqlite::params![user_id, limit, offset as i64], |row| {
                    Ok(NotificationRow {
                        id: row.get(0)?,
                        user_id: row.get(1)?,
                        message_id: row.get(2)?,
                        kind: row.get(3)?,
                        title: row.get(4)?,
                        content: row.get(5)?,
                        is_read: row.get(6)?,
                        created_at: row.get(7)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok((total as u64, rows))
        })
    }

    /// Mark one of `user_id`'s notifications read. Returns `false` when the
    /// notification does not exist or belongs to someone else.
    pub fn mark_notification_read(&self, user_id: &str, id: i64) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let n = conn.execute(
                "UPDATE notifications SET is_read = 1 WHERE id = ?1 AND user_id = ?2",
                rusqlite::params![id, user_id],
            )?;
            Ok(n > 0)
        })
    }

    pub fn mark_all_notifications_read(&self, user_id: &str) -> Result<usize> {
        self.with_conn_mut(|conn| {
            let n = conn.execute(
                "UPDATE notifications SET is_read = 1 WHERE user_id = ?1 AND is_read = 0",
                [user_id],
            )?;
            Ok(n)
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::queries::fixtures::{message, pair};

    #[test]
    fn mark_read_is_scoped_to_owner() {
        let (db, conv) = pair();
        message(&db, conv, "alice", Some("bob"), "one");
        message(&db, conv, "alice", Some("bob"), "two");
        let (_, rows) = db.notifications_for_user("bob", false, 10, 0).unwrap();
        let id = rows[0].id;

        assert!(!db.mark_notification_read("alice", id).unwrap());
        assert!(db.mark_notification_read("bob", id).unwrap());

        let (unread, _) = db.notifications_for_user("bob", true, 10, 0).unwrap();
        assert_eq!(unread, 1);

        assert_eq!(db.mark_all_notifications_read("bob").unwrap(), 1);
        assert_eq!(db.notifications_for_user("bob", true, 10, 0).unwrap().0, 0);
        assert_eq!(db.notifications_for_user("bob", false, 10, 0).unwrap().0, 2);
    }
}
