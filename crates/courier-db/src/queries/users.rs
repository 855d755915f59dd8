use anyhow::Result;
use rusqlite::{Connection, Row};
use tracing::info;

use super::messages::delete_message_trees;
use super::{OptionalExt, placeholders};
use crate::{Database, now_timestamp};
use crate::models::{NewUser, UserRow};

const USER_SELECT: &str = "SELECT id, username, email, first_name, last_name, password, phone_number, role, created_at, updated_at FROM users";

impl Database {
    /// Insert a user. Returns `false` if the username or email is taken.
    pub fn create_user(&self, user: &NewUser<'_>) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let inserted = conn.execute(
                "INSERT INTO users (id, username, email, first_name, last_name, password, phone_number, role)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                rusqlite::params![
                    user.id,
                    user.username,
                    user.email,
                    user.first_name,
                    user.last_name,
                    user.password_hash,
                    user.phone_number,
                    user.role,
                ],
            );
            match inserted {
                Ok(_) => Ok(true),
                Err(rusqlite::Error::SqliteFailure(e, _))
                    if e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE =>
                {
                    Ok(false)
                }
                Err(e) => Err(e.into()),
            }
        })
    }

    pub fn get_user_by_id(&self, id: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "id", id))
    }

    pub fn get_user_by_username(&self, username: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "username", username))
    }

    pub fn get_user_by_email(&self, email: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "email", email))
    }

    /// Page through all users ordered by creation. Returns `(total, page)`.
    pub fn list_users(&self, limit: u32, offset: u64) -> Result<(u64, Vec<UserRow>)> {
        self.with_conn(|conn| {
            let total = super::count(conn, "SELECT COUNT(*) FROM users", &[])?;
            let mut stmt = conn.prepare(&format!(
                "{USER_SELECT} ORDER BY created_at ASC, username ASC LIMIT ?1 OFFSET ?2"
            ))?;
            let rows = stmt
                .query_map(rusqlite::params![limit, offset as i64], map_user)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok((total, rows))
        })
    }

    /// Return the subset of `ids` that belong to existing users.
    pub fn existing_user_ids(&self, ids: &[String]) -> Result<Vec<String>> {
        if ids.is_empty() {
            return Ok(vec![]);
        }

        self.with_conn(|conn| {
            let sql = format!("SELECT id FROM users WHERE id IN ({})", placeholders(ids.len()));
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(rusqlite::params_from_iter(ids.iter()), |row| row.get(0))?
                .collect::<std::result::Result<Vec<String>, _>>()?;
            Ok(rows)
        })
    }

    /// Delete a user. Their sent and received messages (with any replies
    /// below them), notifications, edit history and participations go with
    /// them. Revoked tokens stay blacklisted until they expire.
    pub fn delete_user(&self, id: &str) -> Result<bool> {
        let deleted = self.with_tx(|tx| {
            delete_message_trees(
                tx,
                "SELECT id FROM messages WHERE sender_id = ?1 OR receiver_id = ?1",
                [id],
            )?;
            let n = tx.execute("DELETE FROM users WHERE id = ?1", [id])?;
            Ok(n > 0)
        })?;
        if deleted {
            info!("User {} deleted", id);
        }
        Ok(deleted)
    }

    /// Change a user's role (`admin` or `user`). Returns `false` for an
    /// unknown username.
    pub fn set_user_role(&self, username: &str, role: &str) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let n = conn.execute(
                "UPDATE users SET role = ?2, updated_at = ?3 WHERE username = ?1",
                rusqlite::params![username, role, now_timestamp()],
            )?;
            Ok(n > 0)
        })
    }
}

fn query_user(conn: &Connection, column: &str, value: &str) -> Result<Option<UserRow>> {
    let mut stmt = conn.prepare(&format!("{USER_SELECT} WHERE {column} = ?1"))?;
    stmt.query_row([value], map_user).optional()
}

fn map_user(row: &Row<'_>) -> rusqlite::Result<UserRow> {
    Ok(UserRow {
        id: row.get(0)?,
        username: row.get(1)?,
        email: row.get(2)?,
        first_name: row.get(3)?,
        last_name: row.get(4)?,
        password: row.get(5)?,
        phone_number: row.get(6)?,
        role: row.get(7)?,
        created_at: row.get(8)?,
        updated_at: row.get(9)?,
    })
}

#[cfg(test)]
mod tests {
    use crate::queries::fixtures::{message, pair, reply, user};

    #[test]
    fn lookup_by_each_unique_key() {
        let (db, _) = pair();
        assert_eq!(db.get_user_by_username("alice").unwrap().unwrap().id, "alice");
        assert_eq!(db.get_user_by_email("bob@example.com").unwrap().unwrap().id, "bob");
        assert!(db.get_user_by_id("carol").unwrap().is_none());
    }

    #[test]
    fn duplicate_username_or_email_is_refused() {
        let (db, _) = pair();
        let taken = |id: &str, username: &str, email: &str| {
            db.create_user(&crate::NewUser {
                id,
                username,
                email,
                first_name: "",
                last_name: "",
                password_hash: "hash",
                phone_number: None,
                role: "user",
            })
            .unwrap()
        };
        assert!(!taken("a2", "alice", "other@example.com"));
        assert!(!taken("a3", "alice2", "alice@example.com"));
        assert!(taken("a4", "alice2", "alice2@example.com"));
    }

    #[test]
    fn existing_user_ids_filters_unknown() {
        let (db, _) = pair();
        let ids = vec!["alice".to_string(), "ghost".to_string()];
        assert_eq!(db.existing_user_ids(&ids).unwrap(), vec!["alice".to_string()]);
    }

    #[test]
    fn delete_user_cascades_to_messages_and_notifications() {
        let (db, conv) = pair();
        user(&db, "carol", "carol");
        message(&db, conv, "alice", Some("bob"), "to bob");
        let kept = message(&db, conv, "bob", None, "from bob");

        assert!(db.delete_user("alice").unwrap());

        assert!(db.messages_in_conversation(conv).unwrap().iter().all(|m| m.sender_id != "alice"));
        assert!(db.get_message(kept).unwrap().is_some());
        let (n, _) = db.notifications_for_user("bob", false, 10, 0).unwrap();
        assert_eq!(n, 0);
        assert!(!db.is_participant(conv, "alice").unwrap());
    }

    #[test]
    fn delete_user_removes_received_messages() {
        let (db, conv) = pair();
        let received = message(&db, conv, "alice", Some("bob"), "to bob");
        db.delete_user("bob").unwrap();
        assert!(db.get_message(received).unwrap().is_none());
    }

    #[test]
    fn owner_of_a_deep_reply_chain_can_be_deleted() {
        let (db, conv) = pair();
        let mut parent = message(&db, conv, "bob", None, "root");
        for _ in 0..1500 {
            parent = reply(&db, conv, "bob", parent, "again");
        }
        let answer = reply(&db, conv, "alice", parent, "alice replies at the bottom");

        assert!(db.delete_user("bob").unwrap());
        assert!(db.get_message(answer).unwrap().is_none());
        assert!(db.messages_in_conversation(conv).unwrap().is_empty());
    }

    #[test]
    fn revoked_tokens_outlive_their_user() {
        let (db, _) = pair();
        db.delete_user("alice").unwrap();
        assert!(db.revoke_token("jti-gone", "alice", i64::MAX).unwrap());
        assert!(db.is_token_revoked("jti-gone").unwrap());
    }

    #[test]
    fn role_change_is_checked() {
        let (db, _) = pair();
        assert!(db.set_user_role("alice", "admin").unwrap());
        assert_eq!(db.get_user_by_id("alice").unwrap().unwrap().role, "admin");
        assert!(!db.set_user_role("nobody", "admin").unwrap());
        // CHECK constraint rejects unknown roles
        assert!(db.set_user_role("bob", "root").is_err());
    }

    #[test]
    fn list_users_pages() {
        let (db, _) = pair();
        user(&db, "carol", "carol");
        let (total, page) = db.list_users(2, 0).unwrap();
        assert_eq!(total, 3);
        assert_eq!(page.len(), 2);
        let (_, rest) = db.list_users(2, 2).unwrap();
        assert_eq!(rest.len(), 1);
    }
}
