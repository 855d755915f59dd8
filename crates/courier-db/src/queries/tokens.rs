use anyhow::Result;

use super::OptionalExt;
use crate::Database;

impl Database {
    /// Blacklist a refresh token by its `jti`. Returns `false` if it was
    /// already revoked.
    pub fn revoke_token(&self, jti: &str, user_id: &str, expires_at: i64) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let n = conn.execute(
                "INSERT OR IGNORE INTO revoked_tokens (jti, user_id, expires_at) VALUES (?1, ?2, ?3)",
                rusqlite::params![jti, user_id, expires_at],
            )?;
            Ok(n > 0)
        })
    }

    pub fn is_token_revoked(&self, jti: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let found = conn
                .query_row("SELECT 1 FROM revoked_tokens WHERE jti = ?1", [jti], |_| Ok(()))
                .optional()?;
            Ok(found.is_some())
        })
    }

    /// Drop blacklist entries whose token has expired anyway (`expires_at`
    /// is a unix timestamp in seconds).
    pub fn purge_expired_tokens(&self, now: i64) -> Result<usize> {
        self.with_conn_mut(|conn| {
            let n = conn.execute("DELETE FROM revoked_tokens WHERE expires_at < ?1", [now])?;
            Ok(n)
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::queries::fixtures::pair;

    #[test]
    fn revoke_and_purge() {
        let (db, _) = pair();
        assert!(db.revoke_token("jti-1", "alice", 100).unwrap());
        assert!(!db.revoke_token("jti-1", "alice", 100).unwrap());
        assert!(db.revoke_token("jti-2", "alice", 300).unwrap());
        assert!(db.is_token_revoked("jti-1").unwrap());

        assert_eq!(db.purge_expired_tokens(200).unwrap(), 1);
        assert!(!db.is_token_revoked("jti-1").unwrap());
        assert!(db.is_token_revoked("jti-2").unwrap());
    }
}
