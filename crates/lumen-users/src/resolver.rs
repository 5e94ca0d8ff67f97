use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use tracing::{debug, instrument};
use uuid::Uuid;

use lumen_core::types::User;

use crate::error::{Result, UserError};

/// Maps external identities (JWT subject, API-key owner) to first-class
/// users, creating rows on first contact.
pub struct UserStore {
    db: Mutex<Connection>,
}

impl UserStore {
    pub fn new(conn: Connection) -> Self {
        Self {
            db: Mutex::new(conn),
        }
    }

    /// Return the user for an external id, creating it if absent.
    ///
    /// Concurrent calls for the same id yield exactly one row: the insert
    /// is `OR IGNORE` and the read-back resolves whichever write won.
    #[instrument(skip(self))]
    pub fn ensure_user(&self, external_id: &str) -> Result<User> {
        let now = Utc::now().to_rfc3339();
        let id = Uuid::new_v4();

        let db = self.db.lock().unwrap();
        db.execute(
            "INSERT OR IGNORE INTO users (id, external_id, created_at, last_active)
             VALUES (?1, ?2, ?3, ?3)",
            rusqlite::params![id.to_string(), external_id, now],
        )?;
        db.execute(
            "UPDATE users SET last_active = ?1 WHERE external_id = ?2",
            rusqlite::params![now, external_id],
        )?;

        let user = db.query_row(
            "SELECT id, external_id, created_at, last_active FROM users
             WHERE external_id = ?1",
            rusqlite::params![external_id],
            row_to_user,
        )?;
        debug!(user_id = %user.id, "resolved user");
        Ok(user)
    }

    pub fn get_by_external(&self, external_id: &str) -> Result<Option<User>> {
        let db = self.db.lock().unwrap();
        match db.query_row(
            "SELECT id, external_id, created_at, last_active FROM users
             WHERE external_id = ?1",
            rusqlite::params![external_id],
            row_to_user,
        ) {
            Ok(user) => Ok(Some(user)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(UserError::Database(e)),
        }
    }

    /// Users ordered by recency of activity, bounded.
    pub fn recently_active(&self, limit: usize) -> Result<Vec<User>> {
        let db = self.db.lock().unwrap();
        let mut stmt = db.prepare(
            "SELECT id, external_id, created_at, last_active FROM users
             ORDER BY last_active DESC LIMIT ?1",
        )?;
        let rows = stmt.query_map(rusqlite::params![limit as i64], row_to_user)?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }
}

fn row_to_user(row: &rusqlite::Row<'_>) -> rusqlite::Result<User> {
    let id: String = row.get(0)?;
    let created_at: String = row.get(2)?;
    let last_active: String = row.get(3)?;
    Ok(User {
        id: Uuid::parse_str(&id).unwrap_or_default(),
        external_id: row.get(1)?,
        created_at: parse_ts(&created_at),
        last_active: parse_ts(&last_active),
    })
}

pub(crate) fn parse_ts(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_db;

    fn store() -> UserStore {
        let conn = Connection::open_in_memory().unwrap();
        init_db(&conn).unwrap();
        UserStore::new(conn)
    }

    #[test]
    fn ensure_is_idempotent() {
        let store = store();
        let first = store.ensure_user("alice").unwrap();
        let second = store.ensure_user("alice").unwrap();
        assert_eq!(first.id, second.id);
    }

    #[test]
    fn distinct_external_ids_get_distinct_users() {
        let store = store();
        let alice = store.ensure_user("alice").unwrap();
        let bob = store.ensure_user("bob").unwrap();
        assert_ne!(alice.id, bob.id);
    }

    #[test]
    fn missing_user_is_none() {
        let store = store();
        assert!(store.get_by_external("ghost").unwrap().is_none());
    }
}
