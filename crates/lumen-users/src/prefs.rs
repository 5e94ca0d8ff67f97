use std::sync::Mutex;

use chrono::Utc;
use rusqlite::Connection;
use tracing::{debug, instrument};
use uuid::Uuid;

use lumen_analyzers::preference::{CommunicationPreferences, PreferenceExtractor};

use crate::error::{Result, UserError};

/// Stored communication preferences, merged from per-message detections.
pub struct PreferenceStore {
    db: Mutex<Connection>,
}

impl PreferenceStore {
    pub fn new(conn: Connection) -> Self {
        Self {
            db: Mutex::new(conn),
        }
    }

    pub fn get(&self, user_id: Uuid) -> Result<CommunicationPreferences> {
        let db = self.db.lock().unwrap();
        match db.query_row(
            "SELECT language, formality, tone, emoji_usage, response_length, explanation_style
             FROM user_preferences WHERE user_id = ?1",
            rusqlite::params![user_id.to_string()],
            |row| {
                Ok(CommunicationPreferences {
                    language: row.get(0)?,
                    formality: row.get(1)?,
                    tone: row.get(2)?,
                    emoji_usage: row.get::<_, Option<i64>>(3)?.map(|v| v != 0),
                    response_length: row.get(4)?,
                    explanation_style: row.get(5)?,
                })
            },
        ) {
            Ok(prefs) => Ok(prefs),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(CommunicationPreferences::default()),
            Err(e) => Err(UserError::Database(e)),
        }
    }

    /// Detect preference directives in a message and merge them into the
    /// stored set. Returns the updated preferences, or `None` when the
    /// message carried nothing new (no write happens in that case).
    #[instrument(skip(self, message))]
    pub fn extract_and_update(
        &self,
        user_id: Uuid,
        message: &str,
    ) -> Result<Option<CommunicationPreferences>> {
        let Some(detected) = PreferenceExtractor::extract(message) else {
            return Ok(None);
        };

        let mut stored = self.get(user_id)?;
        if !stored.merge_from(&detected) {
            debug!(%user_id, "detected preferences match stored values, skipping write");
            return Ok(None);
        }

        self.put(user_id, &stored)?;
        debug!(%user_id, "updated communication preferences");
        Ok(Some(stored))
    }

    pub fn put(&self, user_id: Uuid, prefs: &CommunicationPreferences) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        let db = self.db.lock().unwrap();
        db.execute(
            "INSERT INTO user_preferences
             (user_id, language, formality, tone, emoji_usage, response_length, explanation_style, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             ON CONFLICT(user_id) DO UPDATE SET
                language = excluded.language,
                formality = excluded.formality,
                tone = excluded.tone,
                emoji_usage = excluded.emoji_usage,
                response_length = excluded.response_length,
                explanation_style = excluded.explanation_style,
                updated_at = excluded.updated_at",
            rusqlite::params![
                user_id.to_string(),
                prefs.language,
                prefs.formality,
                prefs.tone,
                prefs.emoji_usage.map(|v| v as i64),
                prefs.response_length,
                prefs.explanation_style,
                now
            ],
        )?;
        Ok(())
    }

    pub fn clear(&self, user_id: Uuid) -> Result<()> {
        let db = self.db.lock().unwrap();
        db.execute(
            "DELETE FROM user_preferences WHERE user_id = ?1",
            rusqlite::params![user_id.to_string()],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_db;

    fn store() -> PreferenceStore {
        let conn = Connection::open_in_memory().unwrap();
        init_db(&conn).unwrap();
        PreferenceStore::new(conn)
    }

    #[test]
    fn detection_updates_stored_preferences() {
        let store = store();
        let user = Uuid::new_v4();

        let updated = store
            .extract_and_update(user, "please be more casual with me")
            .unwrap()
            .unwrap();
        assert_eq!(updated.formality.as_deref(), Some("casual"));

        let stored = store.get(user).unwrap();
        assert_eq!(stored.formality.as_deref(), Some("casual"));
    }

    #[test]
    fn unchanged_detection_skips_write() {
        let store = store();
        let user = Uuid::new_v4();

        store
            .extract_and_update(user, "be more casual")
            .unwrap()
            .unwrap();
        // Same directive again: nothing changed, no write.
        assert!(store.extract_and_update(user, "be more casual").unwrap().is_none());
    }

    #[test]
    fn merge_preserves_other_fields() {
        let store = store();
        let user = Uuid::new_v4();

        store.extract_and_update(user, "be more casual").unwrap();
        store.extract_and_update(user, "keep it short").unwrap();

        let stored = store.get(user).unwrap();
        assert_eq!(stored.formality.as_deref(), Some("casual"));
        assert_eq!(stored.response_length.as_deref(), Some("brief"));
    }

    #[test]
    fn clear_resets_to_defaults() {
        let store = store();
        let user = Uuid::new_v4();

        store.extract_and_update(user, "no emojis please").unwrap();
        store.clear(user).unwrap();
        assert!(store.get(user).unwrap().is_empty());
    }
}
