use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{Duration, Utc};
use rusqlite::Connection;
use tracing::{debug, instrument};
use uuid::Uuid;

use lumen_analyzers::emotion::{analyze_trend, DetectedEmotion, EmotionTrend};

use crate::error::Result;
use crate::resolver::parse_ts;
use crate::types::EmotionEntry;

/// Snippet length stored with each emotion entry.
const SNIPPET_LEN: usize = 100;

/// Persisted emotion history, one row per detection.
pub struct EmotionStore {
    db: Mutex<Connection>,
}

impl EmotionStore {
    pub fn new(conn: Connection) -> Self {
        Self {
            db: Mutex::new(conn),
        }
    }

    /// Persist one detection with a truncated message snippet.
    #[instrument(skip(self, detected, message), fields(%user_id, emotion = %detected.emotion))]
    pub fn record(
        &self,
        user_id: Uuid,
        conversation_id: Option<Uuid>,
        detected: &DetectedEmotion,
        message: &str,
    ) -> Result<Uuid> {
        let id = Uuid::new_v4();
        let now = Utc::now().to_rfc3339();
        let snippet: String = message.chars().take(SNIPPET_LEN).collect();

        let db = self.db.lock().unwrap();
        db.execute(
            "INSERT INTO emotions
             (id, user_id, conversation_id, emotion, confidence, intensity,
              indicators, message_snippet, detected_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            rusqlite::params![
                id.to_string(),
                user_id.to_string(),
                conversation_id.map(|c| c.to_string()),
                detected.emotion,
                detected.confidence as f64,
                detected.intensity,
                serde_json::to_string(&detected.indicators)?,
                snippet,
                now
            ],
        )?;
        debug!(emotion_id = %id, "recorded emotion");
        Ok(id)
    }

    /// Recent history, oldest first (the order trend analysis expects).
    pub fn history(&self, user_id: Uuid, limit: usize) -> Result<Vec<EmotionEntry>> {
        let db = self.db.lock().unwrap();
        let mut stmt = db.prepare(
            "SELECT id, user_id, conversation_id, emotion, confidence, intensity,
                    indicators, message_snippet, detected_at
             FROM emotions WHERE user_id = ?1
             ORDER BY detected_at DESC LIMIT ?2",
        )?;
        let rows = stmt.query_map(
            rusqlite::params![user_id.to_string(), limit as i64],
            row_to_entry,
        )?;
        let mut entries: Vec<EmotionEntry> = rows.filter_map(|r| r.ok()).collect();
        entries.reverse();
        Ok(entries)
    }

    /// Emotion counts over the whole history.
    pub fn statistics(&self, user_id: Uuid) -> Result<HashMap<String, usize>> {
        let db = self.db.lock().unwrap();
        let mut stmt = db.prepare(
            "SELECT emotion, COUNT(*) FROM emotions WHERE user_id = ?1 GROUP BY emotion",
        )?;
        let rows = stmt.query_map(rusqlite::params![user_id.to_string()], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as usize))
        })?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    /// Trend over the last `days` of history.
    pub fn trends(&self, user_id: Uuid, days: i64) -> Result<EmotionTrend> {
        let cutoff = (Utc::now() - Duration::days(days)).to_rfc3339();
        let db = self.db.lock().unwrap();
        let mut stmt = db.prepare(
            "SELECT emotion FROM emotions
             WHERE user_id = ?1 AND detected_at >= ?2
             ORDER BY detected_at",
        )?;
        let rows = stmt.query_map(
            rusqlite::params![user_id.to_string(), cutoff],
            |row| row.get::<_, String>(0),
        )?;
        let emotions: Vec<String> = rows.filter_map(|r| r.ok()).collect();
        Ok(analyze_trend(&emotions))
    }

    pub fn clear(&self, user_id: Uuid) -> Result<usize> {
        let db = self.db.lock().unwrap();
        let count = db.execute(
            "DELETE FROM emotions WHERE user_id = ?1",
            rusqlite::params![user_id.to_string()],
        )?;
        Ok(count)
    }
}

fn row_to_entry(row: &rusqlite::Row<'_>) -> rusqlite::Result<EmotionEntry> {
    let id: String = row.get(0)?;
    let user_id: String = row.get(1)?;
    let conversation_id: Option<String> = row.get(2)?;
    let indicators_json: String = row.get(6)?;
    let detected_at: String = row.get(8)?;
    Ok(EmotionEntry {
        id: Uuid::parse_str(&id).unwrap_or_default(),
        user_id: Uuid::parse_str(&user_id).unwrap_or_default(),
        conversation_id: conversation_id.and_then(|s| Uuid::parse_str(&s).ok()),
        emotion: row.get(3)?,
        confidence: row.get::<_, f64>(4)? as f32,
        intensity: row.get(5)?,
        indicators: serde_json::from_str(&indicators_json).unwrap_or_default(),
        message_snippet: row.get(7)?,
        detected_at: parse_ts(&detected_at),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_db;

    fn store() -> EmotionStore {
        let conn = Connection::open_in_memory().unwrap();
        init_db(&conn).unwrap();
        EmotionStore::new(conn)
    }

    fn detected(emotion: &str) -> DetectedEmotion {
        DetectedEmotion {
            emotion: emotion.to_string(),
            confidence: 0.8,
            intensity: "medium".to_string(),
            indicators: vec!["keyword".to_string()],
        }
    }

    #[test]
    fn records_and_reads_history() {
        let store = store();
        let user = Uuid::new_v4();

        store.record(user, None, &detected("happy"), "I'm happy today").unwrap();
        store.record(user, None, &detected("sad"), "now I'm sad").unwrap();

        let history = store.history(user, 10).unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].emotion, "happy");
        assert_eq!(history[1].emotion, "sad");
    }

    #[test]
    fn snippet_is_truncated() {
        let store = store();
        let user = Uuid::new_v4();
        let long = "a".repeat(300);

        store.record(user, None, &detected("happy"), &long).unwrap();
        let history = store.history(user, 1).unwrap();
        assert_eq!(history[0].message_snippet.len(), 100);
    }

    #[test]
    fn statistics_count_per_emotion() {
        let store = store();
        let user = Uuid::new_v4();
        store.record(user, None, &detected("happy"), "x").unwrap();
        store.record(user, None, &detected("happy"), "y").unwrap();
        store.record(user, None, &detected("sad"), "z").unwrap();

        let stats = store.statistics(user).unwrap();
        assert_eq!(stats.get("happy"), Some(&2));
        assert_eq!(stats.get("sad"), Some(&1));
    }

    #[test]
    fn clear_removes_history() {
        let store = store();
        let user = Uuid::new_v4();
        store.record(user, None, &detected("happy"), "x").unwrap();
        assert_eq!(store.clear(user).unwrap(), 1);
        assert!(store.history(user, 10).unwrap().is_empty());
    }
}
