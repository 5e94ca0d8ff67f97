use std::sync::Mutex;

use chrono::Utc;
use rusqlite::Connection;
use tracing::{debug, info, instrument};
use uuid::Uuid;

use lumen_analyzers::goal::{DetectedGoal, GoalDetector};

use crate::error::{Result, UserError};
use crate::resolver::parse_ts;
use crate::types::{Goal, GoalProgressEntry, GoalStatus, GoalTrackingOutcome};

/// Persisted goal tracking: goal rows plus an append-only progress log.
pub struct GoalStore {
    db: Mutex<Connection>,
}

impl GoalStore {
    pub fn new(conn: Connection) -> Self {
        Self {
            db: Mutex::new(conn),
        }
    }

    #[instrument(skip(self, detected), fields(%user_id, title = %detected.title))]
    pub fn create(&self, user_id: Uuid, detected: &DetectedGoal) -> Result<Goal> {
        let id = Uuid::new_v4();
        let now = Utc::now().to_rfc3339();
        let db = self.db.lock().unwrap();
        db.execute(
            "INSERT INTO goals
             (id, user_id, title, category, status, progress, motivation,
              mention_count, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, 'active', 0, ?5, 1, ?6, ?6)",
            rusqlite::params![
                id.to_string(),
                user_id.to_string(),
                detected.title,
                detected.category,
                detected.motivation,
                now
            ],
        )?;
        drop(db);

        info!(goal_id = %id, "created goal");
        self.get(id)?.ok_or(UserError::GoalNotFound { id })
    }

    pub fn get(&self, id: Uuid) -> Result<Option<Goal>> {
        let db = self.db.lock().unwrap();
        match db.query_row(
            &format!("{GOAL_SELECT} WHERE id = ?1"),
            rusqlite::params![id.to_string()],
            row_to_goal,
        ) {
            Ok(goal) => Ok(Some(goal)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(UserError::Database(e)),
        }
    }

    /// Goals for a user; active only unless `include_completed`.
    pub fn list(&self, user_id: Uuid, include_completed: bool) -> Result<Vec<Goal>> {
        let db = self.db.lock().unwrap();
        let sql = if include_completed {
            format!("{GOAL_SELECT} WHERE user_id = ?1 ORDER BY updated_at DESC")
        } else {
            format!("{GOAL_SELECT} WHERE user_id = ?1 AND status = 'active' ORDER BY updated_at DESC")
        };
        let mut stmt = db.prepare(&sql)?;
        let rows = stmt.query_map(rusqlite::params![user_id.to_string()], row_to_goal)?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    pub fn set_status(&self, id: Uuid, status: GoalStatus) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        let completed_at = matches!(status, GoalStatus::Completed).then(|| now.clone());
        let db = self.db.lock().unwrap();
        let changed = db.execute(
            "UPDATE goals SET status = ?1, completed_at = COALESCE(?2, completed_at),
                    progress = CASE WHEN ?1 = 'completed' THEN 100 ELSE progress END,
                    updated_at = ?3
             WHERE id = ?4",
            rusqlite::params![status.to_string(), completed_at, now, id.to_string()],
        )?;
        if changed == 0 {
            return Err(UserError::GoalNotFound { id });
        }
        Ok(())
    }

    pub fn set_progress(&self, id: Uuid, progress: f32) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        let db = self.db.lock().unwrap();
        let changed = db.execute(
            "UPDATE goals SET progress = ?1, updated_at = ?2 WHERE id = ?3",
            rusqlite::params![progress.clamp(0.0, 100.0) as f64, now, id.to_string()],
        )?;
        if changed == 0 {
            return Err(UserError::GoalNotFound { id });
        }
        Ok(())
    }

    pub fn delete(&self, id: Uuid) -> Result<()> {
        let db = self.db.lock().unwrap();
        db.execute("DELETE FROM goal_progress WHERE goal_id = ?1", rusqlite::params![id.to_string()])?;
        let changed = db.execute("DELETE FROM goals WHERE id = ?1", rusqlite::params![id.to_string()])?;
        if changed == 0 {
            return Err(UserError::GoalNotFound { id });
        }
        Ok(())
    }

    /// Append one progress-log event and bump the goal's mention stats.
    fn record_progress(
        &self,
        goal: &Goal,
        kind: &str,
        sentiment: Option<&str>,
        emotion: Option<&str>,
        content: &str,
        conversation_id: Option<Uuid>,
    ) -> Result<GoalProgressEntry> {
        let id = Uuid::new_v4();
        let now = Utc::now().to_rfc3339();
        let db = self.db.lock().unwrap();
        db.execute(
            "INSERT INTO goal_progress
             (id, goal_id, user_id, kind, content, sentiment, emotion, conversation_id, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            rusqlite::params![
                id.to_string(),
                goal.id.to_string(),
                goal.user_id.to_string(),
                kind,
                content,
                sentiment,
                emotion,
                conversation_id.map(|c| c.to_string()),
                now
            ],
        )?;
        db.execute(
            "UPDATE goals SET mention_count = mention_count + 1,
                    last_mentioned_at = ?1, updated_at = ?1
             WHERE id = ?2",
            rusqlite::params![now, goal.id.to_string()],
        )?;

        Ok(GoalProgressEntry {
            id,
            goal_id: goal.id,
            user_id: goal.user_id,
            kind: kind.to_string(),
            content: content.to_string(),
            sentiment: sentiment.map(String::from),
            emotion: emotion.map(String::from),
            conversation_id,
            created_at: Utc::now(),
        })
    }

    pub fn progress_log(&self, goal_id: Uuid, limit: usize) -> Result<Vec<GoalProgressEntry>> {
        let db = self.db.lock().unwrap();
        let mut stmt = db.prepare(
            "SELECT id, goal_id, user_id, kind, content, sentiment, emotion,
                    conversation_id, created_at
             FROM goal_progress WHERE goal_id = ?1
             ORDER BY created_at DESC LIMIT ?2",
        )?;
        let rows = stmt.query_map(
            rusqlite::params![goal_id.to_string(), limit as i64],
            row_to_progress,
        )?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    /// Post-response goal tracking: new declarations, progress/setback
    /// mentions, and completions, all against the user's active goals.
    #[instrument(skip(self, detector, message), fields(%user_id))]
    pub async fn detect_and_track(
        &self,
        detector: &GoalDetector,
        user_id: Uuid,
        message: &str,
        conversation_id: Option<Uuid>,
        detected_emotion: Option<&str>,
    ) -> Result<GoalTrackingOutcome> {
        let mut outcome = GoalTrackingOutcome::default();
        let active = self.list(user_id, false)?;
        let titles: Vec<String> = active.iter().map(|g| g.title.clone()).collect();

        // New declarations need high confidence; re-declaring an existing
        // goal counts as a mention, not a new row.
        if let Some(detected) = detector.detect_goal(message).await {
            let already_tracked = !GoalDetector::detect_progress_mentions(&detected.title, &titles)
                .is_empty();
            if detected.confidence > 0.7 && !already_tracked {
                let goal = self.create(user_id, &detected)?;
                debug!(goal_id = %goal.id, "tracked new goal");
                outcome.new_goals.push(goal);
            }
        }

        let mentions = GoalDetector::detect_progress_mentions(message, &titles);
        for mention in mentions {
            let goal = &active[mention.goal_index];
            let entry = self.record_progress(
                goal,
                &mention.progress_type,
                Some(&mention.sentiment),
                detected_emotion,
                message,
                conversation_id,
            )?;

            if mention.progress_type == "completion" {
                self.set_status(goal.id, GoalStatus::Completed)?;
                outcome.completions.push(goal.title.clone());
            }
            outcome.progress_updates.push(entry);
        }

        Ok(outcome)
    }

    /// Aggregate counts for the analytics endpoint.
    pub fn analytics(&self, user_id: Uuid) -> Result<serde_json::Value> {
        let goals = self.list(user_id, true)?;
        let total = goals.len();
        let active = goals.iter().filter(|g| g.status == GoalStatus::Active).count();
        let completed = goals
            .iter()
            .filter(|g| g.status == GoalStatus::Completed)
            .count();
        let avg_progress = if goals.is_empty() {
            0.0
        } else {
            goals.iter().map(|g| g.progress).sum::<f32>() / goals.len() as f32
        };

        let mut by_category: std::collections::HashMap<&str, usize> =
            std::collections::HashMap::new();
        for goal in &goals {
            *by_category.entry(goal.category.as_str()).or_default() += 1;
        }

        Ok(serde_json::json!({
            "total": total,
            "active": active,
            "completed": completed,
            "average_progress": avg_progress,
            "by_category": by_category,
        }))
    }
}

const GOAL_SELECT: &str = "SELECT id, user_id, title, description, category, status, progress,
        target_date, completed_at, last_mentioned_at, mention_count, motivation,
        obstacles, milestones, progress_notes, created_at, updated_at
 FROM goals";

fn row_to_goal(row: &rusqlite::Row<'_>) -> rusqlite::Result<Goal> {
    let id: String = row.get(0)?;
    let user_id: String = row.get(1)?;
    let status: String = row.get(5)?;
    let target_date: Option<String> = row.get(7)?;
    let completed_at: Option<String> = row.get(8)?;
    let last_mentioned_at: Option<String> = row.get(9)?;
    let obstacles: String = row.get(12)?;
    let milestones: String = row.get(13)?;
    let progress_notes: String = row.get(14)?;
    let created_at: String = row.get(15)?;
    let updated_at: String = row.get(16)?;

    Ok(Goal {
        id: Uuid::parse_str(&id).unwrap_or_default(),
        user_id: Uuid::parse_str(&user_id).unwrap_or_default(),
        title: row.get(2)?,
        description: row.get(3)?,
        category: row.get(4)?,
        status: status.parse().unwrap_or(GoalStatus::Active),
        progress: row.get::<_, f64>(6)? as f32,
        target_date: target_date.map(|s| parse_ts(&s)),
        completed_at: completed_at.map(|s| parse_ts(&s)),
        last_mentioned_at: last_mentioned_at.map(|s| parse_ts(&s)),
        mention_count: row.get::<_, i64>(10)? as u32,
        motivation: row.get(11)?,
        obstacles: serde_json::from_str(&obstacles).unwrap_or_default(),
        milestones: serde_json::from_str(&milestones).unwrap_or_default(),
        progress_notes: serde_json::from_str(&progress_notes).unwrap_or_default(),
        created_at: parse_ts(&created_at),
        updated_at: parse_ts(&updated_at),
    })
}

fn row_to_progress(row: &rusqlite::Row<'_>) -> rusqlite::Result<GoalProgressEntry> {
    let id: String = row.get(0)?;
    let goal_id: String = row.get(1)?;
    let user_id: String = row.get(2)?;
    let conversation_id: Option<String> = row.get(7)?;
    let created_at: String = row.get(8)?;
    Ok(GoalProgressEntry {
        id: Uuid::parse_str(&id).unwrap_or_default(),
        goal_id: Uuid::parse_str(&goal_id).unwrap_or_default(),
        user_id: Uuid::parse_str(&user_id).unwrap_or_default(),
        kind: row.get(3)?,
        content: row.get(4)?,
        sentiment: row.get(5)?,
        emotion: row.get(6)?,
        conversation_id: conversation_id.and_then(|s| Uuid::parse_str(&s).ok()),
        created_at: parse_ts(&created_at),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_db;
    use lumen_core::config::DetectionMethod;

    fn store() -> GoalStore {
        let conn = Connection::open_in_memory().unwrap();
        init_db(&conn).unwrap();
        GoalStore::new(conn)
    }

    fn detector() -> GoalDetector {
        GoalDetector::new(DetectionMethod::Pattern, None)
    }

    #[tokio::test]
    async fn declaration_creates_a_goal() {
        let store = store();
        let user = Uuid::new_v4();

        let outcome = store
            .detect_and_track(&detector(), user, "I want to learn Spanish this year", None, None)
            .await
            .unwrap();
        assert_eq!(outcome.new_goals.len(), 1);
        assert_eq!(outcome.new_goals[0].category, "learning");

        let goals = store.list(user, false).unwrap();
        assert_eq!(goals.len(), 1);
    }

    #[tokio::test]
    async fn mention_records_progress_not_duplicate() {
        let store = store();
        let user = Uuid::new_v4();

        store
            .detect_and_track(&detector(), user, "I want to learn Spanish this year", None, None)
            .await
            .unwrap();
        let outcome = store
            .detect_and_track(
                &detector(),
                user,
                "I practiced spanish this year and made great progress",
                None,
                None,
            )
            .await
            .unwrap();

        assert!(outcome.new_goals.is_empty());
        assert_eq!(outcome.progress_updates.len(), 1);
        assert_eq!(outcome.progress_updates[0].sentiment.as_deref(), Some("positive"));

        let goals = store.list(user, false).unwrap();
        assert_eq!(goals.len(), 1);
        assert_eq!(goals[0].mention_count, 2);
    }

    #[tokio::test]
    async fn completion_mention_closes_the_goal() {
        let store = store();
        let user = Uuid::new_v4();

        store
            .detect_and_track(&detector(), user, "I want to learn Spanish this year", None, None)
            .await
            .unwrap();
        let outcome = store
            .detect_and_track(
                &detector(),
                user,
                "I finally completed my spanish goal this year",
                None,
                None,
            )
            .await
            .unwrap();

        assert_eq!(outcome.completions.len(), 1);
        let goals = store.list(user, true).unwrap();
        assert_eq!(goals[0].status, GoalStatus::Completed);
        assert!((goals[0].progress - 100.0).abs() < f32::EPSILON);
    }

    #[tokio::test]
    async fn plain_chat_tracks_nothing() {
        let store = store();
        let user = Uuid::new_v4();
        let outcome = store
            .detect_and_track(&detector(), user, "nice weather today", None, None)
            .await
            .unwrap();
        assert!(outcome.new_goals.is_empty());
        assert!(outcome.progress_updates.is_empty());
    }

    #[test]
    fn analytics_aggregates_counts() {
        let store = store();
        let user = Uuid::new_v4();
        let detected = DetectedGoal {
            title: "Run a marathon".to_string(),
            category: "health".to_string(),
            confidence: 0.9,
            motivation: None,
        };
        let goal = store.create(user, &detected).unwrap();
        store.set_status(goal.id, GoalStatus::Completed).unwrap();

        let analytics = store.analytics(user).unwrap();
        assert_eq!(analytics["total"], 1);
        assert_eq!(analytics["completed"], 1);
    }
}
