use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use tracing::{debug, info, instrument};
use uuid::Uuid;

use crate::error::{PersonalityError, Result};
use crate::types::{Milestone, RelationshipState};

const MESSAGE_MILESTONES: &[u32] = &[10, 50, 100, 500, 1000];
const TIME_MILESTONES: &[(i64, &str)] = &[
    (7, "1_week"),
    (30, "1_month"),
    (90, "3_months"),
    (180, "6_months"),
    (365, "1_year"),
];

/// Relationship metrics per `(user, personality)`: message counts, a
/// slowly-growing depth score, trust, and milestone history.
pub struct RelationshipStore {
    db: Mutex<Connection>,
}

impl RelationshipStore {
    pub fn new(conn: Connection) -> Self {
        Self {
            db: Mutex::new(conn),
        }
    }

    /// Current state, creating the initial row on first contact.
    pub fn get(&self, user_id: Uuid, personality_id: Uuid) -> Result<RelationshipState> {
        if let Some(state) = self.read(user_id, personality_id)? {
            return Ok(state);
        }

        let now = Utc::now();
        let state = RelationshipState {
            user_id,
            personality_id,
            total_messages: 0,
            depth_score: 0.0,
            trust_level: 5.0,
            days_known: 0,
            first_interaction: now,
            last_interaction: now,
            milestones: Vec::new(),
            positive_reactions: 0,
            negative_reactions: 0,
        };
        let db = self.db.lock().unwrap();
        db.execute(
            "INSERT OR IGNORE INTO relationship_state
             (user_id, personality_id, first_interaction, last_interaction)
             VALUES (?1, ?2, ?3, ?3)",
            rusqlite::params![
                user_id.to_string(),
                personality_id.to_string(),
                now.to_rfc3339()
            ],
        )?;
        Ok(state)
    }

    /// Record one user message: bump counts, recompute depth, collect
    /// newly reached milestones.
    ///
    /// Depth grows slowly: ln(messages + 1) × 1.5 + days/30 +
    /// (positive − negative)/10, capped at 10.
    #[instrument(skip(self))]
    pub fn record_message(&self, user_id: Uuid, personality_id: Uuid) -> Result<RelationshipState> {
        let mut state = self.get(user_id, personality_id)?;
        let now = Utc::now();

        state.total_messages += 1;
        state.last_interaction = now;
        state.days_known = (now - state.first_interaction).num_days();

        let reactions =
            (state.positive_reactions as f32 - state.negative_reactions as f32) / 10.0;
        let depth = ((state.total_messages + 1) as f32).ln() * 1.5
            + state.days_known as f32 / 30.0
            + reactions;
        state.depth_score = depth.min(10.0);

        let new_milestones = check_milestones(&state);
        if !new_milestones.is_empty() {
            info!(
                %user_id,
                milestones = ?new_milestones.iter().map(|m| m.kind.as_str()).collect::<Vec<_>>(),
                "relationship milestones reached"
            );
            state.milestones.extend(new_milestones);
        }

        self.write(&state)?;
        debug!(total = state.total_messages, depth = state.depth_score, "relationship updated");
        Ok(state)
    }

    /// Record explicit user feedback; trust moves faster down than up.
    pub fn record_reaction(
        &self,
        user_id: Uuid,
        personality_id: Uuid,
        positive: bool,
    ) -> Result<RelationshipState> {
        let mut state = self.get(user_id, personality_id)?;
        if positive {
            state.positive_reactions += 1;
            state.trust_level = (state.trust_level + 0.1).min(10.0);
        } else {
            state.negative_reactions += 1;
            state.trust_level = (state.trust_level - 0.2).max(0.0);
        }
        self.write(&state)?;
        Ok(state)
    }

    fn read(&self, user_id: Uuid, personality_id: Uuid) -> Result<Option<RelationshipState>> {
        let db = self.db.lock().unwrap();
        match db.query_row(
            "SELECT user_id, personality_id, total_messages, depth_score, trust_level,
                    days_known, first_interaction, last_interaction, milestones,
                    positive_reactions, negative_reactions
             FROM relationship_state WHERE user_id = ?1 AND personality_id = ?2",
            rusqlite::params![user_id.to_string(), personality_id.to_string()],
            row_to_state,
        ) {
            Ok(state) => Ok(Some(state)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(PersonalityError::Database(e)),
        }
    }

    fn write(&self, state: &RelationshipState) -> Result<()> {
        let db = self.db.lock().unwrap();
        db.execute(
            "INSERT INTO relationship_state
             (user_id, personality_id, total_messages, depth_score, trust_level,
              days_known, first_interaction, last_interaction, milestones,
              positive_reactions, negative_reactions)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
             ON CONFLICT(user_id, personality_id) DO UPDATE SET
                total_messages = excluded.total_messages,
                depth_score = excluded.depth_score,
                trust_level = excluded.trust_level,
                days_known = excluded.days_known,
                last_interaction = excluded.last_interaction,
                milestones = excluded.milestones,
                positive_reactions = excluded.positive_reactions,
                negative_reactions = excluded.negative_reactions",
            rusqlite::params![
                state.user_id.to_string(),
                state.personality_id.to_string(),
                state.total_messages,
                state.depth_score as f64,
                state.trust_level as f64,
                state.days_known,
                state.first_interaction.to_rfc3339(),
                state.last_interaction.to_rfc3339(),
                serde_json::to_string(&state.milestones)?,
                state.positive_reactions,
                state.negative_reactions,
            ],
        )?;
        Ok(())
    }
}

fn check_milestones(state: &RelationshipState) -> Vec<Milestone> {
    let existing: std::collections::HashSet<&str> =
        state.milestones.iter().map(|m| m.kind.as_str()).collect();
    let mut new_milestones = Vec::new();

    for &threshold in MESSAGE_MILESTONES {
        let kind = format!("{threshold}_messages");
        if state.total_messages >= threshold && !existing.contains(kind.as_str()) {
            new_milestones.push(Milestone {
                kind,
                reached_at: Utc::now().to_rfc3339(),
                message: format!("Reached {threshold} messages together!"),
            });
        }
    }
    for &(days, kind) in TIME_MILESTONES {
        if state.days_known >= days && !existing.contains(kind) {
            new_milestones.push(Milestone {
                kind: kind.to_string(),
                reached_at: Utc::now().to_rfc3339(),
                message: format!("We've known each other for {}!", kind.replace('_', " ")),
            });
        }
    }
    new_milestones
}

fn row_to_state(row: &rusqlite::Row<'_>) -> rusqlite::Result<RelationshipState> {
    let user_id: String = row.get(0)?;
    let personality_id: String = row.get(1)?;
    let first: String = row.get(6)?;
    let last: String = row.get(7)?;
    let milestones_json: String = row.get(8)?;
    Ok(RelationshipState {
        user_id: Uuid::parse_str(&user_id).unwrap_or_default(),
        personality_id: Uuid::parse_str(&personality_id).unwrap_or_default(),
        total_messages: row.get::<_, i64>(2)? as u32,
        depth_score: row.get::<_, f64>(3)? as f32,
        trust_level: row.get::<_, f64>(4)? as f32,
        days_known: row.get(5)?,
        first_interaction: parse_ts(&first),
        last_interaction: parse_ts(&last),
        milestones: serde_json::from_str(&milestones_json).unwrap_or_default(),
        positive_reactions: row.get::<_, i64>(9)? as u32,
        negative_reactions: row.get::<_, i64>(10)? as u32,
    })
}

fn parse_ts(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_db;

    fn store() -> RelationshipStore {
        let conn = Connection::open_in_memory().unwrap();
        init_db(&conn).unwrap();
        RelationshipStore::new(conn)
    }

    #[test]
    fn first_contact_starts_neutral() {
        let store = store();
        let state = store.get(Uuid::new_v4(), Uuid::new_v4()).unwrap();
        assert_eq!(state.total_messages, 0);
        assert!((state.trust_level - 5.0).abs() < f32::EPSILON);
    }

    #[test]
    fn messages_grow_depth_monotonically() {
        let store = store();
        let (user, personality) = (Uuid::new_v4(), Uuid::new_v4());

        let mut last_depth = 0.0;
        for _ in 0..5 {
            let state = store.record_message(user, personality).unwrap();
            assert!(state.depth_score >= last_depth);
            last_depth = state.depth_score;
        }
        assert_eq!(store.get(user, personality).unwrap().total_messages, 5);
    }

    #[test]
    fn message_milestone_recorded_once() {
        let store = store();
        let (user, personality) = (Uuid::new_v4(), Uuid::new_v4());

        for _ in 0..12 {
            store.record_message(user, personality).unwrap();
        }
        let state = store.get(user, personality).unwrap();
        let count = state
            .milestones
            .iter()
            .filter(|m| m.kind == "10_messages")
            .count();
        assert_eq!(count, 1);
    }

    #[test]
    fn reactions_move_trust_asymmetrically() {
        let store = store();
        let (user, personality) = (Uuid::new_v4(), Uuid::new_v4());

        let up = store.record_reaction(user, personality, true).unwrap();
        assert!((up.trust_level - 5.1).abs() < 1e-5);
        let down = store.record_reaction(user, personality, false).unwrap();
        assert!((down.trust_level - 4.9).abs() < 1e-5);
    }

    #[test]
    fn state_is_scoped_per_personality() {
        let store = store();
        let user = Uuid::new_v4();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());

        store.record_message(user, a).unwrap();
        assert_eq!(store.get(user, a).unwrap().total_messages, 1);
        assert_eq!(store.get(user, b).unwrap().total_messages, 0);
    }
}
