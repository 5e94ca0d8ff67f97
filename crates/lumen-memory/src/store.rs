use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use lumen_core::types::Role;

use crate::contradiction::ContradictionDetector;
use crate::error::{MemoryError, Result};
use crate::types::{cosine_similarity, decode_embedding, encode_embedding, Memory, MemoryType};

/// A memory about to be stored. Scope may be given explicitly or resolved
/// from the conversation row - one of the two must be available.
pub struct NewMemory {
    pub conversation_id: Uuid,
    pub user_id: Option<Uuid>,
    pub personality_id: Option<Uuid>,
    pub content: String,
    pub embedding: Vec<f32>,
    pub memory_type: MemoryType,
    pub importance: f32,
    pub category: Option<String>,
    pub related_entities: Vec<String>,
}

/// Persistent store for conversations, the message log, and vector-indexed
/// memories. Cosine similarity runs in-process over f32 BLOB embeddings.
///
/// Thread-safe: wraps the SQLite connection in a Mutex. The lock is never
/// held across an await - contradiction checks run between the candidate
/// fetch and the insert transaction.
pub struct VectorStore {
    db: Mutex<Connection>,
    dimension: usize,
    contradiction: ContradictionDetector,
}

impl VectorStore {
    pub fn new(conn: Connection, dimension: usize, contradiction: ContradictionDetector) -> Self {
        Self {
            db: Mutex::new(conn),
            dimension,
            contradiction,
        }
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Idempotent conversation create.
    #[instrument(skip(self))]
    pub fn ensure_conversation(
        &self,
        conversation_id: Uuid,
        user_id: Uuid,
        personality_id: Uuid,
    ) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        let db = self.db.lock().unwrap();
        db.execute(
            "INSERT OR IGNORE INTO conversations
             (id, user_id, personality_id, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?4)",
            rusqlite::params![
                conversation_id.to_string(),
                user_id.to_string(),
                personality_id.to_string(),
                now
            ],
        )?;
        Ok(())
    }

    /// The `(user, personality)` pair a conversation belongs to.
    pub fn conversation_scope(&self, conversation_id: Uuid) -> Result<Option<(Uuid, Uuid)>> {
        let db = self.db.lock().unwrap();
        match db.query_row(
            "SELECT user_id, personality_id FROM conversations WHERE id = ?1",
            rusqlite::params![conversation_id.to_string()],
            |row| {
                let user: String = row.get(0)?;
                let personality: String = row.get(1)?;
                Ok((user, personality))
            },
        ) {
            Ok((u, p)) => Ok(Some((parse_uuid(&u)?, parse_uuid(&p)?))),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(MemoryError::Database(e)),
        }
    }

    /// Conversations for a user, most recently updated first.
    pub fn list_conversations(&self, user_id: Uuid, limit: usize) -> Result<Vec<(Uuid, Uuid, Option<String>, DateTime<Utc>)>> {
        let db = self.db.lock().unwrap();
        let mut stmt = db.prepare(
            "SELECT id, personality_id, title, updated_at FROM conversations
             WHERE user_id = ?1 ORDER BY updated_at DESC LIMIT ?2",
        )?;
        let rows = stmt.query_map(
            rusqlite::params![user_id.to_string(), limit as i64],
            |row| {
                let id: String = row.get(0)?;
                let personality: String = row.get(1)?;
                let title: Option<String> = row.get(2)?;
                let updated: String = row.get(3)?;
                Ok((id, personality, title, updated))
            },
        )?;
        let mut out = Vec::new();
        for row in rows.filter_map(|r| r.ok()) {
            out.push((
                parse_uuid(&row.0)?,
                parse_uuid(&row.1)?,
                row.2,
                parse_ts(&row.3),
            ));
        }
        Ok(out)
    }

    /// Append a turn to the durable message log and bump the conversation.
    pub fn log_message(&self, conversation_id: Uuid, role: Role, content: &str) -> Result<Uuid> {
        let id = Uuid::new_v4();
        let now = Utc::now().to_rfc3339();
        let db = self.db.lock().unwrap();
        db.execute(
            "INSERT INTO messages (id, conversation_id, role, content, timestamp)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            rusqlite::params![
                id.to_string(),
                conversation_id.to_string(),
                role.to_string(),
                content,
                now
            ],
        )?;
        db.execute(
            "UPDATE conversations SET updated_at = ?1 WHERE id = ?2",
            rusqlite::params![now, conversation_id.to_string()],
        )?;
        Ok(id)
    }

    /// Store a memory. Runs the contradiction check for preference/fact
    /// types and commits the insert together with any supersedence flip.
    #[instrument(skip(self, memory), fields(conversation_id = %memory.conversation_id, memory_type = %memory.memory_type))]
    pub async fn store(&self, memory: NewMemory) -> Result<Uuid> {
        if memory.embedding.len() != self.dimension {
            return Err(MemoryError::DimensionMismatch {
                got: memory.embedding.len(),
                expected: self.dimension,
            });
        }
        if !(0.0..=1.0).contains(&memory.importance) {
            return Err(MemoryError::Storage(format!(
                "importance out of range: {}",
                memory.importance
            )));
        }

        // Resolve scope: explicit ids win, otherwise the conversation row.
        let (user_id, personality_id) = match (memory.user_id, memory.personality_id) {
            (Some(u), Some(p)) => {
                self.ensure_conversation(memory.conversation_id, u, p)?;
                (u, p)
            }
            _ => self
                .conversation_scope(memory.conversation_id)?
                .ok_or(MemoryError::ConversationNotFound {
                    id: memory.conversation_id,
                })?,
        };

        // Contradiction resolution only applies to statements of record.
        let superseded = if matches!(memory.memory_type, MemoryType::Preference | MemoryType::Fact)
        {
            self.find_contradicted(user_id, personality_id, &memory)
                .await?
        } else {
            None
        };

        let id = Uuid::new_v4();
        let now = Utc::now().to_rfc3339();

        let mut db = self.db.lock().unwrap();
        let tx = db.transaction()?;
        tx.execute(
            "INSERT INTO memories
             (id, user_id, personality_id, conversation_id, content, embedding,
              memory_type, category, importance, related_entities,
              is_active, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, 1, ?11, ?11)",
            rusqlite::params![
                id.to_string(),
                user_id.to_string(),
                personality_id.to_string(),
                memory.conversation_id.to_string(),
                memory.content,
                encode_embedding(&memory.embedding),
                memory.memory_type.to_string(),
                memory.category,
                memory.importance as f64,
                serde_json::to_string(&memory.related_entities).unwrap_or_default(),
                now
            ],
        )?;

        if let Some(old_id) = superseded {
            tx.execute(
                "UPDATE memories SET is_active = 0, superseded_by = ?1, updated_at = ?2
                 WHERE id = ?3",
                rusqlite::params![id.to_string(), now, old_id.to_string()],
            )?;
            info!(%old_id, new_id = %id, "superseded contradicted memory");
        }

        tx.commit()?;
        debug!(memory_id = %id, "stored memory");
        Ok(id)
    }

    /// Find the first active same-type memory that contradicts the new one.
    /// Candidates: up to 5 same-scope memories with cosine similarity ≥ 0.7.
    async fn find_contradicted(
        &self,
        user_id: Uuid,
        personality_id: Uuid,
        memory: &NewMemory,
    ) -> Result<Option<Uuid>> {
        let candidates: Vec<(Uuid, String)> = {
            let db = self.db.lock().unwrap();
            let mut stmt = db.prepare(
                "SELECT id, content, embedding FROM memories
                 WHERE user_id = ?1 AND personality_id = ?2
                   AND memory_type = ?3 AND is_active = 1",
            )?;
            let rows = stmt.query_map(
                rusqlite::params![
                    user_id.to_string(),
                    personality_id.to_string(),
                    memory.memory_type.to_string()
                ],
                |row| {
                    let id: String = row.get(0)?;
                    let content: String = row.get(1)?;
                    let blob: Vec<u8> = row.get(2)?;
                    Ok((id, content, blob))
                },
            )?;

            let mut scored: Vec<(f32, Uuid, String)> = Vec::new();
            for row in rows.filter_map(|r| r.ok()) {
                let similarity = cosine_similarity(&memory.embedding, &decode_embedding(&row.2));
                if similarity >= 0.7 {
                    scored.push((similarity, parse_uuid(&row.0)?, row.1));
                }
            }
            scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
            scored
                .into_iter()
                .take(5)
                .map(|(_, id, content)| (id, content))
                .collect()
        };

        for (old_id, old_content) in candidates {
            if self
                .contradiction
                .is_contradictory(&old_content, &memory.content)
                .await
            {
                return Ok(Some(old_id));
            }
        }
        Ok(None)
    }

    /// Cosine-similarity search over active memories of one `(user,
    /// personality)` pair. Returned rows get their `access_count` bumped
    /// and `last_accessed` refreshed.
    #[instrument(skip(self, query_embedding))]
    pub fn search(
        &self,
        user_id: Uuid,
        personality_id: Uuid,
        query_embedding: &[f32],
        top_k: usize,
        min_similarity: f32,
    ) -> Result<Vec<Memory>> {
        if query_embedding.len() != self.dimension {
            return Err(MemoryError::DimensionMismatch {
                got: query_embedding.len(),
                expected: self.dimension,
            });
        }

        let db = self.db.lock().unwrap();
        let mut stmt = db
            .prepare(
                "SELECT id, user_id, personality_id, conversation_id, content, embedding,
                        memory_type, category, importance, related_entities,
                        access_count, last_accessed, decay_factor, is_active,
                        superseded_by, created_at, updated_at
                 FROM memories
                 WHERE user_id = ?1 AND personality_id = ?2 AND is_active = 1",
            )
            .map_err(|e| MemoryError::Retrieval(e.to_string()))?;

        let rows = stmt
            .query_map(
                rusqlite::params![user_id.to_string(), personality_id.to_string()],
                row_to_memory_with_embedding,
            )
            .map_err(|e| MemoryError::Retrieval(e.to_string()))?;

        let mut scored: Vec<Memory> = Vec::new();
        for row in rows.filter_map(|r| r.ok()) {
            let (mut memory, embedding) = row;
            let similarity = cosine_similarity(query_embedding, &embedding);
            if similarity >= min_similarity {
                memory.similarity = Some(similarity);
                scored.push(memory);
            }
        }
        scored.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        scored.truncate(top_k);

        // Observable retrieval side effect, used by decay recomputation.
        let now = Utc::now().to_rfc3339();
        for memory in &mut scored {
            db.execute(
                "UPDATE memories
                 SET access_count = access_count + 1, last_accessed = ?1
                 WHERE id = ?2",
                rusqlite::params![now, memory.id.to_string()],
            )
            .map_err(|e| MemoryError::Retrieval(e.to_string()))?;
            memory.access_count += 1;
            memory.last_accessed = Some(parse_ts(&now));
        }

        debug!(found = scored.len(), "memory search complete");
        Ok(scored)
    }

    /// Delete all memories for a conversation. Returns how many.
    pub fn clear_conversation(&self, conversation_id: Uuid) -> Result<usize> {
        let db = self.db.lock().unwrap();
        let count = db.execute(
            "DELETE FROM memories WHERE conversation_id = ?1",
            rusqlite::params![conversation_id.to_string()],
        )?;
        info!(%conversation_id, count, "cleared conversation memories");
        Ok(count)
    }

    /// Cleanup: delete memories below an importance floor.
    pub fn delete_below_importance(&self, conversation_id: Uuid, threshold: f32) -> Result<usize> {
        let db = self.db.lock().unwrap();
        let count = db.execute(
            "DELETE FROM memories WHERE conversation_id = ?1 AND importance < ?2",
            rusqlite::params![conversation_id.to_string(), threshold as f64],
        )?;
        if count > 0 {
            info!(%conversation_id, count, "deleted low-importance memories");
        }
        Ok(count)
    }

    /// Active memories for one user with embeddings, newest first, bounded.
    /// Used by the consolidation job.
    pub fn active_memories_with_embeddings(
        &self,
        user_id: Uuid,
        limit: usize,
    ) -> Result<Vec<(Memory, Vec<f32>)>> {
        let db = self.db.lock().unwrap();
        let mut stmt = db.prepare(
            "SELECT id, user_id, personality_id, conversation_id, content, embedding,
                    memory_type, category, importance, related_entities,
                    access_count, last_accessed, decay_factor, is_active,
                    superseded_by, created_at, updated_at
             FROM memories
             WHERE user_id = ?1 AND is_active = 1
             ORDER BY created_at DESC, rowid DESC
             LIMIT ?2",
        )?;
        let rows = stmt.query_map(
            rusqlite::params![user_id.to_string(), limit as i64],
            row_to_memory_with_embedding,
        )?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    /// Users with active memories, most recently written first. Bounds one
    /// consolidation run.
    pub fn users_by_memory_activity(&self, limit: usize) -> Result<Vec<Uuid>> {
        let db = self.db.lock().unwrap();
        let mut stmt = db.prepare(
            "SELECT user_id, MAX(created_at) AS latest FROM memories
             WHERE is_active = 1
             GROUP BY user_id
             ORDER BY latest DESC
             LIMIT ?1",
        )?;
        let rows = stmt.query_map(rusqlite::params![limit as i64], |row| {
            row.get::<_, String>(0)
        })?;
        let mut out = Vec::new();
        for id in rows.filter_map(|r| r.ok()) {
            out.push(parse_uuid(&id)?);
        }
        Ok(out)
    }

    /// Mark `duplicate` inactive, pointing at `keeper`. Idempotent.
    pub fn mark_superseded(&self, duplicate: Uuid, keeper: Uuid) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        let db = self.db.lock().unwrap();
        db.execute(
            "UPDATE memories SET is_active = 0, superseded_by = ?1, updated_at = ?2
             WHERE id = ?3 AND is_active = 1",
            rusqlite::params![keeper.to_string(), now, duplicate.to_string()],
        )?;
        Ok(())
    }

    /// Fetch one memory by id (tests and supersedence assertions).
    pub fn get(&self, id: Uuid) -> Result<Option<Memory>> {
        let db = self.db.lock().unwrap();
        match db.query_row(
            "SELECT id, user_id, personality_id, conversation_id, content, embedding,
                    memory_type, category, importance, related_entities,
                    access_count, last_accessed, decay_factor, is_active,
                    superseded_by, created_at, updated_at
             FROM memories WHERE id = ?1",
            rusqlite::params![id.to_string()],
            row_to_memory_with_embedding,
        ) {
            Ok((memory, _)) => Ok(Some(memory)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(MemoryError::Database(e)),
        }
    }
}

fn parse_uuid(s: &str) -> Result<Uuid> {
    Uuid::parse_str(s).map_err(|e| MemoryError::Storage(format!("malformed uuid {s}: {e}")))
}

fn parse_ts(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

type MemoryRow = (Memory, Vec<f32>);

fn row_to_memory_with_embedding(row: &rusqlite::Row<'_>) -> rusqlite::Result<MemoryRow> {
    let id: String = row.get(0)?;
    let user_id: String = row.get(1)?;
    let personality_id: String = row.get(2)?;
    let conversation_id: String = row.get(3)?;
    let blob: Vec<u8> = row.get(5)?;
    let type_str: String = row.get(6)?;
    let entities_json: Option<String> = row.get(9)?;
    let last_accessed: Option<String> = row.get(11)?;
    let superseded_by: Option<String> = row.get(14)?;
    let created_at: String = row.get(15)?;
    let updated_at: String = row.get(16)?;

    let memory = Memory {
        id: Uuid::parse_str(&id).unwrap_or_default(),
        user_id: Uuid::parse_str(&user_id).unwrap_or_default(),
        personality_id: Uuid::parse_str(&personality_id).unwrap_or_default(),
        conversation_id: Uuid::parse_str(&conversation_id).unwrap_or_default(),
        content: row.get(4)?,
        memory_type: type_str.parse().unwrap_or(MemoryType::Context),
        category: row.get(7)?,
        importance: row.get::<_, f64>(8)? as f32,
        related_entities: entities_json
            .and_then(|j| serde_json::from_str(&j).ok())
            .unwrap_or_default(),
        access_count: row.get::<_, i64>(10)? as u32,
        last_accessed: last_accessed.map(|s| parse_ts(&s)),
        decay_factor: row.get::<_, f64>(12)? as f32,
        is_active: row.get::<_, i64>(13)? != 0,
        superseded_by: superseded_by.and_then(|s| Uuid::parse_str(&s).ok()),
        created_at: parse_ts(&created_at),
        updated_at: parse_ts(&updated_at),
        similarity: None,
    };
    Ok((memory, decode_embedding(&blob)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_db;
    use lumen_core::config::DetectionMethod;

    fn test_store(dimension: usize) -> VectorStore {
        let conn = Connection::open_in_memory().expect("open sqlite");
        init_db(&conn).expect("init db");
        VectorStore::new(
            conn,
            dimension,
            ContradictionDetector::new(DetectionMethod::Pattern, None),
        )
    }

    fn new_memory(
        cid: Uuid,
        user: Uuid,
        personality: Uuid,
        content: &str,
        embedding: Vec<f32>,
        memory_type: MemoryType,
    ) -> NewMemory {
        NewMemory {
            conversation_id: cid,
            user_id: Some(user),
            personality_id: Some(personality),
            content: content.to_string(),
            embedding,
            memory_type,
            importance: 0.8,
            category: None,
            related_entities: Vec::new(),
        }
    }

    #[tokio::test]
    async fn store_then_search_returns_self() {
        let store = test_store(3);
        let (cid, user, personality) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        let embedding = vec![0.1, 0.9, 0.3];

        store
            .store(new_memory(
                cid,
                user,
                personality,
                "My favorite color is purple",
                embedding.clone(),
                MemoryType::Preference,
            ))
            .await
            .unwrap();

        let results = store.search(user, personality, &embedding, 1, 0.2).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].content, "My favorite color is purple");
        assert!(results[0].similarity.unwrap() >= 0.95);
    }

    #[tokio::test]
    async fn search_is_scoped_by_user_and_personality() {
        let store = test_store(3);
        let embedding = vec![1.0, 0.0, 0.0];
        let (user_a, user_b) = (Uuid::new_v4(), Uuid::new_v4());
        let (pers_a, pers_b) = (Uuid::new_v4(), Uuid::new_v4());

        store
            .store(new_memory(
                Uuid::new_v4(),
                user_a,
                pers_a,
                "alice fact",
                embedding.clone(),
                MemoryType::Fact,
            ))
            .await
            .unwrap();

        // Other user, same personality.
        assert!(store
            .search(user_b, pers_a, &embedding, 5, 0.0)
            .unwrap()
            .is_empty());
        // Same user, other personality.
        assert!(store
            .search(user_a, pers_b, &embedding, 5, 0.0)
            .unwrap()
            .is_empty());
        // Matching scope sees it.
        assert_eq!(store.search(user_a, pers_a, &embedding, 5, 0.0).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn contradiction_supersedes_older_memory() {
        let store = test_store(3);
        let (cid, user, personality) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        let embedding = vec![0.4, 0.4, 0.2];

        let first = store
            .store(new_memory(
                cid,
                user,
                personality,
                "I love chocolate",
                embedding.clone(),
                MemoryType::Preference,
            ))
            .await
            .unwrap();

        let second = store
            .store(new_memory(
                cid,
                user,
                personality,
                "I don't like chocolate",
                embedding.clone(),
                MemoryType::Preference,
            ))
            .await
            .unwrap();

        let old = store.get(first).unwrap().unwrap();
        assert!(!old.is_active);
        assert_eq!(old.superseded_by, Some(second));

        let results = store.search(user, personality, &embedding, 5, 0.0).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, second);
    }

    #[tokio::test]
    async fn dimension_mismatch_is_rejected() {
        let store = test_store(3);
        let err = store
            .store(new_memory(
                Uuid::new_v4(),
                Uuid::new_v4(),
                Uuid::new_v4(),
                "bad",
                vec![0.1, 0.2],
                MemoryType::Fact,
            ))
            .await
            .unwrap_err();
        assert!(matches!(err, MemoryError::DimensionMismatch { got: 2, expected: 3 }));
    }

    #[tokio::test]
    async fn store_without_scope_requires_conversation_row() {
        let store = test_store(2);
        let err = store
            .store(NewMemory {
                conversation_id: Uuid::new_v4(),
                user_id: None,
                personality_id: None,
                content: "orphan".to_string(),
                embedding: vec![0.5, 0.5],
                memory_type: MemoryType::Fact,
                importance: 0.5,
                category: None,
                related_entities: Vec::new(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, MemoryError::ConversationNotFound { .. }));
    }

    #[tokio::test]
    async fn retrieval_bumps_access_count() {
        let store = test_store(2);
        let (cid, user, personality) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        let embedding = vec![0.7, 0.7];

        let id = store
            .store(new_memory(cid, user, personality, "fact", embedding.clone(), MemoryType::Fact))
            .await
            .unwrap();

        store.search(user, personality, &embedding, 5, 0.0).unwrap();
        store.search(user, personality, &embedding, 5, 0.0).unwrap();

        let memory = store.get(id).unwrap().unwrap();
        assert_eq!(memory.access_count, 2);
        assert!(memory.last_accessed.is_some());
    }

    #[tokio::test]
    async fn ensure_conversation_is_idempotent() {
        let store = test_store(2);
        let (cid, user, personality) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        store.ensure_conversation(cid, user, personality).unwrap();
        store.ensure_conversation(cid, user, personality).unwrap();
        assert_eq!(store.conversation_scope(cid).unwrap(), Some((user, personality)));
    }

    #[tokio::test]
    async fn top_k_larger_than_population_returns_all() {
        let store = test_store(2);
        let (cid, user, personality) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        store
            .store(new_memory(cid, user, personality, "only one", vec![1.0, 0.0], MemoryType::Fact))
            .await
            .unwrap();
        let results = store.search(user, personality, &[1.0, 0.0], 10, 0.0).unwrap();
        assert_eq!(results.len(), 1);
    }
}
