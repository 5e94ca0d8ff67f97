use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::Result;
use crate::store::VectorStore;
use crate::types::{cosine_similarity, Memory};

/// Per-memory neighbor cap in the semantic pass.
const SEMANTIC_NEIGHBORS: usize = 3;

#[derive(Debug, Default, Clone, Copy)]
pub struct ConsolidationStats {
    pub users_processed: usize,
    pub exact_inactivated: usize,
    pub semantic_inactivated: usize,
}

/// Batched duplicate resolution across a user's memories.
///
/// Never deletes rows - duplicates are marked inactive pointing at their
/// keeper, which makes every pass idempotent: a second run over the same
/// data inactivates nothing.
pub struct Consolidator {
    store: Arc<VectorStore>,
    max_users_per_run: usize,
    max_memories_per_user: usize,
    semantic_threshold: f32,
}

impl Consolidator {
    pub fn new(
        store: Arc<VectorStore>,
        max_users_per_run: usize,
        max_memories_per_user: usize,
        semantic_threshold: f32,
    ) -> Self {
        Self {
            store,
            max_users_per_run,
            max_memories_per_user,
            semantic_threshold,
        }
    }

    /// One bounded pass over the most recently active users.
    pub fn run_once(&self) -> Result<ConsolidationStats> {
        let users = self.store.users_by_memory_activity(self.max_users_per_run)?;
        let mut stats = ConsolidationStats::default();

        for user_id in users {
            match self.consolidate_user(user_id) {
                Ok((exact, semantic)) => {
                    stats.users_processed += 1;
                    stats.exact_inactivated += exact;
                    stats.semantic_inactivated += semantic;
                }
                Err(e) => warn!(%user_id, error = %e, "consolidation failed for user"),
            }
        }

        info!(
            users = stats.users_processed,
            exact = stats.exact_inactivated,
            semantic = stats.semantic_inactivated,
            "consolidation run complete"
        );
        Ok(stats)
    }

    fn consolidate_user(&self, user_id: Uuid) -> Result<(usize, usize)> {
        let exact = self.exact_pass(user_id)?;
        let semantic = self.semantic_pass(user_id)?;
        Ok((exact, semantic))
    }

    /// Group by normalized content; within each group keep the newest.
    fn exact_pass(&self, user_id: Uuid) -> Result<usize> {
        let memories = self
            .store
            .active_memories_with_embeddings(user_id, self.max_memories_per_user)?;

        let mut kept: std::collections::HashMap<String, Uuid> = std::collections::HashMap::new();
        let mut inactivated = 0;

        // Rows come newest first, so the first occurrence is the keeper.
        for (memory, _) in &memories {
            let key = normalize_content(&memory.content);
            if key.is_empty() {
                continue;
            }
            match kept.get(&key) {
                None => {
                    kept.insert(key, memory.id);
                }
                Some(&keeper) => {
                    self.store.mark_superseded(memory.id, keeper)?;
                    inactivated += 1;
                }
            }
        }

        if inactivated > 0 {
            debug!(%user_id, inactivated, "exact-duplicate pass");
        }
        Ok(inactivated)
    }

    /// For each remaining memory, inactivate highly similar same-type
    /// neighbors, keeping the more important (newer on ties).
    fn semantic_pass(&self, user_id: Uuid) -> Result<usize> {
        let limit = self.max_memories_per_user.min(200);
        let memories = self.store.active_memories_with_embeddings(user_id, limit)?;

        let mut inactive: HashSet<Uuid> = HashSet::new();
        let mut inactivated = 0;

        for i in 0..memories.len() {
            let (mem, embedding) = &memories[i];
            if inactive.contains(&mem.id) {
                continue;
            }

            let mut neighbors: Vec<(f32, usize)> = Vec::new();
            for (j, (other, other_embedding)) in memories.iter().enumerate() {
                if i == j
                    || inactive.contains(&other.id)
                    || other.memory_type != mem.memory_type
                {
                    continue;
                }
                let similarity = cosine_similarity(embedding, other_embedding);
                if similarity >= self.semantic_threshold {
                    neighbors.push((similarity, j));
                }
            }
            neighbors.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));

            for (_, j) in neighbors.into_iter().take(SEMANTIC_NEIGHBORS) {
                let (other, _) = &memories[j];
                if inactive.contains(&mem.id) || inactive.contains(&other.id) {
                    continue;
                }
                let (keeper, duplicate) = pick_keeper(mem, other);
                self.store.mark_superseded(duplicate, keeper)?;
                inactive.insert(duplicate);
                inactivated += 1;
            }
        }

        if inactivated > 0 {
            debug!(%user_id, inactivated, "semantic-duplicate pass");
        }
        Ok(inactivated)
    }
}

fn normalize_content(content: &str) -> String {
    content
        .trim()
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Returns (keeper, duplicate). Higher importance wins, newer on ties.
fn pick_keeper(a: &Memory, b: &Memory) -> (Uuid, Uuid) {
    if a.importance > b.importance {
        (a.id, b.id)
    } else if b.importance > a.importance {
        (b.id, a.id)
    } else if a.created_at >= b.created_at {
        (a.id, b.id)
    } else {
        (b.id, a.id)
    }
}

/// Periodic consolidation task. Runs until the process exits.
pub async fn consolidation_loop(consolidator: Arc<Consolidator>, interval_minutes: u64) {
    let interval = Duration::from_secs(interval_minutes.max(1) * 60);
    // Small startup delay so the service comes up cleanly first.
    tokio::time::sleep(Duration::from_secs(5)).await;

    loop {
        let c = Arc::clone(&consolidator);
        let result = tokio::task::spawn_blocking(move || c.run_once()).await;
        match result {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => warn!(error = %e, "consolidation run failed"),
            Err(e) => warn!(error = %e, "consolidation task panicked"),
        }
        tokio::time::sleep(interval).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contradiction::ContradictionDetector;
    use crate::db::init_db;
    use crate::store::NewMemory;
    use crate::types::MemoryType;
    use lumen_core::config::DetectionMethod;
    use rusqlite::Connection;

    fn setup() -> (Arc<VectorStore>, Uuid, Uuid, Uuid) {
        let conn = Connection::open_in_memory().unwrap();
        init_db(&conn).unwrap();
        let store = Arc::new(VectorStore::new(
            conn,
            4,
            ContradictionDetector::new(DetectionMethod::Pattern, None),
        ));
        let (cid, user, personality) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        store.ensure_conversation(cid, user, personality).unwrap();
        (store, cid, user, personality)
    }

    async fn put(
        store: &VectorStore,
        cid: Uuid,
        user: Uuid,
        personality: Uuid,
        content: &str,
        embedding: Vec<f32>,
        importance: f32,
    ) -> Uuid {
        store
            .store(NewMemory {
                conversation_id: cid,
                user_id: Some(user),
                personality_id: Some(personality),
                content: content.to_string(),
                embedding,
                memory_type: MemoryType::Event,
                importance,
                category: None,
                related_entities: Vec::new(),
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn exact_duplicates_collapse_to_newest() {
        let (store, cid, user, personality) = setup();
        let e = vec![1.0, 0.0, 0.0, 0.0];
        let first = put(&store, cid, user, personality, "Went to Paris", e.clone(), 0.5).await;
        let second = put(&store, cid, user, personality, "went to  paris", e.clone(), 0.5).await;

        let consolidator = Consolidator::new(Arc::clone(&store), 10, 100, 0.99);
        let stats = consolidator.run_once().unwrap();
        assert_eq!(stats.exact_inactivated, 1);

        // Newest-first ordering keeps the second write active.
        assert!(store.get(second).unwrap().unwrap().is_active);
        let old = store.get(first).unwrap().unwrap();
        assert!(!old.is_active);
        assert_eq!(old.superseded_by, Some(second));
    }

    #[tokio::test]
    async fn semantic_duplicates_keep_higher_importance() {
        let (store, cid, user, personality) = setup();
        let important = put(
            &store,
            cid,
            user,
            personality,
            "I ran the marathon",
            vec![0.9, 0.1, 0.0, 0.0],
            0.9,
        )
        .await;
        let minor = put(
            &store,
            cid,
            user,
            personality,
            "I ran that marathon race",
            vec![0.9, 0.11, 0.0, 0.0],
            0.4,
        )
        .await;

        let consolidator = Consolidator::new(Arc::clone(&store), 10, 100, 0.95);
        let stats = consolidator.run_once().unwrap();
        assert_eq!(stats.semantic_inactivated, 1);

        assert!(store.get(important).unwrap().unwrap().is_active);
        let dup = store.get(minor).unwrap().unwrap();
        assert!(!dup.is_active);
        assert_eq!(dup.superseded_by, Some(important));
    }

    #[tokio::test]
    async fn second_run_is_idempotent() {
        let (store, cid, user, personality) = setup();
        let e = vec![0.5, 0.5, 0.0, 0.0];
        put(&store, cid, user, personality, "same thing", e.clone(), 0.5).await;
        put(&store, cid, user, personality, "same thing", e.clone(), 0.5).await;

        let consolidator = Consolidator::new(Arc::clone(&store), 10, 100, 0.99);
        let first = consolidator.run_once().unwrap();
        assert_eq!(first.exact_inactivated, 1);

        let second = consolidator.run_once().unwrap();
        assert_eq!(second.exact_inactivated, 0);
        assert_eq!(second.semantic_inactivated, 0);
    }
}
