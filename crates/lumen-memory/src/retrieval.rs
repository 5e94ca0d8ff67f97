use std::sync::Arc;

use tracing::{debug, instrument};
use uuid::Uuid;

use lumen_llm::Embedder;

use crate::error::{MemoryError, Result};
use crate::store::VectorStore;
use crate::types::Memory;

/// Query-time retrieval: embed, over-fetch, re-rank, dedupe, truncate.
pub struct MemoryRetriever {
    store: Arc<VectorStore>,
    embedder: Arc<dyn Embedder>,
    top_k: usize,
    min_similarity: f32,
}

impl MemoryRetriever {
    pub fn new(
        store: Arc<VectorStore>,
        embedder: Arc<dyn Embedder>,
        top_k: usize,
        min_similarity: f32,
    ) -> Self {
        Self {
            store,
            embedder,
            top_k,
            min_similarity,
        }
    }

    /// Top-K memories relevant to the query for one `(user, personality)`.
    #[instrument(skip(self, query), fields(query_len = query.len()))]
    pub async fn retrieve_relevant(
        &self,
        user_id: Uuid,
        personality_id: Uuid,
        query: &str,
    ) -> Result<Vec<Memory>> {
        let query_embedding = self
            .embedder
            .embed(query)
            .await
            .map_err(|e| MemoryError::Retrieval(e.to_string()))?;

        // Over-fetch so re-ranking has material to work with.
        let mut memories = self.store.search(
            user_id,
            personality_id,
            &query_embedding,
            self.top_k * 2,
            self.min_similarity,
        )?;

        if memories.is_empty() {
            debug!("no relevant memories");
            return Ok(memories);
        }

        rerank(&mut memories);
        let memories = deduplicate(memories);

        let result: Vec<Memory> = memories.into_iter().take(self.top_k).collect();
        debug!(count = result.len(), "retrieved memories");
        Ok(result)
    }
}

/// Re-rank by combined score: similarity × importance.
fn rerank(memories: &mut [Memory]) {
    memories.sort_by(|a, b| {
        let score_a = a.similarity.unwrap_or(0.0) * a.importance;
        let score_b = b.similarity.unwrap_or(0.0) * b.importance;
        score_b
            .partial_cmp(&score_a)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
}

/// Drop near-identical content: case-folded exact match, or containment
/// when the shorter side is over 20 chars.
fn deduplicate(memories: Vec<Memory>) -> Vec<Memory> {
    let mut kept: Vec<Memory> = Vec::new();
    let mut seen: Vec<String> = Vec::new();

    for memory in memories {
        let content = memory.content.to_lowercase().trim().to_string();
        let duplicate = seen.iter().any(|s| {
            content == *s
                || (content.len() > 20 && (s.contains(&content) || content.contains(s.as_str())))
        });
        if !duplicate {
            seen.push(content);
            kept.push(memory);
        }
    }
    kept
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::MemoryType;
    use chrono::Utc;

    fn memory(content: &str, similarity: f32, importance: f32) -> Memory {
        Memory {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            personality_id: Uuid::new_v4(),
            conversation_id: Uuid::new_v4(),
            content: content.to_string(),
            memory_type: MemoryType::Fact,
            category: None,
            importance,
            related_entities: Vec::new(),
            access_count: 0,
            last_accessed: None,
            decay_factor: 1.0,
            is_active: true,
            superseded_by: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            similarity: Some(similarity),
        }
    }

    #[test]
    fn rerank_orders_by_combined_score() {
        // High similarity but low importance loses to the combined winner.
        let mut memories = vec![memory("a", 0.9, 0.2), memory("b", 0.6, 0.9)];
        rerank(&mut memories);
        assert_eq!(memories[0].content, "b");
    }

    #[test]
    fn dedupe_drops_exact_case_insensitive_match() {
        let memories = vec![memory("I like tea", 0.9, 0.9), memory("i like tea", 0.8, 0.9)];
        assert_eq!(deduplicate(memories).len(), 1);
    }

    #[test]
    fn dedupe_drops_contained_long_content() {
        let memories = vec![
            memory("My favorite color is purple and I love it", 0.9, 0.9),
            memory("my favorite color is purple", 0.8, 0.9),
        ];
        assert_eq!(deduplicate(memories).len(), 1);
    }

    #[test]
    fn dedupe_keeps_short_distinct_content() {
        let memories = vec![memory("tea", 0.9, 0.9), memory("teapot", 0.8, 0.9)];
        assert_eq!(deduplicate(memories).len(), 2);
    }
}
