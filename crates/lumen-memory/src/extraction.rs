use std::sync::Arc;
use std::sync::LazyLock;

use regex::Regex;
use serde::Deserialize;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use lumen_analyzers::categorizer::MemoryCategorizer;
use lumen_analyzers::llm::AnalysisLlm;
use lumen_analyzers::llm_json::extract_array;
use lumen_buffer::BufferedMessage;
use lumen_core::config::DetectionMethod;
use lumen_core::types::Role;
use lumen_llm::Embedder;

use crate::error::{MemoryError, Result};
use crate::store::{NewMemory, VectorStore};
use crate::types::MemoryType;

/// Near-duplicate threshold: anything this similar is a re-statement.
const DUPLICATE_SIMILARITY: f32 = 0.95;
/// Candidates below this importance are not worth storing.
const MIN_IMPORTANCE: f32 = 0.3;
/// At most this many memories per extraction pass.
const MAX_FACTS: usize = 5;
/// Context window handed to the LLM strategy.
const WINDOW: usize = 10;

/// Surface patterns that mark a user message as worth remembering.
static IMPORTANT_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"i (don't|dont|do not|really|actually)?\s?(like|love|prefer|enjoy|hate|dislike)",
        r"my (favorite|name)",
        r"i'm (interested in|into|not interested in)",
        r"i (work|study|live) (at|in)",
        r"i am (a|an) (\w+)",
        r"i have (a|an|\d+)",
        r"(remember|reminds me)",
        r"(when i|i once|i used to)",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("invalid extraction pattern"))
    .collect()
});

/// Questions are requests for information, not facts to remember.
static QUESTION_OPENERS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(do|does|did|is|are|was|were|can|could|will|would|should|what|when|where|why|how|who)\s",
    )
    .expect("invalid question pattern")
});

static QUESTION_PHRASES: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(do you know|can you tell me|what is|what are|what do)\b")
        .expect("invalid question phrase pattern")
});

struct Candidate {
    content: String,
    memory_type: MemoryType,
    importance: f32,
    category: Option<String>,
    entities: Vec<String>,
}

/// Post-response memory extraction: turn-window → candidates → embed →
/// dedupe → store.
pub struct MemoryExtractor {
    store: Arc<VectorStore>,
    embedder: Arc<dyn Embedder>,
    llm: Option<Arc<AnalysisLlm>>,
    categorizer: MemoryCategorizer,
    method: DetectionMethod,
    min_turns: usize,
}

impl MemoryExtractor {
    pub fn new(
        store: Arc<VectorStore>,
        embedder: Arc<dyn Embedder>,
        llm: Option<Arc<AnalysisLlm>>,
        categorizer: MemoryCategorizer,
        method: DetectionMethod,
        min_turns: usize,
    ) -> Self {
        Self {
            store,
            embedder,
            llm,
            categorizer,
            method,
            min_turns,
        }
    }

    /// Extract memories from recent turns and store the novel ones.
    /// Returns how many were stored.
    #[instrument(skip(self, messages), fields(%conversation_id, turns = messages.len()))]
    pub async fn extract_and_store(
        &self,
        conversation_id: Uuid,
        messages: &[BufferedMessage],
    ) -> Result<usize> {
        if messages.len() < self.min_turns {
            debug!(
                have = messages.len(),
                need = self.min_turns,
                "not enough turns for extraction"
            );
            return Ok(0);
        }

        let (user_id, personality_id) = self
            .store
            .conversation_scope(conversation_id)?
            .ok_or(MemoryError::ConversationNotFound {
                id: conversation_id,
            })?;

        let candidates = match self.method {
            DetectionMethod::Llm => self.extract_llm(messages).await,
            DetectionMethod::Pattern => self.extract_patterns(messages).await,
            DetectionMethod::Hybrid => {
                let facts = self.extract_llm(messages).await;
                if facts.is_empty() {
                    debug!("LLM extraction empty, falling back to patterns");
                    self.extract_patterns(messages).await
                } else {
                    facts
                }
            }
        };

        if candidates.is_empty() {
            return Ok(0);
        }

        let contents: Vec<String> = candidates.iter().map(|c| c.content.clone()).collect();
        let embeddings = self
            .embedder
            .embed_batch(&contents)
            .await
            .map_err(|e| MemoryError::Storage(e.to_string()))?;

        let mut stored = 0;
        let mut skipped = 0;
        for (candidate, embedding) in candidates.into_iter().zip(embeddings) {
            // Skip re-statements of something we already know.
            let existing = self.store.search(
                user_id,
                personality_id,
                &embedding,
                1,
                DUPLICATE_SIMILARITY,
            )?;
            if !existing.is_empty() {
                debug!(content = %candidate.content, "skipping near-duplicate memory");
                skipped += 1;
                continue;
            }

            match self
                .store
                .store(NewMemory {
                    conversation_id,
                    user_id: Some(user_id),
                    personality_id: Some(personality_id),
                    content: candidate.content,
                    embedding,
                    memory_type: candidate.memory_type,
                    importance: candidate.importance,
                    category: candidate.category,
                    related_entities: candidate.entities,
                })
                .await
            {
                Ok(_) => stored += 1,
                Err(e) => warn!(error = %e, "failed to store extracted memory"),
            }
        }

        info!(stored, skipped, "memory extraction complete");
        Ok(stored)
    }

    /// Rule-based extraction over user turns.
    async fn extract_patterns(&self, messages: &[BufferedMessage]) -> Vec<Candidate> {
        let mut candidates: Vec<Candidate> = Vec::new();

        for message in messages {
            if message.role != Role::User {
                continue;
            }
            let content = message.content.trim();
            let lower = content.to_lowercase();

            let is_question = content.ends_with('?')
                || QUESTION_OPENERS.is_match(&lower)
                || QUESTION_PHRASES.is_match(&lower);
            if is_question {
                continue;
            }

            let matches_pattern = IMPORTANT_PATTERNS.iter().any(|p| p.is_match(&lower));
            // Long, substantive statements are kept even without a pattern hit.
            let should_store = matches_pattern || content.split_whitespace().count() > 15;
            if !should_store {
                continue;
            }

            let categorization = self.categorizer.categorize_patterns(content);
            let importance = match categorization.memory_type {
                MemoryType::Fact => 0.8,
                MemoryType::Preference => 0.7,
                MemoryType::Event => 0.75,
                MemoryType::Context => 0.5,
            };
            let entities = self.categorizer.extract_entities(content);

            candidates.push(Candidate {
                content: content.to_string(),
                memory_type: categorization.memory_type,
                importance,
                category: Some(categorization.category),
                entities,
            });
        }

        // Dedupe within the batch, keep the most important few.
        let mut seen = std::collections::HashSet::new();
        candidates.retain(|c| seen.insert(c.content.to_lowercase().trim().to_string()));
        candidates.sort_by(|a, b| {
            b.importance
                .partial_cmp(&a.importance)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        candidates.truncate(MAX_FACTS);
        candidates
    }

    /// LLM extraction: a constrained JSON prompt over the recent window.
    async fn extract_llm(&self, messages: &[BufferedMessage]) -> Vec<Candidate> {
        let Some(llm) = self.llm.as_ref() else {
            return Vec::new();
        };

        let window_start = messages.len().saturating_sub(WINDOW);
        let conversation_text: String = messages[window_start..]
            .iter()
            .map(|m| format!("{}: {}", m.role, m.content))
            .collect::<Vec<_>>()
            .join("\n");

        let prompt = format!(
            r#"You are a memory extraction assistant. Analyze this conversation and identify information worth remembering about the user.

Conversation:
{conversation_text}

Memory types: preference (likes, dislikes, interests), fact (job, location, name), event (experiences, past occurrences), context (general topics).

Do NOT store generic responses, questions to the AI, politeness phrases, or requests for information.

Importance: 0.9-1.0 critical personal info, 0.7-0.8 important preferences and facts, 0.5-0.6 useful context, below 0.3 not worth storing.

Return ONLY a valid JSON array:
[
  {{"content": "brief first-person statement", "type": "preference", "importance": 0.8, "reasoning": "why"}}
]

If nothing is worth remembering, return: []"#
        );

        let response = match llm
            .complete(
                "You are a precise memory extraction system. Output only valid JSON arrays.",
                &prompt,
            )
            .await
        {
            Ok(r) => r,
            Err(e) => {
                warn!(error = %e, "LLM memory extraction failed");
                return Vec::new();
            }
        };

        let Some(items) = extract_array::<ExtractedFact>(&response) else {
            warn!("no JSON array in LLM extraction response");
            return Vec::new();
        };

        let mut candidates: Vec<Candidate> = Vec::new();
        for item in items {
            if item.importance < MIN_IMPORTANCE || item.content.trim().is_empty() {
                continue;
            }
            let memory_type = match item.kind.as_str() {
                "preference" => MemoryType::Preference,
                "event" => MemoryType::Event,
                "context" => MemoryType::Context,
                // Goals and unknown labels persist as facts.
                _ => MemoryType::Fact,
            };
            let entities = self.categorizer.extract_entities(&item.content);
            candidates.push(Candidate {
                content: item.content,
                memory_type,
                importance: item.importance.min(1.0),
                category: None,
                entities,
            });
        }

        candidates.sort_by(|a, b| {
            b.importance
                .partial_cmp(&a.importance)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        candidates.truncate(MAX_FACTS);
        debug!(count = candidates.len(), "LLM extracted candidates");
        candidates
    }
}

#[derive(Deserialize)]
struct ExtractedFact {
    content: String,
    #[serde(rename = "type")]
    kind: String,
    importance: f32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contradiction::ContradictionDetector;
    use crate::db::init_db;
    use async_trait::async_trait;
    use lumen_llm::provider::ProviderError;
    use rusqlite::Connection;

    /// Deterministic embedder: hashes words into a small fixed vector.
    struct FakeEmbedder;

    #[async_trait]
    impl Embedder for FakeEmbedder {
        fn dimension(&self) -> usize {
            8
        }

        async fn embed(&self, text: &str) -> std::result::Result<Vec<f32>, ProviderError> {
            let mut v = vec![0.0f32; 8];
            for word in text.to_lowercase().split_whitespace() {
                let mut h: usize = 5381;
                for b in word.bytes() {
                    h = h.wrapping_mul(33) ^ b as usize;
                }
                v[h % 8] += 1.0;
            }
            Ok(v)
        }

        async fn embed_batch(
            &self,
            texts: &[String],
        ) -> std::result::Result<Vec<Vec<f32>>, ProviderError> {
            let mut out = Vec::new();
            for t in texts {
                out.push(self.embed(t).await?);
            }
            Ok(out)
        }
    }

    fn extractor(min_turns: usize) -> (MemoryExtractor, Arc<VectorStore>, Uuid) {
        let conn = Connection::open_in_memory().unwrap();
        init_db(&conn).unwrap();
        let store = Arc::new(VectorStore::new(
            conn,
            8,
            ContradictionDetector::new(DetectionMethod::Pattern, None),
        ));
        let cid = Uuid::new_v4();
        store
            .ensure_conversation(cid, Uuid::new_v4(), Uuid::new_v4())
            .unwrap();
        let extractor = MemoryExtractor::new(
            Arc::clone(&store),
            Arc::new(FakeEmbedder),
            None,
            MemoryCategorizer::new(DetectionMethod::Pattern, None),
            DetectionMethod::Pattern,
            min_turns,
        );
        (extractor, store, cid)
    }

    fn turns(contents: &[&str]) -> Vec<BufferedMessage> {
        contents
            .iter()
            .map(|c| BufferedMessage::new(Role::User, *c))
            .collect()
    }

    #[tokio::test]
    async fn below_min_turns_stores_nothing() {
        let (extractor, _, cid) = extractor(3);
        let stored = extractor
            .extract_and_store(cid, &turns(&["I love hiking"]))
            .await
            .unwrap();
        assert_eq!(stored, 0);
    }

    #[tokio::test]
    async fn extracts_preference_statements() {
        let (extractor, store, cid) = extractor(3);
        let stored = extractor
            .extract_and_store(
                cid,
                &turns(&["hello there", "how are you", "My favorite color is purple"]),
            )
            .await
            .unwrap();
        assert_eq!(stored, 1);

        let (user, personality) = store.conversation_scope(cid).unwrap().unwrap();
        let embedding = FakeEmbedder.embed("My favorite color is purple").await.unwrap();
        let found = store.search(user, personality, &embedding, 5, 0.5).unwrap();
        assert!(found.iter().any(|m| m.content.contains("purple")));
    }

    #[tokio::test]
    async fn questions_are_not_extracted() {
        let (extractor, _, cid) = extractor(3);
        let stored = extractor
            .extract_and_store(
                cid,
                &turns(&[
                    "hi",
                    "What is my favorite color?",
                    "do you know my name",
                ]),
            )
            .await
            .unwrap();
        assert_eq!(stored, 0);
    }

    /// Backend that answers every chat with prose instead of JSON.
    struct NonJsonLlm;

    #[async_trait]
    impl lumen_llm::LlmClient for NonJsonLlm {
        fn name(&self) -> &str {
            "non-json"
        }

        async fn chat(
            &self,
            req: &lumen_llm::ChatRequest,
        ) -> std::result::Result<lumen_llm::ChatResponse, ProviderError> {
            Ok(lumen_llm::ChatResponse {
                content: "I could not find anything worth remembering, sorry!".to_string(),
                model: req.model.clone(),
                tokens_in: 0,
                tokens_out: 0,
            })
        }
    }

    #[tokio::test]
    async fn hybrid_falls_back_when_llm_returns_non_json() {
        let conn = Connection::open_in_memory().unwrap();
        init_db(&conn).unwrap();
        let store = Arc::new(VectorStore::new(
            conn,
            8,
            ContradictionDetector::new(DetectionMethod::Pattern, None),
        ));
        let cid = Uuid::new_v4();
        store
            .ensure_conversation(cid, Uuid::new_v4(), Uuid::new_v4())
            .unwrap();

        let llm = Arc::new(AnalysisLlm::new(Arc::new(NonJsonLlm), "test-model"));
        let extractor = MemoryExtractor::new(
            Arc::clone(&store),
            Arc::new(FakeEmbedder),
            Some(llm),
            MemoryCategorizer::new(DetectionMethod::Pattern, None),
            DetectionMethod::Hybrid,
            3,
        );

        // LLM yields no parsable JSON; the pattern path still extracts.
        let stored = extractor
            .extract_and_store(
                cid,
                &turns(&["hi", "ok", "My favorite color is purple"]),
            )
            .await
            .unwrap();
        assert_eq!(stored, 1);
    }

    #[tokio::test]
    async fn repeated_statements_are_deduplicated() {
        let (extractor, _, cid) = extractor(3);
        let messages = turns(&["hello", "ok", "I love hiking in the mountains"]);
        let first = extractor.extract_and_store(cid, &messages).await.unwrap();
        assert_eq!(first, 1);

        // Same statement again: near-duplicate, skipped.
        let second = extractor.extract_and_store(cid, &messages).await.unwrap();
        assert_eq!(second, 0);
    }
}
