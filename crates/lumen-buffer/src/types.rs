use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use lumen_core::types::Role;

/// One entry in the short-term ring. The buffer is working memory for the
/// current conversation, not the durable message log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BufferedMessage {
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl BufferedMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Bounded per-conversation message ring with TTL.
///
/// All operations are non-blocking and safe for concurrent callers.
/// `recent` returns an independent snapshot - callers may not mutate the
/// buffer through it.
#[async_trait]
pub trait ConversationBuffer: Send + Sync {
    /// Append a turn, trimming the ring to its configured bound.
    async fn append(&self, conversation_id: Uuid, role: Role, content: &str);

    /// Snapshot of the most recent `n` messages (all retained when `None`).
    async fn recent(&self, conversation_id: Uuid, n: Option<usize>) -> Vec<BufferedMessage>;

    async fn summary(&self, conversation_id: Uuid) -> Option<String>;

    async fn set_summary(&self, conversation_id: Uuid, summary: &str);

    /// Drop messages, preserve the summary.
    async fn reset(&self, conversation_id: Uuid);

    /// Drop messages and summary.
    async fn clear(&self, conversation_id: Uuid);

    /// Drop conversations idle longer than the TTL. Returns how many.
    async fn cleanup_expired(&self) -> usize;
}
