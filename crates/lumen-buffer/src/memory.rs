use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info};
use uuid::Uuid;

use lumen_core::types::Role;

use crate::types::{BufferedMessage, ConversationBuffer};

/// Default ring bound per conversation.
pub const DEFAULT_MAX_MESSAGES: usize = 10;
/// Conversations idle longer than this are swept.
pub const DEFAULT_TTL_HOURS: i64 = 24;

struct Entry {
    messages: Vec<BufferedMessage>,
    summary: Option<String>,
    last_access: DateTime<Utc>,
}

/// Process-local buffer backend: a `conversation_id → ring` map behind a
/// reader-writer lock. The fallback target for the Redis backend.
pub struct MemoryBuffer {
    max_messages: usize,
    ttl_hours: i64,
    entries: RwLock<HashMap<Uuid, Entry>>,
}

impl MemoryBuffer {
    pub fn new(max_messages: usize) -> Self {
        Self::with_ttl(max_messages, DEFAULT_TTL_HOURS)
    }

    pub fn with_ttl(max_messages: usize, ttl_hours: i64) -> Self {
        Self {
            max_messages,
            ttl_hours,
            entries: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for MemoryBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_MESSAGES)
    }
}

#[async_trait]
impl ConversationBuffer for MemoryBuffer {
    async fn append(&self, conversation_id: Uuid, role: Role, content: &str) {
        let mut entries = self.entries.write().unwrap();
        let entry = entries.entry(conversation_id).or_insert_with(|| Entry {
            messages: Vec::new(),
            summary: None,
            last_access: Utc::now(),
        });

        entry.messages.push(BufferedMessage::new(role, content));
        if entry.messages.len() > self.max_messages {
            let excess = entry.messages.len() - self.max_messages;
            entry.messages.drain(..excess);
        }
        entry.last_access = Utc::now();
        debug!(%conversation_id, %role, "buffered message");
    }

    async fn recent(&self, conversation_id: Uuid, n: Option<usize>) -> Vec<BufferedMessage> {
        let mut entries = self.entries.write().unwrap();
        match entries.get_mut(&conversation_id) {
            Some(entry) => {
                entry.last_access = Utc::now();
                let msgs = &entry.messages;
                match n {
                    Some(n) if msgs.len() > n => msgs[msgs.len() - n..].to_vec(),
                    _ => msgs.clone(),
                }
            }
            None => Vec::new(),
        }
    }

    async fn summary(&self, conversation_id: Uuid) -> Option<String> {
        let entries = self.entries.read().unwrap();
        entries
            .get(&conversation_id)
            .and_then(|e| e.summary.clone())
    }

    async fn set_summary(&self, conversation_id: Uuid, summary: &str) {
        let mut entries = self.entries.write().unwrap();
        let entry = entries.entry(conversation_id).or_insert_with(|| Entry {
            messages: Vec::new(),
            summary: None,
            last_access: Utc::now(),
        });
        entry.summary = Some(summary.to_string());
        entry.last_access = Utc::now();
    }

    async fn reset(&self, conversation_id: Uuid) {
        let mut entries = self.entries.write().unwrap();
        if let Some(entry) = entries.get_mut(&conversation_id) {
            entry.messages.clear();
            info!(%conversation_id, "reset conversation buffer");
        }
    }

    async fn clear(&self, conversation_id: Uuid) {
        let mut entries = self.entries.write().unwrap();
        if entries.remove(&conversation_id).is_some() {
            info!(%conversation_id, "cleared conversation buffer");
        }
    }

    async fn cleanup_expired(&self) -> usize {
        let cutoff = Utc::now() - Duration::hours(self.ttl_hours);
        let mut entries = self.entries.write().unwrap();
        let before = entries.len();
        entries.retain(|_, e| e.last_access >= cutoff);
        let removed = before - entries.len();
        if removed > 0 {
            info!(removed, "swept expired conversation buffers");
        }
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn append_trims_to_bound() {
        let buffer = MemoryBuffer::new(3);
        let cid = Uuid::new_v4();
        for i in 0..5 {
            buffer.append(cid, Role::User, &format!("m{i}")).await;
        }
        let recent = buffer.recent(cid, None).await;
        assert_eq!(recent.len(), 3);
        assert_eq!(recent[0].content, "m2");
        assert_eq!(recent[2].content, "m4");
    }

    #[tokio::test]
    async fn recent_returns_snapshot() {
        let buffer = MemoryBuffer::new(10);
        let cid = Uuid::new_v4();
        buffer.append(cid, Role::User, "hello").await;

        let mut snapshot = buffer.recent(cid, None).await;
        snapshot[0].content = "mutated".to_string();

        let fresh = buffer.recent(cid, None).await;
        assert_eq!(fresh[0].content, "hello");
    }

    #[tokio::test]
    async fn recent_respects_n() {
        let buffer = MemoryBuffer::new(10);
        let cid = Uuid::new_v4();
        for i in 0..4 {
            buffer.append(cid, Role::User, &format!("m{i}")).await;
        }
        let last_two = buffer.recent(cid, Some(2)).await;
        assert_eq!(last_two.len(), 2);
        assert_eq!(last_two[0].content, "m2");
    }

    #[tokio::test]
    async fn reset_keeps_summary() {
        let buffer = MemoryBuffer::new(10);
        let cid = Uuid::new_v4();
        buffer.append(cid, Role::User, "hello").await;
        buffer.set_summary(cid, "we said hello").await;

        buffer.reset(cid).await;
        assert!(buffer.recent(cid, None).await.is_empty());
        assert_eq!(buffer.summary(cid).await.as_deref(), Some("we said hello"));
    }

    #[tokio::test]
    async fn clear_drops_both() {
        let buffer = MemoryBuffer::new(10);
        let cid = Uuid::new_v4();
        buffer.append(cid, Role::User, "hello").await;
        buffer.set_summary(cid, "summary").await;

        buffer.clear(cid).await;
        assert!(buffer.recent(cid, None).await.is_empty());
        assert!(buffer.summary(cid).await.is_none());
    }

    #[tokio::test]
    async fn cleanup_sweeps_idle_conversations() {
        let buffer = MemoryBuffer::with_ttl(10, 0);
        let cid = Uuid::new_v4();
        buffer.append(cid, Role::User, "hello").await;

        // TTL of zero hours makes everything instantly stale.
        let removed = buffer.cleanup_expired().await;
        assert_eq!(removed, 1);
        assert!(buffer.recent(cid, None).await.is_empty());
    }
}
