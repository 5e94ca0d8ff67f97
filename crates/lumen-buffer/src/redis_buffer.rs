use async_trait::async_trait;
use redis::aio::ConnectionManager;
use tracing::{debug, warn};
use uuid::Uuid;

use lumen_core::types::Role;

use crate::memory::MemoryBuffer;
use crate::types::{BufferedMessage, ConversationBuffer};

/// Distributed buffer backend: one Redis list per conversation, bounded by
/// server-side LTRIM, TTL refreshed on access.
///
/// Every operation falls through to the in-process buffer on transport
/// failure so a single-process dev deployment is never broken by the
/// absence of Redis.
pub struct RedisBuffer {
    conn: ConnectionManager,
    max_messages: usize,
    ttl_seconds: i64,
    fallback: MemoryBuffer,
}

impl RedisBuffer {
    pub async fn connect(
        url: &str,
        max_messages: usize,
        ttl_seconds: i64,
    ) -> redis::RedisResult<Self> {
        let client = redis::Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;
        Ok(Self {
            conn,
            max_messages,
            ttl_seconds,
            fallback: MemoryBuffer::new(max_messages),
        })
    }

    fn messages_key(conversation_id: Uuid) -> String {
        format!("conversation:{conversation_id}:messages")
    }

    fn summary_key(conversation_id: Uuid) -> String {
        format!("conversation:{conversation_id}:summary")
    }

    async fn try_append(
        &self,
        conversation_id: Uuid,
        message: &BufferedMessage,
    ) -> redis::RedisResult<()> {
        let key = Self::messages_key(conversation_id);
        let payload = serde_json::to_string(message).unwrap_or_default();
        let mut conn = self.conn.clone();

        let _: () = redis::cmd("RPUSH")
            .arg(&key)
            .arg(payload)
            .query_async(&mut conn)
            .await?;
        let _: () = redis::cmd("LTRIM")
            .arg(&key)
            .arg(-(self.max_messages as i64))
            .arg(-1)
            .query_async(&mut conn)
            .await?;
        let _: () = redis::cmd("EXPIRE")
            .arg(&key)
            .arg(self.ttl_seconds)
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn try_recent(
        &self,
        conversation_id: Uuid,
        n: Option<usize>,
    ) -> redis::RedisResult<Vec<BufferedMessage>> {
        let key = Self::messages_key(conversation_id);
        let mut conn = self.conn.clone();

        let raw: Vec<String> = redis::cmd("LRANGE")
            .arg(&key)
            .arg(0)
            .arg(-1)
            .query_async(&mut conn)
            .await?;

        if !raw.is_empty() {
            let _: () = redis::cmd("EXPIRE")
                .arg(&key)
                .arg(self.ttl_seconds)
                .query_async(&mut conn)
                .await?;
        }

        let mut messages: Vec<BufferedMessage> = raw
            .iter()
            .filter_map(|s| serde_json::from_str(s).ok())
            .collect();
        if let Some(n) = n {
            if messages.len() > n {
                messages = messages.split_off(messages.len() - n);
            }
        }
        Ok(messages)
    }
}

#[async_trait]
impl ConversationBuffer for RedisBuffer {
    async fn append(&self, conversation_id: Uuid, role: Role, content: &str) {
        let message = BufferedMessage::new(role, content);
        if let Err(e) = self.try_append(conversation_id, &message).await {
            warn!(%conversation_id, error = %e, "redis append failed, using in-memory fallback");
            self.fallback.append(conversation_id, role, content).await;
        }
    }

    async fn recent(&self, conversation_id: Uuid, n: Option<usize>) -> Vec<BufferedMessage> {
        match self.try_recent(conversation_id, n).await {
            Ok(messages) => messages,
            Err(e) => {
                warn!(%conversation_id, error = %e, "redis read failed, using in-memory fallback");
                self.fallback.recent(conversation_id, n).await
            }
        }
    }

    async fn summary(&self, conversation_id: Uuid) -> Option<String> {
        let mut conn = self.conn.clone();
        let result: redis::RedisResult<Option<String>> = redis::cmd("GET")
            .arg(Self::summary_key(conversation_id))
            .query_async(&mut conn)
            .await;
        match result {
            Ok(summary) => summary,
            Err(e) => {
                warn!(%conversation_id, error = %e, "redis summary read failed");
                self.fallback.summary(conversation_id).await
            }
        }
    }

    async fn set_summary(&self, conversation_id: Uuid, summary: &str) {
        let mut conn = self.conn.clone();
        let result: redis::RedisResult<()> = redis::cmd("SET")
            .arg(Self::summary_key(conversation_id))
            .arg(summary)
            .arg("EX")
            .arg(self.ttl_seconds)
            .query_async(&mut conn)
            .await;
        if let Err(e) = result {
            warn!(%conversation_id, error = %e, "redis summary write failed");
            self.fallback.set_summary(conversation_id, summary).await;
        }
    }

    async fn reset(&self, conversation_id: Uuid) {
        let mut conn = self.conn.clone();
        let result: redis::RedisResult<()> = redis::cmd("DEL")
            .arg(Self::messages_key(conversation_id))
            .query_async(&mut conn)
            .await;
        if let Err(e) = result {
            warn!(%conversation_id, error = %e, "redis reset failed");
        }
        self.fallback.reset(conversation_id).await;
    }

    async fn clear(&self, conversation_id: Uuid) {
        let mut conn = self.conn.clone();
        let result: redis::RedisResult<()> = redis::cmd("DEL")
            .arg(Self::messages_key(conversation_id))
            .arg(Self::summary_key(conversation_id))
            .query_async(&mut conn)
            .await;
        if let Err(e) = result {
            warn!(%conversation_id, error = %e, "redis clear failed");
        }
        self.fallback.clear(conversation_id).await;
    }

    async fn cleanup_expired(&self) -> usize {
        // Redis expires keys via TTL; only the fallback needs sweeping.
        debug!("redis buffer cleanup is TTL-driven");
        self.fallback.cleanup_expired().await
    }
}
