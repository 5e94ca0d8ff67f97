use redis::aio::ConnectionManager;
use tracing::{debug, warn};

use crate::types::Personality;

/// Cache TTL: personalities rarely change.
const CACHE_TTL_SECS: u64 = 86_400;

/// Read-through Redis cache for globally-shared personality definitions.
///
/// Keys: `personality:global:{name}:id` and `personality:global:{name}:config`.
/// Every failure is a miss - the store falls through to SQLite.
pub struct PersonalityCache {
    conn: ConnectionManager,
}

impl PersonalityCache {
    pub async fn connect(url: &str) -> redis::RedisResult<Self> {
        let client = redis::Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;
        Ok(Self { conn })
    }

    fn config_key(name: &str) -> String {
        format!("personality:global:{name}:config")
    }

    fn id_key(name: &str) -> String {
        format!("personality:global:{name}:id")
    }

    pub async fn get(&self, name: &str) -> Option<Personality> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = redis::cmd("GET")
            .arg(Self::config_key(name))
            .query_async(&mut conn)
            .await
            .map_err(|e| {
                warn!(name, error = %e, "personality cache read failed");
                e
            })
            .ok()?;
        let personality = raw.and_then(|json| serde_json::from_str(&json).ok());
        if personality.is_some() {
            debug!(name, "personality cache hit");
        }
        personality
    }

    pub async fn put(&self, personality: &Personality) {
        let Ok(json) = serde_json::to_string(personality) else {
            return;
        };
        let mut conn = self.conn.clone();
        let result: redis::RedisResult<()> = redis::pipe()
            .cmd("SET")
            .arg(Self::config_key(&personality.name))
            .arg(json)
            .arg("EX")
            .arg(CACHE_TTL_SECS)
            .ignore()
            .cmd("SET")
            .arg(Self::id_key(&personality.name))
            .arg(personality.id.to_string())
            .arg("EX")
            .arg(CACHE_TTL_SECS)
            .ignore()
            .query_async(&mut conn)
            .await;
        if let Err(e) = result {
            warn!(name = %personality.name, error = %e, "personality cache write failed");
        }
    }

    /// Flush both keys for a name. Called on every personality update.
    pub async fn invalidate(&self, name: &str) {
        let mut conn = self.conn.clone();
        let result: redis::RedisResult<()> = redis::cmd("DEL")
            .arg(Self::config_key(name))
            .arg(Self::id_key(name))
            .query_async(&mut conn)
            .await;
        if let Err(e) = result {
            warn!(name, error = %e, "personality cache invalidation failed");
        }
    }
}
