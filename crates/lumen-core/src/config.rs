use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

pub const DEFAULT_PORT: u16 = 18900;
pub const DEFAULT_BIND: &str = "127.0.0.1";
/// JWT secret shipped in the example config - rejected in production.
pub const DEFAULT_JWT_SECRET: &str = "change-this-in-production";
/// Connect timeout for every outbound endpoint (LLM, embeddings, Redis).
pub const CONNECT_TIMEOUT_SECS: u64 = 5;
/// Per-request timeout for outbound LLM/embedding calls.
pub const REQUEST_TIMEOUT_SECS: u64 = 60;

/// Top-level config (lumen.toml + LUMEN_* env overrides).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LumenConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub hosted: HostedLlmConfig,
    #[serde(default)]
    pub local: LocalLlmConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub memory: MemoryConfig,
    #[serde(default)]
    pub analysis: AnalysisConfig,
    #[serde(default)]
    pub redis: RedisConfig,
    #[serde(default)]
    pub safety: SafetyConfig,
    #[serde(default)]
    pub consolidation: ConsolidationConfig,
    #[serde(default)]
    pub chat: ChatConfig,
}

impl Default for LumenConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            database: DatabaseConfig::default(),
            auth: AuthConfig::default(),
            hosted: HostedLlmConfig::default(),
            local: LocalLlmConfig::default(),
            embedding: EmbeddingConfig::default(),
            memory: MemoryConfig::default(),
            analysis: AnalysisConfig::default(),
            redis: RedisConfig::default(),
            safety: SafetyConfig::default(),
            consolidation: ConsolidationConfig::default(),
            chat: ChatConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Allowed CORS origins. "*" is rejected by the production validator.
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            bind: DEFAULT_BIND.to_string(),
            cors_origins: vec!["http://localhost:3000".to_string()],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// When false every request falls back to the X-User-Id dev header.
    /// Must be true in production.
    #[serde(default = "bool_true")]
    pub require_authentication: bool,
    #[serde(default = "default_jwt_secret")]
    pub jwt_secret: String,
    #[serde(default = "default_jwt_expiration_hours")]
    pub jwt_expiration_hours: i64,
    #[serde(default = "default_rate_limit")]
    pub rate_limit_requests_per_minute: u32,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            require_authentication: true,
            jwt_secret: DEFAULT_JWT_SECRET.to_string(),
            jwt_expiration_hours: 24,
            rate_limit_requests_per_minute: 30,
        }
    }
}

/// Hosted (provider-moderated) chat backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostedLlmConfig {
    #[serde(default = "default_hosted_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_hosted_model")]
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

impl Default for HostedLlmConfig {
    fn default() -> Self {
        Self {
            base_url: default_hosted_base_url(),
            api_key: String::new(),
            model: default_hosted_model(),
            temperature: 0.7,
            max_tokens: 2000,
        }
    }
}

/// Local uncensored backend (LM Studio / llama.cpp style, OpenAI-compatible).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalLlmConfig {
    #[serde(default = "default_local_base_url")]
    pub base_url: String,
    #[serde(default = "default_local_model")]
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

impl Default for LocalLlmConfig {
    fn default() -> Self {
        Self {
            base_url: default_local_base_url(),
            model: default_local_model(),
            temperature: 0.7,
            max_tokens: 2000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    #[serde(default = "default_local_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_embedding_model")]
    pub model: String,
    /// Stored vectors must match this dimension exactly.
    #[serde(default = "default_embedding_dimension")]
    pub dimension: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            base_url: default_local_base_url(),
            api_key: None,
            model: default_embedding_model(),
            dimension: 384,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    #[serde(default = "default_short_term_size")]
    pub short_term_size: usize,
    #[serde(default = "default_top_k")]
    pub long_term_top_k: usize,
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f32,
    #[serde(default = "default_extraction_min_turns")]
    pub extraction_min_turns: usize,
    #[serde(default)]
    pub extraction_method: DetectionMethod,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            short_term_size: 10,
            long_term_top_k: 5,
            similarity_threshold: 0.2,
            extraction_min_turns: 3,
            extraction_method: DetectionMethod::Hybrid,
        }
    }
}

/// How each advisory analyzer runs. Hybrid tries the LLM first and falls
/// through to patterns on failure or an empty result.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DetectionMethod {
    Llm,
    Pattern,
    #[default]
    Hybrid,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AnalysisConfig {
    #[serde(default)]
    pub emotion_detection_method: DetectionMethod,
    #[serde(default)]
    pub goal_detection_method: DetectionMethod,
    #[serde(default)]
    pub personality_detection_method: DetectionMethod,
    #[serde(default)]
    pub memory_categorization_method: DetectionMethod,
    #[serde(default)]
    pub contradiction_detection_method: DetectionMethod,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RedisConfig {
    pub url: Option<String>,
    #[serde(default)]
    pub enabled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SafetyConfig {
    #[serde(default = "bool_true")]
    pub llm_judge_enabled: bool,
    #[serde(default = "default_audit_log_path")]
    pub audit_log_path: String,
}

impl Default for SafetyConfig {
    fn default() -> Self {
        Self {
            llm_judge_enabled: true,
            audit_log_path: default_audit_log_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsolidationConfig {
    #[serde(default = "bool_true")]
    pub enabled: bool,
    #[serde(default = "default_consolidation_interval")]
    pub interval_minutes: u64,
    #[serde(default = "default_max_users_per_run")]
    pub max_users_per_run: usize,
    #[serde(default = "default_max_memories_per_user")]
    pub max_memories_per_user: usize,
    #[serde(default = "default_semantic_threshold")]
    pub semantic_threshold: f32,
}

impl Default for ConsolidationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_minutes: 60,
            max_users_per_run: 50,
            max_memories_per_user: 500,
            semantic_threshold: 0.9,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatConfig {
    #[serde(default = "default_system_persona")]
    pub system_persona: String,
    /// Bounded queue for post-response analysis jobs. On saturation the
    /// oldest queued job is dropped rather than blocking the turn.
    #[serde(default = "default_background_queue_size")]
    pub background_queue_size: usize,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            system_persona: default_system_persona(),
            background_queue_size: 64,
        }
    }
}

fn bool_true() -> bool {
    true
}
fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_bind() -> String {
    DEFAULT_BIND.to_string()
}
fn default_db_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{home}/.lumen/lumen.db")
}
fn default_jwt_secret() -> String {
    DEFAULT_JWT_SECRET.to_string()
}
fn default_jwt_expiration_hours() -> i64 {
    24
}
fn default_rate_limit() -> u32 {
    30
}
fn default_hosted_base_url() -> String {
    "https://api.openai.com".to_string()
}
fn default_hosted_model() -> String {
    "gpt-4o-mini".to_string()
}
fn default_local_base_url() -> String {
    "http://localhost:1234/v1".to_string()
}
fn default_local_model() -> String {
    "local-model".to_string()
}
fn default_embedding_model() -> String {
    "all-MiniLM-L6-v2".to_string()
}
fn default_embedding_dimension() -> usize {
    384
}
fn default_short_term_size() -> usize {
    10
}
fn default_top_k() -> usize {
    5
}
fn default_similarity_threshold() -> f32 {
    0.2
}
fn default_extraction_min_turns() -> usize {
    3
}
fn default_audit_log_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{home}/.lumen/content_audit.jsonl")
}
fn default_consolidation_interval() -> u64 {
    60
}
fn default_max_users_per_run() -> usize {
    50
}
fn default_max_memories_per_user() -> usize {
    500
}
fn default_semantic_threshold() -> f32 {
    0.9
}
fn default_system_persona() -> String {
    "a helpful, knowledgeable AI assistant with memory of past conversations".to_string()
}
fn default_background_queue_size() -> usize {
    64
}
fn default_temperature() -> f32 {
    0.7
}
fn default_max_tokens() -> u32 {
    2000
}

impl LumenConfig {
    /// Load config from a TOML file with LUMEN_* env var overrides.
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = config_path
            .map(String::from)
            .unwrap_or_else(default_config_path);

        let config: LumenConfig = Figment::new()
            .merge(Toml::file(&path))
            .merge(Env::prefixed("LUMEN_").split("_"))
            .extract()
            .map_err(|e| crate::error::LumenError::Config(e.to_string()))?;

        Ok(config)
    }

    /// Reject configurations that must never reach production.
    pub fn validate_production(&self) -> crate::error::Result<()> {
        let mut errors = Vec::new();

        if self.auth.jwt_secret == DEFAULT_JWT_SECRET {
            errors.push("auth.jwt_secret is the shipped default; set a strong random key".to_string());
        }
        if self.auth.jwt_secret.len() < 32 {
            errors.push(format!(
                "auth.jwt_secret is too short ({} bytes, need at least 32)",
                self.auth.jwt_secret.len()
            ));
        }
        if !self.auth.require_authentication {
            errors.push("auth.require_authentication must be true in production".to_string());
        }
        if self.server.cors_origins.iter().any(|o| o == "*") {
            errors.push("server.cors_origins must not contain '*' in production".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(crate::error::LumenError::Config(errors.join("; ")))
        }
    }
}

fn default_config_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{home}/.lumen/lumen.toml")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_development_safe() {
        let config = LumenConfig::default();
        assert_eq!(config.memory.short_term_size, 10);
        assert_eq!(config.memory.long_term_top_k, 5);
        assert_eq!(config.embedding.dimension, 384);
        assert!(config.auth.require_authentication);
    }

    #[test]
    fn production_validator_rejects_default_secret() {
        let config = LumenConfig::default();
        assert!(config.validate_production().is_err());
    }

    #[test]
    fn production_validator_rejects_short_secret() {
        let mut config = LumenConfig::default();
        config.auth.jwt_secret = "short".to_string();
        assert!(config.validate_production().is_err());
    }

    #[test]
    fn production_validator_rejects_wildcard_cors() {
        let mut config = LumenConfig::default();
        config.auth.jwt_secret = "a".repeat(48);
        config.server.cors_origins = vec!["*".to_string()];
        assert!(config.validate_production().is_err());
    }

    #[test]
    fn production_validator_accepts_hardened_config() {
        let mut config = LumenConfig::default();
        config.auth.jwt_secret = "f".repeat(48);
        config.server.cors_origins = vec!["https://app.example.com".to_string()];
        assert!(config.validate_production().is_ok());
    }

    #[test]
    fn detection_method_parses_lowercase() {
        let m: DetectionMethod = serde_json::from_str("\"pattern\"").unwrap();
        assert_eq!(m, DetectionMethod::Pattern);
    }
}
