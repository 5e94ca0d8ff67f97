use thiserror::Error;

#[derive(Debug, Error)]
pub enum LumenError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Authentication failed: {0}")]
    AuthFailed(String),

    #[error("Permission denied: {reason}")]
    PermissionDenied { reason: String },

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Rate limited")]
    RateLimited,

    #[error("User not found: {id}")]
    UserNotFound { id: String },

    #[error("Conversation not found: {id}")]
    ConversationNotFound { id: String },

    #[error("Database error: {0}")]
    Database(String),

    #[error("LLM provider error: {0}")]
    LlmProvider(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl LumenError {
    /// Short error code string surfaced to clients in error payloads.
    pub fn code(&self) -> &'static str {
        match self {
            LumenError::Config(_) => "CONFIG_ERROR",
            LumenError::AuthFailed(_) => "AUTH_FAILED",
            LumenError::PermissionDenied { .. } => "PERMISSION_DENIED",
            LumenError::Validation(_) => "VALIDATION_FAILED",
            LumenError::RateLimited => "RATE_LIMITED",
            LumenError::UserNotFound { .. } => "USER_NOT_FOUND",
            LumenError::ConversationNotFound { .. } => "CONVERSATION_NOT_FOUND",
            LumenError::Database(_) => "DATABASE_ERROR",
            LumenError::LlmProvider(_) => "LLM_PROVIDER_ERROR",
            LumenError::Serialization(_) => "SERIALIZATION_ERROR",
            LumenError::Io(_) => "IO_ERROR",
            LumenError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

pub type Result<T> = std::result::Result<T, LumenError>;
