use thiserror::Error;

#[derive(Debug, Error)]
pub enum MemoryError {
    #[error("Memory storage failed: {0}")]
    Storage(String),

    #[error("Memory retrieval failed: {0}")]
    Retrieval(String),

    #[error("Embedding dimension mismatch: got {got}, expected {expected}")]
    DimensionMismatch { got: usize, expected: usize },

    #[error("Conversation not found: {id}")]
    ConversationNotFound { id: uuid::Uuid },

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
}

pub type Result<T> = std::result::Result<T, MemoryError>;
