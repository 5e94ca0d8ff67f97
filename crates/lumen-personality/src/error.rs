use thiserror::Error;

#[derive(Debug, Error)]
pub enum PersonalityError {
    #[error("Personality not found: {name}")]
    NotFound { name: String },

    #[error("Personality name already exists: {name}")]
    NameTaken { name: String },

    #[error("Unknown archetype: {name}")]
    UnknownArchetype { name: String },

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, PersonalityError>;
