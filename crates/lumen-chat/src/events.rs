use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// Typed events streamed to the client during one turn.
///
/// `Done` is always the last event of a successful turn; nothing follows
/// it. Encoders (SSE framing) live outside the core.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChatEvent {
    /// Advisory progress marker.
    Thinking {
        conversation_id: Uuid,
        step: String,
        data: serde_json::Value,
        timestamp: DateTime<Utc>,
    },
    /// One fragment of assistant output.
    Chunk {
        conversation_id: Uuid,
        chunk: String,
    },
    /// Explicit content requested without a verified session.
    AgeVerificationRequired {
        conversation_id: Uuid,
        route: String,
        instructions: String,
        api_endpoint: String,
        timestamp: DateTime<Utc>,
    },
    Done {
        conversation_id: Uuid,
        timestamp: DateTime<Utc>,
    },
    Error {
        conversation_id: Uuid,
        error: String,
    },
}

impl ChatEvent {
    pub fn thinking(conversation_id: Uuid, step: &str, data: serde_json::Value) -> Self {
        Self::Thinking {
            conversation_id,
            step: step.to_string(),
            data,
            timestamp: Utc::now(),
        }
    }

    pub fn chunk(conversation_id: Uuid, chunk: impl Into<String>) -> Self {
        Self::Chunk {
            conversation_id,
            chunk: chunk.into(),
        }
    }

    pub fn done(conversation_id: Uuid) -> Self {
        Self::Done {
            conversation_id,
            timestamp: Utc::now(),
        }
    }

    pub fn error(conversation_id: Uuid, error: impl Into<String>) -> Self {
        Self::Error {
            conversation_id,
            error: error.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_serialize_with_type_tag() {
        let cid = Uuid::new_v4();
        let event = ChatEvent::chunk(cid, "hello");
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "chunk");
        assert_eq!(json["chunk"], "hello");
        assert_eq!(json["conversation_id"], cid.to_string());
    }

    #[test]
    fn done_carries_timestamp() {
        let json = serde_json::to_value(ChatEvent::done(Uuid::new_v4())).unwrap();
        assert_eq!(json["type"], "done");
        assert!(json["timestamp"].is_string());
    }
}
