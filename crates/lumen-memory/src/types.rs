use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub use lumen_core::types::MemoryType;

/// A durable long-term memory, scoped by `(user, personality)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Memory {
    pub id: Uuid,
    pub user_id: Uuid,
    pub personality_id: Uuid,
    pub conversation_id: Uuid,
    pub content: String,
    pub memory_type: MemoryType,
    pub category: Option<String>,
    /// 0.0–1.0 importance score; drives re-ranking and consolidation.
    pub importance: f32,
    pub related_entities: Vec<String>,
    pub access_count: u32,
    pub last_accessed: Option<DateTime<Utc>>,
    pub decay_factor: f32,
    pub is_active: bool,
    pub superseded_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Cosine similarity to the query that retrieved this memory.
    /// Only populated on search results.
    pub similarity: Option<f32>,
}

/// Encode an embedding as a little-endian f32 BLOB for SQLite storage.
pub fn encode_embedding(embedding: &[f32]) -> Vec<u8> {
    let mut out = Vec::with_capacity(embedding.len() * 4);
    for v in embedding {
        out.extend_from_slice(&v.to_le_bytes());
    }
    out
}

/// Decode a stored BLOB back into an embedding vector.
pub fn decode_embedding(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

/// Cosine similarity in [-1, 1]. Zero-norm vectors compare as 0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embedding_blob_roundtrip() {
        let original = vec![0.25f32, -1.5, 3.75, 0.0];
        let decoded = decode_embedding(&encode_embedding(&original));
        assert_eq!(decoded, original);
    }

    #[test]
    fn cosine_of_identical_vectors_is_one() {
        let v = vec![0.3f32, 0.5, -0.2];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_of_orthogonal_vectors_is_zero() {
        let a = vec![1.0f32, 0.0];
        let b = vec![0.0f32, 1.0];
        assert!(cosine_similarity(&a, &b).abs() < 1e-6);
    }

    #[test]
    fn cosine_handles_zero_norm() {
        let a = vec![0.0f32, 0.0];
        let b = vec![1.0f32, 1.0];
        assert_eq!(cosine_similarity(&a, &b), 0.0);
    }

}
