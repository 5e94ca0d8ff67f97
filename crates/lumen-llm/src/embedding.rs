use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use crate::openai::http_client;
use crate::provider::ProviderError;

/// Text → fixed-dimension vector. The advertised dimension is the contract:
/// every stored memory embedding must match it exactly.
#[async_trait]
pub trait Embedder: Send + Sync {
    fn dimension(&self) -> usize;

    async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError>;

    /// Batch variant - one round-trip for extraction candidates.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError>;
}

/// OpenAI-compatible `/v1/embeddings` client.
pub struct HttpEmbedder {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
    dimension: usize,
}

impl HttpEmbedder {
    pub fn new(base_url: String, api_key: Option<String>, model: String, dimension: usize) -> Self {
        Self {
            client: http_client(),
            base_url,
            api_key,
            model,
            dimension,
        }
    }

    fn url(&self) -> String {
        let base = self.base_url.trim_end_matches('/');
        if base.ends_with("/v1") {
            format!("{base}/embeddings")
        } else {
            format!("{base}/v1/embeddings")
        }
    }

    async fn request(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        let body = serde_json::json!({
            "model": self.model,
            "input": inputs,
        });

        let mut builder = self
            .client
            .post(self.url())
            .header("content-type", "application/json");
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }
        let resp = builder.json(&body).send().await?;

        let status = resp.status().as_u16();
        if !resp.status().is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(ProviderError::Api {
                status,
                message: text,
            });
        }

        let parsed: EmbeddingResponse = resp
            .json()
            .await
            .map_err(|e| ProviderError::Parse(e.to_string()))?;

        let mut rows: Vec<(usize, Vec<f32>)> = parsed
            .data
            .into_iter()
            .map(|d| (d.index, d.embedding))
            .collect();
        rows.sort_by_key(|(idx, _)| *idx);

        let vectors: Vec<Vec<f32>> = rows.into_iter().map(|(_, v)| v).collect();
        for v in &vectors {
            if v.len() != self.dimension {
                return Err(ProviderError::Parse(format!(
                    "embedding dimension mismatch: got {}, expected {}",
                    v.len(),
                    self.dimension
                )));
            }
        }
        debug!(count = vectors.len(), "embedded batch");
        Ok(vectors)
    }
}

#[async_trait]
impl Embedder for HttpEmbedder {
    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        let mut vectors = self.request(&[text.to_string()]).await?;
        vectors
            .pop()
            .ok_or_else(|| ProviderError::Parse("empty embedding response".to_string()))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        self.request(texts).await
    }
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingRow>,
}

#[derive(Deserialize)]
struct EmbeddingRow {
    index: usize,
    embedding: Vec<f32>,
}
