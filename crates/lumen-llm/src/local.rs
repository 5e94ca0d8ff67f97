use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::debug;

use crate::openai::{build_request_body, chat_url, http_client, parse_response, process_stream, ApiResponse};
use crate::provider::{ChatRequest, ChatResponse, LlmClient, ProviderError};
use crate::stream::StreamEvent;

/// Local OpenAI-compatible runtime (LM Studio, llama.cpp server).
///
/// Same wire format as the hosted backend but no authentication. Used for
/// the explicit routes; connect failures here trigger the hosted fallback.
pub struct LocalClient {
    client: reqwest::Client,
    base_url: String,
}

impl LocalClient {
    pub fn new(base_url: String) -> Self {
        Self {
            client: http_client(),
            base_url,
        }
    }
}

#[async_trait]
impl LlmClient for LocalClient {
    fn name(&self) -> &str {
        "local"
    }

    async fn chat(&self, req: &ChatRequest) -> Result<ChatResponse, ProviderError> {
        let body = build_request_body(req, false);
        let url = chat_url(&self.base_url);

        debug!(model = %req.model, "sending request to local runtime");

        let resp = self
            .client
            .post(&url)
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = resp.status().as_u16();
        if !resp.status().is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(ProviderError::Api {
                status,
                message: text,
            });
        }

        let api_resp: ApiResponse = resp
            .json()
            .await
            .map_err(|e| ProviderError::Parse(e.to_string()))?;
        Ok(parse_response(api_resp))
    }

    async fn stream_chat(
        &self,
        req: &ChatRequest,
        tx: mpsc::Sender<StreamEvent>,
    ) -> Result<(), ProviderError> {
        let body = build_request_body(req, true);
        let url = chat_url(&self.base_url);

        debug!(model = %req.model, "sending streaming request to local runtime");

        let resp = self
            .client
            .post(&url)
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = resp.status().as_u16();
        if !resp.status().is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(ProviderError::Api {
                status,
                message: text,
            });
        }

        process_stream(resp, req.model.clone(), tx).await;
        Ok(())
    }
}
