use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use lumen_core::config::{CONNECT_TIMEOUT_SECS, REQUEST_TIMEOUT_SECS};

use crate::provider::{ChatRequest, ChatResponse, LlmClient, ProviderError};
use crate::stream::{parse_sse_line, SseParsed, StreamEvent};

/// Hosted OpenAI-compatible chat backend.
pub struct OpenAiClient {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    provider_name: String,
}

impl OpenAiClient {
    pub fn new(api_key: String, base_url: Option<String>) -> Self {
        Self::named(
            "openai",
            api_key,
            base_url.unwrap_or_else(|| "https://api.openai.com".to_string()),
        )
    }

    /// Create a named OpenAI-compatible client.
    /// `base_url` should NOT include a trailing slash.
    pub fn named(name: impl Into<String>, api_key: String, base_url: String) -> Self {
        Self {
            client: http_client(),
            provider_name: name.into(),
            api_key,
            base_url,
        }
    }
}

/// Shared reqwest client with the outbound timeouts every backend uses.
pub(crate) fn http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
        .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
        .build()
        .unwrap_or_default()
}

/// Resolve the chat completions URL. Base URLs that already end in /v1
/// (LM Studio style) get the short path.
pub(crate) fn chat_url(base_url: &str) -> String {
    if base_url.trim_end_matches('/').ends_with("/v1") {
        format!("{}/chat/completions", base_url.trim_end_matches('/'))
    } else {
        format!("{}/v1/chat/completions", base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl LlmClient for OpenAiClient {
    fn name(&self) -> &str {
        &self.provider_name
    }

    async fn chat(&self, req: &ChatRequest) -> Result<ChatResponse, ProviderError> {
        let body = build_request_body(req, false);
        let url = chat_url(&self.base_url);

        debug!(model = %req.model, "sending request to {}", self.provider_name);

        let mut builder = self.client.post(&url).header("content-type", "application/json");
        if !self.api_key.is_empty() {
            builder = builder.bearer_auth(&self.api_key);
        }
        let resp = builder.json(&body).send().await?;

        check_status(resp, |resp| async move {
            let api_resp: ApiResponse = resp
                .json()
                .await
                .map_err(|e| ProviderError::Parse(e.to_string()))?;
            Ok(parse_response(api_resp))
        })
        .await
    }

    async fn stream_chat(
        &self,
        req: &ChatRequest,
        tx: mpsc::Sender<StreamEvent>,
    ) -> Result<(), ProviderError> {
        let body = build_request_body(req, true);
        let url = chat_url(&self.base_url);

        debug!(model = %req.model, "sending streaming request to {}", self.provider_name);

        let mut builder = self.client.post(&url).header("content-type", "application/json");
        if !self.api_key.is_empty() {
            builder = builder.bearer_auth(&self.api_key);
        }
        let resp = builder.json(&body).send().await?;

        check_status(resp, |resp| async move {
            process_stream(resp, req.model.clone(), tx).await;
            Ok(())
        })
        .await
    }
}

async fn check_status<T, F, Fut>(resp: reqwest::Response, on_ok: F) -> Result<T, ProviderError>
where
    F: FnOnce(reqwest::Response) -> Fut,
    Fut: std::future::Future<Output = Result<T, ProviderError>>,
{
    let status = resp.status().as_u16();
    if status == 429 {
        let retry = resp
            .headers()
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok())
            .map(|s| s * 1000)
            .unwrap_or(5000);
        return Err(ProviderError::RateLimited {
            retry_after_ms: retry,
        });
    }
    if !resp.status().is_success() {
        let text = resp.text().await.unwrap_or_default();
        warn!(status, body = %text, "chat API error");
        return Err(ProviderError::Api {
            status,
            message: text,
        });
    }
    on_ok(resp).await
}

pub(crate) fn build_request_body(req: &ChatRequest, stream: bool) -> serde_json::Value {
    let messages: Vec<serde_json::Value> = req
        .messages
        .iter()
        .map(|m| {
            serde_json::json!({
                "role": m.role,
                "content": m.content,
            })
        })
        .collect();

    serde_json::json!({
        "model": req.model,
        "messages": messages,
        "temperature": req.temperature,
        "max_tokens": req.max_tokens,
        "stream": stream,
    })
}

pub(crate) fn parse_response(resp: ApiResponse) -> ChatResponse {
    let content = resp
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .unwrap_or_default();

    ChatResponse {
        content,
        model: resp.model,
        tokens_in: resp.usage.as_ref().map(|u| u.prompt_tokens).unwrap_or(0),
        tokens_out: resp
            .usage
            .as_ref()
            .map(|u| u.completion_tokens)
            .unwrap_or(0),
    }
}

/// Parse an OpenAI-compatible streaming SSE response and emit StreamEvents.
/// Each data line carries a JSON delta object; `data: [DONE]` signals end.
pub(crate) async fn process_stream(
    resp: reqwest::Response,
    model: String,
    tx: mpsc::Sender<StreamEvent>,
) {
    use futures_util::StreamExt;

    let mut tokens_in: u32 = 0;
    let mut tokens_out: u32 = 0;
    let mut line_buf = String::new();

    let mut byte_stream = resp.bytes_stream();

    while let Some(chunk) = byte_stream.next().await {
        let chunk = match chunk {
            Ok(c) => c,
            Err(e) => {
                let _ = tx
                    .send(StreamEvent::Error {
                        message: e.to_string(),
                    })
                    .await;
                return;
            }
        };

        let text = match std::str::from_utf8(&chunk) {
            Ok(t) => t,
            Err(_) => continue,
        };

        line_buf.push_str(text);
        let lines: Vec<&str> = line_buf.split('\n').collect();
        let (complete, remainder) = lines.split_at(lines.len() - 1);
        let remainder = remainder.first().unwrap_or(&"").to_string();

        for line in complete {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            if let Some(SseParsed::Data(data)) = parse_sse_line(line) {
                if data.trim() == "[DONE]" {
                    break;
                }

                if let Ok(chunk_resp) = serde_json::from_str::<StreamChunk>(&data) {
                    if let Some(usage) = &chunk_resp.usage {
                        tokens_in = usage.prompt_tokens;
                        tokens_out = usage.completion_tokens;
                    }

                    for choice in &chunk_resp.choices {
                        if let Some(content) = &choice.delta.content {
                            if !content.is_empty()
                                && tx
                                    .send(StreamEvent::TextDelta {
                                        text: content.clone(),
                                    })
                                    .await
                                    .is_err()
                            {
                                return; // receiver dropped
                            }
                        }
                    }
                }
            }
        }

        line_buf = remainder;
    }

    let _ = tx
        .send(StreamEvent::Done {
            model,
            tokens_in,
            tokens_out,
        })
        .await;
}

// OpenAI-compatible API response types - pub(crate) so the local client reuses them.

#[derive(Deserialize)]
pub(crate) struct ApiResponse {
    pub(crate) model: String,
    pub(crate) choices: Vec<Choice>,
    pub(crate) usage: Option<Usage>,
}

#[derive(Deserialize)]
pub(crate) struct Choice {
    pub(crate) message: ApiMessage,
}

#[derive(Deserialize)]
pub(crate) struct ApiMessage {
    pub(crate) content: Option<String>,
}

#[derive(Deserialize)]
pub(crate) struct Usage {
    pub(crate) prompt_tokens: u32,
    pub(crate) completion_tokens: u32,
}

#[derive(Deserialize)]
struct StreamChunk {
    choices: Vec<StreamChoice>,
    usage: Option<StreamUsage>,
}

#[derive(Deserialize)]
struct StreamChoice {
    delta: StreamDelta,
}

#[derive(Deserialize)]
struct StreamDelta {
    content: Option<String>,
}

#[derive(Deserialize)]
struct StreamUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::ChatMessage;

    #[test]
    fn chat_url_handles_v1_suffix() {
        assert_eq!(
            chat_url("http://localhost:1234/v1"),
            "http://localhost:1234/v1/chat/completions"
        );
        assert_eq!(
            chat_url("https://api.openai.com"),
            "https://api.openai.com/v1/chat/completions"
        );
    }

    #[test]
    fn request_body_carries_sampling_params() {
        let req = ChatRequest {
            model: "gpt-4o-mini".to_string(),
            messages: vec![ChatMessage::system("be brief"), ChatMessage::user("hi")],
            temperature: 0.8,
            max_tokens: 1500,
        };
        let body = build_request_body(&req, true);
        assert_eq!(body["model"], "gpt-4o-mini");
        assert_eq!(body["stream"], true);
        assert_eq!(body["max_tokens"], 1500);
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], "hi");
    }

    #[test]
    fn parse_response_takes_first_choice() {
        let resp = ApiResponse {
            model: "m".to_string(),
            choices: vec![Choice {
                message: ApiMessage {
                    content: Some("hello".to_string()),
                },
            }],
            usage: Some(Usage {
                prompt_tokens: 10,
                completion_tokens: 2,
            }),
        };
        let parsed = parse_response(resp);
        assert_eq!(parsed.content, "hello");
        assert_eq!(parsed.tokens_in, 10);
    }
}
