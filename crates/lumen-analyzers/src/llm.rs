use std::sync::Arc;

use lumen_core::types::Role;
use lumen_llm::provider::{ChatMessage, ChatRequest, LlmClient, ProviderError};

/// Sampling used for every analysis call: low temperature for consistent
/// structured output, short completions.
const ANALYSIS_TEMPERATURE: f32 = 0.3;
const ANALYSIS_MAX_TOKENS: u32 = 400;

/// A chat backend configured for analysis side-calls (judges, extractors,
/// contradiction checks). Wraps the client with the model name so callers
/// only supply prompts.
pub struct AnalysisLlm {
    client: Arc<dyn LlmClient>,
    model: String,
}

impl AnalysisLlm {
    pub fn new(client: Arc<dyn LlmClient>, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
        }
    }

    pub async fn complete(&self, system: &str, user: &str) -> Result<String, ProviderError> {
        let req = ChatRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage::new(Role::System, system),
                ChatMessage::new(Role::User, user),
            ],
            temperature: ANALYSIS_TEMPERATURE,
            max_tokens: ANALYSIS_MAX_TOKENS,
        };
        let resp = self.client.chat(&req).await?;
        Ok(resp.content)
    }
}
