pub mod embedding;
pub mod local;
pub mod openai;
pub mod provider;
pub mod stream;

pub use embedding::{Embedder, HttpEmbedder};
pub use local::LocalClient;
pub use openai::OpenAiClient;
pub use provider::{ChatMessage, ChatRequest, ChatResponse, LlmClient, ProviderError};
pub use stream::StreamEvent;
