pub mod background;
pub mod context;
pub mod events;
pub mod pipeline;
pub mod prompt;

pub use context::ChatContext;
pub use events::ChatEvent;
pub use pipeline::{stream_chat, ChatTurnRequest};
pub use prompt::PromptBuilder;
