pub mod memory;
pub mod redis_buffer;
pub mod types;

pub use memory::MemoryBuffer;
pub use redis_buffer::RedisBuffer;
pub use types::{BufferedMessage, ConversationBuffer};
