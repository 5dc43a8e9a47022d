//! LLM 层：客户端抽象与实现（OpenAI 兼容 / Mock）

pub mod mock;
pub mod openai;
pub mod traits;

pub use mock::{MockLlmClient, MockReply, RecordedCall};
pub use openai::{resolve_api_key, OpenAiClient};
pub use traits::{LlmClient, LlmCompletion, Message, ResponseSchema, Role, TokenUsage, ToolCallRequest};
