//! 工具层：注册表、search_knowledge_base、调用代理与 schema 生成

pub mod executor;
pub mod registry;
pub mod schema;
pub mod search;

pub use executor::{ToolCallResult, ToolInvocationBroker};
pub use registry::{Tool, ToolDefinition, ToolRegistry};
pub use schema::{answer_response_schema, parse_model_answer, search_arguments_schema, ModelAnswer, SearchArgs};
pub use search::{SearchKnowledgeBaseTool, SEARCH_TOOL_NAME};
