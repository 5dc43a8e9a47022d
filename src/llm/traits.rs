//! LLM 客户端抽象
//!
//! 所有后端（OpenAI 兼容 / Mock）实现 LlmClient：一次 complete 携带完整对话历史、可调用工具描述
//! 与可选的结构化输出 schema，返回助手消息（正文或工具调用）、用量与原始诊断。

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::PortError;
use crate::pipeline::RawDiagnostic;
use crate::tools::ToolDefinition;

/// 消息角色
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Tool => "tool",
        };
        f.write_str(s)
    }
}

/// 模型发出的工具调用请求（只消费一次）
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRequest {
    pub id: String,
    pub name: String,
    /// 模型给出的参数对象；无法解析为 JSON 时保留原始字符串
    pub arguments: Value,
}

/// 对话消息
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCallRequest>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl Message {
    fn plain(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::plain(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::plain(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::plain(Role::Assistant, content)
    }

    /// 助手请求调用工具（正文可为空）
    pub fn assistant_tool_calls(content: impl Into<String>, tool_calls: Vec<ToolCallRequest>) -> Self {
        Self {
            tool_calls,
            ..Self::plain(Role::Assistant, content)
        }
    }

    /// 工具结果，按调用 id 关联
    pub fn tool_result(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            tool_call_id: Some(tool_call_id.into()),
            ..Self::plain(Role::Tool, content)
        }
    }
}

/// 结构化输出约束
#[derive(Clone, Debug, PartialEq)]
pub struct ResponseSchema {
    pub name: String,
    pub schema: Value,
}

/// 单次调用用量
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct TokenUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
}

/// 一次 complete 的结果
#[derive(Clone, Debug)]
pub struct LlmCompletion {
    pub message: Message,
    pub usage: TokenUsage,
    pub model: String,
    pub raw: RawDiagnostic,
}

impl LlmCompletion {
    pub fn tool_calls(&self) -> &[ToolCallRequest] {
        &self.message.tool_calls
    }

    pub fn has_tool_calls(&self) -> bool {
        !self.message.tool_calls.is_empty()
    }
}

/// LLM 端口：失败以 PortError 表达（Unavailable / Timeout / Blocked）
#[async_trait]
pub trait LlmClient: Send + Sync {
    fn model(&self) -> &str;

    async fn complete(
        &self,
        history: &[Message],
        tools: &[ToolDefinition],
        response_schema: Option<&ResponseSchema>,
    ) -> Result<LlmCompletion, PortError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_constructors() {
        let m = Message::tool_result("call_1", "[]");
        assert_eq!(m.role, Role::Tool);
        assert_eq!(m.tool_call_id.as_deref(), Some("call_1"));

        let call = ToolCallRequest {
            id: "call_1".into(),
            name: "search_knowledge_base".into(),
            arguments: serde_json::json!({"query": "deploy"}),
        };
        let a = Message::assistant_tool_calls("", vec![call]);
        assert_eq!(a.role.to_string(), "assistant");
        assert_eq!(a.tool_calls.len(), 1);
    }

    #[test]
    fn test_role_serde_lowercase() {
        assert_eq!(serde_json::to_string(&Role::Tool).unwrap(), "\"tool\"");
        let v = serde_json::to_value(Message::user("hi")).unwrap();
        assert!(v.get("tool_calls").is_none());
        assert!(v.get("tool_call_id").is_none());
    }
}
