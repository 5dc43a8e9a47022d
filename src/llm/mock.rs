//! Mock LLM 客户端（用于测试，无需 API）
//!
//! 按脚本依次返回预设回复（正文 / 工具调用 / 不可用 / 拦截），并记录每次收到的请求，便于断言会话行为。

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::core::PortError;
use crate::llm::{LlmClient, LlmCompletion, Message, ResponseSchema, TokenUsage, ToolCallRequest};
use crate::pipeline::RawDiagnostic;
use crate::tools::ToolDefinition;

/// 一条脚本回复
#[derive(Clone, Debug)]
pub enum MockReply {
    Content(String),
    ToolCalls(Vec<ToolCallRequest>),
    Unavailable(String),
    Blocked(String),
}

/// 一次调用的快照
#[derive(Clone, Debug)]
pub struct RecordedCall {
    pub history: Vec<Message>,
    pub tool_names: Vec<String>,
    pub has_response_schema: bool,
}

/// 脚本化 Mock 客户端；脚本耗尽后返回 Unavailable
#[derive(Debug, Default)]
pub struct MockLlmClient {
    replies: Mutex<VecDeque<MockReply>>,
    calls: Mutex<Vec<RecordedCall>>,
    delay: Option<Duration>,
}

impl MockLlmClient {
    pub fn new(replies: impl IntoIterator<Item = MockReply>) -> Self {
        Self {
            replies: Mutex::new(replies.into_iter().collect()),
            ..Default::default()
        }
    }

    /// 每次调用前等待，用于超时与取消场景
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    fn next_reply(&self) -> Option<MockReply> {
        self.replies.lock().ok().and_then(|mut r| r.pop_front())
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    fn model(&self) -> &str {
        "mock"
    }

    async fn complete(
        &self,
        history: &[Message],
        tools: &[ToolDefinition],
        response_schema: Option<&ResponseSchema>,
    ) -> Result<LlmCompletion, PortError> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(RecordedCall {
                history: history.to_vec(),
                tool_names: tools.iter().map(|t| t.name.clone()).collect(),
                has_response_schema: response_schema.is_some(),
            });
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let message = match self.next_reply() {
            Some(MockReply::Content(content)) => Message::assistant(content),
            Some(MockReply::ToolCalls(calls)) => Message::assistant_tool_calls("", calls),
            Some(MockReply::Unavailable(reason)) => return Err(PortError::unavailable(reason)),
            Some(MockReply::Blocked(reason)) => {
                let raw = RawDiagnostic::from_value(serde_json::json!({"message": reason}));
                return Err(PortError::blocked(reason, raw));
            }
            None => return Err(PortError::unavailable("mock script exhausted")),
        };

        let prompt_chars: usize = history.iter().map(|m| m.content.chars().count()).sum();
        Ok(LlmCompletion {
            usage: TokenUsage {
                prompt_tokens: (prompt_chars / 4) as u64,
                completion_tokens: (message.content.chars().count() / 4) as u64,
            },
            message,
            model: "mock".to_string(),
            raw: RawDiagnostic::Empty,
        })
    }
}
