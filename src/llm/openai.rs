//! OpenAI 兼容 Chat Completions 客户端
//!
//! 通过 reqwest 直接调用任意 OpenAI 兼容端点（可配置 base_url），支持 function tools 与
//! response_format=json_schema。内容安全拦截（HTTP 错误码 content_filter 或 finish_reason=content_filter）
//! 映射为 PortError::Blocked，其余传输 / 状态码失败映射为 Unavailable / Timeout。

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::core::PortError;
use crate::llm::{LlmClient, LlmCompletion, Message, ResponseSchema, Role, TokenUsage, ToolCallRequest};
use crate::pipeline::RawDiagnostic;
use crate::tools::ToolDefinition;

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// 显式配置优先，其次环境变量 OPENAI_API_KEY；空串视为未配置
pub fn resolve_api_key(configured: Option<&str>) -> Option<String> {
    configured
        .map(str::to_string)
        .or_else(|| std::env::var("OPENAI_API_KEY").ok())
        .filter(|k| !k.trim().is_empty())
}

/// OpenAI 兼容客户端：持有 HTTP client、端点、模型名与 max_tokens
pub struct OpenAiClient {
    http: Client,
    base_url: String,
    api_key: String,
    model: String,
    max_tokens: u32,
    timeout_secs: u64,
}

impl OpenAiClient {
    pub fn new(
        base_url: Option<&str>,
        model: &str,
        api_key: &str,
        max_tokens: u32,
        timeout_secs: u64,
    ) -> Result<Self, PortError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| PortError::unavailable(format!("http client: {e}")))?;
        Ok(Self {
            http,
            base_url: base_url
                .unwrap_or(DEFAULT_BASE_URL)
                .trim_end_matches('/')
                .to_string(),
            api_key: api_key.to_string(),
            model: model.to_string(),
            max_tokens,
            timeout_secs,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }

    pub(crate) fn build_request_body(
        &self,
        history: &[Message],
        tools: &[ToolDefinition],
        response_schema: Option<&ResponseSchema>,
    ) -> Value {
        let mut body = json!({
            "model": self.model,
            "max_tokens": self.max_tokens,
            "messages": history.iter().map(message_to_openai).collect::<Vec<_>>(),
        });
        if !tools.is_empty() {
            body["tools"] = Value::Array(tools.iter().map(tool_to_openai).collect());
        }
        if let Some(schema) = response_schema {
            body["response_format"] = json!({
                "type": "json_schema",
                "json_schema": {
                    "name": schema.name,
                    "schema": schema.schema,
                }
            });
        }
        body
    }

    fn map_send_error(&self, e: reqwest::Error) -> PortError {
        if e.is_timeout() {
            PortError::Timeout(self.timeout_secs)
        } else {
            PortError::unavailable(e.to_string())
        }
    }
}

fn message_to_openai(message: &Message) -> Value {
    match message.role {
        Role::Tool => json!({
            "role": "tool",
            "tool_call_id": message.tool_call_id,
            "content": message.content,
        }),
        Role::Assistant if !message.tool_calls.is_empty() => {
            let tool_calls: Vec<Value> = message
                .tool_calls
                .iter()
                .map(|tc| {
                    // 无法解析为 JSON 的参数以原始字符串保存，原样回传
                    let arguments = match &tc.arguments {
                        Value::String(raw) => raw.clone(),
                        other => other.to_string(),
                    };
                    json!({
                        "id": tc.id,
                        "type": "function",
                        "function": {
                            "name": tc.name,
                            "arguments": arguments,
                        }
                    })
                })
                .collect();
            let content = if message.content.is_empty() {
                Value::Null
            } else {
                Value::String(message.content.clone())
            };
            json!({"role": "assistant", "content": content, "tool_calls": tool_calls})
        }
        role => json!({"role": role.to_string(), "content": message.content}),
    }
}

fn tool_to_openai(tool: &ToolDefinition) -> Value {
    json!({
        "type": "function",
        "function": {
            "name": tool.name,
            "description": tool.description,
            "parameters": tool.parameters,
        }
    })
}

/// 错误体中的 content_filter 判定（OpenAI / Azure 两种写法）
fn is_content_filter_error(body: &Value) -> bool {
    let error = body.get("error").unwrap_or(body);
    ["code", "type", "innererror"]
        .iter()
        .filter_map(|k| error.get(*k))
        .any(|v| v.to_string().contains("content_filter"))
}

fn error_message(body: &Value, fallback: &str) -> String {
    body.get("error")
        .and_then(|e| e.get("message"))
        .and_then(Value::as_str)
        .unwrap_or(fallback)
        .to_string()
}

#[derive(Debug, Deserialize)]
struct OpenAIResponse {
    #[serde(default)]
    model: String,
    #[serde(default)]
    choices: Vec<Choice>,
    usage: Option<ResponseUsage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Option<ResponseMessage>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
    tool_calls: Option<Vec<ResponseToolCall>>,
}

#[derive(Debug, Deserialize)]
struct ResponseToolCall {
    id: String,
    function: ResponseFunction,
}

#[derive(Debug, Deserialize)]
struct ResponseFunction {
    name: String,
    arguments: String,
}

#[derive(Debug, Deserialize)]
struct ResponseUsage {
    prompt_tokens: u64,
    completion_tokens: u64,
}

/// 解析成功响应体；finish_reason=content_filter 视为拦截
pub(crate) fn parse_completion(body: Value, fallback_model: &str) -> Result<LlmCompletion, PortError> {
    let response: OpenAIResponse = serde_json::from_value(body.clone())
        .map_err(|e| PortError::unavailable(format!("unparseable completion: {e}")))?;
    let raw = RawDiagnostic::from_value(body);

    let choice = response
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| PortError::unavailable("completion has no choices"))?;
    if choice.finish_reason.as_deref() == Some("content_filter") {
        return Err(PortError::blocked("completion filtered by provider", raw));
    }

    let (content, tool_calls) = match choice.message {
        Some(msg) => {
            let calls = msg
                .tool_calls
                .unwrap_or_default()
                .into_iter()
                .map(|tc| ToolCallRequest {
                    arguments: serde_json::from_str(&tc.function.arguments)
                        .unwrap_or(Value::String(tc.function.arguments)),
                    id: tc.id,
                    name: tc.function.name,
                })
                .collect();
            (msg.content.unwrap_or_default(), calls)
        }
        None => (String::new(), Vec::new()),
    };

    let usage = response
        .usage
        .map(|u| TokenUsage {
            prompt_tokens: u.prompt_tokens,
            completion_tokens: u.completion_tokens,
        })
        .unwrap_or_default();
    let model = if response.model.is_empty() {
        fallback_model.to_string()
    } else {
        response.model
    };

    Ok(LlmCompletion {
        message: Message::assistant_tool_calls(content, tool_calls),
        usage,
        model,
        raw,
    })
}

#[async_trait]
impl LlmClient for OpenAiClient {
    fn model(&self) -> &str {
        &self.model
    }

    async fn complete(
        &self,
        history: &[Message],
        tools: &[ToolDefinition],
        response_schema: Option<&ResponseSchema>,
    ) -> Result<LlmCompletion, PortError> {
        let body = self.build_request_body(history, tools, response_schema);
        let response = self
            .http
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;

        let status = response.status();
        let text = response.text().await.map_err(|e| self.map_send_error(e))?;
        let body: Value = serde_json::from_str(&text).unwrap_or(Value::Null);

        if !status.is_success() {
            if is_content_filter_error(&body) {
                let message = error_message(&body, "request filtered by provider");
                tracing::warn!(status = status.as_u16(), "llm request blocked by provider");
                return Err(PortError::blocked(message, RawDiagnostic::from_value(body)));
            }
            let preview: String = text.chars().take(200).collect();
            return Err(PortError::unavailable(format!("HTTP {}: {}", status.as_u16(), preview)));
        }

        let completion = parse_completion(body, &self.model)?;
        tracing::debug!(
            model = %completion.model,
            prompt_tokens = completion.usage.prompt_tokens,
            completion_tokens = completion.usage.completion_tokens,
            tool_calls = completion.tool_calls().len(),
            "llm completion"
        );
        Ok(completion)
    }
}
