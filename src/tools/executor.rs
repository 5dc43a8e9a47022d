//! 工具调用代理（ToolInvocationBroker）
//!
//! 持有 ToolRegistry 与单次调用超时；invoke 在超时内执行一个 ToolCallRequest 并按调用 id 返回 ToolCallResult，
//! 每次调用输出结构化审计日志（JSON）。invoke_round 并发执行同一轮的全部调用，结果顺序与请求顺序一致；
//! 单个调用失败时以 {"error": ...} 载荷交还给模型，不中断本轮。

use std::time::{Duration, Instant};

use futures_util::future::join_all;
use serde_json::{json, Value};
use tokio::time::timeout;

use crate::core::AssistantError;
use crate::llm::ToolCallRequest;
use crate::tools::{ToolDefinition, ToolRegistry};

/// 返回给模型的工具结果
#[derive(Clone, Debug, PartialEq)]
pub struct ToolCallResult {
    pub tool_call_id: String,
    pub payload: String,
}

pub struct ToolInvocationBroker {
    registry: ToolRegistry,
    timeout: Duration,
}

impl ToolInvocationBroker {
    pub fn new(registry: ToolRegistry, timeout_secs: u64) -> Self {
        Self {
            registry,
            timeout: Duration::from_secs(timeout_secs),
        }
    }

    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.registry.definitions()
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.registry.tool_names()
    }

    /// 执行单个调用；超时返回 ToolTimeout，参数非法返回 InvalidToolArguments
    pub async fn invoke(&self, request: &ToolCallRequest) -> Result<ToolCallResult, AssistantError> {
        let start = Instant::now();
        let args_preview = args_preview(&request.arguments);
        let result = timeout(
            self.timeout,
            self.registry.execute(&request.name, request.arguments.clone()),
        )
        .await;

        let (ok, outcome): (bool, &str) = match &result {
            Ok(Ok(_)) => (true, "ok"),
            Ok(Err(AssistantError::InvalidToolArguments(_))) => (false, "invalid_args"),
            Ok(Err(_)) => (false, "error"),
            Err(_) => (false, "timeout"),
        };
        let duration_ms = start.elapsed().as_millis() as u64;
        let audit = json!({
            "event": "tool_audit",
            "tool": request.name,
            "call_id": request.id,
            "ok": ok,
            "outcome": outcome,
            "duration_ms": duration_ms,
            "args_preview": args_preview,
        });
        tracing::info!(audit = %audit.to_string(), "tool");

        match result {
            Ok(Ok(payload)) => Ok(ToolCallResult {
                tool_call_id: request.id.clone(),
                payload,
            }),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(AssistantError::ToolTimeout(request.name.clone())),
        }
    }

    /// 并发执行一轮调用；每个请求恰好对应一个结果，顺序不变
    pub async fn invoke_round(&self, requests: &[ToolCallRequest]) -> Vec<ToolCallResult> {
        join_all(requests.iter().map(|request| async move {
            match self.invoke(request).await {
                Ok(result) => result,
                Err(e) => ToolCallResult {
                    tool_call_id: request.id.clone(),
                    payload: json!({"error": e.to_string()}).to_string(),
                },
            }
        }))
        .await
    }
}

fn args_preview(args: &Value) -> String {
    let s = args.to_string();
    if s.chars().count() > 200 {
        format!("{}...", s.chars().take(200).collect::<String>())
    } else {
        s
    }
}
