//! 诊断记录：端口原始诊断（RawDiagnostic）与归一化后的 PipelineRecord
//!
//! 端口在成功路径与错误路径上返回的诊断形状并不一致：有时是带 message / data 的结构体，
//! 有时只是一个松散的 JSON map。RawDiagnostic 同时承载两种形状，只在 PipelineRecorder 处归一化。

use serde::Serialize;
use serde_json::{Map, Value};

use crate::core::SessionState;

/// 结构化的模块诊断（message + data）
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ModuleDiagnostic {
    pub message: String,
    pub data: Value,
}

impl ModuleDiagnostic {
    pub fn new(message: impl Into<String>, data: Value) -> Self {
        Self {
            message: message.into(),
            data,
        }
    }
}

/// 端口返回的原始诊断
#[derive(Clone, Debug, Default, PartialEq)]
pub enum RawDiagnostic {
    Structured(ModuleDiagnostic),
    Untyped(Map<String, Value>),
    #[default]
    Empty,
}

/// 归一化后的诊断视图
#[derive(Clone, Debug, Default, PartialEq)]
pub struct NormalizedDiagnostic {
    pub message: Option<String>,
    pub data: Value,
}

impl RawDiagnostic {
    pub fn structured(message: impl Into<String>, data: Value) -> Self {
        Self::Structured(ModuleDiagnostic::new(message, data))
    }

    /// 任意 JSON 值：对象视为松散 map，其余视为空
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Object(map) => Self::Untyped(map),
            _ => Self::Empty,
        }
    }

    /// 统一为 (message, data)：松散 map 中若没有 data 字段，则整张 map（去掉 message）即为 data
    pub fn normalize(&self) -> NormalizedDiagnostic {
        match self {
            RawDiagnostic::Structured(d) => NormalizedDiagnostic {
                message: Some(d.message.trim().to_string()).filter(|m| !m.is_empty()),
                data: d.data.clone(),
            },
            RawDiagnostic::Untyped(map) => {
                let message = map
                    .get("message")
                    .and_then(Value::as_str)
                    .map(|m| m.trim().to_string())
                    .filter(|m| !m.is_empty());
                let data = match map.get("data") {
                    Some(data) => data.clone(),
                    None => {
                        let mut rest = map.clone();
                        rest.remove("message");
                        Value::Object(rest)
                    }
                };
                NormalizedDiagnostic { message, data }
            }
            RawDiagnostic::Empty => NormalizedDiagnostic::default(),
        }
    }
}

/// 内容安全四类分数
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct FilterScores {
    pub hate: i64,
    pub self_harm: i64,
    pub sexual: i64,
    pub violence: i64,
}

impl FilterScores {
    pub fn is_zero(&self) -> bool {
        *self == Self::default()
    }
}

/// 脱敏阶段记录
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct MaskingRecord {
    pub original_query: String,
    pub masked_query: String,
    pub entities_masked: Vec<String>,
}

/// 单个过滤阶段的记录
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct FilterRecord {
    #[serde(flatten)]
    pub scores: FilterScores,
    pub passed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// 输入 / 输出过滤
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct ContentFilteringRecord {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input: Option<FilterRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<FilterRecord>,
}

/// 会话被拦截时的来源与原因
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct BlockRecord {
    pub blocked_by: String,
    pub reason: String,
}

/// 最后一次模型调用的用量；模型服务自身拦截时带 blocked_by / reason
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct LlmRecord {
    pub model: String,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blocked_by: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct MessageRecord {
    pub role: String,
    pub content: String,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ResultPreview {
    pub id: String,
    pub title: String,
}

/// 工具调用摘要
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ToolCallRecord {
    pub tool_name: String,
    pub arguments: Value,
    pub result_count: usize,
    pub results_preview: Vec<ResultPreview>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// 一次会话的完整诊断轨迹；未执行的阶段保持缺省
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct PipelineRecord {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_masking: Option<MaskingRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_filtering: Option<ContentFilteringRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub llm: Option<LlmRecord>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub messages_to_llm: Vec<MessageRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCallRecord>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blocked: Option<BlockRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<SessionState>,
}

impl PipelineRecord {
    pub fn input_filter(&self) -> Option<&FilterRecord> {
        self.content_filtering.as_ref().and_then(|c| c.input.as_ref())
    }

    pub fn output_filter(&self) -> Option<&FilterRecord> {
        self.content_filtering.as_ref().and_then(|c| c.output.as_ref())
    }
}
