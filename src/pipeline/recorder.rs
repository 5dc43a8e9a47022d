//! PipelineRecorder：在单一边界把各端口的原始诊断归一化为 PipelineRecord
//!
//! 过滤阶段的 passed 只由诊断中的状态文本与「通过」哨兵串比对得出，从不读取显式字段；
//! 没有状态文本时视为未通过。

use std::collections::BTreeSet;
use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;

use crate::core::{FilterStage, SessionState};
use crate::guardrails::MaskOutcome;
use crate::llm::{Message, TokenUsage};
use crate::pipeline::record::{
    BlockRecord, ContentFilteringRecord, FilterRecord, FilterScores, LlmRecord, MaskingRecord, MessageRecord,
    PipelineRecord, RawDiagnostic, ResultPreview, ToolCallRecord,
};

/// 过滤通过时状态文本中包含的哨兵串（大小写不敏感）
pub const PASSED_SENTINEL: &str = "passed successfully";

const PREVIEW_LIMIT: usize = 5;

pub fn is_passed_message(message: &str) -> bool {
    message.to_lowercase().contains(PASSED_SENTINEL)
}

fn masked_marker() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"MASKED_(\w+)").expect("valid masked marker regex"))
}

/// 从文本中收集 MASKED_<ENTITY> 标记（去重、排序）
pub fn masked_entities(text: &str) -> Vec<String> {
    masked_marker()
        .captures_iter(text)
        .filter_map(|c| c.get(1).map(|m| m.as_str().to_string()))
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

fn score_of(scores: &Value, keys: &[&str]) -> i64 {
    keys.iter()
        .find_map(|k| scores.get(*k))
        .and_then(|v| v.as_i64().or_else(|| v.as_f64().map(|f| f.round() as i64)))
        .unwrap_or(0)
}

/// 提取内容安全分数：顶层或 choices[0] 下的 azure_content_safety，兼容 PascalCase / snake_case
pub fn extract_scores(data: &Value) -> Option<FilterScores> {
    let scores = data.get("azure_content_safety").or_else(|| {
        data.get("choices")
            .and_then(|c| c.get(0))
            .and_then(|c| c.get("azure_content_safety"))
    })?;
    Some(FilterScores {
        hate: score_of(scores, &["Hate", "hate"]),
        self_harm: score_of(scores, &["SelfHarm", "self_harm"]),
        sexual: score_of(scores, &["Sexual", "sexual"]),
        violence: score_of(scores, &["Violence", "violence"]),
    })
}

/// 由原始诊断构造过滤记录；诊断中没有分数时用端口给出的分数
pub fn normalize_filter(diagnostic: &RawDiagnostic, fallback_scores: FilterScores) -> FilterRecord {
    let normalized = diagnostic.normalize();
    let passed = normalized
        .message
        .as_deref()
        .map(is_passed_message)
        .unwrap_or(false);
    FilterRecord {
        scores: extract_scores(&normalized.data).unwrap_or(fallback_scores),
        passed,
        message: normalized.message,
    }
}

fn summarize_tool_payload(payload: &str) -> (usize, Vec<ResultPreview>, Option<String>) {
    match serde_json::from_str::<Value>(payload) {
        Ok(Value::Array(items)) => {
            let preview = items
                .iter()
                .take(PREVIEW_LIMIT)
                .map(|item| ResultPreview {
                    id: item.get("id").and_then(Value::as_str).unwrap_or_default().to_string(),
                    title: item
                        .get("title")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string(),
                })
                .collect();
            (items.len(), preview, None)
        }
        Ok(Value::Object(map)) => {
            let error = map.get("error").and_then(Value::as_str).map(str::to_string);
            (0, Vec::new(), error)
        }
        _ => (0, Vec::new(), Some("unparseable tool payload".to_string())),
    }
}

/// 逐阶段累积 PipelineRecord
#[derive(Debug, Default)]
pub struct PipelineRecorder {
    record: PipelineRecord,
}

impl PipelineRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_masking(&mut self, original: &str, outcome: &MaskOutcome) {
        let mut entities: BTreeSet<String> = outcome.entities_found.iter().cloned().collect();
        if entities.is_empty() {
            let normalized = outcome.raw.normalize();
            let template = normalized
                .data
                .get("masked_template")
                .and_then(Value::as_str)
                .unwrap_or(&outcome.masked_text);
            entities.extend(masked_entities(template));
        }
        self.record.data_masking = Some(MaskingRecord {
            original_query: original.to_string(),
            masked_query: outcome.masked_text.clone(),
            entities_masked: entities.into_iter().collect(),
        });
    }

    /// 记录过滤阶段并返回归一化结果
    pub fn record_filter(
        &mut self,
        stage: FilterStage,
        diagnostic: &RawDiagnostic,
        port_scores: FilterScores,
    ) -> FilterRecord {
        let record = normalize_filter(diagnostic, port_scores);
        self.put_filter(stage, record.clone());
        record
    }

    /// 端口以 Blocked 错误返回时：无论状态文本为何都记为未通过
    pub fn record_filter_blocked(
        &mut self,
        stage: FilterStage,
        message: &str,
        diagnostic: &RawDiagnostic,
    ) -> FilterRecord {
        let mut record = normalize_filter(diagnostic, FilterScores::default());
        record.passed = false;
        if record.message.is_none() {
            record.message = Some(message.to_string());
        }
        self.put_filter(stage, record.clone());
        self.record_blocked(&format!("{stage}_filtering"), message);
        record
    }

    fn put_filter(&mut self, stage: FilterStage, record: FilterRecord) {
        let filtering = self
            .record
            .content_filtering
            .get_or_insert_with(ContentFilteringRecord::default);
        match stage {
            FilterStage::Input => filtering.input = Some(record),
            FilterStage::Output => filtering.output = Some(record),
        }
    }

    pub fn record_llm(&mut self, model: &str, usage: TokenUsage) {
        self.record.llm = Some(LlmRecord {
            model: model.to_string(),
            prompt_tokens: usage.prompt_tokens,
            completion_tokens: usage.completion_tokens,
            blocked_by: None,
            reason: None,
        });
    }

    /// 记录拦截来源；不触碰未执行阶段的子记录
    pub fn record_blocked(&mut self, blocked_by: &str, reason: &str) {
        self.record.blocked = Some(BlockRecord {
            blocked_by: blocked_by.to_string(),
            reason: reason.to_string(),
        });
    }

    /// 模型服务拦截了调用：llm 子记录带上拦截原因，保留已有用量
    pub fn record_llm_blocked(&mut self, model: &str, reason: &str) {
        let llm = self.record.llm.get_or_insert_with(|| LlmRecord {
            model: model.to_string(),
            ..Default::default()
        });
        llm.blocked_by = Some("llm".to_string());
        llm.reason = Some(reason.to_string());
        self.record_blocked("llm", reason);
    }

    /// 记录实际发送给模型的（脱敏后）消息
    pub fn record_messages(&mut self, history: &[Message]) {
        self.record.messages_to_llm = history
            .iter()
            .map(|m| MessageRecord {
                role: m.role.to_string(),
                content: m.content.clone(),
            })
            .collect();
    }

    pub fn record_tool_call(&mut self, tool_name: &str, arguments: &Value, payload: &str) {
        let (result_count, results_preview, error) = summarize_tool_payload(payload);
        self.record
            .tool_calls
            .get_or_insert_with(Vec::new)
            .push(ToolCallRecord {
                tool_name: tool_name.to_string(),
                arguments: arguments.clone(),
                result_count,
                results_preview,
                error,
            });
    }

    pub fn set_outcome(&mut self, state: SessionState) {
        self.record.outcome = Some(state);
    }

    pub fn record(&self) -> &PipelineRecord {
        &self.record
    }

    pub fn finish(self) -> PipelineRecord {
        self.record
    }
}
