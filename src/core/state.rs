//! 编排会话状态
//!
//! INIT → MASK → FILTER_INPUT → LLM_1 → {TOOL_LOOP → LLM_2 | LLM_2} → FILTER_OUTPUT → VALIDATE → DONE，
//! 失败出口：BLOCKED_INPUT / BLOCKED_OUTPUT / MALFORMED_OUTPUT / UPSTREAM_ERROR（以及调用方断开时的 CANCELLED）。

use std::fmt;

use serde::{Serialize, Serializer};

/// 会话所处阶段
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    Init,
    Mask,
    FilterInput,
    Llm1,
    ToolLoop,
    Llm2,
    FilterOutput,
    Validate,
    Done,
    BlockedInput,
    BlockedOutput,
    MalformedOutput,
    UpstreamError,
    Cancelled,
}

impl SessionState {
    /// 终止状态：会话在此停止推进
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            SessionState::Done
                | SessionState::BlockedInput
                | SessionState::BlockedOutput
                | SessionState::MalformedOutput
                | SessionState::UpstreamError
                | SessionState::Cancelled
        )
    }

    /// 失败出口（非 DONE 的终止状态）
    pub fn is_failure(self) -> bool {
        self.is_terminal() && self != SessionState::Done
    }

    /// 是否需要由 FallbackResponder 兜底
    pub fn wants_fallback(self) -> bool {
        matches!(
            self,
            SessionState::MalformedOutput | SessionState::UpstreamError
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SessionState::Init => "INIT",
            SessionState::Mask => "MASK",
            SessionState::FilterInput => "FILTER_INPUT",
            SessionState::Llm1 => "LLM_1",
            SessionState::ToolLoop => "TOOL_LOOP",
            SessionState::Llm2 => "LLM_2",
            SessionState::FilterOutput => "FILTER_OUTPUT",
            SessionState::Validate => "VALIDATE",
            SessionState::Done => "DONE",
            SessionState::BlockedInput => "BLOCKED_INPUT",
            SessionState::BlockedOutput => "BLOCKED_OUTPUT",
            SessionState::MalformedOutput => "MALFORMED_OUTPUT",
            SessionState::UpstreamError => "UPSTREAM_ERROR",
            SessionState::Cancelled => "CANCELLED",
        }
    }
}

impl Serialize for SessionState {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
