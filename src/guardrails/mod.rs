//! 护栏端口：脱敏（AnonymizationPort）与内容安全（SafetyPort）
//!
//! 配置了 guardrails.endpoint 时使用 HttpGuardrailClient，否则使用本地实现
//! （RegexAnonymizer + BlocklistSafetyFilter）。

pub mod http;
pub mod local;

use async_trait::async_trait;

use crate::core::{FilterStage, PortError};
use crate::pipeline::{FilterScores, RawDiagnostic};

pub use http::HttpGuardrailClient;
pub use local::{BlocklistSafetyFilter, RegexAnonymizer};

/// 脱敏结果
#[derive(Clone, Debug, Default)]
pub struct MaskOutcome {
    pub masked_text: String,
    pub entities_found: Vec<String>,
    pub raw: RawDiagnostic,
}

/// 内容安全筛查结果；passed 为端口自身的判断，会话以诊断文本归一化后的结论为准
#[derive(Clone, Debug, Default)]
pub struct ScreenOutcome {
    pub category_scores: FilterScores,
    pub passed: bool,
    pub raw: RawDiagnostic,
}

#[async_trait]
pub trait AnonymizationPort: Send + Sync {
    async fn mask(&self, text: &str) -> Result<MaskOutcome, PortError>;
}

#[async_trait]
pub trait SafetyPort: Send + Sync {
    async fn screen(&self, text: &str, stage: FilterStage) -> Result<ScreenOutcome, PortError>;
}
