//! 错误类型
//!
//! AssistantError 覆盖目录管理与请求校验等「调用方错误」；PortError 描述外部端口（脱敏 / 内容过滤 / LLM）的失败，
//! 由编排会话映射为具名终止状态，从不直接抛给提问方。

use std::fmt;

use thiserror::Error;

use crate::pipeline::RawDiagnostic;

/// 内容过滤所处阶段
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterStage {
    Input,
    Output,
}

impl fmt::Display for FilterStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterStage::Input => write!(f, "input"),
            FilterStage::Output => write!(f, "output"),
        }
    }
}

/// 外部端口错误：不可用（传输 / 鉴权 / 超时）或被护栏拦截
#[derive(Error, Debug)]
pub enum PortError {
    #[error("Port unavailable: {0}")]
    Unavailable(String),

    #[error("Port timed out after {0}s")]
    Timeout(u64),

    /// 被拦截时附带上游原始诊断（错误路径的形状可能与成功路径不同）
    #[error("Blocked: {message}")]
    Blocked {
        message: String,
        diagnostic: RawDiagnostic,
    },
}

impl PortError {
    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::Unavailable(msg.into())
    }

    pub fn blocked(message: impl Into<String>, diagnostic: RawDiagnostic) -> Self {
        Self::Blocked {
            message: message.into(),
            diagnostic,
        }
    }

    pub fn is_blocked(&self) -> bool {
        matches!(self, PortError::Blocked { .. })
    }
}

/// 助手层错误：请求校验、工具参数、目录 CRUD、IO 与配置
#[derive(Error, Debug)]
pub enum AssistantError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Invalid tool arguments: {0}")]
    InvalidToolArguments(String),

    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Tool timeout: {0}")]
    ToolTimeout(String),

    #[error("Entry '{0}' not found")]
    CatalogNotFound(String),

    #[error("Entry id '{0}' already exists")]
    CatalogDuplicateId(String),

    #[error("Service '{0}' not found in knowledge base")]
    UnknownService(String),

    #[error("No fields to update")]
    EmptyUpdate,

    #[error("Cancelled")]
    Cancelled,

    #[error("Config error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl AssistantError {
    /// 是否为调用方错误（HTTP 层映射为 4xx）
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            AssistantError::InvalidRequest(_)
                | AssistantError::InvalidToolArguments(_)
                | AssistantError::UnknownTool(_)
                | AssistantError::CatalogNotFound(_)
                | AssistantError::CatalogDuplicateId(_)
                | AssistantError::UnknownService(_)
                | AssistantError::EmptyUpdate
        )
    }
}
