//! Docent - 文档助手
//!
//! 模块划分：
//! - **assistant**: 提问与目录管理门面（CLI / HTTP 共用）
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 错误、会话状态机、编排会话与启动构建
//! - **fallback**: 无模型时的关键词规则兜底
//! - **guardrails**: 脱敏与内容过滤端口（远端 HTTP / 本地正则）
//! - **knowledge**: 文档目录、持久化与加权检索
//! - **llm**: LLM 客户端抽象与实现（OpenAI 兼容 / Mock）
//! - **pipeline**: 诊断轨迹记录与归一化
//! - **tools**: 工具注册表、search_knowledge_base 与调用代理
//! - **web**: axum HTTP 接口（feature = "web"）

pub mod assistant;
pub mod config;
pub mod core;
pub mod fallback;
pub mod guardrails;
pub mod knowledge;
pub mod llm;
pub mod observability;
pub mod pipeline;
pub mod tools;
#[cfg(feature = "web")]
pub mod web;

pub use assistant::{AskRequest, AskResponse, DocAssistant};
pub use core::{AssistantBuilder, AssistantError, Backend};
