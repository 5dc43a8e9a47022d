//! 核心编排层：错误、会话状态、编排会话与启动构建

pub mod builder;
pub mod error;
pub mod session;
pub mod state;

pub use builder::{guardrail_ports, AssistantBuilder, Backend};
pub use error::{AssistantError, FilterStage, PortError};
pub use session::{
    system_prompt, AssistantAnswer, LinkInfo, OrchestrationContext, OrchestrationSession, Ports, SessionOutcome,
    SessionTimeouts, BLOCKED_ANSWER, EMPTY_QUESTION_ANSWER, FALLBACK_ANSWER,
};
pub use state::SessionState;
