//! 文档助手门面：CLI 与 HTTP 共用的提问与目录管理入口
//!
//! 真实后端走编排会话；Mock 后端或会话以 MALFORMED_OUTPUT / UPSTREAM_ERROR 结束时，
//! 改用规则兜底并把回答标记为 synthetic。

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::core::{AssistantAnswer, AssistantError, OrchestrationSession, SessionState};
use crate::fallback::FallbackResponder;
use crate::knowledge::{DocEntry, DocEntryPatch, KnowledgeIndex, NewDocEntry, ServiceSummary};
use crate::pipeline::PipelineRecord;

pub use crate::core::LinkInfo;

/// 问题最大长度（字符数）
pub const MAX_QUESTION_CHARS: usize = 2000;

/// 提问请求
#[derive(Clone, Debug, Default, Deserialize)]
pub struct AskRequest {
    pub question: String,
    /// 是否附带诊断轨迹；缺省取 app.show_pipeline_default
    #[serde(default)]
    pub show_pipeline: Option<bool>,
}

impl AskRequest {
    pub fn new(question: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            show_pipeline: None,
        }
    }

    pub fn with_pipeline(mut self, show: bool) -> Self {
        self.show_pipeline = Some(show);
        self
    }

    /// 长度必须在 1..=2000 字符之间；仅含空白的问题合法，由 ask 返回模板回答
    pub fn validate(&self) -> Result<(), AssistantError> {
        let len = self.question.chars().count();
        if len == 0 {
            return Err(AssistantError::InvalidRequest("question must not be empty".to_string()));
        }
        if len > MAX_QUESTION_CHARS {
            return Err(AssistantError::InvalidRequest(format!(
                "question exceeds {} characters",
                MAX_QUESTION_CHARS
            )));
        }
        Ok(())
    }
}

/// 提问响应
#[derive(Clone, Debug, Serialize)]
pub struct AskResponse {
    pub is_relevant: bool,
    pub confidence: f64,
    pub services: Vec<String>,
    pub links: Vec<LinkInfo>,
    pub answer_text: String,
    /// 回答来自规则兜底而非模型
    pub synthetic: bool,
    pub pipeline: Option<PipelineRecord>,
}

impl AskResponse {
    fn from_answer(answer: AssistantAnswer, synthetic: bool, pipeline: Option<PipelineRecord>) -> Self {
        Self {
            is_relevant: answer.is_relevant,
            confidence: answer.confidence,
            services: answer.services,
            links: answer.links,
            answer_text: answer.answer_text,
            synthetic,
            pipeline,
        }
    }
}

pub struct DocAssistant {
    index: Arc<KnowledgeIndex>,
    session: Option<OrchestrationSession>,
    fallback: FallbackResponder,
    fallback_on_failure: bool,
    show_pipeline_default: bool,
}

impl DocAssistant {
    pub(crate) fn new(
        index: Arc<KnowledgeIndex>,
        session: Option<OrchestrationSession>,
        fallback: FallbackResponder,
        fallback_on_failure: bool,
        show_pipeline_default: bool,
    ) -> Self {
        Self {
            index,
            session,
            fallback,
            fallback_on_failure,
            show_pipeline_default,
        }
    }

    /// "real" 或 "mock"
    pub fn backend_name(&self) -> &'static str {
        if self.session.is_some() {
            "real"
        } else {
            "mock"
        }
    }

    pub fn index(&self) -> &Arc<KnowledgeIndex> {
        &self.index
    }

    pub async fn ask(&self, request: AskRequest) -> Result<AskResponse, AssistantError> {
        self.ask_with_cancel(request, CancellationToken::new()).await
    }

    /// 取消令牌触发后会话在下一个等待点结束为 CANCELLED
    pub async fn ask_with_cancel(
        &self,
        request: AskRequest,
        cancel: CancellationToken,
    ) -> Result<AskResponse, AssistantError> {
        request.validate()?;
        let show_pipeline = request.show_pipeline.unwrap_or(self.show_pipeline_default);
        let span = tracing::info_span!("ask", session_id = %uuid::Uuid::new_v4());
        async move {
            let question = request.question.trim();
            if question.is_empty() {
                return Ok(AskResponse::from_answer(
                    AssistantAnswer::empty_question(),
                    false,
                    show_pipeline.then(PipelineRecord::default),
                ));
            }

            let (answer, synthetic, pipeline) = match &self.session {
                Some(session) => {
                    let outcome = session.run(question, &cancel).await;
                    tracing::info!(state = %outcome.state, "session finished");
                    if self.should_fall_back(outcome.state) {
                        match self.fallback.respond(question).await {
                            Ok(fb) => (fb.answer, true, outcome.pipeline),
                            Err(e) => {
                                tracing::warn!(error = %e, "fallback responder failed");
                                (outcome.answer, false, outcome.pipeline)
                            }
                        }
                    } else {
                        (outcome.answer, false, outcome.pipeline)
                    }
                }
                None => match self.fallback.respond(question).await {
                    Ok(fb) => (fb.answer, true, fb.pipeline),
                    Err(e) => {
                        tracing::warn!(error = %e, "fallback responder failed");
                        (AssistantAnswer::fallback(), true, PipelineRecord::default())
                    }
                },
            };

            Ok(AskResponse::from_answer(
                answer,
                synthetic,
                show_pipeline.then_some(pipeline),
            ))
        }
        .instrument(span)
        .await
    }

    fn should_fall_back(&self, state: SessionState) -> bool {
        self.fallback_on_failure && state.wants_fallback()
    }

    pub async fn list_entries(&self, service: Option<&str>) -> Result<Vec<DocEntry>, AssistantError> {
        self.index.list_by_service(service).await
    }

    pub async fn add_entry(&self, entry: NewDocEntry) -> Result<DocEntry, AssistantError> {
        self.index.add(entry).await
    }

    pub async fn update_entry(&self, id: &str, patch: DocEntryPatch) -> Result<DocEntry, AssistantError> {
        self.index.update(id, patch).await
    }

    /// 条目不存在时返回 CatalogNotFound
    pub async fn delete_entry(&self, id: &str) -> Result<(), AssistantError> {
        if self.index.delete(id).await? {
            Ok(())
        } else {
            Err(AssistantError::CatalogNotFound(id.to_string()))
        }
    }

    pub async fn services(&self) -> Result<Vec<ServiceSummary>, AssistantError> {
        self.index.services().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_length() {
        assert!(AskRequest::new("").validate().is_err());
        assert!(AskRequest::new("   ").validate().is_ok());
        assert!(AskRequest::new("x".repeat(MAX_QUESTION_CHARS)).validate().is_ok());
        assert!(matches!(
            AskRequest::new("x".repeat(MAX_QUESTION_CHARS + 1)).validate(),
            Err(AssistantError::InvalidRequest(_))
        ));
    }

    #[test]
    fn test_request_deserialize_defaults() {
        let req: AskRequest = serde_json::from_str(r#"{"question":"hi"}"#).unwrap();
        assert_eq!(req.question, "hi");
        assert!(req.show_pipeline.is_none());
    }
}
