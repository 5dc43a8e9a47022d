//! 编排会话（OrchestrationSession）
//!
//! 每个问题一个会话，按显式状态机推进：
//! INIT → MASK → FILTER_INPUT → LLM_1 → {TOOL_LOOP → LLM_2 | LLM_2} → FILTER_OUTPUT → VALIDATE → DONE。
//! 每次端口调用都有独立超时并可被 CancellationToken 打断；失败不重试，直接进入对应的终止状态。
//! 任何终止状态都产出完整的 AssistantAnswer，会话本身从不向调用方返回错误。

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::core::{FilterStage, PortError, SessionState};
use crate::guardrails::{AnonymizationPort, SafetyPort};
use crate::knowledge::{DocEntry, KnowledgeIndex};
use crate::llm::{LlmClient, Message, ResponseSchema, ToolCallRequest};
use crate::pipeline::{PipelineRecord, PipelineRecorder};
use crate::tools::{answer_response_schema, parse_model_answer, ModelAnswer, ToolInvocationBroker};

pub const BLOCKED_ANSWER: &str =
    "Your question was blocked by content filtering. Please rephrase your question.";
pub const FALLBACK_ANSWER: &str =
    "Unable to process the question. Please try again or rephrase your question.";
pub const EMPTY_QUESTION_ANSWER: &str = "Please provide a valid question.";

/// 会话依赖的三个外部端口
#[derive(Clone)]
pub struct Ports {
    pub llm: Arc<dyn LlmClient>,
    pub anonymizer: Arc<dyn AnonymizationPort>,
    pub safety: Arc<dyn SafetyPort>,
}

/// 端口调用超时
#[derive(Clone, Copy, Debug)]
pub struct SessionTimeouts {
    pub guardrail: Duration,
    pub llm: Duration,
}

impl Default for SessionTimeouts {
    fn default() -> Self {
        Self {
            guardrail: Duration::from_secs(10),
            llm: Duration::from_secs(60),
        }
    }
}

/// 返回给提问方的文档链接
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LinkInfo {
    pub title: String,
    pub url: String,
    pub description: String,
}

impl From<&DocEntry> for LinkInfo {
    fn from(e: &DocEntry) -> Self {
        Self {
            title: e.title.clone(),
            url: e.url.clone(),
            description: e.description.clone(),
        }
    }
}

/// 会话最终回答
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct AssistantAnswer {
    pub is_relevant: bool,
    pub confidence: f64,
    pub services: Vec<String>,
    pub links: Vec<LinkInfo>,
    pub answer_text: String,
}

impl AssistantAnswer {
    fn templated(text: &str, confidence: f64) -> Self {
        Self {
            is_relevant: false,
            confidence,
            services: Vec::new(),
            links: Vec::new(),
            answer_text: text.to_string(),
        }
    }

    pub fn blocked() -> Self {
        Self::templated(BLOCKED_ANSWER, 0.0)
    }

    pub fn fallback() -> Self {
        Self::templated(FALLBACK_ANSWER, 0.0)
    }

    pub fn empty_question() -> Self {
        Self::templated(EMPTY_QUESTION_ANSWER, 1.0)
    }
}

/// 单次请求的上下文
#[derive(Debug)]
pub struct OrchestrationContext {
    pub question: String,
    pub masked_question: Option<String>,
    pub history: Vec<Message>,
    pub recorder: PipelineRecorder,
    pending_tool_calls: Vec<ToolCallRequest>,
    tool_round_ran: bool,
    answer: Option<ModelAnswer>,
    links: Vec<LinkInfo>,
}

impl OrchestrationContext {
    pub fn new(question: &str) -> Self {
        Self {
            question: question.to_string(),
            masked_question: None,
            history: Vec::new(),
            recorder: PipelineRecorder::new(),
            pending_tool_calls: Vec::new(),
            tool_round_ran: false,
            answer: None,
            links: Vec::new(),
        }
    }

    /// 脱敏后的问题；脱敏被跳过时为原文
    pub fn effective_question(&self) -> &str {
        self.masked_question.as_deref().unwrap_or(&self.question)
    }
}

/// 会话结果
#[derive(Clone, Debug)]
pub struct SessionOutcome {
    pub state: SessionState,
    pub answer: AssistantAnswer,
    pub pipeline: PipelineRecord,
}

enum Interrupt {
    Port(PortError),
    Cancelled,
}

pub fn system_prompt(services_summary: &str) -> String {
    format!(
        "You are a documentation expert assistant.\n\
Your job is to help users find relevant documentation and provide detailed explanations.\n\n\
Available services in the knowledge base:\n{services_summary}\n\n\
Instructions:\n\
1. Use the search_knowledge_base tool to find relevant documentation\n\
2. You may call the tool several times in one turn with different queries or service filters\n\
3. After reviewing search results, respond with this JSON structure:\n\
   - is_relevant: whether the question relates to the services above\n\
   - services: list of relevant service keys\n\
   - doc_ids: IDs of the most relevant docs from search results (2-5 IDs)\n\
   - answer: detailed 1-2 paragraph explanation that directly addresses the question\n\
   - confidence: how well the available docs cover the question (0.0-1.0)\n\
4. If the question is NOT about these services, set is_relevant to false with empty services/doc_ids \
and explain what you can help with instead"
    )
}

/// 编排会话：只读共享 KnowledgeIndex，其余状态全部在 OrchestrationContext 中
pub struct OrchestrationSession {
    ports: Ports,
    broker: Arc<ToolInvocationBroker>,
    index: Arc<KnowledgeIndex>,
    timeouts: SessionTimeouts,
    response_schema: ResponseSchema,
}

impl OrchestrationSession {
    pub fn new(ports: Ports, broker: Arc<ToolInvocationBroker>, index: Arc<KnowledgeIndex>) -> Self {
        Self {
            ports,
            broker,
            index,
            timeouts: SessionTimeouts::default(),
            response_schema: answer_response_schema(),
        }
    }

    pub fn with_timeouts(mut self, timeouts: SessionTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    pub fn model(&self) -> &str {
        self.ports.llm.model()
    }

    /// 驱动状态机直到终止状态
    pub async fn run(&self, question: &str, cancel: &CancellationToken) -> SessionOutcome {
        let mut ctx = OrchestrationContext::new(question);
        let mut state = SessionState::Init;

        loop {
            tracing::debug!(state = %state, "session state");
            state = match state {
                SessionState::Init => SessionState::Mask,
                SessionState::Mask => self.mask(&mut ctx, cancel).await,
                SessionState::FilterInput => self.filter(&mut ctx, FilterStage::Input, cancel).await,
                SessionState::Llm1 => self.first_completion(&mut ctx, cancel).await,
                SessionState::ToolLoop => self.tool_round(&mut ctx, cancel).await,
                SessionState::Llm2 => self.second_completion(&mut ctx, cancel).await,
                SessionState::FilterOutput => self.filter(&mut ctx, FilterStage::Output, cancel).await,
                SessionState::Validate => self.validate(&mut ctx).await,
                terminal => break self.finish(ctx, terminal),
            };
        }
    }

    async fn call<T, F>(&self, limit: Duration, cancel: &CancellationToken, fut: F) -> Result<T, Interrupt>
    where
        F: std::future::Future<Output = Result<T, PortError>>,
    {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(Interrupt::Cancelled),
            r = tokio::time::timeout(limit, fut) => match r {
                Ok(Ok(v)) => Ok(v),
                Ok(Err(e)) => Err(Interrupt::Port(e)),
                Err(_) => Err(Interrupt::Port(PortError::Timeout(limit.as_secs()))),
            },
        }
    }

    async fn mask(&self, ctx: &mut OrchestrationContext, cancel: &CancellationToken) -> SessionState {
        let anonymizer = Arc::clone(&self.ports.anonymizer);
        match self
            .call(self.timeouts.guardrail, cancel, anonymizer.mask(&ctx.question))
            .await
        {
            Ok(outcome) => {
                ctx.recorder.record_masking(&ctx.question, &outcome);
                ctx.masked_question = Some(outcome.masked_text);
                SessionState::FilterInput
            }
            Err(Interrupt::Port(PortError::Blocked { message, .. })) => {
                ctx.recorder.record_blocked("data_masking", &message);
                SessionState::BlockedInput
            }
            Err(Interrupt::Port(e)) => {
                tracing::warn!(error = %e, "masking unavailable, continuing without it");
                SessionState::FilterInput
            }
            Err(Interrupt::Cancelled) => SessionState::Cancelled,
        }
    }

    async fn filter(
        &self,
        ctx: &mut OrchestrationContext,
        stage: FilterStage,
        cancel: &CancellationToken,
    ) -> SessionState {
        let (text, blocked, next) = match stage {
            FilterStage::Input => (
                ctx.effective_question().to_string(),
                SessionState::BlockedInput,
                SessionState::Llm1,
            ),
            FilterStage::Output => (
                ctx.answer.as_ref().map(|a| a.answer.clone()).unwrap_or_default(),
                SessionState::BlockedOutput,
                SessionState::Validate,
            ),
        };
        let safety = Arc::clone(&self.ports.safety);
        match self
            .call(self.timeouts.guardrail, cancel, safety.screen(&text, stage))
            .await
        {
            Ok(outcome) => {
                let record = ctx
                    .recorder
                    .record_filter(stage, &outcome.raw, outcome.category_scores);
                if record.passed && outcome.passed {
                    next
                } else {
                    let reason = record.message.unwrap_or_else(|| "content filter failed".to_string());
                    ctx.recorder.record_blocked(&format!("{stage}_filtering"), &reason);
                    blocked
                }
            }
            Err(Interrupt::Port(PortError::Blocked { message, diagnostic })) => {
                ctx.recorder.record_filter_blocked(stage, &message, &diagnostic);
                blocked
            }
            Err(Interrupt::Port(e)) => {
                tracing::warn!(stage = %stage, error = %e, "content filter unavailable");
                SessionState::UpstreamError
            }
            Err(Interrupt::Cancelled) => SessionState::Cancelled,
        }
    }

    async fn first_completion(&self, ctx: &mut OrchestrationContext, cancel: &CancellationToken) -> SessionState {
        let summary = match self.index.services_summary().await {
            Ok(s) => s,
            Err(e) => {
                tracing::warn!(error = %e, "knowledge index unavailable");
                return SessionState::UpstreamError;
            }
        };
        ctx.history = vec![
            Message::system(system_prompt(&summary)),
            Message::user(ctx.effective_question()),
        ];
        ctx.recorder.record_messages(&ctx.history);

        let tools = self.broker.definitions();
        let llm = Arc::clone(&self.ports.llm);
        let completion = match self
            .call(
                self.timeouts.llm,
                cancel,
                llm.complete(&ctx.history, &tools, Some(&self.response_schema)),
            )
            .await
        {
            Ok(c) => c,
            Err(interrupt) => return self.llm_interrupted(ctx, interrupt),
        };
        ctx.recorder.record_llm(&completion.model, completion.usage);

        if completion.has_tool_calls() {
            ctx.pending_tool_calls = completion.message.tool_calls.clone();
            ctx.history.push(completion.message);
            return SessionState::ToolLoop;
        }
        Self::accept_answer(ctx, &completion.message.content)
    }

    async fn tool_round(&self, ctx: &mut OrchestrationContext, cancel: &CancellationToken) -> SessionState {
        let calls = std::mem::take(&mut ctx.pending_tool_calls);
        let results = tokio::select! {
            biased;
            _ = cancel.cancelled() => return SessionState::Cancelled,
            r = self.broker.invoke_round(&calls) => r,
        };
        for (call, result) in calls.iter().zip(results) {
            ctx.recorder
                .record_tool_call(&call.name, &call.arguments, &result.payload);
            ctx.history
                .push(Message::tool_result(result.tool_call_id, result.payload));
        }
        ctx.tool_round_ran = true;
        SessionState::Llm2
    }

    async fn second_completion(&self, ctx: &mut OrchestrationContext, cancel: &CancellationToken) -> SessionState {
        if !ctx.tool_round_ran {
            return SessionState::MalformedOutput;
        }
        ctx.recorder.record_messages(&ctx.history);
        let llm = Arc::clone(&self.ports.llm);
        let completion = match self
            .call(
                self.timeouts.llm,
                cancel,
                llm.complete(&ctx.history, &[], Some(&self.response_schema)),
            )
            .await
        {
            Ok(c) => c,
            Err(interrupt) => return self.llm_interrupted(ctx, interrupt),
        };
        ctx.recorder.record_llm(&completion.model, completion.usage);

        if completion.has_tool_calls() {
            tracing::warn!("model requested tools after the tool round");
            return SessionState::MalformedOutput;
        }
        Self::accept_answer(ctx, &completion.message.content)
    }

    fn llm_interrupted(&self, ctx: &mut OrchestrationContext, interrupt: Interrupt) -> SessionState {
        match interrupt {
            Interrupt::Port(PortError::Blocked { message, .. }) => {
                ctx.recorder.record_llm_blocked(self.ports.llm.model(), &message);
                SessionState::BlockedOutput
            }
            Interrupt::Port(e) => {
                tracing::warn!(error = %e, "llm unavailable");
                SessionState::UpstreamError
            }
            Interrupt::Cancelled => SessionState::Cancelled,
        }
    }

    fn accept_answer(ctx: &mut OrchestrationContext, content: &str) -> SessionState {
        match parse_model_answer(content) {
            Ok(answer) => {
                ctx.answer = Some(answer);
                SessionState::FilterOutput
            }
            Err(e) => {
                tracing::warn!(error = %e, "model answer does not match schema");
                SessionState::MalformedOutput
            }
        }
    }

    /// 丢弃目录中不存在的 doc_id，再解析为链接
    async fn validate(&self, ctx: &mut OrchestrationContext) -> SessionState {
        let requested = ctx
            .answer
            .as_ref()
            .map(|a| a.doc_ids.clone())
            .unwrap_or_default();
        match self.index.lookup_by_ids(&requested).await {
            Ok(entries) => {
                if entries.len() < requested.len() {
                    tracing::debug!(
                        requested = requested.len(),
                        kept = entries.len(),
                        "dropped unknown doc ids"
                    );
                }
                ctx.links = entries.iter().map(LinkInfo::from).collect();
                SessionState::Done
            }
            Err(e) => {
                tracing::warn!(error = %e, "knowledge index unavailable during validation");
                SessionState::UpstreamError
            }
        }
    }

    fn finish(&self, mut ctx: OrchestrationContext, state: SessionState) -> SessionOutcome {
        let answer = match state {
            SessionState::Done => match ctx.answer.take() {
                Some(a) => AssistantAnswer {
                    is_relevant: a.is_relevant,
                    confidence: a.confidence,
                    services: a.services,
                    links: std::mem::take(&mut ctx.links),
                    answer_text: a.answer,
                },
                None => AssistantAnswer::fallback(),
            },
            SessionState::BlockedInput | SessionState::BlockedOutput => AssistantAnswer::blocked(),
            _ => AssistantAnswer::fallback(),
        };
        if state.is_failure() {
            tracing::warn!(state = %state, "session ended without an answer");
        } else {
            tracing::info!(state = %state, links = answer.links.len(), "session done");
        }
        ctx.recorder.set_outcome(state);
        SessionOutcome {
            state,
            answer,
            pipeline: ctx.recorder.finish(),
        }
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use serde_json::json;

    use super::*;
    use crate::guardrails::{BlocklistSafetyFilter, MaskOutcome, RegexAnonymizer};
    use crate::knowledge::{Catalog, SearchEngine};
    use crate::llm::{MockLlmClient, MockReply};
    use crate::tools::{SearchKnowledgeBaseTool, ToolRegistry};

    const CATALOG: &str = r#"{
        "services": {
            "ai_core": {
                "display_name": "AI Core",
                "description": "Run AI workloads",
                "docs": [
                    {"id": "real_1", "title": "Deploy Models", "url": "https://d/1", "description": "How to deploy", "tags": ["deploy", "model"]},
                    {"id": "real_2", "title": "Resource Groups", "url": "https://d/2", "description": "Isolate tenants", "tags": []}
                ]
            }
        }
    }"#;

    fn session_with(llm: MockLlmClient, blocklist: &[&str]) -> (OrchestrationSession, Arc<MockLlmClient>) {
        let index = Arc::new(KnowledgeIndex::in_memory(Catalog::from_json(CATALOG).unwrap()));
        let mut registry = ToolRegistry::new();
        registry.register(SearchKnowledgeBaseTool::new(SearchEngine::new(Arc::clone(&index))));
        let llm = Arc::new(llm);
        let ports = Ports {
            llm: llm.clone(),
            anonymizer: Arc::new(RegexAnonymizer::default()),
            safety: Arc::new(BlocklistSafetyFilter::new(blocklist.iter().copied())),
        };
        let session = OrchestrationSession::new(ports, Arc::new(ToolInvocationBroker::new(registry, 5)), index);
        (session, llm)
    }

    fn answer_json(doc_ids: &[&str]) -> String {
        json!({
            "is_relevant": true,
            "confidence": 0.9,
            "services": ["ai_core"],
            "doc_ids": doc_ids,
            "answer": "Deploy through AI Core.",
        })
        .to_string()
    }

    fn search_call(id: &str, query: &str) -> ToolCallRequest {
        ToolCallRequest {
            id: id.to_string(),
            name: "search_knowledge_base".to_string(),
            arguments: json!({"query": query}),
        }
    }

    #[tokio::test]
    async fn test_tool_round_then_answer() {
        let (session, llm) = session_with(
            MockLlmClient::new(vec![
                MockReply::ToolCalls(vec![search_call("c1", "deploy model"), search_call("c2", "resource")]),
                MockReply::Content(answer_json(&["real_1", "fake_99"])),
            ]),
            &[],
        );
        let outcome = session.run("How do I deploy a model?", &CancellationToken::new()).await;
        assert_eq!(outcome.state, SessionState::Done);
        assert_eq!(outcome.answer.links.len(), 1);
        assert_eq!(outcome.answer.links[0].url, "https://d/1");

        let calls = llm.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].tool_names, vec!["search_knowledge_base"]);
        assert!(calls[1].tool_names.is_empty());
        // system, user, assistant(tool_calls), tool, tool
        let tool_ids: Vec<_> = calls[1]
            .history
            .iter()
            .filter_map(|m| m.tool_call_id.clone())
            .collect();
        assert_eq!(tool_ids, vec!["c1", "c2"]);

        let tool_calls = outcome.pipeline.tool_calls.clone().unwrap();
        assert_eq!(tool_calls[0].results_preview[0].id, "real_1");
        assert!(outcome.pipeline.input_filter().unwrap().passed);
        assert!(outcome.pipeline.output_filter().unwrap().passed);
        assert_eq!(outcome.pipeline.messages_to_llm.len(), 5);
    }

    #[tokio::test]
    async fn test_direct_answer_skips_tool_loop() {
        let (session, llm) = session_with(MockLlmClient::new(vec![MockReply::Content(answer_json(&[]))]), &[]);
        let outcome = session.run("hello", &CancellationToken::new()).await;
        assert_eq!(outcome.state, SessionState::Done);
        assert_eq!(llm.calls().len(), 1);
        assert!(outcome.pipeline.tool_calls.is_none());
    }

    #[tokio::test]
    async fn test_input_block_stops_before_llm() {
        let (session, llm) = session_with(MockLlmClient::new(vec![]), &["forbidden"]);
        let outcome = session.run("a forbidden question", &CancellationToken::new()).await;
        assert_eq!(outcome.state, SessionState::BlockedInput);
        assert!(!outcome.answer.is_relevant);
        assert_eq!(outcome.answer.confidence, 0.0);
        assert!(outcome.answer.links.is_empty());
        assert!(!outcome.pipeline.input_filter().unwrap().passed);
        assert!(outcome.pipeline.output_filter().is_none());
        assert!(outcome.pipeline.messages_to_llm.is_empty());
        assert!(outcome.pipeline.llm.is_none());
        assert!(outcome.pipeline.tool_calls.is_none());
        assert_eq!(
            outcome.pipeline.blocked.as_ref().map(|b| b.blocked_by.as_str()),
            Some("input_filtering")
        );
        assert!(llm.calls().is_empty());
    }

    #[tokio::test]
    async fn test_provider_block_records_llm_reason() {
        let (session, _) = session_with(MockLlmClient::new(vec![MockReply::Blocked("content_filter".into())]), &[]);
        let outcome = session.run("deploy?", &CancellationToken::new()).await;
        assert_eq!(outcome.state, SessionState::BlockedOutput);
        let llm = outcome.pipeline.llm.unwrap();
        assert_eq!(llm.model, "mock");
        assert_eq!(llm.blocked_by.as_deref(), Some("llm"));
        assert!(outcome.pipeline.content_filtering.unwrap().output.is_none());
    }

    #[tokio::test]
    async fn test_output_block() {
        let reply = json!({"is_relevant": true, "confidence": 0.5, "answer": "forbidden text"}).to_string();
        let (session, _) = session_with(MockLlmClient::new(vec![MockReply::Content(reply)]), &["forbidden"]);
        let outcome = session.run("question", &CancellationToken::new()).await;
        assert_eq!(outcome.state, SessionState::BlockedOutput);
        assert_eq!(outcome.answer.answer_text, BLOCKED_ANSWER);
        assert!(outcome.pipeline.input_filter().unwrap().passed);
        assert!(!outcome.pipeline.output_filter().unwrap().passed);
    }

    #[tokio::test]
    async fn test_malformed_second_answer() {
        let (session, _) = session_with(
            MockLlmClient::new(vec![
                MockReply::ToolCalls(vec![search_call("c1", "deploy")]),
                MockReply::Content("I think you should deploy".into()),
            ]),
            &[],
        );
        let outcome = session.run("deploy?", &CancellationToken::new()).await;
        assert_eq!(outcome.state, SessionState::MalformedOutput);
        assert_eq!(outcome.answer.answer_text, FALLBACK_ANSWER);
        assert!(outcome.pipeline.llm.is_some());
    }

    #[tokio::test]
    async fn test_llm_unavailable_is_upstream_error() {
        let (session, _) = session_with(MockLlmClient::new(vec![MockReply::Unavailable("503".into())]), &[]);
        let outcome = session.run("deploy?", &CancellationToken::new()).await;
        assert_eq!(outcome.state, SessionState::UpstreamError);
        assert_eq!(outcome.answer.confidence, 0.0);
    }

    #[tokio::test]
    async fn test_masked_question_reaches_llm() {
        let (session, llm) = session_with(MockLlmClient::new(vec![MockReply::Content(answer_json(&[]))]), &[]);
        let outcome = session.run("My NRIC is S1234567D. How do I deploy?", &CancellationToken::new()).await;
        let masking = outcome.pipeline.data_masking.unwrap();
        assert_eq!(masking.entities_masked, vec!["NRIC"]);
        let user = &llm.calls()[0].history[1];
        assert!(user.content.contains("MASKED_NRIC"));
        assert!(!user.content.contains("S1234567D"));
    }

    struct DownAnonymizer;

    #[async_trait]
    impl AnonymizationPort for DownAnonymizer {
        async fn mask(&self, _text: &str) -> Result<MaskOutcome, PortError> {
            Err(PortError::unavailable("masking service down"))
        }
    }

    #[tokio::test]
    async fn test_masking_unavailable_is_skipped() {
        let (mut session, llm) = session_with(MockLlmClient::new(vec![MockReply::Content(answer_json(&[]))]), &[]);
        session.ports.anonymizer = Arc::new(DownAnonymizer);
        let outcome = session.run("my mail a@b.io", &CancellationToken::new()).await;
        assert_eq!(outcome.state, SessionState::Done);
        assert!(outcome.pipeline.data_masking.is_none());
        assert_eq!(llm.calls()[0].history[1].content, "my mail a@b.io");
    }

    #[tokio::test]
    async fn test_cancellation_and_timeout() {
        let slow = MockLlmClient::new(vec![MockReply::Content(answer_json(&[]))])
            .with_delay(Duration::from_millis(500));
        let (session, _) = session_with(slow, &[]);
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });
        let outcome = session.run("deploy?", &cancel).await;
        assert_eq!(outcome.state, SessionState::Cancelled);

        let slow = MockLlmClient::new(vec![MockReply::Content(answer_json(&[]))])
            .with_delay(Duration::from_millis(500));
        let (session, _) = session_with(slow, &[]);
        let session = session.with_timeouts(SessionTimeouts {
            guardrail: Duration::from_secs(1),
            llm: Duration::from_millis(20),
        });
        let outcome = session.run("deploy?", &CancellationToken::new()).await;
        assert_eq!(outcome.state, SessionState::UpstreamError);
    }
}
