//! 助手构建器：启动时的能力探测与统一初始化
//!
//! 探测结果是一个带标签的联合 Backend::{Real(Ports), Mock}：会话只针对探测出的那一种后端构建，
//! 运行期不再根据任何全局开关分支。

use std::sync::Arc;
use std::time::Duration;

use crate::assistant::DocAssistant;
use crate::config::AppConfig;
use crate::core::{AssistantError, OrchestrationSession, Ports, SessionTimeouts};
use crate::fallback::FallbackResponder;
use crate::guardrails::{
    AnonymizationPort, BlocklistSafetyFilter, HttpGuardrailClient, RegexAnonymizer, SafetyPort,
};
use crate::knowledge::{KnowledgeIndex, SearchEngine};
use crate::llm::{resolve_api_key, LlmClient, OpenAiClient};
use crate::tools::{SearchKnowledgeBaseTool, ToolInvocationBroker, ToolRegistry};

/// 探测出的后端
#[derive(Clone)]
pub enum Backend {
    Real(Ports),
    Mock,
}

impl Backend {
    /// provider=openai 且拿得到 API Key 时构建真实后端，否则退回 Mock（规则兜底）
    pub fn probe(config: &AppConfig) -> Result<Self, AssistantError> {
        match config.llm.provider.to_lowercase().as_str() {
            "mock" => {
                tracing::info!("llm provider is mock, using fallback responder");
                Ok(Backend::Mock)
            }
            "openai" => {
                let Some(api_key) = resolve_api_key(config.llm.api_key.as_deref()) else {
                    tracing::info!("no API key configured, using fallback responder");
                    return Ok(Backend::Mock);
                };
                match OpenAiClient::new(
                    config.llm.base_url.as_deref(),
                    &config.llm.model,
                    &api_key,
                    config.llm.max_tokens,
                    config.llm.timeouts.request,
                ) {
                    Ok(client) => Ok(Backend::Real(guardrail_ports(config, Arc::new(client))?)),
                    Err(e) => {
                        tracing::warn!(error = %e, "failed to construct llm client, using fallback responder");
                        Ok(Backend::Mock)
                    }
                }
            }
            other => {
                tracing::warn!(provider = %other, "unknown llm provider, using fallback responder");
                Ok(Backend::Mock)
            }
        }
    }

    pub fn is_real(&self) -> bool {
        matches!(self, Backend::Real(_))
    }

    pub fn name(&self) -> &'static str {
        match self {
            Backend::Real(_) => "real",
            Backend::Mock => "mock",
        }
    }
}

/// 为给定 LLM 组装护栏端口：配置了 endpoint 用远端服务，否则用本地正则 / 屏蔽词
pub fn guardrail_ports(config: &AppConfig, llm: Arc<dyn LlmClient>) -> Result<Ports, AssistantError> {
    let g = &config.guardrails;
    if let Some(endpoint) = g.endpoint.as_deref().filter(|e| !e.trim().is_empty()) {
        match HttpGuardrailClient::new(endpoint, g.timeout_secs) {
            Ok(client) => {
                let client = Arc::new(client);
                let anonymizer: Arc<dyn AnonymizationPort> = client.clone();
                let safety: Arc<dyn SafetyPort> = client;
                return Ok(Ports {
                    llm,
                    anonymizer,
                    safety,
                });
            }
            Err(e) => {
                tracing::warn!(error = %e, "guardrail endpoint unusable, using local guardrails");
            }
        }
    }
    Ok(Ports {
        llm,
        anonymizer: Arc::new(RegexAnonymizer::new(&g.mask_entities)?),
        safety: Arc::new(BlocklistSafetyFilter::new(&g.blocklist)),
    })
}

/// 助手构建器：统一配置和初始化各组件（CLI 与 Web 共用）
pub struct AssistantBuilder {
    config: AppConfig,
    index: Option<Arc<KnowledgeIndex>>,
    backend: Option<Backend>,
}

impl AssistantBuilder {
    pub fn new(config: AppConfig) -> Self {
        Self {
            config,
            index: None,
            backend: None,
        }
    }

    /// 使用现成的索引（默认按 knowledge.path 打开 JSON 文件）
    pub fn with_index(mut self, index: Arc<KnowledgeIndex>) -> Self {
        self.index = Some(index);
        self
    }

    /// 跳过探测，直接指定后端
    pub fn with_backend(mut self, backend: Backend) -> Self {
        self.backend = Some(backend);
        self
    }

    /// 以给定 LLM 构建真实后端（护栏按配置组装）
    pub fn with_llm(mut self, llm: Arc<dyn LlmClient>) -> Result<Self, AssistantError> {
        self.backend = Some(Backend::Real(guardrail_ports(&self.config, llm)?));
        Ok(self)
    }

    /// 加载目录、注册工具并按后端构建会话
    pub async fn build(self) -> Result<DocAssistant, AssistantError> {
        let config = self.config;
        let index = match self.index {
            Some(index) => index,
            None => Arc::new(KnowledgeIndex::open(&config.knowledge.path)),
        };
        let catalog = index.load().await?;
        tracing::info!(
            services = catalog.categories().len(),
            entries = catalog.entry_count(),
            "knowledge base loaded"
        );

        let engine = SearchEngine::new(Arc::clone(&index)).with_max_results(config.knowledge.max_results);
        let service_keys: Vec<String> = catalog.categories().iter().map(|c| c.key.clone()).collect();
        let mut registry = ToolRegistry::new();
        registry.register(SearchKnowledgeBaseTool::new(engine.clone()).with_service_keys(&service_keys));
        let broker = Arc::new(ToolInvocationBroker::new(registry, config.tools.tool_timeout_secs));

        let backend = match self.backend {
            Some(backend) => backend,
            None => Backend::probe(&config)?,
        };
        tracing::info!(backend = backend.name(), "assistant backend selected");

        let session = match backend {
            Backend::Real(ports) => Some(
                OrchestrationSession::new(ports, broker, Arc::clone(&index)).with_timeouts(SessionTimeouts {
                    guardrail: Duration::from_secs(config.guardrails.timeout_secs),
                    llm: Duration::from_secs(config.llm.timeouts.request),
                }),
            ),
            Backend::Mock => None,
        };

        Ok(DocAssistant::new(
            index,
            session,
            FallbackResponder::new(engine),
            config.fallback.on_session_failure,
            config.app.show_pipeline_default,
        ))
    }
}
