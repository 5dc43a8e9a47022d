//! 规则兜底（FallbackResponder）
//!
//! 没有可用的 LLM 后端，或会话以 MALFORMED_OUTPUT / UPSTREAM_ERROR 结束时启用：
//! 用固定关键词表判断相关性与服务，再直接调用 SearchEngine 取真实链接（从不编造链接）。
//! 产出的回答由调用方标记为 synthetic。

use serde_json::json;

use crate::core::{AssistantAnswer, AssistantError, LinkInfo};
use crate::knowledge::SearchEngine;
use crate::llm::{Message, TokenUsage};
use crate::pipeline::{PipelineRecord, PipelineRecorder};
use crate::tools::SEARCH_TOOL_NAME;

/// 明显与文档服务无关的话题
pub const OFF_TOPIC_PATTERNS: &[&str] = &[
    "password",
    "laptop",
    "computer",
    "printer",
    "wifi",
    "weather",
    "email setup",
    "vpn",
    "software install",
    "recipe",
    "movie",
    "sports",
];

/// 服务关键词表，按特异性排序
pub const SERVICE_KEYWORDS: &[(&str, &[&str])] = &[
    (
        "hana_cloud_vector",
        &[
            "hana vector",
            "vector engine",
            "real_vector",
            "cosine_similarity",
            "l2distance",
            "vector index",
            "embedding",
            "hana embedding",
            "similarity search",
            "vector column",
            "vector",
            "hana cloud",
        ],
    ),
    (
        "document_processing",
        &[
            "document extraction",
            "dox",
            "document information",
            "invoice",
            "document processing",
            "schema extraction",
            "purchase order extraction",
            "extract data",
        ],
    ),
    (
        "joule",
        &["joule", "joule studio", "joule skill", "joule action", "joule capability"],
    ),
    (
        "ai_launchpad",
        &[
            "ai launchpad",
            "launchpad",
            "mlops",
            "ml operations",
            "model registry",
            "ai monitoring",
        ],
    ),
    (
        "genai_hub",
        &[
            "orchestration",
            "genai hub",
            "generative ai hub",
            "sdk",
            "content filter",
            "data masking",
            "grounding",
            "prompt registry",
            "rag",
            "retrieval augmented",
        ],
    ),
    (
        "ai_core",
        &[
            "ai core",
            "deploy",
            "resource group",
            "serving template",
            "workflow template",
            "docker registry",
            "ai api",
            "execution",
            "scenario",
        ],
    ),
];

/// 与平台相关但不指向具体服务的词
pub const GENERIC_TERMS: &[&str] = &["sap", "btp", "cloud foundry", "fiori"];

const LINK_LIMIT: usize = 5;

/// 关键词分类结果
#[derive(Clone, Debug, PartialEq)]
pub enum Classification {
    OffTopic,
    Services(Vec<&'static str>),
    Generic,
    Unknown,
}

impl Classification {
    pub fn confidence(&self) -> f64 {
        match self {
            Classification::OffTopic => 0.90,
            Classification::Services(_) => 0.85,
            Classification::Generic => 0.60,
            Classification::Unknown => 0.80,
        }
    }

    pub fn is_relevant(&self) -> bool {
        matches!(self, Classification::Services(_) | Classification::Generic)
    }
}

pub fn classify(question: &str) -> Classification {
    let q = question.to_lowercase();
    if OFF_TOPIC_PATTERNS.iter().any(|p| q.contains(p)) {
        return Classification::OffTopic;
    }
    let services: Vec<&'static str> = SERVICE_KEYWORDS
        .iter()
        .filter(|(_, keywords)| keywords.iter().any(|kw| q.contains(kw)))
        .map(|(service, _)| *service)
        .collect();
    if !services.is_empty() {
        return Classification::Services(services);
    }
    if GENERIC_TERMS.iter().any(|t| q.contains(t)) {
        return Classification::Generic;
    }
    Classification::Unknown
}

/// 兜底回答与对应的诊断轨迹（model = "fallback"）
#[derive(Clone, Debug)]
pub struct FallbackResponse {
    pub answer: AssistantAnswer,
    pub pipeline: PipelineRecord,
}

pub struct FallbackResponder {
    engine: SearchEngine,
}

impl FallbackResponder {
    pub fn new(engine: SearchEngine) -> Self {
        Self { engine }
    }

    pub async fn respond(&self, question: &str) -> Result<FallbackResponse, AssistantError> {
        let classification = classify(question);
        let catalog = self.engine.index().load().await?;
        let display_names = |keys: &[&str]| -> Vec<String> {
            keys.iter()
                .filter_map(|k| catalog.category(k).map(|c| c.display_name.clone()))
                .collect()
        };
        let all_names: Vec<String> = catalog
            .categories()
            .iter()
            .map(|c| c.display_name.clone())
            .collect();

        let mut recorder = PipelineRecorder::new();
        recorder.record_messages(&[
            Message::system("[fallback] rule-based keyword classification, no model call"),
            Message::user(question),
        ]);

        let mut links = Vec::new();
        let mut services = Vec::new();
        let answer_text = match &classification {
            Classification::Services(keys) => {
                let results = self.engine.search(question, None).await?;
                let entries: Vec<_> = results.iter().map(|r| &r.entry).collect();
                recorder.record_tool_call(
                    SEARCH_TOOL_NAME,
                    &json!({"query": question}),
                    &serde_json::to_string(&entries)?,
                );
                links = entries.iter().take(LINK_LIMIT).map(|e| LinkInfo::from(*e)).collect();
                services = keys
                    .iter()
                    .filter(|k| catalog.category(k).is_some())
                    .map(|k| k.to_string())
                    .collect();
                format!(
                    "I can help you with {}. Based on your question, I've found several relevant \
                     documentation resources. Please review the linked docs for detailed guidance.",
                    display_names(keys).join(", ")
                )
            }
            Classification::Generic => format!(
                "Your question seems related to the platform but I couldn't match it to a specific \
                 service. I cover: {}.",
                all_names.join(", ")
            ),
            Classification::OffTopic | Classification::Unknown => format!(
                "This doesn't appear to be related to the documented services. I can help with: {}.",
                all_names.join(", ")
            ),
        };
        recorder.record_llm("fallback", TokenUsage::default());

        tracing::info!(
            classification = ?classification,
            links = links.len(),
            "fallback answer"
        );
        Ok(FallbackResponse {
            answer: AssistantAnswer {
                is_relevant: classification.is_relevant(),
                confidence: classification.confidence(),
                services,
                links,
                answer_text,
            },
            pipeline: recorder.finish(),
        })
    }
}
