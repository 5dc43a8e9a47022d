//! 本地护栏：正则脱敏与屏蔽词过滤
//!
//! RegexAnonymizer 把 NRIC/FIN、邮箱、电话替换为 MASKED_<ENTITY>；BlocklistSafetyFilter 命中屏蔽词时
//! 以 Blocked 错误返回（诊断为松散 map），通过时返回结构化诊断，两条路径的形状与远端服务一致地不同。

use async_trait::async_trait;
use regex::Regex;
use serde_json::json;

use crate::core::{AssistantError, FilterStage, PortError};
use crate::guardrails::{AnonymizationPort, MaskOutcome, SafetyPort, ScreenOutcome};
use crate::pipeline::{FilterScores, RawDiagnostic};

/// 默认启用的实体
pub const DEFAULT_ENTITIES: &[&str] = &["NRIC", "EMAIL", "PHONE"];

fn entity_pattern(entity: &str) -> Option<&'static str> {
    match entity {
        "NRIC" => Some(r"(?i)\b[STFGM]\d{7}[A-Z]\b"),
        "EMAIL" => Some(r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}"),
        // 国际号码须带 +；本地号码须带括号区号或短横分组，纯数字串不算电话
        "PHONE" => Some(
            r"\+\d{1,3}(?:[ -]?\d{2,4}){2,4}\b|\(\d{2,4}\)[ -]?\d{3,4}[ -]?\d{4}\b|\b\d{3,4}-\d{3,4}-\d{4}\b",
        ),
        _ => None,
    }
}

/// 正则脱敏器
pub struct RegexAnonymizer {
    patterns: Vec<(String, Regex)>,
}

impl RegexAnonymizer {
    /// entities 为空时使用默认集合；未知实体名报配置错误
    pub fn new(entities: &[String]) -> Result<Self, AssistantError> {
        let names: Vec<String> = if entities.is_empty() {
            DEFAULT_ENTITIES.iter().map(|e| e.to_string()).collect()
        } else {
            entities.iter().map(|e| e.trim().to_uppercase()).collect()
        };
        let mut patterns = Vec::with_capacity(names.len());
        for name in names {
            let pattern = entity_pattern(&name)
                .ok_or_else(|| AssistantError::Config(format!("unknown mask entity: {name}")))?;
            let re = Regex::new(pattern)
                .map_err(|e| AssistantError::Config(format!("mask pattern {name}: {e}")))?;
            patterns.push((name, re));
        }
        Ok(Self { patterns })
    }

    pub fn mask_text(&self, text: &str) -> (String, Vec<String>) {
        let mut masked = text.to_string();
        let mut found = Vec::new();
        for (name, re) in &self.patterns {
            if re.is_match(&masked) {
                masked = re.replace_all(&masked, format!("MASKED_{name}")).into_owned();
                found.push(name.clone());
            }
        }
        (masked, found)
    }
}

impl Default for RegexAnonymizer {
    fn default() -> Self {
        let patterns = DEFAULT_ENTITIES
            .iter()
            .filter_map(|name| {
                entity_pattern(name)
                    .and_then(|p| Regex::new(p).ok())
                    .map(|re| (name.to_string(), re))
            })
            .collect();
        Self { patterns }
    }
}

#[async_trait]
impl AnonymizationPort for RegexAnonymizer {
    async fn mask(&self, text: &str) -> Result<MaskOutcome, PortError> {
        let (masked_text, entities_found) = self.mask_text(text);
        Ok(MaskOutcome {
            raw: RawDiagnostic::structured(
                "Input masking completed.",
                json!({"masked_template": masked_text}),
            ),
            masked_text,
            entities_found,
        })
    }
}

/// 屏蔽词过滤器（大小写不敏感子串匹配）
#[derive(Debug, Default)]
pub struct BlocklistSafetyFilter {
    terms: Vec<String>,
}

impl BlocklistSafetyFilter {
    pub fn new(terms: impl IntoIterator<Item = impl AsRef<str>>) -> Self {
        Self {
            terms: terms
                .into_iter()
                .map(|t| t.as_ref().trim().to_lowercase())
                .filter(|t| !t.is_empty())
                .collect(),
        }
    }

    fn matched_term(&self, text: &str) -> Option<&str> {
        let lower = text.to_lowercase();
        self.terms
            .iter()
            .find(|t| lower.contains(t.as_str()))
            .map(String::as_str)
    }
}

fn stage_label(stage: FilterStage) -> &'static str {
    match stage {
        FilterStage::Input => "Input",
        FilterStage::Output => "Output",
    }
}

#[async_trait]
impl SafetyPort for BlocklistSafetyFilter {
    async fn screen(&self, text: &str, stage: FilterStage) -> Result<ScreenOutcome, PortError> {
        let scores = json!({"Hate": 0, "SelfHarm": 0, "Sexual": 0, "Violence": 0});
        if let Some(term) = self.matched_term(text) {
            tracing::info!(stage = %stage, "content blocked by local blocklist");
            let raw = RawDiagnostic::from_value(json!({
                "message": format!("{} Filter failed: blocked term matched.", stage_label(stage)),
                "data": {"azure_content_safety": scores, "matched_term": term},
            }));
            return Err(PortError::blocked(
                format!("Content blocked by {stage} filtering"),
                raw,
            ));
        }
        let data = match stage {
            FilterStage::Input => json!({"azure_content_safety": scores}),
            FilterStage::Output => json!({"choices": [{"index": 0, "azure_content_safety": scores}]}),
        };
        Ok(ScreenOutcome {
            category_scores: FilterScores::default(),
            passed: true,
            raw: RawDiagnostic::structured(
                format!("{} Filter passed successfully.", stage_label(stage)),
                data,
            ),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::normalize_filter;

    #[test]
    fn test_mask_nric_variants() {
        let a = RegexAnonymizer::default();
        let (text, found) = a.mask_text("IDs: S1234567D and f9876543n");
        assert_eq!(text, "IDs: MASKED_NRIC and MASKED_NRIC");
        assert_eq!(found, vec!["NRIC"]);

        let (text, found) = a.mask_text("How do I deploy a model on AI Core?");
        assert_eq!(text, "How do I deploy a model on AI Core?");
        assert!(found.is_empty());
    }

    #[test]
    fn test_mask_email_and_phone() {
        let a = RegexAnonymizer::default();
        let (text, found) = a.mask_text("mail jane.doe@example.com or call +65 9123 4567");
        assert!(text.contains("MASKED_EMAIL"));
        assert!(text.contains("MASKED_PHONE"));
        assert!(!text.contains("example.com"));
        assert_eq!(found, vec!["EMAIL", "PHONE"]);
    }

    #[test]
    fn test_plain_numbers_not_masked_as_phone() {
        let a = RegexAnonymizer::default();
        let text = "Set the timeout to 120000000 ms in release 2024 11 05";
        let (masked, found) = a.mask_text(text);
        assert_eq!(masked, text);
        assert!(found.is_empty());

        let (masked, _) = a.mask_text("port 8080\n12345678 items");
        assert_eq!(masked, "port 8080\n12345678 items");

        let (masked, found) = a.mask_text("office (02) 9123 4567 or 555-123-4567");
        assert_eq!(masked, "office MASKED_PHONE or MASKED_PHONE");
        assert_eq!(found, vec!["PHONE"]);
    }

    #[test]
    fn test_unknown_entity_rejected() {
        assert!(RegexAnonymizer::new(&["PASSPORT".to_string()]).is_err());
        assert!(RegexAnonymizer::new(&["email".to_string()]).is_ok());
    }

    #[tokio::test]
    async fn test_blocklist_shapes() {
        let f = BlocklistSafetyFilter::new(["Forbidden"]);
        let ok = f.screen("how to deploy", FilterStage::Output).await.unwrap();
        assert!(normalize_filter(&ok.raw, ok.category_scores).passed);

        match f.screen("something FORBIDDEN here", FilterStage::Input).await {
            Err(PortError::Blocked { diagnostic, .. }) => {
                assert!(matches!(diagnostic, RawDiagnostic::Untyped(_)));
                assert!(!normalize_filter(&diagnostic, FilterScores::default()).passed);
            }
            other => panic!("expected block, got {other:?}"),
        }
    }
}
