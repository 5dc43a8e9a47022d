//! search_knowledge_base 工具：把模型的检索请求转给 SearchEngine
//!
//! query 必填且非空，service 可选（未知分类退化为全目录检索）；结果只序列化条目字段，不含分数。

use async_trait::async_trait;
use serde_json::Value;

use crate::core::AssistantError;
use crate::knowledge::{DocEntry, SearchEngine};
use crate::tools::schema::{search_arguments_schema, SearchArgs};
use crate::tools::Tool;

pub const SEARCH_TOOL_NAME: &str = "search_knowledge_base";

pub struct SearchKnowledgeBaseTool {
    engine: SearchEngine,
    description: String,
}

impl SearchKnowledgeBaseTool {
    pub fn new(engine: SearchEngine) -> Self {
        Self {
            engine,
            description: "Search the documentation knowledge base for relevant entries. \
                Returns matching docs with ids, titles, URLs, and descriptions."
                .to_string(),
        }
    }

    /// 在描述中列出可用的分类 key，便于模型填写 service
    pub fn with_service_keys(mut self, keys: &[String]) -> Self {
        if !keys.is_empty() {
            self.description = format!(
                "{} Optional service filter, one of: {}",
                self.description,
                keys.join(", ")
            );
        }
        self
    }
}

/// 校验参数：query 缺失、非字符串或全空白均视为非法
pub fn parse_search_args(args: Value) -> Result<SearchArgs, AssistantError> {
    let parsed: SearchArgs = serde_json::from_value(args)
        .map_err(|e| AssistantError::InvalidToolArguments(e.to_string()))?;
    if parsed.query.trim().is_empty() {
        return Err(AssistantError::InvalidToolArguments(
            "query must be a non-empty string".to_string(),
        ));
    }
    Ok(parsed)
}

#[async_trait]
impl Tool for SearchKnowledgeBaseTool {
    fn name(&self) -> &str {
        SEARCH_TOOL_NAME
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn parameters_schema(&self) -> Value {
        search_arguments_schema()
    }

    async fn execute(&self, args: Value) -> Result<String, AssistantError> {
        let args = parse_search_args(args)?;
        let results = self
            .engine
            .search(&args.query, args.service.as_deref())
            .await?;
        let entries: Vec<&DocEntry> = results.iter().map(|r| &r.entry).collect();
        Ok(serde_json::to_string(&entries)?)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use super::*;
    use crate::knowledge::types::tests::SAMPLE;
    use crate::knowledge::{Catalog, KnowledgeIndex};

    fn tool() -> SearchKnowledgeBaseTool {
        let catalog = Catalog::from_json(SAMPLE).unwrap();
        let engine = SearchEngine::new(Arc::new(KnowledgeIndex::in_memory(catalog)));
        SearchKnowledgeBaseTool::new(engine)
    }

    #[tokio::test]
    async fn test_execute_serializes_entries_without_score() {
        let payload = tool().execute(json!({"query": "zeta intro"})).await.unwrap();
        let items: Vec<Value> = serde_json::from_str(&payload).unwrap();
        assert_eq!(items[0]["id"], "zeta_01");
        assert!(items[0].get("score").is_none());
    }

    #[tokio::test]
    async fn test_missing_or_blank_query_rejected() {
        for args in [json!({}), json!({"query": "   "}), json!({"query": 3}), Value::Null] {
            assert!(matches!(
                tool().execute(args).await,
                Err(AssistantError::InvalidToolArguments(_))
            ));
        }
    }

    #[test]
    fn test_description_lists_services() {
        let t = tool().with_service_keys(&["ai_core".to_string(), "joule".to_string()]);
        assert!(t.description().ends_with("ai_core, joule"));
    }
}
