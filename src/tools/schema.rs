//! JSON Schema 生成（schemars）
//!
//! 工具参数与最终结构化回答的 schema 均由类型派生，保证发给模型的约束与解析端一致。

use schemars::{schema_for, JsonSchema};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::llm::ResponseSchema;

pub const ANSWER_SCHEMA_NAME: &str = "doc_assistant_result";

/// search_knowledge_base 的参数
#[derive(Clone, Debug, Deserialize, JsonSchema)]
pub struct SearchArgs {
    /// Search terms related to the user's question
    pub query: String,
    /// Optional service key to filter results
    #[serde(default)]
    pub service: Option<String>,
}

/// 模型必须返回的结构化回答
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct ModelAnswer {
    /// Whether the question relates to the documented services
    pub is_relevant: bool,
    /// How well the available docs cover the question (0.0-1.0)
    pub confidence: f64,
    /// Relevant service keys
    #[serde(default)]
    pub services: Vec<String>,
    /// IDs of the most relevant docs from search results
    #[serde(default)]
    pub doc_ids: Vec<String>,
    /// Explanation that directly addresses the question
    pub answer: String,
}

/// 由类型生成 schema 并去掉 $schema / title 等对模型无用的顶层字段
pub fn schema_value<T: JsonSchema>() -> Value {
    let mut value = serde_json::to_value(schema_for!(T)).unwrap_or(Value::Null);
    if let Some(obj) = value.as_object_mut() {
        obj.remove("$schema");
        obj.remove("title");
    }
    value
}

pub fn search_arguments_schema() -> Value {
    schema_value::<SearchArgs>()
}

pub fn answer_response_schema() -> ResponseSchema {
    ResponseSchema {
        name: ANSWER_SCHEMA_NAME.to_string(),
        schema: schema_value::<ModelAnswer>(),
    }
}

/// 去掉模型偶尔包裹的 ```json 代码块
fn strip_code_fence(content: &str) -> &str {
    let trimmed = content.trim();
    trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|rest| rest.strip_suffix("```"))
        .map(str::trim)
        .unwrap_or(trimmed)
}

/// 解析并校验模型回答；不符合 schema 即失败
pub fn parse_model_answer(content: &str) -> Result<ModelAnswer, serde_json::Error> {
    let mut answer: ModelAnswer = serde_json::from_str(strip_code_fence(content))?;
    answer.confidence = if answer.confidence.is_finite() {
        answer.confidence.clamp(0.0, 1.0)
    } else {
        0.0
    };
    Ok(answer)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_answer_schema_lists_required_fields() {
        let schema = answer_response_schema();
        assert_eq!(schema.name, "doc_assistant_result");
        let required = schema.schema["required"].as_array().unwrap();
        assert!(required.iter().any(|v| v == "is_relevant"));
        assert!(required.iter().any(|v| v == "answer"));
        assert!(schema.schema.get("$schema").is_none());
    }

    #[test]
    fn test_search_schema_requires_query_only() {
        let schema = search_arguments_schema();
        let required = schema["required"].as_array().unwrap();
        assert_eq!(required.len(), 1);
        assert_eq!(required[0], "query");
        assert!(schema["properties"].get("service").is_some());
    }

    #[test]
    fn test_parse_model_answer() {
        let a = parse_model_answer(
            "```json\n{\"is_relevant\":true,\"confidence\":1.7,\"services\":[\"ai_core\"],\"doc_ids\":[\"ai_core_01\"],\"answer\":\"Use AI Core.\"}\n```",
        )
        .unwrap();
        assert!(a.is_relevant);
        assert_eq!(a.confidence, 1.0);
        assert_eq!(a.doc_ids, vec!["ai_core_01"]);

        assert!(parse_model_answer("not json").is_err());
        assert!(parse_model_answer("{\"confidence\":0.5,\"answer\":\"x\"}").is_err());
        assert!(parse_model_answer("{\"is_relevant\":true,\"confidence\":0.5,\"answer\":\"x\",\"extra\":1}").is_err());
    }
}
