//! 加权多字段关键词检索
//!
//! 查询按空白切分并小写，丢弃少于 2 个字符的词；每个词在某字段中以子串出现即为该字段累加一次权重：
//! 标题 3.0、标签 2.5、描述 2.0、分类显示名 1.5、分类描述 0.5。不做长度归一化，0 分条目不返回；
//! 结果按分数降序，平分时保持目录顺序（稳定排序），最多返回 max_results 条。

use std::cmp::Ordering;
use std::sync::Arc;

use serde::Serialize;

use crate::core::AssistantError;
use crate::knowledge::{Catalog, DocEntry, KnowledgeIndex, ServiceCategory};

/// 默认返回条数上限
pub const MAX_RESULTS: usize = 10;
/// 少于此字符数的词不参与打分
pub const MIN_TOKEN_CHARS: usize = 2;

const TITLE_WEIGHT: f32 = 3.0;
const TAG_WEIGHT: f32 = 2.5;
const DESCRIPTION_WEIGHT: f32 = 2.0;
const SERVICE_NAME_WEIGHT: f32 = 1.5;
const SERVICE_DESCRIPTION_WEIGHT: f32 = 0.5;

/// 单条检索结果（不落盘）
#[derive(Clone, Debug, Serialize)]
pub struct ScoredResult {
    pub entry: DocEntry,
    pub score: f32,
}

/// 查询分词：空白切分、小写、过滤短词
pub fn tokenize(query: &str) -> Vec<String> {
    query
        .split_whitespace()
        .map(str::to_lowercase)
        .filter(|t| t.chars().count() >= MIN_TOKEN_CHARS)
        .collect()
}

/// 计算单条目得分
pub fn score_entry(category: &ServiceCategory, entry: &DocEntry, tokens: &[String]) -> f32 {
    let title = entry.title.to_lowercase();
    let description = entry.description.to_lowercase();
    let tags: Vec<String> = entry.tags.iter().map(|t| t.to_lowercase()).collect();
    let service_name = category.display_name.to_lowercase();
    let service_description = category.description.to_lowercase();

    let mut score = 0.0;
    for token in tokens {
        let token = token.as_str();
        if title.contains(token) {
            score += TITLE_WEIGHT;
        }
        if tags.iter().any(|tag| tag.contains(token)) {
            score += TAG_WEIGHT;
        }
        if description.contains(token) {
            score += DESCRIPTION_WEIGHT;
        }
        if service_name.contains(token) {
            score += SERVICE_NAME_WEIGHT;
        }
        if service_description.contains(token) {
            score += SERVICE_DESCRIPTION_WEIGHT;
        }
    }
    score
}

/// 在目录快照上排序打分；service_filter 指向不存在的分类时退化为全目录检索
pub fn rank(
    catalog: &Catalog,
    query: &str,
    service_filter: Option<&str>,
    limit: usize,
) -> Vec<ScoredResult> {
    let tokens = tokenize(query);
    if tokens.is_empty() {
        return Vec::new();
    }

    let filter = service_filter
        .map(str::trim)
        .filter(|key| !key.is_empty() && catalog.category(key).is_some());

    let mut results: Vec<ScoredResult> = catalog
        .entries()
        .filter(|(c, _)| filter.map_or(true, |key| c.key == key))
        .filter_map(|(c, e)| {
            let score = score_entry(c, e, &tokens);
            (score > 0.0).then(|| ScoredResult {
                entry: e.clone(),
                score,
            })
        })
        .collect();

    // sort_by 为稳定排序：平分时保持目录顺序
    results.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
    results.truncate(limit);
    results
}

/// 检索引擎：只读取 KnowledgeIndex 的快照，从不修改它
#[derive(Clone)]
pub struct SearchEngine {
    index: Arc<KnowledgeIndex>,
    max_results: usize,
}

impl SearchEngine {
    pub fn new(index: Arc<KnowledgeIndex>) -> Self {
        Self {
            index,
            max_results: MAX_RESULTS,
        }
    }

    pub fn with_max_results(mut self, max_results: usize) -> Self {
        self.max_results = max_results.max(1);
        self
    }

    pub fn index(&self) -> &Arc<KnowledgeIndex> {
        &self.index
    }

    pub async fn search(
        &self,
        query: &str,
        service_filter: Option<&str>,
    ) -> Result<Vec<ScoredResult>, AssistantError> {
        let catalog = self.index.load().await?;
        let results = rank(&catalog, query, service_filter, self.max_results);
        tracing::debug!(
            query = %query,
            service = ?service_filter,
            hits = results.len(),
            "knowledge search"
        );
        Ok(results)
    }
}
