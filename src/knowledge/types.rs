//! 目录数据模型
//!
//! Catalog 按文件中的顺序保存服务分类（ServiceCategory）及其条目（DocEntry）；顺序即检索平分时的次序。
//! 磁盘格式：`{"services": {"<key>": {"display_name", "description", "docs": [...]}}}`，条目本身不重复存 service_key。

use std::collections::HashSet;
use std::fmt;

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::core::AssistantError;

/// 单条文档条目
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DocEntry {
    pub id: String,
    pub service_key: String,
    pub title: String,
    pub url: String,
    pub description: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// 服务分类：拥有其下全部条目
#[derive(Clone, Debug, PartialEq)]
pub struct ServiceCategory {
    pub key: String,
    pub display_name: String,
    pub description: String,
    pub entries: Vec<DocEntry>,
}

/// 新增条目请求；id 缺省时按 `<service_key>_<NN>` 生成
#[derive(Clone, Debug, Default, Deserialize)]
pub struct NewDocEntry {
    pub service_key: String,
    #[serde(default)]
    pub id: Option<String>,
    pub title: String,
    pub url: String,
    pub description: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// 部分更新：仅覆盖非 None 字段
#[derive(Clone, Debug, Default, Deserialize)]
pub struct DocEntryPatch {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
}

impl DocEntryPatch {
    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.url.is_none() && self.description.is_none() && self.tags.is_none()
    }

    fn apply(&self, entry: &mut DocEntry) {
        if let Some(title) = &self.title {
            entry.title = title.clone();
        }
        if let Some(url) = &self.url {
            entry.url = url.clone();
        }
        if let Some(description) = &self.description {
            entry.description = description.clone();
        }
        if let Some(tags) = &self.tags {
            entry.tags = tags.clone();
        }
    }
}

/// 服务分类概览（含条目数）
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ServiceSummary {
    pub key: String,
    pub display_name: String,
    pub description: String,
    pub doc_count: usize,
}

/// 整个目录
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Catalog {
    categories: Vec<ServiceCategory>,
}

impl Catalog {
    /// 构建目录；id 在全目录内必须唯一
    pub fn new(categories: Vec<ServiceCategory>) -> Result<Self, AssistantError> {
        let mut seen = HashSet::new();
        for entry in categories.iter().flat_map(|c| c.entries.iter()) {
            if !seen.insert(entry.id.as_str()) {
                return Err(AssistantError::CatalogDuplicateId(entry.id.clone()));
            }
        }
        Ok(Self { categories })
    }

    pub fn from_json(data: &str) -> Result<Self, AssistantError> {
        let file: CatalogFile = serde_json::from_str(data)?;
        let categories = file
            .services
            .0
            .into_iter()
            .map(|(key, stored)| stored.into_category(key))
            .collect();
        Self::new(categories)
    }

    pub fn to_json_pretty(&self) -> Result<String, AssistantError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn categories(&self) -> &[ServiceCategory] {
        &self.categories
    }

    pub fn category(&self, key: &str) -> Option<&ServiceCategory> {
        self.categories.iter().find(|c| c.key == key)
    }

    /// 按目录顺序遍历 (分类, 条目)
    pub fn entries(&self) -> impl Iterator<Item = (&ServiceCategory, &DocEntry)> {
        self.categories
            .iter()
            .flat_map(|c| c.entries.iter().map(move |e| (c, e)))
    }

    pub fn find(&self, id: &str) -> Option<&DocEntry> {
        self.entries().map(|(_, e)| e).find(|e| e.id == id)
    }

    pub fn contains_id(&self, id: &str) -> bool {
        self.find(id).is_some()
    }

    pub fn ids(&self) -> HashSet<String> {
        self.entries().map(|(_, e)| e.id.clone()).collect()
    }

    pub fn entry_count(&self) -> usize {
        self.categories.iter().map(|c| c.entries.len()).sum()
    }

    pub fn summaries(&self) -> Vec<ServiceSummary> {
        self.categories
            .iter()
            .map(|c| ServiceSummary {
                key: c.key.clone(),
                display_name: c.display_name.clone(),
                description: c.description.clone(),
                doc_count: c.entries.len(),
            })
            .collect()
    }

    /// 系统提示词中的服务列表，每行一个分类
    pub fn services_summary(&self) -> String {
        self.categories
            .iter()
            .map(|c| {
                format!(
                    "- {}: {} — {} ({} docs)",
                    c.key,
                    c.display_name,
                    c.description,
                    c.entries.len()
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// 生成 `<service_key>_<NN>`，NN 从分类条目数 + 1 起递增直到未被占用
    pub fn next_id(&self, service_key: &str) -> String {
        let base = self.category(service_key).map(|c| c.entries.len()).unwrap_or(0);
        let mut counter = 1;
        loop {
            let candidate = format!("{}_{:02}", service_key, base + counter);
            if !self.contains_id(&candidate) {
                return candidate;
            }
            counter += 1;
        }
    }

    pub(crate) fn insert(&mut self, new: NewDocEntry) -> Result<DocEntry, AssistantError> {
        if self.category(&new.service_key).is_none() {
            return Err(AssistantError::UnknownService(new.service_key));
        }
        let id = match new.id.filter(|id| !id.trim().is_empty()) {
            Some(id) if self.contains_id(&id) => return Err(AssistantError::CatalogDuplicateId(id)),
            Some(id) => id,
            None => self.next_id(&new.service_key),
        };
        let entry = DocEntry {
            id,
            service_key: new.service_key,
            title: new.title,
            url: new.url,
            description: new.description,
            tags: new.tags,
        };
        let category = self
            .categories
            .iter_mut()
            .find(|c| c.key == entry.service_key)
            .ok_or_else(|| AssistantError::UnknownService(entry.service_key.clone()))?;
        category.entries.push(entry.clone());
        Ok(entry)
    }

    pub(crate) fn patch(&mut self, id: &str, patch: &DocEntryPatch) -> Result<DocEntry, AssistantError> {
        let entry = self
            .categories
            .iter_mut()
            .flat_map(|c| c.entries.iter_mut())
            .find(|e| e.id == id)
            .ok_or_else(|| AssistantError::CatalogNotFound(id.to_string()))?;
        patch.apply(entry);
        Ok(entry.clone())
    }

    pub(crate) fn remove(&mut self, id: &str) -> Result<DocEntry, AssistantError> {
        for category in &mut self.categories {
            if let Some(pos) = category.entries.iter().position(|e| e.id == id) {
                return Ok(category.entries.remove(pos));
            }
        }
        Err(AssistantError::CatalogNotFound(id.to_string()))
    }
}

impl Serialize for Catalog {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        CatalogFileRef {
            services: ServicesRef(&self.categories),
        }
        .serialize(serializer)
    }
}

#[derive(Serialize)]
struct CatalogFileRef<'a> {
    services: ServicesRef<'a>,
}

struct ServicesRef<'a>(&'a [ServiceCategory]);

impl Serialize for ServicesRef<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for category in self.0 {
            let body = StoredCategoryRef {
                display_name: &category.display_name,
                description: &category.description,
                docs: category.entries.iter().map(StoredDocRef::from).collect(),
            };
            map.serialize_entry(&category.key, &body)?;
        }
        map.end()
    }
}

#[derive(Serialize)]
struct StoredCategoryRef<'a> {
    display_name: &'a str,
    description: &'a str,
    docs: Vec<StoredDocRef<'a>>,
}

#[derive(Serialize)]
struct StoredDocRef<'a> {
    id: &'a str,
    title: &'a str,
    url: &'a str,
    description: &'a str,
    tags: &'a [String],
}

impl<'a> From<&'a DocEntry> for StoredDocRef<'a> {
    fn from(e: &'a DocEntry) -> Self {
        Self {
            id: &e.id,
            title: &e.title,
            url: &e.url,
            description: &e.description,
            tags: &e.tags,
        }
    }
}

#[derive(Deserialize)]
struct CatalogFile {
    #[serde(default)]
    services: OrderedServices,
}

/// 保持文件中的键顺序（serde_json::Map 默认按键排序）
#[derive(Default)]
struct OrderedServices(Vec<(String, StoredCategory)>);

impl<'de> Deserialize<'de> for OrderedServices {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct OrderedVisitor;

        impl<'de> Visitor<'de> for OrderedVisitor {
            type Value = OrderedServices;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map of service key to service category")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut out = Vec::with_capacity(access.size_hint().unwrap_or(0));
                while let Some((key, value)) = access.next_entry::<String, StoredCategory>()? {
                    out.push((key, value));
                }
                Ok(OrderedServices(out))
            }
        }

        deserializer.deserialize_map(OrderedVisitor)
    }
}

#[derive(Deserialize)]
struct StoredCategory {
    #[serde(default)]
    display_name: Option<String>,
    #[serde(default)]
    description: String,
    #[serde(default)]
    docs: Vec<StoredDoc>,
}

impl StoredCategory {
    fn into_category(self, key: String) -> ServiceCategory {
        let entries = self
            .docs
            .into_iter()
            .map(|d| DocEntry {
                id: d.id,
                service_key: key.clone(),
                title: d.title,
                url: d.url,
                description: d.description,
                tags: d.tags,
            })
            .collect();
        ServiceCategory {
            display_name: self.display_name.unwrap_or_else(|| key.clone()),
            key,
            description: self.description,
            entries,
        }
    }
}

#[derive(Deserialize)]
struct StoredDoc {
    id: String,
    title: String,
    url: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    tags: Vec<String>,
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) const SAMPLE: &str = r#"{
        "services": {
            "zeta": {
                "display_name": "Zeta Service",
                "description": "Comes first in the file",
                "docs": [
                    {"id": "zeta_01", "title": "Zeta Intro", "url": "https://z/1", "description": "Intro", "tags": ["intro"]}
                ]
            },
            "alpha": {
                "display_name": "Alpha Service",
                "description": "Comes second",
                "docs": []
            }
        }
    }"#;

    #[test]
    fn test_from_json_keeps_file_order() {
        let catalog = Catalog::from_json(SAMPLE).unwrap();
        let keys: Vec<_> = catalog.categories().iter().map(|c| c.key.as_str()).collect();
        assert_eq!(keys, vec!["zeta", "alpha"]);
        assert_eq!(catalog.find("zeta_01").unwrap().service_key, "zeta");
    }

    #[test]
    fn test_json_roundtrip_preserves_catalog() {
        let catalog = Catalog::from_json(SAMPLE).unwrap();
        let json = catalog.to_json_pretty().unwrap();
        assert!(!json.contains("service_key"));
        assert_eq!(Catalog::from_json(&json).unwrap(), catalog);
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let data = r#"{"services": {
            "a": {"display_name": "A", "description": "", "docs": [{"id": "x", "title": "t", "url": "u"}]},
            "b": {"display_name": "B", "description": "", "docs": [{"id": "x", "title": "t", "url": "u"}]}
        }}"#;
        assert!(matches!(
            Catalog::from_json(data),
            Err(AssistantError::CatalogDuplicateId(id)) if id == "x"
        ));
    }

    #[test]
    fn test_next_id_skips_taken() {
        let mut catalog = Catalog::from_json(SAMPLE).unwrap();
        assert_eq!(catalog.next_id("zeta"), "zeta_02");
        catalog
            .insert(NewDocEntry {
                service_key: "zeta".into(),
                id: Some("zeta_02".into()),
                title: "t".into(),
                url: "u".into(),
                description: "d".into(),
                tags: vec![],
            })
            .unwrap();
        // 条目数为 2，zeta_03 未占用
        assert_eq!(catalog.next_id("zeta"), "zeta_03");
        catalog.remove("zeta_01").unwrap();
        // 条目数回到 1，zeta_02 已占用，顺延到 zeta_03
        assert_eq!(catalog.next_id("zeta"), "zeta_03");
    }

    #[test]
    fn test_insert_unknown_service() {
        let mut catalog = Catalog::from_json(SAMPLE).unwrap();
        let err = catalog
            .insert(NewDocEntry {
                service_key: "missing".into(),
                ..Default::default()
            })
            .unwrap_err();
        assert!(matches!(err, AssistantError::UnknownService(_)));
    }

    #[test]
    fn test_services_summary_line() {
        let catalog = Catalog::from_json(SAMPLE).unwrap();
        let summary = catalog.services_summary();
        assert!(summary.starts_with("- zeta: Zeta Service — Comes first in the file (1 docs)"));
    }
}
