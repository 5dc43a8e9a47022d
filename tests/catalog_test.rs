//! 目录管理集成测试：JSON 文件写穿与重新加载

#[cfg(test)]
mod tests {
    use docent::core::AssistantError;
    use docent::knowledge::{DocEntryPatch, KnowledgeIndex, NewDocEntry};

    const CATALOG: &str = r#"{
        "services": {
            "joule": {
                "display_name": "Joule",
                "description": "Copilot",
                "docs": [
                    {"id": "joule_01", "title": "What is Joule", "url": "https://j/1", "description": "Overview", "tags": ["joule"]}
                ]
            },
            "ai_core": {
                "display_name": "SAP AI Core",
                "description": "Run AI workloads",
                "docs": []
            }
        }
    }"#;

    fn new_entry(service_key: &str, title: &str) -> NewDocEntry {
        NewDocEntry {
            service_key: service_key.to_string(),
            title: title.to_string(),
            url: format!("https://x/{}", title),
            description: "desc".to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_crud_round_trip_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kb.json");
        std::fs::write(&path, CATALOG).unwrap();

        let index = KnowledgeIndex::open(&path);
        let added = index.add(new_entry("joule", "Skills")).await.unwrap();
        assert_eq!(added.id, "joule_02");

        let patch = DocEntryPatch {
            title: Some("Joule Skills".to_string()),
            ..Default::default()
        };
        let updated = index.update("joule_02", patch).await.unwrap();
        assert_eq!(updated.title, "Joule Skills");
        assert_eq!(updated.url, "https://x/Skills");

        // 新实例从磁盘读取，验证写穿
        let reopened = KnowledgeIndex::open(&path);
        let entries = reopened.list_by_service(Some("joule")).await.unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].title, "Joule Skills");

        assert!(reopened.delete("joule_02").await.unwrap());
        assert!(!reopened.delete("joule_02").await.unwrap());
        let services = KnowledgeIndex::open(&path).services().await.unwrap();
        assert_eq!(services[0].key, "joule");
        assert_eq!(services[0].doc_count, 1);
        assert_eq!(services[1].key, "ai_core");
    }

    #[tokio::test]
    async fn test_add_update_delete_restores_catalog() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kb.json");
        std::fs::write(&path, CATALOG).unwrap();
        let index = KnowledgeIndex::open(&path);

        let before = index.load().await.unwrap();
        let ordered_before: Vec<String> = before.entries().map(|(_, e)| e.id.clone()).collect();

        let added = index.add(new_entry("ai_core", "Deploy")).await.unwrap();
        assert_eq!(added.id, "ai_core_01");
        let mid = index.load().await.unwrap();
        assert_eq!(mid.entry_count(), before.entry_count() + 1);
        assert!(mid.ids().contains("ai_core_01"));

        let patch = DocEntryPatch {
            tags: Some(vec!["deploy".to_string()]),
            ..Default::default()
        };
        index.update("ai_core_01", patch).await.unwrap();
        assert_eq!(index.load().await.unwrap().entry_count(), before.entry_count() + 1);

        assert!(index.delete("ai_core_01").await.unwrap());
        let after = KnowledgeIndex::open(&path).load().await.unwrap();
        assert_eq!(after.ids(), before.ids());
        assert_eq!(after.entry_count(), before.entry_count());
        let ordered_after: Vec<String> = after.entries().map(|(_, e)| e.id.clone()).collect();
        assert_eq!(ordered_after, ordered_before);
        assert_eq!(after.categories().len(), 2);
    }

    #[tokio::test]
    async fn test_invalid_mutations_leave_file_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kb.json");
        std::fs::write(&path, CATALOG).unwrap();
        let index = KnowledgeIndex::open(&path);

        let err = index.add(new_entry("unknown", "x")).await.unwrap_err();
        assert!(matches!(err, AssistantError::UnknownService(_)));

        let mut dup = new_entry("ai_core", "dup");
        dup.id = Some("joule_01".to_string());
        let err = index.add(dup).await.unwrap_err();
        assert!(matches!(err, AssistantError::CatalogDuplicateId(_)));

        let err = index.update("joule_01", DocEntryPatch::default()).await.unwrap_err();
        assert!(matches!(err, AssistantError::EmptyUpdate));

        let err = index
            .update(
                "fake_99",
                DocEntryPatch {
                    url: Some("u".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AssistantError::CatalogNotFound(_)));

        assert_eq!(std::fs::read_to_string(&path).unwrap(), CATALOG);
    }

    #[tokio::test]
    async fn test_lookup_drops_unknown_ids() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kb.json");
        std::fs::write(&path, CATALOG).unwrap();
        let index = KnowledgeIndex::open(&path);

        let found = index
            .lookup_by_ids(&["fake_99".to_string(), "joule_01".to_string()])
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, "joule_01");
    }
}
