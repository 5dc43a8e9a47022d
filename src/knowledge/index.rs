//! KnowledgeIndex：带缓存的目录视图
//!
//! 首次 load 从后端存储读取并缓存为 `Arc<Catalog>` 快照，之后的读取直接返回快照；
//! 写操作经单写者锁串行化：克隆快照 → 修改 → 写穿存储 → 替换缓存，读者只会看到完整的新旧快照之一。
//! 外部对存储文件的修改只有在 invalidate 之后才会被观察到。

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex as StdMutex};

use tokio::sync::{Mutex, RwLock};

use crate::core::AssistantError;
use crate::knowledge::{Catalog, DocEntry, DocEntryPatch, NewDocEntry, ServiceSummary};

/// 目录后端存储
pub trait CatalogStore: Send + Sync {
    fn read(&self) -> Result<Catalog, AssistantError>;
    fn write(&self, catalog: &Catalog) -> Result<(), AssistantError>;
}

/// 单文件 JSON 存储；文件不存在时视为空目录
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CatalogStore for JsonFileStore {
    fn read(&self) -> Result<Catalog, AssistantError> {
        if !self.path.exists() {
            tracing::warn!(path = %self.path.display(), "Knowledge base file not found, starting empty");
            return Ok(Catalog::default());
        }
        let data = std::fs::read_to_string(&self.path)?;
        Catalog::from_json(&data)
    }

    /// 先写临时文件再 rename，避免留下写了一半的文件
    fn write(&self, catalog: &Catalog) -> Result<(), AssistantError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, catalog.to_json_pretty()?)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

/// 内存存储（测试或只读演示用）
#[derive(Debug, Default)]
pub struct MemoryStore {
    catalog: StdMutex<Catalog>,
}

impl MemoryStore {
    pub fn new(catalog: Catalog) -> Self {
        Self {
            catalog: StdMutex::new(catalog),
        }
    }
}

impl CatalogStore for MemoryStore {
    fn read(&self) -> Result<Catalog, AssistantError> {
        Ok(self.catalog.lock().unwrap_or_else(|e| e.into_inner()).clone())
    }

    fn write(&self, catalog: &Catalog) -> Result<(), AssistantError> {
        *self.catalog.lock().unwrap_or_else(|e| e.into_inner()) = catalog.clone();
        Ok(())
    }
}

/// 知识库索引：缓存快照 + 单写者 CRUD
pub struct KnowledgeIndex {
    store: Box<dyn CatalogStore>,
    cache: RwLock<Option<Arc<Catalog>>>,
    writer: Mutex<()>,
}

impl KnowledgeIndex {
    pub fn new(store: impl CatalogStore + 'static) -> Self {
        Self {
            store: Box::new(store),
            cache: RwLock::new(None),
            writer: Mutex::new(()),
        }
    }

    /// JSON 文件后端
    pub fn open(path: impl AsRef<Path>) -> Self {
        Self::new(JsonFileStore::new(path))
    }

    /// 内存后端
    pub fn in_memory(catalog: Catalog) -> Self {
        Self::new(MemoryStore::new(catalog))
    }

    /// 返回当前快照；仅第一次（或 invalidate 之后）读取存储
    pub async fn load(&self) -> Result<Arc<Catalog>, AssistantError> {
        if let Some(catalog) = self.cache.read().await.as_ref() {
            return Ok(Arc::clone(catalog));
        }

        let mut cache = self.cache.write().await;
        if let Some(catalog) = cache.as_ref() {
            return Ok(Arc::clone(catalog));
        }
        let catalog = Arc::new(self.store.read()?);
        tracing::info!(
            services = catalog.categories().len(),
            entries = catalog.entry_count(),
            "Loaded knowledge base"
        );
        *cache = Some(Arc::clone(&catalog));
        Ok(catalog)
    }

    /// 丢弃缓存，下次 load 重新读取存储
    pub async fn invalidate(&self) {
        let _writer = self.writer.lock().await;
        *self.cache.write().await = None;
        tracing::debug!("Knowledge base cache invalidated");
    }

    pub async fn list_by_service(&self, service: Option<&str>) -> Result<Vec<DocEntry>, AssistantError> {
        let catalog = self.load().await?;
        Ok(catalog
            .entries()
            .filter(|(c, _)| service.map_or(true, |key| c.key == key))
            .map(|(_, e)| e.clone())
            .collect())
    }

    /// 按 id 查条目（目录顺序），未知 id 静默丢弃
    pub async fn lookup_by_ids(&self, ids: &[String]) -> Result<Vec<DocEntry>, AssistantError> {
        let wanted: HashSet<&str> = ids.iter().map(String::as_str).collect();
        let catalog = self.load().await?;
        Ok(catalog
            .entries()
            .filter(|(_, e)| wanted.contains(e.id.as_str()))
            .map(|(_, e)| e.clone())
            .collect())
    }

    pub async fn valid_ids(&self) -> Result<HashSet<String>, AssistantError> {
        Ok(self.load().await?.ids())
    }

    pub async fn services(&self) -> Result<Vec<ServiceSummary>, AssistantError> {
        Ok(self.load().await?.summaries())
    }

    pub async fn services_summary(&self) -> Result<String, AssistantError> {
        Ok(self.load().await?.services_summary())
    }

    /// 新增条目；id 缺省时自动生成，重复 id 返回 CatalogDuplicateId
    pub async fn add(&self, entry: NewDocEntry) -> Result<DocEntry, AssistantError> {
        let added = self.mutate(|catalog| catalog.insert(entry)).await?;
        tracing::info!(id = %added.id, service = %added.service_key, "Added knowledge base entry");
        Ok(added)
    }

    /// 部分更新；id 不存在返回 CatalogNotFound
    pub async fn update(&self, id: &str, patch: DocEntryPatch) -> Result<DocEntry, AssistantError> {
        if patch.is_empty() {
            return Err(AssistantError::EmptyUpdate);
        }
        let updated = self.mutate(|catalog| catalog.patch(id, &patch)).await?;
        tracing::info!(id = %updated.id, "Updated knowledge base entry");
        Ok(updated)
    }

    /// 删除条目；不存在时返回 false 且不写存储
    pub async fn delete(&self, id: &str) -> Result<bool, AssistantError> {
        match self.mutate(|catalog| catalog.remove(id)).await {
            Ok(removed) => {
                tracing::info!(id = %removed.id, "Deleted knowledge base entry");
                Ok(true)
            }
            Err(AssistantError::CatalogNotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// 单写者：修改失败时存储与缓存都保持不变
    async fn mutate<T, F>(&self, f: F) -> Result<T, AssistantError>
    where
        F: FnOnce(&mut Catalog) -> Result<T, AssistantError>,
    {
        let _writer = self.writer.lock().await;
        let current = self.load().await?;
        let mut next = (*current).clone();
        let out = f(&mut next)?;
        self.store.write(&next)?;
        let entries = next.entry_count();
        *self.cache.write().await = Some(Arc::new(next));
        tracing::info!(entries, "Saved knowledge base");
        Ok(out)
    }
}
