//! 知识库：目录模型、带缓存的索引（CRUD）、加权关键词检索

pub mod index;
pub mod search;
pub mod types;

pub use index::{CatalogStore, JsonFileStore, KnowledgeIndex, MemoryStore};
pub use search::{rank, tokenize, ScoredResult, SearchEngine, MAX_RESULTS};
pub use types::{Catalog, DocEntry, DocEntryPatch, NewDocEntry, ServiceCategory, ServiceSummary};
