//! # Storage Layer
//!
//! ## Purpose
//! Defines the storage-layer contracts the retrieval pipeline depends on and
//! a `sled`-backed implementation for the stores the core owns outright.
//!
//! `CaseStore` models data owned by an external scraper/ingest process — the
//! core only ever reads it. `KbChunkStore`, `StatuteStore`, and `SessionStore`
//! are owned by this crate and are backed by `sled` trees with `bincode`
//! serialization, following the same embedded-database pattern used
//! throughout this codebase for persistent state.

use crate::config::StorageConfig;
use crate::errors::{EngineError, Result};
use crate::{
    ActiveSession, Case, CaseDetail, CaseId, ChunkSourceType, Comment, DocumentId, KbChunk, Order,
    ProcessingLogEntry, StatuteEntry,
};
use async_trait::async_trait;
use std::sync::Arc;

/// Read-only contract over externally-owned case records (C6, C7's metadata
/// enrichment).
#[async_trait]
pub trait CaseStore: Send + Sync {
    async fn get_case(&self, case_id: &CaseId) -> Result<Option<Case>>;
    async fn get_case_detail(&self, case_id: &CaseId) -> Result<Option<CaseDetail>>;
    async fn get_orders(&self, case_id: &CaseId) -> Result<Vec<Order>>;
    async fn get_comments(&self, case_id: &CaseId) -> Result<Vec<Comment>>;
    /// Case-insensitive exact/substring match on `case_number`, used by C6's
    /// tiers 1-2.
    async fn find_cases_by_number(&self, query: &str) -> Result<Vec<Case>>;
    /// Substring match on `title`, used by C6's tier 4.
    async fn find_cases_by_title(&self, query: &str) -> Result<Vec<Case>>;
    /// Iterate every case; used by C3's full-reingest path.
    async fn list_case_ids(&self) -> Result<Vec<CaseId>>;
}

/// Owned store for retrievable knowledge-base chunks (C2/C3 write, C7 read).
#[async_trait]
pub trait KbChunkStore: Send + Sync {
    /// Insert or replace a chunk, keyed by `(source_type, source_id)`.
    async fn upsert_chunk(&self, chunk: &KbChunk) -> Result<()>;
    async fn get_chunk(&self, source_type: ChunkSourceType, source_id: &str) -> Result<Option<KbChunk>>;
    async fn delete_by_case(&self, case_id: &CaseId) -> Result<usize>;
    async fn chunks_for_case(&self, case_id: &CaseId) -> Result<Vec<KbChunk>>;
    /// Simple ILIKE-style substring scan, used by C7's fallback chain.
    async fn search_text(&self, pattern: &str, limit: usize) -> Result<Vec<KbChunk>>;
    async fn count(&self) -> Result<usize>;
    async fn has_content_hash(&self, content_hash: &str) -> Result<bool>;
    async fn append_processing_log(&self, entry: &ProcessingLogEntry) -> Result<()>;
    async fn processing_log_entry(
        &self,
        case_id: &CaseId,
        document_id: Option<&DocumentId>,
        rules_version: &str,
    ) -> Result<Option<ProcessingLogEntry>>;
}

/// Owned store for curated statute entries (C5).
#[async_trait]
pub trait StatuteStore: Send + Sync {
    async fn all_active(&self) -> Result<Vec<StatuteEntry>>;
    async fn by_slug(&self, slug: &str) -> Result<Option<StatuteEntry>>;
}

/// Owned store for active QA sessions (C10's session lock).
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn get(&self, session_id: &str) -> Result<Option<ActiveSession>>;
    async fn put(&self, session: &ActiveSession) -> Result<()>;
}

/// `sled`-backed implementation of the core-owned stores. `CaseStore` is not
/// implemented here — the case records live in an external database reached
/// through a separate adapter (see `SledCaseStore` below for the read
/// projection used in single-binary deployments and tests).
pub struct SledStore {
    config: StorageConfig,
    db: Arc<sled::Db>,
    chunks_tree: sled::Tree,
    processing_log_tree: sled::Tree,
    statutes_tree: sled::Tree,
    sessions_tree: sled::Tree,
    cases_tree: sled::Tree,
    case_details_tree: sled::Tree,
    orders_tree: sled::Tree,
    comments_tree: sled::Tree,
}

impl SledStore {
    pub fn open(config: StorageConfig) -> Result<Self> {
        if let Some(parent) = config.db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let db = sled::open(&config.db_path)?;
        let chunks_tree = db.open_tree("kb_chunks")?;
        let processing_log_tree = db.open_tree("processing_log")?;
        let statutes_tree = db.open_tree("statutes")?;
        let sessions_tree = db.open_tree("sessions")?;
        let cases_tree = db.open_tree("cases")?;
        let case_details_tree = db.open_tree("case_details")?;
        let orders_tree = db.open_tree("orders")?;
        let comments_tree = db.open_tree("comments")?;

        tracing::info!("Storage opened at {:?}", config.db_path);

        Ok(Self {
            config,
            db: Arc::new(db),
            chunks_tree,
            processing_log_tree,
            statutes_tree,
            sessions_tree,
            cases_tree,
            case_details_tree,
            orders_tree,
            comments_tree,
        })
    }

    /// Compress a large text blob before writing it as a raw value outside
    /// of a bincode-serialized struct (used by document full-text storage
    /// in the ingestion pipeline, which bypasses `KbChunk` for page-level
    /// text too large to duplicate across chunk variants).
    pub fn compress_blob(&self, text: &str) -> Result<Vec<u8>> {
        use std::io::Write;
        if !self.config.enable_compression {
            return Ok(text.as_bytes().to_vec());
        }
        let mut encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
        encoder.write_all(text.as_bytes())?;
        Ok(encoder.finish()?)
    }

    pub fn decompress_blob(&self, data: &[u8]) -> Result<String> {
        use std::io::Read;
        if !self.config.enable_compression {
            return Ok(String::from_utf8_lossy(data).into_owned());
        }
        let mut decoder = flate2::read::GzDecoder::new(data);
        let mut out = String::new();
        decoder.read_to_string(&mut out)?;
        Ok(out)
    }

    fn chunk_key(source_type: ChunkSourceType, source_id: &str) -> String {
        format!("{:?}:{}", source_type, source_id)
    }

    /// Health check, mirroring the write-then-read-then-clean pattern used
    /// for every owned tree.
    pub fn health_check(&self) -> Result<()> {
        let key = b"__health_check__";
        self.chunks_tree.insert(key, b"ok".as_ref())?;
        let found = self.chunks_tree.get(key)?;
        self.chunks_tree.remove(key)?;
        if found.is_none() {
            return Err(EngineError::Internal {
                message: "health check round-trip failed".to_string(),
            });
        }
        Ok(())
    }

    pub fn db_size_on_disk(&self) -> Result<u64> {
        Ok(self.db.size_on_disk()?)
    }

    pub fn flush(&self) -> Result<()> {
        self.db.flush()?;
        Ok(())
    }

    /// Seed or replace a case record (used by ingestion tests and small
    /// single-binary deployments that embed the case store alongside the
    /// knowledge base rather than reading it from an external database).
    pub fn put_case(&self, case: &Case) -> Result<()> {
        let value = bincode::serialize(case)?;
        self.cases_tree.insert(case.id.as_bytes(), value)?;
        Ok(())
    }

    pub fn put_case_detail(&self, case_id: &CaseId, detail: &CaseDetail) -> Result<()> {
        let value = bincode::serialize(detail)?;
        self.case_details_tree.insert(case_id.as_bytes(), value)?;
        Ok(())
    }

    pub fn put_order(&self, order: &Order) -> Result<()> {
        let key = format!("{}:{}", order.case_id, order.sr_number);
        let value = bincode::serialize(order)?;
        self.orders_tree.insert(key.as_bytes(), value)?;
        Ok(())
    }

    pub fn put_comment(&self, index: usize, comment: &Comment) -> Result<()> {
        let key = format!("{}:{}", comment.case_id, index);
        let value = bincode::serialize(comment)?;
        self.comments_tree.insert(key.as_bytes(), value)?;
        Ok(())
    }
}

#[async_trait]
impl CaseStore for SledStore {
    async fn get_case(&self, case_id: &CaseId) -> Result<Option<Case>> {
        match self.cases_tree.get(case_id.as_bytes())? {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    async fn get_case_detail(&self, case_id: &CaseId) -> Result<Option<CaseDetail>> {
        match self.case_details_tree.get(case_id.as_bytes())? {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    async fn get_orders(&self, case_id: &CaseId) -> Result<Vec<Order>> {
        let prefix = format!("{}:", case_id);
        let mut orders = Vec::new();
        for item in self.orders_tree.scan_prefix(prefix.as_bytes()) {
            let (_, value) = item?;
            orders.push(bincode::deserialize(&value)?);
        }
        Ok(orders)
    }

    async fn get_comments(&self, case_id: &CaseId) -> Result<Vec<Comment>> {
        let prefix = format!("{}:", case_id);
        let mut comments = Vec::new();
        for item in self.comments_tree.scan_prefix(prefix.as_bytes()) {
            let (_, value) = item?;
            comments.push(bincode::deserialize(&value)?);
        }
        Ok(comments)
    }

    async fn find_cases_by_number(&self, query: &str) -> Result<Vec<Case>> {
        let needle = query.to_lowercase();
        let mut matches = Vec::new();
        for item in self.cases_tree.iter() {
            let (_, value) = item?;
            let case: Case = bincode::deserialize(&value)?;
            if case.case_number.to_lowercase().contains(&needle) {
                matches.push(case);
            }
        }
        Ok(matches)
    }

    async fn find_cases_by_title(&self, query: &str) -> Result<Vec<Case>> {
        let needle = query.to_lowercase();
        let mut matches = Vec::new();
        for item in self.cases_tree.iter() {
            let (_, value) = item?;
            let case: Case = bincode::deserialize(&value)?;
            if case.title.to_lowercase().contains(&needle) {
                matches.push(case);
            }
        }
        Ok(matches)
    }

    async fn list_case_ids(&self) -> Result<Vec<CaseId>> {
        let mut ids = Vec::new();
        for item in self.cases_tree.iter() {
            let (key, _) = item?;
            ids.push(String::from_utf8_lossy(&key).into_owned());
        }
        Ok(ids)
    }
}

#[async_trait]
impl KbChunkStore for SledStore {
    async fn upsert_chunk(&self, chunk: &KbChunk) -> Result<()> {
        let key = Self::chunk_key(chunk.source_type, &chunk.source_id);
        let value = bincode::serialize(chunk)?;
        self.chunks_tree.insert(key.as_bytes(), value)?;
        Ok(())
    }

    async fn get_chunk(&self, source_type: ChunkSourceType, source_id: &str) -> Result<Option<KbChunk>> {
        let key = Self::chunk_key(source_type, source_id);
        match self.chunks_tree.get(key.as_bytes())? {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    async fn delete_by_case(&self, case_id: &CaseId) -> Result<usize> {
        let mut removed = 0;
        let mut keys_to_remove = Vec::new();
        for item in self.chunks_tree.iter() {
            let (key, value) = item?;
            let chunk: KbChunk = bincode::deserialize(&value)?;
            if chunk.source_case_id.as_ref() == Some(case_id) {
                keys_to_remove.push(key);
            }
        }
        for key in keys_to_remove {
            self.chunks_tree.remove(key)?;
            removed += 1;
        }
        Ok(removed)
    }

    async fn chunks_for_case(&self, case_id: &CaseId) -> Result<Vec<KbChunk>> {
        let mut out = Vec::new();
        for item in self.chunks_tree.iter() {
            let (_, value) = item?;
            let chunk: KbChunk = bincode::deserialize(&value)?;
            if chunk.source_case_id.as_ref() == Some(case_id) {
                out.push(chunk);
            }
        }
        Ok(out)
    }

    async fn search_text(&self, pattern: &str, limit: usize) -> Result<Vec<KbChunk>> {
        let needle = pattern.to_lowercase();
        let mut out = Vec::new();
        for item in self.chunks_tree.iter() {
            if out.len() >= limit {
                break;
            }
            let (_, value) = item?;
            let chunk: KbChunk = bincode::deserialize(&value)?;
            if chunk.content_text.to_lowercase().contains(&needle) {
                out.push(chunk);
            }
        }
        Ok(out)
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.chunks_tree.len())
    }

    async fn has_content_hash(&self, content_hash: &str) -> Result<bool> {
        for item in self.chunks_tree.iter() {
            let (_, value) = item?;
            let chunk: KbChunk = bincode::deserialize(&value)?;
            if chunk.content_hash == content_hash {
                return Ok(true);
            }
        }
        Ok(false)
    }

    async fn append_processing_log(&self, entry: &ProcessingLogEntry) -> Result<()> {
        let doc_part = entry.document_id.clone().unwrap_or_default();
        let key = format!(
            "{}:{}:{}",
            entry.case_id, doc_part, entry.rules_version
        );
        let value = bincode::serialize(entry)?;
        self.processing_log_tree.insert(key.as_bytes(), value)?;
        Ok(())
    }

    async fn processing_log_entry(
        &self,
        case_id: &CaseId,
        document_id: Option<&DocumentId>,
        rules_version: &str,
    ) -> Result<Option<ProcessingLogEntry>> {
        let doc_part = document_id.cloned().unwrap_or_default();
        let key = format!("{}:{}:{}", case_id, doc_part, rules_version);
        match self.processing_log_tree.get(key.as_bytes())? {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes)?)),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl StatuteStore for SledStore {
    async fn all_active(&self) -> Result<Vec<StatuteEntry>> {
        let mut out = Vec::new();
        for item in self.statutes_tree.iter() {
            let (_, value) = item?;
            let entry: StatuteEntry = bincode::deserialize(&value)?;
            if entry.active {
                out.push(entry);
            }
        }
        Ok(out)
    }

    async fn by_slug(&self, slug: &str) -> Result<Option<StatuteEntry>> {
        match self.statutes_tree.get(slug.as_bytes())? {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes)?)),
            None => Ok(None),
        }
    }
}

impl SledStore {
    pub fn put_statute(&self, entry: &StatuteEntry) -> Result<()> {
        let value = bincode::serialize(entry)?;
        self.statutes_tree.insert(entry.slug.as_bytes(), value)?;
        Ok(())
    }
}

#[async_trait]
impl SessionStore for SledStore {
    async fn get(&self, session_id: &str) -> Result<Option<ActiveSession>> {
        match self.sessions_tree.get(session_id.as_bytes())? {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    async fn put(&self, session: &ActiveSession) -> Result<()> {
        let value = bincode::serialize(session)?;
        self.sessions_tree
            .insert(session.session_id.as_bytes(), value)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{CaseStatus, ChunkLegalMetadata};

    fn test_store() -> SledStore {
        let dir = tempfile::tempdir().unwrap();
        let config = StorageConfig {
            db_path: dir.path().join("test.db"),
            enable_compression: true,
        };
        // Keep the tempdir alive for the duration of the test by leaking it;
        // acceptable in tests, never in production code paths.
        std::mem::forget(dir);
        SledStore::open(config).unwrap()
    }

    #[tokio::test]
    async fn upserts_and_reads_chunk_by_key() {
        let store = test_store();
        let chunk = KbChunk {
            source_type: ChunkSourceType::CaseMetadata,
            source_id: "case-1".to_string(),
            source_case_id: Some("case-1".to_string()),
            source_document_id: None,
            content_text: "some chunk text".to_string(),
            content_summary: None,
            metadata: ChunkLegalMetadata::default(),
            vector_id: None,
            embedding_model: None,
            embedding_dim: None,
            content_quality_score: 0.9,
            legal_relevance_score: 0.8,
            completeness_score: 0.95,
            content_hash: "abc".to_string(),
            is_processed: true,
            created_at: chrono::Utc::now(),
        };
        store.upsert_chunk(&chunk).await.unwrap();
        let fetched = store
            .get_chunk(ChunkSourceType::CaseMetadata, "case-1")
            .await
            .unwrap();
        assert!(fetched.is_some());
        assert_eq!(fetched.unwrap().source_id, "case-1");
    }

    #[tokio::test]
    async fn delete_by_case_removes_all_chunks_for_case() {
        let store = test_store();
        for i in 0..3 {
            let chunk = KbChunk {
                source_type: ChunkSourceType::CaseDocument,
                source_id: format!("doc-{}", i),
                source_case_id: Some("case-2".to_string()),
                source_document_id: Some(format!("doc-{}", i)),
                content_text: "text".to_string(),
                content_summary: None,
                metadata: ChunkLegalMetadata::default(),
                vector_id: None,
                embedding_model: None,
                embedding_dim: None,
                content_quality_score: 0.5,
                legal_relevance_score: 0.5,
                completeness_score: 0.5,
                content_hash: format!("hash-{}", i),
                is_processed: true,
                created_at: chrono::Utc::now(),
            };
            store.upsert_chunk(&chunk).await.unwrap();
        }
        let removed = store.delete_by_case(&"case-2".to_string()).await.unwrap();
        assert_eq!(removed, 3);
        assert_eq!(store.chunks_for_case(&"case-2".to_string()).await.unwrap().len(), 0);
    }

    #[tokio::test]
    async fn case_lookup_is_case_insensitive() {
        let store = test_store();
        store
            .put_case(&Case {
                id: "c1".to_string(),
                case_number: "T.A. 2/2023 Civil (SB)".to_string(),
                title: "Ali Khan vs State".to_string(),
                court: "High Court".to_string(),
                status: CaseStatus::Decided,
                bench: None,
                institution_date: None,
                hearing_date: None,
            })
            .unwrap();
        let results = store.find_cases_by_number("t.a. 2/2023").await.unwrap();
        assert_eq!(results.len(), 1);
    }
}
