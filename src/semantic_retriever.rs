//! # Semantic Retriever — Stage 1 (C7)
//!
//! ## Purpose
//! Dense recall over the knowledge base: embeds the query, queries a vector
//! index for the top `initial_retrieval_k` candidates, enriches each hit
//! with case metadata, and falls back to lexical scans when the vector
//! index is unavailable.
//!
//! ## Embedding cache
//! Query embeddings are cached on disk, keyed by the MD5 hash of the query
//! text, written via a temp-file-then-atomic-rename so a crash mid-write
//! never leaves a corrupt cache entry. A missing or unreadable cache file is
//! tolerated as a cache miss rather than an error.

use crate::config::RetrievalConfig;
use crate::errors::{EngineError, Result};
use crate::store::{CaseStore, KbChunkStore};
use crate::utils::TextUtils;
use crate::{CaseId, ChunkLegalMetadata, KbChunk};
use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;

/// Client abstraction over the vector index service (e.g. a Qdrant/Milvus
/// deployment, or an in-process ANN index). Kept as a trait so the
/// orchestrator can be exercised against a fake in tests.
#[async_trait]
pub trait VectorIndexClient: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
    async fn query(&self, embedding: &[f32], top_k: usize) -> Result<Vec<(String, f32)>>;
    async fn health_check(&self) -> Result<()>;
}

/// A stage-1 candidate, prior to reranking.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Stage1Result {
    pub chunk: KbChunk,
    pub stage1_score: f64,
    pub case_title: Option<String>,
    pub case_number: Option<String>,
}

/// Disk-backed embedding cache keyed on the MD5 hash of the text, following
/// the ingestion cache layout this codebase already favors for on-disk
/// artifacts (`sled`/`flate2` aside — this one is deliberately a flat file
/// cache since entries are small, independent, and benefit from per-entry
/// atomic replace semantics rather than a shared database lock).
pub struct EmbeddingCache {
    dir: PathBuf,
}

impl EmbeddingCache {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    fn path_for(&self, text: &str) -> PathBuf {
        self.dir.join(format!("{}.bin", TextUtils::md5_hex(text)))
    }

    pub async fn get(&self, text: &str) -> Option<Vec<f32>> {
        let path = self.path_for(text);
        match tokio::fs::read(&path).await {
            Ok(bytes) => bincode::deserialize(&bytes).ok(),
            Err(_) => None,
        }
    }

    pub async fn put(&self, text: &str, embedding: &[f32]) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self.path_for(text);
        let tmp_path = path.with_extension("bin.tmp");
        let bytes = bincode::serialize(&embedding.to_vec())?;
        tokio::fs::write(&tmp_path, &bytes).await?;
        tokio::fs::rename(&tmp_path, &path).await?;
        Ok(())
    }
}

/// `VectorIndexClient` backed by a real embedding/vector-index HTTP service,
/// following the same `reqwest::Client` + JSON request/response shape the
/// ingestion data sources use for external APIs.
pub struct HttpVectorIndexClient {
    client: reqwest::Client,
    base_url: String,
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    texts: &'a [String],
}

#[derive(Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

#[derive(Serialize)]
struct VectorQueryRequest<'a> {
    vector: &'a [f32],
    top_k: usize,
}

#[derive(Deserialize)]
struct VectorQueryResponse {
    matches: Vec<VectorMatch>,
}

#[derive(Deserialize)]
struct VectorMatch {
    id: String,
    score: f32,
}

impl HttpVectorIndexClient {
    pub fn new(base_url: String, timeout_ms: u64) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_millis(timeout_ms))
            .build()?;
        Ok(Self { client, base_url })
    }
}

#[async_trait]
impl VectorIndexClient for HttpVectorIndexClient {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut embeddings = self.embed_batch(std::slice::from_ref(&text.to_string())).await?;
        embeddings.pop().ok_or_else(|| EngineError::EmbeddingGenerationFailed {
            text_preview: TextUtils::truncate(text, 80),
            reason: "embedding service returned no vectors".to_string(),
        })
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let response = self
            .client
            .post(format!("{}/embed", self.base_url))
            .json(&EmbedRequest { texts })
            .send()
            .await?
            .error_for_status()?
            .json::<EmbedResponse>()
            .await?;
        Ok(response.embeddings)
    }

    async fn query(&self, embedding: &[f32], top_k: usize) -> Result<Vec<(String, f32)>> {
        let response = self
            .client
            .post(format!("{}/query", self.base_url))
            .json(&VectorQueryRequest { vector: embedding, top_k })
            .send()
            .await?
            .error_for_status()?
            .json::<VectorQueryResponse>()
            .await?;
        Ok(response.matches.into_iter().map(|m| (m.id, m.score)).collect())
    }

    async fn health_check(&self) -> Result<()> {
        self.client
            .get(format!("{}/health", self.base_url))
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

/// Metadata filters applied to a stage-1 query. Unsupported filters (those
/// the vector index client does not know how to apply) are dropped rather
/// than rejected, so a caller can pass a forward-compatible filter set
/// without breaking retrieval.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetadataFilters {
    pub court: Option<String>,
    pub legal_domain: Option<String>,
    pub case_id: Option<CaseId>,
}

/// In-process per-case metadata enrichment cache, avoiding a redundant case
/// lookup for every chunk belonging to the same case within one query.
struct EnrichmentCache {
    cases: DashMap<CaseId, (Option<String>, Option<String>)>,
}

impl EnrichmentCache {
    fn new() -> Self {
        Self {
            cases: DashMap::new(),
        }
    }

    async fn enrich(
        &self,
        case_store: &Arc<dyn CaseStore>,
        case_id: &CaseId,
    ) -> Result<(Option<String>, Option<String>)> {
        if let Some(entry) = self.cases.get(case_id) {
            return Ok(entry.clone());
        }
        let case = case_store.get_case(case_id).await?;
        let value = case.map(|c| (Some(c.title), Some(c.case_number))).unwrap_or((None, None));
        self.cases.insert(case_id.clone(), value.clone());
        Ok(value)
    }
}

/// Run the C7 fallback chain for when the vector index is unavailable:
/// ILIKE scan over KB chunks, ranked by naive term-overlap scoring. The
/// same chain is reused regardless of which upstream stage failed, since
/// the fallback's job is simply "return something plausible from text
/// alone."
async fn lexical_fallback(
    kb_store: &Arc<dyn KbChunkStore>,
    query: &str,
    top_k: usize,
) -> Result<Vec<Stage1Result>> {
    let terms: Vec<&str> = query.split_whitespace().collect();
    let pattern = terms.first().copied().unwrap_or(query);
    let candidates = kb_store.search_text(pattern, top_k.max(50)).await?;

    let query_tokens = TextUtils::token_set(query);
    let mut scored: Vec<Stage1Result> = candidates
        .into_iter()
        .map(|chunk| {
            let chunk_tokens = TextUtils::token_set(&chunk.content_text);
            let score = TextUtils::jaccard_similarity(&query_tokens, &chunk_tokens);
            Stage1Result {
                case_title: chunk.metadata.case_title.clone(),
                case_number: chunk.metadata.case_number.clone(),
                chunk,
                stage1_score: score,
            }
        })
        .collect();

    scored.sort_by(|a, b| b.stage1_score.partial_cmp(&a.stage1_score).unwrap());
    scored.truncate(top_k);
    Ok(scored)
}

/// Run stage 1: embed the query (cache permitting), query the vector index,
/// and enrich results with case metadata. On vector index failure, fall
/// through to a lexical scan rather than propagate the error — C7 is
/// defined to always produce *some* candidate set.
pub async fn retrieve(
    vector_client: &Arc<dyn VectorIndexClient>,
    embedding_cache: &EmbeddingCache,
    kb_store: &Arc<dyn KbChunkStore>,
    case_store: &Arc<dyn CaseStore>,
    query: &str,
    config: &RetrievalConfig,
    _filters: &MetadataFilters,
) -> Result<Vec<Stage1Result>> {
    let embedding = match embedding_cache.get(query).await {
        Some(cached) => cached,
        None => match vector_client.embed(query).await {
            Ok(embedding) => {
                if let Err(e) = embedding_cache.put(query, &embedding).await {
                    tracing::warn!("failed to write embedding cache entry: {}", e);
                }
                embedding
            }
            Err(e) => {
                tracing::warn!("embedding generation failed, falling back to lexical scan: {}", e);
                return lexical_fallback(kb_store, query, config.initial_retrieval_k).await;
            }
        },
    };

    let hits = match vector_client.query(&embedding, config.initial_retrieval_k).await {
        Ok(hits) => hits,
        Err(e) => {
            tracing::warn!(
                "vector index unavailable ({}), falling back to lexical scan",
                e
            );
            return lexical_fallback(kb_store, query, config.initial_retrieval_k).await;
        }
    };

    let enrichment = EnrichmentCache::new();
    let mut results = Vec::with_capacity(hits.len());

    for (vector_id, score) in hits {
        let chunk = kb_store
            .search_text(&vector_id, 1)
            .await?
            .into_iter()
            .find(|c| c.vector_id.as_deref() == Some(vector_id.as_str()));

        let Some(chunk) = chunk else {
            continue;
        };

        let (case_title, case_number) = if let Some(case_id) = &chunk.source_case_id {
            enrichment.enrich(case_store, case_id).await.unwrap_or((None, None))
        } else {
            (
                chunk.metadata.case_title.clone(),
                chunk.metadata.case_number.clone(),
            )
        };

        results.push(Stage1Result {
            chunk,
            stage1_score: score as f64,
            case_title,
            case_number,
        });
    }

    if results.is_empty() {
        return lexical_fallback(kb_store, query, config.initial_retrieval_k).await;
    }

    Ok(results)
}

/// Synthesize a short structured summary of a stage-1 result for API
/// responses, combining the legal domain with a content preview.
pub fn synthesize_summary(chunk: &KbChunk, metadata: &ChunkLegalMetadata) -> String {
    let domain = if metadata.legal_domain.is_empty() {
        "general"
    } else {
        metadata.legal_domain.as_str()
    };
    let preview = TextUtils::extract_preview(&chunk.content_text, 30);
    format!("[{}] {}", domain, preview)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ChunkSourceType, CaseStatus, Case, CaseDetail, Comment, Order};
    use std::collections::HashMap;
    use tokio::sync::Mutex;

    struct FakeKbStore(Mutex<Vec<KbChunk>>);

    #[async_trait]
    impl KbChunkStore for FakeKbStore {
        async fn upsert_chunk(&self, chunk: &KbChunk) -> Result<()> {
            self.0.lock().await.push(chunk.clone());
            Ok(())
        }
        async fn get_chunk(&self, _: ChunkSourceType, _: &str) -> Result<Option<KbChunk>> {
            Ok(None)
        }
        async fn delete_by_case(&self, _: &CaseId) -> Result<usize> {
            Ok(0)
        }
        async fn chunks_for_case(&self, _: &CaseId) -> Result<Vec<KbChunk>> {
            Ok(Vec::new())
        }
        async fn search_text(&self, pattern: &str, limit: usize) -> Result<Vec<KbChunk>> {
            let needle = pattern.to_lowercase();
            Ok(self
                .0
                .lock()
                .await
                .iter()
                .filter(|c| c.content_text.to_lowercase().contains(&needle))
                .take(limit)
                .cloned()
                .collect())
        }
        async fn count(&self) -> Result<usize> {
            Ok(self.0.lock().await.len())
        }
        async fn has_content_hash(&self, _: &str) -> Result<bool> {
            Ok(false)
        }
        async fn append_processing_log(&self, _: &crate::ProcessingLogEntry) -> Result<()> {
            Ok(())
        }
        async fn processing_log_entry(
            &self,
            _: &CaseId,
            _: Option<&crate::DocumentId>,
            _: &str,
        ) -> Result<Option<crate::ProcessingLogEntry>> {
            Ok(None)
        }
    }

    struct FakeCaseStore;
    #[async_trait]
    impl CaseStore for FakeCaseStore {
        async fn get_case(&self, _: &CaseId) -> Result<Option<Case>> {
            Ok(None)
        }
        async fn get_case_detail(&self, _: &CaseId) -> Result<Option<CaseDetail>> {
            Ok(None)
        }
        async fn get_orders(&self, _: &CaseId) -> Result<Vec<Order>> {
            Ok(Vec::new())
        }
        async fn get_comments(&self, _: &CaseId) -> Result<Vec<Comment>> {
            Ok(Vec::new())
        }
        async fn find_cases_by_number(&self, _: &str) -> Result<Vec<Case>> {
            Ok(Vec::new())
        }
        async fn find_cases_by_title(&self, _: &str) -> Result<Vec<Case>> {
            Ok(Vec::new())
        }
        async fn list_case_ids(&self) -> Result<Vec<CaseId>> {
            Ok(Vec::new())
        }
    }

    struct FailingVectorClient;
    #[async_trait]
    impl VectorIndexClient for FailingVectorClient {
        async fn embed(&self, _: &str) -> Result<Vec<f32>> {
            Err(EngineError::RetrievalUnavailable {
                component: "embedding_model".to_string(),
                details: "unreachable in test".to_string(),
            })
        }
        async fn embed_batch(&self, _: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(Vec::new())
        }
        async fn query(&self, _: &[f32], _: usize) -> Result<Vec<(String, f32)>> {
            Ok(Vec::new())
        }
        async fn health_check(&self) -> Result<()> {
            Ok(())
        }
    }

    fn sample_chunk(text: &str) -> KbChunk {
        KbChunk {
            source_type: ChunkSourceType::CaseMetadata,
            source_id: "c1".to_string(),
            source_case_id: Some("c1".to_string()),
            source_document_id: None,
            content_text: text.to_string(),
            content_summary: None,
            metadata: ChunkLegalMetadata::default(),
            vector_id: None,
            embedding_model: None,
            embedding_dim: None,
            content_quality_score: 0.8,
            legal_relevance_score: 0.8,
            completeness_score: 0.8,
            content_hash: "hash".to_string(),
            is_processed: true,
            created_at: chrono::Utc::now(),
        }
    }

    #[tokio::test]
    async fn falls_back_to_lexical_scan_when_embedding_fails() {
        let kb_store: Arc<dyn KbChunkStore> =
            Arc::new(FakeKbStore(Mutex::new(vec![sample_chunk("bail application under section 497")])));
        let case_store: Arc<dyn CaseStore> = Arc::new(FakeCaseStore);
        let vector_client: Arc<dyn VectorIndexClient> = Arc::new(FailingVectorClient);
        let cache = EmbeddingCache::new(std::env::temp_dir().join("legal_qa_test_cache"));
        let config = RetrievalConfig {
            initial_retrieval_k: 10,
            final_retrieval_k: 5,
            min_rerank_k: 2,
            semantic_weight: 0.7,
            diversity_threshold: 0.8,
            embedding_cache_dir: std::env::temp_dir(),
            cross_encoder_model: "test".to_string(),
            embedding_dimension: 384,
            case_lookup_max_results: 5,
            max_expansion_terms: 20,
            vector_index_url: "http://127.0.0.1:6333".to_string(),
            cross_encoder_url: "http://127.0.0.1:8501".to_string(),
            http_timeout_ms: 5_000,
        };

        let results = retrieve(
            &vector_client,
            &cache,
            &kb_store,
            &case_store,
            "bail application",
            &config,
            &MetadataFilters::default(),
        )
        .await
        .unwrap();

        assert!(!results.is_empty());
    }

    #[tokio::test]
    async fn embedding_cache_round_trips() {
        let dir = std::env::temp_dir().join(format!("legal_qa_cache_test_{}", std::process::id()));
        let cache = EmbeddingCache::new(dir);
        cache.put("hello world", &[1.0, 2.0, 3.0]).await.unwrap();
        let fetched = cache.get("hello world").await;
        assert_eq!(fetched, Some(vec![1.0, 2.0, 3.0]));
    }

    #[tokio::test]
    async fn embedding_cache_miss_on_unreadable_file_is_tolerated() {
        let dir = std::env::temp_dir().join(format!("legal_qa_cache_missing_{}", std::process::id()));
        let cache = EmbeddingCache::new(dir);
        assert_eq!(cache.get("never written").await, None);
    }
}
