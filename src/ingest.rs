//! # Knowledge Ingestor (C3)
//!
//! ## Purpose
//! Builds a comprehensive, labelled-section text blob for a case from its
//! structured record plus any attached document text, feeds it through the
//! chunker (C2), and persists the resulting chunks with canonical metadata.
//! Idempotent on `(rules_version, text_hash, case, document)` via the
//! processing log, so a re-ingest of unchanged source data is a no-op unless
//! `force` is set.

use crate::chunker::{self, Chunk};
use crate::config::ChunkerConfig;
use crate::errors::{EngineError, Result};
use crate::store::{CaseStore, KbChunkStore};
use crate::utils::{TextUtils, Timer};
use crate::{
    CaseId, ChunkLegalMetadata, ChunkSourceType, DocumentId, DocumentText, KbChunk,
    ProcessingLogEntry,
};
use std::sync::Arc;

/// The processing-log rule set version. Bumped whenever the comprehensive-
/// text assembly or chunking rules change in a way that should force
/// re-ingestion of previously processed cases.
pub const RULES_VERSION: &str = "v1";

/// Strip scraper boilerplate lines ("ORDER SHEET", court letterhead, …)
/// before concatenation, since these add no retrievable signal and would
/// otherwise pollute every chunk's opening lines.
const BOILERPLATE_MARKERS: &[&str] = &[
    "order sheet",
    "in the islamabad high court",
    "in the supreme court of pakistan",
    "in the high court",
];

fn strip_boilerplate(text: &str) -> String {
    text.lines()
        .filter(|line| {
            let lower = line.trim().to_lowercase();
            !BOILERPLATE_MARKERS.iter().any(|m| lower == *m)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn heading(title: &str) -> String {
    format!("## {}\n", title)
}

/// Build the comprehensive text for a case's unified view: case metadata,
/// case detail fields, recent orders, recent comments, and parties, each
/// preceded by a human-readable heading, in the order the data model
/// specifies.
fn build_comprehensive_text(
    case: &crate::Case,
    detail: Option<&crate::CaseDetail>,
    orders: &[crate::Order],
    comments: &[crate::Comment],
    document_texts: &[DocumentText],
) -> String {
    let mut sections = Vec::new();

    if !document_texts.is_empty() {
        let mut pdf_section = heading("Document Text");
        for dt in document_texts {
            pdf_section.push_str(&strip_boilerplate(&dt.clean_text));
            pdf_section.push('\n');
        }
        sections.push(pdf_section);
    }

    let mut info = heading("Case Information");
    info.push_str(&format!("Case Number: {}\n", case.case_number));
    info.push_str(&format!("Title: {}\n", case.title));
    info.push_str(&format!("Court: {}\n", case.court));
    info.push_str(&format!("Status: {}\n", case.status));
    if let Some(bench) = &case.bench {
        info.push_str(&format!("Bench: {}\n", bench));
    }
    sections.push(info);

    if let Some(detail) = detail {
        let mut detail_section = heading("Case Detail");
        if let Some(stage) = &detail.case_stage {
            detail_section.push_str(&format!("Stage: {}\n", stage));
        }
        if let Some(description) = &detail.case_description {
            detail_section.push_str(&format!("Description: {}\n", description));
        }
        if let Some(short_order) = &detail.short_order {
            detail_section.push_str(&format!("Short Order: {}\n", short_order));
        }
        if !detail.advocates_petitioner.is_empty() {
            detail_section.push_str(&format!(
                "Advocates (Petitioner): {}\n",
                detail.advocates_petitioner.join(", ")
            ));
        }
        if !detail.advocates_respondent.is_empty() {
            detail_section.push_str(&format!(
                "Advocates (Respondent): {}\n",
                detail.advocates_respondent.join(", ")
            ));
        }
        if let Some(fir) = &detail.fir {
            detail_section.push_str(&heading("FIR"));
            if let Some(n) = &fir.fir_number {
                detail_section.push_str(&format!("FIR Number: {}\n", n));
            }
            if let Some(s) = &fir.under_section {
                detail_section.push_str(&format!("Under Section: {}\n", s));
            }
            if let Some(i) = &fir.incident {
                detail_section.push_str(&format!("Incident: {}\n", i));
            }
        }
        sections.push(detail_section);
    }

    if !orders.is_empty() {
        let mut orders_section = heading("Recent Orders");
        for order in orders {
            orders_section.push_str(&format!(
                "SR {}: {}\n",
                order.sr_number,
                order.short_order.as_deref().unwrap_or("(no text)")
            ));
        }
        sections.push(orders_section);
    }

    if !comments.is_empty() {
        let mut comments_section = heading("Recent Comments");
        for comment in comments {
            comments_section.push_str(&format!(
                "{}\n",
                comment.description.as_deref().unwrap_or("(no description)")
            ));
        }
        sections.push(comments_section);
    }

    sections.join("\n")
}

/// A single persisted chunk's provenance, returned for observability.
#[derive(Debug, Clone)]
pub struct IngestOutcome {
    pub case_id: CaseId,
    pub chunks_persisted: usize,
    pub terms_extracted: usize,
    pub skipped_idempotent: bool,
}

/// Process one case end-to-end: assemble comprehensive text, chunk it,
/// normalize references per chunk, and persist. Returns `skipped_idempotent
/// = true` without touching storage when an unforced re-ingest finds a
/// matching processing-log entry already recorded.
pub async fn process_case_for_qa(
    case_store: &Arc<dyn CaseStore>,
    kb_store: &Arc<dyn KbChunkStore>,
    case_id: &CaseId,
    document_texts: &[DocumentText],
    chunker_config: &ChunkerConfig,
    force: bool,
) -> Result<IngestOutcome> {
    let timer = Timer::new("process_case_for_qa");

    let case = case_store
        .get_case(case_id)
        .await?
        .ok_or_else(|| EngineError::IngestionFailure {
            case_id: case_id.clone(),
            details: "case not found in case store".to_string(),
        })?;
    let detail = case_store.get_case_detail(case_id).await?;
    let orders = case_store.get_orders(case_id).await?;
    let comments = case_store.get_comments(case_id).await?;

    let comprehensive_text =
        build_comprehensive_text(&case, detail.as_ref(), &orders, &comments, document_texts);
    let text_hash = TextUtils::text_hash(&comprehensive_text);

    if !force {
        if let Some(existing) = kb_store
            .processing_log_entry(case_id, None, RULES_VERSION)
            .await?
        {
            if existing.text_hash == text_hash && existing.is_successful {
                return Ok(IngestOutcome {
                    case_id: case_id.clone(),
                    chunks_persisted: 0,
                    terms_extracted: 0,
                    skipped_idempotent: true,
                });
            }
        }
    }

    if force {
        kb_store.delete_by_case(case_id).await?;
    }

    let chunks = chunker::chunk_text(&comprehensive_text, chunker_config);
    let mut terms_extracted = 0usize;
    let mut persisted = 0usize;

    for (i, chunk) in chunks.iter().enumerate() {
        let normalized = crate::reference::normalize(&chunk.text);
        terms_extracted += normalized.references.len();

        let source_id = format!("{}:{}", case_id, i);
        let content_hash =
            KbChunk::compute_content_hash(ChunkSourceType::CaseMetadata, &source_id, &chunk.text);

        if kb_store.has_content_hash(&content_hash).await? && !force {
            continue;
        }

        let kb_chunk = to_kb_chunk(case_id, &source_id, chunk, &case, &normalized, content_hash);
        kb_store.upsert_chunk(&kb_chunk).await?;
        persisted += 1;
    }

    let elapsed_ms = timer.elapsed_ms();
    let log_entry = ProcessingLogEntry {
        case_id: case_id.clone(),
        document_id: None,
        rules_version: RULES_VERSION.to_string(),
        text_hash,
        terms_extracted,
        processing_time_ms: elapsed_ms,
        is_successful: true,
        recorded_at: chrono::Utc::now(),
    };
    kb_store.append_processing_log(&log_entry).await?;

    Ok(IngestOutcome {
        case_id: case_id.clone(),
        chunks_persisted: persisted,
        terms_extracted,
        skipped_idempotent: false,
    })
}

/// Process a single document's per-page text for `case_id`, keyed
/// independently of the case's unified-view ingest so a document can be
/// (re)ingested without disturbing the case-metadata chunks.
pub async fn process_document_for_qa(
    kb_store: &Arc<dyn KbChunkStore>,
    case_id: &CaseId,
    document_id: &DocumentId,
    document_texts: &[DocumentText],
    chunker_config: &ChunkerConfig,
    force: bool,
) -> Result<IngestOutcome> {
    let timer = Timer::new("process_document_for_qa");

    let mut combined = heading("Document Text");
    for dt in document_texts {
        combined.push_str(&strip_boilerplate(&dt.clean_text));
        combined.push('\n');
    }
    let text_hash = TextUtils::text_hash(&combined);

    if !force {
        if let Some(existing) = kb_store
            .processing_log_entry(case_id, Some(document_id), RULES_VERSION)
            .await?
        {
            if existing.text_hash == text_hash && existing.is_successful {
                return Ok(IngestOutcome {
                    case_id: case_id.clone(),
                    chunks_persisted: 0,
                    terms_extracted: 0,
                    skipped_idempotent: true,
                });
            }
        }
    }

    let chunks = chunker::chunk_text(&combined, chunker_config);
    let mut terms_extracted = 0usize;
    let mut persisted = 0usize;

    for (i, chunk) in chunks.iter().enumerate() {
        let normalized = crate::reference::normalize(&chunk.text);
        terms_extracted += normalized.references.len();

        let source_id = format!("{}:{}:{}", case_id, document_id, i);
        let content_hash =
            KbChunk::compute_content_hash(ChunkSourceType::CaseDocument, &source_id, &chunk.text);

        if kb_store.has_content_hash(&content_hash).await? && !force {
            continue;
        }

        let mut metadata = ChunkLegalMetadata {
            legal_domain: chunk.metadata.legal_domain.clone(),
            citations: normalized
                .references
                .iter()
                .map(|r| r.canonical_form.clone())
                .collect(),
            ..Default::default()
        };
        metadata.legal_concepts = normalized
            .references
            .iter()
            .map(|r| r.canonical_form.clone())
            .collect();

        let kb_chunk = KbChunk {
            source_type: ChunkSourceType::CaseDocument,
            source_id: source_id.clone(),
            source_case_id: Some(case_id.clone()),
            source_document_id: Some(document_id.clone()),
            content_text: chunk.text.clone(),
            content_summary: Some(TextUtils::extract_preview(&chunk.text, 30)),
            metadata,
            vector_id: None,
            embedding_model: None,
            embedding_dim: None,
            content_quality_score: chunk.metadata.ai_context_score,
            legal_relevance_score: chunk.metadata.qa_relevance,
            completeness_score: chunk.metadata.ai_context_score,
            content_hash,
            is_processed: true,
            created_at: chrono::Utc::now(),
        };
        kb_store.upsert_chunk(&kb_chunk).await?;
        persisted += 1;
    }

    let elapsed_ms = timer.elapsed_ms();
    let log_entry = ProcessingLogEntry {
        case_id: case_id.clone(),
        document_id: Some(document_id.clone()),
        rules_version: RULES_VERSION.to_string(),
        text_hash,
        terms_extracted,
        processing_time_ms: elapsed_ms,
        is_successful: true,
        recorded_at: chrono::Utc::now(),
    };
    kb_store.append_processing_log(&log_entry).await?;

    Ok(IngestOutcome {
        case_id: case_id.clone(),
        chunks_persisted: persisted,
        terms_extracted,
        skipped_idempotent: false,
    })
}

fn to_kb_chunk(
    case_id: &CaseId,
    source_id: &str,
    chunk: &Chunk,
    case: &crate::Case,
    normalized: &crate::reference::NormalizedText,
    content_hash: String,
) -> KbChunk {
    let metadata = ChunkLegalMetadata {
        court: Some(case.court.clone()),
        case_number: Some(case.case_number.clone()),
        case_title: Some(case.title.clone()),
        legal_domain: chunk.metadata.legal_domain.clone(),
        legal_concepts: normalized
            .references
            .iter()
            .map(|r| r.canonical_form.clone())
            .collect(),
        legal_entities: Vec::new(),
        citations: normalized
            .references
            .iter()
            .map(|r| r.canonical_form.clone())
            .collect(),
    };

    KbChunk {
        source_type: ChunkSourceType::CaseMetadata,
        source_id: source_id.to_string(),
        source_case_id: Some(case_id.clone()),
        source_document_id: None,
        content_text: chunk.text.clone(),
        content_summary: Some(TextUtils::extract_preview(&chunk.text, 30)),
        metadata,
        vector_id: None,
        embedding_model: None,
        embedding_dim: None,
        content_quality_score: chunk.metadata.ai_context_score,
        legal_relevance_score: chunk.metadata.qa_relevance,
        completeness_score: chunk.metadata.ai_context_score,
        content_hash,
        is_processed: true,
        created_at: chrono::Utc::now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Case, CaseDetail, CaseStatus, Comment, Order, SourceTag};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use tokio::sync::Mutex;

    struct FakeCaseStore(Case, Option<CaseDetail>, Vec<Order>, Vec<Comment>);

    #[async_trait]
    impl CaseStore for FakeCaseStore {
        async fn get_case(&self, case_id: &CaseId) -> Result<Option<crate::Case>> {
            if *case_id == self.0.id {
                Ok(Some(self.0.clone()))
            } else {
                Ok(None)
            }
        }
        async fn get_case_detail(&self, _: &CaseId) -> Result<Option<CaseDetail>> {
            Ok(self.1.clone())
        }
        async fn get_orders(&self, _: &CaseId) -> Result<Vec<Order>> {
            Ok(self.2.clone())
        }
        async fn get_comments(&self, _: &CaseId) -> Result<Vec<Comment>> {
            Ok(self.3.clone())
        }
        async fn find_cases_by_number(&self, _: &str) -> Result<Vec<crate::Case>> {
            Ok(Vec::new())
        }
        async fn find_cases_by_title(&self, _: &str) -> Result<Vec<crate::Case>> {
            Ok(Vec::new())
        }
        async fn list_case_ids(&self) -> Result<Vec<CaseId>> {
            Ok(vec![self.0.id.clone()])
        }
    }

    #[derive(Default)]
    struct FakeKbStore {
        chunks: Mutex<HashMap<String, KbChunk>>,
        log: Mutex<HashMap<String, ProcessingLogEntry>>,
    }

    #[async_trait]
    impl KbChunkStore for FakeKbStore {
        async fn upsert_chunk(&self, chunk: &KbChunk) -> Result<()> {
            self.chunks
                .lock()
                .await
                .insert(chunk.source_id.clone(), chunk.clone());
            Ok(())
        }
        async fn get_chunk(&self, _: ChunkSourceType, source_id: &str) -> Result<Option<KbChunk>> {
            Ok(self.chunks.lock().await.get(source_id).cloned())
        }
        async fn delete_by_case(&self, case_id: &CaseId) -> Result<usize> {
            let mut chunks = self.chunks.lock().await;
            let before = chunks.len();
            chunks.retain(|_, c| c.source_case_id.as_ref() != Some(case_id));
            Ok(before - chunks.len())
        }
        async fn chunks_for_case(&self, case_id: &CaseId) -> Result<Vec<KbChunk>> {
            Ok(self
                .chunks
                .lock()
                .await
                .values()
                .filter(|c| c.source_case_id.as_ref() == Some(case_id))
                .cloned()
                .collect())
        }
        async fn search_text(&self, _: &str, _: usize) -> Result<Vec<KbChunk>> {
            Ok(Vec::new())
        }
        async fn count(&self) -> Result<usize> {
            Ok(self.chunks.lock().await.len())
        }
        async fn has_content_hash(&self, content_hash: &str) -> Result<bool> {
            Ok(self
                .chunks
                .lock()
                .await
                .values()
                .any(|c| c.content_hash == content_hash))
        }
        async fn append_processing_log(&self, entry: &ProcessingLogEntry) -> Result<()> {
            let key = format!(
                "{}:{}:{}",
                entry.case_id,
                entry.document_id.clone().unwrap_or_default(),
                entry.rules_version
            );
            self.log.lock().await.insert(key, entry.clone());
            Ok(())
        }
        async fn processing_log_entry(
            &self,
            case_id: &CaseId,
            document_id: Option<&DocumentId>,
            rules_version: &str,
        ) -> Result<Option<ProcessingLogEntry>> {
            let key = format!(
                "{}:{}:{}",
                case_id,
                document_id.cloned().unwrap_or_default(),
                rules_version
            );
            Ok(self.log.lock().await.get(&key).cloned())
        }
    }

    fn sample_case() -> Case {
        Case {
            id: "c1".to_string(),
            case_number: "T.A. 2/2023 Civil (SB)".to_string(),
            title: "Ali Khan vs State".to_string(),
            court: "High Court".to_string(),
            status: CaseStatus::Decided,
            bench: None,
            institution_date: None,
            hearing_date: None,
        }
    }

    fn test_chunker_config() -> ChunkerConfig {
        ChunkerConfig {
            target_chunk_size: 200,
            chunk_overlap: 20,
            min_chunk_size: 50,
            max_chunk_size: 300,
            min_completeness_score: 0.5,
            token_ratio: 0.75,
        }
    }

    #[tokio::test]
    async fn ingest_persists_at_least_one_chunk_retrievable_by_case_id() {
        let case_store: Arc<dyn CaseStore> =
            Arc::new(FakeCaseStore(sample_case(), None, Vec::new(), Vec::new()));
        let kb_store: Arc<dyn KbChunkStore> = Arc::new(FakeKbStore::default());

        let outcome = process_case_for_qa(
            &case_store,
            &kb_store,
            &"c1".to_string(),
            &[],
            &test_chunker_config(),
            false,
        )
        .await
        .unwrap();

        assert!(outcome.chunks_persisted > 0);
        assert!(!outcome.skipped_idempotent);

        let chunks = kb_store.chunks_for_case(&"c1".to_string()).await.unwrap();
        assert!(!chunks.is_empty());
        assert!(chunks.iter().all(|c| c.is_processed));
    }

    #[tokio::test]
    async fn reingest_without_force_is_idempotent() {
        let case_store: Arc<dyn CaseStore> =
            Arc::new(FakeCaseStore(sample_case(), None, Vec::new(), Vec::new()));
        let kb_store: Arc<dyn KbChunkStore> = Arc::new(FakeKbStore::default());

        process_case_for_qa(&case_store, &kb_store, &"c1".to_string(), &[], &test_chunker_config(), false)
            .await
            .unwrap();
        let second = process_case_for_qa(
            &case_store,
            &kb_store,
            &"c1".to_string(),
            &[],
            &test_chunker_config(),
            false,
        )
        .await
        .unwrap();

        assert!(second.skipped_idempotent);
    }

    #[tokio::test]
    async fn force_reprocess_deletes_and_rebuilds() {
        let case_store: Arc<dyn CaseStore> =
            Arc::new(FakeCaseStore(sample_case(), None, Vec::new(), Vec::new()));
        let kb_store: Arc<dyn KbChunkStore> = Arc::new(FakeKbStore::default());

        process_case_for_qa(&case_store, &kb_store, &"c1".to_string(), &[], &test_chunker_config(), false)
            .await
            .unwrap();
        let forced = process_case_for_qa(
            &case_store,
            &kb_store,
            &"c1".to_string(),
            &[],
            &test_chunker_config(),
            true,
        )
        .await
        .unwrap();

        assert!(!forced.skipped_idempotent);
        assert!(forced.chunks_persisted > 0);
    }

    #[tokio::test]
    async fn unknown_case_yields_ingestion_failure() {
        let case_store: Arc<dyn CaseStore> =
            Arc::new(FakeCaseStore(sample_case(), None, Vec::new(), Vec::new()));
        let kb_store: Arc<dyn KbChunkStore> = Arc::new(FakeKbStore::default());

        let result = process_case_for_qa(
            &case_store,
            &kb_store,
            &"nonexistent".to_string(),
            &[],
            &test_chunker_config(),
            false,
        )
        .await;

        assert!(result.is_err());
    }

    #[tokio::test]
    async fn comments_and_orders_appear_in_comprehensive_text() {
        let case_store: Arc<dyn CaseStore> = Arc::new(FakeCaseStore(
            sample_case(),
            None,
            vec![Order {
                case_id: "c1".to_string(),
                sr_number: 1,
                hearing_date: None,
                bench: None,
                list_type: None,
                stage: None,
                short_order: Some("Case adjourned under section 302 PPC".to_string()),
                disposal_date: None,
                source: SourceTag::Main,
            }],
            vec![Comment {
                case_id: "c1".to_string(),
                compliance_date: None,
                doc_type: None,
                case_no: None,
                parties: None,
                description: Some("Compliance report filed".to_string()),
                source: SourceTag::Main,
            }],
        ));
        let kb_store: Arc<dyn KbChunkStore> = Arc::new(FakeKbStore::default());

        process_case_for_qa(&case_store, &kb_store, &"c1".to_string(), &[], &test_chunker_config(), false)
            .await
            .unwrap();

        let chunks = kb_store.chunks_for_case(&"c1".to_string()).await.unwrap();
        let all_text: String = chunks.iter().map(|c| c.content_text.clone()).collect();
        assert!(all_text.contains("adjourned") || all_text.contains("Compliance report"));
    }
}
