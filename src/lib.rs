//! # Pakistani Legal Case & Statute Retrieval Engine
//!
//! ## Overview
//! This library implements a two-stage retrieval and reranking engine for
//! question answering over Pakistani court records and statutes. It combines
//! an intent-aware exact-match short-circuit (for literal case identifiers)
//! with dense semantic recall, cross-encoder reranking, and MMR-style result
//! diversification, grounding every answer in a local knowledge base.
//!
//! ## Architecture
//! The modules are organized leaves-first:
//! - `reference`: canonicalizes statute sections, citations, articles (C1)
//! - `chunker`: splits case/document text into retrievable chunks (C2)
//! - `ingest`: builds the knowledge base from case records (C3)
//! - `query_analyzer`: classifies intent and extracts legal entities (C4)
//! - `statute_engine`: keyword search over statute entries (C5)
//! - `case_lookup`: tiered exact-match case resolution (C6)
//! - `semantic_retriever`: dense recall with embedding cache (C7)
//! - `reranker`: cross-encoder reranking and score fusion (C8)
//! - `diversifier`: MMR-style diversity and hint prioritization (C9)
//! - `orchestrator`: coordinates C4 through C9 (C10)
//! - `store`: storage-layer traits and a sled-backed implementation
//! - `api`: REST surface exposing `retrieve_for_qa`
//! - `config` / `errors` / `utils`: ambient stack

pub mod api;
pub mod case_lookup;
pub mod chunker;
pub mod config;
pub mod diversifier;
pub mod errors;
pub mod ingest;
pub mod orchestrator;
pub mod query_analyzer;
pub mod reference;
pub mod reranker;
pub mod semantic_retriever;
pub mod statute_engine;
pub mod store;
pub mod utils;

pub use config::Config;
pub use errors::{EngineError, Result};
pub use orchestrator::{RankedResult, RetrievalEngine};

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Unique identifier for a case, as assigned by the (external) scraper/ingest
/// pipeline. The core treats case identifiers as opaque strings rather than
/// minting its own ID scheme, since the case store is owned externally.
pub type CaseId = String;

/// Unique identifier for a document attached to a case.
pub type DocumentId = String;

/// Case status, an open enum mirroring the scraper's own vocabulary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaseStatus {
    Pending,
    Decided,
    Disposed,
    Other(String),
}

impl std::fmt::Display for CaseStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CaseStatus::Pending => write!(f, "pending"),
            CaseStatus::Decided => write!(f, "decided"),
            CaseStatus::Disposed => write!(f, "disposed"),
            CaseStatus::Other(s) => write!(f, "{}", s),
        }
    }
}

/// A court case as recorded by the external scraper. Immutable to the core:
/// the core only ever reads this record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Case {
    pub id: CaseId,
    /// Free-form case number, e.g. `T.A. 2/2023 Civil (SB)`.
    pub case_number: String,
    pub title: String,
    pub court: String,
    pub status: CaseStatus,
    pub bench: Option<String>,
    pub institution_date: Option<NaiveDate>,
    pub hearing_date: Option<NaiveDate>,
}

/// First Information Report block, part of `CaseDetail`.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct FirBlock {
    pub fir_number: Option<String>,
    pub fir_date: Option<NaiveDate>,
    pub police_station: Option<String>,
    pub under_section: Option<String>,
    pub incident: Option<String>,
    pub accused: Option<String>,
}

/// Extended per-case detail (0..1 per case).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CaseDetail {
    pub advocates_petitioner: Vec<String>,
    pub advocates_respondent: Vec<String>,
    pub case_description: Option<String>,
    pub case_stage: Option<String>,
    pub short_order: Option<String>,
    pub fir: Option<FirBlock>,
}

/// Source tag distinguishing where an `Order`/`Comment` row came from, used
/// by the (case, …, source) uniqueness invariants in the data model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceTag {
    Main,
    Detail,
    Hearing,
}

/// A court order (0..N per case).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub case_id: CaseId,
    pub sr_number: i64,
    pub hearing_date: Option<NaiveDate>,
    pub bench: Option<String>,
    pub list_type: Option<String>,
    pub stage: Option<String>,
    pub short_order: Option<String>,
    pub disposal_date: Option<NaiveDate>,
    pub source: SourceTag,
}

/// A compliance comment (0..N per case).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Comment {
    pub case_id: CaseId,
    pub compliance_date: Option<NaiveDate>,
    pub doc_type: Option<String>,
    pub case_no: Option<String>,
    pub parties: Option<String>,
    pub description: Option<String>,
    pub source: SourceTag,
}

/// Side of a party to a case.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PartySide {
    Petitioner,
    Respondent,
    Other(String),
}

/// A named party (0..N per case).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Party {
    pub case_id: CaseId,
    pub party_number: i64,
    pub name: String,
    pub side: PartySide,
}

/// Document extraction method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionMethod {
    Pymupdf,
    Ocr,
}

/// A downloaded document (0..N per case), deduplicated by SHA-256.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: DocumentId,
    pub case_id: CaseId,
    pub file_path: String,
    pub original_url: Option<String>,
    pub sha256: String,
    pub size_bytes: u64,
    pub total_pages: u32,
    pub downloaded: bool,
    pub processed: bool,
    pub cleaned: bool,
}

/// Per-page extracted text for a document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentText {
    pub document_id: DocumentId,
    pub page: u32,
    pub raw_text: String,
    pub clean_text: String,
    pub extraction_method: ExtractionMethod,
    pub confidence: f64,
}

/// Source type of a knowledge-base chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkSourceType {
    CaseMetadata,
    CaseDocument,
    Judgment,
    Order,
    Comment,
    QaChunk,
    LegalText,
}

/// A {type, value} legal entity pair recorded on a chunk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LegalEntityRef {
    pub entity_type: String,
    pub value: String,
}

/// Canonical legal metadata attached to a knowledge-base chunk.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ChunkLegalMetadata {
    pub court: Option<String>,
    pub case_number: Option<String>,
    pub case_title: Option<String>,
    pub legal_domain: String,
    pub legal_concepts: Vec<String>,
    pub legal_entities: Vec<LegalEntityRef>,
    pub citations: Vec<String>,
}

/// A core-owned retrievable unit of text, produced by C2/C3 and consumed by
/// C7. See the data model for the full invariant list (content_hash,
/// uniqueness of (source_type, source_id), `is_processed`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KbChunk {
    pub source_type: ChunkSourceType,
    pub source_id: String,
    pub source_case_id: Option<CaseId>,
    pub source_document_id: Option<DocumentId>,
    pub content_text: String,
    pub content_summary: Option<String>,
    pub metadata: ChunkLegalMetadata,
    pub vector_id: Option<String>,
    pub embedding_model: Option<String>,
    pub embedding_dim: Option<usize>,
    pub content_quality_score: f64,
    pub legal_relevance_score: f64,
    pub completeness_score: f64,
    pub content_hash: String,
    pub is_processed: bool,
    pub created_at: DateTime<Utc>,
}

impl KbChunk {
    /// Computes the canonical content hash: `SHA256(source_type:source_id:content_text)`.
    pub fn compute_content_hash(
        source_type: ChunkSourceType,
        source_id: &str,
        content_text: &str,
    ) -> String {
        use sha2::{Digest, Sha256};
        let type_tag = match source_type {
            ChunkSourceType::CaseMetadata => "case_metadata",
            ChunkSourceType::CaseDocument => "case_document",
            ChunkSourceType::Judgment => "judgment",
            ChunkSourceType::Order => "order",
            ChunkSourceType::Comment => "comment",
            ChunkSourceType::QaChunk => "qa_chunk",
            ChunkSourceType::LegalText => "legal_text",
        };
        let mut hasher = Sha256::new();
        hasher.update(type_tag.as_bytes());
        hasher.update(b":");
        hasher.update(source_id.as_bytes());
        hasher.update(b":");
        hasher.update(content_text.as_bytes());
        format!("{:x}", hasher.finalize())
    }
}

/// A curated statute entry consumed by C5.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatuteEntry {
    pub slug: String,
    pub title: String,
    pub sections: Vec<String>,
    pub punishment: String,
    pub jurisdiction: String,
    pub rights_summary: String,
    pub what_to_do: String,
    pub tags: Vec<String>,
    pub active: bool,
    pub featured: bool,
}

/// Canonicalized legal term type, extracted at ingestion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LegalTermType {
    Section,
    Citation,
    Court,
    Judge,
    Advocate,
    Party,
    CaseType,
    Year,
    Status,
    BenchType,
    Appeal,
    Petitioner,
    LegalIssue,
}

/// A canonicalized legal term.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LegalTerm {
    pub term_type: LegalTermType,
    pub canonical_form: String,
    pub statute_code: Option<String>,
    pub section_num: Option<String>,
}

/// A single occurrence of a `LegalTerm` within a case/document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TermOccurrence {
    pub case_id: CaseId,
    pub document_id: Option<DocumentId>,
    pub start_char: usize,
    pub end_char: usize,
    pub page: Option<u32>,
    pub surface_text: String,
    pub confidence: f64,
    pub source_rule: String,
    pub rules_version: String,
}

/// A single conversational turn, retained in `ActiveSession::history`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Turn {
    pub query: String,
    pub timestamp: DateTime<Utc>,
    pub resolved_case_id: Option<CaseId>,
}

/// Core-owned session state binding follow-up queries to an active case.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActiveSession {
    pub session_id: String,
    pub bound_case_id: Option<CaseId>,
    pub history: Vec<Turn>,
}

impl ActiveSession {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            bound_case_id: None,
            history: Vec::new(),
        }
    }
}

/// A processing-log entry recorded by C3 after each per-case ingestion
/// attempt, used to enforce idempotency.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingLogEntry {
    pub case_id: CaseId,
    pub document_id: Option<DocumentId>,
    pub rules_version: String,
    pub text_hash: String,
    pub terms_extracted: usize,
    pub processing_time_ms: u64,
    pub is_successful: bool,
    pub recorded_at: DateTime<Utc>,
}

/// Open metadata bag carried on every retrieval result for long-tail fields
/// (`fir_number`, `short_order`, `advocates_*`, …).
pub type ExtrasMap = HashMap<String, serde_json::Value>;
