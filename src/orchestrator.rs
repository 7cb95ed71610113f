//! # Retrieval Orchestrator (C10)
//!
//! ## Purpose
//! The single public entry point, `retrieve_for_qa`, coordinating query
//! analysis (C4), the exact-match short-circuit (C6) or semantic retrieval
//! (C7), reranking (C8), and diversification (C9). Also owns the follow-up
//! session lock: once a session is bound to a case, subsequent turns with no
//! new hint or entity stay bound to that case and skip C4-C9 entirely.
//!
//! Never propagates an error to its caller — any internal failure downgrades
//! to an empty result plus a logged diagnostic, since a retrieval failure
//! must not crash the surrounding QA loop.

use crate::case_lookup::{self, CaseDossier};
use crate::config::Config;
use crate::diversifier;
use crate::query_analyzer::{self, QueryAnalysis, SearchStrategy};
use crate::reranker::{self, CrossEncoderClient, RerankedResult};
use crate::semantic_retriever::{self, EmbeddingCache, MetadataFilters, VectorIndexClient};
use crate::statute_engine::{self, StatuteMatch};
use crate::store::{CaseStore, KbChunkStore, SessionStore, StatuteStore};
use crate::utils::Timer;
use crate::{ActiveSession, Turn};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// How a result was ultimately produced, carried for observability and UI
/// attribution rather than for any downstream decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetrievalMethod {
    ExactCaseMatch,
    StatuteKeyword,
    SemanticRerank,
    SessionLock,
}

/// A single ranked, QA-ready result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankedResult {
    pub qa_rank: usize,
    pub retrieval_method: RetrievalMethod,
    pub combined_score: f64,
    pub summary: String,
    pub case_id: Option<String>,
    pub case_title: Option<String>,
    pub case_number: Option<String>,
    pub content_text: String,
    pub retrieval_time_ms: u64,
    pub extras: crate::ExtrasMap,
}

/// Holds the shared, long-lived resources the orchestrator depends on:
/// storage handles and the pluggable retrieval backends. Cloneable and
/// cheap to share across API handler invocations (every field is an `Arc`).
#[derive(Clone)]
pub struct RetrievalEngine {
    pub config: Config,
    pub case_store: Arc<dyn CaseStore>,
    pub kb_store: Arc<dyn KbChunkStore>,
    pub statute_store: Arc<dyn StatuteStore>,
    pub session_store: Arc<dyn SessionStore>,
    pub vector_client: Arc<dyn VectorIndexClient>,
    pub cross_encoder: Arc<dyn CrossEncoderClient>,
    pub embedding_cache: Arc<EmbeddingCache>,
}

impl RetrievalEngine {
    pub fn new(
        config: Config,
        case_store: Arc<dyn CaseStore>,
        kb_store: Arc<dyn KbChunkStore>,
        statute_store: Arc<dyn StatuteStore>,
        session_store: Arc<dyn SessionStore>,
        vector_client: Arc<dyn VectorIndexClient>,
        cross_encoder: Arc<dyn CrossEncoderClient>,
    ) -> Self {
        let embedding_cache = Arc::new(EmbeddingCache::new(config.retrieval.embedding_cache_dir.clone()));
        Self {
            config,
            case_store,
            kb_store,
            statute_store,
            session_store,
            vector_client,
            cross_encoder,
            embedding_cache,
        }
    }

    /// Health check across every owned/pluggable backend.
    pub async fn health_check(&self) -> bool {
        self.vector_client.health_check().await.is_ok() && self.cross_encoder.health_check().await.is_ok()
    }

    /// The single public retrieval entry point. Never raises: internal
    /// failures are logged and downgrade to an empty result set.
    pub async fn retrieve_for_qa(
        &self,
        session_id: Option<&str>,
        query: &str,
        top_k: usize,
        filters: &MetadataFilters,
    ) -> Vec<RankedResult> {
        match self.retrieve_for_qa_inner(session_id, query, top_k, filters).await {
            Ok(results) => results,
            Err(e) => {
                tracing::error!("retrieve_for_qa failed, returning empty result: {}", e);
                Vec::new()
            }
        }
    }

    async fn retrieve_for_qa_inner(
        &self,
        session_id: Option<&str>,
        query: &str,
        top_k: usize,
        filters: &MetadataFilters,
    ) -> crate::Result<Vec<RankedResult>> {
        let timer = Timer::new("retrieve_for_qa");

        let analysis = query_analyzer::analyze(query, self.config.retrieval.max_expansion_terms);

        // Session lock: a follow-up turn with no new case-title hint and no
        // extracted entities stays bound to the session's active case,
        // bypassing C4's strategy selection (already computed above, but
        // unused) and C6-C9 entirely.
        if let Some(session_id) = session_id {
            if analysis.case_title_hint.is_none() && analysis.entities.is_empty() {
                if let Some(session) = self.session_store.get(session_id).await? {
                    if let Some(bound_case_id) = session.bound_case_id.clone() {
                        let results = self.session_bound_results(&bound_case_id, timer.elapsed_ms()).await?;
                        if !results.is_empty() {
                            self.record_turn(session_id, query, Some(bound_case_id)).await?;
                            return Ok(results);
                        }
                    }
                }
            }
        }

        let results = match analysis.strategy {
            SearchStrategy::ExactCaseMatch => self.run_case_lookup(query, &timer).await?,
            SearchStrategy::StatuteKeyword => {
                let statute_results = self.run_statute_search(query, &analysis, &timer).await?;
                if statute_results.is_empty() {
                    self.run_semantic_pipeline(query, &analysis, top_k, filters, &timer).await?
                } else {
                    statute_results
                }
            }
            SearchStrategy::SemanticRetrieval => {
                self.run_semantic_pipeline(query, &analysis, top_k, filters, &timer).await?
            }
        };

        if let Some(session_id) = session_id {
            let bound_case_id = results.first().and_then(|r| r.case_id.clone());
            self.record_turn(session_id, query, bound_case_id).await?;
        }

        Ok(results)
    }

    async fn run_case_lookup(&self, query: &str, timer: &Timer) -> crate::Result<Vec<RankedResult>> {
        let dossiers = case_lookup::lookup(
            &self.case_store,
            query,
            self.config.retrieval.case_lookup_max_results,
        )
        .await?;

        Ok(dossiers
            .into_iter()
            .enumerate()
            .map(|(i, dossier)| dossier_to_result(dossier, i, timer.elapsed_ms()))
            .collect())
    }

    async fn run_statute_search(
        &self,
        query: &str,
        analysis: &QueryAnalysis,
        timer: &Timer,
    ) -> crate::Result<Vec<RankedResult>> {
        let matches = statute_engine::search(&self.statute_store, query, analysis).await?;
        Ok(matches
            .into_iter()
            .enumerate()
            .map(|(i, m)| statute_match_to_result(m, i, timer.elapsed_ms()))
            .collect())
    }

    async fn run_semantic_pipeline(
        &self,
        query: &str,
        analysis: &QueryAnalysis,
        top_k: usize,
        filters: &MetadataFilters,
        timer: &Timer,
    ) -> crate::Result<Vec<RankedResult>> {
        let stage1 = semantic_retriever::retrieve(
            &self.vector_client,
            self.embedding_cache.as_ref(),
            &self.kb_store,
            &self.case_store,
            query,
            &self.config.retrieval,
            filters,
        )
        .await?;

        let reranked = reranker::rerank(self.cross_encoder.as_ref(), query, stage1, &self.config.retrieval).await?;

        let target_count = top_k.min(self.config.retrieval.final_retrieval_k).max(1);
        let diversified = diversifier::diversify(
            reranked,
            target_count,
            self.config.retrieval.diversity_threshold,
        );
        let prioritized = diversifier::prioritize_hint(diversified, analysis.case_title_hint.as_deref());

        Ok(prioritized
            .into_iter()
            .enumerate()
            .map(|(i, r)| reranked_to_result(r, i, timer.elapsed_ms()))
            .collect())
    }

    async fn session_bound_results(
        &self,
        bound_case_id: &str,
        elapsed_ms: u64,
    ) -> crate::Result<Vec<RankedResult>> {
        let case_id = bound_case_id.to_string();
        let Some(case) = self.case_store.get_case(&case_id).await? else {
            return Ok(Vec::new());
        };
        let detail = self.case_store.get_case_detail(&case_id).await?;
        let orders = self.case_store.get_orders(&case_id).await?;
        let comments = self.case_store.get_comments(&case_id).await?;

        let dossier = CaseDossier {
            case,
            detail,
            orders,
            comments,
            match_type: case_lookup::MatchType::ExactNumber,
            source_match_stage: 0,
        };

        let mut result = dossier_to_result(dossier, 0, elapsed_ms);
        result.retrieval_method = RetrievalMethod::SessionLock;
        Ok(vec![result])
    }

    async fn record_turn(
        &self,
        session_id: &str,
        query: &str,
        resolved_case_id: Option<String>,
    ) -> crate::Result<()> {
        let mut session = self
            .session_store
            .get(session_id)
            .await?
            .unwrap_or_else(|| ActiveSession::new(session_id.to_string()));

        if resolved_case_id.is_some() {
            session.bound_case_id = resolved_case_id.clone();
        }

        session.history.push(Turn {
            query: query.to_string(),
            timestamp: chrono::Utc::now(),
            resolved_case_id,
        });

        self.session_store.put(&session).await
    }
}

fn dossier_to_result(dossier: CaseDossier, rank: usize, elapsed_ms: u64) -> RankedResult {
    let mut extras = crate::ExtrasMap::new();
    if let Some(detail) = &dossier.detail {
        if let Some(short_order) = &detail.short_order {
            extras.insert("short_order".to_string(), serde_json::json!(short_order));
        }
        if !detail.advocates_petitioner.is_empty() {
            extras.insert(
                "advocates_petitioner".to_string(),
                serde_json::json!(detail.advocates_petitioner),
            );
        }
    }
    extras.insert("orders_count".to_string(), serde_json::json!(dossier.orders.len()));
    extras.insert("comments_count".to_string(), serde_json::json!(dossier.comments.len()));

    RankedResult {
        qa_rank: rank,
        retrieval_method: RetrievalMethod::ExactCaseMatch,
        combined_score: 1.0,
        summary: format!("{} — {}", dossier.case.case_number, dossier.case.title),
        case_id: Some(dossier.case.id.clone()),
        case_title: Some(dossier.case.title.clone()),
        case_number: Some(dossier.case.case_number.clone()),
        content_text: dossier
            .detail
            .as_ref()
            .and_then(|d| d.case_description.clone())
            .unwrap_or_default(),
        retrieval_time_ms: elapsed_ms,
        extras,
    }
}

fn statute_match_to_result(m: StatuteMatch, rank: usize, elapsed_ms: u64) -> RankedResult {
    let mut extras = crate::ExtrasMap::new();
    extras.insert("punishment".to_string(), serde_json::json!(m.entry.punishment));
    extras.insert("what_to_do".to_string(), serde_json::json!(m.entry.what_to_do));
    extras.insert("matched_on".to_string(), serde_json::json!(m.matched_on));

    RankedResult {
        qa_rank: rank,
        retrieval_method: RetrievalMethod::StatuteKeyword,
        combined_score: m.relevance / 100.0,
        summary: m.entry.title.clone(),
        case_id: None,
        case_title: None,
        case_number: None,
        content_text: m.entry.rights_summary.clone(),
        retrieval_time_ms: elapsed_ms,
        extras,
    }
}

fn reranked_to_result(r: RerankedResult, rank: usize, elapsed_ms: u64) -> RankedResult {
    let summary = semantic_retriever::synthesize_summary(&r.stage1.chunk, &r.stage1.chunk.metadata);
    let mut extras = crate::ExtrasMap::new();
    extras.insert(
        "legal_concepts".to_string(),
        serde_json::json!(r.stage1.chunk.metadata.legal_concepts),
    );

    RankedResult {
        qa_rank: rank,
        retrieval_method: RetrievalMethod::SemanticRerank,
        combined_score: r.combined_score,
        summary,
        case_id: r.stage1.chunk.source_case_id.clone(),
        case_title: r.stage1.case_title.clone(),
        case_number: r.stage1.case_number.clone(),
        content_text: r.stage1.chunk.content_text.clone(),
        retrieval_time_ms: elapsed_ms,
        extras,
    }
}
