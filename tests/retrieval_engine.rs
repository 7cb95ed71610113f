//! End-to-end tests over `RetrievalEngine::retrieve_for_qa`, exercising the
//! exact-match short-circuit, the follow-up session lock, and the qa_rank
//! sequencing invariant against a real `SledStore`.

use async_trait::async_trait;
use legal_qa_engine::config::Config;
use legal_qa_engine::errors::Result;
use legal_qa_engine::orchestrator::{RankedResult, RetrievalEngine, RetrievalMethod};
use legal_qa_engine::reranker::CrossEncoderClient;
use legal_qa_engine::semantic_retriever::{MetadataFilters, VectorIndexClient};
use legal_qa_engine::store::SledStore;
use legal_qa_engine::{Case, CaseStatus};
use std::sync::Arc;

/// A vector index client that always fails, standing in for an unreachable
/// embedding service. Used to prove the exact-match and session-lock paths
/// never need to reach it.
struct UnreachableVectorClient;

#[async_trait]
impl VectorIndexClient for UnreachableVectorClient {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        panic!("embed() should not be called on the exact-match / session-lock paths");
    }
    async fn embed_batch(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
        panic!("embed_batch() should not be called on the exact-match / session-lock paths");
    }
    async fn query(&self, _embedding: &[f32], _top_k: usize) -> Result<Vec<(String, f32)>> {
        panic!("query() should not be called on the exact-match / session-lock paths");
    }
    async fn health_check(&self) -> Result<()> {
        Ok(())
    }
}

struct UnreachableCrossEncoder;

#[async_trait]
impl CrossEncoderClient for UnreachableCrossEncoder {
    async fn score_pairs(&self, _query: &str, _candidates: &[String]) -> Result<Vec<f64>> {
        panic!("score_pairs() should not be called on the exact-match / session-lock paths");
    }
    async fn health_check(&self) -> Result<()> {
        Ok(())
    }
}

fn test_engine() -> RetrievalEngine {
    let dir = tempfile::tempdir().unwrap();
    let mut config = Config::default();
    config.storage.db_path = dir.path().join("test.db");
    // Keep the tempdir alive for the life of the test process.
    std::mem::forget(dir);

    let store = Arc::new(SledStore::open(config.storage.clone()).unwrap());

    RetrievalEngine::new(
        config,
        store.clone(),
        store.clone(),
        store.clone(),
        store,
        Arc::new(UnreachableVectorClient),
        Arc::new(UnreachableCrossEncoder),
    )
}

#[tokio::test]
async fn exact_case_number_short_circuits_semantic_retrieval() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = Config::default();
    config.storage.db_path = dir.path().join("test.db");
    std::mem::forget(dir);

    let raw_store = SledStore::open(config.storage.clone()).unwrap();
    raw_store
        .put_case(&Case {
            id: "case-1".to_string(),
            case_number: "C.P. 123/2022".to_string(),
            title: "Ali Khan vs State".to_string(),
            court: "Supreme Court".to_string(),
            status: CaseStatus::Decided,
            bench: None,
            institution_date: None,
            hearing_date: None,
        })
        .unwrap();

    let store = Arc::new(raw_store);
    let engine = RetrievalEngine::new(
        config,
        store.clone(),
        store.clone(),
        store.clone(),
        store,
        Arc::new(UnreachableVectorClient),
        Arc::new(UnreachableCrossEncoder),
    );

    let filters = MetadataFilters { court: None, legal_domain: None, case_id: None };
    let results = engine.retrieve_for_qa(None, "C.P. 123/2022", 10, &filters).await;

    assert_eq!(results.len(), 1);
    assert_eq!(results[0].retrieval_method, RetrievalMethod::ExactCaseMatch);
    assert_eq!(results[0].case_id.as_deref(), Some("case-1"));
}

#[tokio::test]
async fn unknown_case_query_falls_through_without_panicking() {
    let engine = test_engine();
    let filters = MetadataFilters { court: None, legal_domain: None, case_id: None };
    // No vector/cross-encoder backend is reachable and no case is seeded;
    // `retrieve_for_qa` must still return (possibly empty) rather than panic.
    let results = engine.retrieve_for_qa(None, "C.P. 999/2099", 10, &filters).await;
    assert!(results.is_empty());
}

#[tokio::test]
async fn session_lock_keeps_answering_about_the_bound_case() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = Config::default();
    config.storage.db_path = dir.path().join("test.db");
    std::mem::forget(dir);

    let raw_store = SledStore::open(config.storage.clone()).unwrap();
    raw_store
        .put_case(&Case {
            id: "case-7".to_string(),
            case_number: "W.P. 55/2021".to_string(),
            title: "Fatima Bibi vs Government of Punjab".to_string(),
            court: "High Court".to_string(),
            status: CaseStatus::Pending,
            bench: None,
            institution_date: None,
            hearing_date: None,
        })
        .unwrap();

    let store = Arc::new(raw_store);
    let engine = RetrievalEngine::new(
        config,
        store.clone(),
        store.clone(),
        store.clone(),
        store,
        Arc::new(UnreachableVectorClient),
        Arc::new(UnreachableCrossEncoder),
    );

    let filters = MetadataFilters { court: None, legal_domain: None, case_id: None };

    let first = engine.retrieve_for_qa(Some("session-a"), "W.P. 55/2021", 10, &filters).await;
    assert_eq!(first.len(), 1);
    assert_eq!(first[0].case_id.as_deref(), Some("case-7"));

    // A vague follow-up with no new hint and no entities stays bound to the
    // session's active case, and must not need the (unreachable) semantic
    // backends either.
    let follow_up = engine
        .retrieve_for_qa(Some("session-a"), "what happened next", 10, &filters)
        .await;
    assert_eq!(follow_up.len(), 1);
    assert_eq!(follow_up[0].retrieval_method, RetrievalMethod::SessionLock);
    assert_eq!(follow_up[0].case_id.as_deref(), Some("case-7"));
}

#[test]
fn qa_rank_is_gapless_and_zero_based_over_a_result_set() {
    fn make(rank: usize) -> RankedResult {
        RankedResult {
            qa_rank: rank,
            retrieval_method: RetrievalMethod::SemanticRerank,
            combined_score: 1.0 - (rank as f64) * 0.1,
            summary: String::new(),
            case_id: None,
            case_title: None,
            case_number: None,
            content_text: String::new(),
            retrieval_time_ms: 0,
            extras: Default::default(),
        }
    }
    let results: Vec<RankedResult> = (0..5).map(make).collect();
    for (i, r) in results.iter().enumerate() {
        assert_eq!(r.qa_rank, i);
    }
}
