//! # Cross-Encoder Reranker — Stage 2 (C8)
//!
//! ## Purpose
//! Reranks stage-1 candidates with a cross-encoder, min-max normalizes the
//! rerank scores, and fuses them with the stage-1 scores into a single
//! `combined_score` used for final ordering.

use crate::config::RetrievalConfig;
use crate::errors::Result;
use crate::semantic_retriever::Stage1Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Client abstraction over the cross-encoder inference service.
#[async_trait]
pub trait CrossEncoderClient: Send + Sync {
    /// Score each `(query, candidate_text)` pair; returns one score per
    /// input pair in the same order.
    async fn score_pairs(&self, query: &str, candidates: &[String]) -> Result<Vec<f64>>;
    async fn health_check(&self) -> Result<()>;
}

/// `CrossEncoderClient` backed by a real cross-encoder inference HTTP
/// service, mirroring `HttpVectorIndexClient`'s request/response shape.
pub struct HttpCrossEncoderClient {
    client: reqwest::Client,
    base_url: String,
}

#[derive(serde::Serialize)]
struct ScoreRequest<'a> {
    query: &'a str,
    candidates: &'a [String],
}

#[derive(serde::Deserialize)]
struct ScoreResponse {
    scores: Vec<f64>,
}

impl HttpCrossEncoderClient {
    pub fn new(base_url: String, timeout_ms: u64) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_millis(timeout_ms))
            .build()?;
        Ok(Self { client, base_url })
    }
}

#[async_trait]
impl CrossEncoderClient for HttpCrossEncoderClient {
    async fn score_pairs(&self, query: &str, candidates: &[String]) -> Result<Vec<f64>> {
        let response = self
            .client
            .post(format!("{}/score", self.base_url))
            .json(&ScoreRequest { query, candidates })
            .send()
            .await?
            .error_for_status()?
            .json::<ScoreResponse>()
            .await?;
        Ok(response.scores)
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

/// A reranked, score-fused result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RerankedResult {
    pub stage1: Stage1Result,
    pub rerank_score: f64,
    pub normalized_rerank: f64,
    pub combined_score: f64,
}

fn min_max_normalize(scores: &[f64]) -> Vec<f64> {
    let min = scores.iter().cloned().fold(f64::INFINITY, f64::min);
    let max = scores.iter().cloned().fold(f64::NEG_INFINITY, f64::max);

    if (max - min).abs() < f64::EPSILON {
        // All scores identical (including the single-candidate case): fall
        // back to the midpoint rather than a division by zero.
        return scores.iter().map(|_| 0.5).collect();
    }

    scores.iter().map(|s| (s - min) / (max - min)).collect()
}

/// Rerank `candidates` against `query`. Fewer than two candidates is a
/// no-op (reranking a single or empty set has nothing to compare against),
/// returning the input as-is with `rerank_score` equal to `stage1_score`.
pub async fn rerank(
    client: &dyn CrossEncoderClient,
    query: &str,
    candidates: Vec<Stage1Result>,
    config: &RetrievalConfig,
) -> Result<Vec<RerankedResult>> {
    if candidates.len() < 2 {
        return Ok(candidates
            .into_iter()
            .map(|stage1| {
                let score = stage1.stage1_score;
                RerankedResult {
                    stage1,
                    rerank_score: score,
                    normalized_rerank: score,
                    combined_score: score,
                }
            })
            .collect());
    }

    let texts: Vec<String> = candidates.iter().map(|c| c.chunk.content_text.clone()).collect();

    let rerank_scores = match client.score_pairs(query, &texts).await {
        Ok(scores) => scores,
        Err(e) => {
            tracing::warn!("cross-encoder unavailable ({}), passing through stage-1 order", e);
            return Ok(candidates
                .into_iter()
                .map(|stage1| {
                    let score = stage1.stage1_score;
                    RerankedResult {
                        stage1,
                        rerank_score: score,
                        normalized_rerank: score,
                        combined_score: score,
                    }
                })
                .collect());
        }
    };

    let normalized = min_max_normalize(&rerank_scores);

    let mut results: Vec<RerankedResult> = candidates
        .into_iter()
        .zip(rerank_scores)
        .zip(normalized)
        .map(|((stage1, rerank_score), normalized_rerank)| {
            let combined_score = config.semantic_weight * normalized_rerank
                + (1.0 - config.semantic_weight) * stage1.stage1_score;
            RerankedResult {
                stage1,
                rerank_score,
                normalized_rerank,
                combined_score,
            }
        })
        .collect();

    results.sort_by(|a, b| b.combined_score.partial_cmp(&a.combined_score).unwrap());

    let keep = config.final_retrieval_k.max(config.min_rerank_k);
    results.truncate(keep);

    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ChunkLegalMetadata, ChunkSourceType, KbChunk};

    struct FakeCrossEncoder(Vec<f64>);

    #[async_trait]
    impl CrossEncoderClient for FakeCrossEncoder {
        async fn score_pairs(&self, _query: &str, candidates: &[String]) -> Result<Vec<f64>> {
            Ok(self.0.iter().take(candidates.len()).cloned().collect())
        }
        async fn health_check(&self) -> Result<()> {
            Ok(())
        }
    }

    struct FailingCrossEncoder;
    #[async_trait]
    impl CrossEncoderClient for FailingCrossEncoder {
        async fn score_pairs(&self, _: &str, _: &[String]) -> Result<Vec<f64>> {
            Err(crate::errors::EngineError::RerankFailed {
                details: "model unreachable".to_string(),
            })
        }
        async fn health_check(&self) -> Result<()> {
            Ok(())
        }
    }

    fn test_config() -> RetrievalConfig {
        RetrievalConfig {
            initial_retrieval_k: 30,
            final_retrieval_k: 3,
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
        }
    }

    fn stage1(score: f64, text: &str) -> Stage1Result {
        Stage1Result {
            chunk: KbChunk {
                source_type: ChunkSourceType::CaseMetadata,
                source_id: "id".to_string(),
                source_case_id: None,
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
            },
            stage1_score: score,
            case_title: None,
            case_number: None,
        }
    }

    #[tokio::test]
    async fn single_candidate_is_a_no_op() {
        let client = FakeCrossEncoder(vec![0.9]);
        let results = rerank(&client, "q", vec![stage1(0.5, "a")], &test_config())
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].combined_score, 0.5);
    }

    #[tokio::test]
    async fn identical_scores_normalize_to_midpoint() {
        let client = FakeCrossEncoder(vec![0.5, 0.5, 0.5]);
        let candidates = vec![stage1(0.1, "a"), stage1(0.2, "b"), stage1(0.3, "c")];
        let results = rerank(&client, "q", candidates, &test_config()).await.unwrap();
        assert!(results.iter().all(|r| r.normalized_rerank == 0.5));
    }

    #[tokio::test]
    async fn results_are_sorted_descending_by_combined_score() {
        let client = FakeCrossEncoder(vec![0.2, 0.9, 0.5]);
        let candidates = vec![stage1(0.1, "a"), stage1(0.3, "b"), stage1(0.2, "c")];
        let results = rerank(&client, "q", candidates, &test_config()).await.unwrap();
        for window in results.windows(2) {
            assert!(window[0].combined_score >= window[1].combined_score);
        }
    }

    #[tokio::test]
    async fn floor_is_respected_even_when_final_k_is_smaller() {
        let mut config = test_config();
        config.final_retrieval_k = 1;
        config.min_rerank_k = 2;
        let client = FakeCrossEncoder(vec![0.1, 0.9, 0.5, 0.4]);
        let candidates = vec![
            stage1(0.1, "a"),
            stage1(0.3, "b"),
            stage1(0.2, "c"),
            stage1(0.4, "d"),
        ];
        let results = rerank(&client, "q", candidates, &config).await.unwrap();
        assert_eq!(results.len(), 2);
    }

    #[tokio::test]
    async fn cross_encoder_failure_falls_back_to_stage1_order() {
        let client = FailingCrossEncoder;
        let candidates = vec![stage1(0.9, "a"), stage1(0.1, "b")];
        let results = rerank(&client, "q", candidates, &test_config()).await.unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].combined_score, 0.9);
    }
}
