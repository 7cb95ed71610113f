//! # Diversifier & Post-Filter (C9)
//!
//! ## Purpose
//! Applies a Maximal-Marginal-Relevance-style diversity pass over the
//! reranked results (dropping near-duplicate chunks via Jaccard similarity
//! on tokenized text) and prioritizes results matching a case-title hint
//! extracted by the query analyzer.

use crate::reranker::RerankedResult;
use crate::utils::TextUtils;

/// Greedily select results in descending `combined_score` order, skipping
/// any candidate whose token-set Jaccard similarity to an already-selected
/// result exceeds `diversity_threshold`. If the pass would otherwise return
/// fewer than `target_count` results, the remaining budget is refilled from
/// the skipped candidates in score order — diversity prunes near-duplicates,
/// it does not shrink the result set below what was asked for unless the
/// candidate pool itself is smaller.
pub fn diversify(
    results: Vec<RerankedResult>,
    target_count: usize,
    diversity_threshold: f64,
) -> Vec<RerankedResult> {
    if results.is_empty() {
        return results;
    }

    let token_sets: Vec<_> = results
        .iter()
        .map(|r| TextUtils::token_set(&r.stage1.chunk.content_text))
        .collect();

    let mut selected_idx: Vec<usize> = Vec::new();
    let mut skipped_idx: Vec<usize> = Vec::new();

    for (i, _) in results.iter().enumerate() {
        if selected_idx.len() >= target_count {
            break;
        }
        let is_too_similar = selected_idx
            .iter()
            .any(|&j| TextUtils::jaccard_similarity(&token_sets[i], &token_sets[j]) > diversity_threshold);

        if is_too_similar {
            skipped_idx.push(i);
        } else {
            selected_idx.push(i);
        }
    }

    for &i in &skipped_idx {
        if selected_idx.len() >= target_count {
            break;
        }
        selected_idx.push(i);
    }

    selected_idx.sort();
    let mut owned: Vec<Option<RerankedResult>> = results.into_iter().map(Some).collect();
    selected_idx
        .into_iter()
        .filter_map(|i| owned[i].take())
        .collect()
}

/// Partition results by whether their case title matches `hint` (normalized
/// comparison), moving matches to the front while preserving each
/// partition's relative order.
pub fn prioritize_hint(results: Vec<RerankedResult>, hint: Option<&str>) -> Vec<RerankedResult> {
    let Some(hint) = hint else { return results };
    let normalized_hint = TextUtils::normalize_for_comparison(hint);

    let (matching, rest): (Vec<_>, Vec<_>) = results.into_iter().partition(|r| {
        r.stage1
            .case_title
            .as_deref()
            .map(|title| TextUtils::normalize_for_comparison(title).contains(&normalized_hint))
            .unwrap_or(false)
    });

    matching.into_iter().chain(rest).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::semantic_retriever::Stage1Result;
    use crate::{ChunkLegalMetadata, ChunkSourceType, KbChunk};

    fn result(text: &str, score: f64, case_title: Option<&str>) -> RerankedResult {
        RerankedResult {
            stage1: Stage1Result {
                chunk: KbChunk {
                    source_type: ChunkSourceType::CaseMetadata,
                    source_id: text.to_string(),
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
                    content_hash: text.to_string(),
                    is_processed: true,
                    created_at: chrono::Utc::now(),
                },
                stage1_score: score,
                case_title: case_title.map(|s| s.to_string()),
                case_number: None,
            },
            rerank_score: score,
            normalized_rerank: score,
            combined_score: score,
        }
    }

    #[test]
    fn drops_near_duplicate_chunks() {
        let results = vec![
            result("the quick brown fox jumps over the lazy dog", 0.9, None),
            result("the quick brown fox jumps over a lazy dog", 0.8, None),
            result("completely different content about statutes", 0.7, None),
        ];
        let diversified = diversify(results, 3, 0.8);
        assert_eq!(diversified.len(), 2);
    }

    #[test]
    fn refills_from_skipped_when_pool_allows() {
        let results = vec![
            result("alpha beta gamma delta", 0.9, None),
            result("alpha beta gamma delta epsilon", 0.85, None),
            result("alpha beta gamma delta zeta", 0.8, None),
        ];
        // Threshold so permissive that everything is "too similar", forcing
        // the refill path to still satisfy target_count from skipped items.
        let diversified = diversify(results, 2, 0.1);
        assert_eq!(diversified.len(), 2);
    }

    #[test]
    fn prioritizes_hint_matching_case_title() {
        let results = vec![
            result("unrelated content", 0.9, Some("Other Case vs State")),
            result("relevant content", 0.5, Some("Ali Khan vs State")),
        ];
        let prioritized = prioritize_hint(results, Some("ali khan"));
        assert_eq!(prioritized[0].stage1.case_title.as_deref(), Some("Ali Khan vs State"));
    }

    #[test]
    fn no_hint_leaves_order_unchanged() {
        let results = vec![result("a", 0.9, None), result("b", 0.5, None)];
        let prioritized = prioritize_hint(results, None);
        assert_eq!(prioritized[0].stage1.chunk.content_text, "a");
    }

    #[test]
    fn empty_input_returns_empty() {
        assert!(diversify(Vec::new(), 5, 0.8).is_empty());
    }
}
