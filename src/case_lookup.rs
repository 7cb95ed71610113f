//! # Case Exact-Match Short-Circuit (C6)
//!
//! ## Purpose
//! Resolves a literal case reference via a tiered exact-match strategy,
//! bypassing semantic retrieval (C7-C9) entirely when the user has plainly
//! named a case. Runs four strategies in order, narrowing to the next tier
//! only when the previous one yields nothing:
//!
//! 1. Case-insensitive exact match on `case_number`
//! 2. Normalized-whitespace substring match on `case_number`
//! 3. Pattern-extraction match (case-type/number/year token recombination)
//! 4. Title-contains match — run only after 1-3 all fail, since a title
//!    match is the weakest signal and would otherwise drown out a precise
//!    case-number hit.

use crate::store::CaseStore;
use crate::utils::TextUtils;
use crate::{Case, CaseDetail, CaseId, Comment, Order};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Which tier of the lookup resolved a given case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchType {
    ExactNumber,
    NormalizedNumber,
    PatternExtracted,
    TitleContains,
}

/// A fully assembled case dossier returned by the short-circuit path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaseDossier {
    pub case: Case,
    pub detail: Option<CaseDetail>,
    pub orders: Vec<Order>,
    pub comments: Vec<Comment>,
    pub match_type: MatchType,
    pub source_match_stage: u8,
}

/// Extract a case-type/number/year token set for loose pattern matching,
/// e.g. `"crl a 123 2022"` from `"Crl.A. 123/2022"`.
fn extraction_tokens(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .collect()
}

async fn run_tier(
    store: &Arc<dyn CaseStore>,
    query: &str,
    max_results: usize,
) -> crate::Result<Option<(Vec<Case>, MatchType, u8)>> {
    // Tier 1: case-insensitive exact match.
    let exact_matches = store.find_cases_by_number(query).await?;
    let exact: Vec<Case> = exact_matches
        .into_iter()
        .filter(|c| c.case_number.eq_ignore_ascii_case(query.trim()))
        .collect();
    if !exact.is_empty() {
        return Ok(Some((exact, MatchType::ExactNumber, 1)));
    }

    // Tier 2: normalized-whitespace substring match.
    let normalized_query = TextUtils::normalize_for_comparison(query);
    let candidates = store.find_cases_by_number(query).await?;
    let normalized: Vec<Case> = candidates
        .into_iter()
        .filter(|c| TextUtils::normalize_for_comparison(&c.case_number).contains(&normalized_query))
        .collect();
    if !normalized.is_empty() {
        return Ok(Some((normalized, MatchType::NormalizedNumber, 2)));
    }

    // Tier 3: pattern-extraction match — recombine alphanumeric tokens and
    // compare token sets, tolerating punctuation/ordering differences
    // between how a user types a case number and how it's stored.
    let query_tokens = extraction_tokens(query);
    if !query_tokens.is_empty() {
        let all_ids = store.list_case_ids().await?;
        let mut pattern_matches = Vec::new();
        for id in all_ids.iter().take(5000) {
            if let Some(case) = store.get_case(id).await? {
                let case_tokens = extraction_tokens(&case.case_number);
                if !query_tokens.is_empty()
                    && query_tokens.iter().all(|t| case_tokens.contains(t))
                {
                    pattern_matches.push(case);
                    if pattern_matches.len() >= max_results {
                        break;
                    }
                }
            }
        }
        if !pattern_matches.is_empty() {
            return Ok(Some((pattern_matches, MatchType::PatternExtracted, 3)));
        }
    }

    // Tier 4: title-contains, narrowed to run only once 1-3 have failed.
    let title_matches = store.find_cases_by_title(query).await?;
    if !title_matches.is_empty() {
        return Ok(Some((title_matches, MatchType::TitleContains, 4)));
    }

    Ok(None)
}

/// Attempt to resolve `query` to one or more cases via the tiered
/// exact-match strategy, capped at `max_results` dossiers.
pub async fn lookup(
    store: &Arc<dyn CaseStore>,
    query: &str,
    max_results: usize,
) -> crate::Result<Vec<CaseDossier>> {
    let Some((cases, match_type, stage)) = run_tier(store, query, max_results).await? else {
        return Ok(Vec::new());
    };

    let mut dossiers = Vec::new();
    for case in cases.into_iter().take(max_results) {
        let detail = store.get_case_detail(&case.id).await?;
        let orders = store.get_orders(&case.id).await?;
        let comments = store.get_comments(&case.id).await?;
        dossiers.push(CaseDossier {
            case,
            detail,
            orders,
            comments,
            match_type,
            source_match_stage: stage,
        });
    }

    Ok(dossiers)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::CaseStatus;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use tokio::sync::Mutex;

    struct FakeCaseStore(Mutex<HashMap<CaseId, Case>>);

    #[async_trait]
    impl CaseStore for FakeCaseStore {
        async fn get_case(&self, case_id: &CaseId) -> crate::Result<Option<Case>> {
            Ok(self.0.lock().await.get(case_id).cloned())
        }
        async fn get_case_detail(&self, _case_id: &CaseId) -> crate::Result<Option<CaseDetail>> {
            Ok(None)
        }
        async fn get_orders(&self, _case_id: &CaseId) -> crate::Result<Vec<Order>> {
            Ok(Vec::new())
        }
        async fn get_comments(&self, _case_id: &CaseId) -> crate::Result<Vec<Comment>> {
            Ok(Vec::new())
        }
        async fn find_cases_by_number(&self, query: &str) -> crate::Result<Vec<Case>> {
            let needle = query.to_lowercase();
            Ok(self
                .0
                .lock()
                .await
                .values()
                .filter(|c| c.case_number.to_lowercase().contains(&needle))
                .cloned()
                .collect())
        }
        async fn find_cases_by_title(&self, query: &str) -> crate::Result<Vec<Case>> {
            let needle = query.to_lowercase();
            Ok(self
                .0
                .lock()
                .await
                .values()
                .filter(|c| c.title.to_lowercase().contains(&needle))
                .cloned()
                .collect())
        }
        async fn list_case_ids(&self) -> crate::Result<Vec<CaseId>> {
            Ok(self.0.lock().await.keys().cloned().collect())
        }
    }

    fn store_with(cases: Vec<Case>) -> Arc<dyn CaseStore> {
        let mut map = HashMap::new();
        for c in cases {
            map.insert(c.id.clone(), c);
        }
        Arc::new(FakeCaseStore(Mutex::new(map)))
    }

    fn sample_case() -> Case {
        Case {
            id: "c1".to_string(),
            case_number: "Crl.A. 123/2022".to_string(),
            title: "Ali Khan vs State".to_string(),
            court: "High Court".to_string(),
            status: CaseStatus::Decided,
            bench: None,
            institution_date: None,
            hearing_date: None,
        }
    }

    #[tokio::test]
    async fn tier1_exact_case_insensitive_match() {
        let store = store_with(vec![sample_case()]);
        let results = lookup(&store, "crl.a. 123/2022", 5).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].match_type, MatchType::ExactNumber);
    }

    #[tokio::test]
    async fn tier3_pattern_extraction_tolerates_punctuation() {
        let store = store_with(vec![sample_case()]);
        let results = lookup(&store, "crl a 123 2022", 5).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].match_type, MatchType::PatternExtracted);
    }

    #[tokio::test]
    async fn tier4_title_only_runs_after_earlier_tiers_fail() {
        let store = store_with(vec![sample_case()]);
        let results = lookup(&store, "Ali Khan", 5).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].match_type, MatchType::TitleContains);
    }

    #[tokio::test]
    async fn caps_results_at_max() {
        let cases: Vec<Case> = (0..10)
            .map(|i| Case {
                id: format!("c{}", i),
                case_number: format!("Crl.A. {}/2022", i),
                title: "Same Title vs State".to_string(),
                court: "High Court".to_string(),
                status: CaseStatus::Decided,
                bench: None,
                institution_date: None,
                hearing_date: None,
            })
            .collect();
        let store = store_with(cases);
        let results = lookup(&store, "Same Title", 5).await.unwrap();
        assert_eq!(results.len(), 5);
    }

    #[tokio::test]
    async fn no_match_returns_empty() {
        let store = store_with(vec![sample_case()]);
        let results = lookup(&store, "nonexistent case xyz", 5).await.unwrap();
        assert!(results.is_empty());
    }
}
