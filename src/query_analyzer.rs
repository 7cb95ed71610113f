//! # Query Analyzer (C4)
//!
//! ## Purpose
//! Classifies user query intent, extracts legal entities, scores query
//! specificity, generates expansion terms for recall, and extracts a
//! case-title hint when the user is plainly referring to a known case by
//! name rather than asking a general legal question.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// The intent a query most likely expresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryIntent {
    /// A literal case number or title lookup — routes to C6.
    CaseLookup,
    /// A question about a statute, offense, or legal right — routes to C5.
    StatuteQuestion,
    /// A question requiring case-law retrieval — routes to C7.
    CaseLawQuestion,
    /// Ambiguous; best-effort semantic retrieval.
    General,
}

/// A recognized legal entity extracted from the query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractedEntity {
    pub entity_type: String,
    pub value: String,
}

/// The search strategy chosen for this query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchStrategy {
    ExactCaseMatch,
    StatuteKeyword,
    SemanticRetrieval,
}

/// Full output of the query analyzer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryAnalysis {
    pub intent: QueryIntent,
    pub entities: Vec<ExtractedEntity>,
    pub specificity_score: f64,
    pub expansion_terms: Vec<String>,
    pub strategy: SearchStrategy,
    pub case_title_hint: Option<String>,
}

struct IntentPattern {
    regex: Regex,
    intent: QueryIntent,
    weight: f64,
}

static INTENT_PATTERNS: Lazy<Vec<IntentPattern>> = Lazy::new(|| {
    vec![
        IntentPattern {
            regex: Regex::new(r"(?i)\b(?:case\s*no\.?|c\.p\.|w\.p\.|crl\.?\s*a|cr\.\s*misc)\s*[:#]?\s*\d+").unwrap(),
            intent: QueryIntent::CaseLookup,
            weight: 0.9,
        },
        IntentPattern {
            regex: Regex::new(r"(?i)\bvs?\.?\b").unwrap(),
            intent: QueryIntent::CaseLookup,
            weight: 0.4,
        },
        IntentPattern {
            regex: Regex::new(r"(?i)\b(?:section|sec\.?|s\.)\s*\d+").unwrap(),
            intent: QueryIntent::StatuteQuestion,
            weight: 0.8,
        },
        IntentPattern {
            regex: Regex::new(r"(?i)\b(?:punishment|penalty|offen[sc]e|rights?|what\s+(?:is|are)\s+the\s+law)\b")
                .unwrap(),
            intent: QueryIntent::StatuteQuestion,
            weight: 0.6,
        },
        IntentPattern {
            regex: Regex::new(r"(?i)\b(?:judgment|ruling|precedent|held|court\s+(?:said|ruled))\b").unwrap(),
            intent: QueryIntent::CaseLawQuestion,
            weight: 0.6,
        },
    ]
});

struct EntityPattern {
    entity_type: &'static str,
    regex: Regex,
}

static ENTITY_PATTERNS: Lazy<Vec<EntityPattern>> = Lazy::new(|| {
    vec![
        EntityPattern {
            entity_type: "section",
            regex: Regex::new(r"(?i)\b(?:section|sec\.?|s\.)\s*(\d+[A-Za-z]?)\b").unwrap(),
        },
        EntityPattern {
            entity_type: "court",
            regex: Regex::new(r"(?i)\b(Supreme Court|High Court|Sessions Court|Family Court)\b")
                .unwrap(),
        },
        EntityPattern {
            entity_type: "year",
            regex: Regex::new(r"\b(19|20)\d{2}\b").unwrap(),
        },
        EntityPattern {
            entity_type: "case_number",
            regex: Regex::new(r"(?i)\b((?:C\.P\.|W\.P\.|Crl\.A\.|Cr\.Misc)\s*\d+[/\-]\d+)\b").unwrap(),
        },
    ]
});

/// Extract `{type, value}` entities from `query`.
pub fn extract_entities(query: &str) -> Vec<ExtractedEntity> {
    let mut entities = Vec::new();
    for pattern in ENTITY_PATTERNS.iter() {
        for caps in pattern.regex.captures_iter(query) {
            let value = caps.get(1).map_or(caps.get(0).unwrap().as_str(), |g| g.as_str());
            entities.push(ExtractedEntity {
                entity_type: pattern.entity_type.to_string(),
                value: value.to_string(),
            });
        }
    }
    entities
}

/// Classify intent via weighted regex voting; the highest cumulative weight
/// wins, `General` on a tie or no match.
fn classify_intent(query: &str) -> QueryIntent {
    let mut scores = std::collections::HashMap::new();
    for pattern in INTENT_PATTERNS.iter() {
        if pattern.regex.is_match(query) {
            *scores.entry(pattern.intent).or_insert(0.0) += pattern.weight;
        }
    }
    scores
        .into_iter()
        .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap())
        .map(|(intent, _)| intent)
        .unwrap_or(QueryIntent::General)
}

/// Specificity rewards queries with concrete entities (section numbers,
/// years, case numbers) over vague natural-language questions.
fn specificity_score(query: &str, entities: &[ExtractedEntity]) -> f64 {
    let word_count = query.split_whitespace().count().max(1);
    let entity_density = entities.len() as f64 / word_count as f64;
    let has_digits = query.chars().any(|c| c.is_ascii_digit());
    let mut score = entity_density.min(0.6);
    if has_digits {
        score += 0.2;
    }
    if query.split_whitespace().count() <= 3 {
        score += 0.1;
    }
    score.min(1.0)
}

const SYNONYM_EXPANSIONS: &[(&str, &[&str])] = &[
    ("murder", &["qatl", "homicide", "killing"]),
    ("theft", &["sariqa", "stealing"]),
    ("divorce", &["khula", "talaq"]),
    ("bail", &["release", "surety"]),
    ("custody", &["guardianship", "hizanat"]),
    ("maintenance", &["nafaqa", "alimony"]),
];

/// Generate up to `cap` expansion terms for recall, drawn from a synonym
/// table and the query's own significant words.
fn expansion_terms(query: &str, cap: usize) -> Vec<String> {
    let lower = query.to_lowercase();
    let mut terms = Vec::new();

    for (term, synonyms) in SYNONYM_EXPANSIONS {
        if lower.contains(term) {
            for syn in *synonyms {
                if terms.len() >= cap {
                    return terms;
                }
                terms.push(syn.to_string());
            }
        }
    }

    let stopwords = ["the", "a", "an", "is", "are", "of", "in", "to", "for", "what", "how"];
    for word in lower.split_whitespace() {
        if terms.len() >= cap {
            break;
        }
        let cleaned: String = word.chars().filter(|c| c.is_alphanumeric()).collect();
        if cleaned.len() > 2 && !stopwords.contains(&cleaned.as_str()) && !terms.contains(&cleaned) {
            terms.push(cleaned);
        }
    }

    terms.truncate(cap);
    terms
}

/// UI phrasing markers that, combined with one of the fallback regexes,
/// indicate the user is asking about a specific named case.
const CASE_HINT_MARKERS: &[&str] = &["this case", "the case of", "case titled", "regarding case"];

static CASE_TITLE_FALLBACK_1: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?i)case\s+(?:of|titled)\s+["“]?([A-Za-z .]+\bv(?:s?\.?)\b[A-Za-z .]+)["”]?"#).unwrap());
static CASE_TITLE_FALLBACK_2: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b([A-Z][a-zA-Z.]+(?:\s+[A-Z][a-zA-Z.]+)*\s+v(?:s?\.?)\s+[A-Z][a-zA-Z.]+(?:\s+[A-Z][a-zA-Z.]+)*)\b").unwrap());

/// Extract a case-title hint when the query plainly names a case, trying
/// the UI-phrasing markers first, then two regex fallbacks.
fn extract_case_title_hint(query: &str) -> Option<String> {
    let lower = query.to_lowercase();
    if CASE_HINT_MARKERS.iter().any(|m| lower.contains(m)) {
        if let Some(caps) = CASE_TITLE_FALLBACK_1.captures(query) {
            return Some(caps[1].trim().to_string());
        }
    }
    if let Some(caps) = CASE_TITLE_FALLBACK_1.captures(query) {
        return Some(caps[1].trim().to_string());
    }
    if let Some(caps) = CASE_TITLE_FALLBACK_2.captures(query) {
        return Some(caps[1].trim().to_string());
    }
    None
}

/// Choose the retrieval strategy implied by `intent`.
fn choose_strategy(intent: QueryIntent) -> SearchStrategy {
    match intent {
        QueryIntent::CaseLookup => SearchStrategy::ExactCaseMatch,
        QueryIntent::StatuteQuestion => SearchStrategy::StatuteKeyword,
        QueryIntent::CaseLawQuestion | QueryIntent::General => SearchStrategy::SemanticRetrieval,
    }
}

/// Analyze `query`. Never fails: an empty or malformed query still yields a
/// `General`-intent, low-specificity analysis so the orchestrator can
/// proceed with best-effort retrieval.
pub fn analyze(query: &str, max_expansion_terms: usize) -> QueryAnalysis {
    let trimmed = query.trim();
    if trimmed.is_empty() {
        return QueryAnalysis {
            intent: QueryIntent::General,
            entities: Vec::new(),
            specificity_score: 0.0,
            expansion_terms: Vec::new(),
            strategy: SearchStrategy::SemanticRetrieval,
            case_title_hint: None,
        };
    }

    let entities = extract_entities(trimmed);
    let intent = classify_intent(trimmed);
    let specificity_score = specificity_score(trimmed, &entities);
    let expansion_terms = expansion_terms(trimmed, max_expansion_terms);
    let strategy = choose_strategy(intent);
    let case_title_hint = extract_case_title_hint(trimmed);

    QueryAnalysis {
        intent,
        entities,
        specificity_score,
        expansion_terms,
        strategy,
        case_title_hint,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_case_lookup_intent() {
        let analysis = analyze("C.P. 123/2022", 20);
        assert_eq!(analysis.intent, QueryIntent::CaseLookup);
        assert_eq!(analysis.strategy, SearchStrategy::ExactCaseMatch);
    }

    #[test]
    fn classifies_statute_question_intent() {
        let analysis = analyze("What is the punishment under section 302 PPC?", 20);
        assert_eq!(analysis.intent, QueryIntent::StatuteQuestion);
    }

    #[test]
    fn empty_query_yields_general_fallback() {
        let analysis = analyze("   ", 20);
        assert_eq!(analysis.intent, QueryIntent::General);
        assert_eq!(analysis.strategy, SearchStrategy::SemanticRetrieval);
    }

    #[test]
    fn expansion_terms_respect_cap() {
        let analysis = analyze("murder theft divorce bail custody maintenance additional words here to pad", 3);
        assert!(analysis.expansion_terms.len() <= 3);
    }

    #[test]
    fn extracts_case_title_hint_from_vs_pattern() {
        let analysis = analyze("What happened in the case of Ali Khan vs State?", 20);
        assert!(analysis.case_title_hint.is_some());
    }

    #[test]
    fn extracts_section_entity() {
        let analysis = analyze("section 302 PPC applies here", 20);
        assert!(analysis.entities.iter().any(|e| e.entity_type == "section"));
    }
}
