//! # Reference Normalizer (C1)
//!
//! ## Purpose
//! Canonicalizes statute sections, citations, articles, court references,
//! rule/order references, and agency references found in free text
//! (`"section 302 PPC"`, `"Art. 199"`, `"1962 SCMR 123"`, `"FIA
//! investigation"`) into a stable form usable by both the knowledge-base
//! chunker (C2) and the statute keyword engine (C5).
//!
//! Never fails outward: a normalization error downgrades to the original
//! text with an empty reference list, recorded as a diagnostic rather than
//! propagated, since downstream stages must always have *some* text to work
//! with.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// The kind of legal reference a match resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceKind {
    Section,
    SubSection,
    Constitutional,
    Citation,
    Court,
    RuleOrder,
    Agency,
}

/// A single recognized legal reference within a span of text.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LegalReference {
    pub kind: ReferenceKind,
    pub canonical_form: String,
    pub raw_text: String,
    pub start_char: usize,
    pub end_char: usize,
    /// Priority used for duplicate-key and overlap suppression; higher wins.
    /// Follows the scale citation=6 > sub-section=5 > constitutional=4 >
    /// rule/order=3 > section=2 > agency/court=0.
    pub priority: u8,
    pub qa_relevance: f64,
}

/// Result of normalizing a block of text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalizedText {
    pub processed_text: String,
    pub references: Vec<LegalReference>,
    pub qa_context: String,
}

struct Pattern {
    regex: Regex,
    kind: ReferenceKind,
    priority: u8,
    canonicalize: fn(&regex::Captures) -> String,
    /// The statute code or agency acronym a match is attached to, if any;
    /// feeds `qa_relevance_for`'s statute-code band.
    code_of: fn(&regex::Captures) -> Option<String>,
}

fn normalize_statute_code(raw: &str) -> String {
    match raw.to_uppercase().as_str() {
        "PPC" => "PPC".to_string(),
        "CRPC" => "CrPC".to_string(),
        "CPC" => "CPC".to_string(),
        other if other.starts_with("CONSTITUTION") => "Constitution".to_string(),
        other => other.to_string(),
    }
}

fn normalize_court_abbr(raw: &str) -> String {
    match raw.to_lowercase().as_str() {
        "sc" | "supreme court" => "SC".to_string(),
        "lahore high court" => "LHC".to_string(),
        "sindh high court" => "SHC".to_string(),
        "peshawar high court" => "PHC".to_string(),
        "balochistan high court" => "BHC".to_string(),
        "islamabad high court" => "IHC".to_string(),
        "high court" => "HC".to_string(),
        other => other.to_uppercase(),
    }
}

static PATTERNS: Lazy<Vec<Pattern>> = Lazy::new(|| {
    vec![
        // "section 302 PPC", "Sec. 302 of PPC", "s. 302 PPC"
        Pattern {
            regex: Regex::new(
                r"(?i)\b(?:section|sec\.?|s\.)\s*(\d+[A-Za-z]?)\s*(?:of\s+)?(?:the\s+)?(PPC|CrPC|CPC|Constitution)\b",
            )
            .unwrap(),
            kind: ReferenceKind::Section,
            priority: 2,
            canonicalize: |c| format!("s. {} {}", &c[1], normalize_statute_code(&c[2])),
            code_of: |c| Some(normalize_statute_code(&c[2])),
        },
        // bare "302 PPC" with no leading "section" keyword.
        Pattern {
            regex: Regex::new(r"(?i)\b(\d+[A-Za-z]?)\s+(PPC|CrPC|CPC)\b").unwrap(),
            kind: ReferenceKind::Section,
            priority: 2,
            canonicalize: |c| format!("s. {} {}", &c[1], normalize_statute_code(&c[2])),
            code_of: |c| Some(normalize_statute_code(&c[2])),
        },
        // "sub-section 2 of section 497", optionally qualified by a code.
        Pattern {
            regex: Regex::new(
                r"(?i)\bsub-section\s*(\d+[A-Za-z]?)\s+of\s+section\s*(\d+[A-Za-z]?)(?:\s*(?:of\s+)?(?:the\s+)?(PPC|CrPC|CPC|Constitution))?\b",
            )
            .unwrap(),
            kind: ReferenceKind::SubSection,
            priority: 5,
            canonicalize: |c| format!("s. {}({})", &c[2], &c[1]),
            code_of: |c| c.get(3).map(|m| normalize_statute_code(m.as_str())),
        },
        // "Article 199", "Art. 199(1) Constitution"
        Pattern {
            regex: Regex::new(
                r"(?i)\b(?:article|art\.?)\s*(\d+[A-Za-z]?)(?:\(\d+\))?\s*(?:of\s+(?:the\s+)?constitution)?\b",
            )
            .unwrap(),
            kind: ReferenceKind::Constitutional,
            priority: 4,
            canonicalize: |c| format!("Art. {} Constitution", &c[1]),
            code_of: |_| Some("Constitution".to_string()),
        },
        // citation reporters: "1962 SCMR 123"
        Pattern {
            regex: Regex::new(r"\b(\d{4})\s+(SCMR|PLD|CLC|YLR|MLD|PCrLJ)\s+(\d+)\b").unwrap(),
            kind: ReferenceKind::Citation,
            priority: 6,
            canonicalize: |c| format!("{} {} {}", &c[1], &c[2], &c[3]),
            code_of: |_| None,
        },
        // "PLD 2001 SC 45"
        Pattern {
            regex: Regex::new(r"\b(PLD|SCMR|CLC|YLR|MLD|PCrLJ)\s+(\d{4})\s+([A-Za-z.]+)\s+(\d+)\b")
                .unwrap(),
            kind: ReferenceKind::Citation,
            priority: 6,
            canonicalize: |c| format!("{} {} {} {}", &c[1], &c[2], &c[3], &c[4]),
            code_of: |_| None,
        },
        // "SC 2023 45", "Lahore High Court 2021 12"
        Pattern {
            regex: Regex::new(
                r"(?i)\b(SC|HC|LHC|SHC|PHC|BHC|IHC|FSC|Supreme Court|Lahore High Court|Sindh High Court|Peshawar High Court|Balochistan High Court|Islamabad High Court|High Court)\s+(\d{4})\s+(\d+)\b",
            )
            .unwrap(),
            kind: ReferenceKind::Court,
            priority: 0,
            canonicalize: |c| format!("{} {} {}", normalize_court_abbr(&c[1]), &c[2], &c[3]),
            code_of: |_| None,
        },
        // "rule 11 CPC", "order 7 CPC"
        Pattern {
            regex: Regex::new(
                r"(?i)\b(?:rule|order)\s*(\d+[A-Za-z]?)\s*(?:of\s+)?(?:the\s+)?(PPC|CrPC|CPC|Constitution)\b",
            )
            .unwrap(),
            kind: ReferenceKind::RuleOrder,
            priority: 3,
            canonicalize: |c| format!("Rule {} {}", &c[1], normalize_statute_code(&c[2])),
            code_of: |c| Some(normalize_statute_code(&c[2])),
        },
        // "FIA investigation", "NAB filed"
        Pattern {
            regex: Regex::new(
                r"(?i)\b(FIA|NAB|ANF|CTD)\b\s+(?:investigation|investigating|filed|inquiry|raid|case|probe|arrested|conducted)",
            )
            .unwrap(),
            kind: ReferenceKind::Agency,
            priority: 0,
            canonicalize: |c| format!("{} investigation", c[1].to_uppercase()),
            code_of: |c| Some(c[1].to_uppercase()),
        },
    ]
});

/// Score a canonical reference's relevance to question-answering per the
/// per-kind bands: a statute-code attachment (PPC/CrPC/CPC/Constitution)
/// contributes a 0.9 base; citation, constitutional, and court kinds each
/// add their own increment on top; agency references use their own
/// 0.70-0.85 band instead, scaled by the agency's investigative weight.
fn qa_relevance_for(kind: ReferenceKind, code: Option<&str>) -> f64 {
    if kind == ReferenceKind::Agency {
        return match code {
            Some("FIA") | Some("NAB") => 0.85,
            _ => 0.70,
        };
    }

    let mut score = 0.0;
    if matches!(code, Some("PPC") | Some("CrPC") | Some("CPC") | Some("Constitution")) {
        score += 0.9;
    }
    score += match kind {
        ReferenceKind::Citation => 0.1,
        ReferenceKind::Constitutional => 0.05,
        ReferenceKind::Court => 0.05,
        _ => 0.0,
    };
    score.min(1.0)
}

/// Two spans overlap by more than half of the shorter span's length.
fn overlaps_significantly(a: &LegalReference, b: &LegalReference) -> bool {
    let start = a.start_char.max(b.start_char);
    let end = a.end_char.min(b.end_char);
    if end <= start {
        return false;
    }
    let overlap = end - start;
    let shorter = (a.end_char - a.start_char).min(b.end_char - b.start_char);
    shorter > 0 && overlap * 2 > shorter
}

/// Normalize all recognizable legal references in `text`.
///
/// Never returns an error: malformed input (non-UTF8 handled upstream by the
/// type system) simply yields an empty reference list alongside the
/// unmodified text.
pub fn normalize(text: &str) -> NormalizedText {
    // Step 1: find all candidates, each tagged with its normalized dedup
    // key (kind + canonical form).
    let mut candidates: Vec<(String, LegalReference)> = Vec::new();

    for pattern in PATTERNS.iter() {
        for caps in pattern.regex.captures_iter(text) {
            let m = caps.get(0).unwrap();
            let canonical_form = (pattern.canonicalize)(&caps);
            let code = (pattern.code_of)(&caps);
            let qa_relevance = qa_relevance_for(pattern.kind, code.as_deref());
            let key = format!("{:?}|{}", pattern.kind, canonical_form);
            let reference = LegalReference {
                kind: pattern.kind,
                canonical_form,
                raw_text: m.as_str().to_string(),
                start_char: m.start(),
                end_char: m.end(),
                priority: pattern.priority,
                qa_relevance,
            };
            candidates.push((key, reference));
        }
    }

    // Step 2: duplicate suppression before sorting — keep the first
    // occurrence of each normalized key.
    let mut seen_keys = std::collections::HashSet::new();
    candidates.retain(|(key, _)| seen_keys.insert(key.clone()));
    let mut candidates: Vec<LegalReference> = candidates.into_iter().map(|(_, r)| r).collect();

    // Step 3: sort by descending priority, then by original position.
    candidates.sort_by(|a, b| {
        b.priority
            .cmp(&a.priority)
            .then(a.start_char.cmp(&b.start_char))
    });

    // Step 4: overlap suppression.
    let mut kept: Vec<LegalReference> = Vec::new();
    for candidate in candidates {
        if kept.iter().any(|k| overlaps_significantly(k, &candidate)) {
            continue;
        }
        kept.push(candidate);
    }

    kept.sort_by_key(|r| r.start_char);

    // Step 6: replace each surface span with its canonical form by precise
    // character slicing (match spans are byte offsets on UTF-8 boundaries).
    let mut processed_text = String::with_capacity(text.len());
    let mut cursor = 0usize;
    for r in &kept {
        processed_text.push_str(&text[cursor..r.start_char]);
        processed_text.push_str(&r.canonical_form);
        cursor = r.end_char;
    }
    processed_text.push_str(&text[cursor..]);

    let qa_context = kept
        .iter()
        .map(|r| r.canonical_form.as_str())
        .collect::<Vec<_>>()
        .join("; ");

    NormalizedText {
        processed_text,
        references: kept,
        qa_context,
    }
}
