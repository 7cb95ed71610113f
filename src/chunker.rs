//! # Legal-Domain Chunker (C2)
//!
//! ## Purpose
//! Splits comprehensive case/document text into retrievable chunks sized for
//! the embedding model, preferring sentence boundaries over hard character
//! cuts, and classifies each chunk's legal domain for downstream filtering.

use crate::config::ChunkerConfig;
use serde::{Deserialize, Serialize};

/// Per-chunk metadata attached alongside the chunk text.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ChunkMetadata {
    pub case_no: Option<String>,
    pub court: Option<String>,
    pub judges: Vec<String>,
    pub year: Option<i32>,
    pub sections: Vec<String>,
    pub paragraph_no: Option<usize>,
    pub document_type: Option<String>,
    pub content_type: Option<String>,
    pub legal_domain: String,
    pub ai_context_score: f64,
    pub qa_relevance: f64,
}

/// A single produced chunk, prior to persistence as a `KbChunk`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub text: String,
    pub start_char: usize,
    pub end_char: usize,
    pub metadata: ChunkMetadata,
}

struct DomainKeywords {
    domain: &'static str,
    high: &'static [&'static str],
    medium: &'static [&'static str],
    low: &'static [&'static str],
}

/// Weighted keyword table used for domain classification. Each band
/// contributes a fixed weight (high=3, medium=2, low=1); criminal and civil
/// are tracked separately so the tie-break below can see both scores.
const DOMAIN_KEYWORDS: &[DomainKeywords] = &[
    DomainKeywords {
        domain: "criminal",
        high: &["fir", "murder", "ppc", "accused"],
        medium: &["bail", "prosecution", "conviction", "crpc"],
        low: &["sentence", "acquittal"],
    },
    DomainKeywords {
        domain: "civil",
        high: &["decree", "plaintiff", "defendant"],
        medium: &["suit", "cpc", "injunction"],
        low: &["damages", "contract"],
    },
    DomainKeywords {
        domain: "constitutional",
        high: &["article 199", "fundamental rights", "writ petition"],
        medium: &["constitution", "vires"],
        low: &["public interest"],
    },
    DomainKeywords {
        domain: "family",
        high: &["khula", "custody", "dower"],
        medium: &["maintenance", "family court"],
        low: &["guardian"],
    },
    DomainKeywords {
        domain: "commercial",
        high: &["arbitration", "commercial dispute"],
        medium: &["breach of contract", "indemnity"],
        low: &["invoice"],
    },
    DomainKeywords {
        domain: "tax",
        high: &["income tax", "sales tax", "fbr"],
        medium: &["assessment order", "tax tribunal"],
        low: &["duty"],
    },
    DomainKeywords {
        domain: "labor",
        high: &["labour court", "labor court", "industrial dispute"],
        medium: &["termination", "wages"],
        low: &["union"],
    },
    DomainKeywords {
        domain: "property",
        high: &["mutation", "land revenue", "ejectment"],
        medium: &["possession", "tenancy"],
        low: &["registry"],
    },
    DomainKeywords {
        domain: "banking",
        high: &["banking court", "recovery suit"],
        medium: &["default", "mortgage"],
        low: &["guarantee"],
    },
    DomainKeywords {
        domain: "intellectual_property",
        high: &["trademark", "copyright", "patent"],
        medium: &["infringement"],
        low: &["license"],
    },
    DomainKeywords {
        domain: "corporate",
        high: &["winding up", "companies ordinance", "securities"],
        medium: &["shareholder", "director"],
        low: &["board resolution"],
    },
];

/// Text signals that, alongside a criminal/civil score tie, favor `criminal`.
const CRIMINAL_TIEBREAK_TRIGGERS: &[&str] =
    &["ppc", "charged under", "criminal charges", "accused", "conviction"];

fn band_score(lower: &str, bucket: &DomainKeywords) -> u32 {
    let high = bucket.high.iter().filter(|kw| lower.contains(*kw)).count() as u32 * 3;
    let medium = bucket.medium.iter().filter(|kw| lower.contains(*kw)).count() as u32 * 2;
    let low = bucket.low.iter().filter(|kw| lower.contains(*kw)).count() as u32;
    high + medium + low
}

/// Classify the dominant legal domain of `text` via weighted keyword
/// scoring across twelve domains, returning `"general"` when no domain
/// keyword is present.
pub fn classify_domain(text: &str) -> String {
    let lower = text.to_lowercase();
    let mut best_domain = "general";
    let mut best_score: u32 = 0;
    let mut criminal_score: u32 = 0;
    let mut civil_score: u32 = 0;

    for bucket in DOMAIN_KEYWORDS {
        let score = band_score(&lower, bucket);

        if bucket.domain == "criminal" {
            criminal_score = score;
        }
        if bucket.domain == "civil" {
            civil_score = score;
        }

        if score > best_score {
            best_score = score;
            best_domain = bucket.domain;
        }
    }

    if criminal_score > 0
        && civil_score > 0
        && CRIMINAL_TIEBREAK_TRIGGERS.iter().any(|t| lower.contains(t))
    {
        return "criminal".to_string();
    }

    best_domain.to_string()
}

/// `ai_context_score`: 0.3 base, +0.2 if the domain is more specific than
/// `"general"`, +0.2 if sections were extracted, +0.2 if the court name
/// names a high/supreme court, +0.1 for a chunk over 500 chars.
fn ai_context_score(
    legal_domain: &str,
    sections: &[String],
    court: Option<&str>,
    chunk_len: usize,
) -> f64 {
    let mut score = 0.3;
    if legal_domain != "general" {
        score += 0.2;
    }
    if !sections.is_empty() {
        score += 0.2;
    }
    if let Some(court) = court {
        let lower = court.to_lowercase();
        if lower.contains("high court") || lower.contains("supreme court") {
            score += 0.2;
        }
    }
    if chunk_len > 500 {
        score += 0.1;
    }
    score.min(1.0)
}

const QA_RELEVANCE_MARKERS: &[&str] = &["court", "judge", "case", "law", "legal", "section", "act"];

fn is_non_placeholder(value: Option<&str>) -> bool {
    value.map_or(false, |s| {
        let trimmed = s.trim();
        !trimmed.is_empty() && !trimmed.eq_ignore_ascii_case("unknown") && !trimmed.eq_ignore_ascii_case("n/a")
    })
}

/// `qa_relevance`: 0.4 × fraction of the marker words present in the chunk,
/// +0.2 for a real (non-placeholder) case number, +0.2 for a real court,
/// +0.1 for non-empty judges, +0.1 for non-empty sections.
fn qa_relevance_score(
    text: &str,
    case_no: Option<&str>,
    court: Option<&str>,
    judges: &[String],
    sections: &[String],
) -> f64 {
    let lower = text.to_lowercase();
    let hits = QA_RELEVANCE_MARKERS.iter().filter(|m| lower.contains(*m)).count();
    let mut score = (hits as f64 / QA_RELEVANCE_MARKERS.len() as f64) * 0.4;
    if is_non_placeholder(case_no) {
        score += 0.2;
    }
    if is_non_placeholder(court) {
        score += 0.2;
    }
    if !judges.is_empty() {
        score += 0.1;
    }
    if !sections.is_empty() {
        score += 0.1;
    }
    score.min(1.0)
}

/// Find the best sentence-boundary split point at or before `max_pos`,
/// searching backward from `max_pos` down to `min_pos`. Falls back to a
/// hard cut at `max_pos` if no boundary is found.
fn find_sentence_boundary(text: &str, min_pos: usize, max_pos: usize) -> usize {
    let bytes = text.as_bytes();
    let max_pos = max_pos.min(bytes.len());
    let min_pos = min_pos.min(max_pos);

    let mut pos = max_pos;
    while pos > min_pos {
        if matches!(bytes.get(pos - 1), Some(b'.') | Some(b'!') | Some(b'?'))
            && bytes.get(pos).map_or(true, |b| *b == b' ' || *b == b'\n')
        {
            return pos;
        }
        pos -= 1;
    }

    max_pos
}

/// How far back from the target chunk boundary to search for a sentence
/// terminator before giving up and hard-cutting.
const SENTENCE_SEARCH_WINDOW: usize = 200;

/// Split `text` into overlapping chunks per `config`, preferring sentence
/// boundaries. Every chunk's length lies within
/// `[min_chunk_size, max_chunk_size]` except possibly the final chunk (which
/// may be shorter than `min_chunk_size` if the remaining text runs out,
/// matching how any sliding-window chunker must terminate on a finite
/// input).
///
/// Runs the reference normalizer (C1) over the full text first and chunks
/// the normalized text, so canonical reference forms (not their raw
/// surface spans) end up in the retrievable chunks.
pub fn chunk_text(text: &str, config: &ChunkerConfig) -> Vec<Chunk> {
    let mut chunks = Vec::new();
    if text.is_empty() {
        return chunks;
    }

    let normalized = crate::reference::normalize(text);
    let text = normalized.processed_text.as_str();

    let total_len = text.len();
    let mut cursor = 0usize;
    let mut paragraph_no = 0usize;

    let token_chars = ((config.target_chunk_size as f64) * config.token_ratio).floor() as usize;
    let overlap_chars = ((config.chunk_overlap as f64) * config.token_ratio).floor() as usize;

    while cursor < total_len {
        let target_end = (cursor + token_chars).min(total_len);

        let end = if target_end >= total_len {
            total_len
        } else {
            let search_floor = target_end.saturating_sub(SENTENCE_SEARCH_WINDOW).max(cursor);
            let boundary = find_sentence_boundary(text, search_floor, target_end);
            if boundary > cursor + config.min_chunk_size {
                boundary
            } else {
                target_end
            }
        };

        let end = end.max(cursor + 1).min(total_len);
        let chunk_text = text[cursor..end].to_string();

        let domain = classify_domain(&chunk_text);
        let chunk_refs = crate::reference::normalize(&chunk_text);
        let sections: Vec<String> = chunk_refs
            .references
            .iter()
            .map(|r| r.canonical_form.clone())
            .collect();

        let metadata = ChunkMetadata {
            case_no: None,
            court: None,
            judges: Vec::new(),
            year: None,
            ai_context_score: ai_context_score(&domain, &sections, None, chunk_text.len()),
            qa_relevance: qa_relevance_score(&chunk_text, None, None, &[], &sections),
            sections,
            paragraph_no: Some(paragraph_no),
            document_type: None,
            content_type: None,
            legal_domain: domain,
        };

        chunks.push(Chunk {
            text: chunk_text,
            start_char: cursor,
            end_char: end,
            metadata,
        });

        paragraph_no += 1;

        if end >= total_len {
            break;
        }

        let next_cursor = end.saturating_sub(overlap_chars);
        // Guarantee forward progress even if overlap would otherwise stall
        // the cursor on pathological (very short target/overlap) configs.
        cursor = if next_cursor > cursor { next_cursor } else { end };
    }

    // Merge a too-short trailing chunk into its predecessor rather than
    // emitting a chunk below `min_chunk_size`.
    if chunks.len() > 1 {
        let last_len = chunks.last().unwrap().text.len();
        if last_len < config.min_chunk_size {
            let last = chunks.pop().unwrap();
            let prev = chunks.last_mut().unwrap();
            prev.end_char = last.end_char;
            prev.text = text[prev.start_char..prev.end_char].to_string();
        }
    }

    chunks
}
