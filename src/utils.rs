//! # Utilities Module
//!
//! ## Purpose
//! Common utility functions and helpers used throughout the retrieval engine
//! for text processing, performance monitoring, and validation.

use std::time::Instant;

/// Performance timer for measuring operation duration, used to populate
/// `retrieval_time` on every stage of `retrieve_for_qa`.
pub struct Timer {
    start: Instant,
    name: String,
}

/// Text processing utilities.
pub struct TextUtils;

/// System utilities.
pub struct SystemUtils;

impl Timer {
    /// Start a new timer with a name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            start: Instant::now(),
            name: name.into(),
        }
    }

    /// Get elapsed time in milliseconds.
    pub fn elapsed_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }

    /// Stop timer and log duration.
    pub fn stop(self) -> u64 {
        let elapsed = self.elapsed_ms();
        tracing::debug!("Timer '{}' completed in {}ms", self.name, elapsed);
        elapsed
    }
}

impl TextUtils {
    /// Truncate text to specified length with ellipsis.
    pub fn truncate(text: &str, max_length: usize) -> String {
        if text.len() <= max_length {
            text.to_string()
        } else {
            format!("{}...", &text[..max_length.saturating_sub(3)])
        }
    }

    /// Extract a preview from longer content (used for the case-title-hint
    /// extraction preview and API response summaries).
    pub fn extract_preview(text: &str, max_words: usize) -> String {
        let words: Vec<&str> = text.split_whitespace().take(max_words).collect();
        let preview = words.join(" ");

        if words.len() >= max_words {
            format!("{}...", preview)
        } else {
            preview
        }
    }

    /// Sanitize text for safe display.
    pub fn sanitize(text: &str) -> String {
        text.chars()
            .filter(|c| !c.is_control() || c.is_whitespace())
            .collect()
    }

    /// Count words in text.
    pub fn word_count(text: &str) -> usize {
        text.split_whitespace().count()
    }

    /// Lowercase + strip punctuation token set, used by the diversifier's
    /// Jaccard similarity computation.
    pub fn token_set(text: &str) -> std::collections::HashSet<String> {
        text.to_lowercase()
            .split(|c: char| !c.is_alphanumeric())
            .filter(|s| !s.is_empty())
            .map(|s| s.to_string())
            .collect()
    }

    /// Jaccard similarity between two token sets.
    pub fn jaccard_similarity(
        a: &std::collections::HashSet<String>,
        b: &std::collections::HashSet<String>,
    ) -> f64 {
        if a.is_empty() && b.is_empty() {
            return 0.0;
        }
        let intersection = a.intersection(b).count();
        let union = a.union(b).count();
        if union == 0 {
            0.0
        } else {
            intersection as f64 / union as f64
        }
    }

    /// Normalize whitespace and case for title/string comparisons (used by
    /// C6's normalized-contains strategy and C9's hint prioritization).
    pub fn normalize_for_comparison(text: &str) -> String {
        text.to_lowercase().split_whitespace().collect::<Vec<_>>().join(" ")
    }

    /// Generate a stable hash of text content, used for cache keys and the
    /// idempotency processing log's `text_hash`.
    pub fn text_hash(text: &str) -> String {
        use sha2::{Digest, Sha256};
        let mut hasher = Sha256::new();
        hasher.update(text.as_bytes());
        format!("{:x}", hasher.finalize())
    }

    /// MD5 hash used as the embedding disk cache key (per the cache's own
    /// keying scheme, independent of the SHA-256 content hash).
    pub fn md5_hex(text: &str) -> String {
        format!("{:x}", md5::compute(text.as_bytes()))
    }
}

impl SystemUtils {
    /// Format bytes as human-readable string.
    pub fn format_bytes(bytes: u64) -> String {
        const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
        let mut size = bytes as f64;
        let mut unit_index = 0;

        while size >= 1024.0 && unit_index < UNITS.len() - 1 {
            size /= 1024.0;
            unit_index += 1;
        }

        if unit_index == 0 {
            format!("{} {}", size as u64, UNITS[unit_index])
        } else {
            format!("{:.2} {}", size, UNITS[unit_index])
        }
    }

    /// Format duration as human-readable string.
    pub fn format_duration(duration: std::time::Duration) -> String {
        let total_seconds = duration.as_secs();
        let hours = total_seconds / 3600;
        let minutes = (total_seconds % 3600) / 60;
        let seconds = total_seconds % 60;

        if hours > 0 {
            format!("{}h {}m {}s", hours, minutes, seconds)
        } else if minutes > 0 {
            format!("{}m {}s", minutes, seconds)
        } else {
            format!("{}s", seconds)
        }
    }
}

/// Validation utilities.
pub struct ValidationUtils;

impl ValidationUtils {
    /// Validate a query string against configured length bounds.
    pub fn is_valid_search_query(query: &str, min_length: usize, max_length: usize) -> bool {
        let trimmed = query.trim();
        !trimmed.is_empty() && trimmed.len() >= min_length && trimmed.len() <= max_length
    }

    /// Sanitize filename for safe file operations (embedding cache writes).
    pub fn sanitize_filename(filename: &str) -> String {
        filename
            .chars()
            .map(|c| {
                if c.is_alphanumeric() || c == '-' || c == '_' || c == '.' {
                    c
                } else {
                    '_'
                }
            })
            .collect()
    }
}

/// Macro for timing code blocks.
#[macro_export]
macro_rules! time_block {
    ($name:expr, $block:block) => {{
        let timer = $crate::utils::Timer::new($name);
        let result = $block;
        timer.stop();
        result
    }};
}
