//! # Error Handling Module
//!
//! ## Purpose
//! Centralized error handling for the legal retrieval engine, providing the
//! error taxonomy used across the query analyzer, retriever stages, ingestor,
//! and storage layer.
//!
//! ## Input/Output Specification
//! - **Input**: Error conditions from any system component
//! - **Output**: Structured error types with context and error chains
//! - **Error Categories**: Normalization, Chunking, Ingestion, Query Analysis,
//!   Statute Search, Case Lookup, Semantic Retrieval, Reranking, Storage, API

use thiserror::Error;

/// Result type used throughout the application
pub type Result<T> = std::result::Result<T, EngineError>;

/// Comprehensive error types for the legal retrieval engine
#[derive(Debug, Error)]
pub enum EngineError {
    /// Generic I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Network-related errors (vector index, cross-encoder service, etc.)
    #[error("Network error: {details}")]
    NetworkError { details: String },

    /// The vector index or embedding model is unreachable; recoverable by
    /// falling through the C7 fallback chain.
    #[error("Retrieval backend unavailable: {component} - {details}")]
    RetrievalUnavailable { component: String, details: String },

    /// C3 per-case ingestion failure; recorded in the processing log rather
    /// than propagated.
    #[error("Ingestion failed for case {case_id}: {details}")]
    IngestionFailure { case_id: String, details: String },

    /// C1 internal failure; never propagates to the caller, the function
    /// returns the original text instead.
    #[error("Reference normalization failed: {details}")]
    NormalizationFailure { details: String },

    /// Empty or non-printable query; C4 substitutes a fallback analysis.
    #[error("Malformed query: {reason}")]
    MalformedQuery { reason: String },

    /// Configuration errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Internal system errors
    #[error("Internal error: {message}")]
    Internal { message: String },

    /// Serialization/deserialization errors
    #[error("Serialization failed: {message}")]
    SerializationFailed { message: String },

    /// Validation errors
    #[error("Validation failed for field '{field}': {reason}")]
    ValidationFailed { field: String, reason: String },

    /// Not supported operation
    #[error("Operation '{operation}' is not supported")]
    NotSupported { operation: String },

    /// Database errors (sled)
    #[error("Database error: {0}")]
    Database(#[from] sled::Error),

    /// Binary serialization errors
    #[error("Serialization error: {0}")]
    Bincode(#[from] bincode::Error),

    /// HTTP client errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON parsing errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parsing errors
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Index not found (KB store, statute store)
    #[error("Index not found: {index_name}")]
    IndexNotFound { index_name: String },

    /// Search timeout
    #[error("Search timeout: query took longer than {timeout_ms}ms")]
    SearchTimeout { timeout_ms: u64 },

    /// Invalid search query
    #[error("Invalid search query: {query} - {reason}")]
    InvalidSearchQuery { query: String, reason: String },

    /// Cross-encoder inference failure
    #[error("Cross-encoder inference failed: {details}")]
    RerankFailed { details: String },

    /// Embedding generation failure
    #[error("Embedding generation failed: {text_preview} - {reason}")]
    EmbeddingGenerationFailed {
        text_preview: String,
        reason: String,
    },

    /// Invalid API request
    #[error("Invalid API request: {details}")]
    InvalidApiRequest { details: String },

    /// Generic error with message
    #[error("{message}")]
    Generic { message: String },
}

impl EngineError {
    /// Check if the error is recoverable (can be retried or routed to a
    /// fallback stage)
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            EngineError::NetworkError { .. }
                | EngineError::RetrievalUnavailable { .. }
                | EngineError::SearchTimeout { .. }
                | EngineError::NormalizationFailure { .. }
                | EngineError::MalformedQuery { .. }
        )
    }

    /// Get error category for metrics and logging
    pub fn category(&self) -> &'static str {
        match self {
            EngineError::Config { .. } => "configuration",
            EngineError::IngestionFailure { .. } => "ingestion",
            EngineError::NormalizationFailure { .. } => "reference_normalizer",
            EngineError::MalformedQuery { .. } => "query_analyzer",
            EngineError::RetrievalUnavailable { .. }
            | EngineError::NetworkError { .. }
            | EngineError::EmbeddingGenerationFailed { .. } => "semantic_retriever",
            EngineError::RerankFailed { .. } => "reranker",
            EngineError::Database(_)
            | EngineError::Bincode(_)
            | EngineError::SerializationFailed { .. }
            | EngineError::IndexNotFound { .. } => "storage",
            EngineError::SearchTimeout { .. } | EngineError::InvalidSearchQuery { .. } => {
                "orchestrator"
            }
            EngineError::InvalidApiRequest { .. } => "api",
            EngineError::Io(_)
            | EngineError::Http(_)
            | EngineError::Json(_)
            | EngineError::Toml(_)
            | EngineError::Internal { .. }
            | EngineError::NotSupported { .. }
            | EngineError::ValidationFailed { .. }
            | EngineError::Generic { .. } => "generic",
        }
    }

    /// Suggested recovery action, if any
    pub fn recovery_suggestion(&self) -> Option<&'static str> {
        match self {
            EngineError::RetrievalUnavailable { .. } => {
                Some("Fall through to the next stage in the retrieval fallback chain")
            }
            EngineError::NetworkError { .. } => Some("Check network connectivity and retry"),
            EngineError::SearchTimeout { .. } => Some("Simplify query or increase timeout"),
            EngineError::MalformedQuery { .. } => {
                Some("Use the fallback analysis and proceed with best-effort retrieval")
            }
            _ => None,
        }
    }
}

#[macro_export]
macro_rules! internal_error {
    ($msg:expr) => {
        $crate::errors::EngineError::Internal {
            message: $msg.to_string(),
        }
    };
    ($fmt:expr, $($arg:tt)*) => {
        $crate::errors::EngineError::Internal {
            message: format!($fmt, $($arg)*),
        }
    };
}
