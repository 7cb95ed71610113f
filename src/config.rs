//! # Configuration Management Module
//!
//! ## Purpose
//! Centralized configuration management for the retrieval engine, supporting
//! multiple sources (files, environment variables) with validation and
//! type-safe access to every tunable in the retrieval pipeline.
//!
//! ## Configuration Sources (in order of precedence)
//! 1. Environment variables (`LEGAL_QA_*`)
//! 2. Configuration file (TOML)
//! 3. Default values
//!
//! ## Usage
//! ```rust
//! use legal_qa_engine::config::Config;
//!
//! let config = Config::from_file("config.toml").unwrap_or_default();
//! println!("Server port: {}", config.server.port);
//! ```

use crate::errors::{EngineError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main configuration structure containing all system settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub retrieval: RetrievalConfig,
    pub chunker: ChunkerConfig,
    pub storage: StorageConfig,
    pub logging: LoggingConfig,
    pub performance: PerformanceConfig,
}

/// Server and API configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub max_payload_size_mb: u32,
    pub request_timeout_seconds: u64,
    pub enable_cors: bool,
    pub rate_limit_rpm: u32,
}

/// Retrieval pipeline configuration (C6-C9 tuning knobs).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Stage-1 (C7) semantic recall depth.
    pub initial_retrieval_k: usize,
    /// Final result count returned by `retrieve_for_qa`.
    pub final_retrieval_k: usize,
    /// Floor below which the reranker (C8) will not truncate, even if
    /// `final_retrieval_k` would otherwise cut deeper.
    pub min_rerank_k: usize,
    /// Weight given to the normalized cross-encoder score in C8's fusion;
    /// `(1.0 - semantic_weight)` weights the stage-1 score.
    pub semantic_weight: f64,
    /// Jaccard similarity ceiling used by C9's MMR diversity pass.
    pub diversity_threshold: f64,
    /// Embedding disk cache directory (MD5-keyed, see C7).
    pub embedding_cache_dir: PathBuf,
    /// Cross-encoder model identifier, passed to the reranker client.
    pub cross_encoder_model: String,
    /// Embedding vector dimension.
    pub embedding_dimension: usize,
    /// Case exact-match short-circuit cap (C6).
    pub case_lookup_max_results: usize,
    /// Maximum expansion terms generated by the query analyzer (C4).
    pub max_expansion_terms: usize,
    /// Base URL of the embedding/vector-index service consumed by C7.
    pub vector_index_url: String,
    /// Base URL of the cross-encoder service consumed by C8.
    pub cross_encoder_url: String,
    /// HTTP client timeout for both of the above, in milliseconds.
    pub http_timeout_ms: u64,
}

/// Chunking configuration (C2).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkerConfig {
    /// Target chunk size in tokens; scaled to characters via `token_ratio`.
    pub target_chunk_size: usize,
    /// Overlap between consecutive chunks in characters.
    pub chunk_overlap: usize,
    /// Minimum acceptable chunk size; shorter trailing chunks are merged
    /// into the previous chunk.
    pub min_chunk_size: usize,
    /// Maximum chunk size; the sentence-boundary search gives up and
    /// hard-splits beyond this.
    pub max_chunk_size: usize,
    /// Minimum completeness score (see the chunker's scoring formula)
    /// below which a chunk is flagged as low quality rather than discarded.
    pub min_completeness_score: f64,
    /// Characters per token, used to convert `target_chunk_size` (in
    /// tokens) into a character offset for the sliding window.
    pub token_ratio: f64,
}

/// Storage and database configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub db_path: PathBuf,
    pub enable_compression: bool,
}

/// Logging and monitoring configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub file_path: Option<PathBuf>,
    pub json_format: bool,
}

/// Performance tuning configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceConfig {
    pub worker_threads: usize,
    pub cpu_pool_size: usize,
}

impl Config {
    /// Load configuration from the default location (`config.toml`).
    pub fn load() -> Result<Self> {
        Self::from_file("config.toml")
    }

    /// Load configuration from a specific file, applying env overrides and
    /// validation. Falls back to defaults if the file does not exist.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let mut config: Config = if path.exists() {
            let content = std::fs::read_to_string(path).map_err(|e| EngineError::Config {
                message: format!("Failed to read config file {:?}: {}", path, e),
            })?;
            toml::from_str(&content).map_err(|e| EngineError::Config {
                message: format!("Failed to parse config file {:?}: {}", path, e),
            })?
        } else {
            tracing::warn!("Configuration file not found: {:?}, using defaults", path);
            Self::default()
        };

        config.apply_env_overrides()?;
        config.validate()?;

        Ok(config)
    }

    /// Apply `LEGAL_QA_*` environment variable overrides.
    fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(host) = std::env::var("LEGAL_QA_HOST") {
            self.server.host = host;
        }
        if let Ok(port) = std::env::var("LEGAL_QA_PORT") {
            self.server.port = port.parse().map_err(|_| EngineError::Config {
                message: "Invalid port number in LEGAL_QA_PORT".to_string(),
            })?;
        }
        if let Ok(db_path) = std::env::var("LEGAL_QA_DB_PATH") {
            self.storage.db_path = PathBuf::from(db_path);
        }
        if let Ok(cache_dir) = std::env::var("LEGAL_QA_EMBEDDING_CACHE_DIR") {
            self.retrieval.embedding_cache_dir = PathBuf::from(cache_dir);
        }
        if let Ok(k) = std::env::var("LEGAL_QA_INITIAL_K") {
            self.retrieval.initial_retrieval_k = k.parse().map_err(|_| EngineError::Config {
                message: "Invalid integer in LEGAL_QA_INITIAL_K".to_string(),
            })?;
        }
        if let Ok(level) = std::env::var("LEGAL_QA_LOG_LEVEL") {
            self.logging.level = level;
        }
        Ok(())
    }

    /// Validate configuration values.
    fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(EngineError::ValidationFailed {
                field: "server.port".to_string(),
                reason: "Port cannot be zero".to_string(),
            });
        }

        if self.retrieval.embedding_dimension == 0 {
            return Err(EngineError::ValidationFailed {
                field: "retrieval.embedding_dimension".to_string(),
                reason: "Embedding dimension must be greater than zero".to_string(),
            });
        }

        if self.retrieval.final_retrieval_k > self.retrieval.initial_retrieval_k {
            return Err(EngineError::ValidationFailed {
                field: "retrieval.final_retrieval_k".to_string(),
                reason: "final_retrieval_k cannot exceed initial_retrieval_k".to_string(),
            });
        }

        if self.retrieval.min_rerank_k > self.retrieval.final_retrieval_k {
            return Err(EngineError::ValidationFailed {
                field: "retrieval.min_rerank_k".to_string(),
                reason: "min_rerank_k cannot exceed final_retrieval_k".to_string(),
            });
        }

        if !(0.0..=1.0).contains(&self.retrieval.semantic_weight) {
            return Err(EngineError::ValidationFailed {
                field: "retrieval.semantic_weight".to_string(),
                reason: "semantic_weight must be between 0.0 and 1.0".to_string(),
            });
        }

        if self.chunker.min_chunk_size > self.chunker.target_chunk_size
            || self.chunker.target_chunk_size > self.chunker.max_chunk_size
        {
            return Err(EngineError::ValidationFailed {
                field: "chunker".to_string(),
                reason: "chunk size bounds must satisfy min <= target <= max".to_string(),
            });
        }

        Ok(())
    }

    /// Serialize configuration as a TOML string.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| EngineError::Config {
            message: format!("Failed to serialize config to TOML: {}", e),
        })
    }

    /// Save configuration to a file.
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = self.to_toml()?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 8080,
                max_payload_size_mb: 10,
                request_timeout_seconds: 30,
                enable_cors: true,
                rate_limit_rpm: 1000,
            },
            retrieval: RetrievalConfig {
                initial_retrieval_k: 30,
                final_retrieval_k: 12,
                min_rerank_k: 8,
                semantic_weight: 0.7,
                diversity_threshold: 0.8,
                embedding_cache_dir: PathBuf::from("./data/embedding_cache"),
                cross_encoder_model: "cross-encoder/ms-marco-MiniLM-L-6-v2".to_string(),
                embedding_dimension: 384,
                case_lookup_max_results: 5,
                max_expansion_terms: 20,
                vector_index_url: "http://127.0.0.1:6333".to_string(),
                cross_encoder_url: "http://127.0.0.1:8501".to_string(),
                http_timeout_ms: 5_000,
            },
            chunker: ChunkerConfig {
                target_chunk_size: 700,
                chunk_overlap: 100,
                min_chunk_size: 200,
                max_chunk_size: 1000,
                min_completeness_score: 0.75,
                token_ratio: 0.75,
            },
            storage: StorageConfig {
                db_path: PathBuf::from("./data/legal_qa.db"),
                enable_compression: true,
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                file_path: None,
                json_format: false,
            },
            performance: PerformanceConfig {
                worker_threads: num_cpus::get(),
                cpu_pool_size: num_cpus::get() * 2,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        let config = Config::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rejects_inverted_k_bounds() {
        let mut config = Config::default();
        config.retrieval.final_retrieval_k = config.retrieval.initial_retrieval_k + 1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_zero_port() {
        let mut config = Config::default();
        config.server.port = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_out_of_range_semantic_weight() {
        let mut config = Config::default();
        config.retrieval.semantic_weight = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn roundtrips_through_toml() {
        let config = Config::default();
        let toml_str = config.to_toml().expect("serialize");
        let parsed: Config = toml::from_str(&toml_str).expect("parse");
        assert_eq!(parsed.retrieval.initial_retrieval_k, config.retrieval.initial_retrieval_k);
    }
}
