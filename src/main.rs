//! # Legal QA Retrieval Engine Main Driver
//!
//! ## Purpose
//! Main entry point for the retrieval engine server. Orchestrates
//! initialization of every storage and retrieval component and starts the
//! web server for handling QA requests.
//!
//! ## Architecture Flow
//! 1. Parse command line arguments and load configuration
//! 2. Initialize logging and tracing
//! 3. Open storage and wire up the HTTP-backed retrieval clients
//! 4. Start the API server
//! 5. Handle shutdown signals gracefully

use clap::{Arg, Command};
use std::sync::Arc;
use std::time::Instant;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use legal_qa_engine::{
    api::{ApiServer, AppState},
    config::Config,
    errors::{EngineError, Result},
    ingest,
    orchestrator::RetrievalEngine,
    reranker::HttpCrossEncoderClient,
    semantic_retriever::HttpVectorIndexClient,
    store::SledStore,
};

#[tokio::main]
async fn main() -> Result<()> {
    let matches = Command::new("legal-qa-server")
        .version("1.0.0")
        .about("Two-stage retrieval and reranking engine for Pakistani legal QA")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Configuration file path")
                .default_value("config.toml"),
        )
        .arg(
            Arg::new("port")
                .short('p')
                .long("port")
                .value_name("PORT")
                .help("Server port")
                .value_parser(clap::value_parser!(u16)),
        )
        .arg(
            Arg::new("rebuild-index")
                .long("rebuild-index")
                .help("Reprocess every known case into the knowledge base on startup")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            Arg::new("check-health")
                .long("check-health")
                .help("Run health checks and exit")
                .action(clap::ArgAction::SetTrue),
        )
        .get_matches();

    let config_path = matches.get_one::<String>("config").unwrap();
    let mut config = Config::from_file(config_path)?;

    if let Some(port) = matches.get_one::<u16>("port") {
        config.server.port = *port;
    }

    init_logging(&config)?;

    info!("Starting Legal QA Retrieval Engine v1.0.0");
    info!("Configuration loaded from: {}", config_path);

    if matches.get_flag("check-health") {
        return run_health_checks(&config).await;
    }

    let engine = initialize_components(config.clone()).await?;

    if matches.get_flag("rebuild-index") {
        info!("Rebuilding knowledge base for every known case...");
        rebuild_indices(&engine).await?;
    }

    let app_state = Arc::new(AppState {
        engine: Arc::new(engine),
        started_at: Instant::now(),
    });

    let server = ApiServer::new(app_state);
    let host = config.server.host.clone();
    let port = config.server.port;
    let server_handle = tokio::spawn(async move {
        if let Err(e) = server.run(&host, port).await {
            error!("Server error: {}", e);
        }
    });

    info!(
        "Legal QA Retrieval Engine started successfully on {}:{}",
        config.server.host, config.server.port
    );

    tokio::select! {
        _ = signal::ctrl_c() => {
            info!("Received SIGINT, shutting down gracefully...");
        }
        _ = server_handle => {
            warn!("Server stopped unexpectedly");
        }
    }

    info!("Legal QA Retrieval Engine shut down successfully");
    Ok(())
}

/// Initialize logging and tracing.
fn init_logging(config: &Config) -> Result<()> {
    let log_level = config.logging.level.parse().map_err(|_| EngineError::Config {
        message: format!("Invalid log level: {}", config.logging.level),
    })?;

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_level(true)
        .with_thread_ids(true);

    let subscriber = tracing_subscriber::registry();

    if config.logging.json_format {
        subscriber
            .with(fmt_layer.json().with_filter(tracing_subscriber::filter::LevelFilter::from_level(log_level)))
            .init();
    } else {
        subscriber
            .with(fmt_layer.with_filter(tracing_subscriber::filter::LevelFilter::from_level(log_level)))
            .init();
    }

    info!("Logging initialized with level: {}", config.logging.level);
    Ok(())
}

/// Open storage and wire the HTTP-backed retrieval clients into a
/// `RetrievalEngine`.
async fn initialize_components(config: Config) -> Result<RetrievalEngine> {
    info!("Initializing storage...");
    let store = Arc::new(SledStore::open(config.storage.clone())?);
    store.health_check()?;
    info!("Storage is healthy at {:?}", config.storage.db_path);

    info!("Initializing retrieval backends...");
    let vector_client = Arc::new(HttpVectorIndexClient::new(
        config.retrieval.vector_index_url.clone(),
        config.retrieval.http_timeout_ms,
    )?);
    let cross_encoder = Arc::new(HttpCrossEncoderClient::new(
        config.retrieval.cross_encoder_url.clone(),
        config.retrieval.http_timeout_ms,
    )?);

    let engine = RetrievalEngine::new(
        config,
        store.clone(),
        store.clone(),
        store.clone(),
        store,
        vector_client,
        cross_encoder,
    );

    if !engine.health_check().await {
        warn!("Retrieval backends did not pass health check at startup; continuing in degraded mode");
    }

    info!("All components initialized successfully");
    Ok(engine)
}

/// Run configuration and storage health checks and exit.
async fn run_health_checks(config: &Config) -> Result<()> {
    info!("Running health checks...");

    info!("Configuration is valid");

    if let Some(parent) = config.storage.db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let store = SledStore::open(config.storage.clone())?;
    store.health_check()?;
    info!("Storage is healthy");

    let vector_client = HttpVectorIndexClient::new(
        config.retrieval.vector_index_url.clone(),
        config.retrieval.http_timeout_ms,
    )?;
    match vector_client.health_check().await {
        Ok(()) => info!("Vector index backend is healthy"),
        Err(e) => warn!("Vector index backend is unreachable: {}", e),
    }

    let cross_encoder = HttpCrossEncoderClient::new(
        config.retrieval.cross_encoder_url.clone(),
        config.retrieval.http_timeout_ms,
    )?;
    match cross_encoder.health_check().await {
        Ok(()) => info!("Cross-encoder backend is healthy"),
        Err(e) => warn!("Cross-encoder backend is unreachable: {}", e),
    }

    info!("All health checks completed");
    Ok(())
}

/// Reprocess every case already in the case store into the knowledge base.
async fn rebuild_indices(engine: &RetrievalEngine) -> Result<()> {
    use legal_qa_engine::store::CaseStore;

    let case_ids = engine.case_store.list_case_ids().await?;
    info!("Reprocessing {} cases", case_ids.len());

    let mut succeeded = 0usize;
    for case_id in case_ids {
        let document_texts: Vec<legal_qa_engine::DocumentText> = Vec::new();
        match ingest::process_case_for_qa(
            &engine.case_store,
            &engine.kb_store,
            &case_id,
            &document_texts,
            &engine.config.chunker,
            true,
        )
        .await
        {
            Ok(outcome) => {
                succeeded += 1;
                info!(
                    "Reprocessed case {}: {} chunks persisted",
                    case_id, outcome.chunks_persisted
                );
            }
            Err(e) => error!("Failed to reprocess case {}: {}", case_id, e),
        }
    }

    info!("Rebuilt {} cases successfully", succeeded);
    Ok(())
}
