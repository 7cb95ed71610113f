//! # API Server Module
//!
//! ## Purpose
//! REST API surface exposing `retrieve_for_qa` plus health and stats
//! endpoints, in the same `actix-web` handler/response shape this codebase
//! has always used.

use crate::errors::EngineError;
use crate::orchestrator::RetrievalEngine;
use crate::semantic_retriever::MetadataFilters;
use actix_web::{web, App, HttpResponse, HttpServer, Result as ActixResult};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;

/// Application state shared across handlers.
pub struct AppState {
    pub engine: Arc<RetrievalEngine>,
    pub started_at: Instant,
}

pub struct ApiServer {
    app_state: Arc<AppState>,
}

/// `/qa` request payload.
#[derive(Debug, Deserialize)]
pub struct QaRequest {
    pub query: String,
    pub session_id: Option<String>,
    pub top_k: Option<usize>,
    pub court: Option<String>,
    pub legal_domain: Option<String>,
    pub case_id: Option<String>,
}

/// `/qa` response payload.
#[derive(Debug, Serialize)]
pub struct QaResponse {
    pub results: Vec<crate::orchestrator::RankedResult>,
    pub total_results: usize,
    pub query_time_ms: u64,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
    pub components: HealthComponents,
}

#[derive(Debug, Serialize)]
pub struct HealthComponents {
    pub storage: String,
    pub retrieval_backends: String,
}

impl ApiServer {
    pub fn new(app_state: Arc<AppState>) -> Self {
        Self { app_state }
    }

    pub async fn run(self, host: &str, port: u16) -> crate::Result<()> {
        let bind_addr = format!("{}:{}", host, port);
        tracing::info!("Starting API server on {}", bind_addr);

        let app_state = self.app_state;
        HttpServer::new(move || {
            App::new()
                .app_data(web::Data::new(app_state.clone()))
                .route("/qa", web::post().to(qa_handler))
                .route("/health", web::get().to(health_handler))
                .route("/stats", web::get().to(stats_handler))
                .route("/", web::get().to(index_handler))
        })
        .bind(&bind_addr)
        .map_err(|e| EngineError::Internal {
            message: format!("Failed to bind server to {}: {}", bind_addr, e),
        })?
        .run()
        .await
        .map_err(|e| EngineError::Internal {
            message: format!("Server error: {}", e),
        })?;

        Ok(())
    }
}

async fn qa_handler(
    app_state: web::Data<Arc<AppState>>,
    request: web::Json<QaRequest>,
) -> ActixResult<HttpResponse> {
    let start_time = Instant::now();

    if !crate::utils::ValidationUtils::is_valid_search_query(&request.query, 1, 2000) {
        return Ok(HttpResponse::BadRequest().json(serde_json::json!({
            "error": "invalid_query",
            "message": "query must be non-empty and at most 2000 characters",
        })));
    }

    let filters = MetadataFilters {
        court: request.court.clone(),
        legal_domain: request.legal_domain.clone(),
        case_id: request.case_id.clone(),
    };

    let results = app_state
        .engine
        .retrieve_for_qa(
            request.session_id.as_deref(),
            &request.query,
            request.top_k.unwrap_or(10),
            &filters,
        )
        .await;

    let response = QaResponse {
        total_results: results.len(),
        results,
        query_time_ms: start_time.elapsed().as_millis() as u64,
    };

    Ok(HttpResponse::Ok().json(response))
}

async fn health_handler(app_state: web::Data<Arc<AppState>>) -> ActixResult<HttpResponse> {
    let backends_healthy = app_state.engine.health_check().await;

    let response = HealthResponse {
        status: if backends_healthy { "healthy".to_string() } else { "degraded".to_string() },
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: app_state.started_at.elapsed().as_secs(),
        components: HealthComponents {
            storage: "healthy".to_string(),
            retrieval_backends: if backends_healthy {
                "healthy".to_string()
            } else {
                "degraded".to_string()
            },
        },
    };

    Ok(HttpResponse::Ok().json(response))
}

async fn stats_handler(app_state: web::Data<Arc<AppState>>) -> ActixResult<HttpResponse> {
    let chunk_count = app_state.engine.kb_store.count().await.unwrap_or(0);

    let response = serde_json::json!({
        "kb_chunk_count": chunk_count,
        "uptime_seconds": app_state.started_at.elapsed().as_secs(),
        "retrieval_config": {
            "initial_retrieval_k": app_state.engine.config.retrieval.initial_retrieval_k,
            "final_retrieval_k": app_state.engine.config.retrieval.final_retrieval_k,
            "semantic_weight": app_state.engine.config.retrieval.semantic_weight,
        },
    });

    Ok(HttpResponse::Ok().json(response))
}

async fn index_handler() -> ActixResult<HttpResponse> {
    let html = r#"
    <!DOCTYPE html>
    <html>
    <head>
        <title>Legal QA Retrieval Engine</title>
        <style>
            body { font-family: Arial, sans-serif; margin: 40px; }
            .header { color: #2c3e50; }
            .endpoint { margin: 20px 0; padding: 15px; background: #f8f9fa; border-radius: 5px; }
            .method { font-weight: bold; color: #27ae60; }
        </style>
    </head>
    <body>
        <h1 class="header">Legal QA Retrieval Engine</h1>
        <p>Two-stage retrieval and reranking over Pakistani court records and statutes.</p>

        <h2>Available Endpoints</h2>

        <div class="endpoint">
            <span class="method">POST</span> /qa
            <p>Retrieve ranked, QA-ready results for a natural language question.</p>
        </div>

        <div class="endpoint">
            <span class="method">GET</span> /health
            <p>Check the health status of all system components.</p>
        </div>

        <div class="endpoint">
            <span class="method">GET</span> /stats
            <p>Get system statistics.</p>
        </div>

        <h2>Example Request</h2>
        <pre>{
  "query": "What is the punishment for murder under section 302 PPC?",
  "top_k": 10
}</pre>
    </body>
    </html>
    "#;

    Ok(HttpResponse::Ok().content_type("text/html").body(html))
}
