//! Career Compass HTTP API
//!
//! Axum server exposing similarity search and résumé advice.
//!
//! Architecture: each endpoint has a thin axum handler that extracts the
//! request and delegates to an inner function taking plain values. The inner
//! functions are directly testable without axum dispatch machinery.
//!
//! Endpoints:
//! - GET  /        — liveness banner
//! - GET  /health  — store and database status
//! - GET  /version — server version info
//! - POST /search  — nearest résumés to a query text
//! - POST /advise  — skills gap, bullet suggestions and career path for an upload

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use axum::extract::multipart::{MultipartError, MultipartRejection};
use axum::extract::rejection::JsonRejection;
use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use compass_core::{CompassConfig, ResumeAnalysis, ScoredResume, SimilarityQueryService};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::advise;
use crate::error::ApiError;
use crate::extract::extract_text;

pub const PROTOCOL: &str = "compass/1";

/// Multipart framing on top of the file itself.
const MULTIPART_OVERHEAD_BYTES: usize = 64 * 1024;

/// Shared state for all HTTP handlers
pub struct HttpState {
    pub search: SimilarityQueryService,
    /// Present when the store is Postgres; used for version reporting.
    pub pool: Option<PgPool>,
    pub config: CompassConfig,
}

/// Build the Axum router with all endpoints
pub fn build_router(state: Arc<HttpState>) -> Router {
    let body_limit = state.config.http.max_upload_bytes + MULTIPART_OVERHEAD_BYTES;
    let cors = state.config.http.cors_permissive;

    let router = Router::new()
        .route("/", get(root_handler))
        .route("/health", get(health_handler))
        .route("/version", get(version_handler))
        .route("/search", post(search_handler))
        .route("/advise", post(advise_handler))
        .route("/advise/", post(advise_handler))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    if cors {
        router.layer(CorsLayer::permissive())
    } else {
        router
    }
}

/// Start the HTTP server on the configured address.
/// Gracefully shuts down when the broadcast shutdown signal fires.
pub async fn start_http_server(
    state: Arc<HttpState>,
    mut shutdown: broadcast::Receiver<()>,
) -> Result<()> {
    let addr = format!("{}:{}", state.config.http.host, state.config.http.port);
    let app = build_router(state);
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("Career Compass API listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown.recv().await;
            tracing::info!("HTTP server shutting down...");
        })
        .await?;

    Ok(())
}

// ============================================================================
// Request / Response DTOs
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct SearchRequest {
    pub query: Option<String>,
    pub k: Option<u32>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SearchHit {
    pub id: i64,
    pub category: String,
    pub text: String,
    pub distance: f64,
}

impl From<ScoredResume> for SearchHit {
    fn from(scored: ScoredResume) -> Self {
        Self {
            id: scored.record.id,
            category: scored.record.category,
            text: scored.record.text,
            distance: scored.distance,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SearchResponse {
    pub results: Vec<SearchHit>,
    pub query: String,
    pub count: usize,
    pub took_ms: u64,
}

// ============================================================================
// Inner (directly testable) business logic functions
// ============================================================================

pub fn root_inner() -> serde_json::Value {
    serde_json::json!({
        "status": "online",
        "message": "Career Compass AI API is running",
    })
}

/// Inner health check — pings the store and returns (status_code, json_body).
pub async fn health_inner(state: &HttpState) -> (StatusCode, serde_json::Value) {
    let store = state.search.store();

    if let Err(e) = store.ping().await {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            serde_json::json!({
                "status": "unhealthy",
                "error": e.to_string(),
            }),
        );
    }

    let resumes = match store.count().await {
        Ok(n) => serde_json::json!(n),
        Err(e) => serde_json::json!(format!("unavailable: {}", e)),
    };

    // Without pgvector no query can run, so a missing extension is unhealthy too.
    let (healthy, pg_ver, pgvector_ver) = match &state.pool {
        Some(pool) => {
            let pg = compass_core::db::health_check(pool).await;
            let vector = compass_core::db::check_pgvector(pool).await;
            (
                pg.is_ok() && vector.is_ok(),
                pg.unwrap_or_else(|e| format!("unavailable: {}", e)),
                vector.unwrap_or_else(|e| format!("unavailable: {}", e)),
            )
        }
        None => (true, "n/a".to_string(), "n/a".to_string()),
    };

    let (status, label) = if healthy {
        (StatusCode::OK, "healthy")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "unhealthy")
    };

    (
        status,
        serde_json::json!({
            "status": label,
            "version": env!("CARGO_PKG_VERSION"),
            "postgresql": pg_ver,
            "pgvector": pgvector_ver,
            "resumes": resumes,
            "model": state.search.encoder().model_name(),
        }),
    )
}

/// Inner version — returns version info (pure, no IO).
pub fn version_inner(model: &str) -> serde_json::Value {
    serde_json::json!({
        "version": env!("CARGO_PKG_VERSION"),
        "protocol": PROTOCOL,
        "model": model,
    })
}

/// Inner search — validates the request and runs the similarity query.
/// `k` defaults to `search.default_k` and is capped at `search.max_k`.
pub async fn search_inner(state: &HttpState, req: SearchRequest) -> Result<SearchResponse, ApiError> {
    let query = match req.query {
        Some(q) if !q.trim().is_empty() => q,
        _ => return Err(ApiError::BadRequest("query field is required".to_string())),
    };
    let search = &state.config.search;
    let k = req.k.unwrap_or(search.default_k).min(search.max_k) as usize;

    let start = Instant::now();
    let hits = state.search.search(&query, k).await?;
    let took_ms = start.elapsed().as_millis() as u64;

    tracing::info!(k, hits = hits.len(), took_ms, "Search served");

    let results: Vec<SearchHit> = hits.into_iter().map(SearchHit::from).collect();
    Ok(SearchResponse {
        count: results.len(),
        results,
        query,
        took_ms,
    })
}

/// Inner advise — extracts the upload text, finds its neighbors and
/// builds the analysis.
pub async fn advise_inner(
    state: &HttpState,
    filename: Option<String>,
    bytes: Vec<u8>,
) -> Result<ResumeAnalysis, ApiError> {
    let limit = state.config.http.max_upload_bytes;
    if bytes.len() > limit {
        return Err(ApiError::PayloadTooLarge { limit });
    }

    let size = bytes.len();
    let text = tokio::task::spawn_blocking(move || extract_text(filename.as_deref(), &bytes))
        .await
        .map_err(|_| ApiError::Unprocessable("upload could not be parsed".to_string()))?
        .map_err(|e| ApiError::Unprocessable(e.to_string()))?;

    let advice = &state.config.advice;
    let neighbors = state.search.search(&text, advice.neighbors as usize).await?;
    let analysis = advise::analyze(&text, &neighbors, advice.max_skills as usize);

    tracing::info!(
        bytes = size,
        neighbors = neighbors.len(),
        career_path = ?analysis.career_path,
        "Advice served"
    );
    Ok(analysis)
}

// ============================================================================
// Axum handler wrappers (thin — delegate to inner functions)
// ============================================================================

pub async fn root_handler() -> impl IntoResponse {
    (StatusCode::OK, Json(root_inner()))
}

pub async fn health_handler(State(state): State<Arc<HttpState>>) -> impl IntoResponse {
    let (status, body) = health_inner(&state).await;
    (status, Json(body))
}

pub async fn version_handler(State(state): State<Arc<HttpState>>) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(version_inner(state.search.encoder().model_name())),
    )
}

pub async fn search_handler(
    State(state): State<Arc<HttpState>>,
    payload: std::result::Result<Json<SearchRequest>, JsonRejection>,
) -> std::result::Result<Json<SearchResponse>, ApiError> {
    let Json(req) = payload.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    search_inner(&state, req).await.map(Json)
}

pub async fn advise_handler(
    State(state): State<Arc<HttpState>>,
    multipart: std::result::Result<Multipart, MultipartRejection>,
) -> std::result::Result<Json<ResumeAnalysis>, ApiError> {
    let mut multipart = multipart.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let limit = state.config.http.max_upload_bytes;
    let to_api = |e: MultipartError| {
        if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
            ApiError::PayloadTooLarge { limit }
        } else {
            ApiError::BadRequest(e.body_text())
        }
    };

    while let Some(field) = multipart.next_field().await.map_err(to_api)? {
        if field.name() == Some("resume") {
            let filename = field.file_name().map(str::to_string);
            let bytes = field.bytes().await.map_err(to_api)?;
            return advise_inner(&state, filename, bytes.to_vec()).await.map(Json);
        }
    }
    Err(ApiError::BadRequest(
        "multipart field 'resume' is required".to_string(),
    ))
}

// ============================================================================
// Unit Tests — call inner functions directly
// ============================================================================
