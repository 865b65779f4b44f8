//! HTTP surface for the training pipeline.
//!
//! Routes:
//! - `POST /training/global`      start a global discovery run
//! - `POST /training/custom`      start a run over supplied sites
//! - `GET  /training/status`      latest session snapshot
//! - `GET  /training/status/{id}` a specific session snapshot
//! - `GET  /health`               liveness plus active storage backend
//!
//! Errors are returned as `{ "error": { "code", "message" } }`.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;
use tracing::info;

use crate::models::{CandidateSite, StorageBackend, TrainingSession};
use crate::orchestrator::{StartError, TrainingRunner};

#[derive(Clone)]
pub struct AppState {
    pub runner: Arc<TrainingRunner>,
    pub backend: StorageBackend,
}

pub struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl AppError {
    fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
        }
    }

    fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, "not_found", message)
    }

    fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "bad_request", message)
    }
}

impl From<StartError> for AppError {
    fn from(err: StartError) -> Self {
        match err {
            StartError::AlreadyRunning => {
                Self::new(StatusCode::CONFLICT, "already_running", err.to_string())
            }
            StartError::Storage(e) => Self::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                "storage",
                format!("{e:#}"),
            ),
        }
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "internal",
            format!("{err:#}"),
        )
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({
            "error": { "code": self.code, "message": self.message }
        });
        (self.status, Json(body)).into_response()
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/training/global", post(start_global))
        .route("/training/custom", post(start_custom))
        .route("/training/status", get(latest_status))
        .route("/training/status/{id}", get(session_status))
        .route("/health", get(health))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub async fn serve(state: AppState, bind: &str) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(bind).await?;
    info!("listening on {}", listener.local_addr()?);
    axum::serve(listener, router(state)).await?;
    Ok(())
}

#[derive(Deserialize, Default)]
struct GlobalRequest {
    sample_count: Option<u64>,
}

#[derive(Serialize)]
struct StartResponse {
    session_id: String,
    sites_queued: usize,
    sites_skipped: usize,
}

async fn start_global(
    State(state): State<AppState>,
    body: Option<Json<GlobalRequest>>,
) -> Result<(StatusCode, Json<StartResponse>), AppError> {
    let Json(request) = body.unwrap_or_default();
    let receipt = state.runner.start_global(request.sample_count).await?;
    Ok((
        StatusCode::ACCEPTED,
        Json(StartResponse {
            session_id: receipt.session_id,
            sites_queued: receipt.sites_queued,
            sites_skipped: receipt.sites_skipped,
        }),
    ))
}

#[derive(Deserialize)]
struct CustomRequest {
    sites: Vec<CustomSite>,
}

#[derive(Deserialize)]
struct CustomSite {
    url: String,
    business_type: String,
    #[serde(default)]
    style: Option<String>,
}

async fn start_custom(
    State(state): State<AppState>,
    Json(request): Json<CustomRequest>,
) -> Result<(StatusCode, Json<StartResponse>), AppError> {
    if request.sites.is_empty() {
        return Err(AppError::bad_request("at least one site is required"));
    }
    let sites = request
        .sites
        .into_iter()
        .map(|site| CandidateSite {
            url: site.url,
            business_type: site.business_type,
            style: site.style,
            last_processed_at: None,
        })
        .collect();
    let receipt = state.runner.start_custom(sites).await?;
    Ok((
        StatusCode::ACCEPTED,
        Json(StartResponse {
            session_id: receipt.session_id,
            sites_queued: receipt.sites_queued,
            sites_skipped: receipt.sites_skipped,
        }),
    ))
}

async fn latest_status(
    State(state): State<AppState>,
) -> Result<Json<TrainingSession>, AppError> {
    state
        .runner
        .status(None)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::not_found("no training session has been started"))
}

async fn session_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<TrainingSession>, AppError> {
    state
        .runner
        .status(Some(&id))
        .await?
        .map(Json)
        .ok_or_else(|| AppError::not_found(format!("no session with id {id}")))
}

async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "storage_backend": state.backend,
    }))
}
