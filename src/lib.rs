//! Core library for Intake. This module wires the submission pipeline into
//! an axum router together with the static file, CORS and cache-header
//! layers the service runs behind.

mod config;
pub mod error;
pub mod submission;
pub mod util;

pub use config::{AppConfig, ComplianceConfig, GitHubConfig};

use std::any::Any;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use axum::extract::{
    rejection::{BytesRejection, FailedToBufferBody},
    DefaultBodyLimit, State,
};
use axum::handler::HandlerWithoutStateExt;
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use bytes::Bytes;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::set_header::SetResponseHeaderLayer;

use crate::error::ErrorResponse;
use crate::submission::compliance::LlmComplianceChecker;
use crate::submission::publisher::GitHubPublisher;
use crate::submission::storage::AttachmentStore;
use crate::submission::SubmissionService;

pub use crate::submission::compliance::{ComplianceChecker, ComplianceOutcome, ComplianceResult};
pub use crate::submission::publisher::{CreatedIssue, IssuePublisher, IssueResult, NewIssue};
pub use crate::submission::SubmitResponse;

const CACHE_CONTROL_VALUE: &str = "no-cache, no-store, must-revalidate";

/// Application state shared across handlers. Holds the submission pipeline
/// and the directories served as static content.
#[derive(Clone)]
pub struct AppState {
    pub service: SubmissionService,
    pub max_request_bytes: usize,
    pub static_dir: PathBuf,
    pub upload_dir: PathBuf,
}

/// Build state from an explicit configuration. The upload directory is
/// created if it does not exist yet.
pub fn build_state(config: AppConfig) -> anyhow::Result<AppState> {
    let checker = LlmComplianceChecker::new(&config.compliance, config.upstream_timeout_ms)
        .context("Failed to build compliance HTTP client")?;
    let publisher = GitHubPublisher::new(&config.github, config.upstream_timeout_ms)
        .context("Failed to build GitHub HTTP client")?;
    build_state_with(config, Arc::new(checker), Arc::new(publisher))
}

/// Like [`build_state`] but with caller-supplied upstream clients.
pub fn build_state_with(
    config: AppConfig,
    checker: Arc<dyn ComplianceChecker>,
    publisher: Arc<dyn IssuePublisher>,
) -> anyhow::Result<AppState> {
    std::fs::create_dir_all(&config.upload_dir).with_context(|| {
        format!(
            "Failed to create upload directory '{}'",
            config.upload_dir.display()
        )
    })?;
    if config.github.token.is_none() {
        tracing::warn!("GITHUB_PAT not set; submissions will be refused");
    }
    if config.compliance.api_key.is_none() {
        tracing::info!("OPENAI_API_KEY not set; compliance pre-check disabled");
    }

    let store = AttachmentStore::new(config.upload_dir.clone(), config.public_domain.clone());
    Ok(AppState {
        service: SubmissionService::new(checker, publisher, store),
        max_request_bytes: config.max_request_bytes,
        static_dir: config.static_dir,
        upload_dir: config.upload_dir,
    })
}

/// Build state from environment variables. See [`AppConfig::from_env`] for
/// the variables read.
pub async fn build_state_from_env() -> Result<AppState, Box<dyn std::error::Error>> {
    let config = AppConfig::from_env().map_err(|e| -> Box<dyn std::error::Error> { e.into() })?;
    build_state(config).map_err(|e| e.into())
}

/// Build the Axum router and attach handlers and layers.
pub fn app(state: AppState) -> Router {
    let uploads = ServeDir::new(&state.upload_dir)
        .call_fallback_on_method_not_allowed(true)
        .fallback(not_found_handler.into_service());
    let static_files = ServeDir::new(&state.static_dir)
        .call_fallback_on_method_not_allowed(true)
        .fallback(not_found_handler.into_service());
    let max_request_bytes = state.max_request_bytes;

    Router::new()
        .route("/api/submit", post(submit_handler).options(preflight_handler))
        .route("/healthz", get(healthz_handler))
        .nest_service("/uploads", uploads)
        .fallback_service(static_files)
        .layer(DefaultBodyLimit::max(max_request_bytes))
        .layer(CorsLayer::permissive())
        .layer(SetResponseHeaderLayer::overriding(
            header::CACHE_CONTROL,
            HeaderValue::from_static(CACHE_CONTROL_VALUE),
        ))
        .layer(CatchPanicLayer::custom(handle_panic))
        .with_state(state)
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
        .into_response()
}

/// Handler for `POST /api/submit`.
async fn submit_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> Response {
    let body = match body {
        Ok(b) => b,
        Err(rejection) => return handle_body_rejection(&state, rejection),
    };
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok());

    match state.service.handle(content_type, body).await {
        Ok(resp) => (StatusCode::OK, Json(resp)).into_response(),
        Err(err) => err.into_response(),
    }
}

fn handle_body_rejection(state: &AppState, rejection: BytesRejection) -> Response {
    match rejection {
        BytesRejection::FailedToBufferBody(FailedToBufferBody::LengthLimitError(_)) => {
            tracing::warn!(
                limit = state.max_request_bytes,
                "request body exceeded configured limit"
            );
            error_response(
                StatusCode::PAYLOAD_TOO_LARGE,
                format!(
                    "Request too large (body exceeded limit {} bytes)",
                    state.max_request_bytes
                ),
            )
        }
        other => {
            tracing::warn!(error = %other, "failed to read request body");
            error_response(StatusCode::BAD_REQUEST, "Failed to read request body")
        }
    }
}

/// Plain `OPTIONS` requests. Real CORS preflights are answered by the CORS
/// layer before reaching this handler.
async fn preflight_handler() -> Response {
    (
        StatusCode::OK,
        [
            (header::ACCESS_CONTROL_ALLOW_ORIGIN, "*"),
            (header::ACCESS_CONTROL_ALLOW_METHODS, "POST, OPTIONS"),
            (header::ACCESS_CONTROL_ALLOW_HEADERS, "Content-Type"),
        ],
    )
        .into_response()
}

/// Anything outside the API routes that no static file answers, including
/// non-GET requests to static paths.
async fn not_found_handler() -> Response {
    error_response(StatusCode::NOT_FOUND, "Not found")
}

/// Simple health endpoint for container readiness / liveness checks.
async fn healthz_handler() -> Response {
    let json = serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    });
    (StatusCode::OK, Json(json)).into_response()
}

fn handle_panic(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = err.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = err.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "unknown panic".to_string()
    };
    tracing::error!(panic = %detail, "request handler panicked");
    error_response(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
}
