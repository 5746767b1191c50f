//! # strata-api
//!
//! HTTP surface over the cleanup runner: start a run, preview one and poll
//! the status of the current or last run.

use axum::{
    extract::State,
    http::{header, Method, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use uuid::Uuid;

use strata_core::{Error, RunConfig};
use strata_jobs::CleanupRunner;

#[derive(Clone)]
pub struct AppState {
    pub runner: CleanupRunner,
}

impl AppState {
    pub fn new(runner: CleanupRunner) -> Self {
        Self { runner }
    }
}

/// Build the application router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/v1/cleanup", post(start_cleanup))
        .route("/api/v1/cleanup/analyze", post(analyze_cleanup))
        .route("/api/v1/cleanup/status", get(cleanup_status))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
                .allow_headers([header::CONTENT_TYPE, header::ACCEPT]),
        )
        .with_state(state)
}

// =============================================================================
// HANDLERS
// =============================================================================

async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StartResponse {
    run_id: Uuid,
}

async fn start_cleanup(
    State(state): State<AppState>,
    Json(config): Json<RunConfig>,
) -> Result<impl IntoResponse, ApiError> {
    let run_id = state.runner.start(config)?;
    Ok((StatusCode::ACCEPTED, Json(StartResponse { run_id })))
}

async fn analyze_cleanup(
    State(state): State<AppState>,
    Json(config): Json<RunConfig>,
) -> Result<impl IntoResponse, ApiError> {
    let summary = state.runner.analyze(config).await?;
    Ok(Json(summary))
}

async fn cleanup_status(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.runner.status())
}

// =============================================================================
// ERROR HANDLING
// =============================================================================

#[derive(Debug)]
enum ApiError {
    Internal(Error),
    Upstream(String),
    NotFound(String),
    BadRequest(String),
    Conflict(String),
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        match &err {
            Error::Conflict(msg) => ApiError::Conflict(msg.clone()),
            Error::InvalidInput(msg) | Error::Config(msg) => ApiError::BadRequest(msg.clone()),
            Error::NotFound(msg) => ApiError::NotFound(msg.clone()),
            Error::CategoryNotFound(_) | Error::PostNotFound(_) => {
                ApiError::NotFound(err.to_string())
            }
            _ if err.is_external() => ApiError::Upstream(err.to_string()),
            _ => ApiError::Internal(err),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match self {
            ApiError::Internal(err) => (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()),
            ApiError::Upstream(msg) => (StatusCode::BAD_GATEWAY, msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg),
        };

        let body = Json(serde_json::json!({
            "error": message,
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_mapping() {
        let cases = [
            (Error::Conflict("busy".into()), StatusCode::CONFLICT),
            (Error::InvalidInput("bad".into()), StatusCode::BAD_REQUEST),
            (Error::Config("nan".into()), StatusCode::BAD_REQUEST),
            (Error::CategoryNotFound(Uuid::nil()), StatusCode::NOT_FOUND),
            (Error::Oracle("down".into()), StatusCode::BAD_GATEWAY),
            (Error::Internal("boom".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, expected) in cases {
            let response = ApiError::from(err).into_response();
            assert_eq!(response.status(), expected);
        }
    }
}
