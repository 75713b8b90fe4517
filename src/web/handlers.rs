//! HTTP request handlers.

use super::AppState;
use crate::db::{DbError, Target};
use crate::monitor::MonitorError;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde::Deserialize;

pub async fn handle_healthz() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

// ============================================================================
// API: Targets
// ============================================================================

pub async fn handle_get_targets(State(state): State<AppState>) -> impl IntoResponse {
    match state.store.get_targets() {
        Ok(targets) => Json(targets).into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

pub async fn handle_get_target(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> impl IntoResponse {
    match state.store.get_target(id) {
        Ok(target) => Json(target).into_response(),
        Err(DbError::NotFound) => (StatusCode::NOT_FOUND, "Target not found").into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateTargetRequest {
    pub name: String,
    pub url: String,
}

pub async fn handle_create_target(
    State(state): State<AppState>,
    Json(req): Json<CreateTargetRequest>,
) -> impl IntoResponse {
    let url = req.url.trim();
    if !(url.starts_with("http://") || url.starts_with("https://")) {
        return (StatusCode::BAD_REQUEST, "url must start with http:// or https://").into_response();
    }
    if reqwest::Url::parse(url).is_err() {
        return (StatusCode::BAD_REQUEST, "invalid url").into_response();
    }

    let mut target = Target::new(req.name, url);
    match state.store.add_target(&mut target) {
        Ok(_) => (StatusCode::CREATED, Json(target)).into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

// ============================================================================
// API: On-demand check
// ============================================================================

pub async fn handle_check_now(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> impl IntoResponse {
    let target = match state.store.get_target(id) {
        Ok(t) => t,
        Err(DbError::NotFound) => return (StatusCode::NOT_FOUND, "Target not found").into_response(),
        Err(e) => return (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    };

    match state.monitor.check_now(&target, &state.shutdown).await {
        Ok(report) => Json(report).into_response(),
        Err(MonitorError::Cache(e)) => {
            (StatusCode::SERVICE_UNAVAILABLE, e.to_string()).into_response()
        }
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}
