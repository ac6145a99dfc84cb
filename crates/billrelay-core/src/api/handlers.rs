//! API handlers for the operational HTTP surface

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::{Deserialize, Serialize};

use crate::alerting::{CheckSummary, NotificationChecker};
use crate::models::Notification;
use crate::store::Repository;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<Repository>,
    pub checker: Arc<NotificationChecker>,
    pub metrics: Option<PrometheusHandle>,
}

/// Health check response
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub store: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Health check endpoint; reports `degraded` when the store does not answer
pub async fn health(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let store = state.repo.store().backend_name().to_string();
    let version = env!("CARGO_PKG_VERSION").to_string();

    match state.repo.ping().await {
        Ok(()) => (
            StatusCode::OK,
            Json(HealthResponse {
                status: "ok".to_string(),
                version,
                store,
                error: None,
            }),
        ),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(HealthResponse {
                status: "degraded".to_string(),
                version,
                store,
                error: Some(e.to_string()),
            }),
        ),
    }
}

/// Query parameters for listing notifications
#[derive(Debug, Deserialize)]
pub struct ListNotificationsQuery {
    /// Only notifications of this chat
    pub chat_id: Option<i64>,
}

/// Notification list response
#[derive(Debug, Serialize, Deserialize)]
pub struct ListNotificationsResponse {
    pub notifications: Vec<Notification>,
    pub total: usize,
}

/// List active notifications
pub async fn list_notifications(
    State(state): State<AppState>,
    Query(query): Query<ListNotificationsQuery>,
) -> Result<Json<ListNotificationsResponse>, (StatusCode, String)> {
    let notifications = match query.chat_id {
        Some(chat_id) => state.repo.user_notifications(chat_id).await,
        None => state.repo.active_notifications().await,
    }
    .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;

    let total = notifications.len();
    Ok(Json(ListNotificationsResponse {
        notifications,
        total,
    }))
}

/// Run a notification check now
pub async fn trigger_check(
    State(state): State<AppState>,
) -> Result<Json<CheckSummary>, (StatusCode, String)> {
    let summary = state
        .checker
        .check_all()
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;
    Ok(Json(summary))
}

/// Simple status response
#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    pub status: String,
}

/// Flush the repository cache
pub async fn clear_cache(State(state): State<AppState>) -> Json<StatusResponse> {
    state.repo.clear_cache();
    Json(StatusResponse {
        status: "ok".to_string(),
    })
}

/// Prometheus metrics in text format
pub async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    match &state.metrics {
        Some(handle) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            handle.render(),
        ),
        None => (
            StatusCode::NOT_FOUND,
            [(header::CONTENT_TYPE, "text/plain")],
            "metrics recorder not installed".to_string(),
        ),
    }
}
