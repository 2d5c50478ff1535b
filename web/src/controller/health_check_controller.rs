use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use utoipa::ToSchema;

use crate::AppState;

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct HealthStatus {
    status: String,
    timestamp: String,
    uptime_seconds: u64,
    environment: String,
    version: String,
    /// Displays currently attached to the live event stream.
    subscribers: usize,
}

/// GET the liveness of the server
#[utoipa::path(
    get,
    path = "/api/health",
    responses(
        (status = 200, description = "API router is up and responding to requests", body = HealthStatus),
    )
)]
pub async fn health_check(State(app_state): State<AppState>) -> impl IntoResponse {
    let service_state = &app_state.service_state;
    let health = HealthStatus {
        status: "healthy".to_string(),
        timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        uptime_seconds: service_state.uptime_secs(),
        environment: service_state.config.runtime_env().to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        subscribers: app_state.sse_bus.subscriber_count(),
    };

    (
        StatusCode::OK,
        [
            (header::CACHE_CONTROL, "no-cache, no-store, must-revalidate"),
            (header::PRAGMA, "no-cache"),
            (header::EXPIRES, "0"),
        ],
        Json(health),
    )
}
