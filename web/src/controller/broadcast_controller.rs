use axum::extract::{Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use log::*;
use serde_json::{json, Value};

use crate::params::broadcast::{timestamp_of, IndexParams, BROADCAST_ACTION};
use crate::AppState;
use events::{StateChange, StateEvent};

/// GET the retired polling endpoint
///
/// Old display builds polled `?action=get-messages`; they are told to stop.
#[utoipa::path(
    get,
    path = "/api/broadcast",
    params(IndexParams),
    responses(
        (status = 410, description = "Polling was replaced by /api/events"),
        (status = 404, description = "Any other query"),
    )
)]
pub async fn index(Query(params): Query<IndexParams>) -> Response {
    if params.action.as_deref() == Some("get-messages") {
        debug!("Legacy poller hit GET /api/broadcast?action=get-messages");
        return (
            StatusCode::GONE,
            [(header::RETRY_AFTER, "120")],
            Json(json!({
                "error": "This endpoint is deprecated. Use SSE at /api/events.",
                "hint": "Please remove polling and switch to Server-Sent Events.",
            })),
        )
            .into_response();
    }

    (StatusCode::NOT_FOUND, Json(json!({ "error": "Not found" }))).into_response()
}

/// POST a typed event straight to every live display
#[utoipa::path(
    post,
    path = "/api/broadcast",
    request_body(content = String, description = "{\"action\":\"broadcast\",\"type\":...,\"data\":...,\"timestamp\"?:...}", content_type = "application/json"),
    responses(
        (status = 200, description = "Event published"),
        (status = 400, description = "Invalid JSON, invalid action or unknown event type"),
    )
)]
pub async fn create(State(app_state): State<AppState>, body: String) -> Response {
    let Ok(body) = serde_json::from_str::<Value>(&body) else {
        return bad_request(json!({ "error": "Invalid JSON" }));
    };

    if body.get("action").and_then(Value::as_str) != Some(BROADCAST_ACTION) {
        return bad_request(json!({ "error": "Invalid action" }));
    }

    let typed = json!({
        "type": body.get("type").cloned().unwrap_or(Value::Null),
        "data": body.get("data").cloned().unwrap_or(Value::Null),
    });
    let event = match serde_json::from_value::<StateEvent>(typed) {
        Ok(event) => event,
        Err(e) => {
            warn!("Rejected broadcast: {e}");
            return bad_request(json!({ "error": "Unknown event type", "details": e.to_string() }));
        }
    };

    debug!("POST broadcast of {}", event.kind());
    app_state
        .event_publisher
        .publish(StateChange::at(event, timestamp_of(&body)))
        .await;

    (StatusCode::OK, Json(json!({ "success": true }))).into_response()
}

fn bad_request(body: Value) -> Response {
    (StatusCode::BAD_REQUEST, Json(body)).into_response()
}
