use async_stream::stream;
use async_trait::async_trait;
use axum::body::Body;
use axum::extract::{Query, State};
use axum::http::{header, HeaderMap, HeaderName, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use log::*;
use serde_json::json;
use service::state_store::StateStore;
use sse::{parse_last_event_id, Session, SessionConfig, SnapshotSource};
use std::convert::Infallible;
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::params::event_stream::IndexParams;
use crate::AppState;
use events::StateEvent;

/// Feeds new sessions the stored dashboard state before live events.
struct StoredState(Arc<StateStore>);

#[async_trait]
impl SnapshotSource<StateEvent> for StoredState {
    async fn snapshot(&self) -> Vec<StateEvent> {
        self.0.snapshot_events().await
    }
}

/// GET the live event stream
///
/// Opens a long-lived SSE connection: a `connected` frame, the stored state,
/// any buffered events newer than the client's last-seen id, then live events
/// and periodic heartbeats.
#[utoipa::path(
    get,
    path = "/api/events",
    params(
        ("Last-Event-ID" = Option<String>, Header, description = "Highest event id already seen; takes precedence over the query parameter"),
        IndexParams,
    ),
    responses(
        (status = 200, description = "text/event-stream of dashboard events"),
    )
)]
pub async fn index(
    State(app_state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<IndexParams>,
) -> Response {
    let raw_last_seen = headers
        .get("last-event-id")
        .and_then(|value| value.to_str().ok())
        .map(str::to_owned)
        .or(params.last_event_id);
    let last_seen = raw_last_seen.as_deref().and_then(parse_last_event_id);

    debug!(
        "Establishing SSE connection (last seen: {:?}, raw: {:?})",
        last_seen, raw_last_seen
    );

    let config = &app_state.service_state.config;
    let (tx, mut rx) = mpsc::channel::<String>(config.sse_channel_capacity());

    let session = Session::new(
        Arc::clone(&app_state.sse_bus),
        SessionConfig {
            keepalive_interval: config.keepalive_interval(),
            watchdog_timeout: config.watchdog_timeout(),
        },
    )
    .with_last_seen(last_seen)
    .with_snapshot(Arc::new(StoredState(Arc::clone(
        &app_state.service_state.state_store,
    ))))
    .with_cancellation(app_state.shutdown.child_token());

    tokio::spawn(async move {
        let reason = session.run(tx).await;
        debug!("SSE session ended: {reason}");
    });

    // Frames arrive already encoded; the stream ends when the session drops
    // its sender.
    let body = stream! {
        while let Some(frame) = rx.recv().await {
            yield Ok::<_, Infallible>(frame);
        }
    };

    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "text/event-stream; charset=utf-8"),
            (header::CACHE_CONTROL, "no-cache, no-transform"),
            (header::CONNECTION, "keep-alive"),
            (HeaderName::from_static("x-accel-buffering"), "no"),
            (HeaderName::from_static("keep-alive"), "timeout=60"),
        ],
        Body::from_stream(body),
    )
        .into_response()
}

/// POST is not accepted on the event stream
#[utoipa::path(
    post,
    path = "/api/events",
    responses(
        (status = 405, description = "Method not allowed"),
    )
)]
pub async fn create() -> impl IntoResponse {
    (
        StatusCode::METHOD_NOT_ALLOWED,
        Json(json!({ "error": "Method not allowed" })),
    )
}
