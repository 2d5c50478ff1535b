use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use log::*;
use serde_json::Value;

use crate::controller::ApiResponse;
use crate::params::state::UpdateParams;
use crate::{AppState, Error};
use events::StateChange;

/// GET the current dashboard state
#[utoipa::path(
    get,
    path = "/api/state",
    responses(
        (status = 200, description = "Every set dashboard field, keyed by field name"),
    )
)]
pub async fn read(State(app_state): State<AppState>) -> Result<impl IntoResponse, Error> {
    let state = app_state.service_state.state_store_ref().current_state().await;
    debug!("GET dashboard state: {:?}", state.keys().collect::<Vec<_>>());

    Ok((StatusCode::OK, Json(ApiResponse::new(state))))
}

/// POST a partial dashboard update
///
/// Present fields are stored, then announced to every live display.
#[utoipa::path(
    post,
    path = "/api/state",
    request_body = UpdateParams,
    responses(
        (status = 200, description = "Successfully stored the given fields"),
        (status = 400, description = "Empty body or invalid JSON"),
        (status = 500, description = "The state file could not be written"),
    )
)]
pub async fn update(
    State(app_state): State<AppState>,
    body: String,
) -> Result<impl IntoResponse, Error> {
    if body.is_empty() {
        return Err(Error::EmptyBody);
    }

    let value: Value = serde_json::from_str(&body).map_err(|e| {
        warn!("Rejected dashboard update with invalid JSON: {e}");
        Error::InvalidJson(e.to_string())
    })?;

    // Anything but an object carries no fields, which makes the update a no-op.
    let params = match value {
        Value::Object(_) => serde_json::from_value::<UpdateParams>(value)
            .map_err(|e| Error::InvalidJson(e.to_string()))?,
        _ => UpdateParams::default(),
    };

    let entries = params.into_entries();
    debug!(
        "POST dashboard update for: {:?}",
        entries.iter().map(|(key, _)| key.field_name()).collect::<Vec<_>>()
    );

    let _update = app_state.update_lock.lock().await;
    app_state
        .service_state
        .state_store_ref()
        .set_many(entries.clone())
        .await?;

    for (key, value) in &entries {
        app_state
            .event_publisher
            .publish(StateChange::new(key.change_event(value)))
            .await;
    }

    Ok((StatusCode::OK, Json(ApiResponse::<()>::no_content())))
}
