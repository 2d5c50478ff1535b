use serde::Deserialize;
use utoipa::IntoParams;

/// `GET /api/events?lastEventId=N`, the fallback for clients that cannot set
/// the `Last-Event-ID` header on their first connection.
#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub(crate) struct IndexParams {
    #[serde(rename = "lastEventId")]
    pub(crate) last_event_id: Option<String>,
}
