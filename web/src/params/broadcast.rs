use serde::Deserialize;
use serde_json::Value;
use utoipa::IntoParams;

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub(crate) struct IndexParams {
    pub(crate) action: Option<String>,
}

/// The only action `POST /api/broadcast` accepts.
pub(crate) const BROADCAST_ACTION: &str = "broadcast";

/// Reads a caller-supplied timestamp (epoch milliseconds). Fractions are
/// truncated; anything that is not a finite number is ignored.
pub(crate) fn timestamp_of(body: &Value) -> Option<i64> {
    let timestamp = body.get("timestamp")?;
    timestamp.as_i64().or_else(|| {
        timestamp
            .as_f64()
            .filter(|millis| millis.is_finite())
            .map(|millis| millis as i64)
    })
}
