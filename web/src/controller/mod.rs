use serde::Serialize;
pub(crate) mod broadcast_controller;
pub(crate) mod event_stream_controller;
pub(crate) mod health_check_controller;
pub(crate) mod state_controller;

/// Success envelope used by the state endpoints: `{"ok": true, "data": ...}`.
#[derive(Debug, Serialize)]
struct ApiResponse<T: Serialize> {
    ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn new(data: T) -> Self {
        Self {
            ok: true,
            data: Some(data),
        }
    }

    pub fn no_content() -> ApiResponse<()> {
        ApiResponse { ok: true, data: None }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_serialize_api_response_with_some() {
        let response = ApiResponse::new(json!({"currentDisplay": "bracket"}));
        let serialized = serde_json::to_string(&response).unwrap();

        // Serializing and then deserializing because the string output from serde_json::to_string is
        // non-deterministic as far as the order of the JSON keys. This ensures the test won't be flaky
        let deserialized_value: serde_json::Value = serde_json::from_str(&serialized).unwrap();
        let deserialized_expected_value: serde_json::Value =
            json!({"ok": true, "data": {"currentDisplay": "bracket"}});
        assert_eq!(deserialized_value, deserialized_expected_value);
    }

    #[tokio::test]
    async fn test_serialize_api_response_with_none() {
        let response = ApiResponse::<()>::no_content();
        // No need to deserialize here because there's only one key
        let serialized = serde_json::to_string(&response).unwrap();
        assert_eq!(serialized, json!({"ok": true}).to_string());
    }
}
