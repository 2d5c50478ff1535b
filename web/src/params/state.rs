use serde::{Deserialize, Deserializer};
use serde_json::Value;
use service::state_store::StateKey;
use utoipa::ToSchema;

/// Body of `POST /api/state`. Every field is optional; a field that is
/// present (even as `null`) is written, an absent one is left alone.
#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub(crate) struct UpdateParams {
    #[serde(default, deserialize_with = "present")]
    #[schema(value_type = Option<Object>)]
    pub(crate) bracket: Option<Value>,
    #[serde(default, deserialize_with = "present")]
    #[schema(value_type = Option<Object>)]
    pub(crate) current_broadcast: Option<Value>,
    #[serde(default, deserialize_with = "present")]
    #[schema(value_type = Option<String>)]
    pub(crate) current_display: Option<Value>,
    #[serde(default, deserialize_with = "present")]
    #[schema(value_type = Option<Object>)]
    pub(crate) map_scores: Option<Value>,
    #[serde(default, deserialize_with = "present")]
    #[schema(value_type = Option<Object>)]
    pub(crate) team_images: Option<Value>,
    #[serde(default, deserialize_with = "present")]
    #[schema(value_type = Option<String>)]
    pub(crate) selected_team_for_display: Option<Value>,
    #[serde(default, deserialize_with = "present")]
    #[schema(value_type = Option<Object>)]
    pub(crate) banpick_data: Option<Value>,
}

/// Distinguishes `"field": null` (Some(Null)) from a missing field (None).
fn present<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

impl UpdateParams {
    /// Present fields paired with their storage key, in storage key order.
    pub(crate) fn into_entries(self) -> Vec<(StateKey, Value)> {
        [
            (StateKey::Bracket, self.bracket),
            (StateKey::CurrentBroadcast, self.current_broadcast),
            (StateKey::CurrentDisplay, self.current_display),
            (StateKey::MapScores, self.map_scores),
            (StateKey::TeamImages, self.team_images),
            (StateKey::SelectedTeamForDisplay, self.selected_team_for_display),
            (StateKey::BanpickData, self.banpick_data),
        ]
        .into_iter()
        .filter_map(|(key, value)| value.map(|value| (key, value)))
        .collect()
    }
}
