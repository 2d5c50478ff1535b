//! Flat-file key/value store for the dashboard state.
//!
//! The whole state is one JSON object on disk, cached in memory. Every write
//! rewrites the file (temp file + rename) so a crash mid-write leaves the
//! previous snapshot intact. There are no other durability guarantees.

use crate::error::Error;
use events::StateEvent;
use log::*;
use serde_json::{Map, Value};
use std::path::PathBuf;
use tokio::fs;
use tokio::sync::RwLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StateKey {
    Bracket,
    CurrentBroadcast,
    CurrentDisplay,
    MapScores,
    TeamImages,
    SelectedTeamForDisplay,
    BanpickData,
}

impl StateKey {
    pub const ALL: [StateKey; 7] = [
        StateKey::Bracket,
        StateKey::CurrentBroadcast,
        StateKey::CurrentDisplay,
        StateKey::MapScores,
        StateKey::TeamImages,
        StateKey::SelectedTeamForDisplay,
        StateKey::BanpickData,
    ];

    /// Key inside the state file.
    pub fn as_str(&self) -> &'static str {
        match self {
            StateKey::Bracket => "dashboard:bracket",
            StateKey::CurrentBroadcast => "dashboard:currentBroadcast",
            StateKey::CurrentDisplay => "dashboard:currentDisplay",
            StateKey::MapScores => "dashboard:mapScores",
            StateKey::TeamImages => "dashboard:teamImages",
            StateKey::SelectedTeamForDisplay => "dashboard:selectedTeamForDisplay",
            StateKey::BanpickData => "dashboard:banpickData",
        }
    }

    /// Field name used by the HTTP API for this key.
    pub fn field_name(&self) -> &'static str {
        match self {
            StateKey::Bracket => "bracket",
            StateKey::CurrentBroadcast => "currentBroadcast",
            StateKey::CurrentDisplay => "currentDisplay",
            StateKey::MapScores => "mapScores",
            StateKey::TeamImages => "teamImages",
            StateKey::SelectedTeamForDisplay => "selectedTeamForDisplay",
            StateKey::BanpickData => "banpickData",
        }
    }

    /// The event announcing that this key now holds `value`.
    pub fn change_event(&self, value: &Value) -> StateEvent {
        match self {
            StateKey::Bracket => StateEvent::BracketUpdate {
                bracket: value.clone(),
            },
            StateKey::CurrentBroadcast => StateEvent::CurrentBroadcastUpdate {
                current_broadcast: value.clone(),
            },
            StateKey::CurrentDisplay => StateEvent::DisplayChange {
                display_id: display_string(value),
            },
            StateKey::MapScores => StateEvent::MapScoreUpdate {
                map_scores: value.clone(),
            },
            StateKey::TeamImages => StateEvent::TeamImagesUpdate {
                team_images: value.clone(),
            },
            StateKey::SelectedTeamForDisplay => StateEvent::SelectedTeamUpdate {
                selected_team_for_display: display_string(value),
            },
            StateKey::BanpickData => StateEvent::BanpickUpdate {
                banpick_data: value.clone(),
            },
        }
    }
}

/// Whether a stored value counts as set: null, false, 0 and "" do not.
pub fn is_present(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|n| n != 0.0).unwrap_or(true),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Render an id-like value as text: strings verbatim, anything else as JSON.
pub fn display_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// A stored broadcast whose `stage` is explicitly null means "nothing on air".
fn broadcast_is_cleared(value: &Value) -> bool {
    matches!(value.get("stage"), Some(Value::Null))
}

/// Strings holding JSON are stored as the parsed value; anything else as-is.
fn normalize(value: Value) -> Value {
    match value {
        Value::String(raw) => serde_json::from_str(&raw).unwrap_or(Value::String(raw)),
        other => other,
    }
}

pub struct StateStore {
    path: PathBuf,
    data: RwLock<Map<String, Value>>,
}

impl StateStore {
    /// Load the state file. A missing, unreadable or corrupt file yields an
    /// empty state; the next write replaces it.
    pub async fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let data = match fs::read_to_string(&path).await {
            Ok(raw) if raw.trim().is_empty() => Map::new(),
            Ok(raw) => match serde_json::from_str::<Value>(&raw) {
                Ok(Value::Object(map)) => map,
                Ok(_) => {
                    warn!("State file {} is not a JSON object, starting empty", path.display());
                    Map::new()
                }
                Err(e) => {
                    error!("Failed to parse state file {}: {e}", path.display());
                    Map::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("No state file at {}, starting empty", path.display());
                Map::new()
            }
            Err(e) => {
                error!("Failed to read state file {}: {e}", path.display());
                Map::new()
            }
        };

        Self {
            path,
            data: RwLock::new(data),
        }
    }

    pub async fn get(&self, key: StateKey) -> Option<Value> {
        self.data.read().await.get(key.as_str()).cloned()
    }

    pub async fn set(&self, key: StateKey, value: Value) -> Result<(), Error> {
        self.set_many(vec![(key, value)]).await
    }

    /// Store several keys with a single file write.
    ///
    /// The in-memory state only changes once the file write succeeded, so a
    /// failed write leaves readers seeing what is on disk.
    pub async fn set_many(&self, entries: Vec<(StateKey, Value)>) -> Result<(), Error> {
        let mut data = self.data.write().await;
        let mut updated = data.clone();
        for (key, value) in entries {
            updated.insert(key.as_str().to_string(), normalize(value));
        }
        self.persist(&updated).await?;
        *data = updated;
        Ok(())
    }

    async fn persist(&self, data: &Map<String, Value>) -> Result<(), Error> {
        if let Some(dir) = self.path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
            fs::create_dir_all(dir).await?;
        }

        let raw = serde_json::to_string_pretty(data)?;
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        fs::write(&tmp, raw).await?;
        fs::rename(&tmp, &self.path).await?;
        trace!("Persisted dashboard state to {}", self.path.display());
        Ok(())
    }

    /// Current state keyed by API field name, leaving out unset values and a
    /// cleared broadcast.
    pub async fn current_state(&self) -> Map<String, Value> {
        let data = self.data.read().await;
        let mut state = Map::new();
        for key in StateKey::ALL {
            let Some(value) = data.get(key.as_str()) else {
                continue;
            };
            if !is_present(value) {
                continue;
            }
            if key == StateKey::CurrentBroadcast && broadcast_is_cleared(value) {
                continue;
            }
            state.insert(key.field_name().to_string(), value.clone());
        }
        state
    }

    /// The current state as change events, for bringing a new display up to
    /// date. The display switch comes last so the screen it selects already
    /// has its data.
    pub async fn snapshot_events(&self) -> Vec<StateEvent> {
        let data = self.data.read().await;
        let mut snapshot = Vec::new();
        let ordered = StateKey::ALL
            .into_iter()
            .filter(|key| *key != StateKey::CurrentDisplay)
            .chain(std::iter::once(StateKey::CurrentDisplay));

        for key in ordered {
            let Some(value) = data.get(key.as_str()) else {
                continue;
            };
            if !is_present(value) {
                continue;
            }
            if key == StateKey::CurrentBroadcast && broadcast_is_cleared(value) {
                continue;
            }
            snapshot.push(key.change_event(value));
        }
        snapshot
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn missing_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::load(dir.path().join("var/state.json")).await;
        assert!(store.get(StateKey::Bracket).await.is_none());
        assert!(store.current_state().await.is_empty());
        assert!(store.snapshot_events().await.is_empty());
    }

    #[tokio::test]
    async fn corrupt_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        std::fs::write(&path, "{not json").unwrap();
        let store = StateStore::load(&path).await;
        assert!(store.current_state().await.is_empty());
    }

    #[tokio::test]
    async fn writes_are_persisted_and_reloaded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/var/state.json");

        let store = StateStore::load(&path).await;
        store
            .set_many(vec![
                (StateKey::Bracket, json!({"rounds": [1, 2]})),
                (StateKey::CurrentDisplay, json!("bracket")),
            ])
            .await
            .unwrap();

        let on_disk: Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(on_disk["dashboard:bracket"], json!({"rounds": [1, 2]}));
        assert_eq!(on_disk["dashboard:currentDisplay"], json!("bracket"));

        let reloaded = StateStore::load(&path).await;
        assert_eq!(
            reloaded.get(StateKey::CurrentDisplay).await,
            Some(json!("bracket"))
        );
    }

    #[tokio::test]
    async fn failed_write_leaves_memory_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let data_dir = dir.path().join("data");
        let path = data_dir.join("state.json");

        let store = StateStore::load(&path).await;
        store
            .set(StateKey::CurrentDisplay, json!("bracket"))
            .await
            .unwrap();

        // Swap the state directory for a plain file so the next write fails.
        std::fs::remove_dir_all(&data_dir).unwrap();
        std::fs::write(&data_dir, "not a directory").unwrap();

        let result = store
            .set_many(vec![
                (StateKey::CurrentDisplay, json!("scores")),
                (StateKey::Bracket, json!({"rounds": [1]})),
            ])
            .await;
        assert!(result.is_err());

        assert_eq!(
            store.get(StateKey::CurrentDisplay).await,
            Some(json!("bracket"))
        );
        assert!(store.get(StateKey::Bracket).await.is_none());
        assert_eq!(
            Value::Object(store.current_state().await),
            json!({"currentDisplay": "bracket"})
        );
    }

    #[tokio::test]
    async fn write_under_a_file_fails_without_storing() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, "").unwrap();

        let store = StateStore::load(blocker.join("state.json")).await;
        assert!(store.get(StateKey::CurrentDisplay).await.is_none());

        let result = store.set(StateKey::CurrentDisplay, json!("bracket")).await;
        assert!(result.is_err());
        assert!(store.get(StateKey::CurrentDisplay).await.is_none());
        assert!(store.current_state().await.is_empty());
    }

    #[tokio::test]
    async fn json_strings_are_stored_parsed() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::load(dir.path().join("state.json")).await;

        store
            .set(StateKey::MapScores, json!("[{\"map\":\"Dust\",\"score\":[1,0]}]"))
            .await
            .unwrap();
        store.set(StateKey::CurrentDisplay, json!("welcome")).await.unwrap();

        assert_eq!(
            store.get(StateKey::MapScores).await,
            Some(json!([{"map": "Dust", "score": [1, 0]}]))
        );
        assert_eq!(store.get(StateKey::CurrentDisplay).await, Some(json!("welcome")));
    }

    #[tokio::test]
    async fn current_state_skips_unset_values_and_cleared_broadcast() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::load(dir.path().join("state.json")).await;
        store
            .set_many(vec![
                (StateKey::Bracket, Value::Null),
                (StateKey::CurrentBroadcast, json!({"stage": null, "match": 2})),
                (StateKey::TeamImages, json!({"1": "a.png"})),
                (StateKey::SelectedTeamForDisplay, json!("")),
            ])
            .await
            .unwrap();

        let state = store.current_state().await;
        assert_eq!(state.len(), 1);
        assert_eq!(state["teamImages"], json!({"1": "a.png"}));

        store
            .set(StateKey::CurrentBroadcast, json!({"stage": "semi", "match": 2}))
            .await
            .unwrap();
        assert!(store.current_state().await.contains_key("currentBroadcast"));
    }

    #[tokio::test]
    async fn snapshot_puts_display_change_last() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::load(dir.path().join("state.json")).await;
        store
            .set_many(vec![
                (StateKey::CurrentDisplay, json!("map-score")),
                (StateKey::MapScores, json!([1])),
                (StateKey::SelectedTeamForDisplay, json!(3)),
            ])
            .await
            .unwrap();

        let snapshot = store.snapshot_events().await;
        assert_eq!(
            snapshot,
            vec![
                StateEvent::MapScoreUpdate { map_scores: json!([1]) },
                StateEvent::SelectedTeamUpdate {
                    selected_team_for_display: "3".into()
                },
                StateEvent::DisplayChange {
                    display_id: "map-score".into()
                },
            ]
        );
    }

    #[test]
    fn presence_follows_truthiness() {
        assert!(!is_present(&Value::Null));
        assert!(!is_present(&json!(false)));
        assert!(!is_present(&json!(0)));
        assert!(!is_present(&json!("")));
        assert!(is_present(&json!("welcome")));
        assert!(is_present(&json!([])));
        assert!(is_present(&json!({})));
    }

    #[test]
    fn display_string_keeps_strings_and_stringifies_the_rest() {
        assert_eq!(display_string(&json!("banpick")), "banpick");
        assert_eq!(display_string(&json!(2)), "2");
        assert_eq!(display_string(&Value::Null), "null");
    }
}
