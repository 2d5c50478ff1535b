//! Event system infrastructure for the broadcast control panel.
//!
//! This crate provides the event system that decouples the state-mutation
//! endpoints from infrastructure concerns (like pushing updates to on-air
//! displays over SSE).
//!
//! # Architecture
//!
//! - **StateEvent**: Closed enum of every state change the dashboard can make
//! - **StateChange**: A `StateEvent` plus an optional producer-supplied timestamp
//! - **EventHandler**: Trait for implementing event handlers
//! - **EventPublisher**: Publishes events to registered handlers
//!
//! This crate has no dependencies on internal crates, so both the `service`
//! and `sse` layers can depend on it. Free-form dashboard data (brackets,
//! scores, images) is carried as `serde_json::Value`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

/// State changes that the dashboard broadcasts to every on-air display.
///
/// Serialized adjacently tagged so the wire shape is
/// `{"type": "bracket-update", "data": {"bracket": ...}}`, which is what the
/// display pages switch on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "kebab-case")]
pub enum StateEvent {
    /// The operator switched which screen the display shows (welcome, bracket, banpick...).
    DisplayChange {
        #[serde(rename = "displayId")]
        display_id: String,
    },
    /// The whole bracket tree was replaced.
    BracketUpdate { bracket: Value },
    /// Map picks and per-map scores changed.
    MapScoreUpdate {
        #[serde(rename = "mapScores")]
        map_scores: Value,
    },
    /// Team logo/photo assignments changed.
    TeamImagesUpdate {
        #[serde(rename = "teamImages")]
        team_images: Value,
    },
    /// The team highlighted on the team-image screen changed.
    SelectedTeamUpdate {
        #[serde(rename = "selectedTeamForDisplay")]
        selected_team_for_display: String,
    },
    /// Ban/pick choices changed.
    BanpickUpdate {
        #[serde(rename = "banpickData")]
        banpick_data: Value,
    },
    /// The match currently on air changed (used for bracket highlighting).
    CurrentBroadcastUpdate {
        #[serde(rename = "currentBroadcast")]
        current_broadcast: Value,
    },
    /// Free-form operator message; the body is passed through untouched.
    CustomMessage(Value),
}

impl StateEvent {
    /// The `type` discriminator as it appears on the wire.
    pub fn kind(&self) -> &'static str {
        match self {
            StateEvent::DisplayChange { .. } => "display-change",
            StateEvent::BracketUpdate { .. } => "bracket-update",
            StateEvent::MapScoreUpdate { .. } => "map-score-update",
            StateEvent::TeamImagesUpdate { .. } => "team-images-update",
            StateEvent::SelectedTeamUpdate { .. } => "selected-team-update",
            StateEvent::BanpickUpdate { .. } => "banpick-update",
            StateEvent::CurrentBroadcastUpdate { .. } => "current-broadcast-update",
            StateEvent::CustomMessage(_) => "custom-message",
        }
    }
}

/// A state event as handed to the publisher.
#[derive(Debug, Clone, PartialEq)]
pub struct StateChange {
    pub event: StateEvent,
    /// Milliseconds since the Unix epoch. `None` lets the bus stamp it.
    pub timestamp: Option<i64>,
}

impl StateChange {
    pub fn new(event: StateEvent) -> Self {
        Self {
            event,
            timestamp: None,
        }
    }

    pub fn at(event: StateEvent, timestamp: Option<i64>) -> Self {
        Self { event, timestamp }
    }
}

impl From<StateEvent> for StateChange {
    fn from(event: StateEvent) -> Self {
        Self::new(event)
    }
}

/// Trait for handling state changes.
/// Implementations perform side effects like pushing to live displays.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, change: &StateChange);
}

/// Publishes state changes to registered handlers.
/// Handlers are called sequentially in registration order.
#[derive(Clone)]
pub struct EventPublisher {
    handlers: Arc<Vec<Arc<dyn EventHandler>>>,
}

impl EventPublisher {
    pub fn new() -> Self {
        Self {
            handlers: Arc::new(Vec::new()),
        }
    }

    /// Register a new event handler.
    /// Note: This creates a new publisher instance with the additional handler.
    /// Store the returned publisher in your application state.
    pub fn with_handler(mut self, handler: Arc<dyn EventHandler>) -> Self {
        let mut handlers = (*self.handlers).clone();
        handlers.push(handler);
        self.handlers = Arc::new(handlers);
        self
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }

    /// Publish a change to all registered handlers.
    /// Publishing is best-effort: handlers own their failures and nothing is
    /// reported back to the caller.
    pub async fn publish(&self, change: impl Into<StateChange>) {
        let change = change.into();
        for handler in self.handlers.iter() {
            handler.handle(&change).await;
        }
    }
}

impl Default for EventPublisher {
    fn default() -> Self {
        Self::new()
    }
}
