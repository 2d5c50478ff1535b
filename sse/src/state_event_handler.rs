use crate::Bus;
use async_trait::async_trait;
use events::{EventHandler, StateChange, StateEvent};
use log::*;
use std::sync::Arc;

/// Handles dashboard state changes by publishing them onto the SSE bus.
///
/// The bus stamps each change with the next sequence id (and the current time
/// when the producer gave none), stores it for replay, and fans it out to
/// every connected display.
pub struct SseStateEventHandler {
    bus: Arc<Bus<StateEvent>>,
}

impl SseStateEventHandler {
    pub fn new(bus: Arc<Bus<StateEvent>>) -> Self {
        Self { bus }
    }
}

#[async_trait]
impl EventHandler for SseStateEventHandler {
    async fn handle(&self, change: &StateChange) {
        let kind = change.event.kind();
        let report = self.bus.publish(change.event.clone(), change.timestamp);

        debug!(
            "Broadcast {} as event {} to {} display(s)",
            kind, report.id, report.delivered
        );
        if report.failed > 0 {
            warn!(
                "Event {} ({}) could not be delivered to {} display(s)",
                report.id, kind, report.failed
            );
        }
    }
}
