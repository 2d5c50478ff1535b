use crate::event::Event;
use dashmap::DashMap;
use log::*;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;

/// Unique identifier for a registered sink (server-generated)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubscriberId(String);

impl SubscriberId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

impl Default for SubscriberId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Why a sink refused an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkError {
    /// The receiving side (usually a streaming session) has gone away.
    Disconnected,
    /// The sink panicked while handling the event.
    Panicked,
    Other(String),
}

impl fmt::Display for SinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SinkError::Disconnected => write!(f, "sink disconnected"),
            SinkError::Panicked => write!(f, "sink panicked"),
            SinkError::Other(reason) => write!(f, "sink failed: {reason}"),
        }
    }
}

impl std::error::Error for SinkError {}

/// Receives every event published while it is registered.
///
/// Sinks are invoked synchronously from inside `Bus::publish`, so they must
/// return quickly and must not call back into the bus.
pub trait Sink<P>: Send + Sync {
    fn deliver(&self, event: &Arc<Event<P>>) -> Result<(), SinkError>;
}

impl<P, F> Sink<P> for F
where
    F: Fn(&Arc<Event<P>>) -> Result<(), SinkError> + Send + Sync,
{
    fn deliver(&self, event: &Arc<Event<P>>) -> Result<(), SinkError> {
        self(event)
    }
}

/// Sink that forwards events into a session's unbounded queue.
pub struct ChannelSink<P> {
    sender: UnboundedSender<Arc<Event<P>>>,
}

impl<P> ChannelSink<P> {
    pub fn new(sender: UnboundedSender<Arc<Event<P>>>) -> Self {
        Self { sender }
    }
}

impl<P: Send + Sync> Sink<P> for ChannelSink<P> {
    fn deliver(&self, event: &Arc<Event<P>>) -> Result<(), SinkError> {
        self.sender
            .send(Arc::clone(event))
            .map_err(|_| SinkError::Disconnected)
    }
}

/// Outcome of fanning one event out to every registered sink.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Delivery {
    pub delivered: usize,
    pub failed: usize,
}

/// Set of active sinks, one per connected viewer.
pub struct SubscriberRegistry<P> {
    sinks: DashMap<SubscriberId, Box<dyn Sink<P>>>,
}

impl<P> SubscriberRegistry<P> {
    pub fn new() -> Self {
        Self {
            sinks: DashMap::new(),
        }
    }

    /// Register a sink and return its id - O(1)
    pub fn register(&self, sink: Box<dyn Sink<P>>) -> SubscriberId {
        let subscriber_id = SubscriberId::new();
        self.sinks.insert(subscriber_id.clone(), sink);
        subscriber_id
    }

    /// Remove a sink - O(1). Returns whether it was still registered.
    ///
    /// Blocks while a fan-out is invoking sinks in the same shard, so once this
    /// returns the sink is never called again.
    pub fn unregister(&self, subscriber_id: &SubscriberId) -> bool {
        self.sinks.remove(subscriber_id).is_some()
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }

    /// Deliver an event to all sinks - O(n).
    ///
    /// A failing or panicking sink is logged and counted; the remaining sinks
    /// still receive the event. Iteration order is unspecified.
    pub fn broadcast(&self, event: &Arc<Event<P>>) -> Delivery {
        let mut delivery = Delivery::default();

        for entry in self.sinks.iter() {
            let result = catch_unwind(AssertUnwindSafe(|| entry.value().deliver(event)))
                .unwrap_or(Err(SinkError::Panicked));

            match result {
                Ok(()) => delivery.delivered += 1,
                Err(e) => {
                    warn!(
                        "Failed to deliver event {} to subscriber {}: {}",
                        event.id(),
                        entry.key(),
                        e
                    );
                    delivery.failed += 1;
                }
            }
        }

        delivery
    }
}

impl<P> Default for SubscriberRegistry<P> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::mpsc;

    fn event(id: u64) -> Arc<Event<&'static str>> {
        Arc::new(Event::new(id, 0, "x"))
    }

    #[test]
    fn subscriber_ids_are_unique() {
        assert_ne!(SubscriberId::new(), SubscriberId::new());
    }

    #[test]
    fn unregister_is_idempotent() {
        let registry = SubscriberRegistry::<&'static str>::new();
        let id = registry.register(Box::new(|_: &Arc<Event<&'static str>>| -> Result<(), SinkError> {
            Ok(())
        }));
        assert_eq!(registry.len(), 1);
        assert!(registry.unregister(&id));
        assert!(!registry.unregister(&id));
        assert!(registry.is_empty());
    }

    #[test]
    fn failing_and_panicking_sinks_are_isolated() {
        let registry = SubscriberRegistry::<&'static str>::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();

        registry.register(Box::new(|_: &Arc<Event<&'static str>>| -> Result<(), SinkError> {
            Err(SinkError::Other("boom".into()))
        }));
        registry.register(Box::new(|_: &Arc<Event<&'static str>>| -> Result<(), SinkError> {
            panic!("sink blew up")
        }));
        registry.register(Box::new(move |_: &Arc<Event<&'static str>>| -> Result<(), SinkError> {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }));

        let delivery = registry.broadcast(&event(1));
        assert_eq!(delivery, Delivery { delivered: 1, failed: 2 });
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn channel_sink_reports_dropped_receiver() {
        let (tx, rx) = mpsc::unbounded_channel();
        let sink = ChannelSink::new(tx);
        assert_eq!(sink.deliver(&event(1)), Ok(()));
        drop(rx);
        assert_eq!(sink.deliver(&event(2)), Err(SinkError::Disconnected));
    }
}
