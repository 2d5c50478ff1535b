use crate::event::{now_millis, Event, EventId};
use crate::registry::{Delivery, Sink, SubscriberId, SubscriberRegistry};
use crate::ring_buffer::RingBuffer;
use log::*;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

/// Default number of events kept for replay.
pub const DEFAULT_REPLAY_CAPACITY: usize = 200;

struct BusState<P> {
    next_id: EventId,
    history: RingBuffer<P>,
}

impl<P> BusState<P> {
    fn last_assigned(&self) -> EventId {
        self.next_id - 1
    }

    fn resume_point(&self, last_seen: Option<EventId>) -> Option<EventId> {
        match last_seen {
            Some(id) if id > self.last_assigned() => {
                debug!(
                    "Ignoring last-seen id {id} above the last assigned id {}, replaying from the start",
                    self.last_assigned()
                );
                None
            }
            other => other,
        }
    }
}

/// Result of [`Bus::attach`].
pub struct Attachment<P> {
    /// The last-seen id the replay was computed from.
    pub last_seen: Option<EventId>,
    pub replay: Vec<Arc<Event<P>>>,
    pub subscription: Subscription<P>,
}

/// In-memory publish/subscribe hub for one process.
///
/// The bus is the only assigner of event ids. `publish`, `subscribe`,
/// `attach` and unsubscribe are serialized by a single lock, so ids never
/// interleave and each subscriber sees events in id order. Share one instance
/// behind an `Arc`.
pub struct Bus<P> {
    state: Mutex<BusState<P>>,
    registry: Arc<SubscriberRegistry<P>>,
}

/// What happened to one published event. Publishing never fails; this is
/// returned purely for observability.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PublishReport {
    pub id: EventId,
    pub timestamp: i64,
    pub delivered: usize,
    pub failed: usize,
}

impl<P: Send + Sync + 'static> Bus<P> {
    pub fn new(replay_capacity: usize) -> Self {
        Self {
            state: Mutex::new(BusState {
                next_id: 1,
                history: RingBuffer::new(replay_capacity),
            }),
            registry: Arc::new(SubscriberRegistry::new()),
        }
    }

    // Bus state is never left half-updated by a panic (sink panics are
    // caught), so a poisoned lock is still consistent.
    fn lock(&self) -> MutexGuard<'_, BusState<P>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Stamp, store and fan out a payload.
    ///
    /// `timestamp` is milliseconds since the epoch; `None` uses the current
    /// time. Sink failures are isolated and only show up in the report.
    pub fn publish(&self, payload: P, timestamp: Option<i64>) -> PublishReport {
        let timestamp = timestamp.unwrap_or_else(now_millis);

        let mut state = self.lock();
        let id = state.next_id;
        state.next_id += 1;

        let event = Arc::new(Event::new(id, timestamp, payload));
        state.history.append(Arc::clone(&event));

        // Fan out while still holding the lock so concurrent publishers
        // cannot reorder ids for any single subscriber.
        let Delivery { delivered, failed } = self.registry.broadcast(&event);
        drop(state);

        trace!("Published event {id} to {delivered} subscriber(s), {failed} failed");

        PublishReport {
            id,
            timestamp,
            delivered,
            failed,
        }
    }

    /// Register a sink for every event published from now on.
    pub fn subscribe(&self, sink: impl Sink<P> + 'static) -> Subscription<P> {
        let _state = self.lock();
        self.register(Box::new(sink))
    }

    /// Replay everything after `last_seen` and register `sink` atomically.
    ///
    /// No event can be published between the replay snapshot and the
    /// registration, so the replayed ids are all lower than anything the sink
    /// will receive live and nothing is delivered twice.
    ///
    /// A `last_seen` above the highest id this bus ever assigned came from an
    /// earlier process and is treated as absent. The returned
    /// [`Attachment::last_seen`] is the value actually used.
    pub fn attach(
        &self,
        last_seen: Option<EventId>,
        sink: impl Sink<P> + 'static,
    ) -> Attachment<P> {
        let state = self.lock();
        let last_seen = state.resume_point(last_seen);
        let replay = state.history.since(last_seen);
        let subscription = self.register(Box::new(sink));
        drop(state);

        Attachment {
            last_seen,
            replay,
            subscription,
        }
    }

    fn register(&self, sink: Box<dyn Sink<P>>) -> Subscription<P> {
        let subscriber_id = self.registry.register(sink);
        debug!("Registered subscriber {subscriber_id}");
        Subscription {
            subscriber_id,
            registry: Arc::downgrade(&self.registry),
            active: AtomicBool::new(true),
        }
    }

    /// Buffered events newer than `last_id`; `None` returns the whole buffer.
    pub fn since(&self, last_id: Option<EventId>) -> Vec<Arc<Event<P>>> {
        self.lock().history.since(last_id)
    }

    /// Like [`Bus::since`] but for untrusted client input such as a
    /// `Last-Event-ID` header. Malformed input means a full replay.
    pub fn since_raw(&self, last_id: Option<&str>) -> Vec<Arc<Event<P>>> {
        self.since(last_id.and_then(parse_last_event_id))
    }

    /// Highest id still in the replay buffer, or 0 when it is empty.
    pub fn last_id(&self) -> EventId {
        self.lock().history.last_id()
    }

    pub fn subscriber_count(&self) -> usize {
        self.registry.len()
    }

    pub fn replay_capacity(&self) -> usize {
        self.lock().history.capacity()
    }
}

/// Parse a client-supplied last-seen id.
///
/// Returns `None` (meaning "replay everything") for anything that is not a
/// finite, non-negative number that fits an [`EventId`]. Fractions are floored.
pub fn parse_last_event_id(raw: &str) -> Option<EventId> {
    // 2^64, the first float that no longer fits.
    const ID_LIMIT: f64 = 18_446_744_073_709_551_616.0;

    let raw = raw.trim();
    if let Ok(id) = raw.parse::<EventId>() {
        return Some(id);
    }

    match raw.parse::<f64>() {
        Ok(value) if value.is_finite() && value >= 0.0 && value < ID_LIMIT => {
            Some(value.floor() as EventId)
        }
        _ => None,
    }
}

/// Handle that removes exactly one sink from the bus.
///
/// Unsubscribing is idempotent, and dropping the handle unsubscribes too.
pub struct Subscription<P> {
    subscriber_id: SubscriberId,
    registry: Weak<SubscriberRegistry<P>>,
    active: AtomicBool,
}

impl<P> Subscription<P> {
    pub fn id(&self) -> &SubscriberId {
        &self.subscriber_id
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    pub fn unsubscribe(&self) {
        if !self.active.swap(false, Ordering::AcqRel) {
            return;
        }

        if let Some(registry) = self.registry.upgrade() {
            registry.unregister(&self.subscriber_id);
            debug!("Unregistered subscriber {}", self.subscriber_id);
        }
    }
}

impl<P> Drop for Subscription<P> {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::SinkError;
    use std::collections::HashSet;
    use std::thread;

    type Received = Arc<Mutex<Vec<EventId>>>;

    fn recording_sink(received: &Received) -> impl Sink<u32> + 'static {
        let received = Arc::clone(received);
        move |event: &Arc<Event<u32>>| -> Result<(), SinkError> {
            received.lock().unwrap().push(event.id());
            Ok(())
        }
    }

    fn ids(events: &[Arc<Event<u32>>]) -> Vec<EventId> {
        events.iter().map(|event| event.id()).collect()
    }

    #[test]
    fn ids_start_at_one_and_increase_by_one() {
        let bus = Bus::new(10);
        let reports: Vec<_> = (0..4).map(|n| bus.publish(n, None)).collect();
        assert_eq!(
            reports.iter().map(|r| r.id).collect::<Vec<_>>(),
            vec![1, 2, 3, 4]
        );
        assert_eq!(bus.last_id(), 4);
    }

    #[test]
    fn ids_are_unique_across_concurrent_publishers() {
        let bus = Arc::new(Bus::new(1_000));
        let received: Received = Arc::default();
        let _subscription = bus.subscribe(recording_sink(&received));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let bus = Arc::clone(&bus);
                thread::spawn(move || (0..100).map(|n| bus.publish(n, None).id).collect::<Vec<_>>())
            })
            .collect();

        let mut all = HashSet::new();
        for handle in handles {
            let ids = handle.join().unwrap();
            // Ids seen by a single publisher are strictly increasing.
            assert!(ids.windows(2).all(|pair| pair[0] < pair[1]));
            all.extend(ids);
        }
        assert_eq!(all.len(), 800);
        assert_eq!(all.iter().max(), Some(&800));

        // The subscriber saw every event exactly once, in id order.
        let received = received.lock().unwrap();
        assert_eq!(*received, (1..=800).collect::<Vec<_>>());
    }

    #[test]
    fn caller_timestamp_is_kept_and_missing_one_is_stamped() {
        let bus = Bus::new(10);
        let stamped = bus.publish(1, Some(1234));
        assert_eq!(stamped.timestamp, 1234);

        let before = now_millis();
        let fresh = bus.publish(2, None);
        assert!(fresh.timestamp >= before);
        assert_eq!(bus.since(Some(1))[0].timestamp(), fresh.timestamp);
    }

    #[test]
    fn buffer_holds_only_the_most_recent_events() {
        let bus = Bus::new(3);
        for n in 1..=5 {
            bus.publish(n, None);
        }

        assert_eq!(ids(&bus.since(None)), vec![3, 4, 5]);
        assert_eq!(ids(&bus.since(Some(2))), vec![3, 4, 5]);
        assert_eq!(ids(&bus.since(Some(4))), vec![5]);
        assert!(bus.since(Some(99)).is_empty());
        assert_eq!(ids(&bus.since_raw(None)), vec![3, 4, 5]);
    }

    #[test]
    fn malformed_last_event_id_replays_everything() {
        let bus = Bus::new(3);
        for n in 1..=5 {
            bus.publish(n, None);
        }

        assert_eq!(ids(&bus.since_raw(Some("banana"))), vec![3, 4, 5]);
        assert_eq!(ids(&bus.since_raw(Some("-1"))), vec![3, 4, 5]);
        assert_eq!(ids(&bus.since_raw(Some(""))), vec![3, 4, 5]);
        assert_eq!(ids(&bus.since_raw(Some(" 4 "))), vec![5]);
        assert_eq!(ids(&bus.since_raw(Some("3.7"))), vec![4, 5]);
    }

    #[test]
    fn parse_last_event_id_edge_cases() {
        assert_eq!(parse_last_event_id("42"), Some(42));
        assert_eq!(parse_last_event_id("0"), Some(0));
        assert_eq!(parse_last_event_id("2.9"), Some(2));
        assert_eq!(parse_last_event_id("-3"), None);
        assert_eq!(parse_last_event_id("NaN"), None);
        assert_eq!(parse_last_event_id("inf"), None);
        assert_eq!(parse_last_event_id("12abc"), None);
        assert_eq!(parse_last_event_id("1e3"), Some(1000));
        assert_eq!(parse_last_event_id("1e30"), None);
        assert_eq!(parse_last_event_id("99999999999999999999"), None);
    }

    #[test]
    fn subscriber_receives_until_it_unsubscribes() {
        let bus = Bus::new(10);
        let received: Received = Arc::default();
        let subscription = bus.subscribe(recording_sink(&received));
        assert_eq!(bus.subscriber_count(), 1);

        for n in 0..3 {
            bus.publish(n, None);
        }
        assert_eq!(*received.lock().unwrap(), vec![1, 2, 3]);

        subscription.unsubscribe();
        assert!(!subscription.is_active());
        assert_eq!(bus.subscriber_count(), 0);

        let report = bus.publish(3, None);
        assert_eq!(report.delivered, 0);
        assert_eq!(received.lock().unwrap().len(), 3);
    }

    #[test]
    fn unsubscribing_twice_leaves_other_subscribers_alone() {
        let bus = Bus::new(10);
        let first: Received = Arc::default();
        let second: Received = Arc::default();
        let s1 = bus.subscribe(recording_sink(&first));
        let _s2 = bus.subscribe(recording_sink(&second));

        s1.unsubscribe();
        s1.unsubscribe();
        assert_eq!(bus.subscriber_count(), 1);

        bus.publish(7, None);
        assert!(first.lock().unwrap().is_empty());
        assert_eq!(*second.lock().unwrap(), vec![1]);
    }

    #[test]
    fn dropping_the_subscription_unsubscribes() {
        let bus = Bus::new(10);
        let received: Received = Arc::default();
        {
            let _subscription = bus.subscribe(recording_sink(&received));
            assert_eq!(bus.subscriber_count(), 1);
        }
        assert_eq!(bus.subscriber_count(), 0);
        bus.publish(1, None);
        assert!(received.lock().unwrap().is_empty());
    }

    #[test]
    fn failing_sink_does_not_block_other_subscribers() {
        let bus = Bus::new(10);
        let healthy: Received = Arc::default();
        let _broken = bus.subscribe(|_: &Arc<Event<u32>>| -> Result<(), SinkError> {
            Err(SinkError::Other("nope".into()))
        });
        let _panicky = bus.subscribe(|_: &Arc<Event<u32>>| -> Result<(), SinkError> {
            panic!("sink exploded")
        });
        let _healthy = bus.subscribe(recording_sink(&healthy));

        let report = bus.publish(1, None);
        assert_eq!(report.delivered, 1);
        assert_eq!(report.failed, 2);
        assert_eq!(*healthy.lock().unwrap(), vec![1]);

        // The bus is still usable after a sink panicked mid fan-out.
        let report = bus.publish(2, None);
        assert_eq!(report.id, 2);
        assert_eq!(*healthy.lock().unwrap(), vec![1, 2]);
    }

    #[test]
    fn attach_replays_then_delivers_live_without_gaps() {
        let bus = Bus::new(10);
        for n in 1..=4 {
            bus.publish(n, None);
        }

        let received: Received = Arc::default();
        let attachment = bus.attach(Some(2), recording_sink(&received));
        assert_eq!(attachment.last_seen, Some(2));
        assert_eq!(ids(&attachment.replay), vec![3, 4]);

        bus.publish(5, None);
        assert_eq!(*received.lock().unwrap(), vec![5]);
    }

    #[test]
    fn attach_with_id_from_a_previous_process_replays_everything() {
        let bus = Bus::new(10);
        for n in 1..=2 {
            bus.publish(n, None);
        }

        let received: Received = Arc::default();
        let attachment = bus.attach(Some(150), recording_sink(&received));
        assert_eq!(attachment.last_seen, None);
        assert_eq!(ids(&attachment.replay), vec![1, 2]);

        bus.publish(3, None);
        assert_eq!(*received.lock().unwrap(), vec![3]);
    }

    #[test]
    fn attach_checks_stale_ids_against_assigned_ids_not_the_buffer() {
        // Nothing is buffered, but ids 1..=3 were handed out.
        let bus = Bus::new(0);
        for n in 1..=3 {
            bus.publish(n, None);
        }
        assert_eq!(bus.last_id(), 0);

        let received: Received = Arc::default();
        let current = bus.attach(Some(3), recording_sink(&received));
        assert_eq!(current.last_seen, Some(3));
        assert!(current.replay.is_empty());

        let stale = bus.attach(Some(4), recording_sink(&received));
        assert_eq!(stale.last_seen, None);
    }

    #[test]
    fn subscription_outliving_the_bus_is_harmless() {
        let bus = Bus::new(1);
        let subscription = bus.subscribe(|_: &Arc<Event<u32>>| -> Result<(), SinkError> { Ok(()) });
        drop(bus);
        subscription.unsubscribe();
        assert!(!subscription.is_active());
    }
}
