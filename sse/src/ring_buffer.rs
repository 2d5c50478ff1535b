use crate::event::{Event, EventId};
use std::collections::VecDeque;
use std::sync::Arc;

/// Fixed-capacity history of the most recently published events.
///
/// Events are kept in ascending id order and the oldest are dropped silently
/// once `capacity` is exceeded. This is a best-effort replay aid for
/// reconnecting viewers, not a durable log.
///
/// Not synchronized; [`crate::Bus`] owns it behind its lock.
#[derive(Debug)]
pub struct RingBuffer<P> {
    events: VecDeque<Arc<Event<P>>>,
    capacity: usize,
}

impl<P> RingBuffer<P> {
    pub fn new(capacity: usize) -> Self {
        Self {
            events: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append to the tail, evicting from the head until within capacity.
    ///
    /// Callers must append in ascending id order.
    pub fn append(&mut self, event: Arc<Event<P>>) {
        debug_assert!(event.id() > self.last_id(), "ring buffer ids must increase");
        self.events.push_back(event);
        while self.events.len() > self.capacity {
            self.events.pop_front();
        }
    }

    /// Every buffered event with `id > last_id`, ascending.
    ///
    /// `None` returns the whole buffer (full resync).
    pub fn since(&self, last_id: Option<EventId>) -> Vec<Arc<Event<P>>> {
        let Some(last_id) = last_id else {
            return self.events.iter().cloned().collect();
        };

        // Ids are sorted, so binary search for the first newer event.
        let start = self.events.partition_point(|event| event.id() <= last_id);
        self.events.range(start..).cloned().collect()
    }

    /// Highest buffered id, or 0 when empty.
    pub fn last_id(&self) -> EventId {
        self.events.back().map(|event| event.id()).unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
