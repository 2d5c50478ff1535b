/// Sequence number assigned by the bus. Starts at 1; 0 means "nothing seen".
pub type EventId = u64;

/// An immutable, sequenced record of one published payload.
///
/// Only [`crate::Bus`] constructs these, so `id` is always bus-assigned.
#[derive(Debug, Clone, PartialEq)]
pub struct Event<P> {
    id: EventId,
    timestamp: i64,
    payload: P,
}

impl<P> Event<P> {
    pub(crate) fn new(id: EventId, timestamp: i64, payload: P) -> Self {
        Self {
            id,
            timestamp,
            payload,
        }
    }

    pub fn id(&self) -> EventId {
        self.id
    }

    /// Milliseconds since the Unix epoch.
    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }

    pub fn payload(&self) -> &P {
        &self.payload
    }
}

/// Current wall-clock time in milliseconds since the Unix epoch.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
