//! Server-Sent Events (SSE) infrastructure for the on-air displays.
//!
//! This crate is the real-time state-distribution core: an in-process
//! publish/subscribe bus that pushes every dashboard change to the display
//! pages consumed by the broadcast software, with replay for viewers that
//! reconnect.
//!
//! # Architecture
//!
//! - **Bus-assigned sequence ids**: `Bus::publish` is the only place ids are
//!   assigned. They start at 1, increase by 1 and are never reused.
//! - **Bounded replay**: the last N events live in a `RingBuffer`. A viewer
//!   reconnecting with `Last-Event-ID` gets everything newer that is still
//!   buffered. Older events are evicted silently.
//! - **Isolated fan-out**: a sink that errors or panics only affects itself.
//! - **Best-effort delivery**: no acknowledgements and no durable queue. A
//!   viewer that misses events re-syncs from the snapshot on reconnect.
//! - **Single instance**: the bus lives in one process's memory. Running more
//!   than one server process means displays only see changes made through
//!   the process they are connected to.
//!
//! # Message Flow
//!
//! 1. A display page opens `/api/events` (optionally with `Last-Event-ID`)
//! 2. The web layer starts a `Session` over the response body
//! 3. The session attaches a sink to the bus, then writes `connected`, a
//!    state snapshot and any missed events
//! 4. When the operator changes state, the controller publishes a
//!    `StateEvent` through `events::EventPublisher`
//! 5. `SseStateEventHandler` hands it to `Bus::publish`, which stamps, buffers
//!    and fans it out to every session's sink
//! 6. Each session writes the record to its viewer, plus a heartbeat comment
//!    every keepalive interval
//!
//! # Example: publishing a change
//!
//! ```rust,ignore
//! use events::StateEvent;
//!
//! app_state
//!     .event_publisher
//!     .publish(StateEvent::DisplayChange { display_id: "bracket".into() })
//!     .await;
//! ```
//!
//! # Modules
//!
//! - `event`: the immutable sequenced `Event` record
//! - `ring_buffer`: bounded replay history
//! - `registry`: `Sink` trait and the concurrent set of registered sinks
//! - `bus`: publish/subscribe/replay entrypoints and the `Subscription` handle
//! - `frame`: byte-exact SSE wire framing
//! - `session`: per-connection lifecycle (sync, live, keepalive, watchdog)
//! - `state_event_handler`: bridges `events::EventPublisher` onto the bus

pub mod bus;
pub mod event;
pub mod frame;
pub mod registry;
pub mod ring_buffer;
pub mod session;
pub mod state_event_handler;

pub use bus::{parse_last_event_id, Attachment, Bus, PublishReport, Subscription};
pub use event::{Event, EventId};
pub use frame::Frame;
pub use registry::{Sink, SinkError, SubscriberId};
pub use session::{
    CloseReason, Session, SessionConfig, SessionHandle, SessionPhase, SnapshotSource, Transport,
    TransportError,
};
pub use state_event_handler::SseStateEventHandler;
