//! One long-lived viewer connection.
//!
//! A [`Session`] walks through `Connecting -> Syncing -> Live -> Closing ->
//! Closed`. Syncing writes the `connected` frame, an out-of-band snapshot of
//! the current state, and every buffered event the viewer missed. Live
//! forwards bus events as they arrive and writes a heartbeat comment on a
//! fixed interval. Any failed write, a cancellation, or a watchdog timeout
//! moves it to Closing, where the bus subscription is released exactly once.
//! Reconnecting is the viewer's job and always produces a brand-new session.

use crate::bus::{Bus, Subscription};
use crate::event::{now_millis, Event, EventId};
use crate::frame::Frame;
use crate::registry::ChannelSink;
use async_trait::async_trait;
use log::*;
use serde::Serialize;
use std::convert::Infallible;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

pub const DEFAULT_KEEPALIVE_INTERVAL: Duration = Duration::from_secs(10);
pub const DEFAULT_WATCHDOG_TIMEOUT: Duration = Duration::from_secs(25);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionConfig {
    /// How often a `: heartbeat` comment is written while Live.
    pub keepalive_interval: Duration,
    /// Longest a session may go without completing a write before it is
    /// force-closed. Also bounds every individual write.
    pub watchdog_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            keepalive_interval: DEFAULT_KEEPALIVE_INTERVAL,
            watchdog_timeout: DEFAULT_WATCHDOG_TIMEOUT,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SessionPhase {
    Connecting = 0,
    Syncing = 1,
    Live = 2,
    Closing = 3,
    Closed = 4,
}

impl SessionPhase {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => SessionPhase::Connecting,
            1 => SessionPhase::Syncing,
            2 => SessionPhase::Live,
            3 => SessionPhase::Closing,
            _ => SessionPhase::Closed,
        }
    }
}

/// Why a session ended. None of these are surfaced to the operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// `SessionHandle::close` or the cancellation token (server shutdown).
    Cancelled,
    /// The viewer hung up.
    ClientDisconnected,
    /// A write to the transport failed.
    TransportFailed,
    /// Nothing was written within the watchdog timeout.
    Watchdog,
    /// The bus dropped this session's sink.
    BusGone,
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            CloseReason::Cancelled => "cancelled",
            CloseReason::ClientDisconnected => "client disconnected",
            CloseReason::TransportFailed => "transport write failed",
            CloseReason::Watchdog => "watchdog timeout",
            CloseReason::BusGone => "bus gone",
        };
        f.write_str(reason)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    Disconnected,
    Other(String),
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportError::Disconnected => write!(f, "transport disconnected"),
            TransportError::Other(reason) => write!(f, "transport error: {reason}"),
        }
    }
}

impl std::error::Error for TransportError {}

/// Byte sink for one viewer (an HTTP response body in production).
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&mut self, chunk: String) -> Result<(), TransportError>;

    /// Resolves once the remote end is gone. Never resolving is allowed.
    async fn closed(&self);
}

/// The web layer streams the receiving half as the response body; hyper drops
/// it when the client disconnects.
#[async_trait]
impl Transport for mpsc::Sender<String> {
    async fn send(&mut self, chunk: String) -> Result<(), TransportError> {
        mpsc::Sender::send(self, chunk)
            .await
            .map_err(|_| TransportError::Disconnected)
    }

    async fn closed(&self) {
        mpsc::Sender::closed(self).await
    }
}

/// Supplies the current full state written during Syncing, so a fresh viewer
/// does not have to wait for the next change.
#[async_trait]
pub trait SnapshotSource<P>: Send + Sync {
    async fn snapshot(&self) -> Vec<P>;
}

#[derive(Debug)]
struct Lifecycle {
    closed: AtomicBool,
    phase: AtomicU8,
}

/// External control over a running session.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    lifecycle: Arc<Lifecycle>,
    cancel: CancellationToken,
}

impl SessionHandle {
    /// Stop the session. No further writes are attempted once this returns.
    pub fn close(&self) {
        self.lifecycle.closed.store(true, Ordering::Release);
        self.cancel.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.lifecycle.closed.load(Ordering::Acquire)
    }

    pub fn phase(&self) -> SessionPhase {
        SessionPhase::from_u8(self.lifecycle.phase.load(Ordering::Acquire))
    }
}

pub struct Session<P> {
    bus: Arc<Bus<P>>,
    snapshot: Option<Arc<dyn SnapshotSource<P>>>,
    config: SessionConfig,
    last_seen: Option<EventId>,
    lifecycle: Arc<Lifecycle>,
    cancel: CancellationToken,
}

impl<P> Session<P>
where
    P: Serialize + Send + Sync + 'static,
{
    pub fn new(bus: Arc<Bus<P>>, config: SessionConfig) -> Self {
        Self {
            bus,
            snapshot: None,
            config,
            last_seen: None,
            lifecycle: Arc::new(Lifecycle {
                closed: AtomicBool::new(false),
                phase: AtomicU8::new(SessionPhase::Connecting as u8),
            }),
            cancel: CancellationToken::new(),
        }
    }

    /// The highest id the viewer already has. `None` replays the whole buffer.
    pub fn with_last_seen(mut self, last_seen: Option<EventId>) -> Self {
        self.last_seen = last_seen;
        self
    }

    pub fn with_snapshot(mut self, source: Arc<dyn SnapshotSource<P>>) -> Self {
        self.snapshot = Some(source);
        self
    }

    /// Tie the session to an outer token, typically a child of the server's
    /// shutdown token.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn handle(&self) -> SessionHandle {
        SessionHandle {
            lifecycle: Arc::clone(&self.lifecycle),
            cancel: self.cancel.clone(),
        }
    }

    fn set_phase(&self, phase: SessionPhase) {
        self.lifecycle.phase.store(phase as u8, Ordering::Release);
    }

    fn is_closed(&self) -> bool {
        self.lifecycle.closed.load(Ordering::Acquire) || self.cancel.is_cancelled()
    }

    /// Drive the session to completion over `transport`.
    pub async fn run<T: Transport>(self, mut transport: T) -> CloseReason {
        let (sender, mut events) = mpsc::unbounded_channel();
        let mut subscription = None;

        let reason = match self
            .stream(&mut transport, sender, &mut events, &mut subscription)
            .await
        {
            Ok(never) => match never {},
            Err(reason) => reason,
        };

        self.set_phase(SessionPhase::Closing);
        self.lifecycle.closed.store(true, Ordering::Release);
        let subscriber = subscription.as_ref().map(|s| s.id().to_string());
        if let Some(subscription) = subscription.take() {
            subscription.unsubscribe();
        }
        self.set_phase(SessionPhase::Closed);

        let subscriber = subscriber.unwrap_or_else(|| "-".to_string());
        match reason {
            // Watchdog closes are self-healing; the viewer reconnects.
            CloseReason::Watchdog => {
                info!("SSE session {subscriber} closed by watchdog, viewer will reconnect")
            }
            _ => debug!("SSE session {subscriber} closed: {reason}"),
        }

        reason
    }

    async fn stream<T: Transport>(
        &self,
        transport: &mut T,
        sender: mpsc::UnboundedSender<Arc<Event<P>>>,
        events: &mut mpsc::UnboundedReceiver<Arc<Event<P>>>,
        subscription: &mut Option<Subscription<P>>,
    ) -> Result<Infallible, CloseReason> {
        self.set_phase(SessionPhase::Syncing);

        // Attach first: live events queue in the channel while syncing, and
        // the bus decides whether the viewer's last-seen id is still valid.
        let attachment = self.bus.attach(self.last_seen, ChannelSink::new(sender));
        *subscription = Some(attachment.subscription);
        let replay = attachment.replay;

        self.write(transport, Frame::connected(attachment.last_seen))
            .await?;

        if let Some(source) = &self.snapshot {
            let timestamp = now_millis();
            for payload in source.snapshot().await {
                match Frame::snapshot(&payload, timestamp) {
                    Ok(frame) => self.write(transport, frame).await?,
                    Err(e) => error!("Failed to serialize SSE snapshot: {e}"),
                }
            }
        }

        let mut last_seen = attachment.last_seen.unwrap_or(0);
        if !replay.is_empty() {
            debug!(
                "Replaying {} missed event(s) after id {}",
                replay.len(),
                last_seen
            );
        }
        for event in &replay {
            self.deliver(transport, event, &mut last_seen).await?;
        }

        self.set_phase(SessionPhase::Live);

        let period = self.config.keepalive_interval;
        let mut keepalive = time::interval_at(Instant::now() + period, period);
        keepalive.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let watchdog = time::sleep(self.config.watchdog_timeout);
        tokio::pin!(watchdog);

        loop {
            tokio::select! {
                biased;

                _ = self.cancel.cancelled() => return Err(CloseReason::Cancelled),
                _ = transport.closed() => return Err(CloseReason::ClientDisconnected),
                _ = &mut watchdog => return Err(CloseReason::Watchdog),
                received = events.recv() => match received {
                    Some(event) => self.deliver(transport, &event, &mut last_seen).await?,
                    None => return Err(CloseReason::BusGone),
                },
                _ = keepalive.tick() => self.write(transport, Frame::heartbeat()).await?,
            }

            watchdog
                .as_mut()
                .reset(Instant::now() + self.config.watchdog_timeout);
        }
    }

    async fn deliver<T: Transport>(
        &self,
        transport: &mut T,
        event: &Event<P>,
        last_seen: &mut EventId,
    ) -> Result<(), CloseReason> {
        if event.id() <= *last_seen {
            debug!("Skipping stale event {} (last seen {})", event.id(), last_seen);
            return Ok(());
        }

        match Frame::record(event) {
            Ok(frame) => self.write(transport, frame).await?,
            Err(e) => error!("Failed to serialize SSE event {}: {e}", event.id()),
        }
        *last_seen = event.id();
        Ok(())
    }

    async fn write<T: Transport>(&self, transport: &mut T, frame: Frame) -> Result<(), CloseReason> {
        if self.is_closed() {
            return Err(CloseReason::Cancelled);
        }

        let kind = frame.kind();
        tokio::select! {
            biased;

            _ = self.cancel.cancelled() => Err(CloseReason::Cancelled),
            sent = time::timeout(self.config.watchdog_timeout, transport.send(frame.encode())) => {
                match sent {
                    Ok(Ok(())) => {
                        trace!("Wrote SSE {kind} frame");
                        Ok(())
                    }
                    Ok(Err(TransportError::Disconnected)) => Err(CloseReason::ClientDisconnected),
                    Ok(Err(e)) => {
                        warn!("Failed to write SSE {kind} frame: {e}");
                        Err(CloseReason::TransportFailed)
                    }
                    Err(_) => Err(CloseReason::Watchdog),
                }
            }
        }
    }
}
