//! Connection state machine and event loop.
//!
//! A [`Connection`] is one transport session to one endpoint. The registry
//! creates it in `Connecting`, the attempt task drives it through the event
//! loop, and every state change is announced to listeners as a `connection`
//! envelope.
//!
//! # State Machine
//!
//! ```text
//! Connecting ──► Open ──► Closing ──► Closed
//!     │           │
//!     └───────────┴──────► Failed
//! ```
//!
//! # Event Loop
//!
//! The loop selects over, in priority order:
//!
//! - Cancellation from `disconnect` (sends close code 1000)
//! - Inbound transport events (text frames, close, failure)
//! - The heartbeat timer, when configured

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::time::{Instant, Interval, interval_at};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::dispatch::ListenerRegistry;
use crate::identifiers::{ConnectionId, Endpoint};
use crate::protocol::{
    ConnectionEvent, ConnectionStatus, Envelope, ErrorEvent, ErrorOrigin, Message, Outbound,
};

use super::{CLOSE_ABNORMAL, CLOSE_NORMAL, Outgoing, TransportEvent, TransportSession};

// ============================================================================
// Constants
// ============================================================================

/// Close reason sent when the caller disconnects.
const DISCONNECT_REASON: &str = "client disconnect";

// ============================================================================
// ConnectionState
// ============================================================================

/// Lifecycle state of a [`Connection`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// Transport open in progress.
    Connecting,
    /// Session established; frames flow.
    Open,
    /// Close requested locally.
    Closing,
    /// Session ended.
    Closed,
    /// Session failed or reconnection gave up.
    Failed,
}

impl ConnectionState {
    /// Returns the lowercase name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        self.status().as_str()
    }

    /// Returns `true` for `Connecting` and `Open`.
    #[inline]
    #[must_use]
    pub const fn is_active(&self) -> bool {
        matches!(self, Self::Connecting | Self::Open)
    }

    /// Maps the state onto the status carried by `connection` events.
    #[must_use]
    pub const fn status(&self) -> ConnectionStatus {
        match self {
            Self::Connecting => ConnectionStatus::Connecting,
            Self::Open => ConnectionStatus::Open,
            Self::Closing => ConnectionStatus::Closing,
            Self::Closed => ConnectionStatus::Closed,
            Self::Failed => ConnectionStatus::Failed,
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// CloseOutcome
// ============================================================================

/// How a session ended, as seen by the reconnection controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CloseOutcome {
    /// Closed by `disconnect`; the entry is already gone.
    Cancelled,
    /// Peer closed with code 1000; terminal.
    Clean,
    /// Dropped, closed with another code, or failed; eligible for retry.
    Abnormal,
    /// Failed with an error a retry cannot fix; terminal.
    Fatal,
}

// ============================================================================
// Connection
// ============================================================================

/// Handle to one transport session.
///
/// Cloning yields another handle to the same session. Two handles refer to
/// the same session when [`Connection::ptr_eq`] holds.
#[derive(Clone)]
pub struct Connection {
    inner: Arc<ConnectionInner>,
}

struct ConnectionInner {
    id: ConnectionId,
    endpoint: Endpoint,
    state: Mutex<ConnectionState>,
    /// Present while the session is open.
    writer: Mutex<Option<mpsc::UnboundedSender<Outgoing>>>,
    cancel: CancellationToken,
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.inner.id)
            .field("endpoint", &self.inner.endpoint)
            .field("state", &self.state())
            .finish()
    }
}

// ============================================================================
// Connection - Public API
// ============================================================================

impl Connection {
    /// Returns the connection ID.
    #[inline]
    #[must_use]
    pub fn id(&self) -> ConnectionId {
        self.inner.id
    }

    /// Returns the endpoint this connection serves.
    #[inline]
    #[must_use]
    pub fn endpoint(&self) -> &Endpoint {
        &self.inner.endpoint
    }

    /// Returns the current state.
    #[inline]
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.inner.state.lock()
    }

    /// Returns `true` while connecting or open.
    #[inline]
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.state().is_active()
    }

    /// Returns `true` while open.
    #[inline]
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.state() == ConnectionState::Open
    }

    /// Returns `true` if both handles refer to the same session.
    #[inline]
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Sends `{type, ...payload}` over the session.
    ///
    /// Returns `false` if the connection is not open or the type is empty or
    /// reserved for local lifecycle events.
    pub fn send(&self, kind: &str, payload: Value) -> bool {
        let outbound = match Outbound::new(kind, payload) {
            Ok(outbound) => outbound,
            Err(e) => {
                warn!(endpoint = %self.inner.endpoint, error = %e, "Rejected outbound message");
                return false;
            }
        };

        match outbound.to_text() {
            Ok(text) => self.send_text(text),
            Err(e) => {
                warn!(endpoint = %self.inner.endpoint, error = %e, "Failed to encode outbound message");
                false
            }
        }
    }

    /// Sends a raw text frame. Returns `false` unless the connection is open.
    pub fn send_text(&self, text: String) -> bool {
        if !self.is_open() {
            return false;
        }
        let sent = self.write(Outgoing::Text(text));
        trace!(endpoint = %self.inner.endpoint, connection = %self.inner.id, sent, "Frame queued");
        sent
    }
}

// ============================================================================
// Connection - Registry API
// ============================================================================

impl Connection {
    /// Creates a connection in the `Connecting` state.
    pub(crate) fn new(endpoint: Endpoint) -> Self {
        Self {
            inner: Arc::new(ConnectionInner {
                id: ConnectionId::next(),
                endpoint,
                state: Mutex::new(ConnectionState::Connecting),
                writer: Mutex::new(None),
                cancel: CancellationToken::new(),
            }),
        }
    }

    /// Requests a clean close. The owning task performs the transitions.
    pub(crate) fn close(&self) {
        self.inner.cancel.cancel();
    }

    /// Returns `true` once [`Connection::close`] was called.
    pub(crate) fn is_cancelled(&self) -> bool {
        self.inner.cancel.is_cancelled()
    }

    /// Completes when [`Connection::close`] is called.
    pub(crate) async fn cancelled(&self) {
        self.inner.cancel.cancelled().await;
    }

    /// Announces the `Connecting` state.
    pub(crate) fn announce_connecting(&self, listeners: &ListenerRegistry) {
        self.emit(listeners, self.event(ConnectionStatus::Connecting));
    }

    /// Finishes a connection closed before its session opened.
    pub(crate) fn finish_cancelled(&self, listeners: &ListenerRegistry) -> CloseOutcome {
        self.closed(listeners, CLOSE_NORMAL, DISCONNECT_REASON);
        CloseOutcome::Cancelled
    }

    /// Records a transport failure: emits an `error` event, then `failed`.
    ///
    /// Recoverable failures are handed to the reconnection controller as
    /// [`CloseOutcome::Abnormal`], all others end the endpoint.
    pub(crate) fn fail(
        &self,
        listeners: &ListenerRegistry,
        message: &str,
        recoverable: bool,
    ) -> CloseOutcome {
        warn!(
            endpoint = %self.inner.endpoint,
            connection = %self.inner.id,
            error = message,
            recoverable,
            "Connection failed"
        );

        self.dispatch(
            listeners,
            Message::Error(ErrorEvent {
                message: message.to_string(),
                origin: ErrorOrigin::Transport,
                recoverable,
            }),
        );

        if self.transition(ConnectionState::Failed) {
            let mut event = self.event(ConnectionStatus::Failed);
            event.reason = Some(message.to_string());
            self.emit(listeners, event);
        }
        if recoverable {
            CloseOutcome::Abnormal
        } else {
            CloseOutcome::Fatal
        }
    }

    /// Marks the connection `Failed` after reconnection gave up.
    pub(crate) fn give_up(&self, listeners: &ListenerRegistry) {
        if self.transition(ConnectionState::Failed) {
            let mut event = self.event(ConnectionStatus::Failed);
            event.reason = Some("reconnection attempts exhausted".to_string());
            self.emit(listeners, event);
        }
    }

    /// Announces a scheduled retry.
    pub(crate) fn announce_reconnecting(
        &self,
        listeners: &ListenerRegistry,
        attempt: u32,
        delay: Duration,
    ) {
        let mut event = self.event(ConnectionStatus::Reconnecting);
        event.attempt = Some(attempt);
        event.delay_ms = Some(u64::try_from(delay.as_millis()).unwrap_or(u64::MAX));
        self.emit(listeners, event);
    }

    /// Dispatches a lifecycle message on this connection's endpoint.
    pub(crate) fn dispatch(&self, listeners: &ListenerRegistry, message: Message) {
        listeners.dispatch(&Envelope::new(self.inner.endpoint.clone(), message));
    }

    /// Runs the session until it ends.
    ///
    /// Decodes every text frame into an [`Envelope`] and dispatches it to
    /// `listeners`. Malformed frames are logged and dropped.
    pub(crate) async fn run_event_loop(
        &self,
        session: TransportSession,
        listeners: &ListenerRegistry,
        heartbeat: Option<Duration>,
    ) -> CloseOutcome {
        let TransportSession { mut events, writer } = session;
        *self.inner.writer.lock() = Some(writer);

        if self.transition(ConnectionState::Open) {
            self.emit(listeners, self.event(ConnectionStatus::Open));
        }
        info!(endpoint = %self.inner.endpoint, connection = %self.inner.id, "Connection open");

        let mut ticker = heartbeat
            .filter(|period| !period.is_zero())
            .map(|period| interval_at(Instant::now() + period, period));

        let outcome = loop {
            tokio::select! {
                biased;

                () = self.inner.cancel.cancelled() => {
                    self.transition(ConnectionState::Closing);
                    self.emit(listeners, self.event(ConnectionStatus::Closing));
                    self.write(Outgoing::Close {
                        code: CLOSE_NORMAL,
                        reason: DISCONNECT_REASON.to_string(),
                    });
                    self.closed(listeners, CLOSE_NORMAL, DISCONNECT_REASON);
                    break CloseOutcome::Cancelled;
                }

                event = events.recv() => match event {
                    Some(TransportEvent::Text(text)) => self.deliver(listeners, &text),

                    Some(TransportEvent::Closed { code, reason }) => {
                        debug!(endpoint = %self.inner.endpoint, code, reason = %reason, "Closed by remote");
                        self.closed(listeners, code, &reason);
                        break if code == CLOSE_NORMAL {
                            CloseOutcome::Clean
                        } else {
                            CloseOutcome::Abnormal
                        };
                    }

                    Some(TransportEvent::Failed(message)) => break self.fail(listeners, &message, true),

                    None => {
                        debug!(endpoint = %self.inner.endpoint, "Transport stream ended");
                        self.closed(listeners, CLOSE_ABNORMAL, "transport stream ended");
                        break CloseOutcome::Abnormal;
                    }
                },

                () = next_heartbeat(&mut ticker) => {
                    match Outbound::heartbeat().to_text() {
                        Ok(text) => {
                            self.write(Outgoing::Text(text));
                        }
                        Err(e) => warn!(error = %e, "Failed to encode heartbeat"),
                    }
                }
            }
        };

        self.inner.writer.lock().take();
        debug!(endpoint = %self.inner.endpoint, connection = %self.inner.id, ?outcome, "Event loop terminated");
        outcome
    }
}

// ============================================================================
// Connection - Internals
// ============================================================================

impl Connection {
    /// Sets the state; returns `false` if it was already `state`.
    fn transition(&self, state: ConnectionState) -> bool {
        let mut current = self.inner.state.lock();
        if *current == state {
            return false;
        }
        trace!(endpoint = %self.inner.endpoint, from = %*current, to = %state, "State change");
        *current = state;
        true
    }

    fn closed(&self, listeners: &ListenerRegistry, code: u16, reason: &str) {
        if self.transition(ConnectionState::Closed) {
            let mut event = self.event(ConnectionStatus::Closed);
            event.code = Some(code);
            if !reason.is_empty() {
                event.reason = Some(reason.to_string());
            }
            self.emit(listeners, event);
        }
    }

    fn deliver(&self, listeners: &ListenerRegistry, text: &str) {
        match Envelope::decode(&self.inner.endpoint, text) {
            Ok(envelope) => {
                listeners.dispatch(&envelope);
            }
            Err(e) => {
                warn!(
                    endpoint = %self.inner.endpoint,
                    connection = %self.inner.id,
                    error = %e,
                    "Dropping malformed frame"
                );
            }
        }
    }

    fn write(&self, frame: Outgoing) -> bool {
        self.inner
            .writer
            .lock()
            .as_ref()
            .is_some_and(|writer| writer.send(frame).is_ok())
    }

    #[inline]
    fn event(&self, status: ConnectionStatus) -> ConnectionEvent {
        ConnectionEvent::new(status, self.inner.id.as_u64())
    }

    fn emit(&self, listeners: &ListenerRegistry, event: ConnectionEvent) {
        self.dispatch(listeners, Message::Connection(event));
    }
}

/// Waits for the next heartbeat tick, or forever when disabled.
async fn next_heartbeat(ticker: &mut Option<Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

// ============================================================================
// Tests
// ============================================================================
