//! Endpoint registry.
//!
//! Maps endpoint names to at most one active [`Connection`] and owns the
//! reconnection state of each endpoint.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │               EndpointRegistry               │
//! │  ┌────────────────────────────────────────┐  │
//! │  │ notifications  → entry (gen 1)         │  │
//! │  │ proctoring/42  → entry (gen 2)         │  │
//! │  │   connection · backoff · pending timer │  │
//! │  └────────────────────────────────────────┘  │
//! └──────────────────────────────────────────────┘
//! ```
//!
//! Each manual `connect` that starts a new attempt stamps the entry with a
//! fresh generation. Attempt and timer tasks carry the generation they were
//! started with and become no-ops once the entry has moved on or was removed.
//! Tasks hold only a weak reference to the registry.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde_json::Value;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

use crate::dispatch::ListenerRegistry;
use crate::error::{Error, Result};
use crate::identifiers::Endpoint;
use crate::protocol::{MaxReconnectAttempts, Message};

use super::Transport;
use super::backoff::{BackoffPolicy, ReconnectDecision, ReconnectState};
use super::connection::{CloseOutcome, Connection};

// ============================================================================
// Constants
// ============================================================================

/// Default time allowed for a transport to open.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Query parameter carrying credentials.
const TOKEN_PARAM: &str = "token";

// ============================================================================
// RegistrySettings
// ============================================================================

/// Settings shared by every endpoint of a registry.
#[derive(Debug, Clone, PartialEq)]
pub struct RegistrySettings {
    /// Base URL; endpoint names are appended as path segments.
    pub base_url: Url,
    /// Reconnection schedule.
    pub backoff: BackoffPolicy,
    /// Retry abnormal closures.
    pub auto_reconnect: bool,
    /// Time allowed for a transport to open.
    pub connect_timeout: Duration,
    /// Heartbeat period for live connections.
    pub heartbeat_interval: Option<Duration>,
}

impl RegistrySettings {
    /// Creates settings with default reconnection behaviour.
    #[must_use]
    pub fn new(base_url: Url) -> Self {
        Self {
            base_url,
            backoff: BackoffPolicy::default(),
            auto_reconnect: true,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            heartbeat_interval: None,
        }
    }
}

// ============================================================================
// Internal Types
// ============================================================================

/// A cancellable single-shot task.
struct ScheduledTask {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

impl ScheduledTask {
    fn cancel(self) {
        self.token.cancel();
        self.handle.abort();
    }
}

/// Registry state for one endpoint.
struct EndpointEntry {
    connection: Connection,
    url: Url,
    backoff: ReconnectState,
    pending: Option<ScheduledTask>,
    generation: u64,
}

impl EndpointEntry {
    fn cancel(self) {
        if let Some(pending) = self.pending {
            pending.cancel();
        }
        self.connection.close();
    }
}

struct RegistryInner {
    settings: RegistrySettings,
    transport: Arc<dyn Transport>,
    listeners: ListenerRegistry,
    entries: Mutex<FxHashMap<Endpoint, EndpointEntry>>,
    next_generation: AtomicU64,
}

impl Drop for RegistryInner {
    fn drop(&mut self) {
        for (_, entry) in self.entries.get_mut().drain() {
            entry.cancel();
        }
    }
}

// ============================================================================
// EndpointRegistry
// ============================================================================

/// Owns the connections of every endpoint.
///
/// Cloning yields another handle to the same registry. Dropping the last
/// handle closes every connection and cancels every pending retry.
#[derive(Clone)]
pub struct EndpointRegistry {
    inner: Arc<RegistryInner>,
}

impl fmt::Debug for EndpointRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EndpointRegistry")
            .field("base_url", &self.inner.settings.base_url.as_str())
            .field("endpoints", &self.connection_count())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// EndpointRegistry - Constructor
// ============================================================================

impl EndpointRegistry {
    /// Creates a registry that opens sessions through `transport` and
    /// delivers everything to `listeners`.
    #[must_use]
    pub fn new(
        settings: RegistrySettings,
        transport: Arc<dyn Transport>,
        listeners: ListenerRegistry,
    ) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                settings,
                transport,
                listeners,
                entries: Mutex::new(FxHashMap::default()),
                next_generation: AtomicU64::new(1),
            }),
        }
    }
}

// ============================================================================
// EndpointRegistry - Public API
// ============================================================================

impl EndpointRegistry {
    /// Returns the connection for `endpoint`, opening one if needed.
    ///
    /// An existing connection that is connecting or open is returned as is.
    /// Otherwise any pending retry is cancelled, the backoff is reset and a
    /// new attempt starts. `credentials` are sent as the `token` query
    /// parameter.
    ///
    /// # Errors
    ///
    /// - [`Error::NoRuntime`] if called outside a tokio runtime
    /// - [`Error::Config`] if the base URL cannot carry a path
    pub fn connect(&self, endpoint: &Endpoint, credentials: Option<&str>) -> Result<Connection> {
        let runtime = Handle::try_current().map_err(|_| Error::NoRuntime)?;

        let (connection, url, generation) = {
            let mut entries = self.inner.entries.lock();

            if let Some(entry) = entries.get_mut(endpoint) {
                if entry.connection.is_active() {
                    debug!(endpoint = %endpoint, connection = %entry.connection.id(), "Reusing connection");
                    return Ok(entry.connection.clone());
                }
                if let Some(pending) = entry.pending.take() {
                    debug!(endpoint = %endpoint, "Cancelled pending retry for manual connect");
                    pending.cancel();
                }
            }

            let url = endpoint_url(&self.inner.settings.base_url, endpoint, credentials)?;
            let generation = self.inner.next_generation.fetch_add(1, Ordering::Relaxed);
            let connection = Connection::new(endpoint.clone());

            entries.insert(
                endpoint.clone(),
                EndpointEntry {
                    connection: connection.clone(),
                    url: url.clone(),
                    backoff: ReconnectState::new(),
                    pending: None,
                    generation,
                },
            );
            (connection, url, generation)
        };

        info!(endpoint = %endpoint, connection = %connection.id(), "Connecting");
        self.inner.spawn_attempt(&runtime, connection.clone(), url, generation);
        Ok(connection)
    }

    /// Closes the endpoint with code 1000, cancels any pending retry and
    /// removes it. Returns `false` if the endpoint was not registered.
    pub fn disconnect(&self, endpoint: &Endpoint) -> bool {
        let removed = self.inner.entries.lock().remove(endpoint);
        match removed {
            Some(entry) => {
                info!(endpoint = %endpoint, connection = %entry.connection.id(), "Disconnecting");
                entry.cancel();
                true
            }
            None => false,
        }
    }

    /// Sends `{type, ...payload}` to `endpoint`.
    ///
    /// Returns `false` if the endpoint has no open connection or the type is
    /// rejected.
    pub fn send(&self, endpoint: &Endpoint, kind: &str, payload: Value) -> bool {
        match self.connection(endpoint) {
            Some(connection) => connection.send(kind, payload),
            None => {
                debug!(endpoint = %endpoint, kind, "Send on unknown endpoint");
                false
            }
        }
    }

    /// Disconnects every endpoint. Returns how many were registered.
    pub fn shutdown(&self) -> usize {
        let drained: Vec<_> = self.inner.entries.lock().drain().collect();
        let count = drained.len();
        for (endpoint, entry) in drained {
            debug!(endpoint = %endpoint, "Closed during shutdown");
            entry.cancel();
        }
        info!(count, "Registry shut down");
        count
    }

    /// Returns the current connection of `endpoint`.
    #[must_use]
    pub fn connection(&self, endpoint: &Endpoint) -> Option<Connection> {
        self.inner
            .entries
            .lock()
            .get(endpoint)
            .map(|entry| entry.connection.clone())
    }

    /// Returns the registered endpoints in name order.
    #[must_use]
    pub fn endpoints(&self) -> Vec<Endpoint> {
        let mut endpoints: Vec<_> = self.inner.entries.lock().keys().cloned().collect();
        endpoints.sort();
        endpoints
    }

    /// Returns the number of registered endpoints.
    #[inline]
    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.inner.entries.lock().len()
    }

    /// Returns the retries scheduled in the current failure streak.
    #[must_use]
    pub fn reconnect_attempts(&self, endpoint: &Endpoint) -> Option<u32> {
        self.inner
            .entries
            .lock()
            .get(endpoint)
            .map(|entry| entry.backoff.attempts())
    }

    /// Returns `true` while a retry timer is pending for `endpoint`.
    #[must_use]
    pub fn is_reconnect_pending(&self, endpoint: &Endpoint) -> bool {
        self.inner
            .entries
            .lock()
            .get(endpoint)
            .is_some_and(|entry| entry.pending.is_some())
    }

    /// Returns the listener registry events are delivered to.
    #[inline]
    #[must_use]
    pub fn listeners(&self) -> &ListenerRegistry {
        &self.inner.listeners
    }

    /// Returns the registry settings.
    #[inline]
    #[must_use]
    pub fn settings(&self) -> &RegistrySettings {
        &self.inner.settings
    }
}

// ============================================================================
// RegistryInner - Attempts
// ============================================================================

impl RegistryInner {
    fn spawn_attempt(self: &Arc<Self>, runtime: &Handle, connection: Connection, url: Url, generation: u64) {
        let attempt = Attempt {
            registry: Arc::downgrade(self),
            transport: Arc::clone(&self.transport),
            listeners: self.listeners.clone(),
            connection,
            url,
            generation,
        };
        let connect_timeout = self.settings.connect_timeout;
        let heartbeat = if self.transport.is_simulated() {
            None
        } else {
            self.settings.heartbeat_interval
        };

        runtime.spawn(async move {
            let outcome = attempt.run(connect_timeout, heartbeat).await;
            if let Some(registry) = attempt.registry.upgrade() {
                registry.on_closed(&attempt.connection, attempt.generation, outcome);
            }
        });
    }

    /// Resets the backoff once a session of `generation` opened.
    fn mark_open(&self, endpoint: &Endpoint, generation: u64) {
        let mut entries = self.entries.lock();
        if let Some(entry) = entries.get_mut(endpoint)
            && entry.generation == generation
        {
            entry.backoff.reset();
        }
    }

    /// Feeds a finished session into the reconnection controller.
    fn on_closed(self: &Arc<Self>, connection: &Connection, generation: u64, outcome: CloseOutcome) {
        if outcome != CloseOutcome::Abnormal {
            return;
        }
        let endpoint = connection.endpoint();
        if !self.settings.auto_reconnect {
            debug!(endpoint = %endpoint, "Auto-reconnect disabled");
            return;
        }

        let decision = {
            let mut entries = self.entries.lock();
            let Some(entry) = entries.get_mut(endpoint) else {
                return;
            };
            if entry.generation != generation || !entry.connection.ptr_eq(connection) {
                return;
            }

            let decision = entry.backoff.record_failure(&self.settings.backoff);
            if let ReconnectDecision::Retry { delay, .. } = decision {
                entry.pending = Some(self.schedule(endpoint.clone(), generation, delay));
            }
            decision
        };

        match decision {
            ReconnectDecision::Retry { attempt, delay } => {
                info!(
                    endpoint = %endpoint,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    "Reconnect scheduled"
                );
                connection.announce_reconnecting(&self.listeners, attempt, delay);
            }
            ReconnectDecision::GiveUp { attempts } => {
                warn!(endpoint = %endpoint, attempts, "Giving up after max reconnect attempts");
                connection.give_up(&self.listeners);
                connection.dispatch(
                    &self.listeners,
                    Message::MaxReconnectAttempts(MaxReconnectAttempts {
                        attempts,
                        max_attempts: self.settings.backoff.max_attempts,
                    }),
                );
            }
        }
    }

    fn schedule(self: &Arc<Self>, endpoint: Endpoint, generation: u64, delay: Duration) -> ScheduledTask {
        let token = CancellationToken::new();
        let cancelled = token.clone();
        let registry = Arc::downgrade(self);

        let handle = tokio::spawn(async move {
            tokio::select! {
                biased;
                () = cancelled.cancelled() => {}
                () = sleep(delay) => {
                    if let Some(registry) = registry.upgrade() {
                        registry.reconnect_due(&endpoint, generation);
                    }
                }
            }
        });

        ScheduledTask { token, handle }
    }

    /// Replaces the connection of `endpoint` and starts the next attempt.
    fn reconnect_due(self: &Arc<Self>, endpoint: &Endpoint, generation: u64) {
        let (connection, url) = {
            let mut entries = self.entries.lock();
            let Some(entry) = entries.get_mut(endpoint) else {
                return;
            };
            if entry.generation != generation || entry.pending.take().is_none() {
                return;
            }

            entry.connection = Connection::new(endpoint.clone());
            (entry.connection.clone(), entry.url.clone())
        };

        info!(
            endpoint = %endpoint,
            connection = %connection.id(),
            "Reconnecting"
        );
        self.spawn_attempt(&Handle::current(), connection, url, generation);
    }
}

// ============================================================================
// Attempt
// ============================================================================

/// One connection attempt, owned by its task.
struct Attempt {
    registry: Weak<RegistryInner>,
    transport: Arc<dyn Transport>,
    listeners: ListenerRegistry,
    connection: Connection,
    url: Url,
    generation: u64,
}

impl Attempt {
    /// Opens a session and runs it to completion.
    async fn run(&self, connect_timeout: Duration, heartbeat: Option<Duration>) -> CloseOutcome {
        let connection = &self.connection;
        let listeners = &self.listeners;

        if connection.is_cancelled() {
            return connection.finish_cancelled(listeners);
        }
        connection.announce_connecting(listeners);

        let opened = tokio::select! {
            biased;
            () = connection.cancelled() => return connection.finish_cancelled(listeners),
            opened = timeout(connect_timeout, self.transport.open(connection.endpoint(), &self.url)) => opened,
        };

        match opened {
            Ok(Ok(session)) => {
                if let Some(registry) = self.registry.upgrade() {
                    registry.mark_open(connection.endpoint(), self.generation);
                }
                connection.run_event_loop(session, listeners, heartbeat).await
            }
            Ok(Err(e)) => connection.fail(listeners, &e.to_string(), e.is_recoverable()),
            Err(_) => {
                let e = Error::connection_timeout(connect_timeout.as_millis() as u64);
                connection.fail(listeners, &e.to_string(), e.is_recoverable())
            }
        }
    }
}

/// Builds `<base>/<endpoint>[?token=...]`.
fn endpoint_url(base: &Url, endpoint: &Endpoint, credentials: Option<&str>) -> Result<Url> {
    let mut url = base.clone();
    {
        let mut segments = url
            .path_segments_mut()
            .map_err(|()| Error::config(format!("base URL {base} cannot carry a path")))?;
        segments.pop_if_empty();
        segments.extend(endpoint.as_str().split('/'));
    }
    if let Some(token) = credentials {
        url.query_pairs_mut().append_pair(TOKEN_PARAM, token);
    }
    Ok(url)
}

// ============================================================================
// Tests
// ============================================================================
