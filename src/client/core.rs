//! Realtime client coordinator.
//!
//! The [`RealtimeClient`] owns one endpoint registry and one listener
//! registry and is the entry point for connecting, subscribing and sending.
//!
//! # Example
//!
//! ```no_run
//! use proctor_live::RealtimeClient;
//!
//! # async fn example() -> proctor_live::Result<()> {
//! let client = RealtimeClient::builder()
//!     .base_url("ws://localhost:8000/ws")
//!     .build()?;
//!
//! let violations = client.violations("violations")?;
//! client.connect("violations")?;
//!
//! let alerts = violations.with(|feed| feed.alert_count());
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use serde_json::Value;
use tracing::info;
use url::Url;

use crate::channels::{
    Channel, Feed, MetricsFeed, NotificationFeed, TrustScoreFeed, ViolationFeed,
};
use crate::dispatch::{ListenerRegistry, Subscription};
use crate::error::Result;
use crate::identifiers::Endpoint;
use crate::protocol::Envelope;
use crate::transport::{Connection, EndpointRegistry, Transport};

use super::builder::ClientBuilder;
use super::options::RealtimeOptions;

// ============================================================================
// Types
// ============================================================================

/// Internal shared state for the client.
pub(crate) struct ClientInner {
    /// Connections by endpoint.
    pub registry: EndpointRegistry,

    /// Options the client was built with.
    pub options: RealtimeOptions,

    /// Whether traffic is generated locally.
    pub simulated: bool,
}

// ============================================================================
// RealtimeClient
// ============================================================================

/// Realtime connection and event-distribution client.
///
/// The client is responsible for:
/// - Opening at most one connection per endpoint
/// - Reconnecting abnormally closed endpoints with backoff
/// - Delivering every inbound message to the endpoint's listeners
///
/// Cloning is cheap; clones share all state. Dropping the last clone
/// cancels every connection and pending reconnection.
#[derive(Clone)]
pub struct RealtimeClient {
    /// Shared inner state.
    pub(crate) inner: Arc<ClientInner>,
}

// ============================================================================
// RealtimeClient - Display
// ============================================================================

impl fmt::Debug for RealtimeClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RealtimeClient")
            .field("base_url", &self.base_url().as_str())
            .field("simulated", &self.inner.simulated)
            .field("connection_count", &self.connection_count())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// RealtimeClient - Constructor
// ============================================================================

impl RealtimeClient {
    /// Creates a configuration builder for the client.
    #[inline]
    #[must_use]
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    /// Creates a client from validated parts.
    pub(crate) fn new(
        base_url: Url,
        options: RealtimeOptions,
        transport: Arc<dyn Transport>,
    ) -> Self {
        let simulated = transport.is_simulated();
        let settings = options.registry_settings(base_url);
        let registry = EndpointRegistry::new(settings, transport, ListenerRegistry::new());

        info!(
            base_url = %registry.settings().base_url,
            simulated,
            "Realtime client initialized"
        );

        Self {
            inner: Arc::new(ClientInner {
                registry,
                options,
                simulated,
            }),
        }
    }
}

// ============================================================================
// RealtimeClient - Connections
// ============================================================================

impl RealtimeClient {
    /// Opens `endpoint`, or returns its live connection.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidArgument`](crate::Error::InvalidArgument) if the
    ///   endpoint name is malformed
    /// - [`Error::NoRuntime`](crate::Error::NoRuntime) outside a tokio runtime
    pub fn connect(&self, endpoint: impl AsRef<str>) -> Result<Connection> {
        let endpoint = Endpoint::parse(endpoint)?;
        self.inner.registry.connect(&endpoint, None)
    }

    /// Opens `endpoint` with a bearer token.
    ///
    /// # Errors
    ///
    /// Same as [`RealtimeClient::connect`].
    pub fn connect_with(
        &self,
        endpoint: impl AsRef<str>,
        credentials: &str,
    ) -> Result<Connection> {
        let endpoint = Endpoint::parse(endpoint)?;
        self.inner.registry.connect(&endpoint, Some(credentials))
    }

    /// Closes `endpoint` cleanly and forgets it.
    ///
    /// Returns `false` if the endpoint was not registered.
    pub fn disconnect(&self, endpoint: impl AsRef<str>) -> bool {
        Endpoint::parse(endpoint).is_ok_and(|endpoint| self.inner.registry.disconnect(&endpoint))
    }

    /// Sends `{"type": kind, ...payload}` over the open connection of
    /// `endpoint`.
    ///
    /// Returns `false` if nothing was sent.
    pub fn send(&self, endpoint: impl AsRef<str>, kind: &str, payload: Value) -> bool {
        Endpoint::parse(endpoint)
            .is_ok_and(|endpoint| self.inner.registry.send(&endpoint, kind, payload))
    }

    /// Disconnects every endpoint; returns how many were registered.
    pub fn shutdown(&self) -> usize {
        let count = self.inner.registry.shutdown();
        info!(count, "Realtime client shut down");
        count
    }

    /// Returns the connection of `endpoint`, if registered.
    #[must_use]
    pub fn connection(&self, endpoint: impl AsRef<str>) -> Option<Connection> {
        let endpoint = Endpoint::parse(endpoint).ok()?;
        self.inner.registry.connection(&endpoint)
    }

    /// Registered endpoints, sorted.
    #[must_use]
    pub fn endpoints(&self) -> Vec<Endpoint> {
        self.inner.registry.endpoints()
    }

    /// Number of registered endpoints.
    #[inline]
    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.inner.registry.connection_count()
    }

    /// Consecutive failures of `endpoint` in the current streak.
    #[must_use]
    pub fn reconnect_attempts(&self, endpoint: impl AsRef<str>) -> Option<u32> {
        let endpoint = Endpoint::parse(endpoint).ok()?;
        self.inner.registry.reconnect_attempts(&endpoint)
    }

    /// Returns `true` while a reconnection of `endpoint` is scheduled.
    #[must_use]
    pub fn is_reconnect_pending(&self, endpoint: impl AsRef<str>) -> bool {
        Endpoint::parse(endpoint)
            .is_ok_and(|endpoint| self.inner.registry.is_reconnect_pending(&endpoint))
    }
}

// ============================================================================
// RealtimeClient - Listeners
// ============================================================================

impl RealtimeClient {
    /// Registers `callback` for every message on `endpoint`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`](crate::Error::InvalidArgument) if
    /// the endpoint name is malformed.
    pub fn subscribe<F>(&self, endpoint: impl AsRef<str>, callback: F) -> Result<Subscription>
    where
        F: Fn(&Envelope) + Send + Sync + 'static,
    {
        let endpoint = Endpoint::parse(endpoint)?;
        Ok(self.listeners().subscribe(&endpoint, callback))
    }

    /// Registers `callback` for messages of type `kind` on `endpoint`.
    ///
    /// # Errors
    ///
    /// Same as [`RealtimeClient::subscribe`].
    pub fn subscribe_type<F>(
        &self,
        endpoint: impl AsRef<str>,
        kind: impl Into<String>,
        callback: F,
    ) -> Result<Subscription>
    where
        F: Fn(&Envelope) + Send + Sync + 'static,
    {
        let endpoint = Endpoint::parse(endpoint)?;
        Ok(self.listeners().subscribe_type(&endpoint, kind, callback))
    }

    /// Attaches `feed` to `endpoint`.
    ///
    /// # Errors
    ///
    /// Same as [`RealtimeClient::subscribe`].
    pub fn channel<F: Feed>(&self, endpoint: impl AsRef<str>, feed: F) -> Result<Channel<F>> {
        let endpoint = Endpoint::parse(endpoint)?;
        Ok(Channel::attach(self.listeners(), &endpoint, feed))
    }

    /// Attaches a notification feed sized from the options.
    ///
    /// # Errors
    ///
    /// Same as [`RealtimeClient::subscribe`].
    pub fn notifications(&self, endpoint: impl AsRef<str>) -> Result<Channel<NotificationFeed>> {
        self.channel(endpoint, NotificationFeed::new(self.inner.options.notification_cap))
    }

    /// Attaches a violation feed sized from the options.
    ///
    /// # Errors
    ///
    /// Same as [`RealtimeClient::subscribe`].
    pub fn violations(&self, endpoint: impl AsRef<str>) -> Result<Channel<ViolationFeed>> {
        self.channel(endpoint, ViolationFeed::new(self.inner.options.violation_cap))
    }

    /// Attaches a trust-score feed sized from the options.
    ///
    /// # Errors
    ///
    /// Same as [`RealtimeClient::subscribe`].
    pub fn trust_scores(&self, endpoint: impl AsRef<str>) -> Result<Channel<TrustScoreFeed>> {
        let options = &self.inner.options;
        let feed = TrustScoreFeed::new(
            options.trust_score_cap,
            options.low_score_cap,
            options.low_score_threshold,
        );
        self.channel(endpoint, feed)
    }

    /// Attaches a system metrics feed sized from the options.
    ///
    /// # Errors
    ///
    /// Same as [`RealtimeClient::subscribe`].
    pub fn metrics(&self, endpoint: impl AsRef<str>) -> Result<Channel<MetricsFeed>> {
        let options = &self.inner.options;
        let feed = MetricsFeed::new(options.metrics_cap)
            .with_high_load_threshold(options.high_load_threshold);
        self.channel(endpoint, feed)
    }

    /// Returns the listener registry.
    #[inline]
    #[must_use]
    pub fn listeners(&self) -> &ListenerRegistry {
        self.inner.registry.listeners()
    }
}

// ============================================================================
// RealtimeClient - Accessors
// ============================================================================

impl RealtimeClient {
    /// Returns the options the client was built with.
    #[inline]
    #[must_use]
    pub fn options(&self) -> &RealtimeOptions {
        &self.inner.options
    }

    /// Returns the server base URL.
    #[inline]
    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.inner.registry.settings().base_url
    }

    /// Returns `true` if traffic is generated locally.
    #[inline]
    #[must_use]
    pub fn is_simulated(&self) -> bool {
        self.inner.simulated
    }
}

// ============================================================================
// Tests
// ============================================================================
