//! Builder pattern for client configuration.
//!
//! Provides a fluent API for configuring and creating [`RealtimeClient`]
//! instances.
//!
//! # Example
//!
//! ```no_run
//! use proctor_live::RealtimeClient;
//!
//! # fn example() -> proctor_live::Result<()> {
//! let client = RealtimeClient::builder()
//!     .base_url("wss://proctor.example.com/ws")
//!     .build()?;
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use url::Url;

use crate::error::{Error, Result};
use crate::transport::{SimulatedTransport, Transport, WebSocketTransport};

use super::core::RealtimeClient;
use super::options::RealtimeOptions;

// ============================================================================
// Constants
// ============================================================================

/// Base URL used when none is configured.
pub const DEFAULT_BASE_URL: &str = "ws://localhost:8000/ws";

// ============================================================================
// ClientBuilder
// ============================================================================

/// Builder for configuring a [`RealtimeClient`] instance.
///
/// Use [`RealtimeClient::builder()`] to create a new builder.
#[derive(Default, Clone)]
pub struct ClientBuilder {
    /// Server base URL.
    base_url: Option<String>,
    /// Tuning options.
    options: RealtimeOptions,
    /// Replace the network with locally generated traffic.
    simulation: bool,
    /// Custom transport.
    transport: Option<Arc<dyn Transport>>,
}

impl fmt::Debug for ClientBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientBuilder")
            .field("base_url", &self.base_url)
            .field("options", &self.options)
            .field("simulation", &self.simulation)
            .field("custom_transport", &self.transport.is_some())
            .finish()
    }
}

// ============================================================================
// ClientBuilder Implementation
// ============================================================================

impl ClientBuilder {
    /// Creates a new client builder with default configuration.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the server base URL.
    ///
    /// Endpoint names are appended as path segments, so
    /// `ws://host/ws` + `notifications` opens `ws://host/ws/notifications`.
    #[inline]
    #[must_use]
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Replaces the tuning options.
    #[inline]
    #[must_use]
    pub fn options(mut self, options: RealtimeOptions) -> Self {
        self.options = options;
        self
    }

    /// Serves every endpoint from generated traffic instead of the network.
    #[inline]
    #[must_use]
    pub fn simulation(mut self, enabled: bool) -> Self {
        self.simulation = enabled;
        self
    }

    /// Opens sessions through `transport`.
    #[inline]
    #[must_use]
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Builds the client with validation.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] if the options are invalid
    /// - [`Error::Config`] if the base URL is not a `ws`/`wss` URL
    /// - [`Error::Config`] if simulation is combined with a custom transport
    pub fn build(self) -> Result<RealtimeClient> {
        self.options.validate()?;
        let base_url = self.validate_base_url()?;
        let transport = self.select_transport()?;

        Ok(RealtimeClient::new(base_url, self.options, transport))
    }
}

// ============================================================================
// Validation
// ============================================================================

impl ClientBuilder {
    /// Parses and checks the base URL.
    fn validate_base_url(&self) -> Result<Url> {
        let raw = self.base_url.as_deref().unwrap_or(DEFAULT_BASE_URL);
        let url = Url::parse(raw).map_err(|e| {
            Error::config(format!(
                "Invalid base URL {raw:?}: {e}\n\
                 Example: RealtimeClient::builder().base_url(\"ws://localhost:8000/ws\")"
            ))
        })?;

        match url.scheme() {
            "ws" => {}
            "wss" if cfg!(feature = "native-tls") => {}
            "wss" => {
                return Err(Error::config(
                    "wss:// URLs require the `native-tls` feature",
                ));
            }
            other => {
                return Err(Error::config(format!(
                    "Base URL scheme must be ws or wss, got {other:?}"
                )));
            }
        }

        if url.cannot_be_a_base() {
            return Err(Error::config(format!("Base URL {url} cannot carry a path")));
        }

        Ok(url)
    }

    /// Picks the transport for the client.
    fn select_transport(&self) -> Result<Arc<dyn Transport>> {
        match (&self.transport, self.simulation) {
            (Some(_), true) => Err(Error::config(
                "Simulation cannot be combined with a custom transport",
            )),
            (Some(transport), false) => Ok(Arc::clone(transport)),
            (None, true) => Ok(Arc::new(SimulatedTransport::new(
                self.options.simulation,
            ))),
            (None, false) => Ok(Arc::new(WebSocketTransport::new())),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
