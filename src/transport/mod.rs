//! Transport layer.
//!
//! A [`Transport`] opens one [`TransportSession`] per connection attempt. The
//! session is a pair of channels: inbound [`TransportEvent`]s and outbound
//! [`Outgoing`] frames. Everything above this seam (connection state machine,
//! reconnection, dispatch) is identical for live, simulated and in-memory
//! transports.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐  connect / disconnect  ┌──────────────────────┐
//! │ RealtimeClient   │───────────────────────►│ EndpointRegistry     │
//! └──────────────────┘                        │  endpoint → entry    │
//!                                             │   Connection         │
//!                                             │   ReconnectState     │
//!                                             │   pending retry      │
//!                                             └─────────┬────────────┘
//!                                                       │ open()
//!                          ┌────────────────────────────┼──────────────────┐
//!                          ▼                            ▼                  ▼
//!                 WebSocketTransport          SimulatedTransport   MemoryTransport
//! ```
//!
//! # Connection Lifecycle
//!
//! 1. `EndpointRegistry::connect` - Register entry, spawn attempt task
//! 2. `Transport::open` - Establish session (Connecting → Open)
//! 3. `Connection::run_event_loop` - Decode and dispatch frames
//! 4. Session ends - clean close, abnormal close or failure
//! 5. `ReconnectState` - Schedule retry or give up
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `backoff` | Reconnection delays and attempt ceiling |
//! | `connection` | Connection state machine and event loop |
//! | `memory` | Caller-driven in-process transport |
//! | `registry` | Endpoint → Connection ownership and reconnection |
//! | `simulation` | Synthetic traffic generator |
//! | `websocket` | tokio-tungstenite client transport |

// ============================================================================
// Submodules
// ============================================================================

/// Backoff policy and reconnection state.
pub mod backoff;

/// Connection state machine and event loop.
pub mod connection;

/// In-process transport driven by the caller.
pub mod memory;

/// Endpoint registry.
pub mod registry;

/// Synthetic traffic transport.
pub mod simulation;

/// WebSocket client transport.
pub mod websocket;

// ============================================================================
// Imports
// ============================================================================

use async_trait::async_trait;
use tokio::sync::mpsc;
use url::Url;

use crate::error::Result;
use crate::identifiers::Endpoint;

// ============================================================================
// Close Codes
// ============================================================================

/// Normal closure; no reconnection.
pub const CLOSE_NORMAL: u16 = 1000;

/// Endpoint going away (server restart); reconnection applies.
pub const CLOSE_GOING_AWAY: u16 = 1001;

/// Connection dropped without a close frame.
pub const CLOSE_ABNORMAL: u16 = 1006;

// ============================================================================
// Session Types
// ============================================================================

/// Event produced by an open session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// A text frame.
    Text(String),
    /// The peer closed the session.
    Closed {
        /// Close code ([`CLOSE_NORMAL`] is a clean close).
        code: u16,
        /// Close reason.
        reason: String,
    },
    /// The session failed.
    Failed(String),
}

/// Frame sent to an open session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outgoing {
    /// A text frame.
    Text(String),
    /// Close the session with a code and reason.
    Close {
        /// Close code.
        code: u16,
        /// Close reason.
        reason: String,
    },
}

/// One open transport session.
///
/// Dropping the session closes both channels, which tells the transport side
/// to tear down.
#[derive(Debug)]
pub struct TransportSession {
    /// Inbound events.
    pub events: mpsc::UnboundedReceiver<TransportEvent>,
    /// Outbound frames.
    pub writer: mpsc::UnboundedSender<Outgoing>,
}

impl TransportSession {
    /// Creates a session together with the transport-side channel ends.
    #[must_use]
    pub fn pair() -> (
        Self,
        mpsc::UnboundedSender<TransportEvent>,
        mpsc::UnboundedReceiver<Outgoing>,
    ) {
        let (event_tx, events) = mpsc::unbounded_channel();
        let (writer, outgoing_rx) = mpsc::unbounded_channel();
        (Self { events, writer }, event_tx, outgoing_rx)
    }
}

// ============================================================================
// Transport
// ============================================================================

/// Opens sessions for endpoints.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Opens a session for `endpoint` at `url`.
    ///
    /// # Errors
    ///
    /// Returns a connection error if the session cannot be established; the
    /// registry treats it as an abnormal closure.
    async fn open(&self, endpoint: &Endpoint, url: &Url) -> Result<TransportSession>;

    /// Returns `true` for transports that synthesize traffic.
    fn is_simulated(&self) -> bool {
        false
    }
}

// ============================================================================
// Re-exports
// ============================================================================

pub use backoff::{BackoffPolicy, ReconnectDecision, ReconnectState};
pub use connection::{Connection, ConnectionState};
pub use memory::{MemorySession, MemoryTransport};
pub use registry::{EndpointRegistry, RegistrySettings};
pub use simulation::{Catalog, SimulatedTransport, SimulationOptions};
pub use websocket::WebSocketTransport;
