//! Proctor Live - realtime connection and event distribution for proctoring
//! dashboards.
//!
//! This library keeps one WebSocket connection per logical endpoint of a
//! proctoring backend, reconnects them with jittered exponential backoff and
//! fans every inbound message out to registered listeners and typed feeds.
//!
//! # Architecture
//!
//! The client follows a registry model:
//!
//! - **Endpoint registry**: at most one [`Connection`] per [`Endpoint`]
//! - **Listener registry**: callbacks per endpoint, delivered in order
//! - **Channels**: bounded typed histories folded from one message type
//!
//! Key design principles:
//!
//! - Lifecycle changes (`connection`, `error`, `max_reconnect_attempts`) are
//!   delivered through the same listener path as server traffic
//! - Every transport sits behind the [`Transport`](transport::Transport)
//!   trait; simulation and tests swap it out
//! - Timers are cancellable tasks; dropping the client cancels all work
//!
//! # Quick Start
//!
//! ```no_run
//! use proctor_live::{RealtimeClient, Result};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let client = RealtimeClient::builder()
//!         .base_url("ws://localhost:8000/ws")
//!         .build()?;
//!
//!     let violations = client.violations("violations")?;
//!     let _status = client.subscribe_type("violations", "connection", |envelope| {
//!         println!("{:?}", envelope.message());
//!     })?;
//!
//!     client.connect_with("violations", "bearer-token")?;
//!     tokio::time::sleep(std::time::Duration::from_secs(60)).await;
//!
//!     println!("alerts: {}", violations.with(|feed| feed.alert_count()));
//!     client.shutdown();
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`channels`] | Typed feeds: notifications, violations, trust scores, metrics |
//! | [`client`] | Client entry point and configuration |
//! | [`dispatch`] | Listener registry and subscriptions |
//! | [`error`] | Error types and [`Result`] alias |
//! | [`identifiers`] | Endpoint names and generated IDs |
//! | [`protocol`] | Wire message types |
//! | [`transport`] | Connections, reconnection and transports |

// ============================================================================
// Modules
// ============================================================================

/// Typed channel adapters.
pub mod channels;

/// Client entry point.
///
/// Use [`RealtimeClient::builder()`] to create a configured client.
pub mod client;

/// Listener registry.
pub mod dispatch;

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// Type-safe identifiers.
pub mod identifiers;

/// Wire message types.
pub mod protocol;

/// Connection management and transports.
pub mod transport;

// ============================================================================
// Re-exports
// ============================================================================

// Channel types
pub use channels::{Channel, Feed, MetricsFeed, NotificationFeed, TrustScoreFeed, ViolationFeed};

// Client types
pub use client::{ClientBuilder, RealtimeClient, RealtimeOptions};

// Dispatch types
pub use dispatch::{ListenerRegistry, Subscription};

// Error types
pub use error::{Error, Result};

// Identifier types
pub use identifiers::{ConnectionId, Endpoint, SubscriptionId};

// Protocol types
pub use protocol::{Envelope, Message};

// Transport types
pub use transport::{
    BackoffPolicy, Connection, ConnectionState, MemoryTransport, SimulatedTransport,
    SimulationOptions, Transport, WebSocketTransport,
};
