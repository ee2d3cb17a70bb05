//! Realtime client module.
//!
//! This module provides the main entry point for live proctoring traffic.
//!
//! # Components
//!
//! | Type | Description |
//! |------|-------------|
//! | [`RealtimeClient`] | Owns the endpoint and listener registries |
//! | [`ClientBuilder`] | Fluent configuration builder |
//! | [`RealtimeOptions`] | Reconnection, timeout and channel tuning |
//!
//! # Example
//!
//! ```no_run
//! use proctor_live::{RealtimeClient, Result};
//!
//! # async fn example() -> Result<()> {
//! let client = RealtimeClient::builder().simulation(true).build()?;
//!
//! let notifications = client.notifications("notifications")?;
//! client.connect("notifications")?;
//!
//! let unread = notifications.with(|feed| feed.unread_count());
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Submodules
// ============================================================================

/// Fluent builder pattern for client configuration.
pub mod builder;

/// Core client implementation.
pub mod core;

/// Reconnection, timeout and channel options.
pub mod options;

// ============================================================================
// Re-exports
// ============================================================================

pub use builder::ClientBuilder;
pub use core::RealtimeClient;
pub use options::RealtimeOptions;
