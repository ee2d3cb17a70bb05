//! Listener registry (pub/sub dispatcher).
//!
//! Every inbound message, and every lifecycle event (`connection`, `error`,
//! `max_reconnect_attempts`), reaches subscribers through
//! [`ListenerRegistry::dispatch`].
//!
//! # Delivery Guarantees
//!
//! - Per endpoint, envelopes arrive in transport order
//! - Listeners are invoked in registration order
//! - A panicking listener does not affect the others
//! - No backlog: a listener sees only envelopes dispatched after it subscribed

// ============================================================================
// Submodules
// ============================================================================

/// Listener storage, dispatch and subscription handles.
pub mod listeners;

// ============================================================================
// Re-exports
// ============================================================================

pub use listeners::{Listener, ListenerRegistry, Subscription};
