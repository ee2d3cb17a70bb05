//! Per-endpoint listener registry.
//!
//! Listeners are stored in registration order. Dispatch copies the current
//! list out of the lock and invokes each callback inside its own panic
//! boundary, so a callback may subscribe, unsubscribe or disconnect while a
//! message is being delivered.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tracing::{trace, warn};

use crate::identifiers::{Endpoint, SubscriptionId};
use crate::protocol::Envelope;

// ============================================================================
// Types
// ============================================================================

/// Listener callback type.
///
/// Called synchronously on the connection task for every delivered envelope.
pub type Listener = Arc<dyn Fn(&Envelope) + Send + Sync>;

/// One registration.
struct ListenerEntry {
    id: SubscriptionId,
    /// Only envelopes of this type are delivered when set.
    filter: Option<String>,
    callback: Listener,
}

impl ListenerEntry {
    #[inline]
    fn accepts(&self, envelope: &Envelope) -> bool {
        self.filter
            .as_deref()
            .is_none_or(|kind| kind == envelope.kind())
    }
}

/// Map of endpoints to their listeners.
type ListenerMap = FxHashMap<Endpoint, Vec<Arc<ListenerEntry>>>;

// ============================================================================
// ListenerRegistry
// ============================================================================

/// Pub/sub dispatcher keyed by endpoint.
///
/// Cloning yields another handle to the same registry.
#[derive(Clone, Default)]
pub struct ListenerRegistry {
    listeners: Arc<Mutex<ListenerMap>>,
}

impl fmt::Debug for ListenerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerRegistry")
            .field("listeners", &self.total_listeners())
            .finish()
    }
}

impl ListenerRegistry {
    /// Creates an empty registry.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `callback` for every envelope delivered on `endpoint` from
    /// now on.
    pub fn subscribe<F>(&self, endpoint: &Endpoint, callback: F) -> Subscription
    where
        F: Fn(&Envelope) + Send + Sync + 'static,
    {
        self.insert(endpoint, None, Arc::new(callback))
    }

    /// Registers `callback` for envelopes of type `kind` on `endpoint`.
    pub fn subscribe_type<F>(
        &self,
        endpoint: &Endpoint,
        kind: impl Into<String>,
        callback: F,
    ) -> Subscription
    where
        F: Fn(&Envelope) + Send + Sync + 'static,
    {
        self.insert(endpoint, Some(kind.into()), Arc::new(callback))
    }

    /// Delivers `envelope` to the listeners of its endpoint.
    ///
    /// Returns the number of callbacks that completed without panicking.
    pub fn dispatch(&self, envelope: &Envelope) -> usize {
        let snapshot: Vec<Arc<ListenerEntry>> = {
            let listeners = self.listeners.lock();
            match listeners.get(envelope.endpoint()) {
                Some(entries) => entries.clone(),
                None => return 0,
            }
        };

        let mut delivered = 0;
        for entry in snapshot.iter().filter(|entry| entry.accepts(envelope)) {
            let outcome = catch_unwind(AssertUnwindSafe(|| (entry.callback)(envelope)));
            match outcome {
                Ok(()) => delivered += 1,
                Err(panic) => {
                    warn!(
                        endpoint = %envelope.endpoint(),
                        subscription = %entry.id,
                        kind = envelope.kind(),
                        panic = panic_message(&panic),
                        "Listener panicked; continuing delivery"
                    );
                }
            }
        }

        trace!(endpoint = %envelope.endpoint(), kind = envelope.kind(), delivered, "Dispatched");
        delivered
    }

    /// Returns the number of listeners registered on `endpoint`.
    #[must_use]
    pub fn listener_count(&self, endpoint: &Endpoint) -> usize {
        self.listeners.lock().get(endpoint).map_or(0, Vec::len)
    }

    /// Returns the number of listeners across all endpoints.
    #[must_use]
    pub fn total_listeners(&self) -> usize {
        self.listeners.lock().values().map(Vec::len).sum()
    }

    fn insert(&self, endpoint: &Endpoint, filter: Option<String>, callback: Listener) -> Subscription {
        let id = SubscriptionId::next();
        self.listeners
            .lock()
            .entry(endpoint.clone())
            .or_default()
            .push(Arc::new(ListenerEntry {
                id,
                filter,
                callback,
            }));

        trace!(endpoint = %endpoint, subscription = %id, "Listener registered");

        Subscription {
            id,
            endpoint: endpoint.clone(),
            listeners: Arc::downgrade(&self.listeners),
        }
    }
}

/// Removes one registration; empty endpoint lists are dropped.
fn remove(listeners: &Mutex<ListenerMap>, endpoint: &Endpoint, id: SubscriptionId) -> bool {
    let mut listeners = listeners.lock();
    let Some(entries) = listeners.get_mut(endpoint) else {
        return false;
    };

    let before = entries.len();
    entries.retain(|entry| entry.id != id);
    let removed = entries.len() != before;

    if entries.is_empty() {
        listeners.remove(endpoint);
    }
    removed
}

/// Extracts a printable message from a panic payload.
fn panic_message(panic: &(dyn std::any::Any + Send)) -> &str {
    panic
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| panic.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("<non-string panic>")
}

// ============================================================================
// Subscription
// ============================================================================

/// Handle to one listener registration.
///
/// Dropping the handle does not unsubscribe; call [`Subscription::unsubscribe`].
/// The handle holds only a weak reference to the registry.
#[must_use = "the listener stays registered until unsubscribe() is called"]
pub struct Subscription {
    id: SubscriptionId,
    endpoint: Endpoint,
    listeners: Weak<Mutex<ListenerMap>>,
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("endpoint", &self.endpoint)
            .finish_non_exhaustive()
    }
}

impl Subscription {
    /// Returns the subscription ID.
    #[inline]
    #[must_use]
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Returns the subscribed endpoint.
    #[inline]
    #[must_use]
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Returns `true` while the registration is still present.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.listeners.upgrade().is_some_and(|listeners| {
            listeners
                .lock()
                .get(&self.endpoint)
                .is_some_and(|entries| entries.iter().any(|entry| entry.id == self.id))
        })
    }

    /// Removes exactly this registration.
    ///
    /// Returns `false` if the registry is gone or the registration was
    /// already removed.
    pub fn unsubscribe(self) -> bool {
        let Some(listeners) = self.listeners.upgrade() else {
            return false;
        };
        let removed = remove(&listeners, &self.endpoint, self.id);
        trace!(endpoint = %self.endpoint, subscription = %self.id, removed, "Listener removed");
        removed
    }
}

// ============================================================================
// Tests
// ============================================================================
