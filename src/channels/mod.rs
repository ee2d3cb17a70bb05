//! Typed channel adapters.
//!
//! A [`Channel`] subscribes once to an endpoint and folds every envelope of
//! its feed's type into a [`Feed`]: a bounded history plus derived state.
//!
//! # Feeds
//!
//! | Feed | Type | Default cap | Derived state |
//! |------|------|-------------|---------------|
//! | [`NotificationFeed`] | `notification` | 50 | unread count |
//! | [`ViolationFeed`] | `violation` | 100 | alert count, counts by type |
//! | [`TrustScoreFeed`] | `trust_score_update` | 20 | low-score list, average |
//! | [`MetricsFeed`] | `system_metrics` | 30 | latest, peak CPU, high-load count |
//!
//! # Example
//!
//! ```ignore
//! let channel = client.channel("notifications", NotificationFeed::default())?;
//! let unread = channel.with(|feed| feed.unread_count());
//! ```

// ============================================================================
// Submodules
// ============================================================================

/// Bounded newest-first buffer.
pub mod buffer;

/// System metrics feed.
pub mod metrics;

/// Notification feed.
pub mod notifications;

/// Trust-score feed.
pub mod trust_score;

/// Violation feed.
pub mod violations;

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use crate::dispatch::{ListenerRegistry, Subscription};
use crate::identifiers::Endpoint;
use crate::protocol::Envelope;

// ============================================================================
// Feed
// ============================================================================

/// Typed state folded from the envelopes of one message type.
pub trait Feed: Send + 'static {
    /// Wire type this feed accepts.
    const KIND: &'static str;

    /// Folds one envelope. Envelopes of other types are ignored.
    fn ingest(&mut self, envelope: &Envelope);

    /// Empties the history and resets derived state.
    fn clear(&mut self);
}

// ============================================================================
// Channel
// ============================================================================

/// A feed attached to one endpoint.
///
/// Dropping the channel detaches it.
pub struct Channel<F: Feed> {
    endpoint: Endpoint,
    feed: Arc<Mutex<F>>,
    subscription: Mutex<Option<Subscription>>,
}

impl<F: Feed + fmt::Debug> fmt::Debug for Channel<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Channel")
            .field("endpoint", &self.endpoint)
            .field("kind", &F::KIND)
            .field("attached", &self.is_attached())
            .finish()
    }
}

impl<F: Feed> Channel<F> {
    /// Subscribes `feed` to envelopes of type [`Feed::KIND`] on `endpoint`.
    pub fn attach(listeners: &ListenerRegistry, endpoint: &Endpoint, feed: F) -> Self {
        let feed = Arc::new(Mutex::new(feed));
        let sink = Arc::clone(&feed);
        let subscription = listeners.subscribe_type(endpoint, F::KIND, move |envelope| {
            sink.lock().ingest(envelope);
        });
        debug!(endpoint = %endpoint, kind = F::KIND, "Channel attached");

        Self {
            endpoint: endpoint.clone(),
            feed,
            subscription: Mutex::new(Some(subscription)),
        }
    }

    /// Returns the endpoint.
    #[inline]
    #[must_use]
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Reads the feed.
    pub fn with<R>(&self, read: impl FnOnce(&F) -> R) -> R {
        read(&self.feed.lock())
    }

    /// Updates the feed, e.g. to mark notifications read.
    pub fn with_mut<R>(&self, update: impl FnOnce(&mut F) -> R) -> R {
        update(&mut self.feed.lock())
    }

    /// Copies the feed.
    #[must_use]
    pub fn snapshot(&self) -> F
    where
        F: Clone,
    {
        self.feed.lock().clone()
    }

    /// Clears the feed; the subscription stays in place.
    pub fn clear(&self) {
        self.feed.lock().clear();
    }

    /// Returns `true` until [`Channel::detach`] is called.
    #[must_use]
    pub fn is_attached(&self) -> bool {
        self.subscription
            .lock()
            .as_ref()
            .is_some_and(Subscription::is_active)
    }

    /// Unsubscribes from the endpoint. The feed keeps its contents.
    pub fn detach(&self) -> bool {
        let subscription = self.subscription.lock().take();
        subscription.is_some_and(Subscription::unsubscribe)
    }
}

impl<F: Feed> Drop for Channel<F> {
    fn drop(&mut self) {
        self.detach();
    }
}

// ============================================================================
// Re-exports
// ============================================================================

pub use buffer::{ChannelBuffer, Stamped};
pub use metrics::MetricsFeed;
pub use notifications::NotificationFeed;
pub use trust_score::TrustScoreFeed;
pub use violations::ViolationFeed;

// ============================================================================
// Tests
// ============================================================================
