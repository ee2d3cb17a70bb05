//! Bounded newest-first history.

// ============================================================================
// Imports
// ============================================================================

use std::collections::VecDeque;
use std::collections::vec_deque;
use std::iter::Rev;

use chrono::{DateTime, Utc};

use crate::protocol::Envelope;

// ============================================================================
// Stamped
// ============================================================================

/// A payload together with the timestamp of the envelope it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct Stamped<T> {
    /// Decoded payload.
    pub value: T,
    /// Envelope timestamp.
    pub timestamp: DateTime<Utc>,
}

impl<T> Stamped<T> {
    /// Pairs `value` with the timestamp of `envelope`.
    #[inline]
    #[must_use]
    pub fn from_envelope(envelope: &Envelope, value: T) -> Self {
        Self {
            value,
            timestamp: envelope.timestamp(),
        }
    }
}

// ============================================================================
// ChannelBuffer
// ============================================================================

/// Ring of at most `capacity` items, newest at the front.
///
/// Pushing past the capacity silently evicts the oldest item.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelBuffer<T> {
    items: VecDeque<T>,
    capacity: usize,
}

impl<T> ChannelBuffer<T> {
    /// Creates an empty buffer.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            items: VecDeque::with_capacity(capacity.min(1024)),
            capacity,
        }
    }

    /// Prepends `item`; returns the evicted item, if any.
    pub fn push(&mut self, item: T) -> Option<T> {
        self.items.push_front(item);
        if self.items.len() > self.capacity {
            self.items.pop_back()
        } else {
            None
        }
    }

    /// Iterates newest first.
    #[inline]
    pub fn recent(&self) -> vec_deque::Iter<'_, T> {
        self.items.iter()
    }

    /// Iterates in arrival order.
    #[inline]
    pub fn chronological(&self) -> Rev<vec_deque::Iter<'_, T>> {
        self.items.iter().rev()
    }

    /// Mutable iteration, newest first.
    #[inline]
    pub fn recent_mut(&mut self) -> vec_deque::IterMut<'_, T> {
        self.items.iter_mut()
    }

    /// Returns the newest item.
    #[inline]
    #[must_use]
    pub fn latest(&self) -> Option<&T> {
        self.items.front()
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    #[inline]
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Removes every item.
    #[inline]
    pub fn clear(&mut self) {
        self.items.clear();
    }
}

impl<T: Clone> ChannelBuffer<T> {
    /// Copies the items out, newest first.
    #[must_use]
    pub fn to_vec(&self) -> Vec<T> {
        self.items.iter().cloned().collect()
    }
}

// ============================================================================
// Tests
// ============================================================================
