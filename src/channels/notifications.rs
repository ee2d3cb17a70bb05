//! Notification feed.

use crate::protocol::{Envelope, Message, Notification, NotificationPriority, kinds};

use super::Feed;
use super::buffer::{ChannelBuffer, Stamped};

/// Default number of notifications kept.
pub const DEFAULT_NOTIFICATION_CAP: usize = 50;

/// Recent notifications with an unread count.
#[derive(Debug, Clone, PartialEq)]
pub struct NotificationFeed {
    buffer: ChannelBuffer<Stamped<Notification>>,
}

impl Default for NotificationFeed {
    fn default() -> Self {
        Self::new(DEFAULT_NOTIFICATION_CAP)
    }
}

impl NotificationFeed {
    /// Creates a feed keeping at most `capacity` notifications.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            buffer: ChannelBuffer::new(capacity),
        }
    }

    /// Notifications, newest first.
    pub fn recent(&self) -> impl Iterator<Item = &Stamped<Notification>> {
        self.buffer.recent()
    }

    /// Newest notification.
    #[must_use]
    pub fn latest(&self) -> Option<&Notification> {
        self.buffer.latest().map(|stamped| &stamped.value)
    }

    /// Number of buffered notifications not yet read.
    #[must_use]
    pub fn unread_count(&self) -> usize {
        self.buffer.recent().filter(|n| !n.value.is_read).count()
    }

    /// Unread notifications at `High` priority or above.
    #[must_use]
    pub fn urgent_unread(&self) -> usize {
        self.buffer
            .recent()
            .filter(|n| !n.value.is_read && n.value.priority >= NotificationPriority::High)
            .count()
    }

    /// Marks the notification with `id` read. Returns `false` if it is not
    /// buffered or already read.
    pub fn mark_read(&mut self, id: u64) -> bool {
        self.buffer
            .recent_mut()
            .find(|n| n.value.id == Some(id))
            .is_some_and(|n| !std::mem::replace(&mut n.value.is_read, true))
    }

    /// Marks every buffered notification read; returns how many changed.
    pub fn mark_all_read(&mut self) -> usize {
        let mut changed = 0;
        for n in self.buffer.recent_mut().filter(|n| !n.value.is_read) {
            n.value.is_read = true;
            changed += 1;
        }
        changed
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }
}

impl Feed for NotificationFeed {
    const KIND: &'static str = kinds::NOTIFICATION;

    fn ingest(&mut self, envelope: &Envelope) {
        if let Message::Notification(notification) = envelope.message() {
            self.buffer
                .push(Stamped::from_envelope(envelope, notification.clone()));
        }
    }

    fn clear(&mut self) {
        self.buffer.clear();
    }
}
