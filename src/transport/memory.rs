//! In-process transport driven by the caller.
//!
//! Every `open` either fails (when refused) or hands out a fresh
//! [`MemorySession`]. The caller pushes frames, closes or fails the session
//! and inspects what the connection sent.

// ============================================================================
// Imports
// ============================================================================

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::{Notify, mpsc};
use url::Url;

use crate::error::{Error, Result};
use crate::identifiers::Endpoint;

use super::{Outgoing, Transport, TransportEvent, TransportSession};

// ============================================================================
// MemoryTransport
// ============================================================================

/// Transport whose sessions are scripted by the caller.
///
/// Cloning yields another handle to the same transport.
#[derive(Clone, Default)]
pub struct MemoryTransport {
    inner: Arc<MemoryInner>,
}

#[derive(Default)]
struct MemoryInner {
    opened: AtomicUsize,
    /// Number of upcoming opens to refuse.
    refuse: AtomicUsize,
    /// Refuse every open while set.
    refuse_all: Mutex<bool>,
    sessions: Mutex<VecDeque<MemorySession>>,
    session_ready: Notify,
}

impl fmt::Debug for MemoryTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryTransport")
            .field("opened", &self.open_count())
            .finish_non_exhaustive()
    }
}

impl MemoryTransport {
    /// Creates a transport that accepts every open.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of `open` calls, refused ones included.
    #[inline]
    #[must_use]
    pub fn open_count(&self) -> usize {
        self.inner.opened.load(Ordering::SeqCst)
    }

    /// Refuses the next `count` opens.
    pub fn refuse_next(&self, count: usize) {
        self.inner.refuse.store(count, Ordering::SeqCst);
    }

    /// Refuses every open while `refuse` is set.
    pub fn set_refuse(&self, refuse: bool) {
        *self.inner.refuse_all.lock() = refuse;
    }

    /// Waits for the next accepted session that has not been taken yet.
    ///
    /// Returns `None` only if the transport is dropped while waiting.
    pub async fn next_session(&self) -> Option<MemorySession> {
        loop {
            let notified = self.inner.session_ready.notified();
            if let Some(session) = self.inner.sessions.lock().pop_front() {
                return Some(session);
            }
            notified.await;
        }
    }

    fn refused(&self) -> bool {
        if *self.inner.refuse_all.lock() {
            return true;
        }
        self.inner
            .refuse
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn open(&self, endpoint: &Endpoint, url: &Url) -> Result<TransportSession> {
        self.inner.opened.fetch_add(1, Ordering::SeqCst);
        if self.refused() {
            return Err(Error::connection(format!("connection to {url} refused")));
        }

        let (session, events, outgoing) = TransportSession::pair();
        let handle = MemorySession {
            endpoint: endpoint.clone(),
            url: url.clone(),
            events,
            outgoing: Arc::new(Mutex::new(SentFrames {
                receiver: outgoing,
                log: Vec::new(),
            })),
        };

        self.inner.sessions.lock().push_back(handle);
        self.inner.session_ready.notify_one();
        Ok(session)
    }
}

// ============================================================================
// MemorySession
// ============================================================================

struct SentFrames {
    receiver: mpsc::UnboundedReceiver<Outgoing>,
    log: Vec<Outgoing>,
}

impl SentFrames {
    fn drain(&mut self) -> &[Outgoing] {
        while let Ok(frame) = self.receiver.try_recv() {
            self.log.push(frame);
        }
        &self.log
    }
}

/// Transport side of one in-memory session.
#[derive(Clone)]
pub struct MemorySession {
    endpoint: Endpoint,
    url: Url,
    events: mpsc::UnboundedSender<TransportEvent>,
    outgoing: Arc<Mutex<SentFrames>>,
}

impl fmt::Debug for MemorySession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemorySession")
            .field("endpoint", &self.endpoint)
            .field("url", &self.url.as_str())
            .finish_non_exhaustive()
    }
}

impl MemorySession {
    /// Returns the endpoint the session was opened for.
    #[inline]
    #[must_use]
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Returns the URL the session was opened with.
    #[inline]
    #[must_use]
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Delivers a text frame. Returns `false` once the connection is gone.
    pub fn push_text(&self, text: impl Into<String>) -> bool {
        self.events.send(TransportEvent::Text(text.into())).is_ok()
    }

    /// Closes the session from the peer side.
    pub fn close(&self, code: u16, reason: impl Into<String>) -> bool {
        self.events
            .send(TransportEvent::Closed {
                code,
                reason: reason.into(),
            })
            .is_ok()
    }

    /// Fails the session.
    pub fn fail(&self, message: impl Into<String>) -> bool {
        self.events.send(TransportEvent::Failed(message.into())).is_ok()
    }

    /// Returns the text frames the connection sent so far.
    #[must_use]
    pub fn sent(&self) -> Vec<String> {
        self.outgoing
            .lock()
            .drain()
            .iter()
            .filter_map(|frame| match frame {
                Outgoing::Text(text) => Some(text.clone()),
                Outgoing::Close { .. } => None,
            })
            .collect()
    }

    /// Returns the close code the connection sent, if any.
    #[must_use]
    pub fn close_code(&self) -> Option<u16> {
        self.outgoing.lock().drain().iter().find_map(|frame| match frame {
            Outgoing::Close { code, .. } => Some(*code),
            Outgoing::Text(_) => None,
        })
    }

    /// Returns `true` once the connection dropped its end of the session.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.events.is_closed()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn open_args() -> (Endpoint, Url) {
        (
            Endpoint::parse("notifications").expect("endpoint"),
            Url::parse("ws://localhost/ws/notifications").expect("url"),
        )
    }

    #[tokio::test]
    async fn test_refuse_next() {
        let transport = MemoryTransport::new();
        let (endpoint, url) = open_args();
        transport.refuse_next(1);

        assert!(transport.open(&endpoint, &url).await.is_err());
        assert!(transport.open(&endpoint, &url).await.is_ok());
        assert_eq!(transport.open_count(), 2);
    }

    #[tokio::test]
    async fn test_session_round_trip() {
        let transport = MemoryTransport::new();
        let (endpoint, url) = open_args();

        let mut session = transport.open(&endpoint, &url).await.expect("open");
        let handle = transport.next_session().await.expect("session");

        assert!(handle.push_text("{}"));
        assert_eq!(session.events.recv().await, Some(TransportEvent::Text("{}".into())));

        session
            .writer
            .send(Outgoing::Text("hello".into()))
            .expect("write");
        assert_eq!(handle.sent(), vec!["hello".to_string()]);

        drop(session);
        assert!(handle.is_closed());
    }
}
