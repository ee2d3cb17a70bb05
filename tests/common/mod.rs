//! Shared helpers for integration scenarios.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use proctor_live::protocol::{ConnectionEvent, ConnectionStatus};
use proctor_live::{
    Envelope, MemoryTransport, Message, RealtimeClient, RealtimeOptions, Subscription,
};
use tokio::sync::mpsc;
use tokio::time::timeout;

/// Upper bound for waiting on one event; far beyond any backoff delay.
pub const EVENT_TIMEOUT: Duration = Duration::from_secs(600);

/// Installs a test subscriber honouring `RUST_LOG`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Builds a client on top of `transport`.
pub fn memory_client(transport: &MemoryTransport, options: RealtimeOptions) -> RealtimeClient {
    init_tracing();
    RealtimeClient::builder()
        .base_url("ws://proctor.test/ws")
        .options(options)
        .transport(Arc::new(transport.clone()))
        .build()
        .expect("client")
}

/// Collects every envelope delivered on one endpoint.
pub struct Recorder {
    events: mpsc::UnboundedReceiver<Envelope>,
    _subscription: Subscription,
}

impl Recorder {
    pub fn attach(client: &RealtimeClient, endpoint: &str) -> anyhow::Result<Self> {
        let (tx, events) = mpsc::unbounded_channel();
        let subscription = client.subscribe(endpoint, move |envelope| {
            let _ = tx.send(envelope.clone());
        })?;
        Ok(Self {
            events,
            _subscription: subscription,
        })
    }

    /// Waits for the next envelope.
    pub async fn next(&mut self) -> anyhow::Result<Envelope> {
        timeout(EVENT_TIMEOUT, self.events.recv())
            .await?
            .ok_or_else(|| anyhow::anyhow!("recorder closed"))
    }

    /// Waits for the next envelope of type `kind`, skipping others.
    pub async fn next_kind(&mut self, kind: &str) -> anyhow::Result<Envelope> {
        loop {
            let envelope = self.next().await?;
            if envelope.kind() == kind {
                return Ok(envelope);
            }
        }
    }

    /// Waits for the next `connection` event with `status`.
    pub async fn next_status(&mut self, status: ConnectionStatus) -> anyhow::Result<ConnectionEvent> {
        loop {
            if let Message::Connection(event) = self.next().await?.message()
                && event.status == status
            {
                return Ok(event.clone());
            }
        }
    }

    /// Returns what has been delivered so far without waiting.
    pub fn drain(&mut self) -> Vec<Envelope> {
        let mut drained = Vec::new();
        while let Ok(envelope) = self.events.try_recv() {
            drained.push(envelope);
        }
        drained
    }
}

/// Connection statuses among `envelopes`, in order.
pub fn statuses(envelopes: &[Envelope]) -> Vec<ConnectionStatus> {
    envelopes
        .iter()
        .filter_map(|envelope| match envelope.message() {
            Message::Connection(event) => Some(event.status),
            _ => None,
        })
        .collect()
}

/// Lets spawned tasks run until they block.
pub async fn settle() {
    for _ in 0..16 {
        tokio::task::yield_now().await;
    }
}
