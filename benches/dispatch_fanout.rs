//! Dispatch fan-out benchmark suite.
//!
//! Benchmarks delivery of inbound frames at different scales:
//! - Listener counts: 1, 10, 100
//! - End-to-end frames through an in-memory session into a typed feed
//!
//! Run with: cargo bench --bench dispatch_fanout
//! Results saved to: target/criterion/

use std::hint::black_box;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use proctor_live::{
    Endpoint, Envelope, ListenerRegistry, MemoryTransport, RealtimeClient, ViolationFeed,
};
use serde_json::json;
use tokio::runtime::Runtime;

// ============================================================================
// Benchmark Parameters
// ============================================================================

const LISTENER_COUNTS: &[usize] = &[1, 10, 100];
const FRAME_BATCH: usize = 1_000;

// ============================================================================
// Helper Functions
// ============================================================================

fn violation_frame(sequence: usize) -> String {
    json!({
        "type": "violation",
        "id": sequence,
        "violation_type": "tab_switch",
        "severity": if sequence % 4 == 0 { "critical" } else { "low" },
        "session_id": sequence % 16,
    })
    .to_string()
}

// ============================================================================
// Benchmark: Listener Fan-out
// ============================================================================

fn bench_fanout(c: &mut Criterion) {
    let endpoint = Endpoint::parse("violations").expect("endpoint");
    let envelope = Envelope::decode(&endpoint, &violation_frame(1)).expect("decode");

    let mut group = c.benchmark_group("fanout");
    for &count in LISTENER_COUNTS {
        let listeners = ListenerRegistry::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let subscriptions: Vec<_> = (0..count)
            .map(|_| {
                let hits = Arc::clone(&hits);
                listeners.subscribe(&endpoint, move |_| {
                    hits.fetch_add(1, Ordering::Relaxed);
                })
            })
            .collect();

        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(BenchmarkId::new("listeners", count), &count, |b, _| {
            b.iter(|| black_box(listeners.dispatch(black_box(&envelope))));
        });

        for subscription in subscriptions {
            subscription.unsubscribe();
        }
    }
    group.finish();
}

// ============================================================================
// Benchmark: Decode
// ============================================================================

fn bench_decode(c: &mut Criterion) {
    let endpoint = Endpoint::parse("violations").expect("endpoint");
    let frame = violation_frame(7);

    c.bench_function("decode_violation", |b| {
        b.iter(|| black_box(Envelope::decode(&endpoint, black_box(&frame))));
    });
}

// ============================================================================
// Benchmark: End-to-end Pipeline
// ============================================================================

fn bench_pipeline(c: &mut Criterion) {
    let rt = Runtime::new().expect("runtime");

    let mut group = c.benchmark_group("pipeline");
    group.throughput(Throughput::Elements(FRAME_BATCH as u64));
    group.measurement_time(Duration::from_secs(10));
    group.bench_function("memory_to_feed", |b| {
        b.to_async(&rt).iter(|| async {
            let transport = MemoryTransport::new();
            let client = RealtimeClient::builder()
                .transport(Arc::new(transport.clone()))
                .build()
                .expect("client");
            let feed = client
                .channel("violations", ViolationFeed::new(FRAME_BATCH))
                .expect("channel");

            client.connect("violations").expect("connect");
            let session = transport.next_session().await.expect("session");
            for sequence in 0..FRAME_BATCH {
                session.push_text(violation_frame(sequence));
            }
            while feed.with(ViolationFeed::total) < FRAME_BATCH {
                tokio::task::yield_now().await;
            }

            client.shutdown();
        });
    });
    group.finish();
}

criterion_group!(benches, bench_fanout, bench_decode, bench_pipeline);
criterion_main!(benches);
