//! Lifecycle, send and delivery scenarios over the in-memory transport.

mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use proctor_live::protocol::{ConnectionStatus, ViolationType};
use proctor_live::transport::CLOSE_NORMAL;
use proctor_live::{
    ConnectionState, MemoryTransport, Message, NotificationFeed, RealtimeOptions, TrustScoreFeed,
    ViolationFeed,
};
use serde_json::{Value, json};
use tokio::time::sleep;

use common::{Recorder, memory_client, settle, statuses};

#[tokio::test(start_paused = true)]
async fn test_connect_is_idempotent_while_connecting_and_open() -> anyhow::Result<()> {
    let transport = MemoryTransport::new();
    let client = memory_client(&transport, RealtimeOptions::new());
    let mut recorder = Recorder::attach(&client, "notifications")?;

    let first = client.connect("notifications")?;
    let second = client.connect("notifications")?;
    assert!(first.ptr_eq(&second));

    recorder.next_status(ConnectionStatus::Open).await?;
    let third = client.connect("notifications")?;
    assert_eq!(third.id(), first.id());
    assert_eq!(transport.open_count(), 1);
    assert_eq!(client.connection_count(), 1);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_emits_clean_close() -> anyhow::Result<()> {
    let transport = MemoryTransport::new();
    let client = memory_client(&transport, RealtimeOptions::new());
    let mut recorder = Recorder::attach(&client, "violations")?;

    let connection = client.connect("violations")?;
    let session = transport.next_session().await.expect("session");
    recorder.next_status(ConnectionStatus::Open).await?;

    assert!(client.disconnect("violations"));
    let closed = recorder.next_status(ConnectionStatus::Closed).await?;
    assert_eq!(closed.code, Some(CLOSE_NORMAL));
    assert_eq!(connection.state(), ConnectionState::Closed);
    assert_eq!(session.close_code(), Some(CLOSE_NORMAL));

    sleep(Duration::from_secs(60)).await;
    assert_eq!(transport.open_count(), 1);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_lifecycle_status_order() -> anyhow::Result<()> {
    let transport = MemoryTransport::new();
    let client = memory_client(&transport, RealtimeOptions::new());
    let mut recorder = Recorder::attach(&client, "exams")?;

    client.connect("exams")?;
    let mut seen = Vec::new();
    while seen.last() != Some(&ConnectionStatus::Open) {
        seen.extend(statuses(&[recorder.next().await?]));
    }
    client.disconnect("exams");
    while seen.last() != Some(&ConnectionStatus::Closed) {
        seen.extend(statuses(&[recorder.next().await?]));
    }

    assert_eq!(
        seen,
        vec![
            ConnectionStatus::Connecting,
            ConnectionStatus::Open,
            ConnectionStatus::Closing,
            ConnectionStatus::Closed,
        ]
    );
    settle().await;
    assert!(recorder.drain().is_empty());
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_send_semantics() -> anyhow::Result<()> {
    let transport = MemoryTransport::new();
    let client = memory_client(&transport, RealtimeOptions::new());
    let mut recorder = Recorder::attach(&client, "proctoring/7")?;

    assert!(!client.send("proctoring/7", "flag_session", json!({})));

    client.connect("proctoring/7")?;
    let session = transport.next_session().await.expect("session");
    recorder.next_status(ConnectionStatus::Open).await?;

    let flag = json!({ "session_id": 7, "reason": "manual" });
    assert!(client.send("proctoring/7", "flag_session", flag));
    assert!(client.send("proctoring/7", "note", json!("look left")));
    assert!(!client.send("proctoring/7", "", json!({})));
    assert!(!client.send("proctoring/7", "connection", json!({})));
    assert!(!client.send("proctoring/7", "max_reconnect_attempts", json!({})));
    assert!(!client.send("exams", "flag_session", json!({})));

    let sent: Vec<Value> = session
        .sent()
        .iter()
        .map(|text| serde_json::from_str(text))
        .collect::<Result<_, _>>()?;
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[0]["type"], "flag_session");
    assert_eq!(sent[0]["session_id"], 7);
    assert_eq!(sent[0]["reason"], "manual");
    assert_eq!(sent[1]["type"], "note");
    assert_eq!(sent[1]["payload"], "look left");
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_heartbeat_sent_on_interval() -> anyhow::Result<()> {
    let transport = MemoryTransport::new();
    let options = RealtimeOptions::new().with_heartbeat_interval(Duration::from_secs(30));
    let client = memory_client(&transport, options);
    let mut recorder = Recorder::attach(&client, "notifications")?;

    client.connect("notifications")?;
    let session = transport.next_session().await.expect("session");
    recorder.next_status(ConnectionStatus::Open).await?;

    sleep(Duration::from_secs(95)).await;
    let heartbeats = session
        .sent()
        .iter()
        .filter(|text| text.contains("\"heartbeat\""))
        .count();
    assert_eq!(heartbeats, 3);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_listener_panic_is_isolated() -> anyhow::Result<()> {
    let transport = MemoryTransport::new();
    let client = memory_client(&transport, RealtimeOptions::new());
    let delivered = Arc::new(AtomicUsize::new(0));

    let before = Arc::clone(&delivered);
    let _a = client.subscribe_type("notifications", "notification", move |_| {
        before.fetch_add(1, Ordering::SeqCst);
    })?;
    let _b = client.subscribe_type("notifications", "notification", |_| {
        panic!("listener failure");
    })?;
    let after = Arc::clone(&delivered);
    let _c = client.subscribe_type("notifications", "notification", move |_| {
        after.fetch_add(1, Ordering::SeqCst);
    })?;
    let mut recorder = Recorder::attach(&client, "notifications")?;

    client.connect("notifications")?;
    let session = transport.next_session().await.expect("session");
    session.push_text(json!({ "type": "notification", "title": "one" }).to_string());
    session.push_text(json!({ "type": "notification", "title": "two" }).to_string());
    recorder.next_kind("notification").await?;
    recorder.next_kind("notification").await?;

    assert_eq!(delivered.load(Ordering::SeqCst), 4);
    assert!(client.connection("notifications").is_some_and(|c| c.is_open()));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_unsubscribe_removes_only_that_listener() -> anyhow::Result<()> {
    let transport = MemoryTransport::new();
    let client = memory_client(&transport, RealtimeOptions::new());
    let first = Arc::new(AtomicUsize::new(0));
    let second = Arc::new(AtomicUsize::new(0));

    let counter = Arc::clone(&first);
    let a = client.subscribe("exams", move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    })?;
    let counter = Arc::clone(&second);
    let _b = client.subscribe("exams", move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    })?;
    assert_eq!(client.listeners().total_listeners(), 2);

    assert!(a.unsubscribe());
    assert_eq!(client.listeners().total_listeners(), 1);

    let mut recorder = Recorder::attach(&client, "exams")?;
    client.connect("exams")?;
    let session = transport.next_session().await.expect("session");
    let update = json!({ "type": "exam_update", "exam_id": 3, "status": "completed" });
    session.push_text(update.to_string());
    recorder.next_kind("exam_update").await?;

    assert_eq!(first.load(Ordering::SeqCst), 0);
    assert!(second.load(Ordering::SeqCst) >= 2);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_listener_may_disconnect_reentrantly() -> anyhow::Result<()> {
    let transport = MemoryTransport::new();
    let client = memory_client(&transport, RealtimeOptions::new());

    let handle = client.clone();
    let _stopper = client.subscribe_type("violations", "violation", move |_| {
        handle.disconnect("violations");
    })?;
    let mut recorder = Recorder::attach(&client, "violations")?;

    client.connect("violations")?;
    let session = transport.next_session().await.expect("session");
    session.push_text(json!({ "type": "violation", "violation_type": "tab_switch" }).to_string());

    recorder.next_status(ConnectionStatus::Closed).await?;
    assert_eq!(client.connection_count(), 0);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_malformed_frames_are_dropped() -> anyhow::Result<()> {
    let transport = MemoryTransport::new();
    let client = memory_client(&transport, RealtimeOptions::new());
    let mut recorder = Recorder::attach(&client, "notifications")?;

    client.connect("notifications")?;
    let session = transport.next_session().await.expect("session");
    recorder.next_status(ConnectionStatus::Open).await?;

    session.push_text("not json");
    session.push_text(json!({ "title": "missing type" }).to_string());
    session.push_text(json!({ "type": "notification", "priority": 17 }).to_string());
    session.push_text(json!({ "type": "notification", "title": "valid" }).to_string());

    let envelope = recorder.next().await?;
    match envelope.message() {
        Message::Notification(notification) => assert_eq!(notification.title, "valid"),
        other => panic!("unexpected {other:?}"),
    }
    assert!(client.connection("notifications").is_some_and(|c| c.is_open()));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_trust_updates_without_score_are_dropped() -> anyhow::Result<()> {
    let transport = MemoryTransport::new();
    let client = memory_client(&transport, RealtimeOptions::new());
    let trust = client.trust_scores("trust-scores")?;
    let mut recorder = Recorder::attach(&client, "trust-scores")?;

    client.connect("trust-scores")?;
    let session = transport.next_session().await.expect("session");
    recorder.next_status(ConnectionStatus::Open).await?;

    session.push_text(json!({ "type": "trust_score_update", "session_id": 7 }).to_string());
    session.push_text(json!({ "type": "trust_score_update", "score": null }).to_string());
    let nested = json!({
        "type": "trust_score_update",
        "data": { "trust_score": 85.0, "session_id": 7 },
    });
    session.push_text(nested.to_string());
    session.push_text(json!({ "type": "student_feed", "session_id": 7 }).to_string());

    let first = recorder.next().await?;
    assert!(matches!(first.message(), Message::TrustScoreUpdate(update) if update.score == 85.0));
    recorder.next_kind("student_feed").await?;

    assert_eq!(trust.with(TrustScoreFeed::len), 1);
    assert!(trust.with(TrustScoreFeed::low_score_values).is_empty());
    assert_eq!(trust.with(TrustScoreFeed::average), Some(85.0));
    assert_eq!(trust.with(|feed| feed.latest_for_session(7).map(|u| u.score)), Some(85.0));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_remote_cannot_forge_lifecycle_events() -> anyhow::Result<()> {
    let transport = MemoryTransport::new();
    let client = memory_client(&transport, RealtimeOptions::new());
    let mut recorder = Recorder::attach(&client, "notifications")?;

    client.connect("notifications")?;
    let session = transport.next_session().await.expect("session");
    recorder.next_status(ConnectionStatus::Open).await?;

    session.push_text(json!({ "type": "connection", "status": "closed" }).to_string());
    let envelope = recorder.next().await?;
    assert!(matches!(envelope.message(), Message::Unknown { kind, .. } if kind == "connection"));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_channels_fold_live_traffic() -> anyhow::Result<()> {
    let transport = MemoryTransport::new();
    let client = memory_client(&transport, RealtimeOptions::new());
    let trust = client.trust_scores("proctoring/42")?;
    let violations = client.violations("proctoring/42")?;
    let notifications = client.notifications("proctoring/42")?;
    let mut recorder = Recorder::attach(&client, "proctoring/42")?;

    client.connect("proctoring/42")?;
    let session = transport.next_session().await.expect("session");
    for score in [65, 55, 80, 40] {
        let frame = json!({ "type": "trust_score_update", "score": score, "session_id": 42 });
        session.push_text(frame.to_string());
    }
    let reports = [
        ("tab_switch", "high"),
        ("tab_switch", "low"),
        ("phone_detected", "critical"),
    ];
    for (kind, severity) in reports {
        let frame = json!({ "type": "violation", "violation_type": kind, "severity": severity });
        session.push_text(frame.to_string());
    }
    session.push_text(json!({ "type": "student_feed", "session_id": 42 }).to_string());
    recorder.next_kind("student_feed").await?;

    assert_eq!(trust.with(TrustScoreFeed::low_score_values), vec![55.0, 40.0]);
    assert_eq!(trust.with(|feed| feed.latest().map(|u| u.score)), Some(40.0));
    assert_eq!(violations.with(ViolationFeed::alert_count), 2);
    assert_eq!(violations.with(|feed| feed.count_of(ViolationType::TabSwitch)), 2);
    assert_eq!(notifications.with(NotificationFeed::len), 0);

    violations.clear();
    assert_eq!(violations.with(ViolationFeed::total), 0);
    assert!(violations.is_attached());
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_delivery_follows_transport_order() -> anyhow::Result<()> {
    let transport = MemoryTransport::new();
    let client = memory_client(&transport, RealtimeOptions::new());
    let order = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&order);
    let _subscription = client.subscribe_type("metrics", "system_metrics", move |envelope| {
        if let Message::SystemMetrics(sample) = envelope.message() {
            sink.lock().push(sample.cpu_usage);
        }
    })?;
    let mut recorder = Recorder::attach(&client, "metrics")?;

    client.connect("metrics")?;
    let session = transport.next_session().await.expect("session");
    for cpu in [10.0, 20.0, 30.0, 40.0, 50.0] {
        session.push_text(json!({ "type": "system_metrics", "cpu_usage": cpu }).to_string());
    }
    for _ in 0..5 {
        recorder.next_kind("system_metrics").await?;
    }

    assert_eq!(*order.lock(), vec![10.0, 20.0, 30.0, 40.0, 50.0]);
    Ok(())
}
