//! End-to-end pipeline tests.
//!
//! Readers are fed from in-memory sources, preferences live in an in-memory
//! SQLite database and deliveries are captured by a recording sink.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio_util::sync::CancellationToken;

use notify_router::admission::controller::user_key;
use notify_router::admission::{AdmissionController, InMemoryCounterStore};
use notify_router::config::{AdmissionConfig, ResolverConfig, SchedulerConfig};
use notify_router::database::repositories::SqlxPreferenceStore;
use notify_router::database::{init_pool, run_migrations};
use notify_router::delivery::MemorySink;
use notify_router::domain::{Priority, channel};
use notify_router::ingest::{MemorySource, MemorySourceHandle};
use notify_router::pipeline::{NotificationProcessor, PipelineStats, run_pipeline};
use notify_router::routing::ChannelResolver;

struct Harness {
    counters: Arc<InMemoryCounterStore>,
    preferences: Arc<SqlxPreferenceStore>,
    sink: Arc<MemorySink>,
    stats: Arc<PipelineStats>,
    sources: Vec<MemorySource>,
    handles: Vec<MemorySourceHandle>,
    scheduler: SchedulerConfig,
}

impl Harness {
    async fn new() -> Self {
        let pool = init_pool("sqlite::memory:", 1)
            .await
            .expect("Failed to create test pool");
        run_migrations(&pool).await.expect("Failed to run migrations");

        let mut sources = Vec::new();
        let mut handles = Vec::new();
        for band in Priority::ALL {
            let (source, handle) = MemorySource::new(band);
            sources.push(source);
            handles.push(handle);
        }

        Self {
            counters: Arc::new(InMemoryCounterStore::new()),
            preferences: Arc::new(SqlxPreferenceStore::new(pool, channel::default_channel_map())),
            sink: Arc::new(MemorySink::new()),
            stats: Arc::new(PipelineStats::new()),
            sources,
            handles,
            scheduler: SchedulerConfig {
                decision_pause: Duration::ZERO,
                ..Default::default()
            },
        }
    }

    fn handle(&self, band: Priority) -> &MemorySourceHandle {
        &self.handles[band.index()]
    }

    fn publish(&self, band: Priority, id: &str, user: &str, event_type: &str) {
        self.handle(band).push_json(&json!({
            "id": id,
            "user_id": user,
            "event_type": event_type,
            "content": "hello",
            "created_at": 1_700_000_000,
            "priority": band.as_str(),
        }));
    }

    /// Run until every queued message has been processed.
    async fn drain(self) -> Drained {
        for handle in &self.handles {
            handle.finish();
        }
        let processor = NotificationProcessor::new(
            AdmissionController::new(self.counters.clone(), AdmissionConfig::default()),
            ChannelResolver::new(self.preferences.clone(), ResolverConfig::default()),
            self.sink.clone(),
            self.stats.clone(),
        );

        tokio::time::timeout(
            Duration::from_secs(5),
            run_pipeline(
                self.sources,
                processor,
                &self.scheduler,
                self.stats.clone(),
                CancellationToken::new(),
                Duration::from_secs(1),
            ),
        )
        .await
        .expect("pipeline should drain")
        .expect("pipeline should succeed");

        Drained {
            counters: self.counters,
            sink: self.sink,
            stats: self.stats,
            handles: self.handles,
        }
    }
}

struct Drained {
    counters: Arc<InMemoryCounterStore>,
    sink: Arc<MemorySink>,
    stats: Arc<PipelineStats>,
    handles: Vec<MemorySourceHandle>,
}

#[tokio::test]
async fn test_round_trip_security_alert() {
    let harness = Harness::new().await;
    harness.preferences.upsert_user("u1", true).await.unwrap();
    harness.preferences.set_channel("u1", channel::EMAIL, true).await.unwrap();
    for name in [channel::EMAIL, channel::IN_APP] {
        harness
            .preferences
            .set_event_channel("u1", "security_alert", name, true)
            .await
            .unwrap();
    }
    harness.publish(Priority::High, "n1", "u1", "security_alert");

    let done = harness.drain().await;

    let emitted = done.sink.emitted();
    assert_eq!(emitted.len(), 1);
    assert_eq!(emitted[0].record.id, "n1");
    assert_eq!(emitted[0].record.priority, Priority::High);
    assert_eq!(emitted[0].channels, vec!["email", "in-app"]);
    assert_eq!(done.counters.peek(&user_key("u1")), 1);
    assert_eq!(done.handles[Priority::High.index()].consumed(), vec![0]);
}

#[tokio::test]
async fn test_rate_limit_at_band_limit() {
    let harness = Harness::new().await;
    let now = chrono::Utc::now().timestamp_millis();
    harness.counters.seed(&user_key("u1"), 100, now - 60_000);
    harness.publish(Priority::High, "n101", "u1", "security_alert");

    let done = harness.drain().await;

    assert!(done.sink.is_empty());
    assert_eq!(done.counters.peek(&user_key("u1")), 100);
    assert_eq!(done.stats.snapshot().rate_limited, 1);
}

#[tokio::test]
async fn test_poison_message_skipped() {
    let harness = Harness::new().await;
    harness.handle(Priority::Medium).push("{\"id\": ");
    harness.publish(Priority::Medium, "n2", "u2", "comment");

    let done = harness.drain().await;

    let snapshot = done.stats.snapshot();
    assert_eq!(snapshot.poison, 1);
    assert_eq!(snapshot.delivered, 1);
    assert_eq!(done.handles[Priority::Medium.index()].consumed(), vec![0, 1]);
    // Unknown user gets the default matrix.
    assert_eq!(done.sink.emitted()[0].channels, vec!["email", "in-app"]);
}

#[tokio::test]
async fn test_failsafe_floor_for_high_priority() {
    let harness = Harness::new().await;
    harness.preferences.upsert_user("u3", true).await.unwrap();
    for name in [channel::EMAIL, channel::IN_APP, channel::PUSH, channel::WHATSAPP, channel::SMS] {
        harness.preferences.set_channel("u3", name, false).await.unwrap();
    }
    harness.publish(Priority::High, "h", "u3", "payment_failed");
    harness.publish(Priority::Low, "l", "u3", "newsletter");

    let done = harness.drain().await;

    let emitted = done.sink.emitted();
    assert_eq!(emitted.len(), 1);
    assert_eq!(emitted[0].record.id, "h");
    assert_eq!(emitted[0].channels, vec![channel::IN_APP]);
    assert_eq!(done.stats.snapshot().undeliverable, 1);
}

#[tokio::test]
async fn test_backpressure_delivers_everything() {
    let mut harness = Harness::new().await;
    harness.scheduler.capacity_low = 1;
    for i in 0..15 {
        harness.publish(Priority::Low, &format!("l{}", i), &format!("user-{}", i), "follow");
    }

    let done = harness.drain().await;

    assert_eq!(done.sink.len(), 15);
    assert_eq!(done.handles[Priority::Low.index()].consumed().len(), 15);
    let ids: Vec<_> = done.sink.emitted().into_iter().map(|n| n.record.id).collect();
    let expected: Vec<_> = (0..15).map(|i| format!("l{}", i)).collect();
    assert_eq!(ids, expected, "band order must be preserved");
}

#[tokio::test]
async fn test_publish_failure_does_not_stop_pipeline() {
    let harness = Harness::new().await;
    harness.sink.set_failing(true);
    harness.publish(Priority::Medium, "m1", "u1", "message");
    harness.publish(Priority::Medium, "m2", "u2", "message");

    let done = harness.drain().await;

    let snapshot = done.stats.snapshot();
    assert_eq!(snapshot.publish_failures, 2);
    assert_eq!(snapshot.admitted, 2);
    assert!(done.sink.is_empty());
}

#[tokio::test]
async fn test_cancellation_stops_idle_pipeline() {
    let harness = Harness::new().await;
    let processor = NotificationProcessor::new(
        AdmissionController::new(harness.counters.clone(), AdmissionConfig::default()),
        ChannelResolver::new(harness.preferences.clone(), ResolverConfig::default()),
        harness.sink.clone(),
        harness.stats.clone(),
    );
    let cancel = CancellationToken::new();
    let task = tokio::spawn({
        let cancel = cancel.clone();
        let stats = harness.stats.clone();
        let scheduler = harness.scheduler.clone();
        async move {
            run_pipeline(
                harness.sources,
                processor,
                &scheduler,
                stats,
                cancel,
                Duration::from_secs(1),
            )
            .await
        }
    });

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!task.is_finished());
    cancel.cancel();

    tokio::time::timeout(Duration::from_secs(3), task)
        .await
        .expect("pipeline should stop after cancellation")
        .unwrap()
        .unwrap();
    for handle in &harness.handles {
        assert!(handle.is_closed());
    }
}
