// File: moodmeter-core/tests/aggregation_tests.rs

use std::sync::Arc;
use std::time::Duration;
use chrono::{DateTime, Duration as ChronoDuration, Utc};

use moodmeter_common::models::{Alert, Granularity};
use moodmeter_common::traits::{AlertSink, MessageStore};
use moodmeter_core::cache::WindowCache;
use moodmeter_core::classifier::{ClassifierAdapter, LexiconModel};
use moodmeter_core::eventbus::EventBus;
use moodmeter_core::repositories::InMemoryMessageStore;
use moodmeter_core::services::{
    AggregationConfig, AggregationEngine, IngestionConfig, IngestionCoordinator,
};
use moodmeter_core::tasks::{spawn_alert_forwarder, spawn_spike_monitor};
use moodmeter_core::test_utils::*;
use moodmeter_core::Error;

const NEGATIVE_TEXT: &str = "terrible awful support";
const POSITIVE_TEXT: &str = "great thanks";

struct Pipeline {
    store: InMemoryMessageStore,
    bus: Arc<EventBus>,
    coordinator: IngestionCoordinator,
    engine: Arc<AggregationEngine>,
}

fn pipeline(config: AggregationConfig) -> Pipeline {
    let store = InMemoryMessageStore::new();
    let shared: Arc<dyn MessageStore> = Arc::new(store.clone());
    let bus = Arc::new(EventBus::new());
    let cache = Arc::new(WindowCache::new(shared.clone()));
    let engine = Arc::new(AggregationEngine::with_cache(shared.clone(), cache.clone(), config));
    let coordinator = IngestionCoordinator::new(
        shared,
        ClassifierAdapter::new(Arc::new(LexiconModel::new())),
        bus.clone(),
        IngestionConfig { batch_size: 7, ..Default::default() },
    )
    .with_window_cache(cache);
    Pipeline { store, bus, coordinator, engine }
}

async fn drain(coordinator: &IngestionCoordinator) -> Result<(), Error> {
    while !coordinator.run_batch().await?.is_empty() {}
    Ok(())
}

/// Ten messages, six of them negative, spread over the last half hour.
async fn ingest_ten_with_six_negative(p: &Pipeline, chat_id: i64, now: DateTime<Utc>) -> Result<(), Error> {
    for i in 0..10 {
        let text = if i < 6 { NEGATIVE_TEXT } else { POSITIVE_TEXT };
        let at = now - ChronoDuration::minutes(30) + ChronoDuration::minutes(i);
        p.coordinator
            .ingest(&inbound_event(&format!("{chat_id}-{i}"), chat_id, text, at))
            .await?;
    }
    drain(&p.coordinator).await
}

#[tokio::test]
async fn test_six_of_ten_negative_alerts_exactly_once() -> Result<(), Error> {
    let p = pipeline(AggregationConfig { spike_threshold: 0.5, ..Default::default() });
    let now = Utc::now();
    ingest_ten_with_six_negative(&p, 42, now).await?;

    let window = p.engine.compute_window(42, now - ChronoDuration::hours(1), now).await?;
    assert_eq!(window.total(), 10);
    assert_eq!(window.negative, 6);
    assert!((window.negative_share() - 0.6).abs() < 1e-9);

    let mut fired = Vec::new();
    for tick in 0..5 {
        fired.extend(p.engine.check_spikes(now + ChronoDuration::seconds(tick)).await?);
    }
    assert_eq!(fired.len(), 1);
    assert_eq!(fired[0].chat_id, 42);
    assert!((fired[0].negative_share - 0.6).abs() < 1e-9);
    assert_eq!(fired[0].threshold, 0.5);
    Ok(())
}

#[tokio::test]
async fn test_balanced_chat_never_alerts() -> Result<(), Error> {
    let p = pipeline(AggregationConfig::default());
    let now = Utc::now();
    for i in 0..10 {
        let text = if i % 2 == 0 { NEGATIVE_TEXT } else { POSITIVE_TEXT };
        p.coordinator
            .ingest(&inbound_event(&format!("b-{i}"), 8, text, now - ChronoDuration::minutes(i + 1)))
            .await?;
    }
    drain(&p.coordinator).await?;
    assert!(p.engine.check_spikes(now).await?.is_empty());
    Ok(())
}

/// Deterministic pseudo-random sequence for spreading messages around.
struct Lcg(u64);

impl Lcg {
    fn next_u64(&mut self) -> u64 {
        self.0 = self.0.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        self.0 >> 33
    }
}

#[tokio::test]
async fn test_incremental_windows_match_full_recompute() -> Result<(), Error> {
    let p = pipeline(AggregationConfig::default());
    let base = Utc::now() - ChronoDuration::hours(6);
    let texts = [NEGATIVE_TEXT, POSITIVE_TEXT, "the meeting is at noon", "not good", "very helpful"];
    let mut rng = Lcg(7);

    let windows: Vec<(i64, DateTime<Utc>, DateTime<Utc>)> = (0..3)
        .flat_map(|chat| {
            vec![
                (chat, base, base + ChronoDuration::hours(6)),
                (chat, base + ChronoDuration::hours(1), base + ChronoDuration::hours(2)),
                (chat, base + ChronoDuration::minutes(90), base + ChronoDuration::minutes(200)),
            ]
        })
        .collect();

    // Half the windows are tracked before any data arrives.
    for (chat, start, end) in windows.iter().step_by(2) {
        p.engine.track_window(*chat, *start, *end).await?;
    }

    for i in 0..120 {
        let chat = (rng.next_u64() % 3) as i64;
        let at = base + ChronoDuration::seconds((rng.next_u64() % (6 * 3600)) as i64);
        let text = texts[(rng.next_u64() % texts.len() as u64) as usize];
        p.coordinator
            .ingest(&inbound_event(&format!("eq-{i}"), chat, text, at))
            .await?;
        if i == 60 {
            drain(&p.coordinator).await?;
            // The other half is tracked mid-stream and seeded from the store.
            for (chat, start, end) in windows.iter().skip(1).step_by(2) {
                p.engine.track_window(*chat, *start, *end).await?;
            }
        }
    }
    drain(&p.coordinator).await?;

    for (chat, start, end) in &windows {
        let full = p.engine.compute_window(*chat, *start, *end).await?;
        let cached = p.engine.cache().cached(*chat, *start, *end).expect("tracked window");
        assert!(
            full.approx_eq(&cached, 1e-9),
            "chat {chat} [{start}, {end}): full={full:?} cached={cached:?}"
        );
    }

    let total: u64 = {
        let mut sum = 0;
        for chat in 0..3 {
            sum += p.engine.compute_window(chat, base, base + ChronoDuration::hours(6)).await?.total();
        }
        sum
    };
    assert_eq!(total, 120);
    assert_eq!(p.store.classification_count(), 120);
    Ok(())
}

#[tokio::test]
async fn test_trend_matches_window_totals() -> Result<(), Error> {
    let p = pipeline(AggregationConfig::default());
    let start = DateTime::parse_from_rfc3339("2025-01-06T00:00:00Z").unwrap().with_timezone(&Utc);
    let end = start + ChronoDuration::weeks(3);
    for i in 0..21 {
        let text = if i % 3 == 0 { NEGATIVE_TEXT } else { POSITIVE_TEXT };
        p.coordinator
            .ingest(&inbound_event(&format!("tr-{i}"), 1, text, start + ChronoDuration::days(i) + ChronoDuration::hours(12)))
            .await?;
    }
    drain(&p.coordinator).await?;

    let weekly = p.engine.compute_trend(1, start, end, Granularity::Week).await?;
    assert_eq!(weekly.len(), 3);
    assert!(weekly.windows(2).all(|w| w[0].window_start < w[1].window_start));
    assert!(weekly.iter().all(|w| w.total() == 7));

    let daily = p.engine.compute_trend(1, start, end, Granularity::Day).await?;
    assert_eq!(daily.len(), 21);
    let full = p.engine.compute_window(1, start, end).await?;
    assert_eq!(daily.iter().map(|w| w.negative).sum::<u64>(), full.negative);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_spike_monitor_forwards_one_alert() -> Result<(), Error> {
    let p = pipeline(AggregationConfig {
        spike_threshold: 0.5,
        spike_check_interval: Duration::from_secs(1),
        ..Default::default()
    });
    ingest_ten_with_six_negative(&p, 3, Utc::now()).await?;

    let sink = Arc::new(RecordingAlertSink::new());
    let forwarder = spawn_alert_forwarder(p.bus.clone(), vec![sink.clone() as Arc<dyn AlertSink>]).await;
    let monitor = spawn_spike_monitor(p.engine.clone(), p.bus.clone());

    tokio::time::sleep(Duration::from_secs(10)).await;
    p.bus.shutdown();
    monitor.await.expect("monitor panicked");
    forwarder.await.expect("forwarder panicked");

    let spikes: Vec<_> = sink
        .alerts()
        .into_iter()
        .filter(|a| matches!(a, Alert::Spike(_)))
        .collect();
    assert_eq!(spikes.len(), 1);
    assert_eq!(spikes[0].chat_id(), 3);
    Ok(())
}
