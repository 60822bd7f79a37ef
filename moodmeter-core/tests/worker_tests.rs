// File: moodmeter-core/tests/worker_tests.rs
//
// The background worker under a paused clock: every message ends classified
// despite model and store outages, and nothing is reported twice.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use chrono::{Duration as ChronoDuration, Utc};
use tokio::time::{sleep, timeout};

use moodmeter_common::models::Alert;
use moodmeter_common::traits::MessageStore;
use moodmeter_core::classifier::ClassifierAdapter;
use moodmeter_core::eventbus::{EventBus, MoodEvent};
use moodmeter_core::repositories::InMemoryMessageStore;
use moodmeter_core::services::{IngestionConfig, IngestionCoordinator};
use moodmeter_core::tasks::spawn_classification_worker;
use moodmeter_core::test_utils::*;
use moodmeter_core::Error;

async fn wait_until_drained(store: &InMemoryMessageStore) -> Result<(), Error> {
    loop {
        if store.count_unclassified().await? == 0 {
            return Ok(());
        }
        sleep(Duration::from_millis(100)).await;
    }
}

#[tokio::test(start_paused = true)]
async fn test_worker_classifies_everything_through_outages() -> Result<(), Error> {
    let store = InMemoryMessageStore::new();
    let failing = FailingStore::new(store.clone());
    failing.fail_next_classification_writes(2);

    let bus = Arc::new(EventBus::new());
    let mut rx = bus.subscribe(Some(1000)).await;
    let coordinator = Arc::new(IngestionCoordinator::new(
        Arc::new(failing),
        ClassifierAdapter::new(Arc::new(FlakyModel::new(3))),
        bus.clone(),
        IngestionConfig {
            batch_size: 4,
            retry_ceiling: 2,
            ..Default::default()
        },
    ));
    let worker = spawn_classification_worker(coordinator.clone(), bus.clone());

    let t0 = Utc::now();
    for i in 0..10 {
        let ev = inbound_event(&format!("live-{i}"), i % 2, "good enough", t0 + ChronoDuration::seconds(i));
        coordinator.ingest(&ev).await?;
    }

    timeout(Duration::from_secs(3600), wait_until_drained(&store))
        .await
        .expect("worker did not drain the backlog")?;
    assert_eq!(store.classification_count(), 10);

    bus.shutdown();
    worker.await.expect("worker panicked");

    let mut stuck = Vec::new();
    let mut classified = HashSet::new();
    while let Ok(evt) = rx.try_recv() {
        match evt {
            MoodEvent::Alert(Alert::StuckMessage { message_id, .. }) => stuck.push(message_id),
            MoodEvent::MessageClassified { classification, .. } => {
                assert!(classified.insert(classification.message_id), "classified twice");
            }
            _ => {}
        }
    }
    assert_eq!(classified.len(), 10);
    assert!(!stuck.is_empty(), "three model failures should cross a ceiling of two");
    let unique: HashSet<_> = stuck.iter().collect();
    assert_eq!(unique.len(), stuck.len(), "a stuck message was reported twice");
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_worker_picks_up_backlog_without_notification() -> Result<(), Error> {
    let store = InMemoryMessageStore::new();
    // Written straight to the store, as if left over from a previous run.
    for i in 0..5 {
        store
            .insert_message(&inbound_event(&format!("old-{i}"), 1, "fine thanks", Utc::now()))
            .await?;
    }

    let bus = Arc::new(EventBus::new());
    let coordinator = Arc::new(IngestionCoordinator::new(
        Arc::new(store.clone()),
        ClassifierAdapter::new(Arc::new(moodmeter_core::classifier::LexiconModel::new())),
        bus.clone(),
        IngestionConfig {
            poll_interval: Duration::from_secs(30),
            ..Default::default()
        },
    ));
    let worker = spawn_classification_worker(coordinator, bus.clone());

    timeout(Duration::from_secs(120), wait_until_drained(&store))
        .await
        .expect("poll interval should pick up the backlog")?;
    assert_eq!(store.classification_count(), 5);

    bus.shutdown();
    worker.await.expect("worker panicked");
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_worker_stops_on_shutdown_while_backing_off() {
    let store = InMemoryMessageStore::new();
    let bus = Arc::new(EventBus::new());
    let coordinator = Arc::new(IngestionCoordinator::new(
        Arc::new(store.clone()),
        ClassifierAdapter::new(Arc::new(FlakyModel::new(u32::MAX))),
        bus.clone(),
        IngestionConfig::default(),
    ));
    let worker = spawn_classification_worker(coordinator.clone(), bus.clone());
    coordinator
        .ingest(&inbound_event("never", 1, "hello", Utc::now()))
        .await
        .unwrap();

    sleep(Duration::from_secs(120)).await;
    bus.shutdown();
    timeout(Duration::from_secs(5), worker)
        .await
        .expect("worker ignored shutdown")
        .expect("worker panicked");
    assert_eq!(store.count_unclassified().await.unwrap(), 1);
}
