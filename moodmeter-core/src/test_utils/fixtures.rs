// File: moodmeter-core/src/test_utils/fixtures.rs
//
// Scriptable models, stores and sinks for exercising the pipeline without
// external services.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::time::Duration;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use uuid::Uuid;

use moodmeter_common::models::{
    Alert, ClassScores, Classification, InboundEvent, Inserted, Message, MessageStatus,
    NewClassification,
};
use moodmeter_common::traits::{AlertSink, MessageStore, SentimentModel};
use crate::classifier::LexiconModel;
use crate::repositories::memory::InMemoryMessageStore;
use crate::Error;

pub fn inbound_event(external_id: &str, chat_id: i64, text: &str, timestamp: DateTime<Utc>) -> InboundEvent {
    InboundEvent {
        external_id: external_id.to_string(),
        chat_id,
        author_id: 1,
        text: text.to_string(),
        timestamp,
    }
}

/// Returns the same scores for every input and counts calls.
pub struct FixedModel {
    scores: ClassScores,
    pub calls: AtomicUsize,
}

impl FixedModel {
    pub fn new(scores: ClassScores) -> Self {
        Self { scores, calls: AtomicUsize::new(0) }
    }
}

#[async_trait]
impl SentimentModel for FixedModel {
    fn model_id(&self) -> &str {
        "fixed"
    }

    async fn predict(&self, texts: &[String]) -> Result<Vec<ClassScores>, Error> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(vec![self.scores; texts.len()])
    }
}

/// Fails the first `failures` calls with `ClassifierUnavailable`, then delegates.
pub struct FlakyModel {
    inner: Arc<dyn SentimentModel>,
    failures_left: AtomicU32,
    pub calls: AtomicUsize,
}

impl FlakyModel {
    pub fn new(failures: u32) -> Self {
        Self::wrapping(Arc::new(LexiconModel::new()), failures)
    }

    pub fn wrapping(inner: Arc<dyn SentimentModel>, failures: u32) -> Self {
        Self {
            inner,
            failures_left: AtomicU32::new(failures),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SentimentModel for FlakyModel {
    fn model_id(&self) -> &str {
        self.inner.model_id()
    }

    async fn predict(&self, texts: &[String]) -> Result<Vec<ClassScores>, Error> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let failed = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failed {
            return Err(Error::ClassifierUnavailable("simulated model outage".into()));
        }
        self.inner.predict(texts).await
    }
}

/// Sleeps before answering, for exercising the classify timeout.
pub struct SlowModel {
    delay: Duration,
    inner: LexiconModel,
}

impl SlowModel {
    pub fn new(delay: Duration) -> Self {
        Self { delay, inner: LexiconModel::new() }
    }
}

#[async_trait]
impl SentimentModel for SlowModel {
    fn model_id(&self) -> &str {
        "slow"
    }

    async fn predict(&self, texts: &[String]) -> Result<Vec<ClassScores>, Error> {
        tokio::time::sleep(self.delay).await;
        self.inner.predict(texts).await
    }
}

/// In-memory store that can be told to report `StoreUnavailable`.
#[derive(Clone, Default)]
pub struct FailingStore {
    pub inner: InMemoryMessageStore,
    fail_inserts: Arc<AtomicU32>,
    fail_classification_writes: Arc<AtomicU32>,
}

impl FailingStore {
    pub fn new(inner: InMemoryMessageStore) -> Self {
        Self { inner, ..Default::default() }
    }

    /// The next `n` `insert_message` calls fail.
    pub fn fail_next_inserts(&self, n: u32) {
        self.fail_inserts.store(n, Ordering::SeqCst);
    }

    /// The next `n` `insert_classification` calls fail.
    pub fn fail_next_classification_writes(&self, n: u32) {
        self.fail_classification_writes.store(n, Ordering::SeqCst);
    }

    fn take(counter: &AtomicU32) -> Result<(), Error> {
        if counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(Error::StoreUnavailable("simulated store outage".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl MessageStore for FailingStore {
    async fn insert_message(&self, event: &InboundEvent) -> Result<Inserted<Message>, Error> {
        Self::take(&self.fail_inserts)?;
        self.inner.insert_message(event).await
    }

    async fn get_message(&self, message_id: Uuid) -> Result<Option<Message>, Error> {
        self.inner.get_message(message_id).await
    }

    async fn insert_classification(&self, new: &NewClassification) -> Result<Classification, Error> {
        Self::take(&self.fail_classification_writes)?;
        self.inner.insert_classification(new).await
    }

    async fn get_classification(&self, message_id: Uuid) -> Result<Option<Classification>, Error> {
        self.inner.get_classification(message_id).await
    }

    async fn get_unclassified(&self, limit: i64) -> Result<Vec<Message>, Error> {
        self.inner.get_unclassified(limit).await
    }

    async fn count_unclassified(&self) -> Result<i64, Error> {
        self.inner.count_unclassified().await
    }

    async fn mark_unclassifiable(&self, message_id: Uuid, reason: &str) -> Result<(), Error> {
        self.inner.mark_unclassifiable(message_id, reason).await
    }

    async fn message_status(&self, message_id: Uuid) -> Result<Option<MessageStatus>, Error> {
        self.inner.message_status(message_id).await
    }

    async fn query_window(
        &self,
        chat_id: i64,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<(Message, Classification)>, Error> {
        self.inner.query_window(chat_id, start, end).await
    }

    async fn active_chats(&self, since: DateTime<Utc>) -> Result<Vec<i64>, Error> {
        self.inner.active_chats(since).await
    }
}

/// Keeps every delivered alert.
#[derive(Default)]
pub struct RecordingAlertSink {
    alerts: Mutex<Vec<Alert>>,
}

impl RecordingAlertSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alerts(&self) -> Vec<Alert> {
        self.alerts.lock().clone()
    }
}

#[async_trait]
impl AlertSink for RecordingAlertSink {
    fn name(&self) -> &str {
        "recording"
    }

    async fn deliver(&self, alert: &Alert) -> Result<(), Error> {
        self.alerts.lock().push(alert.clone());
        Ok(())
    }
}
