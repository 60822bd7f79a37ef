// File: src/services/ingestion_service.rs

use std::sync::Arc;
use std::time::Duration;
use dashmap::DashMap;
use tokio::sync::Notify;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use moodmeter_common::models::{
    Alert, Classification, InboundEvent, Inserted, Message, NewClassification, Prediction,
    SentimentLabel,
};
use moodmeter_common::traits::MessageStore;
use crate::cache::WindowCache;
use crate::classifier::ClassifierAdapter;
use crate::eventbus::{EventBus, MoodEvent};
use crate::utils::{sleep_or_shutdown, Backoff};
use crate::Error;

#[derive(Debug, Clone)]
pub struct IngestionConfig {
    /// Most messages classified in one model call.
    pub batch_size: usize,
    /// How long the worker waits for a batch to fill after waking.
    pub max_batch_wait: Duration,
    /// Wake-up period when no ingest notification arrives.
    pub poll_interval: Duration,
    /// Upper bound on one model call.
    pub classify_timeout: Duration,
    /// Failed attempts after which a message is reported as stuck.
    pub retry_ceiling: u32,
    pub backoff_base: Duration,
    pub backoff_max: Duration,
    /// Negative confidence above which a single message raises an alert.
    pub negative_message_threshold: Option<f64>,
    /// Backlog size that gets logged at warn level.
    pub backlog_warn_threshold: i64,
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            batch_size: 32,
            max_batch_wait: Duration::from_millis(200),
            poll_interval: Duration::from_secs(5),
            classify_timeout: Duration::from_secs(30),
            retry_ceiling: 5,
            backoff_base: Duration::from_millis(250),
            backoff_max: Duration::from_secs(30),
            negative_message_threshold: Some(0.65),
            backlog_warn_threshold: 1000,
        }
    }
}

/// Outcome of one `run_batch` call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchReport {
    pub fetched: usize,
    pub classified: usize,
    /// Write-backs that found a classification already present.
    pub duplicates: usize,
    pub unclassifiable: usize,
    /// Messages left pending because of an error.
    pub failed: usize,
    pub last_error: Option<String>,
}

impl BatchReport {
    pub fn completed(&self) -> usize {
        self.classified + self.duplicates + self.unclassifiable
    }

    pub fn is_empty(&self) -> bool {
        self.fetched == 0
    }
}

/// Drives inbound events through storage and classification.
///
/// Every message is stored before it is classified, so a crash at any point
/// leaves it pending and it is picked up by the next batch. The store's
/// duplicate check is what keeps retried batches from classifying twice.
pub struct IngestionCoordinator {
    store: Arc<dyn MessageStore>,
    classifier: ClassifierAdapter,
    event_bus: Arc<EventBus>,
    config: IngestionConfig,
    attempts: DashMap<Uuid, u32>,
    notify: Arc<Notify>,
    window_cache: Option<Arc<WindowCache>>,
}

impl IngestionCoordinator {
    pub fn new(
        store: Arc<dyn MessageStore>,
        classifier: ClassifierAdapter,
        event_bus: Arc<EventBus>,
        config: IngestionConfig,
    ) -> Self {
        Self {
            store,
            classifier,
            event_bus,
            config,
            attempts: DashMap::new(),
            notify: Arc::new(Notify::new()),
            window_cache: None,
        }
    }

    /// Feeds every new classification into `cache`.
    pub fn with_window_cache(mut self, cache: Arc<WindowCache>) -> Self {
        self.window_cache = Some(cache);
        self
    }

    pub fn config(&self) -> &IngestionConfig {
        &self.config
    }

    pub fn store(&self) -> Arc<dyn MessageStore> {
        self.store.clone()
    }

    /// Signalled whenever a new message is stored.
    pub fn notifier(&self) -> Arc<Notify> {
        self.notify.clone()
    }

    /// Failed classification attempts recorded for a pending message.
    pub fn attempts(&self, message_id: Uuid) -> u32 {
        self.attempts.get(&message_id).map(|a| *a).unwrap_or(0)
    }

    /// Stores an inbound event. Re-delivery of a known `external_id` returns the
    /// stored message and has no other effect.
    ///
    /// While the store is unavailable this keeps retrying with bounded backoff and
    /// only gives up when the event bus shuts down.
    pub async fn ingest(&self, event: &InboundEvent) -> Result<Inserted<Message>, Error> {
        let mut backoff = Backoff::new(self.config.backoff_base, self.config.backoff_max);
        let mut shutdown_rx = self.event_bus.shutdown_rx.clone();
        let inserted = loop {
            match self.store.insert_message(event).await {
                Ok(inserted) => {
                    if backoff.attempt() > 0 {
                        info!(
                            "store reachable again; '{}' stored after {} retries",
                            event.external_id,
                            backoff.attempt()
                        );
                    }
                    break inserted;
                }
                Err(e) if e.is_transient() => {
                    let delay = backoff.next_delay();
                    warn!(
                        "store unavailable while ingesting '{}' (retry {}): {}; retrying in {:?}",
                        event.external_id,
                        backoff.attempt(),
                        e,
                        delay
                    );
                    if sleep_or_shutdown(delay, &mut shutdown_rx).await {
                        warn!("shutdown during store outage; '{}' was not stored", event.external_id);
                        return Err(e);
                    }
                }
                Err(e) => {
                    error!("failed to ingest '{}': {}", event.external_id, e);
                    return Err(e);
                }
            }
        };

        match &inserted {
            Inserted::New(msg) => {
                debug!(
                    "ingested message {} (external_id='{}', chat={})",
                    msg.message_id, msg.external_id, msg.chat_id
                );
                self.event_bus
                    .publish(MoodEvent::MessageReceived {
                        message_id: msg.message_id,
                        chat_id: msg.chat_id,
                    })
                    .await;
                self.notify.notify_one();
            }
            Inserted::Existing(msg) => {
                debug!(
                    "duplicate delivery of external_id='{}' ignored (message {})",
                    msg.external_id, msg.message_id
                );
            }
        }
        Ok(inserted)
    }

    /// Classifies up to `batch_size` pending messages and writes the results back.
    ///
    /// An `Err` means nothing could be fetched. Per-message failures are counted
    /// in the report and leave those messages pending.
    pub async fn run_batch(&self) -> Result<BatchReport, Error> {
        let limit = self.config.batch_size.max(1) as i64;
        let batch = self.store.get_unclassified(limit).await?;

        let mut report = BatchReport {
            fetched: batch.len(),
            ..Default::default()
        };
        if batch.is_empty() {
            return Ok(report);
        }

        let texts: Vec<String> = batch.iter().map(|m| m.text.clone()).collect();
        let results = match timeout(self.config.classify_timeout, self.classifier.classify_batch(&texts)).await {
            Ok(Ok(results)) => results,
            Ok(Err(e)) => {
                warn!("classification of {} messages failed: {}", batch.len(), e);
                self.fail_all(&batch, &e, &mut report).await;
                return Ok(report);
            }
            Err(_) => {
                let e = Error::ClassifierUnavailable(format!(
                    "model call exceeded {:?}",
                    self.config.classify_timeout
                ));
                warn!("classification of {} messages abandoned: {}", batch.len(), e);
                self.fail_all(&batch, &e, &mut report).await;
                return Ok(report);
            }
        };

        for (message, result) in batch.iter().zip(results) {
            match result {
                Ok(prediction) => self.write_back(message, prediction, &mut report).await,
                Err(Error::InvalidInput(reason)) => {
                    match self.store.mark_unclassifiable(message.message_id, &reason).await {
                        Ok(()) => {
                            info!("message {} marked unclassifiable: {}", message.message_id, reason);
                            self.attempts.remove(&message.message_id);
                            report.unclassifiable += 1;
                        }
                        Err(e) => self.record_failure(message, &e, &mut report).await,
                    }
                }
                Err(e) => self.record_failure(message, &e, &mut report).await,
            }
        }

        if report.failed > 0 {
            warn!(
                "batch finished with {} of {} messages still pending",
                report.failed, report.fetched
            );
        } else {
            debug!("batch complete: {:?}", report);
        }
        Ok(report)
    }

    async fn write_back(&self, message: &Message, prediction: Prediction, report: &mut BatchReport) {
        let new = NewClassification::from_prediction(message.message_id, prediction, self.classifier.model_id());
        match self.store.insert_classification(&new).await {
            Ok(classification) => {
                self.attempts.remove(&message.message_id);
                report.classified += 1;
                self.on_classified(message, classification).await;
            }
            Err(Error::DuplicateClassification(id)) => {
                debug!("message {} was already classified; counting as done", id);
                self.attempts.remove(&message.message_id);
                report.duplicates += 1;
                // The other writer may live in another process and never reach this cache.
                if let Some(cache) = &self.window_cache {
                    match self.store.get_classification(id).await {
                        Ok(Some(existing)) => {
                            cache.apply(message, &existing);
                        }
                        Ok(None) => {}
                        Err(e) => warn!("could not load existing classification of {}: {}", id, e),
                    }
                }
            }
            Err(e) => self.record_failure(message, &e, report).await,
        }
    }

    async fn on_classified(&self, message: &Message, classification: Classification) {
        if let Some(cache) = &self.window_cache {
            cache.apply(message, &classification);
        }

        if let Some(threshold) = self.config.negative_message_threshold {
            if classification.label == SentimentLabel::Negative && classification.confidence > threshold {
                self.event_bus
                    .publish_alert(Alert::NegativeMessage {
                        message_id: message.message_id,
                        chat_id: message.chat_id,
                        author_id: message.author_id,
                        confidence: classification.confidence,
                        text: message.text.clone(),
                    })
                    .await;
            }
        }

        self.event_bus
            .publish(MoodEvent::MessageClassified {
                chat_id: message.chat_id,
                classification,
            })
            .await;
    }

    async fn fail_all(&self, batch: &[Message], err: &Error, report: &mut BatchReport) {
        for message in batch {
            self.record_failure(message, err, report).await;
        }
    }

    /// Counts a failed attempt. Reaching the retry ceiling raises one stuck alert.
    async fn record_failure(&self, message: &Message, err: &Error, report: &mut BatchReport) {
        report.failed += 1;
        report.last_error = Some(err.to_string());

        let attempts = {
            let mut entry = self.attempts.entry(message.message_id).or_insert(0);
            *entry += 1;
            *entry
        };

        if !err.is_transient() {
            error!("message {} failed classification (attempt {}): {}", message.message_id, attempts, err);
        }

        if attempts == self.config.retry_ceiling {
            warn!(
                "message {} still pending after {} attempts; raising stuck alert",
                message.message_id, attempts
            );
            self.event_bus
                .publish_alert(Alert::StuckMessage {
                    message_id: message.message_id,
                    chat_id: message.chat_id,
                    attempts,
                    last_error: err.to_string(),
                })
                .await;
        }
    }
}
