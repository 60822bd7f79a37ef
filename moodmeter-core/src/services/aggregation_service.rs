// File: src/services/aggregation_service.rs

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use moodmeter_common::models::{AggregateWindow, Granularity, SpikeAlert};
use moodmeter_common::traits::MessageStore;
use crate::cache::WindowCache;
use crate::services::spike_detector::SpikeDetector;
use crate::utils::time::{bucket_end, bucket_start};
use crate::Error;

#[derive(Debug, Clone)]
pub struct AggregationConfig {
    /// Negative share above which a spike alert fires.
    pub spike_threshold: f64,
    /// Smallest window population that may alert.
    pub min_messages: u64,
    /// Length of the trailing window the spike monitor evaluates.
    pub spike_window: Duration,
    pub spike_check_interval: Duration,
}

impl Default for AggregationConfig {
    fn default() -> Self {
        Self {
            spike_threshold: 0.5,
            min_messages: 5,
            spike_window: Duration::from_secs(3600),
            spike_check_interval: Duration::from_secs(60),
        }
    }
}

/// Windowed sentiment statistics over the message store.
///
/// `compute_window` is the reference path. The window cache is an optimisation
/// that must agree with it.
pub struct AggregationEngine {
    store: Arc<dyn MessageStore>,
    cache: Arc<WindowCache>,
    detector: SpikeDetector,
    config: AggregationConfig,
}

impl AggregationEngine {
    pub fn new(store: Arc<dyn MessageStore>, config: AggregationConfig) -> Self {
        let cache = Arc::new(WindowCache::new(store.clone()));
        Self::with_cache(store, cache, config)
    }

    pub fn with_cache(
        store: Arc<dyn MessageStore>,
        cache: Arc<WindowCache>,
        config: AggregationConfig,
    ) -> Self {
        let detector = SpikeDetector::new(config.spike_threshold, config.min_messages);
        Self { store, cache, detector, config }
    }

    pub fn config(&self) -> &AggregationConfig {
        &self.config
    }

    pub fn cache(&self) -> Arc<WindowCache> {
        self.cache.clone()
    }

    pub fn detector(&self) -> &SpikeDetector {
        &self.detector
    }

    /// Full recompute over `[start, end)`.
    pub async fn compute_window(
        &self,
        chat_id: i64,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<AggregateWindow, Error> {
        if end < start {
            return Err(Error::InvalidInput(format!("window end {} is before start {}", end, start)));
        }
        let mut window = AggregateWindow::empty(chat_id, start, end);
        for (_, classification) in self.store.query_window(chat_id, start, end).await? {
            window.add(&classification);
        }
        Ok(window)
    }

    /// One window per non-empty bucket between `start` and `end`, ascending.
    /// Buckets are clipped to the requested range.
    pub async fn compute_trend(
        &self,
        chat_id: i64,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        granularity: Granularity,
    ) -> Result<Vec<AggregateWindow>, Error> {
        if end < start {
            return Err(Error::InvalidInput(format!("trend end {} is before start {}", end, start)));
        }
        let mut buckets: BTreeMap<DateTime<Utc>, AggregateWindow> = BTreeMap::new();
        for (message, classification) in self.store.query_window(chat_id, start, end).await? {
            let b_start = bucket_start(message.received_at, granularity);
            buckets
                .entry(b_start)
                .or_insert_with(|| {
                    AggregateWindow::empty(
                        chat_id,
                        b_start.max(start),
                        bucket_end(b_start, granularity).min(end),
                    )
                })
                .add(&classification);
        }
        debug!(
            "compute_trend chat={} {:?}: {} non-empty buckets",
            chat_id,
            granularity,
            buckets.len()
        );
        Ok(buckets.into_values().collect())
    }

    /// Registers a window with the incremental cache.
    pub async fn track_window(
        &self,
        chat_id: i64,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<(), Error> {
        self.cache.track(chat_id, start, end).await
    }

    /// Cached aggregate if tracked, otherwise a full recompute.
    pub async fn cached_window(
        &self,
        chat_id: i64,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<AggregateWindow, Error> {
        match self.cache.cached(chat_id, start, end) {
            Some(w) => Ok(w),
            None => self.compute_window(chat_id, start, end).await,
        }
    }

    /// Evaluates the trailing `spike_window` ending at `now` for every active chat.
    /// A chat whose window cannot be read is skipped and retried on the next check.
    pub async fn check_spikes(&self, now: DateTime<Utc>) -> Result<Vec<SpikeAlert>, Error> {
        let span = chrono::Duration::from_std(self.config.spike_window)
            .map_err(|e| Error::Config(format!("spike window out of range: {}", e)))?;
        let start = now - span;

        let mut alerts = Vec::new();
        for chat_id in self.store.active_chats(start).await? {
            match self.compute_window(chat_id, start, now).await {
                Ok(window) => {
                    if let Some(alert) = self.detector.evaluate(&window, now) {
                        alerts.push(alert);
                    }
                }
                Err(e) => warn!("spike check for chat {} failed: {}", chat_id, e),
            }
        }
        Ok(alerts)
    }
}
