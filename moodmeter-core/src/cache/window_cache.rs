// File: src/cache/window_cache.rs

use std::collections::HashSet;
use std::sync::Arc;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tracing::{debug, trace};
use uuid::Uuid;

use moodmeter_common::models::{AggregateWindow, Classification, Message};
use moodmeter_common::traits::MessageStore;
use crate::Error;

/// A tracked window plus the ids already counted into it.
#[derive(Debug, Clone)]
struct CachedWindow {
    window: AggregateWindow,
    seen: HashSet<Uuid>,
}

impl CachedWindow {
    fn apply(&mut self, message: &Message, classification: &Classification) -> bool {
        if !self.window.contains(message.received_at) || !self.seen.insert(message.message_id) {
            return false;
        }
        self.window.add(classification);
        true
    }
}

/// Incrementally maintained aggregates for a set of registered windows.
///
/// Every window is seeded from the store and then updated per classification.
/// Updates are idempotent per message id, so a record seen both by the seed
/// query and by a concurrent `apply` is counted once.
pub struct WindowCache {
    store: Arc<dyn MessageStore>,
    windows: DashMap<i64, Vec<CachedWindow>>,
}

impl WindowCache {
    pub fn new(store: Arc<dyn MessageStore>) -> Self {
        Self {
            store,
            windows: DashMap::new(),
        }
    }

    /// Registers `[start, end)` for `chat_id` and seeds it from the store.
    /// Tracking an already-tracked window is a no-op.
    pub async fn track(
        &self,
        chat_id: i64,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<(), Error> {
        {
            let mut entry = self.windows.entry(chat_id).or_default();
            if entry.iter().any(|w| w.window.window_start == start && w.window.window_end == end) {
                return Ok(());
            }
            // Registered before seeding so applies racing with the seed are not lost.
            entry.push(CachedWindow {
                window: AggregateWindow::empty(chat_id, start, end),
                seen: HashSet::new(),
            });
        }

        let records = match self.store.query_window(chat_id, start, end).await {
            Ok(r) => r,
            Err(e) => {
                self.untrack(chat_id, start, end);
                return Err(e);
            }
        };

        let mut applied = 0usize;
        if let Some(mut entry) = self.windows.get_mut(&chat_id) {
            if let Some(cw) = entry
                .iter_mut()
                .find(|w| w.window.window_start == start && w.window.window_end == end)
            {
                for (message, classification) in &records {
                    if cw.apply(message, classification) {
                        applied += 1;
                    }
                }
            }
        }
        debug!(
            "WindowCache: tracking chat={} [{}, {}) seeded with {} records",
            chat_id, start, end, applied
        );
        Ok(())
    }

    pub fn untrack(&self, chat_id: i64, start: DateTime<Utc>, end: DateTime<Utc>) {
        if let Some(mut entry) = self.windows.get_mut(&chat_id) {
            entry.retain(|w| !(w.window.window_start == start && w.window.window_end == end));
        }
        self.windows.remove_if(&chat_id, |_, v| v.is_empty());
    }

    /// Adds one classified message to every tracked window that contains it.
    /// Returns how many windows changed.
    pub fn apply(&self, message: &Message, classification: &Classification) -> usize {
        let Some(mut entry) = self.windows.get_mut(&message.chat_id) else {
            return 0;
        };
        let changed = entry
            .iter_mut()
            .map(|w| w.apply(message, classification))
            .filter(|changed| *changed)
            .count();
        trace!("WindowCache: message {} applied to {} windows", message.message_id, changed);
        changed
    }

    /// Current cached aggregate, if the window is tracked.
    pub fn cached(
        &self,
        chat_id: i64,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Option<AggregateWindow> {
        self.windows.get(&chat_id).and_then(|entry| {
            entry
                .iter()
                .find(|w| w.window.window_start == start && w.window.window_end == end)
                .map(|w| w.window.clone())
        })
    }

    /// Drops tracked windows that ended at or before `cutoff`.
    pub fn evict_ended_before(&self, cutoff: DateTime<Utc>) -> usize {
        let mut removed = 0;
        for mut entry in self.windows.iter_mut() {
            let before = entry.len();
            entry.retain(|w| w.window.window_end > cutoff);
            removed += before - entry.len();
        }
        self.windows.retain(|_, v| !v.is_empty());
        removed
    }

    pub fn tracked_count(&self) -> usize {
        self.windows.iter().map(|e| e.len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use moodmeter_common::models::{InboundEvent, NewClassification, Prediction, SentimentLabel};
    use crate::repositories::memory::InMemoryMessageStore;

    async fn classified(
        store: &InMemoryMessageStore,
        ext: &str,
        at: DateTime<Utc>,
        label: SentimentLabel,
    ) -> (Message, Classification) {
        let msg = store
            .insert_message(&InboundEvent {
                external_id: ext.into(),
                chat_id: 7,
                author_id: 1,
                text: "x".into(),
                timestamp: at,
            })
            .await
            .unwrap()
            .into_inner();
        let c = store
            .insert_classification(&NewClassification::from_prediction(
                msg.message_id,
                Prediction { label, confidence: 0.8 },
                "test",
            ))
            .await
            .unwrap();
        (msg, c)
    }

    #[tokio::test]
    async fn seed_then_apply_counts_each_message_once() {
        let store = InMemoryMessageStore::new();
        let start = Utc::now() - Duration::hours(1);
        let end = start + Duration::hours(2);
        let (m1, c1) = classified(&store, "a", start + Duration::minutes(1), SentimentLabel::Negative).await;

        let cache = WindowCache::new(Arc::new(store.clone()));
        cache.track(7, start, end).await.unwrap();

        // Re-applying a seeded record changes nothing.
        assert_eq!(cache.apply(&m1, &c1), 0);

        let (m2, c2) = classified(&store, "b", start + Duration::minutes(2), SentimentLabel::Positive).await;
        assert_eq!(cache.apply(&m2, &c2), 1);
        assert_eq!(cache.apply(&m2, &c2), 0);

        let w = cache.cached(7, start, end).unwrap();
        assert_eq!(w.total(), 2);
        assert_eq!(w.negative, 1);
        assert_eq!(w.positive, 1);
    }

    #[tokio::test]
    async fn apply_ignores_messages_outside_the_window() {
        let store = InMemoryMessageStore::new();
        let start = Utc::now();
        let end = start + Duration::minutes(10);
        let cache = WindowCache::new(Arc::new(store.clone()));
        cache.track(7, start, end).await.unwrap();

        let (m, c) = classified(&store, "late", end, SentimentLabel::Neutral).await;
        assert_eq!(cache.apply(&m, &c), 0);
        assert!(cache.cached(7, start, end).unwrap().is_empty());
    }

    #[tokio::test]
    async fn eviction_and_untrack() {
        let store = InMemoryMessageStore::new();
        let t0 = Utc::now();
        let cache = WindowCache::new(Arc::new(store));
        cache.track(1, t0, t0 + Duration::minutes(5)).await.unwrap();
        cache.track(1, t0, t0 + Duration::hours(1)).await.unwrap();
        cache.track(2, t0, t0 + Duration::hours(1)).await.unwrap();
        assert_eq!(cache.tracked_count(), 3);

        assert_eq!(cache.evict_ended_before(t0 + Duration::minutes(5)), 1);
        cache.untrack(2, t0, t0 + Duration::hours(1));
        assert_eq!(cache.tracked_count(), 1);
        assert!(cache.cached(2, t0, t0 + Duration::hours(1)).is_none());
    }
}
