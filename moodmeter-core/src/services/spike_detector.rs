// File: src/services/spike_detector.rs

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tracing::{debug, info};

use moodmeter_common::models::{AggregateWindow, SpikeAlert};

/// Decides whether a window's negative share warrants an alert.
///
/// The only state is the time of the last alert per chat. A chat that already
/// alerted inside the current window stays quiet until its share falls back to
/// or below the threshold. A spike outlasting a whole window alerts again once
/// the trailing window no longer contains the previous alert, so the window
/// length doubles as the re-alert cooldown.
pub struct SpikeDetector {
    threshold: f64,
    min_messages: u64,
    last_alert: DashMap<i64, DateTime<Utc>>,
}

impl SpikeDetector {
    pub fn new(threshold: f64, min_messages: u64) -> Self {
        Self {
            threshold,
            min_messages,
            last_alert: DashMap::new(),
        }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn min_messages(&self) -> u64 {
        self.min_messages
    }

    pub fn last_alert(&self, chat_id: i64) -> Option<DateTime<Utc>> {
        self.last_alert.get(&chat_id).map(|t| *t)
    }

    pub fn evaluate(&self, window: &AggregateWindow, now: DateTime<Utc>) -> Option<SpikeAlert> {
        let share = window.negative_share();

        if share <= self.threshold {
            if self.last_alert.remove(&window.chat_id).is_some() {
                debug!("chat {} negative share back to {:.3}; spike cleared", window.chat_id, share);
            }
            return None;
        }

        if window.total() < self.min_messages {
            return None;
        }

        // Check and record under the same entry lock so concurrent evaluations fire once.
        let mut entry = self.last_alert.entry(window.chat_id).or_insert(DateTime::<Utc>::MIN_UTC);
        if *entry >= window.window_start {
            return None;
        }
        *entry = now;

        info!(
            "Negative spike in chat {}: share={:.3} > threshold={:.3} over {} messages",
            window.chat_id,
            share,
            self.threshold,
            window.total()
        );
        Some(SpikeAlert {
            chat_id: window.chat_id,
            window_start: window.window_start,
            window_end: window.window_end,
            negative_share: share,
            threshold: self.threshold,
            emitted_at: now,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn window(chat_id: i64, start: DateTime<Utc>, negative: u64, other: u64) -> AggregateWindow {
        let mut w = AggregateWindow::empty(chat_id, start, start + Duration::hours(1));
        w.negative = negative;
        w.neutral = other;
        w
    }

    #[test]
    fn fires_once_while_share_stays_high() {
        let det = SpikeDetector::new(0.5, 5);
        let t0 = Utc::now();
        let w = window(1, t0, 6, 4);
        assert!(det.evaluate(&w, t0 + Duration::minutes(60)).is_some());
        assert!(det.evaluate(&w, t0 + Duration::minutes(61)).is_none());

        // A later window that still overlaps the last alert stays quiet.
        let w2 = window(1, t0 + Duration::minutes(30), 7, 3);
        assert!(det.evaluate(&w2, t0 + Duration::minutes(90)).is_none());
    }

    #[test]
    fn persistent_spike_realerts_once_per_window_length() {
        let det = SpikeDetector::new(0.5, 5);
        let t0 = Utc::now();
        let trailing = |now: DateTime<Utc>| window(1, now - Duration::hours(1), 7, 3);

        let mut fired = Vec::new();
        for minute in 0..=150 {
            let now = t0 + Duration::minutes(minute);
            if det.evaluate(&trailing(now), now).is_some() {
                fired.push(minute);
            }
        }
        // First check, then the first check whose window starts after the previous alert.
        assert_eq!(fired, vec![0, 61, 122]);
    }

    #[test]
    fn share_equal_to_threshold_does_not_fire() {
        let det = SpikeDetector::new(0.5, 1);
        let t0 = Utc::now();
        assert!(det.evaluate(&window(1, t0, 5, 5), t0).is_none());
    }

    #[test]
    fn too_few_messages_do_not_fire() {
        let det = SpikeDetector::new(0.5, 5);
        let t0 = Utc::now();
        assert!(det.evaluate(&window(1, t0, 3, 0), t0).is_none());
        assert!(det.last_alert(1).is_none());
    }

    #[test]
    fn recovery_rearms_the_chat() {
        let det = SpikeDetector::new(0.5, 1);
        let t0 = Utc::now();
        assert!(det.evaluate(&window(1, t0, 6, 4), t0).is_some());
        assert!(det.evaluate(&window(1, t0, 2, 8), t0 + Duration::minutes(1)).is_none());
        assert!(det.last_alert(1).is_none());
        assert!(det.evaluate(&window(1, t0, 6, 4), t0 + Duration::minutes(2)).is_some());
    }

    #[test]
    fn chats_are_independent() {
        let det = SpikeDetector::new(0.5, 1);
        let t0 = Utc::now();
        assert!(det.evaluate(&window(1, t0, 6, 4), t0).is_some());
        assert!(det.evaluate(&window(2, t0, 6, 4), t0).is_some());
    }
}
