// File: moodmeter-common/src/models/aggregate.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::classification::Classification;
use crate::models::sentiment::SentimentLabel;

/// Sentiment totals for one chat over `[window_start, window_end)`.
///
/// This is always derived from stored messages and classifications and can be
/// rebuilt from them at any time. Sums are kept rather than means so that
/// contributions can be added one at a time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateWindow {
    pub chat_id: i64,
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
    pub positive: u64,
    pub neutral: u64,
    pub negative: u64,
    pub confidence_sum: f64,
    pub mood_sum: f64,
}

impl AggregateWindow {
    pub fn empty(chat_id: i64, window_start: DateTime<Utc>, window_end: DateTime<Utc>) -> Self {
        Self {
            chat_id,
            window_start,
            window_end,
            positive: 0,
            neutral: 0,
            negative: 0,
            confidence_sum: 0.0,
            mood_sum: 0.0,
        }
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.window_start <= at && at < self.window_end
    }

    /// Adds one classification's contribution.
    pub fn add(&mut self, classification: &Classification) {
        match classification.label {
            SentimentLabel::Positive => self.positive += 1,
            SentimentLabel::Neutral => self.neutral += 1,
            SentimentLabel::Negative => self.negative += 1,
        }
        self.confidence_sum += classification.confidence;
        self.mood_sum += classification.mood_score;
    }

    pub fn count(&self, label: SentimentLabel) -> u64 {
        match label {
            SentimentLabel::Positive => self.positive,
            SentimentLabel::Neutral => self.neutral,
            SentimentLabel::Negative => self.negative,
        }
    }

    pub fn total(&self) -> u64 {
        self.positive + self.neutral + self.negative
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }

    pub fn mean_confidence(&self) -> f64 {
        if self.is_empty() {
            0.0
        } else {
            self.confidence_sum / self.total() as f64
        }
    }

    /// Mean of the per-message mood scores (0..=5).
    pub fn mean_mood(&self) -> f64 {
        if self.is_empty() {
            0.0
        } else {
            self.mood_sum / self.total() as f64
        }
    }

    /// `(positive - negative) / total`, in -1..=1.
    pub fn mood_index(&self) -> f64 {
        if self.is_empty() {
            0.0
        } else {
            (self.positive as f64 - self.negative as f64) / self.total() as f64
        }
    }

    pub fn share(&self, label: SentimentLabel) -> f64 {
        if self.is_empty() {
            0.0
        } else {
            self.count(label) as f64 / self.total() as f64
        }
    }

    pub fn negative_share(&self) -> f64 {
        self.share(SentimentLabel::Negative)
    }

    /// Compares counts exactly and float sums within `tolerance`.
    pub fn approx_eq(&self, other: &AggregateWindow, tolerance: f64) -> bool {
        self.chat_id == other.chat_id
            && self.window_start == other.window_start
            && self.window_end == other.window_end
            && self.positive == other.positive
            && self.neutral == other.neutral
            && self.negative == other.negative
            && (self.confidence_sum - other.confidence_sum).abs() <= tolerance
            && (self.mood_sum - other.mood_sum).abs() <= tolerance
    }
}

/// Bucket width for trend series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    Hour,
    Day,
    Week,
}

impl std::str::FromStr for Granularity {
    type Err = crate::error::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "hour" | "hours" => Ok(Granularity::Hour),
            "day" | "days" => Ok(Granularity::Day),
            "week" | "weeks" => Ok(Granularity::Week),
            other => Err(crate::error::Error::Parse(format!("Unknown granularity '{}'", other))),
        }
    }
}
