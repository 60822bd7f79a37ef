// File: moodmeter-common/src/models/sentiment.rs

use std::fmt;
use std::str::FromStr;
use serde::{Deserialize, Serialize};
use crate::error::Error;

/// One of the three sentiment classes a message can be assigned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SentimentLabel {
    Positive,
    Neutral,
    Negative,
}

impl SentimentLabel {
    /// Fixed tie-break order for equal class probabilities, highest priority first.
    pub const TIE_BREAK_ORDER: [SentimentLabel; 3] = [
        SentimentLabel::Neutral,
        SentimentLabel::Positive,
        SentimentLabel::Negative,
    ];

    pub const ALL: [SentimentLabel; 3] = [
        SentimentLabel::Positive,
        SentimentLabel::Neutral,
        SentimentLabel::Negative,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SentimentLabel::Positive => "positive",
            SentimentLabel::Neutral => "neutral",
            SentimentLabel::Negative => "negative",
        }
    }

    /// Weighted mood on a 0..=5 scale: positive counts fully, neutral at half weight,
    /// negative counts against.
    pub fn mood_score(&self, confidence: f64) -> f64 {
        let weighted = match self {
            SentimentLabel::Positive => confidence,
            SentimentLabel::Neutral => 0.5 * confidence,
            SentimentLabel::Negative => -confidence,
        };
        (weighted + 1.0) * 2.5
    }

    /// +1 / 0 / -1, used for the mood index of a window.
    pub fn polarity(&self) -> i8 {
        match self {
            SentimentLabel::Positive => 1,
            SentimentLabel::Neutral => 0,
            SentimentLabel::Negative => -1,
        }
    }
}

impl fmt::Display for SentimentLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SentimentLabel {
    type Err = Error;

    /// Accepts our own lowercase names as well as the upper-case and `LABEL_n`
    /// spellings commonly emitted by text-classification models
    /// (`LABEL_0` neutral, `LABEL_1` positive, `LABEL_2` negative).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "positive" | "pos" | "label_1" => Ok(SentimentLabel::Positive),
            "neutral" | "neu" | "label_0" => Ok(SentimentLabel::Neutral),
            "negative" | "neg" | "label_2" => Ok(SentimentLabel::Negative),
            other => Err(Error::Parse(format!("Unknown sentiment label '{}'", other))),
        }
    }
}

/// A single classifier verdict.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub label: SentimentLabel,
    pub confidence: f64,
}

/// Raw per-class output of a sentiment model, before argmax.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ClassScores {
    pub positive: f64,
    pub neutral: f64,
    pub negative: f64,
}

impl ClassScores {
    pub fn new(positive: f64, neutral: f64, negative: f64) -> Self {
        Self { positive, neutral, negative }
    }

    pub fn get(&self, label: SentimentLabel) -> f64 {
        match label {
            SentimentLabel::Positive => self.positive,
            SentimentLabel::Neutral => self.neutral,
            SentimentLabel::Negative => self.negative,
        }
    }

    pub fn set(&mut self, label: SentimentLabel, value: f64) {
        match label {
            SentimentLabel::Positive => self.positive = value,
            SentimentLabel::Neutral => self.neutral = value,
            SentimentLabel::Negative => self.negative = value,
        }
    }
}
