use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::sentiment::{Prediction, SentimentLabel};

/// What the coordinator hands to the store; the store stamps `classified_at`.
#[derive(Debug, Clone, PartialEq)]
pub struct NewClassification {
    pub message_id: Uuid,
    pub label: SentimentLabel,
    pub confidence: f64,
    pub model_id: String,
}

impl NewClassification {
    pub fn from_prediction(message_id: Uuid, prediction: Prediction, model_id: &str) -> Self {
        Self {
            message_id,
            label: prediction.label,
            confidence: prediction.confidence.clamp(0.0, 1.0),
            model_id: model_id.to_string(),
        }
    }
}

/// The single sentiment verdict recorded for a message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub message_id: Uuid,
    pub label: SentimentLabel,
    pub confidence: f64,
    pub model_id: String,
    pub mood_score: f64,
    pub classified_at: DateTime<Utc>,
}

impl Classification {
    pub fn from_new(new: &NewClassification, classified_at: DateTime<Utc>) -> Self {
        Self {
            message_id: new.message_id,
            label: new.label,
            confidence: new.confidence,
            model_id: new.model_id.clone(),
            mood_score: new.label.mood_score(new.confidence),
            classified_at,
        }
    }
}
