use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Signals surfaced to the external notification channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Alert {
    /// Negative share in a trailing window crossed the configured threshold.
    Spike(SpikeAlert),
    /// A message has failed classification `attempts` times and is still pending.
    StuckMessage {
        message_id: Uuid,
        chat_id: i64,
        attempts: u32,
        last_error: String,
    },
    /// A single message was classified strongly negative.
    NegativeMessage {
        message_id: Uuid,
        chat_id: i64,
        author_id: i64,
        confidence: f64,
        text: String,
    },
}

impl Alert {
    pub fn chat_id(&self) -> i64 {
        match self {
            Alert::Spike(s) => s.chat_id,
            Alert::StuckMessage { chat_id, .. } => *chat_id,
            Alert::NegativeMessage { chat_id, .. } => *chat_id,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Alert::Spike(_) => "spike",
            Alert::StuckMessage { .. } => "stuck_message",
            Alert::NegativeMessage { .. } => "negative_message",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpikeAlert {
    pub chat_id: i64,
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
    pub negative_share: f64,
    pub threshold: f64,
    pub emitted_at: DateTime<Utc>,
}
