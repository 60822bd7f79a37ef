// File: moodmeter-common/src/models/message.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A raw message event as handed over by the transport layer.
/// `external_id` is the platform-assigned id and the only deduplication key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InboundEvent {
    pub external_id: String,
    pub chat_id: i64,
    pub author_id: i64,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

/// A stored chat message. Never updated once written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Message {
    pub message_id: Uuid,
    pub external_id: String,
    pub chat_id: i64,
    pub author_id: i64,
    pub text: String,
    pub received_at: DateTime<Utc>,
    pub ingested_at: DateTime<Utc>,
}

impl Message {
    pub fn from_event(event: &InboundEvent) -> Self {
        Self {
            message_id: Uuid::new_v4(),
            external_id: event.external_id.clone(),
            chat_id: event.chat_id,
            author_id: event.author_id,
            text: event.text.clone(),
            received_at: event.timestamp,
            ingested_at: Utc::now(),
        }
    }
}

/// Outcome of an idempotent insert.
#[derive(Debug, Clone, PartialEq)]
pub enum Inserted<T> {
    /// The row was written by this call.
    New(T),
    /// The row already existed; nothing was written.
    Existing(T),
}

impl<T> Inserted<T> {
    pub fn is_new(&self) -> bool {
        matches!(self, Inserted::New(_))
    }

    pub fn get(&self) -> &T {
        match self {
            Inserted::New(v) | Inserted::Existing(v) => v,
        }
    }

    pub fn into_inner(self) -> T {
        match self {
            Inserted::New(v) | Inserted::Existing(v) => v,
        }
    }
}

/// Lifecycle of a message through the pipeline. Derived from which records exist,
/// never stored on the message itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageStatus {
    PendingClassification,
    Classified,
    Unclassifiable,
}

/// Marker for a message whose text can never be classified.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct UnclassifiableMessage {
    pub message_id: Uuid,
    pub reason: String,
    pub marked_at: DateTime<Utc>,
}
