use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;
use crate::error::Error;
use crate::models::{
    Classification, InboundEvent, Inserted, Message, MessageStatus, NewClassification,
};

/// Durable record of messages and their classifications.
///
/// This is the only writer of classifications. Implementations must make the
/// "at most one classification per message" check atomic with the insert.
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Stores a message for `event`, keyed by `event.external_id`.
    /// A second call with the same external id returns the first message as
    /// [`Inserted::Existing`] and writes nothing.
    async fn insert_message(&self, event: &InboundEvent) -> Result<Inserted<Message>, Error>;

    async fn get_message(&self, message_id: Uuid) -> Result<Option<Message>, Error>;

    /// Fails with [`Error::DuplicateClassification`] when the message already has one,
    /// and with [`Error::NotFound`] when the message does not exist.
    async fn insert_classification(
        &self,
        new: &NewClassification,
    ) -> Result<Classification, Error>;

    async fn get_classification(&self, message_id: Uuid) -> Result<Option<Classification>, Error>;

    /// Messages with no classification and no unclassifiable marker, oldest first.
    async fn get_unclassified(&self, limit: i64) -> Result<Vec<Message>, Error>;

    /// Number of messages still waiting for classification.
    async fn count_unclassified(&self) -> Result<i64, Error>;

    /// Records that a message can never be classified. Idempotent.
    async fn mark_unclassifiable(&self, message_id: Uuid, reason: &str) -> Result<(), Error>;

    async fn message_status(&self, message_id: Uuid) -> Result<Option<MessageStatus>, Error>;

    /// Classified messages of `chat_id` with `start <= received_at < end`, oldest first.
    async fn query_window(
        &self,
        chat_id: i64,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<(Message, Classification)>, Error>;

    /// Chats with at least one message received at or after `since`.
    async fn active_chats(&self, since: DateTime<Utc>) -> Result<Vec<i64>, Error>;
}
