// File: src/repositories/memory.rs
//
// Process-local message store. Same contract as the Postgres store; all
// mutations happen under one write lock, which is what makes the
// classification existence check atomic.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use uuid::Uuid;

use moodmeter_common::models::{
    Classification, InboundEvent, Inserted, Message, MessageStatus, NewClassification,
    UnclassifiableMessage,
};
use moodmeter_common::traits::MessageStore;
use crate::Error;

/// Ordering key: `received_at`, then ingestion sequence.
type OrderKey = (DateTime<Utc>, u64);

#[derive(Default)]
struct Inner {
    messages: HashMap<Uuid, (u64, Message)>,
    by_external: HashMap<String, Uuid>,
    by_chat: HashMap<i64, BTreeMap<OrderKey, Uuid>>,
    pending: BTreeSet<(OrderKey, Uuid)>,
    classifications: HashMap<Uuid, Classification>,
    unclassifiable: HashMap<Uuid, UnclassifiableMessage>,
    next_seq: u64,
}

#[derive(Clone, Default)]
pub struct InMemoryMessageStore {
    inner: Arc<RwLock<Inner>>,
}

impl InMemoryMessageStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn message_count(&self) -> usize {
        self.inner.read().messages.len()
    }

    pub fn classification_count(&self) -> usize {
        self.inner.read().classifications.len()
    }
}

#[async_trait]
impl MessageStore for InMemoryMessageStore {
    async fn insert_message(&self, event: &InboundEvent) -> Result<Inserted<Message>, Error> {
        let mut inner = self.inner.write();
        if let Some(existing_id) = inner.by_external.get(&event.external_id) {
            let (_, existing) = &inner.messages[existing_id];
            return Ok(Inserted::Existing(existing.clone()));
        }

        let msg = Message::from_event(event);
        let seq = inner.next_seq;
        inner.next_seq += 1;
        let key = (msg.received_at, seq);

        inner.by_external.insert(msg.external_id.clone(), msg.message_id);
        inner.by_chat.entry(msg.chat_id).or_default().insert(key, msg.message_id);
        inner.pending.insert((key, msg.message_id));
        inner.messages.insert(msg.message_id, (seq, msg.clone()));
        Ok(Inserted::New(msg))
    }

    async fn get_message(&self, message_id: Uuid) -> Result<Option<Message>, Error> {
        Ok(self.inner.read().messages.get(&message_id).map(|(_, m)| m.clone()))
    }

    async fn insert_classification(
        &self,
        new: &NewClassification,
    ) -> Result<Classification, Error> {
        let mut inner = self.inner.write();
        let Some((seq, msg)) = inner.messages.get(&new.message_id) else {
            return Err(Error::NotFound(format!("message {}", new.message_id)));
        };
        if inner.classifications.contains_key(&new.message_id) {
            return Err(Error::DuplicateClassification(new.message_id));
        }

        let key = (msg.received_at, *seq);
        let classification = Classification::from_new(new, Utc::now());
        inner.pending.remove(&(key, new.message_id));
        inner.classifications.insert(new.message_id, classification.clone());
        Ok(classification)
    }

    async fn get_classification(&self, message_id: Uuid) -> Result<Option<Classification>, Error> {
        Ok(self.inner.read().classifications.get(&message_id).cloned())
    }

    async fn get_unclassified(&self, limit: i64) -> Result<Vec<Message>, Error> {
        let inner = self.inner.read();
        let limit = usize::try_from(limit.max(0)).unwrap_or(usize::MAX);
        Ok(inner
            .pending
            .iter()
            .take(limit)
            .filter_map(|(_, id)| inner.messages.get(id).map(|(_, m)| m.clone()))
            .collect())
    }

    async fn count_unclassified(&self) -> Result<i64, Error> {
        Ok(self.inner.read().pending.len() as i64)
    }

    async fn mark_unclassifiable(&self, message_id: Uuid, reason: &str) -> Result<(), Error> {
        let mut inner = self.inner.write();
        let Some((seq, msg)) = inner.messages.get(&message_id) else {
            return Err(Error::NotFound(format!("message {}", message_id)));
        };
        if inner.unclassifiable.contains_key(&message_id) {
            return Ok(());
        }
        let key = (msg.received_at, *seq);
        inner.pending.remove(&(key, message_id));
        inner.unclassifiable.insert(
            message_id,
            UnclassifiableMessage {
                message_id,
                reason: reason.to_string(),
                marked_at: Utc::now(),
            },
        );
        Ok(())
    }

    async fn message_status(&self, message_id: Uuid) -> Result<Option<MessageStatus>, Error> {
        let inner = self.inner.read();
        if !inner.messages.contains_key(&message_id) {
            return Ok(None);
        }
        let status = if inner.classifications.contains_key(&message_id) {
            MessageStatus::Classified
        } else if inner.unclassifiable.contains_key(&message_id) {
            MessageStatus::Unclassifiable
        } else {
            MessageStatus::PendingClassification
        };
        Ok(Some(status))
    }

    async fn query_window(
        &self,
        chat_id: i64,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<(Message, Classification)>, Error> {
        let inner = self.inner.read();
        let Some(index) = inner.by_chat.get(&chat_id) else {
            return Ok(Vec::new());
        };
        if start >= end {
            return Ok(Vec::new());
        }

        let rows = index
            .range((start, 0)..(end, 0))
            .filter_map(|(_, id)| {
                let (_, msg) = inner.messages.get(id)?;
                let classification = inner.classifications.get(id)?;
                Some((msg.clone(), classification.clone()))
            })
            .collect();
        Ok(rows)
    }

    async fn active_chats(&self, since: DateTime<Utc>) -> Result<Vec<i64>, Error> {
        let inner = self.inner.read();
        let mut chats: Vec<i64> = inner
            .by_chat
            .iter()
            .filter(|(_, index)| index.range((since, 0)..).next().is_some())
            .map(|(chat_id, _)| *chat_id)
            .collect();
        chats.sort_unstable();
        Ok(chats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use moodmeter_common::models::SentimentLabel;

    fn event(external_id: &str, chat_id: i64, at: DateTime<Utc>) -> InboundEvent {
        InboundEvent {
            external_id: external_id.to_string(),
            chat_id,
            author_id: 7,
            text: format!("text of {external_id}"),
            timestamp: at,
        }
    }

    fn verdict(message_id: Uuid, label: SentimentLabel) -> NewClassification {
        NewClassification {
            message_id,
            label,
            confidence: 0.8,
            model_id: "test".into(),
        }
    }

    #[tokio::test]
    async fn insert_message_is_idempotent_on_external_id() {
        let store = InMemoryMessageStore::new();
        let now = Utc::now();

        let first = store.insert_message(&event("ext-1", 1, now)).await.unwrap();
        let second = store.insert_message(&event("ext-1", 1, now)).await.unwrap();

        assert!(first.is_new());
        assert!(!second.is_new());
        assert_eq!(first.get().message_id, second.get().message_id);
        assert_eq!(store.message_count(), 1);
    }

    #[tokio::test]
    async fn second_classification_is_rejected() {
        let store = InMemoryMessageStore::new();
        let msg = store.insert_message(&event("ext-1", 1, Utc::now())).await.unwrap().into_inner();

        store.insert_classification(&verdict(msg.message_id, SentimentLabel::Positive)).await.unwrap();
        let err = store
            .insert_classification(&verdict(msg.message_id, SentimentLabel::Negative))
            .await
            .unwrap_err();

        assert!(matches!(err, Error::DuplicateClassification(id) if id == msg.message_id));
        let stored = store.get_classification(msg.message_id).await.unwrap().unwrap();
        assert_eq!(stored.label, SentimentLabel::Positive);
        assert_eq!(store.classification_count(), 1);
    }

    #[tokio::test]
    async fn classification_for_unknown_message_is_not_found() {
        let store = InMemoryMessageStore::new();
        let err = store
            .insert_classification(&verdict(Uuid::new_v4(), SentimentLabel::Neutral))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
        assert_eq!(store.classification_count(), 0);
    }

    #[tokio::test]
    async fn unclassified_is_oldest_first_and_excludes_finished_messages() {
        let store = InMemoryMessageStore::new();
        let now = Utc::now();

        let late = store.insert_message(&event("late", 1, now)).await.unwrap().into_inner();
        let early = store
            .insert_message(&event("early", 2, now - Duration::minutes(5)))
            .await
            .unwrap()
            .into_inner();
        let done = store
            .insert_message(&event("done", 1, now - Duration::minutes(10)))
            .await
            .unwrap()
            .into_inner();
        let bad = store
            .insert_message(&event("bad", 1, now - Duration::minutes(20)))
            .await
            .unwrap()
            .into_inner();

        store.insert_classification(&verdict(done.message_id, SentimentLabel::Neutral)).await.unwrap();
        store.mark_unclassifiable(bad.message_id, "empty text").await.unwrap();

        let pending = store.get_unclassified(10).await.unwrap();
        let ids: Vec<Uuid> = pending.iter().map(|m| m.message_id).collect();
        assert_eq!(ids, vec![early.message_id, late.message_id]);
        assert_eq!(store.count_unclassified().await.unwrap(), 2);
        assert_eq!(store.get_unclassified(1).await.unwrap().len(), 1);

        assert_eq!(
            store.message_status(bad.message_id).await.unwrap(),
            Some(MessageStatus::Unclassifiable)
        );
        assert_eq!(
            store.message_status(late.message_id).await.unwrap(),
            Some(MessageStatus::PendingClassification)
        );
    }

    #[tokio::test]
    async fn query_window_is_half_open_and_per_chat() {
        let store = InMemoryMessageStore::new();
        let start = Utc::now() - Duration::hours(1);
        let end = start + Duration::minutes(30);

        for (ext, chat, at) in [
            ("at-start", 1, start),
            ("inside", 1, start + Duration::minutes(10)),
            ("at-end", 1, end),
            ("other-chat", 2, start + Duration::minutes(10)),
        ] {
            let msg = store.insert_message(&event(ext, chat, at)).await.unwrap().into_inner();
            store.insert_classification(&verdict(msg.message_id, SentimentLabel::Positive)).await.unwrap();
        }
        // Unclassified messages never appear in a window.
        store.insert_message(&event("pending", 1, start + Duration::minutes(5))).await.unwrap();

        let rows = store.query_window(1, start, end).await.unwrap();
        let exts: Vec<&str> = rows.iter().map(|(m, _)| m.external_id.as_str()).collect();
        assert_eq!(exts, vec!["at-start", "inside"]);
    }

    #[tokio::test]
    async fn active_chats_only_lists_recent_ones() {
        let store = InMemoryMessageStore::new();
        let now = Utc::now();
        store.insert_message(&event("a", 5, now)).await.unwrap();
        store.insert_message(&event("b", 3, now - Duration::days(2))).await.unwrap();
        store.insert_message(&event("c", 1, now - Duration::minutes(1))).await.unwrap();

        let chats = store.active_chats(now - Duration::hours(1)).await.unwrap();
        assert_eq!(chats, vec![1, 5]);
    }
}
