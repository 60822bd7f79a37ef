// src/repositories/postgres/messages.rs
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{FromRow, Pool, Postgres, Row};
use tracing::debug;
use uuid::Uuid;

use moodmeter_common::models::{
    Classification, InboundEvent, Inserted, Message, MessageStatus, NewClassification,
    SentimentLabel,
};
use moodmeter_common::traits::MessageStore;
use crate::repositories::postgres::store_err;
use crate::Error;

const MESSAGE_COLUMNS: &str =
    "m.message_id, m.external_id, m.chat_id, m.author_id, m.text, m.received_at, m.ingested_at";

/// Postgres-backed message store.
#[derive(Clone)]
pub struct PostgresMessageStore {
    pool: Pool<Postgres>,
}

impl PostgresMessageStore {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    async fn try_insert(&self, msg: &Message) -> Result<(), Error> {
        let res = sqlx::query(
            r#"
            INSERT INTO messages (
                message_id, external_id, chat_id, author_id,
                text, received_at, ingested_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
            .bind(msg.message_id)
            .bind(&msg.external_id)
            .bind(msg.chat_id)
            .bind(msg.author_id)
            .bind(&msg.text)
            .bind(msg.received_at)
            .bind(msg.ingested_at)
            .execute(&self.pool)
            .await;

        match res {
            Ok(_) => Ok(()),
            Err(e) if is_unique_violation(&e) => {
                Err(Error::DuplicateMessage(msg.external_id.clone()))
            }
            Err(e) => Err(store_err(e)),
        }
    }

    async fn get_by_external_id(&self, external_id: &str) -> Result<Option<Message>, Error> {
        let query = format!("SELECT {MESSAGE_COLUMNS} FROM messages m WHERE m.external_id = $1");
        let msg = sqlx::query_as::<_, Message>(&query)
            .bind(external_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(store_err)?;
        Ok(msg)
    }
}

fn is_unique_violation(e: &sqlx::Error) -> bool {
    e.as_database_error()
        .map(|db| db.is_unique_violation())
        .unwrap_or(false)
}

fn classification_from_row(row: &PgRow) -> Result<Classification, Error> {
    let label: String = row.try_get("label")?;
    Ok(Classification {
        message_id: row.try_get("message_id")?,
        label: label.parse::<SentimentLabel>()?,
        confidence: row.try_get("confidence")?,
        model_id: row.try_get("model_id")?,
        mood_score: row.try_get("mood_score")?,
        classified_at: row.try_get("classified_at")?,
    })
}

#[async_trait]
impl MessageStore for PostgresMessageStore {
    async fn insert_message(&self, event: &InboundEvent) -> Result<Inserted<Message>, Error> {
        let msg = Message::from_event(event);
        match self.try_insert(&msg).await {
            Ok(()) => Ok(Inserted::New(msg)),
            Err(Error::DuplicateMessage(external_id)) => {
                debug!("external_id '{}' already stored; returning existing row", external_id);
                self.get_by_external_id(&external_id)
                    .await?
                    .map(Inserted::Existing)
                    .ok_or_else(|| Error::NotFound(format!(
                        "message with external_id '{}' vanished after conflict", external_id
                    )))
            }
            Err(e) => Err(e),
        }
    }

    async fn get_message(&self, message_id: Uuid) -> Result<Option<Message>, Error> {
        let query = format!("SELECT {MESSAGE_COLUMNS} FROM messages m WHERE m.message_id = $1");
        let msg = sqlx::query_as::<_, Message>(&query)
            .bind(message_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(store_err)?;
        Ok(msg)
    }

    async fn insert_classification(
        &self,
        new: &NewClassification,
    ) -> Result<Classification, Error> {
        let mut tx = self.pool.begin().await.map_err(store_err)?;

        // Lock the parent row so it cannot disappear between the check and the insert.
        let exists = sqlx::query("SELECT 1 FROM messages WHERE message_id = $1 FOR KEY SHARE")
            .bind(new.message_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(store_err)?;
        if exists.is_none() {
            return Err(Error::NotFound(format!("message {}", new.message_id)));
        }

        let classification = Classification::from_new(new, Utc::now());
        let inserted = sqlx::query(
            r#"
            INSERT INTO classifications (
                message_id, label, confidence, model_id, mood_score, classified_at
            )
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (message_id) DO NOTHING
            RETURNING message_id
            "#,
        )
            .bind(classification.message_id)
            .bind(classification.label.as_str())
            .bind(classification.confidence)
            .bind(&classification.model_id)
            .bind(classification.mood_score)
            .bind(classification.classified_at)
            .fetch_optional(&mut *tx)
            .await
            .map_err(store_err)?;

        if inserted.is_none() {
            return Err(Error::DuplicateClassification(new.message_id));
        }

        tx.commit().await.map_err(store_err)?;
        Ok(classification)
    }

    async fn get_classification(&self, message_id: Uuid) -> Result<Option<Classification>, Error> {
        let row = sqlx::query(
            r#"
            SELECT message_id, label, confidence, model_id, mood_score, classified_at
            FROM classifications
            WHERE message_id = $1
            "#,
        )
            .bind(message_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(store_err)?;

        row.as_ref().map(classification_from_row).transpose()
    }

    async fn get_unclassified(&self, limit: i64) -> Result<Vec<Message>, Error> {
        let query = format!(
            r#"
            SELECT {MESSAGE_COLUMNS}
            FROM messages m
            WHERE NOT EXISTS (SELECT 1 FROM classifications c WHERE c.message_id = m.message_id)
              AND NOT EXISTS (SELECT 1 FROM unclassifiable_messages u WHERE u.message_id = m.message_id)
            ORDER BY m.received_at ASC, m.seq ASC
            LIMIT $1
            "#
        );
        let msgs = sqlx::query_as::<_, Message>(&query)
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .map_err(store_err)?;
        Ok(msgs)
    }

    async fn count_unclassified(&self) -> Result<i64, Error> {
        let row = sqlx::query(
            r#"
            SELECT COUNT(*) AS backlog
            FROM messages m
            WHERE NOT EXISTS (SELECT 1 FROM classifications c WHERE c.message_id = m.message_id)
              AND NOT EXISTS (SELECT 1 FROM unclassifiable_messages u WHERE u.message_id = m.message_id)
            "#,
        )
            .fetch_one(&self.pool)
            .await
            .map_err(store_err)?;
        Ok(row.try_get("backlog")?)
    }

    async fn mark_unclassifiable(&self, message_id: Uuid, reason: &str) -> Result<(), Error> {
        sqlx::query(
            r#"
            INSERT INTO unclassifiable_messages (message_id, reason, marked_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (message_id) DO NOTHING
            "#,
        )
            .bind(message_id)
            .bind(reason)
            .bind(Utc::now())
            .execute(&self.pool)
            .await
            .map_err(store_err)?;
        Ok(())
    }

    async fn message_status(&self, message_id: Uuid) -> Result<Option<MessageStatus>, Error> {
        let row = sqlx::query(
            r#"
            SELECT
                EXISTS (SELECT 1 FROM classifications c WHERE c.message_id = m.message_id) AS classified,
                EXISTS (SELECT 1 FROM unclassifiable_messages u WHERE u.message_id = m.message_id) AS unclassifiable
            FROM messages m
            WHERE m.message_id = $1
            "#,
        )
            .bind(message_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(store_err)?;

        let Some(row) = row else {
            return Ok(None);
        };
        let classified: bool = row.try_get("classified")?;
        let unclassifiable: bool = row.try_get("unclassifiable")?;
        let status = if classified {
            MessageStatus::Classified
        } else if unclassifiable {
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
        let query = format!(
            r#"
            SELECT {MESSAGE_COLUMNS},
                   c.label, c.confidence, c.model_id, c.mood_score, c.classified_at
            FROM messages m
            JOIN classifications c ON c.message_id = m.message_id
            WHERE m.chat_id = $1
              AND m.received_at >= $2
              AND m.received_at < $3
            ORDER BY m.received_at ASC, m.seq ASC
            "#
        );
        let rows = sqlx::query(&query)
            .bind(chat_id)
            .bind(start)
            .bind(end)
            .fetch_all(&self.pool)
            .await
            .map_err(store_err)?;

        let mut result = Vec::with_capacity(rows.len());
        for row in rows {
            let msg = Message::from_row(&row)?;
            let classification = classification_from_row(&row)?;
            result.push((msg, classification));
        }
        Ok(result)
    }

    async fn active_chats(&self, since: DateTime<Utc>) -> Result<Vec<i64>, Error> {
        let rows = sqlx::query(
            r#"
            SELECT DISTINCT chat_id
            FROM messages
            WHERE received_at >= $1
            ORDER BY chat_id
            "#,
        )
            .bind(since)
            .fetch_all(&self.pool)
            .await
            .map_err(store_err)?;

        let mut chats = Vec::with_capacity(rows.len());
        for row in rows {
            chats.push(row.try_get("chat_id")?);
        }
        Ok(chats)
    }
}
