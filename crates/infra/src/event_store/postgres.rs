//! Postgres-backed event store.
//!
//! Account isolation and optimistic concurrency are enforced at the database
//! level: every query filters on `account_id`, and the unique constraint on
//! `(account_id, aggregate_id, sequence_number)` turns a lost append race
//! into a `Concurrency` error instead of a duplicate sequence number.
//!
//! Expected schema:
//!
//! ```sql
//! CREATE TABLE billing_events (
//!     event_id        UUID PRIMARY KEY,
//!     account_id      UUID NOT NULL,
//!     aggregate_id    UUID NOT NULL,
//!     aggregate_type  TEXT NOT NULL,
//!     sequence_number BIGINT NOT NULL CHECK (sequence_number > 0),
//!     event_type      TEXT NOT NULL,
//!     event_version   INT NOT NULL,
//!     occurred_at     TIMESTAMPTZ NOT NULL,
//!     payload         JSONB NOT NULL,
//!     UNIQUE (account_id, aggregate_id, sequence_number)
//! );
//! ```

use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use std::sync::Arc;
use uuid::Uuid;

use facturier_core::{AccountId, AggregateId, ExpectedVersion};

use super::r#trait::{EventStore, EventStoreError, StoredEvent, UncommittedEvent};

/// Postgres-backed append-only event store.
#[derive(Debug, Clone)]
pub struct PostgresEventStore {
    pool: Arc<PgPool>,
}

impl PostgresEventStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    /// Load all events for an account + aggregate stream, in sequence order.
    pub async fn load_stream_async(
        &self,
        account_id: AccountId,
        aggregate_id: AggregateId,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        let rows = sqlx::query(
            r#"
            SELECT event_id, account_id, aggregate_id, aggregate_type,
                   sequence_number, event_type, event_version, occurred_at, payload
            FROM billing_events
            WHERE account_id = $1 AND aggregate_id = $2
            ORDER BY sequence_number ASC
            "#,
        )
        .bind(account_id.as_uuid())
        .bind(aggregate_id.as_uuid())
        .fetch_all(self.pool.as_ref())
        .await
        .map_err(storage_error)?;

        rows.into_iter().map(row_to_event).collect()
    }

    /// Append a batch of events atomically with a version check.
    pub async fn append_async(
        &self,
        events: Vec<UncommittedEvent>,
        expected_version: ExpectedVersion,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        if events.is_empty() {
            return Ok(vec![]);
        }

        let account_id = events[0].account_id;
        let aggregate_id = events[0].aggregate_id;
        let aggregate_type = events[0].aggregate_type.clone();

        for (idx, e) in events.iter().enumerate() {
            if e.account_id != account_id {
                return Err(EventStoreError::AccountIsolation(format!(
                    "batch contains multiple account_ids (index {idx})"
                )));
            }
            if e.aggregate_id != aggregate_id {
                return Err(EventStoreError::InvalidAppend(format!(
                    "batch contains multiple aggregate_ids (index {idx})"
                )));
            }
            if e.aggregate_type != aggregate_type {
                return Err(EventStoreError::AggregateTypeMismatch(format!(
                    "batch contains multiple aggregate_types (index {idx})"
                )));
            }
        }

        let mut tx = self.pool.begin().await.map_err(storage_error)?;

        let current: i64 = sqlx::query_scalar(
            r#"
            SELECT COALESCE(MAX(sequence_number), 0)
            FROM billing_events
            WHERE account_id = $1 AND aggregate_id = $2
            "#,
        )
        .bind(account_id.as_uuid())
        .bind(aggregate_id.as_uuid())
        .fetch_one(&mut *tx)
        .await
        .map_err(storage_error)?;

        let current = current as u64;
        if !expected_version.matches(current) {
            return Err(EventStoreError::Concurrency(format!(
                "expected {expected_version:?}, found {current}"
            )));
        }

        let mut next = current + 1;
        let mut committed = Vec::with_capacity(events.len());
        for e in events {
            sqlx::query(
                r#"
                INSERT INTO billing_events
                    (event_id, account_id, aggregate_id, aggregate_type,
                     sequence_number, event_type, event_version, occurred_at, payload)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                "#,
            )
            .bind(e.event_id)
            .bind(e.account_id.as_uuid())
            .bind(e.aggregate_id.as_uuid())
            .bind(&e.aggregate_type)
            .bind(next as i64)
            .bind(&e.event_type)
            .bind(e.event_version as i32)
            .bind(e.occurred_at)
            .bind(&e.payload)
            .execute(&mut *tx)
            .await
            .map_err(insert_error)?;

            committed.push(StoredEvent {
                event_id: e.event_id,
                account_id: e.account_id,
                aggregate_id: e.aggregate_id,
                aggregate_type: e.aggregate_type,
                sequence_number: next,
                event_type: e.event_type,
                event_version: e.event_version,
                occurred_at: e.occurred_at,
                payload: e.payload,
            });
            next += 1;
        }

        tx.commit().await.map_err(storage_error)?;
        Ok(committed)
    }
}

fn row_to_event(row: sqlx::postgres::PgRow) -> Result<StoredEvent, EventStoreError> {
    let event_id: Uuid = row.try_get("event_id").map_err(storage_error)?;
    let account_id: Uuid = row.try_get("account_id").map_err(storage_error)?;
    let aggregate_id: Uuid = row.try_get("aggregate_id").map_err(storage_error)?;
    let aggregate_type: String = row.try_get("aggregate_type").map_err(storage_error)?;
    let sequence_number: i64 = row.try_get("sequence_number").map_err(storage_error)?;
    let event_type: String = row.try_get("event_type").map_err(storage_error)?;
    let event_version: i32 = row.try_get("event_version").map_err(storage_error)?;
    let occurred_at: DateTime<Utc> = row.try_get("occurred_at").map_err(storage_error)?;
    let payload: serde_json::Value = row.try_get("payload").map_err(storage_error)?;

    Ok(StoredEvent {
        event_id,
        account_id: AccountId::from_uuid(account_id),
        aggregate_id: AggregateId::from_uuid(aggregate_id),
        aggregate_type,
        sequence_number: sequence_number as u64,
        event_type,
        event_version: event_version as u32,
        occurred_at,
        payload,
    })
}

fn storage_error(err: sqlx::Error) -> EventStoreError {
    EventStoreError::Storage(err.to_string())
}

/// Unique-constraint violations on the sequence number mean another writer
/// committed first.
fn insert_error(err: sqlx::Error) -> EventStoreError {
    if let sqlx::Error::Database(db) = &err {
        if db.code().as_deref() == Some("23505") {
            return EventStoreError::Concurrency(format!("concurrent append detected: {db}"));
        }
    }
    storage_error(err)
}

impl EventStore for PostgresEventStore {
    fn append(
        &self,
        events: Vec<UncommittedEvent>,
        expected_version: ExpectedVersion,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        let handle = tokio::runtime::Handle::try_current()
            .map_err(|e| EventStoreError::Storage(format!("no tokio runtime available: {e}")))?;
        handle.block_on(self.append_async(events, expected_version))
    }

    fn load_stream(
        &self,
        account_id: AccountId,
        aggregate_id: AggregateId,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        let handle = tokio::runtime::Handle::try_current()
            .map_err(|e| EventStoreError::Storage(format!("no tokio runtime available: {e}")))?;
        handle.block_on(self.load_stream_async(account_id, aggregate_id))
    }
}
