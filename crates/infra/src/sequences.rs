//! Document number sequences.
//!
//! One counter per `(account, document kind)` pair, incremented atomically by
//! the backing store. Two concurrent calls can never observe the same value;
//! a crash after an increment but before the document is persisted leaves an
//! unused number, which is an accepted gap — a duplicate never is.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{Datelike, Utc};
use thiserror::Error;

use facturier_billing::{DocumentKind, format_document_number};
use facturier_core::AccountId;

#[derive(Debug, Error)]
pub enum SequenceError {
    #[error("sequence storage unavailable: {0}")]
    Storage(String),
}

/// Atomic increment-and-read of a per-account document counter.
pub trait SequenceStore: Send + Sync {
    /// Return the next sequence value (starting at 1), monotonically
    /// increasing per `(account, kind)`.
    fn next(&self, account_id: AccountId, kind: DocumentKind) -> Result<u64, SequenceError>;
}

/// In-memory sequence store (single-process dev/tests).
#[derive(Debug, Default)]
pub struct InMemorySequenceStore {
    counters: Mutex<HashMap<(AccountId, DocumentKind), u64>>,
}

impl InMemorySequenceStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SequenceStore for InMemorySequenceStore {
    fn next(&self, account_id: AccountId, kind: DocumentKind) -> Result<u64, SequenceError> {
        let mut counters = self
            .counters
            .lock()
            .map_err(|_| SequenceError::Storage("lock poisoned".to_string()))?;
        let counter = counters.entry((account_id, kind)).or_insert(0);
        *counter += 1;
        Ok(*counter)
    }
}

/// Allocates formatted document numbers from a [`SequenceStore`].
///
/// Allocation happens before the document is persisted; a failed allocation
/// must fail the whole creation, so no document is ever persisted without a
/// number.
pub struct NumberAllocator<S> {
    store: S,
}

impl<S: SequenceStore> NumberAllocator<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Allocate the next number for the current year.
    pub fn allocate(
        &self,
        account_id: AccountId,
        kind: DocumentKind,
    ) -> Result<String, SequenceError> {
        self.allocate_for_year(account_id, kind, Utc::now().year())
    }

    pub fn allocate_for_year(
        &self,
        account_id: AccountId,
        kind: DocumentKind,
        year: i32,
    ) -> Result<String, SequenceError> {
        let sequence = self.store.next(account_id, kind)?;
        Ok(format_document_number(kind, year, sequence))
    }
}

#[cfg(feature = "postgres")]
pub use self::postgres::PostgresSequenceStore;

#[cfg(feature = "postgres")]
mod postgres {
    use super::*;
    use sqlx::PgPool;
    use std::sync::Arc;

    /// Postgres-backed sequence store.
    ///
    /// The increment is a single storage-native atomic update:
    ///
    /// ```sql
    /// CREATE TABLE billing_sequences (
    ///     account_id UUID NOT NULL,
    ///     kind       TEXT NOT NULL,
    ///     value      BIGINT NOT NULL,
    ///     PRIMARY KEY (account_id, kind)
    /// );
    /// ```
    #[derive(Debug, Clone)]
    pub struct PostgresSequenceStore {
        pool: Arc<PgPool>,
    }

    impl PostgresSequenceStore {
        pub fn new(pool: PgPool) -> Self {
            Self {
                pool: Arc::new(pool),
            }
        }

        pub async fn next_async(
            &self,
            account_id: AccountId,
            kind: DocumentKind,
        ) -> Result<u64, SequenceError> {
            let value: i64 = sqlx::query_scalar(
                r#"
                INSERT INTO billing_sequences (account_id, kind, value)
                VALUES ($1, $2, 1)
                ON CONFLICT (account_id, kind)
                DO UPDATE SET value = billing_sequences.value + 1
                RETURNING value
                "#,
            )
            .bind(account_id.as_uuid())
            .bind(kind.as_str())
            .fetch_one(self.pool.as_ref())
            .await
            .map_err(|e| SequenceError::Storage(e.to_string()))?;

            Ok(value as u64)
        }
    }

    impl SequenceStore for PostgresSequenceStore {
        fn next(&self, account_id: AccountId, kind: DocumentKind) -> Result<u64, SequenceError> {
            let handle = tokio::runtime::Handle::try_current()
                .map_err(|e| SequenceError::Storage(format!("no tokio runtime available: {e}")))?;
            handle.block_on(self.next_async(account_id, kind))
        }
    }
}

impl<S> SequenceStore for std::sync::Arc<S>
where
    S: SequenceStore + ?Sized,
{
    fn next(&self, account_id: AccountId, kind: DocumentKind) -> Result<u64, SequenceError> {
        (**self).next(account_id, kind)
    }
}
