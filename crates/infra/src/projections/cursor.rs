//! Per-stream cursor tracking shared by all projections.

use std::collections::HashMap;
use std::sync::RwLock;

use thiserror::Error;

use facturier_core::{AccountId, AggregateId};

#[derive(Debug, Error)]
pub enum ProjectionError {
    #[error("failed to deserialize event payload: {0}")]
    Deserialize(String),

    #[error("account isolation violation: {0}")]
    AccountIsolation(String),

    #[error("non-monotonic sequence number (last={last}, found={found})")]
    NonMonotonicSequence { last: u64, found: u64 },
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
struct CursorKey {
    account_id: AccountId,
    aggregate_id: AggregateId,
}

/// Tracks the last applied sequence number per `(account, aggregate)` stream,
/// making projections idempotent under at-least-once delivery.
#[derive(Debug, Default)]
pub struct StreamCursors {
    inner: RwLock<HashMap<CursorKey, u64>>,
}

impl StreamCursors {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decide whether an envelope at `sequence_number` should be applied.
    ///
    /// Returns `Ok(false)` for already-applied duplicates (skip silently),
    /// `Ok(true)` when the event is the next one in the stream, and an error
    /// when a gap would be silently jumped.
    pub fn admit(
        &self,
        account_id: AccountId,
        aggregate_id: AggregateId,
        sequence_number: u64,
    ) -> Result<bool, ProjectionError> {
        let last = self.last(account_id, aggregate_id);

        if sequence_number == 0 {
            return Err(ProjectionError::NonMonotonicSequence {
                last,
                found: sequence_number,
            });
        }
        if sequence_number <= last {
            return Ok(false);
        }
        if last != 0 && sequence_number != last + 1 {
            return Err(ProjectionError::NonMonotonicSequence {
                last,
                found: sequence_number,
            });
        }
        Ok(true)
    }

    pub fn advance(&self, account_id: AccountId, aggregate_id: AggregateId, sequence_number: u64) {
        if let Ok(mut cursors) = self.inner.write() {
            cursors.insert(
                CursorKey {
                    account_id,
                    aggregate_id,
                },
                sequence_number,
            );
        }
    }

    pub fn clear_account(&self, account_id: AccountId) {
        if let Ok(mut cursors) = self.inner.write() {
            cursors.retain(|k, _| k.account_id != account_id);
        }
    }

    fn last(&self, account_id: AccountId, aggregate_id: AggregateId) -> u64 {
        match self.inner.read() {
            Ok(cursors) => *cursors
                .get(&CursorKey {
                    account_id,
                    aggregate_id,
                })
                .unwrap_or(&0),
            Err(_) => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admits_in_order_and_skips_duplicates() {
        let cursors = StreamCursors::new();
        let account_id = AccountId::new();
        let aggregate_id = AggregateId::new();

        assert!(cursors.admit(account_id, aggregate_id, 1).unwrap());
        cursors.advance(account_id, aggregate_id, 1);

        // Re-delivery of the same event is a silent skip.
        assert!(!cursors.admit(account_id, aggregate_id, 1).unwrap());

        assert!(cursors.admit(account_id, aggregate_id, 2).unwrap());
        cursors.advance(account_id, aggregate_id, 2);
    }

    #[test]
    fn gaps_are_errors() {
        let cursors = StreamCursors::new();
        let account_id = AccountId::new();
        let aggregate_id = AggregateId::new();

        cursors.advance(account_id, aggregate_id, 1);
        let err = cursors.admit(account_id, aggregate_id, 3).unwrap_err();
        assert!(matches!(
            err,
            ProjectionError::NonMonotonicSequence { last: 1, found: 3 }
        ));
    }
}
