//! Command execution pipeline (application-level orchestration).
//!
//! One consistent lifecycle for every aggregate:
//!
//! ```text
//! load history → rehydrate → handle command → append (optimistic) → publish
//! ```
//!
//! Events are persisted before publication; if the append fails nothing is
//! published. Optimistic concurrency against the stream version makes each
//! command a single atomic read-modify-write per document — two concurrent
//! payments can never both commit against the same stale balance; the loser
//! receives `DispatchError::Concurrency` and must retry from fresh state.

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use uuid::Uuid;

use facturier_core::{AccountId, Aggregate, AggregateId, DomainError, ExpectedVersion};
use facturier_events::{EventBus, EventEnvelope};

use crate::event_store::{EventStore, EventStoreError, StoredEvent, UncommittedEvent};

#[derive(Debug)]
pub enum DispatchError {
    /// Optimistic concurrency failure (stale aggregate version).
    Concurrency(String),
    /// Account isolation violation (cross-account or cross-aggregate stream mixing).
    AccountIsolation(String),
    /// Domain validation failure (deterministic).
    Validation(String),
    /// Domain invariant failure (deterministic).
    InvariantViolation(String),
    /// Plan quota denial (usage gate).
    LimitExceeded(String),
    /// Domain authorization failure.
    Unauthorized,
    /// Domain-level not found.
    NotFound,
    /// Failed to deserialize historical event payloads into the aggregate event type.
    Deserialize(String),
    /// Persisting to the event store failed.
    Store(EventStoreError),
    /// Publication failed after a successful append (at-least-once; retry may duplicate).
    Publish(String),
}

impl From<EventStoreError> for DispatchError {
    fn from(value: EventStoreError) -> Self {
        match &value {
            EventStoreError::Concurrency(msg) => DispatchError::Concurrency(msg.clone()),
            EventStoreError::AccountIsolation(msg) => DispatchError::AccountIsolation(msg.clone()),
            _ => DispatchError::Store(value),
        }
    }
}

impl From<DomainError> for DispatchError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::Validation(msg) => DispatchError::Validation(msg),
            DomainError::InvariantViolation(msg) => DispatchError::InvariantViolation(msg),
            DomainError::Conflict(msg) => DispatchError::Concurrency(msg),
            DomainError::LimitExceeded(msg) => DispatchError::LimitExceeded(msg),
            DomainError::Unauthorized => DispatchError::Unauthorized,
            DomainError::NotFound => DispatchError::NotFound,
            DomainError::InvalidId(msg) => DispatchError::Validation(msg),
        }
    }
}

/// Reusable command execution engine for event-sourced aggregates.
///
/// Generic over the event store and bus so tests run against the in-memory
/// implementations and production can swap in the Postgres store without
/// touching domain code.
#[derive(Debug)]
pub struct CommandDispatcher<S, B> {
    store: S,
    bus: B,
}

impl<S, B> CommandDispatcher<S, B> {
    pub fn new(store: S, bus: B) -> Self {
        Self { store, bus }
    }

    pub fn into_parts(self) -> (S, B) {
        (self.store, self.bus)
    }
}

impl<S, B> CommandDispatcher<S, B>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    /// Dispatch a command through the full pipeline.
    ///
    /// The `make_aggregate` factory creates a fresh instance for rehydration
    /// (e.g. `Invoice::empty(id)`), keeping the dispatcher generic over
    /// aggregate construction.
    pub fn dispatch<A>(
        &self,
        account_id: AccountId,
        aggregate_id: AggregateId,
        aggregate_type: impl Into<String>,
        command: A::Command,
        make_aggregate: impl FnOnce(AccountId, AggregateId) -> A,
    ) -> Result<Vec<StoredEvent>, DispatchError>
    where
        A: Aggregate<Error = DomainError>,
        A::Event: facturier_events::Event + Serialize + DeserializeOwned,
    {
        // 1) Load history (account-scoped)
        let history = self.store.load_stream(account_id, aggregate_id)?;
        validate_loaded_stream(account_id, aggregate_id, &history)?;
        let expected = ExpectedVersion::Exact(stream_version(&history));

        // 2) Rehydrate aggregate
        let mut aggregate = make_aggregate(account_id, aggregate_id);
        apply_history::<A>(&mut aggregate, &history)?;

        // 3) Decide events (no mutation)
        let decided = aggregate.handle(&command).map_err(DispatchError::from)?;
        if decided.is_empty() {
            return Ok(vec![]);
        }

        // 4) Persist (append-only, optimistic)
        let aggregate_type = aggregate_type.into();
        let uncommitted = decided
            .iter()
            .map(|ev| {
                UncommittedEvent::from_typed(
                    account_id,
                    aggregate_id,
                    aggregate_type.clone(),
                    Uuid::now_v7(),
                    ev,
                )
            })
            .collect::<Result<Vec<_>, _>>()?;

        let committed = self.store.append(uncommitted, expected)?;

        // 5) Publish committed events (after append)
        for stored in &committed {
            self.bus
                .publish(stored.to_envelope())
                .map_err(|e| DispatchError::Publish(format!("{e:?}")))?;
        }

        Ok(committed)
    }
}

fn stream_version(stream: &[StoredEvent]) -> u64 {
    stream.last().map(|e| e.sequence_number).unwrap_or(0)
}

fn validate_loaded_stream(
    account_id: AccountId,
    aggregate_id: AggregateId,
    stream: &[StoredEvent],
) -> Result<(), DispatchError> {
    // Enforce account isolation even if a buggy backend returns cross-account
    // data, and require strictly increasing sequence numbers.
    let mut last = 0u64;
    for (idx, e) in stream.iter().enumerate() {
        if e.account_id != account_id {
            return Err(DispatchError::AccountIsolation(format!(
                "loaded stream contains wrong account_id at index {idx}"
            )));
        }
        if e.aggregate_id != aggregate_id {
            return Err(DispatchError::AccountIsolation(format!(
                "loaded stream contains wrong aggregate_id at index {idx}"
            )));
        }
        if e.sequence_number == 0 {
            return Err(DispatchError::Store(EventStoreError::InvalidAppend(
                "stored event has sequence_number=0".to_string(),
            )));
        }
        if e.sequence_number <= last {
            return Err(DispatchError::Store(EventStoreError::InvalidAppend(format!(
                "non-monotonic sequence_number in loaded stream (last={last}, found={})",
                e.sequence_number
            ))));
        }
        last = e.sequence_number;
    }
    Ok(())
}

fn apply_history<A>(aggregate: &mut A, history: &[StoredEvent]) -> Result<(), DispatchError>
where
    A: Aggregate,
    A::Event: DeserializeOwned,
{
    // Ensure deterministic ordering.
    let mut sorted = history.to_vec();
    sorted.sort_by_key(|e| e.sequence_number);

    for stored in sorted {
        let ev: A::Event = serde_json::from_value(stored.payload)
            .map_err(|e| DispatchError::Deserialize(e.to_string()))?;
        aggregate.apply(&ev);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event_store::InMemoryEventStore;
    use chrono::{NaiveDate, Utc};
    use facturier_billing::{
        CreateInvoice, Invoice, InvoiceCommand, InvoiceId, LineInput, PaymentMethod, RecordPayment,
    };
    use facturier_events::InMemoryEventBus;
    use rust_decimal_macros::dec;
    use std::sync::Arc;

    type TestDispatcher =
        CommandDispatcher<Arc<InMemoryEventStore>, Arc<InMemoryEventBus<EventEnvelope<JsonValue>>>>;

    fn dispatcher() -> TestDispatcher {
        CommandDispatcher::new(
            Arc::new(InMemoryEventStore::new()),
            Arc::new(InMemoryEventBus::new()),
        )
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn create_cmd(account_id: AccountId, invoice_id: InvoiceId) -> InvoiceCommand {
        InvoiceCommand::CreateInvoice(CreateInvoice {
            account_id,
            invoice_id,
            client_id: AggregateId::new(),
            quote_id: None,
            number: "FAC-2026-0001".to_string(),
            issue_date: date(2026, 6, 1),
            due_date: date(2026, 7, 1),
            lines: vec![LineInput {
                description: "conseil".to_string(),
                quantity: dec!(1),
                unit: None,
                unit_price: dec!(500.00),
                tax_rate: dec!(20),
            }],
            occurred_at: Utc::now(),
        })
    }

    #[test]
    fn dispatch_persists_and_rehydrates() {
        let d = dispatcher();
        let account_id = AccountId::new();
        let agg = AggregateId::new();
        let invoice_id = InvoiceId::new(agg);

        let committed = d
            .dispatch::<Invoice>(
                account_id,
                agg,
                "billing.invoice",
                create_cmd(account_id, invoice_id),
                |_a, id| Invoice::empty(InvoiceId::new(id)),
            )
            .unwrap();
        assert_eq!(committed.len(), 1);
        assert_eq!(committed[0].sequence_number, 1);

        // Second command sees the rehydrated state.
        let committed = d
            .dispatch::<Invoice>(
                account_id,
                agg,
                "billing.invoice",
                InvoiceCommand::SendInvoice(facturier_billing::SendInvoice {
                    account_id,
                    invoice_id,
                    occurred_at: Utc::now(),
                }),
                |_a, id| Invoice::empty(InvoiceId::new(id)),
            )
            .unwrap();
        assert_eq!(committed[0].sequence_number, 2);
    }

    #[test]
    fn domain_errors_map_to_dispatch_errors() {
        let d = dispatcher();
        let account_id = AccountId::new();
        let agg = AggregateId::new();
        let invoice_id = InvoiceId::new(agg);

        // Payment against a missing invoice is NotFound.
        let err = d
            .dispatch::<Invoice>(
                account_id,
                agg,
                "billing.invoice",
                InvoiceCommand::RecordPayment(RecordPayment {
                    account_id,
                    invoice_id,
                    amount: dec!(10),
                    method: PaymentMethod::Card,
                    reference: None,
                    paid_on: date(2026, 6, 1),
                    notes: None,
                    occurred_at: Utc::now(),
                }),
                |_a, id| Invoice::empty(InvoiceId::new(id)),
            )
            .unwrap_err();
        assert!(matches!(err, DispatchError::NotFound));

        // Creating twice is a conflict → concurrency.
        d.dispatch::<Invoice>(
            account_id,
            agg,
            "billing.invoice",
            create_cmd(account_id, invoice_id),
            |_a, id| Invoice::empty(InvoiceId::new(id)),
        )
        .unwrap();
        let err = d
            .dispatch::<Invoice>(
                account_id,
                agg,
                "billing.invoice",
                create_cmd(account_id, invoice_id),
                |_a, id| Invoice::empty(InvoiceId::new(id)),
            )
            .unwrap_err();
        assert!(matches!(err, DispatchError::Concurrency(_)));
    }
}
