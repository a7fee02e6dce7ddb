//! Quote → invoice conversion.
//!
//! Two aggregates cannot share one transaction, so the conversion runs as a
//! short compensated workflow:
//!
//! 1. allocate the invoice number,
//! 2. mark the quote converted (optimistic concurrency makes this the single
//!    winner under concurrent conversions),
//! 3. create the invoice from the quote's lines,
//! 4. on step-3 failure, revert the quote's conversion mark.
//!
//! A number consumed by a failed conversion stays unused — an accepted gap.

use chrono::{DateTime, Duration, Utc};
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use thiserror::Error;
use tracing::warn;

use facturier_billing::{
    CreateInvoice, DocumentKind, Invoice, InvoiceCommand, InvoiceId, MarkQuoteConverted, Quote,
    QuoteCommand, QuoteId, RevertQuoteConversion,
};
use facturier_clients::{Client, ClientId, client::DEFAULT_PAYMENT_TERMS_DAYS};
use facturier_core::{AccountId, Aggregate, AggregateId, DomainError};
use facturier_events::{EventBus, EventEnvelope};

use crate::command_dispatcher::{CommandDispatcher, DispatchError};
use crate::event_store::{EventStore, EventStoreError};
use crate::sequences::{NumberAllocator, SequenceError, SequenceStore};

pub const QUOTE_AGGREGATE_TYPE: &str = "billing.quote";
pub const INVOICE_AGGREGATE_TYPE: &str = "billing.invoice";
pub const CLIENT_AGGREGATE_TYPE: &str = "clients.client";

#[derive(Debug, Error)]
pub enum ConversionError {
    #[error("quote not found")]
    QuoteNotFound,

    #[error("number allocation failed: {0}")]
    Sequence(#[from] SequenceError),

    #[error("event store failure: {0}")]
    Store(#[from] EventStoreError),

    #[error("conversion rejected: {0:?}")]
    Dispatch(DispatchError),
}

impl From<DispatchError> for ConversionError {
    fn from(value: DispatchError) -> Self {
        ConversionError::Dispatch(value)
    }
}

/// Materializes an accepted quote into a new invoice.
pub struct QuoteConversion<S, B, Seq> {
    store: S,
    dispatcher: std::sync::Arc<CommandDispatcher<S, B>>,
    allocator: NumberAllocator<Seq>,
}

impl<S, B, Seq> QuoteConversion<S, B, Seq>
where
    S: EventStore + Clone,
    B: EventBus<EventEnvelope<JsonValue>>,
    Seq: SequenceStore,
{
    pub fn new(
        store: S,
        dispatcher: std::sync::Arc<CommandDispatcher<S, B>>,
        sequences: Seq,
    ) -> Self {
        Self {
            store,
            dispatcher,
            allocator: NumberAllocator::new(sequences),
        }
    }

    /// Convert `quote_id` into a fresh invoice; returns the new invoice id.
    pub fn convert(
        &self,
        account_id: AccountId,
        quote_id: QuoteId,
        now: DateTime<Utc>,
    ) -> Result<InvoiceId, ConversionError> {
        let invoice_id = InvoiceId::new(AggregateId::new());
        self.convert_with_id(account_id, quote_id, invoice_id, now)
    }

    fn convert_with_id(
        &self,
        account_id: AccountId,
        quote_id: QuoteId,
        invoice_id: InvoiceId,
        now: DateTime<Utc>,
    ) -> Result<InvoiceId, ConversionError> {
        let quote: Quote = self.rehydrate(account_id, quote_id.0, |id| {
            Quote::empty(QuoteId::new(id))
        })?;
        if quote.is_deleted() || quote.account_id().is_none() {
            return Err(ConversionError::QuoteNotFound);
        }

        // Line items carry over verbatim; recomputing from the same inputs
        // reproduces identical per-line totals.
        let lines: Vec<_> = quote.lines().iter().map(|l| l.to_input()).collect();
        let client_id = quote
            .client_id()
            .ok_or(ConversionError::QuoteNotFound)?;

        let payment_terms_days = self.client_payment_terms(account_id, client_id);

        let number = self
            .allocator
            .allocate(account_id, DocumentKind::Invoice)?;

        // Step 1: mark the quote converted. The aggregate guard (accepted,
        // not yet converted) plus optimistic concurrency admit one winner.
        self.dispatcher.dispatch::<Quote>(
            account_id,
            quote_id.0,
            QUOTE_AGGREGATE_TYPE,
            QuoteCommand::MarkQuoteConverted(MarkQuoteConverted {
                account_id,
                quote_id,
                invoice_id,
                occurred_at: now,
            }),
            |_a, id| Quote::empty(QuoteId::new(id)),
        )?;

        // Step 2: create the invoice. On failure, compensate.
        let issue_date = now.date_naive();
        let due_date = issue_date + Duration::days(payment_terms_days as i64);
        let created = self.dispatcher.dispatch::<Invoice>(
            account_id,
            invoice_id.0,
            INVOICE_AGGREGATE_TYPE,
            InvoiceCommand::CreateInvoice(CreateInvoice {
                account_id,
                invoice_id,
                client_id,
                quote_id: Some(quote_id),
                number,
                issue_date,
                due_date,
                lines,
                occurred_at: now,
            }),
            |_a, id| Invoice::empty(InvoiceId::new(id)),
        );

        if let Err(err) = created {
            let reverted = self.dispatcher.dispatch::<Quote>(
                account_id,
                quote_id.0,
                QUOTE_AGGREGATE_TYPE,
                QuoteCommand::RevertQuoteConversion(RevertQuoteConversion {
                    account_id,
                    quote_id,
                    occurred_at: Utc::now(),
                }),
                |_a, id| Quote::empty(QuoteId::new(id)),
            );
            if let Err(revert_err) = reverted {
                warn!(
                    quote_id = %quote_id,
                    error = ?revert_err,
                    "failed to revert quote conversion after invoice creation failure"
                );
            }
            return Err(err.into());
        }

        Ok(invoice_id)
    }

    fn client_payment_terms(&self, account_id: AccountId, client_id: AggregateId) -> u32 {
        match self.rehydrate::<Client>(account_id, client_id, |id| Client::empty(ClientId::new(id)))
        {
            Ok(client) if client.account_id().is_some() => client.payment_terms_days(),
            _ => {
                warn!(
                    client_id = %client_id,
                    "client not found during conversion; using default payment terms"
                );
                DEFAULT_PAYMENT_TERMS_DAYS
            }
        }
    }

    fn rehydrate<A>(
        &self,
        account_id: AccountId,
        aggregate_id: AggregateId,
        make: impl FnOnce(AggregateId) -> A,
    ) -> Result<A, ConversionError>
    where
        A: Aggregate<Error = DomainError>,
        A::Event: DeserializeOwned,
    {
        let mut history = self.store.load_stream(account_id, aggregate_id)?;
        history.sort_by_key(|e| e.sequence_number);

        let mut aggregate = make(aggregate_id);
        for stored in history {
            let ev: A::Event = serde_json::from_value(stored.payload).map_err(|e| {
                ConversionError::Dispatch(DispatchError::Deserialize(e.to_string()))
            })?;
            aggregate.apply(&ev);
        }
        Ok(aggregate)
    }
}
