use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde_json::Value as JsonValue;

use facturier_billing::{DocumentLine, InvoiceEvent, InvoiceId, InvoiceStatus, Payment, QuoteId};
use facturier_core::{AccountId, AggregateId};
use facturier_events::EventEnvelope;

use crate::projections::cursor::{ProjectionError, StreamCursors};
use crate::read_model::AccountStore;

pub const INVOICE_AGGREGATE_TYPE: &str = "billing.invoice";

/// Read model for invoices.
///
/// Carries everything the API lists and the dunning sweep scans: balances,
/// due date and reminder bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvoiceReadModel {
    pub invoice_id: InvoiceId,
    pub client_id: Option<AggregateId>,
    pub quote_id: Option<QuoteId>,
    pub number: String,
    pub status: InvoiceStatus,
    pub issue_date: NaiveDate,
    pub due_date: NaiveDate,
    pub total_ht: Decimal,
    pub total_tax: Decimal,
    pub total_ttc: Decimal,
    pub amount_paid: Decimal,
    pub amount_due: Decimal,
    pub reminder_count: u8,
    pub last_reminder_at: Option<NaiveDate>,
    pub lines: Vec<DocumentLine>,
    pub payments: Vec<Payment>,
}

/// Invoices projection: maintains the invoice read model per account.
#[derive(Debug)]
pub struct InvoicesProjection<S>
where
    S: AccountStore<InvoiceId, InvoiceReadModel>,
{
    store: S,
    cursors: StreamCursors,
}

impl<S> InvoicesProjection<S>
where
    S: AccountStore<InvoiceId, InvoiceReadModel>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            cursors: StreamCursors::new(),
        }
    }

    pub fn get(&self, account_id: AccountId, invoice_id: &InvoiceId) -> Option<InvoiceReadModel> {
        self.store.get(account_id, invoice_id)
    }

    pub fn list(&self, account_id: AccountId) -> Vec<InvoiceReadModel> {
        self.store.list(account_id)
    }

    pub fn count(&self, account_id: AccountId) -> u32 {
        self.store.list(account_id).len() as u32
    }

    /// All accounts with at least one invoice (dunning sweep scan).
    pub fn accounts(&self) -> Vec<AccountId> {
        self.store.accounts()
    }

    /// Apply an envelope into the read model (idempotent).
    pub fn apply_envelope(
        &self,
        envelope: &EventEnvelope<JsonValue>,
    ) -> Result<(), ProjectionError> {
        if envelope.aggregate_type() != INVOICE_AGGREGATE_TYPE {
            return Ok(());
        }

        let account_id = envelope.account_id();
        let aggregate_id = envelope.aggregate_id();
        let seq = envelope.sequence_number();

        if !self.cursors.admit(account_id, aggregate_id, seq)? {
            return Ok(());
        }

        let ev: InvoiceEvent = serde_json::from_value(envelope.payload().clone())
            .map_err(|e| ProjectionError::Deserialize(e.to_string()))?;

        let (event_account, invoice_id) = match &ev {
            InvoiceEvent::InvoiceCreated(e) => (e.account_id, e.invoice_id),
            InvoiceEvent::InvoiceSent(e) => (e.account_id, e.invoice_id),
            InvoiceEvent::InvoiceViewed(e) => (e.account_id, e.invoice_id),
            InvoiceEvent::PaymentRecorded(e) => (e.account_id, e.invoice_id),
            InvoiceEvent::InvoiceCancelled(e) => (e.account_id, e.invoice_id),
            InvoiceEvent::CreditNoteIssued(e) => (e.account_id, e.invoice_id),
            InvoiceEvent::InvoiceMarkedOverdue(e) => (e.account_id, e.invoice_id),
            InvoiceEvent::ReminderRecorded(e) => (e.account_id, e.invoice_id),
        };

        if event_account != account_id {
            return Err(ProjectionError::AccountIsolation(
                "event account_id does not match envelope account_id".to_string(),
            ));
        }
        if invoice_id.0 != aggregate_id {
            return Err(ProjectionError::AccountIsolation(
                "event invoice_id does not match envelope aggregate_id".to_string(),
            ));
        }

        match ev {
            InvoiceEvent::InvoiceCreated(e) => {
                self.store.upsert(
                    account_id,
                    e.invoice_id,
                    InvoiceReadModel {
                        invoice_id: e.invoice_id,
                        client_id: Some(e.client_id),
                        quote_id: e.quote_id,
                        number: e.number,
                        status: InvoiceStatus::Draft,
                        issue_date: e.issue_date,
                        due_date: e.due_date,
                        total_ht: e.totals.total_ht,
                        total_tax: e.totals.total_tax,
                        total_ttc: e.totals.total_ttc,
                        amount_paid: Decimal::ZERO,
                        amount_due: e.totals.total_ttc,
                        reminder_count: 0,
                        last_reminder_at: None,
                        lines: e.lines,
                        payments: Vec::new(),
                    },
                );
            }
            InvoiceEvent::InvoiceSent(e) => {
                self.with_model(account_id, e.invoice_id, |rm| {
                    rm.status = InvoiceStatus::Sent;
                });
            }
            InvoiceEvent::InvoiceViewed(e) => {
                self.with_model(account_id, e.invoice_id, |rm| {
                    rm.status = InvoiceStatus::Viewed;
                });
            }
            InvoiceEvent::PaymentRecorded(e) => {
                self.with_model(account_id, e.invoice_id, |rm| {
                    rm.payments.push(e.payment.clone());
                    rm.amount_paid = e.new_amount_paid;
                    rm.amount_due = e.new_amount_due;
                    rm.status = if e.new_amount_due.is_zero() {
                        InvoiceStatus::Paid
                    } else {
                        InvoiceStatus::PartiallyPaid
                    };
                });
            }
            InvoiceEvent::InvoiceCancelled(e) => {
                self.with_model(account_id, e.invoice_id, |rm| {
                    rm.status = InvoiceStatus::Cancelled;
                });
            }
            InvoiceEvent::CreditNoteIssued(e) => {
                self.with_model(account_id, e.invoice_id, |rm| {
                    rm.status = InvoiceStatus::Credited;
                });
            }
            InvoiceEvent::InvoiceMarkedOverdue(e) => {
                self.with_model(account_id, e.invoice_id, |rm| {
                    rm.status = InvoiceStatus::Overdue;
                });
            }
            InvoiceEvent::ReminderRecorded(e) => {
                self.with_model(account_id, e.invoice_id, |rm| {
                    rm.reminder_count = e.tier.index();
                    rm.last_reminder_at = Some(e.sent_on);
                    rm.status = InvoiceStatus::Overdue;
                });
            }
        }

        self.cursors.advance(account_id, aggregate_id, seq);
        Ok(())
    }

    /// Rebuild the read model from scratch by replaying envelopes.
    pub fn rebuild_from_scratch(
        &self,
        envelopes: impl IntoIterator<Item = EventEnvelope<JsonValue>>,
    ) -> Result<(), ProjectionError> {
        let mut envs: Vec<_> = envelopes.into_iter().collect();

        {
            let mut accounts = envs.iter().map(|e| e.account_id()).collect::<Vec<_>>();
            accounts.sort_by_key(|a| *a.as_uuid().as_bytes());
            accounts.dedup();
            for a in accounts {
                self.store.clear_account(a);
                self.cursors.clear_account(a);
            }
        }

        envs.sort_by_key(|e| {
            (
                *e.account_id().as_uuid().as_bytes(),
                *e.aggregate_id().as_uuid().as_bytes(),
                e.sequence_number(),
            )
        });

        for env in &envs {
            self.apply_envelope(env)?;
        }

        Ok(())
    }

    fn with_model(
        &self,
        account_id: AccountId,
        invoice_id: InvoiceId,
        update: impl FnOnce(&mut InvoiceReadModel),
    ) {
        if let Some(mut rm) = self.store.get(account_id, &invoice_id) {
            update(&mut rm);
            self.store.upsert(account_id, invoice_id, rm);
        }
    }
}
