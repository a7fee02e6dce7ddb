use chrono::NaiveDate;
use serde_json::Value as JsonValue;

use facturier_billing::{DepositRequirement, DocumentLine, DocumentTotals, InvoiceId, QuoteEvent, QuoteId, QuoteStatus};
use facturier_core::AccountId;
use facturier_events::EventEnvelope;

use crate::projections::cursor::{ProjectionError, StreamCursors};
use crate::read_model::AccountStore;

pub const QUOTE_AGGREGATE_TYPE: &str = "billing.quote";

/// Read model for quotes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuoteReadModel {
    pub quote_id: QuoteId,
    pub client_id: Option<facturier_core::AggregateId>,
    pub number: String,
    pub status: QuoteStatus,
    pub issue_date: NaiveDate,
    pub validity_date: NaiveDate,
    pub totals: DocumentTotals,
    pub deposit: Option<DepositRequirement>,
    pub recipient_email: Option<String>,
    pub invoice_id: Option<InvoiceId>,
    pub lines: Vec<DocumentLine>,
}

/// Quotes projection: maintains the quote read model per account.
///
/// Draft deletion removes the record entirely, matching the write model's
/// draft-only physical deletion.
#[derive(Debug)]
pub struct QuotesProjection<S>
where
    S: AccountStore<QuoteId, QuoteReadModel>,
{
    store: S,
    cursors: StreamCursors,
}

impl<S> QuotesProjection<S>
where
    S: AccountStore<QuoteId, QuoteReadModel>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            cursors: StreamCursors::new(),
        }
    }

    pub fn get(&self, account_id: AccountId, quote_id: &QuoteId) -> Option<QuoteReadModel> {
        self.store.get(account_id, quote_id)
    }

    pub fn list(&self, account_id: AccountId) -> Vec<QuoteReadModel> {
        self.store.list(account_id)
    }

    pub fn count(&self, account_id: AccountId) -> u32 {
        self.store.list(account_id).len() as u32
    }

    /// Apply an envelope into the read model (idempotent).
    pub fn apply_envelope(
        &self,
        envelope: &EventEnvelope<JsonValue>,
    ) -> Result<(), ProjectionError> {
        if envelope.aggregate_type() != QUOTE_AGGREGATE_TYPE {
            return Ok(());
        }

        let account_id = envelope.account_id();
        let aggregate_id = envelope.aggregate_id();
        let seq = envelope.sequence_number();

        if !self.cursors.admit(account_id, aggregate_id, seq)? {
            return Ok(());
        }

        let ev: QuoteEvent = serde_json::from_value(envelope.payload().clone())
            .map_err(|e| ProjectionError::Deserialize(e.to_string()))?;

        let (event_account, quote_id) = match &ev {
            QuoteEvent::QuoteCreated(e) => (e.account_id, e.quote_id),
            QuoteEvent::QuoteSent(e) => (e.account_id, e.quote_id),
            QuoteEvent::QuoteViewed(e) => (e.account_id, e.quote_id),
            QuoteEvent::QuoteAccepted(e) => (e.account_id, e.quote_id),
            QuoteEvent::QuoteRefused(e) => (e.account_id, e.quote_id),
            QuoteEvent::QuoteExpired(e) => (e.account_id, e.quote_id),
            QuoteEvent::QuoteConverted(e) => (e.account_id, e.quote_id),
            QuoteEvent::QuoteConversionReverted(e) => (e.account_id, e.quote_id),
            QuoteEvent::QuoteDeleted(e) => (e.account_id, e.quote_id),
        };

        if event_account != account_id {
            return Err(ProjectionError::AccountIsolation(
                "event account_id does not match envelope account_id".to_string(),
            ));
        }
        if quote_id.0 != aggregate_id {
            return Err(ProjectionError::AccountIsolation(
                "event quote_id does not match envelope aggregate_id".to_string(),
            ));
        }

        match ev {
            QuoteEvent::QuoteCreated(e) => {
                self.store.upsert(
                    account_id,
                    e.quote_id,
                    QuoteReadModel {
                        quote_id: e.quote_id,
                        client_id: Some(e.client_id),
                        number: e.number,
                        status: QuoteStatus::Draft,
                        issue_date: e.issue_date,
                        validity_date: e.validity_date,
                        totals: e.totals,
                        deposit: e.deposit,
                        recipient_email: None,
                        invoice_id: None,
                        lines: e.lines,
                    },
                );
            }
            QuoteEvent::QuoteSent(e) => {
                self.with_model(account_id, e.quote_id, |rm| {
                    rm.status = QuoteStatus::Sent;
                    rm.recipient_email = Some(e.recipient_email.clone());
                });
            }
            QuoteEvent::QuoteViewed(e) => {
                self.with_model(account_id, e.quote_id, |rm| {
                    rm.status = QuoteStatus::Viewed;
                });
            }
            QuoteEvent::QuoteAccepted(e) => {
                self.with_model(account_id, e.quote_id, |rm| {
                    rm.status = QuoteStatus::Accepted;
                });
            }
            QuoteEvent::QuoteRefused(e) => {
                self.with_model(account_id, e.quote_id, |rm| {
                    rm.status = QuoteStatus::Refused;
                });
            }
            QuoteEvent::QuoteExpired(e) => {
                self.with_model(account_id, e.quote_id, |rm| {
                    rm.status = QuoteStatus::Expired;
                });
            }
            QuoteEvent::QuoteConverted(e) => {
                self.with_model(account_id, e.quote_id, |rm| {
                    rm.status = QuoteStatus::Converted;
                    rm.invoice_id = Some(e.invoice_id);
                });
            }
            QuoteEvent::QuoteConversionReverted(e) => {
                self.with_model(account_id, e.quote_id, |rm| {
                    rm.status = QuoteStatus::Accepted;
                    rm.invoice_id = None;
                });
            }
            QuoteEvent::QuoteDeleted(e) => {
                self.store.remove(account_id, &e.quote_id);
            }
        }

        self.cursors.advance(account_id, aggregate_id, seq);
        Ok(())
    }

    fn with_model(
        &self,
        account_id: AccountId,
        quote_id: QuoteId,
        update: impl FnOnce(&mut QuoteReadModel),
    ) {
        if let Some(mut rm) = self.store.get(account_id, &quote_id) {
            update(&mut rm);
            self.store.upsert(account_id, quote_id, rm);
        }
    }
}
