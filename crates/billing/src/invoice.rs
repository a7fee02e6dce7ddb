use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use facturier_core::{AccountId, Aggregate, AggregateId, AggregateRoot, DomainError};
use facturier_events::Event;

use crate::dunning::ReminderTier;
use crate::payment::{Payment, PaymentMethod};
use crate::quote::QuoteId;
use crate::totals::{DocumentLine, DocumentTotals, LineInput, compute_document};

/// Invoice identifier (account-scoped via `account_id` fields in events/commands).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InvoiceId(pub AggregateId);

impl InvoiceId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for InvoiceId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Invoice status lifecycle.
///
/// `Overdue` is derived from the due date and is not terminal: an overdue
/// invoice can still collect payments. `Cancelled` and `Credited` are
/// terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvoiceStatus {
    Draft,
    Sent,
    Viewed,
    PartiallyPaid,
    Paid,
    Overdue,
    Cancelled,
    Credited,
}

impl InvoiceStatus {
    /// Statuses from which a payment may be recorded.
    ///
    /// `Paid` stays formally payable here; the overpayment rule rejects any
    /// positive amount once the balance is zero.
    pub fn allows_payment(&self) -> bool {
        !matches!(
            self,
            InvoiceStatus::Draft | InvoiceStatus::Cancelled | InvoiceStatus::Credited
        )
    }

    /// Statuses the dunning sweep considers as reminder candidates.
    pub fn allows_reminder(&self) -> bool {
        matches!(
            self,
            InvoiceStatus::Sent
                | InvoiceStatus::Viewed
                | InvoiceStatus::Overdue
                | InvoiceStatus::PartiallyPaid
        )
    }

    /// Cancellation is legal from any non-paid, non-credited state.
    pub fn allows_cancellation(&self) -> bool {
        !matches!(
            self,
            InvoiceStatus::Paid | InvoiceStatus::Cancelled | InvoiceStatus::Credited
        )
    }

    /// Credit-note conversion is legal from any state except draft,
    /// cancelled, or an invoice that is already a credit note.
    pub fn allows_credit_note(&self) -> bool {
        !matches!(
            self,
            InvoiceStatus::Draft | InvoiceStatus::Cancelled | InvoiceStatus::Credited
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            InvoiceStatus::Draft => "draft",
            InvoiceStatus::Sent => "sent",
            InvoiceStatus::Viewed => "viewed",
            InvoiceStatus::PartiallyPaid => "partially_paid",
            InvoiceStatus::Paid => "paid",
            InvoiceStatus::Overdue => "overdue",
            InvoiceStatus::Cancelled => "cancelled",
            InvoiceStatus::Credited => "credited",
        }
    }
}

/// Aggregate root: Invoice.
///
/// Owns its lines and payments; `amount_due == total_ttc - amount_paid` holds
/// after every applied event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invoice {
    id: InvoiceId,
    account_id: Option<AccountId>,
    client_id: Option<AggregateId>,
    /// Originating quote, when the invoice was produced by conversion.
    quote_id: Option<QuoteId>,
    number: String,
    issue_date: NaiveDate,
    due_date: NaiveDate,
    status: InvoiceStatus,
    lines: Vec<DocumentLine>,
    totals: DocumentTotals,
    amount_paid: Decimal,
    amount_due: Decimal,
    payments: Vec<Payment>,
    reminder_count: u8,
    last_reminder_at: Option<NaiveDate>,
    version: u64,
    created: bool,
}

impl Invoice {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: InvoiceId) -> Self {
        Self {
            id,
            account_id: None,
            client_id: None,
            quote_id: None,
            number: String::new(),
            issue_date: NaiveDate::MIN,
            due_date: NaiveDate::MIN,
            status: InvoiceStatus::Draft,
            lines: Vec::new(),
            totals: DocumentTotals::zero(),
            amount_paid: Decimal::ZERO,
            amount_due: Decimal::ZERO,
            payments: Vec::new(),
            reminder_count: 0,
            last_reminder_at: None,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> InvoiceId {
        self.id
    }

    pub fn account_id(&self) -> Option<AccountId> {
        self.account_id
    }

    pub fn client_id(&self) -> Option<AggregateId> {
        self.client_id
    }

    pub fn quote_id(&self) -> Option<QuoteId> {
        self.quote_id
    }

    pub fn number(&self) -> &str {
        &self.number
    }

    pub fn issue_date(&self) -> NaiveDate {
        self.issue_date
    }

    pub fn due_date(&self) -> NaiveDate {
        self.due_date
    }

    pub fn status(&self) -> InvoiceStatus {
        self.status
    }

    pub fn lines(&self) -> &[DocumentLine] {
        &self.lines
    }

    pub fn totals(&self) -> &DocumentTotals {
        &self.totals
    }

    pub fn amount_paid(&self) -> Decimal {
        self.amount_paid
    }

    pub fn amount_due(&self) -> Decimal {
        self.amount_due
    }

    pub fn payments(&self) -> &[Payment] {
        &self.payments
    }

    pub fn reminder_count(&self) -> u8 {
        self.reminder_count
    }

    pub fn last_reminder_at(&self) -> Option<NaiveDate> {
        self.last_reminder_at
    }
}

impl AggregateRoot for Invoice {
    type Id = InvoiceId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: CreateInvoice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateInvoice {
    pub account_id: AccountId,
    pub invoice_id: InvoiceId,
    pub client_id: AggregateId,
    pub quote_id: Option<QuoteId>,
    pub number: String,
    pub issue_date: NaiveDate,
    pub due_date: NaiveDate,
    pub lines: Vec<LineInput>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: SendInvoice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendInvoice {
    pub account_id: AccountId,
    pub invoice_id: InvoiceId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: MarkInvoiceViewed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkInvoiceViewed {
    pub account_id: AccountId,
    pub invoice_id: InvoiceId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RecordPayment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordPayment {
    pub account_id: AccountId,
    pub invoice_id: InvoiceId,
    pub amount: Decimal,
    pub method: PaymentMethod,
    pub reference: Option<String>,
    pub paid_on: NaiveDate,
    pub notes: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: CancelInvoice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelInvoice {
    pub account_id: AccountId,
    pub invoice_id: InvoiceId,
    pub reason: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ConvertToCreditNote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConvertToCreditNote {
    pub account_id: AccountId,
    pub invoice_id: InvoiceId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: MarkOverdue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkOverdue {
    pub account_id: AccountId,
    pub invoice_id: InvoiceId,
    /// The date against which the due date is evaluated.
    pub as_of: NaiveDate,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RecordReminder (dispatched by the dunning sweep after delivery).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordReminder {
    pub account_id: AccountId,
    pub invoice_id: InvoiceId,
    pub tier: ReminderTier,
    pub sent_on: NaiveDate,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum InvoiceCommand {
    CreateInvoice(CreateInvoice),
    SendInvoice(SendInvoice),
    MarkInvoiceViewed(MarkInvoiceViewed),
    RecordPayment(RecordPayment),
    CancelInvoice(CancelInvoice),
    ConvertToCreditNote(ConvertToCreditNote),
    MarkOverdue(MarkOverdue),
    RecordReminder(RecordReminder),
}

/// Event: InvoiceCreated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceCreated {
    pub account_id: AccountId,
    pub invoice_id: InvoiceId,
    pub client_id: AggregateId,
    pub quote_id: Option<QuoteId>,
    pub number: String,
    pub issue_date: NaiveDate,
    pub due_date: NaiveDate,
    pub lines: Vec<DocumentLine>,
    pub totals: DocumentTotals,
    pub occurred_at: DateTime<Utc>,
}

/// Event: InvoiceSent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceSent {
    pub account_id: AccountId,
    pub invoice_id: InvoiceId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: InvoiceViewed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceViewed {
    pub account_id: AccountId,
    pub invoice_id: InvoiceId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: PaymentRecorded.
///
/// Carries the new running totals so projections never recompute balances.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentRecorded {
    pub account_id: AccountId,
    pub invoice_id: InvoiceId,
    pub payment: Payment,
    pub new_amount_paid: Decimal,
    pub new_amount_due: Decimal,
    pub occurred_at: DateTime<Utc>,
}

/// Event: InvoiceCancelled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceCancelled {
    pub account_id: AccountId,
    pub invoice_id: InvoiceId,
    pub reason: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: CreditNoteIssued.
///
/// Repurposes the invoice in place: totals are untouched, the document is
/// frozen from further payment activity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreditNoteIssued {
    pub account_id: AccountId,
    pub invoice_id: InvoiceId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: InvoiceMarkedOverdue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceMarkedOverdue {
    pub account_id: AccountId,
    pub invoice_id: InvoiceId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ReminderRecorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReminderRecorded {
    pub account_id: AccountId,
    pub invoice_id: InvoiceId,
    pub tier: ReminderTier,
    pub sent_on: NaiveDate,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum InvoiceEvent {
    InvoiceCreated(InvoiceCreated),
    InvoiceSent(InvoiceSent),
    InvoiceViewed(InvoiceViewed),
    PaymentRecorded(PaymentRecorded),
    InvoiceCancelled(InvoiceCancelled),
    CreditNoteIssued(CreditNoteIssued),
    InvoiceMarkedOverdue(InvoiceMarkedOverdue),
    ReminderRecorded(ReminderRecorded),
}

impl Event for InvoiceEvent {
    fn event_type(&self) -> &'static str {
        match self {
            InvoiceEvent::InvoiceCreated(_) => "billing.invoice.created",
            InvoiceEvent::InvoiceSent(_) => "billing.invoice.sent",
            InvoiceEvent::InvoiceViewed(_) => "billing.invoice.viewed",
            InvoiceEvent::PaymentRecorded(_) => "billing.invoice.payment_recorded",
            InvoiceEvent::InvoiceCancelled(_) => "billing.invoice.cancelled",
            InvoiceEvent::CreditNoteIssued(_) => "billing.invoice.credit_note_issued",
            InvoiceEvent::InvoiceMarkedOverdue(_) => "billing.invoice.marked_overdue",
            InvoiceEvent::ReminderRecorded(_) => "billing.invoice.reminder_recorded",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            InvoiceEvent::InvoiceCreated(e) => e.occurred_at,
            InvoiceEvent::InvoiceSent(e) => e.occurred_at,
            InvoiceEvent::InvoiceViewed(e) => e.occurred_at,
            InvoiceEvent::PaymentRecorded(e) => e.occurred_at,
            InvoiceEvent::InvoiceCancelled(e) => e.occurred_at,
            InvoiceEvent::CreditNoteIssued(e) => e.occurred_at,
            InvoiceEvent::InvoiceMarkedOverdue(e) => e.occurred_at,
            InvoiceEvent::ReminderRecorded(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Invoice {
    type Command = InvoiceCommand;
    type Event = InvoiceEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            InvoiceEvent::InvoiceCreated(e) => {
                self.id = e.invoice_id;
                self.account_id = Some(e.account_id);
                self.client_id = Some(e.client_id);
                self.quote_id = e.quote_id;
                self.number = e.number.clone();
                self.issue_date = e.issue_date;
                self.due_date = e.due_date;
                self.lines = e.lines.clone();
                self.totals = e.totals;
                self.amount_paid = Decimal::ZERO;
                self.amount_due = e.totals.total_ttc;
                self.payments.clear();
                self.status = InvoiceStatus::Draft;
                self.reminder_count = 0;
                self.last_reminder_at = None;
                self.created = true;
            }
            InvoiceEvent::InvoiceSent(_) => {
                self.status = InvoiceStatus::Sent;
            }
            InvoiceEvent::InvoiceViewed(_) => {
                self.status = InvoiceStatus::Viewed;
            }
            InvoiceEvent::PaymentRecorded(e) => {
                self.payments.push(e.payment.clone());
                self.amount_paid = e.new_amount_paid;
                self.amount_due = e.new_amount_due;
                self.status = if e.new_amount_due.is_zero() {
                    InvoiceStatus::Paid
                } else {
                    InvoiceStatus::PartiallyPaid
                };
            }
            InvoiceEvent::InvoiceCancelled(_) => {
                self.status = InvoiceStatus::Cancelled;
            }
            InvoiceEvent::CreditNoteIssued(_) => {
                self.status = InvoiceStatus::Credited;
            }
            InvoiceEvent::InvoiceMarkedOverdue(_) => {
                self.status = InvoiceStatus::Overdue;
            }
            InvoiceEvent::ReminderRecorded(e) => {
                self.reminder_count = e.tier.index();
                self.last_reminder_at = Some(e.sent_on);
                self.status = InvoiceStatus::Overdue;
            }
        }

        // Deterministic version tracking: +1 per applied event.
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            InvoiceCommand::CreateInvoice(cmd) => self.handle_create(cmd),
            InvoiceCommand::SendInvoice(cmd) => self.handle_send(cmd),
            InvoiceCommand::MarkInvoiceViewed(cmd) => self.handle_viewed(cmd),
            InvoiceCommand::RecordPayment(cmd) => self.handle_record_payment(cmd),
            InvoiceCommand::CancelInvoice(cmd) => self.handle_cancel(cmd),
            InvoiceCommand::ConvertToCreditNote(cmd) => self.handle_credit_note(cmd),
            InvoiceCommand::MarkOverdue(cmd) => self.handle_mark_overdue(cmd),
            InvoiceCommand::RecordReminder(cmd) => self.handle_record_reminder(cmd),
        }
    }
}

impl Invoice {
    fn ensure_account(&self, account_id: AccountId) -> Result<(), DomainError> {
        if !self.created {
            return Ok(());
        }
        if self.account_id != Some(account_id) {
            return Err(DomainError::invariant("account mismatch"));
        }
        Ok(())
    }

    fn ensure_invoice_id(&self, invoice_id: InvoiceId) -> Result<(), DomainError> {
        if self.id != invoice_id {
            return Err(DomainError::invariant("invoice_id mismatch"));
        }
        Ok(())
    }

    fn ensure_exists(&self) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        Ok(())
    }

    fn handle_create(&self, cmd: &CreateInvoice) -> Result<Vec<InvoiceEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("invoice already exists"));
        }

        if cmd.number.trim().is_empty() {
            return Err(DomainError::validation("invoice number must not be empty"));
        }
        if cmd.due_date < cmd.issue_date {
            return Err(DomainError::validation(
                "due_date must not precede issue_date",
            ));
        }

        let (lines, totals) = compute_document(&cmd.lines)?;

        Ok(vec![InvoiceEvent::InvoiceCreated(InvoiceCreated {
            account_id: cmd.account_id,
            invoice_id: cmd.invoice_id,
            client_id: cmd.client_id,
            quote_id: cmd.quote_id,
            number: cmd.number.clone(),
            issue_date: cmd.issue_date,
            due_date: cmd.due_date,
            lines,
            totals,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_send(&self, cmd: &SendInvoice) -> Result<Vec<InvoiceEvent>, DomainError> {
        self.ensure_exists()?;
        self.ensure_account(cmd.account_id)?;
        self.ensure_invoice_id(cmd.invoice_id)?;

        if self.status != InvoiceStatus::Draft {
            return Err(DomainError::invariant("only draft invoices can be sent"));
        }

        Ok(vec![InvoiceEvent::InvoiceSent(InvoiceSent {
            account_id: cmd.account_id,
            invoice_id: cmd.invoice_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_viewed(&self, cmd: &MarkInvoiceViewed) -> Result<Vec<InvoiceEvent>, DomainError> {
        self.ensure_exists()?;
        self.ensure_account(cmd.account_id)?;
        self.ensure_invoice_id(cmd.invoice_id)?;

        if self.status != InvoiceStatus::Sent {
            return Err(DomainError::invariant(
                "only sent invoices can be marked viewed",
            ));
        }

        Ok(vec![InvoiceEvent::InvoiceViewed(InvoiceViewed {
            account_id: cmd.account_id,
            invoice_id: cmd.invoice_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_record_payment(&self, cmd: &RecordPayment) -> Result<Vec<InvoiceEvent>, DomainError> {
        self.ensure_exists()?;
        self.ensure_account(cmd.account_id)?;
        self.ensure_invoice_id(cmd.invoice_id)?;

        if !self.status.allows_payment() {
            return Err(DomainError::invariant(
                "cannot record payment on a draft, cancelled or credited invoice",
            ));
        }

        if cmd.amount <= Decimal::ZERO {
            return Err(DomainError::validation("payment amount must be positive"));
        }

        if cmd.amount > self.amount_due {
            return Err(DomainError::invariant(
                "payment exceeds the invoice amount due",
            ));
        }

        let new_amount_paid = self.amount_paid + cmd.amount;
        let new_amount_due = self.totals.total_ttc - new_amount_paid;

        Ok(vec![InvoiceEvent::PaymentRecorded(PaymentRecorded {
            account_id: cmd.account_id,
            invoice_id: cmd.invoice_id,
            payment: Payment {
                amount: cmd.amount,
                method: cmd.method,
                reference: cmd.reference.clone(),
                paid_on: cmd.paid_on,
                notes: cmd.notes.clone(),
            },
            new_amount_paid,
            new_amount_due,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_cancel(&self, cmd: &CancelInvoice) -> Result<Vec<InvoiceEvent>, DomainError> {
        self.ensure_exists()?;
        self.ensure_account(cmd.account_id)?;
        self.ensure_invoice_id(cmd.invoice_id)?;

        if !self.status.allows_cancellation() {
            return Err(DomainError::invariant(
                "cannot cancel a paid, credited or already cancelled invoice",
            ));
        }

        Ok(vec![InvoiceEvent::InvoiceCancelled(InvoiceCancelled {
            account_id: cmd.account_id,
            invoice_id: cmd.invoice_id,
            reason: cmd.reason.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_credit_note(
        &self,
        cmd: &ConvertToCreditNote,
    ) -> Result<Vec<InvoiceEvent>, DomainError> {
        self.ensure_exists()?;
        self.ensure_account(cmd.account_id)?;
        self.ensure_invoice_id(cmd.invoice_id)?;

        if !self.status.allows_credit_note() {
            return Err(DomainError::invariant(
                "cannot convert a draft, cancelled or already credited invoice",
            ));
        }

        Ok(vec![InvoiceEvent::CreditNoteIssued(CreditNoteIssued {
            account_id: cmd.account_id,
            invoice_id: cmd.invoice_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_mark_overdue(&self, cmd: &MarkOverdue) -> Result<Vec<InvoiceEvent>, DomainError> {
        self.ensure_exists()?;
        self.ensure_account(cmd.account_id)?;
        self.ensure_invoice_id(cmd.invoice_id)?;

        if self.status == InvoiceStatus::Overdue {
            return Err(DomainError::conflict("invoice is already overdue"));
        }
        if !matches!(
            self.status,
            InvoiceStatus::Sent | InvoiceStatus::Viewed | InvoiceStatus::PartiallyPaid
        ) {
            return Err(DomainError::invariant(
                "only sent, viewed or partially paid invoices can become overdue",
            ));
        }
        if self.due_date >= cmd.as_of {
            return Err(DomainError::invariant("invoice due date has not passed"));
        }

        Ok(vec![InvoiceEvent::InvoiceMarkedOverdue(
            InvoiceMarkedOverdue {
                account_id: cmd.account_id,
                invoice_id: cmd.invoice_id,
                occurred_at: cmd.occurred_at,
            },
        )])
    }

    fn handle_record_reminder(
        &self,
        cmd: &RecordReminder,
    ) -> Result<Vec<InvoiceEvent>, DomainError> {
        self.ensure_exists()?;
        self.ensure_account(cmd.account_id)?;
        self.ensure_invoice_id(cmd.invoice_id)?;

        if !self.status.allows_reminder() {
            return Err(DomainError::invariant(
                "invoice status does not permit reminders",
            ));
        }
        if cmd.tier.index() != self.reminder_count + 1 {
            return Err(DomainError::invariant(format!(
                "reminder tier {} does not follow current count {}",
                cmd.tier.index(),
                self.reminder_count
            )));
        }

        Ok(vec![InvoiceEvent::ReminderRecorded(ReminderRecorded {
            account_id: cmd.account_id,
            invoice_id: cmd.invoice_id,
            tier: cmd.tier,
            sent_on: cmd.sent_on,
            occurred_at: cmd.occurred_at,
        })])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn test_account_id() -> AccountId {
        AccountId::new()
    }

    fn test_invoice_id() -> InvoiceId {
        InvoiceId::new(AggregateId::new())
    }

    fn test_time() -> DateTime<Utc> {
        date(2026, 6, 15).and_hms_opt(12, 0, 0).unwrap().and_utc()
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn create_cmd(account_id: AccountId, invoice_id: InvoiceId) -> CreateInvoice {
        CreateInvoice {
            account_id,
            invoice_id,
            client_id: AggregateId::new(),
            quote_id: None,
            number: "FAC-2026-0001".to_string(),
            issue_date: date(2026, 6, 1),
            due_date: date(2026, 7, 1),
            lines: vec![LineInput {
                description: "Développement".to_string(),
                quantity: dec!(2),
                unit: Some("day".to_string()),
                unit_price: dec!(100.00),
                tax_rate: dec!(20),
            }],
            occurred_at: test_time(),
        }
    }

    /// Build a sent invoice at 240.00 TTC (2 × 100.00 @ 20%).
    fn sent_invoice(account_id: AccountId, invoice_id: InvoiceId) -> Invoice {
        let mut invoice = Invoice::empty(invoice_id);
        let events = invoice
            .handle(&InvoiceCommand::CreateInvoice(create_cmd(
                account_id, invoice_id,
            )))
            .unwrap();
        invoice.apply(&events[0]);
        let events = invoice
            .handle(&InvoiceCommand::SendInvoice(SendInvoice {
                account_id,
                invoice_id,
                occurred_at: test_time(),
            }))
            .unwrap();
        invoice.apply(&events[0]);
        invoice
    }

    fn pay_cmd(account_id: AccountId, invoice_id: InvoiceId, amount: Decimal) -> RecordPayment {
        RecordPayment {
            account_id,
            invoice_id,
            amount,
            method: PaymentMethod::BankTransfer,
            reference: Some("VIR-1".to_string()),
            paid_on: date(2026, 6, 15),
            notes: None,
            occurred_at: test_time(),
        }
    }

    #[test]
    fn create_computes_totals_and_amount_due() {
        let account_id = test_account_id();
        let invoice_id = test_invoice_id();
        let mut invoice = Invoice::empty(invoice_id);

        let events = invoice
            .handle(&InvoiceCommand::CreateInvoice(create_cmd(
                account_id, invoice_id,
            )))
            .unwrap();
        invoice.apply(&events[0]);

        assert_eq!(invoice.status(), InvoiceStatus::Draft);
        assert_eq!(invoice.totals().total_ht, dec!(200.00));
        assert_eq!(invoice.totals().total_tax, dec!(40.00));
        assert_eq!(invoice.totals().total_ttc, dec!(240.00));
        assert_eq!(invoice.amount_due(), dec!(240.00));
        assert_eq!(invoice.amount_paid(), dec!(0));
    }

    #[test]
    fn create_rejects_due_date_before_issue_date() {
        let invoice = Invoice::empty(test_invoice_id());
        let mut cmd = create_cmd(test_account_id(), test_invoice_id());
        cmd.due_date = date(2026, 5, 1);

        let err = invoice
            .handle(&InvoiceCommand::CreateInvoice(cmd))
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn partial_payment_then_full_payment() {
        let account_id = test_account_id();
        let invoice_id = test_invoice_id();
        let mut invoice = sent_invoice(account_id, invoice_id);

        let events = invoice
            .handle(&InvoiceCommand::RecordPayment(pay_cmd(
                account_id,
                invoice_id,
                dec!(100.00),
            )))
            .unwrap();
        invoice.apply(&events[0]);
        assert_eq!(invoice.amount_paid(), dec!(100.00));
        assert_eq!(invoice.amount_due(), dec!(140.00));
        assert_eq!(invoice.status(), InvoiceStatus::PartiallyPaid);

        let events = invoice
            .handle(&InvoiceCommand::RecordPayment(pay_cmd(
                account_id,
                invoice_id,
                dec!(140.00),
            )))
            .unwrap();
        invoice.apply(&events[0]);
        assert_eq!(invoice.amount_due(), dec!(0.00));
        assert_eq!(invoice.status(), InvoiceStatus::Paid);
        assert_eq!(invoice.payments().len(), 2);

        // Any further positive payment is an overpayment.
        let err = invoice
            .handle(&InvoiceCommand::RecordPayment(pay_cmd(
                account_id,
                invoice_id,
                dec!(0.01),
            )))
            .unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
    }

    #[test]
    fn overpayment_is_rejected_and_leaves_state_unchanged() {
        let account_id = test_account_id();
        let invoice_id = test_invoice_id();
        let invoice = sent_invoice(account_id, invoice_id);

        let err = invoice
            .handle(&InvoiceCommand::RecordPayment(pay_cmd(
                account_id,
                invoice_id,
                dec!(240.01),
            )))
            .unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
        assert_eq!(invoice.amount_due(), dec!(240.00));
        assert_eq!(invoice.payments().len(), 0);
    }

    #[test]
    fn zero_or_negative_payment_is_rejected() {
        let account_id = test_account_id();
        let invoice_id = test_invoice_id();
        let invoice = sent_invoice(account_id, invoice_id);

        for amount in [dec!(0), dec!(-5)] {
            let err = invoice
                .handle(&InvoiceCommand::RecordPayment(pay_cmd(
                    account_id, invoice_id, amount,
                )))
                .unwrap_err();
            assert!(matches!(err, DomainError::Validation(_)));
        }
    }

    #[test]
    fn draft_invoice_rejects_payment() {
        let account_id = test_account_id();
        let invoice_id = test_invoice_id();
        let mut invoice = Invoice::empty(invoice_id);
        let events = invoice
            .handle(&InvoiceCommand::CreateInvoice(create_cmd(
                account_id, invoice_id,
            )))
            .unwrap();
        invoice.apply(&events[0]);

        let err = invoice
            .handle(&InvoiceCommand::RecordPayment(pay_cmd(
                account_id,
                invoice_id,
                dec!(10),
            )))
            .unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
    }

    #[test]
    fn credited_invoice_rejects_payment_and_cancellation() {
        let account_id = test_account_id();
        let invoice_id = test_invoice_id();
        let mut invoice = sent_invoice(account_id, invoice_id);

        let events = invoice
            .handle(&InvoiceCommand::ConvertToCreditNote(ConvertToCreditNote {
                account_id,
                invoice_id,
                occurred_at: test_time(),
            }))
            .unwrap();
        invoice.apply(&events[0]);
        assert_eq!(invoice.status(), InvoiceStatus::Credited);

        let err = invoice
            .handle(&InvoiceCommand::RecordPayment(pay_cmd(
                account_id,
                invoice_id,
                dec!(10),
            )))
            .unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));

        let err = invoice
            .handle(&InvoiceCommand::CancelInvoice(CancelInvoice {
                account_id,
                invoice_id,
                reason: None,
                occurred_at: test_time(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));

        // Credit-note conversion is one-way.
        let err = invoice
            .handle(&InvoiceCommand::ConvertToCreditNote(ConvertToCreditNote {
                account_id,
                invoice_id,
                occurred_at: test_time(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
    }

    #[test]
    fn cancelled_invoice_rejects_payment() {
        let account_id = test_account_id();
        let invoice_id = test_invoice_id();
        let mut invoice = sent_invoice(account_id, invoice_id);

        let events = invoice
            .handle(&InvoiceCommand::CancelInvoice(CancelInvoice {
                account_id,
                invoice_id,
                reason: Some("duplicate".to_string()),
                occurred_at: test_time(),
            }))
            .unwrap();
        invoice.apply(&events[0]);

        let err = invoice
            .handle(&InvoiceCommand::RecordPayment(pay_cmd(
                account_id,
                invoice_id,
                dec!(10),
            )))
            .unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
    }

    #[test]
    fn paid_invoice_cannot_be_cancelled_but_can_be_credited() {
        let account_id = test_account_id();
        let invoice_id = test_invoice_id();
        let mut invoice = sent_invoice(account_id, invoice_id);

        let events = invoice
            .handle(&InvoiceCommand::RecordPayment(pay_cmd(
                account_id,
                invoice_id,
                dec!(240.00),
            )))
            .unwrap();
        invoice.apply(&events[0]);
        assert_eq!(invoice.status(), InvoiceStatus::Paid);

        let err = invoice
            .handle(&InvoiceCommand::CancelInvoice(CancelInvoice {
                account_id,
                invoice_id,
                reason: None,
                occurred_at: test_time(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));

        let events = invoice
            .handle(&InvoiceCommand::ConvertToCreditNote(ConvertToCreditNote {
                account_id,
                invoice_id,
                occurred_at: test_time(),
            }))
            .unwrap();
        invoice.apply(&events[0]);
        assert_eq!(invoice.status(), InvoiceStatus::Credited);
    }

    #[test]
    fn draft_invoice_cannot_become_a_credit_note() {
        let account_id = test_account_id();
        let invoice_id = test_invoice_id();
        let mut invoice = Invoice::empty(invoice_id);
        let events = invoice
            .handle(&InvoiceCommand::CreateInvoice(create_cmd(
                account_id, invoice_id,
            )))
            .unwrap();
        invoice.apply(&events[0]);

        let err = invoice
            .handle(&InvoiceCommand::ConvertToCreditNote(ConvertToCreditNote {
                account_id,
                invoice_id,
                occurred_at: test_time(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
    }

    #[test]
    fn overdue_invoice_still_accepts_payments() {
        let account_id = test_account_id();
        let invoice_id = test_invoice_id();
        let mut invoice = sent_invoice(account_id, invoice_id);

        let events = invoice
            .handle(&InvoiceCommand::MarkOverdue(MarkOverdue {
                account_id,
                invoice_id,
                as_of: date(2026, 7, 2),
                occurred_at: test_time(),
            }))
            .unwrap();
        invoice.apply(&events[0]);
        assert_eq!(invoice.status(), InvoiceStatus::Overdue);

        let events = invoice
            .handle(&InvoiceCommand::RecordPayment(pay_cmd(
                account_id,
                invoice_id,
                dec!(240.00),
            )))
            .unwrap();
        invoice.apply(&events[0]);
        assert_eq!(invoice.status(), InvoiceStatus::Paid);
    }

    #[test]
    fn mark_overdue_requires_past_due_date() {
        let account_id = test_account_id();
        let invoice_id = test_invoice_id();
        let invoice = sent_invoice(account_id, invoice_id);

        let err = invoice
            .handle(&InvoiceCommand::MarkOverdue(MarkOverdue {
                account_id,
                invoice_id,
                as_of: date(2026, 7, 1),
                occurred_at: test_time(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
    }

    #[test]
    fn reminders_advance_one_tier_at_a_time() {
        let account_id = test_account_id();
        let invoice_id = test_invoice_id();
        let mut invoice = sent_invoice(account_id, invoice_id);

        let events = invoice
            .handle(&InvoiceCommand::RecordReminder(RecordReminder {
                account_id,
                invoice_id,
                tier: ReminderTier::First,
                sent_on: date(2026, 7, 2),
                occurred_at: test_time(),
            }))
            .unwrap();
        invoice.apply(&events[0]);
        assert_eq!(invoice.reminder_count(), 1);
        assert_eq!(invoice.last_reminder_at(), Some(date(2026, 7, 2)));
        assert_eq!(invoice.status(), InvoiceStatus::Overdue);

        // Skipping a tier is rejected.
        let err = invoice
            .handle(&InvoiceCommand::RecordReminder(RecordReminder {
                account_id,
                invoice_id,
                tier: ReminderTier::Third,
                sent_on: date(2026, 7, 10),
                occurred_at: test_time(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
    }

    #[test]
    fn amount_due_always_matches_total_minus_payments() {
        let account_id = test_account_id();
        let invoice_id = test_invoice_id();
        let mut invoice = sent_invoice(account_id, invoice_id);

        for amount in [dec!(40.00), dec!(60.00), dec!(140.00)] {
            let events = invoice
                .handle(&InvoiceCommand::RecordPayment(pay_cmd(
                    account_id, invoice_id, amount,
                )))
                .unwrap();
            invoice.apply(&events[0]);

            let paid_sum: Decimal = invoice.payments().iter().map(|p| p.amount).sum();
            assert_eq!(invoice.amount_paid(), paid_sum);
            assert_eq!(invoice.amount_due(), invoice.totals().total_ttc - paid_sum);
            assert!(invoice.amount_due() >= Decimal::ZERO);
        }
    }

    #[test]
    fn handle_does_not_mutate_state() {
        let account_id = test_account_id();
        let invoice_id = test_invoice_id();
        let invoice = sent_invoice(account_id, invoice_id);
        let version_before = invoice.version();

        let events1 = invoice
            .handle(&InvoiceCommand::RecordPayment(pay_cmd(
                account_id,
                invoice_id,
                dec!(50),
            )))
            .unwrap();
        let events2 = invoice
            .handle(&InvoiceCommand::RecordPayment(pay_cmd(
                account_id,
                invoice_id,
                dec!(50),
            )))
            .unwrap();

        assert_eq!(invoice.version(), version_before);
        assert_eq!(invoice.payments().len(), 0);
        assert_eq!(events1, events2);
    }
}
