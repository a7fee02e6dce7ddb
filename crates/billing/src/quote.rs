use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use facturier_core::{AccountId, Aggregate, AggregateId, AggregateRoot, DomainError, round_money};
use facturier_events::Event;

use crate::invoice::InvoiceId;
use crate::totals::{DocumentLine, DocumentTotals, LineInput, compute_document};

/// Quote identifier (account-scoped via `account_id` fields in events/commands).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QuoteId(pub AggregateId);

impl QuoteId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for QuoteId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Quote status lifecycle.
///
/// `Converted` is terminal and reachable only from `Accepted`; deletion is
/// legal only while the quote is still a draft.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuoteStatus {
    Draft,
    Sent,
    Viewed,
    Accepted,
    Refused,
    Expired,
    Converted,
}

impl QuoteStatus {
    /// Statuses in which the recipient can still respond.
    pub fn is_open(&self) -> bool {
        matches!(self, QuoteStatus::Sent | QuoteStatus::Viewed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            QuoteStatus::Draft => "draft",
            QuoteStatus::Sent => "sent",
            QuoteStatus::Viewed => "viewed",
            QuoteStatus::Accepted => "accepted",
            QuoteStatus::Refused => "refused",
            QuoteStatus::Expired => "expired",
            QuoteStatus::Converted => "converted",
        }
    }
}

/// Deposit requirement attached to a quote (acompte).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepositRequirement {
    /// Percentage of the TTC total.
    pub percent: Decimal,
    /// Computed amount, rounded to two decimals.
    pub amount: Decimal,
}

/// Aggregate root: Quote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Quote {
    id: QuoteId,
    account_id: Option<AccountId>,
    client_id: Option<AggregateId>,
    number: String,
    issue_date: NaiveDate,
    validity_date: NaiveDate,
    status: QuoteStatus,
    lines: Vec<DocumentLine>,
    totals: DocumentTotals,
    deposit: Option<DepositRequirement>,
    /// Captured when the quote is sent; required to accept.
    recipient_email: Option<String>,
    /// Set once the quote has been converted into an invoice.
    invoice_id: Option<InvoiceId>,
    deleted: bool,
    version: u64,
    created: bool,
}

impl Quote {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: QuoteId) -> Self {
        Self {
            id,
            account_id: None,
            client_id: None,
            number: String::new(),
            issue_date: NaiveDate::MIN,
            validity_date: NaiveDate::MIN,
            status: QuoteStatus::Draft,
            lines: Vec::new(),
            totals: DocumentTotals::zero(),
            deposit: None,
            recipient_email: None,
            invoice_id: None,
            deleted: false,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> QuoteId {
        self.id
    }

    pub fn account_id(&self) -> Option<AccountId> {
        self.account_id
    }

    pub fn client_id(&self) -> Option<AggregateId> {
        self.client_id
    }

    pub fn number(&self) -> &str {
        &self.number
    }

    pub fn issue_date(&self) -> NaiveDate {
        self.issue_date
    }

    pub fn validity_date(&self) -> NaiveDate {
        self.validity_date
    }

    pub fn status(&self) -> QuoteStatus {
        self.status
    }

    pub fn lines(&self) -> &[DocumentLine] {
        &self.lines
    }

    pub fn totals(&self) -> &DocumentTotals {
        &self.totals
    }

    pub fn deposit(&self) -> Option<&DepositRequirement> {
        self.deposit.as_ref()
    }

    pub fn recipient_email(&self) -> Option<&str> {
        self.recipient_email.as_deref()
    }

    pub fn invoice_id(&self) -> Option<InvoiceId> {
        self.invoice_id
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted
    }

    /// Conversion is allowed exactly once, from an accepted quote.
    pub fn can_convert(&self) -> bool {
        self.status == QuoteStatus::Accepted && self.invoice_id.is_none()
    }
}

impl AggregateRoot for Quote {
    type Id = QuoteId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: CreateQuote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateQuote {
    pub account_id: AccountId,
    pub quote_id: QuoteId,
    pub client_id: AggregateId,
    pub number: String,
    pub issue_date: NaiveDate,
    pub validity_date: NaiveDate,
    pub lines: Vec<LineInput>,
    /// Optional deposit requirement, in percent of the TTC total.
    pub deposit_percent: Option<Decimal>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: SendQuote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendQuote {
    pub account_id: AccountId,
    pub quote_id: QuoteId,
    pub recipient_email: String,
    pub occurred_at: DateTime<Utc>,
}

/// Command: MarkQuoteViewed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkQuoteViewed {
    pub account_id: AccountId,
    pub quote_id: QuoteId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: AcceptQuote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcceptQuote {
    pub account_id: AccountId,
    pub quote_id: QuoteId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RefuseQuote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefuseQuote {
    pub account_id: AccountId,
    pub quote_id: QuoteId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ExpireQuote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpireQuote {
    pub account_id: AccountId,
    pub quote_id: QuoteId,
    /// The date against which the validity date is evaluated.
    pub as_of: NaiveDate,
    pub occurred_at: DateTime<Utc>,
}

/// Command: MarkQuoteConverted (issued by the quote→invoice converter only).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkQuoteConverted {
    pub account_id: AccountId,
    pub quote_id: QuoteId,
    pub invoice_id: InvoiceId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RevertQuoteConversion (compensation when invoice creation fails).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevertQuoteConversion {
    pub account_id: AccountId,
    pub quote_id: QuoteId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: DeleteQuote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteQuote {
    pub account_id: AccountId,
    pub quote_id: QuoteId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum QuoteCommand {
    CreateQuote(CreateQuote),
    SendQuote(SendQuote),
    MarkQuoteViewed(MarkQuoteViewed),
    AcceptQuote(AcceptQuote),
    RefuseQuote(RefuseQuote),
    ExpireQuote(ExpireQuote),
    MarkQuoteConverted(MarkQuoteConverted),
    RevertQuoteConversion(RevertQuoteConversion),
    DeleteQuote(DeleteQuote),
}

/// Event: QuoteCreated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuoteCreated {
    pub account_id: AccountId,
    pub quote_id: QuoteId,
    pub client_id: AggregateId,
    pub number: String,
    pub issue_date: NaiveDate,
    pub validity_date: NaiveDate,
    pub lines: Vec<DocumentLine>,
    pub totals: DocumentTotals,
    pub deposit: Option<DepositRequirement>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: QuoteSent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuoteSent {
    pub account_id: AccountId,
    pub quote_id: QuoteId,
    pub recipient_email: String,
    pub occurred_at: DateTime<Utc>,
}

/// Event: QuoteViewed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuoteViewed {
    pub account_id: AccountId,
    pub quote_id: QuoteId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: QuoteAccepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuoteAccepted {
    pub account_id: AccountId,
    pub quote_id: QuoteId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: QuoteRefused.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuoteRefused {
    pub account_id: AccountId,
    pub quote_id: QuoteId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: QuoteExpired.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuoteExpired {
    pub account_id: AccountId,
    pub quote_id: QuoteId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: QuoteConverted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuoteConverted {
    pub account_id: AccountId,
    pub quote_id: QuoteId,
    pub invoice_id: InvoiceId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: QuoteConversionReverted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuoteConversionReverted {
    pub account_id: AccountId,
    pub quote_id: QuoteId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: QuoteDeleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuoteDeleted {
    pub account_id: AccountId,
    pub quote_id: QuoteId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum QuoteEvent {
    QuoteCreated(QuoteCreated),
    QuoteSent(QuoteSent),
    QuoteViewed(QuoteViewed),
    QuoteAccepted(QuoteAccepted),
    QuoteRefused(QuoteRefused),
    QuoteExpired(QuoteExpired),
    QuoteConverted(QuoteConverted),
    QuoteConversionReverted(QuoteConversionReverted),
    QuoteDeleted(QuoteDeleted),
}

impl Event for QuoteEvent {
    fn event_type(&self) -> &'static str {
        match self {
            QuoteEvent::QuoteCreated(_) => "billing.quote.created",
            QuoteEvent::QuoteSent(_) => "billing.quote.sent",
            QuoteEvent::QuoteViewed(_) => "billing.quote.viewed",
            QuoteEvent::QuoteAccepted(_) => "billing.quote.accepted",
            QuoteEvent::QuoteRefused(_) => "billing.quote.refused",
            QuoteEvent::QuoteExpired(_) => "billing.quote.expired",
            QuoteEvent::QuoteConverted(_) => "billing.quote.converted",
            QuoteEvent::QuoteConversionReverted(_) => "billing.quote.conversion_reverted",
            QuoteEvent::QuoteDeleted(_) => "billing.quote.deleted",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            QuoteEvent::QuoteCreated(e) => e.occurred_at,
            QuoteEvent::QuoteSent(e) => e.occurred_at,
            QuoteEvent::QuoteViewed(e) => e.occurred_at,
            QuoteEvent::QuoteAccepted(e) => e.occurred_at,
            QuoteEvent::QuoteRefused(e) => e.occurred_at,
            QuoteEvent::QuoteExpired(e) => e.occurred_at,
            QuoteEvent::QuoteConverted(e) => e.occurred_at,
            QuoteEvent::QuoteConversionReverted(e) => e.occurred_at,
            QuoteEvent::QuoteDeleted(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Quote {
    type Command = QuoteCommand;
    type Event = QuoteEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            QuoteEvent::QuoteCreated(e) => {
                self.id = e.quote_id;
                self.account_id = Some(e.account_id);
                self.client_id = Some(e.client_id);
                self.number = e.number.clone();
                self.issue_date = e.issue_date;
                self.validity_date = e.validity_date;
                self.lines = e.lines.clone();
                self.totals = e.totals;
                self.deposit = e.deposit;
                self.status = QuoteStatus::Draft;
                self.created = true;
            }
            QuoteEvent::QuoteSent(e) => {
                self.status = QuoteStatus::Sent;
                self.recipient_email = Some(e.recipient_email.clone());
            }
            QuoteEvent::QuoteViewed(_) => {
                self.status = QuoteStatus::Viewed;
            }
            QuoteEvent::QuoteAccepted(_) => {
                self.status = QuoteStatus::Accepted;
            }
            QuoteEvent::QuoteRefused(_) => {
                self.status = QuoteStatus::Refused;
            }
            QuoteEvent::QuoteExpired(_) => {
                self.status = QuoteStatus::Expired;
            }
            QuoteEvent::QuoteConverted(e) => {
                self.status = QuoteStatus::Converted;
                self.invoice_id = Some(e.invoice_id);
            }
            QuoteEvent::QuoteConversionReverted(_) => {
                self.status = QuoteStatus::Accepted;
                self.invoice_id = None;
            }
            QuoteEvent::QuoteDeleted(_) => {
                self.deleted = true;
            }
        }

        // Deterministic version tracking: +1 per applied event.
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            QuoteCommand::CreateQuote(cmd) => self.handle_create(cmd),
            QuoteCommand::SendQuote(cmd) => self.handle_send(cmd),
            QuoteCommand::MarkQuoteViewed(cmd) => self.handle_viewed(cmd),
            QuoteCommand::AcceptQuote(cmd) => self.handle_accept(cmd),
            QuoteCommand::RefuseQuote(cmd) => self.handle_refuse(cmd),
            QuoteCommand::ExpireQuote(cmd) => self.handle_expire(cmd),
            QuoteCommand::MarkQuoteConverted(cmd) => self.handle_mark_converted(cmd),
            QuoteCommand::RevertQuoteConversion(cmd) => self.handle_revert_conversion(cmd),
            QuoteCommand::DeleteQuote(cmd) => self.handle_delete(cmd),
        }
    }
}

impl Quote {
    fn ensure_account(&self, account_id: AccountId) -> Result<(), DomainError> {
        if !self.created {
            return Ok(());
        }
        if self.account_id != Some(account_id) {
            return Err(DomainError::invariant("account mismatch"));
        }
        Ok(())
    }

    fn ensure_quote_id(&self, quote_id: QuoteId) -> Result<(), DomainError> {
        if self.id != quote_id {
            return Err(DomainError::invariant("quote_id mismatch"));
        }
        Ok(())
    }

    fn ensure_live(&self) -> Result<(), DomainError> {
        if !self.created || self.deleted {
            return Err(DomainError::not_found());
        }
        Ok(())
    }

    fn handle_create(&self, cmd: &CreateQuote) -> Result<Vec<QuoteEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("quote already exists"));
        }

        if cmd.number.trim().is_empty() {
            return Err(DomainError::validation("quote number must not be empty"));
        }
        if cmd.validity_date < cmd.issue_date {
            return Err(DomainError::validation(
                "validity_date must not precede issue_date",
            ));
        }

        let (lines, totals) = compute_document(&cmd.lines)?;

        let deposit = match cmd.deposit_percent {
            None => None,
            Some(percent) => {
                if percent <= Decimal::ZERO || percent > Decimal::ONE_HUNDRED {
                    return Err(DomainError::validation(
                        "deposit percent must be within (0, 100]",
                    ));
                }
                Some(DepositRequirement {
                    percent,
                    amount: round_money(totals.total_ttc * percent / Decimal::ONE_HUNDRED),
                })
            }
        };

        Ok(vec![QuoteEvent::QuoteCreated(QuoteCreated {
            account_id: cmd.account_id,
            quote_id: cmd.quote_id,
            client_id: cmd.client_id,
            number: cmd.number.clone(),
            issue_date: cmd.issue_date,
            validity_date: cmd.validity_date,
            lines,
            totals,
            deposit,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_send(&self, cmd: &SendQuote) -> Result<Vec<QuoteEvent>, DomainError> {
        self.ensure_live()?;
        self.ensure_account(cmd.account_id)?;
        self.ensure_quote_id(cmd.quote_id)?;

        if self.status != QuoteStatus::Draft {
            return Err(DomainError::invariant("only draft quotes can be sent"));
        }
        if !cmd.recipient_email.contains('@') {
            return Err(DomainError::validation("recipient email is not valid"));
        }

        Ok(vec![QuoteEvent::QuoteSent(QuoteSent {
            account_id: cmd.account_id,
            quote_id: cmd.quote_id,
            recipient_email: cmd.recipient_email.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_viewed(&self, cmd: &MarkQuoteViewed) -> Result<Vec<QuoteEvent>, DomainError> {
        self.ensure_live()?;
        self.ensure_account(cmd.account_id)?;
        self.ensure_quote_id(cmd.quote_id)?;

        if self.status != QuoteStatus::Sent {
            return Err(DomainError::invariant(
                "only sent quotes can be marked viewed",
            ));
        }

        Ok(vec![QuoteEvent::QuoteViewed(QuoteViewed {
            account_id: cmd.account_id,
            quote_id: cmd.quote_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_accept(&self, cmd: &AcceptQuote) -> Result<Vec<QuoteEvent>, DomainError> {
        self.ensure_live()?;
        self.ensure_account(cmd.account_id)?;
        self.ensure_quote_id(cmd.quote_id)?;

        if !self.status.is_open() {
            return Err(DomainError::invariant(
                "only sent or viewed quotes can be accepted",
            ));
        }
        // Acceptance implies the recipient could be reached.
        if !self
            .recipient_email
            .as_deref()
            .is_some_and(|e| e.contains('@'))
        {
            return Err(DomainError::invariant(
                "cannot accept a quote without a valid recipient email",
            ));
        }

        Ok(vec![QuoteEvent::QuoteAccepted(QuoteAccepted {
            account_id: cmd.account_id,
            quote_id: cmd.quote_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_refuse(&self, cmd: &RefuseQuote) -> Result<Vec<QuoteEvent>, DomainError> {
        self.ensure_live()?;
        self.ensure_account(cmd.account_id)?;
        self.ensure_quote_id(cmd.quote_id)?;

        if !self.status.is_open() {
            return Err(DomainError::invariant(
                "only sent or viewed quotes can be refused",
            ));
        }

        Ok(vec![QuoteEvent::QuoteRefused(QuoteRefused {
            account_id: cmd.account_id,
            quote_id: cmd.quote_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_expire(&self, cmd: &ExpireQuote) -> Result<Vec<QuoteEvent>, DomainError> {
        self.ensure_live()?;
        self.ensure_account(cmd.account_id)?;
        self.ensure_quote_id(cmd.quote_id)?;

        if !self.status.is_open() {
            return Err(DomainError::invariant(
                "only sent or viewed quotes can expire",
            ));
        }
        if self.validity_date >= cmd.as_of {
            return Err(DomainError::invariant("quote validity has not passed"));
        }

        Ok(vec![QuoteEvent::QuoteExpired(QuoteExpired {
            account_id: cmd.account_id,
            quote_id: cmd.quote_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_mark_converted(
        &self,
        cmd: &MarkQuoteConverted,
    ) -> Result<Vec<QuoteEvent>, DomainError> {
        self.ensure_live()?;
        self.ensure_account(cmd.account_id)?;
        self.ensure_quote_id(cmd.quote_id)?;

        if self.status == QuoteStatus::Converted || self.invoice_id.is_some() {
            return Err(DomainError::conflict("quote has already been converted"));
        }
        if self.status != QuoteStatus::Accepted {
            return Err(DomainError::invariant(
                "only accepted quotes can be converted to an invoice",
            ));
        }

        Ok(vec![QuoteEvent::QuoteConverted(QuoteConverted {
            account_id: cmd.account_id,
            quote_id: cmd.quote_id,
            invoice_id: cmd.invoice_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_revert_conversion(
        &self,
        cmd: &RevertQuoteConversion,
    ) -> Result<Vec<QuoteEvent>, DomainError> {
        self.ensure_live()?;
        self.ensure_account(cmd.account_id)?;
        self.ensure_quote_id(cmd.quote_id)?;

        if self.status != QuoteStatus::Converted {
            return Err(DomainError::invariant(
                "only converted quotes can have their conversion reverted",
            ));
        }

        Ok(vec![QuoteEvent::QuoteConversionReverted(
            QuoteConversionReverted {
                account_id: cmd.account_id,
                quote_id: cmd.quote_id,
                occurred_at: cmd.occurred_at,
            },
        )])
    }

    fn handle_delete(&self, cmd: &DeleteQuote) -> Result<Vec<QuoteEvent>, DomainError> {
        self.ensure_live()?;
        self.ensure_account(cmd.account_id)?;
        self.ensure_quote_id(cmd.quote_id)?;

        if self.status != QuoteStatus::Draft {
            return Err(DomainError::invariant("only draft quotes can be deleted"));
        }

        Ok(vec![QuoteEvent::QuoteDeleted(QuoteDeleted {
            account_id: cmd.account_id,
            quote_id: cmd.quote_id,
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

    fn test_quote_id() -> QuoteId {
        QuoteId::new(AggregateId::new())
    }

    fn test_invoice_id() -> InvoiceId {
        InvoiceId::new(AggregateId::new())
    }

    fn test_time() -> DateTime<Utc> {
        Utc::now()
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn create_cmd(account_id: AccountId, quote_id: QuoteId) -> CreateQuote {
        CreateQuote {
            account_id,
            quote_id,
            client_id: AggregateId::new(),
            number: "DEV-2026-0001".to_string(),
            issue_date: date(2026, 6, 1),
            validity_date: date(2026, 7, 1),
            lines: vec![LineInput {
                description: "Audit technique".to_string(),
                quantity: dec!(2),
                unit: Some("day".to_string()),
                unit_price: dec!(100.00),
                tax_rate: dec!(20),
            }],
            deposit_percent: Some(dec!(30)),
            occurred_at: test_time(),
        }
    }

    fn sent_quote(account_id: AccountId, quote_id: QuoteId) -> Quote {
        let mut quote = Quote::empty(quote_id);
        let events = quote
            .handle(&QuoteCommand::CreateQuote(create_cmd(account_id, quote_id)))
            .unwrap();
        quote.apply(&events[0]);
        let events = quote
            .handle(&QuoteCommand::SendQuote(SendQuote {
                account_id,
                quote_id,
                recipient_email: "client@example.org".to_string(),
                occurred_at: test_time(),
            }))
            .unwrap();
        quote.apply(&events[0]);
        quote
    }

    fn accepted_quote(account_id: AccountId, quote_id: QuoteId) -> Quote {
        let mut quote = sent_quote(account_id, quote_id);
        let events = quote
            .handle(&QuoteCommand::AcceptQuote(AcceptQuote {
                account_id,
                quote_id,
                occurred_at: test_time(),
            }))
            .unwrap();
        quote.apply(&events[0]);
        quote
    }

    #[test]
    fn create_computes_totals_and_deposit() {
        let account_id = test_account_id();
        let quote_id = test_quote_id();
        let mut quote = Quote::empty(quote_id);

        let events = quote
            .handle(&QuoteCommand::CreateQuote(create_cmd(account_id, quote_id)))
            .unwrap();
        quote.apply(&events[0]);

        assert_eq!(quote.status(), QuoteStatus::Draft);
        assert_eq!(quote.totals().total_ttc, dec!(240.00));
        let deposit = quote.deposit().unwrap();
        assert_eq!(deposit.percent, dec!(30));
        assert_eq!(deposit.amount, dec!(72.00));
    }

    #[test]
    fn deposit_percent_out_of_range_is_rejected() {
        let quote = Quote::empty(test_quote_id());
        for percent in [dec!(0), dec!(-10), dec!(101)] {
            let mut cmd = create_cmd(test_account_id(), test_quote_id());
            cmd.deposit_percent = Some(percent);
            let err = quote.handle(&QuoteCommand::CreateQuote(cmd)).unwrap_err();
            assert!(matches!(err, DomainError::Validation(_)));
        }
    }

    #[test]
    fn full_lifecycle_to_conversion() {
        let account_id = test_account_id();
        let quote_id = test_quote_id();
        let invoice_id = test_invoice_id();
        let mut quote = accepted_quote(account_id, quote_id);
        assert!(quote.can_convert());

        let events = quote
            .handle(&QuoteCommand::MarkQuoteConverted(MarkQuoteConverted {
                account_id,
                quote_id,
                invoice_id,
                occurred_at: test_time(),
            }))
            .unwrap();
        quote.apply(&events[0]);

        assert_eq!(quote.status(), QuoteStatus::Converted);
        assert_eq!(quote.invoice_id(), Some(invoice_id));
        assert!(!quote.can_convert());
    }

    #[test]
    fn conversion_happens_at_most_once() {
        let account_id = test_account_id();
        let quote_id = test_quote_id();
        let mut quote = accepted_quote(account_id, quote_id);

        let convert = |invoice_id| {
            QuoteCommand::MarkQuoteConverted(MarkQuoteConverted {
                account_id,
                quote_id,
                invoice_id,
                occurred_at: test_time(),
            })
        };

        let events = quote.handle(&convert(test_invoice_id())).unwrap();
        quote.apply(&events[0]);

        let err = quote.handle(&convert(test_invoice_id())).unwrap_err();
        assert!(matches!(err, DomainError::Conflict(_)));
    }

    #[test]
    fn only_accepted_quotes_convert() {
        let account_id = test_account_id();
        let quote_id = test_quote_id();
        let quote = sent_quote(account_id, quote_id);

        let err = quote
            .handle(&QuoteCommand::MarkQuoteConverted(MarkQuoteConverted {
                account_id,
                quote_id,
                invoice_id: test_invoice_id(),
                occurred_at: test_time(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
    }

    #[test]
    fn revert_restores_accepted_state() {
        let account_id = test_account_id();
        let quote_id = test_quote_id();
        let mut quote = accepted_quote(account_id, quote_id);

        let events = quote
            .handle(&QuoteCommand::MarkQuoteConverted(MarkQuoteConverted {
                account_id,
                quote_id,
                invoice_id: test_invoice_id(),
                occurred_at: test_time(),
            }))
            .unwrap();
        quote.apply(&events[0]);

        let events = quote
            .handle(&QuoteCommand::RevertQuoteConversion(RevertQuoteConversion {
                account_id,
                quote_id,
                occurred_at: test_time(),
            }))
            .unwrap();
        quote.apply(&events[0]);

        assert_eq!(quote.status(), QuoteStatus::Accepted);
        assert_eq!(quote.invoice_id(), None);
        assert!(quote.can_convert());
    }

    #[test]
    fn send_requires_valid_email() {
        let account_id = test_account_id();
        let quote_id = test_quote_id();
        let mut quote = Quote::empty(quote_id);
        let events = quote
            .handle(&QuoteCommand::CreateQuote(create_cmd(account_id, quote_id)))
            .unwrap();
        quote.apply(&events[0]);

        let err = quote
            .handle(&QuoteCommand::SendQuote(SendQuote {
                account_id,
                quote_id,
                recipient_email: "no-at-sign".to_string(),
                occurred_at: test_time(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn draft_quote_cannot_be_accepted() {
        let account_id = test_account_id();
        let quote_id = test_quote_id();
        let mut quote = Quote::empty(quote_id);
        let events = quote
            .handle(&QuoteCommand::CreateQuote(create_cmd(account_id, quote_id)))
            .unwrap();
        quote.apply(&events[0]);

        let err = quote
            .handle(&QuoteCommand::AcceptQuote(AcceptQuote {
                account_id,
                quote_id,
                occurred_at: test_time(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
    }

    #[test]
    fn expire_requires_past_validity_date() {
        let account_id = test_account_id();
        let quote_id = test_quote_id();
        let mut quote = sent_quote(account_id, quote_id);

        let err = quote
            .handle(&QuoteCommand::ExpireQuote(ExpireQuote {
                account_id,
                quote_id,
                as_of: date(2026, 7, 1),
                occurred_at: test_time(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));

        let events = quote
            .handle(&QuoteCommand::ExpireQuote(ExpireQuote {
                account_id,
                quote_id,
                as_of: date(2026, 7, 2),
                occurred_at: test_time(),
            }))
            .unwrap();
        quote.apply(&events[0]);
        assert_eq!(quote.status(), QuoteStatus::Expired);
    }

    #[test]
    fn delete_only_from_draft() {
        let account_id = test_account_id();
        let quote_id = test_quote_id();
        let sent = sent_quote(account_id, quote_id);

        let err = sent
            .handle(&QuoteCommand::DeleteQuote(DeleteQuote {
                account_id,
                quote_id,
                occurred_at: test_time(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));

        let mut draft = Quote::empty(quote_id);
        let events = draft
            .handle(&QuoteCommand::CreateQuote(create_cmd(account_id, quote_id)))
            .unwrap();
        draft.apply(&events[0]);

        let events = draft
            .handle(&QuoteCommand::DeleteQuote(DeleteQuote {
                account_id,
                quote_id,
                occurred_at: test_time(),
            }))
            .unwrap();
        draft.apply(&events[0]);
        assert!(draft.is_deleted());

        // A deleted quote behaves as not found.
        let err = draft
            .handle(&QuoteCommand::SendQuote(SendQuote {
                account_id,
                quote_id,
                recipient_email: "client@example.org".to_string(),
                occurred_at: test_time(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::NotFound));
    }

    #[test]
    fn refused_quote_cannot_be_accepted() {
        let account_id = test_account_id();
        let quote_id = test_quote_id();
        let mut quote = sent_quote(account_id, quote_id);

        let events = quote
            .handle(&QuoteCommand::RefuseQuote(RefuseQuote {
                account_id,
                quote_id,
                occurred_at: test_time(),
            }))
            .unwrap();
        quote.apply(&events[0]);
        assert_eq!(quote.status(), QuoteStatus::Refused);

        let err = quote
            .handle(&QuoteCommand::AcceptQuote(AcceptQuote {
                account_id,
                quote_id,
                occurred_at: test_time(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
    }
}
