//! `facturier-billing` — quotes, invoices, payments and dunning rules.
//!
//! This crate holds the billing engine's write model: the document totals
//! calculator, the Quote and Invoice aggregates with their status machines,
//! payment records, reminder-tier rules and document number formatting.

pub mod dunning;
pub mod invoice;
pub mod numbering;
pub mod payment;
pub mod quote;
pub mod totals;

pub use dunning::{DunningSettings, DunningSnapshot, MAX_REMINDER_TIER, ReminderTier, next_eligible_tier};
pub use invoice::{
    CancelInvoice, ConvertToCreditNote, CreateInvoice, CreditNoteIssued, Invoice, InvoiceCancelled,
    InvoiceCommand, InvoiceCreated, InvoiceEvent, InvoiceId, InvoiceMarkedOverdue, InvoiceSent,
    InvoiceStatus, InvoiceViewed, MarkInvoiceViewed, MarkOverdue, PaymentRecorded, RecordPayment,
    RecordReminder, ReminderRecorded, SendInvoice,
};
pub use numbering::{DocumentKind, format_document_number};
pub use payment::{Payment, PaymentMethod};
pub use quote::{
    AcceptQuote, CreateQuote, DeleteQuote, DepositRequirement, ExpireQuote, MarkQuoteConverted,
    MarkQuoteViewed, Quote, QuoteAccepted, QuoteCommand, QuoteConversionReverted, QuoteConverted,
    QuoteCreated, QuoteDeleted, QuoteEvent, QuoteExpired, QuoteId, QuoteRefused, QuoteSent,
    QuoteStatus, QuoteViewed, RefuseQuote, RevertQuoteConversion, SendQuote,
};
pub use totals::{DocumentLine, DocumentTotals, LineInput, compute_document};
