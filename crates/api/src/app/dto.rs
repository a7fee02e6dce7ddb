use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::json;

use facturier_billing::LineInput;
use facturier_clients::{BillingAddress, ContactDetails, TaxRegistration};
use facturier_infra::projections::{
    ClientReadModel, InvoiceReadModel, PrestationReadModel, QuoteReadModel,
};

use crate::app::errors;

// -------------------------
// Request DTOs
// -------------------------

#[derive(Debug, Deserialize)]
pub struct RegisterClientRequest {
    /// "individual" or "company".
    pub kind: String,
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub billing_address: Option<BillingAddress>,
    pub siret: Option<String>,
    pub vat_number: Option<String>,
    pub payment_terms_days: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateClientRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub billing_address: Option<BillingAddress>,
    pub siret: Option<String>,
    pub vat_number: Option<String>,
    pub payment_terms_days: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct ArchiveClientRequest {
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreatePrestationRequest {
    pub label: String,
    /// "hourly", "daily" or "flat".
    pub pricing_mode: String,
    pub unit_rate: Decimal,
    pub default_tax_rate: Decimal,
}

#[derive(Debug, Deserialize)]
pub struct UpdatePrestationRequest {
    pub label: Option<String>,
    pub pricing_mode: Option<String>,
    pub unit_rate: Option<Decimal>,
    pub default_tax_rate: Option<Decimal>,
}

#[derive(Debug, Deserialize)]
pub struct DocumentLineRequest {
    pub description: String,
    pub quantity: Decimal,
    pub unit: Option<String>,
    pub unit_price: Decimal,
    pub tax_rate: Decimal,
}

impl DocumentLineRequest {
    pub fn into_line_input(self) -> LineInput {
        LineInput {
            description: self.description,
            quantity: self.quantity,
            unit: self.unit,
            unit_price: self.unit_price,
            tax_rate: self.tax_rate,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateQuoteRequest {
    pub client_id: String,
    /// ISO date (YYYY-MM-DD).
    pub validity_date: String,
    pub lines: Vec<DocumentLineRequest>,
    pub deposit_percent: Option<Decimal>,
}

#[derive(Debug, Deserialize)]
pub struct SendQuoteRequest {
    /// Defaults to the client's billing email.
    pub recipient_email: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateInvoiceRequest {
    pub client_id: String,
    /// ISO date (YYYY-MM-DD); defaults to today + the client's payment terms.
    pub due_date: Option<String>,
    pub lines: Vec<DocumentLineRequest>,
}

#[derive(Debug, Deserialize)]
pub struct RecordPaymentRequest {
    pub amount: Decimal,
    /// "bank_transfer", "card", "cheque", "cash", "direct_debit" or "gateway".
    pub method: String,
    pub reference: Option<String>,
    /// ISO date (YYYY-MM-DD); defaults to today.
    pub paid_on: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CancelInvoiceRequest {
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct DunningSettingsRequest {
    pub auto_enabled: bool,
    pub tier_enabled: [bool; 4],
}

// -------------------------
// Parsing helpers
// -------------------------

pub fn parse_date(s: &str, field: &'static str) -> Result<NaiveDate, axum::response::Response> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|_| {
        errors::json_error(
            axum::http::StatusCode::BAD_REQUEST,
            "invalid_date",
            format!("{field} must be an ISO date (YYYY-MM-DD)"),
        )
    })
}

pub fn contact_from_parts(email: Option<String>, phone: Option<String>) -> Option<ContactDetails> {
    if email.is_none() && phone.is_none() {
        None
    } else {
        Some(ContactDetails { email, phone })
    }
}

pub fn tax_from_parts(
    siret: Option<String>,
    vat_number: Option<String>,
) -> Option<TaxRegistration> {
    if siret.is_none() && vat_number.is_none() {
        None
    } else {
        Some(TaxRegistration { siret, vat_number })
    }
}

// -------------------------
// Response mapping
// -------------------------

pub fn client_to_json(rm: ClientReadModel) -> serde_json::Value {
    json!({
        "id": rm.client_id.to_string(),
        "kind": kind_str(&rm),
        "name": rm.name,
        "email": rm.contact.email,
        "phone": rm.contact.phone,
        "billing_address": {
            "street": rm.billing_address.street,
            "postal_code": rm.billing_address.postal_code,
            "city": rm.billing_address.city,
            "country": rm.billing_address.country,
        },
        "siret": rm.tax.siret,
        "vat_number": rm.tax.vat_number,
        "payment_terms_days": rm.payment_terms_days,
        "status": status_str(rm.status),
    })
}

fn kind_str(rm: &ClientReadModel) -> &'static str {
    match rm.kind {
        facturier_clients::ClientKind::Individual => "individual",
        facturier_clients::ClientKind::Company => "company",
    }
}

fn status_str(status: facturier_clients::ClientStatus) -> &'static str {
    match status {
        facturier_clients::ClientStatus::Active => "active",
        facturier_clients::ClientStatus::Archived => "archived",
    }
}

pub fn prestation_to_json(rm: PrestationReadModel) -> serde_json::Value {
    json!({
        "id": rm.prestation_id.to_string(),
        "label": rm.label,
        "pricing_mode": match rm.pricing_mode {
            facturier_catalog::PricingMode::Hourly => "hourly",
            facturier_catalog::PricingMode::Daily => "daily",
            facturier_catalog::PricingMode::Flat => "flat",
        },
        "unit_rate": rm.unit_rate,
        "default_tax_rate": rm.default_tax_rate,
        "status": match rm.status {
            facturier_catalog::PrestationStatus::Active => "active",
            facturier_catalog::PrestationStatus::Retired => "retired",
        },
    })
}

pub fn quote_to_json(rm: QuoteReadModel) -> serde_json::Value {
    json!({
        "id": rm.quote_id.to_string(),
        "client_id": rm.client_id.map(|id| id.to_string()),
        "number": rm.number,
        "status": rm.status.as_str(),
        "issue_date": rm.issue_date.to_string(),
        "validity_date": rm.validity_date.to_string(),
        "total_ht": rm.totals.total_ht,
        "total_tax": rm.totals.total_tax,
        "total_ttc": rm.totals.total_ttc,
        "deposit": rm.deposit.map(|d| json!({
            "percent": d.percent,
            "amount": d.amount,
        })),
        "recipient_email": rm.recipient_email,
        "invoice_id": rm.invoice_id.map(|id| id.to_string()),
        "lines": rm.lines.iter().map(line_to_json).collect::<Vec<_>>(),
    })
}

pub fn invoice_to_json(rm: InvoiceReadModel) -> serde_json::Value {
    json!({
        "id": rm.invoice_id.to_string(),
        "client_id": rm.client_id.map(|id| id.to_string()),
        "quote_id": rm.quote_id.map(|id| id.to_string()),
        "number": rm.number,
        "status": rm.status.as_str(),
        "issue_date": rm.issue_date.to_string(),
        "due_date": rm.due_date.to_string(),
        "total_ht": rm.total_ht,
        "total_tax": rm.total_tax,
        "total_ttc": rm.total_ttc,
        "amount_paid": rm.amount_paid,
        "amount_due": rm.amount_due,
        "reminder_count": rm.reminder_count,
        "last_reminder_at": rm.last_reminder_at.map(|d| d.to_string()),
        "lines": rm.lines.iter().map(line_to_json).collect::<Vec<_>>(),
        "payments": rm.payments.iter().map(|p| json!({
            "amount": p.amount,
            "method": p.method.as_str(),
            "reference": p.reference,
            "paid_on": p.paid_on.to_string(),
            "notes": p.notes,
        })).collect::<Vec<_>>(),
    })
}

fn line_to_json(line: &facturier_billing::DocumentLine) -> serde_json::Value {
    json!({
        "line_no": line.line_no,
        "description": line.description,
        "quantity": line.quantity,
        "unit": line.unit,
        "unit_price": line.unit_price,
        "tax_rate": line.tax_rate,
        "line_total_ht": line.line_total_ht,
        "line_total_tax": line.line_total_tax,
        "line_total_ttc": line.line_total_ttc,
    })
}
