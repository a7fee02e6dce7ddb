use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use chrono::{Duration, Utc};

use facturier_auth::Permission;
use facturier_billing::{
    CancelInvoice, ConvertToCreditNote, CreateInvoice, DocumentKind, Invoice, InvoiceCommand,
    InvoiceId, MarkInvoiceViewed, PaymentMethod, RecordPayment, SendInvoice,
};
use facturier_clients::{ClientId, ClientStatus};
use facturier_core::AggregateId;
use facturier_plans::ResourceKind;

use crate::app::routes::common::CmdAuth;
use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::context::{AccountContext, PrincipalContext};

pub const INVOICE_AGGREGATE_TYPE: &str = "billing.invoice";

pub fn router() -> Router {
    Router::new()
        .route("/", post(create_invoice).get(list_invoices))
        .route("/:id", get(get_invoice))
        .route("/:id/send", post(send_invoice))
        .route("/:id/view", post(view_invoice))
        .route("/:id/cancel", post(cancel_invoice))
        .route("/:id/payments", post(record_payment))
        .route("/:id/credit-note", post(convert_to_credit_note))
}

fn parse_invoice_id(id: &str) -> Result<AggregateId, axum::response::Response> {
    id.parse().map_err(|_| {
        errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", "invalid invoice id")
    })
}

/// Authorize + dispatch an invoice command, mapping the outcome to a response.
fn dispatch_invoice(
    services: &AppServices,
    account: &AccountContext,
    principal: &PrincipalContext,
    agg: AggregateId,
    permission: &'static str,
    cmd: InvoiceCommand,
    ok_status: StatusCode,
) -> axum::response::Response {
    let cmd_auth = CmdAuth {
        inner: cmd,
        required: vec![Permission::new(permission)],
    };
    if let Err(e) = crate::authz::authorize_command(account, principal, &cmd_auth) {
        return errors::json_error(StatusCode::FORBIDDEN, "forbidden", e.to_string());
    }

    match services.dispatch::<Invoice>(
        account.account_id(),
        agg,
        INVOICE_AGGREGATE_TYPE,
        cmd_auth.inner,
        |_a, aggregate_id| Invoice::empty(InvoiceId::new(aggregate_id)),
    ) {
        Ok(_) => (
            ok_status,
            Json(serde_json::json!({ "id": agg.to_string() })),
        )
            .into_response(),
        Err(e) => errors::dispatch_error_to_response(e),
    }
}

pub async fn create_invoice(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(account): Extension<AccountContext>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<dto::CreateInvoiceRequest>,
) -> axum::response::Response {
    let client_agg: AggregateId = match body.client_id.parse() {
        Ok(v) => v,
        Err(_) => {
            return errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", "invalid client id");
        }
    };

    let client = match services.clients_get(account.account_id(), &ClientId::new(client_agg)) {
        Some(c) => c,
        None => {
            return errors::json_error(StatusCode::BAD_REQUEST, "unknown_client", "client not found");
        }
    };
    if client.status == ClientStatus::Archived {
        return errors::json_error(
            StatusCode::UNPROCESSABLE_ENTITY,
            "invariant_violation",
            "cannot create a document for an archived client",
        );
    }

    if let Err(e) = services.usage_check(account.account_id(), ResourceKind::Invoices) {
        return errors::domain_error_to_response(e);
    }

    let now = Utc::now();
    let issue_date = now.date_naive();
    let due_date = match body.due_date.as_deref() {
        Some(s) => match dto::parse_date(s, "due_date") {
            Ok(d) => d,
            Err(resp) => return resp,
        },
        None => issue_date + Duration::days(client.payment_terms_days as i64),
    };

    // Number first: no document may be persisted without one.
    let number = match services.allocate_number(account.account_id(), DocumentKind::Invoice) {
        Ok(n) => n,
        Err(e) => return errors::sequence_error_to_response(e),
    };

    let agg = AggregateId::new();
    let invoice_id = InvoiceId::new(agg);

    let cmd = InvoiceCommand::CreateInvoice(CreateInvoice {
        account_id: account.account_id(),
        invoice_id,
        client_id: client_agg,
        quote_id: None,
        number: number.clone(),
        issue_date,
        due_date,
        lines: body
            .lines
            .into_iter()
            .map(dto::DocumentLineRequest::into_line_input)
            .collect(),
        occurred_at: now,
    });

    let cmd_auth = CmdAuth {
        inner: cmd,
        required: vec![Permission::new("invoices.create")],
    };
    if let Err(e) = crate::authz::authorize_command(&account, &principal, &cmd_auth) {
        return errors::json_error(StatusCode::FORBIDDEN, "forbidden", e.to_string());
    }

    match services.dispatch::<Invoice>(
        account.account_id(),
        agg,
        INVOICE_AGGREGATE_TYPE,
        cmd_auth.inner,
        |_a, aggregate_id| Invoice::empty(InvoiceId::new(aggregate_id)),
    ) {
        Ok(_) => (
            StatusCode::CREATED,
            Json(serde_json::json!({ "id": agg.to_string(), "number": number })),
        )
            .into_response(),
        Err(e) => errors::dispatch_error_to_response(e),
    }
}

pub async fn send_invoice(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(account): Extension<AccountContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let agg = match parse_invoice_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    dispatch_invoice(
        &services,
        &account,
        &principal,
        agg,
        "invoices.send",
        InvoiceCommand::SendInvoice(SendInvoice {
            account_id: account.account_id(),
            invoice_id: InvoiceId::new(agg),
            occurred_at: Utc::now(),
        }),
        StatusCode::OK,
    )
}

pub async fn view_invoice(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(account): Extension<AccountContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let agg = match parse_invoice_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    dispatch_invoice(
        &services,
        &account,
        &principal,
        agg,
        "invoices.update",
        InvoiceCommand::MarkInvoiceViewed(MarkInvoiceViewed {
            account_id: account.account_id(),
            invoice_id: InvoiceId::new(agg),
            occurred_at: Utc::now(),
        }),
        StatusCode::OK,
    )
}

pub async fn record_payment(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(account): Extension<AccountContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::RecordPaymentRequest>,
) -> axum::response::Response {
    let agg = match parse_invoice_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let method: PaymentMethod = match body.method.parse() {
        Ok(m) => m,
        Err(msg) => {
            return errors::json_error(StatusCode::BAD_REQUEST, "invalid_payment_method", msg);
        }
    };

    let now = Utc::now();
    let paid_on = match body.paid_on.as_deref() {
        Some(s) => match dto::parse_date(s, "paid_on") {
            Ok(d) => d,
            Err(resp) => return resp,
        },
        None => now.date_naive(),
    };

    dispatch_invoice(
        &services,
        &account,
        &principal,
        agg,
        "invoices.pay",
        InvoiceCommand::RecordPayment(RecordPayment {
            account_id: account.account_id(),
            invoice_id: InvoiceId::new(agg),
            amount: body.amount,
            method,
            reference: body.reference,
            paid_on,
            notes: body.notes,
            occurred_at: now,
        }),
        StatusCode::OK,
    )
}

pub async fn cancel_invoice(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(account): Extension<AccountContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::CancelInvoiceRequest>,
) -> axum::response::Response {
    let agg = match parse_invoice_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    dispatch_invoice(
        &services,
        &account,
        &principal,
        agg,
        "invoices.cancel",
        InvoiceCommand::CancelInvoice(CancelInvoice {
            account_id: account.account_id(),
            invoice_id: InvoiceId::new(agg),
            reason: body.reason,
            occurred_at: Utc::now(),
        }),
        StatusCode::OK,
    )
}

pub async fn convert_to_credit_note(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(account): Extension<AccountContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let agg = match parse_invoice_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    dispatch_invoice(
        &services,
        &account,
        &principal,
        agg,
        "invoices.credit",
        InvoiceCommand::ConvertToCreditNote(ConvertToCreditNote {
            account_id: account.account_id(),
            invoice_id: InvoiceId::new(agg),
            occurred_at: Utc::now(),
        }),
        StatusCode::OK,
    )
}

pub async fn get_invoice(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(account): Extension<AccountContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let agg = match parse_invoice_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    match services.invoices_get(account.account_id(), &InvoiceId::new(agg)) {
        Some(rm) => (StatusCode::OK, Json(dto::invoice_to_json(rm))).into_response(),
        None => errors::json_error(StatusCode::NOT_FOUND, "not_found", "invoice not found"),
    }
}

pub async fn list_invoices(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(account): Extension<AccountContext>,
) -> axum::response::Response {
    let items = services
        .invoices_list(account.account_id())
        .into_iter()
        .map(dto::invoice_to_json)
        .collect::<Vec<_>>();
    (StatusCode::OK, Json(serde_json::json!({ "items": items }))).into_response()
}
