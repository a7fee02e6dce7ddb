use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use chrono::Utc;

use facturier_auth::Permission;
use facturier_billing::{
    AcceptQuote, CreateQuote, DeleteQuote, DocumentKind, ExpireQuote, MarkQuoteViewed, Quote,
    QuoteCommand, QuoteId, RefuseQuote, SendQuote,
};
use facturier_clients::{ClientId, ClientStatus};
use facturier_core::AggregateId;
use facturier_plans::ResourceKind;

use crate::app::routes::common::CmdAuth;
use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::context::{AccountContext, PrincipalContext};

pub const QUOTE_AGGREGATE_TYPE: &str = "billing.quote";

pub fn router() -> Router {
    Router::new()
        .route("/", post(create_quote).get(list_quotes))
        .route("/:id", get(get_quote).delete(delete_quote))
        .route("/:id/send", post(send_quote))
        .route("/:id/view", post(view_quote))
        .route("/:id/accept", post(accept_quote))
        .route("/:id/refuse", post(refuse_quote))
        .route("/:id/expire", post(expire_quote))
        .route("/:id/convert", post(convert_quote))
}

fn parse_quote_id(id: &str) -> Result<AggregateId, axum::response::Response> {
    id.parse().map_err(|_| {
        errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", "invalid quote id")
    })
}

/// Authorize + dispatch a quote command, mapping the outcome to a response.
fn dispatch_quote(
    services: &AppServices,
    account: &AccountContext,
    principal: &PrincipalContext,
    agg: AggregateId,
    permission: &'static str,
    cmd: QuoteCommand,
    ok_status: StatusCode,
) -> axum::response::Response {
    let cmd_auth = CmdAuth {
        inner: cmd,
        required: vec![Permission::new(permission)],
    };
    if let Err(e) = crate::authz::authorize_command(account, principal, &cmd_auth) {
        return errors::json_error(StatusCode::FORBIDDEN, "forbidden", e.to_string());
    }

    match services.dispatch::<Quote>(
        account.account_id(),
        agg,
        QUOTE_AGGREGATE_TYPE,
        cmd_auth.inner,
        |_a, aggregate_id| Quote::empty(QuoteId::new(aggregate_id)),
    ) {
        Ok(_) => (
            ok_status,
            Json(serde_json::json!({ "id": agg.to_string() })),
        )
            .into_response(),
        Err(e) => errors::dispatch_error_to_response(e),
    }
}

pub async fn create_quote(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(account): Extension<AccountContext>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<dto::CreateQuoteRequest>,
) -> axum::response::Response {
    let client_agg: AggregateId = match body.client_id.parse() {
        Ok(v) => v,
        Err(_) => {
            return errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", "invalid client id");
        }
    };
    let validity_date = match dto::parse_date(&body.validity_date, "validity_date") {
        Ok(d) => d,
        Err(resp) => return resp,
    };

    // Creating a document for an unknown or archived client is rejected up
    // front; the document would otherwise carry a dangling reference.
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

    if let Err(e) = services.usage_check(account.account_id(), ResourceKind::Quotes) {
        return errors::domain_error_to_response(e);
    }

    // Number first: no document may be persisted without one.
    let number = match services.allocate_number(account.account_id(), DocumentKind::Quote) {
        Ok(n) => n,
        Err(e) => return errors::sequence_error_to_response(e),
    };

    let agg = AggregateId::new();
    let quote_id = QuoteId::new(agg);
    let now = Utc::now();

    let cmd = QuoteCommand::CreateQuote(CreateQuote {
        account_id: account.account_id(),
        quote_id,
        client_id: client_agg,
        number: number.clone(),
        issue_date: now.date_naive(),
        validity_date,
        lines: body
            .lines
            .into_iter()
            .map(dto::DocumentLineRequest::into_line_input)
            .collect(),
        deposit_percent: body.deposit_percent,
        occurred_at: now,
    });

    let cmd_auth = CmdAuth {
        inner: cmd,
        required: vec![Permission::new("quotes.create")],
    };
    if let Err(e) = crate::authz::authorize_command(&account, &principal, &cmd_auth) {
        return errors::json_error(StatusCode::FORBIDDEN, "forbidden", e.to_string());
    }

    match services.dispatch::<Quote>(
        account.account_id(),
        agg,
        QUOTE_AGGREGATE_TYPE,
        cmd_auth.inner,
        |_a, aggregate_id| Quote::empty(QuoteId::new(aggregate_id)),
    ) {
        Ok(_) => (
            StatusCode::CREATED,
            Json(serde_json::json!({ "id": agg.to_string(), "number": number })),
        )
            .into_response(),
        Err(e) => errors::dispatch_error_to_response(e),
    }
}

pub async fn send_quote(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(account): Extension<AccountContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::SendQuoteRequest>,
) -> axum::response::Response {
    let agg = match parse_quote_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    // Default the recipient to the client's billing email.
    let recipient_email = match body.recipient_email {
        Some(email) => email,
        None => {
            let client_email = services
                .quotes_get(account.account_id(), &QuoteId::new(agg))
                .and_then(|q| q.client_id)
                .and_then(|cid| services.clients_get(account.account_id(), &ClientId::new(cid)))
                .and_then(|c| c.contact.email);
            match client_email {
                Some(email) => email,
                None => {
                    return errors::json_error(
                        StatusCode::BAD_REQUEST,
                        "missing_recipient",
                        "no recipient email provided and the client has none",
                    );
                }
            }
        }
    };

    dispatch_quote(
        &services,
        &account,
        &principal,
        agg,
        "quotes.send",
        QuoteCommand::SendQuote(SendQuote {
            account_id: account.account_id(),
            quote_id: QuoteId::new(agg),
            recipient_email,
            occurred_at: Utc::now(),
        }),
        StatusCode::OK,
    )
}

pub async fn view_quote(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(account): Extension<AccountContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let agg = match parse_quote_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    dispatch_quote(
        &services,
        &account,
        &principal,
        agg,
        "quotes.update",
        QuoteCommand::MarkQuoteViewed(MarkQuoteViewed {
            account_id: account.account_id(),
            quote_id: QuoteId::new(agg),
            occurred_at: Utc::now(),
        }),
        StatusCode::OK,
    )
}

pub async fn accept_quote(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(account): Extension<AccountContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let agg = match parse_quote_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    dispatch_quote(
        &services,
        &account,
        &principal,
        agg,
        "quotes.update",
        QuoteCommand::AcceptQuote(AcceptQuote {
            account_id: account.account_id(),
            quote_id: QuoteId::new(agg),
            occurred_at: Utc::now(),
        }),
        StatusCode::OK,
    )
}

pub async fn refuse_quote(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(account): Extension<AccountContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let agg = match parse_quote_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    dispatch_quote(
        &services,
        &account,
        &principal,
        agg,
        "quotes.update",
        QuoteCommand::RefuseQuote(RefuseQuote {
            account_id: account.account_id(),
            quote_id: QuoteId::new(agg),
            occurred_at: Utc::now(),
        }),
        StatusCode::OK,
    )
}

pub async fn expire_quote(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(account): Extension<AccountContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let agg = match parse_quote_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let now = Utc::now();
    dispatch_quote(
        &services,
        &account,
        &principal,
        agg,
        "quotes.update",
        QuoteCommand::ExpireQuote(ExpireQuote {
            account_id: account.account_id(),
            quote_id: QuoteId::new(agg),
            as_of: now.date_naive(),
            occurred_at: now,
        }),
        StatusCode::OK,
    )
}

pub async fn delete_quote(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(account): Extension<AccountContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let agg = match parse_quote_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    dispatch_quote(
        &services,
        &account,
        &principal,
        agg,
        "quotes.delete",
        QuoteCommand::DeleteQuote(DeleteQuote {
            account_id: account.account_id(),
            quote_id: QuoteId::new(agg),
            occurred_at: Utc::now(),
        }),
        StatusCode::OK,
    )
}

pub async fn convert_quote(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(account): Extension<AccountContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let agg = match parse_quote_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    // Conversion also creates an invoice, so both gates apply.
    if let Err(e) = services.usage_check(account.account_id(), ResourceKind::Invoices) {
        return errors::domain_error_to_response(e);
    }

    let auth = CmdAuth {
        inner: (),
        required: vec![Permission::new("quotes.convert")],
    };
    if let Err(e) = crate::authz::authorize_command(&account, &principal, &auth) {
        return errors::json_error(StatusCode::FORBIDDEN, "forbidden", e.to_string());
    }

    match services.convert_quote(account.account_id(), QuoteId::new(agg)) {
        Ok(invoice_id) => (
            StatusCode::CREATED,
            Json(serde_json::json!({
                "quote_id": agg.to_string(),
                "invoice_id": invoice_id.to_string(),
            })),
        )
            .into_response(),
        Err(e) => errors::conversion_error_to_response(e),
    }
}

pub async fn get_quote(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(account): Extension<AccountContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let agg = match parse_quote_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    match services.quotes_get(account.account_id(), &QuoteId::new(agg)) {
        Some(rm) => (StatusCode::OK, Json(dto::quote_to_json(rm))).into_response(),
        None => errors::json_error(StatusCode::NOT_FOUND, "not_found", "quote not found"),
    }
}

pub async fn list_quotes(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(account): Extension<AccountContext>,
) -> axum::response::Response {
    let items = services
        .quotes_list(account.account_id())
        .into_iter()
        .map(dto::quote_to_json)
        .collect::<Vec<_>>();
    (StatusCode::OK, Json(serde_json::json!({ "items": items }))).into_response()
}
