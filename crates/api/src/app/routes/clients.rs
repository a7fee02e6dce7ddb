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
use facturier_clients::{
    ArchiveClient, Client, ClientCommand, ClientId, ClientKind, RegisterClient,
    UpdateClientDetails,
};
use facturier_core::AggregateId;
use facturier_plans::ResourceKind;

use crate::app::routes::common::CmdAuth;
use crate::app::services::AppServices;
use crate::app::{dto, errors};

pub const CLIENT_AGGREGATE_TYPE: &str = "clients.client";

pub fn router() -> Router {
    Router::new()
        .route("/", post(register_client).get(list_clients))
        .route("/:id", get(get_client).put(update_client))
        .route("/:id/archive", post(archive_client))
}

fn parse_kind(s: &str) -> Result<ClientKind, axum::response::Response> {
    match s {
        "individual" => Ok(ClientKind::Individual),
        "company" => Ok(ClientKind::Company),
        _ => Err(errors::json_error(
            StatusCode::BAD_REQUEST,
            "invalid_client_kind",
            "kind must be one of: individual, company",
        )),
    }
}

pub async fn register_client(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(account): Extension<crate::context::AccountContext>,
    Extension(principal): Extension<crate::context::PrincipalContext>,
    Json(body): Json<dto::RegisterClientRequest>,
) -> axum::response::Response {
    let kind = match parse_kind(&body.kind) {
        Ok(k) => k,
        Err(resp) => return resp,
    };

    if let Err(e) = services.usage_check(account.account_id(), ResourceKind::Clients) {
        return errors::domain_error_to_response(e);
    }

    let client_agg = AggregateId::new();
    let client_id = ClientId::new(client_agg);

    let cmd = ClientCommand::RegisterClient(RegisterClient {
        account_id: account.account_id(),
        client_id,
        kind,
        name: body.name,
        contact: dto::contact_from_parts(body.email, body.phone),
        billing_address: body.billing_address,
        tax: dto::tax_from_parts(body.siret, body.vat_number),
        payment_terms_days: body.payment_terms_days,
        occurred_at: Utc::now(),
    });

    let cmd_auth = CmdAuth {
        inner: cmd,
        required: vec![Permission::new("clients.create")],
    };
    if let Err(e) = crate::authz::authorize_command(&account, &principal, &cmd_auth) {
        return errors::json_error(StatusCode::FORBIDDEN, "forbidden", e.to_string());
    }

    match services.dispatch::<Client>(
        account.account_id(),
        client_agg,
        CLIENT_AGGREGATE_TYPE,
        cmd_auth.inner,
        |_a, aggregate_id| Client::empty(ClientId::new(aggregate_id)),
    ) {
        Ok(_) => (
            StatusCode::CREATED,
            Json(serde_json::json!({ "id": client_agg.to_string() })),
        )
            .into_response(),
        Err(e) => errors::dispatch_error_to_response(e),
    }
}

pub async fn update_client(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(account): Extension<crate::context::AccountContext>,
    Extension(principal): Extension<crate::context::PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::UpdateClientRequest>,
) -> axum::response::Response {
    let agg: AggregateId = match id.parse() {
        Ok(v) => v,
        Err(_) => {
            return errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", "invalid client id");
        }
    };
    let client_id = ClientId::new(agg);

    let cmd = ClientCommand::UpdateClientDetails(UpdateClientDetails {
        account_id: account.account_id(),
        client_id,
        name: body.name,
        contact: dto::contact_from_parts(body.email, body.phone),
        billing_address: body.billing_address,
        tax: dto::tax_from_parts(body.siret, body.vat_number),
        payment_terms_days: body.payment_terms_days,
        occurred_at: Utc::now(),
    });

    let cmd_auth = CmdAuth {
        inner: cmd,
        required: vec![Permission::new("clients.update")],
    };
    if let Err(e) = crate::authz::authorize_command(&account, &principal, &cmd_auth) {
        return errors::json_error(StatusCode::FORBIDDEN, "forbidden", e.to_string());
    }

    match services.dispatch::<Client>(
        account.account_id(),
        agg,
        CLIENT_AGGREGATE_TYPE,
        cmd_auth.inner,
        |_a, aggregate_id| Client::empty(ClientId::new(aggregate_id)),
    ) {
        Ok(_) => (
            StatusCode::OK,
            Json(serde_json::json!({ "id": agg.to_string() })),
        )
            .into_response(),
        Err(e) => errors::dispatch_error_to_response(e),
    }
}

pub async fn archive_client(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(account): Extension<crate::context::AccountContext>,
    Extension(principal): Extension<crate::context::PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::ArchiveClientRequest>,
) -> axum::response::Response {
    let agg: AggregateId = match id.parse() {
        Ok(v) => v,
        Err(_) => {
            return errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", "invalid client id");
        }
    };
    let client_id = ClientId::new(agg);

    let cmd = ClientCommand::ArchiveClient(ArchiveClient {
        account_id: account.account_id(),
        client_id,
        reason: body.reason,
        occurred_at: Utc::now(),
    });

    let cmd_auth = CmdAuth {
        inner: cmd,
        required: vec![Permission::new("clients.archive")],
    };
    if let Err(e) = crate::authz::authorize_command(&account, &principal, &cmd_auth) {
        return errors::json_error(StatusCode::FORBIDDEN, "forbidden", e.to_string());
    }

    match services.dispatch::<Client>(
        account.account_id(),
        agg,
        CLIENT_AGGREGATE_TYPE,
        cmd_auth.inner,
        |_a, aggregate_id| Client::empty(ClientId::new(aggregate_id)),
    ) {
        Ok(_) => (
            StatusCode::OK,
            Json(serde_json::json!({ "id": agg.to_string() })),
        )
            .into_response(),
        Err(e) => errors::dispatch_error_to_response(e),
    }
}

pub async fn get_client(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(account): Extension<crate::context::AccountContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let agg: AggregateId = match id.parse() {
        Ok(v) => v,
        Err(_) => {
            return errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", "invalid client id");
        }
    };
    match services.clients_get(account.account_id(), &ClientId::new(agg)) {
        Some(rm) => (StatusCode::OK, Json(dto::client_to_json(rm))).into_response(),
        None => errors::json_error(StatusCode::NOT_FOUND, "not_found", "client not found"),
    }
}

pub async fn list_clients(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(account): Extension<crate::context::AccountContext>,
) -> axum::response::Response {
    let items = services
        .clients_list(account.account_id())
        .into_iter()
        .map(dto::client_to_json)
        .collect::<Vec<_>>();
    (StatusCode::OK, Json(serde_json::json!({ "items": items }))).into_response()
}
