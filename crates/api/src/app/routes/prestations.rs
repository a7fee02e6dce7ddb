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
use facturier_catalog::{
    CreatePrestation, Prestation, PrestationCommand, PrestationId, PricingMode, RetirePrestation,
    UpdatePrestation,
};
use facturier_core::AggregateId;
use facturier_plans::ResourceKind;

use crate::app::routes::common::CmdAuth;
use crate::app::services::AppServices;
use crate::app::{dto, errors};

pub const PRESTATION_AGGREGATE_TYPE: &str = "catalog.prestation";

pub fn router() -> Router {
    Router::new()
        .route("/", post(create_prestation).get(list_prestations))
        .route("/:id", get(get_prestation).put(update_prestation))
        .route("/:id/retire", post(retire_prestation))
}

fn parse_pricing_mode(s: &str) -> Result<PricingMode, axum::response::Response> {
    match s {
        "hourly" => Ok(PricingMode::Hourly),
        "daily" => Ok(PricingMode::Daily),
        "flat" => Ok(PricingMode::Flat),
        _ => Err(errors::json_error(
            StatusCode::BAD_REQUEST,
            "invalid_pricing_mode",
            "pricing_mode must be one of: hourly, daily, flat",
        )),
    }
}

pub async fn create_prestation(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(account): Extension<crate::context::AccountContext>,
    Extension(principal): Extension<crate::context::PrincipalContext>,
    Json(body): Json<dto::CreatePrestationRequest>,
) -> axum::response::Response {
    let pricing_mode = match parse_pricing_mode(&body.pricing_mode) {
        Ok(m) => m,
        Err(resp) => return resp,
    };

    if let Err(e) = services.usage_check(account.account_id(), ResourceKind::Prestations) {
        return errors::domain_error_to_response(e);
    }

    let agg = AggregateId::new();
    let prestation_id = PrestationId::new(agg);

    let cmd = PrestationCommand::CreatePrestation(CreatePrestation {
        account_id: account.account_id(),
        prestation_id,
        label: body.label,
        pricing_mode,
        unit_rate: body.unit_rate,
        default_tax_rate: body.default_tax_rate,
        occurred_at: Utc::now(),
    });

    let cmd_auth = CmdAuth {
        inner: cmd,
        required: vec![Permission::new("prestations.create")],
    };
    if let Err(e) = crate::authz::authorize_command(&account, &principal, &cmd_auth) {
        return errors::json_error(StatusCode::FORBIDDEN, "forbidden", e.to_string());
    }

    match services.dispatch::<Prestation>(
        account.account_id(),
        agg,
        PRESTATION_AGGREGATE_TYPE,
        cmd_auth.inner,
        |_a, aggregate_id| Prestation::empty(PrestationId::new(aggregate_id)),
    ) {
        Ok(_) => (
            StatusCode::CREATED,
            Json(serde_json::json!({ "id": agg.to_string() })),
        )
            .into_response(),
        Err(e) => errors::dispatch_error_to_response(e),
    }
}

pub async fn update_prestation(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(account): Extension<crate::context::AccountContext>,
    Extension(principal): Extension<crate::context::PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::UpdatePrestationRequest>,
) -> axum::response::Response {
    let agg: AggregateId = match id.parse() {
        Ok(v) => v,
        Err(_) => {
            return errors::json_error(
                StatusCode::BAD_REQUEST,
                "invalid_id",
                "invalid prestation id",
            );
        }
    };

    let pricing_mode = match body.pricing_mode.as_deref().map(parse_pricing_mode) {
        None => None,
        Some(Ok(m)) => Some(m),
        Some(Err(resp)) => return resp,
    };

    let cmd = PrestationCommand::UpdatePrestation(UpdatePrestation {
        account_id: account.account_id(),
        prestation_id: PrestationId::new(agg),
        label: body.label,
        pricing_mode,
        unit_rate: body.unit_rate,
        default_tax_rate: body.default_tax_rate,
        occurred_at: Utc::now(),
    });

    let cmd_auth = CmdAuth {
        inner: cmd,
        required: vec![Permission::new("prestations.update")],
    };
    if let Err(e) = crate::authz::authorize_command(&account, &principal, &cmd_auth) {
        return errors::json_error(StatusCode::FORBIDDEN, "forbidden", e.to_string());
    }

    match services.dispatch::<Prestation>(
        account.account_id(),
        agg,
        PRESTATION_AGGREGATE_TYPE,
        cmd_auth.inner,
        |_a, aggregate_id| Prestation::empty(PrestationId::new(aggregate_id)),
    ) {
        Ok(_) => (
            StatusCode::OK,
            Json(serde_json::json!({ "id": agg.to_string() })),
        )
            .into_response(),
        Err(e) => errors::dispatch_error_to_response(e),
    }
}

pub async fn retire_prestation(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(account): Extension<crate::context::AccountContext>,
    Extension(principal): Extension<crate::context::PrincipalContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let agg: AggregateId = match id.parse() {
        Ok(v) => v,
        Err(_) => {
            return errors::json_error(
                StatusCode::BAD_REQUEST,
                "invalid_id",
                "invalid prestation id",
            );
        }
    };

    let cmd = PrestationCommand::RetirePrestation(RetirePrestation {
        account_id: account.account_id(),
        prestation_id: PrestationId::new(agg),
        occurred_at: Utc::now(),
    });

    let cmd_auth = CmdAuth {
        inner: cmd,
        required: vec![Permission::new("prestations.retire")],
    };
    if let Err(e) = crate::authz::authorize_command(&account, &principal, &cmd_auth) {
        return errors::json_error(StatusCode::FORBIDDEN, "forbidden", e.to_string());
    }

    match services.dispatch::<Prestation>(
        account.account_id(),
        agg,
        PRESTATION_AGGREGATE_TYPE,
        cmd_auth.inner,
        |_a, aggregate_id| Prestation::empty(PrestationId::new(aggregate_id)),
    ) {
        Ok(_) => (
            StatusCode::OK,
            Json(serde_json::json!({ "id": agg.to_string() })),
        )
            .into_response(),
        Err(e) => errors::dispatch_error_to_response(e),
    }
}

pub async fn get_prestation(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(account): Extension<crate::context::AccountContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let agg: AggregateId = match id.parse() {
        Ok(v) => v,
        Err(_) => {
            return errors::json_error(
                StatusCode::BAD_REQUEST,
                "invalid_id",
                "invalid prestation id",
            );
        }
    };
    match services.prestations_get(account.account_id(), &PrestationId::new(agg)) {
        Some(rm) => (StatusCode::OK, Json(dto::prestation_to_json(rm))).into_response(),
        None => errors::json_error(StatusCode::NOT_FOUND, "not_found", "prestation not found"),
    }
}

pub async fn list_prestations(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(account): Extension<crate::context::AccountContext>,
) -> axum::response::Response {
    let items = services
        .prestations_list(account.account_id())
        .into_iter()
        .map(dto::prestation_to_json)
        .collect::<Vec<_>>();
    (StatusCode::OK, Json(serde_json::json!({ "items": items }))).into_response()
}
