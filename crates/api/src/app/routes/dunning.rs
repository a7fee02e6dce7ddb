use std::sync::Arc;

use axum::{
    Json, Router, extract::Extension, http::StatusCode, response::IntoResponse, routing::post,
};

use facturier_billing::DunningSettings;

use crate::app::dto;
use crate::app::services::AppServices;
use crate::context::AccountContext;

/// Router for the scheduled sweep endpoint.
///
/// Mounted behind the shared-secret middleware, not user auth: the caller is
/// a scheduler acting across all accounts.
pub fn cron_router() -> Router {
    Router::new().route("/run", post(run_sweep))
}

/// Execute one sweep pass and report counts only.
///
/// Individual failures are logged and counted, never listed to the caller.
pub async fn run_sweep(
    Extension(services): Extension<Arc<AppServices>>,
) -> axum::response::Response {
    let report = services.run_dunning_sweep();

    (
        StatusCode::OK,
        Json(serde_json::json!({
            "sent_per_tier": report.sent_per_tier,
            "sent": report.total_sent(),
            "skipped": report.skipped,
            "errored": report.errored,
        })),
    )
        .into_response()
}

/// Read the account's dunning configuration.
pub async fn get_settings(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(account): Extension<AccountContext>,
) -> axum::response::Response {
    get_settings_response(&services, account)
}

/// Replace the account's dunning configuration.
pub async fn update_settings(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(account): Extension<AccountContext>,
    Json(body): Json<dto::DunningSettingsRequest>,
) -> axum::response::Response {
    services.update_dunning_settings(
        account.account_id(),
        DunningSettings {
            auto_enabled: body.auto_enabled,
            tier_enabled: body.tier_enabled,
        },
    );

    get_settings_response(&services, account)
}

fn get_settings_response(
    services: &AppServices,
    account: AccountContext,
) -> axum::response::Response {
    let settings = services.dunning_settings_for(account.account_id());
    (
        StatusCode::OK,
        Json(serde_json::json!({
            "auto_enabled": settings.auto_enabled,
            "tier_enabled": settings.tier_enabled,
        })),
    )
        .into_response()
}
