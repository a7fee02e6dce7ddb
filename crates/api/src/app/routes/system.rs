use axum::{Json, extract::Extension, http::StatusCode, response::IntoResponse};

pub async fn health() -> axum::response::Response {
    (StatusCode::OK, Json(serde_json::json!({ "status": "ok" }))).into_response()
}

pub async fn whoami(
    Extension(account): Extension<crate::context::AccountContext>,
    Extension(principal): Extension<crate::context::PrincipalContext>,
) -> axum::response::Response {
    (
        StatusCode::OK,
        Json(serde_json::json!({
            "account_id": account.account_id().to_string(),
            "principal_id": principal.principal_id().to_string(),
            "roles": principal.roles().iter().map(|r| r.as_str()).collect::<Vec<_>>(),
        })),
    )
        .into_response()
}
