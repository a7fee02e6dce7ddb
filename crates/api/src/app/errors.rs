use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use facturier_core::DomainError;
use facturier_infra::{ConversionError, DispatchError, SequenceError};

pub fn dispatch_error_to_response(err: DispatchError) -> axum::response::Response {
    match err {
        DispatchError::Concurrency(msg) => json_error(StatusCode::CONFLICT, "conflict", msg),
        DispatchError::Validation(msg) => {
            json_error(StatusCode::BAD_REQUEST, "validation_error", msg)
        }
        DispatchError::InvariantViolation(msg) => {
            json_error(StatusCode::UNPROCESSABLE_ENTITY, "invariant_violation", msg)
        }
        DispatchError::LimitExceeded(msg) => {
            json_error(StatusCode::TOO_MANY_REQUESTS, "limit_exceeded", msg)
        }
        DispatchError::Unauthorized => {
            json_error(StatusCode::FORBIDDEN, "unauthorized", "unauthorized")
        }
        DispatchError::NotFound => json_error(StatusCode::NOT_FOUND, "not_found", "not found"),
        DispatchError::Deserialize(msg) => {
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "deserialize_error", msg)
        }
        DispatchError::Store(e) => json_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "store_error",
            format!("{e:?}"),
        ),
        DispatchError::Publish(msg) => json_error(StatusCode::BAD_GATEWAY, "publish_error", msg),
        DispatchError::AccountIsolation(msg) => {
            json_error(StatusCode::FORBIDDEN, "account_isolation", msg)
        }
    }
}

/// Errors raised before dispatch (usage gate, input checks).
pub fn domain_error_to_response(err: DomainError) -> axum::response::Response {
    match err {
        DomainError::Validation(msg) | DomainError::InvalidId(msg) => {
            json_error(StatusCode::BAD_REQUEST, "validation_error", msg)
        }
        DomainError::InvariantViolation(msg) => {
            json_error(StatusCode::UNPROCESSABLE_ENTITY, "invariant_violation", msg)
        }
        DomainError::LimitExceeded(msg) => {
            json_error(StatusCode::TOO_MANY_REQUESTS, "limit_exceeded", msg)
        }
        DomainError::Conflict(msg) => json_error(StatusCode::CONFLICT, "conflict", msg),
        DomainError::NotFound => json_error(StatusCode::NOT_FOUND, "not_found", "not found"),
        DomainError::Unauthorized => {
            json_error(StatusCode::FORBIDDEN, "unauthorized", "unauthorized")
        }
    }
}

pub fn conversion_error_to_response(err: ConversionError) -> axum::response::Response {
    match err {
        ConversionError::QuoteNotFound => {
            json_error(StatusCode::NOT_FOUND, "not_found", "quote not found")
        }
        ConversionError::Sequence(e) => sequence_error_to_response(e),
        ConversionError::Store(e) => json_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "store_error",
            format!("{e:?}"),
        ),
        ConversionError::Dispatch(e) => dispatch_error_to_response(e),
    }
}

/// Number allocation failures are transient storage errors: the caller may
/// retry; no document was persisted.
pub fn sequence_error_to_response(err: SequenceError) -> axum::response::Response {
    json_error(
        StatusCode::SERVICE_UNAVAILABLE,
        "sequence_unavailable",
        err.to_string(),
    )
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}
