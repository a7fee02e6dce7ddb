//! HTTP API application wiring (axum router + service wiring).
//!
//! Layout:
//! - `services.rs`: infrastructure wiring (event store/bus, projections,
//!   dispatcher, usage gate, conversion, dunning)
//! - `routes/`: HTTP routes + handlers (one file per domain area)
//! - `dto.rs`: request/response DTOs and JSON mapping helpers
//! - `errors.rs`: consistent error responses

use std::sync::Arc;

use axum::{Extension, Router, routing::get};
use tower::ServiceBuilder;

use crate::middleware;

pub mod dto;
pub mod errors;
pub mod routes;
pub mod services;

/// Build the full HTTP router (public entrypoint used by `main.rs`).
pub async fn build_app(jwt_secret: String, dunning_secret: String) -> Router {
    let jwt = Arc::new(facturier_auth::Hs256JwtValidator::new(
        jwt_secret.into_bytes(),
    ));
    let auth_state = middleware::AuthState { jwt };

    let services = Arc::new(services::build_services().await);

    // Protected routes: require auth + account context.
    let protected = routes::router()
        .layer(Extension(services.clone()))
        .layer(axum::middleware::from_fn_with_state(
            auth_state,
            middleware::auth_middleware,
        ));

    // Scheduled sweep: shared-secret gate, no user/account context.
    let cron = routes::dunning::cron_router()
        .layer(Extension(services))
        .layer(axum::middleware::from_fn_with_state(
            middleware::DunningAuthState {
                secret: Arc::new(dunning_secret),
            },
            middleware::dunning_auth_middleware,
        ));

    Router::new()
        .route("/health", get(routes::system::health))
        .nest("/dunning", cron)
        .merge(protected)
        .layer(ServiceBuilder::new())
}
