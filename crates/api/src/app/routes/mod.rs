use axum::{Router, routing::get};

pub mod clients;
pub mod common;
pub mod dunning;
pub mod invoices;
pub mod prestations;
pub mod quotes;
pub mod system;

/// Router for all authenticated (account-scoped) endpoints.
pub fn router() -> Router {
    Router::new()
        .route("/whoami", get(system::whoami))
        .route(
            "/dunning-settings",
            get(dunning::get_settings).put(dunning::update_settings),
        )
        .nest("/clients", clients::router())
        .nest("/prestations", prestations::router())
        .nest("/quotes", quotes::router())
        .nest("/invoices", invoices::router())
}
