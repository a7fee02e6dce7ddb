//! Projection implementations (read model builders).
//!
//! Projections consume domain events and build query-optimized read models.
//! All projections are:
//! - **Rebuildable**: reconstructed from the event stream at any time
//! - **Account-isolated**: data is partitioned by account
//! - **Idempotent**: safe for at-least-once delivery (per-stream cursors)

pub mod clients;
pub mod cursor;
pub mod invoices;
pub mod prestations;
pub mod quotes;

pub use clients::{ClientReadModel, ClientsProjection};
pub use cursor::{ProjectionError, StreamCursors};
pub use invoices::{InvoiceReadModel, InvoicesProjection};
pub use prestations::{PrestationReadModel, PrestationsProjection};
pub use quotes::{QuoteReadModel, QuotesProjection};
