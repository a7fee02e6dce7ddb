//! `facturier-plans` — subscription plan limits and the usage-gate rules.
//!
//! Plan definitions are owned by an external billing/subscription system;
//! this crate only models the limits the engine consumes and the pure
//! decision function applied before resource creation.

pub mod plan;

pub use plan::{Limit, PlanCatalog, PlanLimits, ResourceKind, StaticPlanCatalog, check_limit};
