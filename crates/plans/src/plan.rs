use serde::{Deserialize, Serialize};

use facturier_core::{AccountId, DomainError};

/// The resource kinds the usage gate protects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    Clients,
    Quotes,
    Invoices,
    Prestations,
}

impl ResourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Clients => "clients",
            ResourceKind::Quotes => "quotes",
            ResourceKind::Invoices => "invoices",
            ResourceKind::Prestations => "prestations",
        }
    }
}

/// A per-resource quota.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Limit {
    Unlimited,
    Max(u32),
}

impl Limit {
    /// Whether one more resource may be created given the current count.
    pub fn allows(&self, current: u32) -> bool {
        match self {
            Limit::Unlimited => true,
            Limit::Max(max) => current < *max,
        }
    }
}

/// The limits granted by a subscription plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanLimits {
    pub name: String,
    pub clients: Limit,
    pub quotes: Limit,
    pub invoices: Limit,
    pub prestations: Limit,
    /// Whether the plan entitles the account to automatic dunning.
    pub auto_dunning: bool,
}

impl PlanLimits {
    pub fn limit_for(&self, kind: ResourceKind) -> Limit {
        match kind {
            ResourceKind::Clients => self.clients,
            ResourceKind::Quotes => self.quotes,
            ResourceKind::Invoices => self.invoices,
            ResourceKind::Prestations => self.prestations,
        }
    }

    /// Entry-level plan used when an account has no explicit subscription.
    pub fn free() -> Self {
        Self {
            name: "free".to_string(),
            clients: Limit::Max(5),
            quotes: Limit::Max(10),
            invoices: Limit::Max(10),
            prestations: Limit::Max(10),
            auto_dunning: false,
        }
    }

    pub fn pro() -> Self {
        Self {
            name: "pro".to_string(),
            clients: Limit::Unlimited,
            quotes: Limit::Unlimited,
            invoices: Limit::Unlimited,
            prestations: Limit::Unlimited,
            auto_dunning: true,
        }
    }
}

/// Pure usage-gate decision.
///
/// Read-time check only: it does not reserve capacity, so a narrow
/// check-then-create window is accepted.
pub fn check_limit(
    plan: &PlanLimits,
    kind: ResourceKind,
    current: u32,
) -> Result<(), DomainError> {
    if plan.limit_for(kind).allows(current) {
        Ok(())
    } else {
        Err(DomainError::limit_exceeded(format!(
            "plan '{}' allows no more {} (current: {})",
            plan.name,
            kind.as_str(),
            current
        )))
    }
}

/// Resolves the plan limits for an account (external collaborator).
pub trait PlanCatalog: Send + Sync {
    fn plan_for(&self, account_id: AccountId) -> PlanLimits;
}

/// Static catalog for dev/tests: explicit assignments with a default fallback.
pub struct StaticPlanCatalog {
    default_plan: PlanLimits,
    assignments: std::collections::HashMap<AccountId, PlanLimits>,
}

impl StaticPlanCatalog {
    pub fn new(default_plan: PlanLimits) -> Self {
        Self {
            default_plan,
            assignments: std::collections::HashMap::new(),
        }
    }

    pub fn assign(mut self, account_id: AccountId, plan: PlanLimits) -> Self {
        self.assignments.insert(account_id, plan);
        self
    }
}

impl PlanCatalog for StaticPlanCatalog {
    fn plan_for(&self, account_id: AccountId) -> PlanLimits {
        self.assignments
            .get(&account_id)
            .cloned()
            .unwrap_or_else(|| self.default_plan.clone())
    }
}
