//! Usage gate: plan-limit checks before resource creation.

use std::sync::Arc;

use facturier_catalog::PrestationId;
use facturier_clients::ClientId;
use facturier_core::{AccountId, DomainError};
use facturier_plans::{PlanCatalog, PlanLimits, ResourceKind, check_limit};

use crate::projections::{
    ClientReadModel, ClientsProjection, InvoiceReadModel, InvoicesProjection, PrestationReadModel,
    PrestationsProjection, QuoteReadModel, QuotesProjection,
};
use crate::read_model::AccountStore;
use facturier_billing::{InvoiceId, QuoteId};

/// Synchronous read-time quota check, invoked before each creation.
///
/// Reads current counts from the projections and the account's plan from the
/// catalog. It does not reserve capacity: the narrow window between check and
/// creation is an accepted limitation.
pub struct UsageGate<CS, QS, IS, PS, Cat>
where
    CS: AccountStore<ClientId, ClientReadModel>,
    QS: AccountStore<QuoteId, QuoteReadModel>,
    IS: AccountStore<InvoiceId, InvoiceReadModel>,
    PS: AccountStore<PrestationId, PrestationReadModel>,
    Cat: PlanCatalog,
{
    clients: Arc<ClientsProjection<CS>>,
    quotes: Arc<QuotesProjection<QS>>,
    invoices: Arc<InvoicesProjection<IS>>,
    prestations: Arc<PrestationsProjection<PS>>,
    catalog: Arc<Cat>,
}

impl<CS, QS, IS, PS, Cat> UsageGate<CS, QS, IS, PS, Cat>
where
    CS: AccountStore<ClientId, ClientReadModel>,
    QS: AccountStore<QuoteId, QuoteReadModel>,
    IS: AccountStore<InvoiceId, InvoiceReadModel>,
    PS: AccountStore<PrestationId, PrestationReadModel>,
    Cat: PlanCatalog,
{
    pub fn new(
        clients: Arc<ClientsProjection<CS>>,
        quotes: Arc<QuotesProjection<QS>>,
        invoices: Arc<InvoicesProjection<IS>>,
        prestations: Arc<PrestationsProjection<PS>>,
        catalog: Arc<Cat>,
    ) -> Self {
        Self {
            clients,
            quotes,
            invoices,
            prestations,
            catalog,
        }
    }

    /// The plan currently governing an account.
    pub fn plan(&self, account_id: AccountId) -> PlanLimits {
        self.catalog.plan_for(account_id)
    }

    /// Allow or deny creating one more resource of `kind`.
    pub fn check(&self, account_id: AccountId, kind: ResourceKind) -> Result<(), DomainError> {
        let plan = self.catalog.plan_for(account_id);
        let current = match kind {
            ResourceKind::Clients => self.clients.count(account_id),
            ResourceKind::Quotes => self.quotes.count(account_id),
            ResourceKind::Invoices => self.invoices.count(account_id),
            ResourceKind::Prestations => self.prestations.count(account_id),
        };
        check_limit(&plan, kind, current)
    }
}
