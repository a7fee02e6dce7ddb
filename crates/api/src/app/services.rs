use std::sync::{Arc, Mutex};

use chrono::Utc;
use serde_json::Value as JsonValue;
use tracing::{info, warn};

use facturier_billing::{DocumentKind, DunningSettings, InvoiceId, QuoteId};
use facturier_catalog::PrestationId;
use facturier_clients::ClientId;
use facturier_core::{AccountId, AggregateId, DomainError};
use facturier_events::{EventBus, EventEnvelope, InMemoryEventBus};
use facturier_infra::{
    CommandDispatcher, ConversionError, DispatchError, DunningRunner, DunningRunnerHandle,
    DunningSettingsStore, DunningSweep, EventStore, InMemoryDunningSettings, InMemoryEventStore,
    InMemorySequenceStore, NotificationSink, NumberAllocator, QuoteConversion, ReminderDelivery,
    ReminderSender, SequenceError, SequenceStore, SweepReport,
    event_store::StoredEvent,
    projections::{
        ClientReadModel, ClientsProjection, InvoiceReadModel, InvoicesProjection,
        PrestationReadModel, PrestationsProjection, QuoteReadModel, QuotesProjection,
    },
    read_model::InMemoryAccountStore,
    usage::UsageGate,
};
use facturier_plans::{PlanLimits, ResourceKind, StaticPlanCatalog};

type AppEventStore = Arc<dyn EventStore>;
type AppBus = Arc<InMemoryEventBus<EventEnvelope<JsonValue>>>;
type AppDispatcher = CommandDispatcher<AppEventStore, AppBus>;
type AppSequences = Arc<dyn SequenceStore>;

type ClientStore = Arc<InMemoryAccountStore<ClientId, ClientReadModel>>;
type PrestationStore = Arc<InMemoryAccountStore<PrestationId, PrestationReadModel>>;
type QuoteStore = Arc<InMemoryAccountStore<QuoteId, QuoteReadModel>>;
type InvoiceStore = Arc<InMemoryAccountStore<InvoiceId, InvoiceReadModel>>;

type AppSweep = DunningSweep<AppEventStore, AppBus, InvoiceStore, ClientStore, StaticPlanCatalog>;

/// Reminder delivery via structured logging.
///
/// The real email transport is an external collaborator; this default keeps
/// dev/test deployments self-contained while remaining observable.
struct LogReminderSender;

impl ReminderSender for LogReminderSender {
    fn send(&self, delivery: &ReminderDelivery) -> Result<(), String> {
        info!(
            invoice = %delivery.invoice_number,
            recipient = %delivery.recipient_email,
            tier = delivery.tier.index(),
            amount_due = %delivery.amount_due,
            "dunning reminder delivered"
        );
        Ok(())
    }
}

/// Notification records via structured logging (external collaborator stub).
struct LogNotificationSink;

impl NotificationSink for LogNotificationSink {
    fn notify(&self, account_id: AccountId, message: &str) {
        info!(account = %account_id, message, "notification recorded");
    }
}

pub struct AppServices {
    dispatcher: Arc<AppDispatcher>,
    clients_projection: Arc<ClientsProjection<ClientStore>>,
    prestations_projection: Arc<PrestationsProjection<PrestationStore>>,
    quotes_projection: Arc<QuotesProjection<QuoteStore>>,
    invoices_projection: Arc<InvoicesProjection<InvoiceStore>>,
    usage_gate: UsageGate<ClientStore, QuoteStore, InvoiceStore, PrestationStore, StaticPlanCatalog>,
    allocator: NumberAllocator<AppSequences>,
    conversion: QuoteConversion<AppEventStore, AppBus, AppSequences>,
    sweep: Arc<AppSweep>,
    dunning_settings: Arc<InMemoryDunningSettings>,
    runner: Mutex<Option<DunningRunnerHandle>>,
}

pub async fn build_services() -> AppServices {
    let (store, sequences) = build_stores().await;

    let bus: AppBus = Arc::new(InMemoryEventBus::new());
    let dispatcher: Arc<AppDispatcher> =
        Arc::new(CommandDispatcher::new(store.clone(), bus.clone()));

    let clients_projection: Arc<ClientsProjection<ClientStore>> =
        Arc::new(ClientsProjection::new(Arc::new(InMemoryAccountStore::new())));
    let prestations_projection: Arc<PrestationsProjection<PrestationStore>> = Arc::new(
        PrestationsProjection::new(Arc::new(InMemoryAccountStore::new())),
    );
    let quotes_projection: Arc<QuotesProjection<QuoteStore>> =
        Arc::new(QuotesProjection::new(Arc::new(InMemoryAccountStore::new())));
    let invoices_projection: Arc<InvoicesProjection<InvoiceStore>> = Arc::new(
        InvoicesProjection::new(Arc::new(InMemoryAccountStore::new())),
    );

    // Background subscriber: bus -> projections.
    {
        let sub = bus.subscribe();
        let clients_projection = clients_projection.clone();
        let prestations_projection = prestations_projection.clone();
        let quotes_projection = quotes_projection.clone();
        let invoices_projection = invoices_projection.clone();
        tokio::task::spawn_blocking(move || {
            loop {
                match sub.recv() {
                    Ok(env) => {
                        let apply_ok = match env.aggregate_type() {
                            "clients.client" => clients_projection
                                .apply_envelope(&env)
                                .map_err(|e| e.to_string()),
                            "catalog.prestation" => prestations_projection
                                .apply_envelope(&env)
                                .map_err(|e| e.to_string()),
                            "billing.quote" => quotes_projection
                                .apply_envelope(&env)
                                .map_err(|e| e.to_string()),
                            "billing.invoice" => invoices_projection
                                .apply_envelope(&env)
                                .map_err(|e| e.to_string()),
                            _ => Ok(()),
                        };

                        if let Err(e) = apply_ok {
                            warn!("projection apply failed: {e}");
                        }
                    }
                    Err(_) => break,
                }
            }
        });
    }

    let catalog = Arc::new(StaticPlanCatalog::new(default_plan()));
    let usage_gate = UsageGate::new(
        clients_projection.clone(),
        quotes_projection.clone(),
        invoices_projection.clone(),
        prestations_projection.clone(),
        catalog.clone(),
    );

    let allocator = NumberAllocator::new(sequences.clone());
    let conversion = QuoteConversion::new(store.clone(), dispatcher.clone(), sequences);

    let dunning_settings = Arc::new(InMemoryDunningSettings::new());
    let sweep: Arc<AppSweep> = Arc::new(DunningSweep::new(
        dispatcher.clone(),
        invoices_projection.clone(),
        clients_projection.clone(),
        catalog,
        dunning_settings.clone(),
        Arc::new(LogReminderSender),
        Arc::new(LogNotificationSink),
    ));

    // Optional in-process schedule; the cron endpoint remains the primary
    // trigger in the reference deployment.
    let runner = std::env::var("DUNNING_INTERVAL_SECS")
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .map(|secs| {
            let cfg = DunningRunner {
                interval: std::time::Duration::from_secs(secs),
            };
            cfg.spawn("dunning.sweep", sweep.clone())
        });

    AppServices {
        dispatcher,
        clients_projection,
        prestations_projection,
        quotes_projection,
        invoices_projection,
        usage_gate,
        allocator,
        conversion,
        sweep,
        dunning_settings,
        runner: Mutex::new(runner),
    }
}

async fn build_stores() -> (AppEventStore, AppSequences) {
    let use_persistent = std::env::var("USE_PERSISTENT_STORES")
        .unwrap_or_else(|_| "false".to_string())
        .parse::<bool>()
        .unwrap_or(false);

    if use_persistent {
        #[cfg(feature = "postgres")]
        {
            return build_postgres_stores().await;
        }
        #[cfg(not(feature = "postgres"))]
        {
            warn!("USE_PERSISTENT_STORES=true but postgres feature not enabled, falling back to in-memory");
        }
    }

    let store: AppEventStore = Arc::new(InMemoryEventStore::new());
    let sequences: AppSequences = Arc::new(InMemorySequenceStore::new());
    (store, sequences)
}

#[cfg(feature = "postgres")]
async fn build_postgres_stores() -> (AppEventStore, AppSequences) {
    use facturier_infra::event_store::PostgresEventStore;
    use facturier_infra::sequences::PostgresSequenceStore;

    let database_url = std::env::var("DATABASE_URL")
        .expect("DATABASE_URL must be set when USE_PERSISTENT_STORES=true");
    let pool = sqlx::PgPool::connect(&database_url)
        .await
        .expect("failed to connect to Postgres");

    let store: AppEventStore = Arc::new(PostgresEventStore::new(pool.clone()));
    let sequences: AppSequences = Arc::new(PostgresSequenceStore::new(pool));
    (store, sequences)
}

fn default_plan() -> PlanLimits {
    match std::env::var("DEFAULT_PLAN").as_deref() {
        Ok("free") => PlanLimits::free(),
        _ => PlanLimits::pro(),
    }
}

impl AppServices {
    pub fn dispatch<A>(
        &self,
        account_id: AccountId,
        aggregate_id: AggregateId,
        aggregate_type: &str,
        command: A::Command,
        make_aggregate: impl FnOnce(AccountId, AggregateId) -> A,
    ) -> Result<Vec<StoredEvent>, DispatchError>
    where
        A: facturier_core::Aggregate<Error = DomainError>,
        A::Event: facturier_events::Event + serde::Serialize + serde::de::DeserializeOwned,
    {
        self.dispatcher.dispatch::<A>(
            account_id,
            aggregate_id,
            aggregate_type,
            command,
            make_aggregate,
        )
    }

    pub fn clients_get(
        &self,
        account_id: AccountId,
        client_id: &ClientId,
    ) -> Option<ClientReadModel> {
        self.clients_projection.get(account_id, client_id)
    }

    pub fn clients_list(&self, account_id: AccountId) -> Vec<ClientReadModel> {
        self.clients_projection.list(account_id)
    }

    pub fn prestations_get(
        &self,
        account_id: AccountId,
        prestation_id: &PrestationId,
    ) -> Option<PrestationReadModel> {
        self.prestations_projection.get(account_id, prestation_id)
    }

    pub fn prestations_list(&self, account_id: AccountId) -> Vec<PrestationReadModel> {
        self.prestations_projection.list(account_id)
    }

    pub fn quotes_get(&self, account_id: AccountId, quote_id: &QuoteId) -> Option<QuoteReadModel> {
        self.quotes_projection.get(account_id, quote_id)
    }

    pub fn quotes_list(&self, account_id: AccountId) -> Vec<QuoteReadModel> {
        self.quotes_projection.list(account_id)
    }

    pub fn invoices_get(
        &self,
        account_id: AccountId,
        invoice_id: &InvoiceId,
    ) -> Option<InvoiceReadModel> {
        self.invoices_projection.get(account_id, invoice_id)
    }

    pub fn invoices_list(&self, account_id: AccountId) -> Vec<InvoiceReadModel> {
        self.invoices_projection.list(account_id)
    }

    /// Usage gate: consulted before each creation route.
    pub fn usage_check(
        &self,
        account_id: AccountId,
        kind: ResourceKind,
    ) -> Result<(), DomainError> {
        self.usage_gate.check(account_id, kind)
    }

    pub fn allocate_number(
        &self,
        account_id: AccountId,
        kind: DocumentKind,
    ) -> Result<String, SequenceError> {
        self.allocator.allocate(account_id, kind)
    }

    pub fn convert_quote(
        &self,
        account_id: AccountId,
        quote_id: QuoteId,
    ) -> Result<InvoiceId, ConversionError> {
        self.conversion.convert(account_id, quote_id, Utc::now())
    }

    /// Run one dunning sweep pass now (cron endpoint).
    pub fn run_dunning_sweep(&self) -> SweepReport {
        self.sweep.run(Utc::now())
    }

    pub fn dunning_settings_for(&self, account_id: AccountId) -> DunningSettings {
        self.dunning_settings.settings_for(account_id)
    }

    pub fn update_dunning_settings(&self, account_id: AccountId, settings: DunningSettings) {
        self.dunning_settings.update(account_id, settings);
    }

    /// Stop the optional background runner (graceful shutdown support).
    pub fn shutdown_runner(&self) {
        if let Ok(mut guard) = self.runner.lock() {
            if let Some(handle) = guard.take() {
                handle.shutdown();
            }
        }
    }
}
