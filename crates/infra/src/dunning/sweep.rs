use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tracing::{info, warn};

use facturier_billing::{
    DunningSettings, DunningSnapshot, Invoice, InvoiceCommand, InvoiceId, MAX_REMINDER_TIER,
    RecordReminder, ReminderTier, next_eligible_tier,
};
use facturier_clients::ClientId;
use facturier_core::{AccountId, AggregateId};
use facturier_events::{EventBus, EventEnvelope};
use facturier_plans::PlanCatalog;

use crate::command_dispatcher::CommandDispatcher;
use crate::event_store::EventStore;
use crate::projections::{
    ClientReadModel, ClientsProjection, InvoiceReadModel, InvoicesProjection,
};
use crate::read_model::AccountStore;

pub const INVOICE_AGGREGATE_TYPE: &str = "billing.invoice";

/// A reminder ready for delivery by the external email collaborator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReminderDelivery {
    pub account_id: AccountId,
    pub invoice_id: InvoiceId,
    pub invoice_number: String,
    pub recipient_email: String,
    pub tier: ReminderTier,
    pub amount_due: Decimal,
    pub due_date: NaiveDate,
}

/// Outbound reminder delivery (external collaborator).
pub trait ReminderSender: Send + Sync {
    /// Deliver a reminder; `Ok` means confirmed handoff to the mail system.
    fn send(&self, delivery: &ReminderDelivery) -> Result<(), String>;
}

/// Internal notification record creation (external collaborator).
pub trait NotificationSink: Send + Sync {
    fn notify(&self, account_id: AccountId, message: &str);
}

/// Per-account dunning settings storage.
pub trait DunningSettingsStore: Send + Sync {
    fn settings_for(&self, account_id: AccountId) -> DunningSettings;
    fn update(&self, account_id: AccountId, settings: DunningSettings);
}

/// In-memory settings store; accounts without explicit settings get the
/// defaults (all tiers enabled).
#[derive(Debug, Default)]
pub struct InMemoryDunningSettings {
    inner: RwLock<HashMap<AccountId, DunningSettings>>,
}

impl InMemoryDunningSettings {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DunningSettingsStore for InMemoryDunningSettings {
    fn settings_for(&self, account_id: AccountId) -> DunningSettings {
        match self.inner.read() {
            Ok(map) => map.get(&account_id).cloned().unwrap_or_default(),
            Err(_) => DunningSettings::default(),
        }
    }

    fn update(&self, account_id: AccountId, settings: DunningSettings) {
        if let Ok(mut map) = self.inner.write() {
            map.insert(account_id, settings);
        }
    }
}

/// Outcome counts of one sweep execution.
///
/// Individual failures go to logging/notifications, never to the caller.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepReport {
    /// Reminders sent, indexed by tier (index 0 = tier 1).
    pub sent_per_tier: [u32; MAX_REMINDER_TIER as usize],
    /// Candidates gated off (settings, plan, age or spacing thresholds).
    pub skipped: u32,
    /// Candidates that failed (missing email, delivery error, data error).
    pub errored: u32,
}

impl SweepReport {
    pub fn total_sent(&self) -> u32 {
        self.sent_per_tier.iter().sum()
    }
}

/// The periodic sweep over all overdue invoices.
///
/// Each invoice is processed independently: one failure is counted and
/// logged, never propagated, so the rest of the batch always makes progress.
/// There is no run ledger — re-running is safe because the per-invoice
/// spacing check blocks double-sends.
pub struct DunningSweep<S, B, IS, CS, Cat>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
    IS: AccountStore<InvoiceId, InvoiceReadModel>,
    CS: AccountStore<ClientId, ClientReadModel>,
    Cat: PlanCatalog,
{
    dispatcher: Arc<CommandDispatcher<S, B>>,
    invoices: Arc<InvoicesProjection<IS>>,
    clients: Arc<ClientsProjection<CS>>,
    catalog: Arc<Cat>,
    settings: Arc<dyn DunningSettingsStore>,
    sender: Arc<dyn ReminderSender>,
    notifications: Arc<dyn NotificationSink>,
}

impl<S, B, IS, CS, Cat> DunningSweep<S, B, IS, CS, Cat>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
    IS: AccountStore<InvoiceId, InvoiceReadModel>,
    CS: AccountStore<ClientId, ClientReadModel>,
    Cat: PlanCatalog,
{
    pub fn new(
        dispatcher: Arc<CommandDispatcher<S, B>>,
        invoices: Arc<InvoicesProjection<IS>>,
        clients: Arc<ClientsProjection<CS>>,
        catalog: Arc<Cat>,
        settings: Arc<dyn DunningSettingsStore>,
        sender: Arc<dyn ReminderSender>,
        notifications: Arc<dyn NotificationSink>,
    ) -> Self {
        Self {
            dispatcher,
            invoices,
            clients,
            catalog,
            settings,
            sender,
            notifications,
        }
    }

    /// Run one sweep over all accounts; never fails as a whole.
    pub fn run(&self, now: DateTime<Utc>) -> SweepReport {
        let today = now.date_naive();
        let mut report = SweepReport::default();

        for account_id in self.invoices.accounts() {
            let plan = self.catalog.plan_for(account_id);
            let settings = self.settings.settings_for(account_id);

            for rm in self.invoices.list(account_id) {
                if !rm.status.allows_reminder() {
                    continue;
                }
                if rm.reminder_count >= MAX_REMINDER_TIER {
                    continue;
                }
                if (today - rm.due_date).num_days() < 1 {
                    continue;
                }

                // Plan entitlement and the account master switch gate the
                // whole account; per-tier thresholds gate each invoice.
                if !plan.auto_dunning || !settings.auto_enabled {
                    report.skipped += 1;
                    continue;
                }

                let snapshot = DunningSnapshot {
                    status: rm.status,
                    due_date: rm.due_date,
                    reminder_count: rm.reminder_count,
                    last_reminder_at: rm.last_reminder_at,
                };
                let Some(tier) = next_eligible_tier(&snapshot, &settings, today) else {
                    report.skipped += 1;
                    continue;
                };

                match self.process(account_id, &rm, tier, today, now) {
                    Ok(()) => {
                        report.sent_per_tier[(tier.index() - 1) as usize] += 1;
                    }
                    Err(err) => {
                        warn!(
                            account = %account_id,
                            invoice = %rm.invoice_id,
                            tier = tier.index(),
                            error = %err,
                            "dunning reminder failed"
                        );
                        report.errored += 1;
                    }
                }
            }
        }

        info!(
            sent = report.total_sent(),
            skipped = report.skipped,
            errored = report.errored,
            "dunning sweep finished"
        );
        report
    }

    /// Handle a single eligible invoice: deliver, then record.
    ///
    /// The reminder is recorded only on confirmed delivery; a recording
    /// failure after delivery is logged loudly since the next sweep may then
    /// re-send.
    fn process(
        &self,
        account_id: AccountId,
        rm: &InvoiceReadModel,
        tier: ReminderTier,
        today: NaiveDate,
        now: DateTime<Utc>,
    ) -> Result<(), String> {
        let client_id = rm.client_id.ok_or("invoice has no client reference")?;
        let recipient_email = self
            .clients
            .get(account_id, &ClientId::new(client_id))
            .and_then(|c| c.contact.email)
            .ok_or("client has no billing email")?;

        let delivery = ReminderDelivery {
            account_id,
            invoice_id: rm.invoice_id,
            invoice_number: rm.number.clone(),
            recipient_email,
            tier,
            amount_due: rm.amount_due,
            due_date: rm.due_date,
        };
        self.sender.send(&delivery)?;

        let committed = self
            .dispatcher
            .dispatch::<Invoice>(
                account_id,
                rm.invoice_id.0,
                INVOICE_AGGREGATE_TYPE,
                InvoiceCommand::RecordReminder(RecordReminder {
                    account_id,
                    invoice_id: rm.invoice_id,
                    tier,
                    sent_on: today,
                    occurred_at: now,
                }),
                |_a, id: AggregateId| Invoice::empty(InvoiceId::new(id)),
            )
            .map_err(|e| format!("reminder sent but not recorded: {e:?}"))?;

        // Read-your-writes for overlapping runs: fold the committed events
        // into the projection immediately (idempotent, so the bus subscriber
        // re-applying them is harmless).
        for stored in &committed {
            if let Err(e) = self.invoices.apply_envelope(&stored.to_envelope()) {
                warn!(invoice = %rm.invoice_id, error = %e, "projection update after reminder failed");
            }
        }

        self.notifications.notify(
            account_id,
            &format!(
                "reminder tier {} sent for invoice {}",
                tier.index(),
                rm.number
            ),
        );

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event_store::InMemoryEventStore;
    use crate::read_model::InMemoryAccountStore;
    use chrono::Duration;
    use facturier_billing::{CreateInvoice, LineInput, SendInvoice};
    use facturier_clients::{Client, ClientCommand, ClientKind, ContactDetails, RegisterClient};
    use facturier_events::InMemoryEventBus;
    use facturier_plans::{PlanLimits, StaticPlanCatalog};
    use rust_decimal_macros::dec;
    use std::sync::Mutex;

    type Store = Arc<InMemoryEventStore>;
    type Bus = Arc<InMemoryEventBus<EventEnvelope<JsonValue>>>;
    type InvStore = Arc<InMemoryAccountStore<InvoiceId, InvoiceReadModel>>;
    type CliStore = Arc<InMemoryAccountStore<ClientId, ClientReadModel>>;

    #[derive(Default)]
    struct StubSender {
        deliveries: Mutex<Vec<ReminderDelivery>>,
        fail: std::sync::atomic::AtomicBool,
    }

    impl StubSender {
        fn sent(&self) -> Vec<ReminderDelivery> {
            self.deliveries.lock().unwrap().clone()
        }

        fn set_fail(&self, fail: bool) {
            self.fail.store(fail, std::sync::atomic::Ordering::SeqCst);
        }
    }

    impl ReminderSender for StubSender {
        fn send(&self, delivery: &ReminderDelivery) -> Result<(), String> {
            if self.fail.load(std::sync::atomic::Ordering::SeqCst) {
                return Err("smtp unavailable".to_string());
            }
            self.deliveries.lock().unwrap().push(delivery.clone());
            Ok(())
        }
    }

    #[derive(Default)]
    struct StubSink {
        messages: Mutex<Vec<(AccountId, String)>>,
    }

    impl NotificationSink for StubSink {
        fn notify(&self, account_id: AccountId, message: &str) {
            self.messages
                .lock()
                .unwrap()
                .push((account_id, message.to_string()));
        }
    }

    struct Fixture {
        dispatcher: Arc<CommandDispatcher<Store, Bus>>,
        invoices: Arc<InvoicesProjection<InvStore>>,
        clients: Arc<ClientsProjection<CliStore>>,
        sender: Arc<StubSender>,
        sink: Arc<StubSink>,
        sweep: DunningSweep<Store, Bus, InvStore, CliStore, StaticPlanCatalog>,
        account_id: AccountId,
        client_id: ClientId,
        now: DateTime<Utc>,
    }

    fn fixture_with_plan(default_plan: PlanLimits) -> Fixture {
        let store: Store = Arc::new(InMemoryEventStore::new());
        let bus: Bus = Arc::new(InMemoryEventBus::new());
        let dispatcher = Arc::new(CommandDispatcher::new(store.clone(), bus.clone()));

        let invoices = Arc::new(InvoicesProjection::new(Arc::new(
            InMemoryAccountStore::new(),
        )));
        let clients = Arc::new(ClientsProjection::new(Arc::new(InMemoryAccountStore::new())));

        let sender = Arc::new(StubSender::default());
        let sink = Arc::new(StubSink::default());
        let settings = Arc::new(InMemoryDunningSettings::new());
        let catalog = Arc::new(StaticPlanCatalog::new(default_plan));

        let sweep = DunningSweep::new(
            dispatcher.clone(),
            invoices.clone(),
            clients.clone(),
            catalog,
            settings,
            sender.clone(),
            sink.clone(),
        );

        let account_id = AccountId::new();
        let client_id = ClientId::new(AggregateId::new());
        let now = Utc::now();

        let f = Fixture {
            dispatcher,
            invoices,
            clients,
            sender,
            sink,
            sweep,
            account_id,
            client_id,
            now,
        };
        register_client(&f);
        f
    }

    fn fixture() -> Fixture {
        fixture_with_plan(PlanLimits::pro())
    }

    fn register_client(f: &Fixture) {
        let committed = f
            .dispatcher
            .dispatch::<Client>(
                f.account_id,
                f.client_id.0,
                "clients.client",
                ClientCommand::RegisterClient(RegisterClient {
                    account_id: f.account_id,
                    client_id: f.client_id,
                    kind: ClientKind::Individual,
                    name: "Paul Martin".to_string(),
                    contact: Some(ContactDetails {
                        email: Some("paul@example.net".to_string()),
                        phone: None,
                    }),
                    billing_address: None,
                    tax: None,
                    payment_terms_days: None,
                    occurred_at: f.now,
                }),
                |_a, id| Client::empty(ClientId::new(id)),
            )
            .unwrap();
        for stored in &committed {
            f.clients.apply_envelope(&stored.to_envelope()).unwrap();
        }
    }

    /// A sent invoice whose due date is `days_overdue` days in the past.
    fn overdue_invoice(f: &Fixture, days_overdue: i64) -> InvoiceId {
        let invoice_id = InvoiceId::new(AggregateId::new());
        let today = f.now.date_naive();
        let committed = f
            .dispatcher
            .dispatch::<Invoice>(
                f.account_id,
                invoice_id.0,
                INVOICE_AGGREGATE_TYPE,
                InvoiceCommand::CreateInvoice(CreateInvoice {
                    account_id: f.account_id,
                    invoice_id,
                    client_id: f.client_id.0,
                    quote_id: None,
                    number: format!("FAC-2026-{:04}", days_overdue),
                    issue_date: today - Duration::days(days_overdue + 30),
                    due_date: today - Duration::days(days_overdue),
                    lines: vec![LineInput {
                        description: "maintenance".to_string(),
                        quantity: dec!(1),
                        unit: None,
                        unit_price: dec!(150.00),
                        tax_rate: dec!(20),
                    }],
                    occurred_at: f.now,
                }),
                |_a, id| Invoice::empty(InvoiceId::new(id)),
            )
            .unwrap();
        let sent = f
            .dispatcher
            .dispatch::<Invoice>(
                f.account_id,
                invoice_id.0,
                INVOICE_AGGREGATE_TYPE,
                InvoiceCommand::SendInvoice(SendInvoice {
                    account_id: f.account_id,
                    invoice_id,
                    occurred_at: f.now,
                }),
                |_a, id| Invoice::empty(InvoiceId::new(id)),
            )
            .unwrap();
        for stored in committed.iter().chain(sent.iter()) {
            f.invoices.apply_envelope(&stored.to_envelope()).unwrap();
        }
        invoice_id
    }

    #[test]
    fn sends_first_tier_and_updates_counters() {
        let f = fixture();
        let invoice_id = overdue_invoice(&f, 3);

        let report = f.sweep.run(f.now);

        assert_eq!(report.sent_per_tier, [1, 0, 0, 0]);
        assert_eq!(report.errored, 0);
        assert_eq!(f.sender.sent().len(), 1);
        assert_eq!(f.sender.sent()[0].tier, ReminderTier::First);

        let rm = f.invoices.get(f.account_id, &invoice_id).unwrap();
        assert_eq!(rm.reminder_count, 1);
        assert_eq!(rm.last_reminder_at, Some(f.now.date_naive()));
        assert_eq!(
            rm.status,
            facturier_billing::InvoiceStatus::Overdue
        );
        assert_eq!(f.sink.messages.lock().unwrap().len(), 1);
    }

    #[test]
    fn immediate_rerun_sends_nothing() {
        let f = fixture();
        overdue_invoice(&f, 3);

        let first = f.sweep.run(f.now);
        assert_eq!(first.total_sent(), 1);

        // The spacing guard blocks the second run; no sweep-run bookkeeping
        // is involved.
        let second = f.sweep.run(f.now);
        assert_eq!(second.total_sent(), 0);
        assert_eq!(second.skipped, 1);
        assert_eq!(f.sender.sent().len(), 1);
    }

    #[test]
    fn plan_without_auto_dunning_skips() {
        let f = fixture_with_plan(PlanLimits::free());
        overdue_invoice(&f, 3);

        let report = f.sweep.run(f.now);
        assert_eq!(report.total_sent(), 0);
        assert_eq!(report.skipped, 1);
        assert!(f.sender.sent().is_empty());
    }

    #[test]
    fn delivery_failure_is_isolated_and_retryable() {
        let f = fixture();
        let invoice_id = overdue_invoice(&f, 3);
        // A second, independent invoice still goes through.
        overdue_invoice(&f, 10);

        f.sender.set_fail(true);
        let report = f.sweep.run(f.now);
        assert_eq!(report.errored, 2);
        assert_eq!(report.total_sent(), 0);

        // Nothing was recorded, so the next run retries.
        let rm = f.invoices.get(f.account_id, &invoice_id).unwrap();
        assert_eq!(rm.reminder_count, 0);

        f.sender.set_fail(false);
        let report = f.sweep.run(f.now);
        assert_eq!(report.total_sent(), 2);
        assert_eq!(report.errored, 0);
    }

    #[test]
    fn not_yet_due_invoices_are_not_candidates() {
        let f = fixture();
        overdue_invoice(&f, 0);

        let report = f.sweep.run(f.now);
        assert_eq!(report.total_sent(), 0);
        assert_eq!(report.skipped, 0);
    }
}
