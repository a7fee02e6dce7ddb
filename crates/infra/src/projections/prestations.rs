use rust_decimal::Decimal;
use serde_json::Value as JsonValue;

use facturier_catalog::{PrestationEvent, PrestationId, PrestationStatus, PricingMode};
use facturier_core::AccountId;
use facturier_events::EventEnvelope;

use crate::projections::cursor::{ProjectionError, StreamCursors};
use crate::read_model::AccountStore;

pub const PRESTATION_AGGREGATE_TYPE: &str = "catalog.prestation";

/// Read model for catalog prestations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrestationReadModel {
    pub prestation_id: PrestationId,
    pub label: String,
    pub pricing_mode: PricingMode,
    pub unit_rate: Decimal,
    pub default_tax_rate: Decimal,
    pub status: PrestationStatus,
}

/// Prestations projection: maintains the catalog per account.
#[derive(Debug)]
pub struct PrestationsProjection<S>
where
    S: AccountStore<PrestationId, PrestationReadModel>,
{
    store: S,
    cursors: StreamCursors,
}

impl<S> PrestationsProjection<S>
where
    S: AccountStore<PrestationId, PrestationReadModel>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            cursors: StreamCursors::new(),
        }
    }

    pub fn get(
        &self,
        account_id: AccountId,
        prestation_id: &PrestationId,
    ) -> Option<PrestationReadModel> {
        self.store.get(account_id, prestation_id)
    }

    pub fn list(&self, account_id: AccountId) -> Vec<PrestationReadModel> {
        self.store.list(account_id)
    }

    pub fn count(&self, account_id: AccountId) -> u32 {
        self.store.list(account_id).len() as u32
    }

    /// Apply an envelope into the read model (idempotent).
    pub fn apply_envelope(
        &self,
        envelope: &EventEnvelope<JsonValue>,
    ) -> Result<(), ProjectionError> {
        if envelope.aggregate_type() != PRESTATION_AGGREGATE_TYPE {
            return Ok(());
        }

        let account_id = envelope.account_id();
        let aggregate_id = envelope.aggregate_id();
        let seq = envelope.sequence_number();

        if !self.cursors.admit(account_id, aggregate_id, seq)? {
            return Ok(());
        }

        let ev: PrestationEvent = serde_json::from_value(envelope.payload().clone())
            .map_err(|e| ProjectionError::Deserialize(e.to_string()))?;

        let (event_account, prestation_id) = match &ev {
            PrestationEvent::PrestationCreated(e) => (e.account_id, e.prestation_id),
            PrestationEvent::PrestationUpdated(e) => (e.account_id, e.prestation_id),
            PrestationEvent::PrestationRetired(e) => (e.account_id, e.prestation_id),
        };

        if event_account != account_id {
            return Err(ProjectionError::AccountIsolation(
                "event account_id does not match envelope account_id".to_string(),
            ));
        }
        if prestation_id.0 != aggregate_id {
            return Err(ProjectionError::AccountIsolation(
                "event prestation_id does not match envelope aggregate_id".to_string(),
            ));
        }

        match ev {
            PrestationEvent::PrestationCreated(e) => {
                self.store.upsert(
                    account_id,
                    e.prestation_id,
                    PrestationReadModel {
                        prestation_id: e.prestation_id,
                        label: e.label,
                        pricing_mode: e.pricing_mode,
                        unit_rate: e.unit_rate,
                        default_tax_rate: e.default_tax_rate,
                        status: PrestationStatus::Active,
                    },
                );
            }
            PrestationEvent::PrestationUpdated(e) => {
                if let Some(mut rm) = self.store.get(account_id, &e.prestation_id) {
                    if let Some(label) = e.label {
                        rm.label = label;
                    }
                    if let Some(mode) = e.pricing_mode {
                        rm.pricing_mode = mode;
                    }
                    if let Some(rate) = e.unit_rate {
                        rm.unit_rate = rate;
                    }
                    if let Some(tax) = e.default_tax_rate {
                        rm.default_tax_rate = tax;
                    }
                    self.store.upsert(account_id, e.prestation_id, rm);
                }
            }
            PrestationEvent::PrestationRetired(e) => {
                if let Some(mut rm) = self.store.get(account_id, &e.prestation_id) {
                    rm.status = PrestationStatus::Retired;
                    self.store.upsert(account_id, e.prestation_id, rm);
                }
            }
        }

        self.cursors.advance(account_id, aggregate_id, seq);
        Ok(())
    }
}
