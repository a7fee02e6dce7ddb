use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use facturier_core::{AccountId, Aggregate, AggregateId, AggregateRoot, DomainError};
use facturier_events::Event;

/// Prestation identifier (account-scoped via `account_id` fields in events/commands).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PrestationId(pub AggregateId);

impl PrestationId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for PrestationId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Pricing mode of a prestation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PricingMode {
    Hourly,
    Daily,
    Flat,
}

impl PricingMode {
    /// Unit label used when pre-filling a document line.
    pub fn unit_label(&self) -> &'static str {
        match self {
            PricingMode::Hourly => "hour",
            PricingMode::Daily => "day",
            PricingMode::Flat => "unit",
        }
    }
}

/// Prestation status lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrestationStatus {
    Active,
    Retired,
}

/// Aggregate root: Prestation (catalog item).
///
/// A prestation only pre-fills document lines; documents keep their own copy
/// of the description and rate, so retiring a prestation never affects
/// existing quotes or invoices.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prestation {
    id: PrestationId,
    account_id: Option<AccountId>,
    label: String,
    pricing_mode: PricingMode,
    /// Default rate, pre-tax, per pricing unit.
    unit_rate: Decimal,
    /// Default tax rate in percent.
    default_tax_rate: Decimal,
    status: PrestationStatus,
    version: u64,
    created: bool,
}

impl Prestation {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: PrestationId) -> Self {
        Self {
            id,
            account_id: None,
            label: String::new(),
            pricing_mode: PricingMode::Flat,
            unit_rate: Decimal::ZERO,
            default_tax_rate: Decimal::ZERO,
            status: PrestationStatus::Active,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> PrestationId {
        self.id
    }

    pub fn account_id(&self) -> Option<AccountId> {
        self.account_id
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn pricing_mode(&self) -> PricingMode {
        self.pricing_mode
    }

    pub fn unit_rate(&self) -> Decimal {
        self.unit_rate
    }

    pub fn default_tax_rate(&self) -> Decimal {
        self.default_tax_rate
    }

    pub fn status(&self) -> PrestationStatus {
        self.status
    }

    pub fn is_active(&self) -> bool {
        self.status == PrestationStatus::Active
    }
}

impl AggregateRoot for Prestation {
    type Id = PrestationId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: CreatePrestation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatePrestation {
    pub account_id: AccountId,
    pub prestation_id: PrestationId,
    pub label: String,
    pub pricing_mode: PricingMode,
    pub unit_rate: Decimal,
    pub default_tax_rate: Decimal,
    pub occurred_at: DateTime<Utc>,
}

/// Command: UpdatePrestation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdatePrestation {
    pub account_id: AccountId,
    pub prestation_id: PrestationId,
    pub label: Option<String>,
    pub pricing_mode: Option<PricingMode>,
    pub unit_rate: Option<Decimal>,
    pub default_tax_rate: Option<Decimal>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RetirePrestation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetirePrestation {
    pub account_id: AccountId,
    pub prestation_id: PrestationId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PrestationCommand {
    CreatePrestation(CreatePrestation),
    UpdatePrestation(UpdatePrestation),
    RetirePrestation(RetirePrestation),
}

/// Event: PrestationCreated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrestationCreated {
    pub account_id: AccountId,
    pub prestation_id: PrestationId,
    pub label: String,
    pub pricing_mode: PricingMode,
    pub unit_rate: Decimal,
    pub default_tax_rate: Decimal,
    pub occurred_at: DateTime<Utc>,
}

/// Event: PrestationUpdated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrestationUpdated {
    pub account_id: AccountId,
    pub prestation_id: PrestationId,
    pub label: Option<String>,
    pub pricing_mode: Option<PricingMode>,
    pub unit_rate: Option<Decimal>,
    pub default_tax_rate: Option<Decimal>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: PrestationRetired.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrestationRetired {
    pub account_id: AccountId,
    pub prestation_id: PrestationId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PrestationEvent {
    PrestationCreated(PrestationCreated),
    PrestationUpdated(PrestationUpdated),
    PrestationRetired(PrestationRetired),
}

impl Event for PrestationEvent {
    fn event_type(&self) -> &'static str {
        match self {
            PrestationEvent::PrestationCreated(_) => "catalog.prestation.created",
            PrestationEvent::PrestationUpdated(_) => "catalog.prestation.updated",
            PrestationEvent::PrestationRetired(_) => "catalog.prestation.retired",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            PrestationEvent::PrestationCreated(e) => e.occurred_at,
            PrestationEvent::PrestationUpdated(e) => e.occurred_at,
            PrestationEvent::PrestationRetired(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Prestation {
    type Command = PrestationCommand;
    type Event = PrestationEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            PrestationEvent::PrestationCreated(e) => {
                self.id = e.prestation_id;
                self.account_id = Some(e.account_id);
                self.label = e.label.clone();
                self.pricing_mode = e.pricing_mode;
                self.unit_rate = e.unit_rate;
                self.default_tax_rate = e.default_tax_rate;
                self.status = PrestationStatus::Active;
                self.created = true;
            }
            PrestationEvent::PrestationUpdated(e) => {
                if let Some(label) = &e.label {
                    self.label = label.clone();
                }
                if let Some(mode) = e.pricing_mode {
                    self.pricing_mode = mode;
                }
                if let Some(rate) = e.unit_rate {
                    self.unit_rate = rate;
                }
                if let Some(tax) = e.default_tax_rate {
                    self.default_tax_rate = tax;
                }
            }
            PrestationEvent::PrestationRetired(_) => {
                self.status = PrestationStatus::Retired;
            }
        }

        // Deterministic version tracking: +1 per applied event.
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            PrestationCommand::CreatePrestation(cmd) => self.handle_create(cmd),
            PrestationCommand::UpdatePrestation(cmd) => self.handle_update(cmd),
            PrestationCommand::RetirePrestation(cmd) => self.handle_retire(cmd),
        }
    }
}

impl Prestation {
    fn ensure_account(&self, account_id: AccountId) -> Result<(), DomainError> {
        if !self.created {
            return Ok(());
        }
        if self.account_id != Some(account_id) {
            return Err(DomainError::invariant("account mismatch"));
        }
        Ok(())
    }

    fn ensure_prestation_id(&self, prestation_id: PrestationId) -> Result<(), DomainError> {
        if self.id != prestation_id {
            return Err(DomainError::invariant("prestation_id mismatch"));
        }
        Ok(())
    }

    fn validate_rates(rate: Option<Decimal>, tax: Option<Decimal>) -> Result<(), DomainError> {
        if let Some(rate) = rate {
            if rate.is_sign_negative() {
                return Err(DomainError::validation("unit_rate must not be negative"));
            }
        }
        if let Some(tax) = tax {
            if tax.is_sign_negative() {
                return Err(DomainError::validation(
                    "default_tax_rate must not be negative",
                ));
            }
        }
        Ok(())
    }

    fn handle_create(&self, cmd: &CreatePrestation) -> Result<Vec<PrestationEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("prestation already exists"));
        }

        if cmd.label.trim().is_empty() {
            return Err(DomainError::validation("prestation label must not be empty"));
        }
        Self::validate_rates(Some(cmd.unit_rate), Some(cmd.default_tax_rate))?;

        Ok(vec![PrestationEvent::PrestationCreated(PrestationCreated {
            account_id: cmd.account_id,
            prestation_id: cmd.prestation_id,
            label: cmd.label.clone(),
            pricing_mode: cmd.pricing_mode,
            unit_rate: cmd.unit_rate,
            default_tax_rate: cmd.default_tax_rate,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_update(&self, cmd: &UpdatePrestation) -> Result<Vec<PrestationEvent>, DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        self.ensure_account(cmd.account_id)?;
        self.ensure_prestation_id(cmd.prestation_id)?;

        if self.status == PrestationStatus::Retired {
            return Err(DomainError::invariant("cannot update a retired prestation"));
        }

        if let Some(label) = &cmd.label {
            if label.trim().is_empty() {
                return Err(DomainError::validation("prestation label must not be empty"));
            }
        }
        Self::validate_rates(cmd.unit_rate, cmd.default_tax_rate)?;

        Ok(vec![PrestationEvent::PrestationUpdated(PrestationUpdated {
            account_id: cmd.account_id,
            prestation_id: cmd.prestation_id,
            label: cmd.label.clone(),
            pricing_mode: cmd.pricing_mode,
            unit_rate: cmd.unit_rate,
            default_tax_rate: cmd.default_tax_rate,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_retire(&self, cmd: &RetirePrestation) -> Result<Vec<PrestationEvent>, DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        self.ensure_account(cmd.account_id)?;
        self.ensure_prestation_id(cmd.prestation_id)?;

        if self.status == PrestationStatus::Retired {
            return Err(DomainError::conflict("prestation is already retired"));
        }

        Ok(vec![PrestationEvent::PrestationRetired(PrestationRetired {
            account_id: cmd.account_id,
            prestation_id: cmd.prestation_id,
            occurred_at: cmd.occurred_at,
        })])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use facturier_core::AggregateId;
    use rust_decimal_macros::dec;

    fn test_account_id() -> AccountId {
        AccountId::new()
    }

    fn test_prestation_id() -> PrestationId {
        PrestationId::new(AggregateId::new())
    }

    fn create_cmd(account_id: AccountId, prestation_id: PrestationId) -> CreatePrestation {
        CreatePrestation {
            account_id,
            prestation_id,
            label: "Développement logiciel".to_string(),
            pricing_mode: PricingMode::Daily,
            unit_rate: dec!(600.00),
            default_tax_rate: dec!(20),
            occurred_at: Utc::now(),
        }
    }

    #[test]
    fn create_prestation_emits_created_event() {
        let prestation = Prestation::empty(test_prestation_id());
        let account_id = test_account_id();
        let prestation_id = test_prestation_id();

        let events = prestation
            .handle(&PrestationCommand::CreatePrestation(create_cmd(
                account_id,
                prestation_id,
            )))
            .unwrap();
        assert_eq!(events.len(), 1);

        match &events[0] {
            PrestationEvent::PrestationCreated(e) => {
                assert_eq!(e.pricing_mode, PricingMode::Daily);
                assert_eq!(e.unit_rate, dec!(600.00));
            }
            _ => panic!("Expected PrestationCreated event"),
        }
    }

    #[test]
    fn negative_rate_is_rejected() {
        let prestation = Prestation::empty(test_prestation_id());
        let mut cmd = create_cmd(test_account_id(), test_prestation_id());
        cmd.unit_rate = dec!(-1);

        let err = prestation
            .handle(&PrestationCommand::CreatePrestation(cmd))
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn retired_prestation_rejects_updates() {
        let mut prestation = Prestation::empty(test_prestation_id());
        let account_id = test_account_id();
        let prestation_id = test_prestation_id();

        let events = prestation
            .handle(&PrestationCommand::CreatePrestation(create_cmd(
                account_id,
                prestation_id,
            )))
            .unwrap();
        prestation.apply(&events[0]);

        let events = prestation
            .handle(&PrestationCommand::RetirePrestation(RetirePrestation {
                account_id,
                prestation_id,
                occurred_at: Utc::now(),
            }))
            .unwrap();
        prestation.apply(&events[0]);
        assert!(!prestation.is_active());

        let err = prestation
            .handle(&PrestationCommand::UpdatePrestation(UpdatePrestation {
                account_id,
                prestation_id,
                label: Some("Autre".to_string()),
                pricing_mode: None,
                unit_rate: None,
                default_tax_rate: None,
                occurred_at: Utc::now(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
    }

    #[test]
    fn pricing_mode_maps_to_unit_label() {
        assert_eq!(PricingMode::Hourly.unit_label(), "hour");
        assert_eq!(PricingMode::Daily.unit_label(), "day");
        assert_eq!(PricingMode::Flat.unit_label(), "unit");
    }
}
