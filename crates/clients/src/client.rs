use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use facturier_core::{AccountId, Aggregate, AggregateId, AggregateRoot, DomainError};
use facturier_events::Event;

/// Client identifier (account-scoped via `account_id` fields in events/commands).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientId(pub AggregateId);

impl ClientId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for ClientId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Client kind: private individual or registered company.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClientKind {
    Individual,
    Company,
}

/// Client status lifecycle.
///
/// Archiving is the only retirement path; clients are never physically
/// deleted while documents reference them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClientStatus {
    Active,
    Archived,
}

/// Contact information for a client.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactDetails {
    pub email: Option<String>,
    pub phone: Option<String>,
}

/// Postal billing address.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillingAddress {
    pub street: Option<String>,
    pub postal_code: Option<String>,
    pub city: Option<String>,
    pub country: Option<String>,
}

/// Tax registration fields (both optional for individuals).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaxRegistration {
    pub siret: Option<String>,
    pub vat_number: Option<String>,
}

/// Default payment term when none is configured on a client.
pub const DEFAULT_PAYMENT_TERMS_DAYS: u32 = 30;

/// Aggregate root: Client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Client {
    id: ClientId,
    account_id: Option<AccountId>,
    kind: ClientKind,
    name: String,
    contact: ContactDetails,
    billing_address: BillingAddress,
    tax: TaxRegistration,
    /// Default offset applied to invoice due dates, in days.
    payment_terms_days: u32,
    status: ClientStatus,
    version: u64,
    created: bool,
}

impl Client {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: ClientId) -> Self {
        Self {
            id,
            account_id: None,
            kind: ClientKind::Individual,
            name: String::new(),
            contact: ContactDetails::default(),
            billing_address: BillingAddress::default(),
            tax: TaxRegistration::default(),
            payment_terms_days: DEFAULT_PAYMENT_TERMS_DAYS,
            status: ClientStatus::Active,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> ClientId {
        self.id
    }

    pub fn account_id(&self) -> Option<AccountId> {
        self.account_id
    }

    pub fn kind(&self) -> ClientKind {
        self.kind
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn contact(&self) -> &ContactDetails {
        &self.contact
    }

    pub fn billing_address(&self) -> &BillingAddress {
        &self.billing_address
    }

    pub fn tax(&self) -> &TaxRegistration {
        &self.tax
    }

    pub fn payment_terms_days(&self) -> u32 {
        self.payment_terms_days
    }

    pub fn status(&self) -> ClientStatus {
        self.status
    }

    /// Archived clients cannot be the counterparty of new documents.
    pub fn can_be_billed(&self) -> bool {
        self.status == ClientStatus::Active
    }

    /// Whether documents for this client can be sent by email.
    pub fn has_billing_email(&self) -> bool {
        self.contact
            .email
            .as_deref()
            .is_some_and(|e| e.contains('@'))
    }
}

impl AggregateRoot for Client {
    type Id = ClientId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: RegisterClient.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterClient {
    pub account_id: AccountId,
    pub client_id: ClientId,
    pub kind: ClientKind,
    pub name: String,
    pub contact: Option<ContactDetails>,
    pub billing_address: Option<BillingAddress>,
    pub tax: Option<TaxRegistration>,
    pub payment_terms_days: Option<u32>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: UpdateClientDetails.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateClientDetails {
    pub account_id: AccountId,
    pub client_id: ClientId,
    /// Optional new name (if None, keep existing).
    pub name: Option<String>,
    pub contact: Option<ContactDetails>,
    pub billing_address: Option<BillingAddress>,
    pub tax: Option<TaxRegistration>,
    pub payment_terms_days: Option<u32>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ArchiveClient.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveClient {
    pub account_id: AccountId,
    pub client_id: ClientId,
    pub reason: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClientCommand {
    RegisterClient(RegisterClient),
    UpdateClientDetails(UpdateClientDetails),
    ArchiveClient(ArchiveClient),
}

/// Event: ClientRegistered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientRegistered {
    pub account_id: AccountId,
    pub client_id: ClientId,
    pub kind: ClientKind,
    pub name: String,
    pub contact: ContactDetails,
    pub billing_address: BillingAddress,
    pub tax: TaxRegistration,
    pub payment_terms_days: u32,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ClientDetailsUpdated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientDetailsUpdated {
    pub account_id: AccountId,
    pub client_id: ClientId,
    pub name: Option<String>,
    pub contact: Option<ContactDetails>,
    pub billing_address: Option<BillingAddress>,
    pub tax: Option<TaxRegistration>,
    pub payment_terms_days: Option<u32>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ClientArchived.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientArchived {
    pub account_id: AccountId,
    pub client_id: ClientId,
    pub reason: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClientEvent {
    ClientRegistered(ClientRegistered),
    ClientDetailsUpdated(ClientDetailsUpdated),
    ClientArchived(ClientArchived),
}

impl Event for ClientEvent {
    fn event_type(&self) -> &'static str {
        match self {
            ClientEvent::ClientRegistered(_) => "clients.client.registered",
            ClientEvent::ClientDetailsUpdated(_) => "clients.client.details_updated",
            ClientEvent::ClientArchived(_) => "clients.client.archived",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            ClientEvent::ClientRegistered(e) => e.occurred_at,
            ClientEvent::ClientDetailsUpdated(e) => e.occurred_at,
            ClientEvent::ClientArchived(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Client {
    type Command = ClientCommand;
    type Event = ClientEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            ClientEvent::ClientRegistered(e) => {
                self.id = e.client_id;
                self.account_id = Some(e.account_id);
                self.kind = e.kind;
                self.name = e.name.clone();
                self.contact = e.contact.clone();
                self.billing_address = e.billing_address.clone();
                self.tax = e.tax.clone();
                self.payment_terms_days = e.payment_terms_days;
                self.status = ClientStatus::Active;
                self.created = true;
            }
            ClientEvent::ClientDetailsUpdated(e) => {
                if let Some(name) = &e.name {
                    self.name = name.clone();
                }
                if let Some(contact) = &e.contact {
                    self.contact = contact.clone();
                }
                if let Some(address) = &e.billing_address {
                    self.billing_address = address.clone();
                }
                if let Some(tax) = &e.tax {
                    self.tax = tax.clone();
                }
                if let Some(days) = e.payment_terms_days {
                    self.payment_terms_days = days;
                }
            }
            ClientEvent::ClientArchived(_) => {
                self.status = ClientStatus::Archived;
            }
        }

        // Deterministic version tracking: +1 per applied event.
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            ClientCommand::RegisterClient(cmd) => self.handle_register(cmd),
            ClientCommand::UpdateClientDetails(cmd) => self.handle_update(cmd),
            ClientCommand::ArchiveClient(cmd) => self.handle_archive(cmd),
        }
    }
}

impl Client {
    fn ensure_account(&self, account_id: AccountId) -> Result<(), DomainError> {
        if !self.created {
            return Ok(());
        }
        if self.account_id != Some(account_id) {
            return Err(DomainError::invariant("account mismatch"));
        }
        Ok(())
    }

    fn ensure_client_id(&self, client_id: ClientId) -> Result<(), DomainError> {
        if self.id != client_id {
            return Err(DomainError::invariant("client_id mismatch"));
        }
        Ok(())
    }

    fn handle_register(&self, cmd: &RegisterClient) -> Result<Vec<ClientEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("client already exists"));
        }

        if cmd.name.trim().is_empty() {
            return Err(DomainError::validation("client name must not be empty"));
        }

        if let Some(contact) = &cmd.contact {
            if let Some(email) = contact.email.as_deref() {
                if !email.contains('@') {
                    return Err(DomainError::validation("client email is not valid"));
                }
            }
        }

        Ok(vec![ClientEvent::ClientRegistered(ClientRegistered {
            account_id: cmd.account_id,
            client_id: cmd.client_id,
            kind: cmd.kind,
            name: cmd.name.clone(),
            contact: cmd.contact.clone().unwrap_or_default(),
            billing_address: cmd.billing_address.clone().unwrap_or_default(),
            tax: cmd.tax.clone().unwrap_or_default(),
            payment_terms_days: cmd.payment_terms_days.unwrap_or(DEFAULT_PAYMENT_TERMS_DAYS),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_update(&self, cmd: &UpdateClientDetails) -> Result<Vec<ClientEvent>, DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        self.ensure_account(cmd.account_id)?;
        self.ensure_client_id(cmd.client_id)?;

        if self.status == ClientStatus::Archived {
            return Err(DomainError::invariant("cannot update an archived client"));
        }

        if let Some(name) = &cmd.name {
            if name.trim().is_empty() {
                return Err(DomainError::validation("client name must not be empty"));
            }
        }

        if let Some(contact) = &cmd.contact {
            if let Some(email) = contact.email.as_deref() {
                if !email.contains('@') {
                    return Err(DomainError::validation("client email is not valid"));
                }
            }
        }

        Ok(vec![ClientEvent::ClientDetailsUpdated(
            ClientDetailsUpdated {
                account_id: cmd.account_id,
                client_id: cmd.client_id,
                name: cmd.name.clone(),
                contact: cmd.contact.clone(),
                billing_address: cmd.billing_address.clone(),
                tax: cmd.tax.clone(),
                payment_terms_days: cmd.payment_terms_days,
                occurred_at: cmd.occurred_at,
            },
        )])
    }

    fn handle_archive(&self, cmd: &ArchiveClient) -> Result<Vec<ClientEvent>, DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        self.ensure_account(cmd.account_id)?;
        self.ensure_client_id(cmd.client_id)?;

        if self.status == ClientStatus::Archived {
            return Err(DomainError::conflict("client is already archived"));
        }

        Ok(vec![ClientEvent::ClientArchived(ClientArchived {
            account_id: cmd.account_id,
            client_id: cmd.client_id,
            reason: cmd.reason.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }
}
