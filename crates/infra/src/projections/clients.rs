use serde_json::Value as JsonValue;

use facturier_clients::{BillingAddress, ClientEvent, ClientId, ClientKind, ClientStatus, ContactDetails, TaxRegistration};
use facturier_core::AccountId;
use facturier_events::EventEnvelope;

use crate::projections::cursor::{ProjectionError, StreamCursors};
use crate::read_model::AccountStore;

pub const CLIENT_AGGREGATE_TYPE: &str = "clients.client";

/// Read model for clients.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientReadModel {
    pub client_id: ClientId,
    pub kind: ClientKind,
    pub name: String,
    pub contact: ContactDetails,
    pub billing_address: BillingAddress,
    pub tax: TaxRegistration,
    pub payment_terms_days: u32,
    pub status: ClientStatus,
}

/// Clients projection: maintains the client directory per account.
#[derive(Debug)]
pub struct ClientsProjection<S>
where
    S: AccountStore<ClientId, ClientReadModel>,
{
    store: S,
    cursors: StreamCursors,
}

impl<S> ClientsProjection<S>
where
    S: AccountStore<ClientId, ClientReadModel>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            cursors: StreamCursors::new(),
        }
    }

    pub fn get(&self, account_id: AccountId, client_id: &ClientId) -> Option<ClientReadModel> {
        self.store.get(account_id, client_id)
    }

    pub fn list(&self, account_id: AccountId) -> Vec<ClientReadModel> {
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
        if envelope.aggregate_type() != CLIENT_AGGREGATE_TYPE {
            return Ok(());
        }

        let account_id = envelope.account_id();
        let aggregate_id = envelope.aggregate_id();
        let seq = envelope.sequence_number();

        if !self.cursors.admit(account_id, aggregate_id, seq)? {
            return Ok(());
        }

        let ev: ClientEvent = serde_json::from_value(envelope.payload().clone())
            .map_err(|e| ProjectionError::Deserialize(e.to_string()))?;

        let (event_account, client_id) = match &ev {
            ClientEvent::ClientRegistered(e) => (e.account_id, e.client_id),
            ClientEvent::ClientDetailsUpdated(e) => (e.account_id, e.client_id),
            ClientEvent::ClientArchived(e) => (e.account_id, e.client_id),
        };

        if event_account != account_id {
            return Err(ProjectionError::AccountIsolation(
                "event account_id does not match envelope account_id".to_string(),
            ));
        }
        if client_id.0 != aggregate_id {
            return Err(ProjectionError::AccountIsolation(
                "event client_id does not match envelope aggregate_id".to_string(),
            ));
        }

        match ev {
            ClientEvent::ClientRegistered(e) => {
                self.store.upsert(
                    account_id,
                    e.client_id,
                    ClientReadModel {
                        client_id: e.client_id,
                        kind: e.kind,
                        name: e.name,
                        contact: e.contact,
                        billing_address: e.billing_address,
                        tax: e.tax,
                        payment_terms_days: e.payment_terms_days,
                        status: ClientStatus::Active,
                    },
                );
            }
            ClientEvent::ClientDetailsUpdated(e) => {
                if let Some(mut rm) = self.store.get(account_id, &e.client_id) {
                    if let Some(name) = e.name {
                        rm.name = name;
                    }
                    if let Some(contact) = e.contact {
                        rm.contact = contact;
                    }
                    if let Some(address) = e.billing_address {
                        rm.billing_address = address;
                    }
                    if let Some(tax) = e.tax {
                        rm.tax = tax;
                    }
                    if let Some(days) = e.payment_terms_days {
                        rm.payment_terms_days = days;
                    }
                    self.store.upsert(account_id, e.client_id, rm);
                }
            }
            ClientEvent::ClientArchived(e) => {
                if let Some(mut rm) = self.store.get(account_id, &e.client_id) {
                    rm.status = ClientStatus::Archived;
                    self.store.upsert(account_id, e.client_id, rm);
                }
            }
        }

        self.cursors.advance(account_id, aggregate_id, seq);
        Ok(())
    }
}
