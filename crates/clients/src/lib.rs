//! `facturier-clients` — billable counterparties.

pub mod client;

pub use client::{
    ArchiveClient, BillingAddress, Client, ClientArchived, ClientCommand, ClientDetailsUpdated,
    ClientEvent, ClientId, ClientKind, ClientRegistered, ClientStatus, ContactDetails,
    RegisterClient, TaxRegistration, UpdateClientDetails,
};
