//! `facturier-catalog` — reusable service definitions (prestations).

pub mod prestation;

pub use prestation::{
    CreatePrestation, Prestation, PrestationCommand, PrestationCreated, PrestationEvent,
    PrestationId, PrestationRetired, PrestationStatus, PrestationUpdated, PricingMode,
    RetirePrestation, UpdatePrestation,
};
