//! Dunning: the periodic sweep that escalates overdue-invoice reminders.
//!
//! The tier rules themselves are pure functions in `facturier-billing`; this
//! module owns the batch mechanics: candidate scanning, external delivery,
//! per-invoice failure isolation and the interval runner.

pub mod runner;
pub mod sweep;

pub use runner::{DunningRunner, DunningRunnerHandle, SweepTask};
pub use sweep::{
    DunningSettingsStore, DunningSweep, InMemoryDunningSettings, NotificationSink,
    ReminderDelivery, ReminderSender, SweepReport,
};
