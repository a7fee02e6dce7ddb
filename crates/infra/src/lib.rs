//! Infrastructure layer: event store, dispatcher, counters, read models,
//! projections and the dunning sweep.

pub mod command_dispatcher;
pub mod conversion;
pub mod dunning;
pub mod event_store;
pub mod projections;
pub mod read_model;
pub mod sequences;
pub mod usage;

pub use command_dispatcher::{CommandDispatcher, DispatchError};
pub use conversion::{ConversionError, QuoteConversion};
pub use dunning::{
    DunningRunner, DunningRunnerHandle, DunningSettingsStore, DunningSweep,
    InMemoryDunningSettings, NotificationSink, ReminderDelivery, ReminderSender, SweepReport,
    SweepTask,
};
pub use event_store::{EventStore, EventStoreError, InMemoryEventStore, StoredEvent, UncommittedEvent};
pub use sequences::{InMemorySequenceStore, NumberAllocator, SequenceError, SequenceStore};
pub use usage::UsageGate;
