// livisi-core: Live device model between livisi-api and consumers (CLI, automations).

pub mod catalog;
pub mod command;
pub mod config;
pub mod controller;
pub mod error;
pub mod events;
pub mod model;
pub mod store;

// ── Primary re-exports ──────────────────────────────────────────────
pub use catalog::{Catalog, Snapshot, TopologyLoader, TopologySnapshot};
pub use command::{Ack, Command, CommandDispatcher, RampDirection};
pub use config::{ControllerConfig, TlsVerification};
pub use controller::Controller;
pub use error::CoreError;
pub use events::{
    ControllerLink, EventChannel, EventStreamClient, ShcLink, StreamConfig, StreamState,
};
pub use store::{ApplyOutcome, StateStore, StoreChange, Subscription, ValueSource};

// Re-export model types at the crate root for ergonomics.
pub use model::{
    Capability, CapabilityId, CapabilityKind, CapabilityState, ControllerInfo, Device, DeviceId,
    Event, Location, LocationId, PropertyValue, TriggerKind, ValueShape, WriteSpec,
};
