// ── Domain model ──
//
// Types consumers see: devices, capabilities, their values, and the
// events that change them. Built from `livisi-api` wire types by the
// catalog; never deserialized from the controller directly.

pub mod capability;
pub mod device;
pub mod event;
pub mod ids;
pub mod value;

pub use capability::{
    CapabilityKind, MAX_SETPOINT, MIN_SETPOINT, OPERATION_MODES, ValueShape, WriteSpec,
    setpoint_property,
};
pub use device::{
    BATTERY_DEVICE_TYPES, CONTROLLER_DEVICE_TYPES, Capability, ControllerInfo, Device, Location,
};
pub use event::{Event, TriggerKind};
pub use ids::{CapabilityId, DeviceId, LocationId};
pub use value::{CapabilityState, PropertyValue, parse_timestamp};
