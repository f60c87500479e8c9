// ── Device, capability and location domain types ──

use chrono::{DateTime, Utc};
use livisi_api::ControllerGeneration;
use serde::Serialize;
use serde_json::{Map, Value};

use super::capability::{CapabilityKind, MAX_SETPOINT, MIN_SETPOINT};
use super::ids::{CapabilityId, DeviceId, LocationId};

/// Device types that report `SHC`/`SHCA` are the controller itself.
pub const CONTROLLER_DEVICE_TYPES: &[&str] = &["SHC", "SHCA"];

/// Device types that run on batteries and report low battery via messages.
pub const BATTERY_DEVICE_TYPES: &[&str] = &[
    "BRC8", "ISC2", "RST", "RST2", "WDS", "WMD", "WMDO", "WSD", "WSD2", "SIR", "WRT", "BT-WDS",
    "BT-WS",
];

/// A physical device paired with the controller (the controller included).
#[derive(Debug, Clone, Serialize)]
pub struct Device {
    pub id: DeviceId,
    /// `config.name`, falling back to the device type.
    pub name: String,
    pub device_type: String,
    pub manufacturer: Option<String>,
    pub version: Option<String>,
    pub product: Option<String>,
    pub serial_number: Option<String>,
    pub class: Option<String>,
    /// `tags.typeCategory`, e.g. `TCDoorId`.
    pub tag_category: Option<String>,
    pub location_id: Option<LocationId>,
    /// Resolved name of `location_id`.
    pub room: Option<String>,
    pub is_controller: bool,

    // Flags from the message list at load time. Availability at runtime
    // lives in the state store.
    pub available: bool,
    pub battery_low: bool,
    pub update_available: bool,
    pub recently_updated: bool,

    pub capability_ids: Vec<CapabilityId>,
}

impl Device {
    pub fn is_battery_powered(&self) -> bool {
        BATTERY_DEVICE_TYPES.contains(&self.device_type.as_str())
    }
}

/// The smallest controllable or observable unit.
#[derive(Debug, Clone, Serialize)]
pub struct Capability {
    pub id: CapabilityId,
    pub kind: CapabilityKind,
    /// Vendor type string, e.g. `DimmerActuator`. Synthetic kinds carry
    /// their slug.
    pub raw_type: String,
    pub device_id: DeviceId,
    pub config: Map<String, Value>,
    /// Linked capabilities present in the catalog.
    pub links: Vec<CapabilityId>,
    /// Linked capabilities the controller named but did not list. Retried
    /// on the next reload.
    pub deferred_links: Vec<CapabilityId>,
}

impl Capability {
    /// `config.name`, if the controller set one.
    pub fn name(&self) -> Option<&str> {
        self.config.get("name").and_then(Value::as_str)
    }

    /// Setpoint bounds: `config.minTemperature`/`maxTemperature`, else 6..30 °C.
    pub fn setpoint_range(&self) -> (f64, f64) {
        let bound = |key: &str, default: f64| {
            self.config
                .get(key)
                .and_then(|v| v.as_f64().or_else(|| v.as_str().and_then(|s| s.parse().ok())))
                .unwrap_or(default)
        };
        (
            bound("minTemperature", MIN_SETPOINT),
            bound("maxTemperature", MAX_SETPOINT),
        )
    }
}

/// A room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Location {
    pub id: LocationId,
    pub name: String,
}

/// Identity of the controller this session talks to.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ControllerInfo {
    /// Device id of the SHC in the device list, if it lists itself.
    pub device_id: Option<DeviceId>,
    pub generation: ControllerGeneration,
    pub controller_type: Option<String>,
    pub serial_number: Option<String>,
    pub os_version: Option<String>,
    pub loaded_at: Option<DateTime<Utc>>,
}
