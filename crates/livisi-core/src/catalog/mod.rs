// ── Topology catalog ──
//
// The devices, capabilities and rooms of one controller, built wholesale
// from a `TopologySnapshot` and never mutated afterwards. A reload builds a
// new catalog and the store swaps it in atomically.

mod loader;

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use livisi_api::{ControllerGeneration, RawDevice, RawMessage};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::model::{
    CONTROLLER_DEVICE_TYPES, Capability, CapabilityId, CapabilityKind, CapabilityState,
    ControllerInfo, Device, DeviceId, Location, LocationId, PropertyValue, parse_timestamp,
};

pub use loader::{Snapshot, TopologyLoader, TopologySnapshot};

/// Default motion off-delay in seconds.
pub const DEFAULT_MOTION_DURATION: f64 = 20.0;

/// Controller device-state keys exposed as synthetic usage capabilities.
/// Older firmware reports `CPULoad`/`memoryLoad`.
const USAGE_KEYS: &[(&str, CapabilityKind)] = &[
    ("cpuUsage", CapabilityKind::CpuUsage),
    ("CPULoad", CapabilityKind::CpuUsage),
    ("memoryUsage", CapabilityKind::MemoryUsage),
    ("memoryLoad", CapabilityKind::MemoryUsage),
    ("diskUsage", CapabilityKind::DiskUsage),
];

/// Capability types that used to be addressed by device id, in the order
/// the first match on a device wins.
const MIGRATION_PREFERENCE: &[&str] = &[
    "SwitchActuator",
    "BooleanStateActuator",
    "WindowDoorSensor",
    "LuminanceSensor",
    "AlarmActuator",
];

const DURATION_SUFFIX: &str = "duration";
const BATTERY_SUFFIX: &str = "battery";

// ── Message flags ────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct MessageFlags {
    low_battery: HashSet<String>,
    update_available: HashSet<String>,
    unreachable: HashSet<String>,
    recently_updated: HashSet<String>,
}

impl MessageFlags {
    fn from_messages(messages: &[RawMessage]) -> Self {
        let mut flags = Self::default();
        for message in messages {
            if message
                .timestamp
                .as_deref()
                .and_then(parse_timestamp)
                .is_none()
            {
                debug!(message_type = %message.message_type, "skipping message without timestamp");
                continue;
            }

            let set = match message.message_type.as_str() {
                "DeviceLowBattery" => &mut flags.low_battery,
                "DeviceUpdateAvailable" => &mut flags.update_available,
                "DeviceUnreachable" => &mut flags.unreachable,
                "ProductUpdated" | "ShcUpdateCompleted" => &mut flags.recently_updated,
                _ => continue,
            };
            set.extend(
                message
                    .device_links()
                    .into_iter()
                    .map(|link| DeviceId::from_link(link).as_str().to_owned()),
            );
        }
        flags
    }
}

// ── Catalog ──────────────────────────────────────────────────────────

/// Immutable topology of one controller.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    controller: ControllerInfo,
    devices: IndexMap<DeviceId, Arc<Device>>,
    capabilities: IndexMap<CapabilityId, Arc<Capability>>,
    locations: IndexMap<LocationId, Location>,
}

impl Catalog {
    /// A catalog with nothing in it, used before the first load.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Join a raw topology snapshot into a catalog.
    ///
    /// Pure: no I/O, never fails. Unknown capability types become
    /// `Unsupported` entries, links to capabilities the controller did not
    /// list are kept as deferred.
    pub fn build(snapshot: &TopologySnapshot) -> Self {
        let flags = MessageFlags::from_messages(&snapshot.messages);
        let generation = snapshot.status.generation();

        let locations: IndexMap<LocationId, Location> = snapshot
            .locations
            .iter()
            .map(|raw| {
                let id = LocationId::new(raw.id.clone());
                let name = raw.name().map_or_else(|| raw.id.clone(), str::to_owned);
                (id.clone(), Location { id, name })
            })
            .collect();

        // Capabilities first: devices list their capability ids, but the
        // authoritative owner is the capability's own `device` link.
        let known_ids: HashSet<&str> = snapshot
            .capabilities
            .iter()
            .map(|c| c.id.as_str())
            .collect();

        let mut capabilities: IndexMap<CapabilityId, Arc<Capability>> = IndexMap::new();
        let mut by_device: HashMap<DeviceId, Vec<CapabilityId>> = HashMap::new();

        for raw in &snapshot.capabilities {
            let Some(device_link) = raw.device.as_deref() else {
                warn!(capability_id = %raw.id, "capability without owning device, skipped");
                continue;
            };
            let id = CapabilityId::new(raw.id.clone());
            let device_id = DeviceId::from_link(device_link);
            let kind = CapabilityKind::from_raw(&raw.capability_type);
            if !kind.is_supported() {
                debug!(capability_id = %id, raw_type = %raw.capability_type, "unsupported capability type");
            }

            let (links, deferred_links) = split_links(&raw.config, &known_ids);
            if !deferred_links.is_empty() {
                debug!(capability_id = %id, deferred = deferred_links.len(), "deferring unknown capability links");
            }

            by_device.entry(device_id.clone()).or_default().push(id.clone());
            capabilities.insert(
                id.clone(),
                Arc::new(Capability {
                    id,
                    kind,
                    raw_type: raw.capability_type.clone(),
                    device_id,
                    config: raw.config.clone(),
                    links,
                    deferred_links,
                }),
            );
        }

        let mut devices: IndexMap<DeviceId, Arc<Device>> = IndexMap::new();
        let mut controller_device: Option<DeviceId> = None;

        for raw in &snapshot.devices {
            let mut device = device_from_raw(raw, &locations, &flags);
            let owned = by_device.remove(&device.id).unwrap_or_default();
            device.capability_ids = owned;

            if device.is_controller {
                controller_device.get_or_insert_with(|| device.id.clone());
                if let Some(state) = snapshot.controller_state.as_ref() {
                    for (key, kind) in USAGE_KEYS {
                        if state.contains_key(*key) {
                            let cap = synthetic(&device.id, key, kind.clone());
                            device.capability_ids.push(cap.id.clone());
                            capabilities.insert(cap.id.clone(), Arc::new(cap));
                        }
                    }
                }
            }

            let has_motion = device.capability_ids.iter().any(|id| {
                capabilities
                    .get(id)
                    .is_some_and(|c| c.kind == CapabilityKind::MotionSensor)
            });
            if has_motion {
                let cap = synthetic(&device.id, DURATION_SUFFIX, CapabilityKind::Duration);
                device.capability_ids.push(cap.id.clone());
                capabilities.insert(cap.id.clone(), Arc::new(cap));
            }
            if device.is_battery_powered() {
                let cap = synthetic(&device.id, BATTERY_SUFFIX, CapabilityKind::BatteryLevel);
                device.capability_ids.push(cap.id.clone());
                capabilities.insert(cap.id.clone(), Arc::new(cap));
            }

            devices.insert(device.id.clone(), Arc::new(device));
        }

        // Capabilities whose device was not listed stay addressable.
        for (device_id, orphans) in by_device {
            debug!(%device_id, count = orphans.len(), "capabilities of unlisted device");
        }

        let controller = ControllerInfo {
            device_id: controller_device,
            generation,
            controller_type: snapshot.status.controller_type.clone(),
            serial_number: snapshot.status.serial_number.clone(),
            os_version: snapshot.status.os_version.clone(),
            loaded_at: Some(snapshot.fetched_at),
        };

        debug!(
            devices = devices.len(),
            capabilities = capabilities.len(),
            locations = locations.len(),
            "catalog built"
        );

        Self {
            controller,
            devices,
            capabilities,
            locations,
        }
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn controller(&self) -> &ControllerInfo {
        &self.controller
    }

    pub fn generation(&self) -> ControllerGeneration {
        self.controller.generation
    }

    pub fn device(&self, id: &str) -> Option<&Arc<Device>> {
        self.devices.get(id)
    }

    pub fn capability(&self, id: &str) -> Option<&Arc<Capability>> {
        self.capabilities.get(id)
    }

    pub fn location(&self, id: &str) -> Option<&Location> {
        self.locations.get(id)
    }

    pub fn devices(&self) -> impl Iterator<Item = &Arc<Device>> {
        self.devices.values()
    }

    pub fn capabilities(&self) -> impl Iterator<Item = &Arc<Capability>> {
        self.capabilities.values()
    }

    pub fn locations(&self) -> impl Iterator<Item = &Location> {
        self.locations.values()
    }

    pub fn device_count(&self) -> usize {
        self.devices.len()
    }

    pub fn capability_count(&self) -> usize {
        self.capabilities.len()
    }

    /// Capabilities owned by a device, in catalog order.
    pub fn capabilities_of(&self, device_id: &str) -> Vec<Arc<Capability>> {
        self.devices
            .get(device_id)
            .map(|d| {
                d.capability_ids
                    .iter()
                    .filter_map(|id| self.capabilities.get(id).cloned())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// The thermostat actuator a room setpoint drives its mode through: the
    /// first resolved link of kind `Thermostat`.
    pub fn linked_thermostat(&self, setpoint_id: &str) -> Option<&Arc<Capability>> {
        self.capabilities
            .get(setpoint_id)?
            .links
            .iter()
            .filter_map(|id| self.capabilities.get(id))
            .find(|c| c.kind == CapabilityKind::Thermostat)
    }

    /// Availability according to the message list at load time. Unknown
    /// devices count as available.
    pub fn initially_available(&self, device_id: &str) -> bool {
        self.devices.get(device_id).is_none_or(|d| d.available)
    }

    /// Map a legacy unique id onto a capability id.
    ///
    /// Accepts current capability ids, capability links, bare device ids
    /// (resolved to the device's first capability of a preferred type), and
    /// `<device-id>_<suffix>` ids of synthetic capabilities (a trailing
    /// `_number` is dropped first).
    pub fn migrate_unique_id(&self, legacy: &str) -> Option<CapabilityId> {
        let legacy = legacy.strip_suffix("_number").unwrap_or(legacy);
        let bare = legacy.strip_prefix("/capability/").unwrap_or(legacy);

        if self.capabilities.contains_key(bare) {
            return Some(CapabilityId::new(bare));
        }

        if let Some(device) = self.devices.get(bare) {
            let owned = self.capabilities_of(device.id.as_str());
            return MIGRATION_PREFERENCE.iter().find_map(|wanted| {
                owned
                    .iter()
                    .find(|c| c.raw_type == *wanted)
                    .map(|c| c.id.clone())
            });
        }

        None
    }

    /// Initial values of synthetic capabilities derived from the snapshot:
    /// controller usage figures and battery flags.
    pub(crate) fn synthetic_states(
        &self,
        snapshot: &TopologySnapshot,
    ) -> Vec<(CapabilityId, CapabilityState)> {
        let mut out = Vec::new();
        let fetched_at = snapshot.fetched_at;

        if let (Some(shc), Some(state)) = (
            self.controller.device_id.as_ref(),
            snapshot.controller_state.as_ref(),
        ) {
            for (key, _) in USAGE_KEYS {
                let id = CapabilityId::new(format!("{shc}_{key}"));
                if !self.capabilities.contains_key(&id) {
                    continue;
                }
                if let Some((value, at)) = usage_value(state.get(*key)) {
                    out.push((id, single("value", value, at, fetched_at)));
                }
            }
        }

        for device in self.devices.values().filter(|d| d.is_battery_powered()) {
            let id = CapabilityId::new(format!("{}_{BATTERY_SUFFIX}", device.id));
            out.push((
                id,
                single("batteryLow", PropertyValue::Bool(device.battery_low), None, fetched_at),
            ));
        }

        out
    }

    /// Resolve a controller usage key reported on the SHC device to its
    /// synthetic capability.
    pub(crate) fn usage_capability(&self, device_id: &str, key: &str) -> Option<CapabilityId> {
        if self.controller.device_id.as_ref().map(DeviceId::as_str) != Some(device_id) {
            return None;
        }
        let id = format!("{device_id}_{key}");
        self.capabilities.get(id.as_str()).map(|c| c.id.clone())
    }

    /// Ids of synthetic duration capabilities.
    pub(crate) fn duration_capabilities(&self) -> impl Iterator<Item = &CapabilityId> {
        self.capabilities
            .values()
            .filter(|c| c.kind == CapabilityKind::Duration)
            .map(|c| &c.id)
    }
}

// ── Helpers ──────────────────────────────────────────────────────────

fn device_from_raw(
    raw: &RawDevice,
    locations: &IndexMap<LocationId, Location>,
    flags: &MessageFlags,
) -> Device {
    let location_id = raw.location.as_deref().map(LocationId::from_link);
    let room = location_id
        .as_ref()
        .and_then(|id| locations.get(id))
        .map(|l| l.name.clone());
    let name = raw
        .config
        .get("name")
        .and_then(Value::as_str)
        .map_or_else(|| raw.device_type.clone(), str::to_owned);

    Device {
        id: DeviceId::new(raw.id.clone()),
        name,
        device_type: raw.device_type.clone(),
        manufacturer: raw.manufacturer.clone(),
        version: raw.version.clone(),
        product: raw.product.clone(),
        serial_number: raw.serial_number.clone(),
        class: raw.class.clone(),
        tag_category: raw.tags.get("typeCategory").cloned(),
        location_id,
        room,
        is_controller: CONTROLLER_DEVICE_TYPES.contains(&raw.device_type.as_str()),
        available: !flags.unreachable.contains(&raw.id),
        battery_low: flags.low_battery.contains(&raw.id),
        update_available: flags.update_available.contains(&raw.id),
        recently_updated: flags.recently_updated.contains(&raw.id),
        capability_ids: Vec::new(),
    }
}

/// `underlyingCapabilityIds` of a room setpoint, split into links that
/// resolve in this snapshot and links that do not.
fn split_links(
    config: &Map<String, Value>,
    known: &HashSet<&str>,
) -> (Vec<CapabilityId>, Vec<CapabilityId>) {
    let Some(raw) = config.get("underlyingCapabilityIds").and_then(Value::as_str) else {
        return (Vec::new(), Vec::new());
    };
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(CapabilityId::from)
        .partition(|id| known.contains(id.as_str()))
}

fn synthetic(device_id: &DeviceId, suffix: &str, kind: CapabilityKind) -> Capability {
    Capability {
        id: CapabilityId::new(format!("{device_id}_{suffix}")),
        raw_type: kind.slug().to_owned(),
        kind,
        device_id: device_id.clone(),
        config: Map::new(),
        links: Vec::new(),
        deferred_links: Vec::new(),
    }
}

/// One-property state; without a controller time it is stamped locally.
fn single(
    property: &str,
    value: PropertyValue,
    at: Option<DateTime<Utc>>,
    fetched_at: DateTime<Utc>,
) -> CapabilityState {
    let mut properties = BTreeMap::new();
    properties.insert(property.to_owned(), value);
    match at {
        Some(at) => CapabilityState::new(properties, at),
        None => CapabilityState::stamped_locally(properties, fetched_at),
    }
}

/// A usage entry is `{"value": n, "lastChanged": ts}` or a bare number.
pub(crate) fn usage_value(
    entry: Option<&Value>,
) -> Option<(PropertyValue, Option<DateTime<Utc>>)> {
    match entry? {
        Value::Object(obj) => {
            let value = PropertyValue::from_json(obj.get("value")?)?;
            let at = obj
                .get("lastChanged")
                .and_then(Value::as_str)
                .and_then(parse_timestamp);
            Some((value, at))
        }
        bare => PropertyValue::from_json(bare).map(|v| (v, None)),
    }
}
