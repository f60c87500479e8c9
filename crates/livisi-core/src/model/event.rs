// ── Decoded controller events ──

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::ids::{CapabilityId, DeviceId};
use super::value::PropertyValue;

/// One change pushed by the controller, decoded against the catalog.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum Event {
    PropertyChanged {
        capability_id: CapabilityId,
        properties: BTreeMap<String, PropertyValue>,
        timestamp: DateTime<Utc>,
    },
    DeviceAvailability {
        device_id: DeviceId,
        available: bool,
        timestamp: DateTime<Utc>,
    },
    Trigger {
        device_id: DeviceId,
        capability_id: CapabilityId,
        kind: TriggerKind,
        timestamp: DateTime<Utc>,
    },
}

impl Event {
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Self::PropertyChanged { timestamp, .. }
            | Self::DeviceAvailability { timestamp, .. }
            | Self::Trigger { timestamp, .. } => *timestamp,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "trigger", rename_all = "snake_case")]
pub enum TriggerKind {
    ButtonPressed { index: u32, long_press: bool },
    MotionDetected,
}
