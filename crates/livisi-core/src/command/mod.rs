// ── Command API ──
//
// All write operations flow through the CommandDispatcher. Values are
// checked against the capability kind before anything goes on the wire.

mod dispatcher;

use serde::Serialize;

use crate::model::{CapabilityId, PropertyValue};

pub use dispatcher::CommandDispatcher;

/// Direction of a cover ramp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RampDirection {
    Up,
    Down,
}

impl RampDirection {
    pub(crate) fn as_param(self) -> &'static str {
        match self {
            Self::Up => "RampUp",
            Self::Down => "RampDown",
        }
    }
}

/// A write against the controller.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Set the primary writable property of a capability.
    Set {
        capability_id: CapabilityId,
        value: PropertyValue,
    },
    /// Switch a thermostat between schedule (`Auto`) and manual (`Manu`).
    /// Accepts the thermostat or a setpoint linked to one.
    SetOperationMode {
        capability_id: CapabilityId,
        auto: bool,
    },
    /// Start moving a cover until it reaches an end stop.
    StartRamp {
        capability_id: CapabilityId,
        direction: RampDirection,
    },
    StopRamp {
        capability_id: CapabilityId,
    },
    /// Reboot the controller. The connection drops right after.
    RestartController,
}

/// Acknowledgement of an accepted command.
///
/// For remote writes this only means the controller took the action; the
/// store changes once the controller reports the new value.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Ack {
    /// `/capability/{id}` or `/device/{id}`.
    pub target: String,
    /// Action type sent, e.g. `SetState`. `local` for values never sent.
    pub action: String,
    /// Property written, for `Set`-style commands.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub property: Option<String>,
    /// Whether an unconfirmed value was layered into the store.
    pub pending: bool,
}
