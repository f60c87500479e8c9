// ── Capability kinds ──
//
// Every vendor capability type maps onto one `CapabilityKind`. The kind
// decides which property carries the primary value, its unit, and whether
// (and how) the capability can be written.

use livisi_api::ControllerGeneration;
use serde::Serialize;
use strum::EnumString;

use super::value::PropertyValue;

/// Capability kind, parsed from the controller's `type` string.
///
/// Types this client does not model parse as [`Unsupported`](Self::Unsupported):
/// they stay in the catalog but are never writable. Kinds marked
/// `disabled` are synthesized locally and never come from the controller.
#[derive(Debug, Clone, PartialEq, Eq, Hash, EnumString, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum CapabilityKind {
    #[strum(serialize = "SwitchActuator")]
    Switch,
    #[strum(serialize = "BooleanStateActuator", serialize = "VariableActuator")]
    VariableActuator,
    #[strum(serialize = "DimmerActuator")]
    Dimmer,
    #[strum(serialize = "RollerShutterActuator")]
    Cover,
    #[strum(serialize = "RoomSetpoint")]
    ThermostatSetpoint,
    #[strum(serialize = "ThermostatActuator")]
    Thermostat,
    #[strum(serialize = "TemperatureSensor", serialize = "RoomTemperature")]
    TemperatureSensor,
    #[strum(serialize = "HumiditySensor", serialize = "RoomHumidity")]
    HumiditySensor,
    #[strum(serialize = "LuminanceSensor")]
    LuminanceSensor,
    #[strum(serialize = "MotionDetectionSensor")]
    MotionSensor,
    #[strum(serialize = "SmokeDetectorSensor")]
    SmokeSensor,
    #[strum(serialize = "WindowDoorSensor")]
    ContactSensor,
    /// Alarm of smoke detectors and sirens, switched through `onState`.
    #[strum(serialize = "AlarmActuator")]
    Siren,
    /// Stand-alone siren, switched through `activeChannel`.
    #[strum(serialize = "SirenActuator")]
    SirenChannel,
    #[strum(serialize = "PushButtonSensor")]
    Button,
    #[strum(serialize = "PowerConsumptionSensor")]
    PowerMeter,
    #[strum(serialize = "TwoWayMeterEnergyConsumptionSensor")]
    EnergyMeterConsumption,
    #[strum(serialize = "TwoWayMeterEnergyFeedSensor")]
    EnergyMeterFeed,
    #[strum(serialize = "TwoWayMeterPowerConsumptionSensor")]
    EnergyMeterPower,
    #[strum(serialize = "GenerationMeterEnergySensor")]
    EnergyMeterGeneration,
    #[strum(serialize = "GenerationMeterPowerConsumptionSensor")]
    EnergyMeterGenerationPower,

    // ── Synthetic ────────────────────────────────────────────────────
    #[strum(disabled)]
    CpuUsage,
    #[strum(disabled)]
    MemoryUsage,
    #[strum(disabled)]
    DiskUsage,
    /// Motion off-delay, held locally.
    #[strum(disabled)]
    Duration,
    /// Battery-low flag of battery powered devices, fed from messages.
    #[strum(disabled)]
    BatteryLevel,

    #[strum(default)]
    Unsupported(String),
}

/// Value shape a writable property accepts.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueShape {
    Bool,
    Number { min: f64, max: f64 },
    Choice(&'static [&'static str]),
}

impl ValueShape {
    /// Check `value` against this shape; the error names what was expected.
    pub fn check(&self, value: &PropertyValue) -> Result<(), String> {
        match (self, value) {
            (Self::Bool, PropertyValue::Bool(_)) => Ok(()),
            (Self::Number { min, max }, PropertyValue::Number(n)) => {
                if n.is_finite() && *n >= *min && *n <= *max {
                    Ok(())
                } else {
                    Err(format!("{n} is outside {min}..={max}"))
                }
            }
            (Self::Choice(options), PropertyValue::Text(s)) => {
                if options.contains(&s.as_str()) {
                    Ok(())
                } else {
                    Err(format!("'{s}' is not one of {}", options.join(", ")))
                }
            }
            (expected, got) => Err(format!("expected {}, got {}", expected.describe(), got.type_name())),
        }
    }

    fn describe(&self) -> String {
        match self {
            Self::Bool => "a boolean".into(),
            Self::Number { min, max } => format!("a number in {min}..={max}"),
            Self::Choice(options) => format!("one of {}", options.join(", ")),
        }
    }
}

/// How a writable capability is written.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct WriteSpec {
    pub property: &'static str,
    pub shape: ValueShape,
    pub namespace: &'static str,
    /// Held locally instead of sent to the controller.
    pub local: bool,
}

pub const MIN_SETPOINT: f64 = 6.0;
pub const MAX_SETPOINT: f64 = 30.0;
pub const OPERATION_MODES: &[&str] = &["Auto", "Manu"];
const SIREN_CHANNELS: &[&str] = &["Alarm", "None"];
const PERCENT: ValueShape = ValueShape::Number { min: 0.0, max: 100.0 };

const CORE: &str = livisi_api::rest::actions::NAMESPACE_CORE;
const COSIP: &str = livisi_api::rest::actions::NAMESPACE_COSIP;

impl CapabilityKind {
    /// Parse a vendor type string. Never fails; unknown types become `Unsupported`.
    pub fn from_raw(raw: &str) -> Self {
        raw.parse()
            .unwrap_or_else(|_| Self::Unsupported(raw.to_owned()))
    }

    /// Kebab-case name used in listings.
    pub fn slug(&self) -> &str {
        match self {
            Self::Switch => "switch",
            Self::VariableActuator => "variable-actuator",
            Self::Dimmer => "dimmer",
            Self::Cover => "cover",
            Self::ThermostatSetpoint => "thermostat-setpoint",
            Self::Thermostat => "thermostat",
            Self::TemperatureSensor => "temperature-sensor",
            Self::HumiditySensor => "humidity-sensor",
            Self::LuminanceSensor => "luminance-sensor",
            Self::MotionSensor => "motion-sensor",
            Self::SmokeSensor => "smoke-sensor",
            Self::ContactSensor => "contact-sensor",
            Self::Siren => "siren",
            Self::SirenChannel => "siren-channel",
            Self::Button => "button",
            Self::PowerMeter => "power-meter",
            Self::EnergyMeterConsumption => "energy-meter-consumption",
            Self::EnergyMeterFeed => "energy-meter-feed",
            Self::EnergyMeterPower => "energy-meter-power",
            Self::EnergyMeterGeneration => "energy-meter-generation",
            Self::EnergyMeterGenerationPower => "energy-meter-generation-power",
            Self::CpuUsage => "cpu-usage",
            Self::MemoryUsage => "memory-usage",
            Self::DiskUsage => "disk-usage",
            Self::Duration => "duration",
            Self::BatteryLevel => "battery-level",
            Self::Unsupported(_) => "unsupported",
        }
    }

    pub fn is_supported(&self) -> bool {
        !matches!(self, Self::Unsupported(_))
    }

    /// Synthesized locally rather than reported by the controller.
    pub fn is_synthetic(&self) -> bool {
        matches!(
            self,
            Self::CpuUsage | Self::MemoryUsage | Self::DiskUsage | Self::Duration | Self::BatteryLevel
        )
    }

    /// The property holding this kind's main value.
    pub fn primary_property(&self, generation: ControllerGeneration) -> Option<&'static str> {
        let prop = match self {
            Self::Switch | Self::Siren => "onState",
            Self::VariableActuator => "value",
            Self::Dimmer => "dimLevel",
            Self::Cover => "shutterLevel",
            Self::ThermostatSetpoint => setpoint_property(generation),
            Self::Thermostat => "operationMode",
            Self::TemperatureSensor => "temperature",
            Self::HumiditySensor => "humidity",
            Self::LuminanceSensor => "luminance",
            Self::MotionSensor => "motionDetectedCount",
            Self::SmokeSensor => "isSmokeAlarm",
            Self::ContactSensor => "isOpen",
            Self::SirenChannel => "activeChannel",
            Self::PowerMeter => "powerConsumptionWatt",
            Self::EnergyMeterConsumption | Self::EnergyMeterFeed | Self::EnergyMeterGeneration => {
                "totalEnergy"
            }
            Self::EnergyMeterPower | Self::EnergyMeterGenerationPower => "powerInWatt",
            Self::CpuUsage | Self::MemoryUsage | Self::DiskUsage => "value",
            Self::Duration => "duration",
            Self::BatteryLevel => "batteryLow",
            Self::Button | Self::Unsupported(_) => return None,
        };
        Some(prop)
    }

    /// Unit of a property of this kind, if it has one.
    pub fn unit(&self, property: &str) -> Option<&'static str> {
        match (self, property) {
            (Self::ThermostatSetpoint | Self::TemperatureSensor, _) => Some("°C"),
            (Self::HumiditySensor | Self::Dimmer | Self::Cover, _)
            | (Self::CpuUsage | Self::MemoryUsage | Self::DiskUsage, _) => Some("%"),
            (Self::LuminanceSensor, _) => Some("lx"),
            (Self::PowerMeter | Self::EnergyMeterPower | Self::EnergyMeterGenerationPower, _) => {
                Some("W")
            }
            (
                Self::EnergyMeterConsumption | Self::EnergyMeterFeed | Self::EnergyMeterGeneration,
                "energyPerDayInKWh" | "energyPerMonthInKWh" | "totalEnergy",
            ) => Some("kWh"),
            (Self::Duration, _) => Some("s"),
            _ => None,
        }
    }

    /// How this kind is written, or `None` if it is read-only.
    pub fn write_spec(&self, generation: ControllerGeneration) -> Option<WriteSpec> {
        let remote = |property, shape, namespace| WriteSpec {
            property,
            shape,
            namespace,
            local: false,
        };
        let spec = match self {
            Self::Switch | Self::Siren => remote("onState", ValueShape::Bool, CORE),
            Self::VariableActuator => remote("value", ValueShape::Bool, CORE),
            Self::Dimmer => remote("dimLevel", PERCENT, CORE),
            Self::Cover => remote("shutterLevel", PERCENT, COSIP),
            Self::ThermostatSetpoint => remote(
                setpoint_property(generation),
                ValueShape::Number {
                    min: MIN_SETPOINT,
                    max: MAX_SETPOINT,
                },
                CORE,
            ),
            Self::Thermostat => remote("operationMode", ValueShape::Choice(OPERATION_MODES), CORE),
            Self::SirenChannel => remote("activeChannel", ValueShape::Choice(SIREN_CHANNELS), CORE),
            Self::Duration => WriteSpec {
                property: "duration",
                shape: ValueShape::Number {
                    min: 0.0,
                    max: 3600.0,
                },
                namespace: CORE,
                local: true,
            },
            _ => return None,
        };
        Some(spec)
    }
}

/// Setpoint property name: renamed on second generation controllers.
pub fn setpoint_property(generation: ControllerGeneration) -> &'static str {
    if generation.is_v2() {
        "setpointTemperature"
    } else {
        "pointTemperature"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_and_unknown_types() {
        assert_eq!(CapabilityKind::from_raw("DimmerActuator"), CapabilityKind::Dimmer);
        assert_eq!(
            CapabilityKind::from_raw("RoomTemperature"),
            CapabilityKind::TemperatureSensor
        );
        assert_eq!(
            CapabilityKind::from_raw("BooleanStateActuator"),
            CapabilityKind::VariableActuator
        );
        assert_eq!(
            CapabilityKind::from_raw("HeatingSchedule"),
            CapabilityKind::Unsupported("HeatingSchedule".into())
        );
    }

    #[test]
    fn synthetic_kinds_never_parse() {
        assert!(matches!(
            CapabilityKind::from_raw("CpuUsage"),
            CapabilityKind::Unsupported(_)
        ));
        assert!(matches!(
            CapabilityKind::from_raw("Duration"),
            CapabilityKind::Unsupported(_)
        ));
    }

    #[test]
    fn setpoint_property_follows_generation() {
        let kind = CapabilityKind::ThermostatSetpoint;
        assert_eq!(
            kind.write_spec(ControllerGeneration::Avatar).map(|s| s.property),
            Some("setpointTemperature")
        );
        assert_eq!(
            kind.write_spec(ControllerGeneration::Classic).map(|s| s.property),
            Some("pointTemperature")
        );
    }

    #[test]
    fn shape_check() {
        let percent = PERCENT;
        assert!(percent.check(&PropertyValue::Number(42.0)).is_ok());
        assert!(percent.check(&PropertyValue::Number(101.0)).is_err());
        assert!(percent.check(&PropertyValue::Bool(true)).is_err());

        let modes = ValueShape::Choice(OPERATION_MODES);
        assert!(modes.check(&PropertyValue::Text("Manu".into())).is_ok());
        assert!(modes.check(&PropertyValue::Text("Off".into())).is_err());
    }

    #[test]
    fn read_only_kinds_have_no_write_spec() {
        let generation = ControllerGeneration::Avatar;
        assert!(CapabilityKind::TemperatureSensor.write_spec(generation).is_none());
        assert!(CapabilityKind::Unsupported("X".into()).write_spec(generation).is_none());
        assert!(CapabilityKind::Cover
            .write_spec(generation)
            .is_some_and(|s| s.namespace == COSIP));
    }
}
