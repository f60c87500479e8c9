//! `livisi watch`: print store changes until interrupted.

use futures_util::StreamExt;

use livisi_core::{Controller, StoreChange, StreamState};

use crate::cli::{GlobalOpts, OutputFormat, WatchArgs};
use crate::error::CliError;
use crate::output;

/// Which changes the user asked for.
struct Filter {
    capabilities: Vec<String>,
    devices: Vec<String>,
}

impl Filter {
    fn is_empty(&self) -> bool {
        self.capabilities.is_empty() && self.devices.is_empty()
    }

    fn wants_device(&self, device_id: &str) -> bool {
        self.devices.iter().any(|d| d == device_id)
    }

    fn wants_capability(&self, controller: &Controller, capability_id: &str) -> bool {
        if self.capabilities.iter().any(|c| c == capability_id) {
            return true;
        }
        !self.devices.is_empty()
            && controller
                .catalog()
                .capability(capability_id)
                .is_some_and(|c| self.wants_device(c.device_id.as_str()))
    }

    fn matches(&self, controller: &Controller, change: &StoreChange) -> bool {
        if self.is_empty() {
            return true;
        }
        match change {
            StoreChange::Value { capability_id, .. } => {
                self.wants_capability(controller, capability_id.as_str())
            }
            StoreChange::Availability { device_id, .. } => self.wants_device(device_id.as_str()),
            StoreChange::Trigger {
                device_id,
                capability_id,
                ..
            } => {
                self.wants_device(device_id.as_str())
                    || self.wants_capability(controller, capability_id.as_str())
            }
            StoreChange::Reloaded { .. } => true,
        }
    }
}

fn describe_change(change: &StoreChange, color: bool) -> String {
    match change {
        StoreChange::Value {
            capability_id,
            state,
            source,
        } => format!(
            "{} {capability_id} {} [{source:?}]",
            state.updated_at.format("%H:%M:%S"),
            output::format_properties(state)
        ),
        StoreChange::Availability {
            device_id,
            available,
        } => format!("{device_id} {}", output::availability(*available, color)),
        StoreChange::Trigger {
            device_id,
            capability_id,
            kind,
            timestamp,
        } => format!(
            "{} {device_id} {capability_id} {kind:?}",
            timestamp.format("%H:%M:%S")
        ),
        StoreChange::Reloaded {
            devices,
            capabilities,
        } => format!("reloaded: {devices} devices, {capabilities} capabilities"),
    }
}

fn describe_state(state: StreamState) -> String {
    match state {
        StreamState::Disconnected => "event stream disconnected".into(),
        StreamState::Connecting => "connecting event stream".into(),
        StreamState::Connected => "event stream connected".into(),
        StreamState::Reconnecting { attempt } => {
            format!("event stream lost, reconnecting (attempt {attempt})")
        }
        StreamState::Stopped => "event stream stopped".into(),
    }
}

fn render_change(change: &StoreChange, global: &GlobalOpts, color: bool) -> String {
    match global.output {
        OutputFormat::Json | OutputFormat::JsonCompact => output::render_json_compact(change),
        OutputFormat::Yaml => format!("---\n{}", output::render_yaml(change)),
        OutputFormat::Table | OutputFormat::Plain => describe_change(change, color),
    }
}

pub async fn handle(
    controller: &Controller,
    args: WatchArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let filter = Filter {
        capabilities: args.capabilities,
        devices: args.devices,
    };
    let color = output::should_color(&global.color);
    let mut changes = controller.change_stream();
    let mut stream_state = controller.stream_state();

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            changed = stream_state.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = *stream_state.borrow_and_update();
                if !global.quiet {
                    eprintln!("{}", describe_state(state));
                }
            }
            change = changes.next() => {
                let Some(change) = change else { break };
                if filter.matches(controller, &change) {
                    output::print_output(&render_change(&change, global, color), global.quiet);
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::sync::Arc;

    use chrono::{TimeZone, Utc};
    use livisi_core::{CapabilityId, CapabilityState, DeviceId, PropertyValue, ValueSource};

    use super::*;

    #[test]
    fn value_change_line() {
        let mut properties = BTreeMap::new();
        properties.insert("dimLevel".to_owned(), PropertyValue::Number(55.0));
        let at = Utc.with_ymd_and_hms(2026, 3, 1, 7, 30, 5).single().unwrap_or_default();
        let change = StoreChange::Value {
            capability_id: CapabilityId::new("dimmer-17"),
            state: Arc::new(CapabilityState::new(properties, at)),
            source: ValueSource::Controller,
        };
        assert_eq!(
            describe_change(&change, false),
            "07:30:05 dimmer-17 dimLevel=55 [Controller]"
        );
    }

    #[test]
    fn availability_change_line() {
        let change = StoreChange::Availability {
            device_id: DeviceId::new("dev-dim"),
            available: false,
        };
        assert_eq!(describe_change(&change, false), "dev-dim offline");
    }

    #[test]
    fn reconnect_attempt_is_reported() {
        assert_eq!(
            describe_state(StreamState::Reconnecting { attempt: 3 }),
            "event stream lost, reconnecting (attempt 3)"
        );
    }
}
