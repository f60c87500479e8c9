// ── Frame decoding ──
//
// Turns a raw socket frame into domain events, resolving ids against the
// current catalog. Never fails: anything it cannot place is dropped.

use std::collections::BTreeMap;

use chrono::Utc;
use livisi_api::RawEvent;
use livisi_api::websocket::{EVENT_BUTTON_PRESSED, EVENT_MOTION_DETECTED, EVENT_STATE_CHANGED};
use serde_json::Value;
use tracing::trace;

use crate::catalog::{Catalog, usage_value};
use crate::model::{CapabilityId, DeviceId, Event, PropertyValue, TriggerKind, parse_timestamp};

const IS_REACHABLE: &str = "isReachable";

enum Source {
    Capability(CapabilityId),
    Device(DeviceId),
}

fn source_of(raw: &str) -> Option<Source> {
    if raw.starts_with("/capability/") {
        Some(Source::Capability(CapabilityId::from_link(raw)))
    } else if raw.starts_with("/device/") {
        Some(Source::Device(DeviceId::from_link(raw)))
    } else {
        None
    }
}

/// Decode one frame into zero or more events.
pub(crate) fn decode(raw: &RawEvent, catalog: &Catalog) -> Vec<Event> {
    let Some(properties) = raw.properties.as_ref() else {
        return Vec::new();
    };
    let Some(source) = source_of(&raw.source) else {
        trace!(source = %raw.source, "frame from unknown source kind");
        return Vec::new();
    };
    let timestamp = raw
        .timestamp
        .as_deref()
        .and_then(parse_timestamp)
        .unwrap_or_else(Utc::now);

    let mut events = Vec::new();

    match raw.event_type.as_deref() {
        Some(EVENT_BUTTON_PRESSED) => {
            if let Source::Capability(capability_id) = source {
                let index = properties
                    .get("index")
                    .and_then(Value::as_u64)
                    .and_then(|i| u32::try_from(i).ok())
                    .unwrap_or(0);
                let long_press =
                    properties.get("type").and_then(Value::as_str) == Some("LongPress");
                push_trigger(
                    &mut events,
                    catalog,
                    capability_id,
                    TriggerKind::ButtonPressed { index, long_press },
                    timestamp,
                );
            }
        }
        Some(EVENT_MOTION_DETECTED) => {
            if let Source::Capability(capability_id) = source {
                push_trigger(
                    &mut events,
                    catalog,
                    capability_id,
                    TriggerKind::MotionDetected,
                    timestamp,
                );
            }
        }
        Some(EVENT_STATE_CHANGED) | None => {
            let reachable = properties.get(IS_REACHABLE).and_then(Value::as_bool);
            match source {
                Source::Capability(capability_id) => {
                    if let Some(available) = reachable {
                        if let Some(cap) = catalog.capability(capability_id.as_str()) {
                            events.push(Event::DeviceAvailability {
                                device_id: cap.device_id.clone(),
                                available,
                                timestamp,
                            });
                        }
                    }
                    let values: BTreeMap<String, PropertyValue> = properties
                        .iter()
                        .filter(|(k, _)| k.as_str() != IS_REACHABLE)
                        .filter_map(|(k, v)| PropertyValue::from_json(v).map(|v| (k.clone(), v)))
                        .collect();
                    if !values.is_empty() {
                        events.push(Event::PropertyChanged {
                            capability_id,
                            properties: values,
                            timestamp,
                        });
                    }
                }
                Source::Device(device_id) => {
                    for (key, value) in properties {
                        if key == IS_REACHABLE {
                            continue;
                        }
                        let Some(synthetic) = catalog.usage_capability(device_id.as_str(), key)
                        else {
                            continue;
                        };
                        if let Some((value, at)) = usage_value(Some(value)) {
                            let at = at.unwrap_or(timestamp);
                            let mut values = BTreeMap::new();
                            values.insert("value".to_owned(), value);
                            events.push(Event::PropertyChanged {
                                capability_id: synthetic,
                                properties: values,
                                timestamp: at,
                            });
                        }
                    }
                    if let Some(available) = reachable {
                        events.push(Event::DeviceAvailability {
                            device_id,
                            available,
                            timestamp,
                        });
                    }
                }
            }
        }
        Some(other) => trace!(event_type = other, "ignoring event type"),
    }

    events
}

fn push_trigger(
    events: &mut Vec<Event>,
    catalog: &Catalog,
    capability_id: CapabilityId,
    kind: TriggerKind,
    timestamp: chrono::DateTime<Utc>,
) {
    match catalog.capability(capability_id.as_str()) {
        Some(cap) => events.push(Event::Trigger {
            device_id: cap.device_id.clone(),
            capability_id,
            kind,
            timestamp,
        }),
        None => trace!(%capability_id, "trigger from unknown capability"),
    }
}
