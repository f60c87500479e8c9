// ── Property values ──

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One property value as the controller reports it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropertyValue {
    Bool(bool),
    Number(f64),
    Text(String),
}

impl PropertyValue {
    /// Convert a JSON value. Nulls, arrays, and objects carry no usable state.
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Bool(b) => Some(Self::Bool(*b)),
            Value::Number(n) => n.as_f64().map(Self::Number),
            Value::String(s) => Some(Self::Text(s.clone())),
            Value::Null | Value::Array(_) | Value::Object(_) => None,
        }
    }

    /// JSON form for action parameters. Whole numbers go out as integers,
    /// which is what the controller expects for levels and percentages.
    pub fn to_json(&self) -> Value {
        match self {
            Self::Bool(b) => Value::Bool(*b),
            Self::Number(n) => whole_number(*n).map_or_else(|| Value::from(*n), Value::from),
            Self::Text(s) => Value::String(s.clone()),
        }
    }

    /// Parse user input: `true`/`false`, numbers, anything else as text.
    pub fn parse(input: &str) -> Self {
        match input.trim() {
            "true" | "on" => Self::Bool(true),
            "false" | "off" => Self::Bool(false),
            other => other
                .parse::<f64>()
                .map_or_else(|_| Self::Text(other.to_owned()), Self::Number),
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub(crate) fn type_name(&self) -> &'static str {
        match self {
            Self::Bool(_) => "a boolean",
            Self::Number(_) => "a number",
            Self::Text(_) => "text",
        }
    }
}

#[allow(clippy::cast_possible_truncation, clippy::as_conversions, clippy::float_cmp)]
fn whole_number(n: f64) -> Option<i64> {
    let truncated = n.trunc();
    (truncated == n && truncated.abs() < 9.0e15).then_some(truncated as i64)
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{b}"),
            Self::Number(n) => write!(f, "{n}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

/// Current state of one capability.
///
/// `updated_at` is the controller's timestamp for the newest property in
/// `properties`; events older than it are dropped. States the controller
/// sent without a timestamp carry the local clock instead and never make
/// an event stale.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CapabilityState {
    pub properties: BTreeMap<String, PropertyValue>,
    pub updated_at: DateTime<Utc>,
    /// `updated_at` comes from this host, not the controller.
    #[serde(skip)]
    pub stamped_locally: bool,
}

impl CapabilityState {
    pub fn new(properties: BTreeMap<String, PropertyValue>, updated_at: DateTime<Utc>) -> Self {
        Self {
            properties,
            updated_at,
            stamped_locally: false,
        }
    }

    /// A state whose time is the local clock's.
    pub fn stamped_locally(properties: BTreeMap<String, PropertyValue>, at: DateTime<Utc>) -> Self {
        Self {
            properties,
            updated_at: at,
            stamped_locally: true,
        }
    }

    /// Whether an event stamped `timestamp` is older than this state.
    pub fn is_newer_than(&self, timestamp: DateTime<Utc>) -> bool {
        !self.stamped_locally && timestamp < self.updated_at
    }

    pub fn get(&self, property: &str) -> Option<&PropertyValue> {
        self.properties.get(property)
    }
}

/// Parse a controller timestamp (RFC 3339 with milliseconds).
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn json_conversion() {
        assert_eq!(
            PropertyValue::from_json(&json!(21.5)),
            Some(PropertyValue::Number(21.5))
        );
        assert_eq!(PropertyValue::from_json(&json!(null)), None);
        assert_eq!(PropertyValue::Number(42.0).to_json(), json!(42));
        assert_eq!(PropertyValue::Number(21.5).to_json(), json!(21.5));
    }

    #[test]
    fn parse_user_input() {
        assert_eq!(PropertyValue::parse("on"), PropertyValue::Bool(true));
        assert_eq!(PropertyValue::parse("55"), PropertyValue::Number(55.0));
        assert_eq!(PropertyValue::parse("Auto"), PropertyValue::Text("Auto".into()));
    }

    #[test]
    fn timestamps() {
        let ts = parse_timestamp("2026-03-01T10:00:00.123Z").map(|t| t.timestamp_millis());
        assert_eq!(ts, Some(1_772_359_200_123));
        assert!(parse_timestamp("yesterday").is_none());
    }
}
