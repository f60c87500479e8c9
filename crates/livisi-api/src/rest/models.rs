// Wire types for the SHC REST API
//
// Field names follow the controller's camelCase JSON. Everything the
// controller may omit is defaulted so one sparse record never fails a
// whole listing.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// ── Token ───────────────────────────────────────────────────────────

/// Response body of `POST /auth/token`.
///
/// On failure the controller answers with the error envelope instead, so
/// every field is optional and the caller inspects `errorcode`.
#[derive(Debug, Deserialize)]
pub(crate) struct TokenResponse {
    pub access_token: Option<String>,
    pub expires_in: Option<i64>,
    pub errorcode: Option<u32>,
    pub description: Option<String>,
}

/// `{"errorcode": n, "description": "..."}` returned on failed requests.
#[derive(Debug, Deserialize)]
pub(crate) struct ErrorEnvelope {
    pub errorcode: u32,
    #[serde(default)]
    pub description: Option<String>,
}

// ── Status ──────────────────────────────────────────────────────────

/// Hardware generation of the controller, from `status.controllerType`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControllerGeneration {
    /// First generation SHC ("Classic").
    Classic,
    /// Second generation SHC ("Avatar").
    Avatar,
    #[default]
    Unknown,
}

impl ControllerGeneration {
    pub fn from_controller_type(raw: Option<&str>) -> Self {
        match raw {
            Some("Classic") => Self::Classic,
            Some("Avatar") => Self::Avatar,
            _ => Self::Unknown,
        }
    }

    pub fn is_v2(self) -> bool {
        self == Self::Avatar
    }

    /// Number of parallel state requests the controller tolerates.
    pub fn request_concurrency(self) -> usize {
        if self.is_v2() { 10 } else { 1 }
    }
}

/// `GET /status`.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ShcStatus {
    pub controller_type: Option<String>,
    pub serial_number: Option<String>,
    pub os_version: Option<String>,
    pub app_version: Option<String>,
    pub connected: Option<bool>,
}

impl ShcStatus {
    pub fn generation(&self) -> ControllerGeneration {
        ControllerGeneration::from_controller_type(self.controller_type.as_deref())
    }
}

// ── Topology ────────────────────────────────────────────────────────

/// `GET /device` entry.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RawDevice {
    pub id: String,
    #[serde(rename = "type")]
    pub device_type: String,
    pub manufacturer: Option<String>,
    pub version: Option<String>,
    pub product: Option<String>,
    pub serial_number: Option<String>,
    pub class: Option<String>,
    pub desc: Option<String>,
    pub config: Map<String, Value>,
    pub tags: HashMap<String, String>,
    /// Link of the form `/location/{id}`.
    pub location: Option<String>,
    /// Links of the form `/capability/{id}`.
    pub capabilities: Vec<String>,
}

/// `GET /capability` entry.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RawCapability {
    pub id: String,
    #[serde(rename = "type")]
    pub capability_type: String,
    /// Link of the form `/device/{id}`.
    pub device: Option<String>,
    pub config: Map<String, Value>,
}

/// `GET /location` entry.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RawLocation {
    pub id: String,
    pub config: Map<String, Value>,
}

impl RawLocation {
    pub fn name(&self) -> Option<&str> {
        self.config.get("name").and_then(Value::as_str)
    }
}

/// `GET /message` entry.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RawMessage {
    pub id: Option<String>,
    #[serde(rename = "type")]
    pub message_type: String,
    pub timestamp: Option<String>,
    pub read: Option<bool>,
    /// Links of the form `/device/{id}`.
    pub devices: Vec<String>,
    pub source: Option<String>,
}

impl RawMessage {
    /// Device links this message refers to, falling back to `source`.
    pub fn device_links(&self) -> Vec<&str> {
        if self.devices.is_empty() {
            self.source.as_deref().into_iter().collect()
        } else {
            self.devices.iter().map(String::as_str).collect()
        }
    }
}

// ── State ───────────────────────────────────────────────────────────

/// One property of `GET /capability/{id}/state`.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RawPropertyState {
    pub value: Value,
    pub last_changed: Option<String>,
}

/// Property name to state, as returned by the state endpoints.
pub type RawState = HashMap<String, RawPropertyState>;

// ── Actions ─────────────────────────────────────────────────────────

/// Body of `POST /action`.
#[derive(Debug, Clone, Serialize)]
pub struct ActionRequest {
    pub id: String,
    #[serde(rename = "type")]
    pub action_type: String,
    pub namespace: String,
    pub target: String,
    pub params: BTreeMap<String, ActionParam>,
}

/// A constant action parameter: `{"type": "Constant", "value": ...}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActionParam {
    #[serde(rename = "type")]
    pub param_type: &'static str,
    pub value: Value,
}

impl ActionParam {
    pub fn constant(value: impl Into<Value>) -> Self {
        Self {
            param_type: "Constant",
            value: value.into(),
        }
    }
}

/// Response of `POST /action`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ActionResponse {
    pub result_code: Option<String>,
}

impl ActionResponse {
    pub fn is_success(&self) -> bool {
        self.result_code.as_deref() == Some("Success")
    }
}
