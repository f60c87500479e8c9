// ── Core error types ──
//
// User-facing errors from livisi-core. Consumers never see HTTP details or
// raw JSON failures; `From<livisi_api::Error>` folds transport-level errors
// into the taxonomy below.

use thiserror::Error;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Connection errors ────────────────────────────────────────────
    #[error("Cannot connect to controller at {url}: {reason}")]
    ConnectionFailed { url: String, reason: String },

    #[error("Controller request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    #[error("Controller disconnected")]
    ControllerDisconnected,

    // ── Authentication errors ────────────────────────────────────────
    #[error("Wrong password for the controller")]
    WrongPassword,

    #[error("Authentication failed: {message}")]
    AuthenticationFailed { message: String },

    #[error("Session expired: {reason}")]
    SessionExpired { reason: String },

    // ── Catalog lookups ──────────────────────────────────────────────
    #[error("Capability not found: {identifier}")]
    CapabilityNotFound { identifier: String },

    #[error("Device not found: {identifier}")]
    DeviceNotFound { identifier: String },

    // ── Command errors ───────────────────────────────────────────────
    #[error("Capability {capability_id} ({kind}) cannot take this command: {reason}")]
    IncompatibleCapability {
        capability_id: String,
        kind: String,
        reason: String,
    },

    #[error("Capability {capability_id} has unsupported type {raw_kind}; it is listed but not controllable")]
    UnsupportedCapability {
        capability_id: String,
        raw_kind: String,
    },

    #[error("Controller rejected command for {target}: {result}")]
    CommandRejected { target: String, result: String },

    // ── API errors (wrapped, not exposed raw) ────────────────────────
    #[error("API error: {message}")]
    Api {
        message: String,
        /// The controller's numeric error code, when it sent one.
        code: Option<u32>,
    },

    // ── Configuration errors ─────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },

    // ── Internal errors ──────────────────────────────────────────────
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// Errors that mean the controller link itself is broken, as opposed
    /// to one request or one capability failing.
    pub fn is_connection_loss(&self) -> bool {
        matches!(
            self,
            Self::ConnectionFailed { .. }
                | Self::Timeout { .. }
                | Self::ControllerDisconnected
                | Self::SessionExpired { .. }
                | Self::AuthenticationFailed { .. }
        )
    }
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<livisi_api::Error> for CoreError {
    fn from(err: livisi_api::Error) -> Self {
        match err {
            livisi_api::Error::WrongCredentials => CoreError::WrongPassword,
            livisi_api::Error::Authentication { message } => {
                CoreError::AuthenticationFailed { message }
            }
            livisi_api::Error::TokenRejected { code } => CoreError::AuthenticationFailed {
                message: format!(
                    "access token rejected{}",
                    code.map(|c| format!(" (error code {c})")).unwrap_or_default()
                ),
            },
            livisi_api::Error::SessionExpired { reason } => CoreError::SessionExpired { reason },
            livisi_api::Error::Transport(ref e) => {
                if e.is_timeout() {
                    CoreError::Timeout { timeout_secs: 0 }
                } else if e.is_connect() {
                    CoreError::ConnectionFailed {
                        url: e
                            .url()
                            .map_or_else(|| "<unknown>".into(), ToString::to_string),
                        reason: e.to_string(),
                    }
                } else {
                    CoreError::Api {
                        message: e.to_string(),
                        code: None,
                    }
                }
            }
            livisi_api::Error::InvalidUrl(e) => CoreError::Config {
                message: format!("Invalid URL: {e}"),
            },
            livisi_api::Error::Timeout { timeout_secs } => CoreError::Timeout { timeout_secs },
            livisi_api::Error::Unreachable { url, reason } => {
                CoreError::ConnectionFailed { url, reason }
            }
            livisi_api::Error::Tls(msg) => CoreError::ConnectionFailed {
                url: String::new(),
                reason: format!("TLS error: {msg}"),
            },
            livisi_api::Error::Shc { code, message } => CoreError::Api {
                message,
                code: Some(code),
            },
            livisi_api::Error::WebSocketConnect(reason) => CoreError::ConnectionFailed {
                url: String::new(),
                reason: format!("event socket connection failed: {reason}"),
            },
            livisi_api::Error::WebSocketClosed { code, reason } => CoreError::ConnectionFailed {
                url: String::new(),
                reason: format!("event socket closed (code {code}): {reason}"),
            },
            livisi_api::Error::Deserialization { message, body: _ } => {
                CoreError::Internal(format!("Deserialization error: {message}"))
            }
        }
    }
}
