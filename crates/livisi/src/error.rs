//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError` and `ConfigError` into user-facing errors with
//! actionable help text and a stable exit code.

use miette::Diagnostic;
use thiserror::Error;

use livisi_config::ConfigError;
use livisi_core::CoreError;

/// Process exit codes.
pub mod exit_code {
    pub const SUCCESS: i32 = 0;
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const AUTH: i32 = 3;
    pub const NOT_FOUND: i32 = 4;
    pub const UNSUPPORTED: i32 = 5;
    pub const REJECTED: i32 = 6;
    pub const CONNECTION: i32 = 7;
    pub const TIMEOUT: i32 = 8;
}

#[derive(Debug, Error, Diagnostic)]
#[allow(unused_assignments)]
pub enum CliError {
    // ── Connection ───────────────────────────────────────────────────
    #[error("Could not connect to controller at {url}")]
    #[diagnostic(
        code(livisi::connection_failed),
        help(
            "Check that the controller is powered and reachable on the local network.\n\
             URL: {url}\n\
             Try: livisi status --controller <host>"
        )
    )]
    ConnectionFailed {
        url: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    // ── Authentication ───────────────────────────────────────────────
    #[error("The controller rejected the password")]
    #[diagnostic(
        code(livisi::wrong_password),
        help(
            "Use the password of the controller's local admin user.\n\
             Run: livisi config set-password"
        )
    )]
    WrongPassword,

    #[error("Authentication failed: {reason}")]
    #[diagnostic(
        code(livisi::auth_failed),
        help("The controller refused the session. Retry, or restart the controller if it persists.")
    )]
    AuthFailed { reason: String },

    #[error("No password configured for profile '{profile}'")]
    #[diagnostic(
        code(livisi::no_credentials),
        help(
            "Configure one with: livisi config init\n\
             Or set the LIVISI_PASSWORD environment variable."
        )
    )]
    NoCredentials { profile: String },

    // ── Resources ────────────────────────────────────────────────────
    #[error("{resource_type} '{identifier}' not found")]
    #[diagnostic(
        code(livisi::not_found),
        help("Run: livisi {list_command} to see available {resource_type}s")
    )]
    NotFound {
        resource_type: String,
        identifier: String,
        list_command: String,
    },

    // ── Commands ─────────────────────────────────────────────────────
    #[error("Capability '{capability_id}' ({kind}) cannot take this command: {reason}")]
    #[diagnostic(code(livisi::incompatible))]
    Incompatible {
        capability_id: String,
        kind: String,
        reason: String,
    },

    #[error("Capability '{capability_id}' has unsupported type {raw_kind}")]
    #[diagnostic(
        code(livisi::unsupported),
        help("The capability is listed for reference but cannot be controlled.")
    )]
    Unsupported {
        capability_id: String,
        raw_kind: String,
    },

    #[error("Controller rejected the command for {target}: {result}")]
    #[diagnostic(code(livisi::rejected))]
    Rejected { target: String, result: String },

    // ── API ──────────────────────────────────────────────────────────
    #[error("API error ({code}): {message}")]
    #[diagnostic(code(livisi::api_error))]
    ApiError { code: String, message: String },

    #[error("Internal error: {message}")]
    #[diagnostic(code(livisi::internal))]
    Internal { message: String },

    // ── Validation ───────────────────────────────────────────────────
    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(livisi::validation))]
    Validation { field: String, reason: String },

    // ── Configuration ────────────────────────────────────────────────
    #[error("Profile '{name}' not found in configuration")]
    #[diagnostic(
        code(livisi::profile_not_found),
        help(
            "Available profiles: {available}\n\
             Create one with: livisi config init"
        )
    )]
    ProfileNotFound { name: String, available: String },

    #[error("No controller configured")]
    #[diagnostic(
        code(livisi::no_config),
        help(
            "Create a profile with: livisi config init\n\
             Or pass --controller <host>. Expected config at: {path}"
        )
    )]
    NoConfig { path: String },

    #[error(transparent)]
    #[diagnostic(code(livisi::config))]
    Config(Box<figment::Error>),

    // ── Interactive ──────────────────────────────────────────────────
    #[error("Operation '{action}' requires confirmation")]
    #[diagnostic(
        code(livisi::confirmation_required),
        help("Use --yes (-y) to skip confirmation in non-interactive contexts.")
    )]
    NonInteractiveRequiresYes { action: String },

    // ── Timeout ──────────────────────────────────────────────────────
    #[error("Timed out after {seconds}s")]
    #[diagnostic(
        code(livisi::timeout),
        help("Increase the timeout with --timeout or --wait-timeout, or check the controller.")
    )]
    Timeout { seconds: u64 },

    // ── IO ───────────────────────────────────────────────────────────
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for CliError {
    fn from(err: figment::Error) -> Self {
        Self::Config(Box::new(err))
    }
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ConnectionFailed { .. } => exit_code::CONNECTION,
            Self::WrongPassword | Self::AuthFailed { .. } | Self::NoCredentials { .. } => {
                exit_code::AUTH
            }
            Self::NotFound { .. } => exit_code::NOT_FOUND,
            Self::Unsupported { .. } => exit_code::UNSUPPORTED,
            Self::Rejected { .. } => exit_code::REJECTED,
            Self::Timeout { .. } => exit_code::TIMEOUT,
            Self::Incompatible { .. }
            | Self::Validation { .. }
            | Self::NonInteractiveRequiresYes { .. } => exit_code::USAGE,
            _ => exit_code::GENERAL,
        }
    }
}

// ── CoreError → CliError mapping ─────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::ConnectionFailed { url, reason } => CliError::ConnectionFailed {
                url,
                source: reason.into(),
            },

            CoreError::ControllerDisconnected => CliError::ConnectionFailed {
                url: "(disconnected)".into(),
                source: "Controller connection was lost".into(),
            },

            CoreError::Timeout { timeout_secs } => CliError::Timeout {
                seconds: timeout_secs,
            },

            CoreError::WrongPassword => CliError::WrongPassword,

            CoreError::AuthenticationFailed { message } => {
                CliError::AuthFailed { reason: message }
            }

            CoreError::SessionExpired { reason } => CliError::AuthFailed {
                reason: format!("session expired: {reason}"),
            },

            CoreError::CapabilityNotFound { identifier } => CliError::NotFound {
                resource_type: "capability".into(),
                identifier,
                list_command: "capabilities list".into(),
            },

            CoreError::DeviceNotFound { identifier } => CliError::NotFound {
                resource_type: "device".into(),
                identifier,
                list_command: "devices list".into(),
            },

            CoreError::IncompatibleCapability {
                capability_id,
                kind,
                reason,
            } => CliError::Incompatible {
                capability_id,
                kind,
                reason,
            },

            CoreError::UnsupportedCapability {
                capability_id,
                raw_kind,
            } => CliError::Unsupported {
                capability_id,
                raw_kind,
            },

            CoreError::CommandRejected { target, result } => CliError::Rejected { target, result },

            CoreError::Api { message, code } => CliError::ApiError {
                code: code.map_or_else(|| "-".into(), |c| c.to_string()),
                message,
            },

            CoreError::Config { message } => CliError::Validation {
                field: "config".into(),
                reason: message,
            },

            CoreError::Internal(message) => CliError::Internal { message },
        }
    }
}

// ── ConfigError → CliError mapping ───────────────────────────────────

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::Validation { field, reason } => CliError::Validation { field, reason },
            ConfigError::NoCredentials { profile } => CliError::NoCredentials { profile },
            ConfigError::UnknownProfile { profile } => CliError::ProfileNotFound {
                name: profile,
                available: "(run: livisi config profiles)".into(),
            },
            ConfigError::Serialization(e) => CliError::Validation {
                field: "config".into(),
                reason: e.to_string(),
            },
            ConfigError::Figment(e) => CliError::Config(e),
            ConfigError::Io(e) => CliError::Io(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_errors_map_to_distinct_exit_codes() {
        let incompatible: CliError = CoreError::IncompatibleCapability {
            capability_id: "c1".into(),
            kind: "dimmer".into(),
            reason: "expected a number".into(),
        }
        .into();
        assert_eq!(incompatible.exit_code(), exit_code::USAGE);

        let unsupported: CliError = CoreError::UnsupportedCapability {
            capability_id: "c2".into(),
            raw_kind: "WeatherStation".into(),
        }
        .into();
        assert_eq!(unsupported.exit_code(), exit_code::UNSUPPORTED);

        let rejected: CliError = CoreError::CommandRejected {
            target: "/capability/c1".into(),
            result: "Failure".into(),
        }
        .into();
        assert_eq!(rejected.exit_code(), exit_code::REJECTED);
    }

    #[test]
    fn wrong_password_is_an_auth_failure() {
        let err: CliError = CoreError::WrongPassword.into();
        assert_eq!(err.exit_code(), exit_code::AUTH);
    }

    #[test]
    fn missing_capability_points_at_list_command() {
        let err: CliError = CoreError::CapabilityNotFound {
            identifier: "nope".into(),
        }
        .into();
        assert_eq!(err.exit_code(), exit_code::NOT_FOUND);
        assert!(matches!(
            err,
            CliError::NotFound { ref list_command, .. } if list_command == "capabilities list"
        ));
    }
}
