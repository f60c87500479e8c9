// ── Runtime connection configuration ──
//
// Describes how to reach one SHC and how the live session behaves.
// Carries the password and tuning knobs but never touches disk; the CLI
// builds a `ControllerConfig` (usually via `livisi-config`) and hands it in.

use std::path::PathBuf;
use std::time::Duration;

use livisi_api::websocket::ReconnectConfig;
use secrecy::SecretString;
use url::Url;

/// TLS verification strategy.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum TlsVerification {
    /// Bundled webpki roots (strict).
    SystemDefaults,
    /// Custom CA certificate file.
    CustomCa(PathBuf),
    /// Self-signed controller certificate; the host name must still match.
    #[default]
    AcceptSelfSigned,
    /// Skip verification entirely.
    DangerAcceptInvalid,
}

/// Configuration for a session with a single controller.
///
/// Built by the CLI, passed to [`Controller`](crate::Controller).
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Controller URL (e.g., `http://192.168.1.20:8080`).
    pub url: Url,
    /// Password of the local `admin` user.
    pub password: SecretString,
    /// TLS verification strategy (only relevant for `https` URLs).
    pub tls: TlsVerification,
    /// Per-request timeout.
    pub timeout: Duration,
    /// Refresh the token when it is this close to expiry.
    pub token_refresh_margin: Duration,
    /// Event socket reconnection backoff.
    pub reconnect: ReconnectConfig,
    /// No frame for this long counts as a lost event socket.
    pub idle_timeout: Duration,
    /// Keep-alive ping interval on the event socket.
    pub ping_interval: Duration,
    /// Periodic full reload. `Duration::ZERO` = never.
    pub refresh_interval: Duration,
    /// Failed reconnect attempts before every device is flagged unavailable.
    pub degraded_after_attempts: u32,
    /// Show a written value before the controller confirms it.
    pub optimistic_updates: bool,
    /// Run the event socket. Without it, state only changes on reloads.
    pub event_stream_enabled: bool,
}

impl ControllerConfig {
    pub fn new(url: Url, password: SecretString) -> Self {
        Self {
            url,
            password,
            tls: TlsVerification::default(),
            timeout: Duration::from_secs(10),
            token_refresh_margin: Duration::from_secs(300),
            reconnect: ReconnectConfig::default(),
            idle_timeout: Duration::from_secs(60),
            ping_interval: Duration::from_secs(10),
            refresh_interval: Duration::from_secs(60),
            degraded_after_attempts: 3,
            optimistic_updates: true,
            event_stream_enabled: true,
        }
    }
}
