//! Shared configuration for Livisi tools.
//!
//! TOML profiles, password resolution (env + keyring + plaintext), and
//! translation to `livisi_core::ControllerConfig`. The CLI layers its
//! flag overrides on top.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use livisi_core::{ControllerConfig, TlsVerification};

/// Keyring service name; entries are keyed `{profile}/password`.
pub const KEYRING_SERVICE: &str = "livisi";

/// Environment variable consulted first for the controller password.
pub const PASSWORD_ENV: &str = "LIVISI_PASSWORD";

/// REST port of the controller, used when a URL names none.
pub const DEFAULT_PORT: u16 = 8080;

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("no password configured for profile '{profile}'")]
    NoCredentials { profile: String },

    #[error("profile '{profile}' not found")]
    UnknownProfile { profile: String },

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level `config.toml`.
#[derive(Debug, Deserialize, Serialize)]
pub struct Config {
    /// Profile used when none is given.
    pub default_profile: Option<String>,

    #[serde(default)]
    pub defaults: Defaults,

    /// Named controllers.
    #[serde(default)]
    pub profiles: HashMap<String, Profile>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_profile: Some("default".into()),
            defaults: Defaults::default(),
            profiles: HashMap::new(),
        }
    }
}

impl Config {
    /// The named profile, or the default one.
    pub fn profile(&self, name: Option<&str>) -> Result<(&str, &Profile), ConfigError> {
        let name = name
            .or(self.default_profile.as_deref())
            .unwrap_or("default");
        self.profiles
            .get_key_value(name)
            .map(|(k, v)| (k.as_str(), v))
            .ok_or_else(|| ConfigError::UnknownProfile {
                profile: name.into(),
            })
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct Defaults {
    #[serde(default = "default_output")]
    pub output: String,

    #[serde(default = "default_color")]
    pub color: String,

    /// Request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout: u64,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            output: default_output(),
            color: default_color(),
            timeout: default_timeout(),
        }
    }
}

fn default_output() -> String {
    "table".into()
}
fn default_color() -> String {
    "auto".into()
}
fn default_timeout() -> u64 {
    10
}

/// One controller.
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Profile {
    /// Host, host:port, or URL. `192.168.1.20` means
    /// `http://192.168.1.20:8080/`.
    pub controller: String,

    /// Password of the local `admin` user (plaintext; prefer the keyring).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,

    /// Environment variable holding the password, checked before
    /// `LIVISI_PASSWORD`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password_env: Option<String>,

    /// CA certificate for `https` controllers.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ca_cert: Option<PathBuf>,

    /// Skip TLS verification entirely.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub insecure: Option<bool>,

    /// Request timeout override, seconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,

    /// Seconds between full reloads; 0 disables them.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_interval: Option<u64>,

    /// Show written values before the controller confirms them.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub optimistic_updates: Option<bool>,
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("com", "livisi", "livisi").map_or_else(
        || {
            let mut p = dirs_fallback();
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("livisi");
    p
}

// ── Config loading ──────────────────────────────────────────────────

/// Load the config from the canonical path plus `LIVISI_` environment
/// (`LIVISI_DEFAULTS__TIMEOUT=30`).
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Load the config from `path` plus environment. A missing file yields
/// the defaults.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("LIVISI_").split("__"));

    let config: Config = figment.extract()?;
    Ok(config)
}

/// Load config, returning a default if it cannot be read.
pub fn load_config_or_default() -> Config {
    load_config().unwrap_or_default()
}

// ── Config saving ───────────────────────────────────────────────────

/// Serialize config to TOML and write it to the canonical path.
pub fn save_config(cfg: &Config) -> Result<(), ConfigError> {
    save_config_to(cfg, &config_path())
}

pub fn save_config_to(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(path, toml_str)?;
    Ok(())
}

// ── URL handling ────────────────────────────────────────────────────

/// Turn what a user typed into a controller base URL.
///
/// Adds `http://` when no scheme is given and port 8080 when an `http`
/// URL names no port. `https` URLs keep their default port.
pub fn normalize_url(raw: &str) -> Result<Url, ConfigError> {
    let raw = raw.trim();
    let with_scheme = if raw.contains("://") {
        raw.to_owned()
    } else {
        format!("http://{raw}")
    };

    let invalid = |reason: String| ConfigError::Validation {
        field: "controller".into(),
        reason,
    };

    let mut url = Url::parse(&with_scheme).map_err(|e| invalid(format!("{raw}: {e}")))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(invalid(format!("unsupported scheme '{}'", url.scheme())));
    }
    if url.host_str().is_none_or(str::is_empty) {
        return Err(invalid(format!("{raw}: missing host")));
    }
    if url.scheme() == "http" && url.port().is_none() {
        url.set_port(Some(DEFAULT_PORT))
            .map_err(|()| invalid(format!("{raw}: cannot set port")))?;
    }
    Ok(url)
}

// ── Credential resolution ───────────────────────────────────────────

/// Resolve the controller password.
///
/// Order: the profile's `password_env`, `LIVISI_PASSWORD`, the system
/// keyring, the plaintext profile entry.
pub fn resolve_password(profile: &Profile, profile_name: &str) -> Result<SecretString, ConfigError> {
    resolve_password_with(
        profile,
        profile_name,
        |name| std::env::var(name).ok(),
        keyring_password,
    )
}

/// [`resolve_password`] with injectable env and keyring lookups.
pub fn resolve_password_with(
    profile: &Profile,
    profile_name: &str,
    env: impl Fn(&str) -> Option<String>,
    keyring: impl Fn(&str) -> Option<String>,
) -> Result<SecretString, ConfigError> {
    // 1. Env vars
    let from_env = profile
        .password_env
        .as_deref()
        .and_then(&env)
        .or_else(|| env(PASSWORD_ENV));
    if let Some(pw) = from_env {
        return Ok(SecretString::from(pw));
    }

    // 2. System keyring
    if let Some(pw) = keyring(profile_name) {
        return Ok(SecretString::from(pw));
    }

    // 3. Plaintext in config
    if let Some(ref pw) = profile.password {
        return Ok(SecretString::from(pw.clone()));
    }

    Err(ConfigError::NoCredentials {
        profile: profile_name.into(),
    })
}

fn keyring_password(profile_name: &str) -> Option<String> {
    keyring::Entry::new(KEYRING_SERVICE, &format!("{profile_name}/password"))
        .ok()?
        .get_password()
        .ok()
}

/// Store a password in the system keyring.
pub fn store_password(profile_name: &str, password: &str) -> Result<(), ConfigError> {
    let backend = |e: keyring::Error| ConfigError::Validation {
        field: "keyring".into(),
        reason: e.to_string(),
    };
    keyring::Entry::new(KEYRING_SERVICE, &format!("{profile_name}/password"))
        .map_err(backend)?
        .set_password(password)
        .map_err(backend)
}

// ── ControllerConfig ────────────────────────────────────────────────

/// Build a `ControllerConfig` from a profile, with the password already
/// resolved.
pub fn profile_to_controller_config_with(
    profile: &Profile,
    defaults: &Defaults,
    password: SecretString,
) -> Result<ControllerConfig, ConfigError> {
    let url = normalize_url(&profile.controller)?;

    let tls = if profile.insecure.unwrap_or(false) {
        TlsVerification::DangerAcceptInvalid
    } else if let Some(ref ca_path) = profile.ca_cert {
        TlsVerification::CustomCa(ca_path.clone())
    } else {
        // Controllers ship a self-signed certificate.
        TlsVerification::AcceptSelfSigned
    };

    let mut config = ControllerConfig::new(url, password);
    config.tls = tls;
    config.timeout = Duration::from_secs(profile.timeout.unwrap_or(defaults.timeout).max(1));
    if let Some(secs) = profile.refresh_interval {
        config.refresh_interval = Duration::from_secs(secs);
    }
    if let Some(optimistic) = profile.optimistic_updates {
        config.optimistic_updates = optimistic;
    }
    Ok(config)
}

/// Build a `ControllerConfig` from a profile, resolving the password.
pub fn profile_to_controller_config(
    profile: &Profile,
    profile_name: &str,
    defaults: &Defaults,
) -> Result<ControllerConfig, ConfigError> {
    let password = resolve_password(profile, profile_name)?;
    profile_to_controller_config_with(profile, defaults, password)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use secrecy::ExposeSecret;

    #[test]
    fn bare_host_gets_scheme_and_port() {
        assert_eq!(
            normalize_url("192.168.1.20").unwrap().as_str(),
            "http://192.168.1.20:8080/"
        );
        assert_eq!(
            normalize_url("http://shc.local:9000").unwrap().as_str(),
            "http://shc.local:9000/"
        );
        assert_eq!(
            normalize_url("https://shc.local").unwrap().as_str(),
            "https://shc.local/"
        );
        assert!(normalize_url("ftp://shc.local").is_err());
        assert!(normalize_url("").is_err());
    }

    #[test]
    fn password_resolution_order() {
        let profile = Profile {
            controller: "shc".into(),
            password: Some("plain".into()),
            password_env: Some("HOME_SHC_PW".into()),
            ..Profile::default()
        };
        let no_keyring = |_: &str| None;

        let env = |name: &str| (name == "HOME_SHC_PW").then(|| "from-env".to_owned());
        let pw = resolve_password_with(&profile, "home", env, no_keyring).unwrap();
        assert_eq!(pw.expose_secret(), "from-env");

        let generic = |name: &str| (name == PASSWORD_ENV).then(|| "generic".to_owned());
        let pw = resolve_password_with(&profile, "home", generic, no_keyring).unwrap();
        assert_eq!(pw.expose_secret(), "generic");

        let keyring = |name: &str| (name == "home").then(|| "from-keyring".to_owned());
        let pw = resolve_password_with(&profile, "home", |_| None, keyring).unwrap();
        assert_eq!(pw.expose_secret(), "from-keyring");

        let pw = resolve_password_with(&profile, "home", |_| None, no_keyring).unwrap();
        assert_eq!(pw.expose_secret(), "plain");

        let bare = Profile {
            controller: "shc".into(),
            ..Profile::default()
        };
        assert!(matches!(
            resolve_password_with(&bare, "home", |_| None, no_keyring),
            Err(ConfigError::NoCredentials { .. })
        ));
    }

    #[test]
    fn profile_translates_to_controller_config() {
        let profile = Profile {
            controller: "10.0.0.2".into(),
            timeout: Some(5),
            refresh_interval: Some(0),
            optimistic_updates: Some(false),
            ..Profile::default()
        };
        let config = profile_to_controller_config_with(
            &profile,
            &Defaults::default(),
            SecretString::from("pw".to_string()),
        )
        .unwrap();

        assert_eq!(config.url.as_str(), "http://10.0.0.2:8080/");
        assert_eq!(config.tls, TlsVerification::AcceptSelfSigned);
        assert_eq!(config.timeout, Duration::from_secs(5));
        assert!(config.refresh_interval.is_zero());
        assert!(!config.optimistic_updates);
    }

    #[test]
    fn config_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
default_profile = "home"

[defaults]
timeout = 20

[profiles.home]
controller = "192.168.1.20"
password_env = "HOME_SHC_PW"
"#,
        )
        .unwrap();

        let config = load_config_from(&path).unwrap();
        assert_eq!(config.defaults.timeout, 20);
        assert_eq!(config.defaults.output, "table");
        let (name, profile) = config.profile(None).unwrap();
        assert_eq!(name, "home");
        assert_eq!(profile.controller, "192.168.1.20");
        assert!(matches!(
            config.profile(Some("cabin")),
            Err(ConfigError::UnknownProfile { .. })
        ));

        let copy = dir.path().join("nested").join("copy.toml");
        save_config_to(&config, &copy).unwrap();
        let reloaded = load_config_from(&copy).unwrap();
        assert_eq!(reloaded.profiles["home"].password_env.as_deref(), Some("HOME_SHC_PW"));
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config_from(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.default_profile.as_deref(), Some("default"));
        assert!(config.profiles.is_empty());
    }
}
