//! CLI configuration, a thin layer over `livisi_config`.
//!
//! Re-exports the shared types and resolves the controller settings with
//! `GlobalOpts` flag overrides (--controller, --password, --insecure, ...).

use std::time::Duration;

use secrecy::SecretString;

use livisi_core::{ControllerConfig, TlsVerification};

use crate::cli::GlobalOpts;
use crate::error::CliError;

// ── Re-exports from shared crate ────────────────────────────────────

pub use livisi_config::{
    Config, Profile, config_path, load_config_or_default, normalize_url, save_config,
    store_password,
};

// ── CLI-specific helpers ────────────────────────────────────────────

/// Resolve the active profile name from CLI flags and config.
pub fn active_profile_name(global: &GlobalOpts, config: &Config) -> String {
    global
        .profile
        .clone()
        .or_else(|| config.default_profile.clone())
        .unwrap_or_else(|| "default".into())
}

/// Build the `ControllerConfig` for this invocation.
///
/// Uses the active profile when one exists; otherwise `--controller` and
/// `--password` (or their env vars) must supply everything.
pub fn build_controller_config(global: &GlobalOpts) -> Result<ControllerConfig, CliError> {
    let cfg = load_config_or_default();
    let profile_name = active_profile_name(global, &cfg);

    if let Some(profile) = cfg.profiles.get(&profile_name) {
        return resolve_profile(profile, &profile_name, &cfg, global);
    }

    // An explicitly named profile must exist.
    if global.profile.is_some() {
        return Err(CliError::ProfileNotFound {
            name: profile_name,
            available: available_profiles(&cfg),
        });
    }

    let host = global.controller.as_deref().ok_or_else(|| CliError::NoConfig {
        path: config_path().display().to_string(),
    })?;
    let url = normalize_url(host)?;
    let password = global
        .password
        .clone()
        .map(SecretString::from)
        .ok_or(CliError::NoCredentials {
            profile: profile_name,
        })?;

    let mut config = ControllerConfig::new(url, password);
    config.tls = if global.insecure {
        TlsVerification::DangerAcceptInvalid
    } else {
        TlsVerification::AcceptSelfSigned
    };
    if let Some(secs) = global.timeout {
        config.timeout = Duration::from_secs(secs.max(1));
    }
    Ok(config)
}

/// Translate a `Profile` + global flags into a `ControllerConfig`.
///
/// CLI flag overrides take priority over profile values.
pub fn resolve_profile(
    profile: &Profile,
    profile_name: &str,
    cfg: &Config,
    global: &GlobalOpts,
) -> Result<ControllerConfig, CliError> {
    let password = match global.password {
        Some(ref pw) => SecretString::from(pw.clone()),
        None => livisi_config::resolve_password(profile, profile_name)?,
    };

    let mut config =
        livisi_config::profile_to_controller_config_with(profile, &cfg.defaults, password)?;

    if let Some(ref host) = global.controller {
        config.url = normalize_url(host)?;
    }
    if global.insecure {
        config.tls = TlsVerification::DangerAcceptInvalid;
    }
    if let Some(secs) = global.timeout {
        config.timeout = Duration::from_secs(secs.max(1));
    }
    Ok(config)
}

/// Comma-separated profile names for error help.
pub fn available_profiles(cfg: &Config) -> String {
    let mut names: Vec<_> = cfg.profiles.keys().cloned().collect();
    if names.is_empty() {
        return "(none)".into();
    }
    names.sort();
    names.join(", ")
}
