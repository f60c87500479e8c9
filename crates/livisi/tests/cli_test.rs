//! Integration tests for the `livisi` CLI binary.
//!
//! Argument parsing, help output, shell completions, config handling and
//! error exits, all without a live controller.
#![allow(clippy::unwrap_used)]

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;

// ── Helpers ─────────────────────────────────────────────────────────

const NO_HOME: &str = "/tmp/livisi-cli-test-nonexistent";

/// Build a [`Command`] for the `livisi` binary with env isolation.
///
/// Clears all `LIVISI_*` env vars and points config directories at `home`
/// so tests never touch the user's real configuration.
fn livisi_cmd_in(home: &str) -> assert_cmd::Command {
    let mut cmd = cargo_bin_cmd!("livisi");
    cmd.env("HOME", home)
        .env("XDG_CONFIG_HOME", home)
        .env_remove("LIVISI_PROFILE")
        .env_remove("LIVISI_CONTROLLER")
        .env_remove("LIVISI_PASSWORD")
        .env_remove("LIVISI_OUTPUT")
        .env_remove("LIVISI_INSECURE")
        .env_remove("LIVISI_TIMEOUT")
        .env_remove("RUST_LOG");
    cmd
}

fn livisi_cmd() -> assert_cmd::Command {
    livisi_cmd_in(NO_HOME)
}

/// Concatenate stdout + stderr from a command output for flexible matching.
fn combined_output(output: &std::process::Output) -> String {
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    format!("{stdout}{stderr}")
}

// ── Basic invocation ────────────────────────────────────────────────

#[test]
fn test_no_args_shows_help() {
    let output = livisi_cmd().output().unwrap();
    assert_eq!(output.status.code(), Some(2), "Expected exit code 2");
    let text = combined_output(&output);
    assert!(text.contains("Usage"), "Expected 'Usage' in output:\n{text}");
}

#[test]
fn test_help_flag() {
    livisi_cmd().arg("--help").assert().success().stdout(
        predicate::str::contains("Livisi SmartHome")
            .and(predicate::str::contains("devices"))
            .and(predicate::str::contains("capabilities"))
            .and(predicate::str::contains("watch")),
    );
}

#[test]
fn test_version_flag() {
    livisi_cmd()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("livisi"));
}

#[test]
fn test_set_help_lists_wait() {
    livisi_cmd()
        .args(["set", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--wait"));
}

// ── Shell completions ───────────────────────────────────────────────

#[test]
fn test_completions_bash() {
    livisi_cmd()
        .args(["completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::is_empty().not());
}

#[test]
fn test_completions_zsh() {
    livisi_cmd()
        .args(["completions", "zsh"])
        .assert()
        .success()
        .stdout(predicate::str::contains("#compdef"));
}

#[test]
fn test_completions_fish() {
    livisi_cmd()
        .args(["completions", "fish"])
        .assert()
        .success()
        .stdout(predicate::str::is_empty().not());
}

// ── Argument validation ─────────────────────────────────────────────

#[test]
fn test_invalid_subcommand() {
    let output = livisi_cmd().arg("foobar").output().unwrap();
    assert!(
        !output.status.success(),
        "Expected failure for invalid subcommand"
    );
    let text = combined_output(&output);
    assert!(
        text.contains("invalid") || text.contains("unrecognized") || text.contains("foobar"),
        "Expected error mentioning invalid subcommand:\n{text}"
    );
}

#[test]
fn test_cover_rejects_unknown_action() {
    livisi_cmd()
        .args(["cover", "cover-1", "sideways"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("sideways"));
}

#[test]
fn test_wait_timeout_requires_wait() {
    livisi_cmd()
        .args(["set", "dimmer-17", "50", "--wait-timeout", "5"])
        .assert()
        .code(2);
}

#[test]
fn test_migrate_requires_ids() {
    livisi_cmd().arg("migrate").assert().code(2);
}

// ── Configuration errors ────────────────────────────────────────────

#[test]
fn test_devices_list_no_controller() {
    livisi_cmd()
        .args(["devices", "list"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("No controller configured"));
}

#[test]
fn test_controller_without_password_is_auth_error() {
    livisi_cmd()
        .args(["--controller", "192.0.2.1", "status"])
        .assert()
        .code(3)
        .stderr(predicate::str::contains("No password configured"));
}

#[test]
fn test_bad_controller_scheme_is_usage_error() {
    livisi_cmd()
        .args(["--controller", "ftp://192.0.2.1", "--password", "x", "status"])
        .assert()
        .code(2);
}

#[test]
fn test_unknown_profile() {
    livisi_cmd()
        .args(["--profile", "nope", "status"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Profile 'nope' not found"));
}

#[test]
fn test_config_use_unknown_profile() {
    livisi_cmd()
        .args(["config", "use", "nope"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("nope"));
}

// XDG layout; other platforms keep config elsewhere.
#[cfg(target_os = "linux")]
#[test]
fn test_config_show_masks_password() {
    let home = tempfile::tempdir().unwrap();
    let home_path = home.path().to_str().unwrap();

    let config_dir = home.path().join("livisi");
    std::fs::create_dir_all(&config_dir).unwrap();
    std::fs::write(
        config_dir.join("config.toml"),
        "default_profile = \"home\"\n\n\
         [profiles.home]\n\
         controller = \"192.168.1.20\"\n\
         password = \"hunter2\"\n",
    )
    .unwrap();

    livisi_cmd_in(home_path)
        .args(["config", "show"])
        .assert()
        .success()
        .stdout(
            predicate::str::contains("[profiles.home]")
                .and(predicate::str::contains("****"))
                .and(predicate::str::contains("hunter2").not()),
        );
}
