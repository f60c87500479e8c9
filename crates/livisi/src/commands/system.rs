//! Controller-level commands: status, restart, migrate.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tabled::Tabled;

use livisi_core::{Command as CoreCommand, Controller, ControllerInfo};

use crate::cli::{GlobalOpts, MigrateArgs};
use crate::error::CliError;
use crate::output;

use super::{control, util};

// ── Status ──────────────────────────────────────────────────────────

#[derive(Serialize)]
struct StatusView {
    url: String,
    controller: ControllerInfo,
    devices: usize,
    offline_devices: usize,
    capabilities: usize,
    values: usize,
    last_reload: Option<DateTime<Utc>>,
    last_event: Option<DateTime<Utc>>,
}

fn status_detail(s: &StatusView) -> String {
    let c = &s.controller;
    let ts = |t: Option<DateTime<Utc>>| t.map_or_else(|| "-".into(), |t| t.to_rfc3339());
    [
        format!("URL:          {}", s.url),
        format!("Generation:   {:?}", c.generation),
        format!("Type:         {}", c.controller_type.as_deref().unwrap_or("-")),
        format!("Serial:       {}", c.serial_number.as_deref().unwrap_or("-")),
        format!("OS version:   {}", c.os_version.as_deref().unwrap_or("-")),
        format!("Devices:      {} ({} offline)", s.devices, s.offline_devices),
        format!("Capabilities: {} ({} with values)", s.capabilities, s.values),
        format!("Last reload:  {}", ts(s.last_reload)),
        format!("Last event:   {}", ts(s.last_event)),
    ]
    .join("\n")
}

#[allow(clippy::unnecessary_wraps)]
pub fn status(controller: &Controller, global: &GlobalOpts) -> Result<(), CliError> {
    let catalog = controller.catalog();
    let store = controller.store();
    let offline_devices = catalog
        .devices()
        .filter(|d| !store.is_available(d.id.as_str()).unwrap_or(d.available))
        .count();

    let view = StatusView {
        url: controller.config().url.to_string(),
        controller: catalog.controller().clone(),
        devices: catalog.device_count(),
        offline_devices,
        capabilities: catalog.capability_count(),
        values: store.value_count(),
        last_reload: store.last_reload(),
        last_event: store.last_event(),
    };
    let out = output::render_single(&global.output, &view, status_detail, |v| {
        v.controller
            .serial_number
            .clone()
            .unwrap_or_else(|| v.url.clone())
    });
    output::print_output(&out, global.quiet);
    Ok(())
}

// ── Restart ─────────────────────────────────────────────────────────

pub async fn restart(controller: &Controller, global: &GlobalOpts) -> Result<(), CliError> {
    if !util::confirm(
        "restart",
        "Restart the controller? Devices stay offline until it is back up.",
        global.yes,
    )? {
        return Ok(());
    }
    let ack = controller.execute(CoreCommand::RestartController).await?;
    control::print_ack(&ack, global);
    Ok(())
}

// ── Migrate ─────────────────────────────────────────────────────────

#[derive(Serialize)]
struct MigrationEntry {
    legacy_id: String,
    capability_id: Option<String>,
}

#[derive(Tabled)]
struct MigrationRow {
    #[tabled(rename = "Legacy ID")]
    legacy_id: String,
    #[tabled(rename = "Capability")]
    capability_id: String,
}

#[allow(clippy::unnecessary_wraps)]
pub fn migrate(
    controller: &Controller,
    args: MigrateArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let entries: Vec<MigrationEntry> = args
        .legacy_ids
        .into_iter()
        .map(|legacy_id| MigrationEntry {
            capability_id: controller
                .migrate_unique_id(&legacy_id)
                .map(|id| id.to_string()),
            legacy_id,
        })
        .collect();

    let out = output::render_list(
        &global.output,
        &entries,
        |e| MigrationRow {
            legacy_id: e.legacy_id.clone(),
            capability_id: e.capability_id.clone().unwrap_or_else(|| "-".into()),
        },
        |e| {
            format!(
                "{} {}",
                e.legacy_id,
                e.capability_id.as_deref().unwrap_or("-")
            )
        },
    );
    output::print_output(&out, global.quiet);
    Ok(())
}
