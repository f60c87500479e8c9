//! Device command handlers.

use std::sync::Arc;

use serde::Serialize;
use tabled::Tabled;

use livisi_core::{Capability, Controller, Device};

use crate::cli::{DevicesArgs, DevicesCommand, GlobalOpts};
use crate::error::CliError;
use crate::output;

use super::util;

// ── Table row ───────────────────────────────────────────────────────

#[derive(Tabled)]
struct DeviceRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Type")]
    dtype: String,
    #[tabled(rename = "Room")]
    room: String,
    #[tabled(rename = "State")]
    state: String,
    #[tabled(rename = "Battery")]
    battery: String,
    #[tabled(rename = "Caps")]
    caps: usize,
}

/// A device plus its live availability.
#[derive(Serialize)]
struct DeviceView {
    #[serde(flatten)]
    device: Arc<Device>,
    online: bool,
}

impl DeviceView {
    fn new(controller: &Controller, device: Arc<Device>) -> Self {
        let online = controller
            .is_available(device.id.as_str())
            .unwrap_or(device.available);
        Self { device, online }
    }

    fn row(&self, color: bool) -> DeviceRow {
        let d = &self.device;
        DeviceRow {
            id: d.id.to_string(),
            name: d.name.clone(),
            dtype: d.device_type.clone(),
            room: d.room.clone().unwrap_or_default(),
            state: output::availability(self.online, color),
            battery: battery_label(d),
            caps: d.capability_ids.len(),
        }
    }
}

fn battery_label(d: &Device) -> String {
    match (d.is_battery_powered(), d.battery_low) {
        (false, _) => String::new(),
        (true, true) => "low".into(),
        (true, false) => "ok".into(),
    }
}

fn detail(view: &DeviceView, capabilities: &[Arc<Capability>], controller: &Controller) -> String {
    let d = &view.device;
    let mut lines = vec![
        format!("ID:       {}", d.id),
        format!("Name:     {}", d.name),
        format!("Type:     {}", d.device_type),
        format!("Room:     {}", d.room.as_deref().unwrap_or("-")),
        format!("State:    {}", output::availability(view.online, false)),
        format!("Vendor:   {}", d.manufacturer.as_deref().unwrap_or("-")),
        format!("Version:  {}", d.version.as_deref().unwrap_or("-")),
        format!("Serial:   {}", d.serial_number.as_deref().unwrap_or("-")),
    ];
    if d.is_battery_powered() {
        lines.push(format!("Battery:  {}", battery_label(d)));
    }
    if d.update_available {
        lines.push("Update:   available".into());
    }
    if !capabilities.is_empty() {
        lines.push(String::new());
        lines.push("Capabilities:".into());
        for cap in capabilities {
            lines.push(format!(
                "  {:<34} {:<26} {}",
                cap.id.as_str(),
                cap.kind.slug(),
                util::primary_value(controller, cap)
            ));
        }
    }
    lines.join("\n")
}

// ── Handler ─────────────────────────────────────────────────────────

pub fn handle(
    controller: &Controller,
    args: DevicesArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    match args.command {
        DevicesCommand::List { room, offline } => {
            let color = output::should_color(&global.color);
            let mut views: Vec<DeviceView> = controller
                .devices()
                .into_iter()
                .filter(|d| {
                    room.as_deref().is_none_or(|wanted| {
                        d.room
                            .as_deref()
                            .is_some_and(|r| r.eq_ignore_ascii_case(wanted))
                    })
                })
                .map(|d| DeviceView::new(controller, d))
                .filter(|v| !offline || !v.online)
                .collect();
            views.sort_by(|a, b| {
                a.device
                    .room
                    .cmp(&b.device.room)
                    .then_with(|| a.device.name.cmp(&b.device.name))
            });

            let out = output::render_list(
                &global.output,
                &views,
                |v| v.row(color),
                |v| v.device.id.to_string(),
            );
            output::print_output(&out, global.quiet);
            Ok(())
        }

        DevicesCommand::Get { device } => {
            let catalog = controller.catalog();
            let found = catalog
                .device(&device)
                .cloned()
                .ok_or_else(|| CliError::NotFound {
                    resource_type: "device".into(),
                    identifier: device.clone(),
                    list_command: "devices list".into(),
                })?;
            let capabilities = catalog.capabilities_of(&device);
            let view = DeviceView::new(controller, found);
            let out = output::render_single(
                &global.output,
                &view,
                |v| detail(v, &capabilities, controller),
                |v| v.device.id.to_string(),
            );
            output::print_output(&out, global.quiet);
            Ok(())
        }
    }
}
