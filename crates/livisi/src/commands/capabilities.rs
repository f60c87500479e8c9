//! Capability command handlers.

use std::sync::Arc;

use serde::Serialize;
use tabled::Tabled;

use livisi_core::{Capability, CapabilityState, Controller};

use crate::cli::{CapabilitiesArgs, CapabilitiesCommand, GlobalOpts};
use crate::error::CliError;
use crate::output;

use super::util;

// ── Table row ───────────────────────────────────────────────────────

#[derive(Tabled)]
struct CapabilityRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Kind")]
    kind: String,
    #[tabled(rename = "Device")]
    device: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Value")]
    value: String,
}

/// A capability with its current state, as shown to the user.
#[derive(Serialize)]
struct CapabilityView {
    #[serde(flatten)]
    capability: Arc<Capability>,
    state: Option<Arc<CapabilityState>>,
    pending: bool,
}

impl CapabilityView {
    fn new(controller: &Controller, capability: Arc<Capability>) -> Self {
        let id = capability.id.as_str();
        Self {
            state: controller.get(id),
            pending: controller.store().is_pending(id),
            capability,
        }
    }
}

fn to_row(controller: &Controller, view: &CapabilityView, color: bool) -> CapabilityRow {
    let cap = &view.capability;
    let device = controller
        .catalog()
        .device(cap.device_id.as_str())
        .map_or_else(|| cap.device_id.to_string(), |d| d.name.clone());
    CapabilityRow {
        id: cap.id.to_string(),
        kind: cap.kind.slug().to_owned(),
        device,
        name: cap.name().unwrap_or_default().to_owned(),
        value: format!(
            "{}{}",
            util::primary_value(controller, cap),
            output::pending_marker(view.pending, color)
        ),
    }
}

fn detail(view: &CapabilityView) -> String {
    let cap = &view.capability;
    let mut lines = vec![
        format!("ID:       {}", cap.id),
        format!("Kind:     {}", cap.kind.slug()),
        format!("Type:     {}", cap.raw_type),
        format!("Device:   {}", cap.device_id),
        format!("Name:     {}", cap.name().unwrap_or("-")),
    ];
    if !cap.links.is_empty() {
        let links: Vec<_> = cap.links.iter().map(ToString::to_string).collect();
        lines.push(format!("Links:    {}", links.join(", ")));
    }
    match view.state {
        Some(ref state) => {
            lines.push(format!("Updated:  {}", state.updated_at.to_rfc3339()));
            for (property, value) in &state.properties {
                lines.push(format!("  {property:<24} {value}"));
            }
            if view.pending {
                lines.push("  (unconfirmed write pending)".into());
            }
        }
        None => lines.push("Value:    -".into()),
    }
    lines.join("\n")
}

// ── Handler ─────────────────────────────────────────────────────────

pub fn handle(
    controller: &Controller,
    args: CapabilitiesArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    match args.command {
        CapabilitiesCommand::List { device, kind } => {
            let catalog = controller.catalog();
            let capabilities = match device {
                Some(ref id) => {
                    if catalog.device(id).is_none() {
                        return Err(CliError::NotFound {
                            resource_type: "device".into(),
                            identifier: id.clone(),
                            list_command: "devices list".into(),
                        });
                    }
                    catalog.capabilities_of(id)
                }
                None => controller.capabilities(),
            };

            let mut views: Vec<CapabilityView> = capabilities
                .into_iter()
                .filter(|c| kind.as_deref().is_none_or(|k| c.kind.slug() == k))
                .map(|c| CapabilityView::new(controller, c))
                .collect();
            views.sort_by(|a, b| {
                a.capability
                    .device_id
                    .cmp(&b.capability.device_id)
                    .then_with(|| a.capability.id.cmp(&b.capability.id))
            });

            let color = output::should_color(&global.color);
            let out = output::render_list(
                &global.output,
                &views,
                |v| to_row(controller, v, color),
                |v| v.capability.id.to_string(),
            );
            output::print_output(&out, global.quiet);
            Ok(())
        }

        CapabilitiesCommand::Get { capability } => {
            let found = util::find_capability(controller, &capability)?;
            let view = CapabilityView::new(controller, found);
            let out = output::render_single(&global.output, &view, detail, |v| {
                util::primary_value(controller, &v.capability)
            });
            output::print_output(&out, global.quiet);
            Ok(())
        }
    }
}
