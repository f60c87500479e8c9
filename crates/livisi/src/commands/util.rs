//! Shared helpers for command handlers.

use std::io::IsTerminal;
use std::sync::Arc;

use livisi_core::{Capability, Controller};

use crate::error::CliError;
use crate::output;

/// Look up a capability in the loaded catalog.
pub fn find_capability(controller: &Controller, id: &str) -> Result<Arc<Capability>, CliError> {
    controller
        .catalog()
        .capability(id)
        .cloned()
        .ok_or_else(|| CliError::NotFound {
            resource_type: "capability".into(),
            identifier: id.into(),
            list_command: "capabilities list".into(),
        })
}

/// The displayed value of a capability: its primary property if it has
/// one, otherwise every property.
pub fn primary_value(controller: &Controller, capability: &Capability) -> String {
    let Some(state) = controller.get(capability.id.as_str()) else {
        return String::new();
    };
    let generation = controller.catalog().generation();
    let primary = capability
        .kind
        .primary_property(generation)
        .and_then(|p| state.get(p).map(|value| (p, value)));
    match primary {
        Some((property, value)) => match capability.kind.unit(property) {
            Some(unit) => format!("{value} {unit}"),
            None => value.to_string(),
        },
        None => output::format_properties(&state),
    }
}

/// Prompt for confirmation, auto-approving if `--yes` was passed.
///
/// Without a terminal to ask on, refuses instead of hanging.
pub fn confirm(action: &str, message: &str, yes_flag: bool) -> Result<bool, CliError> {
    if yes_flag {
        return Ok(true);
    }
    if !std::io::stdin().is_terminal() {
        return Err(CliError::NonInteractiveRequiresYes {
            action: action.into(),
        });
    }
    let confirmed = dialoguer::Confirm::new()
        .with_prompt(message)
        .default(false)
        .interact()
        .map_err(|e| CliError::Io(std::io::Error::other(e)))?;
    Ok(confirmed)
}
