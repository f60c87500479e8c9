//! Write commands: set, mode, cover.

use std::time::Duration;

use livisi_core::{
    Ack, CapabilityId, Command as CoreCommand, Controller, PropertyValue, RampDirection,
};

use crate::cli::{CoverAction, CoverArgs, GlobalOpts, ModeArgs, OperationMode, SetArgs};
use crate::error::CliError;
use crate::output;

use super::util;

fn ack_detail(ack: &Ack) -> String {
    let what = match ack.property {
        Some(ref property) => format!("{} {property}", ack.action),
        None => ack.action.clone(),
    };
    let suffix = if ack.pending { " (awaiting confirmation)" } else { "" };
    format!("{what} accepted for {}{suffix}", ack.target)
}

pub(super) fn print_ack(ack: &Ack, global: &GlobalOpts) {
    let out = output::render_single(&global.output, ack, ack_detail, |a| a.target.clone());
    output::print_output(&out, global.quiet);
}

// ── Set ─────────────────────────────────────────────────────────────

pub async fn set(
    controller: &Controller,
    args: SetArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let value = PropertyValue::parse(&args.value);

    if !args.wait {
        let ack = controller.set(&args.capability, value).await?;
        print_ack(&ack, global);
        return Ok(());
    }

    let timeout = Duration::from_secs(args.wait_timeout.max(1));

    // The confirmation arrives over the event socket; write once it is up.
    let mut stream = controller.stream_state();
    let _ = tokio::time::timeout(timeout, stream.wait_for(|s| s.is_connected())).await;

    let state = controller
        .set_and_confirm(&args.capability, value, timeout)
        .await?;
    let capability = util::find_capability(controller, &args.capability)?;
    let out = output::render_single(
        &global.output,
        &state,
        |s| output::format_properties(s),
        |_| util::primary_value(controller, &capability),
    );
    output::print_output(&out, global.quiet);
    Ok(())
}

// ── Mode ────────────────────────────────────────────────────────────

pub async fn mode(
    controller: &Controller,
    args: ModeArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let ack = controller
        .execute(CoreCommand::SetOperationMode {
            capability_id: CapabilityId::new(args.capability),
            auto: matches!(args.mode, OperationMode::Auto),
        })
        .await?;
    print_ack(&ack, global);
    Ok(())
}

// ── Cover ───────────────────────────────────────────────────────────

pub async fn cover(
    controller: &Controller,
    args: CoverArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let capability_id = CapabilityId::new(args.capability);
    let command = match args.action {
        CoverAction::Up => CoreCommand::StartRamp {
            capability_id,
            direction: RampDirection::Up,
        },
        CoverAction::Down => CoreCommand::StartRamp {
            capability_id,
            direction: RampDirection::Down,
        },
        CoverAction::Stop => CoreCommand::StopRamp { capability_id },
    };
    let ack = controller.execute(command).await?;
    print_ack(&ack, global);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ack_detail_mentions_pending() {
        let ack = Ack {
            target: "/capability/dimmer-17".into(),
            action: "SetState".into(),
            property: Some("dimLevel".into()),
            pending: true,
        };
        assert_eq!(
            ack_detail(&ack),
            "SetState dimLevel accepted for /capability/dimmer-17 (awaiting confirmation)"
        );
    }

    #[test]
    fn ack_detail_without_property() {
        let ack = Ack {
            target: "/device/shc1".into(),
            action: "Restart".into(),
            property: None,
            pending: false,
        };
        assert_eq!(ack_detail(&ack), "Restart accepted for /device/shc1");
    }
}
