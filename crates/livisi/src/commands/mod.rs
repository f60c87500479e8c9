//! Command dispatch: CLI args -> core commands -> output formatting.

pub mod capabilities;
pub mod config_cmd;
pub mod control;
pub mod devices;
pub mod system;
pub mod util;
pub mod watch;

use livisi_core::Controller;

use crate::cli::{Command, GlobalOpts};
use crate::error::CliError;

/// Dispatch a controller-bound command to the appropriate handler.
pub async fn dispatch(
    cmd: Command,
    controller: &Controller,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    match cmd {
        Command::Devices(args) => devices::handle(controller, args, global),
        Command::Capabilities(args) => capabilities::handle(controller, args, global),
        Command::Set(args) => control::set(controller, args, global).await,
        Command::Mode(args) => control::mode(controller, args, global).await,
        Command::Cover(args) => control::cover(controller, args, global).await,
        Command::Status => system::status(controller, global),
        Command::Restart => system::restart(controller, global).await,
        Command::Migrate(args) => system::migrate(controller, args, global),
        Command::Watch(args) => watch::handle(controller, args, global).await,
        // Config and Completions are handled before dispatch
        Command::Config(_) | Command::Completions(_) => unreachable!(),
    }
}
