//! Clap derive structures for the `livisi` CLI.
//!
//! Defines the command tree, global flags, and shared value enums.

use clap::{Args, Parser, Subcommand, ValueEnum};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// livisi -- talk to a Livisi SmartHome controller from the shell
#[derive(Debug, Parser)]
#[command(
    name = "livisi",
    version,
    about = "Control a Livisi SmartHome controller from the command line",
    long_about = "Inspect and control devices behind a local Livisi SmartHome \
        controller (SHC classic or SHC 2).\n\n\
        Talks to the controller's local REST API and event socket; no cloud \
        account is involved.",
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Command,
}

// ── Global Options ───────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// Controller profile to use
    #[arg(long, short = 'p', env = "LIVISI_PROFILE", global = true)]
    pub profile: Option<String>,

    /// Controller host or URL (overrides profile)
    #[arg(long, short = 'c', env = "LIVISI_CONTROLLER", global = true)]
    pub controller: Option<String>,

    /// Password of the controller's local admin user
    #[arg(long, env = "LIVISI_PASSWORD", global = true, hide_env_values = true)]
    pub password: Option<String>,

    /// Output format
    #[arg(
        long,
        short = 'o',
        env = "LIVISI_OUTPUT",
        default_value = "table",
        global = true
    )]
    pub output: OutputFormat,

    /// When to use color output
    #[arg(long, default_value = "auto", global = true)]
    pub color: ColorMode,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,

    /// Skip confirmation prompts
    #[arg(long, short = 'y', global = true)]
    pub yes: bool,

    /// Skip TLS certificate verification
    #[arg(long, short = 'k', env = "LIVISI_INSECURE", global = true)]
    pub insecure: bool,

    /// Request timeout in seconds (overrides profile)
    #[arg(long, env = "LIVISI_TIMEOUT", global = true)]
    pub timeout: Option<u64>,
}

// ── Output & Color Enums ─────────────────────────────────────────────

#[derive(Debug, Clone, ValueEnum)]
pub enum OutputFormat {
    /// Pretty table (default, interactive)
    Table,
    /// Pretty-printed JSON
    Json,
    /// Compact single-line JSON
    JsonCompact,
    /// YAML
    Yaml,
    /// Plain text, one value per line (scripting)
    Plain,
}

#[derive(Debug, Clone, ValueEnum)]
pub enum ColorMode {
    /// Auto-detect (color if terminal is interactive)
    Auto,
    /// Always emit color codes
    Always,
    /// Never emit color codes
    Never,
}

// ── Top-Level Command Enum ───────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// List and inspect devices
    #[command(alias = "dev", alias = "d")]
    Devices(DevicesArgs),

    /// List and inspect capabilities and their current values
    #[command(alias = "caps")]
    Capabilities(CapabilitiesArgs),

    /// Write the primary value of a capability
    Set(SetArgs),

    /// Switch a thermostat between schedule and manual mode
    Mode(ModeArgs),

    /// Move or stop a roller shutter
    Cover(CoverArgs),

    /// Show controller identity and session summary
    Status,

    /// Reboot the controller
    Restart,

    /// Stream value changes as they happen
    Watch(WatchArgs),

    /// Map legacy per-device unique ids to capability ids
    Migrate(MigrateArgs),

    /// Manage CLI configuration and profiles
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

// ── Devices ──────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct DevicesArgs {
    #[command(subcommand)]
    pub command: DevicesCommand,
}

#[derive(Debug, Subcommand)]
pub enum DevicesCommand {
    /// List devices
    #[command(alias = "ls")]
    List {
        /// Only devices in this room (case-insensitive)
        #[arg(long, short = 'r')]
        room: Option<String>,

        /// Only devices the controller reports unreachable
        #[arg(long)]
        offline: bool,
    },

    /// Show one device and its capabilities
    Get {
        /// Device id
        device: String,
    },
}

// ── Capabilities ─────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct CapabilitiesArgs {
    #[command(subcommand)]
    pub command: CapabilitiesCommand,
}

#[derive(Debug, Subcommand)]
pub enum CapabilitiesCommand {
    /// List capabilities with their current value
    #[command(alias = "ls")]
    List {
        /// Only capabilities of this device
        #[arg(long, short = 'd')]
        device: Option<String>,

        /// Only capabilities of this kind (e.g. `dimmer`, `thermostat-setpoint`)
        #[arg(long)]
        kind: Option<String>,
    },

    /// Show one capability with all of its properties
    Get {
        /// Capability id
        capability: String,
    },
}

// ── Writes ───────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct SetArgs {
    /// Capability id
    pub capability: String,

    /// New value: `on`/`off`, `true`/`false`, a number, or text
    pub value: String,

    /// Wait for the controller to report the new state
    #[arg(long, short = 'w')]
    pub wait: bool,

    /// How long `--wait` waits, in seconds
    #[arg(long, default_value = "10", requires = "wait")]
    pub wait_timeout: u64,
}

#[derive(Debug, Args)]
pub struct ModeArgs {
    /// Thermostat or setpoint capability id
    pub capability: String,

    /// Operation mode
    pub mode: OperationMode,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OperationMode {
    /// Follow the heating schedule
    Auto,
    /// Hold the current setpoint
    Manual,
}

#[derive(Debug, Args)]
pub struct CoverArgs {
    /// Roller shutter capability id
    pub capability: String,

    /// Movement
    pub action: CoverAction,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum CoverAction {
    /// Move up until the end stop
    Up,
    /// Move down until the end stop
    Down,
    /// Stop moving
    Stop,
}

// ── Watch ────────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct WatchArgs {
    /// Only changes for this capability (repeatable)
    #[arg(long = "capability", short = 'C')]
    pub capabilities: Vec<String>,

    /// Only changes for this device or its capabilities (repeatable)
    #[arg(long = "device", short = 'd')]
    pub devices: Vec<String>,
}

// ── Migrate ──────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct MigrateArgs {
    /// Legacy unique ids, `{device-id}_{kind}`
    #[arg(required = true)]
    pub legacy_ids: Vec<String>,
}

// ── Config ───────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Create or extend the config file with guided setup
    Init,

    /// Display current configuration (passwords masked)
    Show,

    /// List configured profiles
    Profiles,

    /// Set the default profile
    Use {
        /// Profile name to set as default
        name: String,
    },

    /// Store a profile's password in the system keyring
    SetPassword {
        /// Profile name (defaults to the active profile)
        #[arg(long)]
        profile: Option<String>,
    },
}

// ── Completions ──────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,
}
