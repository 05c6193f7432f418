//! Finsync CLI - encrypted sync for your finance data

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;
mod output;

use commands::{device, logs, snapshot, status, sync, watch};

/// Log filter, e.g. `FINSYNC_LOG=finsync_core=debug`
const ENV_LOG: &str = "FINSYNC_LOG";

/// Finsync - encrypted multi-device sync for your finance data
#[derive(Parser)]
#[command(name = "finsync", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show sync status and a local data summary
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Turn sync on and upload this device's data
    Enable {
        /// Relay URL to save in settings.json before enabling
        #[arg(long)]
        relay: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Turn sync off on this device
    Disable {
        /// Skip confirmation prompt
        #[arg(long, short)]
        force: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Upload an encrypted snapshot now
    Push {
        /// Passphrase for this call only
        #[arg(long)]
        passphrase: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Download the latest snapshot and merge it into local data
    Pull {
        /// Passphrase for this call only
        #[arg(long)]
        passphrase: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Read data sealed with another device's passphrase and remember it
    Unlock {
        /// Passphrase (prompted when omitted)
        #[arg(long)]
        passphrase: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Pause automatic sync
    Pause {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Resume automatic sync
    Resume {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Run automatic sync in the foreground until Ctrl-C
    ///
    /// The watcher keeps the local database open, so other finsync commands
    /// cannot open it while it runs. Edits made through this process are
    /// uploaded after the debounce window; everything else arrives by polling.
    Watch {
        /// Print state changes as JSON lines
        #[arg(long)]
        json: bool,
    },

    /// Show or rename this device
    Device {
        #[command(subcommand)]
        command: Option<device::DeviceCommands>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Write the local snapshot as plaintext JSON
    Export {
        /// Output file (stdout when omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Merge a plaintext snapshot file into local data
    Import {
        /// Snapshot JSON file
        file: PathBuf,
        /// Preview changes without applying
        #[arg(long)]
        dry_run: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// View and manage the sync event log
    Logs {
        #[command(subcommand)]
        command: logs::LogsCommands,
    },
}

impl Commands {
    fn name(&self) -> &'static str {
        match self {
            Commands::Status { .. } => "status",
            Commands::Enable { .. } => "enable",
            Commands::Disable { .. } => "disable",
            Commands::Push { .. } => "push",
            Commands::Pull { .. } => "pull",
            Commands::Unlock { .. } => "unlock",
            Commands::Pause { .. } => "pause",
            Commands::Resume { .. } => "resume",
            Commands::Watch { .. } => "watch",
            Commands::Device { .. } => "device",
            Commands::Export { .. } => "export",
            Commands::Import { .. } => "import",
            Commands::Logs { .. } => "logs",
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env(ENV_LOG).unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    commands::record_command(cli.command.name());

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            output::error(&format!("{:#}", e));
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Status { json } => status::run(json),
        Commands::Enable { relay, json } => sync::enable(relay, json).await,
        Commands::Disable { force, json } => sync::disable(force, json),
        Commands::Push { passphrase, json } => sync::push(passphrase, json).await,
        Commands::Pull { passphrase, json } => sync::pull(passphrase, json).await,
        Commands::Unlock { passphrase, json } => sync::unlock(passphrase, json).await,
        Commands::Pause { json } => sync::pause(json),
        Commands::Resume { json } => sync::resume(json),
        Commands::Watch { json } => watch::run(json).await,
        Commands::Device { command, json } => device::run(command, json),
        Commands::Export { output } => snapshot::export(output),
        Commands::Import {
            file,
            dry_run,
            json,
        } => snapshot::import(&file, dry_run, json),
        Commands::Logs { command } => logs::run(command),
    }
}
