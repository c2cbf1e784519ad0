//! Clap derive structures for `protobusd`.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// protobusd -- protocol registry daemon
#[derive(Debug, Parser)]
#[command(
    name = "protobusd",
    version,
    about = "Export a protocol/bridge/device registry on a message bus",
    long_about = "Runs a root protocol object on an in-process bus. Bridges, devices \
        and items are added and removed through bus method calls; every \
        structural change is announced as a signal.",
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
    /// Path to the config file (defaults to the platform config dir)
    #[arg(long, short = 'c', env = "PROTOBUS_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,
}

// ── Commands ─────────────────────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Export the root protocol and serve until interrupted
    Run(RunArgs),

    /// Inspect or create the config file
    Config(ConfigArgs),
}

#[derive(Debug, Args)]
pub struct RunArgs {
    /// Protocol name (overrides the config file)
    #[arg(long, short = 'n')]
    pub name: Option<String>,

    /// Bridge to create at startup (repeatable)
    #[arg(long = "bridge", short = 'b', value_name = "ID")]
    pub bridges: Vec<String>,

    /// Device to register on the root at startup (repeatable)
    #[arg(long = "device", short = 'd', value_name = "ID")]
    pub devices: Vec<String>,

    /// Shut down after this many seconds instead of waiting for Ctrl-C
    #[arg(long, value_name = "SECS")]
    pub exit_after: Option<u64>,
}

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Print the config file location
    Path,

    /// Print the effective configuration as TOML
    Show,

    /// Write a default config file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }
}
