mod cli;
mod commands;
mod error;
mod logging;

use clap::Parser;

use protobus_core::Verbosity;

use crate::cli::{Cli, Command};
use crate::error::CliError;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(err) = run(cli).await {
        let code = err.exit_code();
        eprintln!("{:?}", miette::Report::new(err));
        std::process::exit(code);
    }
}

async fn run(cli: Cli) -> Result<(), CliError> {
    match cli.command {
        // Config commands never touch the bus
        Command::Config(ref args) => {
            logging::init_tracing(cli.global.verbose, Verbosity::Warning);
            commands::config_cmd::handle(args, &cli.global)
        }

        Command::Run(args) => {
            let cfg = protobus_config::load_config(cli.global.config.as_deref())?;
            let (handle, active) = logging::init_tracing(cli.global.verbose, cfg.log.level);
            let log_level = logging::log_level(active, handle);
            tracing::debug!(?cfg, "configuration loaded");
            commands::run::handle(args, cfg.to_registry_config(), log_level).await
        }
    }
}
