//! Config subcommand handlers.

use std::path::PathBuf;

use protobus_config::{self as config, Config};

use crate::cli::{ConfigArgs, ConfigCommand, GlobalOpts};
use crate::error::CliError;

fn resolve_path(global: &GlobalOpts) -> PathBuf {
    global.config.clone().unwrap_or_else(config::config_path)
}

pub fn handle(args: &ConfigArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let path = resolve_path(global);
    match args.command {
        ConfigCommand::Path => {
            println!("{}", path.display());
        }
        ConfigCommand::Show => {
            let cfg = config::load_config(Some(&path))?;
            print!("{}", cfg.to_toml()?);
        }
        ConfigCommand::Init { force } => {
            config::save_config(&Config::default(), &path, force)?;
            println!("Wrote {}", path.display());
        }
    }
    Ok(())
}
