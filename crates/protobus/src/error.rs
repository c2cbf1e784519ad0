//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError` and `ConfigError` into user-facing errors with help text.

use miette::Diagnostic;
use thiserror::Error;

use protobus_config::ConfigError;
use protobus_core::CoreError;

/// Process exit codes.
pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const CONFIG: i32 = 3;
    pub const UNAVAILABLE: i32 = 4;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Configuration ────────────────────────────────────────────────
    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(
        code(protobus::validation),
        help("Fix the value in the config file or the PROTOBUS_* environment.")
    )]
    Validation { field: String, reason: String },

    #[error("Config file already exists at {path}")]
    #[diagnostic(
        code(protobus::config_exists),
        help("Use --force to overwrite it.")
    )]
    ConfigExists { path: String },

    #[error("Failed to load configuration")]
    #[diagnostic(
        code(protobus::config),
        help("Check the TOML syntax and the PROTOBUS_* environment variables.")
    )]
    Config(#[source] ConfigError),

    // ── Bus ──────────────────────────────────────────────────────────
    #[error("Could not export the root protocol at {path}")]
    #[diagnostic(
        code(protobus::bus_unavailable),
        help("Another root may already own this path; pick a different protocol name.")
    )]
    BusUnavailable {
        path: String,
        #[source]
        source: CoreError,
    },

    #[error(transparent)]
    #[diagnostic(code(protobus::registry))]
    Registry(CoreError),

    // ── IO ───────────────────────────────────────────────────────────
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Validation { .. } | Self::ConfigExists { .. } => exit_code::USAGE,
            Self::Config(_) => exit_code::CONFIG,
            Self::BusUnavailable { .. } => exit_code::UNAVAILABLE,
            Self::Registry(_) | Self::Io(_) => exit_code::GENERAL,
        }
    }
}

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::Validation { field, reason } => Self::Validation { field, reason },
            ConfigError::AlreadyExists { path } => Self::ConfigExists {
                path: path.display().to_string(),
            },
            other => Self::Config(other),
        }
    }
}

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::BusUnavailable { ref path } | CoreError::Export { ref path, .. } => {
                let path = path.clone();
                Self::BusUnavailable { path, source: err }
            }
            CoreError::Config { message } | CoreError::InvalidPath { reason: message, .. } => {
                Self::Validation {
                    field: "protocol".into(),
                    reason: message,
                }
            }
            other => Self::Registry(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn export_failure_is_unavailable() {
        let err: CliError = CoreError::BusUnavailable { path: "/a".into() }.into();
        assert_eq!(err.exit_code(), exit_code::UNAVAILABLE);
    }

    #[test]
    fn config_validation_is_usage() {
        let err: CliError = ConfigError::Validation {
            field: "protocol.name".into(),
            reason: "must not be empty".into(),
        }
        .into();
        assert_eq!(err.exit_code(), exit_code::USAGE);
    }
}
