//! Configuration for the protobus daemon.
//!
//! TOML file plus `PROTOBUS_*` environment overrides, translated into
//! `protobus_core::RegistryConfig`. The core never reads files itself.

use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use protobus_core::config::{DEFAULT_NOTIFY_BACKLOG_WARN, DEFAULT_PATH_PREFIX};
use protobus_core::{RegistryConfig, Verbosity};

/// Prefix of environment overrides. Nested keys are separated by a
/// double underscore: `PROTOBUS_LOG__LEVEL=debug`.
pub const ENV_PREFIX: &str = "PROTOBUS_";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("config file already exists: {}", path.display())]
    AlreadyExists { path: PathBuf },

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Default, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub protocol: ProtocolSection,

    #[serde(default)]
    pub log: LogSection,

    #[serde(default)]
    pub notifier: NotifierSection,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ProtocolSection {
    /// Protocol name, last element of the root object path.
    #[serde(default = "default_name")]
    pub name: String,

    /// Bus path prefix; must start and end with `/`.
    #[serde(default = "default_path_prefix")]
    pub path_prefix: String,
}

impl Default for ProtocolSection {
    fn default() -> Self {
        Self {
            name: default_name(),
            path_prefix: default_path_prefix(),
        }
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct LogSection {
    /// Initial verbosity, later adjustable through the `LogLevel` property.
    #[serde(default)]
    pub level: Verbosity,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct NotifierSection {
    /// Callback backlog above which a warning is logged.
    #[serde(default = "default_backlog_warn")]
    pub backlog_warn: usize,
}

impl Default for NotifierSection {
    fn default() -> Self {
        Self {
            backlog_warn: default_backlog_warn(),
        }
    }
}

fn default_name() -> String {
    "protocol".into()
}
fn default_path_prefix() -> String {
    DEFAULT_PATH_PREFIX.into()
}
fn default_backlog_warn() -> usize {
    DEFAULT_NOTIFY_BACKLOG_WARN
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("org", "protobus", "protobus").map_or_else(
        || {
            let mut p = dirs_fallback();
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("protobus");
    p
}

// ── Config loading ──────────────────────────────────────────────────

/// Layered sources: defaults, then the TOML file at `path` (a missing
/// file is skipped), then environment overrides.
pub fn figment(path: &Path) -> Figment {
    Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed(ENV_PREFIX).split("__"))
}

/// Load and validate the config from `path`, or the platform default
/// location when `None`.
pub fn load_config(path: Option<&Path>) -> Result<Config, ConfigError> {
    let path = path.map_or_else(config_path, Path::to_path_buf);
    let config: Config = figment(&path).extract()?;
    config.validate()?;
    Ok(config)
}

// ── Config saving ───────────────────────────────────────────────────

/// Serialize `cfg` to TOML and write it to `path`, creating parent
/// directories. Refuses to overwrite unless `force` is set.
pub fn save_config(cfg: &Config, path: &Path, force: bool) -> Result<(), ConfigError> {
    if path.exists() && !force {
        return Err(ConfigError::AlreadyExists {
            path: path.to_path_buf(),
        });
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, cfg.to_toml()?)?;
    Ok(())
}

// ── Translation ─────────────────────────────────────────────────────

impl Config {
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Check the values the registry would reject at startup.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.protocol.name.is_empty() {
            return Err(ConfigError::Validation {
                field: "protocol.name".into(),
                reason: "must not be empty".into(),
            });
        }
        self.to_registry_config()
            .validate()
            .map_err(|e| ConfigError::Validation {
                field: "protocol".into(),
                reason: e.to_string(),
            })
    }

    pub fn to_registry_config(&self) -> RegistryConfig {
        RegistryConfig {
            protocol_name: self.protocol.name.clone(),
            path_prefix: self.protocol.path_prefix.clone(),
            log_level: self.log.level,
            notify_backlog_warn: self.notifier.backlog_warn,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn write(dir: &tempfile::TempDir, body: &str) -> PathBuf {
        let path = dir.path().join("config.toml");
        std::fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg: Config = figment(&dir.path().join("absent.toml")).extract().unwrap();
        assert_eq!(cfg, Config::default());
        assert_eq!(cfg.to_registry_config(), RegistryConfig::default());
    }

    #[test]
    fn file_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            &dir,
            r#"
[protocol]
name = "knx"

[log]
level = "debug"

[notifier]
backlog_warn = 16
"#,
        );
        let cfg: Config = figment(&path).extract().unwrap();
        let reg = cfg.to_registry_config();

        assert_eq!(reg.protocol_name, "knx");
        assert_eq!(reg.path_prefix, DEFAULT_PATH_PREFIX);
        assert_eq!(reg.log_level, Verbosity::Debug);
        assert_eq!(reg.notify_backlog_warn, 16);
        assert_eq!(reg.root_path().unwrap().as_str(), "/org/protobus/knx");
    }

    #[test]
    fn unknown_level_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, "[log]\nlevel = \"loud\"\n");
        assert!(figment(&path).extract::<Config>().is_err());
    }

    #[test]
    fn bad_prefix_fails_validation() {
        let mut cfg = Config::default();
        cfg.protocol.path_prefix = "org/protobus".into();
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::Validation { .. })
        ));
    }

    #[test]
    fn save_refuses_to_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        save_config(&Config::default(), &path, false).unwrap();
        let err = save_config(&Config::default(), &path, false).unwrap_err();
        assert!(matches!(err, ConfigError::AlreadyExists { .. }));
        save_config(&Config::default(), &path, true).unwrap();

        let cfg: Config = figment(&path).extract().unwrap();
        assert_eq!(cfg, Config::default());
    }
}
