// ── Runtime registry configuration ──
//
// Describes *where* the registry lives on the bus and how the notifier
// is sized. Never touches disk: the binary builds a `RegistryConfig`
// (usually via protobus-config) and hands it in.

use crate::error::CoreError;
use crate::log_level::Verbosity;
use crate::model::ObjectPath;

/// Default bus path prefix. Protocol paths are `<prefix><name>`.
pub const DEFAULT_PATH_PREFIX: &str = "/org/protobus/";

/// Default callback backlog above which the notifier logs a warning.
pub const DEFAULT_NOTIFY_BACKLOG_WARN: usize = 256;

/// Configuration for one root protocol and its bridges.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryConfig {
    /// Protocol name, used as the last element of the root path.
    pub protocol_name: String,
    /// Path prefix, must start and end with `/`.
    pub path_prefix: String,
    /// Verbosity published through the `LogLevel` property at startup.
    pub log_level: Verbosity,
    /// Undelivered callbacks tolerated before the notifier warns.
    pub notify_backlog_warn: usize,
}

impl RegistryConfig {
    pub fn new(protocol_name: impl Into<String>) -> Self {
        Self {
            protocol_name: protocol_name.into(),
            ..Self::default()
        }
    }

    /// Path of the root protocol object.
    pub fn root_path(&self) -> Result<ObjectPath, CoreError> {
        ObjectPath::protocol(&self.path_prefix, &self.protocol_name)
    }

    /// Path of the protocol object for `bridge_id`.
    pub fn bridge_path(&self, bridge_id: &str) -> Result<ObjectPath, CoreError> {
        ObjectPath::bridge(&self.path_prefix, &self.protocol_name, bridge_id)
    }

    /// Check that the prefix and name produce valid object paths.
    pub fn validate(&self) -> Result<(), CoreError> {
        if !self.path_prefix.starts_with('/') || !self.path_prefix.ends_with('/') {
            return Err(CoreError::Config {
                message: format!(
                    "path prefix must start and end with '/', got '{}'",
                    self.path_prefix
                ),
            });
        }
        if self.notify_backlog_warn == 0 {
            return Err(CoreError::Config {
                message: "notifier backlog threshold must be at least 1".into(),
            });
        }
        self.root_path().map(|_| ())
    }
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            protocol_name: "protocol".into(),
            path_prefix: DEFAULT_PATH_PREFIX.into(),
            log_level: Verbosity::default(),
            notify_backlog_warn: DEFAULT_NOTIFY_BACKLOG_WARN,
        }
    }
}
