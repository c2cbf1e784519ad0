// ── Core error types ──
//
// Two layers: `BusError` is what the transport reports back to a caller
// (the bus-level error names a remote client sees), `CoreError` is what
// the registry API returns to in-process callers. Duplicate and missing
// entities are never errors here; they surface as flags or no-ops.

use thiserror::Error;

/// Errors raised by a bus connection or returned to a remote caller.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BusError {
    #[error("Bus connection unavailable")]
    Disconnected,

    #[error("Object already exported at {path}")]
    ObjectExists { path: String },

    #[error("No object exported at {path}")]
    UnknownObject { path: String },

    #[error("Unknown method {method} on interface {interface}")]
    UnknownMethod { interface: String, method: String },

    #[error("Unknown property {interface}.{name}")]
    UnknownProperty { interface: String, name: String },

    #[error("Property {interface}.{name} is read-only")]
    PropertyReadOnly { interface: String, name: String },

    #[error("Invalid argument: {message}")]
    InvalidArgs { message: String },

    #[error("Bus call failed: {message}")]
    Failed { message: String },
}

impl BusError {
    /// The well-known error name a remote caller would receive.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Disconnected => "org.freedesktop.DBus.Error.Disconnected",
            Self::ObjectExists { .. } => "org.freedesktop.DBus.Error.ObjectPathInUse",
            Self::UnknownObject { .. } => "org.freedesktop.DBus.Error.UnknownObject",
            Self::UnknownMethod { .. } => "org.freedesktop.DBus.Error.UnknownMethod",
            Self::UnknownProperty { .. } => "org.freedesktop.DBus.Error.UnknownProperty",
            Self::PropertyReadOnly { .. } => "org.freedesktop.DBus.Error.PropertyReadOnly",
            Self::InvalidArgs { .. } => "org.freedesktop.DBus.Error.InvalidArgs",
            Self::Failed { .. } => "org.freedesktop.DBus.Error.Failed",
        }
    }
}

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Registry errors ──────────────────────────────────────────────
    #[error("Device not found: {identifier}")]
    DeviceNotFound { identifier: String },

    // ── Bus errors ───────────────────────────────────────────────────
    #[error("No bus connection; cannot export {path}")]
    BusUnavailable { path: String },

    #[error("Failed to export {path}: {source}")]
    Export {
        path: String,
        #[source]
        source: BusError,
    },

    #[error("Invalid object path '{path}': {reason}")]
    InvalidPath { path: String, reason: String },

    // ── Log level ────────────────────────────────────────────────────
    #[error("Invalid log level '{value}'")]
    InvalidLogLevel { value: String },

    #[error("Failed to apply log level: {message}")]
    LogLevelApply { message: String },

    // ── Configuration errors ─────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },
}

impl From<CoreError> for BusError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::DeviceNotFound { .. }
            | CoreError::InvalidPath { .. }
            | CoreError::InvalidLogLevel { .. } => BusError::InvalidArgs {
                message: err.to_string(),
            },
            CoreError::BusUnavailable { .. } => BusError::Disconnected,
            CoreError::Export { source, .. } => source,
            CoreError::LogLevelApply { message } | CoreError::Config { message } => {
                BusError::Failed { message }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_device_maps_to_invalid_args() {
        let err: BusError = CoreError::DeviceNotFound {
            identifier: "d1".into(),
        }
        .into();
        assert_eq!(err.name(), "org.freedesktop.DBus.Error.InvalidArgs");
        assert!(err.to_string().contains("d1"));
    }

    #[test]
    fn export_error_unwraps_bus_source() {
        let err: BusError = CoreError::Export {
            path: "/a".into(),
            source: BusError::ObjectExists { path: "/a".into() },
        }
        .into();
        assert_eq!(err, BusError::ObjectExists { path: "/a".into() });
    }
}
