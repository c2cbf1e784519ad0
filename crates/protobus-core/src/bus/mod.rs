// ── Bus boundary ──
//
// The registry never talks to a transport directly. It goes through
// `BusExporter`, which wraps an optional `BusConnection`. `LocalBus` is
// the in-process connection used by the daemon and the tests.

mod exporter;
mod local;
mod object;
mod property;

use async_trait::async_trait;
use strum::{Display, EnumString};

use crate::error::BusError;
use crate::model::ObjectPath;

pub use exporter::BusExporter;
pub use local::LocalBus;
pub use object::{BusObject, MethodCall, MethodReply};
pub use property::{EmitMode, Property, PropertyCallback, PropertyChange, PropertyTable};

/// Interface implemented by root and bridge protocol objects.
pub const PROTOCOL_INTERFACE: &str = "org.protobus.Protocol";

/// Interface implemented by device objects.
pub const DEVICE_INTERFACE: &str = "org.protobus.Device";

/// Standard properties interface, carrier of `PropertiesChanged`.
pub const PROPERTIES_INTERFACE: &str = "org.freedesktop.DBus.Properties";

/// Name of the root's writable verbosity property.
pub const PROPERTY_LOG_LEVEL: &str = "LogLevel";

/// A bus connection as seen by the registry.
///
/// Implementations must tolerate concurrent use from every protocol
/// instance; the registry calls these while holding its own locks, so
/// they must never call back into the registry.
#[async_trait]
pub trait BusConnection: Send + Sync {
    /// Make `object` addressable at `path`.
    async fn export(&self, path: &ObjectPath, object: BusObject) -> Result<(), BusError>;

    /// Remove whatever is exported at `path`, properties included.
    async fn unexport(&self, path: &ObjectPath) -> Result<(), BusError>;

    /// Publish a property table on `path`.
    async fn export_properties(
        &self,
        path: &ObjectPath,
        table: PropertyTable,
    ) -> Result<(), BusError>;

    /// Emit a signal.
    async fn emit(&self, signal: Signal) -> Result<(), BusError>;
}

/// Structural-change signal names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString)]
pub enum SignalKind {
    DeviceAdded,
    DeviceRemoved,
    BridgeAdded,
    BridgeRemoved,
    ItemAdded,
    ItemRemoved,
    PropertiesChanged,
}

/// A signal scoped to an object path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signal {
    pub path: ObjectPath,
    pub interface: &'static str,
    pub kind: SignalKind,
    pub args: Vec<String>,
}

impl Signal {
    pub fn new(path: ObjectPath, interface: &'static str, kind: SignalKind) -> Self {
        Self {
            path,
            interface,
            kind,
            args: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Fully qualified member name, e.g. `org.protobus.Protocol.DeviceAdded`.
    pub fn member(&self) -> String {
        format!("{}.{}", self.interface, self.kind)
    }

    pub(crate) fn device_added(protocol: &ObjectPath, device_id: &str) -> Self {
        Self::new(protocol.clone(), PROTOCOL_INTERFACE, SignalKind::DeviceAdded).with_arg(device_id)
    }

    pub(crate) fn device_removed(protocol: &ObjectPath, device_id: &str) -> Self {
        Self::new(protocol.clone(), PROTOCOL_INTERFACE, SignalKind::DeviceRemoved)
            .with_arg(device_id)
    }

    pub(crate) fn bridge_added(bridge: &ObjectPath, bridge_id: &str) -> Self {
        Self::new(bridge.clone(), PROTOCOL_INTERFACE, SignalKind::BridgeAdded).with_arg(bridge_id)
    }

    pub(crate) fn bridge_removed(bridge: &ObjectPath, bridge_id: &str) -> Self {
        Self::new(bridge.clone(), PROTOCOL_INTERFACE, SignalKind::BridgeRemoved).with_arg(bridge_id)
    }

    pub(crate) fn item_added(device: &ObjectPath, item_id: &str) -> Self {
        Self::new(device.clone(), DEVICE_INTERFACE, SignalKind::ItemAdded).with_arg(item_id)
    }

    pub(crate) fn item_removed(device: &ObjectPath, item_id: &str) -> Self {
        Self::new(device.clone(), DEVICE_INTERFACE, SignalKind::ItemRemoved).with_arg(item_id)
    }
}
