//! Concurrent protocol/bridge/device registry mirrored onto an IPC bus.
//!
//! - **[`RootProto`]**: top-level protocol. Owns the bridge map and the
//!   writable `LogLevel` property, and is exported with
//!   [`export()`](RootProto::export).
//!
//! - **[`Protocol`]**: a registry of devices behind one bus path. Add and
//!   remove run under a per-protocol lock that is held across the bus
//!   export and signal, so a signal never describes state the map does
//!   not hold.
//!
//! - **[`BusConnection`]**: the transport seam. [`LocalBus`] is the
//!   in-process implementation, with method dispatch, property tables and
//!   a broadcast signal channel consumed through [`SignalStream`].
//!
//! - **[`ProtocolCallbacks`]**: application hooks, delivered in order by
//!   a [`Notifier`] worker without ever blocking a registry lock.

pub mod bus;
pub mod config;
pub mod error;
pub mod log_level;
pub mod model;
pub mod notify;
pub mod registry;
pub mod stream;

// ── Primary re-exports ──────────────────────────────────────────────
pub use bus::{BusConnection, BusExporter, LocalBus, MethodCall, MethodReply, Signal, SignalKind};
pub use config::RegistryConfig;
pub use error::{BusError, CoreError};
pub use log_level::{LogLevel, Verbosity};
pub use model::{Device, Item, NewDevice, ObjectPath};
pub use notify::{Notification, Notifier, ProtocolCallbacks};
pub use registry::{Bridge, Protocol, RootProto};
pub use stream::{SignalFilter, SignalStream};
