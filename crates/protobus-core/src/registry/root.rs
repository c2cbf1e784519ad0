// ── Root protocol ──
//
// The root is a protocol in its own right plus a map of bridges, each a
// child protocol with its own bus object. The bridge map lock is always
// taken before a bridge's protocol lock. Removing a bridge closes its
// protocol first, so a handle or bus call that raced the removal cannot
// export anything under the vanished bridge.

use std::collections::HashMap;
use std::sync::Arc;

use arc_swap::ArcSwapOption;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::protocol::Protocol;
use crate::bus::{
    BusConnection, BusExporter, BusObject, EmitMode, PROTOCOL_INTERFACE, PROPERTY_LOG_LEVEL,
    Property, PropertyChange, PropertyTable, Signal,
};
use crate::config::RegistryConfig;
use crate::error::{BusError, CoreError};
use crate::log_level::LogLevel;
use crate::model::{NewDevice, ObjectPath};
use crate::notify::{Notifier, ProtocolCallbacks};

/// A named child protocol of the root.
#[derive(Debug, Clone)]
pub struct Bridge {
    id: String,
    protocol: Arc<Protocol>,
}

impl Bridge {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn protocol(&self) -> &Arc<Protocol> {
        &self.protocol
    }
}

/// Top-level protocol: owns the bridges and the `LogLevel` property.
#[derive(Debug)]
pub struct RootProto {
    protocol: Arc<Protocol>,
    bridges: Mutex<HashMap<String, Bridge>>,
    exporter: BusExporter,
    config: RegistryConfig,
    log_level: Arc<LogLevel>,
    notifier: ArcSwapOption<Notifier>,
}

impl RootProto {
    /// Build the root protocol and export it on `conn`.
    ///
    /// Fails when there is no connection or the root object cannot be
    /// exported. A failure to publish the property table is only logged.
    pub async fn export(
        conn: Option<Arc<dyn BusConnection>>,
        config: RegistryConfig,
        log_level: Arc<LogLevel>,
    ) -> Result<Arc<Self>, CoreError> {
        config.validate()?;
        let path = config.root_path()?;
        let exporter = conn.map_or_else(BusExporter::detached, BusExporter::new);

        let root = Arc::new(Self {
            protocol: Arc::new(Protocol::new(path.clone(), exporter.clone())),
            bridges: Mutex::new(HashMap::new()),
            exporter,
            config,
            log_level,
            notifier: ArcSwapOption::empty(),
        });

        root.exporter
            .export(&path, BusObject::Root(Arc::downgrade(&root)))
            .await?;

        let table = log_level_table(&root.log_level);
        if let Err(e) = root.exporter.export_properties(&path, table).await {
            warn!(%path, error = %e, "failed to publish LogLevel property");
        }

        info!(%path, protocol = %root.config.protocol_name, "root protocol exported");
        Ok(root)
    }

    pub fn protocol(&self) -> &Arc<Protocol> {
        &self.protocol
    }

    pub fn path(&self) -> &ObjectPath {
        self.protocol.path()
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    pub fn log_level(&self) -> &Arc<LogLevel> {
        &self.log_level
    }

    // ── Callbacks ────────────────────────────────────────────────────

    /// Install `notifier` on the root and every current bridge. Bridges
    /// added later inherit it.
    pub async fn set_notifier(&self, notifier: Notifier) {
        let bridges = self.bridges.lock().await;
        self.protocol.set_notifier(notifier.clone());
        for bridge in bridges.values() {
            bridge.protocol.set_notifier(notifier.clone());
        }
        self.notifier.store(Some(Arc::new(notifier)));
    }

    /// Start a notifier worker for `callbacks` and install it.
    pub async fn register_callbacks(
        &self,
        callbacks: Arc<dyn ProtocolCallbacks>,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        let (notifier, handle) =
            Notifier::spawn(callbacks, self.config.notify_backlog_warn, cancel);
        self.set_notifier(notifier).await;
        handle
    }

    // ── Root protocol shortcuts ──────────────────────────────────────

    pub async fn is_ready(&self) -> bool {
        self.protocol.is_ready().await
    }

    pub async fn set_ready(&self) {
        self.protocol.set_ready().await;
    }

    pub async fn add_device(&self, new_device: NewDevice) -> bool {
        self.protocol.add_device(new_device).await
    }

    pub async fn remove_device(&self, device_id: &str) {
        self.protocol.remove_device(device_id).await;
    }

    // ── Bridges ──────────────────────────────────────────────────────

    /// Create and export a bridge. Returns `true` if nothing was added:
    /// the id was already taken or the root has been shut down.
    pub async fn add_bridge(&self, bridge_id: &str) -> bool {
        let mut bridges = self.bridges.lock().await;
        if self.protocol.is_closed().await {
            warn!(%bridge_id, "root shut down; bridge refused");
            return true;
        }
        if bridges.contains_key(bridge_id) {
            debug!(%bridge_id, "bridge already registered");
            return true;
        }

        let path = match self.config.bridge_path(bridge_id) {
            Ok(path) => path,
            Err(e) => {
                // Escaping makes this unreachable for a validated config.
                error!(%bridge_id, error = %e, "cannot derive bridge path");
                return false;
            }
        };

        let protocol = Arc::new(Protocol::new(path.clone(), self.exporter.clone()));
        if let Some(notifier) = self.notifier.load_full() {
            protocol.set_notifier(Notifier::clone(&notifier));
        }
        bridges.insert(
            bridge_id.to_owned(),
            Bridge {
                id: bridge_id.to_owned(),
                protocol: Arc::clone(&protocol),
            },
        );

        let exported = self
            .exporter
            .try_export(&path, BusObject::Protocol(Arc::downgrade(&protocol)))
            .await;
        if exported {
            self.exporter
                .emit(Signal::bridge_added(&path, bridge_id))
                .await;
        }
        info!(%bridge_id, %path, exported, "bridge added");
        false
    }

    /// Remove a bridge with all its devices and items. Unknown ids are
    /// ignored.
    pub async fn remove_bridge(&self, bridge_id: &str) {
        let mut bridges = self.bridges.lock().await;
        if !self.remove_bridge_locked(&mut bridges, bridge_id).await {
            debug!(%bridge_id, "remove of unknown bridge ignored");
        }
    }

    async fn remove_bridge_locked(
        &self,
        bridges: &mut HashMap<String, Bridge>,
        bridge_id: &str,
    ) -> bool {
        let Some(protocol) = bridges.get(bridge_id).map(|b| Arc::clone(&b.protocol)) else {
            return false;
        };

        let devices = protocol.close().await;
        bridges.remove(bridge_id);

        let path = protocol.path();
        let unexported = self.exporter.unexport(path).await;
        if unexported {
            self.exporter
                .emit(Signal::bridge_removed(path, bridge_id))
                .await;
        }
        info!(%bridge_id, %path, devices, unexported, "bridge removed");
        true
    }

    pub async fn bridge(&self, bridge_id: &str) -> Option<Bridge> {
        self.bridges.lock().await.get(bridge_id).cloned()
    }

    /// Sorted ids of every registered bridge.
    pub async fn bridge_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.bridges.lock().await.keys().cloned().collect();
        ids.sort_unstable();
        ids
    }

    /// Tear the whole tree down: every bridge, every root device, then
    /// the root object itself. Later adds of bridges or root devices are
    /// refused.
    pub async fn shutdown(&self) {
        let mut bridges = self.bridges.lock().await;
        let mut ids: Vec<String> = bridges.keys().cloned().collect();
        ids.sort_unstable();
        for id in &ids {
            self.remove_bridge_locked(&mut bridges, id).await;
        }

        let devices = self.protocol.close().await;
        drop(bridges);
        self.exporter.unexport(self.path()).await;
        info!(path = %self.path(), bridges = ids.len(), devices, "root protocol shut down");
    }
}

fn log_level_table(log_level: &Arc<LogLevel>) -> PropertyTable {
    let owner = Arc::clone(log_level);
    let on_change = Arc::new(move |change: &PropertyChange| apply_log_level(&owner, change));
    PropertyTable::new(PROTOCOL_INTERFACE).with(
        PROPERTY_LOG_LEVEL,
        Property::writable(log_level.get().to_string(), EmitMode::True, on_change),
    )
}

/// Change callback of the `LogLevel` property. The stored value is the
/// canonical level name, whatever case the writer used.
fn apply_log_level(log_level: &LogLevel, change: &PropertyChange) -> Result<String, BusError> {
    match log_level.set_from_str(&change.value) {
        Ok(level) => {
            info!(%level, "log level changed");
            Ok(level.to_string())
        }
        Err(e) => {
            error!(value = %change.value, error = %e, "rejected log level change");
            Err(BusError::InvalidArgs {
                message: e.to_string(),
            })
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::bus::{LocalBus, SignalKind};
    use crate::log_level::Verbosity;

    async fn root(bus: &Arc<LocalBus>) -> Arc<RootProto> {
        RootProto::export(
            Some(bus.clone()),
            RegistryConfig::new("knx"),
            Arc::new(LogLevel::default()),
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn export_without_connection_fails() {
        let err = RootProto::export(None, RegistryConfig::new("knx"), Arc::default())
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::BusUnavailable { .. }));
    }

    #[tokio::test]
    async fn export_on_taken_path_fails() {
        let bus = Arc::new(LocalBus::new());
        let _first = root(&bus).await;
        let err = RootProto::export(Some(bus.clone()), RegistryConfig::new("knx"), Arc::default())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            CoreError::Export {
                source: BusError::ObjectExists { .. },
                ..
            }
        ));
    }

    #[tokio::test]
    async fn bridge_path_uses_suffix() {
        let bus = Arc::new(LocalBus::new());
        let root = root(&bus).await;
        assert!(!root.add_bridge("b1").await);

        let bridge = root.bridge("b1").await.unwrap();
        assert_eq!(bridge.id(), "b1");
        let path = bridge.protocol().path();
        assert_eq!(path.as_str(), "/org/protobus/knx_b1");
        assert!(bus.is_exported(path));
    }

    #[tokio::test]
    async fn log_level_property_accepts_valid_levels() {
        let bus = Arc::new(LocalBus::new());
        let root = root(&bus).await;
        let path = root.path().clone();

        assert_eq!(
            bus.get_property(&path, PROTOCOL_INTERFACE, PROPERTY_LOG_LEVEL)
                .unwrap(),
            "INFO"
        );
        let mut signals = bus.subscribe();
        bus.set_property(&path, PROTOCOL_INTERFACE, PROPERTY_LOG_LEVEL, "debug")
            .unwrap();
        assert_eq!(root.log_level().get(), Verbosity::Debug);
        assert_eq!(
            bus.get_property(&path, PROTOCOL_INTERFACE, PROPERTY_LOG_LEVEL)
                .unwrap(),
            "DEBUG"
        );
        let sig = signals.try_recv().unwrap();
        assert_eq!(sig.args.last().map(String::as_str), Some("DEBUG"));

        bus.set_property(&path, PROTOCOL_INTERFACE, PROPERTY_LOG_LEVEL, "warn")
            .unwrap();
        assert_eq!(
            bus.get_property(&path, PROTOCOL_INTERFACE, PROPERTY_LOG_LEVEL)
                .unwrap(),
            "WARNING"
        );
    }

    #[tokio::test]
    async fn log_level_property_rejects_garbage() {
        let bus = Arc::new(LocalBus::new());
        let root = root(&bus).await;
        let path = root.path().clone();

        let err = bus
            .set_property(&path, PROTOCOL_INTERFACE, PROPERTY_LOG_LEVEL, "LOUD")
            .unwrap_err();
        assert_eq!(err.name(), "org.freedesktop.DBus.Error.InvalidArgs");
        assert_eq!(root.log_level().get(), Verbosity::Info);
    }

    #[tokio::test]
    async fn shutdown_unexports_everything() {
        let bus = Arc::new(LocalBus::new());
        let root = root(&bus).await;
        root.add_bridge("b1").await;
        root.bridge("b1")
            .await
            .unwrap()
            .protocol()
            .add_device(NewDevice::with_id("d1"))
            .await;
        root.add_device(NewDevice::with_id("d2")).await;
        let mut signals = bus.subscribe();

        root.shutdown().await;

        assert_eq!(bus.object_count(), 0);
        assert!(root.bridge_ids().await.is_empty());
        let kinds: Vec<SignalKind> = signals.drain().iter().map(|s| s.kind).collect();
        assert_eq!(
            kinds,
            vec![
                SignalKind::DeviceRemoved,
                SignalKind::BridgeRemoved,
                SignalKind::DeviceRemoved
            ]
        );
    }

    #[tokio::test]
    async fn shutdown_refuses_later_adds() {
        let bus = Arc::new(LocalBus::new());
        let root = root(&bus).await;
        root.shutdown().await;

        assert!(root.add_bridge("b1").await);
        assert!(root.add_device(NewDevice::with_id("d1")).await);
        assert!(root.bridge_ids().await.is_empty());
        assert_eq!(bus.object_count(), 0);
    }
}
