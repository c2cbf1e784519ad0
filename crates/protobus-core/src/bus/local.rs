// ── In-process bus ──
//
// A complete `BusConnection` that lives in the same process as the
// registry: object table, method dispatch, property tables with change
// callbacks, and a broadcast channel carrying every emitted signal.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::sync::broadcast;
use tracing::{debug, trace};

use super::object::{BusObject, MethodCall, MethodReply};
use super::property::{EmitMode, PropertyChange, PropertyTable};
use super::{BusConnection, PROPERTIES_INTERFACE, Signal, SignalKind};
use crate::error::BusError;
use crate::model::ObjectPath;
use crate::stream::SignalStream;

const SIGNAL_CHANNEL_SIZE: usize = 1024;

/// In-process bus connection.
///
/// Objects and property tables are stored in `DashMap`s keyed by path;
/// nothing is held locked while a method call is dispatched into the
/// registry.
pub struct LocalBus {
    objects: DashMap<ObjectPath, BusObject>,
    properties: DashMap<ObjectPath, PropertyTable>,
    signals: broadcast::Sender<Arc<Signal>>,
    connected: AtomicBool,
}

impl LocalBus {
    pub fn new() -> Self {
        Self::with_signal_capacity(SIGNAL_CHANNEL_SIZE)
    }

    /// Build with a custom signal buffer. Slow subscribers that fall
    /// further behind than `capacity` lose the oldest signals.
    pub fn with_signal_capacity(capacity: usize) -> Self {
        let (signals, _) = broadcast::channel(capacity.max(1));
        Self {
            objects: DashMap::new(),
            properties: DashMap::new(),
            signals,
            connected: AtomicBool::new(true),
        }
    }

    // ── Connection state ─────────────────────────────────────────────

    /// Drop the connection: every later export, emit or call fails with
    /// [`BusError::Disconnected`]. Already exported objects stay listed.
    pub fn disconnect(&self) {
        self.connected.store(false, Ordering::SeqCst);
        debug!("local bus disconnected");
    }

    /// Restore the connection. Objects that failed to export while
    /// disconnected are not retried.
    pub fn reconnect(&self) {
        self.connected.store(true, Ordering::SeqCst);
        debug!("local bus reconnected");
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn ensure_connected(&self) -> Result<(), BusError> {
        if self.is_connected() {
            Ok(())
        } else {
            Err(BusError::Disconnected)
        }
    }

    // ── Introspection ────────────────────────────────────────────────

    pub fn is_exported(&self, path: &ObjectPath) -> bool {
        self.objects.contains_key(path)
    }

    /// Sorted list of every exported path.
    pub fn object_paths(&self) -> Vec<ObjectPath> {
        let mut paths: Vec<ObjectPath> = self.objects.iter().map(|r| r.key().clone()).collect();
        paths.sort_unstable();
        paths
    }

    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    /// Subscribe to every signal emitted from now on.
    pub fn subscribe(&self) -> SignalStream {
        SignalStream::new(self.signals.subscribe())
    }

    // ── Remote-caller surface ────────────────────────────────────────

    /// Invoke a method on the object exported at `path`.
    pub async fn call(&self, path: &ObjectPath, call: MethodCall) -> Result<MethodReply, BusError> {
        self.ensure_connected()?;
        // Clone the handle out so no shard lock is held during dispatch.
        let object = self
            .objects
            .get(path)
            .map(|r| r.value().clone())
            .ok_or_else(|| BusError::UnknownObject {
                path: path.to_string(),
            })?;
        trace!(%path, method = call.name(), "dispatching method call");
        object.dispatch(path, call).await
    }

    /// Read a published property.
    pub fn get_property(
        &self,
        path: &ObjectPath,
        interface: &str,
        name: &str,
    ) -> Result<String, BusError> {
        let table = self
            .properties
            .get(path)
            .ok_or_else(|| unknown_property(interface, name))?;
        if table.interface() != interface {
            return Err(unknown_property(interface, name));
        }
        table
            .get(name)
            .map(|p| p.value.clone())
            .ok_or_else(|| unknown_property(interface, name))
    }

    /// Write a published property, routing through its change callback.
    pub fn set_property(
        &self,
        path: &ObjectPath,
        interface: &str,
        name: &str,
        value: impl Into<String>,
    ) -> Result<(), BusError> {
        self.ensure_connected()?;
        let value = value.into();

        let (callback, emit) = {
            let table = self
                .properties
                .get(path)
                .ok_or_else(|| unknown_property(interface, name))?;
            if table.interface() != interface {
                return Err(unknown_property(interface, name));
            }
            let prop = table
                .get(name)
                .ok_or_else(|| unknown_property(interface, name))?;
            if !prop.writable {
                return Err(BusError::PropertyReadOnly {
                    interface: interface.into(),
                    name: name.into(),
                });
            }
            (prop.on_change.clone(), prop.emit)
        };

        let value = match callback {
            Some(callback) => callback(&PropertyChange {
                path: path.clone(),
                interface: interface.into(),
                name: name.into(),
                value,
            })?,
            None => value,
        };

        if let Some(mut table) = self.properties.get_mut(path) {
            if let Some(prop) = table.get_mut(name) {
                prop.value.clone_from(&value);
            }
        }

        let changed = Signal::new(path.clone(), PROPERTIES_INTERFACE, SignalKind::PropertiesChanged)
            .with_arg(interface)
            .with_arg(name);
        match emit {
            EmitMode::True => self.broadcast(changed.with_arg(value)),
            EmitMode::Invalidates => self.broadcast(changed),
            EmitMode::False => {}
        }
        Ok(())
    }

    fn broadcast(&self, signal: Signal) {
        trace!(path = %signal.path, member = %signal.member(), "emitting signal");
        // No subscribers is not an error.
        let _ = self.signals.send(Arc::new(signal));
    }
}

impl Default for LocalBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BusConnection for LocalBus {
    async fn export(&self, path: &ObjectPath, object: BusObject) -> Result<(), BusError> {
        self.ensure_connected()?;
        match self.objects.entry(path.clone()) {
            Entry::Occupied(_) => Err(BusError::ObjectExists {
                path: path.to_string(),
            }),
            Entry::Vacant(slot) => {
                trace!(%path, ?object, "exported object");
                slot.insert(object);
                Ok(())
            }
        }
    }

    async fn unexport(&self, path: &ObjectPath) -> Result<(), BusError> {
        self.properties.remove(path);
        self.objects
            .remove(path)
            .map(|_| ())
            .ok_or_else(|| BusError::UnknownObject {
                path: path.to_string(),
            })
    }

    async fn export_properties(
        &self,
        path: &ObjectPath,
        table: PropertyTable,
    ) -> Result<(), BusError> {
        self.ensure_connected()?;
        self.properties.insert(path.clone(), table);
        Ok(())
    }

    async fn emit(&self, signal: Signal) -> Result<(), BusError> {
        self.ensure_connected()?;
        self.broadcast(signal);
        Ok(())
    }
}

fn unknown_property(interface: &str, name: &str) -> BusError {
    BusError::UnknownProperty {
        interface: interface.into(),
        name: name.into(),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Weak;

    use parking_lot::Mutex;

    use super::*;
    use crate::bus::Property;

    fn path(raw: &str) -> ObjectPath {
        ObjectPath::new(raw).unwrap()
    }

    fn dangling() -> BusObject {
        BusObject::Protocol(Weak::new())
    }

    #[tokio::test]
    async fn export_rejects_duplicate_paths() {
        let bus = LocalBus::new();
        bus.export(&path("/a"), dangling()).await.unwrap();
        let err = bus.export(&path("/a"), dangling()).await.unwrap_err();
        assert_eq!(err, BusError::ObjectExists { path: "/a".into() });
        assert_eq!(bus.object_count(), 1);
    }

    #[tokio::test]
    async fn unexport_unknown_path_fails() {
        let bus = LocalBus::new();
        let err = bus.unexport(&path("/nope")).await.unwrap_err();
        assert!(matches!(err, BusError::UnknownObject { .. }));
    }

    #[tokio::test]
    async fn call_on_dropped_entity_is_unknown_object() {
        let bus = LocalBus::new();
        bus.export(&path("/a"), dangling()).await.unwrap();
        let err = bus.call(&path("/a"), MethodCall::IsReady).await.unwrap_err();
        assert!(matches!(err, BusError::UnknownObject { .. }));
    }

    #[tokio::test]
    async fn disconnected_bus_fails_closed() {
        let bus = LocalBus::new();
        bus.disconnect();
        assert!(!bus.is_connected());
        assert_eq!(
            bus.export(&path("/a"), dangling()).await.unwrap_err(),
            BusError::Disconnected
        );
        let sig = Signal::device_added(&path("/a"), "d1");
        assert_eq!(bus.emit(sig).await.unwrap_err(), BusError::Disconnected);
    }

    #[tokio::test]
    async fn read_only_property_rejects_writes() {
        let bus = LocalBus::new();
        let table = PropertyTable::new("org.test").with("Name", Property::read_only("x"));
        bus.export_properties(&path("/a"), table).await.unwrap();

        assert_eq!(bus.get_property(&path("/a"), "org.test", "Name").unwrap(), "x");
        let err = bus
            .set_property(&path("/a"), "org.test", "Name", "y")
            .unwrap_err();
        assert!(matches!(err, BusError::PropertyReadOnly { .. }));
    }

    #[tokio::test]
    async fn writable_property_runs_callback_and_emits() {
        let bus = LocalBus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let table = PropertyTable::new("org.test").with(
            "Level",
            Property::writable(
                "INFO",
                EmitMode::True,
                Arc::new(move |c: &PropertyChange| {
                    sink.lock().push(c.value.clone());
                    Ok(c.value.to_uppercase())
                }),
            ),
        );
        bus.export_properties(&path("/a"), table).await.unwrap();
        let mut signals = bus.subscribe();

        bus.set_property(&path("/a"), "org.test", "Level", "debug")
            .unwrap();

        assert_eq!(*seen.lock(), vec!["debug".to_string()]);
        assert_eq!(bus.get_property(&path("/a"), "org.test", "Level").unwrap(), "DEBUG");
        let sig = signals.try_recv().unwrap();
        assert_eq!(sig.kind, SignalKind::PropertiesChanged);
        assert_eq!(sig.args, vec!["org.test", "Level", "DEBUG"]);
    }

    #[tokio::test]
    async fn rejected_write_keeps_value_and_is_silent() {
        let bus = LocalBus::new();
        let table = PropertyTable::new("org.test").with(
            "Level",
            Property::writable(
                "INFO",
                EmitMode::True,
                Arc::new(|_: &PropertyChange| {
                    Err(BusError::InvalidArgs {
                        message: "no".into(),
                    })
                }),
            ),
        );
        bus.export_properties(&path("/a"), table).await.unwrap();
        let mut signals = bus.subscribe();

        let err = bus
            .set_property(&path("/a"), "org.test", "Level", "LOUD")
            .unwrap_err();
        assert!(matches!(err, BusError::InvalidArgs { .. }));
        assert_eq!(bus.get_property(&path("/a"), "org.test", "Level").unwrap(), "INFO");
        assert!(signals.try_recv().is_none());
    }

    #[tokio::test]
    async fn wrong_interface_is_unknown_property() {
        let bus = LocalBus::new();
        let table = PropertyTable::new("org.test").with("Name", Property::read_only("x"));
        bus.export_properties(&path("/a"), table).await.unwrap();
        let err = bus.get_property(&path("/a"), "org.other", "Name").unwrap_err();
        assert!(matches!(err, BusError::UnknownProperty { .. }));
    }
}
