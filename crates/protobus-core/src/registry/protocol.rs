// ── Protocol registry ──
//
// One `Protocol` per bus object implementing the protocol interface: the
// root and every bridge. All structural mutation runs under `state`,
// which is held across the bus export and signal emission so observers
// never see a signal for an entity that is not yet (or no longer) in
// the map. A closed protocol has been removed from its parent and
// accepts no new devices, so nothing can be exported beneath it.
// Removed signals are only emitted for objects that were actually on
// the bus, mirroring the Added side.

use std::collections::HashMap;
use std::sync::Arc;

use arc_swap::ArcSwapOption;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::bus::{BusExporter, BusObject, Signal};
use crate::error::CoreError;
use crate::model::{Device, Item, NewDevice, ObjectPath};
use crate::notify::{Notification, Notifier};

#[derive(Debug, Default)]
struct ProtocolState {
    ready: bool,
    closed: bool,
    devices: HashMap<String, Arc<Device>>,
}

/// A registry of devices exported under one protocol path.
#[derive(Debug)]
pub struct Protocol {
    path: ObjectPath,
    exporter: BusExporter,
    notifier: ArcSwapOption<Notifier>,
    state: Mutex<ProtocolState>,
}

impl Protocol {
    /// Empty, not-ready protocol at `path`. Nothing is exported until
    /// devices are added.
    pub fn new(path: ObjectPath, exporter: BusExporter) -> Self {
        Self {
            path,
            exporter,
            notifier: ArcSwapOption::empty(),
            state: Mutex::new(ProtocolState::default()),
        }
    }

    pub fn path(&self) -> &ObjectPath {
        &self.path
    }

    /// Route add/remove callbacks through `notifier`.
    pub fn set_notifier(&self, notifier: Notifier) {
        self.notifier.store(Some(Arc::new(notifier)));
    }

    fn notify(&self, notification: Notification) {
        if let Some(notifier) = self.notifier.load_full() {
            notifier.dispatch(notification);
        }
    }

    // ── Readiness ────────────────────────────────────────────────────

    pub async fn is_ready(&self) -> bool {
        self.state.lock().await.ready
    }

    /// Mark the protocol ready. There is no way back.
    pub async fn set_ready(&self) {
        let mut state = self.state.lock().await;
        if !state.ready {
            state.ready = true;
            info!(path = %self.path, "protocol ready");
        }
    }

    // ── Devices ──────────────────────────────────────────────────────

    /// Register a device. Returns `true` if nothing was added: the id was
    /// already taken or the protocol has been closed.
    pub async fn add_device(self: &Arc<Self>, new_device: NewDevice) -> bool {
        let mut state = self.state.lock().await;
        if state.closed {
            warn!(device_id = %new_device.device_id, path = %self.path, "protocol closed; device refused");
            return true;
        }
        if state.devices.contains_key(&new_device.device_id) {
            debug!(device_id = %new_device.device_id, path = %self.path, "device already registered");
            return true;
        }

        let device_id = new_device.device_id.clone();
        let device = Arc::new(Device::new(new_device, self.path.child(&device_id)));
        state.devices.insert(device_id.clone(), Arc::clone(&device));

        let object = BusObject::Device {
            protocol: Arc::downgrade(self),
            device_id: device_id.clone(),
        };
        let exported = self.exporter.try_export(device.path(), object).await;

        self.notify(Notification::AddDevice(Arc::clone(&device)));
        if exported {
            self.exporter
                .emit(Signal::device_added(&self.path, &device_id))
                .await;
        }
        info!(%device_id, path = %device.path(), exported, "device added");
        false
    }

    /// Remove a device and every item it owns. Unknown ids are ignored.
    pub async fn remove_device(&self, device_id: &str) {
        let mut state = self.state.lock().await;
        if !self.remove_device_locked(&mut state, device_id).await {
            debug!(%device_id, path = %self.path, "remove of unknown device ignored");
        }
    }

    /// Remove every device and refuse any later add. Returns how many
    /// devices were removed.
    pub async fn close(&self) -> usize {
        let mut state = self.state.lock().await;
        state.closed = true;
        let mut ids: Vec<String> = state.devices.keys().cloned().collect();
        ids.sort_unstable();
        let mut removed = 0;
        for id in &ids {
            if self.remove_device_locked(&mut state, id).await {
                removed += 1;
            }
        }
        removed
    }

    async fn remove_device_locked(&self, state: &mut ProtocolState, device_id: &str) -> bool {
        let Some(device) = state.devices.get(device_id).cloned() else {
            return false;
        };

        {
            let mut items = device.lock_items();
            let dropped = items.len();
            items.clear();
            self.notify(Notification::RemoveDevice(device_id.to_owned()));
            debug!(%device_id, dropped, "cleared device items");
        }

        state.devices.remove(device_id);
        let unexported = self.exporter.unexport(device.path()).await;
        if unexported {
            self.exporter
                .emit(Signal::device_removed(&self.path, device_id))
                .await;
        }
        info!(%device_id, path = %self.path, unexported, "device removed");
        true
    }

    pub async fn is_closed(&self) -> bool {
        self.state.lock().await.closed
    }

    pub async fn device(&self, device_id: &str) -> Option<Arc<Device>> {
        self.state.lock().await.devices.get(device_id).cloned()
    }

    /// Sorted ids of every registered device.
    pub async fn device_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.state.lock().await.devices.keys().cloned().collect();
        ids.sort_unstable();
        ids
    }

    pub async fn device_count(&self) -> usize {
        self.state.lock().await.devices.len()
    }

    // ── Items ────────────────────────────────────────────────────────

    /// Add an item to a device. Returns `Ok(true)` if the item already
    /// existed.
    pub async fn add_item(&self, device_id: &str, item_id: &str) -> Result<bool, CoreError> {
        let state = self.state.lock().await;
        let device = lookup(&state, device_id)?;

        let existed = {
            let mut items = device.lock_items();
            if items.contains_key(item_id) {
                true
            } else {
                let item = Item {
                    device_id: device_id.to_owned(),
                    item_id: item_id.to_owned(),
                };
                items.insert(item_id.to_owned(), item.clone());
                self.notify(Notification::AddItem(item));
                false
            }
        };

        if existed {
            debug!(%device_id, %item_id, "item already registered");
        } else {
            self.exporter
                .emit(Signal::item_added(device.path(), item_id))
                .await;
            debug!(%device_id, %item_id, "item added");
        }
        Ok(existed)
    }

    /// Remove an item from a device. A missing item is ignored; a
    /// missing device is an error.
    pub async fn remove_item(&self, device_id: &str, item_id: &str) -> Result<(), CoreError> {
        let state = self.state.lock().await;
        let device = lookup(&state, device_id)?;

        let removed = {
            let mut items = device.lock_items();
            let removed = items.remove(item_id).is_some();
            if removed {
                self.notify(Notification::RemoveItem {
                    device_id: device_id.to_owned(),
                    item_id: item_id.to_owned(),
                });
            }
            removed
        };

        if removed {
            self.exporter
                .emit(Signal::item_removed(device.path(), item_id))
                .await;
            debug!(%device_id, %item_id, "item removed");
        } else {
            debug!(%device_id, %item_id, "remove of unknown item ignored");
        }
        Ok(())
    }
}

fn lookup(state: &ProtocolState, device_id: &str) -> Result<Arc<Device>, CoreError> {
    state
        .devices
        .get(device_id)
        .cloned()
        .ok_or_else(|| CoreError::DeviceNotFound {
            identifier: device_id.to_owned(),
        })
}
