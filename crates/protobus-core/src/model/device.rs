// ── Device and item domain types ──

use std::collections::HashMap;

use bytes::Bytes;
use parking_lot::{Mutex, MutexGuard};
use serde::{Deserialize, Serialize};

use super::path::ObjectPath;

/// Smallest addressable leaf, owned by a device.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Item {
    pub device_id: String,
    pub item_id: String,
}

/// Arguments of an `AddDevice` call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewDevice {
    pub device_id: String,
    pub com_id: String,
    pub type_id: String,
    pub type_version: String,
    /// Opaque, protocol-specific options blob.
    pub options: Bytes,
}

impl NewDevice {
    /// Device with only an id; the remaining attributes are empty.
    pub fn with_id(device_id: impl Into<String>) -> Self {
        Self {
            device_id: device_id.into(),
            ..Self::default()
        }
    }
}

/// A registered device. Identity fields are immutable; only the item
/// map changes over the device's lifetime.
#[derive(Debug)]
pub struct Device {
    id: String,
    com_id: String,
    type_id: String,
    type_version: String,
    options: Bytes,
    path: ObjectPath,
    /// Guards the item map. Always taken after the owning protocol's lock.
    items: Mutex<HashMap<String, Item>>,
}

impl Device {
    pub(crate) fn new(init: NewDevice, path: ObjectPath) -> Self {
        Self {
            id: init.device_id,
            com_id: init.com_id,
            type_id: init.type_id,
            type_version: init.type_version,
            options: init.options,
            path,
            items: Mutex::new(HashMap::new()),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn com_id(&self) -> &str {
        &self.com_id
    }

    pub fn type_id(&self) -> &str {
        &self.type_id
    }

    pub fn type_version(&self) -> &str {
        &self.type_version
    }

    pub fn options(&self) -> &Bytes {
        &self.options
    }

    /// Bus path the device is exported at.
    pub fn path(&self) -> &ObjectPath {
        &self.path
    }

    /// Sorted ids of the items currently owned by this device.
    pub fn item_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.items.lock().keys().cloned().collect();
        ids.sort_unstable();
        ids
    }

    pub fn item_count(&self) -> usize {
        self.items.lock().len()
    }

    pub fn has_item(&self, item_id: &str) -> bool {
        self.items.lock().contains_key(item_id)
    }

    /// Take the item lock. Callers must already hold the owning
    /// protocol's lock and must not `.await` while the guard lives.
    pub(crate) fn lock_items(&self) -> MutexGuard<'_, HashMap<String, Item>> {
        self.items.lock()
    }
}
