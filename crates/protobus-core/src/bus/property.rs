// ── Published properties ──

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::error::BusError;
use crate::model::ObjectPath;

/// Invoked when an external writer sets a property. `Ok` carries the
/// value to store and announce, which may be a normalized form of the
/// written one. Returning an error rejects the write; the stored value
/// is left unchanged.
pub type PropertyCallback = Arc<dyn Fn(&PropertyChange) -> Result<String, BusError> + Send + Sync>;

/// How a property change is announced.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum EmitMode {
    /// Emit `PropertiesChanged` carrying the new value.
    #[default]
    True,
    /// Emit `PropertiesChanged` naming the property, without the value.
    Invalidates,
    /// Do not announce.
    False,
}

/// A proposed write, as handed to the change callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyChange {
    pub path: ObjectPath,
    pub interface: String,
    pub name: String,
    pub value: String,
}

#[derive(Clone)]
pub struct Property {
    pub value: String,
    pub writable: bool,
    pub emit: EmitMode,
    pub on_change: Option<PropertyCallback>,
}

impl Property {
    pub fn read_only(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            writable: false,
            emit: EmitMode::False,
            on_change: None,
        }
    }

    pub fn writable(value: impl Into<String>, emit: EmitMode, on_change: PropertyCallback) -> Self {
        Self {
            value: value.into(),
            writable: true,
            emit,
            on_change: Some(on_change),
        }
    }
}

impl fmt::Debug for Property {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Property")
            .field("value", &self.value)
            .field("writable", &self.writable)
            .field("emit", &self.emit)
            .field("on_change", &self.on_change.is_some())
            .finish()
    }
}

/// Properties of one interface on one object.
#[derive(Debug, Clone)]
pub struct PropertyTable {
    interface: String,
    props: BTreeMap<String, Property>,
}

impl PropertyTable {
    pub fn new(interface: impl Into<String>) -> Self {
        Self {
            interface: interface.into(),
            props: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with(mut self, name: impl Into<String>, prop: Property) -> Self {
        self.props.insert(name.into(), prop);
        self
    }

    pub fn interface(&self) -> &str {
        &self.interface
    }

    pub fn get(&self, name: &str) -> Option<&Property> {
        self.props.get(name)
    }

    pub(crate) fn get_mut(&mut self, name: &str) -> Option<&mut Property> {
        self.props.get_mut(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.props.keys().map(String::as_str)
    }
}
