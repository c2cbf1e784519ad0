// ── Exported objects and method dispatch ──
//
// A `BusObject` is the bus-side handle of a registry entity. Handles are
// weak: the registry owns its entities, the bus only points at them, so
// dropping the root tears down the whole tree even while still exported.

use std::fmt;
use std::sync::{Arc, Weak};

use super::{DEVICE_INTERFACE, PROTOCOL_INTERFACE};
use crate::error::BusError;
use crate::model::{NewDevice, ObjectPath};
use crate::registry::{Protocol, RootProto};

/// Method calls accepted by exported objects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MethodCall {
    // Protocol (root and bridge)
    IsReady,
    AddDevice(NewDevice),
    RemoveDevice { device_id: String },

    // Root only
    AddBridge { bridge_id: String },
    RemoveBridge { bridge_id: String },

    // Device
    AddItem { item_id: String },
    RemoveItem { item_id: String },
}

impl MethodCall {
    pub fn name(&self) -> &'static str {
        match self {
            Self::IsReady => "IsReady",
            Self::AddDevice(_) => "AddDevice",
            Self::RemoveDevice { .. } => "RemoveDevice",
            Self::AddBridge { .. } => "AddBridge",
            Self::RemoveBridge { .. } => "RemoveBridge",
            Self::AddItem { .. } => "AddItem",
            Self::RemoveItem { .. } => "RemoveItem",
        }
    }
}

/// Reply to a successful method call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MethodReply {
    Unit,
    Bool(bool),
}

impl MethodReply {
    pub fn as_bool(self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(b),
            Self::Unit => None,
        }
    }
}

/// Bus-side handle of an exported entity.
#[derive(Clone)]
pub enum BusObject {
    /// The root protocol: protocol methods plus bridge management.
    Root(Weak<RootProto>),
    /// A bridge protocol.
    Protocol(Weak<Protocol>),
    /// A device owned by `protocol`.
    Device {
        protocol: Weak<Protocol>,
        device_id: String,
    },
}

impl BusObject {
    pub fn interface(&self) -> &'static str {
        match self {
            Self::Root(_) | Self::Protocol(_) => PROTOCOL_INTERFACE,
            Self::Device { .. } => DEVICE_INTERFACE,
        }
    }

    /// Run `call` against the entity behind this handle.
    pub async fn dispatch(
        &self,
        path: &ObjectPath,
        call: MethodCall,
    ) -> Result<MethodReply, BusError> {
        match self {
            Self::Root(root) => {
                let root = upgrade(root, path)?;
                match call {
                    MethodCall::AddBridge { bridge_id } => {
                        Ok(MethodReply::Bool(root.add_bridge(&bridge_id).await))
                    }
                    MethodCall::RemoveBridge { bridge_id } => {
                        root.remove_bridge(&bridge_id).await;
                        Ok(MethodReply::Unit)
                    }
                    other => dispatch_protocol(root.protocol(), other).await,
                }
            }
            Self::Protocol(protocol) => {
                let protocol = upgrade(protocol, path)?;
                dispatch_protocol(&protocol, call).await
            }
            Self::Device {
                protocol,
                device_id,
            } => {
                let protocol = upgrade(protocol, path)?;
                match call {
                    MethodCall::AddItem { item_id } => Ok(MethodReply::Bool(
                        protocol.add_item(device_id, &item_id).await?,
                    )),
                    MethodCall::RemoveItem { item_id } => {
                        protocol.remove_item(device_id, &item_id).await?;
                        Ok(MethodReply::Unit)
                    }
                    other => Err(unknown_method(DEVICE_INTERFACE, &other)),
                }
            }
        }
    }
}

async fn dispatch_protocol(
    protocol: &Arc<Protocol>,
    call: MethodCall,
) -> Result<MethodReply, BusError> {
    match call {
        MethodCall::IsReady => Ok(MethodReply::Bool(protocol.is_ready().await)),
        MethodCall::AddDevice(new_device) => {
            Ok(MethodReply::Bool(protocol.add_device(new_device).await))
        }
        MethodCall::RemoveDevice { device_id } => {
            protocol.remove_device(&device_id).await;
            Ok(MethodReply::Unit)
        }
        other => Err(unknown_method(PROTOCOL_INTERFACE, &other)),
    }
}

fn upgrade<T>(weak: &Weak<T>, path: &ObjectPath) -> Result<Arc<T>, BusError> {
    weak.upgrade().ok_or_else(|| BusError::UnknownObject {
        path: path.to_string(),
    })
}

fn unknown_method(interface: &str, call: &MethodCall) -> BusError {
    BusError::UnknownMethod {
        interface: interface.into(),
        method: call.name().into(),
    }
}

impl fmt::Debug for BusObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Root(_) => f.write_str("BusObject::Root"),
            Self::Protocol(_) => f.write_str("BusObject::Protocol"),
            Self::Device { device_id, .. } => {
                write!(f, "BusObject::Device({device_id})")
            }
        }
    }
}
