// ── Registry → bus bridge ──
//
// Thin wrapper over an optional connection. Strict operations return
// `CoreError` (used for the root at startup); the `try_*` and emit
// helpers log and carry on, leaving the registry valid but unmirrored.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, warn};

use super::object::BusObject;
use super::property::PropertyTable;
use super::{BusConnection, Signal};
use crate::error::CoreError;
use crate::model::ObjectPath;

/// The registry's capability to publish itself on the bus.
#[derive(Clone)]
pub struct BusExporter {
    conn: Option<Arc<dyn BusConnection>>,
}

impl BusExporter {
    pub fn new(conn: Arc<dyn BusConnection>) -> Self {
        Self { conn: Some(conn) }
    }

    /// An exporter with no connection; every export fails closed.
    pub fn detached() -> Self {
        Self { conn: None }
    }

    /// Export `object`, reporting failure to the caller.
    pub(crate) async fn export(&self, path: &ObjectPath, object: BusObject) -> Result<(), CoreError> {
        let conn = self.connection(path)?;
        conn.export(path, object)
            .await
            .map_err(|source| CoreError::Export {
                path: path.to_string(),
                source,
            })
    }

    /// Publish a property table, reporting failure to the caller.
    pub(crate) async fn export_properties(
        &self,
        path: &ObjectPath,
        table: PropertyTable,
    ) -> Result<(), CoreError> {
        let conn = self.connection(path)?;
        conn.export_properties(path, table)
            .await
            .map_err(|source| CoreError::Export {
                path: path.to_string(),
                source,
            })
    }

    /// Export `object`; on failure log a warning and return `false`.
    pub(crate) async fn try_export(&self, path: &ObjectPath, object: BusObject) -> bool {
        match self.export(path, object).await {
            Ok(()) => true,
            Err(e) => {
                warn!(%path, error = %e, "bus export failed; entity is registered without a bus object");
                false
            }
        }
    }

    /// Take down the object at `path`. Returns `true` if one was there.
    pub(crate) async fn unexport(&self, path: &ObjectPath) -> bool {
        let Some(conn) = &self.conn else { return false };
        match conn.unexport(path).await {
            Ok(()) => true,
            Err(e) => {
                debug!(%path, error = %e, "unexport failed");
                false
            }
        }
    }

    pub(crate) async fn emit(&self, signal: Signal) {
        let Some(conn) = &self.conn else {
            debug!(path = %signal.path, member = %signal.member(), "no bus connection; signal dropped");
            return;
        };
        let path = signal.path.clone();
        let member = signal.member();
        if let Err(e) = conn.emit(signal).await {
            warn!(%path, %member, error = %e, "failed to emit signal");
        }
    }

    fn connection(&self, path: &ObjectPath) -> Result<&Arc<dyn BusConnection>, CoreError> {
        self.conn.as_ref().ok_or_else(|| {
            warn!(%path, "unable to export: no bus connection");
            CoreError::BusUnavailable {
                path: path.to_string(),
            }
        })
    }
}

impl fmt::Debug for BusExporter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BusExporter")
            .field("connected", &self.conn.is_some())
            .finish()
    }
}
