// ── Filter predicates for signal streams ──

use crate::bus::{Signal, SignalKind};
use crate::model::ObjectPath;

/// Filter predicate for signal subscriptions.
pub enum SignalFilter {
    All,
    ByKind(SignalKind),
    /// Signals emitted exactly on this path.
    ByPath(ObjectPath),
    /// Signals emitted on this path or any path below it.
    Under(ObjectPath),
    Custom(Box<dyn Fn(&Signal) -> bool + Send + Sync>),
}

impl SignalFilter {
    pub fn matches(&self, signal: &Signal) -> bool {
        match self {
            Self::All => true,
            Self::ByKind(kind) => signal.kind == *kind,
            Self::ByPath(path) => signal.path == *path,
            Self::Under(path) => signal.path.starts_with(path),
            Self::Custom(f) => f(signal),
        }
    }
}
