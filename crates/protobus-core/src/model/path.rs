// ── Object paths ──
//
// Every exported entity is addressed by an `ObjectPath`. Protocol paths
// are `<prefix><name>`, bridge paths `<prefix><name>_<bridge>`, device
// paths `<protocol path>/<device>`. Entity ids are escaped into path
// elements so that distinct ids never collide on the bus.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// A validated bus object path (`/a/b_c/d`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ObjectPath(String);

impl ObjectPath {
    /// Validate a raw path string.
    ///
    /// Rules: starts with `/`; elements are non-empty and made of
    /// `[A-Za-z0-9_]`; no trailing `/` except for the root path itself.
    pub fn new(raw: impl Into<String>) -> Result<Self, CoreError> {
        let raw = raw.into();
        validate(&raw)?;
        Ok(Self(raw))
    }

    /// Path of a root protocol: `<prefix><name>`.
    pub fn protocol(prefix: &str, name: &str) -> Result<Self, CoreError> {
        Self::new(format!("{prefix}{name}"))
    }

    /// Path of a bridge protocol: `<prefix><name>_<escaped bridge id>`.
    pub fn bridge(prefix: &str, name: &str, bridge_id: &str) -> Result<Self, CoreError> {
        Self::new(format!("{prefix}{name}_{}", escape_element(bridge_id)))
    }

    /// Child path for an entity id, escaping it into a single element.
    pub fn child(&self, id: &str) -> Self {
        let element = escape_element(id);
        if self.0 == "/" {
            Self(format!("/{element}"))
        } else {
            Self(format!("{}/{element}", self.0))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether `self` is `other` or lives underneath it.
    pub fn starts_with(&self, other: &ObjectPath) -> bool {
        if other.0 == "/" || self.0 == other.0 {
            return true;
        }
        self.0
            .strip_prefix(other.0.as_str())
            .is_some_and(|rest| rest.starts_with('/'))
    }
}

/// Escape an arbitrary id into a valid path element.
///
/// ASCII alphanumerics pass through; every other byte becomes `_xx`
/// (lower-case hex). The empty id maps to a lone `_`, which no escaped
/// id can produce.
pub fn escape_element(raw: &str) -> String {
    if raw.is_empty() {
        return "_".into();
    }
    let mut out = String::with_capacity(raw.len());
    for b in raw.bytes() {
        if b.is_ascii_alphanumeric() {
            out.push(char::from(b));
        } else {
            out.push('_');
            out.push_str(&format!("{b:02x}"));
        }
    }
    out
}

fn validate(raw: &str) -> Result<(), CoreError> {
    let invalid = |reason: &str| CoreError::InvalidPath {
        path: raw.to_owned(),
        reason: reason.to_owned(),
    };

    let Some(rest) = raw.strip_prefix('/') else {
        return Err(invalid("must start with '/'"));
    };
    if rest.is_empty() {
        return Ok(());
    }
    for element in rest.split('/') {
        if element.is_empty() {
            return Err(invalid("empty path element"));
        }
        if !element.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_') {
            return Err(invalid("elements may only contain [A-Za-z0-9_]"));
        }
    }
    Ok(())
}

impl fmt::Display for ObjectPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ObjectPath {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for ObjectPath {
    type Error = CoreError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<ObjectPath> for String {
    fn from(p: ObjectPath) -> Self {
        p.0
    }
}

impl AsRef<str> for ObjectPath {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn protocol_and_bridge_paths() {
        let root = ObjectPath::protocol("/org/protobus/", "knx").unwrap();
        assert_eq!(root.as_str(), "/org/protobus/knx");

        let bridge = ObjectPath::bridge("/org/protobus/", "knx", "b1").unwrap();
        assert_eq!(bridge.as_str(), "/org/protobus/knx_b1");
    }

    #[test]
    fn bridge_id_is_escaped() {
        let bridge = ObjectPath::bridge("/p/", "knx", "gw-1").unwrap();
        assert_eq!(bridge.as_str(), "/p/knx_gw_2d1");
    }

    #[test]
    fn child_escapes_ids() {
        let root = ObjectPath::new("/p/knx").unwrap();
        assert_eq!(root.child("dev1").as_str(), "/p/knx/dev1");
        assert_eq!(root.child("1.2.3").as_str(), "/p/knx/1_2e2_2e3");
        assert_eq!(root.child("").as_str(), "/p/knx/_");
    }

    #[test]
    fn escaping_is_injective_for_underscores() {
        assert_ne!(escape_element("a_b"), escape_element("a-b"));
        assert_eq!(escape_element("a_b"), "a_5fb");
    }

    #[test]
    fn rejects_malformed_paths() {
        assert!(ObjectPath::new("relative").is_err());
        assert!(ObjectPath::new("/trailing/").is_err());
        assert!(ObjectPath::new("/double//slash").is_err());
        assert!(ObjectPath::new("/bad-char").is_err());
        assert!(ObjectPath::protocol("/p/", "has space").is_err());
    }

    #[test]
    fn root_path_is_valid() {
        let root = ObjectPath::new("/").unwrap();
        assert_eq!(root.child("x").as_str(), "/x");
    }

    #[test]
    fn starts_with_respects_element_boundaries() {
        let proto = ObjectPath::new("/p/knx").unwrap();
        let dev = proto.child("d1");
        let bridge = ObjectPath::new("/p/knx_b1").unwrap();

        assert!(dev.starts_with(&proto));
        assert!(proto.starts_with(&proto));
        assert!(!bridge.starts_with(&proto));
    }

    #[test]
    fn from_str_round_trips_display() {
        let p: ObjectPath = "/a/b".parse().unwrap();
        assert_eq!(p.to_string(), "/a/b");
    }
}
