//! Identifiers for canvas shapes and browser tabs.
//!
//! A [`ShapeId`] names a shape on the canvas, a [`TabId`] names a browser-engine
//! instance. The two live in different namespaces: a shape can exist before a tab
//! is assigned to it, and a discarded tab leaves its shape behind. Both are opaque
//! strings; never parse them.

use serde::{Deserialize, Serialize};
use std::fmt::Display;
use uuid::Uuid;

/// Identifier of a shape on the canvas.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ShapeId(String);

impl ShapeId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ShapeId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for ShapeId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl Display for ShapeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a browser-engine instance backing a shape.
///
/// Once a tab id has been destroyed it is never valid again; the canvas must
/// mint a new one (see [`TabId::generate`]) to bring the page back.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TabId(String);

impl TabId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Mint a fresh, globally unique tab id.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for TabId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for TabId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl Display for TabId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_tab_ids_are_unique() {
        let a = TabId::generate();
        let b = TabId::generate();
        assert_ne!(a, b);
        assert!(Uuid::parse_str(a.as_str()).is_ok());
    }

    #[test]
    fn ids_serialize_as_plain_strings() {
        let shape = ShapeId::from("shape:abc");
        let json = serde_json::to_string(&shape).unwrap();
        assert_eq!(json, "\"shape:abc\"");

        let tab: TabId = serde_json::from_str("\"tab-1\"").unwrap();
        assert_eq!(tab, TabId::from("tab-1"));
        assert_eq!(tab.to_string(), "tab-1");
    }
}
