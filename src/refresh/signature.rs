//! Refresh eligibility: component signatures and export shapes.

use std::fmt;

use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};

/// Exports of one module version, keyed by export name.
pub type ModuleExports = serde_json::Map<String, serde_json::Value>;

/// Opaque identity of a component version.
///
/// Callers usually pass a content hash; equal signatures mean the
/// component's hook layout did not change.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Signature(String);

impl Signature {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Signature of a source text (blake3, first 16 hex chars).
    pub fn of(source: impl AsRef<[u8]>) -> Self {
        let hash = blake3::hash(source.as_ref());
        Self(hex::encode(&hash.as_bytes()[..8]))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Signature {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// True when both versions export exactly the same names.
pub fn same_export_shape(old: &ModuleExports, new: &ModuleExports) -> bool {
    if old.len() != new.len() {
        return false;
    }
    let old_keys: FxHashSet<&str> = old.keys().map(String::as_str).collect();
    new.keys().all(|key| old_keys.contains(key.as_str()))
}
