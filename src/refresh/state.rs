//! Reactive state capture and restore.

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Failure reading or writing one signal of a component.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SignalError {
    #[error("signal `{0}` does not exist")]
    Missing(String),

    #[error("signal `{key}` failed: {reason}")]
    Access { key: String, reason: String },
}

impl SignalError {
    pub fn access(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Access {
            key: key.into(),
            reason: reason.into(),
        }
    }
}

/// A component whose reactive state survives Fast Refresh.
///
/// Components opt in by exposing their signals by key; values cross the
/// boundary as plain JSON values, never as live references.
pub trait ReactiveStateHolder: Send + Sync {
    /// Keys of every signal the component owns.
    fn signal_keys(&self) -> Vec<String>;

    /// Current value of one signal.
    fn read_signal(&self, key: &str) -> Result<Value, SignalError>;

    /// Overwrite one signal.
    fn write_signal(&self, key: &str, value: Value) -> Result<(), SignalError>;

    /// Opaque ids of registered effects.
    fn effects(&self) -> Vec<String> {
        Vec::new()
    }

    /// Opaque ids of registered memos.
    fn memos(&self) -> Vec<String> {
        Vec::new()
    }
}

/// Snapshot of a component taken before a module swap.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ComponentState {
    pub signals: FxHashMap<String, Value>,
    pub effects: Vec<String>,
    pub memos: Vec<String>,
}

/// What a best-effort restore managed to write back.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RestoreReport {
    pub restored: usize,
    pub failed: Vec<String>,
}

impl RestoreReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Read every signal, failing as a whole on the first error.
pub(super) fn capture(instance: &dyn ReactiveStateHolder) -> Result<ComponentState, SignalError> {
    let mut signals = FxHashMap::default();
    for key in instance.signal_keys() {
        let value = instance.read_signal(&key)?;
        signals.insert(key, value);
    }

    Ok(ComponentState {
        signals,
        effects: instance.effects(),
        memos: instance.memos(),
    })
}

/// Write every captured signal, continuing past individual failures.
pub(super) fn apply(instance: &dyn ReactiveStateHolder, state: &ComponentState) -> RestoreReport {
    let known: Vec<String> = instance.signal_keys();
    let mut report = RestoreReport::default();

    let mut keys: Vec<_> = state.signals.keys().collect();
    keys.sort_unstable();

    for key in keys {
        let result = if known.iter().any(|k| k == key) {
            instance.write_signal(key, state.signals[key].clone())
        } else {
            Err(SignalError::Missing(key.clone()))
        };

        match result {
            Ok(()) => report.restored += 1,
            Err(e) => {
                crate::log!("refresh"; "restore skipped: {}", e);
                report.failed.push(key.clone());
            }
        }
    }

    report
}
