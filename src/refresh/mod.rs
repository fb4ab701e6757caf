//! Fast Refresh: keep component state across a hot module swap.
//!
//! # Flow
//!
//! ```text
//! register ──> preserve_state ──> (module swapped) ──> can_refresh?
//!                                                      │yes        │no
//!                                                   refresh   full reload
//!                                                      │
//!                                                restore_state
//! ```
//!
//! Components take part by implementing [`ReactiveStateHolder`]. Eligibility
//! is a pure comparison (export names, optionally signatures); nothing here
//! decides to reload, that is the caller's call.

mod signature;
mod state;

use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use rustc_hash::{FxHashMap, FxHashSet};

pub use signature::{ModuleExports, Signature, same_export_shape};
pub use state::{ComponentState, ReactiveStateHolder, RestoreReport, SignalError};

/// Callback run by [`FastRefresh::refresh`] with the file and its new exports.
pub type RefreshCallback = Arc<dyn Fn(&str, &ModuleExports) -> anyhow::Result<()> + Send + Sync>;

struct Registration {
    instance: Arc<dyn ReactiveStateHolder>,
    signature: Signature,
}

#[derive(Default)]
struct Registry {
    /// file → registrations, in registration order
    files: FxHashMap<String, Vec<Registration>>,
    callbacks: Vec<(u64, RefreshCallback)>,
    next_callback: u64,
}

/// Registration counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RefreshStats {
    /// Distinct component instances.
    pub components: usize,
    /// Files with at least one registration.
    pub files: usize,
}

/// Component registry and refresh driver.
#[derive(Default, Clone)]
pub struct FastRefresh {
    registry: Arc<Mutex<Registry>>,
}

impl FastRefresh {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `instance` under `file`. Repeated calls append.
    pub fn register(
        &self,
        instance: Arc<dyn ReactiveStateHolder>,
        file: &str,
        signature: impl Into<Signature>,
    ) {
        let signature = signature.into();
        crate::debug!("refresh"; "register {} ({})", file, signature);
        self.registry
            .lock()
            .files
            .entry(file.to_string())
            .or_default()
            .push(Registration { instance, signature });
    }

    /// Drop every registration of `file`, returning how many were removed.
    pub fn unregister_file(&self, file: &str) -> usize {
        self.registry
            .lock()
            .files
            .remove(file)
            .map_or(0, |regs| regs.len())
    }

    /// Instances registered under `file`, in registration order.
    pub fn instances(&self, file: &str) -> Vec<Arc<dyn ReactiveStateHolder>> {
        self.registry
            .lock()
            .files
            .get(file)
            .map(|regs| regs.iter().map(|r| Arc::clone(&r.instance)).collect())
            .unwrap_or_default()
    }

    /// Signatures registered under `file`, in registration order.
    pub fn signatures(&self, file: &str) -> Vec<Signature> {
        self.registry
            .lock()
            .files
            .get(file)
            .map(|regs| regs.iter().map(|r| r.signature.clone()).collect())
            .unwrap_or_default()
    }

    /// Snapshot every signal of `instance`.
    ///
    /// Returns `None` if any signal cannot be read; a partial snapshot is
    /// never produced.
    pub fn preserve_state(&self, instance: &dyn ReactiveStateHolder) -> Option<ComponentState> {
        match state::capture(instance) {
            Ok(snapshot) => Some(snapshot),
            Err(e) => {
                crate::log!("refresh"; "state not preserved: {}", e);
                None
            }
        }
    }

    /// Write a snapshot back. Failing signals are skipped, not fatal.
    pub fn restore_state(
        &self,
        instance: &dyn ReactiveStateHolder,
        state: &ComponentState,
    ) -> RestoreReport {
        let report = state::apply(instance, state);
        crate::debug!("refresh"; "restored {} signal(s), {} failed",
            report.restored, report.failed.len());
        report
    }

    /// Whether `file` can be refreshed in place: both versions must export
    /// the same names.
    pub fn can_refresh(&self, file: &str, old: &ModuleExports, new: &ModuleExports) -> bool {
        let eligible = same_export_shape(old, new);
        if !eligible {
            crate::debug!("refresh"; "export shape changed: {}", file);
        }
        eligible
    }

    /// Whether every registration under `file` carries `signature`.
    ///
    /// Files without registrations match trivially.
    pub fn signature_matches(&self, file: &str, signature: &Signature) -> bool {
        self.registry
            .lock()
            .files
            .get(file)
            .is_none_or(|regs| regs.iter().all(|r| &r.signature == signature))
    }

    /// Run every `on_refresh` callback with the new exports of `file`.
    ///
    /// Failing callbacks are logged and skipped. Returns how many succeeded.
    pub async fn refresh(&self, file: &str, new_exports: &ModuleExports) -> usize {
        // Snapshot so callbacks may subscribe or unsubscribe while running
        let callbacks: Vec<RefreshCallback> = self
            .registry
            .lock()
            .callbacks
            .iter()
            .map(|(_, cb)| Arc::clone(cb))
            .collect();

        let mut succeeded = 0;
        for callback in callbacks {
            match callback(file, new_exports) {
                Ok(()) => succeeded += 1,
                Err(e) => crate::log!("refresh"; "callback failed for {}: {:#}", file, e),
            }
            tokio::task::yield_now().await;
        }
        succeeded
    }

    /// Subscribe to refreshes. Dropping the returned handle keeps the
    /// subscription; call [`Subscription::unsubscribe`] to remove it.
    pub fn on_refresh<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&str, &ModuleExports) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let mut registry = self.registry.lock();
        let id = registry.next_callback;
        registry.next_callback += 1;
        registry.callbacks.push((id, Arc::new(callback)));

        Subscription {
            id,
            registry: Arc::downgrade(&self.registry),
        }
    }

    /// Drop all registrations and callbacks.
    pub fn clear(&self) {
        let mut registry = self.registry.lock();
        registry.files.clear();
        registry.callbacks.clear();
    }

    pub fn stats(&self) -> RefreshStats {
        let registry = self.registry.lock();
        let components: FxHashSet<*const ()> = registry
            .files
            .values()
            .flatten()
            .map(|r| Arc::as_ptr(&r.instance) as *const ())
            .collect();

        RefreshStats {
            components: components.len(),
            files: registry.files.values().filter(|regs| !regs.is_empty()).count(),
        }
    }
}

/// Handle returned by [`FastRefresh::on_refresh`].
pub struct Subscription {
    id: u64,
    registry: Weak<Mutex<Registry>>,
}

impl Subscription {
    /// Remove the callback. A no-op once the registry is gone or cleared.
    pub fn unsubscribe(self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.lock().callbacks.retain(|(id, _)| *id != self.id);
        }
    }
}
