//! HMR Engine
//!
//! Ties the module graph, the client connections and Fast Refresh together.
//!
//! # Update Flow
//!
//! ```text
//! file change ──> invalidate ──> propagate ──> boundaries?
//!                                               │yes         │no
//!                                        update per boundary  full-reload
//!                                               │
//!                                  on_update ──> queue ──(batch window)──> clients
//! ```
//!
//! Outbound messages are queued and flushed once per batch window, so a
//! burst of changes reaches each client as one `update` message.
//!
//! # Module Structure
//!
//! - `message` - JSON wire protocol
//! - `connection` - client sockets and the connection registry
//! - `batch` - outbound queue and coalescing
//! - `options` - engine options and callbacks
//! - `error` - [`HmrError`]

mod batch;
mod connection;
mod error;
mod message;
mod options;

#[cfg(test)]
mod tests;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::{Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};
use rustc_hash::FxHashMap;
use serde_json::Value;

pub use batch::MAX_QUEUED_MESSAGES;
pub use connection::{Connection, ConnectionError, ConnectionId, WsConnection};
pub use error::HmrError;
pub use message::{HmrMessage, HmrUpdate, UpdateKind};
pub use options::{ErrorCallback, HmrOptions, UpdateCallback};

use batch::{BatchQueue, Outbound};
use connection::ConnectionRegistry;

use crate::graph::{BoundaryRules, GraphError, ModuleData, ModuleGraph, ModuleKind, now_millis};
use crate::refresh::{ComponentState, FastRefresh, ModuleExports, ReactiveStateHolder, Signature};

/// Result of [`HmrEngine::complete_refresh`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// Swapped in place; `restored` signals were written back.
    Refreshed { restored: usize },
    /// Export shape changed, a full reload was broadcast.
    FullReload,
    /// The engine is closed.
    Skipped,
}

/// What a boundary file looked like before the module swap.
#[derive(Default)]
struct Preserved {
    /// Signatures registered at the file
    signatures: Vec<Signature>,
    /// Empty unless `preserve_state` is on
    states: Vec<ComponentState>,
}

struct EngineInner {
    graph: RwLock<ModuleGraph>,
    connections: Mutex<ConnectionRegistry>,
    queue: Mutex<BatchQueue>,
    refresh: FastRefresh,
    /// boundary file → state captured during `handle_update`
    preserved: Mutex<FxHashMap<String, Preserved>>,
    options: HmrOptions,
    closed: AtomicBool,
}

/// Hot module replacement engine. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct HmrEngine {
    inner: Arc<EngineInner>,
}

impl Default for HmrEngine {
    fn default() -> Self {
        Self::build(HmrOptions::default(), BoundaryRules::default())
    }
}

impl HmrEngine {
    /// Create an engine. Fails if a boundary glob does not compile.
    pub fn new(options: HmrOptions) -> Result<Self, HmrError> {
        let rules = options.rules()?;
        Ok(Self::build(options, rules))
    }

    fn build(options: HmrOptions, rules: BoundaryRules) -> Self {
        Self {
            inner: Arc::new(EngineInner {
                graph: RwLock::new(ModuleGraph::with_rules(rules)),
                connections: Mutex::new(ConnectionRegistry::default()),
                queue: Mutex::new(BatchQueue::default()),
                refresh: FastRefresh::new(),
                preserved: Mutex::new(FxHashMap::default()),
                options,
                closed: AtomicBool::new(false),
            }),
        }
    }

    pub fn options(&self) -> &HmrOptions {
        &self.inner.options
    }

    pub fn module_graph(&self) -> RwLockReadGuard<'_, ModuleGraph> {
        self.inner.graph.read()
    }

    pub fn module_graph_mut(&self) -> RwLockWriteGuard<'_, ModuleGraph> {
        self.inner.graph.write()
    }

    pub fn fast_refresh(&self) -> &FastRefresh {
        &self.inner.refresh
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    // =========================================================================
    // Graph
    // =========================================================================

    /// Register a module and replace its imports with `deps`.
    ///
    /// Dependencies not registered yet get a placeholder node (no file) that
    /// a later registration fills in.
    pub fn register_module<I, S>(
        &self,
        id: &str,
        file: &str,
        kind: ModuleKind,
        deps: I,
    ) -> Result<(), HmrError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.register_module_with(id, ModuleData::new(file, kind), deps)
    }

    /// Like [`register_module`](Self::register_module), with full node data.
    pub fn register_module_with<I, S>(
        &self,
        id: &str,
        data: ModuleData,
        deps: I,
    ) -> Result<(), HmrError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let deps: Vec<S> = deps.into_iter().collect();
        let mut graph = self.inner.graph.write();

        graph.upsert_node(id, data);
        for dep in &deps {
            let dep = dep.as_ref();
            if graph.handle(dep).is_none() {
                crate::debug!("hmr"; "placeholder for {} (imported by {})", dep, id);
                graph.add_node(dep, ModuleData::new("", ModuleKind::Module));
            }
        }
        graph.set_dependencies(id, deps.iter().map(|dep| dep.as_ref()))?;
        Ok(())
    }

    /// Mark `id` as self-accepting (`true`) or accepting its dependencies.
    pub fn accept_hmr(&self, id: &str, self_accepting: bool) -> Result<(), HmrError> {
        self.inner
            .graph
            .write()
            .set_accepts(id, self_accepting)
            .map_err(|e| match e {
                GraphError::UnknownNode(id) => HmrError::UnknownModule(id),
            })
    }

    // =========================================================================
    // Updates
    // =========================================================================

    /// Process a change to `file` and notify clients.
    ///
    /// Never fails: errors go to `on_error` and, with `reload_on_error`,
    /// turn into a full reload. Returns the updates that were broadcast.
    pub async fn handle_update(&self, file: &str) -> Vec<HmrUpdate> {
        let timeout = self.inner.options.timeout;
        let result = match tokio::time::timeout(timeout, self.process(file)).await {
            Ok(result) => result,
            Err(_) => Err(HmrError::Timeout {
                file: file.to_string(),
                timeout,
            }),
        };

        match result {
            Ok(updates) => updates,
            Err(e) => self.recover(file, e),
        }
    }

    async fn process(&self, file: &str) -> Result<Vec<HmrUpdate>, HmrError> {
        if self.is_closed() {
            return Err(HmrError::Closed);
        }

        let updates = self.resolve(file);
        self.snapshot_boundaries(&updates);

        if let Some(callback) = &self.inner.options.on_update {
            for update in &updates {
                callback(update).map_err(HmrError::Callback)?;
                tokio::task::yield_now().await;
            }
        }

        for update in &updates {
            self.send_update(update.clone());
        }
        Ok(updates)
    }

    /// Invalidate the modules at `file` and work out what clients must do.
    fn resolve(&self, file: &str) -> Vec<HmrUpdate> {
        let mut graph = self.inner.graph.write();

        let starts: Vec<String> = graph
            .get_modules_by_file(file)
            .into_iter()
            .map(str::to_string)
            .collect();
        if starts.is_empty() {
            crate::debug!("hmr"; "{} is not in the graph", file);
            return vec![HmrUpdate::full_reload(file, graph.tick())];
        }

        let mut timestamp = 0;
        for id in &starts {
            timestamp = graph.invalidate_module(id).unwrap_or(timestamp);
        }

        let propagation = graph.propagate(file);
        if !propagation.is_contained() {
            crate::log!("hmr"; "full reload: {}", file);
            return vec![HmrUpdate::full_reload(file, timestamp)];
        }

        propagation
            .boundaries
            .iter()
            .map(|&handle| {
                let boundary = graph.node(handle).id();
                crate::log!("hmr"; "update {} -> {}", file, boundary);
                HmrUpdate::update(file, boundary, timestamp)
            })
            .collect()
    }

    /// Record signatures, and state when `preserve_state` is on, of the
    /// components registered at each accepting boundary.
    fn snapshot_boundaries(&self, updates: &[HmrUpdate]) {
        let files: Vec<String> = {
            let graph = self.inner.graph.read();
            updates
                .iter()
                .filter_map(|u| u.accepted_path.as_deref())
                .filter_map(|id| graph.get_node(id))
                .map(|node| node.file().to_string())
                .filter(|file| !file.is_empty())
                .collect()
        };

        let refresh = &self.inner.refresh;
        let mut preserved = self.inner.preserved.lock();
        for file in files {
            let signatures = refresh.signatures(&file);
            if signatures.is_empty() {
                continue;
            }

            let states: Vec<ComponentState> = if self.inner.options.preserve_state {
                refresh
                    .instances(&file)
                    .iter()
                    .filter_map(|instance| refresh.preserve_state(instance.as_ref()))
                    .collect()
            } else {
                Vec::new()
            };
            crate::debug!("hmr"; "preserved {} component(s) at {}", states.len(), file);
            preserved.insert(file, Preserved { signatures, states });
        }
    }

    fn recover(&self, file: &str, error: HmrError) -> Vec<HmrUpdate> {
        crate::log!("hmr"; "update failed for {}: {}", file, error);
        if let Some(callback) = &self.inner.options.on_error {
            callback(&error);
        }

        if self.inner.options.reload_on_error && !self.is_closed() {
            let update = HmrUpdate::full_reload(file, now_millis());
            self.send_update(update.clone());
            return vec![update];
        }
        Vec::new()
    }

    /// Finish a module swap for `file` once the new version is known.
    ///
    /// The swap is refreshed in place when `signature` equals the one every
    /// component carried at `handle_update` time (the current registrations
    /// when no update was recorded) and both versions export the same names.
    /// Refresh callbacks then run and the captured state is written into the
    /// instances now registered at `file`, pairwise in registration order.
    /// Otherwise a full reload is broadcast.
    pub async fn complete_refresh(
        &self,
        file: &str,
        old_exports: &ModuleExports,
        new_exports: &ModuleExports,
        signature: &Signature,
    ) -> RefreshOutcome {
        if self.is_closed() {
            return RefreshOutcome::Skipped;
        }

        let preserved = self.inner.preserved.lock().remove(file);
        let refresh = &self.inner.refresh;

        let same_signature = match &preserved {
            Some(before) => before.signatures.iter().all(|s| s == signature),
            None => refresh.signature_matches(file, signature),
        };
        if !same_signature {
            crate::log!("hmr"; "full reload: signature of {} changed", file);
            self.send_update(HmrUpdate::full_reload(file, now_millis()));
            return RefreshOutcome::FullReload;
        }
        if !refresh.can_refresh(file, old_exports, new_exports) {
            crate::log!("hmr"; "full reload: exports of {} changed", file);
            self.send_update(HmrUpdate::full_reload(file, now_millis()));
            return RefreshOutcome::FullReload;
        }

        refresh.refresh(file, new_exports).await;

        let states = preserved.map(|before| before.states).unwrap_or_default();
        let instances: Vec<Arc<dyn ReactiveStateHolder>> = refresh.instances(file);
        let restored = instances
            .iter()
            .zip(&states)
            .map(|(instance, state)| refresh.restore_state(instance.as_ref(), state).restored)
            .sum();

        RefreshOutcome::Refreshed { restored }
    }

    // =========================================================================
    // Connections
    // =========================================================================

    /// Register a client and send it the `connected` handshake.
    pub fn add_connection<C>(&self, mut connection: C) -> Result<ConnectionId, HmrError>
    where
        C: Connection + 'static,
    {
        if self.is_closed() {
            connection.close();
            return Err(HmrError::Closed);
        }

        connection.send_text(&HmrMessage::Connected.to_json())?;

        let mut connections = self.inner.connections.lock();
        let id = connections.insert(Box::new(connection));
        crate::debug!("hmr"; "client {} connected (total: {})", id, connections.len());
        Ok(id)
    }

    /// Unregister a client. Returns `false` if it was not registered.
    pub fn remove_connection(&self, id: ConnectionId) -> bool {
        let removed = self.inner.connections.lock().remove(id);
        if removed.is_some() {
            crate::debug!("hmr"; "client {} removed", id);
        }
        removed.is_some()
    }

    pub fn connections(&self) -> Vec<ConnectionId> {
        self.inner.connections.lock().ids()
    }

    pub fn connection_count(&self) -> usize {
        self.inner.connections.lock().len()
    }

    /// Drop clients whose peer has gone away. Returns how many were dropped.
    pub fn reap_connections(&self) -> usize {
        let dropped = self.inner.connections.lock().reap();
        if dropped > 0 {
            crate::debug!("hmr"; "{} client(s) disconnected", dropped);
        }
        dropped
    }

    // =========================================================================
    // Outbound
    // =========================================================================

    /// Queue an update entry for the next flush.
    pub fn send_update(&self, update: HmrUpdate) {
        self.enqueue(Outbound::Update(update));
    }

    /// Queue a custom event for the next flush.
    pub fn send_custom(&self, event: &str, payload: Value) {
        if let HmrMessage::Custom { data } = HmrMessage::custom(event, payload) {
            self.enqueue(Outbound::Custom(data));
        }
    }

    fn enqueue(&self, entry: Outbound) {
        if self.is_closed() {
            crate::debug!("hmr"; "engine closed, message dropped");
            return;
        }

        let mut queue = self.inner.queue.lock();
        if !queue.push(entry) {
            return;
        }

        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                let engine = Arc::downgrade(&self.inner);
                let window = self.inner.options.batch_window;
                queue.timer = Some(runtime.spawn(async move {
                    tokio::time::sleep(window).await;
                    if let Some(inner) = engine.upgrade() {
                        HmrEngine { inner }.drain(false);
                    }
                }));
            }
            Err(_) => {
                // No runtime to time the window: deliver right away
                drop(queue);
                self.drain(true);
            }
        }
    }

    /// Deliver everything queued now, without waiting for the window.
    pub fn flush(&self) {
        self.drain(true);
    }

    fn drain(&self, cancel_timer: bool) {
        let messages = {
            let mut queue = self.inner.queue.lock();
            if let Some(timer) = queue.timer.take()
                && cancel_timer
            {
                timer.abort();
            }
            queue.drain()
        };
        if messages.is_empty() {
            return;
        }

        let frames: Vec<String> = messages.iter().map(HmrMessage::to_json).collect();
        let reached = self.inner.connections.lock().broadcast(&frames);
        crate::debug!("hmr"; "flushed {} message(s) to {} client(s)", frames.len(), reached);
    }

    /// Stop the engine: cancel the pending flush, drop queued messages and
    /// close every connection. Later sends are ignored.
    pub fn close(&self) {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return;
        }

        if let Some(timer) = self.inner.queue.lock().reset() {
            timer.abort();
        }
        self.inner.connections.lock().close_all();
        self.inner.preserved.lock().clear();
        crate::debug!("hmr"; "engine closed");
    }
}
