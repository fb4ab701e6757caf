//! Module dependency graph for hot module replacement.
//!
//! Nodes live in an arena and are addressed by [`NodeId`] handles. Edges are
//! stored twice, as `imported` on the importer and `importers` on the
//! imported module, so both directions are O(1) to walk.
//!
//! # Invariants
//! - `a.imported ∋ b ⇔ b.importers ∋ a`
//! - the file index holds exactly the non-virtual nodes registered at a file
//! - every traversal carries a visited set (cycles and self-loops terminate)
//!
//! # Module Structure
//!
//! - `node` - node, kind and split-hint types
//! - `boundary` - rules deciding where update propagation stops
//! - `traverse` - dependency-direction algorithms (depth, cycles, load order)
//! - `propagate` - importer-direction algorithms (affected set, invalidation)
//! - `split` - shared dependencies and code-split candidates

mod boundary;
mod node;
mod propagate;
mod split;
mod traverse;


use rustc_hash::{FxHashMap, FxHashSet};
use serde::Serialize;
use thiserror::Error;

pub use boundary::BoundaryRules;
pub(crate) use boundary::glob_to_regex;
pub use node::{ModuleData, ModuleKind, ModuleNode, NodeId, SplitHints};
pub use propagate::Propagation;
pub use split::{SplitPoint, SplitStrategy};

/// Errors raised by strict graph mutations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
    /// Edge endpoint was never registered.
    #[error("unknown module `{0}`")]
    UnknownNode(String),
}

/// Aggregate numbers reported by [`ModuleGraph::get_stats`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphStats {
    pub node_count: usize,
    pub edge_count: usize,
    pub max_depth: usize,
    pub avg_dependencies: f64,
    pub circular_dependencies: usize,
}

/// In-memory module graph.
#[derive(Debug, Default)]
pub struct ModuleGraph {
    nodes: Vec<ModuleNode>,
    ids: FxHashMap<String, NodeId>,
    /// file → nodes registered at that file
    files: FxHashMap<String, FxHashSet<NodeId>>,
    rules: BoundaryRules,
    /// Last timestamp handed out, keeps invalidation strictly increasing.
    clock: u64,
}

impl ModuleGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rules(rules: BoundaryRules) -> Self {
        Self {
            rules,
            ..Self::default()
        }
    }

    pub fn rules(&self) -> &BoundaryRules {
        &self.rules
    }

    pub fn set_rules(&mut self, rules: BoundaryRules) {
        self.rules = rules;
    }

    // -------------------------------------------------------------------------
    // Nodes
    // -------------------------------------------------------------------------

    /// Create a node for `id`, or return the existing one untouched.
    pub fn add_node(&mut self, id: &str, data: ModuleData) -> NodeId {
        if let Some(&handle) = self.ids.get(id) {
            return handle;
        }

        let handle = NodeId(self.nodes.len() as u32);
        if !data.file.is_empty() {
            self.files.entry(data.file.clone()).or_default().insert(handle);
        }
        self.nodes.push(ModuleNode::new(id.to_string(), data));
        self.ids.insert(id.to_string(), handle);
        handle
    }

    /// Create a node, or update file, kind and split hints of an existing one.
    ///
    /// The node is mutated in place, so its handle and edges stay valid.
    pub fn upsert_node(&mut self, id: &str, data: ModuleData) -> NodeId {
        let Some(&handle) = self.ids.get(id) else {
            return self.add_node(id, data);
        };

        let old_file = std::mem::take(&mut self.nodes[handle.index()].file);
        if old_file != data.file {
            self.unindex_file(&old_file, handle);
            if !data.file.is_empty() {
                self.files.entry(data.file.clone()).or_default().insert(handle);
            }
        }

        let node = &mut self.nodes[handle.index()];
        node.file = data.file;
        node.kind = data.kind;
        node.split = data.split;
        handle
    }

    pub fn get_node(&self, id: &str) -> Option<&ModuleNode> {
        self.ids.get(id).map(|&handle| self.node(handle))
    }

    pub fn get_node_mut(&mut self, id: &str) -> Option<&mut ModuleNode> {
        let handle = *self.ids.get(id)?;
        Some(&mut self.nodes[handle.index()])
    }

    pub fn handle(&self, id: &str) -> Option<NodeId> {
        self.ids.get(id).copied()
    }

    /// Resolve a handle. Handles only come from this graph, so this cannot miss.
    #[inline]
    pub fn node(&self, handle: NodeId) -> &ModuleNode {
        &self.nodes[handle.index()]
    }

    pub fn get_nodes(&self) -> impl Iterator<Item = &ModuleNode> {
        self.nodes.iter()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Mark a module as an HMR boundary (`true`) or as accepting updates
    /// from its dependencies (`false`).
    pub fn set_accepts(&mut self, id: &str, self_accepting: bool) -> Result<(), GraphError> {
        let node = self
            .get_node_mut(id)
            .ok_or_else(|| GraphError::UnknownNode(id.to_string()))?;
        if self_accepting {
            node.accepts_self = true;
        } else {
            node.accepts_dependencies = true;
        }
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Edges
    // -------------------------------------------------------------------------

    /// Record that `from` imports `to`. Both nodes must exist.
    pub fn add_edge(&mut self, from: &str, to: &str) -> Result<(), GraphError> {
        let (from, to) = self.endpoints(from, to)?;
        self.link(from, to);
        Ok(())
    }

    /// Remove the import `from → to` if present.
    pub fn remove_edge(&mut self, from: &str, to: &str) -> Result<(), GraphError> {
        let (from, to) = self.endpoints(from, to)?;
        self.unlink(from, to);
        Ok(())
    }

    /// Replace the import set of `id` with `deps`.
    ///
    /// Diffs against the current set: stale edges are unlinked on both
    /// sides, new ones linked. Every dependency must already exist.
    pub fn set_dependencies<'a>(
        &mut self,
        id: &str,
        deps: impl IntoIterator<Item = &'a str>,
    ) -> Result<(), GraphError> {
        let from = self
            .handle(id)
            .ok_or_else(|| GraphError::UnknownNode(id.to_string()))?;

        let mut wanted = FxHashSet::default();
        for dep in deps {
            let to = self
                .handle(dep)
                .ok_or_else(|| GraphError::UnknownNode(dep.to_string()))?;
            wanted.insert(to);
        }

        let current = self.node(from).imported.clone();
        for &stale in current.difference(&wanted) {
            self.unlink(from, stale);
        }
        for &fresh in wanted.difference(&current) {
            self.link(from, fresh);
        }
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Queries
    // -------------------------------------------------------------------------

    /// Direct imports of `id`, in registration order.
    pub fn get_dependencies(&self, id: &str) -> Vec<&str> {
        self.handle(id)
            .map(|h| self.ids_of(&self.node(h).imported))
            .unwrap_or_default()
    }

    /// Direct importers of `id`, in registration order.
    pub fn get_dependents(&self, id: &str) -> Vec<&str> {
        self.handle(id)
            .map(|h| self.ids_of(&self.node(h).importers))
            .unwrap_or_default()
    }

    /// Ids registered at `file`, in registration order.
    pub fn get_modules_by_file(&self, file: &str) -> Vec<&str> {
        self.files
            .get(file)
            .map(|set| self.ids_of(set))
            .unwrap_or_default()
    }

    pub(crate) fn handles_by_file(&self, file: &str) -> Vec<NodeId> {
        self.files.get(file).map(sorted).unwrap_or_default()
    }

    pub fn get_stats(&self) -> GraphStats {
        let node_count = self.nodes.len();
        let edge_count: usize = self.nodes.iter().map(|n| n.imported.len()).sum();
        let avg_dependencies = if node_count == 0 {
            0.0
        } else {
            edge_count as f64 / node_count as f64
        };

        GraphStats {
            node_count,
            edge_count,
            max_depth: self.max_depth(),
            avg_dependencies,
            circular_dependencies: self.find_circular_dependencies().len(),
        }
    }

    /// Drop every node, edge and index.
    pub fn clear(&mut self) {
        self.nodes.clear();
        self.ids.clear();
        self.files.clear();
        self.clock = 0;
    }

    // -------------------------------------------------------------------------
    // Private
    // -------------------------------------------------------------------------

    fn endpoints(&self, from: &str, to: &str) -> Result<(NodeId, NodeId), GraphError> {
        let from_handle = self
            .handle(from)
            .ok_or_else(|| GraphError::UnknownNode(from.to_string()))?;
        let to_handle = self
            .handle(to)
            .ok_or_else(|| GraphError::UnknownNode(to.to_string()))?;
        Ok((from_handle, to_handle))
    }

    fn link(&mut self, from: NodeId, to: NodeId) {
        self.nodes[from.index()].imported.insert(to);
        self.nodes[to.index()].importers.insert(from);
    }

    fn unlink(&mut self, from: NodeId, to: NodeId) {
        self.nodes[from.index()].imported.remove(&to);
        self.nodes[to.index()].importers.remove(&from);
    }

    fn unindex_file(&mut self, file: &str, handle: NodeId) {
        if let Some(set) = self.files.get_mut(file) {
            set.remove(&handle);
            if set.is_empty() {
                self.files.remove(file);
            }
        }
    }

    pub(crate) fn ids_of(&self, set: &FxHashSet<NodeId>) -> Vec<&str> {
        sorted(set).into_iter().map(|h| self.node(h).id()).collect()
    }

    /// Next invalidation timestamp: wall clock millis, strictly increasing.
    pub(crate) fn tick(&mut self) -> u64 {
        self.clock = now_millis().max(self.clock + 1);
        self.clock
    }
}

/// Handles in arena (registration) order, for deterministic output.
pub(crate) fn sorted(set: &FxHashSet<NodeId>) -> Vec<NodeId> {
    let mut handles: Vec<_> = set.iter().copied().collect();
    handles.sort_unstable();
    handles
}

pub(crate) fn now_millis() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
