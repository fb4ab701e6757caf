//! Importer-direction traversals: update propagation and invalidation.

use std::collections::VecDeque;

use rustc_hash::{FxHashMap, FxHashSet};

use super::{ModuleGraph, ModuleNode, NodeId, sorted};

/// Outcome of walking up the importer chain from a changed file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Propagation {
    /// Every module touched by the walk, in breadth-first order.
    pub affected: Vec<NodeId>,
    /// Modules where the walk stopped because they absorb the update.
    pub boundaries: Vec<NodeId>,
    /// Modules with no importers that are not boundaries.
    ///
    /// A non-empty list means some chain reached the root unhandled.
    pub dead_ends: Vec<NodeId>,
    /// Non-boundary modules with at least one importer chain that never
    /// reaches a boundary: it ends at a dead end or loops in a cycle.
    pub unresolved: Vec<NodeId>,
}

impl Propagation {
    /// True when every chain ended at a boundary.
    pub fn is_contained(&self) -> bool {
        !self.boundaries.is_empty() && self.unresolved.is_empty()
    }
}

impl ModuleGraph {
    /// Modules that must re-execute when `file` changes.
    ///
    /// Walks importers breadth-first from every module registered at `file`.
    /// A boundary is included but its importers are not visited.
    pub fn get_affected_modules(&self, file: &str) -> Vec<&ModuleNode> {
        self.propagate(file)
            .affected
            .into_iter()
            .map(|h| self.node(h))
            .collect()
    }

    /// Same walk as [`get_affected_modules`](Self::get_affected_modules),
    /// also reporting where each chain ended.
    pub fn propagate(&self, file: &str) -> Propagation {
        let mut result = Propagation::default();
        let mut visited = FxHashSet::default();
        let mut queue = VecDeque::new();

        for start in self.handles_by_file(file) {
            if visited.insert(start) {
                queue.push_back((start, false));
            }
        }

        while let Some((handle, via_dependency)) = queue.pop_front() {
            let node = self.node(handle);
            result.affected.push(handle);

            if self.rules.is_boundary(node, via_dependency) {
                result.boundaries.push(handle);
                continue;
            }

            if node.importers.is_empty() {
                result.dead_ends.push(handle);
                continue;
            }

            for importer in sorted(&node.importers) {
                if visited.insert(importer) {
                    queue.push_back((importer, true));
                }
            }
        }

        result.unresolved = self.unresolved(&result);
        result
    }

    /// A non-boundary module is resolved once all of its importers are.
    ///
    /// Resolution spreads down from the boundaries, so cycles with no
    /// boundary and chains ending at a root stay unresolved.
    fn unresolved(&self, walk: &Propagation) -> Vec<NodeId> {
        let boundaries: FxHashSet<NodeId> = walk.boundaries.iter().copied().collect();
        let mut pending: FxHashMap<NodeId, usize> = walk
            .affected
            .iter()
            .filter(|h| !boundaries.contains(h))
            .map(|&h| (h, self.node(h).importers.len()))
            .collect();

        let mut ready: Vec<NodeId> = walk.boundaries.clone();
        while let Some(handle) = ready.pop() {
            for &imported in &self.node(handle).imported {
                let Some(count) = pending.get_mut(&imported) else {
                    continue;
                };
                *count -= 1;
                if *count == 0 {
                    pending.remove(&imported);
                    ready.push(imported);
                }
            }
        }

        walk.affected
            .iter()
            .copied()
            .filter(|h| pending.contains_key(h))
            .collect()
    }

    /// Bump the HMR timestamp of `id` and of everything that imports it,
    /// transitively. Boundaries do not stop this sweep.
    ///
    /// Returns the timestamp written, or `None` for an unknown id.
    pub fn invalidate_module(&mut self, id: &str) -> Option<u64> {
        let start = self.handle(id)?;
        let timestamp = self.tick();

        let mut visited = FxHashSet::default();
        let mut stack = vec![start];
        while let Some(handle) = stack.pop() {
            if !visited.insert(handle) {
                continue;
            }
            let node = &mut self.nodes[handle.index()];
            node.last_hmr_timestamp = timestamp;
            stack.extend(node.importers.iter().copied());
        }

        crate::debug!("graph"; "invalidated {} module(s) from {}", visited.len(), id);
        Some(timestamp)
    }
}
