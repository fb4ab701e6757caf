//! Dependency-direction traversals.
//!
//! All walks follow `imported` edges and keep a visited (or on-stack) set,
//! so self-loops and cycles terminate.

use rustc_hash::{FxHashMap, FxHashSet};

use super::{ModuleGraph, NodeId, sorted};

type DepthMemo = FxHashMap<NodeId, usize>;

impl ModuleGraph {
    /// Every id reachable from `id` through imports, excluding `id` itself.
    pub fn get_transitive_dependencies(&self, id: &str) -> FxHashSet<&str> {
        let Some(start) = self.handle(id) else {
            return FxHashSet::default();
        };

        let mut visited = FxHashSet::default();
        let mut stack: Vec<NodeId> = self.node(start).imported_modules().collect();
        while let Some(handle) = stack.pop() {
            if !visited.insert(handle) {
                continue;
            }
            stack.extend(self.node(handle).imported_modules());
        }

        visited.remove(&start);
        visited.into_iter().map(|h| self.node(h).id()).collect()
    }

    /// Whether `b` is a transitive dependency of `a`.
    pub fn depends_on(&self, a: &str, b: &str) -> bool {
        let (Some(from), Some(target)) = (self.handle(a), self.handle(b)) else {
            return false;
        };
        if from == target {
            return false;
        }

        let mut visited = FxHashSet::default();
        let mut stack: Vec<NodeId> = self.node(from).imported_modules().collect();
        while let Some(handle) = stack.pop() {
            if handle == target {
                return true;
            }
            if visited.insert(handle) {
                stack.extend(self.node(handle).imported_modules());
            }
        }
        false
    }

    /// Length of the longest import chain below `id` (0 for a leaf).
    ///
    /// Back edges contribute nothing, so a cycle never inflates the depth.
    pub fn get_depth(&self, id: &str) -> usize {
        let Some(handle) = self.handle(id) else {
            return 0;
        };
        self.depth_of(handle, &mut DepthMemo::default(), &mut FxHashSet::default())
    }

    pub(super) fn max_depth(&self) -> usize {
        let mut memo = DepthMemo::default();
        let mut active = FxHashSet::default();
        (0..self.nodes.len())
            .map(|i| self.depth_of(NodeId(i as u32), &mut memo, &mut active))
            .max()
            .unwrap_or(0)
    }

    fn depth_of(&self, handle: NodeId, memo: &mut DepthMemo, active: &mut FxHashSet<NodeId>) -> usize {
        if let Some(&depth) = memo.get(&handle) {
            return depth;
        }
        active.insert(handle);

        let mut depth = 0;
        for dep in sorted(&self.node(handle).imported) {
            if active.contains(&dep) {
                continue;
            }
            depth = depth.max(1 + self.depth_of(dep, memo, active));
        }

        active.remove(&handle);
        memo.insert(handle, depth);
        depth
    }

    /// Cycles in the graph, each as the ids along the cycle.
    ///
    /// A self-import is reported as a one-element cycle. Every strongly
    /// connected set that contains a cycle yields at least one entry; the
    /// same cycle is never reported twice in different rotations.
    pub fn find_circular_dependencies(&self) -> Vec<Vec<&str>> {
        let mut finder = CycleFinder::default();
        for i in 0..self.nodes.len() {
            let handle = NodeId(i as u32);
            if !finder.done.contains(&handle) {
                self.find_cycles_from(handle, &mut finder);
            }
        }

        finder
            .cycles
            .into_iter()
            .map(|cycle| cycle.into_iter().map(|h| self.node(h).id()).collect())
            .collect()
    }

    fn find_cycles_from(&self, handle: NodeId, finder: &mut CycleFinder) {
        finder.path.push(handle);
        finder.on_path.insert(handle);

        for dep in sorted(&self.node(handle).imported) {
            if finder.on_path.contains(&dep) {
                let start = finder.path.iter().position(|&h| h == dep).unwrap_or(0);
                let cycle = finder.path[start..].to_vec();
                finder.record(&cycle);
            } else if !finder.done.contains(&dep) {
                self.find_cycles_from(dep, finder);
            }
        }

        finder.on_path.remove(&handle);
        finder.path.pop();
        finder.done.insert(handle);
    }

    /// Topological order: every module appears after all of its imports.
    ///
    /// Members of a cycle are emitted in discovery order.
    pub fn get_load_order(&self) -> Vec<&str> {
        let mut order = Vec::with_capacity(self.nodes.len());
        let mut visited = FxHashSet::default();
        for i in 0..self.nodes.len() {
            self.post_order(NodeId(i as u32), &mut visited, &mut order);
        }
        order.into_iter().map(|h| self.node(h).id()).collect()
    }

    fn post_order(&self, handle: NodeId, visited: &mut FxHashSet<NodeId>, order: &mut Vec<NodeId>) {
        if !visited.insert(handle) {
            return;
        }
        for dep in sorted(&self.node(handle).imported) {
            self.post_order(dep, visited, order);
        }
        order.push(handle);
    }
}

#[derive(Default)]
struct CycleFinder {
    path: Vec<NodeId>,
    on_path: FxHashSet<NodeId>,
    done: FxHashSet<NodeId>,
    seen: FxHashSet<Vec<NodeId>>,
    cycles: Vec<Vec<NodeId>>,
}

impl CycleFinder {
    /// Store a cycle once, keyed by its rotation starting at the smallest handle.
    fn record(&mut self, cycle: &[NodeId]) {
        let pivot = cycle
            .iter()
            .enumerate()
            .min_by_key(|(_, h)| **h)
            .map(|(i, _)| i)
            .unwrap_or(0);
        let mut canonical = cycle.to_vec();
        canonical.rotate_left(pivot);

        if self.seen.insert(canonical) {
            self.cycles.push(cycle.to_vec());
        }
    }
}
