//! Shared dependencies and code-split candidates.

use rustc_hash::FxHashMap;
use serde::Serialize;

use super::{ModuleGraph, ModuleNode, SplitHints};

const BASE_SIZE: usize = 1024;
const PROVIDER_SIZE: usize = 2 * 1024;
const STORE_SIZE: usize = 4 * 1024;
const ROUTE_SIZE: usize = 8 * 1024;
const COMPONENT_SIZE: usize = 1024;

/// Estimated size above which a module is split on its own.
const SIZE_THRESHOLD: usize = 50 * 1024;
/// Provider count above which a module is split on its own.
const PROVIDER_THRESHOLD: usize = 5;

/// How a split chunk is loaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SplitStrategy {
    Preload,
    Lazy,
}

/// A module eligible to become its own bundle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SplitPoint {
    pub module: String,
    pub strategy: SplitStrategy,
    /// Estimated bytes, clamped to the declared budget.
    pub size: usize,
}

impl ModuleGraph {
    /// Modules imported by more than one module, with their importers.
    pub fn get_shared_dependencies(&self) -> FxHashMap<&str, Vec<&str>> {
        self.nodes
            .iter()
            .filter(|node| node.importers.len() > 1)
            .map(|node| (node.id(), self.ids_of(&node.importers)))
            .collect()
    }

    /// Candidate code-split boundaries, sorted by module id.
    pub fn get_split_points(&self) -> Vec<SplitPoint> {
        let mut points: Vec<_> = self.nodes.iter().filter_map(split_point).collect();
        points.sort_by(|a, b| a.module.cmp(&b.module));
        points
    }
}

fn split_point(node: &ModuleNode) -> Option<SplitPoint> {
    let hints = node.split();
    let raw = estimate_size(hints);

    let qualifies = hints.explicit
        || hints.lazy
        || hints.routes > 0
        || hints.providers > PROVIDER_THRESHOLD
        || raw > SIZE_THRESHOLD;
    if !qualifies {
        return None;
    }

    let strategy = if hints.high_priority {
        SplitStrategy::Preload
    } else {
        SplitStrategy::Lazy
    };
    let size = hints.budget.map_or(raw, |budget| raw.min(budget));

    Some(SplitPoint {
        module: node.id().to_string(),
        strategy,
        size,
    })
}

/// Counts come from the manifest, so the sum saturates instead of wrapping.
fn estimate_size(hints: &SplitHints) -> usize {
    [
        (hints.providers, PROVIDER_SIZE),
        (hints.stores, STORE_SIZE),
        (hints.routes, ROUTE_SIZE),
        (hints.components, COMPONENT_SIZE),
    ]
    .into_iter()
    .fold(BASE_SIZE, |total, (count, size)| {
        total.saturating_add(count.saturating_mul(size))
    })
}
