//! Module node types stored in the graph arena.

use std::fmt;

use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};

/// Stable handle of a node inside one [`ModuleGraph`](super::ModuleGraph).
///
/// Handles are arena indices. They stay valid until the graph is cleared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(pub(super) u32);

impl NodeId {
    #[inline]
    pub(super) fn index(self) -> usize {
        self.0 as usize
    }
}

/// What a module is, as reported by the compiler.
///
/// Components are boundaries by default; plain modules and assets bubble
/// updates to their importers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModuleKind {
    #[default]
    Module,
    Component,
    Asset,
}

impl ModuleKind {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Module => "module",
            Self::Component => "component",
            Self::Asset => "asset",
        }
    }
}

impl fmt::Display for ModuleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Code-splitting metadata declared by a module.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SplitHints {
    /// Module carries an explicit split directive.
    pub explicit: bool,
    /// Module is loaded behind a lazy boundary.
    pub lazy: bool,
    /// Load eagerly alongside the importing bundle.
    pub high_priority: bool,
    pub routes: usize,
    pub providers: usize,
    pub stores: usize,
    pub components: usize,
    /// Size ceiling in bytes.
    pub budget: Option<usize>,
}

/// Caller-supplied node payload for [`ModuleGraph::add_node`](super::ModuleGraph::add_node).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModuleData {
    pub file: String,
    pub kind: ModuleKind,
    pub split: SplitHints,
}

impl ModuleData {
    pub fn new(file: impl Into<String>, kind: ModuleKind) -> Self {
        Self {
            file: file.into(),
            kind,
            split: SplitHints::default(),
        }
    }

    pub fn with_split(mut self, split: SplitHints) -> Self {
        self.split = split;
        self
    }
}

/// A registered module.
///
/// `imported` and `importers` are kept symmetric by the graph; nodes never
/// hold references to each other, only handles.
#[derive(Debug, Clone)]
pub struct ModuleNode {
    pub(super) id: String,
    pub(super) file: String,
    pub(super) kind: ModuleKind,
    pub(super) imported: FxHashSet<NodeId>,
    pub(super) importers: FxHashSet<NodeId>,
    pub(super) accepts_self: bool,
    pub(super) accepts_dependencies: bool,
    pub(super) last_hmr_timestamp: u64,
    pub(super) split: SplitHints,
}

impl ModuleNode {
    pub(super) fn new(id: String, data: ModuleData) -> Self {
        Self {
            id,
            file: data.file,
            kind: data.kind,
            imported: FxHashSet::default(),
            importers: FxHashSet::default(),
            accepts_self: false,
            accepts_dependencies: false,
            last_hmr_timestamp: 0,
            split: data.split,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Source path, empty for virtual modules.
    pub fn file(&self) -> &str {
        &self.file
    }

    pub fn kind(&self) -> ModuleKind {
        self.kind
    }

    pub fn accepts_self(&self) -> bool {
        self.accepts_self
    }

    pub fn accepts_dependencies(&self) -> bool {
        self.accepts_dependencies
    }

    pub fn last_hmr_timestamp(&self) -> u64 {
        self.last_hmr_timestamp
    }

    pub fn split(&self) -> &SplitHints {
        &self.split
    }

    pub fn imported_modules(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.imported.iter().copied()
    }

    pub fn importers(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.importers.iter().copied()
    }

    pub fn is_virtual(&self) -> bool {
        self.file.is_empty()
    }
}
