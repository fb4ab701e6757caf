//! Boundary rules: where update propagation stops.

use regex::Regex;
use rustc_hash::FxHashSet;

use super::node::{ModuleKind, ModuleNode};

/// File extensions treated as components when no override is configured.
pub const DEFAULT_COMPONENT_EXTENSIONS: &[&str] = &[".tsx", ".jsx"];

/// Forced boundaries and component-like extensions.
///
/// A configured entry is matched twice: literally against module ids and as
/// a glob against module files. Relative globs match at any directory depth
/// (`src/pages/**` matches `/project/src/pages/a.tsx`).
#[derive(Debug, Clone)]
pub struct BoundaryRules {
    ids: FxHashSet<String>,
    patterns: Vec<Regex>,
    extensions: Vec<String>,
}

impl Default for BoundaryRules {
    fn default() -> Self {
        Self {
            ids: FxHashSet::default(),
            patterns: Vec::new(),
            extensions: DEFAULT_COMPONENT_EXTENSIONS
                .iter()
                .map(|ext| (*ext).to_string())
                .collect(),
        }
    }
}

impl BoundaryRules {
    /// Build rules from configured entries, keeping the default extensions.
    pub fn new<S: AsRef<str>>(entries: &[S]) -> Result<Self, regex::Error> {
        let mut rules = Self::default();
        for entry in entries {
            let entry = entry.as_ref();
            rules.ids.insert(entry.to_string());
            rules.patterns.push(glob_to_regex(entry)?);
        }
        Ok(rules)
    }

    /// Replace the component-like extension set (e.g. `[".tsx", ".vue"]`).
    pub fn with_extensions<S: AsRef<str>>(mut self, extensions: &[S]) -> Self {
        self.extensions = extensions
            .iter()
            .map(|ext| ext.as_ref().to_ascii_lowercase())
            .collect();
        self
    }

    pub fn extensions(&self) -> &[String] {
        &self.extensions
    }

    /// Whether propagation stops at `node`.
    ///
    /// `via_dependency` is true when the walk arrived from one of the node's
    /// imports; only then does `accepts_dependencies` make it a boundary.
    pub fn is_boundary(&self, node: &ModuleNode, via_dependency: bool) -> bool {
        node.accepts_self()
            || node.kind() == ModuleKind::Component
            || (via_dependency && node.accepts_dependencies())
            || self.ids.contains(node.id())
            || self.matches_file(node.file())
    }

    fn matches_file(&self, file: &str) -> bool {
        if file.is_empty() {
            return false;
        }
        let lower = file.to_ascii_lowercase();
        self.extensions.iter().any(|ext| lower.ends_with(ext.as_str()))
            || self.patterns.iter().any(|re| re.is_match(file))
    }
}

/// Translate a path glob into an anchored regex.
///
/// - `**` matches across directories (`**/` may match nothing)
/// - `*` matches within one segment
/// - `?` matches one non-separator character
pub(crate) fn glob_to_regex(glob: &str) -> Result<Regex, regex::Error> {
    let mut out = String::with_capacity(glob.len() * 2 + 8);
    out.push_str(if glob.starts_with('/') { "^" } else { "(?:^|/)" });

    let mut chars = glob.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '*' if chars.peek() == Some(&'*') => {
                chars.next();
                if chars.peek() == Some(&'/') {
                    chars.next();
                    out.push_str("(?:.*/)?");
                } else {
                    out.push_str(".*");
                }
            }
            '*' => out.push_str("[^/]*"),
            '?' => out.push_str("[^/]"),
            _ => out.push_str(&regex::escape(c.encode_utf8(&mut [0; 4]))),
        }
    }

    out.push('$');
    Regex::new(&out)
}
