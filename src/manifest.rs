//! Module manifest: the graph as written by the external compiler.
//!
//! ```json
//! {"modules": [
//!   {"id": "app", "file": "src/app.tsx", "kind": "component",
//!    "deps": ["utils"], "accept": "self", "split": {"routes": 2}}
//! ]}
//! ```
//!
//! Relative files resolve against the project root. Applying a manifest
//! replaces the whole graph.

use std::fs;
use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::graph::{ModuleData, ModuleKind, SplitHints};
use crate::hmr::{HmrEngine, HmrError};

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("IO error when reading `{0}`")]
    Io(PathBuf, #[source] std::io::Error),

    #[error("invalid manifest `{0}`")]
    Json(PathBuf, #[source] serde_json::Error),

    #[error("cannot register module")]
    Module(#[from] HmrError),
}

/// How a module takes part in HMR.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Accept {
    /// Self-accepting boundary
    #[serde(rename = "self")]
    SelfAccepting,
    /// Accepts updates of its dependencies
    Deps,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleEntry {
    pub id: String,
    #[serde(default)]
    pub file: String,
    #[serde(default)]
    pub kind: ModuleKind,
    #[serde(default)]
    pub deps: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accept: Option<Accept>,
    #[serde(default)]
    pub split: SplitHints,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub modules: Vec<ModuleEntry>,
}

impl Manifest {
    pub fn from_json(content: &str, path: &Path) -> Result<Self, ManifestError> {
        serde_json::from_str(content).map_err(|e| ManifestError::Json(path.to_path_buf(), e))
    }

    pub fn load(path: &Path) -> Result<Self, ManifestError> {
        let content =
            fs::read_to_string(path).map_err(|e| ManifestError::Io(path.to_path_buf(), e))?;
        Self::from_json(&content, path)
    }

    /// Replace the engine's graph with this manifest. Returns the number of
    /// modules registered.
    pub fn apply(&self, engine: &HmrEngine, root: &Path) -> Result<usize, ManifestError> {
        engine.module_graph_mut().clear();

        for entry in &self.modules {
            let file = if entry.file.is_empty() {
                String::new()
            } else {
                resolve_file(root, &entry.file)
            };
            let data = ModuleData::new(file, entry.kind).with_split(entry.split.clone());
            engine.register_module_with(&entry.id, data, &entry.deps)?;

            match entry.accept {
                Some(Accept::SelfAccepting) => engine.accept_hmr(&entry.id, true)?,
                Some(Accept::Deps) => engine.accept_hmr(&entry.id, false)?,
                None => {}
            }
        }

        crate::debug!("manifest"; "registered {} module(s)", self.modules.len());
        Ok(self.modules.len())
    }
}

/// Absolute, lexically normalized path of `file` as a graph key.
pub fn resolve_file(root: &Path, file: impl AsRef<Path>) -> String {
    let joined = root.join(file);
    let mut normalized = PathBuf::new();
    for component in joined.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            other => normalized.push(other),
        }
    }
    normalized.to_string_lossy().into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const SAMPLE: &str = r#"{"modules": [
        {"id": "main", "file": "src/main.ts", "deps": ["App"]},
        {"id": "App", "file": "./src/App.tsx", "kind": "component",
         "deps": ["utils", "virtual:env"], "split": {"routes": 2}},
        {"id": "utils", "file": "/abs/utils.ts", "accept": "self"},
        {"id": "store", "file": "src/store.ts", "accept": "deps"}
    ]}"#;

    #[test]
    fn test_parse_manifest() {
        let manifest = Manifest::from_json(SAMPLE, Path::new("hmr-graph.json")).unwrap();

        assert_eq!(manifest.modules.len(), 4);
        assert_eq!(manifest.modules[0].kind, ModuleKind::Module);
        assert_eq!(manifest.modules[1].kind, ModuleKind::Component);
        assert_eq!(manifest.modules[1].split.routes, 2);
        assert_eq!(manifest.modules[2].accept, Some(Accept::SelfAccepting));
        assert_eq!(manifest.modules[3].accept, Some(Accept::Deps));
    }

    #[test]
    fn test_invalid_manifest() {
        let err = Manifest::from_json("{\"modules\": 3}", Path::new("m.json")).unwrap_err();
        assert!(matches!(err, ManifestError::Json(..)));
        assert!(err.to_string().contains("m.json"));
    }

    #[test]
    fn test_apply_builds_graph() {
        let engine = HmrEngine::default();
        let manifest = Manifest::from_json(SAMPLE, Path::new("hmr-graph.json")).unwrap();
        assert_eq!(manifest.apply(&engine, Path::new("/project")).unwrap(), 4);

        let graph = engine.module_graph();
        assert_eq!(graph.get_modules_by_file("/project/src/App.tsx"), vec!["App"]);
        assert_eq!(graph.get_modules_by_file("/abs/utils.ts"), vec!["utils"]);
        assert!(graph.get_node("virtual:env").unwrap().is_virtual());
        assert!(graph.get_node("utils").unwrap().accepts_self());
        assert!(graph.get_node("store").unwrap().accepts_dependencies());
        assert_eq!(graph.get_dependencies("main"), vec!["App"]);
    }

    #[test]
    fn test_apply_replaces_previous_graph() {
        let engine = HmrEngine::default();
        let root = Path::new("/project");
        Manifest::from_json(SAMPLE, Path::new("a.json"))
            .unwrap()
            .apply(&engine, root)
            .unwrap();

        let smaller = r#"{"modules": [{"id": "main", "file": "src/main.ts"}]}"#;
        Manifest::from_json(smaller, Path::new("b.json"))
            .unwrap()
            .apply(&engine, root)
            .unwrap();

        let graph = engine.module_graph();
        assert_eq!(graph.len(), 1);
        assert!(graph.get_dependencies("main").is_empty());
    }

    #[test]
    fn test_load_from_disk() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("hmr-graph.json");
        fs::write(&path, SAMPLE).unwrap();

        assert_eq!(Manifest::load(&path).unwrap().modules.len(), 4);
        assert!(matches!(
            Manifest::load(&dir.path().join("missing.json")),
            Err(ManifestError::Io(..))
        ));
    }

    #[test]
    fn test_resolve_file() {
        let root = Path::new("/project");
        assert_eq!(resolve_file(root, "src/a.ts"), "/project/src/a.ts");
        assert_eq!(resolve_file(root, "./src/../lib/b.ts"), "/project/lib/b.ts");
        assert_eq!(resolve_file(root, "/abs/c.ts"), "/abs/c.ts");
    }
}
