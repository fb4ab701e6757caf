use std::path::PathBuf;

use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use rustc_hash::FxHashSet;

/// Watch-root consistency manager.
///
/// Attaches existing roots at startup and re-attaches roots that were
/// removed and recreated (e.g. `src/` restored by a git checkout).
pub(super) struct WatchRoots {
    desired: Vec<(PathBuf, RecursiveMode)>,
    attached: FxHashSet<PathBuf>,
}

impl WatchRoots {
    pub(super) fn new(mut paths: Vec<(PathBuf, RecursiveMode)>) -> Self {
        paths.sort_by(|a, b| a.0.cmp(&b.0));
        paths.dedup_by(|a, b| a.0 == b.0);
        Self {
            desired: paths,
            attached: FxHashSet::default(),
        }
    }

    pub(super) fn attach_existing(
        &mut self,
        watcher: &mut RecommendedWatcher,
    ) -> notify::Result<()> {
        for (path, mode) in &self.desired {
            if !path.exists() {
                crate::log!("watch"; "not found, will attach when created: {}", path.display());
                continue;
            }
            watcher.watch(path, *mode)?;
            self.attached.insert(path.clone());
            crate::debug!("watch"; "watching {}", path.display());
        }
        Ok(())
    }

    pub(super) fn maintain(&mut self, watcher: &mut RecommendedWatcher) {
        self.attached.retain(|path| path.exists());

        for (path, mode) in &self.desired {
            if self.attached.contains(path) || !path.exists() {
                continue;
            }
            if watcher.watch(path, *mode).is_ok() {
                self.attached.insert(path.clone());
                crate::debug!("watch"; "re-attached watch: {}", path.display());
            }
        }
    }

    #[cfg(test)]
    fn desired(&self) -> Vec<&PathBuf> {
        self.desired.iter().map(|(p, _)| p).collect()
    }
}
