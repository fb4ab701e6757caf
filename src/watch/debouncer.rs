use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use rustc_hash::FxHashMap;

use super::{ChangeKind, FileChange};

pub(super) const DEBOUNCE_MS: u64 = 50;

/// Pure debouncer: only handles timing and event deduplication.
pub(super) struct Debouncer {
    /// Path → ChangeKind (dedup is free via HashMap key uniqueness)
    changes: FxHashMap<PathBuf, ChangeKind>,
    last_event: Option<Instant>,
    window: Duration,
}

impl Debouncer {
    pub(super) fn new() -> Self {
        Self::with_window(Duration::from_millis(DEBOUNCE_MS))
    }

    pub(super) fn with_window(window: Duration) -> Self {
        Self {
            changes: FxHashMap::default(),
            last_event: None,
            window,
        }
    }

    /// Add a notify event, applying dedup rules:
    /// - Remove + Create/Modify → Create/Modify (file was restored)
    /// - Modify + Remove → Remove (file was deleted)
    /// - Create + Remove → nothing (file came and went)
    /// - otherwise the first event wins
    pub(super) fn add_event(&mut self, event: &notify::Event) {
        use notify::EventKind;

        let kind = match event.kind {
            EventKind::Create(_) => ChangeKind::Created,
            EventKind::Remove(_) => ChangeKind::Removed,
            EventKind::Modify(modify) => {
                // Metadata-only changes (mtime/chmod) carry no new code
                if matches!(modify, notify::event::ModifyKind::Metadata(_)) {
                    return;
                }
                ChangeKind::Modified
            }
            _ => return,
        };

        for path in &event.paths {
            if is_temp_file(path) {
                continue;
            }

            match (self.changes.get(path).copied(), kind) {
                (None, _) => {
                    crate::debug!("watch"; "event {}: {}", kind.label(), path.display());
                    self.changes.insert(path.clone(), kind);
                }
                (Some(ChangeKind::Removed), ChangeKind::Created | ChangeKind::Modified) => {
                    self.changes.insert(path.clone(), kind);
                }
                (Some(ChangeKind::Modified), ChangeKind::Removed) => {
                    self.changes.insert(path.clone(), ChangeKind::Removed);
                }
                (Some(ChangeKind::Created), ChangeKind::Removed) => {
                    self.changes.remove(path);
                }
                _ => {}
            }
            self.last_event = Some(Instant::now());
        }
    }

    /// Take pending changes, sorted by path, once the window has passed.
    pub(super) fn take_if_ready(&mut self) -> Option<Vec<FileChange>> {
        if !self.is_ready() {
            return None;
        }

        self.last_event = None;
        let mut changes: Vec<FileChange> = std::mem::take(&mut self.changes)
            .into_iter()
            .map(|(path, kind)| FileChange { path, kind })
            .collect();
        changes.sort_by(|a, b| a.path.cmp(&b.path));
        Some(changes)
    }

    pub(super) fn is_ready(&self) -> bool {
        match self.last_event {
            Some(last) => last.elapsed() >= self.window && !self.changes.is_empty(),
            None => false,
        }
    }

    /// Precise sleep duration until next possible ready time.
    pub(super) fn sleep_duration(&self) -> Duration {
        let Some(last_event) = self.last_event else {
            return Duration::from_secs(86400);
        };
        self.window
            .saturating_sub(last_event.elapsed())
            .max(Duration::from_millis(1))
    }
}

/// Check if path is a temp/backup file (editor artifacts).
pub(super) fn is_temp_file(path: &Path) -> bool {
    let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");

    matches!(ext, "bck" | "bak" | "backup" | "swp" | "swo" | "tmp")
        || name.ends_with('~')
        || name.starts_with('.')
        || name.starts_with('#')
}
