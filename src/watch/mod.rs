//! File watcher
//!
//! Watches the source directories and the manifest, and hands debounced
//! batches of changes to the serve loop.
//!
//! ```text
//! notify ──> Debouncer (50 ms, dedup per path) ──> Vec<FileChange> ──> serve loop
//! ```

mod debouncer;
mod roots;

use std::path::PathBuf;

use notify::{RecommendedWatcher, RecursiveMode};
use tokio::sync::mpsc;

use debouncer::Debouncer;
use roots::WatchRoots;

/// What happened to a file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Created,
    Modified,
    Removed,
}

impl ChangeKind {
    pub fn label(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Modified => "modified",
            Self::Removed => "removed",
        }
    }
}

/// One debounced change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileChange {
    pub path: PathBuf,
    pub kind: ChangeKind,
}

/// Debounced watcher over a set of roots.
pub struct FileWatcher {
    /// Channel to receive notify events (sync -> async bridge)
    notify_rx: std::sync::mpsc::Receiver<notify::Result<notify::Event>>,
    /// Watcher handle (must be kept alive)
    watcher: RecommendedWatcher,
    roots: WatchRoots,
    debouncer: Debouncer,
}

impl FileWatcher {
    /// Start watching `dirs` recursively and `files` through their parent
    /// directory. Events buffer until [`run`](Self::run) is called.
    pub fn new(dirs: Vec<PathBuf>, files: Vec<PathBuf>) -> notify::Result<Self> {
        let (notify_tx, notify_rx) = std::sync::mpsc::channel();
        let mut watcher = notify::recommended_watcher(move |res| {
            let _ = notify_tx.send(res);
        })?;

        let mut targets: Vec<_> = dirs
            .into_iter()
            .map(|dir| (dir, RecursiveMode::Recursive))
            .collect();
        // Watch the directory, not the file: writers often replace the file
        for file in files {
            if let Some(parent) = file.parent() {
                targets.push((parent.to_path_buf(), RecursiveMode::NonRecursive));
            }
        }

        let mut roots = WatchRoots::new(targets);
        roots.attach_existing(&mut watcher)?;

        Ok(Self {
            notify_rx,
            watcher,
            roots,
            debouncer: Debouncer::new(),
        })
    }

    /// Forward debounced batches to `tx` until the receiver is dropped.
    pub async fn run(self, tx: mpsc::Sender<Vec<FileChange>>) {
        let notify_rx = self.notify_rx;
        let mut debouncer = self.debouncer;
        let mut watcher = self.watcher;
        let mut roots = self.roots;

        let (async_tx, mut async_rx) = mpsc::channel::<notify::Event>(64);

        std::thread::spawn(move || {
            while let Ok(result) = notify_rx.recv() {
                match result {
                    Ok(event) => {
                        if async_tx.blocking_send(event).is_err() {
                            break;
                        }
                    }
                    Err(e) => crate::log!("watch"; "notify error: {}", e),
                }
            }
        });

        loop {
            tokio::select! {
                biased;
                event = async_rx.recv() => match event {
                    Some(event) => debouncer.add_event(&event),
                    None => break,
                },
                _ = tokio::time::sleep(debouncer.sleep_duration()) => {
                    roots.maintain(&mut watcher);
                    if let Some(changes) = debouncer.take_if_ready()
                        && tx.send(changes).await.is_err()
                    {
                        break;
                    }
                }
            }
        }
    }
}
