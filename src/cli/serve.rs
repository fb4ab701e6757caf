//! `serve` command: watch sources and push updates over WebSocket.
//!
//! ```text
//! FileWatcher ──> Vec<FileChange> ──> serve loop ──┬─> manifest changed: rebuild graph
//!                                                  └─> source changed: HmrEngine::handle_update
//! Ctrl+C ──> shutdown channel ──> serve loop exits ──> HmrEngine::close
//! ```

use std::path::Path;

use anyhow::{Context, Result};
use tokio::sync::mpsc;

use crate::config::HmrConfig;
use crate::hmr::{HmrEngine, HmrUpdate};
use crate::logger::{status_error, status_success, status_unchanged, status_warning};
use crate::manifest::{Manifest, resolve_file};
use crate::server::start_ws_server;
use crate::watch::{ChangeKind, FileChange, FileWatcher};
use crate::{debug, log};

pub fn run_serve(config: &HmrConfig) -> Result<()> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?;
    runtime.block_on(serve(config))
}

async fn serve(config: &HmrConfig) -> Result<()> {
    let options = config
        .engine_options()
        .with_on_error(|e| status_error("update failed", &format!("{:#}", e)));
    let engine = HmrEngine::new(options)?;

    load_manifest(&engine, config);

    let addr = start_ws_server(config.serve.interface, config.serve.port, engine.clone())?;
    log!("serve"; "listening on ws://{}", addr);

    let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);
    ctrlc::set_handler(move || {
        let _ = shutdown_tx.try_send(());
    })
    .map_err(|e| anyhow::anyhow!("failed to set Ctrl+C handler: {}", e))?;

    let watcher = FileWatcher::new(
        config.serve.watch.clone(),
        vec![config.serve.manifest.clone()],
    )
    .context("failed to start file watcher")?;
    let (change_tx, mut change_rx) = mpsc::channel(16);
    tokio::spawn(watcher.run(change_tx));

    loop {
        tokio::select! {
            biased;
            _ = shutdown_rx.recv() => break,
            batch = change_rx.recv() => match batch {
                Some(changes) => on_changes(&engine, config, changes).await,
                None => break,
            },
        }
    }

    log!("serve"; "shutting down...");
    engine.close();
    Ok(())
}

/// Replace the graph from the manifest, keeping the old graph on failure.
fn load_manifest(engine: &HmrEngine, config: &HmrConfig) {
    let path = &config.serve.manifest;
    if !path.exists() {
        log!("warning"; "{} not found, every change will reload", config.root_relative(path).display());
        return;
    }

    let result = Manifest::load(path).and_then(|manifest| manifest.apply(engine, config.get_root()));
    match result {
        Ok(count) => log!("manifest"; "loaded {} module(s)", count),
        Err(e) => status_error("manifest rejected", &format!("{:#}", anyhow::Error::from(e))),
    }
}

async fn on_changes(engine: &HmrEngine, config: &HmrConfig, changes: Vec<FileChange>) {
    let (manifest, sources): (Vec<_>, Vec<_>) = changes
        .into_iter()
        .partition(|change| is_manifest(&change.path, &config.serve.manifest));

    if manifest.iter().any(|c| c.kind != ChangeKind::Removed) {
        load_manifest(engine, config);
    }

    for change in sources {
        let file = resolve_file(config.get_root(), &change.path);
        debug!("watch"; "{} {}", change.kind.label(), config.root_relative(&change.path).display());

        let updates = engine.handle_update(&file).await;
        report(config, &change.path, &updates);
    }
}

fn is_manifest(path: &Path, manifest: &Path) -> bool {
    path == manifest
}

fn report(config: &HmrConfig, path: &Path, updates: &[HmrUpdate]) {
    let display = config.root_relative(path);
    let display = display.display();

    if updates.is_empty() {
        status_unchanged(&format!("{}: nothing sent", display));
    } else if updates.iter().any(HmrUpdate::is_full_reload) {
        status_warning(&format!("{}: full reload", display));
    } else {
        let boundaries: Vec<_> = updates
            .iter()
            .filter_map(|u| u.accepted_path.as_deref())
            .collect();
        status_success(&format!("{} -> {}", display, boundaries.join(", ")));
    }
}
