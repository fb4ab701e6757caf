//! `graph` command: analyze the module manifest.

use anyhow::{Context, Result};
use owo_colors::OwoColorize;
use serde::Serialize;

use crate::config::HmrConfig;
use crate::graph::{GraphStats, ModuleGraph, SplitPoint};
use crate::hmr::HmrEngine;
use crate::log;
use crate::manifest::Manifest;

/// Everything the command reports about a graph.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GraphReport {
    stats: GraphStats,
    load_order: Vec<String>,
    cycles: Vec<Vec<String>>,
    /// (module, importers), sorted by module id
    shared: Vec<(String, Vec<String>)>,
    split_points: Vec<SplitPoint>,
}

impl GraphReport {
    fn collect(graph: &ModuleGraph) -> Self {
        let owned = |ids: Vec<&str>| ids.into_iter().map(str::to_string).collect::<Vec<_>>();

        let mut shared: Vec<_> = graph
            .get_shared_dependencies()
            .into_iter()
            .map(|(id, importers)| (id.to_string(), owned(importers)))
            .collect();
        shared.sort();

        Self {
            stats: graph.get_stats(),
            load_order: owned(graph.get_load_order()),
            cycles: graph
                .find_circular_dependencies()
                .into_iter()
                .map(owned)
                .collect(),
            shared,
            split_points: graph.get_split_points(),
        }
    }

    fn print(&self) {
        let stats = &self.stats;
        println!("{}", "Stats".bold());
        println!("  modules       {}", stats.node_count);
        println!("  imports       {}", stats.edge_count);
        println!("  max depth     {}", stats.max_depth);
        println!("  avg deps      {:.2}", stats.avg_dependencies);

        println!("{}", "Load order".bold());
        for (i, id) in self.load_order.iter().enumerate() {
            println!("  {:>3}. {}", i + 1, id);
        }

        println!("{}", "Cycles".bold());
        if self.cycles.is_empty() {
            println!("  {}", "none".dimmed());
        }
        for cycle in &self.cycles {
            println!("  {}", cycle.join(" -> ").yellow());
        }

        println!("{}", "Shared dependencies".bold());
        if self.shared.is_empty() {
            println!("  {}", "none".dimmed());
        }
        for (id, importers) in &self.shared {
            println!("  {} {}", id, format!("<- {}", importers.join(", ")).dimmed());
        }

        println!("{}", "Split points".bold());
        if self.split_points.is_empty() {
            println!("  {}", "none".dimmed());
        }
        for point in &self.split_points {
            println!(
                "  {} {} {}",
                point.module,
                format!("{:?}", point.strategy).to_lowercase().cyan(),
                format!("~{} KiB", point.size.div_ceil(1024)).dimmed()
            );
        }
    }
}

pub fn run_graph(config: &HmrConfig, json: bool) -> Result<()> {
    let manifest_path = &config.serve.manifest;
    let manifest = Manifest::load(manifest_path)
        .with_context(|| format!("cannot analyze {}", manifest_path.display()))?;

    let engine = HmrEngine::new(config.engine_options())?;
    let count = manifest.apply(&engine, config.get_root())?;
    crate::debug!("graph"; "loaded {} module(s)", count);

    let report = GraphReport::collect(&engine.module_graph());
    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        report.print();
    }

    if !report.cycles.is_empty() {
        log!("warning"; "{} circular dependency chain(s) found", report.cycles.len());
    }
    Ok(())
}
