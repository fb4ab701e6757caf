//! tola-hmr - hot module replacement server.

use anyhow::Result;
use clap::{ColorChoice, Parser};
use tola_hmr::cli::{self, Cli, Commands};
use tola_hmr::config::HmrConfig;
use tola_hmr::logger;

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set global color override based on CLI option
    match cli.color {
        ColorChoice::Always => owo_colors::set_override(true),
        ColorChoice::Never => owo_colors::set_override(false),
        ColorChoice::Auto => {} // owo-colors auto-detects TTY
    }
    logger::set_verbose(cli.verbose);

    let config = HmrConfig::load(&cli)?;

    match &cli.command {
        Commands::Serve { .. } => cli::serve::run_serve(&config),
        Commands::Graph { json } => cli::graph::run_graph(&config, *json),
    }
}
