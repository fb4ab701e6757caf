//! Project configuration for `hmr.toml`.
//!
//! # Module Structure
//!
//! ```text
//! config/
//! ├── section/       # Configuration section definitions
//! │   ├── hmr        # [hmr]
//! │   └── serve      # [serve]
//! ├── error          # ConfigError, ConfigDiagnostics
//! ├── util           # Config file discovery
//! └── mod.rs         # HmrConfig (this file)
//! ```
//!
//! # Sections
//!
//! | Section   | Purpose                                            |
//! |-----------|----------------------------------------------------|
//! | `[hmr]`   | State preservation, error policy, timing, boundaries |
//! | `[serve]` | WebSocket server (interface, port), watch, manifest |
//!
//! The config file is optional: without one, defaults apply and the
//! current directory is the project root.

mod error;
pub mod section;
mod util;

pub use error::{ConfigDiagnostic, ConfigDiagnostics, ConfigError};
pub use section::{HmrSection, MAX_BATCH_WINDOW, ServeSection};

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::cli::{Cli, Commands};
use crate::hmr::HmrOptions;
use crate::log;
use util::find_config_file;

// ============================================================================
// root configuration
// ============================================================================

/// Root configuration structure representing hmr.toml
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HmrConfig {
    /// Absolute path to the config file, empty when none was found
    #[serde(skip)]
    pub config_path: PathBuf,

    /// Project root directory - parent of config file
    #[serde(skip)]
    pub root: PathBuf,

    /// Update engine settings
    #[serde(default)]
    pub hmr: HmrSection,

    /// Development server settings
    #[serde(default)]
    pub serve: ServeSection,
}

impl HmrConfig {
    /// Load configuration for the parsed command line.
    ///
    /// Searches upward from cwd for the config file; falls back to defaults
    /// rooted at cwd when none exists.
    pub fn load(cli: &Cli) -> Result<Self> {
        let cwd = std::env::current_dir().context("Failed to get current working directory")?;

        let mut config = match find_config_file(&cli.config, &cwd) {
            Some(path) => {
                let mut config = Self::from_path(&path)?;
                config.config_path = path;
                config
            }
            None => {
                crate::debug!("config"; "{} not found, using defaults", cli.config.display());
                Self::default()
            }
        };

        config.finalize(cli, &cwd);
        config.validate()?;
        Ok(config)
    }

    /// Resolve the root, apply CLI overrides and absolutize paths.
    fn finalize(&mut self, cli: &Cli, cwd: &Path) {
        self.root = self
            .config_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| cwd.to_path_buf());

        if let Commands::Serve { interface, port } = &cli.command {
            Self::update_option(&mut self.serve.interface, interface.as_ref());
            Self::update_option(&mut self.serve.port, port.as_ref());
        }

        let root = self.root.clone();
        self.serve.manifest = root.join(&self.serve.manifest);
        for dir in &mut self.serve.watch {
            *dir = root.join(&*dir);
        }
    }

    /// Update config option if CLI value is provided.
    fn update_option<T: Clone>(config_option: &mut T, cli_option: Option<&T>) {
        if let Some(option) = cli_option {
            *config_option = option.clone();
        }
    }

    /// Parse configuration from TOML string
    pub fn from_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Load configuration from file path with unknown field detection.
    fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let content =
            fs::read_to_string(path).map_err(|err| ConfigError::Io(path.to_path_buf(), err))?;

        let (config, ignored) = Self::parse_with_ignored(&content)?;
        if !ignored.is_empty() {
            Self::print_unknown_fields_warning(&ignored, path);
        }
        Ok(config)
    }

    /// Parse TOML content, collecting any unknown fields.
    fn parse_with_ignored(content: &str) -> Result<(Self, Vec<String>), ConfigError> {
        let mut ignored = Vec::new();
        let deserializer = toml::Deserializer::new(content);
        let config = serde_ignored::deserialize(deserializer, |path: serde_ignored::Path| {
            ignored.push(path.to_string());
        })?;
        Ok((config, ignored))
    }

    fn print_unknown_fields_warning(fields: &[String], path: &Path) {
        let display_path = path
            .file_name()
            .map(|n| n.to_string_lossy())
            .unwrap_or_else(|| path.to_string_lossy());
        log!("warning"; "unknown fields in {}, ignoring:", display_path);
        for field in fields {
            eprintln!("- {}", field);
        }
    }

    /// Validate every section, reporting all errors at once.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut diag = ConfigDiagnostics::new();
        self.hmr.validate(&mut diag);
        self.serve.validate(&mut diag);
        diag.into_result().map_err(ConfigError::Diagnostics)
    }

    /// Engine options described by the `[hmr]` section.
    pub fn engine_options(&self) -> HmrOptions {
        HmrOptions::from_config(&self.hmr)
    }

    pub fn get_root(&self) -> &Path {
        &self.root
    }

    /// Join a path with the root directory.
    pub fn root_join(&self, path: impl AsRef<Path>) -> PathBuf {
        self.root.join(path)
    }

    /// Get path relative to the project root
    pub fn root_relative(&self, path: impl AsRef<Path>) -> PathBuf {
        path.as_ref()
            .strip_prefix(&self.root)
            .map(Path::to_path_buf)
            .unwrap_or_else(|_| path.as_ref().to_path_buf())
    }
}

// ============================================================================
// Test Helpers (available to all modules via `use crate::config::test_*`)
// ============================================================================

/// Parse config, panicking on unknown fields (to catch typos in tests).
#[cfg(test)]
pub fn test_parse_config(content: &str) -> HmrConfig {
    let (parsed, ignored) = HmrConfig::parse_with_ignored(content).unwrap();
    assert!(
        ignored.is_empty(),
        "test config has unknown fields: {:?}",
        ignored
    );
    parsed
}

// ============================================================================
// tests
// ============================================================================
