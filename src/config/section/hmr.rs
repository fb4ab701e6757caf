//! `[hmr]` section configuration.
//!
//! # Example
//!
//! ```toml
//! [hmr]
//! preserve_state = true                   # Keep component state across swaps
//! reload_on_error = true                  # Full reload when an update fails
//! timeout = 5000                          # ms, upper bound per update
//! batch_window = 16                       # ms, outbound messages are coalesced
//! boundaries = ["src/pages/**"]           # Ids or globs that accept updates
//! component_extensions = [".tsx", ".jsx"] # Files treated as components
//! ```

use serde::{Deserialize, Serialize};

use crate::config::ConfigDiagnostics;
use crate::graph::BoundaryRules;

/// Longest accepted batch window, in milliseconds.
pub const MAX_BATCH_WINDOW: u64 = 1000;

/// Update engine settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HmrSection {
    pub preserve_state: bool,
    pub reload_on_error: bool,
    /// Milliseconds.
    pub timeout: u64,
    /// Milliseconds.
    pub batch_window: u64,
    pub boundaries: Vec<String>,
    pub component_extensions: Vec<String>,
}

impl Default for HmrSection {
    fn default() -> Self {
        Self {
            preserve_state: true,
            reload_on_error: true,
            timeout: 5000,
            batch_window: 16,
            boundaries: Vec::new(),
            component_extensions: vec![".tsx".into(), ".jsx".into()],
        }
    }
}

impl HmrSection {
    pub fn validate(&self, diag: &mut ConfigDiagnostics) {
        if self.timeout == 0 {
            diag.error("hmr.timeout", "must be greater than 0");
        }

        if self.batch_window > MAX_BATCH_WINDOW {
            diag.error_with_hint(
                "hmr.batch_window",
                format!("{} ms is too long", self.batch_window),
                format!("use at most {MAX_BATCH_WINDOW} ms"),
            );
        }

        for pattern in &self.boundaries {
            if pattern.trim().is_empty() {
                diag.error("hmr.boundaries", "empty pattern");
            } else if let Err(e) = BoundaryRules::new(&[pattern]) {
                diag.error("hmr.boundaries", format!("invalid pattern `{pattern}`: {e}"));
            }
        }

        for ext in &self.component_extensions {
            if !ext.starts_with('.') || ext.len() < 2 {
                diag.error_with_hint(
                    "hmr.component_extensions",
                    format!("invalid extension `{ext}`"),
                    format!("write it with a leading dot, e.g. `.{}`", ext.trim_start_matches('.')),
                );
            }
        }
    }
}
