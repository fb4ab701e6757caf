use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use super::error::HmrError;
use super::message::HmrUpdate;
use crate::config::HmrSection;
use crate::graph::BoundaryRules;

/// Called for every update produced by [`HmrEngine::handle_update`](super::HmrEngine::handle_update).
pub type UpdateCallback = Arc<dyn Fn(&HmrUpdate) -> anyhow::Result<()> + Send + Sync>;

/// Called for every error the engine reports.
pub type ErrorCallback = Arc<dyn Fn(&HmrError) + Send + Sync>;

/// Engine behaviour.
#[derive(Clone)]
pub struct HmrOptions {
    /// Snapshot component state at accepting boundaries before a swap.
    pub preserve_state: bool,
    /// Broadcast a full reload when an update fails.
    pub reload_on_error: bool,
    /// Upper bound for one `handle_update`.
    pub timeout: Duration,
    /// How long outbound messages are held before a flush.
    pub batch_window: Duration,
    /// Module ids or globs that always accept updates.
    pub boundaries: Vec<String>,
    /// Extensions treated as components.
    pub component_extensions: Vec<String>,
    pub on_update: Option<UpdateCallback>,
    pub on_error: Option<ErrorCallback>,
}

impl Default for HmrOptions {
    fn default() -> Self {
        Self {
            preserve_state: true,
            reload_on_error: true,
            timeout: Duration::from_millis(5000),
            batch_window: Duration::from_millis(16),
            boundaries: Vec::new(),
            component_extensions: Vec::new(),
            on_update: None,
            on_error: None,
        }
    }
}

impl HmrOptions {
    /// Options from the `[hmr]` config section.
    pub fn from_config(section: &HmrSection) -> Self {
        Self {
            preserve_state: section.preserve_state,
            reload_on_error: section.reload_on_error,
            timeout: Duration::from_millis(section.timeout),
            batch_window: Duration::from_millis(section.batch_window),
            boundaries: section.boundaries.clone(),
            component_extensions: section.component_extensions.clone(),
            ..Self::default()
        }
    }

    pub fn with_on_update<F>(mut self, callback: F) -> Self
    where
        F: Fn(&HmrUpdate) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.on_update = Some(Arc::new(callback));
        self
    }

    pub fn with_on_error<F>(mut self, callback: F) -> Self
    where
        F: Fn(&HmrError) + Send + Sync + 'static,
    {
        self.on_error = Some(Arc::new(callback));
        self
    }

    /// Compile boundary globs and component extensions.
    pub(super) fn rules(&self) -> Result<BoundaryRules, HmrError> {
        let mut rules = match BoundaryRules::new(&self.boundaries) {
            Ok(rules) => rules,
            Err(source) => {
                let pattern = self
                    .boundaries
                    .iter()
                    .find(|p| crate::graph::glob_to_regex(p).is_err())
                    .cloned()
                    .unwrap_or_default();
                return Err(HmrError::Pattern { pattern, source });
            }
        };
        if !self.component_extensions.is_empty() {
            rules = rules.with_extensions(&self.component_extensions);
        }
        Ok(rules)
    }
}

impl fmt::Debug for HmrOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HmrOptions")
            .field("preserve_state", &self.preserve_state)
            .field("reload_on_error", &self.reload_on_error)
            .field("timeout", &self.timeout)
            .field("batch_window", &self.batch_window)
            .field("boundaries", &self.boundaries)
            .field("component_extensions", &self.component_extensions)
            .field("on_update", &self.on_update.is_some())
            .field("on_error", &self.on_error.is_some())
            .finish()
    }
}
