//! Outbound message queue.
//!
//! Everything sent within one batch window is queued here and flushed
//! together: consecutive update entries coalesce into a single `update`
//! message, custom events keep their position between them.

use serde_json::{Map, Value};
use tokio::task::JoinHandle;

use super::message::{HmrMessage, HmrUpdate};

/// Queued entries before older updates collapse into one full reload.
pub const MAX_QUEUED_MESSAGES: usize = 1024;

#[derive(Debug, Clone, PartialEq)]
pub(super) enum Outbound {
    Update(HmrUpdate),
    Custom(Map<String, Value>),
}

#[derive(Default)]
pub(super) struct BatchQueue {
    pending: Vec<Outbound>,
    /// Timer that will flush `pending`; at most one at a time
    pub timer: Option<JoinHandle<()>>,
}

impl BatchQueue {
    /// Queue an entry. Returns `true` if no flush is scheduled yet.
    pub fn push(&mut self, entry: Outbound) -> bool {
        if self.pending.len() >= MAX_QUEUED_MESSAGES {
            self.collapse();
        }
        self.pending.push(entry);
        self.timer.is_none()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Take everything queued, coalesced into wire messages.
    pub fn drain(&mut self) -> Vec<HmrMessage> {
        coalesce(std::mem::take(&mut self.pending))
    }

    /// Drop queued entries and return the pending timer, if any.
    pub fn reset(&mut self) -> Option<JoinHandle<()>> {
        self.pending.clear();
        self.timer.take()
    }

    /// Replace every queued update with a single full reload.
    fn collapse(&mut self) {
        let newest = self.pending.iter().rev().find_map(|entry| match entry {
            Outbound::Update(update) => Some((update.path.clone(), update.timestamp)),
            Outbound::Custom(_) => None,
        });

        self.pending.retain(|entry| matches!(entry, Outbound::Custom(_)));
        if let Some((path, timestamp)) = newest {
            crate::debug!("hmr"; "queue full, collapsing into full reload");
            self.pending
                .push(Outbound::Update(HmrUpdate::full_reload(path, timestamp)));
        } else {
            // Only custom events queued: drop the oldest
            self.pending.remove(0);
        }
    }
}

/// Merge runs of update entries into one message each, in FIFO order.
pub(super) fn coalesce(entries: Vec<Outbound>) -> Vec<HmrMessage> {
    let mut messages = Vec::new();
    let mut run: Vec<HmrUpdate> = Vec::new();

    for entry in entries {
        match entry {
            Outbound::Update(update) => run.push(update),
            Outbound::Custom(data) => {
                if !run.is_empty() {
                    messages.push(HmrMessage::Update {
                        updates: std::mem::take(&mut run),
                    });
                }
                messages.push(HmrMessage::Custom { data });
            }
        }
    }
    if !run.is_empty() {
        messages.push(HmrMessage::Update { updates: run });
    }
    messages
}
