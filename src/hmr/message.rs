//! HMR Message Protocol
//!
//! JSON messages sent over WebSocket to the browser HMR client.
//!
//! # Message Types
//!
//! - `connected`: handshake, sent once per connection
//! - `update`: a batch of module updates and/or full-reload requests
//! - `custom`: user-defined event with an arbitrary payload

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Sent when a message cannot be serialized.
const FALLBACK_RELOAD: &str =
    r#"{"type":"update","updates":[{"type":"full-reload","path":"","timestamp":0}]}"#;

/// What the client should do for one changed file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum UpdateKind {
    /// Hot-swap `accepted_path` in place.
    Update,
    /// Reload the whole page.
    FullReload,
}

/// One entry of an `update` message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HmrUpdate {
    #[serde(rename = "type")]
    pub kind: UpdateKind,
    /// File that changed.
    pub path: String,
    /// Boundary module that absorbs the update.
    #[serde(rename = "acceptedPath", skip_serializing_if = "Option::is_none")]
    pub accepted_path: Option<String>,
    pub timestamp: u64,
}

impl HmrUpdate {
    /// Create a hot-swap entry for `path`, accepted by `boundary`.
    pub fn update(path: impl Into<String>, boundary: impl Into<String>, timestamp: u64) -> Self {
        Self {
            kind: UpdateKind::Update,
            path: path.into(),
            accepted_path: Some(boundary.into()),
            timestamp,
        }
    }

    /// Create a full-reload entry for `path`.
    pub fn full_reload(path: impl Into<String>, timestamp: u64) -> Self {
        Self {
            kind: UpdateKind::FullReload,
            path: path.into(),
            accepted_path: None,
            timestamp,
        }
    }

    pub fn is_full_reload(&self) -> bool {
        self.kind == UpdateKind::FullReload
    }
}

/// Message sent over WebSocket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum HmrMessage {
    /// Connection established
    Connected,

    /// One or more updates, flushed together
    Update { updates: Vec<HmrUpdate> },

    /// Custom event: `data` holds `event` plus the payload fields
    Custom { data: Map<String, Value> },
}

impl HmrMessage {
    /// Create a custom event message.
    ///
    /// Object payloads are flattened next to `event`; any other payload is
    /// carried under a `payload` key.
    pub fn custom(event: &str, payload: Value) -> Self {
        let mut data = Map::new();
        data.insert("event".to_string(), Value::String(event.to_string()));
        match payload {
            Value::Object(fields) => {
                for (key, value) in fields {
                    if key != "event" {
                        data.insert(key, value);
                    }
                }
            }
            Value::Null => {}
            other => {
                data.insert("payload".to_string(), other);
            }
        }
        Self::Custom { data }
    }

    /// Serialize to JSON string. Falls back to a full reload so a client
    /// never misses an update.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| FALLBACK_RELOAD.to_string())
    }

    /// Parse from JSON string
    pub fn from_json(s: &str) -> Option<Self> {
        serde_json::from_str(s).ok()
    }
}
