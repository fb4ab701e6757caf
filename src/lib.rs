//! Hot module replacement for component-based frontends.
//!
//! # Module Structure
//!
//! ```text
//! src/
//! ├── graph/      # ModuleGraph: imports, boundaries, propagation, splitting
//! ├── hmr/        # HmrEngine: update pipeline, connections, batched broadcast
//! ├── refresh/    # FastRefresh: component state across module swaps
//! ├── manifest    # Module graph as written by the compiler
//! ├── watch/      # Debounced file watcher
//! ├── server      # WebSocket acceptor
//! ├── config/     # hmr.toml
//! ├── cli/        # serve, graph
//! └── logger      # log!/debug!, watch status line
//! ```

pub mod cli;
pub mod config;
pub mod graph;
pub mod hmr;
pub mod logger;
pub mod manifest;
pub mod refresh;
pub mod server;
pub mod watch;

pub use graph::ModuleGraph;
pub use hmr::{HmrEngine, HmrOptions};
pub use refresh::FastRefresh;
