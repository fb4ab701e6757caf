//! Configuration section definitions.
//!
//! Each module corresponds to a section in `hmr.toml`:
//!
//! | Module   | TOML Section | Purpose                               |
//! |----------|--------------|---------------------------------------|
//! | `hmr`    | `[hmr]`      | Update engine, boundaries, batching   |
//! | `serve`  | `[serve]`    | WebSocket server, watch dirs, manifest |

mod hmr;
mod serve;

pub use hmr::{HmrSection, MAX_BATCH_WINDOW};
pub use serve::ServeSection;
