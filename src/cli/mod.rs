//! Command-line interface module.

mod args;
pub mod graph;
pub mod serve;

pub use args::{Cli, Commands};
