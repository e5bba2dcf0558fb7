//! Command-line interface for sparcflow
//!
//! ## Module Structure
//!
//! - `args`: CLI argument definitions (clap)
//! - `run`: entry point and command dispatch
//! - `commands`: command implementations and JSON output

pub mod args;
mod commands;
mod run;


pub use args::{Cli, Commands};
pub use run::run;
