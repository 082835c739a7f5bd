//! Command-line interface for reskin
//!
//! ## Module Structure
//!
//! - `args`: CLI argument definitions (clap)
//! - `run`: entry point, configuration discovery and command dispatch
//! - `commands`: command implementations and shared helpers
//! - `tests`: parser tests (cfg(test) only)

pub mod args;
mod commands;
mod run;

#[cfg(test)]
mod tests;

pub use args::{BatchedPhaseArgs, Cli, Commands, GateCommands, build_cli};
pub use commands::{GateView, StatusOutput, build_status};
pub use run::run;
