//! Command-line interface for portal-harvest.

mod commands;

pub use commands::{parse_cli, run_with_cli, Cli, Commands};
