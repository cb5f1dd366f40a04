//! Subcommand implementations. Each returns the process exit code.

pub mod run;
pub mod stage;
pub mod status;
