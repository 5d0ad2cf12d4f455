//! CLI command implementations.

pub mod dict;
pub mod kanban;

use clap::ValueEnum;

/// Output format for listing commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Format {
    /// One entry per line.
    Text,
    /// A JSON array.
    Json,
}
