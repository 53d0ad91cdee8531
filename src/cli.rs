//! Command-line interface for the `cpmp-applyd` binary.

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = env!("CARGO_PKG_NAME"))]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = env!("CARGO_PKG_DESCRIPTION"))]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Read the source of truth, generate and validate a config, and apply it once.
    Apply(ApplyArgs),

    /// Apply once, then keep watching the database file for changes and reapply on each one.
    Watch(ApplyArgs),

    /// Re-post the most recently saved snapshot to the admin API without reading the database.
    Rollback(ApplyArgs),
}

#[derive(Debug, Parser)]
pub struct ApplyArgs {
    /// Path to the runtime configuration file.
    #[arg(short, long, default_value = "cpmp-applyd.toml")]
    pub config: String,
}
