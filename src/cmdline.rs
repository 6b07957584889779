//! Command-line interface.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// webOS Update Server: an OMA DM / SyncML endpoint for legacy devices.
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Opt {
    /// Path to the TOML configuration file.
    #[arg(short, long)]
    pub config: PathBuf,

    #[command(subcommand)]
    pub cmd: Option<Command>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start the HTTP server (the default when no subcommand is given).
    Serve,
    /// Rescan the packages directory for new `.ipk`/`.dipk` files and exit.
    Scan,
    /// Report whether an update is available for a given device build, then exit.
    Check {
        /// Device build string, e.g. `Nova-3.0.5-64`.
        build: String,
    },
}
