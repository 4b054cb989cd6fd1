//! Command-line interface definitions.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "streambox", version, about = "Self-hosted media streaming server")]
pub struct Cli {
    /// Path to the JSON configuration file.
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the server.
    Start {
        /// Listen host override.
        #[arg(long)]
        host: Option<String>,
        /// Listen port override.
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Validate a configuration file and print effective settings.
    Validate,
    /// Hash a password for manual user provisioning.
    HashPassword { password: String },
    /// Generate a random server secret.
    GenerateSecret,
}
