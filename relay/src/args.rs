use std::path::PathBuf;

use clap::{Parser, Subcommand};
use relay_llm::ServiceTier;

/// Relay model router
#[derive(Debug, Parser)]
#[command(name = "relay", about = "Tier-based model routing with circuit breaking and fallback")]
pub struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "relay.toml", env = "RELAY_CONFIG")]
    pub config: PathBuf,

    /// Log filter directive, e.g. `info` or `relay_llm=debug`
    #[arg(long, default_value = "info", env = "RELAY_LOG")]
    pub log_filter: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Send a single message and print the response as JSON
    Send {
        /// Service tier: pro, flash, lite or fallback
        #[arg(short, long, default_value = "flash")]
        tier: ServiceTier,

        /// Try the secondary provider once if every chain backend fails
        #[arg(long)]
        secondary: bool,

        /// Attach an image as a data URI or raw base64
        #[arg(long)]
        image: Vec<String>,

        /// Attach the tool declarations from this JSON file
        #[arg(long)]
        tools: Option<PathBuf>,

        message: String,
    },

    /// Interactive conversation read line by line from stdin
    Chat {
        #[arg(short, long, default_value = "flash")]
        tier: ServiceTier,

        /// JSON array of `{role, content}` turns to resume from
        #[arg(long)]
        history: Option<PathBuf>,
    },

    /// Probe every configured backend and print the result as JSON
    Health,
}
