//! Root CLI structure and global options.

use clap::Parser;

use crate::commands::Commands;

/// Voice-enabled chat for websites: proxy host and terminal client.
#[derive(Debug, Parser)]
#[command(name = "odia")]
#[command(about = "Run the ODIA widget proxy or chat with it from a terminal")]
#[command(version)]
pub struct Cli {
    /// Enable verbose/debug output
    #[arg(short = 'v', long = "verbose", global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}
