//! CLI module for scribe
//!
//! Provides command-line interface parsing for the scribe-server binary.
//! Uses clap for argument parsing and owo-colors for colored terminal output.

/// Colored terminal output.
pub mod output;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// scribe - multi-stage research report pipeline
///
/// Searches the web for a research request, reads and analyzes the sources,
/// writes every report section in parallel and streams progress throughout.
#[derive(Parser, Debug)]
#[command(
    name = "scribe-server",
    version,
    about = "scribe - research reports from a single request",
    long_about = "Turns one research request into a multi-section report.\n\n\
                  Run without arguments to start the server, or use 'run' to produce a report\n\
                  directly in the terminal.",
    after_help = "EXAMPLES:\n    \
                  scribe-server                              # Start the server (reads scribe.toml)\n    \
                  scribe-server run \"sparse attention\"       # Write a report and print progress\n    \
                  scribe-server run \"rag\" -o report.md       # Save the report to a file\n    \
                  scribe-server config --validate            # Check the configuration file"
)]
/// Command-line arguments for the `scribe` binary.
pub struct Cli {
    /// Path to the configuration file
    #[arg(short, long, default_value = "scribe.toml", global = true)]
    pub config: PathBuf,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub log_json: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available CLI subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the HTTP server (default)
    Serve,

    /// Run one research request and print its progress
    Run {
        /// The research request
        query: String,

        /// Write the final report to this file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Show configuration information
    Config {
        /// Validate the configuration file
        #[arg(long)]
        validate: bool,
    },
}

impl Cli {
    /// Parse CLI arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
