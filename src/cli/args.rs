//! CLI argument definitions using clap
//!
//! Commands:
//! - blockmark init --config <path>
//! - blockmark import --config <path> --file <path>
//! - blockmark scan --config <path>
//! - blockmark migrate --config <path> [--batch-size N] [--max-chunks N]
//! - blockmark status --config <path>
//! - blockmark inspect --config <path> --document <id>
//! - blockmark serve --config <path> [--port N]

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// blockmark - stable block identity migration
#[derive(Parser, Debug)]
#[command(name = "blockmark")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Initialize a new data directory
    Init {
        /// Path to configuration file
        #[arg(long, default_value = "./blockmark.json")]
        config: PathBuf,
    },

    /// Load documents and annotations from a JSON file
    Import {
        /// Path to configuration file
        #[arg(long, default_value = "./blockmark.json")]
        config: PathBuf,

        /// JSON file with `documents` and `annotations` arrays
        #[arg(long)]
        file: PathBuf,
    },

    /// Report blocks without a stable id
    Scan {
        /// Path to configuration file
        #[arg(long, default_value = "./blockmark.json")]
        config: PathBuf,
    },

    /// Assign stable ids and migrate annotations
    Migrate {
        /// Path to configuration file
        #[arg(long, default_value = "./blockmark.json")]
        config: PathBuf,

        /// Documents per chunk (overrides config)
        #[arg(long)]
        batch_size: Option<usize>,

        /// Stop after this many chunks; the next run resumes
        #[arg(long)]
        max_chunks: Option<usize>,
    },

    /// Show the persisted migration job
    Status {
        /// Path to configuration file
        #[arg(long, default_value = "./blockmark.json")]
        config: PathBuf,
    },

    /// List a document's blocks with their legacy addresses
    Inspect {
        /// Path to configuration file
        #[arg(long, default_value = "./blockmark.json")]
        config: PathBuf,

        /// Document id
        #[arg(long)]
        document: u64,
    },

    /// Start the HTTP server
    Serve {
        /// Path to configuration file
        #[arg(long, default_value = "./blockmark.json")]
        config: PathBuf,

        /// Port to listen on (overrides config)
        #[arg(long)]
        port: Option<u16>,
    },
}

impl Cli {
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}
