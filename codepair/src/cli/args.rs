//! CLI argument definitions.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// codepair - shared coding sessions with in-process code execution
#[derive(Parser, Debug)]
#[command(name = "codepair")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Config file (default: <config dir>/codepair/config.toml when present)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Execute a source file
    Run {
        /// File to execute
        file: PathBuf,

        /// Language identifier (inferred from the extension when omitted)
        #[arg(short, long)]
        language: Option<String>,

        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },

    /// List selectable languages and whether they can run here
    Languages,

    /// Load the Python runtime ahead of time
    Preload,

    /// Drive an in-process session end to end and print every update
    Demo {
        /// Session title
        #[arg(short, long, default_value = "Practice interview")]
        title: String,

        /// Host display name
        #[arg(long, default_value = "Host")]
        host: String,

        /// Guest display name
        #[arg(short, long)]
        guest: Option<String>,
    },
}
