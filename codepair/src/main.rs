//! codepair - run shared interview code from the command line.
//!
//! The binary is a thin shell over the library: it loads configuration,
//! sets up logging and dispatches to a subcommand.

mod cli;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use cli::{execute, Cli};

const LOG_ENV: &str = "CODEPAIR_LOG";

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    execute(cli).await
}

/// Log to stderr so command output on stdout stays clean.
fn init_tracing() {
    let filter = EnvFilter::try_from_env(LOG_ENV)
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("codepair=info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}
