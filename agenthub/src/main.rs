//! Agenthub - terminal client for published chat agents.
//!
//! The CLI talks to the agent backend over HTTP (sessions, history, agent
//! catalog) and streams replies over SSE. `agenthub serve` runs an
//! in-memory backend, and `agenthub kb ask` answers from local files
//! without any backend.

mod cli;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use cli::{execute, Cli};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    execute(cli).await
}
