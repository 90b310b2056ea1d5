//! Guardian CLI
//!
//! # Usage
//!
//! ```bash
//! # Turn signal files into care-case documents
//! guardian intake --signals signals/*.json --out generated --at 2026-03-01T10:00:00Z
//!
//! # Issue title and body for a care-case
//! guardian render --case generated/carecase.<id>.json --body
//!
//! # Patch proposal for a reversible case
//! guardian patch --case generated/carecase.<id>.json --write .
//! ```
//!
//! # Exit Codes
//!
//! - 0: Success
//! - 1: A transition was blocked, or a patch proposal failed its checks
//! - 2: Care-case not eligible for a patch proposal
//! - 3: Invalid input or arguments
//! - 4: File not found or inaccessible
//! - 10: Internal error

use clap::Parser;
use guardian_agent::{run_cli, GuardianCli};
use tracing::Level;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = GuardianCli::parse();

    let level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };
    let filter = EnvFilter::from_default_env().add_directive(level.into());

    if cli.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
            .init();
    }

    let exit_code = run_cli(cli).await;
    std::process::exit(exit_code.into());
}
