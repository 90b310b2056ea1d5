//! Guardian Agent
//!
//! Command-line agent around the `guardian-core` decision engine.
//!
//! ## Features
//!
//! - **Intake**: validate signal files, run them through the engine in
//!   timestamp order and write `carecase.<id>.json` documents
//! - **DecisionEvents**: one audit record per engine decision, as JSON lines
//! - **Metrics**: Prometheus counters and gauges for ingestion and gates
//! - **Issue rendering**: title and markdown body for a care-case
//! - **Patch proposals**: markdown stubs for reversible cases, and checks for
//!   proposal files under `guardian/patches/`
//!
//! ## CLI Usage
//!
//! ```bash
//! guardian intake --signals signals/*.json --out generated --events events.jsonl
//! guardian render --case generated/carecase.<id>.json --title
//! guardian patch --case generated/carecase.<id>.json --write .
//! guardian check-patch guardian/patches/<id>.md --branch guardian/<id>
//! ```

pub mod cli;
pub mod config;
pub mod error;
pub mod intake;
pub mod patch;
pub mod playbook;
pub mod render;
pub mod telemetry;

// Contracts module - located at ../contracts relative to src/
#[path = "../contracts/mod.rs"]
pub mod contracts;

pub use cli::{ExitCode, GuardianCli, GuardianCommands, OutputFormat};
pub use config::{AgentConfig, AgentConfigBuilder};
pub use contracts::{
    CareCaseDocument, DecisionEvent, DecisionOutputs, DecisionType, DocumentSignal,
};
pub use error::{AgentError, Result};
pub use intake::{Intake, IntakeReport, SignalReport};
pub use patch::Eligibility;
pub use telemetry::{EventLog, GateMetrics, GateMetricsRegistry, TelemetryError};

/// Agent version (from Cargo.toml)
pub const AGENT_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Agent identifier
pub const AGENT_ID: &str = "guardian-agent";

/// Run the CLI application
///
/// # Example
///
/// ```rust,no_run
/// use clap::Parser;
/// use guardian_agent::{run_cli, GuardianCli};
///
/// #[tokio::main]
/// async fn main() {
///     let exit_code = run_cli(GuardianCli::parse()).await;
///     std::process::exit(exit_code.into());
/// }
/// ```
pub async fn run_cli(cli: GuardianCli) -> ExitCode {
    match cli::run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::from_error(&e)
        }
    }
}
