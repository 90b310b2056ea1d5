//! CLI command definitions for the Guardian agent

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use super::output::{self, CheckOutput, OutputFormat};
use super::ExitCode;
use crate::config::AgentConfig;
use crate::contracts::CareCaseDocument;
use crate::error::{AgentError, Result};
use crate::intake::Intake;
use crate::patch::{self, Eligibility};
use crate::render;

/// Guardian policy gate agent
///
/// Turns signal files into care-cases, renders them for issue trackers and
/// checks patch proposals.
#[derive(Parser, Debug)]
#[command(name = "guardian")]
#[command(about = "Guardian - policy gate decisions for signals and care-cases", long_about = None)]
#[command(version)]
pub struct GuardianCli {
    /// Output verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Emit logs as JSON
    #[arg(long, global = true, env = "GUARDIAN_LOG_JSON")]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: GuardianCommands,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum GuardianCommands {
    /// Validate signals and write care-case documents
    ///
    /// Signals are ingested in timestamp order. Exits 1 when any transition
    /// was blocked by a constraint.
    Intake {
        /// Signal JSON files
        #[arg(short, long, num_args = 1.., required = true)]
        signals: Vec<PathBuf>,

        /// Directory for carecase.<id>.json documents
        #[arg(short, long)]
        out: Option<PathBuf>,

        /// Write DecisionEvents as JSON lines to this file
        #[arg(long)]
        events: Option<PathBuf>,

        /// Print Prometheus metrics after the run
        #[arg(long)]
        metrics: bool,

        /// Evaluation clock (RFC 3339); defaults to now
        #[arg(long, value_parser = parse_timestamp)]
        at: Option<DateTime<Utc>>,

        /// Agent configuration file (.yaml, .yml or .toml)
        #[arg(short, long)]
        config: Option<PathBuf>,

        #[arg(long, value_enum, default_value = "table")]
        format: OutputFormat,
    },

    /// Print the issue title or body for a care-case document
    Render {
        /// Care-case document
        #[arg(long)]
        case: PathBuf,

        /// Print the issue title
        #[arg(long, conflicts_with = "body", required_unless_present = "body")]
        title: bool,

        /// Print the issue body
        #[arg(long)]
        body: bool,
    },

    /// Print or write a patch proposal for an eligible care-case
    ///
    /// Exits 2 when the case is not eligible.
    Patch {
        /// Care-case document
        #[arg(long)]
        case: PathBuf,

        /// Write guardian/patches/<case_id>.md under this repository root
        #[arg(long)]
        write: Option<PathBuf>,

        /// Print the pull request title and body instead
        #[arg(long)]
        pr: bool,
    },

    /// Validate patch proposal files
    CheckPatch {
        /// Proposal files, named guardian/patches/<case_id>.md
        #[arg(num_args = 1.., required = true)]
        paths: Vec<PathBuf>,

        /// Pull request head branch, checked against guardian/<case_id>
        #[arg(long)]
        branch: Option<String>,

        #[arg(long, value_enum, default_value = "table")]
        format: OutputFormat,
    },
}

fn parse_timestamp(value: &str) -> std::result::Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| format!("expected an RFC 3339 timestamp: {}", e))
}

fn load_document(path: &Path) -> Result<CareCaseDocument> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        AgentError::file_error(format!("cannot read care-case {}: {}", path.display(), e))
    })?;
    CareCaseDocument::from_json(&content)
}

/// Execute the intake command
pub async fn execute_intake(
    signals: Vec<PathBuf>,
    out: Option<PathBuf>,
    events: Option<PathBuf>,
    metrics: bool,
    at: Option<DateTime<Utc>>,
    config: Option<PathBuf>,
    format: OutputFormat,
) -> Result<ExitCode> {
    let mut config = match config {
        Some(path) => AgentConfig::from_file(&path)?,
        None => AgentConfig::default(),
    };
    config.apply_env()?;
    if let Some(events) = events {
        config.events_file = Some(events);
    }
    let out_dir = out.unwrap_or_else(|| config.output_dir.clone());

    let intake = Intake::new(config)?;
    let mut report = intake.run(&signals, at).await?;
    intake.persist(&mut report, &out_dir)?;

    let mut stdout = io::stdout();
    output::render_intake(&report, format, &mut stdout)?;
    if metrics {
        write!(stdout, "{}", intake.metrics().gather_text()?).ok();
    }

    Ok(if report.any_blocked() {
        ExitCode::Rejected
    } else {
        ExitCode::Success
    })
}

/// Execute the render command
pub fn execute_render(case: PathBuf, title: bool) -> Result<ExitCode> {
    let doc = load_document(&case)?;
    let text = if title {
        render::issue_title(&doc)
    } else {
        render::issue_body(&doc)?
    };
    println!("{}", text);
    Ok(ExitCode::Success)
}

/// Execute the patch command
pub fn execute_patch(case: PathBuf, write: Option<PathBuf>, pr: bool) -> Result<ExitCode> {
    let doc = load_document(&case)?;
    if let Eligibility::NotEligible(reason) = patch::eligibility(&doc) {
        eprintln!("Care-case {} is not eligible for a patch proposal: {}", doc.id, reason);
        return Ok(ExitCode::NotEligible);
    }

    if pr {
        println!("{}\n\n{}", patch::pr_title(&doc), patch::pr_body(&doc));
        return Ok(ExitCode::Success);
    }

    let markdown = patch::patch_markdown(&doc);
    match write {
        Some(root) => {
            let path = root.join(patch::patch_path(&doc.id));
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(&path, markdown)?;
            tracing::info!(case_id = %doc.id, path = %path.display(), "Patch proposal written");
            println!("{}", path.display());
        }
        None => print!("{}", markdown),
    }
    Ok(ExitCode::Success)
}

/// Execute the check-patch command
pub fn execute_check_patch(
    paths: Vec<PathBuf>,
    branch: Option<String>,
    format: OutputFormat,
) -> Result<ExitCode> {
    let mut errors = Vec::new();
    if let Some(branch) = &branch {
        if let Err(e) = patch::check_branch(branch) {
            errors.push(e);
        }
    }

    let mut files = Vec::with_capacity(paths.len());
    for path in &paths {
        let display = path.to_string_lossy().replace('\\', "/");
        let content = std::fs::read_to_string(path).unwrap_or_default();
        errors.extend(patch::check_patch(&display, &content));
        files.push(display);
    }

    let result = CheckOutput {
        valid: errors.is_empty(),
        files,
        errors,
    };
    result.render(format, &mut io::stdout())?;

    Ok(if result.valid {
        ExitCode::Success
    } else {
        ExitCode::Rejected
    })
}
