//! Output formatting for the Guardian CLI
//!
//! JSON and YAML for machines, a colored table for people. Gates are colored
//! by severity: green, yellow, red.

use clap::ValueEnum;
use colored::{ColoredString, Colorize};
use guardian_core::{EvaluationOutcome, PolicyGate};
use serde::Serialize;
use std::io::Write;

use crate::error::{AgentError, Result};
use crate::intake::IntakeReport;

/// Output format options for CLI results
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum, Debug, Default)]
pub enum OutputFormat {
    /// Human-readable table format with colors
    #[default]
    Table,
    /// JSON format for machine processing
    Json,
    /// YAML format
    Yaml,
}

fn gate_colored(gate: PolicyGate) -> ColoredString {
    match gate {
        PolicyGate::Green => gate.as_str().green().bold(),
        PolicyGate::Yellow => gate.as_str().yellow().bold(),
        PolicyGate::Red => gate.as_str().red().bold(),
    }
}

fn outcome_colored(outcome: Option<&EvaluationOutcome>) -> ColoredString {
    match outcome {
        None => "duplicate".dimmed(),
        Some(EvaluationOutcome::Blocked { constraint }) => {
            format!("blocked ({})", constraint).red()
        }
        Some(EvaluationOutcome::Transitioned { record }) => {
            format!("{} -> {}", record.from_gate, record.to_gate).cyan()
        }
        Some(other) => other.as_str().normal(),
    }
}

/// Serialize `value` in a machine format
pub fn render_value<T: Serialize, W: Write>(value: &T, format: OutputFormat, out: &mut W) -> Result<()> {
    let text = match format {
        OutputFormat::Json => serde_json::to_string_pretty(value)
            .map_err(|e| AgentError::SerializationError(e.to_string()))?,
        OutputFormat::Yaml => serde_yaml::to_string(value)
            .map_err(|e| AgentError::SerializationError(e.to_string()))?,
        OutputFormat::Table => {
            return Err(AgentError::InternalError(
                "table output needs a dedicated renderer".to_string(),
            ))
        }
    };
    writeln!(out, "{}", text.trim_end()).ok();
    Ok(())
}

/// Render an intake report
pub fn render_intake<W: Write>(report: &IntakeReport, format: OutputFormat, out: &mut W) -> Result<()> {
    if format != OutputFormat::Table {
        return render_value(report, format, out);
    }

    writeln!(out).ok();
    writeln!(out, "{}", "Guardian Intake".cyan().bold()).ok();
    writeln!(out, "{}", "=".repeat(60)).ok();
    writeln!(out, "Evaluated at {}", report.evaluated_at.to_rfc3339().dimmed()).ok();
    writeln!(out).ok();

    writeln!(out, "{}", "Signals:".cyan().bold()).ok();
    for signal in &report.signals {
        writeln!(
            out,
            "  {} {}  {}",
            signal.signal_id.to_string().dimmed(),
            outcome_colored(signal.outcome.as_ref()),
            signal.path.display()
        )
        .ok();
    }
    writeln!(out).ok();

    if report.cases.is_empty() {
        writeln!(out, "{} No care-cases opened", "+".green()).ok();
    } else {
        writeln!(out, "{}", "Care-cases:".cyan().bold()).ok();
        writeln!(out, "{}", "-".repeat(60)).ok();
        for doc in &report.cases {
            writeln!(
                out,
                "  {} [{}] {} tension={}",
                doc.id,
                gate_colored(doc.policy_gate),
                doc.recommended_action,
                doc.tension
            )
            .ok();
            writeln!(out, "    {}", doc.summary).ok();
            if let Some(rejection) = doc.rejections.last() {
                writeln!(
                    out,
                    "    {} {}: {}",
                    "x".red(),
                    rejection.constraint,
                    rejection.reason
                )
                .ok();
            }
        }
    }

    if !report.written.is_empty() {
        writeln!(out).ok();
        for path in &report.written {
            writeln!(out, "Generated care-case: {}", path.display()).ok();
        }
    }
    out.flush().ok();
    Ok(())
}

/// Result of checking patch proposal files
#[derive(Debug, Clone, Serialize)]
pub struct CheckOutput {
    pub valid: bool,
    pub files: Vec<String>,
    pub errors: Vec<String>,
}

impl CheckOutput {
    pub fn render<W: Write>(&self, format: OutputFormat, out: &mut W) -> Result<()> {
        if format != OutputFormat::Table {
            return render_value(self, format, out);
        }
        if self.valid {
            writeln!(
                out,
                "{} Guardian validation OK. Patch files: {}",
                "+".green(),
                self.files.join(", ")
            )
            .ok();
        } else {
            writeln!(out, "{} Guardian validation failed:", "x".red()).ok();
            for error in &self.errors {
                writeln!(out, "- {}", error).ok();
            }
        }
        Ok(())
    }
}
