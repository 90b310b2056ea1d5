//! Telemetry for the Guardian agent
//!
//! - `metrics` - Prometheus metrics for ingestion and gate decisions
//! - [`EventLog`] - DecisionEvents collected during a run, written as JSON lines
//!
//! Events are written locally; shipping them anywhere is up to the caller.

pub mod metrics;

pub use metrics::{EvaluationTimer, GateMetrics, GateMetricsRegistry};

use std::path::Path;
use thiserror::Error;

use crate::contracts::DecisionEvent;

/// Telemetry errors
#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("Metrics error: {0}")]
    MetricsError(#[from] prometheus::Error),

    #[error("Failed to serialize event: {0}")]
    SerializationFailed(#[from] serde_json::Error),

    #[error("Failed to write events: {0}")]
    WriteFailed(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, TelemetryError>;

/// Append-only collection of decision events
#[derive(Debug, Default)]
pub struct EventLog {
    events: Vec<DecisionEvent>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, event: DecisionEvent) {
        tracing::debug!(event_id = %event.event_id, "{}", event.summary());
        self.events.push(event);
    }

    pub fn extend(&mut self, events: impl IntoIterator<Item = DecisionEvent>) {
        for event in events {
            self.push(event);
        }
    }

    pub fn events(&self) -> &[DecisionEvent] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// One JSON object per line, in emission order
    pub fn to_json_lines(&self) -> Result<String> {
        let mut out = String::new();
        for event in &self.events {
            out.push_str(&serde_json::to_string(event)?);
            out.push('\n');
        }
        Ok(out)
    }

    pub fn write_to(&self, path: &Path) -> Result<()> {
        std::fs::write(path, self.to_json_lines()?)?;
        Ok(())
    }
}
