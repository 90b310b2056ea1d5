//! Signal intake
//!
//! Loads signal files, validates all of them before anything is ingested,
//! feeds them to the engine in timestamp order and collects the resulting
//! care-case documents and DecisionEvents.

use chrono::{DateTime, Utc};
use guardian_core::{
    CareCase, EvaluationOutcome, GateEngine, GateError, IngestOutcome, Signal,
};
use serde::Serialize;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::config::AgentConfig;
use crate::contracts::{CareCaseDocument, DecisionEvent};
use crate::error::{AgentError, Result};
use crate::playbook;
use crate::telemetry::{EventLog, GateMetricsRegistry};

/// What happened to one signal file
#[derive(Debug, Clone, Serialize)]
pub struct SignalReport {
    pub path: PathBuf,
    pub signal_id: Uuid,
    pub duplicate: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub case_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<EvaluationOutcome>,
}

/// Result of one intake run
#[derive(Debug, Serialize)]
pub struct IntakeReport {
    pub evaluated_at: DateTime<Utc>,
    pub signals: Vec<SignalReport>,
    pub cases: Vec<CareCaseDocument>,
    #[serde(skip)]
    pub events: EventLog,
    /// Documents written by [`Intake::persist`]
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub written: Vec<PathBuf>,
}

impl IntakeReport {
    /// Whether any evaluation was blocked by a constraint
    pub fn any_blocked(&self) -> bool {
        self.signals
            .iter()
            .any(|s| matches!(s.outcome, Some(EvaluationOutcome::Blocked { .. })))
    }

    pub fn duplicates(&self) -> usize {
        self.signals.iter().filter(|s| s.duplicate).count()
    }
}

/// Read and validate signal files. Fails on the first invalid file, naming it.
pub fn load_signals(paths: &[PathBuf]) -> Result<Vec<(PathBuf, Signal)>> {
    if paths.is_empty() {
        return Err(AgentError::invalid_input("no signal files given"));
    }

    let mut loaded = Vec::with_capacity(paths.len());
    for path in paths {
        let content = std::fs::read_to_string(path).map_err(|e| {
            AgentError::file_error(format!("cannot read {}: {}", path.display(), e))
        })?;
        let signal = Signal::from_json(&content).map_err(|e| {
            AgentError::invalid_input(format!("Signal ({}) validation failed: {}", path.display(), e))
        })?;
        loaded.push((path.clone(), signal));
    }

    loaded.sort_by(|(_, a), (_, b)| a.timestamp.cmp(&b.timestamp).then(a.id.cmp(&b.id)));
    Ok(loaded)
}

/// Intake pipeline around one engine instance
pub struct Intake {
    config: AgentConfig,
    engine: GateEngine,
    metrics: GateMetricsRegistry,
}

impl Intake {
    pub fn new(config: AgentConfig) -> Result<Self> {
        let engine = GateEngine::new(config.engine.clone())?;
        let metrics = GateMetricsRegistry::new()?;
        Ok(Self {
            config,
            engine,
            metrics,
        })
    }

    pub fn engine(&self) -> &GateEngine {
        &self.engine
    }

    pub fn metrics(&self) -> &GateMetricsRegistry {
        &self.metrics
    }

    /// Ingest the files, evaluating every signal at `at` (default: now)
    pub async fn run(&self, paths: &[PathBuf], at: Option<DateTime<Utc>>) -> Result<IntakeReport> {
        let signals = load_signals(paths)?;
        let now = at.unwrap_or_else(Utc::now);
        let gate = self.metrics.gate();

        let mut reports = Vec::with_capacity(signals.len());
        let mut events = EventLog::new();
        let mut touched = BTreeSet::new();

        for (path, signal) in signals {
            let signal_id = signal.id;
            let outcome = {
                let _timer = gate.start_timer();
                self.engine.ingest_signal(signal, now).await
            };

            let report = match outcome {
                Ok(IngestOutcome::Accepted { evaluation, .. }) => {
                    gate.record_ingest("accepted");
                    gate.record_evaluation(&evaluation);
                    events.extend(
                        DecisionEvent::from_evaluation(&evaluation)
                            .into_iter()
                            .map(|e| e.with_correlation_id("signal_id", signal_id.to_string())),
                    );
                    if let Some(case_id) = evaluation.case_id {
                        touched.insert(case_id);
                    }
                    SignalReport {
                        path,
                        signal_id,
                        duplicate: false,
                        case_id: evaluation.case_id,
                        outcome: Some(evaluation.outcome),
                    }
                }
                Ok(IngestOutcome::Duplicate { .. }) => {
                    gate.record_ingest("duplicate");
                    tracing::info!(signal_id = %signal_id, path = %path.display(), "Duplicate signal skipped");
                    SignalReport {
                        path,
                        signal_id,
                        duplicate: true,
                        case_id: None,
                        outcome: None,
                    }
                }
                Err(e) => {
                    gate.record_ingest("rejected");
                    return Err(e.into());
                }
            };
            reports.push(report);
        }

        gate.set_active_cases(self.engine.lifecycle().active_keys().len());

        let mut cases = Vec::new();
        for case in self.engine.cases()? {
            if touched.contains(&case.id) {
                cases.push(self.document(&case)?);
            }
        }

        Ok(IntakeReport {
            evaluated_at: now,
            signals: reports,
            cases,
            events,
            written: Vec::new(),
        })
    }

    fn document(&self, case: &CareCase) -> Result<CareCaseDocument> {
        let mut doc = CareCaseDocument::from_case(case, None);
        if self.config.apply_playbooks {
            playbook::apply(case, self.trace_ref(case)?, &mut doc);
        }
        Ok(doc)
    }

    /// First trace reference among the case's signals
    fn trace_ref(&self, case: &CareCase) -> Result<Option<String>> {
        for link in &case.signals {
            match self.engine.store().get(&link.signal_id) {
                Ok(signal) if signal.trace_ref.is_some() => return Ok(signal.trace_ref.clone()),
                Ok(_) | Err(GateError::NotFound { .. }) => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(None)
    }

    /// Write care-case documents and, if configured, the event log
    pub fn persist(&self, report: &mut IntakeReport, out_dir: &Path) -> Result<()> {
        std::fs::create_dir_all(out_dir).map_err(|e| {
            AgentError::file_error(format!("cannot create {}: {}", out_dir.display(), e))
        })?;

        for doc in &report.cases {
            let path = out_dir.join(doc.file_name());
            let mut json = doc.to_json_pretty()?;
            json.push('\n');
            std::fs::write(&path, json)?;
            tracing::info!(case_id = %doc.id, path = %path.display(), "Care-case written");
            report.written.push(path);
        }

        if let Some(events_file) = &self.config.events_file {
            report.events.write_to(events_file)?;
            tracing::info!(count = report.events.len(), path = %events_file.display(), "Decision events written");
        }
        Ok(())
    }
}
