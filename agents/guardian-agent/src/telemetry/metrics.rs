//! Prometheus metrics for the Guardian agent
//!
//! - `guardian_signals_ingested_total` (counter) - signals by ingestion result
//! - `guardian_evaluations_total` (counter) - evaluations by outcome
//! - `guardian_gate_transitions_total` (counter) - committed transitions by gate pair
//! - `guardian_constraint_violations_total` (counter) - blocked transitions by constraint
//! - `guardian_aggregate_tension` (gauge) - last aggregate tension per system
//! - `guardian_evaluation_duration_seconds` (histogram) - evaluation latency
//! - `guardian_active_cases` (gauge) - open care-cases
//!
//! # Example
//!
//! ```rust,no_run
//! use guardian_agent::telemetry::GateMetricsRegistry;
//!
//! let registry = GateMetricsRegistry::new().unwrap();
//! registry.gate().record_ingest("accepted");
//! println!("{}", registry.gather_text().unwrap());
//! ```

use guardian_core::{Evaluation, EvaluationOutcome};
use prometheus::{Gauge, GaugeVec, Histogram, HistogramOpts, IntCounterVec, Opts, Registry};
use std::sync::Arc;
use std::time::Instant;

use super::{Result, TelemetryError};

const NAMESPACE: &str = "guardian";

/// Gate decision metrics
pub struct GateMetrics {
    signals_ingested_total: IntCounterVec,
    evaluations_total: IntCounterVec,
    gate_transitions_total: IntCounterVec,
    constraint_violations_total: IntCounterVec,
    aggregate_tension: GaugeVec,
    evaluation_duration_seconds: Histogram,
    active_cases: Gauge,
}

impl GateMetrics {
    /// Create and register with the provided registry
    pub fn new(registry: Arc<Registry>) -> Result<Self> {
        let signals_ingested_total = IntCounterVec::new(
            Opts::new("signals_ingested_total", "Signals received by ingestion result")
                .namespace(NAMESPACE),
            &["result"],
        )?;

        let evaluations_total = IntCounterVec::new(
            Opts::new("evaluations_total", "System key evaluations by outcome").namespace(NAMESPACE),
            &["outcome"],
        )?;

        let gate_transitions_total = IntCounterVec::new(
            Opts::new("gate_transitions_total", "Committed care-case transitions")
                .namespace(NAMESPACE),
            &["from", "to"],
        )?;

        let constraint_violations_total = IntCounterVec::new(
            Opts::new(
                "constraint_violations_total",
                "Transitions blocked by a declared constraint",
            )
            .namespace(NAMESPACE),
            &["constraint"],
        )?;

        let aggregate_tension = GaugeVec::new(
            Opts::new("aggregate_tension", "Last aggregate tension (0.0 - 1.0)").namespace(NAMESPACE),
            &["system", "env"],
        )?;

        let evaluation_duration_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "evaluation_duration_seconds",
                "Time spent ingesting and evaluating one signal",
            )
            .namespace(NAMESPACE)
            .buckets(vec![0.0005, 0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.5, 1.0]),
        )?;

        let active_cases = Gauge::with_opts(
            Opts::new("active_cases", "Open care-cases").namespace(NAMESPACE),
        )?;

        registry.register(Box::new(signals_ingested_total.clone()))?;
        registry.register(Box::new(evaluations_total.clone()))?;
        registry.register(Box::new(gate_transitions_total.clone()))?;
        registry.register(Box::new(constraint_violations_total.clone()))?;
        registry.register(Box::new(aggregate_tension.clone()))?;
        registry.register(Box::new(evaluation_duration_seconds.clone()))?;
        registry.register(Box::new(active_cases.clone()))?;

        Ok(Self {
            signals_ingested_total,
            evaluations_total,
            gate_transitions_total,
            constraint_violations_total,
            aggregate_tension,
            evaluation_duration_seconds,
            active_cases,
        })
    }

    /// `result` is one of `accepted`, `duplicate`, `rejected`
    pub fn record_ingest(&self, result: &str) {
        self.signals_ingested_total.with_label_values(&[result]).inc();
    }

    pub fn record_evaluation(&self, evaluation: &Evaluation) {
        self.evaluations_total
            .with_label_values(&[evaluation.outcome.as_str()])
            .inc();

        if let Some(tension) = evaluation.aggregate_tension {
            self.aggregate_tension
                .with_label_values(&[evaluation.key.name.as_str(), evaluation.key.env.as_str()])
                .set(tension);
        }

        match &evaluation.outcome {
            EvaluationOutcome::Transitioned { record } => {
                self.gate_transitions_total
                    .with_label_values(&[record.from_gate.as_str(), record.to_gate.as_str()])
                    .inc();
            }
            EvaluationOutcome::Blocked { constraint } => {
                self.constraint_violations_total
                    .with_label_values(&[constraint.as_str()])
                    .inc();
            }
            _ => {}
        }
    }

    pub fn set_active_cases(&self, count: usize) {
        self.active_cases.set(count as f64);
    }

    pub fn observe_duration(&self, duration_secs: f64) {
        self.evaluation_duration_seconds.observe(duration_secs);
    }

    /// Start an evaluation timer (records duration on drop)
    pub fn start_timer(&self) -> EvaluationTimer<'_> {
        EvaluationTimer {
            start: Instant::now(),
            metrics: self,
        }
    }
}

/// RAII guard timing one evaluation
pub struct EvaluationTimer<'a> {
    start: Instant,
    metrics: &'a GateMetrics,
}

impl<'a> EvaluationTimer<'a> {
    pub fn elapsed_secs(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }
}

impl<'a> Drop for EvaluationTimer<'a> {
    fn drop(&mut self) {
        self.metrics.observe_duration(self.start.elapsed().as_secs_f64());
    }
}

/// Registry owning the gate metrics
pub struct GateMetricsRegistry {
    registry: Arc<Registry>,
    gate: GateMetrics,
}

impl GateMetricsRegistry {
    pub fn new() -> Result<Self> {
        Self::with_registry(Arc::new(Registry::new()))
    }

    pub fn with_registry(registry: Arc<Registry>) -> Result<Self> {
        let gate = GateMetrics::new(Arc::clone(&registry))?;
        Ok(Self { registry, gate })
    }

    pub fn registry(&self) -> Arc<Registry> {
        Arc::clone(&self.registry)
    }

    pub fn gate(&self) -> &GateMetrics {
        &self.gate
    }

    /// Encode all metrics in the Prometheus text format
    pub fn gather_text(&self) -> Result<String> {
        use prometheus::Encoder;
        let encoder = prometheus::TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer)
            .map_err(|e| TelemetryError::MetricsError(prometheus::Error::Msg(e.to_string())))
    }
}
