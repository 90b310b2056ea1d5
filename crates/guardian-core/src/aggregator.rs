//! Evidence aggregation
//!
//! Groups the signals of one system key into an [`EvidenceSet`] and scores it.
//! The aggregate tension is the larger of the highest single tension and the
//! severity-weighted mean (sum of severity weights divided by set size).

use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use uuid::Uuid;

use crate::config::{EngineConfig, SeverityWeights};
use crate::signal::{Severity, Signal, SystemKey};

/// Outcome of aggregating a candidate window
#[derive(Debug, Clone)]
pub enum Aggregation {
    /// The active window is empty; callers take no action
    NoEvidence,
    Evidence(EvidenceSet),
}

impl Aggregation {
    pub fn evidence(&self) -> Option<&EvidenceSet> {
        match self {
            Aggregation::Evidence(set) => Some(set),
            Aggregation::NoEvidence => None,
        }
    }
}

/// Scored group of related signals for one system key
#[derive(Debug, Clone)]
pub struct EvidenceSet {
    pub key: SystemKey,
    /// Time-ordered, deduplicated by id
    pub signals: Vec<Arc<Signal>>,
    pub aggregate_tension: f64,
    pub max_tension: f64,
    pub weighted_mean: f64,
    pub severities_present: BTreeSet<Severity>,
    /// Most severe signal, most recent on ties. Used for attribution only.
    pub dominant_signal: Uuid,
    /// Timestamp of the newest signal in the set
    pub newest_at: DateTime<Utc>,
}

impl EvidenceSet {
    /// Ids in time order
    pub fn ids(&self) -> Vec<Uuid> {
        self.signals.iter().map(|s| s.id).collect()
    }

    pub fn has_severity(&self, severity: Severity) -> bool {
        self.severities_present.contains(&severity)
    }

    /// Whether any canary result is part of this set
    pub fn has_canary(&self) -> bool {
        self.signals.iter().any(|s| s.is_canary())
    }

    /// The dominant signal itself
    pub fn dominant(&self) -> Option<&Arc<Signal>> {
        self.signals.iter().find(|s| s.id == self.dominant_signal)
    }
}

/// Aggregate tension for a non-empty set of signals; `0.0` for an empty one
pub fn aggregate_tension<'a, I>(signals: I, weights: &SeverityWeights) -> f64
where
    I: IntoIterator<Item = &'a Signal>,
{
    let mut count = 0usize;
    let mut max_tension = 0.0f64;
    let mut weight_sum = 0.0f64;
    for signal in signals {
        count += 1;
        max_tension = max_tension.max(signal.tension);
        weight_sum += weights.weight(signal.severity);
    }
    if count == 0 {
        return 0.0;
    }
    max_tension.max(weight_sum / count as f64).clamp(0.0, 1.0)
}

/// Groups and scores signals
#[derive(Debug, Clone)]
pub struct Aggregator {
    weights: SeverityWeights,
    staleness_horizon: chrono::Duration,
}

impl Aggregator {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            weights: config.weights,
            staleness_horizon: config.staleness_horizon(),
        }
    }

    /// Oldest timestamp still inside the active window at `now`
    pub fn window_start(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now - self.staleness_horizon
    }

    /// Whether a signal has aged out of the active window
    pub fn is_stale(&self, signal: &Signal, now: DateTime<Utc>) -> bool {
        signal.timestamp < self.window_start(now)
    }

    /// Build the evidence set for `key` from candidate signals.
    ///
    /// Stale signals are left out of the score. They stay linked to any open
    /// case; only the active window is affected.
    pub fn aggregate<I>(&self, key: &SystemKey, candidates: I, now: DateTime<Utc>) -> Aggregation
    where
        I: IntoIterator<Item = Arc<Signal>>,
    {
        let window: BTreeMap<(DateTime<Utc>, Uuid), Arc<Signal>> = candidates
            .into_iter()
            .filter(|s| !self.is_stale(s, now))
            .map(|s| ((s.timestamp, s.id), s))
            .collect();

        if window.is_empty() {
            return Aggregation::NoEvidence;
        }

        let signals: Vec<Arc<Signal>> = window.into_values().collect();

        let max_tension = signals.iter().map(|s| s.tension).fold(0.0, f64::max);
        let weighted_mean = signals
            .iter()
            .map(|s| self.weights.weight(s.severity))
            .sum::<f64>()
            / signals.len() as f64;
        let aggregate = aggregate_tension(signals.iter().map(|s| s.as_ref()), &self.weights);

        let severities_present = signals.iter().map(|s| s.severity).collect();

        // Signals are time-ordered, so max_by_key keeps the latest on ties.
        let dominant = signals
            .iter()
            .max_by_key(|s| (s.severity, s.timestamp))
            .map(|s| s.id)
            .unwrap_or_default();
        let newest_at = signals
            .last()
            .map(|s| s.timestamp)
            .unwrap_or(now);

        tracing::debug!(
            system = %key,
            signals = signals.len(),
            aggregate_tension = aggregate,
            dominant_signal = %dominant,
            "Evidence aggregated"
        );

        Aggregation::Evidence(EvidenceSet {
            key: key.clone(),
            signals,
            aggregate_tension: aggregate,
            max_tension,
            weighted_mean,
            severities_present,
            dominant_signal: dominant,
            newest_at,
        })
    }
}
