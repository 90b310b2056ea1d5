//! Gate engine facade
//!
//! [`GateEngine`] wires the store, aggregator, resolver, enforcer and
//! lifecycle manager together. Evaluations for one system key are serialized
//! behind a per-key token; different keys evaluate in parallel.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use futures::future::join_all;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use crate::aggregator::{Aggregation, Aggregator, EvidenceSet};
use crate::case::{CareCase, CloseReason, TransitionIntent, TransitionRecord};
use crate::config::EngineConfig;
use crate::constraints::{
    default_constraints, Constraint, ConstraintEnforcer, NoSensitiveContent, SensitivityClassifier,
};
use crate::error::{GateError, Result};
use crate::gate::{PolicyGate, RecommendedAction};
use crate::lifecycle::{CommitOutcome, LifecycleManager, TransitionRequest};
use crate::resolver::{GateResolver, Resolution};
use crate::signal::{Severity, Signal, SignalPayload, SystemKey};
use crate::store::SignalStore;

/// What happened to an ingested signal
#[derive(Debug, Clone)]
pub enum IngestOutcome {
    /// Stored and evaluated
    Accepted {
        signal_id: Uuid,
        evaluation: Evaluation,
    },
    /// Already stored; nothing re-evaluated
    Duplicate { signal_id: Uuid },
}

impl IngestOutcome {
    pub fn signal_id(&self) -> Uuid {
        match self {
            IngestOutcome::Accepted { signal_id, .. } | IngestOutcome::Duplicate { signal_id } => {
                *signal_id
            }
        }
    }

    pub fn evaluation(&self) -> Option<&Evaluation> {
        match self {
            IngestOutcome::Accepted { evaluation, .. } => Some(evaluation),
            IngestOutcome::Duplicate { .. } => None,
        }
    }
}

/// Result of evaluating one system key
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EvaluationOutcome {
    /// The active window is empty
    NoEvidence,
    /// No active case and the evidence does not warrant one
    BelowBaseline,
    /// The case already holds the candidate, or is parked awaiting review
    Unchanged,
    Transitioned { record: TransitionRecord },
    /// The candidate transition was blocked; the case now awaits review
    Blocked { constraint: Constraint },
    /// The case stayed green through the quiescence window
    Closed,
}

impl EvaluationOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            EvaluationOutcome::NoEvidence => "no_evidence",
            EvaluationOutcome::BelowBaseline => "below_baseline",
            EvaluationOutcome::Unchanged => "unchanged",
            EvaluationOutcome::Transitioned { .. } => "transitioned",
            EvaluationOutcome::Blocked { .. } => "blocked",
            EvaluationOutcome::Closed => "closed",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Evaluation {
    pub key: SystemKey,
    pub evaluated_at: DateTime<Utc>,
    pub case_id: Option<Uuid>,
    /// Whether this evaluation opened the case
    pub opened: bool,
    pub aggregate_tension: Option<f64>,
    pub evidence_ids: Vec<Uuid>,
    pub resolution: Option<Resolution>,
    pub outcome: EvaluationOutcome,
    /// Snapshot of the case after the evaluation
    #[serde(skip)]
    pub case: Option<CareCase>,
}

impl Evaluation {
    fn new(key: &SystemKey, now: DateTime<Utc>) -> Self {
        Self {
            key: key.clone(),
            evaluated_at: now,
            case_id: None,
            opened: false,
            aggregate_tension: None,
            evidence_ids: Vec::new(),
            resolution: None,
            outcome: EvaluationOutcome::NoEvidence,
            case: None,
        }
    }

    pub fn is_blocked(&self) -> bool {
        matches!(self.outcome, EvaluationOutcome::Blocked { .. })
    }

    pub fn record(&self) -> Option<&TransitionRecord> {
        match &self.outcome {
            EvaluationOutcome::Transitioned { record } => Some(record),
            _ => None,
        }
    }
}

/// A reviewer's decision on a case parked in `human_review`.
///
/// The embedding system authenticates the reviewer before building this.
#[derive(Debug, Clone)]
pub struct Review {
    pub reviewer: String,
    pub gate: PolicyGate,
    pub action: RecommendedAction,
    pub approve: bool,
    pub intent: Option<TransitionIntent>,
}

impl Review {
    pub fn approve(reviewer: impl Into<String>, gate: PolicyGate, action: RecommendedAction) -> Self {
        Self {
            reviewer: reviewer.into(),
            gate,
            action,
            approve: true,
            intent: None,
        }
    }

    pub fn with_intent(mut self, intent: TransitionIntent) -> Self {
        self.intent = Some(intent);
        self
    }
}

/// Policy gate decision engine
pub struct GateEngine {
    config: EngineConfig,
    store: SignalStore,
    aggregator: Aggregator,
    resolver: GateResolver,
    lifecycle: Arc<LifecycleManager>,
    tokens: DashMap<SystemKey, Arc<Mutex<()>>>,
}

impl GateEngine {
    /// Engine with the built-in rules and no sensitivity classifier
    pub fn new(config: EngineConfig) -> Result<Self> {
        Self::with_classifier(config, Arc::new(NoSensitiveContent))
    }

    pub fn with_classifier(
        config: EngineConfig,
        classifier: Arc<dyn SensitivityClassifier>,
    ) -> Result<Self> {
        Self::with_enforcer(config, ConstraintEnforcer::new(classifier))
    }

    pub fn with_enforcer(config: EngineConfig, enforcer: ConstraintEnforcer) -> Result<Self> {
        config.validate()?;
        let store = SignalStore::new();
        let lifecycle = Arc::new(LifecycleManager::new(store.clone(), Arc::new(enforcer)));

        tracing::debug!(
            red = config.thresholds.red,
            yellow = config.thresholds.yellow,
            baseline = config.baseline_tension,
            "Gate engine initialized"
        );

        Ok(Self {
            aggregator: Aggregator::new(&config),
            resolver: GateResolver::new(config.thresholds),
            config,
            store,
            lifecycle,
            tokens: DashMap::new(),
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn store(&self) -> &SignalStore {
        &self.store
    }

    pub fn lifecycle(&self) -> &LifecycleManager {
        &self.lifecycle
    }

    async fn acquire(&self, key: &SystemKey) -> OwnedMutexGuard<()> {
        let token = Arc::clone(
            &self
                .tokens
                .entry(key.clone())
                .or_insert_with(|| Arc::new(Mutex::new(()))),
        );
        token.lock_owned().await
    }

    /// Validate, store and evaluate a raw payload
    pub async fn ingest(&self, payload: SignalPayload) -> Result<IngestOutcome> {
        self.ingest_at(payload, Utc::now()).await
    }

    pub async fn ingest_at(&self, payload: SignalPayload, now: DateTime<Utc>) -> Result<IngestOutcome> {
        let signal = payload.validate().map_err(|e| {
            tracing::warn!(error = %e, "Signal rejected");
            e
        })?;
        self.ingest_signal(signal, now).await
    }

    /// Store an already validated signal and evaluate its key.
    ///
    /// A redelivered id is reported as `Duplicate` and triggers nothing.
    pub async fn ingest_signal(&self, signal: Signal, now: DateTime<Utc>) -> Result<IngestOutcome> {
        let key = signal.key();
        let stored = match self.store.put(signal) {
            Ok(stored) => stored,
            Err(GateError::DuplicateId(id)) => {
                tracing::debug!(signal_id = %id, "Duplicate signal ignored");
                return Ok(IngestOutcome::Duplicate { signal_id: id });
            }
            Err(e) => return Err(e),
        };

        tracing::debug!(
            signal_id = %stored.id,
            system = %key,
            severity = %stored.severity,
            tension = stored.tension,
            "Signal stored"
        );

        let evaluation = self.evaluate(&key, now).await?;
        Ok(IngestOutcome::Accepted {
            signal_id: stored.id,
            evaluation,
        })
    }

    /// Re-evaluate one system key
    pub async fn evaluate(&self, key: &SystemKey, now: DateTime<Utc>) -> Result<Evaluation> {
        let _token = self.acquire(key).await;
        self.evaluate_locked(key, now)
    }

    /// Re-evaluate every key with an active case, e.g. on a timer so that
    /// aged-out evidence and quiescence are picked up without new signals
    pub async fn reevaluate_all(&self, now: DateTime<Utc>) -> Vec<(SystemKey, Result<Evaluation>)> {
        let keys = self.lifecycle.active_keys();
        let runs = keys.iter().map(|key| async move {
            let result = self.evaluate(key, now).await;
            (key.clone(), result)
        });
        join_all(runs).await
    }

    fn evaluate_locked(&self, key: &SystemKey, now: DateTime<Utc>) -> Result<Evaluation> {
        let mut evaluation = Evaluation::new(key, now);
        let active = self.lifecycle.active_case(key)?;
        let active_id = active.as_ref().map(|case| case.id);
        // Evidence already owned by another (closed) case stays with it.
        let window = self
            .store
            .query(key, self.aggregator.window_start(now))
            .filter(|signal| {
                self.lifecycle
                    .owner_of(&signal.id)
                    .map_or(true, |owner| Some(owner) == active_id)
            });
        let aggregation = self.aggregator.aggregate(key, window, now);

        let evidence = match aggregation {
            Aggregation::Evidence(set) => set,
            Aggregation::NoEvidence => {
                if let Some(case) = active {
                    evaluation.case_id = Some(case.id);
                    self.finish_idle(&mut evaluation, case, EvaluationOutcome::NoEvidence, now)?;
                }
                return Ok(evaluation);
            }
        };
        evaluation.aggregate_tension = Some(evidence.aggregate_tension);
        evaluation.evidence_ids = evidence.ids();

        let case = match active {
            Some(case) => {
                self.lifecycle.link(&case.id, &evidence.ids(), now)?;
                self.lifecycle
                    .note_tension(&case.id, evidence.aggregate_tension, now)?;
                self.lifecycle.get(&case.id)?
            }
            None => match self.open_for(&evidence, now)? {
                Some(case) => {
                    evaluation.opened = true;
                    case
                }
                None => {
                    evaluation.outcome = EvaluationOutcome::BelowBaseline;
                    return Ok(evaluation);
                }
            },
        };
        evaluation.case_id = Some(case.id);

        let resolution = self.resolver.resolve(
            evidence.aggregate_tension,
            &evidence.severities_present,
            &case.prior_gate(),
            evidence.newest_at,
        );
        evaluation.resolution = Some(resolution);

        let unchanged =
            resolution.gate == case.policy_gate && resolution.action == case.recommended_action;
        let parked = case.recommended_action == RecommendedAction::HumanReview
            && resolution.gate <= case.policy_gate;
        let reviewed = case
            .history
            .last()
            .is_some_and(|last| last.actor.is_human())
            && case.decided_at.is_some_and(|at| evidence.newest_at <= at);
        if unchanged || parked || reviewed {
            self.finish_idle(&mut evaluation, case, EvaluationOutcome::Unchanged, now)?;
            return Ok(evaluation);
        }

        let request = TransitionRequest::automatic(resolution.gate, resolution.action)
            .with_evidence(evidence.ids(), evidence.newest_at);
        self.lifecycle.propose(&case.id, request, now)?;

        evaluation.outcome = match self.lifecycle.commit(&case.id, now) {
            Ok(outcome) => EvaluationOutcome::Transitioned {
                record: outcome.record,
            },
            Err(GateError::ConstraintViolation { constraint, .. }) => {
                EvaluationOutcome::Blocked { constraint }
            }
            Err(e) => return Err(e),
        };
        evaluation.case = Some(self.lifecycle.get(&case.id)?);
        Ok(evaluation)
    }

    fn open_for(&self, evidence: &EvidenceSet, now: DateTime<Utc>) -> Result<Option<CareCase>> {
        let warranted = evidence.aggregate_tension >= self.config.baseline_tension
            || evidence.has_severity(Severity::Fail);
        if !warranted {
            tracing::debug!(
                system = %evidence.key,
                aggregate_tension = evidence.aggregate_tension,
                "Evidence below baseline"
            );
            return Ok(None);
        }

        let opening_gate = self
            .resolver
            .classify(evidence.aggregate_tension, &evidence.severities_present);
        let opening_kind = evidence.dominant().map(|s| s.kind.as_str()).unwrap_or_default();
        let constraints = default_constraints(opening_gate, opening_kind);
        self.lifecycle.open(evidence, constraints, now).map(Some)
    }

    /// Close a quiescent case, otherwise report `idle`
    fn finish_idle(
        &self,
        evaluation: &mut Evaluation,
        case: CareCase,
        idle: EvaluationOutcome,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let quiescent = case.policy_gate == PolicyGate::Green
            && case.recommended_action == RecommendedAction::Observe
            && case
                .green_since
                .is_some_and(|since| now - since >= self.config.quiescence_window());

        if quiescent {
            let closed = self.lifecycle.close(&case.id, CloseReason::Quiescent, now)?;
            evaluation.outcome = EvaluationOutcome::Closed;
            evaluation.case = Some(closed);
        } else {
            evaluation.outcome = idle;
            evaluation.case = Some(case);
        }
        Ok(())
    }

    /// Apply a reviewer's decision to a case parked in `human_review`
    pub async fn submit_review(
        &self,
        case_id: &Uuid,
        review: Review,
        now: DateTime<Utc>,
    ) -> Result<CommitOutcome> {
        let key = self.lifecycle.get(case_id)?.key();
        let _token = self.acquire(&key).await;

        let mut request = TransitionRequest::review(review.reviewer, review.gate, review.action, review.approve);
        request.intent = review.intent;
        self.lifecycle.propose(case_id, request, now)?;
        self.lifecycle.commit(case_id, now)
    }

    /// Close a case on a reviewer's behalf
    pub async fn close_case(
        &self,
        case_id: &Uuid,
        reviewer: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Result<CareCase> {
        let key = self.lifecycle.get(case_id)?.key();
        let _token = self.acquire(&key).await;
        self.lifecycle.close(
            case_id,
            CloseReason::Human {
                reviewer: reviewer.into(),
            },
            now,
        )
    }

    /// Every case, oldest first
    pub fn cases(&self) -> Result<Vec<CareCase>> {
        self.lifecycle.cases()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signal::SystemRef;
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
    }

    fn signal(kind: &str, severity: Severity, tension: f64, minutes: i64) -> Signal {
        Signal {
            schema_version: "0.1".to_string(),
            id: Uuid::new_v4(),
            timestamp: t0() + Duration::minutes(minutes),
            source: "rum".to_string(),
            severity,
            tension,
            system: SystemRef::new("storefront", "prod", "2.0.0"),
            kind: kind.to_string(),
            summary: format!("{} signal", kind),
            details: None,
            trace_ref: None,
            links: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_low_tension_does_not_open() {
        let engine = GateEngine::new(EngineConfig::default()).unwrap();
        let outcome = engine
            .ingest_signal(signal("web-perf", Severity::Info, 0.1, 0), t0())
            .await
            .unwrap();
        let evaluation = outcome.evaluation().unwrap();
        assert_eq!(evaluation.outcome, EvaluationOutcome::BelowBaseline);
        assert!(engine.cases().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_fail_opens_red_case() {
        let engine = GateEngine::new(EngineConfig::default()).unwrap();
        let outcome = engine
            .ingest_signal(signal("error-rate", Severity::Fail, 0.9, 0), t0())
            .await
            .unwrap();
        let evaluation = outcome.evaluation().unwrap();
        assert!(evaluation.opened);
        let case = evaluation.case.as_ref().unwrap();
        assert_eq!(case.policy_gate, PolicyGate::Red);
        assert_eq!(case.recommended_action, RecommendedAction::HumanReview);
    }

    #[tokio::test]
    async fn test_duplicate_is_not_reevaluated() {
        let engine = GateEngine::new(EngineConfig::default()).unwrap();
        let s = signal("error-rate", Severity::Fail, 0.9, 0);
        engine.ingest_signal(s.clone(), t0()).await.unwrap();
        let again = engine.ingest_signal(s.clone(), t0()).await.unwrap();
        assert!(matches!(again, IngestOutcome::Duplicate { signal_id } if signal_id == s.id));
        assert_eq!(engine.cases().unwrap()[0].history.len(), 1);
    }

    #[tokio::test]
    async fn test_invalid_payload_is_rejected() {
        let engine = GateEngine::new(EngineConfig::default()).unwrap();
        let mut payload = SignalPayload::from(&signal("web-perf", Severity::Warn, 0.5, 0));
        payload.tension = Some(1.5);
        let err = engine.ingest_at(payload, t0()).await.unwrap_err();
        assert_eq!(err.field(), Some("tension"));
        assert!(engine.store().is_empty());
    }

    #[tokio::test]
    async fn test_quiescent_case_closes() {
        let config = EngineConfig::builder()
            .quiescence_window_secs(600)
            .build()
            .unwrap();
        let engine = GateEngine::new(config).unwrap();
        let opened = engine
            .ingest_signal(signal("web-perf", Severity::Warn, 0.45, 0), t0())
            .await
            .unwrap();
        let case_id = opened.evaluation().unwrap().case_id.unwrap();

        // The patch proposal is blocked for lack of a canary; a reviewer
        // settles the case back to green/observe.
        engine
            .submit_review(
                &case_id,
                Review::approve("sre", PolicyGate::Green, RecommendedAction::Observe),
                t0() + Duration::minutes(1),
            )
            .await
            .unwrap();

        let results = engine.reevaluate_all(t0() + Duration::minutes(5)).await;
        assert_eq!(results[0].1.as_ref().unwrap().outcome, EvaluationOutcome::Unchanged);

        let results = engine.reevaluate_all(t0() + Duration::minutes(12)).await;
        assert_eq!(results[0].1.as_ref().unwrap().outcome, EvaluationOutcome::Closed);
        assert!(engine.lifecycle().active_keys().is_empty());
    }
}
