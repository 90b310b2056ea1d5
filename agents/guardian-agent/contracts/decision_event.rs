//! DecisionEvent audit records
//!
//! One event per engine decision on a system key. Events are append-only and
//! carry a hash of the evidence they were computed from, so two events over
//! the same evidence can be recognised as such.

use chrono::{DateTime, Utc};
use guardian_core::{
    Evaluation, EvaluationOutcome, PolicyGate, RecommendedAction, SystemKey, TransitionRecord,
};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use uuid::Uuid;

/// Decision event written by the agent
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionEvent {
    pub event_id: Uuid,
    pub agent_id: String,
    pub agent_version: String,
    pub decision_type: DecisionType,

    /// SHA-256 over the ordered evidence ids
    pub inputs_hash: String,

    pub system: String,
    pub env: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub case_id: Option<Uuid>,

    pub outputs: DecisionOutputs,

    /// Constraints declared on the case at decision time
    #[serde(default)]
    pub constraints_applied: Vec<String>,

    pub timestamp: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub correlation_ids: HashMap<String, String>,
}

impl DecisionEvent {
    pub fn new(
        decision_type: DecisionType,
        key: &SystemKey,
        evidence_ids: &[Uuid],
        outputs: DecisionOutputs,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            agent_id: crate::AGENT_ID.to_string(),
            agent_version: crate::AGENT_VERSION.to_string(),
            decision_type,
            inputs_hash: hash_evidence(evidence_ids),
            system: key.name.clone(),
            env: key.env.clone(),
            case_id: None,
            outputs,
            constraints_applied: Vec::new(),
            timestamp,
            correlation_ids: HashMap::new(),
        }
    }

    /// Events describing one evaluation. Opening a case and transitioning it
    /// in the same evaluation yields two events.
    pub fn from_evaluation(evaluation: &Evaluation) -> Vec<Self> {
        let case = evaluation.case.as_ref();
        let outputs = DecisionOutputs {
            policy_gate: case.map(|c| c.policy_gate),
            recommended_action: case.map(|c| c.recommended_action),
            aggregate_tension: evaluation.aggregate_tension,
            candidate_gate: evaluation.resolution.map(|r| r.gate),
            transition: evaluation.record().cloned(),
            blocked_by: None,
            reason: None,
        };
        let constraints: Vec<String> = case
            .map(|c| c.constraints.iter().map(|k| k.to_string()).collect())
            .unwrap_or_default();

        let build = |decision_type: DecisionType, outputs: DecisionOutputs| {
            let mut event = Self::new(
                decision_type,
                &evaluation.key,
                &evaluation.evidence_ids,
                outputs,
                evaluation.evaluated_at,
            )
            .with_constraints(constraints.clone());
            event.case_id = evaluation.case_id;
            event
        };

        let mut events = Vec::new();
        if evaluation.opened {
            events.push(build(DecisionType::CaseOpened, outputs.clone()));
        }

        let (decision_type, outputs) = match &evaluation.outcome {
            EvaluationOutcome::Transitioned { .. } => (DecisionType::TransitionCommitted, outputs),
            EvaluationOutcome::Blocked { constraint } => {
                let reason = case
                    .and_then(|c| c.rejections.last())
                    .map(|r| r.reason.clone());
                (
                    DecisionType::TransitionBlocked,
                    DecisionOutputs {
                        blocked_by: Some(constraint.to_string()),
                        reason,
                        ..outputs
                    },
                )
            }
            EvaluationOutcome::Closed => (DecisionType::CaseClosed, outputs),
            EvaluationOutcome::NoEvidence => (
                DecisionType::NoAction,
                DecisionOutputs {
                    reason: Some("no evidence in the active window".to_string()),
                    ..outputs
                },
            ),
            EvaluationOutcome::BelowBaseline => (
                DecisionType::NoAction,
                DecisionOutputs {
                    reason: Some("aggregate tension below baseline".to_string()),
                    ..outputs
                },
            ),
            EvaluationOutcome::Unchanged => (
                DecisionType::NoAction,
                DecisionOutputs {
                    reason: Some("case already holds the candidate or awaits review".to_string()),
                    ..outputs
                },
            ),
        };
        events.push(build(decision_type, outputs));
        events
    }

    pub fn with_correlation_id(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.correlation_ids.insert(key.into(), value.into());
        self
    }

    pub fn with_constraints(mut self, constraints: Vec<String>) -> Self {
        self.constraints_applied = constraints;
        self
    }

    /// One-line summary for logging
    pub fn summary(&self) -> String {
        format!(
            "[{}] {} {}/{} gate={} action={}",
            self.agent_id,
            self.decision_type.as_str(),
            self.system,
            self.env,
            self.outputs
                .policy_gate
                .map(|g| g.to_string())
                .unwrap_or_else(|| "-".to_string()),
            self.outputs
                .recommended_action
                .map(|a| a.to_string())
                .unwrap_or_else(|| "-".to_string()),
        )
    }
}

/// Kinds of decisions the engine makes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionType {
    CaseOpened,
    TransitionCommitted,
    TransitionBlocked,
    NoAction,
    CaseClosed,
}

impl DecisionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DecisionType::CaseOpened => "case_opened",
            DecisionType::TransitionCommitted => "transition_committed",
            DecisionType::TransitionBlocked => "transition_blocked",
            DecisionType::NoAction => "no_action",
            DecisionType::CaseClosed => "case_closed",
        }
    }
}

/// What the decision produced
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DecisionOutputs {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policy_gate: Option<PolicyGate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recommended_action: Option<RecommendedAction>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aggregate_tension: Option<f64>,
    /// Gate the resolver proposed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub candidate_gate: Option<PolicyGate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transition: Option<TransitionRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blocked_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Hex SHA-256 over evidence ids in the given order
pub fn hash_evidence(ids: &[Uuid]) -> String {
    let mut hasher = Sha256::new();
    for id in ids {
        hasher.update(id.as_bytes());
    }
    hex::encode(hasher.finalize())
}
