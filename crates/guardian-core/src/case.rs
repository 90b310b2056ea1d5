//! Care-Case records
//!
//! A [`CareCase`] binds linked signals to a policy gate and a recommended
//! action. Only the lifecycle manager writes to these records; everything
//! handed out to callers is a cloned snapshot.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::constraints::{Constraint, ConstraintSet};
use crate::gate::{PolicyGate, RecommendedAction};
use crate::resolver::PriorGate;
use crate::signal::{Signal, SignalSnapshot, SystemKey, SystemRef};

/// Care-case schema version written to documents
pub const CARE_CASE_SCHEMA_VERSION: &str = "0.1";

/// Deterministic case id derived from the opening signal
pub fn derive_case_id(opening_signal: Uuid) -> Uuid {
    Uuid::new_v5(&Uuid::nil(), format!("carecase:{}", opening_signal).as_bytes())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaseStatus {
    Open,
    Closed,
}

/// Why a case was closed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CloseReason {
    /// Gate stayed green through the quiescence window
    Quiescent,
    /// Closed explicitly by a reviewer
    Human { reviewer: String },
}

/// Who proposed a transition.
///
/// `HumanReviewer` must only be constructed by the embedding system after it
/// has authenticated the reviewer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Actor {
    Engine,
    HumanReviewer { id: String },
}

impl Actor {
    pub fn reviewer(id: impl Into<String>) -> Self {
        Actor::HumanReviewer { id: id.into() }
    }

    pub fn is_human(&self) -> bool {
        matches!(self, Actor::HumanReviewer { .. })
    }
}

impl fmt::Display for Actor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Actor::Engine => f.write_str("engine"),
            Actor::HumanReviewer { id } => write!(f, "reviewer:{}", id),
        }
    }
}

/// A signal reference on a case
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalLink {
    pub signal_id: Uuid,
    pub linked_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snapshot: Option<SignalSnapshot>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Reversibility {
    Reversible,
    Irreversible,
}

impl fmt::Display for Reversibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reversibility::Reversible => f.write_str("reversible"),
            Reversibility::Irreversible => f.write_str("irreversible"),
        }
    }
}

/// Human-readable description of what a transition intends to do
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionIntent {
    pub intent: String,
    pub scope: String,
    pub reversibility: Reversibility,
    #[serde(default)]
    pub verification: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace_ref: Option<String>,
}

/// Staged, not yet committed target (gate, action)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProposedTransition {
    pub target_gate: PolicyGate,
    pub target_action: RecommendedAction,
    pub proposed_by: Actor,
    /// Set only on reviewer proposals that explicitly approve the change
    pub human_approved: bool,
    /// Evidence the resolution was computed from
    pub evidence_ids: Vec<Uuid>,
    /// Case evidence revision at staging time
    pub evidence_revision: u64,
    /// Newest evidence timestamp behind the proposal
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evidence_at: Option<DateTime<Utc>>,
    pub proposed_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intent: Option<TransitionIntent>,
}

impl ProposedTransition {
    pub fn new(
        target_gate: PolicyGate,
        target_action: RecommendedAction,
        proposed_by: Actor,
        evidence_ids: Vec<Uuid>,
        evidence_revision: u64,
        proposed_at: DateTime<Utc>,
    ) -> Self {
        Self {
            target_gate,
            target_action,
            proposed_by,
            human_approved: false,
            evidence_ids,
            evidence_revision,
            evidence_at: None,
            proposed_at,
            intent: None,
        }
    }
}

/// A committed transition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitionRecord {
    pub sequence: u64,
    pub from_gate: PolicyGate,
    pub to_gate: PolicyGate,
    pub from_action: RecommendedAction,
    pub to_action: RecommendedAction,
    pub committed_at: DateTime<Utc>,
    pub evidence_ids: Vec<Uuid>,
    pub actor: Actor,
    pub human_approved: bool,
}

impl TransitionRecord {
    /// Whether this transition lowered a red gate
    pub fn lowered_red(&self) -> bool {
        self.from_gate == PolicyGate::Red && self.to_gate < PolicyGate::Red
    }
}

/// A transition blocked by a constraint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RejectionRecord {
    pub rejected_at: DateTime<Utc>,
    pub constraint: Constraint,
    pub reason: String,
    pub attempted_gate: PolicyGate,
    pub attempted_action: RecommendedAction,
    pub actor: Actor,
}

/// Mutable decision container for one `(system.name, system.env)` key
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CareCase {
    pub id: Uuid,
    pub system: SystemRef,
    pub status: CaseStatus,
    pub policy_gate: PolicyGate,
    pub recommended_action: RecommendedAction,
    /// Aggregate tension of the last evaluation
    pub tension: f64,
    pub summary: String,
    pub constraints: ConstraintSet,
    pub signals: Vec<SignalLink>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proposed_transition: Option<ProposedTransition>,
    pub history: Vec<TransitionRecord>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rejections: Vec<RejectionRecord>,
    /// Bumped every time new evidence is linked
    pub evidence_revision: u64,
    /// Newest evidence behind the last committed transition
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decided_at: Option<DateTime<Utc>>,
    /// Since when the gate has been green
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub green_since: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root_cause_hypothesis: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub closed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub close_reason: Option<CloseReason>,
}

impl CareCase {
    /// New open case at green/observe. The opening signal is not linked yet.
    pub fn new(opening: &Signal, constraints: ConstraintSet, now: DateTime<Utc>) -> Self {
        Self {
            id: derive_case_id(opening.id),
            system: opening.system.clone(),
            status: CaseStatus::Open,
            policy_gate: PolicyGate::Green,
            recommended_action: RecommendedAction::Observe,
            tension: opening.tension,
            summary: opening.summary.clone(),
            constraints,
            signals: Vec::new(),
            proposed_transition: None,
            history: Vec::new(),
            rejections: Vec::new(),
            evidence_revision: 0,
            decided_at: None,
            green_since: None,
            root_cause_hypothesis: None,
            created_at: now,
            updated_at: now,
            closed_at: None,
            close_reason: None,
        }
    }

    pub fn key(&self) -> SystemKey {
        self.system.key()
    }

    /// Open cases accept new links and transitions
    pub fn is_active(&self) -> bool {
        self.status == CaseStatus::Open
    }

    pub fn is_linked(&self, signal_id: &Uuid) -> bool {
        self.signals.iter().any(|l| l.signal_id == *signal_id)
    }

    /// Linked signal ids in link order
    pub fn linked_ids(&self) -> Vec<Uuid> {
        self.signals.iter().map(|l| l.signal_id).collect()
    }

    /// Prior state for the resolver
    pub fn prior_gate(&self) -> PriorGate {
        PriorGate {
            gate: self.policy_gate,
            decided_at: self.decided_at,
        }
    }

    /// Whether every red-lowering transition in the history was human-approved
    pub fn red_exits_reviewed(&self) -> bool {
        self.history
            .iter()
            .filter(|t| t.lowered_red())
            .all(|t| t.human_approved && t.actor.is_human())
    }
}
