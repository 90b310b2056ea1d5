//! Guardian agent contract definitions
//!
//! Wire shapes the agent writes and reads: the care-case document handed to
//! issue rendering and patch proposal, and the [`DecisionEvent`] audit record.
//! Documents are snapshots of engine state; editing one never changes a case.

pub mod decision_event;

use chrono::{DateTime, Utc};
use guardian_core::{
    CareCase, CaseStatus, CloseReason, PolicyGate, RecommendedAction, RejectionRecord,
    Reversibility, SystemRef, TransitionIntent, TransitionRecord, CARE_CASE_SCHEMA_VERSION,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub use decision_event::{DecisionEvent, DecisionOutputs, DecisionType};

/// Signal reference inside a care-case document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentSignal {
    pub signal_id: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tension: Option<f64>,
}

/// Care-case document, `carecase.<id>.json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CareCaseDocument {
    pub schema_version: String,
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub system: SystemRef,
    pub policy_gate: PolicyGate,
    pub recommended_action: RecommendedAction,
    pub tension: f64,
    pub summary: String,
    pub constraints: Vec<String>,
    pub signals: Vec<DocumentSignal>,
    pub status: CaseStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root_cause_hypothesis: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proposed_transition: Option<TransitionIntent>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub history: Vec<TransitionRecord>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rejections: Vec<RejectionRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub closed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub close_reason: Option<CloseReason>,
}

impl CareCaseDocument {
    /// Snapshot a case. A staged intent wins over `intent`.
    pub fn from_case(case: &CareCase, intent: Option<TransitionIntent>) -> Self {
        let staged = case
            .proposed_transition
            .as_ref()
            .and_then(|p| p.intent.clone());

        Self {
            schema_version: CARE_CASE_SCHEMA_VERSION.to_string(),
            id: case.id,
            created_at: case.created_at,
            system: case.system.clone(),
            policy_gate: case.policy_gate,
            recommended_action: case.recommended_action,
            tension: case.tension,
            summary: case.summary.clone(),
            constraints: case.constraints.iter().map(|c| c.to_string()).collect(),
            signals: case
                .signals
                .iter()
                .map(|link| DocumentSignal {
                    signal_id: link.signal_id,
                    kind: link.snapshot.as_ref().map(|s| s.kind.clone()),
                    severity: link.snapshot.as_ref().map(|s| s.severity.to_string()),
                    tension: link.snapshot.as_ref().map(|s| s.tension),
                })
                .collect(),
            status: case.status,
            root_cause_hypothesis: case.root_cause_hypothesis.clone(),
            proposed_transition: staged.or(intent),
            history: case.history.clone(),
            rejections: case.rejections.clone(),
            closed_at: case.closed_at,
            close_reason: case.close_reason.clone(),
        }
    }

    /// Parse a document and check its schema version
    pub fn from_json(content: &str) -> crate::error::Result<Self> {
        let doc: Self = serde_json::from_str(content)?;
        if doc.schema_version != CARE_CASE_SCHEMA_VERSION {
            return Err(crate::error::AgentError::invalid_input(format!(
                "unsupported care-case schema_version '{}', expected '{}'",
                doc.schema_version, CARE_CASE_SCHEMA_VERSION
            )));
        }
        Ok(doc)
    }

    pub fn to_json_pretty(&self) -> crate::error::Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| crate::error::AgentError::SerializationError(e.to_string()))
    }

    /// File name the intake command writes this document to
    pub fn file_name(&self) -> String {
        format!("carecase.{}.json", self.id)
    }

    pub fn is_reversible(&self) -> bool {
        self.proposed_transition
            .as_ref()
            .is_some_and(|t| t.reversibility == Reversibility::Reversible)
    }
}
