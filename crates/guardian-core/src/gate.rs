//! Policy gate and recommended action vocabulary

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::GateError;

/// Ordered safety state: green < yellow < red
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PolicyGate {
    Green,
    Yellow,
    Red,
}

impl PolicyGate {
    pub fn as_str(&self) -> &'static str {
        match self {
            PolicyGate::Green => "green",
            PolicyGate::Yellow => "yellow",
            PolicyGate::Red => "red",
        }
    }

    /// Action the gate maps to when nothing else intervenes
    pub fn default_action(&self) -> RecommendedAction {
        match self {
            PolicyGate::Green => RecommendedAction::Observe,
            PolicyGate::Yellow => RecommendedAction::ProposePatch,
            PolicyGate::Red => RecommendedAction::HumanReview,
        }
    }
}

impl Default for PolicyGate {
    fn default() -> Self {
        PolicyGate::Green
    }
}

impl fmt::Display for PolicyGate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PolicyGate {
    type Err = GateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "green" => Ok(PolicyGate::Green),
            "yellow" => Ok(PolicyGate::Yellow),
            "red" => Ok(PolicyGate::Red),
            other => Err(GateError::validation(
                "policy_gate",
                format!("expected one of green, yellow, red; got '{}'", other),
            )),
        }
    }
}

/// What the engine recommends doing about a case
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendedAction {
    Observe,
    ProposePatch,
    Rollback,
    HumanReview,
}

impl RecommendedAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecommendedAction::Observe => "observe",
            RecommendedAction::ProposePatch => "propose_patch",
            RecommendedAction::Rollback => "rollback",
            RecommendedAction::HumanReview => "human_review",
        }
    }

    /// How much the action changes the running system. Human review parks
    /// the case and changes nothing.
    pub fn invasiveness(&self) -> u8 {
        match self {
            RecommendedAction::Observe | RecommendedAction::HumanReview => 0,
            RecommendedAction::ProposePatch => 1,
            RecommendedAction::Rollback => 2,
        }
    }
}

impl Default for RecommendedAction {
    fn default() -> Self {
        RecommendedAction::Observe
    }
}

impl fmt::Display for RecommendedAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RecommendedAction {
    type Err = GateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "observe" => Ok(RecommendedAction::Observe),
            "propose_patch" => Ok(RecommendedAction::ProposePatch),
            "rollback" => Ok(RecommendedAction::Rollback),
            "human_review" => Ok(RecommendedAction::HumanReview),
            other => Err(GateError::validation(
                "recommended_action",
                format!(
                    "expected one of observe, propose_patch, rollback, human_review; got '{}'",
                    other
                ),
            )),
        }
    }
}
