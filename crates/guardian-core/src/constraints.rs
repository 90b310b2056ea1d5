//! Constraint enforcement
//!
//! A care-case declares a set of [`Constraint`] tags. Before a staged
//! transition takes effect, the [`ConstraintEnforcer`] runs the rule for each
//! declared tag against it; the first failing rule blocks the transition.
//! `human-seniority` is always enforced, declared or not.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::case::{Actor, CareCase, ProposedTransition};
use crate::error::GateError;
use crate::gate::{PolicyGate, RecommendedAction};
use crate::signal::Signal;

/// Named enforcement rule that can block a transition
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Constraint {
    ReversibilityFirst,
    CanaryRequired,
    NoSecrets,
    HumanSeniority,
    MinimalIntervention,
    Explainability,
}

impl Constraint {
    pub const ALL: [Constraint; 6] = [
        Constraint::ReversibilityFirst,
        Constraint::CanaryRequired,
        Constraint::NoSecrets,
        Constraint::HumanSeniority,
        Constraint::MinimalIntervention,
        Constraint::Explainability,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Constraint::ReversibilityFirst => "reversibility-first",
            Constraint::CanaryRequired => "canary-required",
            Constraint::NoSecrets => "no-secrets",
            Constraint::HumanSeniority => "human-seniority",
            Constraint::MinimalIntervention => "minimal-intervention",
            Constraint::Explainability => "explainability",
        }
    }
}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Constraint {
    type Err = GateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Constraint::ALL
            .iter()
            .copied()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| GateError::validation("constraints", format!("unknown constraint '{}'", s)))
    }
}

/// Declared constraints of a case
pub type ConstraintSet = BTreeSet<Constraint>;

/// Constraints a new case starts with.
///
/// Every case gets the four base constraints; `canary-required` is added when
/// the case opens above green and `no-secrets` when the opening signal is a
/// security finding.
pub fn default_constraints(opening_gate: PolicyGate, opening_kind: &str) -> ConstraintSet {
    let mut set: ConstraintSet = [
        Constraint::ReversibilityFirst,
        Constraint::MinimalIntervention,
        Constraint::Explainability,
        Constraint::HumanSeniority,
    ]
    .into_iter()
    .collect();
    if opening_gate != PolicyGate::Green {
        set.insert(Constraint::CanaryRequired);
    }
    if opening_kind == "security" {
        set.insert(Constraint::NoSecrets);
    }
    set
}

/// Flags signals whose `details`/`links` carry sensitive content.
///
/// The classification itself lives outside the engine; the enforcer only
/// acts on the verdict.
pub trait SensitivityClassifier: Send + Sync {
    fn is_sensitive(&self, signal: &Signal) -> bool;
}

/// Classifier that never flags anything
#[derive(Debug, Clone, Copy, Default)]
pub struct NoSensitiveContent;

impl SensitivityClassifier for NoSensitiveContent {
    fn is_sensitive(&self, _signal: &Signal) -> bool {
        false
    }
}

/// Everything a rule may look at
pub struct TransitionContext<'a> {
    pub case: &'a CareCase,
    pub proposal: &'a ProposedTransition,
    /// Signals the proposal cites as its evidence
    pub evidence: &'a [Arc<Signal>],
    /// Every signal linked to the case
    pub linked: &'a [Arc<Signal>],
    pub classifier: &'a dyn SensitivityClassifier,
}

/// A failed constraint check
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    pub constraint: Constraint,
    pub reason: String,
}

impl Violation {
    pub fn new(constraint: Constraint, reason: impl Into<String>) -> Self {
        Self {
            constraint,
            reason: reason.into(),
        }
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.constraint, self.reason)
    }
}

/// A single enforcement rule
pub trait ConstraintRule: Send + Sync {
    /// Constraint tag this rule enforces
    fn constraint(&self) -> Constraint;

    /// What the rule checks
    fn description(&self) -> &str;

    /// Approve (`Ok`) or block the transition
    fn check(&self, ctx: &TransitionContext<'_>) -> Result<(), Violation>;
}

/// `rollback` needs a passed canary on record
pub struct ReversibilityFirstRule;

impl ConstraintRule for ReversibilityFirstRule {
    fn constraint(&self) -> Constraint {
        Constraint::ReversibilityFirst
    }

    fn description(&self) -> &str {
        "Rollback requires at least one successful canary validation on the case"
    }

    fn check(&self, ctx: &TransitionContext<'_>) -> Result<(), Violation> {
        if ctx.proposal.target_action != RecommendedAction::Rollback {
            return Ok(());
        }
        if ctx.linked.iter().any(|s| s.is_successful_canary()) {
            Ok(())
        } else {
            Err(Violation::new(
                self.constraint(),
                "rollback proposed without a successful canary validation",
            ))
        }
    }
}

/// `propose_patch` needs canary evidence in the set used for the resolution
pub struct CanaryRequiredRule;

impl ConstraintRule for CanaryRequiredRule {
    fn constraint(&self) -> Constraint {
        Constraint::CanaryRequired
    }

    fn description(&self) -> &str {
        "Proposing a patch requires a canary result in the evidence set"
    }

    fn check(&self, ctx: &TransitionContext<'_>) -> Result<(), Violation> {
        if ctx.proposal.target_action != RecommendedAction::ProposePatch {
            return Ok(());
        }
        if ctx.evidence.iter().any(|s| s.is_canary()) {
            Ok(())
        } else {
            Err(Violation::new(
                self.constraint(),
                "no canary result in the evidence set",
            ))
        }
    }
}

/// Any linked signal flagged as sensitive blocks the transition
pub struct NoSecretsRule;

impl ConstraintRule for NoSecretsRule {
    fn constraint(&self) -> Constraint {
        Constraint::NoSecrets
    }

    fn description(&self) -> &str {
        "Blocks transitions while a linked signal carries sensitive content"
    }

    fn check(&self, ctx: &TransitionContext<'_>) -> Result<(), Violation> {
        match ctx.linked.iter().find(|s| ctx.classifier.is_sensitive(s)) {
            Some(signal) => Err(Violation::new(
                self.constraint(),
                format!("signal {} carries sensitive content", signal.id),
            )),
            None => Ok(()),
        }
    }
}

/// A red gate is only lowered by an approved human review
pub struct HumanSeniorityRule;

impl ConstraintRule for HumanSeniorityRule {
    fn constraint(&self) -> Constraint {
        Constraint::HumanSeniority
    }

    fn description(&self) -> &str {
        "Lowering a red gate requires a human-approved transition out of human_review"
    }

    fn check(&self, ctx: &TransitionContext<'_>) -> Result<(), Violation> {
        let lowering_red = ctx.case.policy_gate == PolicyGate::Red
            && ctx.proposal.target_gate < PolicyGate::Red;
        if !lowering_red {
            return Ok(());
        }
        let reviewed = ctx.case.recommended_action == RecommendedAction::HumanReview
            && ctx.proposal.human_approved
            && matches!(ctx.proposal.proposed_by, Actor::HumanReviewer { .. });
        if reviewed {
            Ok(())
        } else {
            Err(Violation::new(
                self.constraint(),
                "red gate can only be lowered by an approved human review",
            ))
        }
    }
}

/// Caps the action at what the target gate maps to; `rollback` only on red
pub struct MinimalInterventionRule;

impl ConstraintRule for MinimalInterventionRule {
    fn constraint(&self) -> Constraint {
        Constraint::MinimalIntervention
    }

    fn description(&self) -> &str {
        "Rejects actions more invasive than the target gate warrants"
    }

    fn check(&self, ctx: &TransitionContext<'_>) -> Result<(), Violation> {
        let ceiling = match ctx.proposal.target_gate {
            PolicyGate::Red => RecommendedAction::Rollback.invasiveness(),
            gate => gate.default_action().invasiveness(),
        };
        if ctx.proposal.target_action.invasiveness() > ceiling {
            Err(Violation::new(
                self.constraint(),
                format!(
                    "{} is too invasive for a {} gate",
                    ctx.proposal.target_action, ctx.proposal.target_gate
                ),
            ))
        } else {
            Ok(())
        }
    }
}

/// Every transition must cite evidence
pub struct ExplainabilityRule;

impl ConstraintRule for ExplainabilityRule {
    fn constraint(&self) -> Constraint {
        Constraint::Explainability
    }

    fn description(&self) -> &str {
        "Transitions must cite the evidence that triggered them"
    }

    fn check(&self, ctx: &TransitionContext<'_>) -> Result<(), Violation> {
        if ctx.proposal.evidence_ids.is_empty() {
            Err(Violation::new(self.constraint(), "transition cites no evidence"))
        } else {
            Ok(())
        }
    }
}

/// Runs the declared constraint rules against a staged transition
pub struct ConstraintEnforcer {
    rules: Vec<Arc<dyn ConstraintRule>>,
    classifier: Arc<dyn SensitivityClassifier>,
}

impl Default for ConstraintEnforcer {
    fn default() -> Self {
        Self::new(Arc::new(NoSensitiveContent))
    }
}

impl ConstraintEnforcer {
    /// Create an enforcer with the built-in rules
    pub fn new(classifier: Arc<dyn SensitivityClassifier>) -> Self {
        let mut enforcer = Self {
            rules: Vec::new(),
            classifier,
        };
        enforcer.register_default_rules();
        enforcer
    }

    fn register_default_rules(&mut self) {
        self.register(Arc::new(HumanSeniorityRule));
        self.register(Arc::new(NoSecretsRule));
        self.register(Arc::new(ReversibilityFirstRule));
        self.register(Arc::new(MinimalInterventionRule));
        self.register(Arc::new(CanaryRequiredRule));
        self.register(Arc::new(ExplainabilityRule));
    }

    /// Register a rule; a later rule for the same constraint replaces the earlier one
    pub fn register(&mut self, rule: Arc<dyn ConstraintRule>) {
        let constraint = rule.constraint();
        self.rules.retain(|r| r.constraint() != constraint);
        self.rules.push(rule);
    }

    pub fn rules(&self) -> &[Arc<dyn ConstraintRule>] {
        &self.rules
    }

    pub fn classifier(&self) -> &dyn SensitivityClassifier {
        self.classifier.as_ref()
    }

    /// Check a staged transition against the case's declared constraints.
    ///
    /// Returns the first violation in rule order.
    pub fn enforce(
        &self,
        case: &CareCase,
        proposal: &ProposedTransition,
        evidence: &[Arc<Signal>],
        linked: &[Arc<Signal>],
    ) -> Result<(), Violation> {
        let ctx = TransitionContext {
            case,
            proposal,
            evidence,
            linked,
            classifier: self.classifier.as_ref(),
        };

        let violations: Vec<Violation> = self
            .rules
            .iter()
            .filter(|rule| {
                let c = rule.constraint();
                c == Constraint::HumanSeniority || case.constraints.contains(&c)
            })
            .filter_map(|rule| rule.check(&ctx).err())
            .collect();

        for violation in violations.iter().skip(1) {
            tracing::debug!(
                case_id = %case.id,
                constraint = %violation.constraint,
                reason = %violation.reason,
                "Additional constraint violation"
            );
        }

        match violations.into_iter().next() {
            Some(violation) => Err(violation),
            None => Ok(()),
        }
    }
}
