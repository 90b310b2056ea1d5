//! Playbook defaults for known signal kinds
//!
//! A playbook supplies a starting root-cause hypothesis and a reversible
//! transition intent for a case. Both are suggestions for the reviewer and
//! are only attached to emitted documents, never to engine state.

use guardian_core::{CareCase, RecommendedAction, Reversibility, TransitionIntent, CANARY_KIND};

use crate::contracts::CareCaseDocument;

/// Web performance regressions (LCP, TTFB, bundle size)
pub const WEB_PERF_KIND: &str = "web-perf";

pub const WEB_PERF_HYPOTHESIS: &str =
    "Potentially heavier assets or blocking scripts introduced recently.";

/// Kind of the first linked signal that is not a canary result
fn case_kind(case: &CareCase) -> Option<&str> {
    case.signals
        .iter()
        .filter_map(|link| link.snapshot.as_ref())
        .map(|s| s.kind.as_str())
        .find(|kind| *kind != CANARY_KIND)
}

/// Whether a playbook applies to the case
pub fn applies(case: &CareCase) -> bool {
    case_kind(case) == Some(WEB_PERF_KIND)
        && matches!(
            case.recommended_action,
            RecommendedAction::ProposePatch | RecommendedAction::HumanReview
        )
}

pub fn web_perf_intent(trace_ref: Option<String>) -> TransitionIntent {
    TransitionIntent {
        intent: "Reduce LCP/TTFB by optimizing critical assets and deferring non-critical scripts"
            .to_string(),
        scope: "critical rendering path (hero assets, script loading)".to_string(),
        reversibility: Reversibility::Reversible,
        verification: vec![
            "Lighthouse LCP within budget".to_string(),
            "No functional regressions (smoke)".to_string(),
        ],
        trace_ref: Some(trace_ref.unwrap_or_else(|| "pending".to_string())),
    }
}

/// Fill in hypothesis and intent where the document has none
pub fn apply(case: &CareCase, trace_ref: Option<String>, doc: &mut CareCaseDocument) -> bool {
    if !applies(case) {
        return false;
    }
    if doc.root_cause_hypothesis.is_none() {
        doc.root_cause_hypothesis = Some(WEB_PERF_HYPOTHESIS.to_string());
    }
    if doc.proposed_transition.is_none() {
        doc.proposed_transition = Some(web_perf_intent(trace_ref));
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use guardian_core::{default_constraints, PolicyGate, Severity, Signal, SignalLink, SystemRef};
    use uuid::Uuid;

    fn case(kind: &str, action: RecommendedAction) -> CareCase {
        let opening = Signal {
            schema_version: "0.1".to_string(),
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            source: "lighthouse".to_string(),
            severity: Severity::Warn,
            tension: 0.55,
            system: SystemRef::new("storefront", "prod", "3.1.0"),
            kind: kind.to_string(),
            summary: "LCP regression".to_string(),
            details: None,
            trace_ref: None,
            links: Vec::new(),
        };
        let mut case = CareCase::new(
            &opening,
            default_constraints(PolicyGate::Yellow, kind),
            opening.timestamp,
        );
        case.signals.push(SignalLink {
            signal_id: opening.id,
            linked_at: opening.timestamp,
            snapshot: Some(opening.snapshot()),
        });
        case.recommended_action = action;
        case
    }

    #[test]
    fn test_web_perf_review_gets_defaults() {
        let case = case(WEB_PERF_KIND, RecommendedAction::HumanReview);
        let mut doc = CareCaseDocument::from_case(&case, None);
        assert!(apply(&case, None, &mut doc));

        assert_eq!(doc.root_cause_hypothesis.as_deref(), Some(WEB_PERF_HYPOTHESIS));
        let intent = doc.proposed_transition.unwrap();
        assert_eq!(intent.reversibility, Reversibility::Reversible);
        assert_eq!(intent.trace_ref.as_deref(), Some("pending"));
        assert_eq!(intent.verification.len(), 2);
    }

    #[test]
    fn test_existing_hypothesis_is_kept() {
        let mut case = case(WEB_PERF_KIND, RecommendedAction::ProposePatch);
        case.root_cause_hypothesis = Some("CDN cache purge".to_string());
        let mut doc = CareCaseDocument::from_case(&case, None);
        apply(&case, Some("trace-42".to_string()), &mut doc);

        assert_eq!(doc.root_cause_hypothesis.as_deref(), Some("CDN cache purge"));
        assert_eq!(
            doc.proposed_transition.unwrap().trace_ref.as_deref(),
            Some("trace-42")
        );
    }

    #[test]
    fn test_other_kinds_and_observe_untouched() {
        let latency = case("latency", RecommendedAction::ProposePatch);
        let mut doc = CareCaseDocument::from_case(&latency, None);
        assert!(!apply(&latency, None, &mut doc));
        assert!(doc.proposed_transition.is_none());

        let quiet = case(WEB_PERF_KIND, RecommendedAction::Observe);
        assert!(!applies(&quiet));
    }
}
