//! Gate resolution
//!
//! [`GateResolver::resolve`] is a pure function of its inputs: the same
//! aggregate tension, severities and prior state always produce the same
//! candidate. It never selects `rollback`; that action is only reachable
//! through a separately approved human transition.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::config::GateThresholds;
use crate::gate::{PolicyGate, RecommendedAction};
use crate::signal::Severity;

/// The gate a case currently holds and the evidence it was decided on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriorGate {
    pub gate: PolicyGate,
    /// Newest evidence behind the last committed transition
    pub decided_at: Option<DateTime<Utc>>,
}

impl PriorGate {
    /// Prior state of a case with no committed transition yet
    pub fn fresh() -> Self {
        Self {
            gate: PolicyGate::Green,
            decided_at: None,
        }
    }
}

/// Candidate (gate, action) pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub gate: PolicyGate,
    pub action: RecommendedAction,
    /// Gate the thresholds alone would pick
    pub threshold_gate: PolicyGate,
    /// True when a decrease was suppressed because the evidence was not newer
    pub held: bool,
}

/// Maps aggregate evidence to a candidate gate and action
#[derive(Debug, Clone, Copy)]
pub struct GateResolver {
    thresholds: GateThresholds,
}

impl GateResolver {
    pub fn new(thresholds: GateThresholds) -> Self {
        Self { thresholds }
    }

    /// Gate from thresholds only
    pub fn classify(&self, aggregate_tension: f64, severities: &BTreeSet<Severity>) -> PolicyGate {
        let t = &self.thresholds;
        if aggregate_tension >= t.red
            || (severities.contains(&Severity::Fail) && aggregate_tension >= t.fail_red)
        {
            PolicyGate::Red
        } else if aggregate_tension >= t.yellow {
            PolicyGate::Yellow
        } else {
            PolicyGate::Green
        }
    }

    /// Compute the candidate pair.
    ///
    /// A gate less severe than `prior.gate` is only returned when the
    /// evidence driving it (`evidence_at`) is newer than the evidence behind
    /// the prior decision.
    pub fn resolve(
        &self,
        aggregate_tension: f64,
        severities: &BTreeSet<Severity>,
        prior: &PriorGate,
        evidence_at: DateTime<Utc>,
    ) -> Resolution {
        let threshold_gate = self.classify(aggregate_tension, severities);

        let newer = prior
            .decided_at
            .map_or(true, |decided| evidence_at > decided);
        let held = threshold_gate < prior.gate && !newer;
        let gate = if held { prior.gate } else { threshold_gate };

        Resolution {
            gate,
            action: gate.default_action(),
            threshold_gate,
            held,
        }
    }
}

impl Default for GateResolver {
    fn default() -> Self {
        Self::new(GateThresholds::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn at(minutes: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap() + Duration::minutes(minutes)
    }

    fn severities(list: &[Severity]) -> BTreeSet<Severity> {
        list.iter().copied().collect()
    }

    #[test]
    fn test_threshold_mapping() {
        let resolver = GateResolver::default();
        let none = severities(&[Severity::Info]);
        let fail = severities(&[Severity::Fail]);

        assert_eq!(resolver.classify(0.85, &none), PolicyGate::Red);
        assert_eq!(resolver.classify(0.55, &fail), PolicyGate::Red);
        assert_eq!(resolver.classify(0.55, &none), PolicyGate::Yellow);
        assert_eq!(resolver.classify(0.45, &fail), PolicyGate::Yellow);
        assert_eq!(resolver.classify(0.39, &none), PolicyGate::Green);
    }

    #[test]
    fn test_action_mapping_never_rollback() {
        let resolver = GateResolver::default();
        for tension in [0.0, 0.3, 0.5, 0.79, 0.8, 1.0] {
            for sev in [Severity::Info, Severity::Warn, Severity::Fail] {
                let r = resolver.resolve(tension, &severities(&[sev]), &PriorGate::fresh(), at(0));
                assert_ne!(r.action, RecommendedAction::Rollback);
                assert_eq!(r.action, r.gate.default_action());
            }
        }
    }

    #[test]
    fn test_red_maps_to_human_review() {
        let resolver = GateResolver::default();
        let r = resolver.resolve(
            0.9,
            &severities(&[Severity::Fail, Severity::Warn, Severity::Info]),
            &PriorGate::fresh(),
            at(0),
        );
        assert_eq!(r.gate, PolicyGate::Red);
        assert_eq!(r.action, RecommendedAction::HumanReview);
        assert!(!r.held);
    }

    #[test]
    fn test_decrease_on_stale_evidence_is_held() {
        let resolver = GateResolver::default();
        let prior = PriorGate {
            gate: PolicyGate::Yellow,
            decided_at: Some(at(10)),
        };

        let r = resolver.resolve(0.1, &severities(&[Severity::Info]), &prior, at(10));
        assert_eq!(r.gate, PolicyGate::Yellow);
        assert_eq!(r.threshold_gate, PolicyGate::Green);
        assert!(r.held);

        let r = resolver.resolve(0.1, &severities(&[Severity::Info]), &prior, at(11));
        assert_eq!(r.gate, PolicyGate::Green);
        assert!(!r.held);
    }

    #[test]
    fn test_increase_is_never_held() {
        let resolver = GateResolver::default();
        let prior = PriorGate {
            gate: PolicyGate::Yellow,
            decided_at: Some(at(10)),
        };
        let r = resolver.resolve(0.95, &severities(&[Severity::Warn]), &prior, at(0));
        assert_eq!(r.gate, PolicyGate::Red);
        assert!(!r.held);
    }

    #[test]
    fn test_resolution_is_deterministic() {
        let resolver = GateResolver::default();
        let prior = PriorGate {
            gate: PolicyGate::Red,
            decided_at: Some(at(5)),
        };
        let sev = severities(&[Severity::Warn]);
        let a = resolver.resolve(0.42, &sev, &prior, at(3));
        let b = resolver.resolve(0.42, &sev, &prior, at(3));
        assert_eq!(a, b);
    }
}
