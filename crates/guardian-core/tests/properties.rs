//! Property tests for aggregation, resolution and case invariants

use chrono::{DateTime, Duration, TimeZone, Utc};
use guardian_core::{
    aggregate_tension, EngineConfig, EvaluationOutcome, GateEngine, GateResolver, IngestOutcome,
    PolicyGate, PriorGate, RecommendedAction, Review, Severity, SeverityWeights, Signal,
    SignalStore, SystemRef,
};
use proptest::prelude::*;
use std::collections::BTreeSet;
use uuid::Uuid;

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 5, 10, 8, 0, 0).unwrap()
}

fn severity() -> impl Strategy<Value = Severity> {
    prop_oneof![Just(Severity::Info), Just(Severity::Warn), Just(Severity::Fail)]
}

fn gate() -> impl Strategy<Value = PolicyGate> {
    prop_oneof![Just(PolicyGate::Green), Just(PolicyGate::Yellow), Just(PolicyGate::Red)]
}

fn action() -> impl Strategy<Value = RecommendedAction> {
    prop_oneof![
        Just(RecommendedAction::Observe),
        Just(RecommendedAction::ProposePatch),
        Just(RecommendedAction::Rollback),
        Just(RecommendedAction::HumanReview),
    ]
}

fn make_signal(kind: &str, severity: Severity, tension: f64, minute: i64) -> Signal {
    Signal {
        schema_version: "0.1".to_string(),
        id: Uuid::new_v4(),
        timestamp: t0() + Duration::minutes(minute),
        source: "property".to_string(),
        severity,
        tension,
        system: SystemRef::new("inventory", "staging", "0.9.0"),
        kind: kind.to_string(),
        summary: "generated".to_string(),
        details: None,
        trace_ref: None,
        links: Vec::new(),
    }
}

#[derive(Debug, Clone)]
enum Op {
    Signal {
        canary: bool,
        severity: Severity,
        tension: f64,
    },
    Review {
        gate: PolicyGate,
        action: RecommendedAction,
        approve: bool,
    },
    Reevaluate,
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => (any::<bool>(), severity(), 0.0f64..=1.0).prop_map(|(canary, severity, tension)| Op::Signal {
            canary,
            severity,
            tension,
        }),
        2 => (gate(), action(), any::<bool>()).prop_map(|(gate, action, approve)| Op::Review {
            gate,
            action,
            approve,
        }),
        1 => Just(Op::Reevaluate),
    ]
}

proptest! {
    #[test]
    fn prop_store_get_returns_what_was_put(
        severity in severity(),
        tension in 0.0f64..=1.0,
        minute in 0i64..10_000,
    ) {
        let store = SignalStore::new();
        let signal = make_signal("latency", severity, tension, minute);
        store.put(signal.clone()).unwrap();
        let stored = store.get(&signal.id).unwrap();
        prop_assert_eq!(stored.as_ref(), &signal);
        prop_assert!(store.put(signal).is_err());
    }

    #[test]
    fn prop_aggregate_bounds(
        entries in prop::collection::vec((severity(), 0.0f64..=1.0), 1..20),
    ) {
        let weights = SeverityWeights::default();
        let signals: Vec<Signal> = entries
            .iter()
            .enumerate()
            .map(|(i, (sev, t))| make_signal("latency", *sev, *t, i as i64))
            .collect();
        let aggregate = aggregate_tension(signals.iter(), &weights);

        prop_assert!((0.0..=1.0).contains(&aggregate));
        for s in &signals {
            prop_assert!(aggregate >= s.tension);
        }
        let mean = signals.iter().map(|s| weights.weight(s.severity)).sum::<f64>() / signals.len() as f64;
        prop_assert!(aggregate >= mean - 1e-12);
    }

    #[test]
    fn prop_gate_monotonic_in_tension(
        a in 0.0f64..=1.0,
        b in 0.0f64..=1.0,
        fail in any::<bool>(),
    ) {
        let resolver = GateResolver::default();
        let severities: BTreeSet<Severity> = if fail {
            [Severity::Fail].into_iter().collect()
        } else {
            [Severity::Warn].into_iter().collect()
        };
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        prop_assert!(resolver.classify(lo, &severities) <= resolver.classify(hi, &severities));
    }

    #[test]
    fn prop_resolution_is_deterministic_and_never_rollback(
        tension in 0.0f64..=1.0,
        prior in gate(),
        decided in proptest::option::of(0i64..60),
        evidence in 0i64..60,
    ) {
        let resolver = GateResolver::default();
        let severities: BTreeSet<Severity> = [Severity::Warn].into_iter().collect();
        let prior = PriorGate {
            gate: prior,
            decided_at: decided.map(|m| t0() + Duration::minutes(m)),
        };
        let at = t0() + Duration::minutes(evidence);

        let first = resolver.resolve(tension, &severities, &prior, at);
        let second = resolver.resolve(tension, &severities, &prior, at);
        prop_assert_eq!(first, second);
        prop_assert_ne!(first.action, RecommendedAction::Rollback);
        if first.gate < prior.gate {
            prop_assert!(prior.decided_at.map_or(true, |d| at > d));
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_red_only_lowered_by_approved_review(ops in prop::collection::vec(op(), 1..30)) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        let engine = GateEngine::new(EngineConfig::default()).unwrap();

        runtime.block_on(async {
            for (minute, op) in ops.into_iter().enumerate() {
                let now = t0() + Duration::minutes(minute as i64);
                match op {
                    Op::Signal { canary, severity, tension } => {
                        let kind = if canary { "canary" } else { "latency" };
                        let signal = make_signal(kind, severity, tension, minute as i64);
                        let outcome = engine.ingest_signal(signal, now).await.unwrap();
                        if let IngestOutcome::Accepted { evaluation, .. } = outcome {
                            if matches!(evaluation.outcome, EvaluationOutcome::Blocked { .. }) {
                                let case = evaluation.case.unwrap();
                                assert_eq!(case.recommended_action, RecommendedAction::HumanReview);
                            }
                        }
                    }
                    Op::Review { gate, action, approve } => {
                        let active = engine.lifecycle().active_keys();
                        let Some(key) = active.first() else { continue };
                        let case = engine.lifecycle().active_case(key).unwrap().unwrap();
                        let before = case.policy_gate;
                        let review = Review {
                            reviewer: "prop-reviewer".to_string(),
                            gate,
                            action,
                            approve,
                            intent: None,
                        };
                        if let Err(err) = engine.submit_review(&case.id, review, now).await {
                            let after = engine.lifecycle().get(&case.id).unwrap();
                            assert_eq!(after.policy_gate, before);
                            if err.constraint().is_some() {
                                assert_eq!(after.recommended_action, RecommendedAction::HumanReview);
                            }
                        }
                    }
                    Op::Reevaluate => {
                        for (_, result) in engine.reevaluate_all(now).await {
                            result.unwrap();
                        }
                    }
                }
            }
        });

        for case in engine.cases().unwrap() {
            prop_assert!(case.red_exits_reviewed());
            for pair in case.history.windows(2) {
                prop_assert_eq!(pair[0].to_gate, pair[1].from_gate);
                prop_assert!(pair[0].sequence < pair[1].sequence);
            }
        }
    }
}
