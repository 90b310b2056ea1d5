//! End-to-end scenarios for the gate engine

use chrono::{DateTime, Duration, TimeZone, Utc};
use guardian_core::{
    Aggregation, CloseReason, Constraint, EngineConfig, EvaluationOutcome, GateEngine, GateError,
    IngestOutcome, PolicyGate, RecommendedAction, Review, Severity, Signal, SignalPayload,
    SystemKey, SystemRef, TransitionRequest,
};
use std::sync::Arc;
use uuid::Uuid;

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 4, 2, 9, 30, 0).unwrap()
}

fn at(minutes: i64) -> DateTime<Utc> {
    t0() + Duration::minutes(minutes)
}

fn signal_for(system: &str, kind: &str, severity: Severity, tension: f64, minutes: i64) -> Signal {
    Signal {
        schema_version: "0.1".to_string(),
        id: Uuid::new_v4(),
        timestamp: at(minutes),
        source: "synthetic-probe".to_string(),
        severity,
        tension,
        system: SystemRef::new(system, "prod", "7.3.0"),
        kind: kind.to_string(),
        summary: format!("{} {} on {}", severity, kind, system),
        details: None,
        trace_ref: None,
        links: Vec::new(),
    }
}

fn signal(kind: &str, severity: Severity, tension: f64, minutes: i64) -> Signal {
    signal_for("checkout", kind, severity, tension, minutes)
}

fn key() -> SystemKey {
    SystemKey::new("checkout", "prod")
}

fn engine() -> GateEngine {
    GateEngine::new(EngineConfig::default()).unwrap()
}

async fn ingest(engine: &GateEngine, signal: Signal, now: DateTime<Utc>) -> guardian_core::Evaluation {
    match engine.ingest_signal(signal, now).await.unwrap() {
        IngestOutcome::Accepted { evaluation, .. } => evaluation,
        IngestOutcome::Duplicate { signal_id } => panic!("unexpected duplicate {}", signal_id),
    }
}

async fn open_red_case(engine: &GateEngine) -> Uuid {
    ingest(engine, signal("error-rate", Severity::Fail, 0.9, 0), at(0)).await;
    ingest(engine, signal("error-rate", Severity::Warn, 0.3, 1), at(1)).await;
    let evaluation = ingest(engine, signal("error-rate", Severity::Info, 0.1, 2), at(2)).await;
    evaluation.case_id.unwrap()
}

#[tokio::test]
async fn test_fail_warn_info_window_goes_red() {
    let engine = engine();
    let case_id = open_red_case(&engine).await;

    let case = engine.lifecycle().get(&case_id).unwrap();
    assert_eq!(case.policy_gate, PolicyGate::Red);
    assert_eq!(case.recommended_action, RecommendedAction::HumanReview);
    assert!((case.tension - 0.9).abs() < 1e-9);
    assert_eq!(case.signals.len(), 3);
    assert_eq!(case.history.len(), 1);
    assert_eq!(case.history[0].to_gate, PolicyGate::Red);
}

#[tokio::test]
async fn test_one_active_case_per_key() {
    let engine = engine();
    let case_id = open_red_case(&engine).await;

    let s = engine
        .store()
        .put(signal("error-rate", Severity::Fail, 0.95, 3))
        .unwrap();
    let aggregator = guardian_core::Aggregator::new(engine.config());
    let evidence = match aggregator.aggregate(&key(), vec![s], at(3)) {
        Aggregation::Evidence(set) => set,
        Aggregation::NoEvidence => panic!("expected evidence"),
    };

    let err = engine
        .lifecycle()
        .open(&evidence, Default::default(), at(3))
        .unwrap_err();
    assert_eq!(
        err,
        GateError::ConflictingActiveCase {
            key: key(),
            active_case: case_id,
        }
    );
    assert_eq!(engine.cases().unwrap().len(), 1);
}

#[tokio::test]
async fn test_patch_without_canary_is_blocked() {
    let engine = engine();
    let evaluation = ingest(&engine, signal("web-perf", Severity::Warn, 0.6, 0), at(0)).await;

    assert!(evaluation.opened);
    assert_eq!(
        evaluation.outcome,
        EvaluationOutcome::Blocked {
            constraint: Constraint::CanaryRequired
        }
    );
    let case = evaluation.case.unwrap();
    assert_eq!(case.policy_gate, PolicyGate::Green);
    assert_eq!(case.recommended_action, RecommendedAction::HumanReview);
    assert!(case.history.is_empty());
    assert_eq!(case.rejections[0].attempted_action, RecommendedAction::ProposePatch);
}

#[tokio::test]
async fn test_patch_with_canary_evidence_commits() {
    let engine = engine();
    let quiet = ingest(&engine, signal("canary", Severity::Info, 0.1, 0), at(0)).await;
    assert_eq!(quiet.outcome, EvaluationOutcome::BelowBaseline);

    let evaluation = ingest(&engine, signal("web-perf", Severity::Warn, 0.6, 1), at(1)).await;
    let record = evaluation.record().unwrap();
    assert_eq!(record.to_gate, PolicyGate::Yellow);
    assert_eq!(record.to_action, RecommendedAction::ProposePatch);
    assert_eq!(record.evidence_ids.len(), 2);
}

#[tokio::test]
async fn test_duplicate_delivery_is_a_noop() {
    let engine = engine();
    let s = signal("error-rate", Severity::Fail, 0.9, 0);
    ingest(&engine, s.clone(), at(0)).await;
    let before = engine.cases().unwrap();

    let outcome = engine.ingest_signal(s.clone(), at(5)).await.unwrap();
    assert!(matches!(outcome, IngestOutcome::Duplicate { .. }));
    assert_eq!(engine.cases().unwrap(), before);
    assert_eq!(engine.store().len(), 1);
}

#[tokio::test]
async fn test_malformed_payload_never_stored() {
    let engine = engine();
    let mut payload = SignalPayload::from(&signal("web-perf", Severity::Warn, 0.5, 0));
    payload.system.as_mut().unwrap().env = None;

    let err = engine.ingest_at(payload, at(0)).await.unwrap_err();
    assert_eq!(err.field(), Some("system.env"));
    assert!(engine.store().is_empty());
}

#[tokio::test]
async fn test_new_evidence_makes_staged_review_stale() {
    let engine = engine();
    let case_id = open_red_case(&engine).await;

    engine
        .lifecycle()
        .propose(
            &case_id,
            TransitionRequest::review("sre-lead", PolicyGate::Yellow, RecommendedAction::ProposePatch, true),
            at(3),
        )
        .unwrap();

    let late = ingest(&engine, signal("error-rate", Severity::Warn, 0.4, 4), at(4)).await;
    assert_eq!(late.outcome, EvaluationOutcome::Unchanged);

    let err = engine.lifecycle().commit(&case_id, at(5)).unwrap_err();
    assert!(matches!(err, GateError::StaleProposal { .. }));
    let case = engine.lifecycle().get(&case_id).unwrap();
    assert_eq!(case.policy_gate, PolicyGate::Red);
    assert!(case.proposed_transition.is_none());
}

#[tokio::test]
async fn test_red_is_parked_until_reviewed() {
    let engine = engine();
    let case_id = open_red_case(&engine).await;

    // Low-tension evidence arriving later does not lower red on its own
    for minute in 10..14 {
        let evaluation = ingest(&engine, signal("error-rate", Severity::Info, 0.05, minute), at(minute)).await;
        assert_eq!(evaluation.outcome, EvaluationOutcome::Unchanged);
    }

    let refused = engine
        .submit_review(
            &case_id,
            Review {
                reviewer: "sre-lead".to_string(),
                gate: PolicyGate::Green,
                action: RecommendedAction::Observe,
                approve: false,
                intent: None,
            },
            at(20),
        )
        .await
        .unwrap_err();
    assert_eq!(refused.constraint(), Some(Constraint::HumanSeniority));

    let outcome = engine
        .submit_review(
            &case_id,
            Review::approve("sre-lead", PolicyGate::Yellow, RecommendedAction::HumanReview),
            at(21),
        )
        .await
        .unwrap();
    assert_eq!(outcome.case.policy_gate, PolicyGate::Yellow);
    assert!(outcome.case.red_exits_reviewed());

    // Re-evaluating the same evidence keeps the reviewer's decision
    let results = engine.reevaluate_all(at(22)).await;
    let evaluation = results[0].1.as_ref().unwrap();
    assert_eq!(evaluation.outcome, EvaluationOutcome::Unchanged);
    assert_eq!(
        engine.lifecycle().get(&case_id).unwrap().policy_gate,
        PolicyGate::Yellow
    );
}

#[tokio::test]
async fn test_reviewer_cannot_act_on_unparked_case() {
    let engine = engine();
    ingest(&engine, signal("canary", Severity::Info, 0.1, 0), at(0)).await;
    let evaluation = ingest(&engine, signal("web-perf", Severity::Warn, 0.6, 1), at(1)).await;
    let case_id = evaluation.case_id.unwrap();

    let err = engine
        .submit_review(
            &case_id,
            Review::approve("sre", PolicyGate::Green, RecommendedAction::Observe),
            at(2),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, GateError::Unauthorized { .. }));
}

#[tokio::test]
async fn test_rollback_requires_successful_canary() {
    let engine = engine();
    let case_id = open_red_case(&engine).await;

    let err = engine
        .submit_review(
            &case_id,
            Review::approve("sre", PolicyGate::Red, RecommendedAction::Rollback),
            at(5),
        )
        .await
        .unwrap_err();
    assert_eq!(err.constraint(), Some(Constraint::ReversibilityFirst));

    ingest(&engine, signal("canary", Severity::Info, 0.2, 6), at(6)).await;

    let outcome = engine
        .submit_review(
            &case_id,
            Review::approve("sre", PolicyGate::Red, RecommendedAction::Rollback),
            at(7),
        )
        .await
        .unwrap();
    assert_eq!(outcome.record.to_action, RecommendedAction::Rollback);
    assert_eq!(outcome.case.policy_gate, PolicyGate::Red);
}

#[tokio::test]
async fn test_stale_signals_do_not_open_cases() {
    let engine = engine();
    let evaluation = ingest(
        &engine,
        signal("error-rate", Severity::Fail, 0.95, 0),
        at(0) + Duration::days(2),
    )
    .await;
    assert_eq!(evaluation.outcome, EvaluationOutcome::NoEvidence);
    assert!(engine.cases().unwrap().is_empty());
    assert_eq!(engine.store().len(), 1);
}

#[tokio::test]
async fn test_closed_case_frees_key_for_next_case() {
    let engine = engine();
    let first = open_red_case(&engine).await;
    let closed = engine.close_case(&first, "incident-commander", at(30)).await.unwrap();
    assert_eq!(
        closed.close_reason,
        Some(CloseReason::Human {
            reviewer: "incident-commander".to_string()
        })
    );

    let fresh = signal("error-rate", Severity::Fail, 0.7, 31);
    let fresh_id = fresh.id;
    let evaluation = ingest(&engine, fresh, at(31)).await;
    assert!(evaluation.opened);
    assert_ne!(evaluation.case_id, Some(first));
    assert_eq!(evaluation.evidence_ids, vec![fresh_id]);
    assert_eq!(engine.lifecycle().active_keys(), vec![key()]);
    assert_eq!(engine.cases().unwrap().len(), 2);

    let second = engine.lifecycle().get(&evaluation.case_id.unwrap()).unwrap();
    let linked: Vec<Uuid> = second.signals.iter().map(|l| l.signal_id).collect();
    assert_eq!(linked, vec![fresh_id]);
}

#[tokio::test]
async fn test_closed_case_evidence_does_not_reopen() {
    let engine = engine();
    let first = open_red_case(&engine).await;
    engine.close_case(&first, "incident-commander", at(30)).await.unwrap();
    let old_ids: Vec<Uuid> = engine
        .lifecycle()
        .get(&first)
        .unwrap()
        .signals
        .iter()
        .map(|l| l.signal_id)
        .collect();

    let noise = signal("error-rate", Severity::Info, 0.05, 31);
    let noise_id = noise.id;
    let evaluation = ingest(&engine, noise, at(31)).await;
    assert_eq!(evaluation.outcome, EvaluationOutcome::BelowBaseline);
    assert!(!evaluation.opened);
    assert_eq!(evaluation.case_id, None);
    assert_eq!(evaluation.evidence_ids, vec![noise_id]);
    assert!(engine.lifecycle().active_keys().is_empty());
    assert_eq!(engine.cases().unwrap().len(), 1);

    let warn = signal("error-rate", Severity::Warn, 0.5, 32);
    let warn_id = warn.id;
    let evaluation = ingest(&engine, warn, at(32)).await;
    assert!(evaluation.opened);
    let second = engine.lifecycle().get(&evaluation.case_id.unwrap()).unwrap();
    let linked: Vec<Uuid> = second.signals.iter().map(|l| l.signal_id).collect();
    assert_eq!(linked.len(), 2);
    assert!(linked.contains(&noise_id));
    assert!(linked.contains(&warn_id));
    assert!(old_ids.iter().all(|id| !linked.contains(id)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_ingestion_keeps_one_case_per_key() {
    let engine = Arc::new(engine());
    let systems = ["checkout", "search", "catalog", "payments"];

    let mut handles = Vec::new();
    for (i, system) in systems.iter().enumerate() {
        for n in 0..10 {
            let engine = Arc::clone(&engine);
            let s = signal_for(system, "error-rate", Severity::Fail, 0.5 + n as f64 / 50.0, n);
            handles.push(tokio::spawn(async move {
                engine.ingest_signal(s, at(20 + i as i64)).await
            }));
        }
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let cases = engine.cases().unwrap();
    assert_eq!(cases.len(), systems.len());
    for case in &cases {
        assert_eq!(case.signals.len(), 10);
        assert_eq!(case.policy_gate, PolicyGate::Red);
    }
    assert_eq!(engine.store().len(), 40);
}
