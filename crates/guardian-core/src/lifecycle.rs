//! Care-Case lifecycle management
//!
//! The [`LifecycleManager`] is the only writer of care-case state. Each case
//! sits behind its own mutex; every mutation builds the next state from a
//! clone and swaps it in before the lock is released, so readers never see a
//! partially applied transition.

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

use crate::aggregator::EvidenceSet;
use crate::case::{
    derive_case_id, Actor, CareCase, CaseStatus, CloseReason, ProposedTransition,
    RejectionRecord, SignalLink, TransitionIntent, TransitionRecord,
};
use crate::constraints::{ConstraintEnforcer, ConstraintSet};
use crate::error::{GateError, Result};
use crate::gate::{PolicyGate, RecommendedAction};
use crate::signal::{Signal, SystemKey};
use crate::store::SignalStore;

/// Request to stage a transition
#[derive(Debug, Clone)]
pub struct TransitionRequest {
    pub gate: PolicyGate,
    pub action: RecommendedAction,
    pub actor: Actor,
    /// Explicit reviewer approval; only valid for human actors
    pub approve: bool,
    /// Evidence the request is based on; defaults to every linked signal
    pub evidence_ids: Option<Vec<Uuid>>,
    pub evidence_at: Option<DateTime<Utc>>,
    pub intent: Option<TransitionIntent>,
}

impl TransitionRequest {
    /// Transition proposed by the engine itself
    pub fn automatic(gate: PolicyGate, action: RecommendedAction) -> Self {
        Self {
            gate,
            action,
            actor: Actor::Engine,
            approve: false,
            evidence_ids: None,
            evidence_at: None,
            intent: None,
        }
    }

    /// Transition proposed by an authenticated reviewer
    pub fn review(
        reviewer: impl Into<String>,
        gate: PolicyGate,
        action: RecommendedAction,
        approve: bool,
    ) -> Self {
        Self {
            gate,
            action,
            actor: Actor::reviewer(reviewer),
            approve,
            evidence_ids: None,
            evidence_at: None,
            intent: None,
        }
    }

    pub fn with_evidence(mut self, ids: Vec<Uuid>, newest_at: DateTime<Utc>) -> Self {
        self.evidence_ids = Some(ids);
        self.evidence_at = Some(newest_at);
        self
    }

    pub fn with_intent(mut self, intent: TransitionIntent) -> Self {
        self.intent = Some(intent);
        self
    }
}

/// Result of linking signals to a case
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkReport {
    pub newly_linked: Vec<Uuid>,
    pub already_linked: usize,
    pub evidence_revision: u64,
}

/// Result of a successful commit
#[derive(Debug, Clone)]
pub struct CommitOutcome {
    pub record: TransitionRecord,
    pub case: CareCase,
}

/// Owns creation, mutation and transition history of care-cases
pub struct LifecycleManager {
    store: SignalStore,
    enforcer: Arc<ConstraintEnforcer>,
    cases: DashMap<Uuid, Arc<Mutex<CareCase>>>,
    active: DashMap<SystemKey, Uuid>,
    /// signal id -> case that linked it first
    owners: DashMap<Uuid, Uuid>,
}

impl LifecycleManager {
    pub fn new(store: SignalStore, enforcer: Arc<ConstraintEnforcer>) -> Self {
        Self {
            store,
            enforcer,
            cases: DashMap::new(),
            active: DashMap::new(),
            owners: DashMap::new(),
        }
    }

    fn slot(&self, case_id: &Uuid) -> Result<Arc<Mutex<CareCase>>> {
        self.cases
            .get(case_id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| GateError::case_not_found(*case_id))
    }

    fn resolve_signals(&self, ids: &[Uuid]) -> Result<Vec<Arc<Signal>>> {
        ids.iter().map(|id| self.store.get(id)).collect()
    }

    fn first_free_id(&self, opening: Uuid) -> Uuid {
        let mut id = derive_case_id(opening);
        let mut generation = 1u32;
        while self.cases.contains_key(&id) {
            id = Uuid::new_v5(
                &Uuid::nil(),
                format!("carecase:{}:{}", opening, generation).as_bytes(),
            );
            generation += 1;
        }
        id
    }

    /// Open a case for the evidence set's system key and link the evidence.
    ///
    /// Fails with `ConflictingActiveCase` while another case is active for
    /// the key.
    pub fn open(
        &self,
        evidence: &EvidenceSet,
        constraints: ConstraintSet,
        now: DateTime<Utc>,
    ) -> Result<CareCase> {
        let opening = evidence
            .dominant()
            .cloned()
            .ok_or_else(|| GateError::validation("initial_evidence", "evidence set is empty"))?;
        if let Some(foreign) = evidence.signals.iter().find(|s| s.key() != evidence.key) {
            return Err(GateError::validation(
                "initial_evidence",
                format!("signal {} belongs to {}, not {}", foreign.id, foreign.key(), evidence.key),
            ));
        }

        match self.active.entry(evidence.key.clone()) {
            Entry::Occupied(existing) => Err(GateError::ConflictingActiveCase {
                key: evidence.key.clone(),
                active_case: *existing.get(),
            }),
            Entry::Vacant(slot) => {
                let mut case = CareCase::new(&opening, constraints, now);
                case.id = self.first_free_id(opening.id);
                case.tension = evidence.aggregate_tension;
                for signal in &evidence.signals {
                    case.signals.push(SignalLink {
                        signal_id: signal.id,
                        linked_at: now,
                        snapshot: Some(signal.snapshot()),
                    });
                }
                case.evidence_revision = 1;
                case.green_since = Some(now);

                let snapshot = case.clone();
                self.cases.insert(case.id, Arc::new(Mutex::new(case)));
                slot.insert(snapshot.id);
                for link in &snapshot.signals {
                    self.owners.entry(link.signal_id).or_insert(snapshot.id);
                }

                tracing::info!(
                    case_id = %snapshot.id,
                    system = %evidence.key,
                    signals = snapshot.signals.len(),
                    tension = snapshot.tension,
                    "Care-case opened"
                );
                Ok(snapshot)
            }
        }
    }

    /// Link signals to a case. Re-linking an already linked id is a no-op.
    pub fn link(&self, case_id: &Uuid, signal_ids: &[Uuid], now: DateTime<Utc>) -> Result<LinkReport> {
        let signals = self.resolve_signals(signal_ids)?;
        let slot = self.slot(case_id)?;
        let mut case = slot.lock()?;

        if !case.is_active() {
            return Err(GateError::CaseClosed(*case_id));
        }
        let key = case.key();
        if let Some(foreign) = signals.iter().find(|s| s.key() != key) {
            return Err(GateError::validation(
                "signal_ids",
                format!("signal {} belongs to {}, not {}", foreign.id, foreign.key(), key),
            ));
        }

        let mut newly_linked = Vec::new();
        let mut already_linked = 0;
        for signal in signals {
            if case.is_linked(&signal.id) || newly_linked.contains(&signal.id) {
                already_linked += 1;
                continue;
            }
            newly_linked.push(signal.id);
            case.signals.push(SignalLink {
                signal_id: signal.id,
                linked_at: now,
                snapshot: Some(signal.snapshot()),
            });
        }
        for id in &newly_linked {
            self.owners.entry(*id).or_insert(*case_id);
        }
        if !newly_linked.is_empty() {
            case.evidence_revision += 1;
            case.updated_at = now;
            tracing::debug!(
                case_id = %case_id,
                linked = newly_linked.len(),
                revision = case.evidence_revision,
                "Signals linked"
            );
        }

        Ok(LinkReport {
            newly_linked,
            already_linked,
            evidence_revision: case.evidence_revision,
        })
    }

    /// Case a signal was first linked to, if any
    pub fn owner_of(&self, signal_id: &Uuid) -> Option<Uuid> {
        self.owners.get(signal_id).map(|entry| *entry.value())
    }

    /// Record the aggregate tension of the latest evaluation
    pub fn note_tension(&self, case_id: &Uuid, tension: f64, now: DateTime<Utc>) -> Result<()> {
        let slot = self.slot(case_id)?;
        let mut case = slot.lock()?;
        if case.is_active() {
            case.tension = tension;
            case.updated_at = now;
        }
        Ok(())
    }

    /// Set the root-cause hypothesis of an open case
    pub fn set_hypothesis(&self, case_id: &Uuid, hypothesis: impl Into<String>) -> Result<()> {
        let slot = self.slot(case_id)?;
        let mut case = slot.lock()?;
        if !case.is_active() {
            return Err(GateError::CaseClosed(*case_id));
        }
        case.root_cause_hypothesis = Some(hypothesis.into());
        Ok(())
    }

    /// Stage a transition without committing it.
    ///
    /// Reviewers may only propose while the case is parked in
    /// `human_review`; `rollback` and approvals are reserved for reviewers.
    pub fn propose(
        &self,
        case_id: &Uuid,
        request: TransitionRequest,
        now: DateTime<Utc>,
    ) -> Result<ProposedTransition> {
        let slot = self.slot(case_id)?;
        let mut case = slot.lock()?;

        if !case.is_active() {
            return Err(GateError::CaseClosed(*case_id));
        }

        match &request.actor {
            Actor::HumanReviewer { id } => {
                if id.trim().is_empty() {
                    return Err(GateError::unauthorized("reviewer id is empty"));
                }
                if case.recommended_action != RecommendedAction::HumanReview {
                    return Err(GateError::unauthorized(format!(
                        "case {} is not awaiting human review (action is {})",
                        case_id, case.recommended_action
                    )));
                }
            }
            Actor::Engine => {
                if request.approve {
                    return Err(GateError::unauthorized("the engine cannot approve its own transition"));
                }
                if request.action == RecommendedAction::Rollback {
                    return Err(GateError::unauthorized(
                        "rollback can only be proposed by a reviewer",
                    ));
                }
            }
        }

        let evidence_ids = match request.evidence_ids {
            Some(ids) => {
                if let Some(unlinked) = ids.iter().find(|id| !case.is_linked(id)) {
                    return Err(GateError::validation(
                        "evidence_ids",
                        format!("signal {} is not linked to case {}", unlinked, case_id),
                    ));
                }
                ids
            }
            None => case.linked_ids(),
        };
        let evidence_at = match request.evidence_at {
            Some(at) => Some(at),
            None => self
                .resolve_signals(&evidence_ids)?
                .iter()
                .map(|s| s.timestamp)
                .max(),
        };

        let mut proposal = ProposedTransition::new(
            request.gate,
            request.action,
            request.actor,
            evidence_ids,
            case.evidence_revision,
            now,
        );
        proposal.human_approved = request.approve;
        proposal.evidence_at = evidence_at;
        proposal.intent = request.intent;

        if let Some(previous) = &case.proposed_transition {
            tracing::debug!(
                case_id = %case_id,
                replaced_by = %proposal.proposed_by,
                previous_by = %previous.proposed_by,
                "Staged transition replaced"
            );
        }
        case.proposed_transition = Some(proposal.clone());
        case.updated_at = now;
        Ok(proposal)
    }

    /// Apply the staged transition if the constraint enforcer approves it now.
    ///
    /// On a stale proposal the stage is dropped and `StaleProposal` returned.
    /// On a violation the gate is left as is, the action is forced to
    /// `human_review`, and `ConstraintViolation` names the failing constraint.
    pub fn commit(&self, case_id: &Uuid, now: DateTime<Utc>) -> Result<CommitOutcome> {
        let slot = self.slot(case_id)?;
        let mut case = slot.lock()?;

        if !case.is_active() {
            return Err(GateError::CaseClosed(*case_id));
        }
        let staged = case
            .proposed_transition
            .clone()
            .ok_or(GateError::NoStagedTransition(*case_id))?;

        if staged.evidence_revision != case.evidence_revision {
            let err = GateError::StaleProposal {
                case_id: *case_id,
                staged_revision: staged.evidence_revision,
                current_revision: case.evidence_revision,
            };
            tracing::warn!(case_id = %case_id, error = %err, "Stale proposal dropped");
            case.proposed_transition = None;
            return Err(err);
        }

        let evidence = self.resolve_signals(&staged.evidence_ids)?;
        let linked = self.resolve_signals(&case.linked_ids())?;

        let mut next = case.clone();
        next.proposed_transition = None;
        next.updated_at = now;

        if let Err(violation) = self.enforcer.enforce(&case, &staged, &evidence, &linked) {
            tracing::warn!(
                case_id = %case_id,
                constraint = %violation.constraint,
                reason = %violation.reason,
                gate = %case.policy_gate,
                attempted_gate = %staged.target_gate,
                attempted_action = %staged.target_action,
                "Transition blocked by constraint"
            );
            next.recommended_action = RecommendedAction::HumanReview;
            next.rejections.push(RejectionRecord {
                rejected_at: now,
                constraint: violation.constraint,
                reason: violation.reason,
                attempted_gate: staged.target_gate,
                attempted_action: staged.target_action,
                actor: staged.proposed_by,
            });
            *case = next;
            return Err(GateError::ConstraintViolation {
                case_id: *case_id,
                constraint: violation.constraint,
            });
        }

        let record = TransitionRecord {
            sequence: case.history.len() as u64 + 1,
            from_gate: case.policy_gate,
            to_gate: staged.target_gate,
            from_action: case.recommended_action,
            to_action: staged.target_action,
            committed_at: now,
            evidence_ids: staged.evidence_ids.clone(),
            actor: staged.proposed_by.clone(),
            human_approved: staged.human_approved,
        };

        next.policy_gate = staged.target_gate;
        next.recommended_action = staged.target_action;
        next.decided_at = staged.evidence_at.or(Some(now));
        next.green_since = match (record.to_gate, case.green_since) {
            (PolicyGate::Green, Some(since)) if record.from_gate == PolicyGate::Green => Some(since),
            (PolicyGate::Green, _) => Some(now),
            _ => None,
        };
        next.history.push(record.clone());
        *case = next;

        tracing::info!(
            case_id = %case_id,
            from_gate = %record.from_gate,
            gate = %record.to_gate,
            action = %record.to_action,
            actor = %record.actor,
            "Transition committed"
        );

        Ok(CommitOutcome {
            record,
            case: case.clone(),
        })
    }

    /// Close a case; it stops accepting links and transitions and frees its
    /// system key for a new case.
    pub fn close(&self, case_id: &Uuid, reason: CloseReason, now: DateTime<Utc>) -> Result<CareCase> {
        let slot = self.slot(case_id)?;
        let mut case = slot.lock()?;

        if !case.is_active() {
            return Err(GateError::CaseClosed(*case_id));
        }
        if let CloseReason::Human { reviewer } = &reason {
            if reviewer.trim().is_empty() {
                return Err(GateError::unauthorized("reviewer id is empty"));
            }
        }

        case.status = CaseStatus::Closed;
        case.closed_at = Some(now);
        case.close_reason = Some(reason);
        case.proposed_transition = None;
        case.updated_at = now;

        let key = case.key();
        self.active.remove_if(&key, |_, active| active == case_id);

        tracing::info!(
            case_id = %case_id,
            system = %key,
            gate = %case.policy_gate,
            reason = ?case.close_reason,
            "Care-case closed"
        );
        Ok(case.clone())
    }

    /// Snapshot of a case
    pub fn get(&self, case_id: &Uuid) -> Result<CareCase> {
        let slot = self.slot(case_id)?;
        let case = slot.lock()?;
        Ok(case.clone())
    }

    /// Snapshot of the active case for a key
    pub fn active_case(&self, key: &SystemKey) -> Result<Option<CareCase>> {
        let id = match self.active.get(key) {
            Some(entry) => *entry.value(),
            None => return Ok(None),
        };
        self.get(&id).map(Some)
    }

    /// Keys that currently have an active case
    pub fn active_keys(&self) -> Vec<SystemKey> {
        let mut keys: Vec<_> = self.active.iter().map(|e| e.key().clone()).collect();
        keys.sort();
        keys
    }

    /// Snapshots of every case, oldest first
    pub fn cases(&self) -> Result<Vec<CareCase>> {
        let slots: Vec<_> = self.cases.iter().map(|e| Arc::clone(e.value())).collect();
        let mut cases = slots
            .iter()
            .map(|slot| slot.lock().map(|c| c.clone()).map_err(GateError::from))
            .collect::<Result<Vec<_>>>()?;
        cases.sort_by_key(|c| (c.created_at, c.id));
        Ok(cases)
    }

    pub fn store(&self) -> &SignalStore {
        &self.store
    }
}
