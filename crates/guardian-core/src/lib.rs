//! Guardian policy gate decision engine
//!
//! Turns observational signals about a running software system into bounded,
//! auditable remediation decisions:
//!
//! - [`store`]: immutable signal storage indexed by system key and time
//! - [`aggregator`]: groups a key's active window into a scored evidence set
//! - [`resolver`]: maps evidence to a candidate policy gate and action
//! - [`constraints`]: declared rules a transition must pass before it commits
//! - [`lifecycle`]: owns care-cases, their links and their transition history
//! - [`engine`]: wires the above together behind per-key serialization
//!
//! # Example
//!
//! ```no_run
//! use guardian_core::{EngineConfig, GateEngine, SignalPayload};
//!
//! # async fn run(payload: SignalPayload) -> guardian_core::Result<()> {
//! let engine = GateEngine::new(EngineConfig::default())?;
//! let outcome = engine.ingest(payload).await?;
//! if let Some(evaluation) = outcome.evaluation() {
//!     println!("{:?}", evaluation.outcome);
//! }
//! # Ok(())
//! # }
//! ```

pub mod aggregator;
pub mod case;
pub mod config;
pub mod constraints;
pub mod engine;
pub mod error;
pub mod gate;
pub mod lifecycle;
pub mod resolver;
pub mod signal;
pub mod store;

pub use aggregator::{aggregate_tension, Aggregation, Aggregator, EvidenceSet};
pub use case::{
    derive_case_id, Actor, CareCase, CaseStatus, CloseReason, ProposedTransition,
    RejectionRecord, Reversibility, SignalLink, TransitionIntent, TransitionRecord,
    CARE_CASE_SCHEMA_VERSION,
};
pub use config::{EngineConfig, EngineConfigBuilder, GateThresholds, SeverityWeights};
pub use constraints::{
    default_constraints, Constraint, ConstraintEnforcer, ConstraintRule, ConstraintSet,
    NoSensitiveContent, SensitivityClassifier, TransitionContext, Violation,
};
pub use engine::{Evaluation, EvaluationOutcome, GateEngine, IngestOutcome, Review};
pub use error::{GateError, Result};
pub use gate::{PolicyGate, RecommendedAction};
pub use lifecycle::{CommitOutcome, LifecycleManager, LinkReport, TransitionRequest};
pub use resolver::{GateResolver, PriorGate, Resolution};
pub use signal::{
    Severity, Signal, SignalPayload, SignalSnapshot, SystemKey, SystemPayload, SystemRef,
    CANARY_KIND, SUPPORTED_SCHEMA_VERSIONS,
};
pub use store::{SignalCursor, SignalStore};
