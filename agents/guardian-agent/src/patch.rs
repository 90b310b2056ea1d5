//! Patch proposals for reversible care-cases
//!
//! A proposal is a markdown file at `guardian/patches/<case_id>.md`. Only
//! open, below-red `propose_patch` cases whose proposed transition is
//! reversible get one; [`check_patch`] validates a proposal before review.

use regex::Regex;
use std::sync::OnceLock;
use uuid::Uuid;

use guardian_core::{CaseStatus, PolicyGate, RecommendedAction, Reversibility};

use crate::contracts::CareCaseDocument;

pub const PATCH_DIR: &str = "guardian/patches";

const REQUIRED_SECTIONS: [&str; 4] = [
    "# Guardian Patch Proposal",
    "## Root cause hypothesis",
    "## Suggested patch steps",
    "## Verification checklist",
];

fn patch_path_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^guardian/patches/([0-9a-fA-F-]{36})\.md$").expect("valid patch path regex")
    })
}

fn branch_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^guardian/[0-9a-fA-F-]{36}$").expect("valid branch regex"))
}

/// Whether a document may receive a patch proposal
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Eligibility {
    Eligible,
    NotEligible(String),
}

impl Eligibility {
    pub fn is_eligible(&self) -> bool {
        matches!(self, Eligibility::Eligible)
    }
}

pub fn eligibility(doc: &CareCaseDocument) -> Eligibility {
    if doc.status != CaseStatus::Open {
        return Eligibility::NotEligible("case is closed".to_string());
    }
    if doc.policy_gate == PolicyGate::Red {
        return Eligibility::NotEligible("red cases go to human review".to_string());
    }
    if doc.recommended_action != RecommendedAction::ProposePatch {
        return Eligibility::NotEligible(format!(
            "recommended action is {}, not propose_patch",
            doc.recommended_action
        ));
    }
    match &doc.proposed_transition {
        Some(t) if t.reversibility == Reversibility::Reversible => Eligibility::Eligible,
        Some(_) => Eligibility::NotEligible("proposed transition is irreversible".to_string()),
        None => Eligibility::NotEligible("no proposed transition".to_string()),
    }
}

pub fn patch_path(case_id: &Uuid) -> String {
    format!("{}/{}.md", PATCH_DIR, case_id)
}

pub fn branch_name(case_id: &Uuid) -> String {
    format!("guardian/{}", case_id)
}

fn checklist(doc: &CareCaseDocument) -> String {
    let items: Vec<String> = doc
        .proposed_transition
        .iter()
        .flat_map(|t| t.verification.iter())
        .map(|item| format!("- [ ] {}", item))
        .collect();
    if items.is_empty() {
        "- [ ] Add verification steps".to_string()
    } else {
        items.join("\n")
    }
}

fn signal_lines(doc: &CareCaseDocument) -> String {
    if doc.signals.is_empty() {
        return "- (none)".to_string();
    }
    doc.signals
        .iter()
        .map(|s| format!("- {}", s.signal_id))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Markdown body of `guardian/patches/<case_id>.md`
pub fn patch_markdown(doc: &CareCaseDocument) -> String {
    format!(
        "# Guardian Patch Proposal ({id})\n\n\
         ## Root cause hypothesis\n\
         {hypothesis}\n\n\
         ## Suggested patch steps (generic web perf)\n\
         1. Audit critical rendering path (hero images, fonts, blocking scripts).\n\
         2. Defer or async non-critical scripts; ensure bundles are split appropriately.\n\
         3. Optimize images (proper sizing, modern formats, preload hero assets).\n\
         4. Reduce server response time (cache headers, CDN, origin optimization).\n\n\
         ## Signals\n\
         {signals}\n\n\
         ## Verification checklist\n\
         {checklist}\n",
        id = doc.id,
        hypothesis = doc.root_cause_hypothesis.as_deref().unwrap_or("TBD"),
        signals = signal_lines(doc),
        checklist = checklist(doc),
    )
}

pub fn pr_title(doc: &CareCaseDocument) -> String {
    format!("Guardian proposed patch: {}", doc.id)
}

pub fn pr_body(doc: &CareCaseDocument) -> String {
    let (intent, scope, reversibility) = match &doc.proposed_transition {
        Some(t) => (t.intent.clone(), t.scope.clone(), t.reversibility.to_string()),
        None => ("TBD".to_string(), "TBD".to_string(), "TBD".to_string()),
    };
    format!(
        "## Guardian Proposed Patch ({gate})\n\n\
         **Care-Case:** `{id}`\n\
         **Gate:** `{gate}`\n\
         **Action:** `{action}`\n\
         **Tension:** `{tension}`\n\n\
         ### Signals\n\
         {signals}\n\n\
         ### Proposed transition\n\
         - intent: {intent}\n\
         - scope: {scope}\n\
         - reversibility: {reversibility}\n\n\
         ### Verification checklist\n\
         {checklist}\n",
        gate = doc.policy_gate,
        id = doc.id,
        action = doc.recommended_action,
        tension = doc.tension,
        signals = signal_lines(doc),
        checklist = checklist(doc),
    )
}

/// Case id named by a proposal path, if the path follows the naming scheme.
/// Absolute paths are matched from their `guardian/patches/` component.
pub fn case_id_from_path(path: &str) -> Option<String> {
    let normalized = path.replace('\\', "/");
    let relative = normalized
        .rfind("guardian/patches/")
        .map(|i| &normalized[i..])
        .unwrap_or(&normalized);
    patch_path_re()
        .captures(relative)
        .map(|caps| caps[1].to_string())
}

pub fn check_branch(branch: &str) -> Result<(), String> {
    if branch_re().is_match(branch) {
        Ok(())
    } else {
        Err(format!(
            "Guardian PR branch must match 'guardian/<case_uuid>'. Got: {}",
            branch
        ))
    }
}

/// Problems with a proposal file; empty when it passes
pub fn check_patch(path: &str, content: &str) -> Vec<String> {
    let Some(case_id) = case_id_from_path(path) else {
        return vec![format!(
            "{}: patch files must be named guardian/patches/<case_id>.md",
            path
        )];
    };
    if content.trim().is_empty() {
        return vec![format!("{}: file missing or unreadable", path)];
    }

    let mut errors: Vec<String> = REQUIRED_SECTIONS
        .iter()
        .filter(|section| !content.contains(*section))
        .map(|section| format!("{}: missing section marker: {}", path, section))
        .collect();

    if !content.to_lowercase().contains(&case_id.to_lowercase()) {
        errors.push(format!("{}: does not mention case id {}", path, case_id));
    }
    if !content.contains("- [ ]") {
        errors.push(format!(
            "{}: verification checklist has no checkboxes ('- [ ] ...')",
            path
        ));
    }
    errors
}
