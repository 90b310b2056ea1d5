//! Issue rendering for care-case documents

use crate::contracts::CareCaseDocument;
use crate::error::{AgentError, Result};

pub fn issue_title(doc: &CareCaseDocument) -> String {
    format!("Care-Case ({}): {}", doc.policy_gate, doc.summary)
}

/// Markdown issue body. Ends with the full document as pretty JSON.
pub fn issue_body(doc: &CareCaseDocument) -> Result<String> {
    let json = serde_json::to_string_pretty(doc)
        .map_err(|e| AgentError::SerializationError(e.to_string()))?;

    let mut lines = vec![
        format!(
            "**System:** `{}`  \n**Env:** `{}`  \n**Version:** `{}`",
            doc.system.name, doc.system.env, doc.system.version
        ),
        String::new(),
        format!("**Policy gate:** `{}`", doc.policy_gate),
        format!("**Recommended action:** `{}`", doc.recommended_action),
        format!("**Tension:** `{}`", doc.tension),
        String::new(),
    ];

    if !doc.signals.is_empty() {
        lines.push("**Signals:**".to_string());
        lines.extend(doc.signals.iter().map(|s| format!("- `{}`", s.signal_id)));
        lines.push(String::new());
    }

    if !doc.constraints.is_empty() {
        lines.push("**Constraints:**".to_string());
        lines.extend(doc.constraints.iter().map(|c| format!("- `{}`", c)));
        lines.push(String::new());
    }

    if let Some(hypothesis) = &doc.root_cause_hypothesis {
        lines.push("**Root-cause hypothesis (not a fact):**".to_string());
        lines.push(hypothesis.clone());
        lines.push(String::new());
    }

    if let Some(pt) = &doc.proposed_transition {
        lines.push("**Proposed transition (intent):**".to_string());
        lines.push(format!("- intent: {}", pt.intent));
        lines.push(format!("- scope: {}", pt.scope));
        lines.push(format!("- reversibility: {}", pt.reversibility));
        if !pt.verification.is_empty() {
            lines.push("- verification:".to_string());
            lines.extend(pt.verification.iter().map(|v| format!("  - {}", v)));
        }
        lines.push(String::new());
    }

    lines.push("```json".to_string());
    lines.push(json);
    lines.push("```".to_string());
    Ok(lines.join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::playbook;
    use chrono::{TimeZone, Utc};
    use guardian_core::{
        default_constraints, CareCase, PolicyGate, RecommendedAction, Severity, Signal,
        SignalLink, SystemRef,
    };
    use uuid::Uuid;

    fn document(with_playbook: bool) -> CareCaseDocument {
        let opening = Signal {
            schema_version: "0.1".to_string(),
            id: Uuid::parse_str("5c1d7e2a-8f43-4b8e-9a51-3e2f6b0c9d14").unwrap(),
            timestamp: Utc.with_ymd_and_hms(2026, 2, 11, 14, 5, 0).unwrap(),
            source: "lighthouse-ci".to_string(),
            severity: Severity::Warn,
            tension: 0.58,
            system: SystemRef::new("docs-portal", "prod", "1.12.0"),
            kind: "web-perf".to_string(),
            summary: "LCP 4.1s on /pricing".to_string(),
            details: None,
            trace_ref: None,
            links: Vec::new(),
        };
        let mut case = CareCase::new(
            &opening,
            default_constraints(PolicyGate::Yellow, &opening.kind),
            opening.timestamp,
        );
        case.signals.push(SignalLink {
            signal_id: opening.id,
            linked_at: opening.timestamp,
            snapshot: Some(opening.snapshot()),
        });
        case.policy_gate = PolicyGate::Yellow;
        case.recommended_action = RecommendedAction::ProposePatch;

        let mut doc = CareCaseDocument::from_case(&case, None);
        if with_playbook {
            playbook::apply(&case, None, &mut doc);
        }
        doc
    }

    #[test]
    fn test_issue_title() {
        assert_eq!(
            issue_title(&document(false)),
            "Care-Case (yellow): LCP 4.1s on /pricing"
        );
    }

    #[test]
    fn test_issue_body_sections() {
        let body = issue_body(&document(true)).unwrap();

        assert!(body.starts_with(
            "**System:** `docs-portal`  \n**Env:** `prod`  \n**Version:** `1.12.0`"
        ));
        assert!(body.contains("**Policy gate:** `yellow`"));
        assert!(body.contains("**Recommended action:** `propose_patch`"));
        assert!(body.contains("**Tension:** `0.58`"));
        assert!(body.contains("- `5c1d7e2a-8f43-4b8e-9a51-3e2f6b0c9d14`"));
        assert!(body.contains("- `canary-required`"));
        assert!(body.contains("**Root-cause hypothesis (not a fact):**"));
        assert!(body.contains("- reversibility: reversible"));
        assert!(body.contains("  - Lighthouse LCP within budget"));
        assert!(body.ends_with("```"));
    }

    #[test]
    fn test_issue_body_without_optional_sections() {
        let body = issue_body(&document(false)).unwrap();
        assert!(!body.contains("Root-cause hypothesis"));
        assert!(!body.contains("Proposed transition"));
        assert!(body.contains("```json\n{"));
    }
}
