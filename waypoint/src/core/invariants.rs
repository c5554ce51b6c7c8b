//! Cross-document invariants between the State pointer, its issues, and the Plan.
//!
//! Read-only: findings are returned, documents are never touched. In
//! non-strict mode every finding is a warning; strict mode promotes them to
//! errors. Parse diagnostics are always warnings.

use std::collections::HashSet;

use serde::Serialize;

use crate::core::graph::CheckpointGraph;
use crate::doc::plan::PlanDocument;
use crate::doc::state::StateDocument;
use crate::doc::{Diagnostic, DocKind, Location};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Warning,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FindingKind {
    Parse,
    PointerMismatch,
    ResolvedIssueActive,
    CheckpointOrder,
    WrongStage,
    StageOrder,
    Graph,
    MissingIssueField,
    DuplicateIssue,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Finding {
    pub kind: FindingKind,
    pub severity: Severity,
    pub location: Location,
    pub message: String,
}

impl std::fmt::Display for Finding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.location, self.message)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationReport {
    pub ok: bool,
    pub errors: Vec<Finding>,
    pub warnings: Vec<Finding>,
}

/// Everything the validator looks at, already parsed.
#[derive(Debug, Clone, Copy)]
pub struct ValidationInput<'a> {
    pub state: &'a StateDocument,
    pub plan: &'a PlanDocument,
    pub graph: &'a CheckpointGraph,
    pub diagnostics: &'a [Diagnostic],
}

pub fn validate(input: ValidationInput<'_>, strict: bool) -> ValidationReport {
    let mut findings = Vec::new();
    check_pointer(input, &mut findings);
    check_issues(input.state, &mut findings);
    check_plan_order(input.plan, &mut findings);
    for error in input.graph.errors() {
        findings.push((FindingKind::Graph, error.location(), error.to_string()));
    }

    let severity = if strict {
        Severity::Error
    } else {
        Severity::Warning
    };
    let mut report = ValidationReport {
        ok: true,
        errors: Vec::new(),
        warnings: input
            .diagnostics
            .iter()
            .map(|diagnostic| Finding {
                kind: FindingKind::Parse,
                severity: Severity::Warning,
                location: diagnostic.location.clone(),
                message: diagnostic.message.clone(),
            })
            .collect(),
    };
    for (kind, location, message) in findings {
        let finding = Finding {
            kind,
            severity,
            location,
            message,
        };
        match severity {
            Severity::Error => report.errors.push(finding),
            Severity::Warning => report.warnings.push(finding),
        }
    }
    report.ok = report.errors.is_empty();
    report
}

type RawFinding = (FindingKind, Location, String);

fn check_pointer(input: ValidationInput<'_>, findings: &mut Vec<RawFinding>) {
    let state = &input.state.state;
    let location = || Location::section(DocKind::State, "Current focus");
    let mut mismatch = |message: String| {
        findings.push((FindingKind::PointerMismatch, location(), message));
    };

    let Some(raw) = state.checkpoint.as_deref() else {
        if input.plan.entries().next().is_some() {
            mismatch("no current checkpoint is set".to_string());
        }
        return;
    };
    let Some(checkpoint) = state.checkpoint_id() else {
        mismatch(format!("current checkpoint '{raw}' is not a checkpoint id"));
        return;
    };

    match state.stage_id() {
        Some(stage) if stage != checkpoint.stage => mismatch(format!(
            "current stage {stage} does not match checkpoint {checkpoint}"
        )),
        Some(_) => {}
        None => mismatch(format!(
            "current stage '{}' is not a stage id",
            state.stage.as_deref().unwrap_or("")
        )),
    }

    if input.plan.find(&checkpoint).is_none() {
        mismatch(format!("current checkpoint {checkpoint} is not in the plan"));
    }
}

fn check_issues(state: &StateDocument, findings: &mut Vec<RawFinding>) {
    let mut seen = HashSet::new();
    for issue in &state.issues {
        let location = Location::line(DocKind::State, issue.span.0).with_section("Active issues");
        if !seen.insert(issue.id.as_str()) {
            findings.push((
                FindingKind::DuplicateIssue,
                location.clone(),
                format!("issue {} is listed more than once", issue.id),
            ));
        }
        if issue.is_resolved() {
            findings.push((
                FindingKind::ResolvedIssueActive,
                location.clone(),
                format!("issue {} is RESOLVED but still active", issue.id),
            ));
        }
        let missing = issue.missing_required_fields();
        if !missing.is_empty() {
            findings.push((
                FindingKind::MissingIssueField,
                location,
                format!("issue {} is missing {}", issue.id, missing.join(", ")),
            ));
        }
    }
}

fn check_plan_order(plan: &PlanDocument, findings: &mut Vec<RawFinding>) {
    let mut previous_stage = None;
    for stage in plan.stages() {
        let location = Location::line(DocKind::Plan, stage.span.0);
        if let Some(previous) = previous_stage
            && stage.id <= previous
        {
            findings.push((
                FindingKind::StageOrder,
                location,
                format!("stage {} appears after stage {previous}", stage.id),
            ));
        }
        previous_stage = Some(stage.id);

        let mut previous_minor: Option<u32> = None;
        for checkpoint in stage.checkpoints() {
            let location = Location::line(DocKind::Plan, checkpoint.span.0);
            if checkpoint.id.stage != stage.id {
                findings.push((
                    FindingKind::WrongStage,
                    location.clone(),
                    format!(
                        "checkpoint {} is listed under stage {}",
                        checkpoint.id, stage.id
                    ),
                ));
                continue;
            }
            if let Some(previous) = previous_minor
                && checkpoint.id.minor <= previous
            {
                findings.push((
                    FindingKind::CheckpointOrder,
                    location,
                    format!(
                        "checkpoint {} follows {}.{previous} out of order",
                        checkpoint.id, stage.id
                    ),
                ));
            }
            previous_minor = Some(checkpoint.id.minor);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PLAN: &str = "\
## Stage 1 — One

### (DONE) 1.0 — A
depends_on: []

### 1.1 — B
depends_on: [1.0]
";

    fn state(stage: &str, checkpoint: &str, issues: &str) -> StateDocument {
        let text = format!(
            "## Current focus\n\n- Stage: {stage}\n- Checkpoint: {checkpoint}\n- Status: IN_PROGRESS\n\n## Active issues\n\n{issues}"
        );
        StateDocument::parse(&text).model
    }

    fn run(state: &StateDocument, plan_text: &str, strict: bool) -> ValidationReport {
        let parsed = PlanDocument::parse(plan_text);
        let graph = CheckpointGraph::build(&parsed.model);
        validate(
            ValidationInput {
                state,
                plan: &parsed.model,
                graph: &graph,
                diagnostics: &parsed.diagnostics,
            },
            strict,
        )
    }

    fn kinds(findings: &[Finding]) -> Vec<FindingKind> {
        findings.iter().map(|finding| finding.kind).collect()
    }

    #[test]
    fn consistent_documents_pass_strict() {
        let report = run(&state("1", "1.1", ""), PLAN, true);
        assert!(report.ok, "{report:?}");
        assert!(report.warnings.is_empty());
    }

    #[test]
    fn pointer_mismatch_is_warning_unless_strict() {
        let doc = state("2", "1.1", "");
        let lenient = run(&doc, PLAN, false);
        assert!(lenient.ok);
        assert_eq!(kinds(&lenient.warnings), vec![FindingKind::PointerMismatch]);

        let strict = run(&doc, PLAN, true);
        assert!(!strict.ok);
        assert_eq!(kinds(&strict.errors), vec![FindingKind::PointerMismatch]);
    }

    #[test]
    fn checkpoint_missing_from_plan_is_reported() {
        let report = run(&state("1", "1.7", ""), PLAN, true);
        assert_eq!(report.errors.len(), 1);
        assert!(report.errors[0].message.contains("not in the plan"));
    }

    #[test]
    fn issue_findings_cover_resolved_missing_and_duplicates() {
        let issues = "\
- [ ] I-1: done already
  - Impact: MINOR
  - Status: RESOLVED
  - Owner: agent
  - Unblock Condition: n/a
  - Evidence Needed: n/a
- [ ] I-1: again
  - Impact: MAJOR
";
        let report = run(&state("1", "1.1", issues), PLAN, true);
        assert_eq!(
            kinds(&report.errors),
            vec![
                FindingKind::ResolvedIssueActive,
                FindingKind::DuplicateIssue,
                FindingKind::MissingIssueField,
            ]
        );
        assert_eq!(
            report.errors[2].message,
            "issue I-1 is missing Status, Owner, Unblock Condition, Evidence Needed"
        );
        assert_eq!(report.errors[2].location.to_string(), "STATE.md:15 (Active issues)");
    }

    #[test]
    fn plan_ordering_and_graph_errors_become_errors_in_strict_mode() {
        let plan = "\
## Stage 2 — Two

### 2.1 — X
depends_on: [2.0]

### 2.0 — Y
depends_on: [2.1]

### 3.0 — Misplaced
depends_on: [7.7]

## Stage 1 — One

### 1.0 — Z
depends_on: []
";
        let report = run(&state("2", "2.1", ""), plan, true);
        let found = kinds(&report.errors);
        assert!(found.contains(&FindingKind::CheckpointOrder));
        assert!(found.contains(&FindingKind::WrongStage));
        assert!(found.contains(&FindingKind::StageOrder));
        let cycle = report
            .errors
            .iter()
            .find(|finding| finding.message.starts_with("dependency cycle"))
            .expect("cycle reported");
        assert!(cycle.message.contains("2.1") && cycle.message.contains("2.0"));
        assert!(report
            .errors
            .iter()
            .any(|finding| finding.message.contains("unknown checkpoint 7.7")));
    }

    #[test]
    fn parse_diagnostics_stay_warnings_in_strict_mode() {
        let report = run(&state("1", "1.1", ""), "## Stage x\n", true);
        assert!(!report.ok);
        assert!(report.warnings.iter().all(|f| f.kind == FindingKind::Parse));
        assert_eq!(report.warnings.len(), 1);
    }
}
