//! Priority-ordered escalation triggers.
//!
//! Each trigger is a pure predicate over the parsed documents. [`escalate`]
//! folds over [`Trigger::PRIORITY`] and the first trigger that fires wins.

use serde::Serialize;

use crate::core::types::{Impact, Owner, Role, prompts};
use crate::doc::feedback::{FeedbackDocument, FeedbackEntry, most_severe};
use crate::doc::plan::PlanDocument;
use crate::doc::state::{ExecutionState, Issue};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Trigger {
    Blocker,
    MajorIssue,
    WorkLog,
    Retrospective,
    StageDesign,
    Maintenance,
    ContextCapture,
    ProcessImprovements,
}

/// What a firing trigger recommends instead of default routing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Firing {
    pub trigger: Trigger,
    pub role: Role,
    pub prompt_id: Option<&'static str>,
    pub reason: String,
}

#[derive(Debug, Clone, Copy)]
pub struct TriggerInput<'a> {
    pub state: &'a ExecutionState,
    pub issues: &'a [Issue],
    pub plan: &'a PlanDocument,
    pub feedback: Option<&'a FeedbackDocument>,
    pub context_present: bool,
    pub work_log_threshold: usize,
}

impl Trigger {
    /// Evaluation order; earlier entries win.
    pub const PRIORITY: [Trigger; 8] = [
        Trigger::Blocker,
        Trigger::MajorIssue,
        Trigger::WorkLog,
        Trigger::Retrospective,
        Trigger::StageDesign,
        Trigger::Maintenance,
        Trigger::ContextCapture,
        Trigger::ProcessImprovements,
    ];

    pub fn evaluate(self, input: TriggerInput<'_>) -> Option<Firing> {
        match self {
            Trigger::Blocker => blocker(input),
            Trigger::MajorIssue => major_issue(input),
            Trigger::WorkLog => work_log(input),
            Trigger::Retrospective => retrospective(input),
            Trigger::StageDesign => stage_design(input),
            Trigger::Maintenance => maintenance(input),
            Trigger::ContextCapture => context_capture(input),
            Trigger::ProcessImprovements => process_improvements(input),
        }
    }

    fn fire(self, role: Role, reason: String) -> Option<Firing> {
        self.fire_with(role, role.default_prompt(), reason)
    }

    fn fire_with(self, role: Role, prompt_id: Option<&'static str>, reason: String) -> Option<Firing> {
        Some(Firing {
            trigger: self,
            role,
            prompt_id,
            reason,
        })
    }
}

/// First firing trigger in priority order, if any.
pub fn escalate(input: TriggerInput<'_>) -> Option<Firing> {
    Trigger::PRIORITY
        .iter()
        .fold(None, |fired, trigger| fired.or_else(|| trigger.evaluate(input)))
}

fn unresolved(issues: &[Issue]) -> impl Iterator<Item = &Issue> {
    issues.iter().filter(|issue| !issue.is_resolved())
}

fn ids(issues: &[&Issue]) -> String {
    issues
        .iter()
        .map(|issue| issue.id.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

fn blocker(input: TriggerInput<'_>) -> Option<Firing> {
    let blockers: Vec<&Issue> = unresolved(input.issues)
        .filter(|issue| issue.impact == Some(Impact::Blocker))
        .collect();
    if blockers.is_empty() {
        return None;
    }
    let all_human = blockers
        .iter()
        .all(|issue| issue.owner == Some(Owner::Human));
    if all_human {
        Trigger::Blocker.fire(
            Role::Stop,
            format!("waiting on human for BLOCKER issue(s): {}", ids(&blockers)),
        )
    } else {
        Trigger::Blocker.fire(
            Role::IssuesTriage,
            format!("BLOCKER issue(s) need triage: {}", ids(&blockers)),
        )
    }
}

fn major_issue(input: TriggerInput<'_>) -> Option<Firing> {
    let majors: Vec<&Issue> = unresolved(input.issues)
        .filter(|issue| issue.impact.is_some_and(|impact| impact >= Impact::Major))
        .collect();
    // Feedback already tracked by a resolved issue waits for `feedback ack`.
    let pending: Vec<&FeedbackEntry> = input
        .feedback
        .map(|doc| {
            doc.pending()
                .filter(|entry| {
                    !input
                        .issues
                        .iter()
                        .any(|issue| issue.id == entry.id && issue.is_resolved())
                })
                .collect()
        })
        .unwrap_or_default();
    let top = most_severe(pending.iter().copied());

    let urgent_feedback = top.is_some_and(|entry| entry.effective_impact() >= Impact::Major);
    if majors.is_empty() && !urgent_feedback {
        return None;
    }

    let mut reasons = Vec::new();
    if !majors.is_empty() {
        reasons.push(format!("unresolved MAJOR issue(s): {}", ids(&majors)));
    }
    if let Some(top) = top {
        reasons.push(format!(
            "{} pending feedback entr{}; most severe {} ({}): {}",
            pending.len(),
            if pending.len() == 1 { "y" } else { "ies" },
            top.id,
            top.effective_impact(),
            top.title
        ));
    }
    Trigger::MajorIssue.fire(Role::IssuesTriage, reasons.join("; "))
}

fn work_log(input: TriggerInput<'_>) -> Option<Firing> {
    let entries = input.state.work_log.len();
    if entries <= input.work_log_threshold {
        return None;
    }
    Trigger::WorkLog.fire(
        Role::Consolidation,
        format!(
            "work log has {entries} entries (threshold {})",
            input.work_log_threshold
        ),
    )
}

fn retrospective(input: TriggerInput<'_>) -> Option<Firing> {
    if input.state.flags.retrospective_done {
        return None;
    }
    let current = input.state.stage_id()?;
    let previous = input
        .plan
        .stages()
        .filter(|stage| stage.id < current)
        .max_by_key(|stage| stage.id)?;
    let complete = previous.skipped
        || previous
            .checkpoints()
            .all(|checkpoint| checkpoint.marker.is_closed());
    if !complete {
        return None;
    }
    Trigger::Retrospective.fire(
        Role::Retrospective,
        format!(
            "stage {} is complete and RETROSPECTIVE_DONE is not set",
            previous.id
        ),
    )
}

fn stage_design(input: TriggerInput<'_>) -> Option<Firing> {
    if input.state.flags.stage_designed {
        return None;
    }
    let stage = input.state.stage_id()?;
    Trigger::StageDesign.fire(
        Role::Design,
        format!("stage {stage} has not been designed (STAGE_DESIGNED is not set)"),
    )
}

/// Maintenance prompt rotated by stage number.
pub fn maintenance_prompt(stage_number: u32) -> &'static str {
    match stage_number % 3 {
        0 => prompts::REFACTOR_SCAN,
        1 => prompts::TEST_GAP_ANALYSIS,
        _ => prompts::DOCS_GAP_ANALYSIS,
    }
}

fn maintenance(input: TriggerInput<'_>) -> Option<Firing> {
    if input.state.flags.maintenance_cycle_done {
        return None;
    }
    let number = input.state.stage_number()?;
    let prompt = maintenance_prompt(number);
    Trigger::Maintenance.fire_with(
        Role::Implement,
        Some(prompt),
        format!("maintenance cycle pending for stage {number} ({prompt})"),
    )
}

fn context_capture(input: TriggerInput<'_>) -> Option<Firing> {
    let reason = if !input.context_present {
        "context snapshot is missing"
    } else if input.state.flags.run_context_capture {
        "RUN_CONTEXT_CAPTURE is set"
    } else {
        return None;
    };
    Trigger::ContextCapture.fire(Role::ContextCapture, reason.to_string())
}

fn process_improvements(input: TriggerInput<'_>) -> Option<Firing> {
    if !input.state.flags.run_process_improvements {
        return None;
    }
    Trigger::ProcessImprovements.fire(
        Role::Improvements,
        "RUN_PROCESS_IMPROVEMENTS is set".to_string(),
    )
}
