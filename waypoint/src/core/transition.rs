//! State changes applied after a loop reports its result, and the `advance`
//! step that moves the pointer to the next ready checkpoint.

use crate::core::graph::CheckpointGraph;
use crate::core::ids::CheckpointId;
use crate::core::loop_result::{LoopResult, RecordError};
use crate::core::types::{Flag, Impact, LoopKind, LoopOutcome, Marker, Status};
use crate::doc::plan::PlanDocument;
use crate::doc::state::{Issue, StateDocument};

/// Entries moved out of STATE.md, to be appended to HISTORY.md.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Archive {
    pub work_log: Vec<String>,
    pub resolved_issues: Vec<Issue>,
}

impl Archive {
    pub fn is_empty(&self) -> bool {
        self.work_log.is_empty() && self.resolved_issues.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Applied {
    /// Human-readable effects, in the order they happened.
    pub effects: Vec<String>,
    pub archive: Archive,
    pub plan_changed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Advanced {
    pub from: CheckpointId,
    pub to: CheckpointId,
    pub stage_changed: bool,
    pub plan_changed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AdvanceError {
    #[error("no current checkpoint is set in STATE.md")]
    NoCheckpoint,
    #[error("checkpoint {checkpoint} is {status}; only DONE checkpoints can advance")]
    NotDone { checkpoint: String, status: Status },
    #[error("plan exhausted: nothing is ready after {checkpoint}")]
    PlanExhausted { checkpoint: String },
}

/// Reject results that describe a checkpoint other than the current one.
pub fn check_fresh(result: &LoopResult, state: &StateDocument) -> Result<(), RecordError> {
    let current = state.state.checkpoint_id().map(|id| id.to_string());
    if current.as_deref() == Some(result.checkpoint.as_str()) {
        return Ok(());
    }
    Err(RecordError::Stale {
        reported: result.checkpoint.clone(),
        current: current.unwrap_or_else(|| "no checkpoint".to_string()),
    })
}

/// Apply `result` to the documents. Callers must run [`check_fresh`] first.
pub fn apply_loop_result(
    result: &LoopResult,
    state: &mut StateDocument,
    plan: &mut PlanDocument,
    date: &str,
    work_log_keep: usize,
) -> Applied {
    let mut applied = Applied::default();
    state.state.work_log.push(result.work_log_entry(date));
    let success = result.result.is_success();
    let status = state.state.status.unwrap_or(Status::NotStarted);

    match (result.loop_kind, result.result) {
        (LoopKind::Implement, LoopOutcome::Pass | LoopOutcome::Done) => {
            set_status(state, Status::InReview, &mut applied);
        }
        (LoopKind::Implement | LoopKind::Review, LoopOutcome::Fail) => {
            set_status(state, Status::InProgress, &mut applied);
        }
        (LoopKind::Implement | LoopKind::Review, LoopOutcome::Blocked) => {
            set_status(state, Status::Blocked, &mut applied);
        }
        (LoopKind::Review, LoopOutcome::Pass | LoopOutcome::Done) => {
            review_passed(state, plan, &mut applied);
        }
        (LoopKind::IssuesTriage, _) if success => {
            let blocked = state.issues.iter().any(|issue| {
                !issue.is_resolved() && issue.impact == Some(Impact::Blocker)
            });
            if status == Status::Blocked && !blocked {
                set_status(state, Status::InProgress, &mut applied);
            }
        }
        (LoopKind::Consolidation, _) if success => {
            consolidate(state, work_log_keep, &mut applied);
            if status == Status::Done {
                match advance(state, plan) {
                    Ok(advanced) => {
                        applied.plan_changed |= advanced.plan_changed;
                        let reset = if advanced.stage_changed {
                            " and reset stage flags"
                        } else {
                            ""
                        };
                        applied.effects.push(format!(
                            "advanced from {} to {}{reset}",
                            advanced.from, advanced.to
                        ));
                    }
                    Err(err) => applied.effects.push(format!("did not advance: {err}")),
                }
            }
        }
        (LoopKind::Retrospective, _) if success => {
            set_flag(state, Flag::RetrospectiveDone, true, &mut applied);
        }
        (LoopKind::Design, _) if success => {
            set_flag(state, Flag::StageDesigned, true, &mut applied);
        }
        (LoopKind::Maintenance, _) if success => {
            set_flag(state, Flag::MaintenanceCycleDone, true, &mut applied);
        }
        (LoopKind::ContextCapture, _) if success => {
            set_flag(state, Flag::RunContextCapture, false, &mut applied);
        }
        (LoopKind::Improvements, _) if success => {
            set_flag(state, Flag::RunProcessImprovements, false, &mut applied);
        }
        _ => {}
    }
    applied
}

fn set_status(state: &mut StateDocument, status: Status, applied: &mut Applied) {
    state.state.status = Some(status);
    applied.effects.push(format!("status -> {status}"));
}

fn set_flag(state: &mut StateDocument, flag: Flag, value: bool, applied: &mut Applied) {
    state.state.flags.set(flag, value);
    let verb = if value { "set" } else { "cleared" };
    applied.effects.push(format!("{verb} {flag}"));
}

/// Mark the current checkpoint DONE in the plan and find the next READY one.
fn close_current(
    state: &StateDocument,
    plan: &mut PlanDocument,
) -> Option<(CheckpointId, Option<CheckpointId>, bool)> {
    let current = state.state.checkpoint_id()?;
    let already_closed = plan
        .find(&current)
        .is_some_and(|entry| entry.marker().is_closed());
    let plan_changed = !already_closed && plan.set_marker(&current, Marker::Done);
    let graph = CheckpointGraph::build(plan);
    let next = graph
        .next_after(&current.to_string())
        .and_then(|node| node.id.parse::<CheckpointId>().ok());
    Some((current, next, plan_changed))
}

fn review_passed(state: &mut StateDocument, plan: &mut PlanDocument, applied: &mut Applied) {
    let Some((current, next, plan_changed)) = close_current(state, plan) else {
        return;
    };
    applied.plan_changed |= plan_changed;
    if plan_changed {
        applied.effects.push(format!("marked {current} DONE in PLAN.md"));
    }
    match next {
        Some(next) if next.stage == current.stage => {
            state.state.point_at(next);
            applied
                .effects
                .push(format!("advanced to {next} (NOT_STARTED)"));
        }
        Some(next) => {
            set_status(state, Status::Done, applied);
            applied.effects.push(format!(
                "stage {} complete; consolidation before {next}",
                current.stage
            ));
        }
        None => {
            set_status(state, Status::Done, applied);
            applied.effects.push("plan exhausted".to_string());
        }
    }
}

fn consolidate(state: &mut StateDocument, keep: usize, applied: &mut Applied) {
    let log = &mut state.state.work_log;
    if log.len() > keep {
        let archived: Vec<String> = log.drain(..log.len() - keep).collect();
        applied
            .effects
            .push(format!("archived {} work log entries", archived.len()));
        applied.archive.work_log = archived;
    }
    let (resolved, active): (Vec<Issue>, Vec<Issue>) = std::mem::take(&mut state.issues)
        .into_iter()
        .partition(Issue::is_resolved);
    state.issues = active;
    if !resolved.is_empty() {
        applied
            .effects
            .push(format!("archived {} resolved issue(s)", resolved.len()));
        applied.archive.resolved_issues = resolved;
    }
}

/// Move the pointer from a DONE checkpoint to the next READY one. Crossing
/// into another stage resets the stage-scoped flags.
pub fn advance(state: &mut StateDocument, plan: &mut PlanDocument) -> Result<Advanced, AdvanceError> {
    let current = state
        .state
        .checkpoint_id()
        .ok_or(AdvanceError::NoCheckpoint)?;
    let status = state.state.status.unwrap_or(Status::NotStarted);
    if status != Status::Done {
        return Err(AdvanceError::NotDone {
            checkpoint: current.to_string(),
            status,
        });
    }
    let Some((from, next, plan_changed)) = close_current(state, plan) else {
        return Err(AdvanceError::NoCheckpoint);
    };
    let to = next.ok_or_else(|| AdvanceError::PlanExhausted {
        checkpoint: from.to_string(),
    })?;
    let stage_changed = to.stage != from.stage;
    state.state.point_at(to);
    if stage_changed {
        state.state.flags.reset_stage_scoped();
    }
    Ok(Advanced {
        from,
        to,
        stage_changed,
        plan_changed,
    })
}
