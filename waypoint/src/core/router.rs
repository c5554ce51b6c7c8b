//! The dispatcher: trigger escalation, then status-based routing, then an
//! optional workflow overlay. Pure; the same input always yields the same
//! decision.

use serde::Serialize;

use crate::core::graph::{CheckpointGraph, NodeStatus};
use crate::core::ids::CheckpointId;
use crate::core::triggers::{Trigger, TriggerInput, escalate};
use crate::core::types::{Role, SmokeOutcome, Status, prompts};
use crate::core::workflow::WorkflowDefinition;
use crate::doc::feedback::FeedbackDocument;
use crate::doc::plan::{Checkpoint, PlanDocument};
use crate::doc::state::StateDocument;

/// Everything the dispatcher reads, already parsed and gathered by the caller.
#[derive(Debug, Clone, Copy)]
pub struct DispatchInput<'a> {
    pub state: &'a StateDocument,
    pub plan: &'a PlanDocument,
    pub graph: &'a CheckpointGraph,
    pub feedback: Option<&'a FeedbackDocument>,
    pub context_present: bool,
    pub work_log_threshold: usize,
    /// Result of the smoke gate for the current checkpoint, when it was run.
    pub smoke: Option<&'a SmokeOutcome>,
    /// Whether a loop result matches the current State. `None` disables the gate.
    pub loop_result_recorded: Option<bool>,
    pub workflow: Option<&'a WorkflowDefinition>,
    pub loop_count: u64,
    /// Requested number of parallel slots (`next --parallel N`).
    pub parallel: Option<usize>,
}

/// One checkpoint that could be worked on in parallel with the main decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParallelSlot {
    pub checkpoint: String,
    pub role: Role,
    pub prompt_id: &'static str,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Decision {
    pub recommended_role: Role,
    pub recommended_prompt_id: Option<String>,
    pub reason: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recommended_roles: Option<Vec<ParallelSlot>>,
    pub checkpoint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trigger: Option<Trigger>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

/// Role and reason before overlays and parallel slots are attached.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Route {
    role: Role,
    prompt_id: Option<String>,
    reason: String,
}

impl Route {
    fn new(role: Role, reason: impl Into<String>) -> Self {
        Self {
            role,
            prompt_id: role.default_prompt().map(str::to_string),
            reason: reason.into(),
        }
    }
}

pub fn dispatch(input: DispatchInput<'_>) -> Decision {
    let state = &input.state.state;
    let checkpoint = state.checkpoint_id().map(|id| id.to_string());

    let (route, trigger) = match escalate(trigger_input(input)) {
        Some(firing) => (
            Route {
                role: firing.role,
                prompt_id: firing.prompt_id.map(str::to_string),
                reason: firing.reason,
            },
            Some(firing.trigger),
        ),
        None => {
            let mut route = default_route(input);
            if let Some(workflow) = input.workflow
                && let Some(overlay) = workflow.overlay(state, route.role, input.loop_count)
            {
                route = Route {
                    role: overlay.role,
                    prompt_id: Some(overlay.prompt_id),
                    reason: format!("{} ({})", route.reason, overlay.note),
                };
            }
            (route, None)
        }
    };

    let recommended_roles = input.parallel.map(|limit| {
        input
            .graph
            .ready_ids(limit)
            .into_iter()
            .map(|id| ParallelSlot {
                checkpoint: id.to_string(),
                role: Role::Implement,
                prompt_id: prompts::IMPLEMENT,
            })
            .collect()
    });

    Decision {
        recommended_role: route.role,
        recommended_prompt_id: route.prompt_id,
        reason: route.reason,
        recommended_roles,
        checkpoint,
        trigger,
        warnings: Vec::new(),
    }
}

fn trigger_input(input: DispatchInput<'_>) -> TriggerInput<'_> {
    TriggerInput {
        state: &input.state.state,
        issues: &input.state.issues,
        plan: input.plan,
        feedback: input.feedback,
        context_present: input.context_present,
        work_log_threshold: input.work_log_threshold,
    }
}

/// Checkpoint whose demo commands must pass before review, if routing would
/// reach the review branch for the current state.
pub fn smoke_gate_target<'a>(input: DispatchInput<'a>) -> Option<&'a Checkpoint> {
    if escalate(trigger_input(input)).is_some() {
        return None;
    }
    let state = &input.state.state;
    if state.status != Some(Status::InReview) {
        return None;
    }
    let id = state.checkpoint_id()?;
    let entry = input.plan.find(&id)?;
    if input.graph.status(&id.to_string())?.is_closed() {
        return None;
    }
    Some(entry.checkpoint)
}

fn crosses_stage(current: &CheckpointId, next: &str) -> bool {
    next.parse::<CheckpointId>()
        .is_ok_and(|next| next.stage != current.stage)
}

fn default_route(input: DispatchInput<'_>) -> Route {
    let state = &input.state.state;
    let Some(raw) = state.checkpoint.as_deref() else {
        return Route::new(Role::Stop, "no current checkpoint is set in STATE.md");
    };
    let Some(id) = state.checkpoint_id() else {
        return Route::new(
            Role::Stop,
            format!("current checkpoint '{raw}' is not a checkpoint id"),
        );
    };
    let key = id.to_string();
    let Some(node) = input.graph.node(&key) else {
        return Route::new(Role::Stop, format!("checkpoint {id} is not in the plan"));
    };
    let status = state.status.unwrap_or(Status::NotStarted);

    if status != Status::Done && node.status.is_closed() {
        return Route::new(
            Role::Advance,
            format!("checkpoint {id} is already marked {} in the plan", node.status),
        );
    }

    match status {
        Status::NotStarted | Status::InProgress => {
            if node.status == NodeStatus::DepBlocked {
                let waiting: Vec<&str> = node
                    .deps
                    .iter()
                    .filter(|dep| {
                        input
                            .graph
                            .status(dep)
                            .is_none_or(|dep_status| !dep_status.is_closed())
                    })
                    .map(String::as_str)
                    .collect();
                Route::new(
                    Role::IssuesTriage,
                    format!(
                        "checkpoint {id} is blocked on dependencies: {}",
                        waiting.join(", ")
                    ),
                )
            } else {
                Route::new(
                    Role::Implement,
                    format!("checkpoint {id} is {status}; continue implementation"),
                )
            }
        }
        Status::InReview => match input.smoke {
            Some(SmokeOutcome::Failed(failure)) => {
                let mut reason = failure.to_string();
                if !failure.output_tail.is_empty() {
                    reason.push('\n');
                    reason.push_str(&failure.output_tail);
                }
                Route::new(Role::IssuesTriage, reason)
            }
            _ if input.loop_result_recorded == Some(false) => Route::new(
                Role::RequiresLoopResult,
                format!(
                    "checkpoint {id} is IN_REVIEW but no LOOP_RESULT matches the current STATE.md; record the implement loop result first"
                ),
            ),
            Some(SmokeOutcome::Passed { commands_run }) => Route::new(
                Role::Review,
                format!("checkpoint {id} is IN_REVIEW; smoke gate passed ({commands_run} command(s))"),
            ),
            None => Route::new(Role::Review, format!("checkpoint {id} is IN_REVIEW")),
        },
        Status::Blocked => Route::new(
            Role::IssuesTriage,
            format!("checkpoint {id} is BLOCKED"),
        ),
        Status::Done => match input.graph.next_after(&key) {
            Some(next) if crosses_stage(&id, &next.id) => Route::new(
                Role::Consolidation,
                format!(
                    "stage {} is complete; consolidate before advancing to {}",
                    id.stage, next.id
                ),
            ),
            Some(next) => Route::new(
                Role::Advance,
                format!("checkpoint {id} is DONE; advance to {}", next.id),
            ),
            None => Route::new(
                Role::Stop,
                format!("plan exhausted: checkpoint {id} is DONE and nothing else is ready"),
            ),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{GateFailure, GateFailureReason};

    const PLAN: &str = "\
## Stage 1 — One

### (DONE) 1.0 — Base
depends_on: []

### 1.1 — Middle
depends_on: [1.0]

- Demo commands:
  - `exit 1`

### 1.2 — Top
depends_on: [1.1]

### 1.3 — Side
depends_on: []
";

    fn state_text(checkpoint: &str, status: &str) -> String {
        format!(
            "## Current focus\n\n- Stage: 1\n- Checkpoint: {checkpoint}\n- Status: {status}\n\n## Workflow state\n\n- [x] STAGE_DESIGNED\n- [x] RETROSPECTIVE_DONE\n- [x] MAINTENANCE_CYCLE_DONE\n"
        )
    }

    struct Fixture {
        state: StateDocument,
        plan: PlanDocument,
        graph: CheckpointGraph,
    }

    impl Fixture {
        fn new(checkpoint: &str, status: &str) -> Self {
            let plan = PlanDocument::parse(PLAN).model;
            let graph = CheckpointGraph::build(&plan);
            Self {
                state: StateDocument::parse(&state_text(checkpoint, status)).model,
                plan,
                graph,
            }
        }

        fn input(&self) -> DispatchInput<'_> {
            DispatchInput {
                state: &self.state,
                plan: &self.plan,
                graph: &self.graph,
                feedback: None,
                context_present: true,
                work_log_threshold: 10,
                smoke: None,
                loop_result_recorded: None,
                workflow: None,
                loop_count: 0,
                parallel: None,
            }
        }
    }

    #[test]
    fn in_progress_routes_to_implement() {
        let fixture = Fixture::new("1.1", "IN_PROGRESS");
        let decision = dispatch(fixture.input());
        assert_eq!(decision.recommended_role, Role::Implement);
        assert_eq!(
            decision.recommended_prompt_id.as_deref(),
            Some(prompts::IMPLEMENT)
        );
        assert_eq!(decision.checkpoint.as_deref(), Some("1.1"));
    }

    #[test]
    fn dispatch_is_idempotent() {
        let fixture = Fixture::new("1.1", "IN_PROGRESS");
        assert_eq!(dispatch(fixture.input()), dispatch(fixture.input()));
    }

    #[test]
    fn dependency_blocked_checkpoint_routes_to_triage() {
        let fixture = Fixture::new("1.2", "NOT_STARTED");
        let decision = dispatch(fixture.input());
        assert_eq!(decision.recommended_role, Role::IssuesTriage);
        assert!(decision.reason.contains("blocked on dependencies: 1.1"));
    }

    #[test]
    fn failed_smoke_gate_bypasses_review() {
        let fixture = Fixture::new("1.1", "IN_REVIEW");
        let target = smoke_gate_target(fixture.input()).expect("gate target");
        assert_eq!(target.demo_commands(), vec!["exit 1"]);

        let outcome = SmokeOutcome::Failed(GateFailure {
            checkpoint: "1.1".to_string(),
            command: "exit 1".to_string(),
            reason: GateFailureReason::Exit { code: 1 },
            output_tail: String::new(),
        });
        let decision = dispatch(DispatchInput {
            smoke: Some(&outcome),
            ..fixture.input()
        });
        assert_eq!(decision.recommended_role, Role::IssuesTriage);
        assert!(decision.reason.contains("`exit 1`"));
    }

    #[test]
    fn review_requires_recorded_loop_result_when_gated() {
        let fixture = Fixture::new("1.1", "IN_REVIEW");
        let gated = dispatch(DispatchInput {
            loop_result_recorded: Some(false),
            ..fixture.input()
        });
        assert_eq!(gated.recommended_role, Role::RequiresLoopResult);
        assert_eq!(gated.recommended_prompt_id, None);

        let open = dispatch(DispatchInput {
            loop_result_recorded: Some(true),
            smoke: Some(&SmokeOutcome::Passed { commands_run: 1 }),
            ..fixture.input()
        });
        assert_eq!(open.recommended_role, Role::Review);
    }

    #[test]
    fn done_advances_or_stops_when_exhausted() {
        let fixture = Fixture::new("1.1", "DONE");
        let decision = dispatch(fixture.input());
        assert_eq!(decision.recommended_role, Role::Advance);
        assert!(decision.reason.ends_with("advance to 1.3"), "{}", decision.reason);

        let plan = PlanDocument::parse("## Stage 1 — One\n\n### (DONE) 1.0 — Only\ndepends_on: []\n").model;
        let graph = CheckpointGraph::build(&plan);
        let state = StateDocument::parse(&state_text("1.0", "DONE")).model;
        let decision = dispatch(DispatchInput {
            state: &state,
            plan: &plan,
            graph: &graph,
            ..fixture.input()
        });
        assert_eq!(decision.recommended_role, Role::Stop);
        assert!(decision.reason.starts_with("plan exhausted"));
    }

    #[test]
    fn stage_boundary_routes_to_consolidation() {
        let fixture = Fixture::new("1.3", "DONE");
        let plan = PlanDocument::parse(
            "## Stage 1 — One\n\n### (DONE) 1.3 — End\ndepends_on: []\n\n## Stage 2 — Two\n\n### 2.0 — Start\ndepends_on: [1.3]\n",
        )
        .model;
        let graph = CheckpointGraph::build(&plan);
        let decision = dispatch(DispatchInput {
            plan: &plan,
            graph: &graph,
            ..fixture.input()
        });
        assert_eq!(decision.recommended_role, Role::Consolidation);
        assert!(decision.reason.contains("advancing to 2.0"), "{}", decision.reason);
    }

    #[test]
    fn missing_pointer_stops() {
        let fixture = Fixture::new("9.9", "IN_PROGRESS");
        let decision = dispatch(fixture.input());
        assert_eq!(decision.recommended_role, Role::Stop);
        assert!(decision.reason.contains("not in the plan"));
    }

    #[test]
    fn parallel_slots_list_ready_checkpoints_only() {
        let fixture = Fixture::new("1.1", "IN_PROGRESS");
        let decision = dispatch(DispatchInput {
            parallel: Some(5),
            ..fixture.input()
        });
        let slots: Vec<&str> = decision
            .recommended_roles
            .as_ref()
            .expect("slots")
            .iter()
            .map(|slot| slot.checkpoint.as_str())
            .collect();
        assert_eq!(slots, vec!["1.1", "1.3"]);
    }

    #[test]
    fn trigger_wins_over_default_route() {
        let mut fixture = Fixture::new("1.1", "IN_REVIEW");
        fixture.state.state.flags.stage_designed = false;
        assert!(smoke_gate_target(fixture.input()).is_none());
        let decision = dispatch(fixture.input());
        assert_eq!(decision.recommended_role, Role::Design);
        assert_eq!(decision.trigger, Some(Trigger::StageDesign));
    }

    #[test]
    fn decision_json_uses_documented_keys() {
        let fixture = Fixture::new("1.1", "IN_PROGRESS");
        let json = serde_json::to_value(dispatch(fixture.input())).expect("json");
        assert_eq!(json["recommended_role"], "implement");
        assert_eq!(json["recommended_prompt_id"], prompts::IMPLEMENT);
        assert!(json.get("recommended_roles").is_none());
        assert!(json["reason"].as_str().is_some());
    }
}
