//! `waypoint next`: gather documents, run the smoke gate when review is due,
//! and ask the dispatcher for the next role.

use anyhow::{Context, Result};
use tracing::{debug, info};

use crate::core::graph::CheckpointGraph;
use crate::core::router::{Decision, DispatchInput, dispatch, smoke_gate_target};
use crate::io::config::load_config;
use crate::io::loop_log;
use crate::io::paths::WorkspacePaths;
use crate::io::smoke::{SmokeRequest, SmokeRunner};
use crate::io::store::Snapshot;

#[derive(Debug, Clone, Default)]
pub struct NextOptions {
    /// Named workflow from config.toml to overlay on the default route.
    pub workflow: Option<String>,
    /// Also list up to N READY checkpoints for parallel work.
    pub parallel: Option<usize>,
    /// Run the current checkpoint's demo commands before recommending review.
    pub run_gates: bool,
}

pub fn next_decision(
    paths: &WorkspacePaths,
    options: &NextOptions,
    runner: &dyn SmokeRunner,
) -> Result<Decision> {
    let config = load_config(&paths.config_path).with_context(|| "load config.toml")?;
    let workflow = options
        .workflow
        .as_deref()
        .map(|name| config.workflow(name))
        .transpose()?;
    let snapshot = Snapshot::load(paths)?;
    let graph = CheckpointGraph::build(&snapshot.plan);

    let loop_count = loop_log::count(&paths.loop_log_path)?;
    let loop_result_recorded = if config.require_loop_result {
        Some(loop_log::is_recorded(
            &paths.loop_log_path,
            &snapshot.state_text,
        )?)
    } else {
        None
    };

    let mut input = DispatchInput {
        state: &snapshot.state,
        plan: &snapshot.plan,
        graph: &graph,
        feedback: snapshot.feedback.as_ref(),
        context_present: snapshot.context_present(),
        work_log_threshold: config.work_log_threshold,
        smoke: None,
        loop_result_recorded,
        workflow,
        loop_count,
        parallel: options.parallel,
    };

    let smoke = match smoke_gate_target(input) {
        Some(checkpoint) if options.run_gates => {
            let request = SmokeRequest::for_checkpoint(&paths.root, checkpoint, &config.smoke);
            info!(
                checkpoint = %request.checkpoint,
                commands = request.commands.len(),
                "running smoke gate"
            );
            Some(runner.run(&request).context("run smoke gate")?)
        }
        _ => None,
    };
    input.smoke = smoke.as_ref();

    let mut decision = dispatch(input);
    decision.warnings = snapshot
        .diagnostics
        .iter()
        .map(ToString::to_string)
        .chain(
            graph
                .errors()
                .iter()
                .map(|error| format!("{}: {error}", error.location())),
        )
        .collect();
    debug!(role = %decision.recommended_role, reason = %decision.reason, "decision");
    Ok(decision)
}

pub fn render_text(decision: &Decision) -> String {
    let mut out = format!("role: {}\n", decision.recommended_role);
    if let Some(prompt) = &decision.recommended_prompt_id {
        out.push_str(&format!("prompt: {prompt}\n"));
    }
    if let Some(checkpoint) = &decision.checkpoint {
        out.push_str(&format!("checkpoint: {checkpoint}\n"));
    }
    out.push_str(&format!("reason: {}\n", decision.reason));
    if let Some(slots) = &decision.recommended_roles {
        out.push_str("parallel:\n");
        for slot in slots {
            out.push_str(&format!(
                "  {} {} ({})\n",
                slot.checkpoint, slot.role, slot.prompt_id
            ));
        }
    }
    for warning in &decision.warnings {
        out.push_str(&format!("warning: {warning}\n"));
    }
    out
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;
    use crate::core::types::{GateFailure, GateFailureReason, Role, SmokeOutcome};
    use crate::test_support::TestWorkspace;

    struct FakeSmokeRunner {
        outcome: SmokeOutcome,
        calls: Cell<usize>,
    }

    impl FakeSmokeRunner {
        fn new(outcome: SmokeOutcome) -> Self {
            Self {
                outcome,
                calls: Cell::new(0),
            }
        }
    }

    impl SmokeRunner for FakeSmokeRunner {
        fn run(&self, _request: &SmokeRequest) -> Result<SmokeOutcome> {
            self.calls.set(self.calls.get() + 1);
            Ok(self.outcome.clone())
        }
    }

    fn gates_on() -> NextOptions {
        NextOptions {
            run_gates: true,
            ..NextOptions::default()
        }
    }

    #[test]
    fn smoke_gate_runs_only_for_review() {
        let ws = TestWorkspace::seeded("1.1", "IN_PROGRESS");
        let runner = FakeSmokeRunner::new(SmokeOutcome::Passed { commands_run: 0 });
        let decision = next_decision(&ws.paths(), &gates_on(), &runner).expect("next");
        assert_eq!(decision.recommended_role, Role::Implement);
        assert_eq!(runner.calls.get(), 0);
    }

    #[test]
    fn failed_gate_routes_to_triage() {
        let ws = TestWorkspace::seeded("1.1", "IN_REVIEW");
        let runner = FakeSmokeRunner::new(SmokeOutcome::Failed(GateFailure {
            checkpoint: "1.1".to_string(),
            command: "make demo".to_string(),
            reason: GateFailureReason::Exit { code: 2 },
            output_tail: "boom".to_string(),
        }));
        let decision = next_decision(&ws.paths(), &gates_on(), &runner).expect("next");
        assert_eq!(decision.recommended_role, Role::IssuesTriage);
        assert!(decision.reason.contains("make demo"), "{}", decision.reason);
        assert_eq!(runner.calls.get(), 1);
    }

    #[test]
    fn unrecorded_review_requires_loop_result() {
        let ws = TestWorkspace::seeded("1.1", "IN_REVIEW");
        let runner = FakeSmokeRunner::new(SmokeOutcome::Passed { commands_run: 0 });
        let decision = next_decision(&ws.paths(), &gates_on(), &runner).expect("next");
        assert_eq!(decision.recommended_role, Role::RequiresLoopResult);
        assert_eq!(decision.recommended_prompt_id, None);

        ws.write_config("require_loop_result = false\n");
        let decision = next_decision(&ws.paths(), &gates_on(), &runner).expect("next");
        assert_eq!(decision.recommended_role, Role::Review);
    }

    #[test]
    fn gates_can_be_disabled() {
        let ws = TestWorkspace::seeded("1.1", "IN_REVIEW");
        ws.write_config("require_loop_result = false\n");
        let runner = FakeSmokeRunner::new(SmokeOutcome::Passed { commands_run: 0 });
        let options = NextOptions::default();
        let decision = next_decision(&ws.paths(), &options, &runner).expect("next");
        assert_eq!(decision.recommended_role, Role::Review);
        assert_eq!(runner.calls.get(), 0);
    }

    #[test]
    fn unknown_workflow_is_an_error() {
        let ws = TestWorkspace::seeded("1.1", "IN_PROGRESS");
        let runner = FakeSmokeRunner::new(SmokeOutcome::Passed { commands_run: 0 });
        let options = NextOptions {
            workflow: Some("tdd".to_string()),
            ..NextOptions::default()
        };
        let err = next_decision(&ws.paths(), &options, &runner).unwrap_err();
        assert!(err.to_string().contains("unknown workflow 'tdd'"), "{err}");
    }

    #[test]
    fn parse_problems_surface_as_warnings() {
        let ws = TestWorkspace::seeded("1.1", "IN_PROGRESS");
        let plan = format!("{}\n### 2.9 — Dangling\ndepends_on: [8.8]\n", crate::test_support::LINEAR_PLAN);
        ws.write_plan(&plan);
        let runner = FakeSmokeRunner::new(SmokeOutcome::Passed { commands_run: 0 });
        let decision = next_decision(&ws.paths(), &NextOptions::default(), &runner).expect("next");
        assert!(
            decision.warnings.iter().any(|w| w.contains("8.8")),
            "{:?}",
            decision.warnings
        );
    }

    #[test]
    fn question_feedback_leaves_stale_work_log_to_consolidation() {
        let ws = TestWorkspace::seeded("1.1", "IN_PROGRESS");
        let entries: String = (1..=15)
            .map(|n| format!("- 2026-03-{n:02} implement: PASS (1.1)\n"))
            .collect();
        let state = crate::test_support::state_at("1.1", "IN_PROGRESS")
            .replace("## Work log\n", &format!("## Work log\n{entries}"));
        ws.write_state(&state);
        ws.write_feedback("# FEEDBACK\n\n- [ ] FB-1: Why two buttons?\n  - Impact: QUESTION\n");

        let runner = FakeSmokeRunner::new(SmokeOutcome::Passed { commands_run: 0 });
        let decision = next_decision(&ws.paths(), &gates_on(), &runner).expect("next");
        assert_eq!(decision.recommended_role, Role::Consolidation);
        assert!(decision.reason.contains("15 entries"), "{}", decision.reason);
    }
}
