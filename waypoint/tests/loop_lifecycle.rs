//! End-to-end loop: implement, record, review, record, advance to the next
//! checkpoint, with `next` consulted between every step.

use std::process::{Command, Output};

use serde_json::Value;
use waypoint::exit_codes;
use waypoint::test_support::{TestWorkspace, state_at};

fn waypoint(ws: &TestWorkspace, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_waypoint"))
        .arg("--root")
        .arg(ws.root())
        .args(args)
        .output()
        .expect("run waypoint")
}

fn next_role(ws: &TestWorkspace) -> String {
    let output = waypoint(ws, &["--format", "json", "next"]);
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let decision: Value = serde_json::from_slice(&output.stdout).expect("json");
    decision["recommended_role"]
        .as_str()
        .expect("role")
        .to_string()
}

fn record(ws: &TestWorkspace, loop_kind: &str, result: &str, checkpoint: &str) -> Output {
    let stage = checkpoint.split('.').next().unwrap_or_default();
    let line = format!(
        r#"agent chatter before the record
LOOP_RESULT: {{"loop":"{loop_kind}","result":"{result}","stage":"{stage}","checkpoint":"{checkpoint}","status":"IN_PROGRESS","next_role_hint":"review","report":{{"top_findings":["{loop_kind} finished"]}}}}"#
    );
    waypoint(ws, &["loop-result", "--line", &line])
}

#[test]
fn implement_review_advance_cycle() {
    let ws = TestWorkspace::seeded("1.1", "IN_PROGRESS");
    assert_eq!(next_role(&ws), "implement");

    let out = record(&ws, "implement", "PASS", "1.1");
    assert_eq!(out.status.code(), Some(exit_codes::OK), "{out:?}");
    assert!(ws.read_state().contains("- Status: IN_REVIEW"));
    assert_eq!(next_role(&ws), "review");

    let out = record(&ws, "review", "PASS", "1.1");
    assert_eq!(out.status.code(), Some(exit_codes::OK), "{out:?}");
    let state = ws.read_state();
    assert!(state.contains("- Checkpoint: 1.2"), "{state}");
    assert!(state.contains("- Status: NOT_STARTED"), "{state}");
    assert!(ws.read_plan().contains("### (DONE) 1.1 — Middle"));
    assert_eq!(next_role(&ws), "implement");
}

#[test]
fn hand_edited_review_state_requires_loop_result() {
    let ws = TestWorkspace::seeded("1.1", "IN_REVIEW");
    assert_eq!(next_role(&ws), "requires_loop_result");
}

#[test]
fn stage_boundary_goes_through_consolidation() {
    let ws = TestWorkspace::seeded("1.2", "IN_REVIEW");
    ws.write_plan(&waypoint::test_support::LINEAR_PLAN.replace("### 1.1 — Middle", "### (DONE) 1.1 — Middle"));

    let out = record(&ws, "review", "PASS", "1.2");
    assert_eq!(out.status.code(), Some(exit_codes::OK), "{out:?}");
    assert!(ws.read_state().contains("- Status: DONE"));
    assert_eq!(next_role(&ws), "consolidation");

    let out = record(&ws, "consolidation", "PASS", "1.2");
    assert_eq!(out.status.code(), Some(exit_codes::OK), "{out:?}");
    let state = ws.read_state();
    assert!(state.contains("- Checkpoint: 2.0"), "{state}");
    assert!(state.contains("- [ ] STAGE_DESIGNED"), "{state}");
}

#[test]
fn malformed_and_stale_results_are_rejected() {
    let ws = TestWorkspace::seeded("1.1", "IN_PROGRESS");
    let before = ws.read_state();

    let out = waypoint(&ws, &["loop-result", "--line", "LOOP_RESULT: {\"loop\":\"implement\"}"]);
    assert_eq!(out.status.code(), Some(exit_codes::RECORD_REJECTED));

    let out = waypoint(&ws, &["loop-result", "--line", "no token here"]);
    assert_eq!(out.status.code(), Some(exit_codes::RECORD_REJECTED));

    let out = record(&ws, "implement", "PASS", "1.2");
    assert_eq!(out.status.code(), Some(exit_codes::RECORD_REJECTED));
    assert!(String::from_utf8_lossy(&out.stderr).contains("stale"));

    assert_eq!(ws.read_state(), before);
}

#[test]
fn advance_command_moves_done_checkpoint() {
    let ws = TestWorkspace::seeded("1.1", "DONE");
    ws.write_state(&state_at("1.1", "DONE"));
    let out = waypoint(&ws, &["advance"]);
    assert_eq!(out.status.code(), Some(exit_codes::OK), "{out:?}");
    assert_eq!(
        String::from_utf8_lossy(&out.stdout),
        "advanced 1.1 -> 1.2\n"
    );

    let out = waypoint(&ws, &["advance"]);
    assert_eq!(out.status.code(), Some(exit_codes::ERROR));
}
