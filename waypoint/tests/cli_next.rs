//! CLI tests for `waypoint next`, `waypoint dag`, and `waypoint validate`.
//!
//! Spawns the waypoint binary against throwaway workspaces and checks the
//! JSON decisions and exit codes.

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

fn json(output: &Output) -> Value {
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    serde_json::from_slice(&output.stdout).expect("json stdout")
}

const ISSUE_PLAN: &str = "\
## Stage 1 — One

### (DONE) 1.0 — Base
depends_on: []

### 1.1 — Middle
depends_on: [1.0]
";

fn blocker_state(owner: &str) -> String {
    format!(
        "{}- [ ] ISSUE-7: Database credentials missing\n  - Impact: BLOCKER\n  - Status: OPEN\n  - Owner: {owner}\n  - Unblock Condition: credentials provided\n  - Evidence Needed: connection succeeds\n",
        state_at("1.1", "IN_PROGRESS")
    )
}

#[test]
fn blocker_owned_by_agent_routes_to_triage() {
    let ws = TestWorkspace::seeded("1.1", "IN_PROGRESS");
    ws.write_plan(ISSUE_PLAN);
    ws.write_state(&blocker_state("agent"));

    let decision = json(&waypoint(&ws, &["--format", "json", "next"]));
    assert_eq!(decision["recommended_role"], "issues_triage");
}

#[test]
fn blocker_owned_by_human_stops_with_issue_id() {
    let ws = TestWorkspace::seeded("1.1", "IN_PROGRESS");
    ws.write_plan(ISSUE_PLAN);
    ws.write_state(&blocker_state("human"));

    let decision = json(&waypoint(&ws, &["--format", "json", "next"]));
    assert_eq!(decision["recommended_role"], "stop");
    let reason = decision["reason"].as_str().expect("reason");
    assert!(reason.contains("ISSUE-7"), "{reason}");
}

#[test]
fn failing_demo_command_routes_to_triage_not_review() {
    let ws = TestWorkspace::seeded("1.1", "IN_REVIEW");
    ws.write_plan(
        "\
## Stage 1 — One

### (DONE) 1.0 — Base
depends_on: []

### 1.1 — Middle
depends_on: [1.0]

- Demo commands:
  - `exit 1`
",
    );

    let decision = json(&waypoint(&ws, &["--format", "json", "next"]));
    assert_eq!(decision["recommended_role"], "issues_triage");
    let reason = decision["reason"].as_str().expect("reason");
    assert!(reason.contains("exit 1"), "{reason}");
}

#[test]
fn dep_blocked_checkpoint_is_never_offered_in_parallel() {
    let ws = TestWorkspace::new();
    ws.write_context("# CONTEXT\nnotes\n");
    ws.write_plan(
        "\
## Stage 2 — Two

### 2.0 — First
depends_on: []

### 2.1 — Second
depends_on: [2.0]
",
    );
    ws.write_state(&state_at("2.0", "IN_PROGRESS"));

    let dag = json(&waypoint(&ws, &["--format", "json", "dag"]));
    let second = dag["nodes"]
        .as_array()
        .expect("nodes")
        .iter()
        .find(|node| node["id"] == "2.1")
        .expect("2.1");
    assert_eq!(second["status"], "DEP_BLOCKED");
    assert_eq!(dag["edges"][0]["from"], "2.0");
    assert_eq!(dag["edges"][0]["to"], "2.1");

    let decision = json(&waypoint(&ws, &["--format", "json", "next", "--parallel", "2"]));
    let slots: Vec<&str> = decision["recommended_roles"]
        .as_array()
        .expect("slots")
        .iter()
        .map(|slot| slot["checkpoint"].as_str().expect("checkpoint"))
        .collect();
    assert_eq!(slots, vec!["2.0"]);
}

#[test]
fn next_is_idempotent() {
    let ws = TestWorkspace::seeded("1.1", "IN_PROGRESS");
    let first = waypoint(&ws, &["--format", "json", "next"]);
    let second = waypoint(&ws, &["--format", "json", "next"]);
    assert_eq!(json(&first), json(&second));
}

#[test]
fn text_output_names_role_and_reason() {
    let ws = TestWorkspace::seeded("1.1", "IN_PROGRESS");
    let output = waypoint(&ws, &["next"]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.starts_with("role: implement\n"), "{stdout}");
    assert!(stdout.contains("reason: "), "{stdout}");
}

#[test]
fn dag_ascii_lists_nodes() {
    let ws = TestWorkspace::seeded("1.1", "IN_PROGRESS");
    let output = waypoint(&ws, &["dag", "--format", "ascii"]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("1.0  DONE"), "{stdout}");
    assert!(stdout.contains("1.2  DEP_BLOCKED"), "{stdout}");
}

#[test]
fn strict_validation_fails_on_cycle() {
    let ws = TestWorkspace::new();
    ws.write_plan(
        "\
## Stage 3 — Loop

### 3.0 — A
depends_on: [3.1]

### 3.1 — B
depends_on: [3.0]
",
    );
    ws.write_state(&state_at("3.0", "IN_PROGRESS"));

    let lenient = waypoint(&ws, &["--format", "json", "validate"]);
    assert_eq!(lenient.status.code(), Some(exit_codes::OK));

    let strict = waypoint(&ws, &["--format", "json", "validate", "--strict"]);
    assert_eq!(strict.status.code(), Some(exit_codes::VALIDATION_FAILED));
    let report: Value = serde_json::from_slice(&strict.stdout).expect("json");
    assert_eq!(report["ok"], false);
    let messages: Vec<&str> = report["errors"]
        .as_array()
        .expect("errors")
        .iter()
        .filter_map(|finding| finding["message"].as_str())
        .collect();
    assert!(
        messages
            .iter()
            .any(|m| m.contains("cycle") && m.contains("3.0") && m.contains("3.1")),
        "{messages:?}"
    );
}
