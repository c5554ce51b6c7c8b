//! Test-only helpers for building throwaway workspaces.

use std::fs;
use std::path::Path;

use tempfile::TempDir;

use crate::io::paths::WorkspacePaths;

/// Stage 1 with `1.0 (DONE) -> 1.1 -> 1.2`, then stage 2 with `2.0 -> 2.1`.
pub const LINEAR_PLAN: &str = "\
# PLAN

## Stage 1 — Foundations

### (DONE) 1.0 — Base
depends_on: []

- Objective: lay the base

### 1.1 — Middle
depends_on: [1.0]

- Objective: build the middle
- Acceptance: middle works

### 1.2 — Top
depends_on: [1.1]

- Objective: finish the top

## Stage 2 — Growth

### 2.0 — Expand
depends_on: [1.2]

### 2.1 — Polish
depends_on: [2.0]
";

/// Minimal STATE.md pointing at `checkpoint` with `status`.
pub fn state_at(checkpoint: &str, status: &str) -> String {
    let stage = checkpoint.split('.').next().unwrap_or(checkpoint);
    format!(
        "\
# STATE

## Current focus
- Stage: {stage}
- Checkpoint: {checkpoint}
- Status: {status}

## Work log

## Workflow state
- [x] STAGE_DESIGNED
- [x] RETROSPECTIVE_DONE
- [x] MAINTENANCE_CYCLE_DONE
- [ ] RUN_CONTEXT_CAPTURE
- [ ] RUN_PROCESS_IMPROVEMENTS

## Active issues
"
    )
}

/// Tempdir-backed repository root with a `.waypoint/` directory.
pub struct TestWorkspace {
    dir: TempDir,
}

impl TestWorkspace {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::create_dir_all(dir.path().join(crate::io::paths::WORKSPACE_DIR))
            .expect("create .waypoint");
        Self { dir }
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn paths(&self) -> WorkspacePaths {
        WorkspacePaths::new(self.dir.path())
    }

    fn write(&self, path: &Path, contents: &str) {
        fs::write(path, contents).unwrap_or_else(|err| panic!("write {}: {err}", path.display()));
    }

    fn read(&self, path: &Path) -> String {
        fs::read_to_string(path).unwrap_or_else(|err| panic!("read {}: {err}", path.display()))
    }

    pub fn write_state(&self, contents: &str) {
        self.write(&self.paths().state_path, contents);
    }

    pub fn write_plan(&self, contents: &str) {
        self.write(&self.paths().plan_path, contents);
    }

    pub fn write_context(&self, contents: &str) {
        self.write(&self.paths().context_path, contents);
    }

    pub fn write_feedback(&self, contents: &str) {
        self.write(&self.paths().feedback_path, contents);
    }

    pub fn write_config(&self, contents: &str) {
        self.write(&self.paths().config_path, contents);
    }

    pub fn read_state(&self) -> String {
        self.read(&self.paths().state_path)
    }

    pub fn read_plan(&self) -> String {
        self.read(&self.paths().plan_path)
    }

    pub fn read_feedback(&self) -> String {
        self.read(&self.paths().feedback_path)
    }

    /// HISTORY.md contents, empty when it was never written.
    pub fn read_history(&self) -> String {
        fs::read_to_string(self.paths().history_path).unwrap_or_default()
    }

    /// A complete workspace: linear plan, context, and STATE.md at `checkpoint`.
    pub fn seeded(checkpoint: &str, status: &str) -> Self {
        let ws = Self::new();
        ws.write_plan(LINEAR_PLAN);
        ws.write_context("# CONTEXT\nbuild with make\n");
        ws.write_state(&state_at(checkpoint, status));
        ws
    }
}

impl Default for TestWorkspace {
    fn default() -> Self {
        Self::new()
    }
}
