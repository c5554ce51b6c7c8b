//! Named workflow overlays declared in `config.toml`.
//!
//! A workflow never outranks trigger escalation. When every trigger of the
//! selected workflow holds, its first matching step replaces the role and
//! prompt chosen by default routing.

use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};

use crate::core::types::{Role, Status};
use crate::doc::state::ExecutionState;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub triggers: Vec<WorkflowTrigger>,
    #[serde(default)]
    pub steps: Vec<WorkflowStep>,
}

/// Predicate over the current state, e.g. `{ status = "IN_PROGRESS" }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowTrigger {
    Status(Status),
    FlagSet(String),
    FlagUnset(String),
}

impl WorkflowTrigger {
    pub fn holds(&self, state: &ExecutionState) -> bool {
        match self {
            WorkflowTrigger::Status(status) => {
                state.status.unwrap_or(Status::NotStarted) == *status
            }
            WorkflowTrigger::FlagSet(name) => state.flags.get_named(name),
            WorkflowTrigger::FlagUnset(name) => !state.flags.get_named(name),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowStep {
    pub prompt_id: String,
    pub role: Role,
    /// Default-route role this step replaces; any role when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub when: Option<Role>,
    /// Only run on every N-th recorded loop.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub every: Option<u64>,
}

impl WorkflowStep {
    fn matches(&self, routed: Role, loop_count: u64) -> bool {
        let role_matches = self.when.is_none_or(|when| when == routed);
        let due = self.every.is_none_or(|every| loop_count % every == 0);
        role_matches && due
    }
}

/// Replacement chosen by a workflow overlay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Overlay {
    pub role: Role,
    pub prompt_id: String,
    pub note: String,
}

impl WorkflowDefinition {
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            bail!("workflow name must not be empty");
        }
        if self.steps.is_empty() {
            bail!("workflow '{}' must declare at least one step", self.name);
        }
        for step in &self.steps {
            if step.prompt_id.trim().is_empty() {
                bail!("workflow '{}' has a step without prompt_id", self.name);
            }
            if step.every == Some(0) {
                bail!("workflow '{}' step {}: every must be > 0", self.name, step.prompt_id);
            }
        }
        Ok(())
    }

    /// Step that replaces the default route `routed`, if any. `stop` and the
    /// loop-result gate are never replaced.
    pub fn overlay(&self, state: &ExecutionState, routed: Role, loop_count: u64) -> Option<Overlay> {
        if matches!(routed, Role::Stop | Role::RequiresLoopResult) {
            return None;
        }
        if !self.triggers.iter().all(|trigger| trigger.holds(state)) {
            return None;
        }
        let step = self
            .steps
            .iter()
            .find(|step| step.matches(routed, loop_count))?;
        Some(Overlay {
            role: step.role,
            prompt_id: step.prompt_id.clone(),
            note: format!("workflow '{}' step {}", self.name, step.prompt_id),
        })
    }
}
