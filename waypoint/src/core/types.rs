//! Shared deterministic types for waypoint core logic.
//!
//! These types define stable contracts between core components. They should not
//! depend on external state or I/O and must remain deterministic across runs.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// A string did not name any variant of a closed vocabulary.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind} '{value}'")]
pub struct UnknownValue {
    pub kind: &'static str,
    pub value: String,
}

/// Match `raw` against `all` ignoring case and treating `-`/space as `_`.
fn lookup<T: Copy>(
    kind: &'static str,
    raw: &str,
    all: &[T],
    name: fn(T) -> &'static str,
) -> Result<T, UnknownValue> {
    let wanted = raw.trim().replace(['-', ' '], "_");
    all.iter()
        .copied()
        .find(|candidate| name(*candidate).eq_ignore_ascii_case(&wanted))
        .ok_or_else(|| UnknownValue {
            kind,
            value: raw.trim().to_string(),
        })
}

/// Execution status of the current checkpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Status {
    NotStarted,
    InProgress,
    InReview,
    Blocked,
    Done,
}

impl Status {
    pub const ALL: [Status; 5] = [
        Status::NotStarted,
        Status::InProgress,
        Status::InReview,
        Status::Blocked,
        Status::Done,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Status::NotStarted => "NOT_STARTED",
            Status::InProgress => "IN_PROGRESS",
            Status::InReview => "IN_REVIEW",
            Status::Blocked => "BLOCKED",
            Status::Done => "DONE",
        }
    }
}

/// Checkpoint heading marker in the plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Marker {
    #[default]
    None,
    Done,
    Skip,
}

impl Marker {
    /// DONE and SKIP both satisfy dependents.
    pub fn is_closed(self) -> bool {
        matches!(self, Marker::Done | Marker::Skip)
    }

    /// Heading prefix, e.g. `(DONE) `.
    pub fn prefix(self) -> &'static str {
        match self {
            Marker::None => "",
            Marker::Done => "(DONE) ",
            Marker::Skip => "(SKIP) ",
        }
    }
}

/// Issue impact, ordered from least to most severe.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Impact {
    Question,
    Minor,
    Major,
    Blocker,
}

impl Impact {
    pub const ALL: [Impact; 4] = [
        Impact::Question,
        Impact::Minor,
        Impact::Major,
        Impact::Blocker,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Impact::Question => "QUESTION",
            Impact::Minor => "MINOR",
            Impact::Major => "MAJOR",
            Impact::Blocker => "BLOCKER",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IssueStatus {
    Open,
    InProgress,
    Blocked,
    Resolved,
    DecisionRequired,
}

impl IssueStatus {
    pub const ALL: [IssueStatus; 5] = [
        IssueStatus::Open,
        IssueStatus::InProgress,
        IssueStatus::Blocked,
        IssueStatus::Resolved,
        IssueStatus::DecisionRequired,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            IssueStatus::Open => "OPEN",
            IssueStatus::InProgress => "IN_PROGRESS",
            IssueStatus::Blocked => "BLOCKED",
            IssueStatus::Resolved => "RESOLVED",
            IssueStatus::DecisionRequired => "DECISION_REQUIRED",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Owner {
    Agent,
    Human,
}

impl Owner {
    pub const ALL: [Owner; 2] = [Owner::Agent, Owner::Human];

    pub fn as_str(self) -> &'static str {
        match self {
            Owner::Agent => "agent",
            Owner::Human => "human",
        }
    }
}

/// Role the dispatcher recommends running next.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Implement,
    Review,
    IssuesTriage,
    Consolidation,
    Retrospective,
    Design,
    ContextCapture,
    Improvements,
    Advance,
    Stop,
    RequiresLoopResult,
}

impl Role {
    pub const ALL: [Role; 11] = [
        Role::Implement,
        Role::Review,
        Role::IssuesTriage,
        Role::Consolidation,
        Role::Retrospective,
        Role::Design,
        Role::ContextCapture,
        Role::Improvements,
        Role::Advance,
        Role::Stop,
        Role::RequiresLoopResult,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Role::Implement => "implement",
            Role::Review => "review",
            Role::IssuesTriage => "issues_triage",
            Role::Consolidation => "consolidation",
            Role::Retrospective => "retrospective",
            Role::Design => "design",
            Role::ContextCapture => "context_capture",
            Role::Improvements => "improvements",
            Role::Advance => "advance",
            Role::Stop => "stop",
            Role::RequiresLoopResult => "requires_loop_result",
        }
    }

    /// Prompt catalog id used when nothing more specific applies.
    pub fn default_prompt(self) -> Option<&'static str> {
        match self {
            Role::Implement => Some(prompts::IMPLEMENT),
            Role::Review => Some(prompts::REVIEW),
            Role::IssuesTriage => Some(prompts::ISSUES_TRIAGE),
            Role::Consolidation => Some(prompts::CONSOLIDATION),
            Role::Retrospective => Some(prompts::RETROSPECTIVE),
            Role::Design => Some(prompts::STAGE_DESIGN),
            Role::ContextCapture => Some(prompts::CONTEXT_CAPTURE),
            Role::Improvements => Some(prompts::PROCESS_IMPROVEMENTS),
            Role::Advance => Some(prompts::ADVANCE),
            Role::Stop | Role::RequiresLoopResult => None,
        }
    }
}

/// Prompt catalog ids. The catalog itself lives outside this crate.
pub mod prompts {
    pub const IMPLEMENT: &str = "prompt.checkpoint_implementation";
    pub const REVIEW: &str = "prompt.checkpoint_review";
    pub const ISSUES_TRIAGE: &str = "prompt.issues_triage";
    pub const CONSOLIDATION: &str = "prompt.consolidation";
    pub const RETROSPECTIVE: &str = "prompt.retrospective";
    pub const STAGE_DESIGN: &str = "prompt.stage_design";
    pub const CONTEXT_CAPTURE: &str = "prompt.context_capture";
    pub const PROCESS_IMPROVEMENTS: &str = "prompt.process_improvements";
    pub const ADVANCE: &str = "prompt.advance_checkpoint";
    pub const REFACTOR_SCAN: &str = "prompt.refactor_scan";
    pub const TEST_GAP_ANALYSIS: &str = "prompt.test_gap_analysis";
    pub const DOCS_GAP_ANALYSIS: &str = "prompt.docs_gap_analysis";
}

/// Known workflow flags stored in the State document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Flag {
    StageDesigned,
    RetrospectiveDone,
    MaintenanceCycleDone,
    RunContextCapture,
    RunProcessImprovements,
}

impl Flag {
    pub const ALL: [Flag; 5] = [
        Flag::StageDesigned,
        Flag::RetrospectiveDone,
        Flag::MaintenanceCycleDone,
        Flag::RunContextCapture,
        Flag::RunProcessImprovements,
    ];

    /// Flags that describe the current stage and reset when the stage changes.
    pub const STAGE_SCOPED: [Flag; 3] = [
        Flag::StageDesigned,
        Flag::RetrospectiveDone,
        Flag::MaintenanceCycleDone,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Flag::StageDesigned => "STAGE_DESIGNED",
            Flag::RetrospectiveDone => "RETROSPECTIVE_DONE",
            Flag::MaintenanceCycleDone => "MAINTENANCE_CYCLE_DONE",
            Flag::RunContextCapture => "RUN_CONTEXT_CAPTURE",
            Flag::RunProcessImprovements => "RUN_PROCESS_IMPROVEMENTS",
        }
    }
}

/// Which prompt loop produced a LOOP_RESULT.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopKind {
    Implement,
    Review,
    IssuesTriage,
    Consolidation,
    Retrospective,
    Design,
    Maintenance,
    ContextCapture,
    Improvements,
}

impl LoopKind {
    pub fn as_str(self) -> &'static str {
        match self {
            LoopKind::Implement => "implement",
            LoopKind::Review => "review",
            LoopKind::IssuesTriage => "issues_triage",
            LoopKind::Consolidation => "consolidation",
            LoopKind::Retrospective => "retrospective",
            LoopKind::Design => "design",
            LoopKind::Maintenance => "maintenance",
            LoopKind::ContextCapture => "context_capture",
            LoopKind::Improvements => "improvements",
        }
    }
}

/// Result declared by a prompt loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LoopOutcome {
    Pass,
    Fail,
    Blocked,
    Done,
}

impl LoopOutcome {
    /// PASS and DONE both mean the loop did what it was asked to do.
    pub fn is_success(self) -> bool {
        matches!(self, LoopOutcome::Pass | LoopOutcome::Done)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            LoopOutcome::Pass => "PASS",
            LoopOutcome::Fail => "FAIL",
            LoopOutcome::Blocked => "BLOCKED",
            LoopOutcome::Done => "DONE",
        }
    }
}

/// Why a smoke-test command failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GateFailureReason {
    Exit { code: i32 },
    Signal,
    TimedOut { secs: u64 },
    SpawnFailed { message: String },
}

impl fmt::Display for GateFailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GateFailureReason::Exit { code } => write!(f, "exited with code {code}"),
            GateFailureReason::Signal => write!(f, "terminated by signal"),
            GateFailureReason::TimedOut { secs } => write!(f, "timed out after {secs}s"),
            GateFailureReason::SpawnFailed { message } => write!(f, "failed to spawn: {message}"),
        }
    }
}

/// A demo command that did not pass the smoke gate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GateFailure {
    pub checkpoint: String,
    pub command: String,
    pub reason: GateFailureReason,
    /// Tail of stderr (or stdout when stderr is empty), for the triage prompt.
    pub output_tail: String,
}

impl fmt::Display for GateFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "smoke gate failed for {}: `{}` {}",
            self.checkpoint, self.command, self.reason
        )
    }
}

/// Outcome of the pre-review smoke gate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SmokeOutcome {
    /// Every declared command exited zero (possibly zero commands).
    Passed { commands_run: usize },
    Failed(GateFailure),
}

macro_rules! impl_from_str {
    ($($ty:ty => $kind:literal),* $(,)?) => {
        $(
            impl FromStr for $ty {
                type Err = UnknownValue;

                fn from_str(raw: &str) -> Result<Self, Self::Err> {
                    lookup($kind, raw, &Self::ALL, Self::as_str)
                }
            }

            impl fmt::Display for $ty {
                fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                    f.write_str(self.as_str())
                }
            }
        )*
    };
}

impl_from_str! {
    Status => "status",
    Impact => "impact",
    IssueStatus => "issue status",
    Owner => "owner",
    Role => "role",
    Flag => "flag",
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_parses_loosely() {
        assert_eq!("in_review".parse::<Status>(), Ok(Status::InReview));
        assert_eq!("IN-PROGRESS".parse::<Status>(), Ok(Status::InProgress));
        assert_eq!(" not started ".parse::<Status>(), Ok(Status::NotStarted));
        let err = "WAITING".parse::<Status>().unwrap_err();
        assert_eq!(err.to_string(), "unknown status 'WAITING'");
    }

    #[test]
    fn impact_orders_by_severity() {
        assert!(Impact::Blocker > Impact::Major);
        assert!(Impact::Major > Impact::Minor);
        assert!(Impact::Minor > Impact::Question);
    }

    #[test]
    fn roles_serialize_snake_case() {
        let json = serde_json::to_string(&Role::IssuesTriage).expect("json");
        assert_eq!(json, "\"issues_triage\"");
        assert_eq!("issues_triage".parse::<Role>(), Ok(Role::IssuesTriage));
    }

    #[test]
    fn gate_failure_display_names_command() {
        let failure = GateFailure {
            checkpoint: "1.1".to_string(),
            command: "exit 1".to_string(),
            reason: GateFailureReason::Exit { code: 1 },
            output_tail: String::new(),
        };
        assert_eq!(
            failure.to_string(),
            "smoke gate failed for 1.1: `exit 1` exited with code 1"
        );
    }
}
