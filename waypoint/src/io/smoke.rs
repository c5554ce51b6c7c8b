//! Pre-review smoke gate: runs a checkpoint's literal demo commands.

use std::path::PathBuf;
use std::process::Command;
use std::time::Duration;

use anyhow::Result;
use tracing::{info, warn};

use super::config::SmokeConfig;
use super::process::run_command_with_timeout;
use crate::core::types::{GateFailure, GateFailureReason, SmokeOutcome};
use crate::doc::plan::Checkpoint;

/// Characters of failing output carried into the triage reason.
pub const OUTPUT_TAIL_CHARS: usize = 2000;

#[derive(Debug, Clone)]
pub struct SmokeRequest {
    pub workdir: PathBuf,
    pub checkpoint: String,
    pub commands: Vec<String>,
    pub timeout: Duration,
    pub output_limit_bytes: usize,
    pub shell: Vec<String>,
}

impl SmokeRequest {
    pub fn for_checkpoint(
        workdir: impl Into<PathBuf>,
        checkpoint: &Checkpoint,
        config: &SmokeConfig,
    ) -> Self {
        Self {
            workdir: workdir.into(),
            checkpoint: checkpoint.id.to_string(),
            commands: checkpoint.demo_commands(),
            timeout: Duration::from_secs(config.timeout_secs),
            output_limit_bytes: config.output_limit_bytes,
            shell: config.shell.clone(),
        }
    }
}

pub trait SmokeRunner {
    fn run(&self, request: &SmokeRequest) -> Result<SmokeOutcome>;
}

/// Runs each command through the configured shell, in order, stopping at the
/// first failure. Command failures become [`GateFailure`] values, never errors.
pub struct ShellSmokeRunner;

impl SmokeRunner for ShellSmokeRunner {
    fn run(&self, request: &SmokeRequest) -> Result<SmokeOutcome> {
        for (index, command) in request.commands.iter().enumerate() {
            info!(checkpoint = %request.checkpoint, command = %command, "running demo command");
            if let Some((reason, output_tail)) = run_one(request, command) {
                let failure = GateFailure {
                    checkpoint: request.checkpoint.clone(),
                    command: command.clone(),
                    reason,
                    output_tail,
                };
                warn!(%failure, "smoke gate failed");
                return Ok(SmokeOutcome::Failed(failure));
            }
            info!(done = index + 1, total = request.commands.len(), "demo command passed");
        }
        Ok(SmokeOutcome::Passed {
            commands_run: request.commands.len(),
        })
    }
}

fn run_one(request: &SmokeRequest, command: &str) -> Option<(GateFailureReason, String)> {
    let (program, prefix) = match request.shell.split_first() {
        Some(split) => split,
        None => {
            return Some((
                GateFailureReason::SpawnFailed {
                    message: "no shell configured".to_string(),
                },
                String::new(),
            ));
        }
    };
    let mut cmd = Command::new(program);
    cmd.args(prefix).arg(command).current_dir(&request.workdir);

    let output = match run_command_with_timeout(cmd, request.timeout, request.output_limit_bytes) {
        Ok(output) => output,
        Err(err) => {
            return Some((
                GateFailureReason::SpawnFailed {
                    message: format!("{err:#}"),
                },
                String::new(),
            ));
        }
    };

    let tail = output.tail(OUTPUT_TAIL_CHARS);
    if output.timed_out {
        return Some((
            GateFailureReason::TimedOut {
                secs: request.timeout.as_secs(),
            },
            tail,
        ));
    }
    if output.status.success() {
        return None;
    }
    let reason = match output.status.code() {
        Some(code) => GateFailureReason::Exit { code },
        None => GateFailureReason::Signal,
    };
    Some((reason, tail))
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FakeSmokeRunner {
        outcome: SmokeOutcome,
    }

    impl SmokeRunner for FakeSmokeRunner {
        fn run(&self, _request: &SmokeRequest) -> Result<SmokeOutcome> {
            Ok(self.outcome.clone())
        }
    }

    fn request(dir: &std::path::Path, commands: &[&str]) -> SmokeRequest {
        SmokeRequest {
            workdir: dir.to_path_buf(),
            checkpoint: "1.1".to_string(),
            commands: commands.iter().map(|c| c.to_string()).collect(),
            timeout: Duration::from_secs(10),
            output_limit_bytes: 4096,
            shell: vec!["sh".to_string(), "-c".to_string()],
        }
    }

    #[test]
    fn runner_is_swappable_behind_trait() {
        let temp = tempfile::tempdir().expect("tempdir");
        let runner = FakeSmokeRunner {
            outcome: SmokeOutcome::Passed { commands_run: 7 },
        };
        let dyn_runner: &dyn SmokeRunner = &runner;
        assert_eq!(
            dyn_runner.run(&request(temp.path(), &[])).expect("run"),
            SmokeOutcome::Passed { commands_run: 7 }
        );
    }

    #[test]
    fn no_commands_pass_trivially() {
        let temp = tempfile::tempdir().expect("tempdir");
        let outcome = ShellSmokeRunner
            .run(&request(temp.path(), &[]))
            .expect("run");
        assert_eq!(outcome, SmokeOutcome::Passed { commands_run: 0 });
    }

    #[cfg(unix)]
    #[test]
    fn passing_commands_run_in_workdir() {
        let temp = tempfile::tempdir().expect("tempdir");
        let outcome = ShellSmokeRunner
            .run(&request(temp.path(), &["true", "touch marker", "test -f marker"]))
            .expect("run");
        assert_eq!(outcome, SmokeOutcome::Passed { commands_run: 3 });
        assert!(temp.path().join("marker").exists());
    }

    #[cfg(unix)]
    #[test]
    fn first_failure_stops_the_gate() {
        let temp = tempfile::tempdir().expect("tempdir");
        let outcome = ShellSmokeRunner
            .run(&request(
                temp.path(),
                &["echo boom >&2; exit 1", "touch never"],
            ))
            .expect("run");
        let SmokeOutcome::Failed(failure) = outcome else {
            panic!("expected failure");
        };
        assert_eq!(failure.command, "echo boom >&2; exit 1");
        assert_eq!(failure.reason, GateFailureReason::Exit { code: 1 });
        assert_eq!(failure.output_tail, "boom");
        assert!(!temp.path().join("never").exists());
    }

    #[cfg(unix)]
    #[test]
    fn timeout_is_a_gate_failure() {
        let temp = tempfile::tempdir().expect("tempdir");
        let mut req = request(temp.path(), &["sleep 5"]);
        req.timeout = Duration::from_millis(200);
        let outcome = ShellSmokeRunner.run(&req).expect("run");
        let SmokeOutcome::Failed(failure) = outcome else {
            panic!("expected failure");
        };
        assert_eq!(failure.reason, GateFailureReason::TimedOut { secs: 0 });
    }

    #[test]
    fn missing_shell_is_a_gate_failure() {
        let temp = tempfile::tempdir().expect("tempdir");
        let mut req = request(temp.path(), &["true"]);
        req.shell = vec!["no-such-shell-waypoint".to_string()];
        let outcome = ShellSmokeRunner.run(&req).expect("run");
        assert!(matches!(
            outcome,
            SmokeOutcome::Failed(GateFailure {
                reason: GateFailureReason::SpawnFailed { .. },
                ..
            })
        ));
    }
}
