//! Waypoint configuration stored under `.waypoint/config.toml`.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::workflow::WorkflowDefinition;

/// Dispatcher configuration (TOML).
///
/// The file is optional and edited by humans; missing fields fall back to
/// the defaults below.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct WaypointConfig {
    /// Consolidation fires once the work log holds more entries than this.
    pub work_log_threshold: usize,

    /// Work-log entries kept in STATE.md after consolidation.
    pub work_log_keep: usize,

    /// Route IN_REVIEW to `requires_loop_result` until the latest loop result
    /// matches the current STATE.md.
    pub require_loop_result: bool,

    pub smoke: SmokeConfig,

    #[serde(rename = "workflow", skip_serializing_if = "Vec::is_empty")]
    pub workflows: Vec<WorkflowDefinition>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SmokeConfig {
    /// Per-command wall-clock limit.
    pub timeout_secs: u64,

    /// Keep at most this many bytes of stdout/stderr per command.
    pub output_limit_bytes: usize,

    /// Shell prefix each demo command is appended to (e.g. `["sh","-c"]`).
    pub shell: Vec<String>,
}

impl Default for SmokeConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            output_limit_bytes: 16 * 1024,
            shell: vec!["sh".to_string(), "-c".to_string()],
        }
    }
}

impl Default for WaypointConfig {
    fn default() -> Self {
        Self {
            work_log_threshold: 10,
            work_log_keep: 3,
            require_loop_result: true,
            smoke: SmokeConfig::default(),
            workflows: Vec::new(),
        }
    }
}

impl WaypointConfig {
    pub fn validate(&self) -> Result<()> {
        if self.work_log_keep > self.work_log_threshold {
            return Err(anyhow!(
                "work_log_keep ({}) must not exceed work_log_threshold ({})",
                self.work_log_keep,
                self.work_log_threshold
            ));
        }
        if self.smoke.timeout_secs == 0 {
            return Err(anyhow!("smoke.timeout_secs must be > 0"));
        }
        if self.smoke.output_limit_bytes == 0 {
            return Err(anyhow!("smoke.output_limit_bytes must be > 0"));
        }
        if self.smoke.shell.is_empty() || self.smoke.shell[0].trim().is_empty() {
            return Err(anyhow!("smoke.shell must be a non-empty array"));
        }
        for (index, workflow) in self.workflows.iter().enumerate() {
            workflow.validate()?;
            if self.workflows[..index]
                .iter()
                .any(|earlier| earlier.name == workflow.name)
            {
                return Err(anyhow!("duplicate workflow '{}'", workflow.name));
            }
        }
        Ok(())
    }

    pub fn workflow(&self, name: &str) -> Result<&WorkflowDefinition> {
        self.workflows
            .iter()
            .find(|workflow| workflow.name == name)
            .ok_or_else(|| {
                let known: Vec<&str> = self.workflows.iter().map(|w| w.name.as_str()).collect();
                anyhow!(
                    "unknown workflow '{name}' (configured: {})",
                    if known.is_empty() {
                        "none".to_string()
                    } else {
                        known.join(", ")
                    }
                )
            })
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `WaypointConfig::default()`.
pub fn load_config(path: &Path) -> Result<WaypointConfig> {
    if !path.exists() {
        debug!(path = %path.display(), "config missing, using defaults");
        return Ok(WaypointConfig::default());
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: WaypointConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("invalid config {}", path.display()))?;
    debug!(workflows = cfg.workflows.len(), "config loaded");
    Ok(cfg)
}
