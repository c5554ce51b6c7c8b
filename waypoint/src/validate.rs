//! `waypoint validate`: cross-document invariant checks.

use anyhow::{Context, Result};
use tracing::debug;

use crate::core::graph::CheckpointGraph;
use crate::core::invariants::{ValidationInput, ValidationReport, validate};
use crate::io::config::load_config;
use crate::io::paths::WorkspacePaths;
use crate::io::store::Snapshot;

/// Validate the workspace documents. An unreadable or invalid config is an
/// error rather than a finding.
pub fn validate_workspace(paths: &WorkspacePaths, strict: bool) -> Result<ValidationReport> {
    load_config(&paths.config_path).with_context(|| "load config.toml")?;
    let snapshot = Snapshot::load(paths)?;
    let graph = CheckpointGraph::build(&snapshot.plan);
    let report = validate(
        ValidationInput {
            state: &snapshot.state,
            plan: &snapshot.plan,
            graph: &graph,
            diagnostics: &snapshot.diagnostics,
        },
        strict,
    );
    debug!(
        strict,
        errors = report.errors.len(),
        warnings = report.warnings.len(),
        "validation finished"
    );
    Ok(report)
}

pub fn render_text(report: &ValidationReport) -> String {
    let mut out = String::new();
    for finding in &report.errors {
        out.push_str(&format!("error: {finding}\n"));
    }
    for finding in &report.warnings {
        out.push_str(&format!("warning: {finding}\n"));
    }
    out.push_str(if report.ok { "ok\n" } else { "failed\n" });
    out
}
