//! `waypoint status`: read-only summary of where the workflow stands.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use anyhow::Result;
use serde::Serialize;

use crate::core::graph::CheckpointGraph;
use crate::core::types::Status;
use crate::doc::Diagnostic;
use crate::io::config::load_config;
use crate::io::paths::WorkspacePaths;
use crate::io::store::Snapshot;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusReport {
    pub stage: Option<String>,
    pub checkpoint: Option<String>,
    pub status: Option<Status>,
    pub checkpoint_title: Option<String>,
    pub next_checkpoint: Option<String>,
    /// Unresolved issues keyed by impact.
    pub open_issues: BTreeMap<String, usize>,
    pub flags: BTreeMap<String, bool>,
    pub work_log_entries: usize,
    pub work_log_threshold: usize,
    pub pending_feedback: usize,
    pub context_present: bool,
    pub diagnostics: Vec<Diagnostic>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

pub fn status_report(paths: &WorkspacePaths, with_context: bool) -> Result<StatusReport> {
    let config = load_config(&paths.config_path)?;
    let snapshot = Snapshot::load(paths)?;
    let graph = CheckpointGraph::build(&snapshot.plan);
    let state = &snapshot.state.state;

    let current = state.checkpoint_id();
    let checkpoint_title = current
        .as_ref()
        .and_then(|id| snapshot.plan.find(id))
        .map(|entry| entry.checkpoint.title.clone());
    let next_checkpoint = current
        .as_ref()
        .and_then(|id| graph.next_after(&id.to_string()))
        .map(|node| node.id.clone());

    let mut open_issues = BTreeMap::new();
    for issue in snapshot.state.issues.iter().filter(|i| !i.is_resolved()) {
        let impact = issue
            .impact
            .map_or_else(|| "UNSET".to_string(), |impact| impact.to_string());
        *open_issues.entry(impact).or_insert(0) += 1;
    }

    Ok(StatusReport {
        stage: state.stage.clone(),
        checkpoint: state.checkpoint.clone(),
        status: state.status,
        checkpoint_title,
        next_checkpoint,
        open_issues,
        flags: state.flags.entries().into_iter().collect(),
        work_log_entries: state.work_log.len(),
        work_log_threshold: config.work_log_threshold,
        pending_feedback: snapshot
            .feedback
            .as_ref()
            .map_or(0, |feedback| feedback.pending().count()),
        context_present: snapshot.context_present(),
        diagnostics: snapshot.diagnostics.clone(),
        context: if with_context {
            snapshot.context.clone()
        } else {
            None
        },
    })
}

impl StatusReport {
    pub fn render_text(&self) -> String {
        let mut out = String::new();
        let dash = |value: &Option<String>| value.clone().unwrap_or_else(|| "-".to_string());
        let _ = writeln!(out, "stage:       {}", dash(&self.stage));
        let checkpoint = match (&self.checkpoint, &self.checkpoint_title) {
            (Some(id), Some(title)) if !title.is_empty() => format!("{id} ({title})"),
            (Some(id), _) => id.clone(),
            (None, _) => "-".to_string(),
        };
        let _ = writeln!(out, "checkpoint:  {checkpoint}");
        let _ = writeln!(
            out,
            "status:      {}",
            self.status.map_or_else(|| "-".to_string(), |s| s.to_string())
        );
        let _ = writeln!(out, "next:        {}", dash(&self.next_checkpoint));
        let issues = if self.open_issues.is_empty() {
            "none".to_string()
        } else {
            self.open_issues
                .iter()
                .map(|(impact, count)| format!("{count} {impact}"))
                .collect::<Vec<_>>()
                .join(", ")
        };
        let _ = writeln!(out, "issues:      {issues}");
        let _ = writeln!(
            out,
            "work log:    {}/{}",
            self.work_log_entries, self.work_log_threshold
        );
        let set: Vec<&str> = self
            .flags
            .iter()
            .filter(|(_, on)| **on)
            .map(|(name, _)| name.as_str())
            .collect();
        let _ = writeln!(
            out,
            "flags:       {}",
            if set.is_empty() { "none".to_string() } else { set.join(", ") }
        );
        let _ = writeln!(out, "feedback:    {} pending", self.pending_feedback);
        let _ = writeln!(
            out,
            "context:     {}",
            if self.context_present { "present" } else { "missing" }
        );
        for diagnostic in &self.diagnostics {
            let _ = writeln!(out, "warning: {diagnostic}");
        }
        if let Some(context) = &self.context {
            let _ = writeln!(out, "\n{}", context.trim_end());
        }
        out
    }
}
