//! `waypoint feedback inject|ack`: move human feedback into STATE.md issues
//! and archive it once those issues are resolved.

use anyhow::{Context, Result, bail};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

use crate::core::types::{IssueStatus, Owner};
use crate::doc::feedback::{FeedbackDocument, FeedbackEntry};
use crate::doc::state::{Issue, StateDocument};
use crate::io::paths::WorkspacePaths;
use crate::io::store::{append_history, load_feedback, load_state, write_atomic};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FeedbackSummary {
    pub dry_run: bool,
    /// Entries turned into new issues.
    pub injected: Vec<String>,
    /// Pending entries that already had a matching issue.
    pub already_tracked: Vec<String>,
    /// Entries moved to HISTORY.md.
    pub archived: Vec<String>,
}

fn load_documents(paths: &WorkspacePaths) -> Result<(FeedbackDocument, StateDocument)> {
    let Some(feedback) = load_feedback(paths).context("load FEEDBACK.md")? else {
        bail!("{} not found", paths.feedback_path.display());
    };
    let state = load_state(paths).context("load STATE.md")?;
    for diagnostic in feedback.diagnostics.iter().chain(&state.diagnostics) {
        warn!(%diagnostic, "document diagnostic");
    }
    Ok((feedback.model, state.model))
}

fn issue_from(entry: &FeedbackEntry) -> Issue {
    let mut issue = Issue::new(entry.id.clone(), entry.title.clone());
    issue.impact = Some(entry.effective_impact());
    issue.status = Some(IssueStatus::Open);
    issue.owner = Some(Owner::Agent);
    issue.unblock_condition = Some("feedback addressed and verified".to_string());
    issue.evidence_needed = Some(format!("{} acknowledged in FEEDBACK.md", entry.id));
    issue.extra_fields = entry.fields.clone();
    issue.extra_lines = entry.extra_lines.clone();
    issue
}

/// Add an OPEN, agent-owned issue for every pending entry not yet tracked.
pub fn inject(paths: &WorkspacePaths, dry_run: bool) -> Result<FeedbackSummary> {
    let (feedback, mut state) = load_documents(paths)?;
    let mut summary = FeedbackSummary {
        dry_run,
        ..FeedbackSummary::default()
    };
    for entry in feedback.pending() {
        if state.issue(&entry.id).is_some() {
            summary.already_tracked.push(entry.id.clone());
            continue;
        }
        state.issues.push(issue_from(entry));
        summary.injected.push(entry.id.clone());
    }
    if !dry_run && !summary.injected.is_empty() {
        write_atomic(&paths.state_path, &state.render()).context("write STATE.md")?;
        info!(count = summary.injected.len(), "feedback injected");
    }
    Ok(summary)
}

/// Archive entries that are marked `[x]` or whose issue is RESOLVED.
pub fn ack(paths: &WorkspacePaths, dry_run: bool, now: DateTime<Utc>) -> Result<FeedbackSummary> {
    let (mut feedback, state) = load_documents(paths)?;
    let done = |entry: &FeedbackEntry| {
        entry.processed || state.issue(&entry.id).is_some_and(Issue::is_resolved)
    };
    let (archived, remaining): (Vec<FeedbackEntry>, Vec<FeedbackEntry>) =
        std::mem::take(&mut feedback.entries)
            .into_iter()
            .partition(|entry| done(entry));
    feedback.entries = remaining;

    let summary = FeedbackSummary {
        dry_run,
        archived: archived.iter().map(|entry| entry.id.clone()).collect(),
        ..FeedbackSummary::default()
    };
    if dry_run || archived.is_empty() {
        return Ok(summary);
    }

    let mut lines = Vec::new();
    for mut entry in archived {
        entry.processed = true;
        entry.render(&mut lines);
    }
    let heading = format!("{} Feedback", now.format("%Y-%m-%d"));
    append_history(&paths.history_path, &heading, &lines).context("archive feedback")?;
    write_atomic(&paths.feedback_path, &feedback.render()).context("write FEEDBACK.md")?;
    info!(count = summary.archived.len(), "feedback acknowledged");
    Ok(summary)
}

pub fn render_text(summary: &FeedbackSummary) -> String {
    let mut out = String::new();
    let prefix = if summary.dry_run { "would " } else { "" };
    for id in &summary.injected {
        out.push_str(&format!("{prefix}inject {id}\n"));
    }
    for id in &summary.already_tracked {
        out.push_str(&format!("already tracked {id}\n"));
    }
    for id in &summary.archived {
        out.push_str(&format!("{prefix}archive {id}\n"));
    }
    if out.is_empty() {
        out.push_str("nothing to do\n");
    }
    out
}
