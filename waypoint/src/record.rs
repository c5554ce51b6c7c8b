//! `waypoint loop-result` and `waypoint advance`: the only commands that
//! write STATE.md and PLAN.md.
//!
//! A rejected LOOP_RESULT leaves every document untouched; the error chain
//! carries a [`RecordError`] so the CLI can pick its exit code.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

use crate::core::loop_result::{LoopResult, RecordError};
use crate::core::transition::{Advanced, Archive, advance, apply_loop_result, check_fresh};
use crate::core::types::{LoopKind, LoopOutcome, Status};
use crate::doc::Parsed;
use crate::doc::plan::PlanDocument;
use crate::doc::state::StateDocument;
use crate::io::config::load_config;
use crate::io::loop_log::{self, LoopLogRecord};
use crate::io::paths::WorkspacePaths;
use crate::io::store::{append_history, load_plan, load_state, write_atomic};

/// What an accepted LOOP_RESULT changed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecordSummary {
    #[serde(rename = "loop")]
    pub loop_kind: LoopKind,
    pub result: LoopOutcome,
    /// Pointer after the transition.
    pub checkpoint: Option<String>,
    pub status: Option<Status>,
    pub effects: Vec<String>,
    pub state_sha256: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AdvanceSummary {
    pub from: String,
    pub to: String,
    pub stage_changed: bool,
}

fn load_documents(paths: &WorkspacePaths) -> Result<(StateDocument, PlanDocument)> {
    let state = load_state(paths).context("load STATE.md")?;
    let plan = load_plan(paths).context("load PLAN.md")?;
    Ok((keep_model(state), keep_model(plan)))
}

fn keep_model<T>(parsed: Parsed<T>) -> T {
    for diagnostic in &parsed.diagnostics {
        warn!(%diagnostic, "document diagnostic");
    }
    parsed.model
}

fn archive_lines(archive: &Archive) -> (Vec<String>, Vec<String>) {
    let work_log = archive
        .work_log
        .iter()
        .map(|entry| format!("- {entry}"))
        .collect();
    let mut issues = Vec::new();
    for issue in &archive.resolved_issues {
        issue.render(&mut issues);
    }
    (work_log, issues)
}

/// Parse the LOOP_RESULT in `text`, apply it, and persist every document it
/// touches.
pub fn record_loop_result(
    paths: &WorkspacePaths,
    text: &str,
    now: DateTime<Utc>,
) -> Result<RecordSummary> {
    let config = load_config(&paths.config_path).with_context(|| "load config.toml")?;
    let result = LoopResult::extract(text)?;
    let (mut state, mut plan) = load_documents(paths)?;
    check_fresh(&result, &state)?;

    let date = now.format("%Y-%m-%d").to_string();
    let applied = apply_loop_result(&result, &mut state, &mut plan, &date, config.work_log_keep);

    if applied.plan_changed {
        write_atomic(&paths.plan_path, &plan.render()).context("write PLAN.md")?;
    }
    let state_text = state.render();
    write_atomic(&paths.state_path, &state_text).context("write STATE.md")?;

    let (work_log, issues) = archive_lines(&applied.archive);
    append_history(&paths.history_path, &format!("{date} Work log"), &work_log)
        .context("archive work log")?;
    append_history(
        &paths.history_path,
        &format!("{date} Resolved issues"),
        &issues,
    )
    .context("archive resolved issues")?;

    let record = LoopLogRecord::new(result, &state_text, now);
    loop_log::append(&paths.loop_log_path, &record).context("append loop log")?;

    info!(
        loop_kind = record.result.loop_kind.as_str(),
        result = record.result.result.as_str(),
        effects = applied.effects.len(),
        "loop result recorded"
    );
    Ok(RecordSummary {
        loop_kind: record.result.loop_kind,
        result: record.result.result,
        checkpoint: state.state.checkpoint.clone(),
        status: state.state.status,
        effects: applied.effects,
        state_sha256: record.state_sha256,
    })
}

/// Move a DONE checkpoint to the next READY one and persist the change.
pub fn advance_workspace(paths: &WorkspacePaths) -> Result<AdvanceSummary> {
    let (mut state, mut plan) = load_documents(paths)?;
    let Advanced {
        from,
        to,
        stage_changed,
        plan_changed,
    } = advance(&mut state, &mut plan)?;
    if plan_changed {
        write_atomic(&paths.plan_path, &plan.render()).context("write PLAN.md")?;
    }
    write_atomic(&paths.state_path, &state.render()).context("write STATE.md")?;
    info!(%from, %to, stage_changed, "advanced");
    Ok(AdvanceSummary {
        from: from.to_string(),
        to: to.to_string(),
        stage_changed,
    })
}

/// The [`RecordError`] behind a failed [`record_loop_result`], if that is why it failed.
pub fn rejection(err: &anyhow::Error) -> Option<&RecordError> {
    err.downcast_ref::<RecordError>()
}
