//! Reading and writing the workspace Markdown documents.
//!
//! Missing documents are not fatal: they load as empty models with a
//! diagnostic so `status` and `validate` can still report on a fresh tree.
//! Writes go through a temp file and rename.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::{debug, warn};

use super::paths::WorkspacePaths;
use crate::doc::feedback::FeedbackDocument;
use crate::doc::plan::PlanDocument;
use crate::doc::state::StateDocument;
use crate::doc::{Diagnostic, DocKind, Location, Parsed};

/// Read a file, returning `None` when it does not exist.
pub fn read_optional(path: &Path) -> Result<Option<String>> {
    match fs::read_to_string(path) {
        Ok(text) => Ok(Some(text)),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(err).with_context(|| format!("read {}", path.display())),
    }
}

fn load_required<T: Default>(
    path: &Path,
    kind: DocKind,
    parse: fn(&str) -> Parsed<T>,
) -> Result<Parsed<T>> {
    debug!(path = %path.display(), "loading document");
    match read_optional(path)? {
        Some(text) => Ok(parse(&text)),
        None => Ok(Parsed {
            model: T::default(),
            diagnostics: vec![Diagnostic::new(
                Location::document(kind),
                format!("{} not found", path.display()),
            )],
        }),
    }
}

pub fn load_state(paths: &WorkspacePaths) -> Result<Parsed<StateDocument>> {
    load_required(&paths.state_path, DocKind::State, StateDocument::parse)
}

pub fn load_plan(paths: &WorkspacePaths) -> Result<Parsed<PlanDocument>> {
    load_required(&paths.plan_path, DocKind::Plan, PlanDocument::parse)
}

/// FEEDBACK.md is optional; absence is not a diagnostic.
pub fn load_feedback(paths: &WorkspacePaths) -> Result<Option<Parsed<FeedbackDocument>>> {
    Ok(read_optional(&paths.feedback_path)?.map(|text| FeedbackDocument::parse(&text)))
}

/// Text of CONTEXT.md when it exists and is not blank.
pub fn load_context(paths: &WorkspacePaths) -> Result<Option<String>> {
    Ok(read_optional(&paths.context_path)?.filter(|text| !text.trim().is_empty()))
}

/// Atomically replace `path` with `contents` (temp file + rename).
pub fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("md.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp file {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace {}", path.display()))?;
    debug!(path = %path.display(), bytes = contents.len(), "document written");
    Ok(())
}

/// Append a dated section to HISTORY.md, creating the file with a title if needed.
pub fn append_history(path: &Path, heading: &str, lines: &[String]) -> Result<()> {
    if lines.is_empty() {
        return Ok(());
    }
    let exists = path.exists();
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("create directory {}", parent.display()))?;
    }
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("open {}", path.display()))?;

    let mut buf = String::new();
    if !exists {
        buf.push_str("# HISTORY\n");
    }
    buf.push_str(&format!("\n## {heading}\n\n"));
    for line in lines {
        buf.push_str(line);
        buf.push('\n');
    }
    file.write_all(buf.as_bytes())
        .with_context(|| format!("append {}", path.display()))?;
    debug!(path = %path.display(), heading, lines = lines.len(), "history appended");
    Ok(())
}

/// Everything the dispatcher reads, loaded once per command.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub state: StateDocument,
    /// STATE.md exactly as on disk (empty when missing), for digests.
    pub state_text: String,
    pub plan: PlanDocument,
    pub feedback: Option<FeedbackDocument>,
    pub context: Option<String>,
    pub diagnostics: Vec<Diagnostic>,
}

impl Snapshot {
    pub fn load(paths: &WorkspacePaths) -> Result<Self> {
        let state_text = read_optional(&paths.state_path)?.unwrap_or_default();
        let state = load_state(paths).context("load STATE.md")?;
        let plan = load_plan(paths).context("load PLAN.md")?;
        let feedback = load_feedback(paths).context("load FEEDBACK.md")?;
        let context = load_context(paths).context("load CONTEXT.md")?;

        let mut diagnostics = state.diagnostics;
        diagnostics.extend(plan.diagnostics);
        let feedback = feedback.map(|parsed| {
            diagnostics.extend(parsed.diagnostics);
            parsed.model
        });
        for diagnostic in &diagnostics {
            warn!(%diagnostic, "document diagnostic");
        }

        Ok(Self {
            state: state.model,
            state_text,
            plan: plan.model,
            feedback,
            context,
            diagnostics,
        })
    }

    pub fn context_present(&self) -> bool {
        self.context.is_some()
    }
}
