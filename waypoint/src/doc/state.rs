//! The State document: current pointer, work log, flags, evidence, and issues.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;

use super::items::{Item, parse_items, render_item};
use super::markdown::{
    RawSection, Section, finish, heading_line, key_value, split_sections, strip_bullet,
    trim_blank_edges,
};
use super::{Diagnostic, DocKind, Location, Parsed, Span};
use crate::core::ids::{CheckpointId, StageId};
use crate::core::types::{Flag, Impact, IssueStatus, Owner, Status};

static FLAG_CHECKBOX_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[-*]\s+\[( |x|X)\]\s+([A-Za-z][A-Za-z0-9_]*)\s*$").expect("flag regex compiles")
});

/// Sections of the State document the parser understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StateSection {
    Focus,
    WorkLog,
    Flags,
    Evidence,
    Issues,
}

impl StateSection {
    pub const ALL: [StateSection; 5] = [
        StateSection::Focus,
        StateSection::WorkLog,
        StateSection::Flags,
        StateSection::Evidence,
        StateSection::Issues,
    ];

    fn prefix(self) -> &'static str {
        match self {
            StateSection::Focus => "current focus",
            StateSection::WorkLog => "work log",
            StateSection::Flags => "workflow state",
            StateSection::Evidence => "evidence",
            StateSection::Issues => "active issues",
        }
    }

    pub fn default_title(self) -> &'static str {
        match self {
            StateSection::Focus => "Current focus",
            StateSection::WorkLog => "Work log",
            StateSection::Flags => "Workflow state",
            StateSection::Evidence => "Evidence",
            StateSection::Issues => "Active issues",
        }
    }

    fn classify(title: &str) -> Option<Self> {
        let lowered = title.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|section| lowered.starts_with(section.prefix()))
    }
}

/// Layout entry: a known section (rendered from the model) or verbatim text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StateBlock {
    Known { section: StateSection, title: String },
    Other(RawSection),
}

/// Named booleans that gate periodic triggers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkflowFlags {
    pub stage_designed: bool,
    pub retrospective_done: bool,
    pub maintenance_cycle_done: bool,
    pub run_context_capture: bool,
    pub run_process_improvements: bool,
    /// Flags this version does not know about, preserved as written.
    pub extra: BTreeMap<String, bool>,
}

impl WorkflowFlags {
    pub fn get(&self, flag: Flag) -> bool {
        match flag {
            Flag::StageDesigned => self.stage_designed,
            Flag::RetrospectiveDone => self.retrospective_done,
            Flag::MaintenanceCycleDone => self.maintenance_cycle_done,
            Flag::RunContextCapture => self.run_context_capture,
            Flag::RunProcessImprovements => self.run_process_improvements,
        }
    }

    pub fn set(&mut self, flag: Flag, value: bool) {
        let slot = match flag {
            Flag::StageDesigned => &mut self.stage_designed,
            Flag::RetrospectiveDone => &mut self.retrospective_done,
            Flag::MaintenanceCycleDone => &mut self.maintenance_cycle_done,
            Flag::RunContextCapture => &mut self.run_context_capture,
            Flag::RunProcessImprovements => &mut self.run_process_improvements,
        };
        *slot = value;
    }

    /// Look up a known or passthrough flag by name; unknown names read as unset.
    pub fn get_named(&self, name: &str) -> bool {
        match name.parse::<Flag>() {
            Ok(flag) => self.get(flag),
            Err(_) => self
                .extra
                .get(&name.trim().to_ascii_uppercase())
                .copied()
                .unwrap_or(false),
        }
    }

    /// Clear every flag that describes the stage being left.
    pub fn reset_stage_scoped(&mut self) {
        for flag in Flag::STAGE_SCOPED {
            self.set(flag, false);
        }
    }

    /// Known flags in canonical order followed by passthrough flags.
    pub fn entries(&self) -> Vec<(String, bool)> {
        let mut entries: Vec<(String, bool)> = Flag::ALL
            .iter()
            .map(|flag| (flag.as_str().to_string(), self.get(*flag)))
            .collect();
        entries.extend(self.extra.iter().map(|(name, value)| (name.clone(), *value)));
        entries
    }

    fn is_default(&self) -> bool {
        self == &Self::default()
    }
}

/// Singleton execution pointer for the repository.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionState {
    /// Raw stage value as written (see [`ExecutionState::stage_id`]).
    pub stage: Option<String>,
    /// Raw checkpoint value as written (see [`ExecutionState::checkpoint_id`]).
    pub checkpoint: Option<String>,
    pub status: Option<Status>,
    /// Focus-section lines that are not stage/checkpoint/status.
    pub focus_notes: Vec<String>,
    pub work_log: Vec<String>,
    pub evidence: Vec<String>,
    pub flags: WorkflowFlags,
    /// Workflow-state lines that are not flags, kept verbatim.
    pub flag_notes: Vec<String>,
}

impl ExecutionState {
    pub fn stage_id(&self) -> Option<StageId> {
        first_token(self.stage.as_deref())?.parse().ok()
    }

    pub fn checkpoint_id(&self) -> Option<CheckpointId> {
        first_token(self.checkpoint.as_deref())?.parse().ok()
    }

    /// Stage number when the stage is a plain integer (no suffix).
    pub fn stage_number(&self) -> Option<u32> {
        first_token(self.stage.as_deref())?.parse().ok()
    }

    /// Point at `checkpoint` with a fresh status.
    pub fn point_at(&mut self, checkpoint: CheckpointId) {
        self.stage = Some(checkpoint.stage.to_string());
        self.checkpoint = Some(checkpoint.to_string());
        self.status = Some(Status::NotStarted);
    }
}

fn first_token(value: Option<&str>) -> Option<&str> {
    value?.split_whitespace().next()
}

/// An entry of the `Active issues` section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Issue {
    pub id: String,
    pub title: String,
    pub checked: bool,
    pub impact: Option<Impact>,
    pub status: Option<IssueStatus>,
    pub owner: Option<Owner>,
    pub unblock_condition: Option<String>,
    pub evidence_needed: Option<String>,
    /// Unknown or unparsable `Key: value` fields, preserved.
    pub extra_fields: Vec<(String, String)>,
    pub extra_lines: Vec<String>,
    pub span: Span,
}

impl Issue {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            checked: false,
            impact: None,
            status: None,
            owner: None,
            unblock_condition: None,
            evidence_needed: None,
            extra_fields: Vec::new(),
            extra_lines: Vec::new(),
            span: Span::default(),
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.status == Some(IssueStatus::Resolved)
    }

    /// Required fields that are absent or unparsable.
    pub fn missing_required_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.impact.is_none() {
            missing.push("Impact");
        }
        if self.status.is_none() {
            missing.push("Status");
        }
        if self.owner.is_none() {
            missing.push("Owner");
        }
        if is_blank(self.unblock_condition.as_deref()) {
            missing.push("Unblock Condition");
        }
        if is_blank(self.evidence_needed.as_deref()) {
            missing.push("Evidence Needed");
        }
        missing
    }

    fn from_item(mut item: Item, diagnostics: &mut Vec<Diagnostic>) -> Self {
        let location = Location::line(DocKind::State, item.span.0).with_section("Active issues");
        let mut issue = Issue::new(item.id.clone(), item.title.clone());
        issue.checked = item.checked;
        issue.span = item.span;

        for (key, value) in std::mem::take(&mut item.fields) {
            let parsed = match normalize_key(&key).as_str() {
                "impact" => parse_enum(&value, &mut issue.impact),
                "status" => parse_enum(&value, &mut issue.status),
                "owner" => parse_enum(&value, &mut issue.owner),
                "unblock condition" => set_text(&value, &mut issue.unblock_condition),
                "evidence needed" => set_text(&value, &mut issue.evidence_needed),
                _ => Ok(false),
            };
            match parsed {
                Ok(true) => {}
                Ok(false) => issue.extra_fields.push((key, value)),
                Err(message) => {
                    diagnostics.push(Diagnostic::new(
                        location.clone(),
                        format!("issue {}: {message}", issue.id),
                    ));
                    issue.extra_fields.push((key, value));
                }
            }
        }
        issue.extra_lines = item.extra_lines;
        issue
    }

    /// Checklist item plus indented fields, as it appears under Active issues.
    pub fn render(&self, out: &mut Vec<String>) {
        let mut fields = Vec::new();
        if let Some(impact) = self.impact {
            fields.push(("Impact".to_string(), impact.to_string()));
        }
        if let Some(status) = self.status {
            fields.push(("Status".to_string(), status.to_string()));
        }
        if let Some(owner) = self.owner {
            fields.push(("Owner".to_string(), owner.to_string()));
        }
        if let Some(text) = &self.unblock_condition {
            fields.push(("Unblock Condition".to_string(), text.clone()));
        }
        if let Some(text) = &self.evidence_needed {
            fields.push(("Evidence Needed".to_string(), text.clone()));
        }
        fields.extend(self.extra_fields.iter().cloned());
        render_item(
            self.checked,
            &self.id,
            &self.title,
            &fields,
            &self.extra_lines,
            out,
        );
    }
}

fn is_blank(value: Option<&str>) -> bool {
    value.is_none_or(|text| text.trim().is_empty())
}

fn normalize_key(key: &str) -> String {
    key.trim().to_ascii_lowercase().replace(['_', '-'], " ")
}

/// Returns `Ok(true)` when consumed, `Ok(false)` when the slot is already taken.
fn parse_enum<T: std::str::FromStr>(value: &str, slot: &mut Option<T>) -> Result<bool, String>
where
    T::Err: std::fmt::Display,
{
    if slot.is_some() {
        return Ok(false);
    }
    let parsed = value.parse::<T>().map_err(|err| err.to_string())?;
    *slot = Some(parsed);
    Ok(true)
}

fn set_text(value: &str, slot: &mut Option<String>) -> Result<bool, String> {
    if slot.is_some() {
        return Ok(false);
    }
    *slot = Some(value.to_string());
    Ok(true)
}

/// Parsed State document, including the layout needed to write it back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateDocument {
    pub preamble: Vec<String>,
    pub blocks: Vec<StateBlock>,
    pub state: ExecutionState,
    /// Non-item lines of the issues section.
    pub issue_notes: Vec<String>,
    pub issues: Vec<Issue>,
}

impl Default for StateDocument {
    fn default() -> Self {
        let mut blocks = vec![StateBlock::Other(RawSection {
            level: 1,
            title: "STATE".to_string(),
            body: Vec::new(),
        })];
        blocks.extend(StateSection::ALL.into_iter().map(|section| StateBlock::Known {
            section,
            title: section.default_title().to_string(),
        }));
        Self {
            preamble: Vec::new(),
            blocks,
            state: ExecutionState::default(),
            issue_notes: Vec::new(),
            issues: Vec::new(),
        }
    }
}

impl StateDocument {
    /// Parse State Markdown. Never fails; problems become diagnostics.
    pub fn parse(text: &str) -> Parsed<Self> {
        let lines: Vec<&str> = text.lines().collect();
        let (preamble, sections) = split_sections(&lines, 1, 2);
        let mut diagnostics = Vec::new();
        let mut doc = StateDocument {
            preamble: trim_blank_edges(&preamble),
            blocks: Vec::new(),
            state: ExecutionState::default(),
            issue_notes: Vec::new(),
            issues: Vec::new(),
        };

        for section in &sections {
            let known = (section.level == 2)
                .then(|| StateSection::classify(section.title))
                .flatten();
            let Some(kind) = known else {
                doc.blocks.push(StateBlock::Other(RawSection::from_section(section)));
                continue;
            };
            if doc.has_block(kind) {
                diagnostics.push(Diagnostic::new(
                    Location::line(DocKind::State, section.line),
                    format!(
                        "duplicate '{}' section kept verbatim and ignored",
                        section.title
                    ),
                ));
                doc.blocks.push(StateBlock::Other(RawSection::from_section(section)));
                continue;
            }
            doc.blocks.push(StateBlock::Known {
                section: kind,
                title: section.title.to_string(),
            });
            match kind {
                StateSection::Focus => parse_focus(section, &mut doc.state, &mut diagnostics),
                StateSection::WorkLog => doc.state.work_log = parse_work_log(section),
                StateSection::Flags => {
                    let (flags, notes) = parse_flags(section, &mut diagnostics);
                    doc.state.flags = flags;
                    doc.state.flag_notes = notes;
                }
                StateSection::Evidence => doc.state.evidence = trim_blank_edges(&section.body),
                StateSection::Issues => {
                    let list = parse_items(
                        &section.body,
                        section.line + 1,
                        DocKind::State,
                        section.title,
                        &mut diagnostics,
                    );
                    doc.issue_notes = list.notes;
                    doc.issues = list
                        .items
                        .into_iter()
                        .map(|item| Issue::from_item(item, &mut diagnostics))
                        .collect();
                }
            }
        }

        for kind in [StateSection::Focus, StateSection::Issues] {
            if !doc.has_block(kind) {
                diagnostics.push(Diagnostic::new(
                    Location::document(DocKind::State),
                    format!("missing '{}' section", kind.default_title()),
                ));
            }
        }

        Parsed {
            model: doc,
            diagnostics,
        }
    }

    /// Serialize back to Markdown. Known sections absent from the layout are
    /// appended when they carry content.
    pub fn render(&self) -> String {
        let mut out = Vec::new();
        if !self.preamble.is_empty() {
            out.extend(self.preamble.iter().cloned());
            out.push(String::new());
        }
        for block in &self.blocks {
            match block {
                StateBlock::Known { section, title } => self.render_known(*section, title, &mut out),
                StateBlock::Other(raw) => raw.render(&mut out),
            }
        }
        for section in StateSection::ALL {
            if !self.has_block(section) && self.has_content(section) {
                self.render_known(section, section.default_title(), &mut out);
            }
        }
        finish(out)
    }

    pub fn issue(&self, id: &str) -> Option<&Issue> {
        self.issues.iter().find(|issue| issue.id == id)
    }

    fn has_block(&self, kind: StateSection) -> bool {
        self.blocks
            .iter()
            .any(|block| matches!(block, StateBlock::Known { section, .. } if *section == kind))
    }

    fn has_content(&self, kind: StateSection) -> bool {
        let state = &self.state;
        match kind {
            StateSection::Focus => {
                state.stage.is_some()
                    || state.checkpoint.is_some()
                    || state.status.is_some()
                    || !state.focus_notes.is_empty()
            }
            StateSection::WorkLog => !state.work_log.is_empty(),
            StateSection::Flags => !state.flags.is_default() || !state.flag_notes.is_empty(),
            StateSection::Evidence => !state.evidence.is_empty(),
            StateSection::Issues => !self.issues.is_empty() || !self.issue_notes.is_empty(),
        }
    }

    fn render_known(&self, kind: StateSection, title: &str, out: &mut Vec<String>) {
        out.push(heading_line(2, title));
        out.push(String::new());
        let start = out.len();
        let state = &self.state;
        match kind {
            StateSection::Focus => {
                if let Some(stage) = &state.stage {
                    out.push(format!("- Stage: {stage}"));
                }
                if let Some(checkpoint) = &state.checkpoint {
                    out.push(format!("- Checkpoint: {checkpoint}"));
                }
                if let Some(status) = state.status {
                    out.push(format!("- Status: {status}"));
                }
                out.extend(state.focus_notes.iter().cloned());
            }
            StateSection::WorkLog => {
                out.extend(
                    state
                        .work_log
                        .iter()
                        .map(|entry| format!("- {}", single_line(entry))),
                );
            }
            StateSection::Flags => {
                for (name, value) in state.flags.entries() {
                    let mark = if value { 'x' } else { ' ' };
                    out.push(format!("- [{mark}] {name}"));
                }
                out.extend(state.flag_notes.iter().cloned());
            }
            StateSection::Evidence => out.extend(state.evidence.iter().cloned()),
            StateSection::Issues => {
                out.extend(self.issue_notes.iter().cloned());
                for issue in &self.issues {
                    issue.render(out);
                }
            }
        }
        if out.len() > start {
            out.push(String::new());
        }
    }
}

fn parse_focus(section: &Section<'_>, state: &mut ExecutionState, diagnostics: &mut Vec<Diagnostic>) {
    for (index, line) in section.body.iter().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let location = Location::line(DocKind::State, section.body_line(index))
            .with_section(section.title);
        let content = strip_bullet(line).unwrap_or_else(|| line.trim());
        let Some((key, value)) = key_value(content) else {
            state.focus_notes.push(line.trim_end().to_string());
            continue;
        };
        let value = value.trim();
        let key = normalize_key(&key);
        let recognized = matches!(key.as_str(), "stage" | "checkpoint" | "status");
        if recognized && value.is_empty() {
            diagnostics.push(Diagnostic::new(location, format!("'{key}' has no value")));
            state.focus_notes.push(line.trim_end().to_string());
            continue;
        }
        let accepted = match key.as_str() {
            "stage" if state.stage.is_none() => {
                if value.split_whitespace().next().and_then(|t| t.parse::<StageId>().ok()).is_none() {
                    diagnostics.push(Diagnostic::new(
                        location.clone(),
                        format!("stage '{value}' is not a valid stage id"),
                    ));
                }
                state.stage = Some(value.to_string());
                true
            }
            "checkpoint" if state.checkpoint.is_none() => {
                if value
                    .split_whitespace()
                    .next()
                    .and_then(|t| t.parse::<CheckpointId>().ok())
                    .is_none()
                {
                    diagnostics.push(Diagnostic::new(
                        location.clone(),
                        format!("checkpoint '{value}' is not a valid checkpoint id"),
                    ));
                }
                state.checkpoint = Some(value.to_string());
                true
            }
            "status" if state.status.is_none() => match value.parse::<Status>() {
                Ok(status) => {
                    state.status = Some(status);
                    true
                }
                Err(err) => {
                    diagnostics.push(Diagnostic::new(location.clone(), err.to_string()));
                    false
                }
            },
            "stage" | "checkpoint" | "status" => {
                diagnostics.push(Diagnostic::new(
                    location.clone(),
                    format!("duplicate '{key}' entry ignored"),
                ));
                false
            }
            _ => false,
        };
        if !accepted {
            state.focus_notes.push(line.trim_end().to_string());
        }
    }
}

fn parse_work_log(section: &Section<'_>) -> Vec<String> {
    section
        .body
        .iter()
        .filter(|line| !line.trim().is_empty())
        .map(|line| {
            strip_bullet(line)
                .unwrap_or_else(|| line.trim())
                .to_string()
        })
        .filter(|entry| !entry.is_empty())
        .collect()
}

/// Collapse runs of whitespace so an entry stays on one list line.
pub fn single_line(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn parse_flags(
    section: &Section<'_>,
    diagnostics: &mut Vec<Diagnostic>,
) -> (WorkflowFlags, Vec<String>) {
    let mut flags = WorkflowFlags::default();
    let mut notes = Vec::new();
    for (index, line) in section.body.iter().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let parsed = if let Some(caps) = FLAG_CHECKBOX_RE.captures(line.trim_start()) {
            Some((caps[2].to_string(), !caps[1].trim().is_empty()))
        } else {
            let content = strip_bullet(line).unwrap_or_else(|| line.trim());
            key_value(content).and_then(|(name, value)| parse_bool(value).map(|b| (name, b)))
        };
        let Some((name, value)) = parsed else {
            diagnostics.push(Diagnostic::new(
                Location::line(DocKind::State, section.body_line(index))
                    .with_section(section.title),
                format!("unrecognized flag line '{}' kept verbatim", line.trim()),
            ));
            notes.push(line.trim_end().to_string());
            continue;
        };
        match name.parse::<Flag>() {
            Ok(flag) => flags.set(flag, value),
            Err(_) => {
                flags.extra.insert(name.to_ascii_uppercase(), value);
            }
        }
    }
    (flags, notes)
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "yes" | "1" | "x" => Some(true),
        "false" | "no" | "0" | "" => Some(false),
        _ => None,
    }
}
