//! The Plan document: stages, checkpoints, and their dependency declarations.

use std::sync::LazyLock;

use regex::Regex;

use super::markdown::{
    RawSection, Section, finish, heading_line, key_value, split_sections, strip_bullet,
    trim_blank_edges,
};
use super::{Diagnostic, DocKind, Location, Parsed, Span};
use crate::core::ids::{CheckpointId, StageId, canonical_checkpoint};
use crate::core::types::Marker;

static STAGE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(?:\((skip)\)\s+)?stage\s+([0-9]+[a-z]?)\b\s*(?:[—–:-]\s*)?(.*)$")
        .expect("stage regex compiles")
});

static CHECKPOINT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(?:\((done|skip)\)\s+)?([0-9]+[a-z]?\.[0-9]+)\b\s*(?:[—–:-]\s*)?(.*)$")
        .expect("checkpoint regex compiles")
});

static DEPENDS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^depends[_ ]on\s*:\s*(.*)$").expect("depends_on regex compiles")
});

const SEPARATOR: &str = " — ";

/// A top-level `- Key: value` line of a checkpoint body plus its indented
/// continuation lines. Rendered from `raw` so the source text is kept exactly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckpointField {
    pub key: String,
    pub value: String,
    pub raw: String,
    pub continuation: Vec<String>,
}

impl CheckpointField {
    /// Inline value plus continuation lines as one text block.
    pub fn text(&self) -> String {
        let mut parts = Vec::new();
        if !self.value.is_empty() {
            parts.push(self.value.clone());
        }
        parts.extend(self.continuation.iter().map(|line| line.trim().to_string()));
        parts.join("\n")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BodyEntry {
    Field(CheckpointField),
    Text(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Checkpoint {
    pub id: CheckpointId,
    pub title: String,
    pub marker: Marker,
    pub depends_on: Vec<String>,
    pub body: Vec<BodyEntry>,
    pub span: Span,
}

impl Checkpoint {
    /// First field whose normalized key starts with `prefix`.
    pub fn field(&self, prefix: &str) -> Option<&CheckpointField> {
        self.body.iter().find_map(|entry| match entry {
            BodyEntry::Field(field) if field.key.to_ascii_lowercase().starts_with(prefix) => {
                Some(field)
            }
            _ => None,
        })
    }

    pub fn objective(&self) -> Option<String> {
        self.field("objective").map(CheckpointField::text)
    }

    pub fn acceptance(&self) -> Option<String> {
        self.field("acceptance").map(CheckpointField::text)
    }

    pub fn evidence(&self) -> Option<String> {
        self.field("evidence").map(CheckpointField::text)
    }

    /// Literal demo commands, backticks stripped, placeholders dropped.
    pub fn demo_commands(&self) -> Vec<String> {
        let Some(field) = self.field("demo") else {
            return Vec::new();
        };
        let mut commands = Vec::new();
        push_command(&field.value, &mut commands);
        for line in &field.continuation {
            if let Some(item) = strip_bullet(line) {
                push_command(item, &mut commands);
            }
        }
        commands
    }

    fn render(&self, out: &mut Vec<String>) {
        let title = if self.title.is_empty() {
            format!("{}{}", self.marker.prefix(), self.id)
        } else {
            format!("{}{}{SEPARATOR}{}", self.marker.prefix(), self.id, self.title)
        };
        out.push(heading_line(3, &title));
        out.push(format!("depends_on: [{}]", self.depends_on.join(", ")));
        out.push(String::new());
        if self.body.is_empty() {
            return;
        }
        for entry in &self.body {
            match entry {
                BodyEntry::Field(field) => {
                    out.push(field.raw.clone());
                    out.extend(field.continuation.iter().cloned());
                }
                BodyEntry::Text(line) => out.push(line.clone()),
            }
        }
        out.push(String::new());
    }
}

fn push_command(raw: &str, commands: &mut Vec<String>) {
    let command = raw.trim().trim_matches('`').trim();
    let placeholder = matches!(
        command.to_ascii_lowercase().as_str(),
        "" | "none" | "(none)" | "n/a" | "-"
    );
    if !placeholder {
        commands.push(command.to_string());
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageItem {
    Checkpoint(Checkpoint),
    Other(RawSection),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stage {
    pub id: StageId,
    pub title: String,
    pub skipped: bool,
    pub intro: Vec<String>,
    pub items: Vec<StageItem>,
    pub span: Span,
}

impl Stage {
    pub fn checkpoints(&self) -> impl Iterator<Item = &Checkpoint> {
        self.items.iter().filter_map(|item| match item {
            StageItem::Checkpoint(checkpoint) => Some(checkpoint),
            StageItem::Other(_) => None,
        })
    }

    fn render(&self, out: &mut Vec<String>) {
        let skip = if self.skipped { "(SKIP) " } else { "" };
        let title = if self.title.is_empty() {
            format!("{skip}Stage {}", self.id)
        } else {
            format!("{skip}Stage {}{SEPARATOR}{}", self.id, self.title)
        };
        out.push(heading_line(2, &title));
        out.push(String::new());
        if !self.intro.is_empty() {
            out.extend(self.intro.iter().cloned());
            out.push(String::new());
        }
        for item in &self.items {
            match item {
                StageItem::Checkpoint(checkpoint) => checkpoint.render(out),
                StageItem::Other(raw) => raw.render(out),
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlanBlock {
    Stage(Stage),
    Other(RawSection),
}

/// A checkpoint together with the stage heading it sits under.
#[derive(Debug, Clone, Copy)]
pub struct PlanEntry<'a> {
    pub stage: &'a Stage,
    pub checkpoint: &'a Checkpoint,
}

impl PlanEntry<'_> {
    /// Marker after applying a `(SKIP)` stage heading.
    pub fn marker(&self) -> Marker {
        if self.stage.skipped {
            Marker::Skip
        } else {
            self.checkpoint.marker
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlanDocument {
    pub preamble: Vec<String>,
    pub blocks: Vec<PlanBlock>,
}

impl PlanDocument {
    /// Parse Plan Markdown. Never fails; problems become diagnostics.
    pub fn parse(text: &str) -> Parsed<Self> {
        let lines: Vec<&str> = text.lines().collect();
        let (preamble, sections) = split_sections(&lines, 1, 2);
        let mut diagnostics = Vec::new();
        let mut doc = PlanDocument {
            preamble: trim_blank_edges(&preamble),
            blocks: Vec::new(),
        };

        for section in &sections {
            let block = if section.level == 2 {
                match parse_stage(section, &mut diagnostics) {
                    Some(stage) => PlanBlock::Stage(stage),
                    None => PlanBlock::Other(RawSection::from_section(section)),
                }
            } else {
                PlanBlock::Other(RawSection::from_section(section))
            };
            doc.blocks.push(block);
        }

        Parsed {
            model: doc,
            diagnostics,
        }
    }

    pub fn render(&self) -> String {
        let mut out = Vec::new();
        if !self.preamble.is_empty() {
            out.extend(self.preamble.iter().cloned());
            out.push(String::new());
        }
        for block in &self.blocks {
            match block {
                PlanBlock::Stage(stage) => stage.render(&mut out),
                PlanBlock::Other(raw) => raw.render(&mut out),
            }
        }
        finish(out)
    }

    pub fn stages(&self) -> impl Iterator<Item = &Stage> {
        self.blocks.iter().filter_map(|block| match block {
            PlanBlock::Stage(stage) => Some(stage),
            PlanBlock::Other(_) => None,
        })
    }

    /// Every checkpoint in document order.
    pub fn entries(&self) -> impl Iterator<Item = PlanEntry<'_>> {
        self.stages().flat_map(|stage| {
            stage
                .checkpoints()
                .map(move |checkpoint| PlanEntry { stage, checkpoint })
        })
    }

    /// First checkpoint with `id` in document order.
    pub fn find(&self, id: &CheckpointId) -> Option<PlanEntry<'_>> {
        self.entries().find(|entry| entry.checkpoint.id == *id)
    }

    pub fn has_stage(&self, id: &StageId) -> bool {
        self.stages().any(|stage| stage.id == *id)
    }

    /// Set the heading marker of checkpoint `id`. Returns false when absent.
    pub fn set_marker(&mut self, id: &CheckpointId, marker: Marker) -> bool {
        for block in &mut self.blocks {
            let PlanBlock::Stage(stage) = block else {
                continue;
            };
            for item in &mut stage.items {
                if let StageItem::Checkpoint(checkpoint) = item
                    && checkpoint.id == *id
                {
                    checkpoint.marker = marker;
                    return true;
                }
            }
        }
        false
    }
}

fn parse_stage(section: &Section<'_>, diagnostics: &mut Vec<Diagnostic>) -> Option<Stage> {
    let location = Location::line(DocKind::Plan, section.line);
    let Some(caps) = STAGE_RE.captures(section.title) else {
        if section.title.to_ascii_lowercase().starts_with("stage") {
            diagnostics.push(Diagnostic::new(
                location,
                format!("unrecognized stage heading '{}'", section.title),
            ));
        }
        return None;
    };
    let id = match caps[2].parse::<StageId>() {
        Ok(id) => id,
        Err(message) => {
            diagnostics.push(Diagnostic::new(location, message));
            return None;
        }
    };
    let (title, trailing_skip) = strip_trailing_marker(caps[3].trim());
    let skipped = caps.get(1).is_some() || trailing_skip == Some(Marker::Skip);

    let (intro, subsections) = split_sections(&section.body, section.line + 1, 3);
    let mut items = Vec::new();
    for sub in &subsections {
        let item = if sub.level == 3 {
            parse_checkpoint(sub, diagnostics)
                .map(StageItem::Checkpoint)
                .unwrap_or_else(|| StageItem::Other(RawSection::from_section(sub)))
        } else {
            StageItem::Other(RawSection::from_section(sub))
        };
        items.push(item);
    }

    Some(Stage {
        id,
        title: title.to_string(),
        skipped,
        intro: trim_blank_edges(&intro),
        items,
        span: Span(section.line),
    })
}

fn strip_trailing_marker(title: &str) -> (&str, Option<Marker>) {
    let upper = title.to_ascii_uppercase();
    for (suffix, marker) in [("(DONE)", Marker::Done), ("(SKIP)", Marker::Skip)] {
        if upper.ends_with(suffix) {
            return (title[..title.len() - suffix.len()].trim_end(), Some(marker));
        }
    }
    (title, None)
}

fn parse_checkpoint(section: &Section<'_>, diagnostics: &mut Vec<Diagnostic>) -> Option<Checkpoint> {
    let location = Location::line(DocKind::Plan, section.line);
    let Some(caps) = CHECKPOINT_RE.captures(section.title) else {
        if section.title.starts_with(|c: char| c.is_ascii_digit() || c == '(') {
            diagnostics.push(Diagnostic::new(
                location,
                format!("unrecognized checkpoint heading '{}'", section.title),
            ));
        }
        return None;
    };
    let id = match caps[2].parse::<CheckpointId>() {
        Ok(id) => id,
        Err(message) => {
            diagnostics.push(Diagnostic::new(location, message));
            return None;
        }
    };
    let (title, trailing) = strip_trailing_marker(caps[3].trim());
    let marker = match caps.get(1).map(|m| m.as_str().to_ascii_uppercase()) {
        Some(prefix) if prefix == "DONE" => Marker::Done,
        Some(_) => Marker::Skip,
        None => trailing.unwrap_or_default(),
    };

    let mut depends_on = Vec::new();
    let mut seen_depends = false;
    let mut body: Vec<BodyEntry> = Vec::new();
    let mut first_content = true;

    for (index, line) in section.body.iter().enumerate() {
        let line_no = section.body_line(index);
        let is_blank = line.trim().is_empty();

        if !is_blank && let Some(caps) = DEPENDS_RE.captures(line.trim()) {
            if seen_depends {
                diagnostics.push(Diagnostic::new(
                    Location::line(DocKind::Plan, line_no),
                    format!("checkpoint {id} declares depends_on more than once"),
                ));
                body.push(BodyEntry::Text(line.trim_end().to_string()));
            } else {
                if !first_content {
                    diagnostics.push(Diagnostic::new(
                        Location::line(DocKind::Plan, line_no),
                        format!("depends_on of checkpoint {id} should directly follow its heading"),
                    ));
                }
                depends_on = parse_depends(&caps[1]);
                seen_depends = true;
            }
            first_content = false;
            continue;
        }
        if !is_blank {
            first_content = false;
        }

        let indented = line.starts_with([' ', '\t']);
        if indented && !is_blank {
            let blanks = body
                .iter()
                .rev()
                .take_while(|entry| matches!(entry, BodyEntry::Text(text) if text.trim().is_empty()))
                .count();
            let follows_field = body
                .len()
                .checked_sub(blanks + 1)
                .is_some_and(|at| matches!(body[at], BodyEntry::Field(_)));
            if follows_field {
                body.truncate(body.len() - blanks);
                if let Some(BodyEntry::Field(field)) = body.last_mut() {
                    field.continuation.extend(std::iter::repeat_n(String::new(), blanks));
                    field.continuation.push(line.trim_end().to_string());
                }
                continue;
            }
        }

        let field = (!indented)
            .then(|| strip_bullet(line))
            .flatten()
            .and_then(key_value);
        match field {
            Some((key, value)) => body.push(BodyEntry::Field(CheckpointField {
                key,
                value: value.to_string(),
                raw: line.trim_end().to_string(),
                continuation: Vec::new(),
            })),
            None => body.push(BodyEntry::Text(line.trim_end().to_string())),
        }
    }

    Some(Checkpoint {
        id,
        title: title.to_string(),
        marker,
        depends_on,
        body: trim_blank_entries(body),
        span: Span(section.line),
    })
}

fn trim_blank_entries(mut body: Vec<BodyEntry>) -> Vec<BodyEntry> {
    let blank = |entry: &BodyEntry| matches!(entry, BodyEntry::Text(text) if text.trim().is_empty());
    while body.last().is_some_and(blank) {
        body.pop();
    }
    let leading = body.iter().take_while(|entry| blank(*entry)).count();
    body.drain(..leading);
    body
}

fn parse_depends(raw: &str) -> Vec<String> {
    let inner = raw.trim().trim_start_matches('[').trim_end_matches(']').trim();
    if inner.is_empty() || inner.eq_ignore_ascii_case("none") {
        return Vec::new();
    }
    inner
        .split(',')
        .map(|dep| dep.trim().trim_matches(['`', '"', '\'']).trim())
        .filter(|dep| !dep.is_empty())
        .map(canonical_checkpoint)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
# PLAN

Shared notes.

## Stage 1 — Foundations

Get the basics in place.

### (DONE) 1.0 — Bootstrap
depends_on: []

- Objective: create the skeleton
- Demo commands:
  - `cargo test`
  - `./run.sh --check`
- Evidence: CI run 12

### 1.1 — Parser
depends_on: [1.0]

- Objective: parse things
- Acceptance: round trip holds
- Demo commands: (none)

### 1.2 — Writer
depends_on: [1.1]

## (SKIP) Stage 2 — Later

### 2.0 — Maybe
depends_on: [1.2]

## Appendix

Free text.
";

    #[test]
    fn parses_stages_and_checkpoints() {
        let parsed = PlanDocument::parse(SAMPLE);
        assert!(parsed.diagnostics.is_empty(), "{:?}", parsed.diagnostics);
        let plan = parsed.model;
        let ids: Vec<String> = plan.entries().map(|e| e.checkpoint.id.to_string()).collect();
        assert_eq!(ids, vec!["1.0", "1.1", "1.2", "2.0"]);

        let first = plan.find(&"1.0".parse().expect("id")).expect("1.0");
        assert_eq!(first.marker(), Marker::Done);
        assert_eq!(first.checkpoint.demo_commands(), vec!["cargo test", "./run.sh --check"]);
        assert_eq!(first.checkpoint.objective().as_deref(), Some("create the skeleton"));

        let second = plan.find(&"1.1".parse().expect("id")).expect("1.1");
        assert_eq!(second.checkpoint.depends_on, vec!["1.0".to_string()]);
        assert!(second.checkpoint.demo_commands().is_empty());

        let skipped = plan.find(&"2.0".parse().expect("id")).expect("2.0");
        assert_eq!(skipped.checkpoint.marker, Marker::None);
        assert_eq!(skipped.marker(), Marker::Skip);
    }

    #[test]
    fn canonical_plan_is_byte_stable() {
        assert_eq!(PlanDocument::parse(SAMPLE).model.render(), SAMPLE);
    }

    #[test]
    fn set_marker_rewrites_heading_only() {
        let mut plan = PlanDocument::parse(SAMPLE).model;
        assert!(plan.set_marker(&"1.1".parse().expect("id"), Marker::Done));
        let rendered = plan.render();
        assert!(rendered.contains("### (DONE) 1.1 — Parser\ndepends_on: [1.0]\n"));
        assert!(!plan.set_marker(&"9.9".parse().expect("id"), Marker::Done));
    }

    #[test]
    fn loose_headings_normalize_and_round_trip() {
        let text = "## Stage 3: Loose\n### 3.1: Thing (DONE)\n\ndepends_on: 3.0, `03.2`\n- Objective: x\n### 3.0 - Base\n";
        let parsed = PlanDocument::parse(text);
        assert!(parsed.diagnostics.is_empty(), "{:?}", parsed.diagnostics);
        let plan = parsed.model;
        let entry = plan.find(&"3.1".parse().expect("id")).expect("3.1");
        assert_eq!(entry.checkpoint.marker, Marker::Done);
        assert_eq!(entry.checkpoint.title, "Thing");
        assert_eq!(entry.checkpoint.depends_on, vec!["3.0".to_string(), "3.2".to_string()]);

        let reparsed = PlanDocument::parse(&plan.render()).model;
        assert_eq!(reparsed, plan);
    }

    #[test]
    fn misplaced_depends_on_is_diagnosed() {
        let text = "## Stage 1 — A\n\n### 1.0 — X\n- Objective: y\ndepends_on: [0.9]\n";
        let parsed = PlanDocument::parse(text);
        assert_eq!(parsed.diagnostics.len(), 1);
        assert_eq!(parsed.diagnostics[0].location.line, Some(5));
        let entry = parsed.model.find(&"1.0".parse().expect("id")).map(|e| e.checkpoint.depends_on.clone());
        assert_eq!(entry, Some(vec!["0.9".to_string()]));
    }

    #[test]
    fn demo_items_after_a_blank_line_stay_with_their_field() {
        let text = "## Stage 1 — A\n\n### 1.1 — X\ndepends_on: []\n\n- Demo commands:\n\n  - `exit 1`\n\n  - `make demo`\n- Evidence: log\n";
        let parsed = PlanDocument::parse(text);
        assert!(parsed.diagnostics.is_empty(), "{:?}", parsed.diagnostics);
        let entry = parsed.model.find(&"1.1".parse().expect("id")).expect("1.1");
        assert_eq!(entry.checkpoint.demo_commands(), vec!["exit 1", "make demo"]);
        assert_eq!(parsed.model.render(), text);
    }

    #[test]
    fn malformed_headings_are_kept_verbatim() {
        let text = "## Stage one\n\nprose\n\n## Stage 2 — Ok\n\n### 2.x — bad\n\nbody\n";
        let parsed = PlanDocument::parse(text);
        assert_eq!(parsed.diagnostics.len(), 2);
        assert_eq!(parsed.model.entries().count(), 0);
        assert_eq!(parsed.model.render(), text);
    }
}
