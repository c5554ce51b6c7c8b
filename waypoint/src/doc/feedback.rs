//! Human feedback entries waiting to be turned into issues.

use super::items::{parse_items, render_item};
use super::markdown::{finish, trim_blank_edges};
use super::{Diagnostic, DocKind, Location, Parsed, Span};
use crate::core::types::Impact;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedbackEntry {
    pub id: String,
    pub title: String,
    /// `[x]`: already acknowledged by a human or a previous run.
    pub processed: bool,
    pub impact: Option<Impact>,
    pub fields: Vec<(String, String)>,
    pub extra_lines: Vec<String>,
    pub span: Span,
}

impl FeedbackEntry {
    /// Impact used for routing; entries without one count as MINOR.
    pub fn effective_impact(&self) -> Impact {
        self.impact.unwrap_or(Impact::Minor)
    }

    pub fn render(&self, out: &mut Vec<String>) {
        let mut fields = Vec::new();
        if let Some(impact) = self.impact {
            fields.push(("Impact".to_string(), impact.to_string()));
        }
        fields.extend(self.fields.iter().cloned());
        render_item(
            self.processed,
            &self.id,
            &self.title,
            &fields,
            &self.extra_lines,
            out,
        );
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeedbackDocument {
    /// Lines before the first entry (title, instructions).
    pub header: Vec<String>,
    pub entries: Vec<FeedbackEntry>,
    /// Non-entry lines after the first entry.
    pub notes: Vec<String>,
}

impl FeedbackDocument {
    pub fn parse(text: &str) -> Parsed<Self> {
        let lines: Vec<&str> = text.lines().collect();
        let first_item = lines
            .iter()
            .position(|line| line.starts_with("- [") || line.starts_with("* ["));
        let split = first_item.unwrap_or(lines.len());
        let mut diagnostics = Vec::new();

        let list = parse_items(
            &lines[split..],
            split + 1,
            DocKind::Feedback,
            "entries",
            &mut diagnostics,
        );

        let mut entries = Vec::new();
        for mut item in list.items {
            let mut impact = None;
            if let Some((key, value)) = item.take_field("impact") {
                match value.parse::<Impact>() {
                    Ok(parsed) => impact = Some(parsed),
                    Err(err) => {
                        diagnostics.push(Diagnostic::new(
                            Location::line(DocKind::Feedback, item.span.0),
                            format!("feedback {}: {err}", item.id),
                        ));
                        item.fields.insert(0, (key, value));
                    }
                }
            }
            entries.push(FeedbackEntry {
                id: item.id,
                title: item.title,
                processed: item.checked,
                impact,
                fields: item.fields,
                extra_lines: item.extra_lines,
                span: item.span,
            });
        }

        Parsed {
            model: FeedbackDocument {
                header: trim_blank_edges(&lines[..split]),
                entries,
                notes: list.notes,
            },
            diagnostics,
        }
    }

    pub fn render(&self) -> String {
        let mut out = Vec::new();
        if !self.header.is_empty() {
            out.extend(self.header.iter().cloned());
            out.push(String::new());
        }
        for entry in &self.entries {
            entry.render(&mut out);
        }
        if !self.notes.is_empty() {
            out.push(String::new());
            out.extend(self.notes.iter().cloned());
        }
        finish(out)
    }

    pub fn pending(&self) -> impl Iterator<Item = &FeedbackEntry> {
        self.entries.iter().filter(|entry| !entry.processed)
    }

    /// Highest-impact pending entry; the earliest one wins ties.
    pub fn most_severe_pending(&self) -> Option<&FeedbackEntry> {
        most_severe(self.pending())
    }
}

/// Highest-impact entry of `entries`; the earliest one wins ties.
pub fn most_severe<'a>(
    entries: impl IntoIterator<Item = &'a FeedbackEntry>,
) -> Option<&'a FeedbackEntry> {
    entries
        .into_iter()
        .fold(None, |best: Option<&FeedbackEntry>, entry| match best {
            Some(current) if current.effective_impact() >= entry.effective_impact() => {
                Some(current)
            }
            _ => Some(entry),
        })
}
