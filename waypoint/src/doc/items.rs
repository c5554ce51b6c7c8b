//! Checkbox item lists (`- [ ] ID: title` with indented `Key: value` fields).
//!
//! Shared by the State document's issue list and the feedback document.

use std::sync::LazyLock;

use regex::Regex;

use super::markdown::{key_value, strip_bullet};
use super::{Diagnostic, DocKind, Location, Span};

static ITEM_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[-*]\s+\[( |x|X)\]\s+([A-Za-z0-9][A-Za-z0-9_.-]*)\s*:\s*(.*)$")
        .expect("item regex compiles")
});

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Item {
    pub checked: bool,
    pub id: String,
    pub title: String,
    /// `Key: value` sub-fields in source order.
    pub fields: Vec<(String, String)>,
    /// Indented lines that are not `Key: value`.
    pub extra_lines: Vec<String>,
    pub span: Span,
}

impl Item {
    /// Remove and return the first field whose key matches `key` (case-insensitive).
    pub fn take_field(&mut self, key: &str) -> Option<(String, String)> {
        let index = self
            .fields
            .iter()
            .position(|(name, _)| name.eq_ignore_ascii_case(key))?;
        Some(self.fields.remove(index))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ItemList {
    /// Top-level lines that are not items (e.g. `(none)` placeholders).
    pub notes: Vec<String>,
    pub items: Vec<Item>,
}

/// Parse a block of checkbox items. `first_line` is the line number of `lines[0]`.
pub fn parse_items(
    lines: &[&str],
    first_line: usize,
    document: DocKind,
    section: &str,
    diagnostics: &mut Vec<Diagnostic>,
) -> ItemList {
    let mut list = ItemList::default();

    for (index, line) in lines.iter().enumerate() {
        let line_no = first_line + index;
        if line.trim().is_empty() {
            continue;
        }

        if let Some(caps) = ITEM_RE.captures(line) {
            list.items.push(Item {
                checked: !caps[1].trim().is_empty(),
                id: caps[2].to_string(),
                title: caps[3].trim().to_string(),
                fields: Vec::new(),
                extra_lines: Vec::new(),
                span: Span(line_no),
            });
            continue;
        }

        let indented = line.starts_with([' ', '\t']);
        match list.items.last_mut() {
            Some(item) if indented => {
                let content = strip_bullet(line).unwrap_or_else(|| line.trim());
                match key_value(content) {
                    Some((key, value)) => item.fields.push((key, value.to_string())),
                    None => item.extra_lines.push(line.trim().to_string()),
                }
            }
            _ => {
                if looks_like_item(line) {
                    diagnostics.push(Diagnostic::new(
                        Location::line(document, line_no).with_section(section),
                        format!("malformed item line '{}'", line.trim()),
                    ));
                }
                list.notes.push(line.trim_end().to_string());
            }
        }
    }

    list
}

fn looks_like_item(line: &str) -> bool {
    let trimmed = line.trim_start();
    (trimmed.starts_with("- [") || trimmed.starts_with("* [")) && !line.starts_with([' ', '\t'])
}

/// Render one item with the given fields (already in canonical order).
pub fn render_item(
    checked: bool,
    id: &str,
    title: &str,
    fields: &[(String, String)],
    extra_lines: &[String],
    out: &mut Vec<String>,
) {
    let mark = if checked { 'x' } else { ' ' };
    if title.is_empty() {
        out.push(format!("- [{mark}] {id}:"));
    } else {
        out.push(format!("- [{mark}] {id}: {title}"));
    }
    for (key, value) in fields {
        if value.is_empty() {
            out.push(format!("  - {key}:"));
        } else {
            out.push(format!("  - {key}: {value}"));
        }
    }
    for line in extra_lines {
        out.push(format!("  {line}"));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_items_with_fields_and_notes() {
        let text = "(none yet)\n- [ ] ISSUE-1: Broken build\n  - Impact: MAJOR\n  Owner: agent\n  see attached log\n- [x] ISSUE-2: Done thing";
        let lines: Vec<&str> = text.lines().collect();
        let mut diagnostics = Vec::new();
        let list = parse_items(&lines, 10, DocKind::State, "Active issues", &mut diagnostics);

        assert!(diagnostics.is_empty());
        assert_eq!(list.notes, vec!["(none yet)".to_string()]);
        assert_eq!(list.items.len(), 2);
        let first = &list.items[0];
        assert_eq!(first.id, "ISSUE-1");
        assert!(!first.checked);
        assert_eq!(first.span.0, 11);
        assert_eq!(
            first.fields,
            vec![
                ("Impact".to_string(), "MAJOR".to_string()),
                ("Owner".to_string(), "agent".to_string())
            ]
        );
        assert_eq!(first.extra_lines, vec!["see attached log".to_string()]);
        assert!(list.items[1].checked);
    }

    #[test]
    fn malformed_checkbox_line_is_reported() {
        let lines = vec!["- [?] ISSUE-1: odd"];
        let mut diagnostics = Vec::new();
        let list = parse_items(&lines, 3, DocKind::State, "Active issues", &mut diagnostics);
        assert!(list.items.is_empty());
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(
            diagnostics[0].location.to_string(),
            "STATE.md:3 (Active issues)"
        );
    }
}
