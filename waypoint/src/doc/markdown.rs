//! Minimal Markdown outline handling shared by every document parser.
//!
//! Only ATX headings (`#`, `##`, ...) are structural. Headings inside fenced
//! code blocks are ignored.

use serde::Serialize;

/// A heading and the lines that follow it up to the next split point.
#[derive(Debug, Clone)]
pub struct Section<'a> {
    pub level: usize,
    pub title: &'a str,
    /// 1-based line of the heading.
    pub line: usize,
    pub body: Vec<&'a str>,
}

impl Section<'_> {
    /// 1-based line number of `body[index]`.
    pub fn body_line(&self, index: usize) -> usize {
        self.line + 1 + index
    }
}

/// A section kept verbatim because no parser claims it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RawSection {
    pub level: usize,
    pub title: String,
    pub body: Vec<String>,
}

impl RawSection {
    pub fn from_section(section: &Section<'_>) -> Self {
        Self {
            level: section.level,
            title: section.title.to_string(),
            body: trim_blank_edges(&section.body),
        }
    }

    pub fn render(&self, out: &mut Vec<String>) {
        out.push(heading_line(self.level, &self.title));
        out.push(String::new());
        if !self.body.is_empty() {
            out.extend(self.body.iter().cloned());
            out.push(String::new());
        }
    }
}

/// Parse an ATX heading into `(level, title)`.
pub fn heading(line: &str) -> Option<(usize, &str)> {
    let level = line.chars().take_while(|c| *c == '#').count();
    if level == 0 || level > 6 {
        return None;
    }
    let rest = &line[level..];
    if rest.is_empty() {
        return Some((level, ""));
    }
    if !rest.starts_with([' ', '\t']) {
        return None;
    }
    Some((level, rest.trim().trim_end_matches('#').trim_end()))
}

pub fn heading_line(level: usize, title: &str) -> String {
    let hashes = "#".repeat(level);
    if title.is_empty() {
        hashes
    } else {
        format!("{hashes} {title}")
    }
}

fn is_fence(line: &str) -> bool {
    let trimmed = line.trim_start();
    trimmed.starts_with("```") || trimmed.starts_with("~~~")
}

/// Split `lines` at every heading of level `<= max_level`.
///
/// `first_line` is the 1-based line number of `lines[0]`. Returns the lines
/// before the first split point and the sections in order.
pub fn split_sections<'a>(
    lines: &[&'a str],
    first_line: usize,
    max_level: usize,
) -> (Vec<&'a str>, Vec<Section<'a>>) {
    let mut preamble = Vec::new();
    let mut sections: Vec<Section<'a>> = Vec::new();
    let mut in_fence = false;

    for (index, line) in lines.iter().copied().enumerate() {
        if is_fence(line) {
            in_fence = !in_fence;
        }
        let split = if in_fence { None } else { heading(line) };
        match split {
            Some((level, title)) if level <= max_level => sections.push(Section {
                level,
                title,
                line: first_line + index,
                body: Vec::new(),
            }),
            _ => match sections.last_mut() {
                Some(section) => section.body.push(line),
                None => preamble.push(line),
            },
        }
    }

    (preamble, sections)
}

/// Drop leading and trailing blank lines, keeping interior lines verbatim.
pub fn trim_blank_edges(lines: &[&str]) -> Vec<String> {
    let start = lines.iter().position(|line| !line.trim().is_empty());
    let end = lines.iter().rposition(|line| !line.trim().is_empty());
    match (start, end) {
        (Some(start), Some(end)) => lines[start..=end]
            .iter()
            .map(|line| line.trim_end().to_string())
            .collect(),
        _ => Vec::new(),
    }
}

/// Join rendered lines into a document with exactly one trailing newline.
pub fn finish(mut lines: Vec<String>) -> String {
    while lines.last().is_some_and(|line| line.is_empty()) {
        lines.pop();
    }
    let mut text = lines.join("\n");
    text.push('\n');
    text
}

/// Strip a leading `- ` or `* ` bullet marker.
pub fn strip_bullet(line: &str) -> Option<&str> {
    let trimmed = line.trim_start();
    trimmed
        .strip_prefix("- ")
        .or_else(|| trimmed.strip_prefix("* "))
        .map(str::trim)
}

/// Split `Key: value`, tolerating `**Key:**` emphasis around the key.
pub fn key_value(text: &str) -> Option<(String, &str)> {
    let (key, value) = text.split_once(':')?;
    let key = key.trim().trim_matches('*').trim();
    let value = value.trim_start_matches('*').trim();
    if key.is_empty() || key.contains('`') {
        return None;
    }
    Some((key.to_string(), value))
}
