//! Typed document model for the workspace Markdown files.
//!
//! Parsers never fail: they always return a (possibly partial) model together
//! with diagnostics pointing at a document and line. Serializers are the
//! inverse on canonical documents, and unknown sections survive verbatim.

pub mod feedback;
pub mod items;
pub mod markdown;
pub mod plan;
pub mod state;

use std::fmt;

use serde::Serialize;

/// Which workspace document a location refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum DocKind {
    #[serde(rename = "STATE.md")]
    State,
    #[serde(rename = "PLAN.md")]
    Plan,
    #[serde(rename = "HISTORY.md")]
    History,
    #[serde(rename = "CONTEXT.md")]
    Context,
    #[serde(rename = "FEEDBACK.md")]
    Feedback,
    #[serde(rename = "loop_results.jsonl")]
    LoopLog,
    #[serde(rename = "config.toml")]
    Config,
}

impl DocKind {
    pub fn file_name(self) -> &'static str {
        match self {
            DocKind::State => "STATE.md",
            DocKind::Plan => "PLAN.md",
            DocKind::History => "HISTORY.md",
            DocKind::Context => "CONTEXT.md",
            DocKind::Feedback => "FEEDBACK.md",
            DocKind::LoopLog => "loop_results.jsonl",
            DocKind::Config => "config.toml",
        }
    }
}

/// Document plus line and/or section a finding refers to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Location {
    pub document: DocKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub section: Option<String>,
}

impl Location {
    pub fn document(document: DocKind) -> Self {
        Self {
            document,
            line: None,
            section: None,
        }
    }

    pub fn line(document: DocKind, line: usize) -> Self {
        Self {
            document,
            line: Some(line),
            section: None,
        }
    }

    pub fn section(document: DocKind, section: impl Into<String>) -> Self {
        Self {
            document,
            line: None,
            section: Some(section.into()),
        }
    }

    pub fn with_section(mut self, section: impl Into<String>) -> Self {
        self.section = Some(section.into());
        self
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.document.file_name())?;
        if let Some(line) = self.line {
            write!(f, ":{line}")?;
        }
        if let Some(section) = &self.section {
            write!(f, " ({section})")?;
        }
        Ok(())
    }
}

/// Recoverable problem found while parsing a document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub location: Location,
    pub message: String,
}

impl Diagnostic {
    pub fn new(location: Location, message: impl Into<String>) -> Self {
        Self {
            location,
            message: message.into(),
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.location, self.message)
    }
}

/// Parser output: the model recovered so far plus everything that went wrong.
#[derive(Debug, Clone, PartialEq)]
pub struct Parsed<T> {
    pub model: T,
    pub diagnostics: Vec<Diagnostic>,
}

impl<T> Parsed<T> {
    pub fn clean(model: T) -> Self {
        Self {
            model,
            diagnostics: Vec::new(),
        }
    }
}

/// 1-based source line of a parsed element.
///
/// Always compares equal: two models that differ only in where their elements
/// sat in the source text are the same model.
#[derive(Debug, Clone, Copy, Default, Eq, Serialize)]
#[serde(transparent)]
pub struct Span(pub usize);

impl PartialEq for Span {
    fn eq(&self, _other: &Self) -> bool {
        true
    }
}
