//! Append-only log of accepted LOOP_RESULT records (`loop_results.jsonl`).
//!
//! Each line stores the record together with the SHA-256 of STATE.md as it
//! was written after applying it. `next` compares that digest with the current
//! STATE.md to tell whether the last loop was recorded.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::debug;

use super::store::read_optional;
use crate::core::loop_result::LoopResult;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoopLogRecord {
    /// RFC 3339 timestamp.
    pub recorded_at: String,
    pub state_sha256: String,
    pub result: LoopResult,
}

impl LoopLogRecord {
    pub fn new(result: LoopResult, state_text: &str, now: DateTime<Utc>) -> Self {
        Self {
            recorded_at: now.to_rfc3339(),
            state_sha256: digest(state_text),
            result,
        }
    }
}

/// Lowercase hex SHA-256 of `text`.
pub fn digest(text: &str) -> String {
    hex::encode(Sha256::digest(text.as_bytes()))
}

pub fn append(path: &Path, record: &LoopLogRecord) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("create directory {}", parent.display()))?;
    }
    let mut line = serde_json::to_string(record).context("serialize loop log record")?;
    line.push('\n');
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("open {}", path.display()))?;
    file.write_all(line.as_bytes())
        .with_context(|| format!("append {}", path.display()))?;
    debug!(path = %path.display(), checkpoint = %record.result.checkpoint, "loop result logged");
    Ok(())
}

/// All records in file order. A missing log is empty.
pub fn read_all(path: &Path) -> Result<Vec<LoopLogRecord>> {
    let Some(text) = read_optional(path)? else {
        return Ok(Vec::new());
    };
    text.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(index, line)| {
            serde_json::from_str(line)
                .with_context(|| format!("parse {}:{}", path.display(), index + 1))
        })
        .collect()
}

pub fn latest(path: &Path) -> Result<Option<LoopLogRecord>> {
    Ok(read_all(path)?.pop())
}

pub fn count(path: &Path) -> Result<u64> {
    Ok(read_all(path)?.len() as u64)
}

/// Whether the latest record was written against exactly `state_text`.
pub fn is_recorded(path: &Path, state_text: &str) -> Result<bool> {
    let current = digest(state_text);
    Ok(latest(path)?.is_some_and(|record| record.state_sha256 == current))
}
