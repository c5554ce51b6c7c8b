//! `LOOP_RESULT:` records emitted by prompt loops.
//!
//! The payload is a single-line JSON object following the literal token. It is
//! checked against the bundled JSON Schema before deserialization so rejects
//! name every violated constraint at once.

use std::collections::BTreeMap;

use jsonschema::Draft;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::ids::{CheckpointId, StageId};
use crate::core::types::{LoopKind, LoopOutcome, Role, Status};
use crate::doc::state::single_line;

pub const TOKEN: &str = "LOOP_RESULT:";

const LOOP_RESULT_SCHEMA: &str = include_str!("../../schemas/loop_result.schema.json");

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoopResult {
    #[serde(rename = "loop")]
    pub loop_kind: LoopKind,
    pub result: LoopOutcome,
    pub stage: String,
    pub checkpoint: String,
    pub status: Status,
    pub next_role_hint: Role,
    pub report: LoopReport,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LoopReport {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub acceptance_matrix: Vec<AcceptanceRow>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub top_findings: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_transition: Option<StateTransition>,
    /// Free-form report fields.
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcceptanceRow {
    pub criterion: String,
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evidence: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateTransition {
    pub before: String,
    pub after: String,
}

/// Why a LOOP_RESULT was refused. State is never modified when one of these
/// is returned.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RecordError {
    #[error("no `{TOKEN}` token found in input")]
    MissingToken,
    #[error("LOOP_RESULT payload is not valid JSON: {0}")]
    Json(String),
    #[error("LOOP_RESULT failed schema validation: {}", .0.join("; "))]
    Schema(Vec<String>),
    #[error("LOOP_RESULT stage {stage} does not own checkpoint {checkpoint}")]
    StageMismatch { stage: String, checkpoint: String },
    #[error(
        "stale LOOP_RESULT: it reports checkpoint {reported} but STATE.md points at {current}"
    )]
    Stale { reported: String, current: String },
    #[error("bundled LOOP_RESULT schema is invalid: {0}")]
    BadSchema(String),
}

impl LoopResult {
    /// Find the last `LOOP_RESULT:` line in `text` and parse its payload.
    pub fn extract(text: &str) -> Result<Self, RecordError> {
        let payload = text
            .lines()
            .rev()
            .find_map(|line| line.find(TOKEN).map(|at| &line[at + TOKEN.len()..]))
            .ok_or(RecordError::MissingToken)?;
        Self::parse_payload(payload)
    }

    /// Parse the JSON following the token. Trailing text after the object is ignored.
    pub fn parse_payload(payload: &str) -> Result<Self, RecordError> {
        let value = serde_json::Deserializer::from_str(payload.trim())
            .into_iter::<Value>()
            .next()
            .ok_or_else(|| RecordError::Json("empty payload".to_string()))?
            .map_err(|err| RecordError::Json(err.to_string()))?;
        validate_schema(&value)?;
        let mut result: LoopResult =
            serde_json::from_value(value).map_err(|err| RecordError::Json(err.to_string()))?;
        let checkpoint: CheckpointId = result
            .checkpoint
            .parse()
            .map_err(|message| RecordError::Schema(vec![message]))?;
        let stage: StageId = result
            .stage
            .parse()
            .map_err(|message| RecordError::Schema(vec![message]))?;
        if checkpoint.stage != stage {
            return Err(RecordError::StageMismatch {
                stage: result.stage,
                checkpoint: result.checkpoint,
            });
        }
        result.checkpoint = checkpoint.to_string();
        result.stage = stage.to_string();
        Ok(result)
    }

    /// Dated one-line summary for the State work log.
    pub fn work_log_entry(&self, date: &str) -> String {
        let mut entry = format!(
            "{date} {}: {} ({})",
            self.loop_kind.as_str(),
            self.result.as_str(),
            self.checkpoint
        );
        if let Some(finding) = self.report.top_findings.first() {
            entry.push_str(" - ");
            entry.push_str(&single_line(finding));
        }
        entry
    }
}

fn validate_schema(instance: &Value) -> Result<(), RecordError> {
    let schema: Value = serde_json::from_str(LOOP_RESULT_SCHEMA)
        .map_err(|err| RecordError::BadSchema(err.to_string()))?;
    let compiled = jsonschema::options()
        .with_draft(Draft::Draft202012)
        .build(&schema)
        .map_err(|err| RecordError::BadSchema(err.to_string()))?;
    let messages: Vec<String> = compiled
        .iter_errors(instance)
        .map(|err| err.to_string())
        .collect();
    if messages.is_empty() {
        Ok(())
    } else {
        Err(RecordError::Schema(messages))
    }
}
