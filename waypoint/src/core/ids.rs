//! Stage and checkpoint identifiers.
//!
//! A stage id is an integer with an optional single uppercase suffix (`12`,
//! `12A`). Checkpoint ids are `<stage>.<minor>`. Both order by their parts, so
//! `12 < 12A < 12B < 13` and `12.2 < 12.10`.

use std::fmt;
use std::str::FromStr;

use serde::{Serialize, Serializer};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StageId {
    pub number: u32,
    /// `None` sorts before any letter.
    pub suffix: Option<char>,
}

impl StageId {
    pub fn new(number: u32, suffix: Option<char>) -> Self {
        Self { number, suffix }
    }
}

impl fmt::Display for StageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.suffix {
            Some(suffix) => write!(f, "{}{}", self.number, suffix),
            None => write!(f, "{}", self.number),
        }
    }
}

impl FromStr for StageId {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let trimmed = raw.trim();
        let digits_end = trimmed
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(trimmed.len());
        if digits_end == 0 {
            return Err(format!("stage id '{trimmed}' must start with digits"));
        }
        let number = trimmed[..digits_end]
            .parse::<u32>()
            .map_err(|err| format!("stage id '{trimmed}': {err}"))?;
        let mut rest = trimmed[digits_end..].chars();
        let suffix = match (rest.next(), rest.next()) {
            (None, _) => None,
            (Some(letter), None) if letter.is_ascii_uppercase() => Some(letter),
            _ => {
                return Err(format!(
                    "stage id '{trimmed}' may only end with one uppercase letter"
                ));
            }
        };
        Ok(Self { number, suffix })
    }
}

impl Serialize for StageId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CheckpointId {
    pub stage: StageId,
    pub minor: u32,
}

impl CheckpointId {
    pub fn new(stage: StageId, minor: u32) -> Self {
        Self { stage, minor }
    }
}

impl fmt::Display for CheckpointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.stage, self.minor)
    }
}

impl FromStr for CheckpointId {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let trimmed = raw.trim();
        let (stage, minor) = trimmed
            .rsplit_once('.')
            .ok_or_else(|| format!("checkpoint id '{trimmed}' must look like <stage>.<minor>"))?;
        let stage = stage.parse::<StageId>()?;
        if minor.is_empty() || !minor.chars().all(|c| c.is_ascii_digit()) {
            return Err(format!("checkpoint id '{trimmed}' has a non-numeric minor part"));
        }
        let minor = minor
            .parse::<u32>()
            .map_err(|err| format!("checkpoint id '{trimmed}': {err}"))?;
        Ok(Self { stage, minor })
    }
}

impl Serialize for CheckpointId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Canonicalize a raw id string when it parses as a checkpoint id (`01.2` → `1.2`).
pub fn canonical_checkpoint(raw: &str) -> String {
    raw.parse::<CheckpointId>()
        .map(|id| id.to_string())
        .unwrap_or_else(|_| raw.trim().to_string())
}
