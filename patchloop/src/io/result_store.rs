//! Terminal result record persisted at loop exit.
//!
//! The record's JSON shape is consumed by downstream reporting and must stay
//! stable across versions.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::types::{FileEdit, RunOutcome};
use crate::io::init::StatePaths;

/// Persisted summary of one orchestration run (`.patchloop/result.json`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ResultRecord {
    pub success: bool,
    /// On success, the winning attempt index; on exhaustion, the budget.
    pub attempts: u32,
    pub explanation: String,
    pub edits: Vec<FileEdit>,
    pub validation_output: String,
}

impl ResultRecord {
    pub fn from_outcome(outcome: &RunOutcome, max_attempts: u32) -> Self {
        match outcome {
            RunOutcome::Success {
                attempt,
                parse,
                validation,
            } => Self {
                success: true,
                attempts: *attempt,
                explanation: parse.explanation.clone(),
                edits: parse.edits.clone(),
                validation_output: validation.output.clone(),
            },
            RunOutcome::Exhausted { last_validation } => Self {
                success: false,
                attempts: max_attempts,
                explanation: String::new(),
                edits: Vec::new(),
                validation_output: last_validation.output.clone(),
            },
        }
    }
}

/// Write the result record and its companion artifacts.
///
/// `result.json` is written atomically; `edits.json` and `explanation.md` are
/// convenience copies for downstream consumers.
pub fn write_result(root: &Path, record: &ResultRecord) -> Result<()> {
    let paths = StatePaths::new(root);
    fs::create_dir_all(&paths.state_dir)
        .with_context(|| format!("create directory {}", paths.state_dir.display()))?;
    debug!(path = %paths.result_path.display(), success = record.success, "writing result record");

    let mut buf = serde_json::to_string_pretty(record)?;
    buf.push('\n');
    write_atomic(&paths.result_path, &buf)?;

    let mut edits = serde_json::to_string_pretty(&record.edits)?;
    edits.push('\n');
    fs::write(&paths.edits_path, edits)
        .with_context(|| format!("write {}", paths.edits_path.display()))?;
    fs::write(&paths.explanation_path, &record.explanation)
        .with_context(|| format!("write {}", paths.explanation_path.display()))?;
    Ok(())
}

/// Load a previously written result record.
pub fn load_result(path: &Path) -> Result<ResultRecord> {
    let contents =
        fs::read_to_string(path).with_context(|| format!("read result {}", path.display()))?;
    let record: ResultRecord = serde_json::from_str(&contents)
        .with_context(|| format!("parse result {}", path.display()))?;
    Ok(record)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("result path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("json.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp result {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace result {}", path.display()))?;
    Ok(())
}
