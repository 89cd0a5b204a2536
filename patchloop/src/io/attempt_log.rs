//! Attempt artifact logging under `.patchloop/attempts/`.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;

use crate::core::types::{AttemptRecord, ValidationStatus};
use crate::io::diff::FileDiff;

/// Compact per-attempt metadata for audit tooling.
#[derive(Debug, Clone, Serialize)]
pub struct AttemptMeta {
    pub attempt: u32,
    pub edit_count: usize,
    pub passed: bool,
    pub status: ValidationStatus,
    pub duration_ms: Option<u64>,
}

/// Resolved paths for one attempt's artifacts.
#[derive(Debug, Clone)]
pub struct AttemptPaths {
    pub dir: PathBuf,
    pub meta_path: PathBuf,
    pub response_path: PathBuf,
    pub parse_path: PathBuf,
    pub diffs_path: PathBuf,
    pub apply_path: PathBuf,
    pub validation_log_path: PathBuf,
}

impl AttemptPaths {
    pub fn new(root: &Path, attempt: u32) -> Self {
        let dir = root
            .join(".patchloop")
            .join("attempts")
            .join(attempt.to_string());
        Self {
            dir: dir.clone(),
            meta_path: dir.join("meta.json"),
            response_path: dir.join("response.txt"),
            parse_path: dir.join("parse.json"),
            diffs_path: dir.join("diffs.json"),
            apply_path: dir.join("apply.json"),
            validation_log_path: dir.join("validation.log"),
        }
    }
}

pub struct AttemptWriteRequest<'a> {
    pub root: &'a Path,
    pub record: &'a AttemptRecord,
    pub diffs: &'a BTreeMap<String, FileDiff>,
    pub meta: &'a AttemptMeta,
}

/// Write one attempt's artifacts.
pub fn write_attempt(request: &AttemptWriteRequest<'_>) -> Result<AttemptPaths> {
    let paths = AttemptPaths::new(request.root, request.record.attempt);
    fs::create_dir_all(&paths.dir)
        .with_context(|| format!("create attempt dir {}", paths.dir.display()))?;

    // Write in deterministic order to keep logs stable.
    write_json(&paths.meta_path, request.meta)?;
    write_text(&paths.response_path, &request.record.response_text)?;
    write_json(&paths.parse_path, &request.record.parse)?;
    write_json(&paths.diffs_path, request.diffs)?;
    write_json(&paths.apply_path, &request.record.apply)?;
    write_text(&paths.validation_log_path, &request.record.validation.output)?;

    Ok(paths)
}

fn write_text(path: &Path, contents: &str) -> Result<()> {
    fs::write(path, contents).with_context(|| format!("write {}", path.display()))
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let mut buf = serde_json::to_string_pretty(value)?;
    buf.push('\n');
    write_text(path, &buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{ApplySummary, ParseResult, ValidationOutcome};

    #[test]
    fn attempt_paths_are_stable() {
        let temp = tempfile::tempdir().expect("tempdir");
        let paths = AttemptPaths::new(temp.path(), 2);

        assert!(paths.dir.ends_with(Path::new(".patchloop/attempts/2")));
        assert!(paths.meta_path.ends_with("meta.json"));
        assert!(paths.response_path.ends_with("response.txt"));
        assert!(paths.parse_path.ends_with("parse.json"));
        assert!(paths.diffs_path.ends_with("diffs.json"));
        assert!(paths.apply_path.ends_with("apply.json"));
        assert!(paths.validation_log_path.ends_with("validation.log"));
    }

    #[test]
    fn writes_all_artifacts() {
        let temp = tempfile::tempdir().expect("tempdir");
        let record = AttemptRecord {
            attempt: 1,
            response_text: "raw response".to_string(),
            parse: ParseResult::default(),
            apply: ApplySummary::default(),
            validation: ValidationOutcome::not_run("no edits"),
        };
        let meta = AttemptMeta {
            attempt: 1,
            edit_count: 0,
            passed: false,
            status: ValidationStatus::NotRun,
            duration_ms: Some(12),
        };

        let paths = write_attempt(&AttemptWriteRequest {
            root: temp.path(),
            record: &record,
            diffs: &BTreeMap::new(),
            meta: &meta,
        })
        .expect("write attempt");

        assert!(paths.meta_path.is_file());
        assert!(paths.response_path.is_file());
        assert!(paths.parse_path.is_file());
        assert!(paths.diffs_path.is_file());
        assert!(paths.apply_path.is_file());
        assert!(paths.validation_log_path.is_file());

        let log = fs::read_to_string(&paths.validation_log_path).expect("read log");
        assert_eq!(log, "no edits");
    }
}
