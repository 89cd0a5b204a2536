//! Before/after content pairs for mutated files, keyed by path.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::instrument;

use crate::core::path::normalize_edit_path;
use crate::core::types::{EditAction, FileEdit};

/// Audit record of one file's planned mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileDiff {
    pub action: EditAction,
    pub old: String,
    pub new: String,
}

/// Compute before/after pairs for `edits`.
///
/// Hard precondition: must run against the pre-mutation workspace so `old` is
/// the true pre-image; calling it after the mutator silently produces wrong
/// diffs. Deletes of missing files and unrecognized actions produce no entry.
#[instrument(skip_all, fields(edit_count = edits.len()))]
pub fn build_diffs(
    edits: &[FileEdit],
    workspace_root: &Path,
) -> Result<BTreeMap<String, FileDiff>> {
    let mut diffs = BTreeMap::new();
    for edit in edits {
        let Some(rel) = normalize_edit_path(&edit.path) else {
            continue;
        };
        let target = workspace_root.join(&rel);

        let diff = match &edit.action {
            EditAction::Delete => {
                if !target.exists() {
                    continue;
                }
                let old = fs::read_to_string(&target)
                    .with_context(|| format!("read {}", target.display()))?;
                FileDiff {
                    action: EditAction::Delete,
                    old,
                    new: String::new(),
                }
            }
            EditAction::Create => FileDiff {
                action: EditAction::Create,
                old: String::new(),
                new: edit.content.clone(),
            },
            EditAction::Modify => {
                let old = if target.exists() {
                    fs::read_to_string(&target)
                        .with_context(|| format!("read {}", target.display()))?
                } else {
                    String::new()
                };
                FileDiff {
                    action: EditAction::Modify,
                    old,
                    new: edit.content.clone(),
                }
            }
            EditAction::Other(_) => continue,
        };
        diffs.insert(rel, diff);
    }
    Ok(diffs)
}
