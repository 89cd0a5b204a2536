//! Workspace mutation: apply parsed edits to a directory tree.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use tracing::{debug, instrument};

use crate::core::path::normalize_edit_path;
use crate::core::types::{AppliedEdit, ApplyOutcome, ApplySummary, EditAction, FileEdit};

/// Apply `edits` to `workspace_root` in input order.
///
/// Create/modify writes `content` followed by exactly one newline, creating
/// missing parent directories and overwriting existing files; the pre-write
/// existence check decides `Created` vs `Modified`. Delete of a missing path
/// records `SkippedMissing`. Unrecognized actions record `UnknownAction` and
/// touch nothing.
///
/// Fail-fast: a filesystem error aborts the remaining edits and surfaces to
/// the caller. Nothing applied so far is rolled back here; reversal between
/// attempts is the baseline's job.
#[instrument(skip_all, fields(edit_count = edits.len()))]
pub fn apply_edits(edits: &[FileEdit], workspace_root: &Path) -> Result<ApplySummary> {
    let mut entries = Vec::with_capacity(edits.len());
    for edit in edits {
        let outcome = apply_edit(edit, workspace_root)?;
        debug!(path = %edit.path, ?outcome, "applied edit");
        entries.push(AppliedEdit {
            path: edit.path.clone(),
            outcome,
        });
    }
    Ok(ApplySummary { entries })
}

fn apply_edit(edit: &FileEdit, workspace_root: &Path) -> Result<ApplyOutcome> {
    let rel = normalize_edit_path(&edit.path)
        .ok_or_else(|| anyhow!("edit path escapes the workspace: '{}'", edit.path))?;
    let target = workspace_root.join(rel);

    match &edit.action {
        EditAction::Delete => {
            if target.exists() {
                fs::remove_file(&target)
                    .with_context(|| format!("delete {}", target.display()))?;
                Ok(ApplyOutcome::Deleted)
            } else {
                Ok(ApplyOutcome::SkippedMissing)
            }
        }
        EditAction::Create | EditAction::Modify => {
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("create directory {}", parent.display()))?;
            }
            let existed = target.exists();
            let mut contents = edit.content.clone();
            contents.push('\n');
            fs::write(&target, contents)
                .with_context(|| format!("write {}", target.display()))?;
            Ok(if existed {
                ApplyOutcome::Modified
            } else {
                ApplyOutcome::Created
            })
        }
        EditAction::Other(_) => Ok(ApplyOutcome::UnknownAction),
    }
}
