//! Baseline restore boundary invoked between attempts.
//!
//! The [`Baseline`] trait decouples the loop from the restore mechanism.
//! Production uses git; tests substitute counting or scripted implementations
//! without requiring a real checkout.

use std::path::Path;

use anyhow::{Context, Result};
use tracing::{debug, instrument};

use crate::io::git::Git;

/// Restores a workspace to its pre-run filesystem state.
pub trait Baseline {
    /// Restore `workspace_root` to the state it held before the first attempt.
    ///
    /// After a successful restore no edit from a failed attempt may remain
    /// visible to the next attempt.
    fn restore(&self, workspace_root: &Path) -> Result<()>;
}

/// Baseline backed by the committed git state of the workspace.
///
/// Requires the workspace to be a git repository whose committed HEAD is the
/// baseline. Ignored files (the `.patchloop/` state dir among them) survive
/// the clean.
pub struct GitBaseline;

impl Baseline for GitBaseline {
    #[instrument(skip_all, fields(workdir = %workspace_root.display()))]
    fn restore(&self, workspace_root: &Path) -> Result<()> {
        debug!("restoring baseline");
        let git = Git::new(workspace_root);
        git.checkout_worktree().context("restore tracked files")?;
        git.clean_untracked().context("remove untracked files")?;
        Ok(())
    }
}
