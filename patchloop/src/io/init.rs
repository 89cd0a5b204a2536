//! Scaffolding for the `.patchloop/` state directory.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};

use super::config::{LoopConfig, write_config};

/// All canonical paths within `.patchloop/` for a workspace root.
#[derive(Debug, Clone)]
pub struct StatePaths {
    pub root: PathBuf,
    pub state_dir: PathBuf,
    pub gitignore_path: PathBuf,
    pub config_path: PathBuf,
    pub attempts_dir: PathBuf,
    pub result_path: PathBuf,
    pub edits_path: PathBuf,
    pub explanation_path: PathBuf,
}

impl StatePaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let state_dir = root.join(".patchloop");
        Self {
            root,
            gitignore_path: state_dir.join(".gitignore"),
            config_path: state_dir.join("config.toml"),
            attempts_dir: state_dir.join("attempts"),
            result_path: state_dir.join("result.json"),
            edits_path: state_dir.join("edits.json"),
            explanation_path: state_dir.join("explanation.md"),
            state_dir,
        }
    }
}

/// Options for `init_state`.
#[derive(Debug, Clone)]
pub struct InitOptions {
    /// If true, overwrite existing state files.
    pub force: bool,
}

/// Create `.patchloop/` scaffolding in `root`.
///
/// Fails if `.patchloop/` already exists unless `options.force` is set.
pub fn init_state(root: &Path, options: &InitOptions) -> Result<StatePaths> {
    let paths = StatePaths::new(root);
    if paths.state_dir.exists() && !options.force {
        return Err(anyhow!(
            "patchloop init: .patchloop already exists (use --force to overwrite)"
        ));
    }
    if paths.state_dir.exists() && !paths.state_dir.is_dir() {
        return Err(anyhow!(
            "patchloop init: .patchloop exists but is not a directory"
        ));
    }

    create_dir(&paths.state_dir)?;
    create_dir(&paths.attempts_dir)?;

    // Everything under .patchloop/ is run state; ignoring it all keeps
    // `git clean -fd` from removing attempt artifacts between attempts.
    write_file(&paths.gitignore_path, STATE_GITIGNORE)?;
    write_config(&paths.config_path, &LoopConfig::default())?;

    Ok(paths)
}

/// Ensure the state directory and its gitignore exist (quiet variant used by
/// `patchloop run` when the workspace was never initialized).
pub fn ensure_state_dir(root: &Path) -> Result<StatePaths> {
    let paths = StatePaths::new(root);
    create_dir(&paths.state_dir)?;
    create_dir(&paths.attempts_dir)?;
    if !paths.gitignore_path.exists() {
        write_file(&paths.gitignore_path, STATE_GITIGNORE)?;
    }
    Ok(paths)
}

fn create_dir(path: &Path) -> Result<()> {
    fs::create_dir_all(path).with_context(|| format!("create directory {}", path.display()))
}

fn write_file(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        create_dir(parent)?;
    }
    fs::write(path, contents).with_context(|| format!("write file {}", path.display()))
}

const STATE_GITIGNORE: &str = "*\n";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_creates_expected_layout() {
        let temp = tempfile::tempdir().expect("tempdir");
        let root = temp.path();

        let paths = init_state(root, &InitOptions { force: false }).expect("init");

        assert!(paths.state_dir.is_dir());
        assert!(paths.attempts_dir.is_dir());
        assert!(paths.gitignore_path.is_file());
        assert!(paths.config_path.is_file());

        let gitignore = fs::read_to_string(&paths.gitignore_path).expect("read gitignore");
        assert_eq!(gitignore, STATE_GITIGNORE);
    }

    #[test]
    fn init_without_force_refuses_existing_state_dir() {
        let temp = tempfile::tempdir().expect("tempdir");
        let root = temp.path();

        init_state(root, &InitOptions { force: false }).expect("init");
        let err = init_state(root, &InitOptions { force: false }).unwrap_err();
        assert!(err.to_string().contains("already exists"));
    }

    #[test]
    fn init_with_force_rewrites_config() {
        let temp = tempfile::tempdir().expect("tempdir");
        let root = temp.path();
        let paths = init_state(root, &InitOptions { force: false }).expect("init");

        fs::write(&paths.config_path, "max_attempts = 9\n").expect("customize");
        init_state(root, &InitOptions { force: true }).expect("re-init");

        let cfg = super::super::config::load_config(&paths.config_path).expect("load");
        assert_eq!(cfg, LoopConfig::default());
    }

    #[test]
    fn ensure_state_dir_is_idempotent() {
        let temp = tempfile::tempdir().expect("tempdir");
        let root = temp.path();

        ensure_state_dir(root).expect("first");
        let paths = ensure_state_dir(root).expect("second");
        assert!(paths.state_dir.is_dir());
        assert!(paths.gitignore_path.is_file());
    }
}
