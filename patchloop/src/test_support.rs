//! Test-only helpers for loop orchestration tests.

use std::collections::VecDeque;
use std::fs;
use std::path::Path;
use std::process::Command;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};

use anyhow::{Context, Result, anyhow};

use crate::io::baseline::{Baseline, GitBaseline};
use crate::io::generator::Generator;

/// A git repository in a tempdir with one committed baseline file.
pub struct TestRepo {
    temp: tempfile::TempDir,
}

impl TestRepo {
    pub fn new() -> Result<Self> {
        let temp = tempfile::tempdir().context("create tempdir")?;
        let root = temp.path();

        run_git(root, &["init"])?;
        run_git(root, &["config", "user.email", "test@example.com"])?;
        run_git(root, &["config", "user.name", "test"])?;

        fs::write(root.join("baseline.txt"), "baseline\n").context("write baseline file")?;
        run_git(root, &["add", "baseline.txt"])?;
        run_git(root, &["commit", "-m", "chore: baseline"])?;

        Ok(Self { temp })
    }

    pub fn root(&self) -> &Path {
        self.temp.path()
    }

    /// Stage and commit everything, extending the baseline.
    pub fn commit_all(&self, message: &str) -> Result<()> {
        run_git(self.root(), &["add", "-A"])?;
        run_git(self.root(), &["commit", "-m", message])
    }
}

fn run_git(root: &Path, args: &[&str]) -> Result<()> {
    let status = Command::new("git")
        .args(args)
        .current_dir(root)
        .output()
        .with_context(|| format!("spawn git {}", args.join(" ")))?;
    if !status.status.success() {
        return Err(anyhow!(
            "git {} failed: {}",
            args.join(" "),
            String::from_utf8_lossy(&status.stderr).trim()
        ));
    }
    Ok(())
}

/// Generator returning queued responses, recording the prompts it received.
pub struct ScriptedGenerator {
    responses: Mutex<VecDeque<String>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedGenerator {
    pub fn new(responses: Vec<String>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Prompts received so far, in call order.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().expect("prompts lock").clone()
    }

    /// Fail if scripted responses remain unconsumed.
    pub fn assert_drained(&self) -> Result<()> {
        let remaining = self.responses.lock().expect("responses lock").len();
        if remaining > 0 {
            return Err(anyhow!("{remaining} scripted responses left in queue"));
        }
        Ok(())
    }
}

impl Generator for ScriptedGenerator {
    fn generate(&self, prompt: &str) -> Result<String> {
        self.prompts
            .lock()
            .expect("prompts lock")
            .push(prompt.to_string());
        self.responses
            .lock()
            .expect("responses lock")
            .pop_front()
            .ok_or_else(|| anyhow!("scripted generator exhausted"))
    }
}

/// Baseline that counts restores and delegates to [`GitBaseline`].
pub struct CountingBaseline {
    inner: GitBaseline,
    restores: AtomicU32,
}

impl CountingBaseline {
    pub fn new() -> Self {
        Self {
            inner: GitBaseline,
            restores: AtomicU32::new(0),
        }
    }

    pub fn restores(&self) -> u32 {
        self.restores.load(Ordering::Relaxed)
    }
}

impl Default for CountingBaseline {
    fn default() -> Self {
        Self::new()
    }
}

impl Baseline for CountingBaseline {
    fn restore(&self, workspace_root: &Path) -> Result<()> {
        self.restores.fetch_add(1, Ordering::Relaxed);
        self.inner.restore(workspace_root)
    }
}

/// Build a tagged-section response with the given `(path, action, content)`
/// file entries.
pub fn tagged_response(explanation: &str, files: &[(&str, &str, &str)]) -> String {
    let mut text = format!("## Explanation\n\n{explanation}\n\n## Changes\n");
    for (path, action, content) in files {
        text.push_str(&format!(
            "\n### File: `{path}`\n### Action: {action}\n```\n{content}\n```\n"
        ));
    }
    text
}

/// Build a delete-only response section for `path`.
pub fn delete_response(explanation: &str, path: &str) -> String {
    format!("## Explanation\n\n{explanation}\n\n## Changes\n\n### File: `{path}`\n### Action: delete\n")
}
