//! Shared deterministic types for the patchloop core.
//!
//! These types define stable contracts between core components. They should not
//! depend on external state or I/O and must remain deterministic across runs.

use serde::{Deserialize, Serialize};

/// Action requested for a single file edit.
///
/// Action tokens are matched case-insensitively. Unrecognized tokens are
/// preserved verbatim in [`EditAction::Other`] and surfaced at apply time as
/// [`ApplyOutcome::UnknownAction`] instead of being rejected during parsing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EditAction {
    Create,
    Modify,
    Delete,
    Other(String),
}

impl From<String> for EditAction {
    fn from(raw: String) -> Self {
        match raw.to_ascii_lowercase().as_str() {
            "create" => EditAction::Create,
            "modify" => EditAction::Modify,
            "delete" => EditAction::Delete,
            _ => EditAction::Other(raw),
        }
    }
}

impl From<EditAction> for String {
    fn from(action: EditAction) -> Self {
        match action {
            EditAction::Create => "create".to_string(),
            EditAction::Modify => "modify".to_string(),
            EditAction::Delete => "delete".to_string(),
            EditAction::Other(raw) => raw,
        }
    }
}

pub(crate) fn default_action() -> EditAction {
    EditAction::Modify
}

/// One file-level mutation instruction.
///
/// `path` is repository-relative. `content` is the full new file contents
/// (empty for deletes); the mutator appends exactly one trailing newline when
/// writing, and the parser strips exactly one when reading fenced blocks, so
/// the two round-trip.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEdit {
    pub path: String,
    #[serde(default = "default_action")]
    pub action: EditAction,
    #[serde(default)]
    pub content: String,
}

/// Structured result of parsing one generated response.
///
/// Empty `edits` is a valid result: the orchestrator treats it as a retryable
/// "no edits produced" failure, never as a parser error.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParseResult {
    #[serde(default)]
    pub explanation: String,
    #[serde(default)]
    pub edits: Vec<FileEdit>,
}

/// Per-path outcome of applying one edit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplyOutcome {
    Created,
    Modified,
    Deleted,
    /// Delete targeted a path that does not exist (not an error).
    SkippedMissing,
    /// Action token was not recognized; no filesystem mutation performed.
    UnknownAction,
}

/// One applied edit, in input order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppliedEdit {
    pub path: String,
    pub outcome: ApplyOutcome,
}

/// Ordered record of what the mutator did, one entry per edit.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplySummary {
    pub entries: Vec<AppliedEdit>,
}

impl ApplySummary {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Render one human-readable line per edit, for feedback prompts and logs.
    pub fn render(&self) -> String {
        self.entries
            .iter()
            .map(|entry| {
                let label = match entry.outcome {
                    ApplyOutcome::Created => "created",
                    ApplyOutcome::Modified => "modified",
                    ApplyOutcome::Deleted => "deleted",
                    ApplyOutcome::SkippedMissing => "skip delete (not found)",
                    ApplyOutcome::UnknownAction => "unknown action (no change)",
                };
                format!("{label}: {}", entry.path)
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// How a validation run terminated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum ValidationStatus {
    /// The validation command exited with the given code (`-1` when killed by
    /// a signal).
    Exited { code: i32 },
    /// The validation command exceeded its wall-clock timeout.
    TimedOut,
    /// Validation did not run for this attempt (no edits, or apply failed).
    NotRun,
}

/// Classified result of one validation run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationOutcome {
    pub passed: bool,
    /// Stdout and stderr interleaved as captured.
    pub output: String,
    pub status: ValidationStatus,
}

impl ValidationOutcome {
    /// Synthesized failure for attempts where validation never ran.
    pub fn not_run(message: impl Into<String>) -> Self {
        Self {
            passed: false,
            output: message.into(),
            status: ValidationStatus::NotRun,
        }
    }
}

/// Everything recorded about one attempt.
///
/// The orchestrator retains at most the current and the previous record; the
/// previous one supplies corrective feedback for the next prompt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttemptRecord {
    /// 1-indexed attempt number.
    pub attempt: u32,
    /// Raw generated response text.
    pub response_text: String,
    pub parse: ParseResult,
    pub apply: ApplySummary,
    pub validation: ValidationOutcome,
}

/// Terminal value of one orchestration run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// Validation passed on `attempt`.
    Success {
        attempt: u32,
        parse: ParseResult,
        validation: ValidationOutcome,
    },
    /// The attempt budget ran out; carries the last failure's diagnostics.
    Exhausted { last_validation: ValidationOutcome },
}

impl RunOutcome {
    pub fn succeeded(&self) -> bool {
        matches!(self, RunOutcome::Success { .. })
    }
}
