//! Orchestration for a single propose → apply → validate attempt.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::{Duration, Instant};

use anyhow::Result;
use tracing::{debug, instrument, warn};

use crate::core::response::parse_response;
use crate::core::types::{
    ApplySummary, AttemptRecord, FileEdit, ValidationOutcome,
};
use crate::io::apply::apply_edits;
use crate::io::attempt_log::{AttemptMeta, AttemptWriteRequest, write_attempt};
use crate::io::config::LoopConfig;
use crate::io::diff::{FileDiff, build_diffs};
use crate::io::generator::Generator;
use crate::io::prompt::{PromptBuilder, PromptInputs};
use crate::io::validator::run_validation;

/// Per-attempt settings carved out of [`LoopConfig`].
#[derive(Debug, Clone)]
pub struct AttemptConfig {
    pub validation_command: String,
    pub validation_timeout: Duration,
    pub prompt_budget_bytes: usize,
}

impl From<&LoopConfig> for AttemptConfig {
    fn from(config: &LoopConfig) -> Self {
        Self {
            validation_command: config.validation.command.clone(),
            validation_timeout: Duration::from_secs(config.validation.timeout_secs),
            prompt_budget_bytes: config.prompt_budget_bytes,
        }
    }
}

/// Execute one attempt: prompt, generate, parse, apply, validate, log.
///
/// Generation failures are fatal and propagate. Everything after generation
/// degrades into a failed [`AttemptRecord`]: an empty parse or an apply error
/// becomes a synthesized not-run validation failure without touching (or
/// after partially touching) the workspace; reversal is the caller's job.
#[instrument(skip_all, fields(attempt))]
pub fn run_attempt<G: Generator>(
    root: &Path,
    generator: &G,
    request: &str,
    previous: Option<&AttemptRecord>,
    attempt: u32,
    config: &AttemptConfig,
) -> Result<AttemptRecord> {
    let start = Instant::now();

    let inputs = PromptInputs::new(request, previous);
    let prompt = PromptBuilder::new(config.prompt_budget_bytes)
        .build(&inputs)
        .render();

    debug!(prompt_bytes = prompt.len(), "generating response");
    let response_text = generator.generate(&prompt)?;

    let parse = parse_response(&response_text);
    debug!(edit_count = parse.edits.len(), "parsed response");

    let mut apply = ApplySummary::default();
    let mut diffs = BTreeMap::new();
    let validation = if parse.edits.is_empty() {
        warn!("response contained no file edits");
        ValidationOutcome::not_run("generated response contained no file edits")
    } else {
        match stage_edits(&parse.edits, root) {
            Ok((staged_diffs, staged_apply)) => {
                diffs = staged_diffs;
                apply = staged_apply;
                run_validation(&config.validation_command, root, config.validation_timeout)?
            }
            Err(err) => {
                warn!(err = %err, "failed to apply edits");
                ValidationOutcome::not_run(format!("failed to apply edits: {err:#}"))
            }
        }
    };

    let record = AttemptRecord {
        attempt,
        response_text,
        parse,
        apply,
        validation,
    };
    let meta = AttemptMeta {
        attempt,
        edit_count: record.parse.edits.len(),
        passed: record.validation.passed,
        status: record.validation.status.clone(),
        duration_ms: Some(start.elapsed().as_millis() as u64),
    };
    write_attempt(&AttemptWriteRequest {
        root,
        record: &record,
        diffs: &diffs,
        meta: &meta,
    })?;

    Ok(record)
}

/// Capture pre-images, then mutate. Diffs must be built before the mutator
/// runs or the pre-images are lost.
fn stage_edits(
    edits: &[FileEdit],
    root: &Path,
) -> Result<(BTreeMap<String, FileDiff>, ApplySummary)> {
    let diffs = build_diffs(edits, root)?;
    let apply = apply_edits(edits, root)?;
    Ok((diffs, apply))
}
