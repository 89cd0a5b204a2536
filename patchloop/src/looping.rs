//! The attempt loop: propose → apply → validate → revert → retry.

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result, anyhow};
use tracing::{info, instrument, warn};

use crate::attempt::{AttemptConfig, run_attempt};
use crate::core::types::{AttemptRecord, RunOutcome, ValidationOutcome};
use crate::io::baseline::Baseline;
use crate::io::config::LoopConfig;
use crate::io::generator::Generator;
use crate::io::init::ensure_state_dir;
use crate::io::result_store::{ResultRecord, write_result};

/// Cooperative cancellation, checked at the loop boundary before each
/// attempt starts generating. Mid-attempt work is never interrupted.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_requested(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Drive the attempt loop until validation passes or the budget runs out.
///
/// Per failed non-final attempt the baseline is restored, so no edit from a
/// failed attempt is visible to the next one. The previous attempt's record
/// (and only that one) feeds corrective context into the next prompt. The
/// terminal outcome is persisted under `.patchloop/` before returning.
///
/// Fatal (propagated) errors: generation failures, baseline restore
/// failures, validator spawn failures, and cancellation. Parse, apply, and
/// validation failures consume an attempt instead.
#[instrument(skip_all, fields(max_attempts = config.max_attempts))]
pub fn run_loop<G: Generator, B: Baseline, F: FnMut(&AttemptRecord)>(
    root: &Path,
    generator: &G,
    baseline: &B,
    request: &str,
    config: &LoopConfig,
    cancel: &CancelFlag,
    mut on_attempt: F,
) -> Result<RunOutcome> {
    config.validate()?;
    ensure_state_dir(root)?;
    let attempt_config = AttemptConfig::from(config);

    let mut previous: Option<AttemptRecord> = None;
    for attempt in 1..=config.max_attempts {
        if cancel.is_requested() {
            return Err(anyhow!("run cancelled before attempt {attempt}"));
        }

        info!(attempt, max_attempts = config.max_attempts, "starting attempt");
        let record = run_attempt(
            root,
            generator,
            request,
            previous.as_ref(),
            attempt,
            &attempt_config,
        )?;
        on_attempt(&record);

        if record.validation.passed {
            info!(attempt, "validation passed");
            let outcome = RunOutcome::Success {
                attempt,
                parse: record.parse,
                validation: record.validation,
            };
            persist_outcome(root, &outcome, config.max_attempts)?;
            return Ok(outcome);
        }

        warn!(attempt, status = ?record.validation.status, "attempt failed");
        if attempt < config.max_attempts {
            baseline
                .restore(root)
                .context("restore baseline between attempts")?;
        }
        previous = Some(record);
    }

    let last_validation = previous
        .map(|record| record.validation)
        .unwrap_or_else(|| ValidationOutcome::not_run("no attempts were made"));
    let outcome = RunOutcome::Exhausted { last_validation };
    persist_outcome(root, &outcome, config.max_attempts)?;
    Ok(outcome)
}

fn persist_outcome(root: &Path, outcome: &RunOutcome, max_attempts: u32) -> Result<()> {
    let record = ResultRecord::from_outcome(outcome, max_attempts);
    write_result(root, &record)
}
