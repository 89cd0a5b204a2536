//! Text-generation boundary.
//!
//! The [`Generator`] trait decouples the attempt loop from the actual
//! generation backend. Production spawns a configured command that reads the
//! prompt on stdin and writes the response to stdout. Tests use scripted
//! generators that return predetermined responses without spawning processes.
//!
//! Rate-limit retry lives entirely inside this boundary as an explicit
//! [`RetryPolicy`]; the attempt loop never duplicates it.

use std::process::Command;
use std::thread;
use std::time::Duration;

use anyhow::{Result, anyhow};
use tracing::{debug, info, instrument, warn};

use crate::io::process::{CommandOutput, run_command_with_timeout};

/// Markers that identify a rate-limited invocation in backend output.
const RATE_LIMIT_MARKERS: [&str; 4] = ["rate limit", "rate_limit", "429", "too many requests"];

/// Abstraction over text-generation backends.
pub trait Generator {
    /// Turn a prompt into a response text. Errors are fatal to the run.
    fn generate(&self, prompt: &str) -> Result<String>;
}

/// Backoff policy for rate-limited generator invocations.
///
/// Retry `retry` (0-indexed) sleeps `base_delay * 2^retry`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 5,
            base_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    fn delay_for(&self, retry: u32) -> Duration {
        self.base_delay * 2u32.saturating_pow(retry)
    }
}

/// Generator that spawns an external command per invocation.
///
/// The prompt is fed on stdin; stdout is the response text.
pub struct CommandGenerator {
    command: Vec<String>,
    timeout: Duration,
    retry: RetryPolicy,
}

impl CommandGenerator {
    pub fn new(command: Vec<String>, timeout: Duration, retry: RetryPolicy) -> Self {
        Self {
            command,
            timeout,
            retry,
        }
    }

    fn invoke(&self, prompt: &str) -> Result<CommandOutput> {
        let program = self
            .command
            .first()
            .ok_or_else(|| anyhow!("generator command is empty"))?;
        let mut cmd = Command::new(program);
        cmd.args(&self.command[1..]);
        run_command_with_timeout(cmd, Some(prompt.as_bytes()), self.timeout)
    }
}

impl Generator for CommandGenerator {
    #[instrument(skip_all, fields(prompt_bytes = prompt.len()))]
    fn generate(&self, prompt: &str) -> Result<String> {
        for retry in 0..=self.retry.max_retries {
            debug!(retry, "invoking generator command");
            let output = self.invoke(prompt)?;

            if output.timed_out {
                return Err(anyhow!(
                    "generator command timed out after {:?}",
                    self.timeout
                ));
            }
            if output.status.success() {
                info!(response_bytes = output.stdout.len(), "generator responded");
                return Ok(String::from_utf8_lossy(&output.stdout).to_string());
            }
            if is_rate_limited(&output) && retry < self.retry.max_retries {
                let delay = self.retry.delay_for(retry);
                warn!(
                    retry = retry + 1,
                    max_retries = self.retry.max_retries,
                    delay_secs = delay.as_secs(),
                    "generator rate limited, backing off"
                );
                thread::sleep(delay);
                continue;
            }
            return Err(anyhow!(
                "generator command failed with status {:?}: {}",
                output.status.code(),
                String::from_utf8_lossy(&output.stderr).trim()
            ));
        }
        Err(anyhow!(
            "generator rate limited after {} retries",
            self.retry.max_retries
        ))
    }
}

fn is_rate_limited(output: &CommandOutput) -> bool {
    let text = format!(
        "{}\n{}",
        String::from_utf8_lossy(&output.stdout),
        String::from_utf8_lossy(&output.stderr)
    )
    .to_ascii_lowercase();
    RATE_LIMIT_MARKERS
        .iter()
        .any(|marker| text.contains(marker))
}
