//! Validation command execution and outcome classification.

use std::path::Path;
use std::process::Command;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{debug, instrument, warn};

use crate::core::types::{ValidationOutcome, ValidationStatus};
use crate::io::process::run_command_combined;

/// Run the externally supplied validation command in `workspace_root`.
///
/// The command is an opaque string executed by a shell. Stdout and stderr are
/// captured interleaved in one combined stream and returned untruncated; any
/// bounding belongs to the reporting layer. Exit code 0 passes, a nonzero
/// code or a timeout fails. Only spawn failures are errors.
#[instrument(skip_all, fields(timeout_secs = timeout.as_secs()))]
pub fn run_validation(
    command: &str,
    workspace_root: &Path,
    timeout: Duration,
) -> Result<ValidationOutcome> {
    debug!(command, workdir = %workspace_root.display(), "running validation command");
    let mut cmd = Command::new("sh");
    cmd.arg("-c").arg(command).current_dir(workspace_root);

    let captured = run_command_combined(cmd, timeout)
        .with_context(|| format!("run validation command '{command}'"))?;
    let output = String::from_utf8_lossy(&captured.output).to_string();

    let status = if captured.timed_out {
        warn!(timeout_secs = timeout.as_secs(), "validation command timed out");
        ValidationStatus::TimedOut
    } else {
        // `code()` is None when a signal killed the command.
        ValidationStatus::Exited {
            code: captured.status.code().unwrap_or(-1),
        }
    };
    let passed = matches!(status, ValidationStatus::Exited { code: 0 });
    debug!(passed, ?status, "validation classified");

    Ok(ValidationOutcome {
        passed,
        output,
        status,
    })
}
