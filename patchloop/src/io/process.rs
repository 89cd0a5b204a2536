//! Helpers for running child processes with wall-clock timeouts.
//!
//! Output is read concurrently while the child runs so pipes never deadlock.
//! On timeout the child's whole process group is terminated; commands are
//! spawned into their own group so shell-launched descendants die with them.

use std::io::{Read, Write};
use std::os::unix::process::CommandExt;
use std::process::{Command, ExitStatus, Stdio};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use tracing::{debug, error, instrument, warn};
use wait_timeout::ChildExt;

/// Captured child process output with separate streams.
#[derive(Debug)]
pub struct CommandOutput {
    pub status: ExitStatus,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub timed_out: bool,
}

/// Captured child process output with stdout and stderr interleaved into one
/// stream, in the order chunks arrived.
#[derive(Debug)]
pub struct CombinedOutput {
    pub status: ExitStatus,
    pub output: Vec<u8>,
    pub timed_out: bool,
}

/// Run a command with a timeout, capturing stdout and stderr separately.
///
/// If `stdin` is `Some`, it is written to the child before waiting.
#[instrument(skip_all, fields(timeout_secs = timeout.as_secs()))]
pub fn run_command_with_timeout(
    mut cmd: Command,
    stdin: Option<&[u8]>,
    timeout: Duration,
) -> Result<CommandOutput> {
    let mut child = spawn_in_own_group(&mut cmd, stdin.is_some())?;

    if let Some(input) = stdin {
        let mut child_stdin = child
            .stdin
            .take()
            .ok_or_else(|| anyhow!("stdin was not piped"))?;
        child_stdin.write_all(input).context("write stdin")?;
    }

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| anyhow!("stdout was not piped"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| anyhow!("stderr was not piped"))?;

    let stdout_handle = thread::spawn(move || read_stream(stdout));
    let stderr_handle = thread::spawn(move || read_stream(stderr));

    let pid = child.id();
    let mut timed_out = false;
    let status = match child.wait_timeout(timeout).context("wait for command")? {
        Some(status) => status,
        None => {
            warn!(timeout_secs = timeout.as_secs(), "command timed out, killing");
            timed_out = true;
            terminate_group(pid);
            child.kill().context("kill command")?;
            child.wait().context("wait command after kill")?
        }
    };

    let stdout = join_output(stdout_handle).context("join stdout")?;
    let stderr = join_output(stderr_handle).context("join stderr")?;

    debug!(exit_code = ?status.code(), timed_out, "command finished");
    Ok(CommandOutput {
        status,
        stdout,
        stderr,
        timed_out,
    })
}

/// Run a command with a timeout, interleaving stdout and stderr into a single
/// combined stream as chunks arrive.
#[instrument(skip_all, fields(timeout_secs = timeout.as_secs()))]
pub fn run_command_combined(mut cmd: Command, timeout: Duration) -> Result<CombinedOutput> {
    let mut child = spawn_in_own_group(&mut cmd, false)?;

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| anyhow!("stdout was not piped"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| anyhow!("stderr was not piped"))?;

    let sink = Arc::new(Mutex::new(Vec::new()));
    let stdout_sink = Arc::clone(&sink);
    let stderr_sink = Arc::clone(&sink);
    let stdout_handle = thread::spawn(move || drain_into(stdout, &stdout_sink));
    let stderr_handle = thread::spawn(move || drain_into(stderr, &stderr_sink));

    let pid = child.id();
    let mut timed_out = false;
    let status = match child.wait_timeout(timeout).context("wait for command")? {
        Some(status) => status,
        None => {
            warn!(timeout_secs = timeout.as_secs(), "command timed out, killing");
            timed_out = true;
            terminate_group(pid);
            child.kill().context("kill command")?;
            child.wait().context("wait command after kill")?
        }
    };

    join_drained(stdout_handle).context("join stdout")?;
    join_drained(stderr_handle).context("join stderr")?;

    let output = {
        let mut locked = sink
            .lock()
            .map_err(|_| anyhow!("output sink poisoned"))?;
        std::mem::take(&mut *locked)
    };

    debug!(exit_code = ?status.code(), timed_out, "command finished");
    Ok(CombinedOutput {
        status,
        output,
        timed_out,
    })
}

fn spawn_in_own_group(cmd: &mut Command, pipe_stdin: bool) -> Result<std::process::Child> {
    if pipe_stdin {
        cmd.stdin(Stdio::piped());
    } else {
        cmd.stdin(Stdio::null());
    }
    cmd.stdout(Stdio::piped()).stderr(Stdio::piped());
    // Own process group so a timeout can address the child and its
    // descendants together.
    cmd.process_group(0);

    debug!("spawning child process");
    match cmd.spawn() {
        Ok(child) => Ok(child),
        Err(e) => {
            error!(err = %e, "failed to spawn command");
            Err(e).context("spawn command")
        }
    }
}

/// Kill the whole process group created at spawn (negative pid addressing).
fn terminate_group(pid: u32) {
    let _ = Command::new("kill")
        .args(["-KILL", "--", &format!("-{pid}")])
        .status();
}

fn read_stream<R: Read>(mut reader: R) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    reader.read_to_end(&mut buf).context("read output")?;
    Ok(buf)
}

fn drain_into<R: Read>(mut reader: R, sink: &Mutex<Vec<u8>>) -> Result<()> {
    let mut chunk = [0u8; 8192];
    loop {
        let n = reader.read(&mut chunk).context("read output")?;
        if n == 0 {
            return Ok(());
        }
        let mut locked = sink
            .lock()
            .map_err(|_| anyhow!("output sink poisoned"))?;
        locked.extend_from_slice(&chunk[..n]);
    }
}

fn join_output(handle: thread::JoinHandle<Result<Vec<u8>>>) -> Result<Vec<u8>> {
    match handle.join() {
        Ok(result) => result,
        Err(_) => Err(anyhow!("output reader thread panicked")),
    }
}

fn join_drained(handle: thread::JoinHandle<Result<()>>) -> Result<()> {
    match handle.join() {
        Ok(result) => result,
        Err(_) => Err(anyhow!("output reader thread panicked")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn captures_separate_streams() {
        let mut cmd = Command::new("sh");
        cmd.args(["-c", "echo out; echo err >&2"]);
        let output =
            run_command_with_timeout(cmd, None, Duration::from_secs(5)).expect("run command");
        assert!(output.status.success());
        assert!(!output.timed_out);
        assert_eq!(String::from_utf8_lossy(&output.stdout), "out\n");
        assert_eq!(String::from_utf8_lossy(&output.stderr), "err\n");
    }

    #[test]
    fn feeds_stdin_to_child() {
        let cmd = Command::new("cat");
        let output = run_command_with_timeout(cmd, Some(b"hello"), Duration::from_secs(5))
            .expect("run command");
        assert_eq!(String::from_utf8_lossy(&output.stdout), "hello");
    }

    #[test]
    fn combined_stream_contains_both_streams() {
        let mut cmd = Command::new("sh");
        cmd.args(["-c", "echo out; echo err >&2"]);
        let output = run_command_combined(cmd, Duration::from_secs(5)).expect("run command");
        let combined = String::from_utf8_lossy(&output.output);
        assert!(combined.contains("out"));
        assert!(combined.contains("err"));
    }

    #[test]
    fn timeout_kills_long_running_command() {
        let mut cmd = Command::new("sh");
        cmd.args(["-c", "echo started; sleep 30"]);
        let output = run_command_combined(cmd, Duration::from_millis(200)).expect("run command");
        assert!(output.timed_out);
        assert!(String::from_utf8_lossy(&output.output).contains("started"));
    }
}
