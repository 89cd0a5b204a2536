//! CLI entry point for the patchloop agent core.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand};

use patchloop::core::response::parse_response;
use patchloop::core::types::RunOutcome;
use patchloop::exit_codes;
use patchloop::io::baseline::GitBaseline;
use patchloop::io::config::load_config;
use patchloop::io::generator::{CommandGenerator, RetryPolicy};
use patchloop::io::git::Git;
use patchloop::io::init::{InitOptions, StatePaths, init_state};
use patchloop::logging;
use patchloop::looping::{CancelFlag, run_loop};

#[derive(Parser)]
#[command(
    name = "patchloop",
    version,
    about = "Propose, apply, validate, retry: an autonomous change-agent core"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create `.patchloop/` scaffolding with a default config.
    Init {
        /// Overwrite existing state files.
        #[arg(short, long)]
        force: bool,
    },
    /// Parse a generated response file and print the extracted edits as JSON.
    Parse {
        /// Response text file to parse.
        file: PathBuf,
    },
    /// Run the propose → apply → validate → retry loop for a change request.
    Run {
        /// Change request text.
        #[arg(long)]
        request: Option<String>,
        /// File containing the change request.
        #[arg(long, conflicts_with = "request")]
        request_file: Option<PathBuf>,
        /// Override the configured validation command.
        #[arg(long)]
        command: Option<String>,
        /// Override the configured attempt budget.
        #[arg(long)]
        max_attempts: Option<u32>,
        /// Override the configured validation timeout in seconds.
        #[arg(long)]
        timeout_secs: Option<u64>,
        /// Workspace root (defaults to the current directory).
        #[arg(long)]
        workspace: Option<PathBuf>,
    },
}

fn main() {
    logging::init();
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("{:#}", err);
            std::process::exit(exit_codes::INVALID);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    match cli.command {
        Command::Init { force } => cmd_init(force),
        Command::Parse { file } => cmd_parse(&file),
        Command::Run {
            request,
            request_file,
            command,
            max_attempts,
            timeout_secs,
            workspace,
        } => cmd_run(RunArgs {
            request,
            request_file,
            command,
            max_attempts,
            timeout_secs,
            workspace,
        }),
    }
}

fn cmd_init(force: bool) -> Result<i32> {
    let root = std::env::current_dir().context("resolve current directory")?;
    let paths = init_state(&root, &InitOptions { force })?;
    println!("initialized {}", paths.state_dir.display());
    Ok(exit_codes::OK)
}

fn cmd_parse(file: &Path) -> Result<i32> {
    let text = fs::read_to_string(file).with_context(|| format!("read {}", file.display()))?;
    let result = parse_response(&text);
    let mut json = serde_json::to_string_pretty(&result).context("serialize parse result")?;
    json.push('\n');
    print!("{json}");
    Ok(exit_codes::OK)
}

struct RunArgs {
    request: Option<String>,
    request_file: Option<PathBuf>,
    command: Option<String>,
    max_attempts: Option<u32>,
    timeout_secs: Option<u64>,
    workspace: Option<PathBuf>,
}

fn cmd_run(args: RunArgs) -> Result<i32> {
    let root = match args.workspace {
        Some(path) => path,
        None => std::env::current_dir().context("resolve current directory")?,
    };

    let request = match (args.request, args.request_file) {
        (Some(text), None) => text,
        (None, Some(path)) => {
            fs::read_to_string(&path).with_context(|| format!("read {}", path.display()))?
        }
        _ => return Err(anyhow!("provide exactly one of --request or --request-file")),
    };
    if request.trim().is_empty() {
        return Err(anyhow!("change request is empty"));
    }

    let mut config = load_config(&StatePaths::new(&root).config_path)?;
    if let Some(command) = args.command {
        config.validation.command = command;
    }
    if let Some(max_attempts) = args.max_attempts {
        config.max_attempts = max_attempts;
    }
    if let Some(timeout_secs) = args.timeout_secs {
        config.validation.timeout_secs = timeout_secs;
    }
    config.validate()?;

    // The baseline restore discards uncommitted work wholesale; refuse to run
    // over a dirty tree so only loop edits are ever reverted.
    let git = Git::new(&root);
    git.ensure_clean_except_prefixes(&[".patchloop/"])?;

    let generator = CommandGenerator::new(
        config.generator.command.clone(),
        Duration::from_secs(config.generator.timeout_secs),
        RetryPolicy {
            max_retries: config.generator.max_rate_limit_retries,
            base_delay: Duration::from_secs(config.generator.retry_base_delay_secs),
        },
    );

    let outcome = run_loop(
        &root,
        &generator,
        &GitBaseline,
        &request,
        &config,
        &CancelFlag::new(),
        |record| {
            let verdict = if record.validation.passed {
                "passed"
            } else {
                "failed"
            };
            eprintln!(
                "attempt {}: {} edits, validation {}",
                record.attempt,
                record.parse.edits.len(),
                verdict
            );
        },
    )?;

    match outcome {
        RunOutcome::Success { attempt, .. } => {
            println!("validation passed on attempt {attempt}");
            Ok(exit_codes::OK)
        }
        RunOutcome::Exhausted { last_validation } => {
            eprintln!("attempts exhausted; last validation output:");
            eprintln!("{}", last_validation.output);
            Ok(exit_codes::EXHAUSTED)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_init() {
        let cli = Cli::parse_from(["patchloop", "init"]);
        assert!(matches!(cli.command, Command::Init { force: false }));
    }

    #[test]
    fn parse_init_force() {
        let cli = Cli::parse_from(["patchloop", "init", "--force"]);
        assert!(matches!(cli.command, Command::Init { force: true }));
    }

    #[test]
    fn parse_run_with_overrides() {
        let cli = Cli::parse_from([
            "patchloop",
            "run",
            "--request",
            "add a flag",
            "--command",
            "cargo test",
            "--max-attempts",
            "5",
        ]);
        let Command::Run {
            request,
            command,
            max_attempts,
            ..
        } = cli.command
        else {
            panic!("expected run command");
        };
        assert_eq!(request.as_deref(), Some("add a flag"));
        assert_eq!(command.as_deref(), Some("cargo test"));
        assert_eq!(max_attempts, Some(5));
    }

    #[test]
    fn request_and_request_file_conflict() {
        let result = Cli::try_parse_from([
            "patchloop",
            "run",
            "--request",
            "x",
            "--request-file",
            "req.md",
        ]);
        assert!(result.is_err());
    }
}
