//! Loop configuration stored under `.patchloop/config.toml`.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

/// Loop configuration (TOML).
///
/// This file is intended to be edited by humans and must remain stable and
/// automatable. Missing fields default to sensible values.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LoopConfig {
    /// Attempt budget for one run (generation calls are bounded by this).
    pub max_attempts: u32,

    /// Maximum bytes for the rendered prompt before dropping feedback sections.
    pub prompt_budget_bytes: usize,

    pub validation: ValidationConfig,

    pub generator: GeneratorConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ValidationConfig {
    /// Shell command that decides whether applied edits are acceptable.
    pub command: String,

    /// Wall-clock budget for one validation run in seconds.
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct GeneratorConfig {
    /// Command that reads a prompt on stdin and writes the response to stdout.
    pub command: Vec<String>,

    /// Wall-clock budget for one generator invocation in seconds.
    pub timeout_secs: u64,

    /// Retries on rate-limited invocations before the run fails.
    pub max_rate_limit_retries: u32,

    /// Base backoff delay in seconds (doubles per retry).
    pub retry_base_delay_secs: u64,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            command: "just ci".to_string(),
            timeout_secs: 300,
        }
    }
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            command: vec!["llm".to_string()],
            timeout_secs: 30 * 60,
            max_rate_limit_retries: 5,
            retry_base_delay_secs: 30,
        }
    }
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            prompt_budget_bytes: 40_000,
            validation: ValidationConfig::default(),
            generator: GeneratorConfig::default(),
        }
    }
}

impl LoopConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(anyhow!("max_attempts must be > 0"));
        }
        if self.prompt_budget_bytes == 0 {
            return Err(anyhow!("prompt_budget_bytes must be > 0"));
        }
        if self.validation.command.trim().is_empty() {
            return Err(anyhow!("validation.command must be non-empty"));
        }
        if self.validation.timeout_secs == 0 {
            return Err(anyhow!("validation.timeout_secs must be > 0"));
        }
        if self.generator.command.is_empty() || self.generator.command[0].trim().is_empty() {
            return Err(anyhow!("generator.command must be a non-empty array"));
        }
        if self.generator.timeout_secs == 0 {
            return Err(anyhow!("generator.timeout_secs must be > 0"));
        }
        Ok(())
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `LoopConfig::default()`.
pub fn load_config(path: &Path) -> Result<LoopConfig> {
    if !path.exists() {
        let cfg = LoopConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: LoopConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &LoopConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("config path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_missing_returns_default() {
        let temp = tempfile::tempdir().expect("tempdir");
        let cfg = load_config(&temp.path().join("missing.toml")).expect("load");
        assert_eq!(cfg, LoopConfig::default());
    }

    #[test]
    fn write_then_load_round_trips() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("config.toml");
        let cfg = LoopConfig {
            max_attempts: 5,
            validation: ValidationConfig {
                command: "cargo test".to_string(),
                timeout_secs: 120,
            },
            ..LoopConfig::default()
        };
        write_config(&path, &cfg).expect("write");
        let loaded = load_config(&path).expect("load");
        assert_eq!(loaded, cfg);
    }

    #[test]
    fn partial_file_fills_missing_fields_from_defaults() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("config.toml");
        fs::write(&path, "max_attempts = 7\n").expect("write");
        let cfg = load_config(&path).expect("load");
        assert_eq!(cfg.max_attempts, 7);
        assert_eq!(cfg.validation, ValidationConfig::default());
    }

    #[test]
    fn zero_max_attempts_is_rejected() {
        let cfg = LoopConfig {
            max_attempts: 0,
            ..LoopConfig::default()
        };
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("max_attempts"));
    }

    #[test]
    fn empty_validation_command_is_rejected() {
        let cfg = LoopConfig {
            validation: ValidationConfig {
                command: "  ".to_string(),
                timeout_secs: 10,
            },
            ..LoopConfig::default()
        };
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("validation.command"));
    }
}
