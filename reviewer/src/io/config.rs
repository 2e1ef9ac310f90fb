//! Reviewer configuration stored under `.reviewer/config.toml`.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

/// Default location of the config file, relative to the working directory.
pub const DEFAULT_CONFIG_PATH: &str = ".reviewer/config.toml";

/// Reviewer configuration (TOML).
///
/// Meant to be edited by humans. Missing fields default to values that
/// work against github.com with the `gh` CLI installed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default)]
pub struct ReviewerConfig {
    pub worker: WorkerConfig,
    pub sandbox: SandboxSettings,
    pub pipeline: PipelineSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct WorkerConfig {
    /// Executable that runs the reasoning worker (`codex`).
    pub program: String,
    /// Model for the reasoning stages. Uses the backend default when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Model for the structured-output correction pass. Falls back to `model`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub corrector_model: Option<String>,
    pub reasoning_effort: String,
    /// Maximum worker turns in one tool-using delegation.
    pub max_tool_rounds: u32,
    /// Truncate worker stdout/stderr captures beyond this many bytes.
    pub output_limit_bytes: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            program: "codex".to_string(),
            model: None,
            corrector_model: None,
            reasoning_effort: "medium".to_string(),
            max_tool_rounds: 16,
            output_limit_bytes: 200_000,
        }
    }
}

impl WorkerConfig {
    pub fn corrector_model(&self) -> Option<&str> {
        self.corrector_model.as_deref().or(self.model.as_deref())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SandboxSettings {
    /// Commands exposed while fetching pull request context.
    pub read_commands: Vec<String>,
    /// Commands exposed while posting review comments.
    pub write_commands: Vec<String>,
    /// Truncate command stdout beyond this many characters.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub truncate_length: Option<usize>,
    /// Directory commands run in. Defaults to the current directory.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub working_dir: Option<PathBuf>,
    pub command_timeout_secs: u64,
    /// Upper bound on bytes captured from a command before truncation.
    pub capture_limit_bytes: usize,
}

impl Default for SandboxSettings {
    fn default() -> Self {
        let scm = vec!["gh".to_string(), "curl".to_string(), "jq".to_string()];
        Self {
            read_commands: scm.clone(),
            write_commands: scm,
            truncate_length: Some(20_000),
            working_dir: None,
            command_timeout_secs: 120,
            capture_limit_bytes: 2_000_000,
        }
    }
}

impl SandboxSettings {
    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PipelineSettings {
    /// Wall-clock budget per stage, covering the worker and its commands.
    pub stage_timeout_secs: u64,
    /// Maximum bytes of a rendered prompt before sections are dropped.
    pub prompt_budget_bytes: usize,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            stage_timeout_secs: 15 * 60,
            prompt_budget_bytes: 80_000,
        }
    }
}

impl PipelineSettings {
    pub fn stage_timeout(&self) -> Duration {
        Duration::from_secs(self.stage_timeout_secs)
    }
}

impl ReviewerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.worker.program.trim().is_empty() {
            return Err(anyhow!("worker.program must be non-empty"));
        }
        if self.worker.max_tool_rounds == 0 {
            return Err(anyhow!("worker.max_tool_rounds must be > 0"));
        }
        if self.worker.output_limit_bytes == 0 {
            return Err(anyhow!("worker.output_limit_bytes must be > 0"));
        }
        if self.sandbox.command_timeout_secs == 0 {
            return Err(anyhow!("sandbox.command_timeout_secs must be > 0"));
        }
        if self.sandbox.capture_limit_bytes == 0 {
            return Err(anyhow!("sandbox.capture_limit_bytes must be > 0"));
        }
        for name in self
            .sandbox
            .read_commands
            .iter()
            .chain(&self.sandbox.write_commands)
        {
            validate_command_name(name)?;
        }
        if self.pipeline.stage_timeout_secs == 0 {
            return Err(anyhow!("pipeline.stage_timeout_secs must be > 0"));
        }
        if self.pipeline.prompt_budget_bytes == 0 {
            return Err(anyhow!("pipeline.prompt_budget_bytes must be > 0"));
        }
        Ok(())
    }
}

fn validate_command_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(anyhow!("sandbox command names must be non-empty"));
    }
    if name.chars().any(|c| c.is_whitespace() || c == '/' || c == '\\') {
        return Err(anyhow!(
            "sandbox command '{name}' must be a bare executable name"
        ));
    }
    Ok(())
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `ReviewerConfig::default()`.
pub fn load_config(path: &Path) -> Result<ReviewerConfig> {
    if !path.exists() {
        let cfg = ReviewerConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: ReviewerConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("validate {}", path.display()))?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &ReviewerConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("config path missing parent {}", path.display()))?;
    if !parent.as_os_str().is_empty() {
        fs::create_dir_all(parent)
            .with_context(|| format!("create directory {}", parent.display()))?;
    }
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}
