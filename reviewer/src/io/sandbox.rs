//! Closed-world command sandbox exposed to reasoning workers.
//!
//! A [`Sandbox`] is built once from an allow-list. Each allowed name becomes
//! one [`CommandTool`]; names outside the list have no tool at all, so they
//! cannot be reached from a worker no matter what it asks for.
//!
//! Invocations never fail: a non-zero exit, a spawn error or a timeout is
//! reported back to the worker as an `Error: ...` string it can react to.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::process::Command;
use tracing::{error, info, instrument};

use crate::io::config::SandboxSettings;
use crate::io::process::run_command_with_timeout;

/// Appended to output cut at the truncation limit.
pub const TRUNCATION_MARKER: &str = "<truncated>";

/// Whether a command may change remote state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandAccess {
    ReadOnly,
    Mutating,
}

/// Static description of a command capability.
///
/// Access is not part of the descriptor: the same command is read-only in
/// the fetching sandbox and mutating in the posting one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CommandSpec {
    pub name: &'static str,
    pub description: &'static str,
}

const CATALOG: &[CommandSpec] = &[
    CommandSpec {
        name: "gh",
        description: "GitHub CLI: pull requests, diffs, reviews and API calls (`gh pr view`, `gh pr diff`, `gh api`).",
    },
    CommandSpec {
        name: "git",
        description: "Git CLI for inspecting repository history.",
    },
    CommandSpec {
        name: "curl",
        description: "HTTP client for REST endpoints of the source-control host.",
    },
    CommandSpec {
        name: "jq",
        description: "JSON processor; pass the filter and input file as arguments.",
    },
];

const GENERIC_DESCRIPTION: &str = "Run the command with the given arguments.";

/// Look up the built-in descriptor for a command name.
pub fn command_spec(name: &str) -> Option<&'static CommandSpec> {
    CATALOG.iter().find(|spec| spec.name == name)
}

/// Sandbox construction parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SandboxConfig {
    pub allowed_commands: Vec<String>,
    pub truncate_length: Option<usize>,
    pub working_dir: Option<PathBuf>,
    pub access: CommandAccess,
    pub timeout: Duration,
    pub capture_limit_bytes: usize,
}

impl SandboxConfig {
    pub fn new(allowed_commands: Vec<String>, access: CommandAccess) -> Self {
        let defaults = SandboxSettings::default();
        Self {
            allowed_commands,
            truncate_length: None,
            working_dir: None,
            access,
            timeout: defaults.command_timeout(),
            capture_limit_bytes: defaults.capture_limit_bytes,
        }
    }

    pub fn read_only(settings: &SandboxSettings) -> Self {
        Self::from_settings(settings, settings.read_commands.clone(), CommandAccess::ReadOnly)
    }

    pub fn mutating(settings: &SandboxSettings) -> Self {
        Self::from_settings(settings, settings.write_commands.clone(), CommandAccess::Mutating)
    }

    fn from_settings(
        settings: &SandboxSettings,
        allowed_commands: Vec<String>,
        access: CommandAccess,
    ) -> Self {
        Self {
            allowed_commands,
            truncate_length: settings.truncate_length,
            working_dir: settings.working_dir.clone(),
            access,
            timeout: settings.command_timeout(),
            capture_limit_bytes: settings.capture_limit_bytes,
        }
    }
}

#[derive(Debug)]
struct ExecPolicy {
    truncate_length: Option<usize>,
    working_dir: Option<PathBuf>,
    timeout: Duration,
    capture_limit_bytes: usize,
}

/// One invocable command capability.
#[derive(Debug, Clone)]
pub struct CommandTool {
    name: String,
    description: &'static str,
    access: CommandAccess,
    policy: Arc<ExecPolicy>,
}

impl CommandTool {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Tool name presented to workers (`gh_cli`).
    pub fn tool_name(&self) -> String {
        format!("{}_cli", self.name)
    }

    pub fn access(&self) -> CommandAccess {
        self.access
    }

    /// Human-readable usage text for worker prompts.
    pub fn describe(&self) -> String {
        let mut text = format!("Run `{}`. {}", self.name, self.description);
        match self.access() {
            CommandAccess::ReadOnly => text.push_str(" Use it only to read state."),
            CommandAccess::Mutating => text.push_str(" It may change remote state."),
        }
        if let Some(limit) = self.policy.truncate_length {
            text.push_str(&format!(
                " Output is truncated to {limit} characters, ending with {TRUNCATION_MARKER} if it is longer than that."
            ));
        }
        text
    }

    /// Run the command with `args` and return its output or an error string.
    #[instrument(skip_all, fields(command = %self.name, access = ?self.access))]
    pub async fn invoke(&self, args: &[String]) -> String {
        info!(args = ?args, "{} called", self.tool_name());
        let mut cmd = Command::new(&self.name);
        cmd.args(args);
        if let Some(dir) = &self.policy.working_dir {
            cmd.current_dir(dir);
        }
        apply_scm_env(&mut cmd);

        let output = match run_command_with_timeout(
            cmd,
            None,
            self.policy.timeout,
            self.policy.capture_limit_bytes,
        )
        .await
        {
            Ok(output) => output,
            Err(err) => {
                let msg = format!(
                    "Command {} {:?} could not be started: {err:#}",
                    self.name, args
                );
                error!("{msg}");
                return format!("Error: {msg}");
            }
        };

        if output.timed_out {
            let msg = format!(
                "Command {} {:?} timed out after {}s",
                self.name,
                args,
                self.policy.timeout.as_secs()
            );
            error!("{msg}");
            return format!("Error: {msg}");
        }
        if !output.status.success() {
            let code = output
                .status
                .code()
                .map(|c| c.to_string())
                .unwrap_or_else(|| "none".to_string());
            let msg = format!(
                "Command {} {:?} failed with return code {} and stderr: {}{}",
                self.name,
                args,
                code,
                output.stderr_lossy(),
                output.stderr_truncated_notice(&self.name),
            );
            error!("{msg}");
            return format!("Error: {msg}");
        }

        let mut out = truncate_output(output.stdout_lossy(), self.policy.truncate_length);
        if output.stdout_truncated > 0 && !out.ends_with(TRUNCATION_MARKER) {
            // Capture limit hit before the character limit did.
            out.push_str(TRUNCATION_MARKER);
            out.push_str(&output.stdout_truncated_notice(&self.name));
        }
        info!(output = %out, "{} output", self.tool_name());
        out
    }
}

/// Cut `output` to `limit` characters and append [`TRUNCATION_MARKER`].
pub fn truncate_output(output: String, limit: Option<usize>) -> String {
    let Some(limit) = limit else {
        return output;
    };
    match output.char_indices().nth(limit) {
        Some((cut, _)) => {
            let mut truncated = output[..cut].to_string();
            truncated.push_str(TRUNCATION_MARKER);
            truncated
        }
        None => output,
    }
}

/// Children see `GH_TOKEN` when only `GITHUB_API_KEY` is provided.
fn apply_scm_env(cmd: &mut Command) {
    let has_gh_token = std::env::var_os("GH_TOKEN").is_some()
        || std::env::var_os("GITHUB_TOKEN").is_some();
    if has_gh_token {
        return;
    }
    if let Some(key) = std::env::var_os("GITHUB_API_KEY") {
        cmd.env("GH_TOKEN", key);
    }
}

/// Registry of command capabilities, keyed by command name.
#[derive(Debug, Clone)]
pub struct Sandbox {
    tools: BTreeMap<String, CommandTool>,
}

impl Sandbox {
    pub fn new(config: &SandboxConfig) -> Self {
        let policy = Arc::new(ExecPolicy {
            truncate_length: config.truncate_length,
            working_dir: config.working_dir.clone(),
            timeout: config.timeout,
            capture_limit_bytes: config.capture_limit_bytes,
        });
        let tools = config
            .allowed_commands
            .iter()
            .map(|name| {
                let description = command_spec(name)
                    .map(|spec| spec.description)
                    .unwrap_or(GENERIC_DESCRIPTION);
                let tool = CommandTool {
                    name: name.clone(),
                    description,
                    access: config.access,
                    policy: Arc::clone(&policy),
                };
                (name.clone(), tool)
            })
            .collect();
        Self { tools }
    }

    /// Capability for `name`, if it was allowed.
    pub fn tool(&self, name: &str) -> Option<&CommandTool> {
        self.tools.get(name)
    }

    pub fn tools(&self) -> impl Iterator<Item = &CommandTool> {
        self.tools.values()
    }

    pub fn names(&self) -> Vec<&str> {
        self.tools.keys().map(String::as_str).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Invoke `name`, or report that no such capability exists.
    pub async fn call(&self, name: &str, args: &[String]) -> String {
        match self.tool(name) {
            Some(tool) => tool.invoke(args).await,
            None => format!(
                "Error: no command named '{name}' is available; available commands: {}",
                self.names().join(", ")
            ),
        }
    }
}
