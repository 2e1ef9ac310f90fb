//! Reasoning-worker abstraction.
//!
//! The [`Worker`] trait decouples the pipeline from the actual reasoning
//! backend (currently `codex exec`). Tests use scripted workers that return
//! predetermined outputs without spawning processes.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, info, instrument, warn};

use crate::io::config::WorkerConfig;
use crate::io::process::run_command_with_timeout;
use crate::io::prompt::{PromptBuilder, ToolDescriptor, ToolTurnInputs, TranscriptStep};
use crate::io::sandbox::Sandbox;
use crate::io::schema::OutputSchema;

/// Parameters for one worker delegation.
#[derive(Debug, Clone, Copy)]
pub struct WorkerRequest<'a> {
    /// Stage (branch) name, used for logs and scripted fakes.
    pub stage: &'a str,
    /// Instruction for the worker.
    pub prompt: &'a str,
    /// Commands the worker may run while reasoning.
    pub tools: Option<&'a Sandbox>,
    /// Schema the final output must conform to.
    pub schema: Option<&'a OutputSchema>,
    /// Model override; the backend default applies when `None`.
    pub model: Option<&'a str>,
}

/// What a worker produced.
#[derive(Debug, Clone, PartialEq)]
pub enum WorkerOutput {
    Text(String),
    Structured(Value),
}

impl WorkerOutput {
    /// Text form, serializing structured output as pretty JSON.
    pub fn into_text(self) -> String {
        match self {
            WorkerOutput::Text(text) => text,
            WorkerOutput::Structured(value) => {
                serde_json::to_string_pretty(&value).unwrap_or_else(|_| value.to_string())
            }
        }
    }

    /// Structured form, parsing text as JSON when possible.
    pub fn into_value(self) -> Result<Value, WorkerFailure> {
        match self {
            WorkerOutput::Structured(value) => Ok(value),
            WorkerOutput::Text(text) => parse_json_text(&text),
        }
    }
}

/// Why a delegation produced no usable output.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WorkerFailure {
    #[error("worker backend failed: {0}")]
    Backend(String),
    #[error("worker timed out after {0:?}")]
    TimedOut(Duration),
    #[error("worker output is malformed: {0}")]
    Malformed(String),
    #[error("worker did not finish within {0} tool rounds")]
    ToolRoundsExhausted(u32),
}

/// Abstraction over reasoning backends.
#[async_trait]
pub trait Worker: Send + Sync {
    async fn invoke(&self, request: WorkerRequest<'_>) -> Result<WorkerOutput, WorkerFailure>;
}

/// Parse JSON from worker text, tolerating a surrounding Markdown code fence.
pub fn parse_json_text(text: &str) -> Result<Value, WorkerFailure> {
    let trimmed = text.trim();
    let body = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|rest| rest.trim_end().strip_suffix("```"))
        .unwrap_or(trimmed);
    serde_json::from_str(body.trim()).map_err(|err| WorkerFailure::Malformed(err.to_string()))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
enum TurnAction {
    Call,
    Finish,
}

/// One reply in a tool-using delegation.
#[derive(Debug, Clone, Deserialize)]
struct ToolTurn {
    action: TurnAction,
    #[serde(default)]
    command: String,
    #[serde(default)]
    args: Vec<String>,
    #[serde(default)]
    output: String,
}

/// Worker that spawns `codex exec`.
#[derive(Debug, Clone)]
pub struct CodexWorker {
    config: WorkerConfig,
    prompt_budget_bytes: usize,
    /// Per-process ceiling; the stage budget usually cuts in first.
    exec_timeout: Duration,
}

impl CodexWorker {
    pub fn new(config: WorkerConfig, prompt_budget_bytes: usize, exec_timeout: Duration) -> Self {
        Self {
            config,
            prompt_budget_bytes,
            exec_timeout,
        }
    }

    /// Run one `codex exec` and return its last message.
    #[instrument(skip_all, fields(stage = stage, schema = schema.map(OutputSchema::name)))]
    async fn exec_once(
        &self,
        stage: &str,
        prompt: &str,
        schema: Option<&OutputSchema>,
        model: Option<&str>,
    ) -> Result<String, WorkerFailure> {
        let scratch = tempfile::tempdir().map_err(|e| backend("create scratch dir", e))?;
        let output_path = scratch.path().join("output.txt");

        let mut cmd = Command::new(&self.config.program);
        cmd.arg("exec")
            .arg("-c")
            .arg(format!(
                "model_reasoning_effort={}",
                self.config.reasoning_effort
            ))
            // The worker only reasons; commands go through the sandbox.
            .arg("--sandbox")
            .arg("read-only")
            .arg("--skip-git-repo-check");
        if let Some(model) = model {
            cmd.arg("--model").arg(model);
        }
        if let Some(schema) = schema {
            let schema_path = scratch.path().join(format!("{}.schema.json", schema.name()));
            schema
                .write_to(&schema_path)
                .map_err(|e| backend("write output schema", e))?;
            cmd.arg("--output-schema").arg(schema_path);
        }
        cmd.arg("--output-last-message")
            .arg(&output_path)
            .arg("-")
            .current_dir(scratch.path());

        info!(program = %self.config.program, "starting worker exec");
        let output = run_command_with_timeout(
            cmd,
            Some(prompt.as_bytes()),
            self.exec_timeout,
            self.config.output_limit_bytes,
        )
        .await
        .map_err(|e| backend("run worker", e))?;

        if output.timed_out {
            warn!(timeout_secs = self.exec_timeout.as_secs(), "worker exec timed out");
            return Err(WorkerFailure::TimedOut(self.exec_timeout));
        }
        if !output.status.success() {
            warn!(exit_code = ?output.status.code(), "worker exec failed");
            return Err(WorkerFailure::Backend(format!(
                "{} exited with status {:?}: {}",
                self.config.program,
                output.status.code(),
                output.stderr_lossy().trim()
            )));
        }
        read_last_message(&output_path)
    }

    /// Drive a call/finish loop, running requested commands in `tools`.
    async fn run_tool_loop(
        &self,
        request: &WorkerRequest<'_>,
        tools: &Sandbox,
    ) -> Result<WorkerOutput, WorkerFailure> {
        let turn_schema =
            OutputSchema::tool_turn().map_err(|e| backend("load tool turn schema", e))?;
        let descriptors: Vec<ToolDescriptor> = tools
            .tools()
            .map(|tool| ToolDescriptor {
                name: tool.name().to_string(),
                description: tool.describe(),
            })
            .collect();
        let final_schema = request.schema.map(OutputSchema::pretty);
        let builder = PromptBuilder::new(self.prompt_budget_bytes);
        let max_rounds = self.config.max_tool_rounds;
        let mut transcript: Vec<TranscriptStep> = Vec::new();

        for round in 0..max_rounds {
            let prompt = builder
                .build_tool_turn(&ToolTurnInputs {
                    task: request.prompt,
                    tools: &descriptors,
                    schema: final_schema.as_deref(),
                    transcript: &transcript,
                    rounds_left: max_rounds - round,
                })
                .map_err(|e| backend("render tool turn prompt", e))?;
            let raw = self
                .exec_once(request.stage, prompt.as_str(), Some(&turn_schema), request.model)
                .await?;
            let turn: ToolTurn = serde_json::from_value(parse_json_text(&raw)?)
                .map_err(|e| WorkerFailure::Malformed(e.to_string()))?;

            match turn.action {
                TurnAction::Finish => {
                    debug!(round, "worker finished tool loop");
                    if request.schema.is_some() {
                        return parse_json_text(&turn.output).map(WorkerOutput::Structured);
                    }
                    return Ok(WorkerOutput::Text(turn.output));
                }
                TurnAction::Call => {
                    let result = tools.call(&turn.command, &turn.args).await;
                    transcript.push(TranscriptStep {
                        index: transcript.len() + 1,
                        args: format!("{:?}", turn.args),
                        command: turn.command,
                        result,
                    });
                }
            }
        }

        Err(WorkerFailure::ToolRoundsExhausted(max_rounds))
    }
}

#[async_trait]
impl Worker for CodexWorker {
    #[instrument(skip_all, fields(stage = request.stage, tools = request.tools.is_some()))]
    async fn invoke(&self, request: WorkerRequest<'_>) -> Result<WorkerOutput, WorkerFailure> {
        if let Some(tools) = request.tools.filter(|sandbox| !sandbox.is_empty()) {
            return self.run_tool_loop(&request, tools).await;
        }
        let raw = self
            .exec_once(request.stage, request.prompt, request.schema, request.model)
            .await?;
        match request.schema {
            Some(_) => parse_json_text(&raw).map(WorkerOutput::Structured),
            None => Ok(WorkerOutput::Text(raw)),
        }
    }
}

fn read_last_message(path: &Path) -> Result<String, WorkerFailure> {
    if !path.exists() {
        return Err(WorkerFailure::Backend(format!(
            "missing worker output {}",
            path.display()
        )));
    }
    let text = std::fs::read_to_string(path)
        .map_err(|e| backend(&format!("read worker output {}", path.display()), e))?;
    if text.trim().is_empty() {
        return Err(WorkerFailure::Malformed("empty worker output".to_string()));
    }
    Ok(text)
}

fn backend(action: &str, err: impl std::fmt::Display) -> WorkerFailure {
    WorkerFailure::Backend(format!("{action}: {err:#}"))
}
