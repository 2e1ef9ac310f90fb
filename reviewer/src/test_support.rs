//! Test-only helpers: a scripted worker and canned review data.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::{Value, json};

use crate::core::types::{ApprovalRecommendation, ReviewComment, ReviewResult, Severity};
use crate::io::config::ReviewerConfig;
use crate::io::worker::{Worker, WorkerFailure, WorkerOutput, WorkerRequest};

/// URL that parses into `acme/widgets#42`.
pub const PR_URL: &str = "https://github.com/acme/widgets/pull/42";

/// One scripted step for a stage.
#[derive(Debug, Clone)]
pub enum Scripted {
    Reply(WorkerOutput),
    Fail(WorkerFailure),
    /// Run a sandbox command, record its result, then continue with the next step.
    Call { command: String, args: Vec<String> },
    /// Never complete; used to exercise timeouts and cancellation.
    Hang,
}

/// What a scripted worker saw for one invocation.
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub stage: String,
    pub prompt: String,
    pub tool_names: Option<Vec<String>>,
    pub schema: Option<String>,
    pub model: Option<String>,
    /// Results of scripted sandbox calls made during this invocation.
    pub tool_results: Vec<String>,
}

/// Worker that replays per-stage scripts and records every request.
///
/// A stage without a remaining script step fails with a backend error.
#[derive(Debug, Default)]
pub struct ScriptedWorker {
    scripts: Mutex<HashMap<String, VecDeque<Scripted>>>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl ScriptedWorker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(self, stage: &str, step: Scripted) -> Self {
        self.scripts
            .lock()
            .expect("scripts lock")
            .entry(stage.to_string())
            .or_default()
            .push_back(step);
        self
    }

    pub fn reply_text(self, stage: &str, text: &str) -> Self {
        self.push(stage, Scripted::Reply(WorkerOutput::Text(text.to_string())))
    }

    pub fn reply_json(self, stage: &str, value: Value) -> Self {
        self.push(stage, Scripted::Reply(WorkerOutput::Structured(value)))
    }

    pub fn fail(self, stage: &str, failure: WorkerFailure) -> Self {
        self.push(stage, Scripted::Fail(failure))
    }

    pub fn call(self, stage: &str, command: &str, args: &[&str]) -> Self {
        self.push(
            stage,
            Scripted::Call {
                command: command.to_string(),
                args: args.iter().map(|a| a.to_string()).collect(),
            },
        )
    }

    pub fn hang(self, stage: &str) -> Self {
        self.push(stage, Scripted::Hang)
    }

    /// Every invocation so far, in order.
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().expect("calls lock").clone()
    }

    pub fn stages(&self) -> Vec<String> {
        self.calls().into_iter().map(|call| call.stage).collect()
    }

    fn next_step(&self, stage: &str) -> Option<Scripted> {
        self.scripts
            .lock()
            .expect("scripts lock")
            .get_mut(stage)
            .and_then(VecDeque::pop_front)
    }
}

#[async_trait]
impl Worker for ScriptedWorker {
    async fn invoke(&self, request: WorkerRequest<'_>) -> Result<WorkerOutput, WorkerFailure> {
        let index = {
            let mut calls = self.calls.lock().expect("calls lock");
            calls.push(RecordedCall {
                stage: request.stage.to_string(),
                prompt: request.prompt.to_string(),
                tool_names: request
                    .tools
                    .map(|sandbox| sandbox.names().into_iter().map(str::to_string).collect()),
                schema: request.schema.map(|schema| schema.name().to_string()),
                model: request.model.map(str::to_string),
                tool_results: Vec::new(),
            });
            calls.len() - 1
        };

        loop {
            match self.next_step(request.stage) {
                Some(Scripted::Reply(output)) => return Ok(output),
                Some(Scripted::Fail(failure)) => return Err(failure),
                Some(Scripted::Hang) => std::future::pending::<()>().await,
                Some(Scripted::Call { command, args }) => {
                    let result = match request.tools {
                        Some(sandbox) => sandbox.call(&command, &args).await,
                        None => format!("Error: no tools available for '{command}'"),
                    };
                    self.calls.lock().expect("calls lock")[index]
                        .tool_results
                        .push(result);
                }
                None => {
                    return Err(WorkerFailure::Backend(format!(
                        "no scripted response for stage {}",
                        request.stage
                    )));
                }
            }
        }
    }
}

/// Config whose sandboxes only allow harmless local commands.
pub fn local_config() -> ReviewerConfig {
    let mut cfg = ReviewerConfig::default();
    cfg.sandbox.read_commands = vec!["echo".to_string(), "printf".to_string()];
    cfg.sandbox.write_commands = vec!["echo".to_string()];
    cfg.sandbox.command_timeout_secs = 5;
    cfg.pipeline.stage_timeout_secs = 5;
    cfg
}

/// A complete, schema-conforming review.
pub fn sample_review() -> ReviewResult {
    ReviewResult {
        review_summary: "Solid change with one missing null check.".to_string(),
        comments_added: vec![ReviewComment {
            file_path: "src/lib.rs".to_string(),
            line_number: 12,
            comment: "`value` can be `None` here.".to_string(),
            severity: Severity::High,
            category: "code_quality".to_string(),
        }],
        issues_found: Vec::new(),
        approval_recommendation: ApprovalRecommendation::RequestChanges,
        success: true,
        error: None,
    }
}

/// JSON form of [`sample_review`].
pub fn sample_review_json() -> Value {
    serde_json::to_value(sample_review()).unwrap_or_else(|_| json!({}))
}

/// Worker scripted for a run where every stage succeeds.
pub fn happy_worker() -> ScriptedWorker {
    ScriptedWorker::new()
        .reply_text("fetch_pr_details", "title: Add widgets\nfiles: src/lib.rs")
        .reply_text("analyze_code_changes", "Code quality: missing null check.")
        .reply_text(
            "generate_review_comments",
            &sample_review_json().to_string(),
        )
        .reply_json("structure_review_comments", sample_review_json())
        .reply_text("post_review_comments", "posted 1 comment and a review")
}
