//! Posting agent: publishes the structured review through mutating commands.
//!
//! Posting is best effort. A failed attempt is still recorded as a
//! [`PostReport`] so callers can see what went wrong.

use anyhow::{Context, Result};
use tracing::{info, instrument, warn};

use crate::core::context::{ContextStore, PostReport, StageKey, StageOutput};
use crate::core::stage::Stage;
use crate::io::prompt::PromptBuilder;
use crate::io::sandbox::Sandbox;
use crate::io::worker::{Worker, WorkerRequest};

use super::non_empty_text;

#[derive(Debug, Clone)]
pub struct PostAgent {
    prompts: PromptBuilder,
    model: Option<String>,
}

impl PostAgent {
    pub fn new(prompt_budget_bytes: usize, model: Option<String>) -> Self {
        Self {
            prompts: PromptBuilder::new(prompt_budget_bytes),
            model,
        }
    }

    #[instrument(skip_all, fields(stage = %Stage::Post))]
    pub async fn run(
        &self,
        worker: &dyn Worker,
        sandbox: &Sandbox,
        store: &mut ContextStore,
    ) -> Result<()> {
        let pr = store
            .pull_request()
            .context("pull request reference missing from context")?;
        let review = store
            .render(StageKey::Review)
            .context("structured review missing from context")?;
        let prompt = self.prompts.build_post(pr, &review)?;

        let output = worker
            .invoke(WorkerRequest {
                stage: Stage::Post.name(),
                prompt: prompt.as_str(),
                tools: Some(sandbox),
                schema: None,
                model: self.model.as_deref(),
            })
            .await?;
        let detail = non_empty_text(Stage::Post, output)?;
        info!("review comments posted");
        store.set(StageOutput::PostResult(PostReport {
            posted: true,
            detail,
        }));
        Ok(())
    }

    /// Record an unsuccessful posting attempt.
    pub fn record_failure(store: &mut ContextStore, reason: impl Into<String>) {
        let detail = reason.into();
        warn!(%detail, "posting review comments failed");
        store.set(StageOutput::PostResult(PostReport {
            posted: false,
            detail,
        }));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::pr_ref::PrReference;
    use crate::io::sandbox::{CommandAccess, SandboxConfig};
    use crate::test_support::{PR_URL, ScriptedWorker, sample_review};

    fn store_with_review() -> ContextStore {
        let mut store = ContextStore::new();
        store.set(StageOutput::PullRequest(
            PrReference::parse(PR_URL).expect("pr"),
        ));
        store.set(StageOutput::Review(sample_review()));
        store
    }

    fn mutating(commands: &[&str]) -> Sandbox {
        Sandbox::new(&SandboxConfig::new(
            commands.iter().map(|c| c.to_string()).collect(),
            CommandAccess::Mutating,
        ))
    }

    #[tokio::test]
    async fn posts_review_with_mutating_tools() {
        let worker = ScriptedWorker::new()
            .call("post_review_comments", "echo", &["review", "--comment"])
            .reply_text("post_review_comments", "1 comment posted");
        let mut store = store_with_review();

        PostAgent::new(100_000, None)
            .run(&worker, &mutating(&["echo"]), &mut store)
            .await
            .expect("run");

        let report = store.post_report().expect("report");
        assert!(report.posted);
        assert_eq!(report.detail, "1 comment posted");
        let call = &worker.calls()[0];
        assert!(call.prompt.contains("missing null check"));
        assert!(call.prompt.contains("--repo acme/widgets"));
        assert_eq!(call.tool_results, vec!["review --comment\n".to_string()]);
    }

    #[test]
    fn record_failure_keeps_reason() {
        let mut store = ContextStore::new();
        PostAgent::record_failure(&mut store, "gh: authentication required");
        let report = store.post_report().expect("report");
        assert!(!report.posted);
        assert_eq!(report.detail, "gh: authentication required");
    }
}
