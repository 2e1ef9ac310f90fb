//! Fetch agent: gathers PR metadata, diffs and commits through read-only commands.

use anyhow::{Context, Result};
use tracing::{info, instrument};

use crate::core::context::{ContextStore, StageOutput};
use crate::core::stage::Stage;
use crate::io::prompt::PromptBuilder;
use crate::io::sandbox::Sandbox;
use crate::io::worker::{Worker, WorkerRequest};

use super::non_empty_text;

#[derive(Debug, Clone)]
pub struct FetchAgent {
    prompts: PromptBuilder,
    model: Option<String>,
}

impl FetchAgent {
    pub fn new(prompt_budget_bytes: usize, model: Option<String>) -> Self {
        Self {
            prompts: PromptBuilder::new(prompt_budget_bytes),
            model,
        }
    }

    /// Populate `pr_details` from the pull request in the store.
    #[instrument(skip_all, fields(stage = %Stage::Fetch))]
    pub async fn run(
        &self,
        worker: &dyn Worker,
        sandbox: &Sandbox,
        store: &mut ContextStore,
    ) -> Result<()> {
        let request = store.request().context("review request missing from context")?;
        let pr = store
            .pull_request()
            .context("pull request reference missing from context")?;
        let prompt = self.prompts.build_fetch(pr, &request.pull_request_url)?;

        let output = worker
            .invoke(WorkerRequest {
                stage: Stage::Fetch.name(),
                prompt: prompt.as_str(),
                tools: Some(sandbox),
                schema: None,
                model: self.model.as_deref(),
            })
            .await?;
        let details = non_empty_text(Stage::Fetch, output)?;
        info!(bytes = details.len(), "fetched pull request details");
        store.set(StageOutput::PrDetails(details));
        Ok(())
    }
}
