//! Analysis agent: categorized findings from the fetched PR context.

use anyhow::{Context, Result};
use tracing::{debug, instrument};

use crate::core::context::{ContextStore, StageOutput};
use crate::core::stage::Stage;
use crate::io::prompt::PromptBuilder;
use crate::io::worker::{Worker, WorkerRequest};

use super::non_empty_text;

#[derive(Debug, Clone)]
pub struct AnalyzeAgent {
    prompts: PromptBuilder,
    model: Option<String>,
}

impl AnalyzeAgent {
    pub fn new(prompt_budget_bytes: usize, model: Option<String>) -> Self {
        Self {
            prompts: PromptBuilder::new(prompt_budget_bytes),
            model,
        }
    }

    #[instrument(skip_all, fields(stage = %Stage::Analyze))]
    pub async fn run(&self, worker: &dyn Worker, store: &mut ContextStore) -> Result<()> {
        let request = store.request().context("review request missing from context")?;
        let details = store
            .pr_details()
            .context("pull request details missing from context")?;
        let prompt = self.prompts.build_analyze(
            details,
            &request.review_criteria,
            request.severity_threshold,
        )?;

        let output = worker
            .invoke(WorkerRequest {
                stage: Stage::Analyze.name(),
                prompt: prompt.as_str(),
                tools: None,
                schema: None,
                model: self.model.as_deref(),
            })
            .await?;
        let analysis = non_empty_text(Stage::Analyze, output)?;
        debug!(bytes = analysis.len(), "analysis stored");
        store.set(StageOutput::CodeAnalysis(analysis));
        Ok(())
    }
}
