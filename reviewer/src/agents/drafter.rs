//! Draft agent: turns the analysis into a review in `ReviewResult` shape.
//!
//! The draft is stored as raw text. Nothing checks it here; the corrector
//! restates it against the schema in the next stage.

use anyhow::{Context, Result};
use tracing::{debug, instrument};

use crate::core::context::{ContextStore, StageOutput};
use crate::core::stage::Stage;
use crate::io::prompt::PromptBuilder;
use crate::io::schema::OutputSchema;
use crate::io::worker::{Worker, WorkerRequest};

use super::non_empty_text;

#[derive(Debug, Clone)]
pub struct DraftAgent {
    prompts: PromptBuilder,
    model: Option<String>,
}

impl DraftAgent {
    pub fn new(prompt_budget_bytes: usize, model: Option<String>) -> Self {
        Self {
            prompts: PromptBuilder::new(prompt_budget_bytes),
            model,
        }
    }

    #[instrument(skip_all, fields(stage = %Stage::Generate))]
    pub async fn run(
        &self,
        worker: &dyn Worker,
        review_schema: &OutputSchema,
        store: &mut ContextStore,
    ) -> Result<()> {
        let analysis = store
            .analysis()
            .context("code analysis missing from context")?;
        let prompt = self
            .prompts
            .build_generate(analysis, &review_schema.pretty())?;

        let output = worker
            .invoke(WorkerRequest {
                stage: Stage::Generate.name(),
                prompt: prompt.as_str(),
                tools: None,
                schema: None,
                model: self.model.as_deref(),
            })
            .await?;
        let draft = non_empty_text(Stage::Generate, output)?;
        debug!(bytes = draft.len(), "draft review stored");
        store.set(StageOutput::RawReview(draft));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::ScriptedWorker;
    use serde_json::json;

    fn store_with_analysis() -> ContextStore {
        let mut store = ContextStore::new();
        store.set(StageOutput::CodeAnalysis(
            "Performance: N+1 query in handler.".to_string(),
        ));
        store
    }

    #[tokio::test]
    async fn malformed_draft_is_stored_verbatim() {
        let worker = ScriptedWorker::new()
            .reply_text("generate_review_comments", "Summary: looks fine, approve");
        let schema = OutputSchema::review_result().expect("schema");
        let mut store = store_with_analysis();

        DraftAgent::new(100_000, None)
            .run(&worker, &schema, &mut store)
            .await
            .expect("run");

        assert_eq!(store.raw_review(), Some("Summary: looks fine, approve"));
        let call = &worker.calls()[0];
        assert!(call.prompt.contains("N+1 query"));
        assert!(call.prompt.contains("approval_recommendation"));
        assert_eq!(call.schema, None);
    }

    #[tokio::test]
    async fn structured_reply_is_stored_as_json_text() {
        let worker = ScriptedWorker::new()
            .reply_json("generate_review_comments", json!({"review_summary": "ok"}));
        let schema = OutputSchema::review_result().expect("schema");
        let mut store = store_with_analysis();

        DraftAgent::new(100_000, None)
            .run(&worker, &schema, &mut store)
            .await
            .expect("run");

        let raw = store.raw_review().expect("raw review");
        assert!(raw.contains("\"review_summary\": \"ok\""));
    }
}
