//! Structured-output corrector.
//!
//! Worker drafts are free text that usually, but not always, resemble the
//! target shape. The corrector hands a stored value to a second worker pass
//! whose only job is to restate it under a JSON Schema, validates the reply
//! and deserializes it into the target type. Nothing is written on failure.

use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::{info, instrument, warn};

use crate::core::context::{ContextStore, StageKey, StageOutput};
use crate::io::prompt::PromptBuilder;
use crate::io::schema::OutputSchema;
use crate::io::worker::{Worker, WorkerFailure, WorkerOutput, WorkerRequest};

#[derive(Debug, Error)]
pub enum CorrectionError {
    #[error("no value stored under {0}")]
    MissingSource(StageKey),
    #[error("render correction prompt: {0}")]
    Prompt(String),
    #[error("restating {key} failed: {source}")]
    Worker {
        key: StageKey,
        source: WorkerFailure,
    },
    #[error("restated {key} violates schema {schema}: {}", .violations.join("; "))]
    SchemaViolations {
        key: StageKey,
        schema: String,
        violations: Vec<String>,
    },
    #[error("restated {key} does not match the target type: {source}")]
    Mismatch {
        key: StageKey,
        source: serde_json::Error,
    },
}

/// Restates stored values so they conform to a schema.
#[derive(Debug, Clone)]
pub struct StructuredOutputCorrector {
    author: &'static str,
    prompts: PromptBuilder,
    model: Option<String>,
}

impl StructuredOutputCorrector {
    /// `author` names the delegation in worker requests and logs.
    pub fn new(author: &'static str, prompt_budget_bytes: usize, model: Option<String>) -> Self {
        Self {
            author,
            prompts: PromptBuilder::new(prompt_budget_bytes),
            model,
        }
    }

    /// Restate `source` under `schema` and store the typed result.
    ///
    /// `target` wraps the deserialized value into the output written to the
    /// store; its key is returned. On any failure the store is unchanged.
    #[instrument(skip_all, fields(source = %source, schema = schema.name()))]
    pub async fn correct<T: DeserializeOwned>(
        &self,
        worker: &dyn Worker,
        store: &mut ContextStore,
        source: StageKey,
        schema: &OutputSchema,
        target: fn(T) -> StageOutput,
    ) -> Result<StageKey, CorrectionError> {
        let value = store
            .render(source)
            .ok_or(CorrectionError::MissingSource(source))?;
        let prompt = self
            .prompts
            .build_correct(&value)
            .map_err(|err| CorrectionError::Prompt(format!("{err:#}")))?;
        if let Some(section) = prompt.truncated_section() {
            warn!(
                section,
                value_bytes = value.len(),
                "value cut to fit the prompt budget; restating a partial value"
            );
        }

        let restated = worker
            .invoke(WorkerRequest {
                stage: self.author,
                prompt: prompt.as_str(),
                tools: None,
                schema: Some(schema),
                model: self.model.as_deref(),
            })
            .await
            .and_then(WorkerOutput::into_value)
            .map_err(|err| CorrectionError::Worker {
                key: source,
                source: err,
            })?;

        let violations = schema.violations(&restated);
        if !violations.is_empty() {
            for violation in &violations {
                warn!(%violation, "restated value violates schema");
            }
            return Err(CorrectionError::SchemaViolations {
                key: source,
                schema: schema.name().to_string(),
                violations,
            });
        }

        let typed: T = serde_json::from_value(restated).map_err(|err| {
            CorrectionError::Mismatch {
                key: source,
                source: err,
            }
        })?;
        let output = target(typed);
        let key = output.key();
        store.set(output);
        info!(key = %key, "structured output stored");
        Ok(key)
    }
}
