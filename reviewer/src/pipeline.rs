//! Review orchestrator.
//!
//! Drives one run through the state machine in [`crate::core::stage`]:
//! validate the URL, run each enabled stage under its time budget, apply the
//! stage gate, and finalize a [`ReviewResult`]. Stages run strictly in
//! sequence and only communicate through the run's [`ContextStore`].

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::agents::analyzer::AnalyzeAgent;
use crate::agents::corrector::StructuredOutputCorrector;
use crate::agents::drafter::DraftAgent;
use crate::agents::fetcher::FetchAgent;
use crate::agents::poster::PostAgent;
use crate::core::context::{ContextStore, StageKey, StageOutput};
use crate::core::pr_ref::PrReference;
use crate::core::request::ReviewRequest;
use crate::core::stage::{GateOutcome, RunState, Stage, check_gate};
use crate::core::types::{EventRole, ReviewResult, StageEvent};
use crate::io::config::ReviewerConfig;
use crate::io::sandbox::{Sandbox, SandboxConfig};
use crate::io::schema::OutputSchema;
use crate::io::worker::Worker;

/// Author of events that are not tied to one stage.
pub const PIPELINE_AUTHOR: &str = "code_review_agent";

/// Failure reason recorded for cancelled runs.
pub const CANCELLED_REASON: &str = "review cancelled";

/// Receives progress events as a run executes.
pub trait EventSink {
    fn emit(&mut self, event: StageEvent);
}

impl EventSink for Vec<StageEvent> {
    fn emit(&mut self, event: StageEvent) {
        self.push(event);
    }
}

impl EventSink for mpsc::UnboundedSender<StageEvent> {
    fn emit(&mut self, event: StageEvent) {
        if self.send(event).is_err() {
            debug!("event receiver dropped");
        }
    }
}

/// Sink that only writes events to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSink;

impl EventSink for LogSink {
    fn emit(&mut self, event: StageEvent) {
        match event.role {
            EventRole::Assistant => info!(author = %event.author, "{}", event.text),
            EventRole::System => warn!(author = %event.author, "{}", event.text),
        }
    }
}

/// Terminal state of a run plus everything it produced.
#[derive(Debug, Clone)]
pub struct PipelineOutcome {
    /// [`RunState::Done`] or [`RunState::Failed`].
    pub state: RunState,
    pub failure: Option<String>,
    pub result: ReviewResult,
    /// Store contents at the end of the run.
    pub context: ContextStore,
}

impl PipelineOutcome {
    pub fn is_done(&self) -> bool {
        self.state == RunState::Done
    }
}

enum StageRun {
    Finished(Result<()>),
    TimedOut(Duration),
    Cancelled,
}

/// Shared, reusable review pipeline.
///
/// Sandboxes, schema and agents are built once; each [`ReviewPipeline::run`]
/// gets its own context store.
pub struct ReviewPipeline {
    worker: Arc<dyn Worker>,
    config: ReviewerConfig,
    read_sandbox: Sandbox,
    write_sandbox: Sandbox,
    review_schema: OutputSchema,
    fetcher: FetchAgent,
    analyzer: AnalyzeAgent,
    drafter: DraftAgent,
    corrector: StructuredOutputCorrector,
    poster: PostAgent,
}

impl std::fmt::Debug for ReviewPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReviewPipeline")
            .field("config", &self.config)
            .field("read_commands", &self.read_sandbox.names())
            .field("write_commands", &self.write_sandbox.names())
            .finish_non_exhaustive()
    }
}

impl ReviewPipeline {
    pub fn new(worker: Arc<dyn Worker>, config: ReviewerConfig) -> Result<Self> {
        config.validate()?;
        let budget = config.pipeline.prompt_budget_bytes;
        let model = config.worker.model.clone();
        Ok(Self {
            read_sandbox: Sandbox::new(&SandboxConfig::read_only(&config.sandbox)),
            write_sandbox: Sandbox::new(&SandboxConfig::mutating(&config.sandbox)),
            review_schema: OutputSchema::review_result()?,
            fetcher: FetchAgent::new(budget, model.clone()),
            analyzer: AnalyzeAgent::new(budget, model.clone()),
            drafter: DraftAgent::new(budget, model.clone()),
            corrector: StructuredOutputCorrector::new(
                Stage::Structure.name(),
                budget,
                config.worker.corrector_model().map(str::to_string),
            ),
            poster: PostAgent::new(budget, model),
            worker,
            config,
        })
    }

    pub fn config(&self) -> &ReviewerConfig {
        &self.config
    }

    /// Execute one review run.
    ///
    /// Never fails: every error ends in a well-formed [`ReviewResult`].
    #[instrument(skip_all, fields(pr = %request.pull_request_url, post = request.post_comments))]
    pub async fn run<S>(
        &self,
        request: ReviewRequest,
        sink: &mut S,
        cancel: &CancellationToken,
    ) -> PipelineOutcome
    where
        S: EventSink + Send + ?Sized,
    {
        let mut store = ContextStore::new();
        let mut state = RunState::Init;
        advance(&mut state, RunState::Validating);

        let pr = match PrReference::parse(&request.pull_request_url) {
            Ok(pr) => pr,
            Err(err) => {
                let reason = err.to_string();
                warn!(%reason, "pull request url rejected");
                emit(sink, StageEvent::system(PIPELINE_AUTHOR, reason.clone()));
                store.set(StageOutput::Request(request));
                return finish(sink, store, Some(reason.clone()), ReviewResult::failure(reason));
            }
        };
        info!(pr = %pr, "reviewing pull request");
        let post_comments = request.post_comments;
        store.set(StageOutput::Request(request));
        store.set(StageOutput::PullRequest(pr));

        let mut failure = None;
        let mut cancelled = false;
        for stage in Stage::SEQUENCE
            .into_iter()
            .filter(|stage| stage.enabled(post_comments))
        {
            advance(&mut state, stage.state());
            emit(sink, StageEvent::assistant(stage.name(), stage.entry_message()));

            let error = match self.guarded(stage, &mut store, cancel).await {
                StageRun::Finished(Ok(())) => None,
                StageRun::Finished(Err(err)) => Some(format!("{err:#}")),
                StageRun::TimedOut(budget) => {
                    Some(format!("{stage} timed out after {}s", budget.as_secs()))
                }
                StageRun::Cancelled => {
                    warn!(%stage, "run cancelled");
                    emit(sink, StageEvent::system(stage.name(), CANCELLED_REASON));
                    cancelled = true;
                    break;
                }
            };
            if let Some(error) = &error {
                warn!(%stage, %error, "stage did not produce its output");
                if stage == Stage::Post {
                    PostAgent::record_failure(&mut store, error.clone());
                }
            }

            let gate = check_gate(stage, &store);
            match (gate, &error) {
                (GateOutcome::Pass, None) => {
                    emit(sink, StageEvent::assistant(stage.name(), stage.exit_message()));
                }
                (GateOutcome::Halt, _) => {
                    emit(sink, StageEvent::system(stage.name(), stage.failure_message()));
                    failure = Some(stage.failure_message().to_string());
                    break;
                }
                _ => {
                    emit(sink, StageEvent::system(stage.name(), stage.failure_message()));
                }
            }
        }

        advance(&mut state, RunState::Finalizing);
        if cancelled {
            return finish(
                sink,
                store,
                Some(CANCELLED_REASON.to_string()),
                ReviewResult::failure(CANCELLED_REASON),
            );
        }
        let result = match store.review() {
            Some(review) => review.clone(),
            None => {
                debug!("no structured review in context, using fallback");
                ReviewResult::fallback()
            }
        };
        emit(sink, StageEvent::system(PIPELINE_AUTHOR, "Final result generated"));
        finish(sink, store, failure, result)
    }

    /// Run one stage under the stage budget and the run's cancellation token.
    async fn guarded(
        &self,
        stage: Stage,
        store: &mut ContextStore,
        cancel: &CancellationToken,
    ) -> StageRun {
        let budget = self.config.pipeline.stage_timeout();
        tokio::select! {
            biased;
            () = cancel.cancelled() => StageRun::Cancelled,
            result = tokio::time::timeout(budget, self.dispatch(stage, store)) => match result {
                Ok(result) => StageRun::Finished(result),
                Err(_) => StageRun::TimedOut(budget),
            },
        }
    }

    async fn dispatch(&self, stage: Stage, store: &mut ContextStore) -> Result<()> {
        let worker = self.worker.as_ref();
        match stage {
            Stage::Fetch => self.fetcher.run(worker, &self.read_sandbox, store).await,
            Stage::Analyze => self.analyzer.run(worker, store).await,
            Stage::Generate => {
                self.drafter
                    .run(worker, &self.review_schema, store)
                    .await
            }
            Stage::Structure => {
                self.corrector
                    .correct(
                        worker,
                        store,
                        StageKey::RawReview,
                        &self.review_schema,
                        StageOutput::Review,
                    )
                    .await?;
                Ok(())
            }
            Stage::Post => self.poster.run(worker, &self.write_sandbox, store).await,
        }
    }
}

fn advance(state: &mut RunState, next: RunState) {
    debug!(from = ?*state, to = ?next, "run state");
    *state = next;
}

fn emit<S: EventSink + ?Sized>(sink: &mut S, event: StageEvent) {
    debug!(author = %event.author, role = ?event.role, text = %event.text, "stage event");
    sink.emit(event);
}

/// Emit the summarizing event and close the run.
fn finish<S: EventSink + ?Sized>(
    sink: &mut S,
    context: ContextStore,
    failure: Option<String>,
    result: ReviewResult,
) -> PipelineOutcome {
    let state = if failure.is_some() {
        RunState::Failed
    } else {
        RunState::Done
    };
    let headline = if state == RunState::Done && result.success {
        "✅ Code review completed successfully!"
    } else {
        "❌ Code review failed."
    };
    emit(
        sink,
        StageEvent::assistant(
            PIPELINE_AUTHOR,
            format!("{headline}\n\nSummary: {}", result.review_summary),
        ),
    );
    info!(state = ?state, success = result.success, "review finished");
    PipelineOutcome {
        state,
        failure,
        result,
        context,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{PR_URL, happy_worker, local_config, sample_review};

    fn pipeline(worker: Arc<dyn Worker>) -> ReviewPipeline {
        ReviewPipeline::new(worker, local_config()).expect("pipeline")
    }

    #[tokio::test]
    async fn each_stage_emits_entry_and_exit_events() {
        let worker = Arc::new(happy_worker());
        let mut events: Vec<StageEvent> = Vec::new();

        let outcome = pipeline(worker)
            .run(ReviewRequest::new(PR_URL), &mut events, &CancellationToken::new())
            .await;

        assert!(outcome.is_done());
        assert_eq!(outcome.result, sample_review());
        for stage in [
            Stage::Fetch,
            Stage::Analyze,
            Stage::Generate,
            Stage::Structure,
        ] {
            let texts: Vec<&str> = events
                .iter()
                .filter(|event| event.author == stage.name())
                .map(|event| event.text.as_str())
                .collect();
            assert_eq!(texts, vec![stage.entry_message(), stage.exit_message()]);
        }
        assert!(events.iter().all(|event| event.author != Stage::Post.name()));
        let last = events.last().expect("final event");
        assert!(last.text.starts_with("✅ Code review completed successfully!"));
        assert!(last.text.ends_with(&sample_review().review_summary));
    }

    #[tokio::test]
    async fn events_stream_through_unbounded_channel() {
        let worker = Arc::new(happy_worker());
        let (mut tx, mut rx) = mpsc::unbounded_channel();

        pipeline(worker)
            .run(ReviewRequest::new(PR_URL), &mut tx, &CancellationToken::new())
            .await;
        drop(tx);

        let mut count = 0;
        while let Some(event) = rx.recv().await {
            count += 1;
            assert!(!event.text.is_empty());
        }
        assert!(count >= 9);
    }

    #[test]
    fn rejects_invalid_config() {
        let mut config = local_config();
        config.pipeline.stage_timeout_secs = 0;
        let err = ReviewPipeline::new(Arc::new(happy_worker()), config).unwrap_err();
        assert!(err.to_string().contains("stage_timeout_secs"));
    }
}
