//! Run-level tests for the review state machine.
//!
//! Each test drives [`ReviewPipeline::run`] with a scripted worker and checks
//! the terminal state, the returned result and the context store left behind.

use std::sync::Arc;
use std::time::Duration;

use reviewer::core::context::StageKey;
use reviewer::core::request::ReviewRequest;
use reviewer::core::stage::{RunState, Stage};
use reviewer::core::types::{EventRole, ReviewResult, StageEvent};
use reviewer::io::worker::WorkerFailure;
use reviewer::pipeline::{CANCELLED_REASON, ReviewPipeline};
use reviewer::test_support::{
    PR_URL, ScriptedWorker, happy_worker, local_config, sample_review, sample_review_json,
};
use serde_json::json;
use tokio_util::sync::CancellationToken;

fn pipeline(worker: &Arc<ScriptedWorker>) -> ReviewPipeline {
    ReviewPipeline::new(worker.clone(), local_config()).expect("pipeline")
}

async fn run(
    worker: &Arc<ScriptedWorker>,
    request: ReviewRequest,
) -> (reviewer::pipeline::PipelineOutcome, Vec<StageEvent>) {
    let mut events = Vec::new();
    let outcome = pipeline(worker)
        .run(request, &mut events, &CancellationToken::new())
        .await;
    (outcome, events)
}

/// `{pull_request_url}` alone runs every stage except posting and returns
/// the structured review.
#[tokio::test]
async fn url_only_request_completes_with_structured_review() {
    let worker = Arc::new(happy_worker());

    let (outcome, _) = run(&worker, ReviewRequest::new(PR_URL)).await;

    assert_eq!(outcome.state, RunState::Done);
    assert_eq!(outcome.failure, None);
    assert!(outcome.result.success);
    assert_eq!(outcome.result, sample_review());
    assert_eq!(
        worker.stages(),
        vec![
            "fetch_pr_details",
            "analyze_code_changes",
            "generate_review_comments",
            "structure_review_comments",
        ]
    );
    assert!(!outcome.context.contains(StageKey::PostResult));
}

#[tokio::test]
async fn invalid_url_never_reaches_the_worker() {
    let worker = Arc::new(happy_worker());

    let (outcome, events) = run(
        &worker,
        ReviewRequest::new("https://gitlab.com/acme/widgets/merge_requests/42"),
    )
    .await;

    assert_eq!(outcome.state, RunState::Failed);
    assert!(!outcome.result.success);
    let error = outcome.result.error.as_deref().expect("error");
    assert!(error.starts_with("Invalid pull request URL format"));
    assert!(worker.calls().is_empty());
    assert!(!outcome.context.contains(StageKey::PullRequest));
    assert_eq!(events[0].role, EventRole::System);
    assert!(events.last().expect("final").text.starts_with("❌"));
}

/// A fetch stage that never stores its details halts the run, but the
/// caller still receives the well-formed fallback result.
#[tokio::test]
async fn fetch_failure_halts_with_fallback_result() {
    let worker = Arc::new(ScriptedWorker::new().fail(
        "fetch_pr_details",
        WorkerFailure::Backend("gh: not authenticated".to_string()),
    ));

    let (outcome, events) = run(&worker, ReviewRequest::new(PR_URL)).await;

    assert_eq!(outcome.state, RunState::Failed);
    assert_eq!(
        outcome.failure.as_deref(),
        Some(Stage::Fetch.failure_message())
    );
    assert_eq!(outcome.result, ReviewResult::fallback());
    assert_eq!(worker.stages(), vec!["fetch_pr_details"]);
    assert!(events.iter().any(|event| event.role == EventRole::System
        && event.text == Stage::Fetch.failure_message()));
}

#[tokio::test]
async fn malformed_draft_is_corrected() {
    let worker = Arc::new(
        ScriptedWorker::new()
            .reply_text("fetch_pr_details", "details")
            .reply_text("analyze_code_changes", "analysis")
            .reply_text(
                "generate_review_comments",
                "Overall fine. src/lib.rs line 12: value may be None (high).",
            )
            .reply_json("structure_review_comments", sample_review_json()),
    );

    let (outcome, _) = run(&worker, ReviewRequest::new(PR_URL)).await;

    assert_eq!(outcome.state, RunState::Done);
    assert_eq!(outcome.result, sample_review());
    let correction = &worker.calls()[3];
    assert!(correction.prompt.contains("value may be None"));
    assert_eq!(correction.schema.as_deref(), Some("review_result"));
}

#[tokio::test]
async fn failed_correction_leaves_no_review() {
    let worker = Arc::new(
        ScriptedWorker::new()
            .reply_text("fetch_pr_details", "details")
            .reply_text("analyze_code_changes", "analysis")
            .reply_text("generate_review_comments", "not json")
            .reply_json(
                "structure_review_comments",
                json!({"review_summary": "missing everything else"}),
            ),
    );

    let (outcome, _) = run(&worker, ReviewRequest::new(PR_URL)).await;

    assert_eq!(outcome.state, RunState::Failed);
    assert!(!outcome.context.contains(StageKey::Review));
    assert!(outcome.context.contains(StageKey::RawReview));
    assert_eq!(outcome.result, ReviewResult::fallback());
}

/// Posting is best effort: a failure is recorded and the run still ends DONE.
#[tokio::test]
async fn posting_failure_is_tolerated() {
    let worker = Arc::new(
        ScriptedWorker::new()
            .reply_text("fetch_pr_details", "details")
            .reply_text("analyze_code_changes", "analysis")
            .reply_text("generate_review_comments", "draft")
            .reply_json("structure_review_comments", sample_review_json())
            .fail(
                "post_review_comments",
                WorkerFailure::Backend("HTTP 403".to_string()),
            ),
    );
    let mut request = ReviewRequest::new(PR_URL);
    request.post_comments = true;

    let (outcome, events) = run(&worker, request).await;

    assert_eq!(outcome.state, RunState::Done);
    assert_eq!(outcome.result, sample_review());
    let report = outcome.context.post_report().expect("post report");
    assert!(!report.posted);
    assert!(report.detail.contains("HTTP 403"));
    let posting: Vec<&StageEvent> = events
        .iter()
        .filter(|event| event.author == Stage::Post.name())
        .collect();
    assert_eq!(posting.len(), 2);
    assert_eq!(posting[1].text, Stage::Post.failure_message());
}

#[tokio::test]
async fn posting_runs_with_write_commands() {
    let worker = Arc::new(happy_worker());
    let mut request = ReviewRequest::new(PR_URL);
    request.post_comments = true;

    let (outcome, _) = run(&worker, request).await;

    assert_eq!(outcome.state, RunState::Done);
    assert!(outcome.context.post_report().expect("report").posted);
    let calls = worker.calls();
    let post = calls.last().expect("post call");
    assert_eq!(post.stage, "post_review_comments");
    assert_eq!(post.tool_names, Some(vec!["echo".to_string()]));
    assert_eq!(
        calls[0].tool_names,
        Some(vec!["echo".to_string(), "printf".to_string()])
    );
}

#[tokio::test]
async fn cancellation_fails_the_run() {
    let worker = Arc::new(
        ScriptedWorker::new()
            .reply_text("fetch_pr_details", "details")
            .hang("analyze_code_changes"),
    );
    let pipeline = pipeline(&worker);
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });

    let mut events = Vec::new();
    let outcome = pipeline
        .run(ReviewRequest::new(PR_URL), &mut events, &cancel)
        .await;

    assert_eq!(outcome.state, RunState::Failed);
    assert_eq!(outcome.failure.as_deref(), Some(CANCELLED_REASON));
    assert!(!outcome.result.success);
    assert_eq!(outcome.result.error.as_deref(), Some(CANCELLED_REASON));
    assert!(outcome.context.contains(StageKey::PrDetails));
    assert!(!outcome.context.contains(StageKey::CodeAnalysis));
}

#[tokio::test(start_paused = true)]
async fn stage_timeout_is_gated_like_a_missing_output() {
    let worker = Arc::new(ScriptedWorker::new().hang("fetch_pr_details"));

    let (outcome, _) = run(&worker, ReviewRequest::new(PR_URL)).await;

    assert_eq!(outcome.state, RunState::Failed);
    assert_eq!(outcome.result, ReviewResult::fallback());
    assert!(!outcome.context.contains(StageKey::PrDetails));
}
