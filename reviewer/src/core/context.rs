//! Per-run context store shared by pipeline stages.
//!
//! Stages never call each other; they read their inputs from and write
//! their outputs to a [`ContextStore`]. Entries are keyed by [`StageKey`] and
//! hold a typed [`StageOutput`], so every accessor is checked at compile
//! time. Entries may be overwritten but are never removed during a run.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

use super::pr_ref::PrReference;
use super::request::ReviewRequest;
use super::types::ReviewResult;

/// Identifies one slot in the context store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StageKey {
    Request,
    PullRequest,
    PrDetails,
    CodeAnalysis,
    RawReview,
    Review,
    PostResult,
}

impl StageKey {
    pub fn as_str(self) -> &'static str {
        match self {
            StageKey::Request => "request",
            StageKey::PullRequest => "pull_request",
            StageKey::PrDetails => "pr_details",
            StageKey::CodeAnalysis => "code_analysis",
            StageKey::RawReview => "raw_review_comments",
            StageKey::Review => "review_comments",
            StageKey::PostResult => "post_result",
        }
    }
}

impl fmt::Display for StageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of the best-effort posting stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PostReport {
    pub posted: bool,
    pub detail: String,
}

/// Value stored under a [`StageKey`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum StageOutput {
    Request(ReviewRequest),
    PullRequest(PrReference),
    PrDetails(String),
    CodeAnalysis(String),
    RawReview(String),
    Review(ReviewResult),
    PostResult(PostReport),
}

impl StageOutput {
    pub fn key(&self) -> StageKey {
        match self {
            StageOutput::Request(_) => StageKey::Request,
            StageOutput::PullRequest(_) => StageKey::PullRequest,
            StageOutput::PrDetails(_) => StageKey::PrDetails,
            StageOutput::CodeAnalysis(_) => StageKey::CodeAnalysis,
            StageOutput::RawReview(_) => StageKey::RawReview,
            StageOutput::Review(_) => StageKey::Review,
            StageOutput::PostResult(_) => StageKey::PostResult,
        }
    }

    /// Render for prompt injection: free text verbatim, structures as JSON.
    pub fn render(&self) -> String {
        match self {
            StageOutput::PrDetails(text)
            | StageOutput::CodeAnalysis(text)
            | StageOutput::RawReview(text) => text.clone(),
            other => serde_json::to_string_pretty(other).unwrap_or_default(),
        }
    }
}

/// Mutable key/value state for exactly one pipeline run.
#[derive(Debug, Clone, Default)]
pub struct ContextStore {
    entries: BTreeMap<StageKey, StageOutput>,
}

impl ContextStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store an output under its own key, replacing any previous value.
    pub fn set(&mut self, output: StageOutput) {
        self.entries.insert(output.key(), output);
    }

    pub fn get(&self, key: StageKey) -> Option<&StageOutput> {
        self.entries.get(&key)
    }

    pub fn get_or<'a>(&'a self, key: StageKey, default: &'a StageOutput) -> &'a StageOutput {
        self.entries.get(&key).unwrap_or(default)
    }

    pub fn contains(&self, key: StageKey) -> bool {
        self.entries.contains_key(&key)
    }

    pub fn render(&self, key: StageKey) -> Option<String> {
        self.get(key).map(StageOutput::render)
    }

    pub fn request(&self) -> Option<&ReviewRequest> {
        match self.get(StageKey::Request) {
            Some(StageOutput::Request(request)) => Some(request),
            _ => None,
        }
    }

    pub fn pull_request(&self) -> Option<&PrReference> {
        match self.get(StageKey::PullRequest) {
            Some(StageOutput::PullRequest(pr)) => Some(pr),
            _ => None,
        }
    }

    pub fn pr_details(&self) -> Option<&str> {
        match self.get(StageKey::PrDetails) {
            Some(StageOutput::PrDetails(text)) => Some(text),
            _ => None,
        }
    }

    pub fn analysis(&self) -> Option<&str> {
        match self.get(StageKey::CodeAnalysis) {
            Some(StageOutput::CodeAnalysis(text)) => Some(text),
            _ => None,
        }
    }

    pub fn raw_review(&self) -> Option<&str> {
        match self.get(StageKey::RawReview) {
            Some(StageOutput::RawReview(text)) => Some(text),
            _ => None,
        }
    }

    pub fn review(&self) -> Option<&ReviewResult> {
        match self.get(StageKey::Review) {
            Some(StageOutput::Review(result)) => Some(result),
            _ => None,
        }
    }

    pub fn post_report(&self) -> Option<&PostReport> {
        match self.get(StageKey::PostResult) {
            Some(StageOutput::PostResult(report)) => Some(report),
            _ => None,
        }
    }
}
