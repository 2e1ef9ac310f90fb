//! Stage sequence, per-stage policy and gate checks.
//!
//! Pure description of the review state machine. The orchestrator in
//! [`crate::pipeline`] drives it; nothing here performs I/O.

use std::fmt;

use serde::Serialize;

use super::context::{ContextStore, StageKey};

/// Position of a run in the review state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Init,
    Validating,
    Fetching,
    Analyzing,
    Generating,
    Structuring,
    Posting,
    Finalizing,
    Done,
    Failed,
}

/// How a missing stage output affects the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StagePolicy {
    /// A missing output halts the run in [`RunState::Failed`].
    Fatal,
    /// A missing output is recorded and the run continues.
    BestEffort,
}

/// Delegating stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Fetch,
    Analyze,
    Generate,
    Structure,
    Post,
}

impl Stage {
    pub const SEQUENCE: [Stage; 5] = [
        Stage::Fetch,
        Stage::Analyze,
        Stage::Generate,
        Stage::Structure,
        Stage::Post,
    ];

    /// Worker/branch name used for events and logs.
    pub fn name(self) -> &'static str {
        match self {
            Stage::Fetch => "fetch_pr_details",
            Stage::Analyze => "analyze_code_changes",
            Stage::Generate => "generate_review_comments",
            Stage::Structure => "structure_review_comments",
            Stage::Post => "post_review_comments",
        }
    }

    pub fn state(self) -> RunState {
        match self {
            Stage::Fetch => RunState::Fetching,
            Stage::Analyze => RunState::Analyzing,
            Stage::Generate => RunState::Generating,
            Stage::Structure => RunState::Structuring,
            Stage::Post => RunState::Posting,
        }
    }

    /// Context key the stage must populate.
    pub fn output_key(self) -> StageKey {
        match self {
            Stage::Fetch => StageKey::PrDetails,
            Stage::Analyze => StageKey::CodeAnalysis,
            Stage::Generate => StageKey::RawReview,
            Stage::Structure => StageKey::Review,
            Stage::Post => StageKey::PostResult,
        }
    }

    pub fn policy(self) -> StagePolicy {
        match self {
            Stage::Post => StagePolicy::BestEffort,
            _ => StagePolicy::Fatal,
        }
    }

    pub fn entry_message(self) -> &'static str {
        match self {
            Stage::Fetch => "🔍 Fetching pull request details...",
            Stage::Analyze => "🔍 Analyzing code changes...",
            Stage::Generate => "💬 Generating review comments...",
            Stage::Structure => "🧩 Structuring review comments...",
            Stage::Post => "📝 Posting review comments to pull request...",
        }
    }

    pub fn exit_message(self) -> &'static str {
        match self {
            Stage::Fetch => "Pull request details fetched.",
            Stage::Analyze => "Code analysis complete.",
            Stage::Generate => "Draft review generated.",
            Stage::Structure => "Review comments structured.",
            Stage::Post => "Review comments posted.",
        }
    }

    pub fn failure_message(self) -> &'static str {
        match self {
            Stage::Fetch => "Failed to fetch pull request details.",
            Stage::Analyze => "Failed to analyze code changes.",
            Stage::Generate => "Failed to generate review comments.",
            Stage::Structure => "Failed to structure review comments.",
            Stage::Post => "Failed to post review comments.",
        }
    }

    /// Whether the stage runs for a request.
    pub fn enabled(self, post_comments: bool) -> bool {
        match self {
            Stage::Post => post_comments,
            _ => true,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Result of the post-stage gate check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateOutcome {
    /// Required output present.
    Pass,
    /// Output missing on a best-effort stage; continue.
    Tolerated,
    /// Output missing on a fatal stage; halt.
    Halt,
}

/// Check that `stage` left its output in the store and apply its policy.
pub fn check_gate(stage: Stage, store: &ContextStore) -> GateOutcome {
    if store.contains(stage.output_key()) {
        return GateOutcome::Pass;
    }
    match stage.policy() {
        StagePolicy::Fatal => GateOutcome::Halt,
        StagePolicy::BestEffort => GateOutcome::Tolerated,
    }
}
