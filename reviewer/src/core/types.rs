//! Shared review types exchanged between stages and returned to callers.
//!
//! These types define stable contracts between pipeline components. They
//! carry no I/O and serialize to the same JSON shape the HTTP and CLI
//! surfaces return.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Issue severity, ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub const ALL: [Severity; 4] = [
        Severity::Low,
        Severity::Medium,
        Severity::High,
        Severity::Critical,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Severity::ALL
            .into_iter()
            .find(|severity| severity.as_str() == s)
            .ok_or_else(|| format!("unknown severity '{s}'"))
    }
}

/// Overall verdict proposed for the pull request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalRecommendation {
    Approve,
    RequestChanges,
    Comment,
}

/// Line comment drafted for the pull request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewComment {
    pub file_path: String,
    pub line_number: u32,
    pub comment: String,
    pub severity: Severity,
    pub category: String,
}

/// Issue found during the review.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issue {
    pub category: String,
    pub severity: Severity,
    pub description: String,
    pub file_path: String,
    #[serde(default)]
    pub line_number: Option<u32>,
    #[serde(default)]
    pub suggestion: Option<String>,
}

/// Terminal artifact of a review run and the payload returned to callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewResult {
    pub review_summary: String,
    pub comments_added: Vec<ReviewComment>,
    pub issues_found: Vec<Issue>,
    pub approval_recommendation: ApprovalRecommendation,
    pub success: bool,
    #[serde(default)]
    pub error: Option<String>,
}

impl ReviewResult {
    /// Result substituted when no structured review reached the context store.
    pub fn fallback() -> Self {
        Self {
            review_summary: "Code review completed".to_string(),
            comments_added: Vec::new(),
            issues_found: Vec::new(),
            approval_recommendation: ApprovalRecommendation::Comment,
            success: true,
            error: None,
        }
    }

    /// Well-formed result signalling that the review could not be produced.
    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            review_summary: "Failed to complete review".to_string(),
            comments_added: Vec::new(),
            issues_found: Vec::new(),
            approval_recommendation: ApprovalRecommendation::Comment,
            success: false,
            error: Some(error.into()),
        }
    }
}

/// Who a progress event is addressed as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventRole {
    /// Progress narration.
    Assistant,
    /// Diagnostics: gate failures, validation errors, bookkeeping.
    System,
}

/// Immutable progress notification emitted while a run executes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageEvent {
    pub author: String,
    pub role: EventRole,
    pub text: String,
}

impl StageEvent {
    pub fn assistant(author: &str, text: impl Into<String>) -> Self {
        Self {
            author: author.to_string(),
            role: EventRole::Assistant,
            text: text.into(),
        }
    }

    pub fn system(author: &str, text: impl Into<String>) -> Self {
        Self {
            author: author.to_string(),
            role: EventRole::System,
            text: text.into(),
        }
    }
}
