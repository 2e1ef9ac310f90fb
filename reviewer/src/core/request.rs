//! Review request normalization.
//!
//! HTTP bodies and CLI flags both funnel through [`ReviewRequest::from_json`],
//! so the two front-ends agree on defaults and coercion rules.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::warn;

use super::types::Severity;

/// Errors that reject a request before any stage runs.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RequestError {
    #[error("pull_request_url is required")]
    MissingUrl,
    #[error("pull_request_url must be a string")]
    UrlNotString,
    #[error("request body must be a JSON object")]
    NotAnObject,
}

/// Review focus areas. Every flag defaults to enabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewCriteria {
    pub code_quality: bool,
    pub security: bool,
    pub performance: bool,
    pub style: bool,
    pub documentation: bool,
}

impl Default for ReviewCriteria {
    fn default() -> Self {
        Self {
            code_quality: true,
            security: true,
            performance: true,
            style: true,
            documentation: true,
        }
    }
}

impl ReviewCriteria {
    pub const KEYS: [&'static str; 5] = [
        "code_quality",
        "security",
        "performance",
        "style",
        "documentation",
    ];

    /// Normalize a loosely typed criteria mapping.
    ///
    /// Unknown keys are ignored, missing keys stay enabled and known values
    /// are coerced by truthiness. Anything other than an object yields the
    /// defaults.
    pub fn normalize(raw: Option<&Value>) -> Self {
        let mut criteria = Self::default();
        let Some(Value::Object(map)) = raw else {
            return criteria;
        };
        for (key, value) in map {
            if let Some(flag) = criteria.flag_mut(key) {
                *flag = truthy(value);
            }
        }
        criteria
    }

    fn flag_mut(&mut self, key: &str) -> Option<&mut bool> {
        match key {
            "code_quality" => Some(&mut self.code_quality),
            "security" => Some(&mut self.security),
            "performance" => Some(&mut self.performance),
            "style" => Some(&mut self.style),
            "documentation" => Some(&mut self.documentation),
            _ => None,
        }
    }

    /// Names of the enabled focus areas, in declaration order.
    pub fn enabled(&self) -> Vec<&'static str> {
        let flags = [
            self.code_quality,
            self.security,
            self.performance,
            self.style,
            self.documentation,
        ];
        Self::KEYS
            .into_iter()
            .zip(flags)
            .filter_map(|(key, on)| on.then_some(key))
            .collect()
    }
}

/// Normalized, immutable review request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewRequest {
    pub pull_request_url: String,
    pub review_criteria: ReviewCriteria,
    pub severity_threshold: Severity,
    pub post_comments: bool,
}

impl ReviewRequest {
    /// Build a request with default criteria, `low` threshold and no posting.
    pub fn new(pull_request_url: impl Into<String>) -> Self {
        Self {
            pull_request_url: pull_request_url.into(),
            review_criteria: ReviewCriteria::default(),
            severity_threshold: Severity::Low,
            post_comments: false,
        }
    }

    /// Normalize a raw JSON request body.
    ///
    /// Only a missing or non-string `pull_request_url` is rejected; every
    /// other field falls back to its default.
    pub fn from_json(body: &Value) -> Result<Self, RequestError> {
        let map: &Map<String, Value> = body.as_object().ok_or(RequestError::NotAnObject)?;
        let url = match map.get("pull_request_url") {
            None | Some(Value::Null) => return Err(RequestError::MissingUrl),
            Some(Value::String(url)) => url.clone(),
            Some(_) => return Err(RequestError::UrlNotString),
        };
        let threshold = match map.get("severity_threshold") {
            None | Some(Value::Null) => Severity::Low,
            Some(Value::String(raw)) => normalize_threshold(raw),
            Some(other) => normalize_threshold(&other.to_string()),
        };
        Ok(Self {
            pull_request_url: url,
            review_criteria: ReviewCriteria::normalize(map.get("review_criteria")),
            severity_threshold: threshold,
            post_comments: map.get("post_comments").is_some_and(truthy),
        })
    }
}

/// Map a threshold string onto a [`Severity`], defaulting to `low`.
pub fn normalize_threshold(raw: &str) -> Severity {
    match raw.parse::<Severity>() {
        Ok(severity) => severity,
        Err(_) => {
            warn!(threshold = raw, "unknown severity threshold, using low");
            Severity::Low
        }
    }
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}
