//! JSON Schemas that constrain structured worker output.

use std::fmt;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use jsonschema::{Draft, Validator};
use serde_json::Value;

const REVIEW_RESULT_SCHEMA: &str = include_str!("../../schemas/review_result.schema.json");
const TOOL_TURN_SCHEMA: &str = include_str!("../../schemas/tool_turn.schema.json");

/// A named, compiled JSON Schema (Draft 2020-12).
pub struct OutputSchema {
    name: String,
    raw: Value,
    validator: Validator,
}

impl fmt::Debug for OutputSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OutputSchema")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl OutputSchema {
    pub fn new(name: impl Into<String>, raw: Value) -> Result<Self> {
        let name = name.into();
        let validator = jsonschema::options()
            .with_draft(Draft::Draft202012)
            .build(&raw)
            .with_context(|| format!("compile json schema {name}"))?;
        Ok(Self {
            name,
            raw,
            validator,
        })
    }

    pub fn parse(name: impl Into<String>, contents: &str) -> Result<Self> {
        let name = name.into();
        let raw: Value = serde_json::from_str(contents)
            .with_context(|| format!("parse json schema {name}"))?;
        Self::new(name, raw)
    }

    /// Schema of [`crate::core::types::ReviewResult`].
    pub fn review_result() -> Result<Self> {
        Self::parse("review_result", REVIEW_RESULT_SCHEMA)
    }

    /// Schema of one turn in a tool-using delegation.
    pub fn tool_turn() -> Result<Self> {
        Self::parse("tool_turn", TOOL_TURN_SCHEMA)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn raw(&self) -> &Value {
        &self.raw
    }

    pub fn pretty(&self) -> String {
        serde_json::to_string_pretty(&self.raw).unwrap_or_default()
    }

    /// Every violation of the schema, empty when `instance` conforms.
    pub fn violations(&self, instance: &Value) -> Vec<String> {
        self.validator
            .iter_errors(instance)
            .map(|err| err.to_string())
            .collect()
    }

    pub fn is_valid(&self, instance: &Value) -> bool {
        self.validator.is_valid(instance)
    }

    /// Write the schema where a worker backend can read it.
    pub fn write_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("create schema dir {}", parent.display()))?;
        }
        fs::write(path, self.pretty()).with_context(|| format!("write schema {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::ReviewResult;
    use serde_json::json;

    #[test]
    fn fallback_result_conforms_to_review_schema() {
        let schema = OutputSchema::review_result().expect("schema");
        let value = serde_json::to_value(ReviewResult::fallback()).expect("serialize");
        assert_eq!(schema.violations(&value), Vec::<String>::new());
    }

    #[test]
    fn review_schema_rejects_unknown_recommendation() {
        let schema = OutputSchema::review_result().expect("schema");
        let mut value = serde_json::to_value(ReviewResult::fallback()).expect("serialize");
        value["approval_recommendation"] = json!("merge it");
        assert!(!schema.is_valid(&value));
        assert!(!schema.violations(&value).is_empty());
    }

    #[test]
    fn review_schema_requires_summary() {
        let schema = OutputSchema::review_result().expect("schema");
        let value = json!({
            "comments_added": [],
            "issues_found": [],
            "approval_recommendation": "comment",
            "success": true,
            "error": null,
        });
        let violations = schema.violations(&value);
        assert!(violations.iter().any(|v| v.contains("review_summary")));
    }

    #[test]
    fn tool_turn_schema_accepts_call_and_finish() {
        let schema = OutputSchema::tool_turn().expect("schema");
        assert!(schema.is_valid(&json!({
            "action": "call", "command": "gh", "args": ["pr", "view", "1"], "output": ""
        })));
        assert!(schema.is_valid(&json!({
            "action": "finish", "command": "", "args": [], "output": "done"
        })));
        assert!(!schema.is_valid(&json!({"action": "shell"})));
    }

    #[test]
    fn write_to_creates_parent_dirs() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("nested/schema.json");
        let schema = OutputSchema::tool_turn().expect("schema");
        schema.write_to(&path).expect("write");
        let written: Value =
            serde_json::from_str(&fs::read_to_string(&path).expect("read")).expect("json");
        assert_eq!(&written, schema.raw());
    }
}
