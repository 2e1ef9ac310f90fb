//! Prompt builders for every delegating stage.
//!
//! Templates live in `prompts/*.md` and are rendered with minijinja. Each
//! template is split into sections by `<!-- section:KEY required|droppable -->`
//! markers so a rendered prompt can be fitted into a byte budget.

use anyhow::Result;
use minijinja::{Environment, context};
use serde::Serialize;
use tracing::debug;

use crate::core::pr_ref::PrReference;
use crate::core::request::ReviewCriteria;
use crate::core::types::Severity;

const FETCH_TEMPLATE: &str = include_str!("prompts/fetch.md");
const ANALYZE_TEMPLATE: &str = include_str!("prompts/analyze.md");
const GENERATE_TEMPLATE: &str = include_str!("prompts/generate.md");
const CORRECT_TEMPLATE: &str = include_str!("prompts/correct.md");
const POST_TEMPLATE: &str = include_str!("prompts/post.md");
const TOOL_TURN_TEMPLATE: &str = include_str!("prompts/tool_turn.md");

const TRUNCATED_NOTICE: &str = "\n[truncated]";

/// Pull request coordinates for template rendering.
#[derive(Debug, Clone, Serialize)]
struct PrContext<'a> {
    host: &'a str,
    owner: &'a str,
    repo: &'a str,
    pr_number: u64,
    repo_selector: String,
}

impl<'a> PrContext<'a> {
    fn from_ref(pr: &'a PrReference) -> Self {
        Self {
            host: &pr.host,
            owner: &pr.owner,
            repo: &pr.repo,
            pr_number: pr.pr_number,
            repo_selector: pr.repo_selector(),
        }
    }
}

/// Command advertised to a tool-using worker.
#[derive(Debug, Clone, Serialize)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
}

/// One executed command in a tool-using delegation.
#[derive(Debug, Clone, Serialize)]
pub struct TranscriptStep {
    pub index: usize,
    pub command: String,
    pub args: String,
    pub result: String,
}

/// Inputs for one turn of a tool-using delegation.
#[derive(Debug, Clone)]
pub struct ToolTurnInputs<'a> {
    pub task: &'a str,
    pub tools: &'a [ToolDescriptor],
    pub schema: Option<&'a str>,
    pub transcript: &'a [TranscriptStep],
    pub rounds_left: u32,
}

/// Template engine wrapper around minijinja.
struct PromptEngine {
    env: Environment<'static>,
}

impl PromptEngine {
    fn new() -> Self {
        let mut env = Environment::new();
        for (name, source) in [
            ("fetch", FETCH_TEMPLATE),
            ("analyze", ANALYZE_TEMPLATE),
            ("generate", GENERATE_TEMPLATE),
            ("correct", CORRECT_TEMPLATE),
            ("post", POST_TEMPLATE),
            ("tool_turn", TOOL_TURN_TEMPLATE),
        ] {
            env.add_template(name, source)
                .expect("prompt templates should be valid");
        }
        Self { env }
    }

    fn render(&self, name: &str, ctx: minijinja::Value) -> Result<String> {
        let template = self.env.get_template(name)?;
        Ok(template.render(ctx)?)
    }
}

/// A parsed section from rendered template output.
#[derive(Debug, Clone)]
struct ParsedSection {
    /// Section identifier (e.g., "contract", "details").
    key: String,
    /// Whether this section is required (cannot be dropped).
    required: bool,
    /// Section content without its marker.
    content: String,
}

/// Parse sections from rendered template output using HTML comment markers.
fn parse_sections(rendered: &str) -> Vec<ParsedSection> {
    use std::sync::LazyLock;
    static SECTION_RE: LazyLock<regex::Regex> = LazyLock::new(|| {
        regex::Regex::new(r"<!--\s*section:(\w+)\s+(required|droppable)\s*-->")
            .expect("section marker pattern should be valid")
    });

    let matches: Vec<_> = SECTION_RE.captures_iter(rendered).collect();
    let mut sections = Vec::with_capacity(matches.len());

    for (i, caps) in matches.iter().enumerate() {
        let key = caps[1].to_string();
        let required = &caps[2] == "required";
        let start = caps.get(0).map_or(0, |m| m.end());
        let end = matches
            .get(i + 1)
            .and_then(|next| next.get(0))
            .map_or(rendered.len(), |m| m.start());

        let content = rendered[start..end].trim().to_string();
        if !content.is_empty() || required {
            sections.push(ParsedSection {
                key,
                required,
                content,
            });
        }
    }

    sections
}

fn total_len(sections: &[ParsedSection]) -> usize {
    sections.iter().map(|s| s.content.len()).sum()
}

/// Fit sections into `budget` bytes.
///
/// Droppable sections go first (in `DROP_ORDER`); if that is not enough the
/// largest remaining section is cut and marked `[truncated]`. Returns the key
/// of the cut section.
fn apply_budget_to_sections(sections: &mut Vec<ParsedSection>, budget: usize) -> Option<String> {
    const DROP_ORDER: [&str; 1] = ["schema"];

    if total_len(sections) <= budget {
        return None;
    }

    for key in DROP_ORDER {
        if total_len(sections) <= budget {
            break;
        }
        if let Some(idx) = sections.iter().position(|s| s.key == key && !s.required) {
            debug!(
                section = key,
                bytes_dropped = sections[idx].content.len(),
                "dropped section for budget"
            );
            sections.remove(idx);
        }
    }

    let total = total_len(sections);
    if total <= budget {
        return None;
    }
    let largest = sections.iter_mut().max_by_key(|s| s.content.len())?;
    let excess = total - budget;
    let before_len = largest.content.len();
    let keep = before_len.saturating_sub(excess + TRUNCATED_NOTICE.len());
    let cut = floor_char_boundary(&largest.content, keep);
    largest.content.truncate(cut);
    largest.content.push_str(TRUNCATED_NOTICE);
    debug!(
        section = largest.key,
        before_len,
        after_len = largest.content.len(),
        "truncated section for budget"
    );
    Some(largest.key.clone())
}

fn floor_char_boundary(s: &str, index: usize) -> usize {
    if index >= s.len() {
        return s.len();
    }
    (0..=index).rev().find(|&i| s.is_char_boundary(i)).unwrap_or(0)
}

/// Render sections back to a single string.
fn render_sections(sections: &[ParsedSection]) -> String {
    sections
        .iter()
        .map(|s| s.content.as_str())
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Builds stage prompts within a byte budget.
#[derive(Debug, Clone)]
pub struct PromptBuilder {
    budget_bytes: usize,
}

impl PromptBuilder {
    pub fn new(budget_bytes: usize) -> Self {
        Self { budget_bytes }
    }

    fn pack(&self, template: &str, ctx: minijinja::Value) -> Result<PromptPack> {
        let rendered = PromptEngine::new().render(template, ctx)?;
        let mut sections = parse_sections(&rendered);
        let truncated = apply_budget_to_sections(&mut sections, self.budget_bytes);
        Ok(PromptPack {
            content: render_sections(&sections),
            truncated,
        })
    }

    pub fn build_fetch(&self, pr: &PrReference, url: &str) -> Result<PromptPack> {
        self.pack(
            "fetch",
            context! { pr => PrContext::from_ref(pr), url => url },
        )
    }

    pub fn build_analyze(
        &self,
        details: &str,
        criteria: &ReviewCriteria,
        threshold: Severity,
    ) -> Result<PromptPack> {
        let enabled = criteria.enabled();
        let disabled: Vec<&str> = ReviewCriteria::KEYS
            .into_iter()
            .filter(|key| !enabled.contains(key))
            .collect();
        self.pack(
            "analyze",
            context! {
                details => details.trim(),
                enabled => enabled,
                disabled => disabled,
                threshold => threshold.as_str(),
            },
        )
    }

    pub fn build_generate(&self, analysis: &str, schema: &str) -> Result<PromptPack> {
        self.pack(
            "generate",
            context! { analysis => analysis.trim(), schema => schema },
        )
    }

    pub fn build_correct(&self, value: &str) -> Result<PromptPack> {
        self.pack("correct", context! { value => value.trim() })
    }

    pub fn build_post(&self, pr: &PrReference, review: &str) -> Result<PromptPack> {
        self.pack(
            "post",
            context! { pr => PrContext::from_ref(pr), review => review.trim() },
        )
    }

    pub fn build_tool_turn(&self, input: &ToolTurnInputs<'_>) -> Result<PromptPack> {
        self.pack(
            "tool_turn",
            context! {
                task => input.task.trim(),
                tools => input.tools,
                schema => input.schema,
                transcript => input.transcript,
                rounds_left => input.rounds_left,
            },
        )
    }
}

/// A rendered prompt ready to send to a worker.
#[derive(Debug, Clone)]
pub struct PromptPack {
    content: String,
    truncated: Option<String>,
}

impl PromptPack {
    pub fn render(&self) -> String {
        self.content.clone()
    }

    pub fn as_str(&self) -> &str {
        &self.content
    }

    /// Key of the section cut to fit the budget, if any.
    pub fn truncated_section(&self) -> Option<&str> {
        self.truncated.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pr() -> PrReference {
        PrReference::parse("https://github.com/acme/widgets/pull/42").expect("pr")
    }

    #[test]
    fn fetch_prompt_names_pull_request() {
        let prompt = PromptBuilder::new(10_000)
            .build_fetch(&pr(), "https://github.com/acme/widgets/pull/42")
            .expect("render")
            .render();
        assert!(prompt.starts_with("# Fetch Contract"));
        assert!(prompt.contains("- PR Number: 42"));
        assert!(prompt.contains("--repo acme/widgets"));
        assert!(!prompt.contains("<!--"));
    }

    #[test]
    fn analyze_prompt_lists_criteria_and_threshold() {
        let criteria = ReviewCriteria {
            style: false,
            ..ReviewCriteria::default()
        };
        let prompt = PromptBuilder::new(10_000)
            .build_analyze("diff --git a/x b/x", &criteria, Severity::High)
            .expect("render")
            .render();
        assert!(prompt.contains("Enabled focus areas: code_quality, security, performance, documentation"));
        assert!(prompt.contains("Skip these areas: style"));
        assert!(prompt.contains("Severity threshold: high"));
        assert!(prompt.contains("diff --git a/x b/x"));
    }

    #[test]
    fn section_order_is_stable() {
        let prompt = PromptBuilder::new(10_000)
            .build_generate("analysis body", "{\"type\":\"object\"}")
            .expect("render")
            .render();
        let contract = prompt.find("# Comment Contract").expect("contract");
        let schema = prompt.find("<output_json_schema>").expect("schema");
        let analysis = prompt.find("analysis body").expect("analysis");
        assert!(contract < schema && schema < analysis);
    }

    #[test]
    fn budget_drops_schema_before_truncating() {
        let schema = "x".repeat(2_000);
        let prompt = PromptBuilder::new(1_500)
            .build_generate("short analysis", &schema)
            .expect("render")
            .render();
        assert!(!prompt.contains("<output_json_schema>"));
        assert!(prompt.contains("short analysis"));
        assert!(!prompt.contains("[truncated]"));
    }

    #[test]
    fn oversized_correction_value_is_reported_as_truncated() {
        let builder = PromptBuilder::new(400);
        let pack = builder.build_correct(&"v".repeat(2_000)).expect("render");
        assert_eq!(pack.truncated_section(), Some("value"));
        assert!(pack.as_str().contains("[truncated]"));

        let pack = builder.build_correct("{\"review_summary\": \"ok\"}").expect("render");
        assert_eq!(pack.truncated_section(), None);
    }

    #[test]
    fn budget_truncates_largest_section() {
        let details = "é".repeat(5_000);
        let prompt = PromptBuilder::new(3_000)
            .build_analyze(&details, &ReviewCriteria::default(), Severity::Low)
            .expect("render")
            .render();
        assert!(prompt.contains("# Analysis Contract"));
        assert!(prompt.ends_with("[truncated]"));
        assert!(prompt.len() <= 3_000 + 4);
    }

    #[test]
    fn tool_turn_lists_commands_and_recent_steps_first() {
        let tools = vec![ToolDescriptor {
            name: "gh".to_string(),
            description: "GitHub CLI".to_string(),
        }];
        let transcript = vec![
            TranscriptStep {
                index: 1,
                command: "gh".to_string(),
                args: "[\"pr\", \"view\"]".to_string(),
                result: "first result".to_string(),
            },
            TranscriptStep {
                index: 2,
                command: "gh".to_string(),
                args: "[\"pr\", \"diff\"]".to_string(),
                result: "second result".to_string(),
            },
        ];
        let prompt = PromptBuilder::new(10_000)
            .build_tool_turn(&ToolTurnInputs {
                task: "Fetch the PR.",
                tools: &tools,
                schema: None,
                transcript: &transcript,
                rounds_left: 3,
            })
            .expect("render")
            .render();
        assert!(prompt.contains("- `gh`: GitHub CLI"));
        assert!(prompt.contains("You have 3 step(s) left."));
        assert!(!prompt.contains("# Final Output Schema"));
        let second = prompt.find("second result").expect("second");
        let first = prompt.find("first result").expect("first");
        assert!(second < first);
    }
}
