//! Prompt builder for deterministic generator input.
//!
//! The prompt is rendered from an embedded template, split into sections via
//! HTML comment markers, and fitted into a byte budget by dropping droppable
//! sections in fixed order. Truncation of oversized feedback happens here, at
//! the reporting layer, never in the validator.

use std::sync::LazyLock;

use minijinja::{Environment, context};
use regex::Regex;
use tracing::debug;

use crate::core::types::AttemptRecord;

const IMPLEMENT_TEMPLATE: &str = include_str!("prompts/implement.md");

/// All inputs needed to build one attempt's prompt.
#[derive(Debug, Clone)]
pub struct PromptInputs {
    /// The original change request text.
    pub request: String,
    /// Previous attempt's validation output (set on retry).
    pub failure: Option<String>,
    /// Previous attempt's apply summary rendering (set on retry).
    pub summary: Option<String>,
}

impl PromptInputs {
    /// Build inputs from the request and the optional previous attempt.
    ///
    /// Feedback never accumulates beyond the one prior attempt.
    pub fn new(request: &str, previous: Option<&AttemptRecord>) -> Self {
        let failure = previous
            .map(|record| record.validation.output.clone())
            .filter(|s| !s.trim().is_empty());
        let summary = previous
            .map(|record| record.apply.render())
            .filter(|s| !s.trim().is_empty());
        Self {
            request: request.to_string(),
            failure,
            summary,
        }
    }
}

/// Template engine wrapper around minijinja.
struct PromptEngine {
    env: Environment<'static>,
}

impl PromptEngine {
    fn new() -> Self {
        let mut env = Environment::new();
        env.add_template("implement", IMPLEMENT_TEMPLATE)
            .expect("implement template should be valid");
        Self { env }
    }

    fn render(&self, input: &PromptInputs) -> Result<String, minijinja::Error> {
        let template = self.env.get_template("implement")?;
        template.render(context! {
            request => input.request.trim(),
            failure => input.failure.as_deref().map(str::trim).filter(|s| !s.is_empty()),
            summary => input.summary.as_deref().map(str::trim).filter(|s| !s.is_empty()),
        })
    }
}

/// A parsed section from rendered template output.
#[derive(Debug, Clone)]
struct ParsedSection {
    /// Section identifier (e.g., "contract", "request").
    key: String,
    /// Whether this section is required (cannot be dropped).
    required: bool,
    /// Full section content.
    content: String,
}

/// Parse sections from rendered template output using HTML comment markers.
///
/// Markers follow format: `<!-- section:KEY required|droppable -->`
fn parse_sections(rendered: &str) -> Vec<ParsedSection> {
    static SECTION_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"<!--\s*section:(\w+)\s+(required|droppable)\s*-->").unwrap()
    });

    let mut sections = Vec::new();
    let matches: Vec<_> = SECTION_RE.captures_iter(rendered).collect();

    for (i, caps) in matches.iter().enumerate() {
        let key = caps.get(1).unwrap().as_str().to_string();
        let required = caps.get(2).unwrap().as_str() == "required";
        let start = caps.get(0).unwrap().end();
        let end = matches
            .get(i + 1)
            .map(|m| m.get(0).unwrap().start())
            .unwrap_or(rendered.len());

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

/// Apply budget to parsed sections, dropping droppable sections as needed.
///
/// Drop order: summary -> failure
fn apply_budget_to_sections(sections: &mut Vec<ParsedSection>, budget: usize) {
    let total_len =
        |secs: &[ParsedSection]| -> usize { secs.iter().map(|s| s.content.len()).sum() };

    if total_len(sections) <= budget {
        return;
    }

    let drop_order = ["summary", "failure"];
    for key in drop_order {
        if total_len(sections) <= budget {
            break;
        }
        if let Some(idx) = sections.iter().position(|s| s.key == key && !s.required) {
            let dropped_len = sections[idx].content.len();
            debug!(
                section = key,
                bytes_dropped = dropped_len,
                "dropped section for budget"
            );
            sections.remove(idx);
        }
    }

    // If still over budget, truncate the last section
    if total_len(sections) > budget && !sections.is_empty() {
        let other_len: usize = sections
            .iter()
            .take(sections.len() - 1)
            .map(|s| s.content.len())
            .sum();
        let allowed = budget.saturating_sub(other_len);
        let last = sections.last_mut().unwrap();
        let before_len = last.content.len();
        if last.content.len() > allowed {
            if allowed > 12 {
                last.content.truncate(allowed - 12);
                last.content.push_str("\n[truncated]");
            } else {
                last.content.truncate(allowed);
            }
            debug!(
                section = last.key,
                before_len,
                after_len = last.content.len(),
                "truncated section for budget"
            );
        }
    }
}

/// Render sections back to a single string.
fn render_sections(sections: &[ParsedSection]) -> String {
    sections
        .iter()
        .map(|s| s.content.as_str())
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Builds a prompt within a byte budget, dropping feedback sections first.
#[derive(Debug, Clone)]
pub struct PromptBuilder {
    budget_bytes: usize,
}

impl PromptBuilder {
    /// Create a builder with the given byte budget.
    pub fn new(budget_bytes: usize) -> Self {
        Self { budget_bytes }
    }

    /// Build the implementation prompt for one attempt.
    pub fn build(&self, input: &PromptInputs) -> PromptPack {
        let engine = PromptEngine::new();
        let rendered = engine
            .render(input)
            .expect("implement template rendering should not fail");

        let mut sections = parse_sections(&rendered);
        apply_budget_to_sections(&mut sections, self.budget_bytes);

        PromptPack {
            content: render_sections(&sections),
        }
    }
}

/// A rendered prompt ready to send to the generator.
#[derive(Debug, Clone)]
pub struct PromptPack {
    content: String,
}

impl PromptPack {
    /// Get the rendered prompt content.
    pub fn render(&self) -> String {
        self.content.clone()
    }
}
