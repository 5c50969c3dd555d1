//! The step prompt template.
//!
//! A template is plain text with `{{PLACEHOLDER}}` slots. It is validated
//! once at construction, so a broken custom template fails before any
//! device is touched rather than in the middle of a run.

use std::collections::BTreeSet;
use std::fmt::Write;
use uiscout_core::error::TemplateError;
use uiscout_core::step::{Step, history_window_start};
use super::{ANY_TOKEN, TOKEN};

pub const GOAL: &str = "USER_INPUT_GOAL";
pub const CURRENT_STEP: &str = "CURRENT_STEP";
pub const MAX_STEP: &str = "MAX_STEP";
pub const STEPS: &str = "STEPS";
pub const UI_ELEMENTS: &str = "UI_ELEMENTS";
pub const FOCUSED_TREE: &str = "FOCUSED_TREE";

const REQUIRED: [&str; 4] = [GOAL, CURRENT_STEP, MAX_STEP, STEPS];
const OPTIONAL: [&str; 2] = [UI_ELEMENTS, FOCUSED_TREE];

pub const DEFAULT_TEMPLATE: &str = "\
Goal: \"{{USER_INPUT_GOAL}}\"

Your step: {{CURRENT_STEP}}. Max step: {{MAX_STEP}}.

What you did so far:
{{STEPS}}

Elements on the current screen:
{{UI_ELEMENTS}}

Focused part of the screen:
{{FOCUSED_TREE}}

Choose the next action that moves towards the goal. Use GoalAchieved only \
when the screen shows the goal is met, and Failed only when it cannot be met.";

/// Values substituted into a template for one decision.
#[derive(Debug, Clone, Copy)]
pub struct PromptInput<'a> {
    pub goal: &'a str,
    /// Meaningful actions so far plus one
    pub current_step: usize,
    pub max_step: u32,
    pub steps: &'a [Step],
    /// Expectations and feedback shown right after the goal
    pub hints: &'a [String],
    /// Number of meaningful steps kept in the history
    pub history_limit: usize,
    pub ui_elements: &'a str,
    pub focused_tree: &'a str,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTemplate {
    text: String,
}

impl PromptTemplate {
    /// Validate and wrap a template.
    ///
    /// All of `{{USER_INPUT_GOAL}}`, `{{CURRENT_STEP}}`, `{{MAX_STEP}}` and
    /// `{{STEPS}}` must appear; `{{UI_ELEMENTS}}` and `{{FOCUSED_TREE}}` are
    /// optional. Anything else is rejected.
    pub fn new(text: impl Into<String>) -> Result<Self, TemplateError> {
        let text = text.into();
        let found: BTreeSet<String> = ANY_TOKEN
            .captures_iter(&text)
            .filter(|caps| caps.get(1).is_none())
            .map(|caps| caps[2].to_string())
            .collect();

        let missing: Vec<String> = REQUIRED
            .iter()
            .filter(|name| !found.contains(**name))
            .map(|name| format!("{{{{{name}}}}}"))
            .collect();
        if !missing.is_empty() {
            return Err(TemplateError::MissingPlaceholders(missing));
        }

        let unknown: Vec<String> = found
            .iter()
            .filter(|name| !REQUIRED.contains(&name.as_str()) && !OPTIONAL.contains(&name.as_str()))
            .map(|name| format!("{{{{{name}}}}}"))
            .collect();
        if !unknown.is_empty() {
            return Err(TemplateError::UnknownPlaceholders(unknown));
        }

        Ok(Self { text })
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Render the prompt.
    ///
    /// Substitution is a single pass, so placeholder-like text inside the
    /// goal or the history is never expanded. Hints go on their own lines
    /// directly after the line holding the goal.
    pub fn format(&self, input: &PromptInput<'_>) -> String {
        let steps = render_history(input.steps, input.history_limit);
        let current_step = input.current_step.to_string();
        let max_step = input.max_step.to_string();

        let mut out = String::with_capacity(self.text.len() + steps.len());
        for (i, line) in self.text.split('\n').enumerate() {
            if i > 0 {
                out.push('\n');
            }
            let holds_goal = line.contains("{{USER_INPUT_GOAL}}");
            let rendered = TOKEN.replace_all(line, |caps: &regex_lite::Captures<'_>| {
                if caps.get(1).is_some() {
                    return caps[0].to_string();
                }
                match &caps[2] {
                    GOAL => input.goal.to_string(),
                    CURRENT_STEP => current_step.clone(),
                    MAX_STEP => max_step.clone(),
                    STEPS => steps.clone(),
                    UI_ELEMENTS => input.ui_elements.to_string(),
                    FOCUSED_TREE => input.focused_tree.to_string(),
                    _ => caps[0].to_string(),
                }
            });
            out.push_str(&rendered);
            if holds_goal && !input.hints.is_empty() {
                out.push_str("\n\nHints:");
                for hint in input.hints {
                    let _ = write!(out, "\n- {hint}");
                }
            }
        }
        out
    }
}

impl Default for PromptTemplate {
    fn default() -> Self {
        Self {
            text: DEFAULT_TEMPLATE.to_string(),
        }
    }
}

/// History text for the prompt, limited to the window of recent steps.
fn render_history(steps: &[Step], limit: usize) -> String {
    let start = history_window_start(steps, limit);
    let skipped_meaningful = steps[..start].iter().filter(|s| s.is_meaningful()).count();

    let mut out = String::new();
    let mut number = skipped_meaningful;
    for step in &steps[start..] {
        if !out.is_empty() {
            out.push('\n');
        }
        match &step.action {
            Some(action) if step.is_meaningful() => {
                number += 1;
                let _ = write!(out, "Step {number}. {action}");
            }
            Some(action) => {
                let _ = write!(out, "- {action}");
            }
            None => out.push_str("- (no action)"),
        }
        if let Some(memo) = &step.memo {
            let _ = write!(out, "\n  memo: {memo}");
        }
        if let Some(description) = &step.image_description {
            let _ = write!(out, "\n  screen: {description}");
        }
        if let Some(feedback) = &step.feedback {
            let _ = write!(out, "\n  feedback: {feedback}");
        }
    }

    if out.is_empty() {
        out.push_str("(no steps yet)");
    }
    out
}
