//! Steps and the per-task context that records them.
//!
//! A [`Step`] is one perceive/decide/act cycle (or a synthetic record of a
//! failure). Steps are append-only: the [`ContextHolder`] never mutates or
//! removes one after it is added.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;
use crate::action::Action;

/// One recorded cycle of the agent loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    pub step_id: String,

    /// The action taken, or `None` for context-only entries
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<Action>,

    /// Feedback for the oracle (validation errors, tool output, assertion results)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feedback: Option<String>,

    /// The oracle's own note about why it chose the action
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memo: Option<String>,

    /// The oracle's description of the screenshot
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_description: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_key: Option<String>,

    /// Whether the action was replayed from the decision cache
    #[serde(default)]
    pub cache_hit: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub screenshot_path: Option<PathBuf>,

    pub timestamp: DateTime<Utc>,
}

impl Step {
    fn empty() -> Self {
        Self {
            step_id: Uuid::new_v4().to_string(),
            action: None,
            feedback: None,
            memo: None,
            image_description: None,
            cache_key: None,
            cache_hit: false,
            screenshot_path: None,
            timestamp: Utc::now(),
        }
    }

    /// A step that carries an action.
    pub fn with_action(action: Action) -> Self {
        Self {
            action: Some(action),
            ..Self::empty()
        }
    }

    /// A context-only entry (no action), e.g. a rejected decision.
    pub fn context(feedback: impl Into<String>) -> Self {
        Self {
            feedback: Some(feedback.into()),
            ..Self::empty()
        }
    }

    pub fn memo(mut self, memo: Option<String>) -> Self {
        self.memo = memo;
        self
    }

    pub fn image_description(mut self, description: Option<String>) -> Self {
        self.image_description = description;
        self
    }

    pub fn feedback(mut self, feedback: impl Into<String>) -> Self {
        self.feedback = Some(feedback.into());
        self
    }

    pub fn cache_key(mut self, key: impl Into<String>) -> Self {
        self.cache_key = Some(key.into());
        self
    }

    pub fn screenshot(mut self, path: Option<PathBuf>) -> Self {
        self.screenshot_path = path;
        self
    }

    /// A fresh copy of a cached step: new id and timestamp, flagged as a hit.
    pub fn replayed(&self) -> Self {
        Self {
            step_id: Uuid::new_v4().to_string(),
            cache_hit: true,
            timestamp: Utc::now(),
            ..self.clone()
        }
    }

    /// Counts towards the step number shown to the oracle.
    pub fn is_meaningful(&self) -> bool {
        self.action
            .as_ref()
            .is_some_and(|action| !action.is_failure_marker())
    }
}

/// Index of the first step inside the history window.
///
/// The window starts at the `limit`-th meaningful step counted from the end,
/// so it keeps the most recent `limit` meaningful steps plus any
/// context-only entries recorded after them. With fewer meaningful steps
/// than `limit`, the whole history is kept.
pub fn history_window_start(steps: &[Step], limit: usize) -> usize {
    if limit == 0 {
        return steps.len();
    }
    let mut seen = 0;
    for (i, step) in steps.iter().enumerate().rev() {
        if step.is_meaningful() {
            seen += 1;
            if seen == limit {
                return i;
            }
        }
    }
    0
}

/// The append-only history of one task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextHolder {
    pub goal: String,
    pub max_step: u32,
    steps: Vec<Step>,
}

impl ContextHolder {
    pub fn new(goal: impl Into<String>, max_step: u32) -> Self {
        Self {
            goal: goal.into(),
            max_step,
            steps: Vec::new(),
        }
    }

    pub fn add_step(&mut self, step: Step) {
        self.steps.push(step);
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn last_step(&self) -> Option<&Step> {
        self.steps.last()
    }

    /// Steps whose action is present and not a failure marker.
    pub fn count_meaningful_actions(&self) -> usize {
        self.steps.iter().filter(|s| s.is_meaningful()).count()
    }

    /// The step number shown to the oracle for the decision being made.
    pub fn current_step(&self) -> usize {
        self.count_meaningful_actions() + 1
    }

    pub fn into_steps(self) -> Vec<Step> {
        self.steps
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn click(text: &str) -> Step {
        Step::with_action(Action::ClickWithText { text: text.into() })
    }

    #[test]
    fn meaningful_count_ignores_context_and_failure_markers() {
        let mut ctx = ContextHolder::new("log in", 10);
        ctx.add_step(Step::context("unknown action 'Teleport'"));
        assert_eq!(ctx.count_meaningful_actions(), 0);

        ctx.add_step(click("Login"));
        assert_eq!(ctx.count_meaningful_actions(), 1);

        ctx.add_step(Step::with_action(Action::Failed));
        assert_eq!(ctx.count_meaningful_actions(), 1);

        ctx.add_step(Step::with_action(Action::GoalAchieved));
        assert_eq!(ctx.count_meaningful_actions(), 2);
        assert_eq!(ctx.current_step(), 3);
        assert_eq!(ctx.steps().len(), 4);
    }

    #[test]
    fn replayed_step_gets_new_identity() {
        let original = click("OK").cache_key("v1-uitree-a-context-b");
        let replay = original.replayed();
        assert_ne!(replay.step_id, original.step_id);
        assert!(replay.cache_hit);
        assert_eq!(replay.action, original.action);
        assert_eq!(replay.cache_key, original.cache_key);
    }

    #[test]
    fn history_window_keeps_last_meaningful_steps() {
        let steps = vec![click("one"), click("two"), click("three")];
        assert_eq!(history_window_start(&steps, 2), 1);
        assert_eq!(history_window_start(&steps, 3), 0);
        assert_eq!(history_window_start(&steps, 10), 0);
        assert_eq!(history_window_start(&steps, 0), 3);
    }

    #[test]
    fn history_window_includes_trailing_context_entries() {
        let steps = vec![
            click("one"),
            Step::context("old note"),
            click("two"),
            Step::context("rejected"),
        ];
        assert_eq!(history_window_start(&steps, 1), 2);
    }
}
