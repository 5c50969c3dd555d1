//! The decision oracle: the AI that picks the next action.
//!
//! An oracle looks at what the device shows plus the rendered prompt and
//! answers with a raw [`Decision`]. The answer is untrusted: the agent runs
//! it through the action dispatcher before anything touches the device.
//!
//! Implementations (HTTP clients for specific model providers) live outside
//! this workspace.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use crate::action::ActionKind;
use crate::device::Element;
use crate::error::OracleError;
use crate::scenario::{AiOptions, ImageAssertion};
use crate::tool::ToolDefinition;

/// Everything the oracle sees for one decision.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionInput {
    pub scenario_id: String,

    /// Rendered prompt (goal, step counters, history, hints)
    pub prompt: String,

    pub ui_tree: String,

    pub focused_tree: String,

    pub elements: Vec<Element>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub screenshot_path: Option<PathBuf>,

    /// Built-in actions the oracle may choose from
    pub actions: Vec<ActionKind>,

    /// External tools the oracle may call
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolDefinition>,

    #[serde(default)]
    pub ai_options: AiOptions,
}

/// The oracle's raw answer, before validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Decision {
    /// A structured function/tool call: action name plus JSON arguments.
    ToolCall {
        name: String,
        #[serde(default)]
        arguments: serde_json::Value,
    },
    /// A JSON object carrying an `action` field next to its arguments.
    Inline { body: serde_json::Value },
}

impl Decision {
    pub fn tool_call(name: impl Into<String>, arguments: serde_json::Value) -> Self {
        Self::ToolCall {
            name: name.into(),
            arguments,
        }
    }

    pub fn inline(body: serde_json::Value) -> Self {
        Self::Inline { body }
    }
}

/// Request to judge screenshots against assertions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageAssertionRequest {
    pub scenario_id: String,
    pub screenshots: Vec<PathBuf>,
    pub assertions: Vec<ImageAssertion>,
    #[serde(default)]
    pub ai_options: AiOptions,
}

/// The oracle's verdict for one assertion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageAssertionResult {
    pub assertion: String,
    pub passed: bool,
    pub fulfillment_percent: u8,
    pub explanation: String,
}

/// Request to draft new scenarios from an instruction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioGenerationRequest {
    pub instruction: String,
    /// Ids of scenarios that already exist, so drafts can depend on them
    #[serde(default)]
    pub existing_scenarios: Vec<String>,
}

/// A scenario suggested by the oracle, not yet part of the project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioDraft {
    pub id: String,
    pub goal: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dependency: Option<String>,
}

/// The core DecisionOracle trait.
#[async_trait]
pub trait DecisionOracle: Send + Sync {
    /// A human-readable name for logs.
    fn name(&self) -> &str;

    /// Choose the next action.
    ///
    /// Fails with [`OracleError::RateLimited`] when throttled and with
    /// [`OracleError::ParseFailure`] when the model output is unusable.
    async fn decide(&self, input: &DecisionInput) -> std::result::Result<Decision, OracleError>;

    /// Judge screenshots against image assertions.
    async fn assert_image(
        &self,
        _request: &ImageAssertionRequest,
    ) -> std::result::Result<Vec<ImageAssertionResult>, OracleError> {
        Err(OracleError::NotSupported(format!(
            "Oracle '{}' does not support image assertions",
            self.name()
        )))
    }

    /// Draft scenarios for an authoring tool.
    async fn generate_scenarios(
        &self,
        _request: &ScenarioGenerationRequest,
    ) -> std::result::Result<Vec<ScenarioDraft>, OracleError> {
        Err(OracleError::NotSupported(format!(
            "Oracle '{}' does not support scenario generation",
            self.name()
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NameOnly;

    #[async_trait]
    impl DecisionOracle for NameOnly {
        fn name(&self) -> &str {
            "name-only"
        }

        async fn decide(&self, _input: &DecisionInput) -> std::result::Result<Decision, OracleError> {
            Ok(Decision::tool_call("GoalAchieved", serde_json::json!({})))
        }
    }

    #[tokio::test]
    async fn optional_capabilities_default_to_not_supported() {
        let oracle = NameOnly;
        let err = oracle
            .generate_scenarios(&ScenarioGenerationRequest {
                instruction: "cover checkout".into(),
                existing_scenarios: vec![],
            })
            .await
            .unwrap_err();
        assert!(matches!(err, OracleError::NotSupported(_)));
        assert!(err.to_string().contains("name-only"));
    }

    #[test]
    fn decision_serialization() {
        let decision = Decision::inline(serde_json::json!({"action": "BackPress"}));
        let json = serde_json::to_string(&decision).unwrap();
        assert!(json.contains(r#""kind":"inline""#));
        let back: Decision = serde_json::from_str(&json).unwrap();
        assert_eq!(back, decision);
    }
}
