//! Scenario, task, and shard definitions.
//!
//! A [`Scenario`] is what the project file declares. An [`AgentTask`] is a
//! scenario resolved against project defaults, ready for one agent run.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use crate::action::ActionKind;
use crate::device::DeviceCommand;
use crate::error::Error;

/// Default fulfillment threshold for image assertions, in percent.
pub const DEFAULT_FULFILLMENT_PERCENT: u8 = 80;

fn default_fulfillment_percent() -> u8 {
    DEFAULT_FULFILLMENT_PERCENT
}

/// A visual expectation checked by the oracle when the goal is declared achieved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageAssertion {
    pub assertion: String,

    /// Minimum fulfillment percentage required to pass
    #[serde(default = "default_fulfillment_percent")]
    pub fulfillment_percent: u8,
}

/// What to do on the device after a scenario finishes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CleanupSpec {
    #[default]
    Noop,
    ClearAppData { app_id: String },
    KillApp { app_id: String },
}

impl CleanupSpec {
    pub fn to_commands(&self) -> Vec<DeviceCommand> {
        match self {
            Self::Noop => vec![],
            Self::ClearAppData { app_id } => vec![DeviceCommand::ClearAppData { app_id: app_id.clone() }],
            Self::KillApp { app_id } => vec![DeviceCommand::StopApp { app_id: app_id.clone() }],
        }
    }
}

/// A command run once before a task's agent loop starts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InitializationStep {
    LaunchApp { app_id: String },
    ClearAppData { app_id: String },
    Wait { millis: u64 },
    OpenLink { url: String },
    Back,
}

impl InitializationStep {
    pub fn to_commands(&self) -> Vec<DeviceCommand> {
        match self {
            Self::LaunchApp { app_id } => vec![DeviceCommand::LaunchApp { app_id: app_id.clone() }],
            Self::ClearAppData { app_id } => vec![DeviceCommand::ClearAppData { app_id: app_id.clone() }],
            Self::Wait { millis } => vec![DeviceCommand::WaitMillis { millis: *millis }],
            Self::OpenLink { url } => vec![DeviceCommand::OpenLink { url: url.clone() }],
            Self::Back => vec![DeviceCommand::Back],
        }
    }

    pub fn app_id(&self) -> Option<&str> {
        match self {
            Self::LaunchApp { app_id } | Self::ClearAppData { app_id } => Some(app_id.as_str()),
            Self::Wait { .. } | Self::OpenLink { .. } | Self::Back => None,
        }
    }
}

/// Options forwarded to the decision oracle.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AiOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    /// How many meaningful past steps the prompt includes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub historical_step_limit: Option<usize>,

    /// Extra JSON fields merged into the oracle request body
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra_body: Option<serde_json::Map<String, serde_json::Value>>,
}

impl AiOptions {
    /// Overlay `overrides` on top of `self`.
    ///
    /// Scalar options are replaced when set; `extra_body` objects are merged
    /// key by key with the override winning.
    pub fn merge(&self, overrides: &AiOptions) -> AiOptions {
        let extra_body = match (&self.extra_body, &overrides.extra_body) {
            (Some(base), Some(over)) => {
                let mut merged = base.clone();
                for (k, v) in over {
                    merged.insert(k.clone(), v.clone());
                }
                Some(merged)
            }
            (base, over) => over.clone().or_else(|| base.clone()),
        };
        AiOptions {
            temperature: overrides.temperature.or(self.temperature),
            historical_step_limit: overrides.historical_step_limit.or(self.historical_step_limit),
            extra_body,
        }
    }
}

/// A scenario as declared in the project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    pub id: String,

    /// Goal text; may contain `{{variable}}` tokens
    pub goal: String,

    /// The scenario that must run (and succeed) before this one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dependency: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_step: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_retry: Option<u32>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,

    /// Force-disable the decision cache for this scenario
    #[serde(default)]
    pub cache_disabled: bool,

    /// Names of actions allowed on top of the defaults
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub additional_actions: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub image_assertions: Vec<ImageAssertion>,

    #[serde(default)]
    pub cleanup: CleanupSpec,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub initialization: Vec<InitializationStep>,

    /// Custom prompt template replacing the project one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_prompt_template: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ai_options: Option<AiOptions>,
}

impl Scenario {
    /// A minimal scenario with everything else defaulted.
    pub fn new(id: impl Into<String>, goal: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            goal: goal.into(),
            dependency: None,
            max_step: None,
            max_retry: None,
            tags: vec![],
            cache_disabled: false,
            additional_actions: vec![],
            image_assertions: vec![],
            cleanup: CleanupSpec::Noop,
            initialization: vec![],
            user_prompt_template: None,
            ai_options: None,
        }
    }

    pub fn depends_on(mut self, dependency: impl Into<String>) -> Self {
        self.dependency = Some(dependency.into());
        self
    }
}

/// One executable unit of a scenario chain.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentTask {
    pub scenario_id: String,
    /// Goal with variables already substituted
    pub goal: String,
    pub max_step: u32,
    pub max_retry: u32,
    pub additional_actions: Vec<ActionKind>,
    pub image_assertions: Vec<ImageAssertion>,
    pub initialization: Vec<InitializationStep>,
    pub cache_disabled: bool,
    pub user_prompt_template: Option<String>,
    pub ai_options: AiOptions,
}

impl AgentTask {
    /// Defaults plus additional actions, without duplicates, in order.
    pub fn allowed_actions(&self) -> Vec<ActionKind> {
        let mut allowed: Vec<ActionKind> = ActionKind::DEFAULTS.to_vec();
        for kind in &self.additional_actions {
            if !allowed.contains(kind) {
                allowed.push(*kind);
            }
        }
        allowed
    }

    /// App to wait on after initialization, taken from the first launch step.
    pub fn app_id(&self) -> Option<&str> {
        self.initialization.iter().find_map(InitializationStep::app_id)
    }
}

/// A 1-based slice selector: shard `current` of `total`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "ShardParts")]
pub struct Shard {
    current: u32,
    total: u32,
}

#[derive(Deserialize)]
struct ShardParts {
    current: u32,
    total: u32,
}

impl TryFrom<ShardParts> for Shard {
    type Error = Error;

    fn try_from(parts: ShardParts) -> Result<Self, Self::Error> {
        Self::new(parts.current, parts.total)
    }
}

impl Shard {
    pub fn new(current: u32, total: u32) -> Result<Self, Error> {
        if total == 0 {
            return Err(Error::Config {
                message: "shard total must be at least 1".into(),
            });
        }
        if current == 0 || current > total {
            return Err(Error::Config {
                message: format!("shard current must be between 1 and {total}, got {current}"),
            });
        }
        Ok(Self { current, total })
    }

    /// The whole set as a single shard.
    pub fn all() -> Self {
        Self { current: 1, total: 1 }
    }

    pub fn current(&self) -> u32 {
        self.current
    }

    pub fn total(&self) -> u32 {
        self.total
    }
}

impl Default for Shard {
    fn default() -> Self {
        Self::all()
    }
}

impl fmt::Display for Shard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.current, self.total)
    }
}

impl FromStr for Shard {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (current, total) = s.split_once('/').ok_or_else(|| Error::Config {
            message: format!("shard must look like 'current/total', got '{s}'"),
        })?;
        let parse = |part: &str| {
            part.trim().parse::<u32>().map_err(|e| Error::Config {
                message: format!("invalid shard number '{part}': {e}"),
            })
        };
        Self::new(parse(current)?, parse(total)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserialized_shard_is_validated() {
        let shard: Shard = serde_json::from_str(r#"{"current": 2, "total": 3}"#).unwrap();
        assert_eq!(shard, Shard::new(2, 3).unwrap());
        assert!(serde_json::from_str::<Shard>(r#"{"current": 0, "total": 0}"#).is_err());
        assert!(serde_json::from_str::<Shard>(r#"{"current": 4, "total": 3}"#).is_err());
    }

    #[test]
    fn shard_parsing_and_validation() {
        let shard: Shard = "2/3".parse().unwrap();
        assert_eq!(shard.current(), 2);
        assert_eq!(shard.total(), 3);
        assert_eq!(shard.to_string(), "2/3");

        assert!("0/3".parse::<Shard>().is_err());
        assert!("4/3".parse::<Shard>().is_err());
        assert!("1/0".parse::<Shard>().is_err());
        assert!("abc".parse::<Shard>().is_err());
    }

    #[test]
    fn ai_options_merge_prefers_overrides() {
        let mut base_body = serde_json::Map::new();
        base_body.insert("top_p".into(), serde_json::json!(0.9));
        base_body.insert("seed".into(), serde_json::json!(1));
        let base = AiOptions {
            temperature: Some(0.2),
            historical_step_limit: Some(10),
            extra_body: Some(base_body),
        };

        let mut over_body = serde_json::Map::new();
        over_body.insert("seed".into(), serde_json::json!(42));
        let overrides = AiOptions {
            temperature: None,
            historical_step_limit: Some(3),
            extra_body: Some(over_body),
        };

        let merged = base.merge(&overrides);
        assert_eq!(merged.temperature, Some(0.2));
        assert_eq!(merged.historical_step_limit, Some(3));
        let body = merged.extra_body.unwrap();
        assert_eq!(body["top_p"], serde_json::json!(0.9));
        assert_eq!(body["seed"], serde_json::json!(42));
    }

    #[test]
    fn allowed_actions_append_additional_without_duplicates() {
        let task = AgentTask {
            scenario_id: "s".into(),
            goal: "g".into(),
            max_step: 5,
            max_retry: 0,
            additional_actions: vec![ActionKind::DpadUp, ActionKind::ClickWithText],
            image_assertions: vec![],
            initialization: vec![],
            cache_disabled: false,
            user_prompt_template: None,
            ai_options: AiOptions::default(),
        };
        let allowed = task.allowed_actions();
        assert_eq!(allowed.len(), ActionKind::DEFAULTS.len() + 1);
        assert_eq!(allowed.last(), Some(&ActionKind::DpadUp));
    }

    #[test]
    fn scenario_deserializes_with_defaults() {
        let json = r#"{"id": "login", "goal": "Log in as {{user}}"}"#;
        let scenario: Scenario = serde_json::from_str(json).unwrap();
        assert_eq!(scenario.id, "login");
        assert!(scenario.dependency.is_none());
        assert_eq!(scenario.cleanup, CleanupSpec::Noop);
        assert!(!scenario.cache_disabled);
    }

    #[test]
    fn initialization_exposes_app_id() {
        let step = InitializationStep::LaunchApp { app_id: "com.example".into() };
        assert_eq!(step.app_id(), Some("com.example"));
        assert_eq!(
            step.to_commands(),
            vec![DeviceCommand::LaunchApp { app_id: "com.example".into() }]
        );
        assert_eq!(InitializationStep::Back.app_id(), None);
    }
}
