//! Configuration loading, validation, and management for uiscout.
//!
//! Loads the project from `uiscout.toml` (or an explicit path) with
//! environment variable overrides. Validates all settings at load time so
//! the engine never starts on a broken project.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;
use uiscout_core::action::ActionKind;
use uiscout_core::scenario::{AiOptions, Scenario};

/// Default project file name, looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "uiscout.toml";

/// The root configuration structure.
///
/// Maps directly to `uiscout.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Step budget for scenarios that do not set one
    #[serde(default = "default_max_step")]
    pub default_max_step: u32,

    /// Retry count for scenarios that do not set one
    #[serde(default = "default_max_retry")]
    pub default_max_retry: u32,

    /// Where screenshots are written, one subdirectory per scenario
    #[serde(default = "default_screenshots_dir")]
    pub screenshots_dir: PathBuf,

    #[serde(default)]
    pub ai: AiConfig,

    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub retry: RetryConfig,

    #[serde(default)]
    pub prompt: PromptConfig,

    /// Values substituted into `{{name}}` tokens of scenario goals
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub variables: BTreeMap<String, String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub scenarios: Vec<Scenario>,
}

fn default_max_step() -> u32 {
    10
}
fn default_max_retry() -> u32 {
    3
}
fn default_screenshots_dir() -> PathBuf {
    PathBuf::from(".uiscout/screenshots")
}

/// Project-wide oracle options; scenarios may override each field.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    #[serde(default = "default_history_limit")]
    pub historical_step_limit: usize,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra_body: Option<serde_json::Map<String, serde_json::Value>>,
}

fn default_history_limit() -> usize {
    10
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            temperature: None,
            historical_step_limit: default_history_limit(),
            extra_body: None,
        }
    }
}

impl AiConfig {
    pub fn to_options(&self) -> AiOptions {
        AiOptions {
            temperature: self.temperature,
            historical_step_limit: Some(self.historical_step_limit),
            extra_body: self.extra_body.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheStrategy {
    Disabled,
    #[default]
    InMemory,
    Disk,
}

impl std::str::FromStr for CacheStrategy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "disabled" | "none" | "off" => Ok(Self::Disabled),
            "in_memory" | "memory" => Ok(Self::InMemory),
            "disk" | "file" => Ok(Self::Disk),
            other => Err(ConfigError::ValidationError(format!(
                "unknown cache strategy '{other}' (expected disabled, in_memory or disk)"
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default)]
    pub strategy: CacheStrategy,

    /// Root directory of the disk strategy
    #[serde(default = "default_cache_dir")]
    pub dir: PathBuf,
}

fn default_cache_dir() -> PathBuf {
    PathBuf::from(".uiscout/cache")
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            strategy: CacheStrategy::default(),
            dir: default_cache_dir(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Base of the exponential rate-limit backoff
    #[serde(default = "default_base_delay_secs")]
    pub base_delay_secs: u64,

    #[serde(default = "default_image_assertion_max_retries")]
    pub image_assertion_max_retries: u32,
}

fn default_base_delay_secs() -> u64 {
    10
}
fn default_image_assertion_max_retries() -> u32 {
    6
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            base_delay_secs: default_base_delay_secs(),
            image_assertion_max_retries: default_image_assertion_max_retries(),
        }
    }
}

impl RetryConfig {
    pub fn base_delay(&self) -> Duration {
        Duration::from_secs(self.base_delay_secs)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PromptConfig {
    /// Replaces the built-in prompt template for every scenario
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_prompt_template: Option<String>,
}

impl AppConfig {
    /// Load `uiscout.toml` from the working directory, or `path` if given,
    /// and apply environment overrides:
    /// - `UISCOUT_CACHE_STRATEGY`
    /// - `UISCOUT_CACHE_DIR`
    /// - `UISCOUT_HISTORY_LIMIT`
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = path
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));
        let mut config = Self::read(&path)?;
        config.apply_env_overrides(|name| std::env::var(name).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path, without env overrides.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let config = Self::read(path)?;
        config.validate()?;
        Ok(config)
    }

    fn read(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        Self::from_toml(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    /// Parse without validating.
    pub fn from_toml(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Apply overrides from an environment lookup (injected for tests).
    pub fn apply_env_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(strategy) = lookup("UISCOUT_CACHE_STRATEGY") {
            self.cache.strategy = strategy.parse()?;
        }
        if let Some(dir) = lookup("UISCOUT_CACHE_DIR") {
            self.cache.dir = PathBuf::from(dir);
        }
        if let Some(limit) = lookup("UISCOUT_HISTORY_LIMIT") {
            self.ai.historical_step_limit = limit.trim().parse().map_err(|_| {
                ConfigError::ValidationError(format!(
                    "UISCOUT_HISTORY_LIMIT must be a positive integer, got '{limit}'"
                ))
            })?;
        }
        Ok(())
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.default_max_step == 0 {
            return Err(ConfigError::ValidationError(
                "default_max_step must be at least 1".into(),
            ));
        }
        validate_ai_options("[ai]", &self.ai.to_options())?;

        let mut seen = HashSet::new();
        for scenario in &self.scenarios {
            if !seen.insert(scenario.id.as_str()) {
                return Err(ConfigError::ValidationError(format!(
                    "duplicate scenario id '{}'",
                    scenario.id
                )));
            }
        }

        for scenario in &self.scenarios {
            let context = format!("scenario '{}'", scenario.id);
            if scenario.max_step == Some(0) {
                return Err(ConfigError::ValidationError(format!(
                    "{context}: max_step must be at least 1"
                )));
            }
            if let Some(dependency) = &scenario.dependency
                && !seen.contains(dependency.as_str())
            {
                return Err(ConfigError::ValidationError(format!(
                    "{context}: depends on unknown scenario '{dependency}'"
                )));
            }
            for name in &scenario.additional_actions {
                if ActionKind::from_name(name).is_none() {
                    return Err(ConfigError::ValidationError(format!(
                        "{context}: unknown additional action '{name}'"
                    )));
                }
            }
            if let Some(options) = &scenario.ai_options {
                validate_ai_options(&context, options)?;
            }
        }

        Ok(())
    }

    pub fn scenario(&self, id: &str) -> Option<&Scenario> {
        self.scenarios.iter().find(|s| s.id == id)
    }

    /// Generate a default config TOML string.
    pub fn default_toml() -> String {
        toml::to_string_pretty(&Self::default()).unwrap_or_default()
    }
}

fn validate_ai_options(context: &str, options: &AiOptions) -> Result<(), ConfigError> {
    if let Some(t) = options.temperature
        && !(0.0..=2.0).contains(&t)
    {
        return Err(ConfigError::ValidationError(format!(
            "{context}: temperature must be between 0.0 and 2.0, got {t}"
        )));
    }
    if options.historical_step_limit == Some(0) {
        return Err(ConfigError::ValidationError(format!(
            "{context}: historical_step_limit must be at least 1"
        )));
    }
    Ok(())
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            default_max_step: default_max_step(),
            default_max_retry: default_max_retry(),
            screenshots_dir: default_screenshots_dir(),
            ai: AiConfig::default(),
            cache: CacheConfig::default(),
            retry: RetryConfig::default(),
            prompt: PromptConfig::default(),
            variables: BTreeMap::new(),
            scenarios: vec![],
        }
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use uiscout_core::scenario::CleanupSpec;

    const PROJECT: &str = r#"
default_max_step = 15

[ai]
temperature = 0.2
historical_step_limit = 5

[ai.extra_body]
top_p = 0.9

[cache]
strategy = "disk"
dir = "/tmp/uiscout-cache"

[variables]
user = "alice"

[[scenarios]]
id = "login"
goal = "Log in as {{user}}"
initialization = [{ type = "launch_app", app_id = "com.example" }]

[[scenarios]]
id = "checkout"
goal = "Buy the first item"
dependency = "login"
max_retry = 1
additional_actions = ["DpadUp"]
cleanup = { type = "kill_app", app_id = "com.example" }
image_assertions = [{ assertion = "An order confirmation is shown" }]
"#;

    #[test]
    fn default_config_is_valid() {
        let config = AppConfig::default();
        assert_eq!(config.default_max_step, 10);
        assert_eq!(config.default_max_retry, 3);
        assert_eq!(config.ai.historical_step_limit, 10);
        assert_eq!(config.retry.base_delay(), Duration::from_secs(10));
        assert_eq!(config.retry.image_assertion_max_retries, 6);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn parses_full_project() {
        let config = AppConfig::from_toml(PROJECT).unwrap();
        config.validate().unwrap();
        assert_eq!(config.default_max_step, 15);
        assert_eq!(config.default_max_retry, 3);
        assert_eq!(config.cache.strategy, CacheStrategy::Disk);
        assert_eq!(config.variables["user"], "alice");
        assert_eq!(config.scenarios.len(), 2);

        let checkout = config.scenario("checkout").unwrap();
        assert_eq!(checkout.dependency.as_deref(), Some("login"));
        assert_eq!(
            checkout.cleanup,
            CleanupSpec::KillApp { app_id: "com.example".into() }
        );
        assert_eq!(checkout.image_assertions[0].fulfillment_percent, 80);

        let options = config.ai.to_options();
        assert_eq!(options.historical_step_limit, Some(5));
        assert_eq!(options.extra_body.unwrap()["top_p"], serde_json::json!(0.9));
    }

    #[test]
    fn config_roundtrip_toml() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: AppConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.default_max_step, config.default_max_step);
        assert_eq!(parsed.cache.dir, config.cache.dir);
    }

    #[test]
    fn invalid_temperature_rejected() {
        let mut config = AppConfig::default();
        config.ai.temperature = Some(5.0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_history_limit_rejected() {
        let mut config = AppConfig::default();
        config.ai.historical_step_limit = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn duplicate_ids_and_unknown_dependencies_rejected() {
        let mut config = AppConfig::default();
        config.scenarios = vec![Scenario::new("a", "x"), Scenario::new("a", "y")];
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("duplicate scenario id 'a'"));

        config.scenarios = vec![Scenario::new("a", "x").depends_on("ghost")];
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("unknown scenario 'ghost'"));
    }

    #[test]
    fn unknown_additional_action_rejected() {
        let mut scenario = Scenario::new("a", "x");
        scenario.additional_actions = vec!["Teleport".into()];
        let config = AppConfig {
            scenarios: vec![scenario],
            ..AppConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn env_overrides_apply() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("UISCOUT_CACHE_STRATEGY", "disabled"),
            ("UISCOUT_CACHE_DIR", "/var/cache/uiscout"),
            ("UISCOUT_HISTORY_LIMIT", "4"),
        ]);
        let mut config = AppConfig::default();
        config
            .apply_env_overrides(|name| env.get(name).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.cache.strategy, CacheStrategy::Disabled);
        assert_eq!(config.cache.dir, PathBuf::from("/var/cache/uiscout"));
        assert_eq!(config.ai.historical_step_limit, 4);
    }

    #[test]
    fn bad_env_override_is_an_error() {
        let mut config = AppConfig::default();
        let result = config.apply_env_overrides(|name| {
            (name == "UISCOUT_HISTORY_LIMIT").then(|| "lots".to_string())
        });
        assert!(result.is_err());
    }

    #[test]
    fn missing_config_file_returns_defaults() {
        let config = AppConfig::load_from(Path::new("/nonexistent/uiscout.toml")).unwrap();
        assert_eq!(config.default_max_step, 10);
    }

    #[test]
    fn load_from_file_reports_parse_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("uiscout.toml");
        std::fs::write(&path, PROJECT).unwrap();
        let config = AppConfig::load_from(&path).unwrap();
        assert_eq!(config.scenarios.len(), 2);

        std::fs::write(&path, "default_max_step = \"many\"").unwrap();
        let err = AppConfig::load_from(&path).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError { .. }));
    }
}
