//! Run-wide and per-agent wiring.
//!
//! [`ExecutionContext`] holds what every agent of a run shares (cache,
//! events, cancellation, retry policy). [`AgentConfig`] holds the
//! collaborators of one scenario execution (oracle, device, interceptors,
//! tools). Both are built once and passed down explicitly.

use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use uiscout_config::AppConfig;
use uiscout_core::cache::DecisionCache;
use uiscout_core::device::Device;
use uiscout_core::event::EventBus;
use uiscout_core::oracle::DecisionOracle;
use uiscout_core::tool::{Tool, ToolRegistry};
use uiscout_oracle::RetryPolicy;
use crate::interceptor::{InitializationInterceptor, StepInterceptor};

/// History limit used when neither project nor scenario sets one.
pub const DEFAULT_HISTORY_LIMIT: usize = 10;

#[derive(Clone)]
pub struct ExecutionContext {
    pub cache: Arc<dyn DecisionCache>,
    pub events: Arc<EventBus>,
    pub cancel: CancellationToken,
    pub retry: RetryPolicy,
    pub screenshots_dir: PathBuf,
}

impl ExecutionContext {
    pub fn new(cache: Arc<dyn DecisionCache>) -> Self {
        Self {
            cache,
            events: Arc::new(EventBus::default()),
            cancel: CancellationToken::new(),
            retry: RetryPolicy::default(),
            screenshots_dir: std::env::temp_dir().join("uiscout").join("screenshots"),
        }
    }

    /// Cache, retry policy and screenshot directory as configured.
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            retry: RetryPolicy::from_config(&config.retry),
            screenshots_dir: config.screenshots_dir.clone(),
            ..Self::new(uiscout_cache::build_from_config(&config.cache))
        }
    }

    pub fn with_events(mut self, events: Arc<EventBus>) -> Self {
        self.events = events;
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_screenshots_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.screenshots_dir = dir.into();
        self
    }

    /// A context for one scenario: same shared state, child cancellation.
    ///
    /// Cancelling the parent cancels the child; cancelling the child leaves
    /// sibling scenarios running.
    pub fn child(&self) -> Self {
        Self {
            cancel: self.cancel.child_token(),
            ..self.clone()
        }
    }
}

impl std::fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("cache", &self.cache.name())
            .field("cancelled", &self.cancel.is_cancelled())
            .field("retry", &self.retry)
            .field("screenshots_dir", &self.screenshots_dir)
            .finish()
    }
}

/// Collaborators for the agents of one scenario execution.
///
/// Every task of a chain shares the same device handle, so side effects of
/// earlier tasks carry over.
#[derive(Clone)]
pub struct AgentConfig {
    pub oracle: Arc<dyn DecisionOracle>,
    pub device: Arc<dyn Device>,
    pub initialization_interceptors: Vec<Arc<InitializationInterceptor>>,
    pub step_interceptors: Vec<Arc<StepInterceptor>>,
    pub tools: ToolRegistry,
}

impl AgentConfig {
    pub fn new(oracle: Arc<dyn DecisionOracle>, device: Arc<dyn Device>) -> Self {
        Self {
            oracle,
            device,
            initialization_interceptors: Vec::new(),
            step_interceptors: Vec::new(),
            tools: ToolRegistry::new(),
        }
    }

    /// Register an initialization interceptor; later ones wrap earlier ones.
    pub fn with_initialization_interceptor(mut self, interceptor: Arc<InitializationInterceptor>) -> Self {
        self.initialization_interceptors.push(interceptor);
        self
    }

    /// Register a step interceptor; later ones wrap earlier ones.
    pub fn with_step_interceptor(mut self, interceptor: Arc<StepInterceptor>) -> Self {
        self.step_interceptors.push(interceptor);
        self
    }

    pub fn with_tool(mut self, tool: Arc<dyn Tool>) -> Self {
        self.tools.register(tool);
        self
    }
}

impl std::fmt::Debug for AgentConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentConfig")
            .field("oracle", &self.oracle.name())
            .field("initialization_interceptors", &self.initialization_interceptors.len())
            .field("step_interceptors", &self.step_interceptors.len())
            .field("tools", &self.tools)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uiscout_config::CacheStrategy;

    #[test]
    fn context_follows_config() {
        let mut config = AppConfig::default();
        config.cache.strategy = CacheStrategy::Disabled;
        config.retry.base_delay_secs = 2;
        config.screenshots_dir = PathBuf::from("shots");

        let ctx = ExecutionContext::from_config(&config);
        assert_eq!(ctx.cache.name(), "disabled");
        assert_eq!(ctx.retry.base_delay, std::time::Duration::from_secs(2));
        assert_eq!(ctx.screenshots_dir, PathBuf::from("shots"));
    }

    #[test]
    fn child_cancellation_stays_local() {
        let parent = ExecutionContext::from_config(&AppConfig::default());
        let child = parent.child();
        child.cancel.cancel();
        assert!(!parent.cancel.is_cancelled());

        let other = parent.child();
        parent.cancel.cancel();
        assert!(other.cancel.is_cancelled());
    }
}
