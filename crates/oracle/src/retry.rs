//! Rate-limit retry around a decision oracle.
//!
//! When the oracle is throttled the same call is repeated after
//! `base * 2^n`, where `n` counts the consecutive rate limits of this call.
//! Waits observe the cancellation token. Decisions are retried for as long
//! as the oracle keeps rate limiting; image assertions have a fixed budget
//! covering every transient failure, after which the error propagates.

use async_trait::async_trait;
use chrono::Utc;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uiscout_config::RetryConfig;
use uiscout_core::error::OracleError;
use uiscout_core::event::{EventBus, ExecutionEvent};
use uiscout_core::oracle::{
    Decision, DecisionInput, DecisionOracle, ImageAssertionRequest, ImageAssertionResult,
    ScenarioDraft, ScenarioGenerationRequest,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub base_delay: Duration,
    pub max_image_assertion_retries: u32,
}

impl RetryPolicy {
    /// Wait before retry number `retry_count` (0-based).
    pub fn delay_for(&self, retry_count: u32) -> Duration {
        let factor = 2u32.checked_pow(retry_count).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor)
    }

    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            base_delay: config.base_delay(),
            max_image_assertion_retries: config.image_assertion_max_retries,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(10),
            max_image_assertion_retries: 6,
        }
    }
}

/// Budget for one wrapped call.
#[derive(Clone, Copy)]
enum Budget {
    /// Retry rate limits forever, fail fast on anything else
    RateLimitsOnly,
    /// Retry any transient error, at most this many times
    Transient(u32),
}

/// An oracle that retries its inner oracle under the [`RetryPolicy`].
pub struct RetryingOracle {
    inner: Arc<dyn DecisionOracle>,
    policy: RetryPolicy,
    cancel: CancellationToken,
    events: Option<Arc<EventBus>>,
}

impl RetryingOracle {
    pub fn new(inner: Arc<dyn DecisionOracle>, policy: RetryPolicy, cancel: CancellationToken) -> Self {
        Self {
            inner,
            policy,
            cancel,
            events: None,
        }
    }

    /// Publish a `RetryScheduled` event before every backoff.
    pub fn with_events(mut self, events: Arc<EventBus>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    async fn call<T, F, Fut>(&self, scenario_id: &str, budget: Budget, mut op: F) -> Result<T, OracleError>
    where
        T: Send,
        F: FnMut() -> Fut + Send,
        Fut: Future<Output = Result<T, OracleError>> + Send,
    {
        let mut rate_limits: u32 = 0;
        let mut retries: u32 = 0;

        loop {
            let result = tokio::select! {
                _ = self.cancel.cancelled() => return Err(OracleError::Cancelled),
                r = op() => r,
            };

            let error = match result {
                Ok(value) => return Ok(value),
                Err(e) => e,
            };

            let retryable = match budget {
                Budget::RateLimitsOnly => error.is_rate_limit(),
                Budget::Transient(_) => error.is_transient(),
            };
            if !retryable {
                return Err(error);
            }
            if let Budget::Transient(max) = budget
                && retries >= max
            {
                warn!(scenario_id, max_retries = max, error = %error, "Oracle retry budget exhausted");
                return Err(OracleError::RetriesExhausted {
                    max_retries: max,
                    last_error: error.to_string(),
                });
            }
            retries += 1;

            let delay = if error.is_rate_limit() {
                let delay = self.policy.delay_for(rate_limits);
                rate_limits = rate_limits.saturating_add(1);
                delay
            } else {
                Duration::ZERO
            };

            warn!(
                scenario_id,
                attempt = retries,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "Oracle call failed, retrying"
            );
            if let Some(events) = &self.events {
                events.publish(ExecutionEvent::RetryScheduled {
                    scenario_id: scenario_id.to_string(),
                    attempt: retries,
                    delay_ms: delay.as_millis() as u64,
                    timestamp: Utc::now(),
                });
            }

            if !delay.is_zero() {
                tokio::select! {
                    _ = self.cancel.cancelled() => {
                        debug!(scenario_id, "Backoff interrupted by cancellation");
                        return Err(OracleError::Cancelled);
                    }
                    _ = tokio::time::sleep(delay) => {}
                }
            }
        }
    }
}

#[async_trait]
impl DecisionOracle for RetryingOracle {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn decide(&self, input: &DecisionInput) -> Result<Decision, OracleError> {
        let inner = &self.inner;
        self.call(&input.scenario_id, Budget::RateLimitsOnly, move || inner.decide(input))
            .await
    }

    async fn assert_image(
        &self,
        request: &ImageAssertionRequest,
    ) -> Result<Vec<ImageAssertionResult>, OracleError> {
        let inner = &self.inner;
        let budget = Budget::Transient(self.policy.max_image_assertion_retries);
        self.call(&request.scenario_id, budget, move || inner.assert_image(request))
            .await
    }

    async fn generate_scenarios(
        &self,
        request: &ScenarioGenerationRequest,
    ) -> Result<Vec<ScenarioDraft>, OracleError> {
        let inner = &self.inner;
        self.call("", Budget::RateLimitsOnly, move || inner.generate_scenarios(request))
            .await
    }
}
