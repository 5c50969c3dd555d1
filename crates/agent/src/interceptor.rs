//! Interceptor chains around task initialization and each agent step.
//!
//! Interceptors nest like an onion: the last one registered runs outermost.
//! With `[A, B]` registered, a call runs B's "before" code, then A's, then
//! the terminal operation, then A's "after" code, then B's.
//!
//! An interceptor receives a [`Chain`] it can [`proceed`](Chain::proceed)
//! with at most once, since `proceed` consumes the chain. Returning without
//! proceeding short-circuits everything inside it.

use async_trait::async_trait;
use futures::future::BoxFuture;
use std::sync::Arc;
use uiscout_core::error::Result;
use uiscout_core::scenario::InitializationStep;

/// Middleware around an operation from `I` to `O`.
#[async_trait]
pub trait Interceptor<I, O>: Send + Sync
where
    I: Send + 'static,
    O: Send + 'static,
{
    async fn intercept(&self, input: I, chain: Chain<'_, I, O>) -> O;
}

/// The operation at the center of a chain.
#[async_trait]
pub trait Terminal<I, O>: Send + Sync
where
    I: Send + 'static,
    O: Send + 'static,
{
    async fn run(&self, input: I) -> O;
}

/// Cursor over the interceptors that have not run yet.
pub struct Chain<'a, I, O> {
    interceptors: &'a [Arc<dyn Interceptor<I, O>>],
    terminal: &'a dyn Terminal<I, O>,
}

impl<'a, I, O> Chain<'a, I, O>
where
    I: Send + 'static,
    O: Send + 'static,
{
    pub fn new(interceptors: &'a [Arc<dyn Interceptor<I, O>>], terminal: &'a dyn Terminal<I, O>) -> Self {
        Self {
            interceptors,
            terminal,
        }
    }

    /// Run the next interceptor inward, or the terminal operation.
    pub fn proceed(self, input: I) -> BoxFuture<'a, O> {
        match self.interceptors.split_last() {
            Some((outer, rest)) => outer.intercept(
                input,
                Chain {
                    interceptors: rest,
                    terminal: self.terminal,
                },
            ),
            None => self.terminal.run(input),
        }
    }

    /// Interceptors still to run, including the next one.
    pub fn remaining(&self) -> usize {
        self.interceptors.len()
    }
}

/// What the initialization chain operates on.
#[derive(Debug, Clone, PartialEq)]
pub struct InitializationInput {
    pub scenario_id: String,
    pub steps: Vec<InitializationStep>,
    /// App waited on after the steps ran
    pub app_id: Option<String>,
}

/// What the step chain operates on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepInput {
    pub scenario_id: String,
    /// 1-based iteration of the loop, bounded by `max_step`
    pub iteration: u32,
    pub max_step: u32,
}

/// How a step left the task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    Continue,
    GoalAchieved,
    Failed,
}

pub type InitializationInterceptor = dyn Interceptor<InitializationInput, Result<()>>;
pub type StepInterceptor = dyn Interceptor<StepInput, Result<StepOutcome>>;
