//! The agent loop that drives one task on a device.
//!
//! Each iteration follows a **perceive → decide → act** cycle:
//!
//! 1. **Perceive** the screen (view tree, element list, screenshot)
//! 2. **Build the prompt** from the goal, history and hints
//! 3. **Decide**: replay a cached decision or ask the oracle
//! 4. **Validate** the decision against the allowed actions
//! 5. **Act** on the device, call a tool, or check the goal
//!
//! The loop ends on `GoalAchieved`, `Failed` or when the step budget runs out.
//! Initialization and every step run inside interceptor chains.

pub mod dispatch;
pub mod interceptor;
pub mod loop_runner;
pub mod prompt;
pub mod runtime;

pub use dispatch::{ActionDispatcher, DispatchedAction};
pub use interceptor::{
    Chain, InitializationInput, InitializationInterceptor, Interceptor, StepInput,
    StepInterceptor, StepOutcome, Terminal,
};
pub use loop_runner::{Agent, TaskOutcome};
pub use prompt::{DEFAULT_TEMPLATE, PromptInput, PromptTemplate, resolve};
pub use runtime::{AgentConfig, DEFAULT_HISTORY_LIMIT, ExecutionContext};
