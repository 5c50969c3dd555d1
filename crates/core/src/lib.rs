//! # uiscout Core
//!
//! Domain types, traits, and error definitions for the uiscout scenario
//! engine. This crate has no framework dependencies: it defines the model
//! that the cache, oracle, agent and workflow crates implement against.
//!
//! The two external collaborators, the decision oracle and the device, are
//! traits here. Concrete clients and drivers are plugged in by the embedding
//! application.

pub mod error;
pub mod action;
pub mod device;
pub mod step;
pub mod scenario;
pub mod oracle;
pub mod tool;
pub mod cache;
pub mod event;

// Re-export key types at crate root for ergonomics
pub use error::{
    ActionValidationError, CacheError, DeviceError, Error, OracleError, Result, TemplateError,
    ToolError,
};
pub use action::{Action, ActionKind, ArgumentKind, DpadKey};
pub use device::{Bounds, Device, DeviceCommand, DeviceOs, Element, KeyCode, ScrollDirection};
pub use step::{ContextHolder, Step, history_window_start};
pub use scenario::{
    AgentTask, AiOptions, CleanupSpec, ImageAssertion, InitializationStep, Scenario, Shard,
};
pub use oracle::{
    Decision, DecisionInput, DecisionOracle, ImageAssertionRequest, ImageAssertionResult,
    ScenarioDraft, ScenarioGenerationRequest,
};
pub use tool::{Tool, ToolDefinition, ToolRegistry, ToolResult};
pub use cache::{CACHE_SCHEMA_VERSION, CacheKey, CachedDecision, DecisionCache};
pub use event::{EventBus, ExecutionEvent, ScenarioState};
