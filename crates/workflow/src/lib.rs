//! Scenario scheduling and execution.
//!
//! - [`graph`]: dependency chains, leaf scenarios and task resolution
//! - [`shard`]: deterministic partition of the runnable scenarios
//! - [`executor`]: the per-scenario state machine running a task chain
//! - [`runner`]: runs every scenario of a shard

pub mod executor;
pub mod graph;
pub mod runner;
pub mod shard;

pub use executor::{AttemptReport, ScenarioExecutor, ScenarioReport, TaskReport};
pub use graph::{ScenarioGraph, ScenarioPlan, TaskDefaults};
pub use runner::ProjectRunner;
pub use shard::shard;
