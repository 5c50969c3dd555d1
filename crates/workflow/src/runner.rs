//! Runs every runnable scenario of a shard.

use std::sync::Arc;
use tracing::{info, warn};
use uiscout_agent::{AgentConfig, ExecutionContext};
use uiscout_core::scenario::Shard;
use crate::executor::{ScenarioExecutor, ScenarioReport};
use crate::graph::ScenarioGraph;
use crate::shard::shard;

/// Executes the leaf scenarios of one shard, one after another.
///
/// Each scenario gets its own [`ScenarioExecutor`] with a child cancellation
/// token; a failing scenario does not affect the others.
#[derive(Debug)]
pub struct ProjectRunner {
    graph: Arc<ScenarioGraph>,
    config: AgentConfig,
    ctx: ExecutionContext,
}

impl ProjectRunner {
    pub fn new(graph: Arc<ScenarioGraph>, config: AgentConfig, ctx: ExecutionContext) -> Self {
        Self { graph, config, ctx }
    }

    pub async fn run(&self, selected: Shard) -> Vec<ScenarioReport> {
        let leaves: Vec<String> = self
            .graph
            .leaf_scenarios()
            .into_iter()
            .map(|s| s.id.clone())
            .collect();
        let ids = shard(&leaves, selected);
        info!(shard = %selected, scenarios = ids.len(), total = leaves.len(), "Running shard");

        let mut reports = Vec::with_capacity(ids.len());
        for id in ids {
            if self.ctx.cancel.is_cancelled() {
                warn!(scenario_id = %id, "Run cancelled, skipping remaining scenarios");
                break;
            }
            let executor = ScenarioExecutor::new(self.graph.clone(), self.config.clone(), self.ctx.child());
            let report = match executor.execute(id).await {
                Ok(report) => report,
                Err(e) => ScenarioReport::not_started(id.as_str(), &e),
            };
            info!(
                scenario_id = %id,
                state = %report.state,
                steps = report.step_count(),
                "Scenario finished"
            );
            reports.push(report);
        }
        reports
    }
}
