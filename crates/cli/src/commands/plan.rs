//! `uiscout plan`: Show the task chains of a shard.

use std::path::Path;
use uiscout_config::AppConfig;
use uiscout_core::scenario::Shard;
use uiscout_workflow::ScenarioGraph;

pub async fn run(path: Option<&Path>, shard: Shard) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load(path)?;
    tracing::debug!(%shard, scenarios = config.scenarios.len(), "Planning shard");
    let graph = ScenarioGraph::from_config(&config)?;
    let plans = graph.plan(shard)?;

    println!(
        "Shard {shard}: {} of {} runnable scenarios",
        plans.len(),
        graph.leaf_scenarios().len()
    );
    for plan in &plans {
        println!();
        println!("▶ {}", plan.scenario_id);
        for (i, task) in plan.tasks.iter().enumerate() {
            println!("  {}. [{}] {}", i + 1, task.scenario_id, task.goal);
            println!(
                "     max_step={} max_retry={} cache={}",
                task.max_step,
                task.max_retry,
                if task.cache_disabled { "off" } else { "on" }
            );
            if !task.additional_actions.is_empty() {
                let extra: Vec<&str> = task.additional_actions.iter().map(|k| k.name()).collect();
                println!("     extra actions: {}", extra.join(", "));
            }
            if !task.image_assertions.is_empty() {
                println!("     image assertions: {}", task.image_assertions.len());
            }
        }
    }

    Ok(())
}
