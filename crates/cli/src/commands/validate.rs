//! `uiscout validate`: Configuration checks.

use std::path::Path;
use uiscout_agent::PromptTemplate;
use uiscout_config::AppConfig;
use uiscout_workflow::ScenarioGraph;

pub async fn run(path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    println!("🔍 Validating configuration...");

    let config = match AppConfig::load(path) {
        Ok(config) => config,
        Err(e) => {
            println!("   ❌ Config error: {e}");
            return Err(e.into());
        }
    };
    println!("   ✅ Config parsed successfully");

    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    if let Some(text) = &config.prompt.user_prompt_template
        && let Err(e) = PromptTemplate::new(text.as_str())
    {
        errors.push(format!("[prompt]: {e}"));
    }

    match ScenarioGraph::from_config(&config) {
        Ok(graph) => {
            for scenario in graph.leaf_scenarios() {
                match graph.tasks_for(&scenario.id) {
                    Ok(tasks) => {
                        for task in &tasks {
                            if let Some(text) = &task.user_prompt_template
                                && let Err(e) = PromptTemplate::new(text.as_str())
                            {
                                errors.push(format!("scenario '{}': {e}", task.scenario_id));
                            }
                        }
                    }
                    Err(e) => errors.push(e.to_string()),
                }
            }
            if graph.leaf_scenarios().is_empty() && !graph.scenarios().is_empty() {
                errors.push("every scenario is part of a dependency cycle".into());
            }
        }
        Err(e) => errors.push(e.to_string()),
    }

    if config.scenarios.is_empty() {
        warnings.push("No scenarios defined".to_string());
    }
    for scenario in &config.scenarios {
        if scenario.goal.trim().is_empty() {
            warnings.push(format!("scenario '{}' has an empty goal", scenario.id));
        }
    }

    errors.sort();
    errors.dedup();
    if errors.is_empty() && warnings.is_empty() {
        println!("   ✅ All checks passed");
    } else {
        println!();
        for w in &warnings {
            println!("   ⚠️  {w}");
        }
        for e in &errors {
            println!("   ❌ {e}");
        }
    }

    println!();
    println!("   Scenarios: {}", config.scenarios.len());
    println!("   Variables: {}", config.variables.len());
    println!("   Cache:     {:?} ({})", config.cache.strategy, config.cache.dir.display());
    println!("   Retry:     base {}s", config.retry.base_delay_secs);

    if errors.is_empty() {
        Ok(())
    } else {
        Err(format!("{} validation error(s)", errors.len()).into())
    }
}
