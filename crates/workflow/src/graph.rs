//! The scenario dependency graph and task resolution.
//!
//! Dependencies form chains: every scenario has at most one predecessor.
//! Leaf scenarios (those nothing else depends on) are the runnable units;
//! running one executes its whole chain, oldest ancestor first.

use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::debug;
use uiscout_agent::prompt::resolve;
use uiscout_config::AppConfig;
use uiscout_core::action::ActionKind;
use uiscout_core::error::{Error, Result};
use uiscout_core::scenario::{AgentTask, AiOptions, Scenario, Shard};
use crate::shard::shard;

/// Project-level values a scenario falls back to.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskDefaults {
    pub max_step: u32,
    pub max_retry: u32,
    pub ai_options: AiOptions,
    pub user_prompt_template: Option<String>,
    /// Substituted into goals
    pub variables: BTreeMap<String, String>,
}

impl TaskDefaults {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            max_step: config.default_max_step,
            max_retry: config.default_max_retry,
            ai_options: config.ai.to_options(),
            user_prompt_template: config.prompt.user_prompt_template.clone(),
            variables: config.variables.clone(),
        }
    }
}

impl Default for TaskDefaults {
    fn default() -> Self {
        Self {
            max_step: 10,
            max_retry: 3,
            ai_options: AiOptions::default(),
            user_prompt_template: None,
            variables: BTreeMap::new(),
        }
    }
}

/// The task chain of one runnable scenario.
#[derive(Debug, Clone, PartialEq)]
pub struct ScenarioPlan {
    pub scenario_id: String,
    pub tasks: Vec<AgentTask>,
}

#[derive(Debug, Clone)]
pub struct ScenarioGraph {
    scenarios: Vec<Scenario>,
    index: HashMap<String, usize>,
    defaults: TaskDefaults,
}

impl ScenarioGraph {
    /// Build a graph; scenario ids must be unique.
    pub fn new(scenarios: Vec<Scenario>, defaults: TaskDefaults) -> Result<Self> {
        let mut index = HashMap::with_capacity(scenarios.len());
        for (i, scenario) in scenarios.iter().enumerate() {
            if index.insert(scenario.id.clone(), i).is_some() {
                return Err(Error::Scenario(format!("duplicate scenario id '{}'", scenario.id)));
            }
        }
        Ok(Self {
            scenarios,
            index,
            defaults,
        })
    }

    pub fn from_config(config: &AppConfig) -> Result<Self> {
        Self::new(config.scenarios.clone(), TaskDefaults::from_config(config))
    }

    pub fn scenario(&self, id: &str) -> Option<&Scenario> {
        self.index.get(id).map(|&i| &self.scenarios[i])
    }

    pub fn scenarios(&self) -> &[Scenario] {
        &self.scenarios
    }

    pub fn defaults(&self) -> &TaskDefaults {
        &self.defaults
    }

    /// Scenarios no other scenario depends on, in declaration order.
    pub fn leaf_scenarios(&self) -> Vec<&Scenario> {
        let depended_on: HashSet<&str> = self
            .scenarios
            .iter()
            .filter_map(|s| s.dependency.as_deref())
            .collect();
        self.scenarios
            .iter()
            .filter(|s| !depended_on.contains(s.id.as_str()))
            .collect()
    }

    /// The dependency chain of `id`, oldest ancestor first and `id` last.
    pub fn chain(&self, id: &str) -> Result<Vec<&Scenario>> {
        let mut chain = Vec::new();
        let mut seen = HashSet::new();
        let mut next = Some(id);

        while let Some(current) = next {
            if !seen.insert(current) {
                return Err(Error::Scenario(format!(
                    "dependency cycle through '{current}' while resolving '{id}'"
                )));
            }
            let scenario = self.scenario(current).ok_or_else(|| {
                if current == id {
                    Error::Scenario(format!("unknown scenario '{id}'"))
                } else {
                    Error::Scenario(format!("scenario '{id}' depends on unknown scenario '{current}'"))
                }
            })?;
            chain.push(scenario);
            next = scenario.dependency.as_deref();
        }

        chain.reverse();
        Ok(chain)
    }

    /// One [`AgentTask`] per scenario of the chain ending in `id`.
    pub fn tasks_for(&self, id: &str) -> Result<Vec<AgentTask>> {
        let tasks = self
            .chain(id)?
            .into_iter()
            .map(|scenario| self.to_task(scenario))
            .collect::<Result<Vec<_>>>()?;
        debug!(scenario_id = id, tasks = tasks.len(), "Resolved task chain");
        Ok(tasks)
    }

    /// Resolve one scenario against the project defaults.
    pub fn to_task(&self, scenario: &Scenario) -> Result<AgentTask> {
        let additional_actions = scenario
            .additional_actions
            .iter()
            .map(|name| {
                ActionKind::from_name(name).ok_or_else(|| {
                    Error::Scenario(format!(
                        "scenario '{}' allows unknown action '{name}'",
                        scenario.id
                    ))
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let ai_options = match &scenario.ai_options {
            Some(overrides) => self.defaults.ai_options.merge(overrides),
            None => self.defaults.ai_options.clone(),
        };

        Ok(AgentTask {
            scenario_id: scenario.id.clone(),
            goal: resolve(&scenario.goal, Some(&self.defaults.variables)),
            max_step: scenario.max_step.unwrap_or(self.defaults.max_step),
            max_retry: scenario.max_retry.unwrap_or(self.defaults.max_retry),
            additional_actions,
            image_assertions: scenario.image_assertions.clone(),
            initialization: scenario.initialization.clone(),
            cache_disabled: scenario.cache_disabled,
            user_prompt_template: scenario
                .user_prompt_template
                .clone()
                .or_else(|| self.defaults.user_prompt_template.clone()),
            ai_options,
        })
    }

    /// The task chains of the leaf scenarios selected by `selected`.
    pub fn plan(&self, selected: Shard) -> Result<Vec<ScenarioPlan>> {
        let leaves = self.leaf_scenarios();
        shard(&leaves, selected)
            .iter()
            .map(|scenario| {
                Ok(ScenarioPlan {
                    scenario_id: scenario.id.clone(),
                    tasks: self.tasks_for(&scenario.id)?,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn graph(scenarios: Vec<Scenario>) -> ScenarioGraph {
        ScenarioGraph::new(scenarios, TaskDefaults::default()).unwrap()
    }

    #[test]
    fn chain_is_oldest_first() {
        let g = graph(vec![
            Scenario::new("login", "Log in"),
            Scenario::new("profile", "Open profile").depends_on("login"),
            Scenario::new("logout", "Log out").depends_on("profile"),
        ]);
        let ids: Vec<&str> = g.chain("logout").unwrap().iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["login", "profile", "logout"]);
        assert_eq!(g.chain("login").unwrap().len(), 1);
    }

    #[test]
    fn dependent_scenario_yields_two_tasks() {
        let g = graph(vec![
            Scenario::new("a", "First"),
            Scenario::new("b", "Second").depends_on("a"),
        ]);
        let tasks = g.tasks_for("b").unwrap();
        assert_eq!(tasks.len(), 2);
        assert_eq!(tasks[0].scenario_id, "a");
        assert_eq!(tasks[1].scenario_id, "b");
        assert_eq!(g.tasks_for("a").unwrap().len(), 1);
    }

    #[test]
    fn only_leaves_are_runnable() {
        let g = graph(vec![
            Scenario::new("a", "First"),
            Scenario::new("b", "Second").depends_on("a"),
            Scenario::new("c", "Standalone"),
        ]);
        let leaves: Vec<&str> = g.leaf_scenarios().iter().map(|s| s.id.as_str()).collect();
        assert_eq!(leaves, vec!["b", "c"]);
    }

    #[test]
    fn cycles_and_missing_dependencies_are_errors() {
        let g = graph(vec![
            Scenario::new("a", "First").depends_on("b"),
            Scenario::new("b", "Second").depends_on("a"),
            Scenario::new("c", "Orphan").depends_on("ghost"),
        ]);
        assert!(g.chain("a").unwrap_err().to_string().contains("cycle"));
        assert!(g.chain("c").unwrap_err().to_string().contains("ghost"));
        assert!(g.chain("nope").unwrap_err().to_string().contains("unknown scenario 'nope'"));
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let result = ScenarioGraph::new(
            vec![Scenario::new("a", "One"), Scenario::new("a", "Two")],
            TaskDefaults::default(),
        );
        assert!(result.is_err());
    }

    #[test]
    fn task_falls_back_to_project_defaults() {
        let mut defaults = TaskDefaults {
            max_step: 7,
            max_retry: 1,
            ai_options: AiOptions {
                temperature: Some(0.2),
                historical_step_limit: Some(5),
                extra_body: json!({"seed": 1, "top_p": 0.9}).as_object().cloned(),
            },
            user_prompt_template: Some("project template".into()),
            variables: BTreeMap::new(),
        };
        defaults.variables.insert("user".into(), "alice".into());

        let mut scenario = Scenario::new("login", "Log in as {{user}}");
        scenario.max_retry = Some(0);
        scenario.additional_actions = vec!["dpadUp".into()];
        scenario.ai_options = Some(AiOptions {
            temperature: Some(0.7),
            historical_step_limit: None,
            extra_body: json!({"seed": 2}).as_object().cloned(),
        });

        let g = ScenarioGraph::new(vec![scenario], defaults).unwrap();
        let task = g.tasks_for("login").unwrap().remove(0);

        assert_eq!(task.goal, "Log in as alice");
        assert_eq!(task.max_step, 7);
        assert_eq!(task.max_retry, 0);
        assert_eq!(task.additional_actions, vec![ActionKind::DpadUp]);
        assert_eq!(task.user_prompt_template.as_deref(), Some("project template"));
        assert_eq!(task.ai_options.temperature, Some(0.7));
        assert_eq!(task.ai_options.historical_step_limit, Some(5));
        let body = task.ai_options.extra_body.unwrap();
        assert_eq!(body["seed"], json!(2));
        assert_eq!(body["top_p"], json!(0.9));
    }

    #[test]
    fn unknown_additional_action_is_an_error() {
        let mut scenario = Scenario::new("a", "Goal");
        scenario.additional_actions = vec!["Teleport".into()];
        let g = graph(vec![scenario]);
        assert!(g.tasks_for("a").unwrap_err().to_string().contains("Teleport"));
    }

    #[test]
    fn plan_covers_the_selected_shard() {
        let g = graph(vec![
            Scenario::new("a", "First"),
            Scenario::new("b", "Second").depends_on("a"),
            Scenario::new("c", "Third"),
            Scenario::new("d", "Fourth"),
        ]);
        let first = g.plan(Shard::new(1, 2).unwrap()).unwrap();
        let second = g.plan(Shard::new(2, 2).unwrap()).unwrap();
        assert_eq!(first.len() + second.len(), 3);
        assert_eq!(first[0].scenario_id, "b");
        assert_eq!(first[0].tasks.len(), 2);
        assert_eq!(g.plan(Shard::all()).unwrap().len(), 3);
    }
}
