//! Runs one scenario: its dependency chain of tasks, retries and cleanup.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info, warn};
use uiscout_agent::{Agent, AgentConfig, ExecutionContext, TaskOutcome};
use uiscout_core::error::{Error, Result};
use uiscout_core::event::{ExecutionEvent, ScenarioState};
use uiscout_core::scenario::AgentTask;
use uiscout_core::step::Step;
use crate::graph::ScenarioGraph;

/// One run of a task's agent loop.
#[derive(Debug, Clone)]
pub struct AttemptReport {
    /// 1-based
    pub attempt: u32,
    /// `None` when the attempt ended with an error
    pub outcome: Option<TaskOutcome>,
    pub error: Option<String>,
    pub steps: Vec<Step>,
}

#[derive(Debug, Clone)]
pub struct TaskReport {
    pub scenario_id: String,
    pub attempts: Vec<AttemptReport>,
}

impl TaskReport {
    pub fn succeeded(&self) -> bool {
        self.attempts
            .last()
            .and_then(|a| a.outcome)
            .is_some_and(|o| o.is_success())
    }
}

/// Everything recorded while executing one scenario.
#[derive(Debug, Clone)]
pub struct ScenarioReport {
    pub scenario_id: String,
    pub state: ScenarioState,
    /// One entry per task that started, oldest ancestor first
    pub tasks: Vec<TaskReport>,
    /// The error that stopped the scenario, if any
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl ScenarioReport {
    /// A report for a scenario that could not start.
    pub fn not_started(scenario_id: impl Into<String>, error: &Error) -> Self {
        let now = Utc::now();
        Self {
            scenario_id: scenario_id.into(),
            state: ScenarioState::Failed,
            tasks: Vec::new(),
            error: Some(error.to_string()),
            started_at: now,
            finished_at: now,
        }
    }

    pub fn is_success(&self) -> bool {
        self.state == ScenarioState::Success
    }

    pub fn step_count(&self) -> usize {
        self.tasks
            .iter()
            .flat_map(|t| &t.attempts)
            .map(|a| a.steps.len())
            .sum()
    }
}

/// State machine for one scenario execution.
///
/// `Idle → Running → {Success, Failed, Cancelled}`. The state is published
/// on a watch channel and as [`ExecutionEvent::ScenarioStateChanged`].
pub struct ScenarioExecutor {
    graph: Arc<ScenarioGraph>,
    config: AgentConfig,
    ctx: ExecutionContext,
    state: watch::Sender<ScenarioState>,
}

impl ScenarioExecutor {
    pub fn new(graph: Arc<ScenarioGraph>, config: AgentConfig, ctx: ExecutionContext) -> Self {
        let (state, _) = watch::channel(ScenarioState::Idle);
        Self {
            graph,
            config,
            ctx,
            state,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<ScenarioState> {
        self.state.subscribe()
    }

    pub fn state(&self) -> ScenarioState {
        *self.state.borrow()
    }

    /// Abort the in-flight step and stop the chain.
    pub fn cancel(&self) {
        self.ctx.cancel.cancel();
    }

    fn transition(&self, scenario_id: &str, state: ScenarioState) {
        info!(scenario_id, %state, "Scenario state changed");
        self.state.send_replace(state);
        self.ctx.events.publish(ExecutionEvent::ScenarioStateChanged {
            scenario_id: scenario_id.to_string(),
            state,
            timestamp: Utc::now(),
        });
    }

    /// Run the chain ending in `scenario_id`.
    ///
    /// Only an unresolvable chain is returned as an error; everything that
    /// happens once tasks run ends up in the report.
    pub async fn execute(&self, scenario_id: &str) -> Result<ScenarioReport> {
        let started_at = Utc::now();
        self.transition(scenario_id, ScenarioState::Running);

        let tasks = match self.graph.tasks_for(scenario_id) {
            Ok(tasks) => tasks,
            Err(e) => {
                error!(scenario_id, error = %e, "Cannot resolve scenario");
                self.transition(scenario_id, ScenarioState::Failed);
                return Err(e);
            }
        };

        let mut report = ScenarioReport {
            scenario_id: scenario_id.to_string(),
            state: ScenarioState::Running,
            tasks: Vec::with_capacity(tasks.len()),
            error: None,
            started_at,
            finished_at: started_at,
        };

        let last = tasks.len() - 1;
        let mut final_state = ScenarioState::Failed;
        for (i, task) in tasks.iter().enumerate() {
            if self.ctx.cancel.is_cancelled() {
                final_state = ScenarioState::Cancelled;
                break;
            }

            let mut task_report = TaskReport {
                scenario_id: task.scenario_id.clone(),
                attempts: Vec::new(),
            };
            let result = self.run_task(task, &mut task_report).await;
            let succeeded = task_report.succeeded();
            report.tasks.push(task_report);

            match result {
                Ok(()) if i == last => {
                    if succeeded {
                        final_state = ScenarioState::Success;
                    }
                }
                Ok(()) => {
                    if !succeeded {
                        warn!(
                            scenario_id,
                            task = %task.scenario_id,
                            "Dependency task failed, continuing with the chain"
                        );
                    }
                }
                Err(Error::Cancelled) => {
                    final_state = ScenarioState::Cancelled;
                    break;
                }
                Err(e) => {
                    error!(scenario_id, task = %task.scenario_id, error = %e, "Scenario aborted");
                    report.error = Some(e.to_string());
                    break;
                }
            }
        }

        if final_state == ScenarioState::Cancelled {
            warn!(scenario_id, "Scenario cancelled, closing device");
            report.error = Some(Error::Cancelled.to_string());
            self.config.device.close().await;
        } else {
            self.cleanup(scenario_id).await;
        }

        report.state = final_state;
        report.finished_at = Utc::now();
        self.transition(scenario_id, final_state);
        Ok(report)
    }

    /// Run `task` until it succeeds or its retries run out.
    ///
    /// Returns an error only for fatal conditions (device failures,
    /// cancellation, broken templates); ordinary failures are attempts.
    async fn run_task(&self, task: &AgentTask, report: &mut TaskReport) -> Result<()> {
        let attempts = task.max_retry.saturating_add(1);
        for attempt in 1..=attempts {
            self.ctx.events.publish(ExecutionEvent::TaskStarted {
                scenario_id: task.scenario_id.clone(),
                attempt,
                timestamp: Utc::now(),
            });
            info!(scenario_id = %task.scenario_id, attempt, max_attempts = attempts, "Running task");

            let agent = Agent::new(task.clone(), self.config.clone(), self.ctx.clone())?;
            let result = agent.run().await;
            let steps = agent.steps().await;

            let (outcome, err) = match result {
                Ok(outcome) => (Some(outcome), None),
                Err(e) => (None, Some(e)),
            };
            let success = outcome.is_some_and(|o| o.is_success());
            self.ctx.events.publish(ExecutionEvent::TaskFinished {
                scenario_id: task.scenario_id.clone(),
                attempt,
                success,
                timestamp: Utc::now(),
            });
            report.attempts.push(AttemptReport {
                attempt,
                outcome,
                error: err.as_ref().map(ToString::to_string),
                steps,
            });

            if let Some(e) = err {
                return Err(e);
            }
            if success {
                return Ok(());
            }
            warn!(scenario_id = %task.scenario_id, attempt, ?outcome, "Task attempt failed");
        }
        Ok(())
    }

    async fn cleanup(&self, scenario_id: &str) {
        let Some(scenario) = self.graph.scenario(scenario_id) else {
            return;
        };
        let commands = scenario.cleanup.to_commands();
        if commands.is_empty() || self.config.device.is_closed() {
            return;
        }
        if let Err(e) = self.config.device.execute_commands(&commands).await {
            warn!(scenario_id, error = %e, "Cleanup failed");
        }
    }
}

impl std::fmt::Debug for ScenarioExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScenarioExecutor")
            .field("state", &self.state())
            .field("config", &self.config)
            .finish()
    }
}
