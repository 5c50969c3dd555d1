//! The per-task perceive/decide/act loop.

use async_trait::async_trait;
use chrono::Utc;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uiscout_cache::DisabledCache;
use uiscout_core::action::Action;
use uiscout_core::cache::{CacheKey, CachedDecision, DecisionCache};
use uiscout_core::device::Element;
use uiscout_core::error::{DeviceError, Error, OracleError, Result};
use uiscout_core::event::ExecutionEvent;
use uiscout_core::oracle::{DecisionInput, DecisionOracle, ImageAssertionRequest};
use uiscout_core::scenario::AgentTask;
use uiscout_core::step::{ContextHolder, Step};
use uiscout_oracle::RetryingOracle;
use uuid::Uuid;
use crate::dispatch::ActionDispatcher;
use crate::interceptor::{Chain, InitializationInput, StepInput, StepOutcome, Terminal};
use crate::prompt::{PromptInput, PromptTemplate};
use crate::runtime::{AgentConfig, DEFAULT_HISTORY_LIMIT, ExecutionContext};

/// How a task ended without an engine error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskOutcome {
    GoalAchieved,
    Failed,
    /// The step budget ran out before a terminal action
    StepsExhausted,
}

impl TaskOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::GoalAchieved)
    }
}

struct TaskState {
    context: ContextHolder,
    /// Explanation from the last failed image assertion, shown as a hint
    assertion_feedback: Option<String>,
}

/// What the device showed at the start of a step.
struct Screen {
    ui_tree: String,
    focused_tree: String,
    elements: Vec<Element>,
    screenshot: Option<PathBuf>,
}

/// Runs one [`AgentTask`] to completion.
pub struct Agent {
    task: AgentTask,
    config: AgentConfig,
    ctx: ExecutionContext,
    oracle: RetryingOracle,
    cache: Arc<dyn DecisionCache>,
    template: PromptTemplate,
    dispatcher: ActionDispatcher,
    history_limit: usize,
    state: Mutex<TaskState>,
}

impl Agent {
    /// Build an agent, validating the task's prompt template.
    pub fn new(task: AgentTask, config: AgentConfig, ctx: ExecutionContext) -> Result<Self> {
        let template = match &task.user_prompt_template {
            Some(text) => PromptTemplate::new(text.as_str())?,
            None => PromptTemplate::default(),
        };
        let cache: Arc<dyn DecisionCache> = if task.cache_disabled {
            Arc::new(DisabledCache)
        } else {
            ctx.cache.clone()
        };
        let oracle = RetryingOracle::new(config.oracle.clone(), ctx.retry, ctx.cancel.clone())
            .with_events(ctx.events.clone());
        let dispatcher = ActionDispatcher::new(task.allowed_actions(), config.tools.definitions());
        let history_limit = task
            .ai_options
            .historical_step_limit
            .unwrap_or(DEFAULT_HISTORY_LIMIT);
        let state = Mutex::new(TaskState {
            context: ContextHolder::new(task.goal.clone(), task.max_step),
            assertion_feedback: None,
        });

        Ok(Self {
            task,
            config,
            ctx,
            oracle,
            cache,
            template,
            dispatcher,
            history_limit,
            state,
        })
    }

    pub fn task(&self) -> &AgentTask {
        &self.task
    }

    /// Snapshot of the steps recorded so far.
    pub async fn steps(&self) -> Vec<Step> {
        self.state.lock().await.context.steps().to_vec()
    }

    /// Initialize, then loop until a terminal action or the step budget ends.
    ///
    /// Device failures and cancellation are returned as errors; everything
    /// the oracle gets wrong is recorded as a step instead.
    pub async fn run(&self) -> Result<TaskOutcome> {
        let scenario_id = self.task.scenario_id.as_str();
        info!(scenario_id, max_step = self.task.max_step, "Starting task");

        let init = InitializationInput {
            scenario_id: scenario_id.to_string(),
            steps: self.task.initialization.clone(),
            app_id: self.task.app_id().map(str::to_string),
        };
        Chain::new(&self.config.initialization_interceptors, &InitializationTerminal { agent: self })
            .proceed(init)
            .await?;

        let terminal = StepTerminal { agent: self };
        for iteration in 1..=self.task.max_step {
            if self.ctx.cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            let input = StepInput {
                scenario_id: scenario_id.to_string(),
                iteration,
                max_step: self.task.max_step,
            };
            match Chain::new(&self.config.step_interceptors, &terminal).proceed(input).await? {
                StepOutcome::Continue => {}
                StepOutcome::GoalAchieved => {
                    info!(scenario_id, step = iteration, "Goal achieved");
                    return Ok(TaskOutcome::GoalAchieved);
                }
                StepOutcome::Failed => {
                    info!(scenario_id, step = iteration, "Oracle declared the goal unreachable");
                    return Ok(TaskOutcome::Failed);
                }
            }
        }

        warn!(scenario_id, max_step = self.task.max_step, "Step budget exhausted");
        Ok(TaskOutcome::StepsExhausted)
    }

    /// Await a device call unless the run is cancelled first.
    async fn guarded<T, F>(&self, fut: F) -> Result<T>
    where
        T: Send,
        F: Future<Output = std::result::Result<T, DeviceError>> + Send,
    {
        tokio::select! {
            _ = self.ctx.cancel.cancelled() => Err(Error::Cancelled),
            r = fut => r.map_err(Error::from),
        }
    }

    async fn initialize(&self, input: InitializationInput) -> Result<()> {
        let device = &self.config.device;
        for step in &input.steps {
            debug!(scenario_id = %input.scenario_id, ?step, "Running initialization step");
            self.guarded(device.execute_commands(&step.to_commands())).await?;
        }
        self.guarded(device.wait_for_app_to_settle(input.app_id.as_deref()))
            .await
    }

    async fn perceive(&self) -> Result<Screen> {
        let device = &self.config.device;
        let ui_tree = self.guarded(device.view_tree_string()).await?;
        let focused_tree = self.guarded(device.focused_tree_string()).await?;
        let elements = self.guarded(device.elements()).await?;

        let dir = self.ctx.screenshots_dir.join(&self.task.scenario_id);
        let path = dir.join(format!("{}.png", Uuid::new_v4()));
        let screenshot = match tokio::fs::create_dir_all(&dir).await {
            Ok(()) => match self.guarded(device.screenshot(&path)).await {
                Ok(()) => Some(path),
                Err(Error::Cancelled) => return Err(Error::Cancelled),
                Err(e) => {
                    warn!(scenario_id = %self.task.scenario_id, error = %e, "Screenshot failed");
                    None
                }
            },
            Err(e) => {
                warn!(dir = %dir.display(), error = %e, "Cannot create screenshot directory");
                None
            }
        };

        Ok(Screen {
            ui_tree,
            focused_tree,
            elements,
            screenshot,
        })
    }

    fn hints(&self, assertion_feedback: Option<&str>) -> Vec<String> {
        let mut hints: Vec<String> = self
            .task
            .image_assertions
            .iter()
            .map(|a| format!("Expected on screen when done: {}", a.assertion))
            .collect();
        if let Some(feedback) = assertion_feedback {
            hints.push(format!("Last check of the goal failed: {feedback}"));
        }
        hints
    }

    async fn record(&self, step: Step) {
        self.ctx.events.publish(ExecutionEvent::StepRecorded {
            scenario_id: self.task.scenario_id.clone(),
            action: step.action.as_ref().map(Action::name),
            cache_hit: step.cache_hit,
            timestamp: Utc::now(),
        });
        self.state.lock().await.context.add_step(step);
    }

    /// One perceive/decide/act cycle.
    async fn step(&self, input: StepInput) -> Result<StepOutcome> {
        let scenario_id = input.scenario_id.as_str();
        let screen = self.perceive().await?;

        let (prompt, current_step) = {
            let state = self.state.lock().await;
            let current_step = state.context.current_step();
            let hints = self.hints(state.assertion_feedback.as_deref());
            let element_list = screen
                .elements
                .iter()
                .map(Element::describe)
                .collect::<Vec<_>>()
                .join("\n");
            let prompt = self.template.format(&PromptInput {
                goal: &self.task.goal,
                current_step,
                max_step: self.task.max_step,
                steps: state.context.steps(),
                hints: &hints,
                history_limit: self.history_limit,
                ui_elements: &element_list,
                focused_tree: &screen.focused_tree,
            });
            (prompt, current_step)
        };

        let key = CacheKey::new(&screen.ui_tree, &prompt);
        let cached = self.cache.get(&key).await.filter(|cached| {
            let permitted = self.dispatcher.permits(&cached.action);
            if !permitted {
                debug!(
                    scenario_id,
                    cache_key = %key,
                    action = %cached.action,
                    "Ignoring cached action this task may not use"
                );
            }
            permitted
        });
        let (action, step) = match cached {
            Some(cached) => {
                debug!(scenario_id, step = current_step, cache_key = %key, "Decision cache hit");
                let step = cached.step.replayed().screenshot(screen.screenshot.clone());
                (cached.action, step)
            }
            None => {
                let decision_input = DecisionInput {
                    scenario_id: scenario_id.to_string(),
                    prompt,
                    ui_tree: screen.ui_tree.clone(),
                    focused_tree: screen.focused_tree.clone(),
                    elements: screen.elements.clone(),
                    screenshot_path: screen.screenshot.clone(),
                    actions: self.dispatcher.allowed().to_vec(),
                    tools: self.dispatcher.tools().to_vec(),
                    ai_options: self.task.ai_options.clone(),
                };
                let decision = match self.oracle.decide(&decision_input).await {
                    Ok(d) => d,
                    Err(OracleError::Cancelled) => return Err(Error::Cancelled),
                    Err(OracleError::ParseFailure(reason)) => {
                        warn!(scenario_id, step = current_step, %reason, "Unparsable oracle output");
                        let feedback = format!("Your last answer could not be parsed: {reason}");
                        self.record(Step::context(feedback).screenshot(screen.screenshot)).await;
                        return Ok(StepOutcome::Continue);
                    }
                    Err(e) => return Err(e.into()),
                };

                let dispatched = match self.dispatcher.dispatch(&decision, screen.elements.len()) {
                    Ok(d) => d,
                    Err(e) => {
                        warn!(scenario_id, step = current_step, error = %e, "Rejected oracle decision");
                        self.record(Step::context(e.to_string()).screenshot(screen.screenshot))
                            .await;
                        return Ok(StepOutcome::Continue);
                    }
                };

                let step = Step::with_action(dispatched.action.clone())
                    .memo(dispatched.memo)
                    .image_description(dispatched.image_description)
                    .cache_key(key.as_str())
                    .screenshot(screen.screenshot.clone());
                // Failed is never replayed, so retries get a fresh decision
                if !dispatched.action.is_failure_marker() {
                    self.cache
                        .put(&key, CachedDecision {
                            action: dispatched.action.clone(),
                            step: step.clone(),
                        })
                        .await;
                }
                (dispatched.action, step)
            }
        };

        info!(scenario_id, step = current_step, cache_hit = step.cache_hit, %action, "Applying action");
        self.apply(action, step, &screen).await
    }

    async fn apply(&self, action: Action, step: Step, screen: &Screen) -> Result<StepOutcome> {
        match &action {
            Action::GoalAchieved => self.check_goal(step, screen).await,
            Action::Failed => {
                self.record(step).await;
                Ok(StepOutcome::Failed)
            }
            Action::ExecuteTool { name, arguments } => {
                let feedback = match self.config.tools.execute(name, arguments.clone()).await {
                    Ok(result) if result.success => format!("Tool '{name}' returned: {}", result.output),
                    Ok(result) => format!("Tool '{name}' reported a failure: {}", result.output),
                    Err(e) => format!("Tool '{name}' could not run: {e}"),
                };
                self.record(step.feedback(feedback)).await;
                Ok(StepOutcome::Continue)
            }
            _ => {
                let commands = match action.to_commands(&screen.elements) {
                    Ok(c) => c,
                    Err(e) => {
                        self.record(Step::context(e.to_string()).screenshot(step.screenshot_path))
                            .await;
                        return Ok(StepOutcome::Continue);
                    }
                };
                let device = &self.config.device;
                self.guarded(device.execute_commands(&commands)).await?;
                self.guarded(device.wait_for_app_to_settle(self.task.app_id()))
                    .await?;
                self.record(step).await;
                Ok(StepOutcome::Continue)
            }
        }
    }

    /// Accept `GoalAchieved` only if every image assertion holds.
    async fn check_goal(&self, step: Step, screen: &Screen) -> Result<StepOutcome> {
        if self.task.image_assertions.is_empty() {
            self.record(step).await;
            return Ok(StepOutcome::GoalAchieved);
        }

        let request = ImageAssertionRequest {
            scenario_id: self.task.scenario_id.clone(),
            screenshots: screen.screenshot.iter().cloned().collect(),
            assertions: self.task.image_assertions.clone(),
            ai_options: self.task.ai_options.clone(),
        };
        let results = match self.oracle.assert_image(&request).await {
            Ok(r) => r,
            Err(OracleError::Cancelled) => return Err(Error::Cancelled),
            Err(e) => return Err(e.into()),
        };

        let failures: Vec<String> = self
            .task
            .image_assertions
            .iter()
            .filter_map(|expected| {
                let verdict = results.iter().find(|r| r.assertion == expected.assertion);
                match verdict {
                    Some(r) if r.passed && r.fulfillment_percent >= expected.fulfillment_percent => None,
                    Some(r) => Some(format!(
                        "'{}' ({}% < {}%): {}",
                        expected.assertion, r.fulfillment_percent, expected.fulfillment_percent, r.explanation
                    )),
                    None => Some(format!("'{}': no verdict returned", expected.assertion)),
                }
            })
            .collect();

        if failures.is_empty() {
            self.record(step.feedback("All image assertions passed")).await;
            return Ok(StepOutcome::GoalAchieved);
        }

        let feedback = failures.join("; ");
        warn!(scenario_id = %self.task.scenario_id, %feedback, "Image assertions failed");
        self.state.lock().await.assertion_feedback = Some(feedback.clone());
        self.record(step.feedback(format!("Image assertions failed: {feedback}")))
            .await;
        Ok(StepOutcome::Continue)
    }
}

struct InitializationTerminal<'a> {
    agent: &'a Agent,
}

#[async_trait]
impl Terminal<InitializationInput, Result<()>> for InitializationTerminal<'_> {
    async fn run(&self, input: InitializationInput) -> Result<()> {
        self.agent.initialize(input).await
    }
}

struct StepTerminal<'a> {
    agent: &'a Agent,
}

#[async_trait]
impl Terminal<StepInput, Result<StepOutcome>> for StepTerminal<'_> {
    async fn run(&self, input: StepInput) -> Result<StepOutcome> {
        self.agent.step(input).await
    }
}
