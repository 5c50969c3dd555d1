//! Execution events: progress notifications from executors and agents.
//!
//! Events are published when something observable happens during a run.
//! Reporters and UIs subscribe without the engine knowing about them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

/// Lifecycle of one scenario execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScenarioState {
    #[default]
    Idle,
    Running,
    Success,
    Failed,
    Cancelled,
}

impl ScenarioState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Failed | Self::Cancelled)
    }
}

impl std::fmt::Display for ScenarioState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Success => "success",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// All execution events in the system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ExecutionEvent {
    ScenarioStateChanged {
        scenario_id: String,
        state: ScenarioState,
        timestamp: DateTime<Utc>,
    },

    /// An agent attempt for one task of a chain started
    TaskStarted {
        scenario_id: String,
        attempt: u32,
        timestamp: DateTime<Utc>,
    },

    /// A step was appended to a task's context
    StepRecorded {
        scenario_id: String,
        action: Option<String>,
        cache_hit: bool,
        timestamp: DateTime<Utc>,
    },

    /// The oracle was throttled; the call will be retried after `delay_ms`
    RetryScheduled {
        scenario_id: String,
        attempt: u32,
        delay_ms: u64,
        timestamp: DateTime<Utc>,
    },

    TaskFinished {
        scenario_id: String,
        attempt: u32,
        success: bool,
        timestamp: DateTime<Utc>,
    },
}

/// A broadcast-based event bus for execution events.
pub struct EventBus {
    sender: broadcast::Sender<Arc<ExecutionEvent>>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn publish(&self, event: ExecutionEvent) {
        // No subscribers is fine
        let _ = self.sender.send(Arc::new(event));
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Arc<ExecutionEvent>> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.sender.receiver_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn event_bus_publish_subscribe() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();

        bus.publish(ExecutionEvent::StepRecorded {
            scenario_id: "login".into(),
            action: Some("BackPress".into()),
            cache_hit: true,
            timestamp: Utc::now(),
        });

        let event = rx.recv().await.unwrap();
        match event.as_ref() {
            ExecutionEvent::StepRecorded { scenario_id, cache_hit, .. } => {
                assert_eq!(scenario_id, "login");
                assert!(cache_hit);
            }
            _ => panic!("Expected StepRecorded event"),
        }
    }

    #[test]
    fn event_bus_no_subscribers_doesnt_panic() {
        let bus = EventBus::new(16);
        bus.publish(ExecutionEvent::ScenarioStateChanged {
            scenario_id: "login".into(),
            state: ScenarioState::Running,
            timestamp: Utc::now(),
        });
    }

    #[test]
    fn terminal_states() {
        assert!(!ScenarioState::Idle.is_terminal());
        assert!(!ScenarioState::Running.is_terminal());
        assert!(ScenarioState::Cancelled.is_terminal());
        assert_eq!(ScenarioState::Success.to_string(), "success");
    }
}
