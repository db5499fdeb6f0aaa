//! Runtime status broadcasts.
//!
//! One broadcast channel carries everything observers care about: agent loop
//! status, completed decisions, advisory task assignments, approval-queue
//! activity, orchestrator cycle summaries, and bus connectivity.  Producers
//! go through the typed helpers on [`EventBroadcaster`] so the event payloads
//! are assembled in one place; dropping an event because nobody is listening
//! is fine.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::{
    agent::{AgentStatus, Decision},
    approval::ApprovalRequest,
    orchestrator::Task,
};

const DEFAULT_CAPACITY: usize = 1024;

/// All events that flow through the runtime's broadcast channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AppEvent {
    /// An agent's loop status changed (`initializing`, `idle`, `deciding`, `error`).
    AgentStatus {
        agent_id: String,
        status: String,
        at: String,
    },
    /// An agent completed a decision cycle.
    AgentDecision {
        agent_id: String,
        reasoning: String,
        action_count: usize,
        dry_run: bool,
    },
    /// The orchestrator assigned a task to an agent (advisory).
    TaskAssigned {
        task_id: String,
        agent_id: String,
        description: String,
        priority: String,
    },
    /// A new approval request entered `pending`.
    ApprovalPending {
        request_id: String,
        agent_id: String,
        action_type: String,
        impact_level: String,
        reason: String,
        timeout_seconds: u64,
    },
    /// One orchestrator cycle finished.
    CycleCompleted {
        duration_ms: u64,
        tasks: usize,
        decisions: usize,
        conflicts: usize,
        executed: usize,
    },
    /// The device-bus session connected or dropped.
    BusConnection { connected: bool },
    SystemReady,
    SystemError { message: String },
}

/// The runtime's status broadcaster.
///
/// Shared as `Arc<EventBroadcaster>` between the agent loops, the
/// orchestrator, and the approval queue's notification callback; observers
/// call [`subscribe`] and read [`AppEvent`]s.
pub struct EventBroadcaster {
    sender: broadcast::Sender<AppEvent>,
}

impl EventBroadcaster {
    /// Create with the default channel capacity (1024).
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Create with an explicit channel capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Subscribe to all events.
    pub fn subscribe(&self) -> broadcast::Receiver<AppEvent> {
        self.sender.subscribe()
    }

    // ── Typed producers ──────────────────────────────────────────────────────

    /// An agent's loop moved to `status`.
    pub fn agent_status(&self, agent_id: &str, status: AgentStatus) {
        self.send(AppEvent::AgentStatus {
            agent_id: agent_id.to_string(),
            status: status.to_string(),
            at: Utc::now().to_rfc3339(),
        });
    }

    /// An agent finished a decision cycle.
    pub fn agent_decision(&self, decision: &Decision, dry_run: bool) {
        self.send(AppEvent::AgentDecision {
            agent_id: decision.agent_id.clone(),
            reasoning: decision.reasoning.clone(),
            action_count: decision.actions.len(),
            dry_run,
        });
    }

    /// The orchestrator planned a task for an agent.
    pub fn task_assigned(&self, task: &Task) {
        self.send(AppEvent::TaskAssigned {
            task_id: task.task_id.clone(),
            agent_id: task.agent_id.clone(),
            description: task.description.clone(),
            priority: task.priority.as_str().to_string(),
        });
    }

    /// An approval request entered `pending` and waits for a human.
    pub fn approval_pending(&self, request: &ApprovalRequest) {
        self.send(AppEvent::ApprovalPending {
            request_id: request.id.clone(),
            agent_id: request.agent_id.clone(),
            action_type: request.action_type.clone(),
            impact_level: request.impact_level.to_string(),
            reason: request.reason.clone(),
            timeout_seconds: request.timeout_seconds,
        });
    }

    /// An orchestrator cycle completed with these counts.
    pub fn cycle_completed(
        &self,
        duration_ms: u64,
        tasks: usize,
        decisions: usize,
        conflicts: usize,
        executed: usize,
    ) {
        self.send(AppEvent::CycleCompleted {
            duration_ms,
            tasks,
            decisions,
            conflicts,
            executed,
        });
    }

    /// The device-bus session came up or dropped.
    pub fn bus_connection(&self, connected: bool) {
        self.send(AppEvent::BusConnection { connected });
    }

    pub fn system_ready(&self) {
        self.send(AppEvent::SystemReady);
    }

    pub fn system_error(&self, message: &str) {
        self.send(AppEvent::SystemError {
            message: message.to_string(),
        });
    }

    fn send(&self, event: AppEvent) {
        // `send` errors only when there are no receivers — that is fine.
        let _ = self.sender.send(event);
    }
}

impl Default for EventBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        agent::ActionCall,
        approval::ImpactLevel,
        orchestrator::TaskPriority,
    };
    use serde_json::json;

    #[tokio::test]
    async fn agent_status_event_carries_id_and_status() {
        let events = EventBroadcaster::new();
        let mut rx = events.subscribe();

        events.agent_status("heating", AgentStatus::Deciding);

        match rx.recv().await.unwrap() {
            AppEvent::AgentStatus {
                agent_id, status, ..
            } => {
                assert_eq!(agent_id, "heating");
                assert_eq!(status, "deciding");
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn agent_decision_event_counts_actions() {
        let events = EventBroadcaster::new();
        let mut rx = events.subscribe();

        let decision = Decision {
            agent_id: "lighting".to_string(),
            reasoning: "evening scene".to_string(),
            actions: vec![
                ActionCall::new("turn_on_light", json!({"entity_id": "light.kitchen"})),
                ActionCall::new("set_brightness", json!({"entity_id": "light.kitchen"})),
            ],
            confidence: 1.0,
            impact_level: ImpactLevel::Low,
        };
        events.agent_decision(&decision, true);

        match rx.recv().await.unwrap() {
            AppEvent::AgentDecision {
                agent_id,
                reasoning,
                action_count,
                dry_run,
            } => {
                assert_eq!(agent_id, "lighting");
                assert_eq!(reasoning, "evening scene");
                assert_eq!(action_count, 2);
                assert!(dry_run);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn task_assignment_event_mirrors_the_task() {
        let events = EventBroadcaster::new();
        let mut rx = events.subscribe();

        let task = Task::new("heating", "warm the bedroom", TaskPriority::High, json!({}));
        events.task_assigned(&task);

        match rx.recv().await.unwrap() {
            AppEvent::TaskAssigned {
                task_id,
                agent_id,
                description,
                priority,
            } => {
                assert_eq!(task_id, task.task_id);
                assert_eq!(agent_id, "heating");
                assert_eq!(description, "warm the bedroom");
                assert_eq!(priority, "high");
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn approval_pending_event_mirrors_the_request() {
        let events = EventBroadcaster::new();
        let mut rx = events.subscribe();

        let request = ApprovalRequest::new(
            "security",
            "lock.unlock",
            json!({"entity_id": "lock.front"}),
            ImpactLevel::High,
            "visitor at the door",
            300,
        );
        events.approval_pending(&request);

        match rx.recv().await.unwrap() {
            AppEvent::ApprovalPending {
                request_id,
                agent_id,
                action_type,
                impact_level,
                timeout_seconds,
                ..
            } => {
                assert_eq!(request_id, request.id);
                assert_eq!(agent_id, "security");
                assert_eq!(action_type, "lock.unlock");
                assert_eq!(impact_level, "high");
                assert_eq!(timeout_seconds, 300);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn all_subscribers_receive_every_event() {
        let events = EventBroadcaster::new();
        let mut rx1 = events.subscribe();
        let mut rx2 = events.subscribe();

        events.system_ready();

        assert!(matches!(rx1.recv().await.unwrap(), AppEvent::SystemReady));
        assert!(matches!(rx2.recv().await.unwrap(), AppEvent::SystemReady));
    }

    #[tokio::test]
    async fn broadcasting_without_subscribers_does_not_panic() {
        let events = EventBroadcaster::new();
        events.system_error("nobody listening");
        events.bus_connection(false);
        events.cycle_completed(10, 0, 0, 0, 0);
    }
}
