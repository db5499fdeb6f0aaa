//! The orchestrator: a periodic six-node pipeline over an
//! [`OrchestratorState`] value.
//!
//! ```text
//! plan → distribute → wait_for_agents → aggregate → resolve_conflicts
//!      → approval_gate → execute (skipped when nothing survives the gate)
//! ```
//!
//! Task distribution is advisory: tasks land in the task ledger and are
//! announced on the event bus, but the agents' own loops remain the actors.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::{json, Map, Value};
use tokio::sync::watch;

use crate::{
    agent::{parser::extract_json, ActionCall, AgentRegistry, Decision},
    approval::ApprovalQueue,
    bus::{BusHandle, DeviceBus},
    config::schema::OrchestratorConfig,
    decision_log::DecisionLog,
    event_bus::EventBroadcaster,
    provider::{ChatMessage, ChatProvider, ChatRequest},
    tools::ToolRegistry,
};

use super::{
    conflicts::{self, Conflict},
    ledger::{ProgressLedger, Task, TaskLedger, TaskPriority, TASK_RETENTION_PER_AGENT},
};

const PLANNER_SYSTEM_PROMPT: &str = "You are an AI orchestrator for home automation. \
    Analyze the current home state and create tasks for the specialist agents.";

/// Entity id of the away-mode flag consulted by the conflict rules.
const AWAY_MODE_ENTITY: &str = "input_boolean.away_mode";

/// An action that survived the approval gate, tagged with its owning agent.
#[derive(Debug, Clone)]
pub struct ApprovedAction {
    pub agent_id: String,
    pub action: ActionCall,
}

/// Mutable state threaded through one pipeline cycle.
#[derive(Debug, Clone)]
pub struct OrchestratorState {
    pub started_at: DateTime<Utc>,
    pub home_state: Value,
    pub away_mode: bool,
    pub tasks: Vec<Task>,
    pub decisions: Vec<Decision>,
    pub conflicts: Vec<Conflict>,
    pub approved: Vec<ApprovedAction>,
    pub approval_required: bool,
    pub results: Vec<Value>,
}

impl OrchestratorState {
    fn new(started_at: DateTime<Utc>) -> Self {
        Self {
            started_at,
            home_state: Value::Null,
            away_mode: false,
            tasks: Vec::new(),
            decisions: Vec::new(),
            conflicts: Vec::new(),
            approved: Vec::new(),
            approval_required: false,
            results: Vec::new(),
        }
    }
}

/// Central coordinator for the multi-agent system.
pub struct Orchestrator {
    pub(crate) provider: Arc<dyn ChatProvider>,
    pub(crate) tools: Arc<ToolRegistry>,
    pub(crate) approvals: Arc<ApprovalQueue>,
    pub(crate) agents: Arc<AgentRegistry>,
    pub(crate) task_ledger: Arc<TaskLedger>,
    pub(crate) progress: Arc<ProgressLedger>,
    pub(crate) bus: BusHandle,
    pub(crate) events: Arc<EventBroadcaster>,
    pub(crate) log: DecisionLog,
    pub(crate) config: OrchestratorConfig,
    pub(crate) planner_model: String,
}

impl Orchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        provider: Arc<dyn ChatProvider>,
        tools: Arc<ToolRegistry>,
        approvals: Arc<ApprovalQueue>,
        agents: Arc<AgentRegistry>,
        task_ledger: Arc<TaskLedger>,
        progress: Arc<ProgressLedger>,
        bus: BusHandle,
        events: Arc<EventBroadcaster>,
        log: DecisionLog,
        config: OrchestratorConfig,
        planner_model: String,
    ) -> Self {
        Self {
            provider,
            tools,
            approvals,
            agents,
            task_ledger,
            progress,
            bus,
            events,
            log,
            config,
            planner_model,
        }
    }

    /// Run planning cycles every `planning_interval_secs` until shutdown.
    /// Cycle failures are internal; the loop never unwinds.
    pub async fn run_loop(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let interval = std::time::Duration::from_secs(self.config.planning_interval_secs);
        log::info!(
            "orchestrator planning loop started (interval: {}s, {} agents)",
            self.config.planning_interval_secs,
            self.agents.len()
        );

        loop {
            if *shutdown.borrow() {
                break;
            }

            self.cycle().await;
            self.task_ledger.prune(TASK_RETENTION_PER_AGENT);

            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        log::info!("orchestrator planning loop stopped");
    }

    /// One complete pipeline cycle.
    #[tracing::instrument(name = "orchestrator.cycle", skip_all)]
    pub async fn cycle(&self) -> OrchestratorState {
        let started_at = Utc::now();
        let mut state = OrchestratorState::new(started_at);

        self.plan(&mut state).await;
        self.distribute(&mut state);
        self.wait_for_agents(&state).await;
        self.aggregate(&mut state);
        self.resolve_conflicts(&mut state);
        self.approval_gate(&mut state).await;

        // Terminal conditional: nothing approved, nothing to execute.
        if !state.approved.is_empty() {
            self.execute_approved(&mut state).await;
        }

        let duration_ms = (Utc::now() - started_at).num_milliseconds().max(0) as u64;
        self.log_cycle(&state, duration_ms);
        state
    }

    // ── Node 1: plan ─────────────────────────────────────────────────────────

    /// Snapshot the home, prompt the planning model, parse tasks.  Planner
    /// failure yields zero tasks and the cycle continues.
    pub async fn plan(&self, state: &mut OrchestratorState) {
        let (home_state, away_mode) = self.home_snapshot().await;
        state.home_state = home_state;
        state.away_mode = away_mode;

        let catalogue: Vec<String> = self
            .agents
            .snapshot()
            .iter()
            .map(|handle| {
                let spec = handle.spec_snapshot();
                format!("- {}: {} — {}", spec.id, spec.name, spec.instruction)
            })
            .collect();

        let prompt = format!(
            "Current home state:\n{home}\n\n\
             Available agents:\n{agents}\n\n\
             Create a task list assigning work to specialist agents. Return JSON:\n\
             {{\"tasks\": [{{\"agent\": \"heating\", \"description\": \"Adjust bedroom temperature\", \
             \"priority\": \"medium\", \"context\": {{\"target_temp\": 21.0}}}}]}}\n\n\
             Only create tasks if action is needed. Return an empty tasks array if everything is optimal.",
            home = state.home_state,
            agents = catalogue.join("\n"),
        );

        let request = ChatRequest::new(
            self.planner_model.clone(),
            vec![
                ChatMessage::system(PLANNER_SYSTEM_PROMPT),
                ChatMessage::user(prompt),
            ],
        )
        .json_object();

        let content = match self.provider.chat(request).await {
            Ok(response) => response.content,
            Err(e) => {
                log::error!("planning model call failed: {e}");
                return;
            }
        };

        let plan = match extract_json(&content) {
            Ok(value) => value,
            Err(e) => {
                log::error!("planning response unparseable: {e}");
                return;
            }
        };

        if let Some(entries) = plan["tasks"].as_array() {
            for entry in entries {
                let Some(agent_id) = entry
                    .get("agent")
                    .or_else(|| entry.get("agent_id"))
                    .and_then(Value::as_str)
                else {
                    continue;
                };
                let description = entry["description"].as_str().unwrap_or_default();
                let priority = entry["priority"]
                    .as_str()
                    .and_then(parse_priority)
                    .unwrap_or_default();
                let context = entry.get("context").cloned().unwrap_or(json!({}));
                state
                    .tasks
                    .push(Task::new(agent_id, description, priority, context));
            }
        }

        log::info!("planned {} tasks", state.tasks.len());
    }

    // ── Node 2: distribute ───────────────────────────────────────────────────

    /// Append planned tasks to the ledger and announce them.  Advisory only.
    pub fn distribute(&self, state: &mut OrchestratorState) {
        for task in &state.tasks {
            if self.agents.get(&task.agent_id).is_none() {
                log::warn!("planned task for unknown agent {}", task.agent_id);
                continue;
            }
            self.task_ledger.append(task.clone());
            self.events.task_assigned(task);
        }
    }

    // ── Node 3: wait_for_agents ──────────────────────────────────────────────

    /// Bounded, best-effort wait for this cycle's decisions.  Not a barrier:
    /// the aggregate step reads whatever the ledger holds afterwards.
    pub async fn wait_for_agents(&self, state: &OrchestratorState) {
        let expected = self.agents.len();
        if expected == 0 || self.config.agent_wait_secs == 0 {
            return;
        }

        let deadline =
            tokio::time::Instant::now() + std::time::Duration::from_secs(self.config.agent_wait_secs);
        loop {
            if self.progress.decisions_since(state.started_at).len() >= expected {
                return;
            }
            if tokio::time::Instant::now() >= deadline {
                return;
            }
            tokio::time::sleep(std::time::Duration::from_millis(500)).await;
        }
    }

    // ── Node 4: aggregate ────────────────────────────────────────────────────

    /// Collect decisions recorded during this cycle.
    pub fn aggregate(&self, state: &mut OrchestratorState) {
        state.decisions = self.progress.decisions_since(state.started_at);
        log::info!("aggregated {} decisions", state.decisions.len());
    }

    // ── Node 5: resolve_conflicts ────────────────────────────────────────────

    pub fn resolve_conflicts(&self, state: &mut OrchestratorState) {
        let decisions = std::mem::take(&mut state.decisions);
        let (decisions, conflicts) = conflicts::resolve(decisions, state.away_mode);
        state.decisions = decisions;
        state.conflicts = conflicts;
    }

    // ── Node 6: approval_gate ────────────────────────────────────────────────

    /// Split actions by the decision's impact envelope: low/medium execute,
    /// high/critical are enqueued for approval.  A store failure drops the
    /// action.
    pub async fn approval_gate(&self, state: &mut OrchestratorState) {
        for decision in &state.decisions {
            if decision.impact_level.requires_approval() {
                state.approval_required = true;
                for action in &decision.actions {
                    let reason = format!(
                        "{} proposed {} (impact: {}): {}",
                        decision.agent_id, action.tool, decision.impact_level, decision.reasoning
                    );
                    if let Err(e) = self
                        .approvals
                        .add_request(
                            &decision.agent_id,
                            &action.tool,
                            action.parameters.clone(),
                            decision.impact_level,
                            &reason,
                            None,
                        )
                        .await
                    {
                        log::error!(
                            "failed to enqueue approval for {}/{}: {e}; action dropped",
                            decision.agent_id,
                            action.tool
                        );
                    }
                }
            } else {
                for action in &decision.actions {
                    state.approved.push(ApprovedAction {
                        agent_id: decision.agent_id.clone(),
                        action: action.clone(),
                    });
                }
            }
        }

        if state.approval_required {
            log::info!("high-impact actions queued for approval");
        }
    }

    // ── Node 7: execute ──────────────────────────────────────────────────────

    /// Run each approved action through the tool registry.
    pub async fn execute_approved(&self, state: &mut OrchestratorState) {
        for approved in &state.approved {
            let result = self
                .tools
                .execute(
                    &approved.action.tool,
                    approved.action.parameters.clone(),
                    "orchestrator",
                )
                .await;
            state.results.push(json!({
                "agent_id": approved.agent_id,
                "tool": approved.action.tool,
                "result": result,
            }));
        }
    }

    // ── Support ──────────────────────────────────────────────────────────────

    /// Per-agent entity states plus the away-mode flag.
    async fn home_snapshot(&self) -> (Value, bool) {
        let client = match self.bus.get() {
            Ok(client) => client,
            Err(e) => return (json!({"error": e.to_string()}), false),
        };

        let all_states = match client.get_states(None).await {
            Ok(states) => states,
            Err(e) => return (json!({"error": e.to_string()}), false),
        };

        let mut away_mode = false;
        let mut by_id = Map::new();
        for state in &all_states {
            if state.entity_id == AWAY_MODE_ENTITY {
                away_mode = state.state == "on";
            }
            by_id.insert(
                state.entity_id.clone(),
                json!({"state": state.state, "name": state.friendly_name()}),
            );
        }

        let mut per_agent = Map::new();
        for handle in self.agents.snapshot() {
            let spec = handle.spec_snapshot();
            let states: Map<String, Value> = spec
                .entities
                .iter()
                .filter_map(|entity| by_id.get(entity).map(|v| (entity.clone(), v.clone())))
                .collect();
            per_agent.insert(spec.id, Value::Object(states));
        }

        (
            json!({
                "agents": per_agent,
                "away_mode": away_mode,
                "timestamp": Utc::now().to_rfc3339(),
            }),
            away_mode,
        )
    }

    fn log_cycle(&self, state: &OrchestratorState, duration_ms: u64) {
        let entry = json!({
            "timestamp": state.started_at.to_rfc3339(),
            "duration_ms": duration_ms,
            "tasks_created": state.tasks.len(),
            "decisions_received": state.decisions.len(),
            "conflicts": state.conflicts,
            "actions_approved": state.approved.len(),
            "actions_executed": state.results.len(),
            "approval_required": state.approval_required,
        });
        if let Err(e) = self.log.append("orchestrator", &entry) {
            log::warn!("failed to write orchestrator cycle log: {e}");
        }

        self.events.cycle_completed(
            duration_ms,
            state.tasks.len(),
            state.decisions.len(),
            state.conflicts.len(),
            state.results.len(),
        );
    }
}

fn parse_priority(s: &str) -> Option<TaskPriority> {
    match s {
        "low" => Some(TaskPriority::Low),
        "medium" => Some(TaskPriority::Medium),
        "high" => Some(TaskPriority::High),
        "critical" => Some(TaskPriority::Critical),
        _ => None,
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        agent::AgentSpec,
        approval::{ApprovalStatus, ImpactLevel},
        bus::{client::EventCallback, DeviceBus, EntityState},
        error::{BusError, ProviderError, ToolError},
        event_bus::EventBroadcaster,
        provider::ChatResponse,
        tools::Tool,
    };
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    struct MockPlanner {
        response: String,
    }

    #[async_trait]
    impl ChatProvider for MockPlanner {
        async fn chat(&self, request: ChatRequest) -> Result<ChatResponse, ProviderError> {
            Ok(ChatResponse {
                content: self.response.clone(),
                model: request.model,
                raw: Value::Null,
            })
        }
        async fn embed(&self, _: &str, _: &str) -> Result<Vec<f32>, ProviderError> {
            Ok(vec![])
        }
        fn base_url(&self) -> &str {
            "mock"
        }
    }

    struct FakeBus {
        away: bool,
    }

    #[async_trait]
    impl DeviceBus for FakeBus {
        async fn get_states(&self, entity_id: Option<&str>) -> Result<Vec<EntityState>, BusError> {
            let states: Vec<EntityState> = serde_json::from_value(json!([
                {"entity_id": "climate.bedroom", "state": "heat", "attributes": {}},
                {"entity_id": "light.kitchen", "state": "on", "attributes": {}},
                {"entity_id": AWAY_MODE_ENTITY,
                 "state": if self.away { "on" } else { "off" }, "attributes": {}},
            ]))
            .unwrap();
            match entity_id {
                None => Ok(states),
                Some(id) => states
                    .into_iter()
                    .find(|s| s.entity_id == id)
                    .map(|s| vec![s])
                    .ok_or_else(|| BusError::EntityNotFound(id.to_string())),
            }
        }
        async fn get_services(&self) -> Result<Value, BusError> {
            Ok(json!({}))
        }
        async fn call_service(
            &self,
            _: &str,
            _: &str,
            _: Option<&str>,
            _: Value,
        ) -> Result<Value, BusError> {
            Ok(json!({}))
        }
        async fn subscribe_events(
            &self,
            _: &str,
            _: Vec<String>,
            _: EventCallback,
        ) -> Result<u64, BusError> {
            Ok(1)
        }
        fn is_connected(&self) -> bool {
            true
        }
        async fn disconnect(&self) {}
    }

    struct CountingTool {
        name: &'static str,
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Tool for CountingTool {
        fn name(&self) -> &str {
            self.name
        }
        fn description(&self) -> &str {
            "counts"
        }
        fn parameters_schema(&self) -> Value {
            json!({"type": "object"})
        }
        async fn execute(&self, _: Value) -> Result<Value, ToolError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(json!({"executed": true}))
        }
    }

    struct Harness {
        orchestrator: Orchestrator,
        progress: Arc<ProgressLedger>,
        approvals: Arc<ApprovalQueue>,
        calls: Arc<AtomicUsize>,
        _dir: TempDir,
    }

    fn harness(planner_response: &str, agent_ids: &[&str], away: bool, wait_secs: u64) -> Harness {
        let dir = TempDir::new().unwrap();
        let calls = Arc::new(AtomicUsize::new(0));

        let mut tools = ToolRegistry::new(DecisionLog::new(dir.path()), false);
        for name in ["turn_on_light", "set_temperature", "call_service"] {
            tools.register(Arc::new(CountingTool {
                name,
                calls: Arc::clone(&calls),
            }));
        }

        let agents = Arc::new(AgentRegistry::new());
        for id in agent_ids {
            agents.insert(AgentSpec {
                id: id.to_string(),
                name: format!("{id} agent"),
                instruction: "test".to_string(),
                entities: vec!["climate.bedroom".to_string()],
                model: None,
                decision_interval: 120,
                knowledge: String::new(),
            });
        }

        let approvals = ApprovalQueue::open_in_memory().unwrap();
        let progress = Arc::new(ProgressLedger::new());
        let config = OrchestratorConfig {
            planning_interval_secs: 120,
            default_decision_interval_secs: 120,
            agent_wait_secs: wait_secs,
        };

        let orchestrator = Orchestrator::new(
            Arc::new(MockPlanner {
                response: planner_response.to_string(),
            }),
            Arc::new(tools),
            Arc::clone(&approvals),
            agents,
            Arc::new(TaskLedger::new()),
            Arc::clone(&progress),
            BusHandle::with_bus(Arc::new(FakeBus { away })),
            Arc::new(EventBroadcaster::new()),
            DecisionLog::new(dir.path()),
            config,
            "planner-model".to_string(),
        );

        Harness {
            orchestrator,
            progress,
            approvals,
            calls,
            _dir: dir,
        }
    }

    fn decision(agent_id: &str, tool: &str, entity: &str, impact: ImpactLevel) -> Decision {
        Decision {
            agent_id: agent_id.to_string(),
            reasoning: "test".to_string(),
            actions: vec![ActionCall::new(
                tool,
                json!({"entity_id": entity, "temperature": 21.0}),
            )],
            confidence: 1.0,
            impact_level: impact,
        }
    }

    #[tokio::test]
    async fn plan_parses_tasks_and_distributes_to_known_agents() {
        let response = json!({
            "tasks": [
                {"agent": "heating", "description": "warm the bedroom",
                 "priority": "high", "context": {"target_temp": 21.0}},
                {"agent": "ghost", "description": "not a real agent"}
            ]
        })
        .to_string();
        let h = harness(&response, &["heating"], false, 0);

        let state = h.orchestrator.cycle().await;

        assert_eq!(state.tasks.len(), 2, "planner output is parsed in full");
        assert_eq!(state.tasks[0].agent_id, "heating");
        assert_eq!(state.tasks[0].priority, TaskPriority::High);
        // Only the known agent's task reaches the ledger.
        assert_eq!(h.orchestrator.task_ledger.len(), 1);
    }

    #[tokio::test]
    async fn planner_failure_yields_zero_tasks_and_cycle_continues() {
        let h = harness("the model refused to answer in JSON", &["heating"], false, 0);
        let state = h.orchestrator.cycle().await;
        assert!(state.tasks.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn cycle_executes_low_impact_decisions() {
        let h = harness(r#"{"tasks": []}"#, &["lighting"], false, 5);

        let progress = Arc::clone(&h.progress);
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
            progress.record(decision(
                "lighting",
                "turn_on_light",
                "light.kitchen",
                ImpactLevel::Low,
            ));
        });

        let state = h.orchestrator.cycle().await;

        assert_eq!(state.decisions.len(), 1);
        assert_eq!(state.approved.len(), 1);
        assert_eq!(state.results.len(), 1);
        assert_eq!(h.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn high_impact_decisions_route_to_the_approval_queue() {
        let h = harness(r#"{"tasks": []}"#, &["security"], false, 5);

        let progress = Arc::clone(&h.progress);
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
            progress.record(decision(
                "security",
                "call_service",
                "lock.front",
                ImpactLevel::High,
            ));
        });

        let state = h.orchestrator.cycle().await;

        assert!(state.approval_required);
        assert!(state.approved.is_empty());
        assert!(state.results.is_empty(), "gate skipped the executor entirely");
        assert_eq!(h.calls.load(Ordering::SeqCst), 0);

        let pending = h.approvals.pending().unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].status, ApprovalStatus::Pending);
        assert_eq!(pending[0].agent_id, "security");
    }

    #[tokio::test(start_paused = true)]
    async fn heating_and_cooling_never_both_execute() {
        let h = harness(r#"{"tasks": []}"#, &["heating", "cooling"], false, 5);

        let progress = Arc::clone(&h.progress);
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
            progress.record(decision(
                "heating",
                "set_temperature",
                "climate.bedroom",
                ImpactLevel::Low,
            ));
            progress.record(decision(
                "cooling",
                "set_temperature",
                "climate.bedroom",
                ImpactLevel::Low,
            ));
        });

        let state = h.orchestrator.cycle().await;

        assert!(state.decisions.is_empty(), "both HVAC decisions dropped");
        assert!(state.results.is_empty());
        assert_eq!(h.calls.load(Ordering::SeqCst), 0);
        assert_eq!(state.conflicts.len(), 1);
        assert_eq!(state.conflicts[0].kind, "mutual_exclusion");
    }

    #[tokio::test(start_paused = true)]
    async fn away_mode_rewrites_setpoints_to_eco() {
        let h = harness(r#"{"tasks": []}"#, &["heating"], true, 5);

        let progress = Arc::clone(&h.progress);
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
            progress.record(decision(
                "heating",
                "set_temperature",
                "climate.bedroom",
                ImpactLevel::Low,
            ));
        });

        let state = h.orchestrator.cycle().await;

        assert!(state.away_mode);
        assert_eq!(state.approved.len(), 1);
        assert_eq!(state.approved[0].action.tool, "call_service");
        assert_eq!(
            state.approved[0].action.parameters["service"],
            "set_preset_mode"
        );
    }

    #[tokio::test]
    async fn empty_cycle_skips_the_executor() {
        let h = harness(r#"{"tasks": []}"#, &[], false, 0);
        let state = h.orchestrator.cycle().await;
        assert!(state.approved.is_empty());
        assert!(state.results.is_empty());
        assert_eq!(h.calls.load(Ordering::SeqCst), 0);
    }
}
