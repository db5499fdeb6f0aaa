//! Explicit runtime wiring.
//!
//! Every component is constructed here and injected where it is needed —
//! there is no module-level global state.  `main` builds a [`Runtime`],
//! connects the bus, loads the agents file, and spawns the long-lived tasks.

use std::sync::Arc;

use tokio::sync::watch;

use crate::{
    agent::{AgentRegistry, AgentRuntime},
    approval::ApprovalQueue,
    bus::{BusHandle, DeviceBus, HaClient},
    config::{AgentConfigStore, AppConfig},
    decision_log::DecisionLog,
    error::Error,
    event_bus::EventBroadcaster,
    orchestrator::{ledger::{ProgressLedger, TaskLedger}, Orchestrator},
    provider::{self, ChatProvider},
    tools::{KnowledgeStore, NullKnowledge, SafetyConfig, ToolDeps, ToolRegistry},
};

/// Owns every shared component of the process.
pub struct Runtime {
    pub config: AppConfig,
    pub bus: BusHandle,
    pub provider: Arc<dyn ChatProvider>,
    pub tools: Arc<ToolRegistry>,
    pub approvals: Arc<ApprovalQueue>,
    pub agents: Arc<AgentRegistry>,
    pub agent_store: AgentConfigStore,
    pub task_ledger: Arc<TaskLedger>,
    pub progress: Arc<ProgressLedger>,
    pub events: Arc<EventBroadcaster>,
    pub decision_log: DecisionLog,
}

impl Runtime {
    /// Construct all components from configuration.  The bus starts empty;
    /// call [`connect_bus`] to install the live session.
    pub fn build(config: AppConfig) -> Result<Self, Error> {
        let data_dir = config.paths.data_dir();
        std::fs::create_dir_all(&data_dir)?;

        let events = Arc::new(EventBroadcaster::new());
        let bus = BusHandle::new();
        let provider = provider::from_config(&config.provider)?;

        let approvals = ApprovalQueue::open(&data_dir.join("approvals.db"))?;
        {
            // Surface new pending requests on the event bus.
            let events = Arc::clone(&events);
            approvals.register_callback(Box::new(move |request| {
                events.approval_pending(request);
            }));
        }

        let decision_log = DecisionLog::new(data_dir.join("decisions"));
        let knowledge: Arc<dyn KnowledgeStore> = Arc::new(NullKnowledge);
        let safety = Arc::new(SafetyConfig::from_limits(&config.safety));
        let tools = Arc::new(ToolRegistry::standard(
            ToolDeps {
                bus: bus.clone(),
                approvals: Arc::clone(&approvals),
                safety,
                knowledge,
            },
            decision_log.clone(),
            config.safety.dry_run,
        ));

        Ok(Self {
            bus,
            provider,
            tools,
            approvals,
            agents: Arc::new(AgentRegistry::new()),
            agent_store: AgentConfigStore::new(data_dir.join("agents.yaml")),
            task_ledger: Arc::new(TaskLedger::new()),
            progress: Arc::new(ProgressLedger::new()),
            events,
            decision_log,
            config,
        })
    }

    /// Connect and authenticate the device-bus session, then install it.
    /// Auth failure is fatal and must not be retried.
    pub async fn connect_bus(&self) -> Result<(), Error> {
        let client = HaClient::connect_with_timeouts(
            &self.config.bus.url,
            &self.config.bus.access_token,
            std::time::Duration::from_secs(self.config.bus.request_timeout_secs),
            std::time::Duration::from_secs(self.config.bus.states_timeout_secs),
        )
        .await?;
        self.bus.install(client);
        self.events.bus_connection(true);
        Ok(())
    }

    /// Load the agents file into the registry.  Returns the agent count.
    pub fn load_agents(&self) -> Result<usize, Error> {
        let mut specs = self.agent_store.load()?;
        for spec in &mut specs {
            if spec.decision_interval == 0 {
                spec.decision_interval = self.config.orchestrator.default_decision_interval_secs;
            }
            log::info!("loaded agent: {} ({})", spec.name, spec.id);
            self.agents.insert(spec.clone());
        }
        Ok(self.agents.len())
    }

    /// Spawn one decision loop per registered agent.  Returns the number of
    /// loops started.
    pub fn spawn_agent_loops(&self, shutdown: watch::Receiver<bool>) -> usize {
        let handles = self.agents.snapshot();
        let count = handles.len();
        for handle in handles {
            let runtime = AgentRuntime::new(
                handle,
                Arc::clone(&self.provider),
                Arc::clone(&self.tools),
                self.bus.clone(),
                Arc::new(NullKnowledge),
                Arc::clone(&self.progress),
                self.decision_log.clone(),
                Arc::clone(&self.events),
                self.config.provider.default_model.clone(),
            );
            tokio::spawn(runtime.run(shutdown.clone()));
        }
        count
    }

    /// Build the orchestrator over the shared components.
    pub fn orchestrator(&self) -> Arc<Orchestrator> {
        Arc::new(Orchestrator::new(
            Arc::clone(&self.provider),
            Arc::clone(&self.tools),
            Arc::clone(&self.approvals),
            Arc::clone(&self.agents),
            Arc::clone(&self.task_ledger),
            Arc::clone(&self.progress),
            self.bus.clone(),
            Arc::clone(&self.events),
            self.decision_log.clone(),
            self.config.orchestrator.clone(),
            self.config.provider.planner_model().to_string(),
        ))
    }

    /// Cooperative shutdown: drop the bus session so in-flight tool calls
    /// observe a disconnect instead of hanging.
    pub async fn shutdown(&self) {
        if let Ok(client) = self.bus.get() {
            client.disconnect().await;
        }
        self.bus.clear();
    }
}
