//! The per-agent autonomous decision loop.
//!
//! # Algorithm
//!
//! ```text
//! settle delay (~5 s)
//!       │
//!       ▼
//! status = deciding, notify subscribers
//! gather_context()            ── entity snapshot or dynamic discovery
//! decide(context)             ── prompt model, parse JSON decision
//! execute(decision)           ── each action through the tool registry
//! append decision-log entry; record in progress ledger
//! status = idle, notify; sleep decision_interval
//!       │
//!       ▼ on any error
//! status = error, notify; back off ~10 s; resume — the loop never terminates
//! ```

use std::{sync::Arc, time::Duration};

use serde_json::{json, Value};
use tokio::sync::watch;

use crate::{
    bus::{BusHandle, DeviceBus},
    decision_log::DecisionLog,
    error::Error,
    event_bus::EventBroadcaster,
    orchestrator::ledger::ProgressLedger,
    provider::{ChatMessage, ChatProvider, ChatRequest},
    tools::{KnowledgeStore, ToolRegistry},
};

use super::{
    context::{self, AgentContext},
    parser::parse_decision,
    prompt,
    registry::AgentHandle,
    types::{AgentStatus, Decision},
};

/// Delay before the first cycle, letting the rest of the system settle.
const SETTLE_DELAY: Duration = Duration::from_secs(5);

/// Back-off after a failed cycle.
const ERROR_BACKOFF: Duration = Duration::from_secs(10);

/// One agent's runtime: the decision loop plus everything it needs.
pub struct AgentRuntime {
    handle: Arc<AgentHandle>,
    provider: Arc<dyn ChatProvider>,
    tools: Arc<ToolRegistry>,
    bus: BusHandle,
    knowledge: Arc<dyn KnowledgeStore>,
    progress: Arc<ProgressLedger>,
    log: DecisionLog,
    events: Arc<EventBroadcaster>,
    default_model: String,
}

impl AgentRuntime {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        handle: Arc<AgentHandle>,
        provider: Arc<dyn ChatProvider>,
        tools: Arc<ToolRegistry>,
        bus: BusHandle,
        knowledge: Arc<dyn KnowledgeStore>,
        progress: Arc<ProgressLedger>,
        log: DecisionLog,
        events: Arc<EventBroadcaster>,
        default_model: String,
    ) -> Self {
        Self {
            handle,
            provider,
            tools,
            bus,
            knowledge,
            progress,
            log,
            events,
            default_model,
        }
    }

    /// Run forever (until `shutdown` flips).  Every cycle failure is caught,
    /// broadcast, and followed by a short back-off — the loop itself never
    /// unwinds.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let agent_id = self.handle.id();

        if sleep_or_shutdown(SETTLE_DELAY, &mut shutdown).await {
            return;
        }
        log::info!(
            "{agent_id}: decision loop started (interval: {}s)",
            self.handle.spec_snapshot().decision_interval
        );

        loop {
            if *shutdown.borrow() {
                break;
            }

            self.set_status(AgentStatus::Deciding);

            // Interval is re-read every cycle so spec edits apply hot.
            let interval = Duration::from_secs(self.handle.spec_snapshot().decision_interval);

            match self.cycle().await {
                Ok(()) => {
                    self.handle.mark_decided();
                    self.set_status(AgentStatus::Idle);
                    if sleep_or_shutdown(interval, &mut shutdown).await {
                        break;
                    }
                }
                Err(e) => {
                    log::error!("{agent_id}: decision cycle failed: {e}");
                    self.set_status(AgentStatus::Error);
                    if sleep_or_shutdown(ERROR_BACKOFF, &mut shutdown).await {
                        break;
                    }
                }
            }
        }

        log::info!("{agent_id}: decision loop stopped");
    }

    /// One `gather → decide → execute → log → notify` pass, strictly ordered.
    #[tracing::instrument(name = "agent.cycle", skip_all, fields(agent = %self.handle.id()))]
    pub async fn cycle(&self) -> Result<(), Error> {
        let spec = self.handle.spec_snapshot();

        let context = context::gather(&spec, &self.bus, &self.knowledge).await;
        let decision = self.decide(&context).await?;
        let results = self.execute(&decision).await;

        let entry = json!({
            "timestamp": chrono::Utc::now().to_rfc3339(),
            "agent_id": spec.id,
            "context": context::context_json(&context),
            "decision": decision,
            "results": results,
            "dry_run": self.tools.dry_run(),
        });
        if let Err(e) = self.log.append(&spec.id, &entry) {
            log::warn!("{}: failed to write decision log: {e}", spec.id);
        }

        self.events.agent_decision(&decision, self.tools.dry_run());

        self.progress.record(decision);
        Ok(())
    }

    /// Build the prompt, call the model in JSON mode, parse the decision.
    /// Provider failures propagate (transient cycle failure); parse failures
    /// degrade to a recorded no-op.
    pub async fn decide(&self, context: &AgentContext) -> Result<Decision, Error> {
        let spec = self.handle.spec_snapshot();
        let model = spec
            .model
            .clone()
            .unwrap_or_else(|| self.default_model.clone());

        let services_text = self.discover_services(&context.observed_domains).await;
        let tools = self.tools.list();
        let prompt_text = prompt::decision_prompt(&spec, context, &services_text, &tools);

        let request = ChatRequest::new(model, vec![ChatMessage::user(prompt_text)])
            .with_temperature(0.7)
            .with_max_tokens(1000)
            .json_object();

        let response = self.provider.chat(request).await?;
        Ok(parse_decision(&response.content, &spec.id))
    }

    /// Run each action through the tool registry; a no-op decision performs
    /// no invocations.
    pub async fn execute(&self, decision: &Decision) -> Vec<Value> {
        let mut results = Vec::with_capacity(decision.actions.len());
        for action in &decision.actions {
            let result = self
                .tools
                .execute(&action.tool, action.parameters.clone(), &decision.agent_id)
                .await;
            results.push(json!({
                "tool": action.tool,
                "parameters": action.parameters,
                "result": result,
            }));
        }
        results
    }

    /// List the bus services available for the observed domains, so the
    /// prompt can pin the model to exact service names.
    async fn discover_services(&self, domains: &[String]) -> String {
        if domains.is_empty() {
            return String::new();
        }
        let Ok(bus) = self.bus.get() else {
            return String::new();
        };
        let services = match bus.get_services().await {
            Ok(services) => services,
            Err(e) => {
                log::warn!("failed to fetch services: {e}");
                return String::new();
            }
        };

        let mut lines = Vec::new();
        for domain in domains {
            if let Some(domain_services) = services.get(domain).and_then(Value::as_object) {
                let names: Vec<&str> = domain_services.keys().map(String::as_str).collect();
                lines.push(format!("- {domain}: {}", names.join(", ")));
            }
        }
        if lines.is_empty() {
            String::new()
        } else {
            format!(
                "AVAILABLE SERVICES (use these EXACT names):\n{}",
                lines.join("\n")
            )
        }
    }

    fn set_status(&self, status: AgentStatus) {
        self.handle.set_status(status);
        self.events.agent_status(&self.handle.id(), status);
    }
}

async fn sleep_or_shutdown(duration: Duration, shutdown: &mut watch::Receiver<bool>) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(duration) => false,
        _ = shutdown.changed() => *shutdown.borrow(),
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────
