//! Central registry of available tools.
//!
//! The registry owns the dry-run flag and the invocation log.  Every
//! invocation — success, validation failure, or handler error — produces
//! exactly one decision-log entry under `decisions/<agent_id>/`.

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use chrono::Utc;
use serde_json::{json, Value};

use crate::{
    approval::ApprovalQueue,
    bus::BusHandle,
    decision_log::DecisionLog,
};

use super::{
    climate::{GetClimateState, SetHvacMode, SetTemperature},
    diagnostic::{GetState, LogMessage},
    knowledge::{KnowledgeStore, SearchKnowledgeBase},
    lighting::{SetBrightness, SetColorTemp, TurnOffLight, TurnOnLight},
    safety::SafetyConfig,
    schema::validate_args,
    security::{EnableCamera, LockDoor, SetAlarmState, UnlockDoor},
    traits::{Tool, ToolInfo},
    universal::CallService,
};

/// Shared collaborators handed to the standard tool catalogue.
pub struct ToolDeps {
    pub bus: BusHandle,
    pub approvals: Arc<ApprovalQueue>,
    pub safety: Arc<SafetyConfig>,
    pub knowledge: Arc<dyn KnowledgeStore>,
}

pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
    dry_run: AtomicBool,
    log: DecisionLog,
}

impl ToolRegistry {
    pub fn new(log: DecisionLog, dry_run: bool) -> Self {
        Self {
            tools: HashMap::new(),
            dry_run: AtomicBool::new(dry_run),
            log,
        }
    }

    /// Registry populated with the full catalogue: climate, lighting,
    /// security, knowledge, universal, and diagnostic tools.
    pub fn standard(deps: ToolDeps, log: DecisionLog, dry_run: bool) -> Self {
        let mut registry = Self::new(log, dry_run);
        let ToolDeps {
            bus,
            approvals,
            safety,
            knowledge,
        } = deps;

        // Climate
        registry.register(Arc::new(SetTemperature::new(bus.clone(), Arc::clone(&safety))));
        registry.register(Arc::new(SetHvacMode::new(bus.clone())));
        registry.register(Arc::new(GetClimateState::new(bus.clone())));

        // Lighting
        registry.register(Arc::new(TurnOnLight::new(bus.clone())));
        registry.register(Arc::new(TurnOffLight::new(bus.clone())));
        registry.register(Arc::new(SetBrightness::new(bus.clone())));
        registry.register(Arc::new(SetColorTemp::new(bus.clone())));

        // Security
        registry.register(Arc::new(SetAlarmState::new(bus.clone())));
        registry.register(Arc::new(LockDoor::new(bus.clone())));
        registry.register(Arc::new(UnlockDoor::new(Arc::clone(&approvals))));
        registry.register(Arc::new(EnableCamera::new(bus.clone())));

        // Knowledge
        registry.register(Arc::new(SearchKnowledgeBase::new(knowledge)));

        // Universal
        registry.register(Arc::new(CallService::new(bus.clone(), safety, approvals)));

        // Diagnostic
        registry.register(Arc::new(LogMessage));
        registry.register(Arc::new(GetState::new(bus)));

        registry
    }

    /// Register a tool.  Overwrites any previous tool with the same name.
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    /// Look up a tool by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    /// List all registered tools (for inclusion in agent prompts).
    pub fn list(&self) -> Vec<ToolInfo> {
        self.tools
            .values()
            .map(|t| ToolInfo {
                name: t.name().to_string(),
                description: t.description().to_string(),
                schema: t.parameters_schema(),
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Whether mutating tools simulate instead of executing.  Writes are rare
    /// (config surface); relaxed ordering is sufficient.
    pub fn dry_run(&self) -> bool {
        self.dry_run.load(Ordering::Relaxed)
    }

    pub fn set_dry_run(&self, dry_run: bool) {
        self.dry_run.store(dry_run, Ordering::Relaxed);
    }

    /// Validate and execute one invocation on behalf of `agent_id`.
    ///
    /// Never fails outward: validation failures, safety refusals, and handler
    /// errors are folded into the returned result value so the calling agent
    /// treats them as a no-op for that action and continues.
    #[tracing::instrument(name = "tool.execute", skip_all, fields(tool = %tool_name, agent = %agent_id))]
    pub async fn execute(&self, tool_name: &str, args: Value, agent_id: &str) -> Value {
        let dry_run = self.dry_run();

        let (result, status) = 'eval: {
            let Some(tool) = self.get(tool_name) else {
                break 'eval (
                    json!({"error": format!("unknown tool: {tool_name}"), "executed": false}),
                    "unknown_tool",
                );
            };

            if let Err(message) = validate_args(&tool.parameters_schema(), &args) {
                break 'eval (
                    json!({"error": message, "executed": false}),
                    "validation_failed",
                );
            }

            // Dry-run short-circuits before any handler runs; read-only
            // tools ignore the flag.
            if dry_run && tool.mutating() {
                break 'eval (
                    json!({
                        "action": tool_name,
                        "parameters": args,
                        "executed": false,
                        "dry_run": true,
                        "message": "Dry-run mode: action logged but not executed",
                    }),
                    "dry_run",
                );
            }

            match tool.execute(args.clone()).await {
                Ok(value) => (value, "success"),
                Err(e) => (
                    json!({"error": e.to_string(), "executed": false}),
                    "error",
                ),
            }
        };

        let entry = json!({
            "timestamp": Utc::now().to_rfc3339(),
            "agent_id": agent_id,
            "tool": tool_name,
            "parameters": args,
            "dry_run": dry_run,
            "status": status,
            "result": result,
        });
        if let Err(e) = self.log.append(agent_id, &entry) {
            log::warn!("failed to write decision log for {agent_id}/{tool_name}: {e}");
        }

        result
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────
