//! The task and progress ledgers.
//!
//! The progress ledger is cumulative: each agent's most recent decision plus
//! the time it landed.  The orchestrator's aggregate step takes the entries
//! stamped after cycle start, which gives per-cycle behaviour without
//! discarding the last-known decision other readers use.

use std::{
    collections::HashMap,
    sync::{Mutex, RwLock},
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::agent::Decision;

// ─── Task ────────────────────────────────────────────────────────────────────

/// Task priority, as planned by the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TaskPriority {
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

impl TaskPriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

/// A unit of work assigned (advisorily) to an agent.  Never retried by the
/// orchestrator — the agent's own loop is the retry vehicle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub task_id: String,
    pub agent_id: String,
    pub description: String,
    #[serde(default)]
    pub priority: TaskPriority,
    #[serde(default)]
    pub context: Value,
    pub created_at: DateTime<Utc>,
}

impl Task {
    pub fn new(
        agent_id: impl Into<String>,
        description: impl Into<String>,
        priority: TaskPriority,
        context: Value,
    ) -> Self {
        Self {
            task_id: format!("task_{}", Uuid::new_v4()),
            agent_id: agent_id.into(),
            description: description.into(),
            priority,
            context,
            created_at: Utc::now(),
        }
    }
}

// ─── TaskLedger ──────────────────────────────────────────────────────────────

/// Default retention per agent when pruning at cycle boundaries.
pub const TASK_RETENTION_PER_AGENT: usize = 100;

/// Unbounded in steady state; the orchestrator prunes at cycle boundaries.
#[derive(Default)]
pub struct TaskLedger {
    tasks: Mutex<Vec<Task>>,
}

impl TaskLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&self, task: Task) {
        if let Ok(mut tasks) = self.tasks.lock() {
            tasks.push(task);
        }
    }

    pub fn snapshot(&self) -> Vec<Task> {
        self.tasks
            .lock()
            .map(|tasks| tasks.clone())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.tasks.lock().map(|tasks| tasks.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop the oldest entries beyond `retain_per_agent` for each agent.
    pub fn prune(&self, retain_per_agent: usize) {
        let Ok(mut tasks) = self.tasks.lock() else {
            return;
        };
        let mut seen: HashMap<String, usize> = HashMap::new();
        // Iterate newest-first so the newest N per agent survive.
        let mut keep: Vec<bool> = vec![false; tasks.len()];
        for (index, task) in tasks.iter().enumerate().rev() {
            let count = seen.entry(task.agent_id.clone()).or_insert(0);
            if *count < retain_per_agent {
                *count += 1;
                keep[index] = true;
            }
        }
        let mut index = 0;
        tasks.retain(|_| {
            let kept = keep[index];
            index += 1;
            kept
        });
    }
}

// ─── ProgressLedger ──────────────────────────────────────────────────────────

/// A decision plus the instant it was recorded.
#[derive(Debug, Clone)]
pub struct RecordedDecision {
    pub decision: Decision,
    pub at: DateTime<Utc>,
}

/// agent id → most recent decision.
#[derive(Default)]
pub struct ProgressLedger {
    entries: RwLock<HashMap<String, RecordedDecision>>,
}

impl ProgressLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, decision: Decision) {
        if let Ok(mut entries) = self.entries.write() {
            entries.insert(
                decision.agent_id.clone(),
                RecordedDecision {
                    decision,
                    at: Utc::now(),
                },
            );
        }
    }

    pub fn latest(&self, agent_id: &str) -> Option<RecordedDecision> {
        self.entries.read().ok()?.get(agent_id).cloned()
    }

    /// Decisions recorded at or after `since` — the current cycle's view.
    pub fn decisions_since(&self, since: DateTime<Utc>) -> Vec<Decision> {
        self.entries
            .read()
            .map(|entries| {
                entries
                    .values()
                    .filter(|entry| entry.at >= since)
                    .map(|entry| entry.decision.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|entries| entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────
