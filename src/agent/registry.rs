//! The shared agent registry: id → runtime handle.
//!
//! Shared between the configuration surface (add/remove/edit agents) and the
//! orchestrator (iteration).  Mutations are atomic with respect to iteration
//! via copy-on-iterate snapshots.

use std::{
    collections::HashMap,
    sync::{Arc, RwLock},
};

use chrono::{DateTime, Utc};

use super::{spec::AgentSpec, types::AgentStatus};

/// Runtime wrapper around one agent's spec plus mutable status.
pub struct AgentHandle {
    spec: RwLock<AgentSpec>,
    status: RwLock<AgentStatus>,
    last_decision_at: RwLock<Option<DateTime<Utc>>>,
}

impl AgentHandle {
    pub fn new(spec: AgentSpec) -> Arc<Self> {
        Arc::new(Self {
            spec: RwLock::new(spec),
            status: RwLock::new(AgentStatus::Initializing),
            last_decision_at: RwLock::new(None),
        })
    }

    pub fn id(&self) -> String {
        self.spec_snapshot().id
    }

    /// A copy of the current spec.  Loops re-read this each cycle, which is
    /// what makes hot reload take effect without a restart.
    pub fn spec_snapshot(&self) -> AgentSpec {
        self.spec
            .read()
            .map(|s| s.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }

    /// Replace the spec; the running loop picks it up next cycle.
    pub fn update_spec(&self, spec: AgentSpec) {
        if let Ok(mut slot) = self.spec.write() {
            *slot = spec;
        }
    }

    pub fn status(&self) -> AgentStatus {
        self.status
            .read()
            .map(|s| *s)
            .unwrap_or(AgentStatus::Error)
    }

    pub fn set_status(&self, status: AgentStatus) {
        if let Ok(mut slot) = self.status.write() {
            *slot = status;
        }
    }

    pub fn last_decision_at(&self) -> Option<DateTime<Utc>> {
        self.last_decision_at.read().ok().and_then(|t| *t)
    }

    pub fn mark_decided(&self) {
        if let Ok(mut slot) = self.last_decision_at.write() {
            *slot = Some(Utc::now());
        }
    }
}

/// Map of id → agent handle.
#[derive(Default)]
pub struct AgentRegistry {
    agents: RwLock<HashMap<String, Arc<AgentHandle>>>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a handle for `spec`.  Replaces any existing handle with the
    /// same id and returns the new one.
    pub fn insert(&self, spec: AgentSpec) -> Arc<AgentHandle> {
        let handle = AgentHandle::new(spec.clone());
        if let Ok(mut agents) = self.agents.write() {
            agents.insert(spec.id, Arc::clone(&handle));
        }
        handle
    }

    pub fn remove(&self, id: &str) -> Option<Arc<AgentHandle>> {
        self.agents.write().ok()?.remove(id)
    }

    pub fn get(&self, id: &str) -> Option<Arc<AgentHandle>> {
        self.agents.read().ok()?.get(id).cloned()
    }

    /// Copy-on-iterate snapshot of all handles.
    pub fn snapshot(&self) -> Vec<Arc<AgentHandle>> {
        self.agents
            .read()
            .map(|agents| agents.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn ids(&self) -> Vec<String> {
        self.agents
            .read()
            .map(|agents| agents.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.agents.read().map(|agents| agents.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
