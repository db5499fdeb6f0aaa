//! Agent runtime status and decision payloads.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::approval::ImpactLevel;

// ─── AgentStatus ─────────────────────────────────────────────────────────────

/// Where an agent's loop currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    Initializing,
    Idle,
    Deciding,
    Error,
}

impl AgentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Initializing => "initializing",
            Self::Idle => "idle",
            Self::Deciding => "deciding",
            Self::Error => "error",
        }
    }
}

impl std::fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─── ActionCall ──────────────────────────────────────────────────────────────

/// One proposed tool invocation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ActionCall {
    pub tool: String,
    #[serde(default)]
    pub parameters: Value,
}

impl ActionCall {
    pub fn new(tool: impl Into<String>, parameters: Value) -> Self {
        Self {
            tool: tool.into(),
            parameters,
        }
    }

    /// The `entity_id` parameter, when present.
    pub fn entity_id(&self) -> Option<&str> {
        self.parameters.get("entity_id").and_then(Value::as_str)
    }
}

// ─── Decision ────────────────────────────────────────────────────────────────

fn default_confidence() -> f32 {
    1.0
}

/// One agent's proposed actions plus reasoning for one cycle.  `actions` may
/// be empty (an explicit no-op).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Decision {
    pub agent_id: String,
    #[serde(default)]
    pub reasoning: String,
    #[serde(default)]
    pub actions: Vec<ActionCall>,
    #[serde(default = "default_confidence")]
    pub confidence: f32,
    #[serde(default)]
    pub impact_level: ImpactLevel,
}

impl Decision {
    /// An explicit no-op decision.
    pub fn noop(agent_id: impl Into<String>, reasoning: impl Into<String>) -> Self {
        Self {
            agent_id: agent_id.into(),
            reasoning: reasoning.into(),
            actions: Vec::new(),
            confidence: 0.0,
            impact_level: ImpactLevel::Low,
        }
    }

    pub fn is_noop(&self) -> bool {
        self.actions.is_empty()
    }

    /// Entity ids touched by this decision's actions.
    pub fn touched_entities(&self) -> Vec<&str> {
        self.actions
            .iter()
            .filter_map(ActionCall::entity_id)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decision_defaults_fill_in() {
        let decision: Decision =
            serde_json::from_value(json!({"agent_id": "heating"})).unwrap();
        assert!(decision.is_noop());
        assert_eq!(decision.confidence, 1.0);
        assert_eq!(decision.impact_level, ImpactLevel::Low);
    }

    #[test]
    fn touched_entities_reads_parameters() {
        let decision = Decision {
            agent_id: "lighting".to_string(),
            reasoning: String::new(),
            actions: vec![
                ActionCall::new("turn_on_light", json!({"entity_id": "light.kitchen"})),
                ActionCall::new("log", json!({"message": "no entity"})),
            ],
            confidence: 1.0,
            impact_level: ImpactLevel::Low,
        };
        assert_eq!(decision.touched_entities(), vec!["light.kitchen"]);
    }

    #[test]
    fn status_strings_round_trip() {
        let status: AgentStatus = serde_json::from_str("\"deciding\"").unwrap();
        assert_eq!(status, AgentStatus::Deciding);
        assert_eq!(status.to_string(), "deciding");
    }
}
