//! Agent configuration as it appears in the agents file.

use serde::{Deserialize, Serialize};

fn default_decision_interval() -> u64 {
    120
}

/// One agent's configuration.  Mutable at runtime: edits through the config
/// surface take effect on the agent's next decision cycle.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentSpec {
    /// Unique per process (the agents file rejects duplicates).
    pub id: String,
    pub name: String,
    /// Free-text primary instruction driving every decision cycle.
    pub instruction: String,
    /// Entities this agent controls.  Empty means dynamic discovery.
    #[serde(default)]
    pub entities: Vec<String>,
    /// Model override; falls back to the process default.
    #[serde(default)]
    pub model: Option<String>,
    /// Seconds between decision cycles.
    #[serde(default = "default_decision_interval")]
    pub decision_interval: u64,
    /// Free-text background knowledge injected into every prompt.
    #[serde(default)]
    pub knowledge: String,
}

impl AgentSpec {
    /// Unique domains among the configured entities, in first-seen order.
    pub fn entity_domains(&self) -> Vec<String> {
        let mut domains: Vec<String> = Vec::new();
        for entity in &self.entities {
            let domain = entity.split('.').next().unwrap_or_default();
            if !domain.is_empty() && !domains.iter().any(|d| d == domain) {
                domains.push(domain.to_string());
            }
        }
        domains
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn yaml_entry_deserialises_with_defaults() {
        let spec: AgentSpec = serde_yaml::from_str(
            r#"
id: heating
name: Heating Agent
instruction: Keep the bedroom warm overnight.
"#,
        )
        .unwrap();
        assert_eq!(spec.id, "heating");
        assert_eq!(spec.decision_interval, 120);
        assert!(spec.entities.is_empty());
        assert!(spec.model.is_none());
        assert!(spec.knowledge.is_empty());
    }

    #[test]
    fn entity_domains_are_unique_and_ordered() {
        let spec = AgentSpec {
            id: "mixed".to_string(),
            name: "Mixed".to_string(),
            instruction: String::new(),
            entities: vec![
                "climate.bedroom".to_string(),
                "climate.living".to_string(),
                "sensor.outdoor".to_string(),
            ],
            model: None,
            decision_interval: 120,
            knowledge: String::new(),
        };
        assert_eq!(spec.entity_domains(), vec!["climate", "sensor"]);
    }
}
