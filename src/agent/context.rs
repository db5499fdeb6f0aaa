//! Context gathering: the snapshot of entity states an agent reasons over.
//!
//! Agents with configured entities read exactly those.  Agents without go
//! through discovery: a semantic lookup against the instruction first, then a
//! heuristic sweep over the controllable-domain subset of the registry,
//! capped at [`DISCOVERY_CAP`] items.

use std::sync::{Arc, OnceLock};

use chrono::Local;
use regex::Regex;
use serde_json::Value;

use crate::{
    bus::{BusHandle, DeviceBus, EntityState},
    tools::KnowledgeStore,
};

use super::spec::AgentSpec;

pub const CONTROL_DOMAINS: &[&str] = &["climate", "light", "switch", "lock", "cover"];
pub const SENSOR_DOMAINS: &[&str] = &["sensor", "binary_sensor"];
pub const DISCOVERY_CAP: usize = 50;

fn entity_id_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b([a-z][a-z0-9_]*\.[a-z0-9_]+)\b").unwrap())
}

/// Snapshot handed to `decide()`.
#[derive(Debug, Clone)]
pub struct AgentContext {
    pub timestamp: String,
    pub state_description: String,
    /// Domains present in the observed entities, for service discovery.
    pub observed_domains: Vec<String>,
}

/// Gather the agent's context.  Never fails: bus errors are folded into the
/// state description so the decision prompt can say so.
pub async fn gather(
    spec: &AgentSpec,
    bus: &BusHandle,
    knowledge: &Arc<dyn KnowledgeStore>,
) -> AgentContext {
    let timestamp = chrono::Utc::now().to_rfc3339();

    let (state_description, observed_domains) = if spec.entities.is_empty() {
        discover(spec, bus, knowledge).await
    } else {
        configured(spec, bus).await
    };

    AgentContext {
        timestamp,
        state_description,
        observed_domains,
    }
}

/// Read the configured entities one by one; unavailable entities are noted
/// inline rather than failing the snapshot.
async fn configured(spec: &AgentSpec, bus: &BusHandle) -> (String, Vec<String>) {
    let mut lines = Vec::with_capacity(spec.entities.len() + 1);

    match bus.get() {
        Ok(client) => {
            for entity_id in &spec.entities {
                match client.get_state(entity_id).await {
                    Ok(state) => lines.push(describe(&state)),
                    Err(e) => lines.push(format!("- {entity_id}: unavailable ({e})")),
                }
            }
        }
        Err(e) => lines.push(format!("Error: device bus unavailable ({e})")),
    }

    lines.push(time_line());
    (lines.join("\n"), spec.entity_domains())
}

/// Dynamic discovery for agents with no configured entities.
async fn discover(
    spec: &AgentSpec,
    bus: &BusHandle,
    knowledge: &Arc<dyn KnowledgeStore>,
) -> (String, Vec<String>) {
    let client = match bus.get() {
        Ok(client) => client,
        Err(e) => {
            return (
                format!("Error: could not discover entities ({e})"),
                Vec::new(),
            )
        }
    };

    // 1. Semantic lookup against the instruction.
    let semantic_ids = semantic_entity_ids(spec, knowledge).await;
    if !semantic_ids.is_empty() {
        let mut lines = vec!["Semantic entity discovery (instruction-based):".to_string()];
        let mut domains = Vec::new();
        for entity_id in &semantic_ids {
            if let Ok(state) = client.get_state(entity_id).await {
                push_domain(&mut domains, state.domain());
                lines.push(describe(&state));
            }
        }
        if lines.len() > 1 {
            lines.push(time_line());
            return (lines.join("\n"), domains);
        }
    }

    // 2. Heuristic sweep: controllable domains first, capped.
    match client.get_states(None).await {
        Ok(mut states) => {
            states.sort_by(|a, b| {
                let rank = |s: &EntityState| usize::from(!CONTROL_DOMAINS.contains(&s.domain()));
                rank(a)
                    .cmp(&rank(b))
                    .then_with(|| a.entity_id.cmp(&b.entity_id))
            });

            let mut lines = vec!["Dynamic entity discovery (fallback heuristic):".to_string()];
            let mut domains = Vec::new();
            for state in states
                .iter()
                .filter(|s| {
                    CONTROL_DOMAINS.contains(&s.domain()) || SENSOR_DOMAINS.contains(&s.domain())
                })
                .take(DISCOVERY_CAP)
            {
                push_domain(&mut domains, state.domain());
                lines.push(describe(state));
            }
            lines.push(time_line());
            (lines.join("\n"), domains)
        }
        Err(e) => (
            format!("Error: could not discover entities ({e})"),
            Vec::new(),
        ),
    }
}

/// Ask the knowledge store for entities relevant to the instruction and pull
/// `domain.name` ids out of the hit text.
async fn semantic_entity_ids(spec: &AgentSpec, knowledge: &Arc<dyn KnowledgeStore>) -> Vec<String> {
    let hits = knowledge.search(&spec.instruction, 10).await;
    let mut ids = Vec::new();
    for hit in hits {
        for capture in entity_id_pattern().captures_iter(&hit.content) {
            let id = capture[1].to_string();
            if !ids.contains(&id) {
                ids.push(id);
            }
        }
    }
    ids
}

fn describe(state: &EntityState) -> String {
    format!(
        "- {} ({}): {}",
        state.friendly_name(),
        state.entity_id,
        state.state
    )
}

fn time_line() -> String {
    format!("- Time: {}", Local::now().format("%H:%M"))
}

fn push_domain(domains: &mut Vec<String>, domain: &str) {
    if !domains.iter().any(|d| d == domain) {
        domains.push(domain.to_string());
    }
}

/// Serialisable form for log entries.
pub fn context_json(context: &AgentContext) -> Value {
    serde_json::json!({
        "timestamp": context.timestamp,
        "state_description": context.state_description,
    })
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        bus::client::EventCallback,
        error::BusError,
        tools::{KnowledgeHit, NullKnowledge},
    };
    use async_trait::async_trait;
    use serde_json::json;

    struct FakeBus {
        states: Vec<EntityState>,
    }

    impl FakeBus {
        fn new(states: Value) -> Arc<Self> {
            Arc::new(Self {
                states: serde_json::from_value(states).unwrap(),
            })
        }
    }

    #[async_trait]
    impl DeviceBus for FakeBus {
        async fn get_states(&self, entity_id: Option<&str>) -> Result<Vec<EntityState>, BusError> {
            match entity_id {
                None => Ok(self.states.clone()),
                Some(id) => self
                    .states
                    .iter()
                    .find(|s| s.entity_id == id)
                    .cloned()
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
            Ok(Value::Null)
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

    fn spec(entities: Vec<&str>) -> AgentSpec {
        AgentSpec {
            id: "heating".to_string(),
            name: "Heating Agent".to_string(),
            instruction: "keep the bedroom warm".to_string(),
            entities: entities.into_iter().map(str::to_owned).collect(),
            model: None,
            decision_interval: 120,
            knowledge: String::new(),
        }
    }

    fn null_knowledge() -> Arc<dyn KnowledgeStore> {
        Arc::new(NullKnowledge)
    }

    #[tokio::test]
    async fn configured_entities_are_listed_with_friendly_names() {
        let bus = BusHandle::with_bus(FakeBus::new(json!([
            {"entity_id": "climate.bedroom", "state": "heat",
             "attributes": {"friendly_name": "Bedroom Thermostat"}}
        ])));
        let context = gather(&spec(vec!["climate.bedroom"]), &bus, &null_knowledge()).await;

        assert!(context
            .state_description
            .contains("- Bedroom Thermostat (climate.bedroom): heat"));
        assert!(context.state_description.contains("- Time:"));
        assert_eq!(context.observed_domains, vec!["climate"]);
    }

    #[tokio::test]
    async fn missing_configured_entity_is_noted_inline() {
        let bus = BusHandle::with_bus(FakeBus::new(json!([])));
        let context = gather(&spec(vec!["climate.ghost"]), &bus, &null_knowledge()).await;
        assert!(context.state_description.contains("climate.ghost: unavailable"));
    }

    #[tokio::test]
    async fn disconnected_bus_is_reported_not_fatal() {
        let context = gather(&spec(vec!["climate.bedroom"]), &BusHandle::new(), &null_knowledge()).await;
        assert!(context.state_description.contains("device bus unavailable"));
    }

    #[tokio::test]
    async fn heuristic_discovery_prefers_controllable_domains_and_caps() {
        let mut states = Vec::new();
        // 60 sensors and 3 controllable entities; the cap is 50 and the
        // controllable ones must sort first.
        for i in 0..60 {
            states.push(json!({"entity_id": format!("sensor.s{i:02}"), "state": "1"}));
        }
        states.push(json!({"entity_id": "light.kitchen", "state": "on"}));
        states.push(json!({"entity_id": "climate.bedroom", "state": "heat"}));
        states.push(json!({"entity_id": "weather.home", "state": "sunny"}));

        let bus = BusHandle::with_bus(FakeBus::new(Value::Array(states)));
        let context = gather(&spec(vec![]), &bus, &null_knowledge()).await;

        assert!(context.state_description.contains("fallback heuristic"));
        assert!(context.state_description.contains("light.kitchen"));
        assert!(context.state_description.contains("climate.bedroom"));
        // Uncontrollable, unlisted domain is filtered out.
        assert!(!context.state_description.contains("weather.home"));
        // Cap: header + 50 entities + time line.
        assert_eq!(context.state_description.lines().count(), 52);
        assert!(context.observed_domains.contains(&"climate".to_string()));
    }

    struct EntityKnowledge;

    #[async_trait]
    impl KnowledgeStore for EntityKnowledge {
        async fn search(&self, _query: &str, _limit: usize) -> Vec<KnowledgeHit> {
            vec![KnowledgeHit {
                content: "Entity: climate.bedroom (Bedroom) - Domain: climate".to_string(),
                source: "entity_registry".to_string(),
                relevance: 0.92,
            }]
        }
    }

    #[tokio::test]
    async fn semantic_discovery_wins_when_hits_resolve() {
        let bus = BusHandle::with_bus(FakeBus::new(json!([
            {"entity_id": "climate.bedroom", "state": "heat"},
            {"entity_id": "light.kitchen", "state": "on"}
        ])));
        let knowledge: Arc<dyn KnowledgeStore> = Arc::new(EntityKnowledge);
        let context = gather(&spec(vec![]), &bus, &knowledge).await;

        assert!(context.state_description.contains("Semantic entity discovery"));
        assert!(context.state_description.contains("climate.bedroom"));
        assert!(!context.state_description.contains("light.kitchen"));
    }

    #[test]
    fn entity_id_pattern_extracts_ids() {
        let text = "Entity: light.living_room (Living Room) next to sensor.temp_1";
        let ids: Vec<&str> = entity_id_pattern()
            .captures_iter(text)
            .map(|c| c.get(1).unwrap().as_str())
            .collect();
        assert_eq!(ids, vec!["light.living_room", "sensor.temp_1"]);
    }
}
