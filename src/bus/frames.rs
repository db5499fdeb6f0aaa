//! Typed views over device-bus frames.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// ─── EntityState ─────────────────────────────────────────────────────────────

/// One entity's state as reported by the bus registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityState {
    pub entity_id: String,
    pub state: String,
    #[serde(default)]
    pub attributes: Map<String, Value>,
    #[serde(default)]
    pub last_changed: Option<DateTime<Utc>>,
}

impl EntityState {
    /// The `domain` part of `domain.name`.
    pub fn domain(&self) -> &str {
        self.entity_id
            .split_once('.')
            .map(|(domain, _)| domain)
            .unwrap_or(&self.entity_id)
    }

    /// Human-readable name, falling back to the entity id.
    pub fn friendly_name(&self) -> &str {
        self.attributes
            .get("friendly_name")
            .and_then(Value::as_str)
            .unwrap_or(&self.entity_id)
    }
}

// ─── ClimateState ────────────────────────────────────────────────────────────

/// Climate-entity projection with temperature and HVAC info pulled out of the
/// attribute bag.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClimateState {
    pub entity_id: String,
    pub state: String,
    pub current_temperature: Option<f64>,
    pub target_temperature: Option<f64>,
    pub hvac_mode: Option<String>,
    pub preset_mode: Option<String>,
    pub attributes: Map<String, Value>,
}

impl From<EntityState> for ClimateState {
    fn from(entity: EntityState) -> Self {
        let attr_f64 = |key: &str| entity.attributes.get(key).and_then(Value::as_f64);
        let attr_str = |key: &str| {
            entity
                .attributes
                .get(key)
                .and_then(Value::as_str)
                .map(str::to_owned)
        };
        Self {
            current_temperature: attr_f64("current_temperature"),
            target_temperature: attr_f64("temperature"),
            hvac_mode: attr_str("hvac_mode"),
            preset_mode: attr_str("preset_mode"),
            entity_id: entity.entity_id,
            state: entity.state,
            attributes: entity.attributes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn entity(value: Value) -> EntityState {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn domain_splits_entity_id() {
        let e = entity(json!({"entity_id": "light.kitchen", "state": "on"}));
        assert_eq!(e.domain(), "light");
    }

    #[test]
    fn friendly_name_falls_back_to_id() {
        let named = entity(json!({
            "entity_id": "light.kitchen",
            "state": "on",
            "attributes": {"friendly_name": "Kitchen Light"}
        }));
        assert_eq!(named.friendly_name(), "Kitchen Light");

        let bare = entity(json!({"entity_id": "light.hall", "state": "off"}));
        assert_eq!(bare.friendly_name(), "light.hall");
    }

    #[test]
    fn climate_projection_reads_attributes() {
        let e = entity(json!({
            "entity_id": "climate.bedroom",
            "state": "heat",
            "attributes": {
                "current_temperature": 19.5,
                "temperature": 21.0,
                "hvac_mode": "heat",
                "preset_mode": "comfort"
            }
        }));
        let climate = ClimateState::from(e);
        assert_eq!(climate.current_temperature, Some(19.5));
        assert_eq!(climate.target_temperature, Some(21.0));
        assert_eq!(climate.hvac_mode.as_deref(), Some("heat"));
        assert_eq!(climate.preset_mode.as_deref(), Some("comfort"));
    }

    #[test]
    fn climate_projection_tolerates_missing_attributes() {
        let e = entity(json!({"entity_id": "climate.attic", "state": "off"}));
        let climate = ClimateState::from(e);
        assert!(climate.current_temperature.is_none());
        assert!(climate.target_temperature.is_none());
    }

    #[test]
    fn registry_dump_deserializes() {
        let states: Vec<EntityState> = serde_json::from_value(json!([
            {"entity_id": "light.kitchen", "state": "on",
             "attributes": {}, "last_changed": "2025-06-01T12:00:00Z"},
            {"entity_id": "sensor.outdoor", "state": "14.2"}
        ]))
        .unwrap();
        assert_eq!(states.len(), 2);
        assert!(states[0].last_changed.is_some());
        assert!(states[1].last_changed.is_none());
    }
}
