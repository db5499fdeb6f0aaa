//! Climate tools: set-point, HVAC mode, and state readout.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Map, Value};

use crate::{
    bus::{BusHandle, DeviceBus},
    error::ToolError,
};

use super::{safety::SafetyConfig, traits::Tool};

const HVAC_MODES: &[&str] = &["heat", "cool", "auto", "off", "dry", "fan_only"];

// ─── set_temperature ─────────────────────────────────────────────────────────

pub struct SetTemperature {
    bus: BusHandle,
    safety: Arc<SafetyConfig>,
}

impl SetTemperature {
    pub fn new(bus: BusHandle, safety: Arc<SafetyConfig>) -> Self {
        Self { bus, safety }
    }

    /// Bounds check shared with the universal tool's cross-validation.
    pub fn check_bounds(safety: &SafetyConfig, temperature: f64) -> Result<(), ToolError> {
        if temperature < safety.min_temp || temperature > safety.max_temp {
            return Err(ToolError::InvalidArguments(format!(
                "temperature must be between {}°C and {}°C, got {temperature}°C",
                safety.min_temp, safety.max_temp
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl Tool for SetTemperature {
    fn name(&self) -> &str {
        "set_temperature"
    }

    fn description(&self) -> &str {
        "Set target temperature for a climate entity"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "entity_id": {"type": "string", "description": "Climate entity ID"},
                "temperature": {
                    "type": "number",
                    "description": "Target temperature",
                    "minimum": self.safety.min_temp,
                    "maximum": self.safety.max_temp
                },
                "hvac_mode": {"type": "string", "enum": HVAC_MODES}
            },
            "required": ["entity_id", "temperature"]
        })
    }

    async fn execute(&self, args: Value) -> Result<Value, ToolError> {
        let entity_id = args["entity_id"].as_str().unwrap_or_default().to_string();
        // The raw requested value feeds both checks; rounding it first would
        // let a 23.01-from-20.0 jump slip under a 3.0 limit.
        let temperature = args["temperature"].as_f64().unwrap_or_default();
        let hvac_mode = args["hvac_mode"].as_str().map(str::to_owned);

        Self::check_bounds(&self.safety, temperature)?;

        let bus = self.bus.get()?;

        // Refuse large jumps relative to the current set-point.  An
        // unreadable current target is not fatal; the bounds check above
        // still applies.
        match bus.climate_state(&entity_id).await {
            Ok(state) => {
                if let Some(current) = state.target_temperature {
                    let change = (temperature - current).abs();
                    if change > self.safety.max_temp_change {
                        return Err(ToolError::InvalidArguments(format!(
                            "temperature change too large: {change:.1}°C (max {}°C per decision); current target {current}°C",
                            self.safety.max_temp_change
                        )));
                    }
                }
            }
            Err(e) => log::warn!("could not check current temperature for {entity_id}: {e}"),
        }

        let mut data = Map::new();
        data.insert("temperature".to_string(), json!(temperature));
        if let Some(mode) = &hvac_mode {
            data.insert("hvac_mode".to_string(), json!(mode));
        }

        let result = bus
            .call_service("climate", "set_temperature", Some(&entity_id), Value::Object(data))
            .await?;

        Ok(json!({
            "action": "set_temperature",
            "entity_id": entity_id,
            "temperature": temperature,
            "hvac_mode": hvac_mode,
            "executed": true,
            "bus_result": result,
        }))
    }
}

// ─── set_hvac_mode ───────────────────────────────────────────────────────────

pub struct SetHvacMode {
    bus: BusHandle,
}

impl SetHvacMode {
    pub fn new(bus: BusHandle) -> Self {
        Self { bus }
    }
}

#[async_trait]
impl Tool for SetHvacMode {
    fn name(&self) -> &str {
        "set_hvac_mode"
    }

    fn description(&self) -> &str {
        "Set HVAC mode for a climate entity"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "entity_id": {"type": "string", "description": "Climate entity ID"},
                "hvac_mode": {"type": "string", "enum": HVAC_MODES}
            },
            "required": ["entity_id", "hvac_mode"]
        })
    }

    async fn execute(&self, args: Value) -> Result<Value, ToolError> {
        let entity_id = args["entity_id"].as_str().unwrap_or_default();
        let hvac_mode = args["hvac_mode"].as_str().unwrap_or_default();

        let result = self
            .bus
            .get()?
            .call_service(
                "climate",
                "set_hvac_mode",
                Some(entity_id),
                json!({"hvac_mode": hvac_mode}),
            )
            .await?;

        Ok(json!({
            "action": "set_hvac_mode",
            "entity_id": entity_id,
            "hvac_mode": hvac_mode,
            "executed": true,
            "bus_result": result,
        }))
    }
}

// ─── get_climate_state ───────────────────────────────────────────────────────

pub struct GetClimateState {
    bus: BusHandle,
}

impl GetClimateState {
    pub fn new(bus: BusHandle) -> Self {
        Self { bus }
    }
}

#[async_trait]
impl Tool for GetClimateState {
    fn name(&self) -> &str {
        "get_climate_state"
    }

    fn description(&self) -> &str {
        "Get current state of a climate entity"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "entity_id": {"type": "string", "description": "Climate entity ID"}
            },
            "required": ["entity_id"]
        })
    }

    fn mutating(&self) -> bool {
        false
    }

    async fn execute(&self, args: Value) -> Result<Value, ToolError> {
        let entity_id = args["entity_id"].as_str().unwrap_or_default();
        let state = self.bus.get()?.climate_state(entity_id).await?;
        serde_json::to_value(&state)
            .map_err(|e| ToolError::InvalidArguments(format!("unserialisable state: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        bus::{client::EventCallback, EntityState},
        error::BusError,
    };
    use async_trait::async_trait;

    /// Serves one climate entity with a 20.0 °C target and acknowledges
    /// every service call.
    struct FakeClimateBus;

    #[async_trait]
    impl DeviceBus for FakeClimateBus {
        async fn get_states(&self, entity_id: Option<&str>) -> Result<Vec<EntityState>, BusError> {
            let state: EntityState = serde_json::from_value(json!({
                "entity_id": "climate.bedroom", "state": "heat",
                "attributes": {"temperature": 20.0, "current_temperature": 19.0}
            }))
            .unwrap();
            match entity_id {
                Some("climate.bedroom") | None => Ok(vec![state]),
                Some(other) => Err(BusError::EntityNotFound(other.to_string())),
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

    fn set_temperature() -> SetTemperature {
        SetTemperature::new(
            BusHandle::with_bus(Arc::new(FakeClimateBus)),
            Arc::new(SafetyConfig::default()),
        )
    }

    #[test]
    fn bounds_check_is_inclusive() {
        let safety = SafetyConfig::default();
        assert!(SetTemperature::check_bounds(&safety, 10.0).is_ok());
        assert!(SetTemperature::check_bounds(&safety, 30.0).is_ok());
        assert!(SetTemperature::check_bounds(&safety, 9.9).is_err());
        assert!(SetTemperature::check_bounds(&safety, 30.1).is_err());
    }

    #[tokio::test]
    async fn rate_limit_rejects_jump_past_current_target() {
        // Current target is 20.0; 23.01 exceeds max_temp_change = 3.0 and the
        // raw requested value must be what gets compared.
        let tool = set_temperature();
        let err = tool
            .execute(json!({"entity_id": "climate.bedroom", "temperature": 23.01}))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("too large"), "got: {err}");
    }

    #[tokio::test]
    async fn rate_limit_allows_change_within_the_limit() {
        let tool = set_temperature();
        let result = tool
            .execute(json!({"entity_id": "climate.bedroom", "temperature": 22.5}))
            .await
            .unwrap();
        assert_eq!(result["executed"], true);
        assert_eq!(result["temperature"], 22.5);
    }

    #[test]
    fn schema_carries_configured_bounds() {
        let mut safety = SafetyConfig::default();
        safety.min_temp = 12.0;
        safety.max_temp = 28.0;
        let tool = SetTemperature::new(BusHandle::new(), Arc::new(safety));
        let schema = tool.parameters_schema();
        assert_eq!(schema["properties"]["temperature"]["minimum"], 12.0);
        assert_eq!(schema["properties"]["temperature"]["maximum"], 28.0);
    }

    #[test]
    fn readout_is_read_only_setters_are_not() {
        let safety = Arc::new(SafetyConfig::default());
        assert!(SetTemperature::new(BusHandle::new(), safety).mutating());
        assert!(SetHvacMode::new(BusHandle::new()).mutating());
        assert!(!GetClimateState::new(BusHandle::new()).mutating());
    }
}
