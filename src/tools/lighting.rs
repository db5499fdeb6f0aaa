//! Lighting tools: on/off, brightness, colour temperature.

use async_trait::async_trait;
use serde_json::{json, Map, Value};

use crate::{
    bus::{BusHandle, DeviceBus},
    error::ToolError,
};

use super::traits::Tool;

// ─── turn_on_light ───────────────────────────────────────────────────────────

pub struct TurnOnLight {
    bus: BusHandle,
}

impl TurnOnLight {
    pub fn new(bus: BusHandle) -> Self {
        Self { bus }
    }
}

#[async_trait]
impl Tool for TurnOnLight {
    fn name(&self) -> &str {
        "turn_on_light"
    }

    fn description(&self) -> &str {
        "Turn on a light with optional brightness and color temperature"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "entity_id": {"type": "string"},
                "brightness": {"type": "integer", "minimum": 0, "maximum": 100},
                "color_temp": {"type": "integer", "minimum": 2700, "maximum": 6500}
            },
            "required": ["entity_id"]
        })
    }

    async fn execute(&self, args: Value) -> Result<Value, ToolError> {
        let entity_id = args["entity_id"].as_str().unwrap_or_default();

        let mut data = Map::new();
        if let Some(brightness) = args["brightness"].as_i64() {
            data.insert("brightness_pct".to_string(), json!(brightness));
        }
        if let Some(color_temp) = args["color_temp"].as_i64() {
            data.insert("color_temp".to_string(), json!(color_temp));
        }

        let result = self
            .bus
            .get()?
            .call_service("light", "turn_on", Some(entity_id), Value::Object(data))
            .await?;

        Ok(json!({
            "action": "turn_on_light",
            "entity_id": entity_id,
            "executed": true,
            "bus_result": result,
        }))
    }
}

// ─── turn_off_light ──────────────────────────────────────────────────────────

pub struct TurnOffLight {
    bus: BusHandle,
}

impl TurnOffLight {
    pub fn new(bus: BusHandle) -> Self {
        Self { bus }
    }
}

#[async_trait]
impl Tool for TurnOffLight {
    fn name(&self) -> &str {
        "turn_off_light"
    }

    fn description(&self) -> &str {
        "Turn off a light"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {"entity_id": {"type": "string"}},
            "required": ["entity_id"]
        })
    }

    async fn execute(&self, args: Value) -> Result<Value, ToolError> {
        let entity_id = args["entity_id"].as_str().unwrap_or_default();
        let result = self
            .bus
            .get()?
            .call_service("light", "turn_off", Some(entity_id), Value::Null)
            .await?;

        Ok(json!({
            "action": "turn_off_light",
            "entity_id": entity_id,
            "executed": true,
            "bus_result": result,
        }))
    }
}

// ─── set_brightness ──────────────────────────────────────────────────────────

pub struct SetBrightness {
    bus: BusHandle,
}

impl SetBrightness {
    pub fn new(bus: BusHandle) -> Self {
        Self { bus }
    }
}

#[async_trait]
impl Tool for SetBrightness {
    fn name(&self) -> &str {
        "set_brightness"
    }

    fn description(&self) -> &str {
        "Set brightness of a light (0-100%)"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "entity_id": {"type": "string"},
                "brightness": {"type": "integer", "minimum": 0, "maximum": 100}
            },
            "required": ["entity_id", "brightness"]
        })
    }

    async fn execute(&self, args: Value) -> Result<Value, ToolError> {
        let entity_id = args["entity_id"].as_str().unwrap_or_default();
        let brightness = args["brightness"].as_i64().unwrap_or_default();

        let result = self
            .bus
            .get()?
            .call_service(
                "light",
                "turn_on",
                Some(entity_id),
                json!({"brightness_pct": brightness}),
            )
            .await?;

        Ok(json!({
            "action": "set_brightness",
            "entity_id": entity_id,
            "brightness": brightness,
            "executed": true,
            "bus_result": result,
        }))
    }
}

// ─── set_color_temp ──────────────────────────────────────────────────────────

pub struct SetColorTemp {
    bus: BusHandle,
}

impl SetColorTemp {
    pub fn new(bus: BusHandle) -> Self {
        Self { bus }
    }
}

#[async_trait]
impl Tool for SetColorTemp {
    fn name(&self) -> &str {
        "set_color_temp"
    }

    fn description(&self) -> &str {
        "Set color temperature of a light (2700-6500K)"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "entity_id": {"type": "string"},
                "kelvin": {"type": "integer", "minimum": 2700, "maximum": 6500}
            },
            "required": ["entity_id", "kelvin"]
        })
    }

    async fn execute(&self, args: Value) -> Result<Value, ToolError> {
        let entity_id = args["entity_id"].as_str().unwrap_or_default();
        let kelvin = args["kelvin"].as_i64().unwrap_or_default();

        let result = self
            .bus
            .get()?
            .call_service(
                "light",
                "turn_on",
                Some(entity_id),
                json!({"color_temp": kelvin}),
            )
            .await?;

        Ok(json!({
            "action": "set_color_temp",
            "entity_id": entity_id,
            "kelvin": kelvin,
            "executed": true,
            "bus_result": result,
        }))
    }
}
