//! Diagnostic tools: `log` and `get_state`.
//!
//! `log` is the agents' escape hatch — the prompt contract tells them to
//! record missing entities through it instead of guessing ids.

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::{
    bus::{BusHandle, DeviceBus},
    error::ToolError,
};

use super::traits::Tool;

// ─── log ─────────────────────────────────────────────────────────────────────

pub struct LogMessage;

#[async_trait]
impl Tool for LogMessage {
    fn name(&self) -> &str {
        "log"
    }

    fn description(&self) -> &str {
        "Log a message or observation (useful for debugging or tracking logic)"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "message": {"type": "string", "description": "Message to log"}
            },
            "required": ["message"]
        })
    }

    fn mutating(&self) -> bool {
        false
    }

    async fn execute(&self, args: Value) -> Result<Value, ToolError> {
        let message = args["message"].as_str().unwrap_or_default();
        log::info!("agent log: {message}");
        Ok(json!({"action": "log", "message": message, "logged": true}))
    }
}

// ─── get_state ───────────────────────────────────────────────────────────────

pub struct GetState {
    bus: BusHandle,
}

impl GetState {
    pub fn new(bus: BusHandle) -> Self {
        Self { bus }
    }
}

#[async_trait]
impl Tool for GetState {
    fn name(&self) -> &str {
        "get_state"
    }

    fn description(&self) -> &str {
        "Get the current state and attributes of any entity"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "entity_id": {"type": "string", "description": "Entity ID to check"}
            },
            "required": ["entity_id"]
        })
    }

    fn mutating(&self) -> bool {
        false
    }

    async fn execute(&self, args: Value) -> Result<Value, ToolError> {
        let entity_id = args["entity_id"].as_str().unwrap_or_default();
        let state = self.bus.get()?.get_state(entity_id).await?;
        Ok(json!({
            "entity_id": state.entity_id,
            "state": state.state,
            "attributes": state.attributes,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn log_echoes_the_message() {
        let result = LogMessage
            .execute(json!({"message": "Entity climate.attic not found"}))
            .await
            .unwrap();
        assert_eq!(result["logged"], true);
        assert_eq!(result["message"], "Entity climate.attic not found");
    }

    #[test]
    fn diagnostics_are_read_only() {
        assert!(!LogMessage.mutating());
        assert!(!GetState::new(BusHandle::new()).mutating());
    }
}
