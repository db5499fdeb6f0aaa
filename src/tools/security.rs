//! Security tools: alarm state, locks, cameras.
//!
//! `unlock_door` never touches the bus directly — unlocking is always routed
//! through the approval queue, regardless of which agent asks.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::{
    approval::{ApprovalQueue, ImpactLevel},
    bus::{BusHandle, DeviceBus},
    error::ToolError,
};

use super::{safety::SAFETY_GATE_AGENT, traits::Tool};

// ─── set_alarm_state ─────────────────────────────────────────────────────────

pub struct SetAlarmState {
    bus: BusHandle,
}

impl SetAlarmState {
    pub fn new(bus: BusHandle) -> Self {
        Self { bus }
    }
}

#[async_trait]
impl Tool for SetAlarmState {
    fn name(&self) -> &str {
        "set_alarm_state"
    }

    fn description(&self) -> &str {
        "Set alarm control panel state"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "entity_id": {"type": "string"},
                "state": {"type": "string", "enum": ["armed_home", "armed_away", "disarmed"]}
            },
            "required": ["entity_id", "state"]
        })
    }

    async fn execute(&self, args: Value) -> Result<Value, ToolError> {
        let entity_id = args["entity_id"].as_str().unwrap_or_default();
        let state = args["state"].as_str().unwrap_or_default();

        let service = match state {
            "armed_home" => "alarm_arm_home",
            "armed_away" => "alarm_arm_away",
            "disarmed" => "alarm_disarm",
            other => {
                return Err(ToolError::InvalidArguments(format!(
                    "unknown alarm state: {other}"
                )))
            }
        };

        let result = self
            .bus
            .get()?
            .call_service("alarm_control_panel", service, Some(entity_id), Value::Null)
            .await?;

        Ok(json!({
            "action": "set_alarm_state",
            "entity_id": entity_id,
            "state": state,
            "executed": true,
            "bus_result": result,
        }))
    }
}

// ─── lock_door ───────────────────────────────────────────────────────────────

pub struct LockDoor {
    bus: BusHandle,
}

impl LockDoor {
    pub fn new(bus: BusHandle) -> Self {
        Self { bus }
    }
}

#[async_trait]
impl Tool for LockDoor {
    fn name(&self) -> &str {
        "lock_door"
    }

    fn description(&self) -> &str {
        "Lock a door"
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
            .call_service("lock", "lock", Some(entity_id), Value::Null)
            .await?;

        Ok(json!({
            "action": "lock_door",
            "entity_id": entity_id,
            "executed": true,
            "bus_result": result,
        }))
    }
}

// ─── unlock_door ─────────────────────────────────────────────────────────────

pub struct UnlockDoor {
    approvals: Arc<ApprovalQueue>,
}

impl UnlockDoor {
    pub fn new(approvals: Arc<ApprovalQueue>) -> Self {
        Self { approvals }
    }
}

#[async_trait]
impl Tool for UnlockDoor {
    fn name(&self) -> &str {
        "unlock_door"
    }

    fn description(&self) -> &str {
        "Unlock a door (requires approval)"
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

        let request = self
            .approvals
            .add_request(
                SAFETY_GATE_AGENT,
                "lock.unlock",
                json!({
                    "domain": "lock",
                    "service": "unlock",
                    "entity_id": entity_id,
                    "service_data": {},
                }),
                ImpactLevel::High,
                &format!("Agent requested door unlock: {entity_id}"),
                None,
            )
            .await?;

        Ok(json!({
            "action": "unlock_door",
            "entity_id": entity_id,
            "status": "queued_for_approval",
            "request_id": request.id,
            "message": "Door unlock requires human approval",
        }))
    }
}

// ─── enable_camera ───────────────────────────────────────────────────────────

pub struct EnableCamera {
    bus: BusHandle,
}

impl EnableCamera {
    pub fn new(bus: BusHandle) -> Self {
        Self { bus }
    }
}

#[async_trait]
impl Tool for EnableCamera {
    fn name(&self) -> &str {
        "enable_camera"
    }

    fn description(&self) -> &str {
        "Enable camera with motion detection"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "entity_id": {"type": "string"},
                "motion_detection": {"type": "boolean"}
            },
            "required": ["entity_id"]
        })
    }

    async fn execute(&self, args: Value) -> Result<Value, ToolError> {
        let entity_id = args["entity_id"].as_str().unwrap_or_default();
        let motion_detection = args["motion_detection"].as_bool().unwrap_or(true);

        let service = if motion_detection {
            "enable_motion_detection"
        } else {
            "turn_on"
        };

        let result = self
            .bus
            .get()?
            .call_service("camera", service, Some(entity_id), Value::Null)
            .await?;

        Ok(json!({
            "action": "enable_camera",
            "entity_id": entity_id,
            "motion_detection": motion_detection,
            "executed": true,
            "bus_result": result,
        }))
    }
}
