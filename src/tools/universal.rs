//! The universal tool: `call_service` can reach any whitelisted bus service.
//!
//! Safety pipeline, applied in order, first fail wins:
//! 1. blocklist  2. allowlist  3. high-impact routing  4. cross-validation
//!
//! High-impact services never reach the bus from here — they are enqueued as
//! approval requests and the caller gets `status = queued_for_approval`.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Map, Value};

use crate::{
    approval::{ApprovalQueue, ImpactLevel},
    bus::{BusHandle, DeviceBus},
    error::ToolError,
};

use super::{
    climate::SetTemperature,
    safety::{SafetyConfig, SAFETY_GATE_AGENT},
    traits::Tool,
};

const RESERVED_KEYS: &[&str] = &["domain", "service", "entity_id", "service_data"];

pub struct CallService {
    bus: BusHandle,
    safety: Arc<SafetyConfig>,
    approvals: Arc<ApprovalQueue>,
}

impl CallService {
    pub fn new(bus: BusHandle, safety: Arc<SafetyConfig>, approvals: Arc<ApprovalQueue>) -> Self {
        Self {
            bus,
            safety,
            approvals,
        }
    }

    /// Service data from the explicit `service_data` object, or — when it is
    /// absent — all non-reserved keys of the argument object, so agents can
    /// send flat parameters.
    fn extract_service_data(args: &Value) -> Map<String, Value> {
        if let Some(data) = args.get("service_data").and_then(Value::as_object) {
            if !data.is_empty() {
                return data.clone();
            }
        }
        args.as_object()
            .map(|object| {
                object
                    .iter()
                    .filter(|(key, _)| !RESERVED_KEYS.contains(&key.as_str()))
                    .map(|(key, value)| (key.clone(), value.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[async_trait]
impl Tool for CallService {
    fn name(&self) -> &str {
        "call_service"
    }

    fn description(&self) -> &str {
        "Call any device-bus service on an entity"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "domain": {"type": "string", "description": "Service domain (e.g. light, switch)"},
                "service": {"type": "string", "description": "Service name (e.g. turn_on, toggle)"},
                "entity_id": {"type": "string", "description": "Target entity ID"},
                "service_data": {"type": "object", "description": "Additional parameters (brightness, etc)"}
            },
            "required": ["domain", "service", "entity_id"]
        })
    }

    async fn execute(&self, args: Value) -> Result<Value, ToolError> {
        let domain = args["domain"].as_str().unwrap_or_default().to_string();
        let service = args["service"].as_str().unwrap_or_default().to_string();
        let entity_id = args["entity_id"].as_str().unwrap_or_default().to_string();
        let service_data = Self::extract_service_data(&args);

        // 1. Blocklist.
        if self.safety.is_blocked(&domain) {
            return Err(ToolError::Blocked(domain));
        }

        // 2. Allowlist.
        if !self.safety.is_allowed(&domain) {
            return Err(ToolError::NotAllowed(domain));
        }

        // 3. High-impact routing.  The approval queue owns eventual execution.
        if self.safety.is_high_impact(&domain, &service) {
            let service_full_name = format!("{domain}.{service}");
            let mut reason =
                format!("Agent requested high-impact service: {service_full_name} on {entity_id}");
            if !service_data.is_empty() {
                reason.push_str(&format!(
                    " with data: {}",
                    Value::Object(service_data.clone())
                ));
            }

            let request = self
                .approvals
                .add_request(
                    SAFETY_GATE_AGENT,
                    &service_full_name,
                    json!({
                        "domain": domain,
                        "service": service,
                        "entity_id": entity_id,
                        "service_data": service_data,
                    }),
                    ImpactLevel::High,
                    &reason,
                    None,
                )
                .await?;

            return Ok(json!({
                "action": "call_service",
                "status": "queued_for_approval",
                "request_id": request.id,
                "message": format!(
                    "Service {service_full_name} requires manual approval as it is high-impact."
                ),
            }));
        }

        // 4. Cross-validation against the specialised climate schema.
        if domain == "climate" && service == "set_temperature" {
            let Some(temperature) = service_data.get("temperature").and_then(Value::as_f64)
            else {
                return Err(ToolError::InvalidArguments(
                    "climate.set_temperature requires a numeric 'temperature'".to_string(),
                ));
            };
            SetTemperature::check_bounds(&self.safety, temperature)?;
        }

        let result = self
            .bus
            .get()?
            .call_service(
                &domain,
                &service,
                Some(&entity_id),
                Value::Object(service_data.clone()),
            )
            .await?;

        Ok(json!({
            "action": "call_service",
            "domain": domain,
            "service": service,
            "data": {"entity_id": entity_id, "service_data": service_data},
            "executed": true,
            "bus_result": result,
        }))
    }
}
