//! The device-bus interface.
//!
//! Tools, agents, and the orchestrator talk to the bus through this trait so
//! the live websocket client can be installed after startup (see
//! [`super::handle::BusHandle`]) and replaced with recording fakes in tests.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::BusError;

use super::{
    client::EventCallback,
    frames::{ClimateState, EntityState},
};

#[async_trait]
pub trait DeviceBus: Send + Sync {
    /// Full state registry (`entity_id = None`) or a single entity's state.
    async fn get_states(&self, entity_id: Option<&str>) -> Result<Vec<EntityState>, BusError>;

    /// Capability introspection: `domain → service → schema`.
    async fn get_services(&self) -> Result<Value, BusError>;

    /// Fire-and-acknowledge service call.
    async fn call_service(
        &self,
        domain: &str,
        service: &str,
        entity_id: Option<&str>,
        data: Value,
    ) -> Result<Value, BusError>;

    /// Subscribe to bus events, forwarding matches to `callback`.
    async fn subscribe_events(
        &self,
        event_type: &str,
        entities: Vec<String>,
        callback: EventCallback,
    ) -> Result<u64, BusError>;

    fn is_connected(&self) -> bool;

    /// Close the session; outstanding requests fail with a disconnect error.
    async fn disconnect(&self);

    /// Single entity's state.
    async fn get_state(&self, entity_id: &str) -> Result<EntityState, BusError> {
        self.get_states(Some(entity_id))
            .await?
            .pop()
            .ok_or_else(|| BusError::EntityNotFound(entity_id.to_string()))
    }

    /// Climate projection of a single entity.
    async fn climate_state(&self, entity_id: &str) -> Result<ClimateState, BusError> {
        Ok(ClimateState::from(self.get_state(entity_id).await?))
    }
}
