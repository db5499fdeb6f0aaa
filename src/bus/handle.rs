//! Install-later slot for the device-bus client.
//!
//! Startup order means tools and agents are constructed before the bus
//! session exists.  They hold a cheap clone of [`BusHandle`]; `main` installs
//! the live client once authentication succeeds.  Callers that run before
//! installation (or after a drop) observe [`BusError::Disconnected`] and
//! treat it as a transient cycle failure.

use std::sync::{Arc, RwLock};

use crate::error::BusError;

use super::traits::DeviceBus;

#[derive(Clone, Default)]
pub struct BusHandle {
    slot: Arc<RwLock<Option<Arc<dyn DeviceBus>>>>,
}

impl BusHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// A handle with `bus` already installed (tests, embedded setups).
    pub fn with_bus(bus: Arc<dyn DeviceBus>) -> Self {
        let handle = Self::new();
        handle.install(bus);
        handle
    }

    /// Install (or replace) the live client.
    pub fn install(&self, bus: Arc<dyn DeviceBus>) {
        if let Ok(mut slot) = self.slot.write() {
            *slot = Some(bus);
        }
    }

    /// Remove the client (shutdown).
    pub fn clear(&self) {
        if let Ok(mut slot) = self.slot.write() {
            *slot = None;
        }
    }

    /// The live client, or [`BusError::Disconnected`] when none is installed
    /// or the session has dropped.
    pub fn get(&self) -> Result<Arc<dyn DeviceBus>, BusError> {
        let slot = self.slot.read().map_err(|_| BusError::Disconnected)?;
        match slot.as_ref() {
            Some(bus) if bus.is_connected() => Ok(Arc::clone(bus)),
            _ => Err(BusError::Disconnected),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.get().is_ok()
    }
}
