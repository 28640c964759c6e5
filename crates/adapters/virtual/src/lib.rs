//! # meross-bridge-adapter-virtual
//!
//! Simulated devices for running the bridge without hardware.
//!
//! [`SimulatedTransport`] implements the [`DeviceTransport`] port by routing
//! each request to a registered [`SimulatedDevice`], which answers with the
//! same envelopes real hardware produces. Devices can be made slow,
//! unreachable, unresponsive or rejecting, and can emit pushes as if
//! changed from outside the bridge.
//!
//! | Model | Behaviour |
//! |-------|-----------|
//! | `MSL100` | Dimmable light |
//! | `MSL120` / `MSL320` / `MSL430` | Color light with temperature |
//! | `MSXH0` | Humidifier with spray modes |
//! | anything else | Plain toggle reporting online status |
//!
//! ## Dependency rule
//!
//! Depends on `meross-bridge-app` (port traits) and `meross-bridge-domain` only.

mod device;

pub use device::{Fault, SimulatedDevice};

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};

use meross_bridge_app::ports::DeviceTransport;
use meross_bridge_domain::device::DeviceInfo;
use meross_bridge_domain::error::TransportError;
use meross_bridge_domain::id::DeviceId;
use meross_bridge_domain::protocol::{CommandPayload, Namespace, ResponseEnvelope};

/// Errors raised by the simulation itself.
#[derive(Debug, thiserror::Error)]
pub enum SimulationError {
    #[error("no simulated device with id {0}")]
    UnknownDevice(String),

    #[error("simulated device {0} is unreachable")]
    Unreachable(String),
}

impl From<SimulationError> for TransportError {
    fn from(err: SimulationError) -> Self {
        Self::Unreachable(Box::new(err))
    }
}

/// [`DeviceTransport`] backed by in-memory devices.
#[derive(Debug, Clone, Default)]
pub struct SimulatedTransport {
    devices: Arc<Mutex<HashMap<DeviceId, Arc<SimulatedDevice>>>>,
}

impl SimulatedTransport {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `device`, replacing any device with the same id.
    pub fn register(&self, device: SimulatedDevice) -> Arc<SimulatedDevice> {
        let device = Arc::new(device);
        self.devices
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(device.id().clone(), Arc::clone(&device));
        device
    }

    /// Look up a registered device.
    #[must_use]
    pub fn device(&self, id: &DeviceId) -> Option<Arc<SimulatedDevice>> {
        self.devices
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
    }

    fn lookup(&self, device: &DeviceInfo) -> Result<Arc<SimulatedDevice>, TransportError> {
        self.device(&device.id)
            .ok_or_else(|| SimulationError::UnknownDevice(device.id.to_string()).into())
    }
}

impl DeviceTransport for SimulatedTransport {
    fn send_update(
        &self,
        device: &DeviceInfo,
        command: CommandPayload,
    ) -> impl Future<Output = Result<ResponseEnvelope, TransportError>> + Send {
        let target = self.lookup(device);
        async move {
            let target = target?;
            let namespace = command.namespace;
            target
                .exchange(namespace, move |device| device.handle_set(&command))
                .await
        }
    }

    fn request_update(
        &self,
        device: &DeviceInfo,
        namespace: Namespace,
    ) -> impl Future<Output = Result<ResponseEnvelope, TransportError>> + Send {
        let target = self.lookup(device);
        async move {
            let target = target?;
            target
                .exchange(namespace, move |device| device.handle_get(namespace))
                .await
        }
    }
}
