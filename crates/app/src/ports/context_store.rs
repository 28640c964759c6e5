//! Context store port: persistence of the accessory context.

use std::future::Future;

use meross_bridge_domain::device::DeviceInfo;
use meross_bridge_domain::error::BridgeError;

/// Persists the accessory context (identity, address, online flag).
pub trait ContextStore: Send + Sync {
    /// Write the current context of `device`, replacing any previous one.
    fn persist(&self, device: &DeviceInfo) -> impl Future<Output = Result<(), BridgeError>> + Send;
}

impl<T: ContextStore> ContextStore for std::sync::Arc<T> {
    fn persist(&self, device: &DeviceInfo) -> impl Future<Output = Result<(), BridgeError>> + Send {
        (**self).persist(device)
    }
}
