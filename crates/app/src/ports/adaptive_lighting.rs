//! Adaptive lighting port: the external controller that drives color
//! temperature along a daily curve.

use std::future::Future;

use meross_bridge_domain::error::BridgeError;

/// Query and disable an adaptive lighting controller.
pub trait AdaptiveLighting: Send + Sync {
    /// Whether the controller is currently driving the light.
    fn is_active(&self) -> bool;

    /// Stop driving the light (manual input took over).
    fn disable(&self) -> impl Future<Output = Result<(), BridgeError>> + Send;
}

impl<T: AdaptiveLighting> AdaptiveLighting for std::sync::Arc<T> {
    fn is_active(&self) -> bool {
        (**self).is_active()
    }

    fn disable(&self) -> impl Future<Output = Result<(), BridgeError>> + Send {
        (**self).disable()
    }
}
