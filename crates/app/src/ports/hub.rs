//! Hub port: the hub-visible characteristic values of one accessory.

use std::future::Future;

use meross_bridge_domain::characteristic::{Characteristic, CharacteristicValue};
use meross_bridge_domain::error::BridgeError;

/// Read and push characteristic values of a single accessory.
///
/// Reads are live: they return whatever the hub currently shows, which may
/// be an optimistic value the device has not confirmed yet.
pub trait HubCharacteristics: Send + Sync {
    /// Current hub-visible value, if the hub knows one.
    fn value(&self, characteristic: Characteristic) -> Option<CharacteristicValue>;

    /// Push a new value to the hub.
    fn push(
        &self,
        characteristic: Characteristic,
        value: CharacteristicValue,
    ) -> impl Future<Output = Result<(), BridgeError>> + Send;
}

impl<T: HubCharacteristics> HubCharacteristics for std::sync::Arc<T> {
    fn value(&self, characteristic: Characteristic) -> Option<CharacteristicValue> {
        (**self).value(characteristic)
    }

    fn push(
        &self,
        characteristic: Characteristic,
        value: CharacteristicValue,
    ) -> impl Future<Output = Result<(), BridgeError>> + Send {
        (**self).push(characteristic, value)
    }
}
