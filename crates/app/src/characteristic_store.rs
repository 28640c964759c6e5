//! In-memory hub characteristics for one accessory.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};

use meross_bridge_domain::characteristic::{Characteristic, CharacteristicValue};
use meross_bridge_domain::error::BridgeError;
use meross_bridge_domain::event::HubEvent;
use meross_bridge_domain::id::DeviceId;

use crate::ports::{EventPublisher, HubCharacteristics};

/// Hub-visible values of one accessory, publishing a [`HubEvent`] for every
/// value pushed by the bridge.
///
/// Cloning is cheap and every clone shares the same values.
#[derive(Clone)]
pub struct CharacteristicStore<P> {
    device_id: DeviceId,
    values: Arc<Mutex<HashMap<Characteristic, CharacteristicValue>>>,
    publisher: P,
}

impl<P> CharacteristicStore<P> {
    #[must_use]
    pub fn new(device_id: DeviceId, publisher: P) -> Self {
        Self {
            device_id,
            values: Arc::new(Mutex::new(HashMap::new())),
            publisher,
        }
    }

    /// Record a value set on the hub side (user or automation intent).
    ///
    /// Returns the previous value.
    pub fn set(
        &self,
        characteristic: Characteristic,
        value: CharacteristicValue,
    ) -> Option<CharacteristicValue> {
        self.values
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(characteristic, value)
    }

    /// Every known value, in [`Characteristic::ALL`] order.
    #[must_use]
    pub fn snapshot(&self) -> Vec<(Characteristic, CharacteristicValue)> {
        let values = self.values.lock().unwrap_or_else(PoisonError::into_inner);
        Characteristic::ALL
            .into_iter()
            .filter_map(|c| values.get(&c).map(|v| (c, *v)))
            .collect()
    }
}

impl<P> HubCharacteristics for CharacteristicStore<P>
where
    P: EventPublisher + Send + Sync,
{
    fn value(&self, characteristic: Characteristic) -> Option<CharacteristicValue> {
        self.values
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&characteristic)
            .copied()
    }

    fn push(
        &self,
        characteristic: Characteristic,
        value: CharacteristicValue,
    ) -> impl Future<Output = Result<(), BridgeError>> + Send {
        self.set(characteristic, value);
        self.publisher
            .publish(HubEvent::new(self.device_id.clone(), characteristic, value))
    }
}
