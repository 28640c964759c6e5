//! Hub events: immutable records of hub-visible changes.
//!
//! Every characteristic update pushed to the hub is also published as a
//! [`HubEvent`] so that observers (logging, tests) can follow along.

use serde::{Deserialize, Serialize};

use crate::characteristic::{Characteristic, CharacteristicValue};
use crate::id::DeviceId;
use crate::time::{Timestamp, now};

/// A characteristic value was pushed to the hub.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HubEvent {
    pub device_id: DeviceId,
    pub characteristic: Characteristic,
    pub value: CharacteristicValue,
    pub timestamp: Timestamp,
}

impl HubEvent {
    /// Create an event stamped with the current time.
    #[must_use]
    pub fn new(
        device_id: DeviceId,
        characteristic: Characteristic,
        value: CharacteristicValue,
    ) -> Self {
        Self {
            device_id,
            characteristic,
            value,
            timestamp: now(),
        }
    }
}
