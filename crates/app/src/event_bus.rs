//! Fan-out of hub characteristic changes.
//!
//! [`crate::characteristic_store::CharacteristicStore`] publishes one
//! [`HubEvent`] per value it pushes; the daemon's event logger and the
//! integration tests subscribe here.

use std::future::Future;

use tokio::sync::broadcast;

use meross_bridge_domain::error::BridgeError;
use meross_bridge_domain::event::HubEvent;

use crate::ports::EventPublisher;

/// [`EventPublisher`] over a tokio [`broadcast`] channel.
///
/// Events published while nobody listens are dropped. A subscriber that
/// falls more than `capacity` events behind sees
/// [`broadcast::error::RecvError::Lagged`].
#[derive(Clone)]
pub struct InProcessEventBus {
    sender: broadcast::Sender<HubEvent>,
}

impl InProcessEventBus {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Receive every event published from now on, for all devices.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<HubEvent> {
        self.sender.subscribe()
    }
}

impl EventPublisher for InProcessEventBus {
    fn publish(&self, event: HubEvent) -> impl Future<Output = Result<(), BridgeError>> + Send {
        // Err only means there is no subscriber.
        let _ = self.sender.send(event);
        async { Ok(()) }
    }
}
