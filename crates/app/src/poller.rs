//! Poll scheduler.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::controller::DeviceController;
use crate::ports::{AdaptiveLighting, ContextStore, DeviceTransport, HubCharacteristics};

/// Poll once right away, then every configured interval.
///
/// With polling disabled (interval `0`) the task ends after the startup poll.
pub fn spawn_poller<T, H, C, A>(controller: Arc<DeviceController<T, H, C, A>>) -> JoinHandle<()>
where
    T: DeviceTransport + 'static,
    H: HubCharacteristics + Clone + 'static,
    C: ContextStore + 'static,
    A: AdaptiveLighting + 'static,
{
    tokio::spawn(async move {
        controller.request_update().await;

        let Some(period) = controller.settings().poll_interval() else {
            tracing::debug!(device = %controller.id(), "periodic polling disabled");
            return;
        };

        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            controller.request_update().await;
        }
    })
}
