//! Per-device controller settings.

use std::time::Duration;

use serde::Deserialize;

use crate::command_queue::QueueConfig;

/// Behaviour switches and timings of one [`DeviceController`](crate::controller::DeviceController).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct DeviceSettings {
    /// Log every confirmed write at `info`.
    pub log_updates: bool,
    /// Log connectivity downgrades at `warn` instead of `debug`.
    pub debug: bool,
    /// Seconds between polls; `0` disables periodic polling.
    pub poll_interval_secs: u64,
    /// Consecutive connectivity failures before the device is marked offline.
    pub offline_after_failures: u32,
    /// Command queue pacing.
    pub queue: QueueConfig,
}

impl Default for DeviceSettings {
    fn default() -> Self {
        Self {
            log_updates: false,
            debug: false,
            poll_interval_secs: 30,
            offline_after_failures: 2,
            queue: QueueConfig::default(),
        }
    }
}

impl DeviceSettings {
    /// Polling period, or `None` when periodic polling is disabled.
    #[must_use]
    pub fn poll_interval(&self) -> Option<Duration> {
        (self.poll_interval_secs > 0).then(|| Duration::from_secs(self.poll_interval_secs))
    }
}
