//! Local HTTP transport configuration.

use std::time::Duration;

use serde::Deserialize;

/// Configuration for talking to devices on the LAN.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Shared device key used to sign requests. Empty for devices paired
    /// without a key.
    pub key: String,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            key: String::new(),
            timeout_secs: 10,
        }
    }
}

impl HttpConfig {
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}
