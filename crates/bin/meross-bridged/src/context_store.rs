//! Accessory context persisted as one JSON file per device.

use std::future::Future;
use std::path::{Path, PathBuf};

use meross_bridge_app::ports::ContextStore;
use meross_bridge_domain::device::DeviceInfo;
use meross_bridge_domain::digest::Identity;
use meross_bridge_domain::error::BridgeError;
use meross_bridge_domain::id::DeviceId;

/// [`ContextStore`] writing `{dir}/{device id}.json`.
#[derive(Debug, Clone)]
pub struct JsonContextStore {
    dir: PathBuf,
}

impl JsonContextStore {
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, id: &DeviceId) -> PathBuf {
        self.dir.join(format!("{id}.json"))
    }

    /// Read the stored context of `id`, if any.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Storage`] when the file exists but cannot be
    /// read or parsed.
    pub async fn load(&self, id: &DeviceId) -> Result<Option<DeviceInfo>, BridgeError> {
        let bytes = match tokio::fs::read(self.path_for(id)).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(BridgeError::Storage(Box::new(err))),
        };
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|err| BridgeError::Storage(Box::new(err)))
    }

    async fn write(&self, device: &DeviceInfo) -> Result<(), BridgeError> {
        let body =
            serde_json::to_vec_pretty(device).map_err(|err| BridgeError::Storage(Box::new(err)))?;
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|err| BridgeError::Storage(Box::new(err)))?;
        let path = self.path_for(&device.id);
        let staging = path.with_extension("json.tmp");
        tokio::fs::write(&staging, body)
            .await
            .map_err(|err| BridgeError::Storage(Box::new(err)))?;
        tokio::fs::rename(&staging, &path)
            .await
            .map_err(|err| BridgeError::Storage(Box::new(err)))?;
        tracing::debug!(device = %device.id, path = %path.display(), "context persisted");
        Ok(())
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl ContextStore for JsonContextStore {
    fn persist(&self, device: &DeviceInfo) -> impl Future<Output = Result<(), BridgeError>> + Send {
        self.write(device)
    }
}

/// Carry stored identity and status over to a freshly configured device.
///
/// The configured address wins over a stored one.
pub fn restore(device: &mut DeviceInfo, stored: DeviceInfo) {
    device.capture_identity(Identity {
        mac_address: stored.mac_address,
        hardware_version: stored.hardware_version,
        firmware_version: stored.firmware_version,
    });
    if device.ip_address.is_none() {
        device.ip_address = stored.ip_address;
    }
    device.online = stored.online;
}
