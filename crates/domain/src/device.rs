//! Device: one physical appliance and what its model can do.

use serde::{Deserialize, Serialize};

use crate::characteristic::Characteristic;
use crate::digest::Identity;
use crate::error::ValidationError;
use crate::id::DeviceId;
use crate::protocol::Namespace;

/// How requests reach the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionMode {
    /// Signed HTTP requests straight to the device's LAN address.
    #[default]
    Local,
    /// Requests relayed through an MQTT broker.
    Cloud,
}

impl std::fmt::Display for ConnectionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Local => f.write_str("local"),
            Self::Cloud => f.write_str("cloud"),
        }
    }
}

/// Broad appliance family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceKind {
    Light,
    Humidifier,
}

/// What a given model supports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModelCapabilities {
    pub kind: DeviceKind,
    pub brightness: bool,
    pub color: bool,
    pub temperature: bool,
    /// Whether the model answers the full-status query with a digest.
    pub rich_status: bool,
}

impl ModelCapabilities {
    /// Capabilities of a model identifier (case-insensitive).
    ///
    /// Unknown models are treated as plain toggles that only report
    /// online status.
    #[must_use]
    pub fn for_model(model: &str) -> Self {
        match model.to_ascii_uppercase().as_str() {
            "MSL100" => Self::light(false, false),
            "MSL120" | "MSL320" | "MSL430" => Self::light(true, true),
            "MSXH0" => Self {
                kind: DeviceKind::Humidifier,
                brightness: false,
                color: false,
                temperature: false,
                rich_status: true,
            },
            _ => Self {
                kind: DeviceKind::Light,
                brightness: false,
                color: false,
                temperature: false,
                rich_status: false,
            },
        }
    }

    fn light(color: bool, temperature: bool) -> Self {
        Self {
            kind: DeviceKind::Light,
            brightness: true,
            color,
            temperature,
            rich_status: true,
        }
    }

    /// Namespace used by the poll loop to fetch status.
    #[must_use]
    pub fn status_namespace(&self) -> Namespace {
        if self.rich_status {
            Namespace::SystemAll
        } else {
            Namespace::SystemOnline
        }
    }

    /// Whether the hub may write `characteristic` on this model.
    #[must_use]
    pub fn supports(&self, characteristic: Characteristic) -> bool {
        match (self.kind, characteristic) {
            (DeviceKind::Light, Characteristic::On) => true,
            (DeviceKind::Light, Characteristic::Brightness) => self.brightness,
            (DeviceKind::Light, Characteristic::Hue | Characteristic::Saturation) => self.color,
            (DeviceKind::Light, Characteristic::ColorTemperature) => self.temperature,
            (DeviceKind::Humidifier, Characteristic::Active | Characteristic::RotationSpeed) => {
                true
            }
            _ => false,
        }
    }
}

/// One physical appliance as known to the bridge.
///
/// This is also the persisted accessory context: identity fields are filled
/// in by the first successful poll and never change afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub id: DeviceId,
    pub name: String,
    pub model: String,
    #[serde(default)]
    pub channel: u8,
    #[serde(default)]
    pub connection: ConnectionMode,
    #[serde(default)]
    pub online: bool,
    #[serde(default)]
    pub ip_address: Option<String>,
    #[serde(default)]
    pub mac_address: Option<String>,
    #[serde(default)]
    pub hardware_version: Option<String>,
    #[serde(default)]
    pub firmware_version: Option<String>,
}

impl DeviceInfo {
    /// Start building a [`DeviceInfo`].
    #[must_use]
    pub fn builder() -> DeviceInfoBuilder {
        DeviceInfoBuilder::default()
    }

    /// Capabilities derived from the model identifier.
    #[must_use]
    pub fn capabilities(&self) -> ModelCapabilities {
        ModelCapabilities::for_model(&self.model)
    }

    /// Whether identity fields have already been captured.
    #[must_use]
    pub fn has_identity(&self) -> bool {
        self.mac_address.is_some()
            || self.hardware_version.is_some()
            || self.firmware_version.is_some()
    }

    /// Record identity fields. Only the first capture sticks.
    ///
    /// Returns `true` when anything was recorded.
    pub fn capture_identity(&mut self, identity: Identity) -> bool {
        if self.has_identity() {
            return false;
        }
        self.mac_address = identity.mac_address;
        self.hardware_version = identity.hardware_version;
        self.firmware_version = identity.firmware_version;
        true
    }
}

/// Builder for [`DeviceInfo`], validating identity and name.
#[derive(Debug, Default)]
pub struct DeviceInfoBuilder {
    id: Option<String>,
    name: Option<String>,
    model: Option<String>,
    channel: u8,
    connection: ConnectionMode,
    ip_address: Option<String>,
}

impl DeviceInfoBuilder {
    #[must_use]
    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    #[must_use]
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    #[must_use]
    pub fn channel(mut self, channel: u8) -> Self {
        self.channel = channel;
        self
    }

    #[must_use]
    pub fn connection(mut self, connection: ConnectionMode) -> Self {
        self.connection = connection;
        self
    }

    #[must_use]
    pub fn ip_address(mut self, ip_address: impl Into<String>) -> Self {
        self.ip_address = Some(ip_address.into());
        self
    }

    /// Validate and build.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::EmptyDeviceId`] or
    /// [`ValidationError::EmptyName`] when either is missing or blank.
    pub fn build(self) -> Result<DeviceInfo, ValidationError> {
        let id = DeviceId::new(self.id.unwrap_or_default())?;
        let name = self.name.unwrap_or_default();
        if name.trim().is_empty() {
            return Err(ValidationError::EmptyName);
        }
        Ok(DeviceInfo {
            id,
            name,
            model: self.model.unwrap_or_default(),
            channel: self.channel,
            connection: self.connection,
            online: false,
            ip_address: self.ip_address,
            mac_address: None,
            hardware_version: None,
            firmware_version: None,
        })
    }
}
