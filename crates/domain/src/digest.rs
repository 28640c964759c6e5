//! Status digest: the per-capability state reported by polls and pushes.
//!
//! A full-status query (`Appliance.System.All`) answers with
//! `{all: {system: {...}, digest: {...}}}`; an online-only query answers with
//! `{online: {status}}`; pushes carry the bare digest shape at the top level
//! of their payload.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::error::ProtocolError;
use crate::protocol::Namespace;

/// Online status value meaning "connected".
pub const ONLINE_STATUS_CONNECTED: u8 = 1;

/// Per-capability device state. Every field is optional; absent fields are
/// simply not reconciled.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatusDigest {
    #[serde(default, deserialize_with = "one_or_many", skip_serializing_if = "Vec::is_empty")]
    pub togglex: Vec<ToggleState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub light: Option<LightState>,
    #[serde(default, deserialize_with = "one_or_many", skip_serializing_if = "Vec::is_empty")]
    pub spray: Vec<SprayState>,
}

impl StatusDigest {
    /// Power state reported for `channel`.
    #[must_use]
    pub fn power(&self, channel: u8) -> Option<bool> {
        self.togglex
            .iter()
            .find(|t| t.channel == channel)
            .map(|t| t.onoff != 0)
    }

    /// Light state reported for `channel`.
    #[must_use]
    pub fn light(&self, channel: u8) -> Option<&LightState> {
        self.light.as_ref().filter(|l| l.channel == channel)
    }

    /// Spray mode reported for `channel`, as the raw device value.
    #[must_use]
    pub fn spray_mode(&self, channel: u8) -> Option<u8> {
        self.spray
            .iter()
            .find(|s| s.channel == channel)
            .map(|s| s.mode)
    }
}

/// Toggle (power) state of one channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToggleState {
    #[serde(default)]
    pub channel: u8,
    pub onoff: u8,
}

/// Light state of one channel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LightState {
    #[serde(default)]
    pub channel: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capacity: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rgb: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub luminance: Option<u8>,
}

/// Spray state of one humidifier channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SprayState {
    #[serde(default)]
    pub channel: u8,
    pub mode: u8,
}

/// Immutable identity fields captured on the first successful poll.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Identity {
    pub mac_address: Option<String>,
    pub hardware_version: Option<String>,
    pub firmware_version: Option<String>,
}

/// Everything a poll learned about the device.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatusReport {
    pub digest: StatusDigest,
    pub identity: Option<Identity>,
    pub ip_address: Option<String>,
    pub online: Option<bool>,
}

impl StatusReport {
    /// Parse the payload of a status query issued on `namespace`.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::MalformedPayload`] when the payload does not
    /// match the expected shape, or [`ProtocolError::UnknownNamespace`] when
    /// `namespace` is not a status query.
    pub fn parse(namespace: Namespace, payload: Value) -> Result<Self, ProtocolError> {
        match namespace {
            Namespace::SystemAll => {
                let parsed: SystemAllPayload =
                    serde_json::from_value(payload).map_err(ProtocolError::MalformedPayload)?;
                Ok(Self::from_system_all(parsed))
            }
            Namespace::SystemOnline => {
                let parsed: OnlinePayload =
                    serde_json::from_value(payload).map_err(ProtocolError::MalformedPayload)?;
                Ok(Self {
                    online: Some(parsed.online.status == ONLINE_STATUS_CONNECTED),
                    ..Self::default()
                })
            }
            other => Err(ProtocolError::UnknownNamespace(other.as_str().to_string())),
        }
    }
}

impl StatusDigest {
    /// Parse a push payload, which carries the digest shape directly.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::MalformedPayload`] on shape mismatch.
    pub fn from_push(payload: Value) -> Result<Self, ProtocolError> {
        serde_json::from_value(payload).map_err(ProtocolError::MalformedPayload)
    }
}

#[derive(Debug, Deserialize)]
struct SystemAllPayload {
    all: AllPayload,
}

#[derive(Debug, Deserialize)]
struct AllPayload {
    #[serde(default)]
    system: SystemPayload,
    #[serde(default)]
    digest: StatusDigest,
}

#[derive(Debug, Default, Deserialize)]
struct SystemPayload {
    #[serde(default)]
    hardware: HardwarePayload,
    #[serde(default)]
    firmware: FirmwarePayload,
    #[serde(default)]
    online: Option<OnlineStatus>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HardwarePayload {
    mac_address: Option<String>,
    version: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FirmwarePayload {
    version: Option<String>,
    inner_ip: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OnlinePayload {
    online: OnlineStatus,
}

#[derive(Debug, Deserialize)]
struct OnlineStatus {
    status: u8,
}

impl StatusReport {
    fn from_system_all(parsed: SystemAllPayload) -> Self {
        let AllPayload { system, digest } = parsed.all;
        Self {
            digest,
            identity: Some(Identity {
                mac_address: system.hardware.mac_address,
                hardware_version: system.hardware.version,
                firmware_version: system.firmware.version,
            }),
            ip_address: system.firmware.inner_ip,
            online: system
                .online
                .map(|online| online.status == ONLINE_STATUS_CONNECTED),
        }
    }
}

/// Accept either a single object or an array of objects.
fn one_or_many<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany<T> {
        One(T),
        Many(Vec<T>),
    }

    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(item) => vec![item],
        OneOrMany::Many(items) => items,
    })
}
