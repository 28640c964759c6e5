//! Outbound control commands and their payload encoding.
//!
//! A [`Command`] is expressed in device units; [`Command::into_payload`]
//! builds the [`CommandPayload`] envelope body for the target channel.

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::protocol::{CommandPayload, Namespace};

/// Light `capacity` flag: the command carries an RGB color.
pub const CAPACITY_RGB: u8 = 1;
/// Light `capacity` flag: the command carries a white temperature.
pub const CAPACITY_TEMPERATURE: u8 = 2;
/// Light `capacity` flag: the command carries a luminance.
pub const CAPACITY_LUMINANCE: u8 = 4;

/// Humidifier spray mode as encoded by the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum SprayMode {
    #[default]
    Off,
    Continuous,
    Intermittent,
}

impl SprayMode {
    /// Whether the humidifier is spraying at all.
    #[must_use]
    pub fn is_active(self) -> bool {
        !matches!(self, Self::Off)
    }
}

impl From<SprayMode> for u8 {
    fn from(mode: SprayMode) -> Self {
        match mode {
            SprayMode::Off => 0,
            SprayMode::Continuous => 1,
            SprayMode::Intermittent => 2,
        }
    }
}

impl TryFrom<u8> for SprayMode {
    type Error = UnknownSprayMode;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Off),
            1 => Ok(Self::Continuous),
            2 => Ok(Self::Intermittent),
            other => Err(UnknownSprayMode(other)),
        }
    }
}

/// A spray mode value outside the known encodings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("unknown spray mode {0}")]
pub struct UnknownSprayMode(pub u8);

/// One control command in device units.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Switch the channel on or off.
    Toggle { on: bool },
    /// Set luminance; color-capable models must also send the capacity flag.
    Luminance { luminance: u8, color_capable: bool },
    /// Set a packed RGB color.
    Rgb { rgb: u32 },
    /// Set a white temperature on the device scale.
    Temperature { temperature: u8 },
    /// Set the humidifier spray mode.
    Spray { mode: SprayMode },
}

impl Command {
    /// Namespace of the command family this command belongs to.
    #[must_use]
    pub fn namespace(&self) -> Namespace {
        match self {
            Self::Toggle { .. } => Namespace::ToggleX,
            Self::Luminance { .. } | Self::Rgb { .. } | Self::Temperature { .. } => {
                Namespace::Light
            }
            Self::Spray { .. } => Namespace::Spray,
        }
    }

    /// Build the envelope body addressed at `channel`.
    #[must_use]
    pub fn into_payload(self, channel: u8) -> CommandPayload {
        let namespace = self.namespace();
        let payload = match self {
            Self::Toggle { on } => json!({
                "togglex": { "channel": channel, "onoff": u8::from(on) }
            }),
            Self::Luminance {
                luminance,
                color_capable: true,
            } => json!({
                "light": { "luminance": luminance, "capacity": CAPACITY_LUMINANCE }
            }),
            Self::Luminance {
                luminance,
                color_capable: false,
            } => json!({ "light": { "luminance": luminance } }),
            Self::Rgb { rgb } => json!({
                "light": { "rgb": rgb, "capacity": CAPACITY_RGB }
            }),
            Self::Temperature { temperature } => json!({
                "light": { "temperature": temperature, "capacity": CAPACITY_TEMPERATURE }
            }),
            Self::Spray { mode } => json!({
                "spray": { "channel": channel, "mode": u8::from(mode) }
            }),
        };
        CommandPayload {
            namespace,
            payload,
            channel,
        }
    }
}
