//! Characteristics: the hub-visible values of an accessory.
//!
//! Values live in hub units: brightness and saturation in percent, hue in
//! degrees, color temperature in mired, rotation speed in percent.

use serde::{Deserialize, Serialize};

/// One controllable or observable value exposed to the hub.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Characteristic {
    On,
    Brightness,
    Hue,
    Saturation,
    ColorTemperature,
    Active,
    RotationSpeed,
}

impl Characteristic {
    /// Every characteristic, in a stable order.
    pub const ALL: [Self; 7] = [
        Self::On,
        Self::Brightness,
        Self::Hue,
        Self::Saturation,
        Self::ColorTemperature,
        Self::Active,
        Self::RotationSpeed,
    ];

    /// Human-readable name used in log lines.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::On => "state",
            Self::Brightness => "brightness",
            Self::Hue => "hue",
            Self::Saturation => "saturation",
            Self::ColorTemperature => "color temperature",
            Self::Active => "active",
            Self::RotationSpeed => "rotation speed",
        }
    }
}

impl std::fmt::Display for Characteristic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// A single typed characteristic value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CharacteristicValue {
    Bool(bool),
    Int(i64),
}

impl CharacteristicValue {
    /// Interpret the value as a boolean (non-zero integers are `true`).
    #[must_use]
    pub fn as_bool(self) -> bool {
        match self {
            Self::Bool(value) => value,
            Self::Int(value) => value != 0,
        }
    }

    /// Interpret the value as an integer (`true` is 1).
    #[must_use]
    pub fn as_int(self) -> i64 {
        match self {
            Self::Bool(value) => i64::from(value),
            Self::Int(value) => value,
        }
    }

    /// Interpret the value as a percentage, clamped to `0..=100`.
    #[must_use]
    pub fn as_percent(self) -> u8 {
        u8::try_from(self.as_int().clamp(0, 100)).unwrap_or(100)
    }
}

impl From<bool> for CharacteristicValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<u8> for CharacteristicValue {
    fn from(value: u8) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<u16> for CharacteristicValue {
    fn from(value: u16) -> Self {
        Self::Int(i64::from(value))
    }
}

impl std::fmt::Display for CharacteristicValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bool(value) => value.fmt(f),
            Self::Int(value) => value.fmt(f),
        }
    }
}
