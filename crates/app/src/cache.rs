//! Cached characteristic state of one accessory.
//!
//! Holds the last value confirmed by the device, either through an
//! acknowledged write or through a status report. Never holds a value that
//! is still in flight.

use meross_bridge_domain::characteristic::{Characteristic, CharacteristicValue};
use meross_bridge_domain::command::SprayMode;
use meross_bridge_domain::convert::{self, MIN_MIRED};

use crate::ports::HubCharacteristics;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CachedState {
    pub power: bool,
    pub brightness: u8,
    pub hue: u16,
    pub saturation: u8,
    pub mired: u16,
    /// Last packed color reported by the device.
    pub rgb: Option<u32>,
    pub spray_mode: SprayMode,
    /// Mode restored when the fan is switched back on.
    pub last_active_mode: SprayMode,
}

impl Default for CachedState {
    fn default() -> Self {
        Self {
            power: false,
            brightness: 100,
            hue: 0,
            saturation: 0,
            mired: MIN_MIRED,
            rgb: None,
            spray_mode: SprayMode::Off,
            last_active_mode: SprayMode::Continuous,
        }
    }
}

impl CachedState {
    /// Seed the cache from whatever the hub currently shows.
    pub fn seed<H: HubCharacteristics>(hub: &H) -> Self {
        let defaults = Self::default();
        let int = |c: Characteristic| hub.value(c).map(CharacteristicValue::as_int);

        let spray_mode = int(Characteristic::RotationSpeed)
            .map_or(defaults.spray_mode, |speed| {
                convert::speed_to_spray_mode(clamp_u8(speed))
            });

        Self {
            power: hub
                .value(Characteristic::On)
                .map_or(defaults.power, CharacteristicValue::as_bool),
            brightness: hub
                .value(Characteristic::Brightness)
                .map_or(defaults.brightness, CharacteristicValue::as_percent),
            hue: int(Characteristic::Hue).map_or(defaults.hue, |hue| {
                u16::try_from(hue.rem_euclid(360)).unwrap_or_default()
            }),
            saturation: hub
                .value(Characteristic::Saturation)
                .map_or(defaults.saturation, CharacteristicValue::as_percent),
            mired: int(Characteristic::ColorTemperature).map_or(defaults.mired, clamp_mired),
            rgb: None,
            spray_mode,
            last_active_mode: if spray_mode.is_active() {
                spray_mode
            } else {
                defaults.last_active_mode
            },
        }
    }

    /// Hub-visible value of `characteristic` according to the cache.
    #[must_use]
    pub fn hub_value(&self, characteristic: Characteristic) -> CharacteristicValue {
        match characteristic {
            Characteristic::On => self.power.into(),
            Characteristic::Brightness => self.brightness.into(),
            Characteristic::Hue => self.hue.into(),
            Characteristic::Saturation => self.saturation.into(),
            Characteristic::ColorTemperature => self.mired.into(),
            Characteristic::Active => u8::from(self.spray_mode.is_active()).into(),
            Characteristic::RotationSpeed => convert::spray_mode_to_speed(self.spray_mode).into(),
        }
    }

    /// Record a confirmed spray mode, remembering it when the fan is running.
    pub fn set_spray_mode(&mut self, mode: SprayMode) {
        self.spray_mode = mode;
        if mode.is_active() {
            self.last_active_mode = mode;
        }
    }
}

pub(crate) fn clamp_u8(value: i64) -> u8 {
    u8::try_from(value.clamp(0, i64::from(u8::MAX))).unwrap_or(u8::MAX)
}

pub(crate) fn clamp_mired(value: i64) -> u16 {
    let clamped = value.clamp(
        i64::from(convert::MIN_MIRED),
        i64::from(convert::MAX_MIRED),
    );
    u16::try_from(clamped).unwrap_or(MIN_MIRED)
}
