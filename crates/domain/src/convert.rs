//! Unit conversion between hub-domain and device-domain values.
//!
//! All functions are pure and total: out-of-range inputs are clamped to the
//! nearest valid value before converting.
//!
//! | Hub | Device |
//! |-----|--------|
//! | brightness `0..=100` % | luminance `0..=100` |
//! | hue `0..=360` °, saturation `0..=100` % | packed RGB `0xRRGGBB` |
//! | color temperature `140..=500` mired | temperature `1..=100` |
//! | rotation speed `0..=100` % | spray mode (off / intermittent / continuous) |

use crate::command::SprayMode;

/// Coolest color temperature the hub exposes, in mired.
pub const MIN_MIRED: u16 = 140;
/// Warmest color temperature the hub exposes, in mired.
pub const MAX_MIRED: u16 = 500;

const MIRED_SPAN: f64 = 360.0;

/// Hub brightness → device luminance.
#[must_use]
pub fn brightness_to_luminance(brightness: u8) -> u8 {
    brightness.min(100)
}

/// Device luminance → hub brightness.
#[must_use]
pub fn luminance_to_brightness(luminance: u8) -> u8 {
    luminance.min(100)
}

/// Pack an RGB triple into the device's 24-bit integer (red most significant).
#[must_use]
pub fn pack_rgb(red: u8, green: u8, blue: u8) -> u32 {
    (u32::from(red) << 16) | (u32::from(green) << 8) | u32::from(blue)
}

/// Unpack the device's 24-bit integer into an RGB triple. Bits above 24 are ignored.
#[must_use]
pub fn unpack_rgb(rgb: u32) -> (u8, u8, u8) {
    let [_, red, green, blue] = rgb.to_be_bytes();
    (red, green, blue)
}

/// Hub hue/saturation (full value) → RGB triple.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn hs_to_rgb(hue: u16, saturation: u8) -> (u8, u8, u8) {
    let hue = f64::from(hue % 360);
    let chroma = f64::from(saturation.min(100)) / 100.0;
    let sector = hue / 60.0;
    let x = chroma * (1.0 - ((sector % 2.0) - 1.0).abs());
    let (r, g, b) = match sector as u8 {
        0 => (chroma, x, 0.0),
        1 => (x, chroma, 0.0),
        2 => (0.0, chroma, x),
        3 => (0.0, x, chroma),
        4 => (x, 0.0, chroma),
        _ => (chroma, 0.0, x),
    };
    let offset = 1.0 - chroma;
    let channel = |c: f64| ((c + offset) * 255.0).round().clamp(0.0, 255.0) as u8;
    (channel(r), channel(g), channel(b))
}

/// RGB triple → hub hue (degrees) and saturation (percent).
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn rgb_to_hs(red: u8, green: u8, blue: u8) -> (u16, u8) {
    let r = f64::from(red) / 255.0;
    let g = f64::from(green) / 255.0;
    let b = f64::from(blue) / 255.0;
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let delta = max - min;

    let hue = if delta == 0.0 {
        0.0
    } else if (max - r).abs() < f64::EPSILON {
        60.0 * (((g - b) / delta).rem_euclid(6.0))
    } else if (max - g).abs() < f64::EPSILON {
        60.0 * ((b - r) / delta + 2.0)
    } else {
        60.0 * ((r - g) / delta + 4.0)
    };
    let saturation = if max == 0.0 { 0.0 } else { delta / max * 100.0 };

    ((hue.round() as u16) % 360, saturation.round().min(100.0) as u8)
}

/// Hub mired → device temperature scale.
///
/// `round(((360 - (mired - 140)) / 360) * 100)`, with a result of 0 coerced
/// to 1 because devices reject 0.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn mired_to_device_temp(mired: u16) -> u8 {
    let mired = f64::from(mired.clamp(MIN_MIRED, MAX_MIRED));
    let temp = (((MIRED_SPAN - (mired - f64::from(MIN_MIRED))) / MIRED_SPAN) * 100.0).round();
    (temp as u8).max(1)
}

/// Device temperature scale → hub mired: `round(140 + (360 - (temp / 100) * 360))`.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn device_temp_to_mired(temp: u8) -> u16 {
    let temp = f64::from(temp.min(100));
    (f64::from(MIN_MIRED) + (MIRED_SPAN - (temp / 100.0) * MIRED_SPAN)).round() as u16
}

/// Hub rotation speed → device spray mode.
///
/// `0` is off, `1..=75` is intermittent, `76..=100` is continuous.
#[must_use]
pub fn speed_to_spray_mode(speed: u8) -> SprayMode {
    match speed {
        0 => SprayMode::Off,
        1..=75 => SprayMode::Intermittent,
        _ => SprayMode::Continuous,
    }
}

/// Device spray mode → representative hub rotation speed (0, 50 or 100).
#[must_use]
pub fn spray_mode_to_speed(mode: SprayMode) -> u8 {
    match mode {
        SprayMode::Off => 0,
        SprayMode::Intermittent => 50,
        SprayMode::Continuous => 100,
    }
}

/// Snap an arbitrary rotation speed to the value the device can represent.
#[must_use]
pub fn quantize_speed(speed: u8) -> u8 {
    spray_mode_to_speed(speed_to_spray_mode(speed))
}
