// Copyright 2026 QubitOS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Tick quantization and duration parsing.
//!
//! Authored times are nanoseconds as `f64`. Devices schedule in integer
//! ticks of a fixed resolution. [`TickClock`] maps between the two with the
//! rounding policy used everywhere in the crate: nearest tick, exact halves
//! rounded toward zero.

use serde::{Deserialize, Deserializer};

use crate::error::{ResolutionError, ValidationError};

/// Relative tolerance (in ticks) for tie and multiple detection.
const TICK_TOLERANCE: f64 = 1e-9;

/// A device tick grid.
///
/// # Invariants
///
/// - `resolution_ns` is finite and `> 0.0`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TickClock {
    resolution_ns: f64,
}

impl TickClock {
    /// Create a clock with the given tick length.
    ///
    /// # Errors
    ///
    /// Returns [`ResolutionError::InvalidResolution`] for non-finite or
    /// non-positive resolutions.
    pub fn new(resolution_ns: f64) -> Result<Self, ResolutionError> {
        if !resolution_ns.is_finite() || resolution_ns <= 0.0 {
            return Err(ResolutionError::InvalidResolution(resolution_ns));
        }
        Ok(Self { resolution_ns })
    }

    /// Tick length in nanoseconds.
    pub fn resolution_ns(&self) -> f64 {
        self.resolution_ns
    }

    /// Number of ticks nearest to `value_ns`; exact halves go toward zero.
    pub fn quantize(&self, value_ns: f64) -> u64 {
        round_half_toward_zero(value_ns / self.resolution_ns)
    }

    /// Like [`TickClock::quantize`], but `None` when the tick count does
    /// not fit in a `u64`.
    pub fn try_quantize(&self, value_ns: f64) -> Option<u64> {
        let ticks = value_ns / self.resolution_ns;
        (ticks < u64::MAX as f64).then(|| round_half_toward_zero(ticks))
    }

    /// Convert a tick count back to nanoseconds.
    pub fn to_ns(&self, ticks: u64) -> f64 {
        ticks as f64 * self.resolution_ns
    }

    /// Whether `value_ns` lies on the tick grid.
    pub fn is_on_grid(&self, value_ns: f64) -> bool {
        is_multiple(value_ns, self.resolution_ns)
    }
}

/// Round a non-negative tick count, sending exact halves toward zero.
pub(crate) fn round_half_toward_zero(ticks: f64) -> u64 {
    if ticks <= 0.0 {
        return 0;
    }
    let floor = ticks.floor();
    let frac = ticks - floor;
    if frac > 0.5 + TICK_TOLERANCE {
        (floor as u64).saturating_add(1)
    } else {
        floor as u64
    }
}

/// Whether `value` is an integer multiple of `step` within tolerance.
pub(crate) fn is_multiple(value: f64, step: f64) -> bool {
    let ratio = value / step;
    (ratio - ratio.round()).abs() <= TICK_TOLERANCE * ratio.abs().max(1.0)
}

/// Parse a duration with an optional unit suffix into nanoseconds.
///
/// Suffixes: `n` (ns), `u` (µs), `m` (ms), `s` (s). A bare number is read
/// as microseconds.
///
/// ```
/// use spinseq::sequence::time::parse_duration;
/// assert_eq!(parse_duration("10u").unwrap(), 10_000.0);
/// assert_eq!(parse_duration("1m").unwrap(), 1_000_000.0);
/// ```
pub fn parse_duration(text: &str) -> Result<f64, ValidationError> {
    let trimmed = text.trim();
    let (number, scale) = match trimmed.chars().last() {
        Some('n') => (&trimmed[..trimmed.len() - 1], 1.0),
        Some('u') => (&trimmed[..trimmed.len() - 1], 1e3),
        Some('m') => (&trimmed[..trimmed.len() - 1], 1e6),
        Some('s') => (&trimmed[..trimmed.len() - 1], 1e9),
        Some(_) => (trimmed, 1e3),
        None => return Err(ValidationError::UnparsableDuration(text.to_string())),
    };
    let value: f64 = number
        .trim()
        .parse()
        .map_err(|_| ValidationError::UnparsableDuration(text.to_string()))?;
    if !value.is_finite() || value < 0.0 {
        return Err(ValidationError::UnparsableDuration(text.to_string()));
    }
    Ok(value * scale)
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawDuration {
    Nanoseconds(f64),
    Text(String),
}

/// Serde helper: accept either a number of nanoseconds or a unit string.
pub(crate) fn deserialize_ns<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    match RawDuration::deserialize(deserializer)? {
        RawDuration::Nanoseconds(ns) => Ok(ns),
        RawDuration::Text(text) => parse_duration(&text).map_err(serde::de::Error::custom),
    }
}

/// Check that the device can schedule at `requested_ns`.
pub(crate) fn check_floor(requested_ns: f64, floor_ns: f64) -> Result<(), ResolutionError> {
    if requested_ns + TICK_TOLERANCE * floor_ns < floor_ns {
        return Err(ResolutionError::BelowDeviceFloor {
            requested_ns,
            floor_ns,
        });
    }
    Ok(())
}
