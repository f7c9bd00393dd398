// Copyright 2026 QubitOS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Zero-order phase correction.
//!
//! The automatic mode is a grid search, not a closed form. Every phase
//! `min_deg + k·step_deg < max_deg` is tried and the one that maximizes
//! the largest real part of the rotated spectrum wins. Scores equal within
//! a relative 1e-12 are broken by the smallest `|φ|`, then by positive `φ`.

use num_complex::Complex64;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Relative tolerance for treating two scores as tied.
const SCORE_TOLERANCE: f64 = 1e-12;

/// Largest number of phases one automatic search may try.
pub const MAX_PHASE_GRID_POINTS: usize = 1_000_000;

/// How the spectrum phase is set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum PhaseCorrection {
    /// Rotate by a fixed angle.
    Fixed {
        /// Rotation in degrees.
        #[serde(default)]
        degrees: f64,
    },
    /// Search for the angle that puts the strongest line on the real axis.
    Auto(PhaseSearch),
}

impl Default for PhaseCorrection {
    fn default() -> Self {
        PhaseCorrection::Fixed { degrees: 0.0 }
    }
}

impl PhaseCorrection {
    /// No rotation.
    pub fn none() -> Self {
        Self::default()
    }

    /// Automatic search over the default grid.
    pub fn auto() -> Self {
        PhaseCorrection::Auto(PhaseSearch::default())
    }

    /// Rotation to apply to `spectrum`, in degrees.
    pub fn resolve(&self, spectrum: &[Complex64]) -> Result<f64> {
        match self {
            PhaseCorrection::Fixed { degrees } => {
                if !degrees.is_finite() {
                    return Err(Error::Config(format!(
                        "phase correction must be finite, got {degrees}"
                    )));
                }
                Ok(*degrees)
            }
            PhaseCorrection::Auto(search) => search.best_phase(spectrum),
        }
    }
}

/// Search bounds and grid step for automatic phase correction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhaseSearch {
    /// First phase tried, inclusive.
    pub min_deg: f64,
    /// Upper bound, exclusive.
    pub max_deg: f64,
    /// Grid spacing.
    pub step_deg: f64,
}

impl Default for PhaseSearch {
    fn default() -> Self {
        Self {
            min_deg: -180.0,
            max_deg: 180.0,
            step_deg: 0.5,
        }
    }
}

impl PhaseSearch {
    /// Check bounds and step.
    pub fn validate(&self) -> Result<()> {
        if !self.step_deg.is_finite() || self.step_deg <= 0.0 {
            return Err(Error::Config(format!(
                "phase search step must be > 0, got {}",
                self.step_deg
            )));
        }
        if !self.min_deg.is_finite() || !self.max_deg.is_finite() || self.min_deg >= self.max_deg {
            return Err(Error::Config(format!(
                "phase search bounds [{}, {}) are empty",
                self.min_deg, self.max_deg
            )));
        }
        let points = (self.max_deg - self.min_deg) / self.step_deg;
        if points > MAX_PHASE_GRID_POINTS as f64 {
            return Err(Error::Config(format!(
                "phase search over [{}, {}) in steps of {} tries {:.0} phases, limit is {}",
                self.min_deg, self.max_deg, self.step_deg, points, MAX_PHASE_GRID_POINTS
            )));
        }
        Ok(())
    }

    /// Candidate phases in ascending order.
    pub fn grid(&self) -> impl Iterator<Item = f64> + '_ {
        let steps = ((self.max_deg - self.min_deg) / self.step_deg).ceil() as usize;
        (0..steps)
            .map(move |k| self.min_deg + k as f64 * self.step_deg)
            .filter(move |phase| *phase < self.max_deg)
    }

    /// Phase on the grid that maximizes the largest real part.
    pub fn best_phase(&self, spectrum: &[Complex64]) -> Result<f64> {
        self.validate()?;

        let mut best: Option<(f64, f64)> = None;
        for phase in self.grid() {
            let score = real_peak(spectrum, phase);
            best = match best {
                None => Some((phase, score)),
                Some((best_phase, best_score)) => {
                    let tolerance = SCORE_TOLERANCE * best_score.abs().max(score.abs());
                    let tied = (score - best_score).abs() <= tolerance;
                    if (!tied && score > best_score) || (tied && preferred(phase, best_phase)) {
                        Some((phase, score))
                    } else {
                        best
                    }
                }
            };
        }

        best.map(|(phase, _)| phase)
            .ok_or_else(|| Error::Config("phase search grid is empty".into()))
    }
}

/// Largest real part of `spectrum` rotated by `phase_deg`.
pub(crate) fn real_peak(spectrum: &[Complex64], phase_deg: f64) -> f64 {
    let rotation = Complex64::from_polar(1.0, phase_deg.to_radians());
    spectrum
        .iter()
        .map(|s| (s * rotation).re)
        .fold(f64::NEG_INFINITY, f64::max)
}

fn preferred(candidate: f64, incumbent: f64) -> bool {
    let (c, i) = (candidate.abs(), incumbent.abs());
    c < i || (c == i && candidate > incumbent)
}
