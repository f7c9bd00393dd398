// Copyright 2026 QubitOS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Frequency-domain result.

use num_complex::Complex64;
use serde::Serialize;

use super::window::WindowFunction;

/// One frequency bin.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FrequencyBin {
    /// Bin index in the unshifted spectrum.
    pub index: usize,
    /// Frequency in Hz.
    pub frequency_hz: f64,
    /// Complex amplitude after phase correction.
    pub amplitude: Complex64,
}

impl FrequencyBin {
    /// Magnitude of the amplitude.
    pub fn magnitude(&self) -> f64 {
        self.amplitude.norm()
    }
}

/// Immutable spectrum derived from one acquisition buffer.
///
/// Bin `k` of `N` sits at `k·R/N`, so the bins cover `[0, R)` with zero
/// frequency at index 0. [`centered`](Spectrum::centered) gives the
/// symmetric `[-R/2, R/2)` view.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Spectrum {
    sample_rate_hz: f64,
    window: WindowFunction,
    applied_phase_deg: f64,
    amplitudes: Vec<Complex64>,
}

impl Spectrum {
    pub(crate) fn new(
        sample_rate_hz: f64,
        window: WindowFunction,
        applied_phase_deg: f64,
        amplitudes: Vec<Complex64>,
    ) -> Self {
        Self {
            sample_rate_hz,
            window,
            applied_phase_deg,
            amplitudes,
        }
    }

    /// Number of bins.
    pub fn len(&self) -> usize {
        self.amplitudes.len()
    }

    /// Whether the spectrum has no bins.
    pub fn is_empty(&self) -> bool {
        self.amplitudes.is_empty()
    }

    /// Sampling rate of the source buffer.
    pub fn sample_rate_hz(&self) -> f64 {
        self.sample_rate_hz
    }

    /// Spacing between bins in Hz.
    pub fn bin_width_hz(&self) -> f64 {
        self.sample_rate_hz / self.len().max(1) as f64
    }

    /// Window applied before the transform.
    pub fn window(&self) -> WindowFunction {
        self.window
    }

    /// Zero-order phase applied, in degrees.
    pub fn applied_phase_deg(&self) -> f64 {
        self.applied_phase_deg
    }

    /// Frequency of every bin.
    pub fn frequencies(&self) -> Vec<f64> {
        let width = self.bin_width_hz();
        (0..self.len()).map(|k| k as f64 * width).collect()
    }

    /// Complex amplitude of every bin.
    pub fn amplitudes(&self) -> &[Complex64] {
        &self.amplitudes
    }

    /// Magnitude of every bin.
    pub fn magnitudes(&self) -> Vec<f64> {
        self.amplitudes.iter().map(|a| a.norm()).collect()
    }

    /// `(frequency, amplitude)` pairs in bin order.
    pub fn bins(&self) -> impl Iterator<Item = FrequencyBin> + '_ {
        let width = self.bin_width_hz();
        self.amplitudes
            .iter()
            .enumerate()
            .map(move |(index, amplitude)| FrequencyBin {
                index,
                frequency_hz: index as f64 * width,
                amplitude: *amplitude,
            })
    }

    /// Bin with the largest magnitude; the lowest index wins a tie.
    pub fn peak(&self) -> Option<FrequencyBin> {
        self.bins().fold(None, |best: Option<FrequencyBin>, bin| match best {
            Some(b) if b.magnitude() >= bin.magnitude() => Some(b),
            _ => Some(bin),
        })
    }

    /// Bins reordered to run from `-R/2` up to just below `R/2`.
    pub fn centered(&self) -> Vec<FrequencyBin> {
        let n = self.len();
        let split = (n + 1) / 2;
        let rate = self.sample_rate_hz;
        let mut out: Vec<FrequencyBin> = self
            .bins()
            .skip(split)
            .map(|mut bin| {
                bin.frequency_hz -= rate;
                bin
            })
            .collect();
        out.extend(self.bins().take(split));
        out
    }
}
