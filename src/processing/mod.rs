// Copyright 2026 QubitOS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Signal processing: acquisition buffer to spectrum.
//!
//! [`ProcessingOptions::apply`] first combines windows and optionally
//! removes the receiver DC offset. [`process`] then runs, in order:
//!
//! 1. the window function, one weight per sample
//! 2. a forward DFT (rustfft, unnormalized)
//! 3. zero-order phase correction, fixed or searched
//!
//! Processing is a pure function of its inputs and can run concurrently
//! for independent buffers.

mod phase;
mod spectrum;
mod window;

pub use phase::{PhaseCorrection, PhaseSearch};
pub use spectrum::{FrequencyBin, Spectrum};
pub use window::WindowFunction;

use num_complex::Complex64;
use rustfft::FftPlanner;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::acquisition::AcquisitionBuffer;
use crate::error::{Error, Result};

/// Share of the trailing samples whose mean is taken as the DC offset.
const BASELINE_TAIL_FRACTION: f64 = 0.25;

/// How repeated acquisition windows are combined before the transform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Accumulation {
    /// Undo each window's receiver sign and phase, then average.
    #[default]
    Average,
    /// Transform all samples back to back.
    Concatenate,
}

/// Processing settings for a run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProcessingOptions {
    /// Window applied before the transform
    #[serde(default)]
    pub window: WindowFunction,

    /// Phase correction applied after the transform
    #[serde(default)]
    pub phase_correction: PhaseCorrection,

    /// How windows are combined
    #[serde(default)]
    pub accumulation: Accumulation,

    /// Subtract the mean of the signal tail before the transform
    #[serde(default)]
    pub baseline_correction: bool,
}

impl ProcessingOptions {
    /// Combine windows per [`accumulation`](Self::accumulation), correct
    /// the baseline if enabled, then [`process`].
    pub fn apply(&self, buffer: &AcquisitionBuffer) -> Result<Spectrum> {
        let combined = match self.accumulation {
            Accumulation::Average => buffer.averaged()?,
            Accumulation::Concatenate => buffer.clone(),
        };
        let input = if self.baseline_correction {
            remove_dc_offset(&combined)?
        } else {
            combined
        };
        process(&input, self.window, &self.phase_correction)
    }
}

/// Subtract the mean of the last quarter of the samples.
///
/// By then the FID has decayed, so what remains is receiver offset.
/// Window boundaries are not kept.
fn remove_dc_offset(buffer: &AcquisitionBuffer) -> Result<AcquisitionBuffer> {
    let mut out = AcquisitionBuffer::new(buffer.sample_rate_hz());
    let mut samples = buffer.samples();
    if !samples.is_empty() {
        let n = samples.len();
        let tail = ((n as f64 * BASELINE_TAIL_FRACTION) as usize).max(1);
        let offset = samples[n - tail..].iter().sum::<Complex64>() / tail as f64;
        for s in samples.iter_mut() {
            *s -= offset;
        }
        debug!(tail, offset_re = offset.re, offset_im = offset.im, "Removed DC offset");
        out.append(samples, buffer.start_time_ns().unwrap_or(0.0))?;
    }
    out.finalize();
    Ok(out)
}

/// Window, transform and phase-correct the samples of `buffer`.
///
/// # Errors
///
/// - [`Error::EmptyBuffer`] if the buffer holds no samples
/// - [`Error::SampleRate`] if the sampling rate is not finite and positive
/// - [`Error::Config`] if the phase correction settings are invalid
pub fn process(
    buffer: &AcquisitionBuffer,
    window: WindowFunction,
    phase_correction: &PhaseCorrection,
) -> Result<Spectrum> {
    if buffer.is_empty() {
        return Err(Error::EmptyBuffer);
    }
    let sample_rate_hz = buffer.sample_rate_hz();
    if !sample_rate_hz.is_finite() || sample_rate_hz <= 0.0 {
        return Err(Error::SampleRate(sample_rate_hz));
    }

    let mut data = buffer.samples();
    let n = data.len();
    for (sample, weight) in data.iter_mut().zip(window.weights(n)) {
        *sample *= weight;
    }

    let mut planner = FftPlanner::<f64>::new();
    let fft = planner.plan_fft_forward(n);
    fft.process(&mut data);

    let phase_deg = phase_correction.resolve(&data)?;
    if phase_deg != 0.0 {
        let rotation = Complex64::from_polar(1.0, phase_deg.to_radians());
        for bin in data.iter_mut() {
            *bin *= rotation;
        }
    }

    debug!(
        samples = n,
        sample_rate_hz,
        window = %window,
        phase_deg,
        "Processed spectrum"
    );
    Ok(Spectrum::new(sample_rate_hz, window, phase_deg, data))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acquisition::SampleChunk;
    use approx::assert_relative_eq;
    use proptest::prelude::*;
    use std::f64::consts::PI;

    fn tone(n: usize, rate: f64, freq: f64, phase_deg: f64) -> Vec<Complex64> {
        (0..n)
            .map(|i| {
                let t = i as f64 / rate;
                Complex64::from_polar(1.0, 2.0 * PI * freq * t + phase_deg.to_radians())
            })
            .collect()
    }

    fn buffer_of(samples: Vec<Complex64>, rate: f64) -> AcquisitionBuffer {
        let mut buf = AcquisitionBuffer::new(rate);
        buf.append(samples, 0.0).unwrap();
        buf.finalize();
        buf
    }

    // =========================================================================
    // Preconditions
    // =========================================================================

    #[test]
    fn test_empty_buffer() {
        let buf = AcquisitionBuffer::new(1e3);
        assert!(matches!(
            process(&buf, WindowFunction::None, &PhaseCorrection::none()),
            Err(Error::EmptyBuffer)
        ));
    }

    #[test]
    fn test_zero_sample_rate() {
        let buf = buffer_of(vec![Complex64::new(1.0, 0.0); 4], 0.0);
        assert!(matches!(
            process(&buf, WindowFunction::None, &PhaseCorrection::none()),
            Err(Error::SampleRate(r)) if r == 0.0
        ));
    }

    #[test]
    fn test_negative_and_nan_sample_rate() {
        for rate in [-1.0, f64::NAN] {
            let buf = buffer_of(vec![Complex64::new(1.0, 0.0); 4], rate);
            assert!(matches!(
                process(&buf, WindowFunction::Hann, &PhaseCorrection::none()),
                Err(Error::SampleRate(_))
            ));
        }
    }

    // =========================================================================
    // Transform
    // =========================================================================

    #[test]
    fn test_all_zero_buffer_gives_zero_spectrum() {
        let buf = buffer_of(vec![Complex64::new(0.0, 0.0); 64], 1e3);
        for window in WindowFunction::ALL {
            let s = process(&buf, window, &PhaseCorrection::auto()).unwrap();
            assert_eq!(s.len(), 64);
            assert!(s.amplitudes().iter().all(|a| a.norm() == 0.0));
        }
    }

    #[test]
    fn test_tone_peaks_within_one_bin() {
        let rate = 1_000.0;
        let freq = 123.0;
        let buf = buffer_of(tone(256, rate, freq, 0.0), rate);
        let s = process(&buf, WindowFunction::None, &PhaseCorrection::none()).unwrap();
        let peak = s.peak().unwrap();
        assert!((peak.frequency_hz - freq).abs() <= s.bin_width_hz());
    }

    #[test]
    fn test_on_bin_tone_is_exact() {
        let buf = buffer_of(tone(64, 64.0, 5.0, 0.0), 64.0);
        let s = process(&buf, WindowFunction::None, &PhaseCorrection::none()).unwrap();
        let peak = s.peak().unwrap();
        assert_eq!(peak.index, 5);
        assert!((peak.amplitude - Complex64::new(64.0, 0.0)).norm() < 1e-9);
    }

    #[test]
    fn test_windowing_is_applied() {
        let buf = buffer_of(vec![Complex64::new(1.0, 0.0); 16], 16.0);
        let plain = process(&buf, WindowFunction::None, &PhaseCorrection::none()).unwrap();
        let hann = process(&buf, WindowFunction::Hann, &PhaseCorrection::none()).unwrap();
        assert_relative_eq!(plain.amplitudes()[0].re, 16.0, epsilon = 1e-9);
        assert!(hann.amplitudes()[0].re < plain.amplitudes()[0].re);
        assert_eq!(hann.window(), WindowFunction::Hann);
    }

    // =========================================================================
    // Phase correction
    // =========================================================================

    #[test]
    fn test_fixed_phase_rotates_every_bin() {
        let buf = buffer_of(tone(32, 32.0, 4.0, 0.0), 32.0);
        let s = process(&buf, WindowFunction::None, &PhaseCorrection::Fixed { degrees: 90.0 }).unwrap();
        let peak = s.amplitudes()[4];
        assert!(peak.re.abs() < 1e-9);
        assert_relative_eq!(peak.im, 32.0, epsilon = 1e-9);
        assert_eq!(s.applied_phase_deg(), 90.0);
    }

    #[test]
    fn test_auto_phase_recovers_known_rotation() {
        let buf = buffer_of(tone(64, 64.0, 7.0, -45.0), 64.0);
        let s = process(&buf, WindowFunction::None, &PhaseCorrection::auto()).unwrap();
        assert_relative_eq!(s.applied_phase_deg(), 45.0, epsilon = 1e-9);
        let peak = s.amplitudes()[7];
        assert_relative_eq!(peak.re, 64.0, epsilon = 1e-6);
        assert!(peak.im.abs() < 1e-6);
    }

    #[test]
    fn test_auto_phase_invalid_search() {
        let buf = buffer_of(tone(8, 8.0, 1.0, 0.0), 8.0);
        let pc = PhaseCorrection::Auto(PhaseSearch {
            step_deg: 0.0,
            ..PhaseSearch::default()
        });
        assert!(matches!(
            process(&buf, WindowFunction::None, &pc),
            Err(Error::Config(_))
        ));
    }

    // =========================================================================
    // Accumulation
    // =========================================================================

    #[test]
    fn test_average_accumulation_combines_windows() {
        let mut buf = AcquisitionBuffer::new(16.0);
        buf.append(tone(16, 16.0, 2.0, 0.0), 0.0).unwrap();
        buf.append_chunk(SampleChunk {
            sign: -1,
            ..SampleChunk::new(1, 100.0, tone(16, 16.0, 2.0, 180.0))
        })
        .unwrap();
        buf.finalize();

        let options = ProcessingOptions::default();
        let s = options.apply(&buf).unwrap();
        assert_eq!(s.len(), 16);
        assert_relative_eq!(s.amplitudes()[2].re, 16.0, epsilon = 1e-9);

        let concatenated = ProcessingOptions {
            accumulation: Accumulation::Concatenate,
            ..ProcessingOptions::default()
        };
        assert_eq!(concatenated.apply(&buf).unwrap().len(), 32);
    }

    #[test]
    fn test_baseline_correction_removes_dc_offset() {
        let offset = Complex64::new(0.5, -0.25);
        let samples: Vec<Complex64> = tone(64, 64.0, 4.0, 0.0)
            .into_iter()
            .map(|s| s + offset)
            .collect();
        let buf = buffer_of(samples, 64.0);

        let raw = ProcessingOptions::default().apply(&buf).unwrap();
        assert_relative_eq!(raw.amplitudes()[0].re, 32.0, epsilon = 1e-9);

        let corrected = ProcessingOptions {
            baseline_correction: true,
            ..ProcessingOptions::default()
        }
        .apply(&buf)
        .unwrap();
        assert!(corrected.amplitudes()[0].norm() < 1e-9);
        assert_relative_eq!(corrected.amplitudes()[4].re, 64.0, epsilon = 1e-9);
    }

    #[test]
    fn test_baseline_correction_on_empty_buffer() {
        let buf = AcquisitionBuffer::new(16.0);
        let options = ProcessingOptions {
            baseline_correction: true,
            accumulation: Accumulation::Concatenate,
            ..ProcessingOptions::default()
        };
        assert!(matches!(options.apply(&buf), Err(Error::EmptyBuffer)));
    }

    #[test]
    fn test_average_accumulation_empty_buffer() {
        let buf = AcquisitionBuffer::new(16.0);
        assert!(matches!(
            ProcessingOptions::default().apply(&buf),
            Err(Error::EmptyBuffer)
        ));
    }

    // =========================================================================
    // Properties
    // =========================================================================

    proptest! {
        #[test]
        fn prop_spectrum_has_n_bins_over_rate(n in 1usize..200, rate in 1.0f64..1e6) {
            let buf = buffer_of(vec![Complex64::new(1.0, -1.0); n], rate);
            let s = process(&buf, WindowFunction::Blackman, &PhaseCorrection::none()).unwrap();
            prop_assert_eq!(s.len(), n);
            let freqs = s.frequencies();
            prop_assert_eq!(freqs[0], 0.0);
            prop_assert!(freqs.iter().all(|f| *f >= 0.0 && *f < rate));
        }
    }
}
