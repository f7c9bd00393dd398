// Copyright 2026 QubitOS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Acquisition buffer.
//!
//! Collects the complex samples returned for each acquisition window,
//! tagged with the window's absolute timestamp and receiver settings.
//! Windows must arrive in strictly increasing timestamp order. Once
//! [`finalize`](AcquisitionBuffer::finalize) is called the buffer is
//! read-only.

use num_complex::Complex64;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};

/// Samples produced by a device for one acquisition window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleChunk {
    /// Window index from the compiled program.
    pub window: u32,
    /// Absolute window start in nanoseconds.
    pub timestamp_ns: f64,
    /// Receiver phase the window was recorded with.
    pub receiver_phase_deg: f64,
    /// Receiver sign the window was recorded with.
    pub sign: i8,
    /// Complex baseband samples.
    pub samples: Vec<Complex64>,
}

impl SampleChunk {
    /// Chunk with neutral receiver settings.
    pub fn new(window: u32, timestamp_ns: f64, samples: Vec<Complex64>) -> Self {
        Self {
            window,
            timestamp_ns,
            receiver_phase_deg: 0.0,
            sign: 1,
            samples,
        }
    }
}

/// One recorded window.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AcquisitionWindow {
    timestamp_ns: f64,
    receiver_phase_deg: f64,
    sign: i8,
    samples: Vec<Complex64>,
}

impl AcquisitionWindow {
    /// Absolute window start in nanoseconds.
    pub fn timestamp_ns(&self) -> f64 {
        self.timestamp_ns
    }

    /// Receiver phase in degrees.
    pub fn receiver_phase_deg(&self) -> f64 {
        self.receiver_phase_deg
    }

    /// Receiver sign.
    pub fn sign(&self) -> i8 {
        self.sign
    }

    /// Samples as recorded.
    pub fn samples(&self) -> &[Complex64] {
        &self.samples
    }

    /// Samples with the receiver sign and phase undone.
    pub fn derotated(&self) -> impl Iterator<Item = Complex64> + '_ {
        let factor = Complex64::from_polar(f64::from(self.sign), -self.receiver_phase_deg.to_radians());
        self.samples.iter().map(move |s| s * factor)
    }
}

/// Ordered complex samples plus sampling rate and start time.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AcquisitionBuffer {
    sample_rate_hz: f64,
    windows: Vec<AcquisitionWindow>,
    finalized: bool,
}

impl AcquisitionBuffer {
    /// Create an empty buffer recording at `sample_rate_hz`.
    ///
    /// The rate is not checked here; the signal processor rejects
    /// non-positive or unset rates.
    pub fn new(sample_rate_hz: f64) -> Self {
        Self {
            sample_rate_hz,
            windows: Vec::new(),
            finalized: false,
        }
    }

    /// Append samples for a window starting at `timestamp_ns`.
    ///
    /// # Errors
    ///
    /// - [`Error::State`] after [`finalize`](Self::finalize)
    /// - [`Error::Sequencing`] if `timestamp_ns` is not strictly greater
    ///   than the previous window's, or not finite
    pub fn append(&mut self, samples: Vec<Complex64>, timestamp_ns: f64) -> Result<()> {
        self.append_chunk(SampleChunk::new(self.windows.len() as u32, timestamp_ns, samples))
    }

    /// Append a device chunk, keeping its receiver settings.
    pub fn append_chunk(&mut self, chunk: SampleChunk) -> Result<()> {
        if self.finalized {
            return Err(Error::State(
                "cannot append to a finalized acquisition buffer".into(),
            ));
        }
        let previous_ns = self
            .windows
            .last()
            .map_or(f64::NEG_INFINITY, |w| w.timestamp_ns);
        if !chunk.timestamp_ns.is_finite() || chunk.timestamp_ns <= previous_ns {
            return Err(Error::Sequencing {
                previous_ns,
                timestamp_ns: chunk.timestamp_ns,
            });
        }
        self.windows.push(AcquisitionWindow {
            timestamp_ns: chunk.timestamp_ns,
            receiver_phase_deg: chunk.receiver_phase_deg,
            sign: chunk.sign,
            samples: chunk.samples,
        });
        Ok(())
    }

    /// Freeze the buffer. Calling it again has no effect.
    pub fn finalize(&mut self) {
        if !self.finalized {
            debug!(
                windows = self.windows.len(),
                samples = self.len(),
                "Acquisition buffer finalized"
            );
        }
        self.finalized = true;
    }

    /// Whether the buffer is read-only.
    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    /// Sampling rate in Hz.
    pub fn sample_rate_hz(&self) -> f64 {
        self.sample_rate_hz
    }

    /// Timestamp of the first window, if any.
    pub fn start_time_ns(&self) -> Option<f64> {
        self.windows.first().map(|w| w.timestamp_ns)
    }

    /// Recorded windows in order.
    pub fn windows(&self) -> &[AcquisitionWindow] {
        &self.windows
    }

    /// All samples, windows concatenated in order.
    pub fn samples(&self) -> Vec<Complex64> {
        self.windows
            .iter()
            .flat_map(|w| w.samples.iter().copied())
            .collect()
    }

    /// Total number of samples.
    pub fn len(&self) -> usize {
        self.windows.iter().map(|w| w.samples.len()).sum()
    }

    /// Whether no samples have been recorded.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Sample times in nanoseconds, relative to each window's start.
    pub fn sample_times_ns(&self) -> Vec<f64> {
        let dt = 1e9 / self.sample_rate_hz;
        self.windows
            .iter()
            .flat_map(|w| (0..w.samples.len()).map(move |i| i as f64 * dt))
            .collect()
    }

    /// De-rotate every window and average them into one.
    ///
    /// The result is a finalized buffer with a single window stamped with
    /// the first window's timestamp and neutral receiver settings. An empty
    /// buffer averages to an empty buffer.
    ///
    /// # Errors
    ///
    /// [`Error::State`] if the windows differ in length.
    pub fn averaged(&self) -> Result<AcquisitionBuffer> {
        let mut out = AcquisitionBuffer::new(self.sample_rate_hz);
        let Some(first) = self.windows.first() else {
            out.finalize();
            return Ok(out);
        };
        let n = first.samples.len();
        if let Some(bad) = self.windows.iter().find(|w| w.samples.len() != n) {
            return Err(Error::State(format!(
                "cannot average windows of different lengths ({} and {})",
                n,
                bad.samples.len()
            )));
        }

        let mut sum = vec![Complex64::new(0.0, 0.0); n];
        for window in &self.windows {
            for (acc, s) in sum.iter_mut().zip(window.derotated()) {
                *acc += s;
            }
        }
        let scale = 1.0 / self.windows.len() as f64;
        let mean = sum.into_iter().map(|s| s * scale).collect();

        out.append(mean, first.timestamp_ns)?;
        out.finalize();
        Ok(out)
    }
}
