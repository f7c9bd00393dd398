// Copyright 2026 QubitOS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Pulse sequencing and acquisition for magnetic-resonance spectroscopy.
//!
//! A [`PulseSequence`](sequence::PulseSequence) of timed pulses, delays and
//! acquisition windows is compiled onto a device tick grid, executed by a
//! [`Spectrometer`](device::Spectrometer), collected into an
//! [`AcquisitionBuffer`](acquisition::AcquisitionBuffer) and transformed
//! into a [`Spectrum`](processing::Spectrum).
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │            Experiment Runner             │
//! ├──────────────────┬──────────────────────┤
//! │ Sequence Compiler│  Signal Processing   │
//! │ (tick grid)      │  (rustfft)           │
//! ├──────────────────┴──────────────────────┤
//! │   Device Registry + Acquisition Buffer   │
//! ├────────────────┬────────────────────────┤
//! │   Simulator    │   Hardware drivers     │
//! └────────────────┴────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`sequence`]: Events, pulse sequences and phase cycling
//! - [`compiler`]: Sequence compilation to device instructions
//! - [`validation`]: Device range checks on compiled programs
//! - [`device`]: Spectrometer trait, simulator and registry
//! - [`acquisition`]: Acquisition buffer
//! - [`processing`]: Windowing, Fourier transform and phase correction
//! - [`runner`]: Experiment runner
//! - [`config`]: Configuration management
//! - [`error`]: Error types

pub mod acquisition;
pub mod compiler;
pub mod config;
pub mod device;
pub mod error;
pub mod processing;
pub mod runner;
pub mod sequence;
pub mod validation;

pub use config::Config;
pub use error::{Error, Result};

#[cfg(test)]
pub mod test_utils;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
