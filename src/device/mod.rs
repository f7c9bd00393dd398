// Copyright 2026 QubitOS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Spectrometer devices.
//!
//! This module provides the [`Spectrometer`] trait, the
//! [`SimulatedSpectrometer`] and a [`DeviceRegistry`]. Real hardware plugs
//! in by implementing the trait; the wire protocol stays behind it.

pub mod registry;
pub mod simulator;
pub mod r#trait;

pub use r#trait::{CancelToken, DeviceInfo, DeviceType, HealthStatus, Spectrometer};
pub use registry::DeviceRegistry;
pub use simulator::SimulatedSpectrometer;
