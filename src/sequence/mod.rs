// Copyright 2026 QubitOS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Pulse-sequence model.
//!
//! - [`Event`] and [`EventKind`]: pulses, delays and acquisition windows
//! - [`PulseSequence`]: append-only ordered events plus repetition settings
//! - [`PhaseTable`]: per-repetition transmit phases from phase cycling
//! - [`time`]: tick quantization and duration parsing

pub mod event;
pub mod phase_cycle;
pub mod pulse_sequence;
pub mod time;

pub use event::{AcquisitionParams, Event, EventKind, PulseParams, PulseShape, ReadoutStep};
pub use phase_cycle::PhaseTable;
pub use pulse_sequence::{EventId, PulseSequence};
pub use time::{parse_duration, TickClock};
