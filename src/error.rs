// Copyright 2026 QubitOS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Error types for sequencing, execution and processing.

use std::fmt;

use serde::Serialize;
use thiserror::Error;

/// Result type alias for spinseq operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type.
///
/// Each variant is a distinct failure kind; nothing is downgraded to a
/// default value on the way up.
#[derive(Debug, Error)]
pub enum Error {
    /// A single event or sequence violation, raised by the call that
    /// introduced it.
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// The sequence failed a full validation pass.
    #[error("Malformed sequence: {}", join_violations(.0))]
    MalformedSequence(Vec<ValidationError>),

    /// Timing not representable at the device resolution.
    #[error("Resolution error: {0}")]
    Resolution(#[from] ResolutionError),

    /// A compiled parameter falls outside what the device supports.
    #[error("Parameter '{parameter}' = {value} outside device range [{min}, {max}]")]
    DeviceRange {
        /// Parameter name
        parameter: String,
        /// Offending value
        value: f64,
        /// Lower bound supported by the device
        min: f64,
        /// Upper bound supported by the device
        max: f64,
    },

    /// Acquisition data arrived out of timestamp order.
    #[error("Sequencing error: timestamp {timestamp_ns} ns does not follow {previous_ns} ns")]
    Sequencing {
        /// Timestamp of the last accepted window
        previous_ns: f64,
        /// Rejected timestamp
        timestamp_ns: f64,
    },

    /// Operation on a frozen or otherwise unsuitable resource.
    #[error("State error: {0}")]
    State(String),

    /// Processing was asked to transform an empty buffer.
    #[error("Acquisition buffer contains no samples")]
    EmptyBuffer,

    /// Processing was asked to transform a buffer without a usable rate.
    #[error("Invalid sampling rate: {0} Hz")]
    SampleRate(f64),

    /// Acquisition exceeded the caller-supplied bound.
    #[error("Acquisition timed out after {timeout_ms} ms")]
    Timeout {
        /// The bound that expired
        timeout_ms: u64,
    },

    /// Device or simulator reported a fault.
    #[error("Execution error: {0}")]
    Execution(#[from] DeviceError),

    /// The run was cancelled before the next event started.
    #[error("Run cancelled")]
    Cancelled,

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_yaml::Error> for Error {
    fn from(e: serde_yaml::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

fn join_violations(violations: &[ValidationError]) -> String {
    violations
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Event and sequence violations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    /// Start offset is negative or not finite.
    #[error("Event '{event}': start offset {start_ns} ns must be finite and >= 0")]
    InvalidStart { event: String, start_ns: f64 },

    /// Duration is not strictly positive or not finite.
    #[error("Event '{event}': duration {duration_ns} ns must be finite and > 0")]
    InvalidDuration { event: String, duration_ns: f64 },

    /// A duration string could not be parsed.
    #[error("Cannot parse duration '{0}'")]
    UnparsableDuration(String),

    /// Timing finer than the sequence's authoring resolution.
    #[error("Event '{event}': {field} {value_ns} ns is not a multiple of {resolution_ns} ns")]
    Incommensurate {
        event: String,
        field: &'static str,
        value_ns: f64,
        resolution_ns: f64,
    },

    /// Parameter outside its declared range.
    #[error("Event '{event}': parameter '{parameter}' = {value} outside [{min}, {max}]")]
    ParameterRange {
        event: String,
        parameter: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },

    /// Malformed non-numeric parameter.
    #[error("Event '{event}': {message}")]
    Parameter { event: String, message: String },

    /// Two events occupy the same time and are not a concurrent pulse
    /// plus an acquisition window.
    #[error("Events '{first}' [{first_start_ns}-{first_end_ns} ns] and '{second}' [{second_start_ns}-{second_end_ns} ns] overlap")]
    Overlap {
        first: String,
        first_start_ns: f64,
        first_end_ns: f64,
        second: String,
        second_start_ns: f64,
        second_end_ns: f64,
    },

    /// Event starts before its predecessor in execution order.
    #[error("Event '{event}' starts at {start_ns} ns, before preceding event '{previous}' at {previous_start_ns} ns")]
    Ordering {
        event: String,
        start_ns: f64,
        previous: String,
        previous_start_ns: f64,
    },

    /// Event name already used in this sequence.
    #[error("Event name '{0}' already exists in sequence")]
    DuplicateName(String),

    /// Sequence-level setting out of range.
    #[error("Sequence field '{field}': {message}")]
    Sequence { field: &'static str, message: String },
}

/// Timing that cannot be represented on the device tick grid.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ResolutionError {
    /// Device resolution is not a finite positive number.
    #[error("device resolution {0} ns must be finite and > 0")]
    InvalidResolution(f64),

    /// Resolution below what the device can schedule.
    #[error("device resolution {requested_ns} ns is finer than the device floor {floor_ns} ns")]
    BelowDeviceFloor { requested_ns: f64, floor_ns: f64 },

    /// An event duration rounds to zero ticks.
    #[error("event '{event}' duration {duration_ns} ns rounds to zero ticks at {resolution_ns} ns")]
    ZeroDuration {
        event: String,
        duration_ns: f64,
        resolution_ns: f64,
    },

    /// The sequence's authoring grid does not land on device ticks.
    #[error("sequence resolution {sequence_ns} ns is not a multiple of device resolution {device_ns} ns")]
    Incommensurate { sequence_ns: f64, device_ns: f64 },

    /// Rounding made two events collide.
    #[error("events '{first}' and '{second}' overlap after quantization")]
    QuantizedOverlap { first: String, second: String },
}

/// Faults reported by a device or simulator.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DeviceError {
    /// Device not found
    #[error("Device not found: {0}")]
    NotFound(String),
    /// Device unavailable
    #[error("Device unavailable: {0}")]
    Unavailable(String),
    /// Execution failed
    #[error("Execution failed: {0}")]
    ExecutionFailed(String),
    /// Program rejected by the device
    #[error("Invalid program: {0}")]
    InvalidProgram(String),
    /// Device observed the cancel request
    #[error("Cancelled at instruction {0}")]
    Cancelled(usize),
}

/// Pipeline stage a run failure is attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    /// Sequence compilation
    Compile,
    /// Device or simulator execution
    Execute,
    /// Acquisition buffer filling
    Acquire,
    /// Signal processing
    Process,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Compile => write!(f, "compile"),
            Stage::Execute => write!(f, "execute"),
            Stage::Acquire => write!(f, "acquire"),
            Stage::Process => write!(f, "process"),
        }
    }
}
