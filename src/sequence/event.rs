// Copyright 2026 QubitOS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Timed instrument events: pulses, delays and acquisition windows.
//!
//! An [`Event`] is immutable once built. Its parameters carry declared
//! ranges and [`Event::validate`] reports every value outside them; nothing
//! is clamped.

use std::f64::consts::PI;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::time::deserialize_ns;
use crate::error::ValidationError;

/// Relative transmit amplitude range in percent.
pub const AMPLITUDE_RANGE_PCT: (f64, f64) = (0.0, 100.0);
/// Largest frequency offset a sequence may request, in Hz.
pub const MAX_FREQUENCY_OFFSET_HZ: f64 = 10e6;
/// Phase-cycle count range.
pub const PHASE_CYCLES_RANGE: (u32, u32) = (1, 360);
/// Phase-cycle group range.
pub const PHASE_CYCLE_GROUP_RANGE: (u32, u32) = (0, 10);
/// Sinc lobe count range.
pub const SINC_LOBES_RANGE: (u32, u32) = (1, 20);

/// An atomic timed instrument action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    name: String,
    #[serde(deserialize_with = "deserialize_ns")]
    start_ns: f64,
    #[serde(deserialize_with = "deserialize_ns")]
    duration_ns: f64,
    /// TTL gate line held high for the whole event.
    #[serde(default)]
    gate: bool,
    #[serde(flatten)]
    kind: EventKind,
}

/// What an event does.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EventKind {
    /// RF excitation.
    Pulse(PulseParams),
    /// Idle time.
    Delay,
    /// Receiver digitizes the returned signal.
    Acquisition(AcquisitionParams),
}

impl EventKind {
    /// Short lowercase label.
    pub fn label(&self) -> &'static str {
        match self {
            EventKind::Pulse(_) => "pulse",
            EventKind::Delay => "delay",
            EventKind::Acquisition(_) => "acquisition",
        }
    }
}

/// Transmit pulse parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PulseParams {
    /// Relative transmit amplitude, percent of full scale.
    #[serde(default = "default_amplitude_pct")]
    pub amplitude_pct: f64,
    /// Transmit phase in degrees, `[0, 360)`.
    #[serde(default)]
    pub phase_deg: f64,
    /// Offset from the carrier in Hz.
    #[serde(default)]
    pub frequency_offset_hz: f64,
    /// Envelope shape.
    #[serde(default)]
    pub shape: PulseShape,
    /// May run during an acquisition window.
    #[serde(default)]
    pub concurrent: bool,
    /// Number of phase-cycle steps.
    #[serde(default = "default_phase_cycles")]
    pub phase_cycles: u32,
    /// Phase-cycle group; pulses in one group step together.
    #[serde(default)]
    pub phase_cycle_group: u32,
}

impl Default for PulseParams {
    fn default() -> Self {
        Self {
            amplitude_pct: default_amplitude_pct(),
            phase_deg: 0.0,
            frequency_offset_hz: 0.0,
            shape: PulseShape::Rect,
            concurrent: false,
            phase_cycles: default_phase_cycles(),
            phase_cycle_group: 0,
        }
    }
}

impl PulseParams {
    /// Rectangular pulse at the given amplitude and phase.
    pub fn rect(amplitude_pct: f64, phase_deg: f64) -> Self {
        Self {
            amplitude_pct,
            phase_deg,
            ..Self::default()
        }
    }

    /// Mark the pulse as allowed to overlap an acquisition window.
    pub fn concurrent(mut self) -> Self {
        self.concurrent = true;
        self
    }

    /// Set the phase cycling of this pulse.
    pub fn with_phase_cycling(mut self, cycles: u32, group: u32) -> Self {
        self.phase_cycles = cycles;
        self.phase_cycle_group = group;
        self
    }

    /// Set the envelope shape.
    pub fn with_shape(mut self, shape: PulseShape) -> Self {
        self.shape = shape;
        self
    }

    fn validate(&self, event: &str, issues: &mut Vec<ValidationError>) {
        check_range(
            event,
            "amplitude_pct",
            self.amplitude_pct,
            AMPLITUDE_RANGE_PCT.0,
            AMPLITUDE_RANGE_PCT.1,
            issues,
        );
        check_phase(event, "phase_deg", self.phase_deg, issues);
        check_range(
            event,
            "frequency_offset_hz",
            self.frequency_offset_hz,
            -MAX_FREQUENCY_OFFSET_HZ,
            MAX_FREQUENCY_OFFSET_HZ,
            issues,
        );
        check_range(
            event,
            "phase_cycles",
            self.phase_cycles as f64,
            PHASE_CYCLES_RANGE.0 as f64,
            PHASE_CYCLES_RANGE.1 as f64,
            issues,
        );
        check_range(
            event,
            "phase_cycle_group",
            self.phase_cycle_group as f64,
            PHASE_CYCLE_GROUP_RANGE.0 as f64,
            PHASE_CYCLE_GROUP_RANGE.1 as f64,
            issues,
        );
        self.shape.validate(event, issues);
    }
}

fn default_amplitude_pct() -> f64 {
    100.0
}

fn default_phase_cycles() -> u32 {
    1
}

/// Pulse envelope shape.
///
/// Envelopes are normalized to a peak of 1 and may go negative (sinc side
/// lobes), so every sample lies in `[-1, 1]`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PulseShape {
    /// Constant amplitude.
    #[default]
    Rect,
    /// `sin(x)/x` truncated to `lobes` zero crossings on each side.
    Sinc { lobes: u32 },
    /// Gaussian with standard deviation as a fraction of the pulse length.
    Gaussian { sigma_fraction: f64 },
    /// User-supplied envelope, resampled nearest-neighbour.
    Custom { samples: Vec<f64> },
}

impl PulseShape {
    /// Sample the envelope at the centre of each of `n` ticks.
    pub fn envelope(&self, n: usize) -> Vec<f64> {
        let centre = |i: usize| (i as f64 + 0.5) / n as f64 - 0.5;
        match self {
            PulseShape::Rect => vec![1.0; n],
            PulseShape::Sinc { lobes } => (0..n)
                .map(|i| {
                    let x = 2.0 * PI * f64::from(*lobes) * centre(i);
                    if x.abs() < 1e-12 {
                        1.0
                    } else {
                        x.sin() / x
                    }
                })
                .collect(),
            PulseShape::Gaussian { sigma_fraction } => (0..n)
                .map(|i| {
                    let t = centre(i);
                    (-t * t / (2.0 * sigma_fraction * sigma_fraction)).exp()
                })
                .collect(),
            PulseShape::Custom { samples } => {
                if samples.is_empty() {
                    return vec![0.0; n];
                }
                (0..n)
                    .map(|i| {
                        let idx = ((i as f64 + 0.5) / n as f64 * samples.len() as f64) as usize;
                        samples[idx.min(samples.len() - 1)]
                    })
                    .collect()
            }
        }
    }

    fn validate(&self, event: &str, issues: &mut Vec<ValidationError>) {
        match self {
            PulseShape::Rect => {}
            PulseShape::Sinc { lobes } => check_range(
                event,
                "sinc.lobes",
                f64::from(*lobes),
                f64::from(SINC_LOBES_RANGE.0),
                f64::from(SINC_LOBES_RANGE.1),
                issues,
            ),
            PulseShape::Gaussian { sigma_fraction } => {
                if !(sigma_fraction.is_finite() && *sigma_fraction > 0.0 && *sigma_fraction <= 1.0)
                {
                    issues.push(ValidationError::ParameterRange {
                        event: event.to_string(),
                        parameter: "gaussian.sigma_fraction",
                        value: *sigma_fraction,
                        min: 0.0,
                        max: 1.0,
                    });
                }
            }
            PulseShape::Custom { samples } => {
                if samples.is_empty() {
                    issues.push(ValidationError::Parameter {
                        event: event.to_string(),
                        message: "custom envelope has no samples".into(),
                    });
                }
                if let Some(bad) = samples
                    .iter()
                    .find(|v| !v.is_finite() || !(-1.0..=1.0).contains(*v))
                {
                    issues.push(ValidationError::ParameterRange {
                        event: event.to_string(),
                        parameter: "custom.samples",
                        value: *bad,
                        min: -1.0,
                        max: 1.0,
                    });
                }
            }
        }
    }
}

impl fmt::Display for PulseShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PulseShape::Rect => write!(f, "rect"),
            PulseShape::Sinc { lobes } => write!(f, "sinc({lobes})"),
            PulseShape::Gaussian { sigma_fraction } => write!(f, "gauss({sigma_fraction})"),
            PulseShape::Custom { samples } => write!(f, "custom[{}]", samples.len()),
        }
    }
}

/// Acquisition window parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AcquisitionParams {
    /// Base receiver phase in degrees, `[0, 360)`.
    #[serde(default)]
    pub receiver_phase_deg: f64,
    /// Receiver sign and phase per phase-cycle step.
    #[serde(default = "default_readout_scheme")]
    pub readout_scheme: Vec<ReadoutStep>,
}

impl Default for AcquisitionParams {
    fn default() -> Self {
        Self {
            receiver_phase_deg: 0.0,
            readout_scheme: default_readout_scheme(),
        }
    }
}

impl AcquisitionParams {
    /// Use the given readout scheme.
    pub fn with_readout_scheme(mut self, scheme: Vec<ReadoutStep>) -> Self {
        self.readout_scheme = scheme;
        self
    }

    fn validate(&self, event: &str, issues: &mut Vec<ValidationError>) {
        check_phase(event, "receiver_phase_deg", self.receiver_phase_deg, issues);
        if self.readout_scheme.is_empty() {
            issues.push(ValidationError::Parameter {
                event: event.to_string(),
                message: "readout scheme must have at least one step".into(),
            });
        }
        for step in &self.readout_scheme {
            if step.sign != 1 && step.sign != -1 {
                issues.push(ValidationError::ParameterRange {
                    event: event.to_string(),
                    parameter: "readout_scheme.sign",
                    value: f64::from(step.sign),
                    min: -1.0,
                    max: 1.0,
                });
            }
            check_phase(event, "readout_scheme.phase_deg", step.phase_deg, issues);
        }
    }
}

/// One row of a readout scheme.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReadoutStep {
    /// `+1` or `-1`.
    pub sign: i8,
    /// Additional receiver phase in degrees.
    pub phase_deg: f64,
}

impl ReadoutStep {
    /// Build a step.
    pub fn new(sign: i8, phase_deg: f64) -> Self {
        Self { sign, phase_deg }
    }
}

fn default_readout_scheme() -> Vec<ReadoutStep> {
    vec![ReadoutStep::new(1, 0.0)]
}

impl Event {
    /// Build an event of any kind.
    pub fn new(name: impl Into<String>, kind: EventKind, start_ns: f64, duration_ns: f64) -> Self {
        Self {
            name: name.into(),
            start_ns,
            duration_ns,
            gate: false,
            kind,
        }
    }

    /// Drive the gate output while this event runs.
    pub fn with_gate(mut self, gate: bool) -> Self {
        self.gate = gate;
        self
    }

    /// Build a pulse.
    pub fn pulse(name: impl Into<String>, start_ns: f64, duration_ns: f64, params: PulseParams) -> Self {
        Self::new(name, EventKind::Pulse(params), start_ns, duration_ns)
    }

    /// Build a delay.
    pub fn delay(name: impl Into<String>, start_ns: f64, duration_ns: f64) -> Self {
        Self::new(name, EventKind::Delay, start_ns, duration_ns)
    }

    /// Build an acquisition window.
    pub fn acquisition(
        name: impl Into<String>,
        start_ns: f64,
        duration_ns: f64,
        params: AcquisitionParams,
    ) -> Self {
        Self::new(name, EventKind::Acquisition(params), start_ns, duration_ns)
    }

    /// Event name, unique within a sequence.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Event kind and parameters.
    pub fn kind(&self) -> &EventKind {
        &self.kind
    }

    /// Start offset in nanoseconds.
    pub fn start_ns(&self) -> f64 {
        self.start_ns
    }

    /// Duration in nanoseconds.
    pub fn duration_ns(&self) -> f64 {
        self.duration_ns
    }

    /// Whether the gate output is high during this event.
    pub fn gate(&self) -> bool {
        self.gate
    }

    /// End time in nanoseconds.
    pub fn end_ns(&self) -> f64 {
        self.start_ns + self.duration_ns
    }

    /// Whether this is an acquisition window.
    pub fn is_acquisition(&self) -> bool {
        matches!(self.kind, EventKind::Acquisition(_))
    }

    /// Whether this event may share time with `other`.
    ///
    /// Only an acquisition window paired with a pulse marked concurrent
    /// qualifies.
    pub fn may_overlap(&self, other: &Event) -> bool {
        let concurrent_pulse = |e: &Event| matches!(&e.kind, EventKind::Pulse(p) if p.concurrent);
        (self.is_acquisition() && concurrent_pulse(other))
            || (other.is_acquisition() && concurrent_pulse(self))
    }

    /// Whether the half-open intervals of the two events intersect.
    pub fn overlaps(&self, other: &Event) -> bool {
        self.start_ns < other.end_ns() && other.start_ns < self.end_ns()
    }

    /// Check timing and parameter ranges of this event alone.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut issues = Vec::new();
        if !self.start_ns.is_finite() || self.start_ns < 0.0 {
            issues.push(ValidationError::InvalidStart {
                event: self.name.clone(),
                start_ns: self.start_ns,
            });
        }
        if !self.duration_ns.is_finite() || self.duration_ns <= 0.0 {
            issues.push(ValidationError::InvalidDuration {
                event: self.name.clone(),
                duration_ns: self.duration_ns,
            });
        }
        match &self.kind {
            EventKind::Pulse(p) => p.validate(&self.name, &mut issues),
            EventKind::Delay => {}
            EventKind::Acquisition(a) => a.validate(&self.name, &mut issues),
        }
        issues
    }
}

fn check_range(
    event: &str,
    parameter: &'static str,
    value: f64,
    min: f64,
    max: f64,
    issues: &mut Vec<ValidationError>,
) {
    if !value.is_finite() || value < min || value > max {
        issues.push(ValidationError::ParameterRange {
            event: event.to_string(),
            parameter,
            value,
            min,
            max,
        });
    }
}

fn check_phase(event: &str, parameter: &'static str, value: f64, issues: &mut Vec<ValidationError>) {
    if !value.is_finite() || !(0.0..360.0).contains(&value) {
        issues.push(ValidationError::ParameterRange {
            event: event.to_string(),
            parameter,
            value,
            min: 0.0,
            max: 360.0,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // =========================================================================
    // Construction and accessors
    // =========================================================================

    #[test]
    fn test_pulse_accessors() {
        let e = Event::pulse("p90", 0.0, 10_000.0, PulseParams::rect(80.0, 90.0));
        assert_eq!(e.name(), "p90");
        assert_eq!(e.end_ns(), 10_000.0);
        assert_eq!(e.kind().label(), "pulse");
        assert!(e.validate().is_empty());
    }

    #[test]
    fn test_delay_and_acquisition_valid() {
        assert!(Event::delay("d", 10.0, 40.0).validate().is_empty());
        let acq = Event::acquisition("rx", 50.0, 100.0, AcquisitionParams::default());
        assert!(acq.is_acquisition());
        assert!(acq.validate().is_empty());
    }

    // =========================================================================
    // Timing checks
    // =========================================================================

    #[test]
    fn test_negative_start_rejected() {
        let issues = Event::delay("d", -1.0, 10.0).validate();
        assert!(matches!(issues[0], ValidationError::InvalidStart { .. }));
    }

    #[test]
    fn test_zero_duration_rejected() {
        let issues = Event::delay("d", 0.0, 0.0).validate();
        assert!(matches!(issues[0], ValidationError::InvalidDuration { .. }));
    }

    #[test]
    fn test_nan_duration_rejected() {
        assert!(!Event::delay("d", 0.0, f64::NAN).validate().is_empty());
    }

    // =========================================================================
    // Parameter ranges
    // =========================================================================

    #[test]
    fn test_amplitude_out_of_range_not_clamped() {
        let e = Event::pulse("tx", 0.0, 10.0, PulseParams::rect(101.0, 0.0));
        let issues = e.validate();
        assert_eq!(issues.len(), 1);
        match &issues[0] {
            ValidationError::ParameterRange {
                parameter, value, ..
            } => {
                assert_eq!(*parameter, "amplitude_pct");
                assert_eq!(*value, 101.0);
            }
            other => panic!("unexpected issue {other:?}"),
        }
    }

    #[test]
    fn test_phase_360_rejected() {
        let e = Event::pulse("tx", 0.0, 10.0, PulseParams::rect(50.0, 360.0));
        assert_eq!(e.validate().len(), 1);
    }

    #[test]
    fn test_phase_cycles_zero_rejected() {
        let e = Event::pulse(
            "tx",
            0.0,
            10.0,
            PulseParams::rect(50.0, 0.0).with_phase_cycling(0, 0),
        );
        assert!(!e.validate().is_empty());
    }

    #[test]
    fn test_frequency_offset_limit() {
        let params = PulseParams {
            frequency_offset_hz: 20e6,
            ..PulseParams::default()
        };
        assert!(!Event::pulse("tx", 0.0, 10.0, params).validate().is_empty());
    }

    #[test]
    fn test_readout_sign_must_be_unit() {
        let params = AcquisitionParams::default().with_readout_scheme(vec![ReadoutStep::new(2, 0.0)]);
        let issues = Event::acquisition("rx", 0.0, 10.0, params).validate();
        assert_eq!(issues.len(), 1);
    }

    #[test]
    fn test_empty_readout_scheme_rejected() {
        let params = AcquisitionParams::default().with_readout_scheme(vec![]);
        assert!(!Event::acquisition("rx", 0.0, 10.0, params).validate().is_empty());
    }

    #[test]
    fn test_custom_shape_out_of_range() {
        let shape = PulseShape::Custom {
            samples: vec![0.5, 1.5],
        };
        let e = Event::pulse("tx", 0.0, 10.0, PulseParams::default().with_shape(shape));
        assert_eq!(e.validate().len(), 1);
    }

    // =========================================================================
    // Overlap rules
    // =========================================================================

    #[test]
    fn test_concurrent_pulse_may_overlap_acquisition() {
        let p = Event::pulse("tx", 0.0, 10.0, PulseParams::default().concurrent());
        let a = Event::acquisition("rx", 5.0, 10.0, AcquisitionParams::default());
        assert!(p.overlaps(&a));
        assert!(p.may_overlap(&a));
        assert!(a.may_overlap(&p));
    }

    #[test]
    fn test_plain_pulse_may_not_overlap_acquisition() {
        let p = Event::pulse("tx", 0.0, 10.0, PulseParams::default());
        let a = Event::acquisition("rx", 5.0, 10.0, AcquisitionParams::default());
        assert!(!p.may_overlap(&a));
    }

    #[test]
    fn test_touching_events_do_not_overlap() {
        let a = Event::delay("a", 0.0, 10.0);
        let b = Event::delay("b", 10.0, 10.0);
        assert!(!a.overlaps(&b));
    }

    // =========================================================================
    // Envelopes
    // =========================================================================

    #[test]
    fn test_rect_envelope() {
        assert_eq!(PulseShape::Rect.envelope(3), vec![1.0, 1.0, 1.0]);
    }

    #[test]
    fn test_sinc_envelope_peak_and_bounds() {
        let env = PulseShape::Sinc { lobes: 3 }.envelope(101);
        assert!((env[50] - 1.0).abs() < 1e-12);
        assert!(env.iter().all(|v| (-1.0..=1.0).contains(v)));
        assert!(env.iter().any(|v| *v < 0.0));
    }

    #[test]
    fn test_gaussian_envelope_symmetric() {
        let env = PulseShape::Gaussian { sigma_fraction: 0.2 }.envelope(10);
        for i in 0..5 {
            assert!((env[i] - env[9 - i]).abs() < 1e-12);
        }
    }

    #[test]
    fn test_custom_envelope_resampled() {
        let env = PulseShape::Custom {
            samples: vec![0.0, 1.0],
        }
        .envelope(4);
        assert_eq!(env, vec![0.0, 0.0, 1.0, 1.0]);
    }

    // =========================================================================
    // Serialization
    // =========================================================================

    #[test]
    fn test_deserialize_event_with_units() {
        let yaml = r#"
name: p90
kind: pulse
start_ns: 0
duration_ns: "10u"
amplitude_pct: 75
shape:
  type: gaussian
  sigma_fraction: 0.25
"#;
        let e: Event = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(e.duration_ns(), 10_000.0);
        match e.kind() {
            EventKind::Pulse(p) => {
                assert_eq!(p.amplitude_pct, 75.0);
                assert_eq!(p.phase_cycles, 1);
                assert_eq!(p.shape, PulseShape::Gaussian { sigma_fraction: 0.25 });
            }
            other => panic!("unexpected kind {other:?}"),
        }
    }

    #[test]
    fn test_deserialize_delay() {
        let e: Event = serde_yaml::from_str("name: d\nkind: delay\nstart_ns: 10\nduration_ns: 40").unwrap();
        assert_eq!(e.kind(), &EventKind::Delay);
    }

    #[test]
    fn test_gate_defaults_low_and_deserializes() {
        let e: Event = serde_yaml::from_str("name: d\nkind: delay\nstart_ns: 0\nduration_ns: 40").unwrap();
        assert!(!e.gate());

        let yaml = "name: blank\nkind: delay\nstart_ns: 0\nduration_ns: 40\ngate: true";
        let e: Event = serde_yaml::from_str(yaml).unwrap();
        assert!(e.gate());
        assert_eq!(e, Event::delay("blank", 0.0, 40.0).with_gate(true));
    }
}
