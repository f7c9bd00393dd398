// Copyright 2026 QubitOS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Sequence compiler.
//!
//! Maps a [`PulseSequence`] onto a flat list of device [`Instruction`]s on
//! an integer tick grid. Start offsets and durations are rounded to the
//! nearest tick with exact halves going toward zero; a duration that
//! rounds to zero ticks is an error, never rounded up. Repetitions are
//! expanded explicitly: block `r` is shifted by
//! `r · (block_ticks + inter_repetition_delay_ticks)`.
//!
//! Compilation is pure. The same sequence, resolution and limits always
//! produce the same [`CompiledProgram`], byte for byte.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::DeviceLimits;
use crate::error::{Error, ResolutionError, Result};
use crate::sequence::time::{check_floor, is_multiple, TickClock};
use crate::sequence::{Event, EventId, EventKind, PhaseTable, PulseSequence, PulseShape};
use crate::validation;

/// A single device-level instruction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instruction {
    /// Absolute start, in device ticks from program start.
    pub start_tick: u64,
    /// Length in device ticks, always `> 0`.
    pub duration_ticks: u64,
    /// Repetition block this instruction belongs to.
    pub repetition: u32,
    /// Name of the source event.
    pub event: String,
    /// TTL gate output level for the length of the instruction.
    #[serde(default)]
    pub gate: bool,
    /// What the device does.
    pub op: Operation,
}

impl Instruction {
    /// First tick after this instruction, `None` past the end of the
    /// tick range.
    pub fn end_tick(&self) -> Option<u64> {
        self.start_tick.checked_add(self.duration_ticks)
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "@{:>10} +{:<8} r{:<4} {:<12} {}{}",
            self.start_tick,
            self.duration_ticks,
            self.repetition,
            self.event,
            self.op,
            if self.gate { " gate" } else { "" }
        )
    }
}

/// Device operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Operation {
    /// Play an RF pulse.
    Transmit {
        /// Relative amplitude in percent.
        amplitude_pct: f64,
        /// Phase for this repetition, phase cycling applied.
        phase_deg: f64,
        /// Offset from the carrier in Hz.
        frequency_offset_hz: f64,
        /// Envelope, sampled once per tick by the device.
        shape: PulseShape,
        /// Plays during an acquisition window.
        concurrent: bool,
    },
    /// Idle.
    Wait,
    /// Open acquisition window number `window`.
    Acquire {
        /// Running window index over the whole program.
        window: u32,
        /// Receiver phase for this repetition.
        receiver_phase_deg: f64,
        /// Receiver sign for this repetition.
        sign: i8,
    },
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Transmit {
                amplitude_pct,
                phase_deg,
                frequency_offset_hz,
                shape,
                ..
            } => write!(
                f,
                "tx {shape} amp={amplitude_pct:.1}% phase={phase_deg:.1} df={frequency_offset_hz:.1}Hz"
            ),
            Operation::Wait => write!(f, "wait"),
            Operation::Acquire {
                window,
                receiver_phase_deg,
                sign,
            } => write!(f, "rx #{window} phase={receiver_phase_deg:.1} sign={sign:+}"),
        }
    }
}

/// Output of one compile call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompiledProgram {
    sequence: String,
    resolution_ns: f64,
    repetitions: u32,
    block_ticks: u64,
    period_ticks: u64,
    total_ticks: u64,
    instructions: Vec<Instruction>,
}

impl CompiledProgram {
    /// Name of the source sequence.
    pub fn sequence(&self) -> &str {
        &self.sequence
    }

    /// Device tick length.
    pub fn resolution_ns(&self) -> f64 {
        self.resolution_ns
    }

    /// Number of repetition blocks.
    pub fn repetitions(&self) -> u32 {
        self.repetitions
    }

    /// Length of one block in ticks.
    pub fn block_ticks(&self) -> u64 {
        self.block_ticks
    }

    /// Distance between block starts in ticks.
    pub fn period_ticks(&self) -> u64 {
        self.period_ticks
    }

    /// End of the last block in ticks.
    pub fn total_ticks(&self) -> u64 {
        self.total_ticks
    }

    /// Program length in nanoseconds.
    pub fn duration_ns(&self) -> f64 {
        self.ticks_to_ns(self.total_ticks)
    }

    /// Convert a tick count to nanoseconds at this program's resolution.
    pub fn ticks_to_ns(&self, ticks: u64) -> f64 {
        ticks as f64 * self.resolution_ns
    }

    /// Instructions in execution order.
    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    /// Number of acquisition windows.
    pub fn acquisition_count(&self) -> usize {
        self.instructions
            .iter()
            .filter(|i| matches!(i.op, Operation::Acquire { .. }))
            .count()
    }

    /// Canonical byte encoding.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }
}

impl fmt::Display for CompiledProgram {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "program '{}': {} instructions, {} x {} ticks (period {}), {} ns/tick",
            self.sequence,
            self.instructions.len(),
            self.repetitions,
            self.block_ticks,
            self.period_ticks,
            self.resolution_ns
        )?;
        for instruction in &self.instructions {
            writeln!(f, "  {instruction}")?;
        }
        Ok(())
    }
}

/// Compiles sequences against a device's limits.
#[derive(Debug, Clone, Default)]
pub struct SequenceCompiler {
    limits: DeviceLimits,
}

/// An event placed on the tick grid.
struct Placed<'a> {
    id: EventId,
    event: &'a Event,
    start: u64,
    duration: u64,
    end: u64,
}

impl SequenceCompiler {
    /// Create a compiler for a device with the given limits.
    pub fn new(limits: DeviceLimits) -> Self {
        Self { limits }
    }

    /// Limits this compiler checks against.
    pub fn limits(&self) -> &DeviceLimits {
        &self.limits
    }

    /// Compile `sequence` at `device_resolution_ns`.
    ///
    /// # Errors
    ///
    /// - [`Error::MalformedSequence`] if [`PulseSequence::validate`] reports
    ///   anything
    /// - [`Error::Resolution`] if the resolution is invalid, below the
    ///   device floor, does not divide the sequence's own grid, rounds an
    ///   event duration to zero, or makes two events collide
    /// - [`Error::DeviceRange`] if a parameter is outside the device limits
    pub fn compile(
        &self,
        sequence: &PulseSequence,
        device_resolution_ns: f64,
    ) -> Result<CompiledProgram> {
        debug!(
            sequence = %sequence.name(),
            events = sequence.len(),
            repetitions = sequence.repetitions(),
            device_resolution_ns,
            "Compiling sequence"
        );

        let violations = sequence.validate();
        if !violations.is_empty() {
            return Err(Error::MalformedSequence(violations));
        }

        let clock = TickClock::new(device_resolution_ns)?;
        check_floor(device_resolution_ns, self.limits.min_resolution_ns)?;
        if let Some(sequence_ns) = sequence.resolution_ns() {
            if !is_multiple(sequence_ns, device_resolution_ns) {
                return Err(ResolutionError::Incommensurate {
                    sequence_ns,
                    device_ns: device_resolution_ns,
                }
                .into());
            }
        }

        let block = place(sequence, &clock)?;
        check_quantized_overlap(&block)?;

        let repetitions = sequence.repetitions();
        let count = block.len() as u64 * u64::from(repetitions);
        validation::validate_instruction_count(count, &self.limits)?;

        let block_ticks = block.iter().map(|p| p.end).max().unwrap_or(0);
        let delay_ns = sequence.inter_repetition_delay_ns();
        let delay_ticks = clock
            .try_quantize(delay_ns)
            .ok_or_else(|| program_ticks_error(delay_ns / device_resolution_ns))?;
        let period_ticks = block_ticks
            .checked_add(delay_ticks)
            .ok_or_else(|| program_ticks_error(block_ticks as f64 + delay_ticks as f64))?;
        let total_ticks = period_ticks
            .checked_mul(u64::from(repetitions.saturating_sub(1)))
            .and_then(|t| t.checked_add(block_ticks))
            .ok_or_else(|| program_ticks_error(period_ticks as f64 * f64::from(repetitions)))?;

        let phases = PhaseTable::from_sequence(sequence);
        let mut instructions = Vec::with_capacity(block.len() * repetitions as usize);
        let mut window = 0u32;
        for repetition in 0..repetitions {
            let offset = period_ticks * u64::from(repetition);
            let row = phases.row_for_repetition(repetition);
            for placed in &block {
                let op = match placed.event.kind() {
                    EventKind::Pulse(p) => Operation::Transmit {
                        amplitude_pct: p.amplitude_pct,
                        phase_deg: phases.phase(row, placed.id).unwrap_or(p.phase_deg),
                        frequency_offset_hz: p.frequency_offset_hz,
                        shape: p.shape.clone(),
                        concurrent: p.concurrent,
                    },
                    EventKind::Delay => Operation::Wait,
                    EventKind::Acquisition(a) => {
                        let scheme = &a.readout_scheme;
                        let step = scheme[repetition as usize % scheme.len()];
                        let op = Operation::Acquire {
                            window,
                            receiver_phase_deg: (a.receiver_phase_deg + step.phase_deg) % 360.0,
                            sign: step.sign,
                        };
                        window += 1;
                        op
                    }
                };
                instructions.push(Instruction {
                    start_tick: offset + placed.start,
                    duration_ticks: placed.duration,
                    repetition,
                    event: placed.event.name().to_string(),
                    gate: placed.event.gate(),
                    op,
                });
            }
        }

        let program = CompiledProgram {
            sequence: sequence.name().to_string(),
            resolution_ns: device_resolution_ns,
            repetitions,
            block_ticks,
            period_ticks,
            total_ticks,
            instructions,
        };
        validation::validate_program(&program, &self.limits)?;

        info!(
            sequence = %program.sequence,
            instructions = program.instructions.len(),
            windows = window,
            total_ticks,
            "Compiled sequence"
        );
        Ok(program)
    }
}

/// Compile with default device limits.
pub fn compile(sequence: &PulseSequence, device_resolution_ns: f64) -> Result<CompiledProgram> {
    SequenceCompiler::default().compile(sequence, device_resolution_ns)
}

fn place<'a>(sequence: &'a PulseSequence, clock: &TickClock) -> Result<Vec<Placed<'a>>> {
    sequence
        .ids()
        .iter()
        .zip(sequence.events())
        .map(|(id, event)| -> Result<Placed<'a>> {
            let ticks = |ns: f64| {
                clock
                    .try_quantize(ns)
                    .ok_or_else(|| program_ticks_error(ns / clock.resolution_ns()))
            };
            let start = ticks(event.start_ns())?;
            let duration = ticks(event.duration_ns())?;
            if duration == 0 {
                return Err(ResolutionError::ZeroDuration {
                    event: event.name().to_string(),
                    duration_ns: event.duration_ns(),
                    resolution_ns: clock.resolution_ns(),
                }
                .into());
            }
            let end = start
                .checked_add(duration)
                .ok_or_else(|| program_ticks_error(start as f64 + duration as f64))?;
            Ok(Placed {
                id: *id,
                event,
                start,
                duration,
                end,
            })
        })
        .collect()
}

fn program_ticks_error(ticks: f64) -> Error {
    Error::DeviceRange {
        parameter: "program_ticks".into(),
        value: ticks,
        min: 0.0,
        max: u64::MAX as f64,
    }
}

fn check_quantized_overlap(block: &[Placed<'_>]) -> Result<()> {
    for (j, later) in block.iter().enumerate() {
        for earlier in &block[..j] {
            let collide = earlier.start < later.end && later.start < earlier.end;
            if collide && !earlier.event.may_overlap(later.event) {
                return Err(ResolutionError::QuantizedOverlap {
                    first: earlier.event.name().to_string(),
                    second: later.event.name().to_string(),
                }
                .into());
            }
        }
    }
    Ok(())
}
