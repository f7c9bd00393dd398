// Copyright 2026 QubitOS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Device-range checks on compiled programs.
//!
//! Sequence-level ranges are enforced when events are added. These checks
//! cover what a particular device supports, which is only known at compile
//! time.

use crate::compiler::{CompiledProgram, Instruction, Operation};
use crate::config::DeviceLimits;
use crate::error::{Error, Result};

/// Validate the number of instructions a program would expand to.
pub fn validate_instruction_count(count: u64, limits: &DeviceLimits) -> Result<()> {
    if count > u64::from(limits.max_instructions) {
        return Err(Error::DeviceRange {
            parameter: "instruction_count".into(),
            value: count as f64,
            min: 0.0,
            max: f64::from(limits.max_instructions),
        });
    }
    Ok(())
}

/// Validate one instruction against the device limits.
pub fn validate_instruction(instruction: &Instruction, limits: &DeviceLimits) -> Result<()> {
    if instruction.duration_ticks > limits.max_instruction_ticks {
        return Err(Error::DeviceRange {
            parameter: format!("{}.duration_ticks", instruction.event),
            value: instruction.duration_ticks as f64,
            min: 1.0,
            max: limits.max_instruction_ticks as f64,
        });
    }

    if let Operation::Transmit {
        amplitude_pct,
        frequency_offset_hz,
        ..
    } = &instruction.op
    {
        if *amplitude_pct > limits.max_amplitude_pct {
            return Err(Error::DeviceRange {
                parameter: format!("{}.amplitude_pct", instruction.event),
                value: *amplitude_pct,
                min: 0.0,
                max: limits.max_amplitude_pct,
            });
        }
        if frequency_offset_hz.abs() > limits.max_frequency_offset_hz {
            return Err(Error::DeviceRange {
                parameter: format!("{}.frequency_offset_hz", instruction.event),
                value: *frequency_offset_hz,
                min: -limits.max_frequency_offset_hz,
                max: limits.max_frequency_offset_hz,
            });
        }
    }

    Ok(())
}

/// Validate a whole compiled program.
pub fn validate_program(program: &CompiledProgram, limits: &DeviceLimits) -> Result<()> {
    validate_instruction_count(program.instructions().len() as u64, limits)?;
    // Blocks repeat verbatim apart from phases, so the first block is enough
    program
        .instructions()
        .iter()
        .take_while(|i| i.repetition == 0)
        .try_for_each(|i| validate_instruction(i, limits))
}
