// Copyright 2026 QubitOS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Shared mock devices for tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use num_complex::Complex64;
use parking_lot::Mutex;

use crate::acquisition::SampleChunk;
use crate::compiler::{CompiledProgram, Operation};
use crate::config::DeviceLimits;
use crate::device::{CancelToken, DeviceInfo, DeviceType, HealthStatus, Spectrometer};
use crate::error::DeviceError;

/// One chunk per acquisition instruction, filled with a tone at an eighth
/// of the sample rate.
fn tone_chunks(program: &CompiledProgram, sample_rate_hz: f64) -> Vec<SampleChunk> {
    program
        .instructions()
        .iter()
        .filter_map(|i| match i.op {
            Operation::Acquire {
                window,
                receiver_phase_deg,
                sign,
            } => {
                let duration_ns = program.ticks_to_ns(i.duration_ticks);
                let n = (duration_ns * sample_rate_hz / 1e9).round() as usize;
                let samples = (0..n)
                    .map(|k| Complex64::from_polar(1.0, std::f64::consts::FRAC_PI_4 * k as f64))
                    .collect();
                Some(SampleChunk {
                    window,
                    timestamp_ns: program.ticks_to_ns(i.start_tick),
                    receiver_phase_deg,
                    sign,
                    samples,
                })
            }
            _ => None,
        })
        .collect()
}

fn info(name: &str, sample_rate_hz: f64, limits: &DeviceLimits) -> DeviceInfo {
    DeviceInfo {
        name: name.to_string(),
        device_type: DeviceType::Simulator,
        sample_rate_hz,
        target_frequency_hz: 100.0e6,
        limits: limits.clone(),
        software_version: "1.0.0-mock".to_string(),
    }
}

/// Mock device that records every program it executes.
pub struct RecordingDevice {
    pub name: String,
    pub sample_rate_hz: f64,
    pub limits: DeviceLimits,
    pub programs: Mutex<Vec<CompiledProgram>>,
    active: AtomicUsize,
    pub max_concurrent: AtomicUsize,
    execution_lock: tokio::sync::Mutex<()>,
}

impl RecordingDevice {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            sample_rate_hz: 1e6,
            limits: DeviceLimits::default(),
            programs: Mutex::new(Vec::new()),
            active: AtomicUsize::new(0),
            max_concurrent: AtomicUsize::new(0),
            execution_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn shared(name: &str) -> Arc<dyn Spectrometer> {
        Arc::new(Self::new(name))
    }

    pub fn executions(&self) -> usize {
        self.programs.lock().len()
    }
}

#[async_trait]
impl Spectrometer for RecordingDevice {
    fn name(&self) -> &str {
        &self.name
    }

    fn device_type(&self) -> DeviceType {
        DeviceType::Simulator
    }

    fn sample_rate_hz(&self) -> f64 {
        self.sample_rate_hz
    }

    fn limits(&self) -> &DeviceLimits {
        &self.limits
    }

    fn execution_lock(&self) -> &tokio::sync::Mutex<()> {
        &self.execution_lock
    }

    async fn execute(
        &self,
        program: CompiledProgram,
        _cancel: &CancelToken,
    ) -> Result<Vec<SampleChunk>, DeviceError> {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_concurrent.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(5)).await;
        let chunks = tone_chunks(&program, self.sample_rate_hz);
        self.programs.lock().push(program);
        self.active.fetch_sub(1, Ordering::SeqCst);
        Ok(chunks)
    }

    async fn device_info(&self) -> Result<DeviceInfo, DeviceError> {
        Ok(info(&self.name, self.sample_rate_hz, &self.limits))
    }

    async fn health_check(&self) -> Result<HealthStatus, DeviceError> {
        Ok(HealthStatus::Healthy)
    }
}

/// Mock device whose execution always fails.
pub struct FailingDevice {
    pub name: String,
    pub limits: DeviceLimits,
    pub calls: AtomicUsize,
    execution_lock: tokio::sync::Mutex<()>,
}

impl FailingDevice {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            limits: DeviceLimits::default(),
            calls: AtomicUsize::new(0),
            execution_lock: tokio::sync::Mutex::new(()),
        }
    }
}

#[async_trait]
impl Spectrometer for FailingDevice {
    fn name(&self) -> &str {
        &self.name
    }

    fn device_type(&self) -> DeviceType {
        DeviceType::Hardware
    }

    fn sample_rate_hz(&self) -> f64 {
        1e6
    }

    fn limits(&self) -> &DeviceLimits {
        &self.limits
    }

    fn execution_lock(&self) -> &tokio::sync::Mutex<()> {
        &self.execution_lock
    }

    async fn execute(
        &self,
        _program: CompiledProgram,
        _cancel: &CancelToken,
    ) -> Result<Vec<SampleChunk>, DeviceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(DeviceError::ExecutionFailed("mock execution failure".to_string()))
    }

    async fn device_info(&self) -> Result<DeviceInfo, DeviceError> {
        Err(DeviceError::Unavailable("mock device unavailable".to_string()))
    }

    async fn health_check(&self) -> Result<HealthStatus, DeviceError> {
        Err(DeviceError::Unavailable("mock device unavailable".to_string()))
    }
}

/// Mock device that takes `per_instruction` for every instruction and
/// honours cancellation between them.
pub struct SlowDevice {
    pub name: String,
    pub per_instruction: Duration,
    pub limits: DeviceLimits,
    execution_lock: tokio::sync::Mutex<()>,
}

impl SlowDevice {
    pub fn new(name: &str, per_instruction: Duration) -> Self {
        Self {
            name: name.to_string(),
            per_instruction,
            limits: DeviceLimits::default(),
            execution_lock: tokio::sync::Mutex::new(()),
        }
    }
}

#[async_trait]
impl Spectrometer for SlowDevice {
    fn name(&self) -> &str {
        &self.name
    }

    fn device_type(&self) -> DeviceType {
        DeviceType::Hardware
    }

    fn sample_rate_hz(&self) -> f64 {
        1e6
    }

    fn limits(&self) -> &DeviceLimits {
        &self.limits
    }

    fn execution_lock(&self) -> &tokio::sync::Mutex<()> {
        &self.execution_lock
    }

    async fn execute(
        &self,
        program: CompiledProgram,
        cancel: &CancelToken,
    ) -> Result<Vec<SampleChunk>, DeviceError> {
        for index in 0..program.instructions().len() {
            if cancel.is_cancelled() {
                return Err(DeviceError::Cancelled(index));
            }
            tokio::time::sleep(self.per_instruction).await;
        }
        Ok(tone_chunks(&program, 1e6))
    }

    async fn device_info(&self) -> Result<DeviceInfo, DeviceError> {
        Ok(info(&self.name, 1e6, &self.limits))
    }

    async fn health_check(&self) -> Result<HealthStatus, DeviceError> {
        Ok(HealthStatus::Degraded)
    }
}

/// Mock device that returns its acquisition windows in reverse order.
pub struct OutOfOrderDevice {
    pub name: String,
    pub limits: DeviceLimits,
    execution_lock: tokio::sync::Mutex<()>,
}

impl OutOfOrderDevice {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            limits: DeviceLimits::default(),
            execution_lock: tokio::sync::Mutex::new(()),
        }
    }
}

#[async_trait]
impl Spectrometer for OutOfOrderDevice {
    fn name(&self) -> &str {
        &self.name
    }

    fn device_type(&self) -> DeviceType {
        DeviceType::Hardware
    }

    fn sample_rate_hz(&self) -> f64 {
        1e6
    }

    fn limits(&self) -> &DeviceLimits {
        &self.limits
    }

    fn execution_lock(&self) -> &tokio::sync::Mutex<()> {
        &self.execution_lock
    }

    async fn execute(
        &self,
        program: CompiledProgram,
        _cancel: &CancelToken,
    ) -> Result<Vec<SampleChunk>, DeviceError> {
        let mut chunks = tone_chunks(&program, 1e6);
        chunks.reverse();
        Ok(chunks)
    }

    async fn device_info(&self) -> Result<DeviceInfo, DeviceError> {
        Ok(info(&self.name, 1e6, &self.limits))
    }

    async fn health_check(&self) -> Result<HealthStatus, DeviceError> {
        Ok(HealthStatus::Healthy)
    }
}
