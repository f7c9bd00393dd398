// Copyright 2026 QubitOS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Spectrometer trait definition.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::{watch, Mutex};

use crate::acquisition::SampleChunk;
use crate::compiler::CompiledProgram;
use crate::config::DeviceLimits;
use crate::error::DeviceError;

/// Type of device (simulator or hardware).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceType {
    /// Software model of a spectrometer
    Simulator,
    /// Real spectrometer
    Hardware,
}

impl std::fmt::Display for DeviceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeviceType::Simulator => write!(f, "simulator"),
            DeviceType::Hardware => write!(f, "hardware"),
        }
    }
}

/// Health status of a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    /// Device is fully operational
    Healthy,
    /// Device is operational with reduced performance
    Degraded,
    /// Device is not available
    Unavailable,
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HealthStatus::Healthy => write!(f, "healthy"),
            HealthStatus::Degraded => write!(f, "degraded"),
            HealthStatus::Unavailable => write!(f, "unavailable"),
        }
    }
}

/// Static information about a device.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceInfo {
    /// Device name
    pub name: String,
    /// Type of device
    pub device_type: DeviceType,
    /// Receiver sampling rate
    pub sample_rate_hz: f64,
    /// Larmor frequency the spectrometer is tuned to
    pub target_frequency_hz: f64,
    /// Supported parameter ranges
    pub limits: DeviceLimits,
    /// Firmware or software version
    pub software_version: String,
}

/// Cooperative cancellation flag shared between a run and its device.
///
/// Devices check it before starting each instruction; an instruction that
/// has started always runs to completion.
#[derive(Debug, Clone)]
pub struct CancelToken {
    tx: Arc<watch::Sender<bool>>,
}

impl CancelToken {
    /// Create a token that is not cancelled.
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Request cancellation. Every clone observes it.
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    /// Whether cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolve once cancellation is requested.
    pub async fn cancelled(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives in `self`, so the channel cannot close here
        let _ = rx.wait_for(|cancelled| *cancelled).await;
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

/// The capability every spectrometer or simulator provides.
#[async_trait]
pub trait Spectrometer: Send + Sync {
    /// Get the device name.
    fn name(&self) -> &str;

    /// Get the device type.
    fn device_type(&self) -> DeviceType;

    /// Receiver sampling rate in Hz.
    fn sample_rate_hz(&self) -> f64;

    /// Parameter ranges the device supports.
    fn limits(&self) -> &DeviceLimits;

    /// Lock held for the whole of one execution.
    ///
    /// Every caller that drives this device takes it first, so at most one
    /// program runs on the device at a time no matter how many runners
    /// share it.
    fn execution_lock(&self) -> &Mutex<()>;

    /// Execute a compiled program and return the samples of each
    /// acquisition window in program order.
    ///
    /// The program is consumed; one program drives one execution.
    /// Implementations check `cancel` before each instruction and return
    /// [`DeviceError::Cancelled`] with the index of the first instruction
    /// not started.
    async fn execute(
        &self,
        program: CompiledProgram,
        cancel: &CancelToken,
    ) -> Result<Vec<SampleChunk>, DeviceError>;

    /// Get device information.
    async fn device_info(&self) -> Result<DeviceInfo, DeviceError>;

    /// Check device health.
    async fn health_check(&self) -> Result<HealthStatus, DeviceError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_cancel_token_shared_between_clones() {
        let token = CancelToken::new();
        let clone = token.clone();
        assert!(!clone.is_cancelled());
        token.cancel();
        assert!(clone.is_cancelled());
    }

    #[tokio::test]
    async fn test_cancelled_resolves_after_cancel() {
        let token = CancelToken::new();
        let waiter = token.clone();
        let handle = tokio::spawn(async move { waiter.cancelled().await });
        tokio::time::sleep(Duration::from_millis(5)).await;
        token.cancel();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_cancelled_returns_immediately_when_already_cancelled() {
        let token = CancelToken::new();
        token.cancel();
        tokio::time::timeout(Duration::from_millis(100), token.cancelled())
            .await
            .unwrap();
    }

    #[test]
    fn test_display() {
        assert_eq!(DeviceType::Simulator.to_string(), "simulator");
        assert_eq!(HealthStatus::Degraded.to_string(), "degraded");
    }
}
