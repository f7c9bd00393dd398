// Copyright 2026 QubitOS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Device registry.
//!
//! Maps names to spectrometers and tracks a default. The first device
//! registered becomes the default.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, info, warn};

use super::{DeviceType, SimulatedSpectrometer, Spectrometer};
use crate::config::Config;
use crate::error::{DeviceError, Error, Result};

/// Thread-safe registry of spectrometers.
pub struct DeviceRegistry {
    devices: RwLock<HashMap<String, Arc<dyn Spectrometer>>>,
    default_device: RwLock<Option<String>>,
}

impl DeviceRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            devices: RwLock::new(HashMap::new()),
            default_device: RwLock::new(None),
        }
    }

    /// Build a registry from configuration.
    ///
    /// Registers the simulator when enabled and makes `device.name` the
    /// default if it is registered.
    pub fn from_config(config: &Config) -> Self {
        let registry = Self::new();
        if config.simulator.enabled {
            registry.register(Arc::new(SimulatedSpectrometer::new(
                "simulator",
                config.simulator.clone(),
                config.device.sample_rate_hz,
                config.device.limits.clone(),
            )
            .with_target_frequency(config.device.target_frequency_hz)));
        }
        if registry.set_default(&config.device.name).is_err() {
            warn!(device = %config.device.name, "Configured device is not registered");
        }
        registry
    }

    /// Register a device, replacing any with the same name.
    pub fn register(&self, device: Arc<dyn Spectrometer>) {
        let name = device.name().to_string();
        info!(device = %name, device_type = %device.device_type(), "Registering device");

        self.devices.write().insert(name.clone(), device);

        let mut default = self.default_device.write();
        if default.is_none() {
            debug!(device = %name, "Setting as default device");
            *default = Some(name);
        }
    }

    /// Set the default device.
    pub fn set_default(&self, name: &str) -> Result<()> {
        if !self.devices.read().contains_key(name) {
            return Err(Error::Execution(DeviceError::NotFound(name.to_string())));
        }
        *self.default_device.write() = Some(name.to_string());
        info!(device = %name, "Set as default device");
        Ok(())
    }

    /// Get a device by name.
    pub fn get(&self, name: &str) -> Result<Arc<dyn Spectrometer>> {
        self.devices
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| Error::Execution(DeviceError::NotFound(name.to_string())))
    }

    /// Get the default device.
    pub fn get_default(&self) -> Result<Arc<dyn Spectrometer>> {
        let default = self.default_device.read().clone();
        match default {
            Some(name) => self.get(&name),
            None => Err(Error::Execution(DeviceError::NotFound(
                "No default device configured".to_string(),
            ))),
        }
    }

    /// Get a device by name, or the default if `name` is `None`.
    pub fn get_or_default(&self, name: Option<&str>) -> Result<Arc<dyn Spectrometer>> {
        match name {
            Some(n) => self.get(n),
            None => self.get_default(),
        }
    }

    /// Registered devices with their types, sorted by name.
    pub fn list(&self) -> Vec<(String, DeviceType)> {
        let mut out: Vec<(String, DeviceType)> = self
            .devices
            .read()
            .iter()
            .map(|(name, device)| (name.clone(), device.device_type()))
            .collect();
        out.sort_by(|a, b| a.0.cmp(&b.0));
        out
    }

    /// Whether a device is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.devices.read().contains_key(name)
    }

    /// Number of registered devices.
    pub fn len(&self) -> usize {
        self.devices.read().len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove a device. Clears the default if it was the default.
    pub fn unregister(&self, name: &str) -> Option<Arc<dyn Spectrometer>> {
        let removed = self.devices.write().remove(name);
        if removed.is_some() {
            info!(device = %name, "Unregistered device");
            let mut default = self.default_device.write();
            if default.as_deref() == Some(name) {
                warn!(device = %name, "Unregistered default device");
                *default = None;
            }
        }
        removed
    }

    /// Name of the default device.
    pub fn default_device_name(&self) -> Option<String> {
        self.default_device.read().clone()
    }
}

impl Default for DeviceRegistry {
    fn default() -> Self {
        Self::new()
    }
}
