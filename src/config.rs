// Copyright 2026 QubitOS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Configuration management.
//!
//! Configuration is loaded from multiple sources with the following priority
//! (later sources override earlier ones):
//!
//! 1. Built-in defaults
//! 2. spinseq.yaml file
//! 3. Environment variables (SPINSEQ_*)
//! 4. CLI arguments
//!
//! Only this module and the binary read files or the environment. The
//! compiler, runner and processor receive the resulting [`Config`] values.

use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;

use crate::error::{Error, Result};
use crate::processing::{PhaseCorrection, ProcessingOptions, WindowFunction};

/// Main configuration structure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Device timing and limits
    #[serde(default)]
    pub device: DeviceConfig,

    /// Simulated spectrometer settings
    #[serde(default)]
    pub simulator: SimulatorConfig,

    /// Default processing options
    #[serde(default)]
    pub processing: ProcessingOptions,

    /// Experiment runner settings
    #[serde(default)]
    pub runner: RunnerConfig,

    /// Logging settings
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from file and environment.
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        let mut config = Config::default();

        if let Some(path) = config_path {
            if path.exists() {
                let content = std::fs::read_to_string(path)?;
                config = serde_yaml::from_str(&content)?;
            }
        } else {
            for path in &["spinseq.yaml", "spinseq.yml"] {
                let path = Path::new(path);
                if path.exists() {
                    let content = std::fs::read_to_string(path)?;
                    config = serde_yaml::from_str(&content)?;
                    break;
                }
            }
        }

        config.apply_env_overrides();

        Ok(config)
    }

    /// Apply environment variable overrides.
    fn apply_env_overrides(&mut self) {
        if let Ok(val) = env::var("SPINSEQ_DEVICE_RESOLUTION_NS") {
            if let Ok(ns) = val.parse() {
                self.device.resolution_ns = ns;
            }
        }
        if let Ok(val) = env::var("SPINSEQ_SAMPLE_RATE_HZ") {
            if let Ok(hz) = val.parse() {
                self.device.sample_rate_hz = hz;
            }
        }
        if let Ok(val) = env::var("SPINSEQ_TARGET_FREQUENCY_HZ") {
            if let Ok(hz) = val.parse() {
                self.device.target_frequency_hz = hz;
            }
        }
        if let Ok(val) = env::var("SPINSEQ_RUN_TIMEOUT_MS") {
            if let Ok(ms) = val.parse() {
                self.runner.timeout_ms = ms;
            }
        }
        if let Ok(val) = env::var("SPINSEQ_WINDOW") {
            if let Ok(window) = val.parse::<WindowFunction>() {
                self.processing.window = window;
            }
        }
        if let Ok(val) = env::var("SPINSEQ_SIMULATOR_SEED") {
            if let Ok(seed) = val.parse() {
                self.simulator.seed = seed;
            }
        }
        if let Ok(val) = env::var("SPINSEQ_LOG_LEVEL") {
            self.logging.level = val;
        }
        if let Ok(val) = env::var("SPINSEQ_LOG_FORMAT") {
            self.logging.format = val;
        }
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<()> {
        let device = &self.device;
        if !device.resolution_ns.is_finite() || device.resolution_ns <= 0.0 {
            return Err(Error::Config(format!(
                "device resolution must be > 0 ns, got {}",
                device.resolution_ns
            )));
        }
        if device.resolution_ns < device.limits.min_resolution_ns {
            return Err(Error::Config(format!(
                "device resolution {} ns is below the device floor {} ns",
                device.resolution_ns, device.limits.min_resolution_ns
            )));
        }
        if !device.sample_rate_hz.is_finite() || device.sample_rate_hz <= 0.0 {
            return Err(Error::Config(format!(
                "sample rate must be > 0 Hz, got {}",
                device.sample_rate_hz
            )));
        }
        if !device.target_frequency_hz.is_finite() || device.target_frequency_hz <= 0.0 {
            return Err(Error::Config(format!(
                "target frequency must be > 0 Hz, got {}",
                device.target_frequency_hz
            )));
        }
        device.limits.validate()?;
        self.simulator.validate()?;
        if self.runner.timeout_ms == 0 {
            return Err(Error::Config("run timeout cannot be 0".into()));
        }
        if let PhaseCorrection::Auto(search) = &self.processing.phase_correction {
            search.validate()?;
        }
        if !matches!(self.logging.format.as_str(), "json" | "pretty") {
            return Err(Error::Config(format!(
                "log format must be 'json' or 'pretty', got '{}'",
                self.logging.format
            )));
        }
        Ok(())
    }
}

/// Device timing configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Device to run on (registry name)
    #[serde(default = "default_device_name")]
    pub name: String,

    /// Tick length the device schedules at
    #[serde(default = "default_resolution_ns")]
    pub resolution_ns: f64,

    /// Receiver sampling rate
    #[serde(default = "default_sample_rate_hz")]
    pub sample_rate_hz: f64,

    /// Larmor frequency the experiment runs at
    #[serde(default = "default_target_frequency_hz")]
    pub target_frequency_hz: f64,

    /// Ranges the device supports
    #[serde(default)]
    pub limits: DeviceLimits,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            name: default_device_name(),
            resolution_ns: default_resolution_ns(),
            sample_rate_hz: default_sample_rate_hz(),
            target_frequency_hz: default_target_frequency_hz(),
            limits: DeviceLimits::default(),
        }
    }
}

fn default_device_name() -> String {
    "simulator".into()
}

fn default_resolution_ns() -> f64 {
    100.0
}

fn default_sample_rate_hz() -> f64 {
    1.0e6
}

fn default_target_frequency_hz() -> f64 {
    100.0e6
}

/// Parameter ranges a device can execute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceLimits {
    /// Finest tick the device can schedule
    #[serde(default = "default_min_resolution_ns")]
    pub min_resolution_ns: f64,

    /// Highest transmit amplitude in percent
    #[serde(default = "default_max_amplitude_pct")]
    pub max_amplitude_pct: f64,

    /// Largest absolute frequency offset in Hz
    #[serde(default = "default_max_frequency_offset_hz")]
    pub max_frequency_offset_hz: f64,

    /// Longest compiled program
    #[serde(default = "default_max_instructions")]
    pub max_instructions: u32,

    /// Longest single instruction, in ticks
    #[serde(default = "default_max_instruction_ticks")]
    pub max_instruction_ticks: u64,
}

impl Default for DeviceLimits {
    fn default() -> Self {
        Self {
            min_resolution_ns: default_min_resolution_ns(),
            max_amplitude_pct: default_max_amplitude_pct(),
            max_frequency_offset_hz: default_max_frequency_offset_hz(),
            max_instructions: default_max_instructions(),
            max_instruction_ticks: default_max_instruction_ticks(),
        }
    }
}

impl DeviceLimits {
    /// Check that the limits themselves make sense.
    pub fn validate(&self) -> Result<()> {
        if !self.min_resolution_ns.is_finite() || self.min_resolution_ns <= 0.0 {
            return Err(Error::Config("min_resolution_ns must be > 0".into()));
        }
        if !(self.max_amplitude_pct > 0.0 && self.max_amplitude_pct <= 100.0) {
            return Err(Error::Config(format!(
                "max_amplitude_pct must be in (0, 100], got {}",
                self.max_amplitude_pct
            )));
        }
        if self.max_frequency_offset_hz < 0.0 {
            return Err(Error::Config("max_frequency_offset_hz cannot be negative".into()));
        }
        if self.max_instructions == 0 || self.max_instruction_ticks == 0 {
            return Err(Error::Config("instruction limits cannot be 0".into()));
        }
        Ok(())
    }
}

fn default_min_resolution_ns() -> f64 {
    10.0
}

fn default_max_amplitude_pct() -> f64 {
    100.0
}

fn default_max_frequency_offset_hz() -> f64 {
    5.0e6
}

fn default_max_instructions() -> u32 {
    1_000_000
}

fn default_max_instruction_ticks() -> u64 {
    u64::from(u32::MAX)
}

/// Simulated spectrometer configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulatorConfig {
    /// Whether the simulator is registered
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Resonance offset from the carrier in Hz
    #[serde(default = "default_offset_frequency_hz")]
    pub offset_frequency_hz: f64,

    /// Apparent transverse decay time in microseconds
    #[serde(default = "default_t2_star_us")]
    pub t2_star_us: f64,

    /// Length of a 90° rectangular pulse at full amplitude, microseconds
    #[serde(default = "default_pi2_pulse_us")]
    pub pi2_pulse_us: f64,

    /// Standard deviation of additive noise per quadrature
    #[serde(default)]
    pub noise_std: f64,

    /// Noise generator seed
    #[serde(default = "default_seed")]
    pub seed: u64,

    /// Pace execution in real time
    #[serde(default)]
    pub realtime: bool,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            offset_frequency_hz: default_offset_frequency_hz(),
            t2_star_us: default_t2_star_us(),
            pi2_pulse_us: default_pi2_pulse_us(),
            noise_std: 0.0,
            seed: default_seed(),
            realtime: false,
        }
    }
}

impl SimulatorConfig {
    /// Check the physical model parameters.
    ///
    /// Nothing is clamped: a negative noise level or a non-positive pulse
    /// or decay time is an error.
    pub fn validate(&self) -> Result<()> {
        if !self.offset_frequency_hz.is_finite() {
            return Err(Error::Config(format!(
                "simulator offset_frequency_hz must be finite, got {}",
                self.offset_frequency_hz
            )));
        }
        if !self.t2_star_us.is_finite() || self.t2_star_us <= 0.0 {
            return Err(Error::Config(format!(
                "simulator t2_star_us must be > 0, got {}",
                self.t2_star_us
            )));
        }
        if !self.pi2_pulse_us.is_finite() || self.pi2_pulse_us <= 0.0 {
            return Err(Error::Config(format!(
                "simulator pi2_pulse_us must be > 0, got {}",
                self.pi2_pulse_us
            )));
        }
        if !self.noise_std.is_finite() || self.noise_std < 0.0 {
            return Err(Error::Config(format!(
                "simulator noise_std must be >= 0, got {}",
                self.noise_std
            )));
        }
        Ok(())
    }
}

fn default_offset_frequency_hz() -> f64 {
    25_000.0
}

fn default_t2_star_us() -> f64 {
    500.0
}

fn default_pi2_pulse_us() -> f64 {
    10.0
}

fn default_seed() -> u64 {
    42
}

fn default_true() -> bool {
    true
}

/// Experiment runner configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunnerConfig {
    /// Upper bound on device execution and acquisition
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout_ms(),
        }
    }
}

fn default_timeout_ms() -> u64 {
    30_000
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format (json, pretty)
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

fn default_log_level() -> String {
    "info".into()
}

fn default_log_format() -> String {
    "pretty".into()
}
