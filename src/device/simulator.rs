// Copyright 2026 QubitOS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Simulated spectrometer.
//!
//! Models a single spin isochromat. Pulses are hard rotations about an axis
//! in the transverse plane set by the pulse phase; a 90° rotation takes
//! `pi2_pulse_us` at full amplitude with a rectangular envelope. Between
//! pulses the transverse magnetization precesses at the configured offset
//! frequency and decays with T2*. Each repetition starts from equilibrium.
//!
//! Acquisition windows record the transverse magnetization without
//! changing it. A concurrent pulse inside a window acts after that window.

use std::f64::consts::FRAC_PI_2;
use std::time::Duration;

use async_trait::async_trait;
use num_complex::Complex64;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::r#trait::{CancelToken, DeviceInfo, DeviceType, HealthStatus, Spectrometer};
use crate::acquisition::SampleChunk;
use crate::compiler::{CompiledProgram, Operation};
use crate::config::{DeviceConfig, DeviceLimits, SimulatorConfig};
use crate::error::DeviceError;

/// Largest number of envelope points used to average a pulse shape.
const MAX_ENVELOPE_POINTS: usize = 4096;

/// Software spectrometer producing free-induction decays.
#[derive(Debug)]
pub struct SimulatedSpectrometer {
    name: String,
    config: SimulatorConfig,
    sample_rate_hz: f64,
    target_frequency_hz: f64,
    limits: DeviceLimits,
    execution_lock: Mutex<()>,
}

impl SimulatedSpectrometer {
    /// Create a simulator.
    pub fn new(
        name: impl Into<String>,
        config: SimulatorConfig,
        sample_rate_hz: f64,
        limits: DeviceLimits,
    ) -> Self {
        Self {
            name: name.into(),
            config,
            sample_rate_hz,
            target_frequency_hz: DeviceConfig::default().target_frequency_hz,
            limits,
            execution_lock: Mutex::new(()),
        }
    }

    /// Set the Larmor frequency the simulator reports.
    pub fn with_target_frequency(mut self, target_frequency_hz: f64) -> Self {
        self.target_frequency_hz = target_frequency_hz;
        self
    }

    /// Simulator settings.
    pub fn config(&self) -> &SimulatorConfig {
        &self.config
    }

    /// Why the simulator cannot run, if it cannot.
    fn unusable(&self) -> Option<String> {
        if !self.sample_rate_hz.is_finite() || self.sample_rate_hz <= 0.0 {
            return Some(format!(
                "simulator sample rate {} Hz is not usable",
                self.sample_rate_hz
            ));
        }
        self.config.validate().err().map(|e| e.to_string())
    }

    fn rotation_angle(&self, amplitude_pct: f64, envelope_mean: f64, duration_ns: f64) -> f64 {
        FRAC_PI_2 * (amplitude_pct / 100.0) * envelope_mean * duration_ns
            / (self.config.pi2_pulse_us * 1e3)
    }
}

/// Bloch vector plus the time it refers to.
#[derive(Debug, Clone, Copy)]
struct Magnetization {
    m: [f64; 3],
    at_ns: f64,
}

impl Magnetization {
    fn equilibrium(at_ns: f64) -> Self {
        Self {
            m: [0.0, 0.0, 1.0],
            at_ns,
        }
    }

    /// Transverse component `dt_ns` after `at_ns`.
    fn transverse_after(&self, dt_ns: f64, offset_hz: f64, t2_star_ns: f64) -> Complex64 {
        let dt_s = dt_ns * 1e-9;
        let decay = if t2_star_ns > 0.0 {
            (-dt_ns / t2_star_ns).exp()
        } else {
            0.0
        };
        Complex64::new(self.m[0], self.m[1])
            * Complex64::from_polar(decay, 2.0 * std::f64::consts::PI * offset_hz * dt_s)
    }

    /// Evolve freely to `t_ns`.
    fn evolve_to(&mut self, t_ns: f64, offset_hz: f64, t2_star_ns: f64) {
        let dt = (t_ns - self.at_ns).max(0.0);
        let xy = self.transverse_after(dt, offset_hz, t2_star_ns);
        self.m[0] = xy.re;
        self.m[1] = xy.im;
        self.at_ns = t_ns;
    }

    /// Rotate by `angle` about the transverse axis at `phase_deg`.
    fn rotate(&mut self, angle: f64, phase_deg: f64) {
        let phi = phase_deg.to_radians();
        let n = [phi.cos(), phi.sin(), 0.0];
        let v = self.m;
        let (s, c) = angle.sin_cos();
        let dot = n[0] * v[0] + n[1] * v[1] + n[2] * v[2];
        let cross = [
            n[1] * v[2] - n[2] * v[1],
            n[2] * v[0] - n[0] * v[2],
            n[0] * v[1] - n[1] * v[0],
        ];
        for i in 0..3 {
            self.m[i] = v[i] * c + cross[i] * s + n[i] * dot * (1.0 - c);
        }
    }
}

/// Standard normal deviate (Box-Muller).
fn gaussian(rng: &mut StdRng) -> f64 {
    let u1: f64 = rng.gen_range(f64::MIN_POSITIVE..1.0);
    let u2: f64 = rng.gen();
    (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()
}

#[async_trait]
impl Spectrometer for SimulatedSpectrometer {
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

    fn execution_lock(&self) -> &Mutex<()> {
        &self.execution_lock
    }

    async fn execute(
        &self,
        program: CompiledProgram,
        cancel: &CancelToken,
    ) -> Result<Vec<SampleChunk>, DeviceError> {
        if let Some(reason) = self.unusable() {
            return Err(DeviceError::Unavailable(reason));
        }

        info!(
            device = %self.name,
            sequence = %program.sequence(),
            instructions = program.instructions().len(),
            duration_ns = program.duration_ns(),
            "Simulating program"
        );

        let offset_hz = self.config.offset_frequency_hz;
        let t2_star_ns = self.config.t2_star_us * 1e3;
        let noise_std = self.config.noise_std;
        let dt_ns = 1e9 / self.sample_rate_hz;
        let mut rng = StdRng::seed_from_u64(self.config.seed);

        let mut chunks = Vec::new();
        let mut state = Magnetization::equilibrium(0.0);
        let mut repetition = None;
        let mut clock_ns = 0.0;

        for (index, instruction) in program.instructions().iter().enumerate() {
            if cancel.is_cancelled() {
                debug!(device = %self.name, index, "Cancelled before instruction");
                return Err(DeviceError::Cancelled(index));
            }

            let start_ns = program.ticks_to_ns(instruction.start_tick);
            let duration_ns = program.ticks_to_ns(instruction.duration_ticks);

            if self.config.realtime && start_ns > clock_ns {
                tokio::time::sleep(Duration::from_nanos((start_ns - clock_ns) as u64)).await;
                clock_ns = start_ns;
            }

            if repetition != Some(instruction.repetition) {
                repetition = Some(instruction.repetition);
                state = Magnetization::equilibrium(start_ns);
            }

            match &instruction.op {
                Operation::Transmit {
                    amplitude_pct,
                    phase_deg,
                    shape,
                    ..
                } => {
                    let points = (instruction.duration_ticks as usize).min(MAX_ENVELOPE_POINTS);
                    let envelope = shape.envelope(points);
                    let mean = envelope.iter().sum::<f64>() / points.max(1) as f64;
                    let angle = self.rotation_angle(*amplitude_pct, mean, duration_ns);
                    state.evolve_to(start_ns, offset_hz, t2_star_ns);
                    state.rotate(angle, *phase_deg);
                    state.at_ns = start_ns + duration_ns;
                }
                Operation::Wait => {}
                Operation::Acquire {
                    window,
                    receiver_phase_deg,
                    sign,
                } => {
                    let n = (duration_ns / dt_ns + 1e-9).floor() as usize;
                    let samples = (0..n)
                        .map(|k| {
                            let t = start_ns + k as f64 * dt_ns - state.at_ns;
                            let clean = state.transverse_after(t.max(0.0), offset_hz, t2_star_ns);
                            if noise_std > 0.0 {
                                clean
                                    + Complex64::new(
                                        noise_std * gaussian(&mut rng),
                                        noise_std * gaussian(&mut rng),
                                    )
                            } else {
                                clean
                            }
                        })
                        .collect();
                    chunks.push(SampleChunk {
                        window: *window,
                        timestamp_ns: start_ns,
                        receiver_phase_deg: *receiver_phase_deg,
                        sign: *sign,
                        samples,
                    });
                }
            }

            if self.config.realtime {
                tokio::time::sleep(Duration::from_nanos(duration_ns as u64)).await;
                clock_ns = start_ns + duration_ns;
            } else {
                tokio::task::yield_now().await;
            }
        }

        debug!(device = %self.name, windows = chunks.len(), "Simulation complete");
        Ok(chunks)
    }

    async fn device_info(&self) -> Result<DeviceInfo, DeviceError> {
        Ok(DeviceInfo {
            name: self.name.clone(),
            device_type: DeviceType::Simulator,
            sample_rate_hz: self.sample_rate_hz,
            target_frequency_hz: self.target_frequency_hz,
            limits: self.limits.clone(),
            software_version: crate::VERSION.to_string(),
        })
    }

    async fn health_check(&self) -> Result<HealthStatus, DeviceError> {
        match self.unusable() {
            None => Ok(HealthStatus::Healthy),
            Some(reason) => {
                debug!(device = %self.name, %reason, "Simulator unavailable");
                Ok(HealthStatus::Unavailable)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::compile;
    use approx::assert_relative_eq;
    use crate::sequence::{AcquisitionParams, Event, PulseParams, PulseSequence, ReadoutStep};

    const US: f64 = 1_000.0;

    fn simulator(config: SimulatorConfig) -> SimulatedSpectrometer {
        SimulatedSpectrometer::new("sim", config, 1e6, DeviceLimits::default())
    }

    fn fid(phase_deg: f64) -> PulseSequence {
        let mut seq = PulseSequence::new("fid");
        seq.add_event(Event::pulse("p90", 0.0, 10.0 * US, PulseParams::rect(100.0, phase_deg)))
            .unwrap()
            .add_event(Event::acquisition(
                "rx",
                20.0 * US,
                64.0 * US,
                AcquisitionParams::default(),
            ))
            .unwrap();
        seq
    }

    #[test]
    fn test_rotation_about_x_by_90() {
        let mut m = Magnetization::equilibrium(0.0);
        m.rotate(FRAC_PI_2, 0.0);
        assert!(m.m[0].abs() < 1e-12);
        assert!((m.m[1] + 1.0).abs() < 1e-12);
        assert!(m.m[2].abs() < 1e-12);
    }

    #[test]
    fn test_rotation_phase_180_flips_signal() {
        let mut a = Magnetization::equilibrium(0.0);
        let mut b = Magnetization::equilibrium(0.0);
        a.rotate(FRAC_PI_2, 0.0);
        b.rotate(FRAC_PI_2, 180.0);
        assert!((a.m[1] + b.m[1]).abs() < 1e-12);
    }

    #[tokio::test]
    async fn test_execute_fid_window() {
        let sim = simulator(SimulatorConfig::default());
        let program = compile(&fid(0.0), 1.0 * US).unwrap();
        let chunks = sim.execute(program, &CancelToken::new()).await.unwrap();

        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].timestamp_ns, 20.0 * US);
        assert_eq!(chunks[0].samples.len(), 64);
        // 10 µs of decay at T2* = 500 µs
        let expected = (-10.0f64 / 500.0).exp();
        assert_relative_eq!(chunks[0].samples[0].norm(), expected, epsilon = 1e-9);
        assert!(chunks[0].samples[63].norm() < chunks[0].samples[0].norm());
    }

    #[tokio::test]
    async fn test_execute_is_reproducible_with_noise() {
        let config = SimulatorConfig {
            noise_std: 0.05,
            seed: 7,
            ..SimulatorConfig::default()
        };
        let sim = simulator(config);
        let a = sim
            .execute(compile(&fid(0.0), 1.0 * US).unwrap(), &CancelToken::new())
            .await
            .unwrap();
        let b = sim
            .execute(compile(&fid(0.0), 1.0 * US).unwrap(), &CancelToken::new())
            .await
            .unwrap();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn test_execute_repetitions_restart_from_equilibrium() {
        let seq = fid(0.0).with_repetitions(2, 10.0 * US).unwrap();
        let sim = simulator(SimulatorConfig::default());
        let chunks = sim
            .execute(compile(&seq, 1.0 * US).unwrap(), &CancelToken::new())
            .await
            .unwrap();
        assert_eq!(chunks.len(), 2);
        assert!(chunks[0].timestamp_ns < chunks[1].timestamp_ns);
        for (a, b) in chunks[0].samples.iter().zip(&chunks[1].samples) {
            assert!((a - b).norm() < 1e-9);
        }
    }

    #[tokio::test]
    async fn test_execute_carries_readout_scheme() {
        let mut seq = PulseSequence::new("cyc");
        seq.add_event(Event::pulse(
            "p90",
            0.0,
            10.0 * US,
            PulseParams::rect(100.0, 0.0).with_phase_cycling(2, 0),
        ))
        .unwrap()
        .add_event(Event::acquisition(
            "rx",
            20.0 * US,
            8.0 * US,
            AcquisitionParams::default()
                .with_readout_scheme(vec![ReadoutStep::new(1, 0.0), ReadoutStep::new(-1, 0.0)]),
        ))
        .unwrap();
        let seq = seq.with_repetitions(2, 0.0).unwrap();
        let sim = simulator(SimulatorConfig::default());
        let chunks = sim
            .execute(compile(&seq, 1.0 * US).unwrap(), &CancelToken::new())
            .await
            .unwrap();
        assert_eq!(chunks[1].sign, -1);
        // Pulse phase 180 flips the raw signal; the sign restores it
        let a: Complex64 = chunks[0].samples[0];
        let b: Complex64 = chunks[1].samples[0] * f64::from(chunks[1].sign);
        assert!((a - b).norm() < 1e-9);
    }

    #[tokio::test]
    async fn test_execute_cancelled_before_start() {
        let sim = simulator(SimulatorConfig::default());
        let cancel = CancelToken::new();
        cancel.cancel();
        let err = sim
            .execute(compile(&fid(0.0), 1.0 * US).unwrap(), &cancel)
            .await
            .unwrap_err();
        assert_eq!(err, DeviceError::Cancelled(0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_realtime_pacing_advances_clock() {
        let config = SimulatorConfig {
            realtime: true,
            ..SimulatorConfig::default()
        };
        let sim = simulator(config);
        let before = tokio::time::Instant::now();
        sim.execute(compile(&fid(0.0), 1.0 * US).unwrap(), &CancelToken::new())
            .await
            .unwrap();
        assert!(before.elapsed() >= Duration::from_micros(84));
    }

    #[tokio::test]
    async fn test_health_and_info() {
        let sim = simulator(SimulatorConfig::default());
        assert_eq!(sim.health_check().await.unwrap(), HealthStatus::Healthy);
        let info = sim.device_info().await.unwrap();
        assert_eq!(info.name, "sim");
        assert_eq!(info.device_type, DeviceType::Simulator);
        assert_eq!(info.target_frequency_hz, 100.0e6);

        let broken = SimulatedSpectrometer::new("bad", SimulatorConfig::default(), 0.0, DeviceLimits::default());
        assert_eq!(broken.health_check().await.unwrap(), HealthStatus::Unavailable);
    }

    #[tokio::test]
    async fn test_invalid_model_refuses_to_run() {
        let config = SimulatorConfig {
            noise_std: -0.5,
            ..SimulatorConfig::default()
        };
        let sim = simulator(config);
        assert_eq!(sim.health_check().await.unwrap(), HealthStatus::Unavailable);
        let err = sim
            .execute(compile(&fid(0.0), 1.0 * US).unwrap(), &CancelToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, DeviceError::Unavailable(ref msg) if msg.contains("noise_std")));

        let config = SimulatorConfig {
            pi2_pulse_us: 0.0,
            ..SimulatorConfig::default()
        };
        let sim = simulator(config);
        assert!(sim
            .execute(compile(&fid(0.0), 1.0 * US).unwrap(), &CancelToken::new())
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_reports_target_frequency() {
        let sim = simulator(SimulatorConfig::default()).with_target_frequency(83.56e6);
        assert_eq!(sim.device_info().await.unwrap().target_frequency_hz, 83.56e6);
    }
}
