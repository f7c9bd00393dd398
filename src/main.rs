// Copyright 2026 QubitOS Contributors
// SPDX-License-Identifier: Apache-2.0

//! spinseq command line
//!
//! Runs pulse sequences on a spectrometer or the built-in simulator.
//!
//! # Usage
//!
//! ```bash
//! # Run a sequence on the default device
//! spinseq run fid.yaml
//!
//! # Show the compiled instruction listing
//! spinseq compile fid.yaml --resolution 100
//!
//! # List devices and check their health
//! spinseq devices
//! spinseq health
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};
use serde_json::json;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use spinseq::compiler::SequenceCompiler;
use spinseq::device::{DeviceRegistry, HealthStatus};
use spinseq::processing::{PhaseCorrection, WindowFunction};
use spinseq::runner::{ExperimentRunner, RunControl};
use spinseq::sequence::PulseSequence;
use spinseq::{config::Config, Error, Result, VERSION};

/// Pulse sequencing and acquisition for MR spectroscopy
#[derive(Parser)]
#[command(name = "spinseq")]
#[command(author = "QubitOS Contributors")]
#[command(version = VERSION)]
#[command(about = "Compile, run and process MR spectroscopy pulse sequences")]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a sequence and print its spectrum
    Run {
        /// Sequence file (YAML)
        sequence: PathBuf,

        /// Device to run on
        #[arg(short, long)]
        device: Option<String>,

        /// Device resolution in ns
        #[arg(long)]
        resolution: Option<f64>,

        /// Window function (none, hann, hamming, blackman)
        #[arg(long)]
        window: Option<WindowFunction>,

        /// Zero-order phase in degrees, or "auto"
        #[arg(long)]
        phase: Option<String>,

        /// Execution timeout in ms
        #[arg(long, env = "SPINSEQ_RUN_TIMEOUT_MS")]
        timeout_ms: Option<u64>,

        /// Output format
        #[arg(long, value_enum, default_value_t = OutputFormat::Summary)]
        output: OutputFormat,
    },

    /// Compile a sequence and print the instruction listing
    Compile {
        /// Sequence file (YAML)
        sequence: PathBuf,

        /// Device whose limits apply
        #[arg(short, long)]
        device: Option<String>,

        /// Device resolution in ns
        #[arg(long)]
        resolution: Option<f64>,

        /// Print the program as JSON
        #[arg(long)]
        json: bool,
    },

    /// List available devices
    Devices,

    /// Check device health
    Health {
        /// Specific device to check
        #[arg(short, long)]
        device: Option<String>,
    },

    /// Show effective configuration
    Config,

    /// Validate the configuration and, optionally, a sequence file
    Validate {
        /// Sequence file (YAML)
        sequence: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    Summary,
    Json,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(level) = cli.log_level {
        config.logging.level = level;
    }
    init_logging(&config.logging.level, &config.logging.format);

    match cli.command {
        Commands::Run {
            sequence,
            device,
            resolution,
            window,
            phase,
            timeout_ms,
            output,
        } => {
            if let Some(r) = resolution {
                config.device.resolution_ns = r;
            }
            if let Some(w) = window {
                config.processing.window = w;
            }
            if let Some(p) = phase {
                config.processing.phase_correction = parse_phase(&p)?;
            }
            if let Some(ms) = timeout_ms {
                config.runner.timeout_ms = ms;
            }
            config.validate()?;

            let seq = load_sequence(&sequence)?;
            let registry = initialize_devices(&config)?;
            let device = registry.get_or_default(device.as_deref())?;
            let runner = ExperimentRunner::from_config(device, &config);

            let control = RunControl::default();
            let cancel = control.cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("Interrupt received, cancelling run");
                    cancel.cancel();
                }
            });

            let result = match runner
                .run_with_control(
                    &seq,
                    config.device.resolution_ns,
                    &config.processing,
                    &control,
                )
                .await
            {
                Ok(result) => result,
                Err(failure) => {
                    eprintln!("{failure}");
                    std::process::exit(1);
                }
            };

            match output {
                OutputFormat::Json => {
                    let out = json!({
                        "run_id": result.run_id.to_string(),
                        "history": result.history,
                        "windows": result.buffer.windows().len(),
                        "spectrum": result.spectrum,
                    });
                    println!("{}", serde_json::to_string_pretty(&out)?);
                }
                OutputFormat::Summary => {
                    println!("run:        {}", result.run_id);
                    println!("windows:    {}", result.buffer.windows().len());
                    println!("bins:       {}", result.spectrum.len());
                    println!("bin width:  {:.3} Hz", result.spectrum.bin_width_hz());
                    println!("window:     {}", result.spectrum.window());
                    println!("phase:      {:.1} deg", result.spectrum.applied_phase_deg());
                    if let Some(peak) = result.spectrum.peak() {
                        println!(
                            "peak:       {:.3} Hz (bin {}, |S| = {:.4})",
                            peak.frequency_hz,
                            peak.index,
                            peak.magnitude()
                        );
                    }
                }
            }
        }

        Commands::Compile {
            sequence,
            device,
            resolution,
            json,
        } => {
            if let Some(r) = resolution {
                config.device.resolution_ns = r;
            }
            let seq = load_sequence(&sequence)?;
            let registry = initialize_devices(&config)?;
            let device = registry.get_or_default(device.as_deref())?;
            let compiler = SequenceCompiler::new(device.limits().clone());
            let program = compiler.compile(&seq, config.device.resolution_ns)?;

            if json {
                println!("{}", String::from_utf8_lossy(&program.to_bytes()?));
            } else {
                print!("{program}");
            }
        }

        Commands::Devices => {
            let registry = initialize_devices(&config)?;

            println!("Available devices:");
            for (name, device_type) in registry.list() {
                let default_marker = if Some(&name) == registry.default_device_name().as_ref() {
                    " (default)"
                } else {
                    ""
                };
                let target = match registry.get(&name) {
                    Ok(d) => d
                        .device_info()
                        .await
                        .map(|i| format!(" {:.3} MHz", i.target_frequency_hz / 1e6))
                        .unwrap_or_default(),
                    Err(_) => String::new(),
                };
                println!("  {} [{}]{}{}", name, device_type, target, default_marker);
            }
        }

        Commands::Health { device } => {
            let registry = initialize_devices(&config)?;
            let names = match device {
                Some(name) => vec![name],
                None => registry.list().into_iter().map(|(name, _)| name).collect(),
            };

            let mut all_healthy = true;
            for name in names {
                let status = match registry.get(&name) {
                    Ok(d) => d.health_check().await.map_err(Error::from),
                    Err(e) => Err(e),
                };
                match status {
                    Ok(status) => {
                        println!("{}: {}", name, status);
                        all_healthy &= status == HealthStatus::Healthy;
                    }
                    Err(e) => {
                        println!("{}: Error - {}", name, e);
                        all_healthy = false;
                    }
                }
            }

            if !all_healthy {
                std::process::exit(1);
            }
        }

        Commands::Config => {
            println!("{}", serde_yaml::to_string(&config)?);
        }

        Commands::Validate { sequence } => {
            if let Err(e) = config.validate() {
                eprintln!("Configuration error: {}", e);
                std::process::exit(1);
            }
            println!("Configuration is valid");

            if let Some(path) = sequence {
                let seq = load_sequence(&path)?;
                let violations = seq.validate();
                if !violations.is_empty() {
                    for v in &violations {
                        eprintln!("  {v}");
                    }
                    eprintln!("Sequence '{}' has {} violation(s)", seq.name(), violations.len());
                    std::process::exit(1);
                }
                println!(
                    "Sequence '{}' is valid: {} events, {:.0} ns per repetition",
                    seq.name(),
                    seq.len(),
                    seq.total_duration_ns()
                );
            }
        }
    }

    Ok(())
}

/// Initialize logging with tracing.
fn init_logging(level: &str, format: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let registry = tracing_subscriber::registry().with(filter);

    if format == "json" {
        registry.with(fmt::layer().json().with_target(true)).init();
    } else {
        registry.with(fmt::layer().with_target(true)).init();
    }
}

/// Read a sequence file.
fn load_sequence(path: &Path) -> Result<PulseSequence> {
    let content = std::fs::read_to_string(path)?;
    let seq: PulseSequence = serde_yaml::from_str(&content)?;
    info!(sequence = %seq.name(), events = seq.len(), path = %path.display(), "Loaded sequence");
    Ok(seq)
}

fn parse_phase(value: &str) -> Result<PhaseCorrection> {
    if value.eq_ignore_ascii_case("auto") {
        return Ok(PhaseCorrection::auto());
    }
    value
        .parse::<f64>()
        .map(|degrees| PhaseCorrection::Fixed { degrees })
        .map_err(|_| Error::Config(format!("phase must be a number or 'auto', got '{value}'")))
}

/// Build the device registry, failing if it is empty.
fn initialize_devices(config: &Config) -> Result<Arc<DeviceRegistry>> {
    let registry = DeviceRegistry::from_config(config);
    if registry.is_empty() {
        return Err(Error::Config(
            "No devices available. Enable the simulator or register a device.".to_string(),
        ));
    }
    Ok(Arc::new(registry))
}
