// Copyright 2026 QubitOS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Experiment runner.
//!
//! Drives one run through compile, execute, acquire and process:
//!
//! ```text
//! Idle ─► Compiling ─► Executing ─► Acquiring ─► Processing ─► Done
//!   │         │            │            │             │
//!   └─────────┴────────────┴────────────┴─────────────┴──► Failed { stage }
//! ```
//!
//! Each run owns a fresh state machine, so a runner can be reused and a
//! failed run never leaks state into the next one. Device access is
//! serialized through the device's own execution lock: concurrent runs
//! compile and process in parallel but execute one at a time, whether they
//! share a runner or only the device. Failures are never retried.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, error, info, instrument};
use uuid::Uuid;

use crate::acquisition::AcquisitionBuffer;
use crate::compiler::SequenceCompiler;
use crate::config::Config;
use crate::device::{CancelToken, Spectrometer};
use crate::error::{DeviceError, Error, Stage};
use crate::processing::{ProcessingOptions, Spectrum};
use crate::sequence::PulseSequence;

/// Lifecycle state of a single run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum RunState {
    /// Created, nothing started
    Idle,
    /// Compiling the sequence
    Compiling,
    /// Device is executing the program
    Executing,
    /// Filling the acquisition buffer
    Acquiring,
    /// Transforming the buffer
    Processing,
    /// Spectrum available
    Done,
    /// Run stopped at `stage`
    Failed {
        /// Stage the failure is attributed to
        stage: Stage,
    },
}

impl RunState {
    /// Whether the run can no longer change state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunState::Done | RunState::Failed { .. })
    }

    /// Whether `next` is a legal successor of `self`.
    ///
    /// Only forward steps and failure from a non-terminal state are
    /// allowed; no state is entered twice.
    pub fn can_transition_to(&self, next: &RunState) -> bool {
        use RunState::*;
        matches!(
            (self, next),
            (Idle, Compiling)
                | (Compiling, Executing)
                | (Executing, Acquiring)
                | (Acquiring, Processing)
                | (Processing, Done)
                | (Idle | Compiling | Executing | Acquiring | Processing, Failed { .. })
        )
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunState::Idle => write!(f, "idle"),
            RunState::Compiling => write!(f, "compiling"),
            RunState::Executing => write!(f, "executing"),
            RunState::Acquiring => write!(f, "acquiring"),
            RunState::Processing => write!(f, "processing"),
            RunState::Done => write!(f, "done"),
            RunState::Failed { stage } => write!(f, "failed ({stage})"),
        }
    }
}

/// A finished run.
#[derive(Debug)]
pub struct ExperimentResult {
    /// Run identifier, also present in every log line of the run
    pub run_id: Uuid,
    /// Processed spectrum
    pub spectrum: Spectrum,
    /// Raw acquisition data, finalized
    pub buffer: AcquisitionBuffer,
    /// Every state the run passed through, starting with `Idle`
    pub history: Vec<RunState>,
}

/// A failed run: the error plus the stage it happened in.
#[derive(Debug, thiserror::Error)]
#[error("run {run_id} failed during {stage}: {error}")]
pub struct RunFailure {
    /// Run identifier
    pub run_id: Uuid,
    /// Stage the failure is attributed to
    pub stage: Stage,
    /// Underlying error
    #[source]
    pub error: Error,
    /// Every state the run passed through, ending with `Failed`
    pub history: Vec<RunState>,
}

/// Per-run controls.
#[derive(Debug, Clone, Default)]
pub struct RunControl {
    /// Bound on device execution; overrides the runner default
    pub timeout: Option<Duration>,
    /// Cooperative cancellation
    pub cancel: CancelToken,
}

impl RunControl {
    /// Control with a timeout and a fresh cancel token.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout: Some(timeout),
            cancel: CancelToken::new(),
        }
    }
}

/// State machine of one run.
struct Run {
    id: Uuid,
    state: RunState,
    history: Vec<RunState>,
}

impl Run {
    fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            state: RunState::Idle,
            history: vec![RunState::Idle],
        }
    }

    fn set(&mut self, next: RunState) {
        debug!(run_id = %self.id, from = %self.state, to = %next, "Run state transition");
        self.state = next;
        self.history.push(next);
    }

    /// Move to `next`, or fail at `stage` if the transition is illegal.
    fn enter(&mut self, next: RunState, stage: Stage) -> Result<(), RunFailure> {
        if !self.state.can_transition_to(&next) {
            let err = Error::State(format!("illegal transition {} -> {}", self.state, next));
            return Err(self.fail(stage, err));
        }
        self.set(next);
        Ok(())
    }

    fn fail(&mut self, stage: Stage, error: Error) -> RunFailure {
        let failed = RunState::Failed { stage };
        if self.state.can_transition_to(&failed) {
            self.set(failed);
        }
        error!(run_id = %self.id, stage = %stage, error = %error, "Run failed");
        RunFailure {
            run_id: self.id,
            stage,
            error,
            history: self.history.clone(),
        }
    }
}

fn device_failure(e: DeviceError) -> Error {
    match e {
        DeviceError::Cancelled(_) => Error::Cancelled,
        other => Error::Execution(other),
    }
}

/// Runs pulse sequences on one spectrometer.
pub struct ExperimentRunner {
    device: Arc<dyn Spectrometer>,
    compiler: SequenceCompiler,
    default_timeout: Option<Duration>,
}

impl ExperimentRunner {
    /// Create a runner that compiles against the device's own limits.
    pub fn new(device: Arc<dyn Spectrometer>) -> Self {
        let compiler = SequenceCompiler::new(device.limits().clone());
        Self {
            device,
            compiler,
            default_timeout: None,
        }
    }

    /// Create a runner whose default timeout is `runner.timeout_ms`.
    ///
    /// A validated config always carries a positive timeout, so runners
    /// built from config never wait on a device indefinitely.
    pub fn from_config(device: Arc<dyn Spectrometer>, config: &Config) -> Self {
        let timeout = Duration::from_millis(config.runner.timeout_ms);
        Self::new(device).with_default_timeout(Some(timeout))
    }

    /// Set the timeout used when a run does not supply one.
    pub fn with_default_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.default_timeout = timeout;
        self
    }

    /// The device this runner drives.
    pub fn device(&self) -> &Arc<dyn Spectrometer> {
        &self.device
    }

    /// Run a sequence with the default timeout and no cancellation.
    pub async fn run(
        &self,
        sequence: &PulseSequence,
        device_resolution_ns: f64,
        options: &ProcessingOptions,
    ) -> Result<ExperimentResult, RunFailure> {
        self.run_with_control(sequence, device_resolution_ns, options, &RunControl::default())
            .await
    }

    /// Run a sequence under the given controls.
    ///
    /// A timeout applies to device execution and is reported at the
    /// execute stage; samples produced before it expired are discarded.
    /// Cancellation takes effect before compiling, before executing, or
    /// between device instructions.
    #[instrument(skip_all, fields(sequence = %sequence.name(), device = %self.device.name()))]
    pub async fn run_with_control(
        &self,
        sequence: &PulseSequence,
        device_resolution_ns: f64,
        options: &ProcessingOptions,
        control: &RunControl,
    ) -> Result<ExperimentResult, RunFailure> {
        let mut run = Run::new();
        info!(
            run_id = %run.id,
            resolution_ns = device_resolution_ns,
            "Starting run"
        );

        // Compile
        run.enter(RunState::Compiling, Stage::Compile)?;
        if control.cancel.is_cancelled() {
            return Err(run.fail(Stage::Compile, Error::Cancelled));
        }
        let program = self
            .compiler
            .compile(sequence, device_resolution_ns)
            .map_err(|e| run.fail(Stage::Compile, e))?;

        // Execute
        run.enter(RunState::Executing, Stage::Execute)?;
        let chunks = {
            let _guard = self.device.execution_lock().lock().await;
            if control.cancel.is_cancelled() {
                return Err(run.fail(Stage::Execute, Error::Cancelled));
            }
            let execution = self.device.execute(program, &control.cancel);
            let outcome = match control.timeout.or(self.default_timeout) {
                Some(limit) => match tokio::time::timeout(limit, execution).await {
                    Ok(outcome) => outcome,
                    Err(_) => {
                        let timeout_ms = limit.as_millis() as u64;
                        return Err(run.fail(Stage::Execute, Error::Timeout { timeout_ms }));
                    }
                },
                None => execution.await,
            };
            outcome.map_err(|e| run.fail(Stage::Execute, device_failure(e)))?
        };

        // Acquire
        run.enter(RunState::Acquiring, Stage::Acquire)?;
        let mut buffer = AcquisitionBuffer::new(self.device.sample_rate_hz());
        for chunk in chunks {
            buffer
                .append_chunk(chunk)
                .map_err(|e| run.fail(Stage::Acquire, e))?;
        }
        buffer.finalize();

        // Process
        run.enter(RunState::Processing, Stage::Process)?;
        let spectrum = options
            .apply(&buffer)
            .map_err(|e| run.fail(Stage::Process, e))?;

        run.enter(RunState::Done, Stage::Process)?;
        info!(
            run_id = %run.id,
            windows = buffer.windows().len(),
            bins = spectrum.len(),
            "Run complete"
        );

        Ok(ExperimentResult {
            run_id: run.id,
            spectrum,
            buffer,
            history: run.history,
        })
    }
}
