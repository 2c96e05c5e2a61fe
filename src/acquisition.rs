//! Acquisition controller
//!
//! Owns one ADC transport and at most one sampler thread. Lifecycle:
//! `Idle -> Running -> StopRequested -> Idle`, restartable. Only the caller
//! moves the state out of `Idle` or into `StopRequested`; the sampler moves
//! it back to `Idle` when it exits, recording whether that was a requested
//! stop or a transport failure.

mod sampler;

use crate::adc::{AdcTransport, Mcp3008};
use crate::buffer::{RollingBuffer, SharedBuffer, Snapshot};
use crate::clock::{Clock, DeadlineStats, SystemClock};
use crate::config::{AcquisitionConfig, Config};
use crate::error::AcquisitionError;
use crate::spectrum::{self, SpectralResult};
use crate::wav;
use jiff::Timestamp;
use serde::Serialize;
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use sampler::Sampler;

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Idle,
    Running,
    StopRequested,
}

impl State {
    pub fn as_str(&self) -> &'static str {
        match self {
            State::Idle => "Idle",
            State::Running => "Running",
            State::StopRequested => "Stopping",
        }
    }
}

/// Why the last sampler run ended
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "kind", content = "reason", rename_all = "lowercase")]
pub enum ExitReason {
    /// Caller asked for it via `stop` or `close`
    Requested,
    /// The sampler terminated itself, e.g. on a transport read error
    Failed(String),
}

#[derive(Serialize, Debug, Clone)]
pub struct AcquisitionStatus {
    pub state: State,
    pub transport: String,
    pub rate: u32,
    pub chunk: usize,
    pub channel: u8,
    pub buffered: usize,
    pub capacity: usize,
    pub first_index: u64,
    /// Samples produced since the session was created, across restarts
    pub samples_recorded: u64,
    pub missed_deadlines: u64,
    pub overrun_ms: f64,
    pub started_at: Option<Timestamp>,
    pub last_exit: Option<ExitReason>,
}

struct Control {
    state: State,
    last_exit: Option<ExitReason>,
    started_at: Option<Timestamp>,
}

/// State shared between the controller and its sampler thread
pub(crate) struct Shared {
    control: Mutex<Control>,
    changed: Condvar,
    buffer: SharedBuffer,
    deadlines: DeadlineStats,
}

impl Shared {
    fn new(buffer: RollingBuffer) -> Self {
        Self {
            control: Mutex::new(Control {
                state: State::Idle,
                last_exit: None,
                started_at: None,
            }),
            changed: Condvar::new(),
            buffer: SharedBuffer::new(buffer),
            deadlines: DeadlineStats::default(),
        }
    }

    fn control(&self) -> MutexGuard<'_, Control> {
        self.control
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn state(&self) -> State {
        self.control().state
    }

    /// Checked by the sampler between samples
    pub(crate) fn stop_requested(&self) -> bool {
        self.state() != State::Running
    }

    /// Called by the sampler thread as its last action
    fn finish(&self, reason: ExitReason) {
        let mut control = self.control();
        control.state = State::Idle;
        control.last_exit = Some(reason);
        self.changed.notify_all();
    }
}

pub struct Acquisition<T: AdcTransport> {
    config: AcquisitionConfig,
    shared: Arc<Shared>,
    clock: Arc<dyn Clock>,
    label: String,
    /// `None` while the sampler thread holds it, or once closed
    transport: Option<T>,
    worker: Option<JoinHandle<Option<T>>>,
    closed: bool,
}

impl Acquisition<Mcp3008> {
    /// Open the MCP3008 named by `config.spi`
    pub fn open(config: &Config) -> Result<Self, AcquisitionError> {
        config.acquisition.validate()?;
        let transport = Mcp3008::open(config.spi.bus, config.spi.device)
            .map_err(AcquisitionError::TransportOpen)?;
        Self::new(transport, config.acquisition.clone())
    }
}

impl<T: AdcTransport> Acquisition<T> {
    /// Prime a session; sampling doesn't begin until `start`
    pub fn new(transport: T, config: AcquisitionConfig) -> Result<Self, AcquisitionError> {
        Self::with_clock(transport, config, Arc::new(SystemClock))
    }

    pub fn with_clock(
        transport: T,
        config: AcquisitionConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, AcquisitionError> {
        config.validate()?;
        let buffer = RollingBuffer::with_capacity(config.rate, config.capacity());

        Ok(Self {
            label: transport.describe(),
            shared: Arc::new(Shared::new(buffer)),
            config,
            clock,
            transport: Some(transport),
            worker: None,
            closed: false,
        })
    }

    pub fn config(&self) -> &AcquisitionConfig {
        &self.config
    }

    pub fn state(&self) -> State {
        self.shared.state()
    }

    pub fn is_running(&self) -> bool {
        self.state() != State::Idle
    }

    /// Reset the window and launch the sampler thread
    pub fn start(&mut self) -> Result<(), AcquisitionError> {
        if self.closed {
            return Err(AcquisitionError::Closed);
        }
        if self.state() != State::Idle {
            return Err(AcquisitionError::AlreadyRunning);
        }
        self.reclaim();
        let transport = self.transport.take().ok_or(AcquisitionError::Closed)?;

        self.shared.buffer.with_mut(|buffer| {
            buffer.replace(self.config.rate, self.config.capacity(), &[]);
        });
        self.shared.deadlines.reset();
        {
            let mut control = self.shared.control();
            control.state = State::Running;
            control.last_exit = None;
            control.started_at = Some(Timestamp::now());
        }

        tracing::info!(
            "recording from {} channel {} at {} Hz",
            self.label,
            self.config.channel,
            self.config.rate
        );

        let sampler = Sampler::new(
            Arc::clone(&self.shared),
            Arc::clone(&self.clock),
            self.config.rate,
            self.config.chunk,
            self.config.channel,
        );
        let shared = Arc::clone(&self.shared);
        // The thread claims the transport from here; if it never runs, the
        // transport is still in the slot and comes back to the session.
        let handoff = Arc::new(Mutex::new(Some(transport)));
        let slot = Arc::clone(&handoff);
        let spawned = std::thread::Builder::new()
            .name("adc-sampler".into())
            .spawn(move || {
                let Some(mut transport) = take_slot(&slot) else {
                    shared.finish(ExitReason::Failed("transport unavailable".into()));
                    return None;
                };
                let reason = panic::catch_unwind(AssertUnwindSafe(|| sampler.run(&mut transport)))
                    .unwrap_or_else(|_| ExitReason::Failed("sampler thread panicked".into()));
                match &reason {
                    ExitReason::Requested => tracing::info!("stream STOPPED"),
                    ExitReason::Failed(reason) => {
                        tracing::warn!(reason = %reason, "stream terminated")
                    }
                }
                shared.finish(reason);
                Some(transport)
            });

        self.launch(spawned, handoff)
    }

    /// Adopt a freshly spawned sampler, or recover the transport if the
    /// spawn failed
    fn launch(
        &mut self,
        spawned: std::io::Result<JoinHandle<Option<T>>>,
        handoff: Arc<Mutex<Option<T>>>,
    ) -> Result<(), AcquisitionError> {
        match spawned {
            Ok(handle) => {
                self.worker = Some(handle);
                Ok(())
            }
            Err(err) => {
                self.transport = take_slot(&handoff);
                self.shared
                    .finish(ExitReason::Failed(format!("spawn failed: {}", err)));
                tracing::error!(error = %err, "Failed to spawn sampler thread");
                Err(AcquisitionError::Spawn(err))
            }
        }
    }

    /// Ask the sampler to exit; with `wait`, block until it has
    pub fn stop(&mut self, wait: bool) {
        {
            let mut control = self.shared.control();
            if control.state == State::Running {
                tracing::info!("sending stream termination command");
                control.state = State::StopRequested;
                self.shared.changed.notify_all();
            }
        }

        if wait {
            self.wait_idle(None);
            self.reclaim();
        }
    }

    /// Block until the sampler has exited or `timeout` elapses
    ///
    /// Sleeps on the state condvar, re-checking at least every
    /// `stop_poll_ms`. Returns whether the session is idle.
    pub fn wait_idle(&self, timeout: Option<Duration>) -> bool {
        let poll = self.config.stop_poll_interval();
        let deadline = timeout.map(|timeout| Instant::now() + timeout);

        let mut control = self.shared.control();
        while control.state != State::Idle {
            let wait = match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return false;
                    }
                    poll.min(deadline - now)
                }
                None => poll,
            };
            control = match self.shared.changed.wait_timeout(control, wait) {
                Ok((guard, _)) => guard,
                Err(poisoned) => poisoned.into_inner().0,
            };
        }
        true
    }

    /// Stop, then release the transport. Safe to call more than once.
    pub fn close(&mut self) -> Result<(), AcquisitionError> {
        if self.closed {
            return Ok(());
        }
        self.stop(true);
        self.closed = true;

        match self.transport.take() {
            Some(mut transport) => {
                transport.close().map_err(AcquisitionError::Transport)?;
                tracing::info!("closed {}", self.label);
                Ok(())
            }
            None => Ok(()),
        }
    }

    /// Change sampling parameters; only allowed while idle
    pub fn reconfigure(&mut self, config: AcquisitionConfig) -> Result<(), AcquisitionError> {
        if self.closed {
            return Err(AcquisitionError::Closed);
        }
        if self.is_running() {
            return Err(AcquisitionError::Busy);
        }
        config.validate()?;
        self.reclaim();

        self.shared.buffer.with_mut(|buffer| {
            buffer.replace(config.rate, config.capacity(), &[]);
        });
        self.config = config;
        Ok(())
    }

    /// Replace the window with a WAV file and adopt its sample rate
    ///
    /// Only the most recent `max_memory_secs` of the file are kept.
    /// Returns the number of samples now in the window.
    pub fn load_wav<P: AsRef<Path>>(&mut self, path: P) -> Result<usize, AcquisitionError> {
        if self.is_running() {
            return Err(AcquisitionError::Busy);
        }
        let recording = wav::load(path)?;
        let config = self.config.with_rate(recording.rate)?;

        let (dropped, retained) = self.shared.buffer.with_mut(|buffer| {
            let dropped = buffer.replace(config.rate, config.capacity(), &recording.samples);
            (dropped, buffer.len())
        });
        if dropped > 0 {
            tracing::warn!(
                dropped,
                "WAV longer than the memory window, keeping the most recent samples"
            );
        }
        self.config = config;
        Ok(retained)
    }

    pub fn status(&self) -> AcquisitionStatus {
        let (buffered, capacity, first_index, samples_recorded) =
            self.shared.buffer.with(|buffer| {
                (
                    buffer.len(),
                    buffer.capacity(),
                    buffer.first_index(),
                    buffer.total_appended(),
                )
            });
        let control = self.shared.control();

        AcquisitionStatus {
            state: control.state,
            transport: self.label.clone(),
            rate: self.config.rate,
            chunk: self.config.chunk,
            channel: self.config.channel,
            buffered,
            capacity,
            first_index,
            samples_recorded,
            missed_deadlines: self.shared.deadlines.missed(),
            overrun_ms: self.shared.deadlines.overrun().as_secs_f64() * 1000.0,
            started_at: control.started_at,
            last_exit: control.last_exit.clone(),
        }
    }

    pub fn snapshot(&self) -> Snapshot {
        self.shared.buffer.snapshot()
    }

    /// PCM, time axis and power spectrum of the current window
    pub fn spectral(&self) -> Result<SpectralResult, AcquisitionError> {
        SpectralResult::from_snapshot(self.snapshot()).ok_or(AcquisitionError::EmptyBuffer)
    }

    /// Window contents low-passed at `cutoff_hz`, edges softened first
    ///
    /// `cutoff_hz <= 0` returns the raw window.
    pub fn filtered(&self, cutoff_hz: f64) -> Result<Vec<f64>, AcquisitionError> {
        let snapshot = self.snapshot();
        if snapshot.is_empty() {
            return Err(AcquisitionError::EmptyBuffer);
        }
        Ok(spectrum::filtered(&snapshot, cutoff_hz)?)
    }

    /// Take the transport back from a finished sampler thread
    fn reclaim(&mut self) {
        if let Some(handle) = self.worker.take() {
            match handle.join() {
                Ok(Some(transport)) => self.transport = Some(transport),
                Ok(None) => {}
                Err(_) => tracing::error!("sampler thread panicked, transport lost"),
            }
        }
    }
}

fn take_slot<T>(slot: &Mutex<Option<T>>) -> Option<T> {
    slot.lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
        .take()
}

impl<T: AdcTransport> Drop for Acquisition<T> {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            tracing::warn!(error = %err, "Failed to close acquisition session");
        }
    }
}
