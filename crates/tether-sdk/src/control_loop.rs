// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! The per-frame read, map, step, present cycle.

use tether_core::clock::FrameClock;
use tether_core::config::{ConfigError, ControlConfig};
use tether_core::control::CommandMapper;
use tether_core::device::{DeviceError, DeviceSession, SessionStats};
use tether_core::input::DEFAULT_CHANNELS;
use tether_core::physics::{PhysicsError, PhysicsProvider};
use tether_core::presentation::{Pose, PresentationSink};
use tether_core::telemetry::{MetricsError, MetricsResult};
use tether_telemetry::{CounterHandle, HistogramHandle, MetricsRegistry, ScopedMetricTimer};
use thiserror::Error;

use crate::cancel::CancellationToken;
use crate::rig::Rig;
use crate::stepper::{PhysicsStepper, StepError};

use std::time::Duration;

/// Lifecycle of a [`ControlLoop`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    /// Built, not yet run.
    Init,
    /// Inside [`ControlLoop::run`].
    Running,
    /// Finished; the device session has been released.
    Terminated,
}

/// Why a run ended without error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationReason {
    /// The cancellation token was set.
    Cancelled,
    /// The configured iteration cap was reached.
    IterationLimit,
}

/// Everything that can stop the loop early.
#[derive(Debug, Error)]
pub enum LoopError {
    /// Device I/O failed. The session has been released.
    #[error("device failure: {0}")]
    Device(#[from] DeviceError),
    /// Physics stepping failed.
    #[error("physics step failed: {0}")]
    Step(#[from] StepError),
    /// A body query or command was rejected.
    #[error("physics query failed: {0}")]
    Physics(#[from] PhysicsError),
    /// The configuration cannot drive this loop.
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
    /// Loop metrics could not be registered.
    #[error("telemetry setup failed: {0}")]
    Metrics(#[from] MetricsError),
    /// `run` was called on a loop that already terminated.
    #[error("control loop already terminated")]
    AlreadyTerminated,
}

/// Summary of a completed run.
#[derive(Debug, Clone, PartialEq)]
pub struct LoopReport {
    /// Iterations that ran to completion, flip included.
    pub iterations: u64,
    /// Iterations that applied a fresh sample.
    pub samples_applied: u64,
    /// Frames reported late by the frame clock.
    pub late_frames: u64,
    /// The calibrated frame period, if calibration finished.
    pub frame_period: Option<f64>,
    /// Device read counters.
    pub session: SessionStats,
    /// Why the run stopped.
    pub reason: TerminationReason,
}

const FRAME_DELTA_BUCKETS_MS: [f64; 8] = [4.0, 7.0, 10.0, 17.0, 25.0, 34.0, 50.0, 100.0];
const ITERATION_BUCKETS_MS: [f64; 6] = [0.5, 1.0, 2.0, 4.0, 8.0, 16.0];

#[derive(Debug, Clone)]
struct LoopMetrics {
    iterations: CounterHandle,
    samples_applied: CounterHandle,
    late_frames: CounterHandle,
    discarded_frames: CounterHandle,
    frame_delta_ms: HistogramHandle,
    iteration_ms: HistogramHandle,
}

impl LoopMetrics {
    fn register(registry: &MetricsRegistry) -> MetricsResult<Self> {
        Ok(Self {
            iterations: registry.register_counter("loop", "iterations", "Completed iterations")?,
            samples_applied: registry.register_counter(
                "loop",
                "samples_applied",
                "Iterations that applied a device sample",
            )?,
            late_frames: registry.register_counter(
                "loop",
                "late_frames",
                "Frames beyond the latency threshold",
            )?,
            discarded_frames: registry.register_counter(
                "device",
                "discarded_frames",
                "Reads too short to decode",
            )?,
            frame_delta_ms: registry.register_histogram(
                "loop",
                "frame_delta_ms",
                "Time between presented frames",
                "ms",
                FRAME_DELTA_BUCKETS_MS.to_vec(),
            )?,
            iteration_ms: registry.register_histogram(
                "loop",
                "iteration_ms",
                "Wall time of one iteration",
                "ms",
                ITERATION_BUCKETS_MS.to_vec(),
            )?,
        })
    }
}

fn record<T>(result: MetricsResult<T>) {
    if let Err(e) = result {
        log::debug!("Failed to record loop metric: {}", e);
    }
}

/// Drives one device session, one physics world and one presentation sink.
///
/// Each iteration reads at most one sample, applies it to the control body,
/// steps physics by one frame period and presents. Cancellation is checked
/// only between iterations.
pub struct ControlLoop<P, S, const N: usize = DEFAULT_CHANNELS>
where
    P: PhysicsProvider,
    S: PresentationSink,
{
    session: DeviceSession<N>,
    physics: P,
    sink: S,
    rig: Rig,
    mapper: CommandMapper,
    clock: FrameClock,
    stepper: PhysicsStepper,
    full_scale: f32,
    substeps: u32,
    read_timeout: Duration,
    nominal_period: f64,
    cancel: CancellationToken,
    max_iterations: Option<u64>,
    registry: MetricsRegistry,
    metrics: LoopMetrics,
    state: LoopState,
    iterations: u64,
    samples_applied: u64,
    late_frames: u64,
}

impl<P, S, const N: usize> ControlLoop<P, S, N>
where
    P: PhysicsProvider,
    S: PresentationSink,
{
    /// Assembles a loop with a private metrics registry.
    pub fn new(
        config: &ControlConfig,
        session: DeviceSession<N>,
        physics: P,
        sink: S,
        rig: Rig,
    ) -> Result<Self, LoopError> {
        Self::with_registry(config, session, physics, sink, rig, MetricsRegistry::new())
    }

    /// Assembles a loop that reports into `registry`.
    pub fn with_registry(
        config: &ControlConfig,
        session: DeviceSession<N>,
        physics: P,
        sink: S,
        rig: Rig,
        registry: MetricsRegistry,
    ) -> Result<Self, LoopError> {
        config.validate()?;
        if !config.channel_map.fits(N) {
            return Err(ConfigError::Invalid {
                field: "channel_map",
                reason: format!(
                    "channel {} does not exist in a {}-channel sample",
                    config.channel_map.max_index(),
                    N
                ),
            }
            .into());
        }

        let metrics = LoopMetrics::register(&registry)?;
        let step_time = registry.register_gauge(
            "physics",
            "step_time_ms",
            "Wall time of one frame's sub-steps",
            "ms",
        )?;

        Ok(Self {
            session,
            physics,
            sink,
            rig,
            mapper: config.mapper(),
            clock: FrameClock::new(config.calibration()),
            stepper: PhysicsStepper::new().with_step_time_gauge(step_time),
            full_scale: config.full_scale,
            substeps: config.substeps_per_frame,
            read_timeout: config.device_read_timeout(),
            nominal_period: config.nominal_period(),
            cancel: CancellationToken::new(),
            max_iterations: None,
            registry,
            metrics,
            state: LoopState::Init,
            iterations: 0,
            samples_applied: 0,
            late_frames: 0,
        })
    }

    /// Uses `token` instead of the loop's own cancellation token.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Stops after `limit` completed iterations.
    pub fn with_max_iterations(mut self, limit: u64) -> Self {
        self.max_iterations = Some(limit);
        self
    }

    /// A clone of the token that stops this loop.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Runs until cancelled, capped, or failed. The device session is
    /// released on every exit.
    pub fn run(&mut self) -> Result<LoopReport, LoopError> {
        if self.state == LoopState::Terminated {
            return Err(LoopError::AlreadyTerminated);
        }
        self.state = LoopState::Running;
        log::info!(
            "Control loop running on {} ({} sub-steps per frame)",
            self.session.description(),
            self.substeps
        );

        let outcome = loop {
            if self.cancel.is_cancelled() {
                break Ok(TerminationReason::Cancelled);
            }
            if self.max_iterations.is_some_and(|max| self.iterations >= max) {
                break Ok(TerminationReason::IterationLimit);
            }
            if let Err(e) = self.iterate() {
                break Err(e);
            }
        };

        self.session.release();
        self.state = LoopState::Terminated;

        match outcome {
            Ok(reason) => {
                let report = self.report(reason);
                log::info!(
                    "Control loop stopped ({:?}) after {} iterations, {} samples applied, {} late frames",
                    reason,
                    report.iterations,
                    report.samples_applied,
                    report.late_frames
                );
                Ok(report)
            }
            Err(e) => {
                log::error!(
                    "Control loop failed after {} iterations: {}",
                    self.iterations,
                    e
                );
                Err(e)
            }
        }
    }

    fn iterate(&mut self) -> Result<(), LoopError> {
        let iteration_timer = self.metrics.iteration_ms.clone();
        let _timer = ScopedMetricTimer::new(&iteration_timer);

        let discarded_before = self.session.stats().discarded_frames;
        let sample = self.session.read(self.read_timeout)?;
        let discarded = self.session.stats().discarded_frames - discarded_before;
        if discarded > 0 {
            record(self.metrics.discarded_frames.increment_by(discarded));
        }

        if let Some(sample) = sample {
            let control = self.rig.control_body();
            let orientation = self.physics.body_state(control)?.angle;
            let command = self
                .mapper
                .map(&sample.normalize(self.full_scale), orientation);
            self.physics
                .set_velocity(control, command.linear_velocity, command.angular_velocity)?;
            self.samples_applied += 1;
            record(self.metrics.samples_applied.increment());
        }

        let total_dt = self.clock.period().unwrap_or(self.nominal_period);
        self.stepper
            .step(&mut self.physics, total_dt, self.substeps)?;

        for binding in &self.rig.bindings {
            let state = self.physics.body_state(binding.body)?;
            self.sink
                .set_pose(binding.slot, Pose::new(state.position, state.angle));
        }

        let presented = self.sink.flip();
        let was_locked = self.clock.is_locked();
        let delta = self.clock.mark(presented);
        if !was_locked && self.clock.is_locked() {
            log::debug!("Physics now advances {:.6} s per frame", total_dt);
        }
        if delta > 0.0 {
            record(self.metrics.frame_delta_ms.observe(delta * 1000.0));
        }
        if self.clock.is_late(delta) {
            self.late_frames += 1;
            record(self.metrics.late_frames.increment());
            log::warn!(
                "Late frame: {:.2} ms (nominal {:.2} ms)",
                delta * 1000.0,
                self.clock.nominal_period() * 1000.0
            );
        }

        self.iterations += 1;
        record(self.metrics.iterations.increment());
        Ok(())
    }

    fn report(&self, reason: TerminationReason) -> LoopReport {
        LoopReport {
            iterations: self.iterations,
            samples_applied: self.samples_applied,
            late_frames: self.late_frames,
            frame_period: self.clock.period().ok(),
            session: self.session.stats(),
            reason,
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> LoopState {
        self.state
    }

    /// Iterations completed so far.
    pub fn iterations(&self) -> u64 {
        self.iterations
    }

    /// The physics world.
    pub fn physics(&self) -> &P {
        &self.physics
    }

    /// The presentation sink.
    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// The bodies being driven.
    pub fn rig(&self) -> &Rig {
        &self.rig
    }

    /// The frame clock.
    pub fn frame_clock(&self) -> &FrameClock {
        &self.clock
    }

    /// The device session.
    pub fn session(&self) -> &DeviceSession<N> {
        &self.session
    }

    /// Where loop metrics are recorded.
    pub fn metrics(&self) -> &MetricsRegistry {
        &self.registry
    }
}
