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

use approx::assert_relative_eq;
use std::time::Duration;
use tether_core::device::{DeviceError, TransportError};
use tether_core::math::Vec2;
use tether_core::physics::{
    BodyDesc, BodyHandle, BodyState, ColliderDesc, ColliderHandle, JointDesc, JointHandle,
    PhysicsError,
};
use tether_core::presentation::{Pose, PresentationSink, RenderSlot};
use tether_core::{ControlConfig, DeviceSession, MonotonicClock, PhysicsProvider};
use tether_infra::{MockConnector, MockTransport, RapierPhysicsWorld, VirtualDisplay};
use tether_sdk::{
    build_rig, CancellationToken, ControlLoop, LoopError, LoopState, StepError,
    TerminationReason,
};

const MID: [u16; 4] = [2048, 2048, 2048, 2048];
const FULL_FORWARD: [u16; 4] = [4095, 0, 2048, 2048];

fn session(mock: &MockTransport) -> DeviceSession {
    let mut connector = MockConnector::new(mock.clone());
    DeviceSession::acquire(&mut connector, Duration::ZERO, MonotonicClock::new()).unwrap()
}

fn control_loop<S: PresentationSink>(
    mock: &MockTransport,
    sink: S,
) -> ControlLoop<RapierPhysicsWorld, S> {
    let config = ControlConfig::default();
    let mut world = RapierPhysicsWorld::new();
    let rig = build_rig(&mut world, &config.scene).unwrap();
    ControlLoop::new(&config, session(mock), world, sink, rig).unwrap()
}

/// Cancels a token from inside `flip` once `after` frames have been shown.
struct CancellingDisplay {
    inner: VirtualDisplay,
    token: CancellationToken,
    after: u64,
}

impl PresentationSink for CancellingDisplay {
    fn width(&self) -> u32 {
        self.inner.width()
    }

    fn height(&self) -> u32 {
        self.inner.height()
    }

    fn set_pose(&mut self, slot: RenderSlot, pose: Pose) {
        self.inner.set_pose(slot, pose);
    }

    fn flip(&mut self) -> f64 {
        let now = self.inner.flip();
        if self.inner.frame_count() == self.after {
            self.token.cancel();
        }
        now
    }
}

/// A rapier world whose `advance` fails on the given call.
struct FailingWorld {
    inner: RapierPhysicsWorld,
    advances: usize,
    fail_on: usize,
}

impl PhysicsProvider for FailingWorld {
    fn advance(&mut self, dt: f32) -> Result<(), PhysicsError> {
        let call = self.advances;
        self.advances += 1;
        if call == self.fail_on {
            return Err(PhysicsError::Diverged {
                body: BodyHandle(1),
            });
        }
        self.inner.advance(dt)
    }

    fn set_gravity(&mut self, gravity: Vec2) {
        self.inner.set_gravity(gravity);
    }

    fn add_body(&mut self, desc: BodyDesc) -> BodyHandle {
        self.inner.add_body(desc)
    }

    fn add_joint(&mut self, desc: JointDesc) -> Result<JointHandle, PhysicsError> {
        self.inner.add_joint(desc)
    }

    fn add_collider(&mut self, desc: ColliderDesc) -> Result<ColliderHandle, PhysicsError> {
        self.inner.add_collider(desc)
    }

    fn body_state(&self, handle: BodyHandle) -> Result<BodyState, PhysicsError> {
        self.inner.body_state(handle)
    }

    fn set_velocity(
        &mut self,
        handle: BodyHandle,
        linear: Vec2,
        angular: f32,
    ) -> Result<(), PhysicsError> {
        self.inner.set_velocity(handle, linear, angular)
    }

    fn body_count(&self) -> usize {
        self.inner.body_count()
    }
}

#[test]
fn mid_scale_input_leaves_the_tank_stationary() {
    let mock = MockTransport::new();
    mock.inject_frames(MID, 10);
    let mut cl = control_loop(&mock, VirtualDisplay::new(1920, 1080, 60.0)).with_max_iterations(10);

    let report = cl.run().unwrap();
    assert_eq!(report.iterations, 10);
    assert_eq!(report.samples_applied, 10);
    assert_eq!(report.reason, TerminationReason::IterationLimit);

    let control = cl.physics().body_state(cl.rig().tank.control).unwrap();
    assert_relative_eq!(control.position.x, 0.1, epsilon = 1e-6);
    assert_relative_eq!(control.position.y, 0.0, epsilon = 1e-6);
    assert_relative_eq!(control.angle, 0.0, epsilon = 1e-6);
    let pose = cl.sink().pose(RenderSlot(0)).unwrap();
    assert_relative_eq!(pose.position.x, 0.1, epsilon = 1e-6);
    assert_relative_eq!(pose.position.y, 0.0, epsilon = 1e-6);
}

#[test]
fn full_forward_drive_sets_linear_velocity() {
    let mock = MockTransport::new();
    mock.inject_frame(FULL_FORWARD);
    let mut cl = control_loop(&mock, VirtualDisplay::new(1920, 1080, 60.0)).with_max_iterations(1);

    let report = cl.run().unwrap();
    assert_eq!(report.samples_applied, 1);

    let control = cl.physics().body_state(cl.rig().tank.control).unwrap();
    assert_relative_eq!(control.linear_velocity.x, 2.0, epsilon = 1e-6);
    assert_relative_eq!(control.linear_velocity.y, 0.0, epsilon = 1e-6);
    assert_eq!(control.angular_velocity, 0.0);
    assert_relative_eq!(control.position.x, 0.1 + 2.0 / 60.0, epsilon = 1e-5);
}

#[test]
fn cancellation_never_splits_an_iteration() {
    let mock = MockTransport::new();
    mock.inject_frames(FULL_FORWARD, 100);
    let token = CancellationToken::new();
    let display = CancellingDisplay {
        inner: VirtualDisplay::new(1920, 1080, 60.0),
        token: token.clone(),
        after: 3,
    };
    let mut cl = control_loop(&mock, display).with_cancellation(token);

    let report = cl.run().unwrap();
    assert_eq!(report.reason, TerminationReason::Cancelled);
    assert_eq!(report.iterations, 3);
    assert_eq!(cl.sink().inner.frame_count(), 3);
    assert_eq!(report.session.frames_decoded, 3);

    // Exactly three whole frames of motion at 2 units/s.
    let control = cl.physics().body_state(cl.rig().tank.control).unwrap();
    assert_relative_eq!(control.position.x, 0.1 + 3.0 * 2.0 / 60.0, epsilon = 1e-5);
    assert!(mock.is_closed());
    assert_eq!(cl.state(), LoopState::Terminated);
}

#[test]
fn cancelled_before_start_runs_nothing() {
    let mock = MockTransport::new();
    let token = CancellationToken::new();
    token.cancel();
    let mut cl = control_loop(&mock, VirtualDisplay::new(1920, 1080, 60.0)).with_cancellation(token);

    let report = cl.run().unwrap();
    assert_eq!(report.iterations, 0);
    assert_eq!(mock.read_count(), 0);
    assert_eq!(cl.sink().frame_count(), 0);
}

#[test]
fn transport_failure_terminates_and_releases() {
    let mock = MockTransport::new();
    mock.inject_frames(MID, 3);
    mock.inject_fault(TransportError::Disconnected);
    let mut cl = control_loop(&mock, VirtualDisplay::new(1920, 1080, 60.0));

    let err = cl.run().unwrap_err();
    assert!(matches!(
        err,
        LoopError::Device(DeviceError::Transport(TransportError::Disconnected))
    ));
    assert_eq!(cl.iterations(), 3);
    assert_eq!(cl.sink().frame_count(), 3);
    assert!(mock.is_closed());
    assert!(!cl.session().is_open());
    assert_eq!(cl.state(), LoopState::Terminated);

    assert!(matches!(cl.run(), Err(LoopError::AlreadyTerminated)));
}

#[test]
fn physics_failure_terminates_before_presenting() {
    let mock = MockTransport::new();
    mock.inject_frames(FULL_FORWARD, 10);
    let config = ControlConfig::default();
    // Second sub-step of the third frame.
    let mut world = FailingWorld {
        inner: RapierPhysicsWorld::new(),
        advances: 0,
        fail_on: 2 * config.substeps_per_frame as usize + 1,
    };
    let rig = build_rig(&mut world, &config.scene).unwrap();
    let mut cl = ControlLoop::new(
        &config,
        session(&mock),
        world,
        VirtualDisplay::new(1920, 1080, 60.0),
        rig,
    )
    .unwrap();

    let err = cl.run().unwrap_err();
    assert!(
        matches!(
            err,
            LoopError::Step(StepError::Advance {
                substep: 1,
                source: PhysicsError::Diverged { .. }
            })
        ),
        "unexpected error: {err:?}"
    );
    assert_eq!(cl.iterations(), 2);
    assert_eq!(cl.sink().frame_count(), 2);
    assert_eq!(cl.sink().history().len(), 2);
    assert_eq!(cl.physics().advances, 2 * config.substeps_per_frame as usize + 2);
    assert!(mock.is_closed());
    assert!(!cl.session().is_open());
    assert_eq!(cl.state(), LoopState::Terminated);
}

#[test]
fn calibrates_to_a_144_hz_display() {
    let mock = MockTransport::new();
    mock.inject_frame(FULL_FORWARD);
    let mut cl = control_loop(&mock, VirtualDisplay::new(1920, 1080, 144.0)).with_max_iterations(25);

    let report = cl.run().unwrap();
    let period = report.frame_period.unwrap();
    assert_relative_eq!(period, 1.0 / 144.0, epsilon = 1e-12);
    assert_eq!(report.late_frames, 0);
    assert_eq!(report.session.timeouts, 24);

    // Five warm-up marks and a fifteen-gap window lock the clock on frame 20;
    // until then each frame advances physics by the nominal 1/60 s.
    let expected = 0.1 + 2.0 * (20.0 / 60.0 + 5.0 / 144.0);
    let control = cl.physics().body_state(cl.rig().tank.control).unwrap();
    assert_relative_eq!(control.position.x as f64, expected, epsilon = 1e-4);
}

#[test]
fn delayed_flip_counts_one_late_frame() {
    let mock = MockTransport::new();
    let mut display = VirtualDisplay::new(1920, 1080, 60.0);
    display.delay_frame(30, 0.02);
    let mut cl = control_loop(&mock, display).with_max_iterations(40);

    let report = cl.run().unwrap();
    assert_eq!(report.late_frames, 1);
    assert_eq!(report.samples_applied, 0);

    let late = cl
        .metrics()
        .snapshot()
        .into_iter()
        .find(|m| m.id.to_string() == "loop.late_frames")
        .unwrap();
    assert_eq!(late.value.as_counter(), Some(1));
}

#[test]
fn short_reads_are_counted_not_fatal() {
    let mock = MockTransport::new();
    mock.inject_bytes(&[1, 2, 3]);
    mock.inject_frame(MID);
    let mut cl = control_loop(&mock, VirtualDisplay::new(1920, 1080, 60.0)).with_max_iterations(2);

    let report = cl.run().unwrap();
    assert_eq!(report.session.discarded_frames, 1);
    assert_eq!(report.samples_applied, 1);
}

#[test]
fn channel_map_must_fit_the_sample() {
    let mock = MockTransport::new();
    let mut config = ControlConfig::default();
    config.channel_map.turn_b = 7;
    let mut world = RapierPhysicsWorld::new();
    let rig = build_rig(&mut world, &config.scene).unwrap();
    let result = ControlLoop::new(
        &config,
        session(&mock),
        world,
        VirtualDisplay::new(640, 480, 60.0),
        rig,
    );
    assert!(matches!(result, Err(LoopError::Config(_))));
}
