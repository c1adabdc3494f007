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

//! Fixed sub-step advancement of the physics collaborator.

use tether_core::physics::{PhysicsError, PhysicsProvider};
use tether_telemetry::{GaugeHandle, ScopedMetricTimer};
use thiserror::Error;

/// Errors from [`PhysicsStepper::step`].
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StepError {
    /// The requested schedule cannot be split into sub-steps.
    #[error("invalid step schedule: total_dt={total_dt}, substeps={substeps}")]
    InvalidSchedule {
        /// Requested frame slice in seconds.
        total_dt: f64,
        /// Requested number of sub-steps.
        substeps: u32,
    },
    /// A sub-step failed. The world state is undefined afterwards.
    #[error("sub-step {substep} failed: {source}")]
    Advance {
        /// Zero-based index of the failing sub-step.
        substep: u32,
        /// The provider's error.
        #[source]
        source: PhysicsError,
    },
}

/// Splits a frame's time slice into equal `advance` calls.
#[derive(Debug, Clone, Default)]
pub struct PhysicsStepper {
    step_time: Option<GaugeHandle>,
}

impl PhysicsStepper {
    /// Creates a stepper that reports nothing.
    pub fn new() -> Self {
        Self::default()
    }

    /// Reports the wall time of each `step` call to `gauge`, in milliseconds.
    pub fn with_step_time_gauge(mut self, gauge: GaugeHandle) -> Self {
        self.step_time = Some(gauge);
        self
    }

    /// Advances `provider` by `total_dt` seconds in `substeps` equal calls.
    ///
    /// Returns the sub-step duration. On failure no further sub-steps run.
    pub fn step(
        &self,
        provider: &mut dyn PhysicsProvider,
        total_dt: f64,
        substeps: u32,
    ) -> Result<f32, StepError> {
        if substeps == 0 || !total_dt.is_finite() || total_dt <= 0.0 {
            return Err(StepError::InvalidSchedule { total_dt, substeps });
        }
        let _timer = self.step_time.as_ref().map(ScopedMetricTimer::gauge);

        let dt = (total_dt / substeps as f64) as f32;
        for substep in 0..substeps {
            provider
                .advance(dt)
                .map_err(|source| StepError::Advance { substep, source })?;
        }
        Ok(dt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use tether_core::math::Vec2;
    use tether_core::physics::{
        BodyDesc, BodyHandle, BodyState, ColliderDesc, ColliderHandle, JointDesc, JointHandle,
    };
    use tether_telemetry::MetricsRegistry;

    /// Records every `advance` call; fails on the configured call index.
    #[derive(Default)]
    struct RecordingProvider {
        calls: Vec<f32>,
        fail_at: Option<usize>,
    }

    impl PhysicsProvider for RecordingProvider {
        fn advance(&mut self, dt: f32) -> Result<(), PhysicsError> {
            if self.fail_at == Some(self.calls.len()) {
                return Err(PhysicsError::Diverged {
                    body: BodyHandle(0),
                });
            }
            self.calls.push(dt);
            Ok(())
        }

        fn set_gravity(&mut self, _gravity: Vec2) {}

        fn add_body(&mut self, _desc: BodyDesc) -> BodyHandle {
            BodyHandle(0)
        }

        fn add_joint(&mut self, _desc: JointDesc) -> Result<JointHandle, PhysicsError> {
            Ok(JointHandle(0))
        }

        fn add_collider(&mut self, _desc: ColliderDesc) -> Result<ColliderHandle, PhysicsError> {
            Ok(ColliderHandle(0))
        }

        fn body_state(&self, _handle: BodyHandle) -> Result<BodyState, PhysicsError> {
            Ok(BodyState::default())
        }

        fn set_velocity(
            &mut self,
            _handle: BodyHandle,
            _linear: Vec2,
            _angular: f32,
        ) -> Result<(), PhysicsError> {
            Ok(())
        }

        fn body_count(&self) -> usize {
            0
        }
    }

    #[test]
    fn splits_into_equal_substeps() {
        let stepper = PhysicsStepper::new();
        for k in 1..=8u32 {
            for total in [1.0 / 60.0, 1.0 / 144.0, 1.0 / 240.0] {
                let mut provider = RecordingProvider::default();
                let dt = stepper.step(&mut provider, total, k).unwrap();
                assert_eq!(provider.calls.len(), k as usize);
                assert!(provider.calls.iter().all(|c| *c == dt));
                let sum: f64 = provider.calls.iter().map(|c| *c as f64).sum();
                assert_relative_eq!(sum, total, epsilon = 1e-6);
            }
        }
    }

    #[test]
    fn rejects_bad_schedules() {
        let stepper = PhysicsStepper::new();
        let mut provider = RecordingProvider::default();
        for (total, k) in [(1.0 / 60.0, 0), (0.0, 4), (-0.1, 4), (f64::NAN, 4)] {
            assert!(matches!(
                stepper.step(&mut provider, total, k),
                Err(StepError::InvalidSchedule { .. })
            ));
        }
        assert!(provider.calls.is_empty());
    }

    #[test]
    fn failure_stops_remaining_substeps() {
        let stepper = PhysicsStepper::new();
        let mut provider = RecordingProvider {
            fail_at: Some(2),
            ..Default::default()
        };
        let err = stepper.step(&mut provider, 1.0 / 60.0, 4).unwrap_err();
        assert_eq!(
            err,
            StepError::Advance {
                substep: 2,
                source: PhysicsError::Diverged {
                    body: BodyHandle(0)
                }
            }
        );
        assert_eq!(provider.calls.len(), 2);
    }

    #[test]
    fn reports_step_time() {
        let registry = MetricsRegistry::new();
        let gauge = registry
            .register_gauge("physics", "step_time_ms", "", "ms")
            .unwrap();
        let stepper = PhysicsStepper::new().with_step_time_gauge(gauge.clone());
        gauge.set(-1.0).unwrap();
        stepper
            .step(&mut RecordingProvider::default(), 1.0 / 60.0, 4)
            .unwrap();
        assert!(gauge.get().unwrap() >= 0.0);
    }
}
