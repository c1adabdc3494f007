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

//! # Tether SDK
//!
//! Orchestration of the sampled-input control loop: a [`ControlLoop`] pulls at
//! most one device sample per frame, maps it to a command for the control
//! body, advances physics in fixed sub-steps through the [`PhysicsStepper`],
//! presents the resulting poses and marks the frame on the frame clock.

#![warn(missing_docs)]

pub mod cancel;
pub mod control_loop;
pub mod rig;
pub mod stepper;

pub use cancel::CancellationToken;
pub use control_loop::{ControlLoop, LoopError, LoopReport, LoopState, TerminationReason};
pub use rig::{build_rig, ActuatedPair, RenderBinding, Rig};
pub use stepper::{PhysicsStepper, StepError};

/// Everything needed to assemble and run a loop.
pub mod prelude {
    pub use crate::{
        build_rig, CancellationToken, ControlLoop, LoopError, LoopReport, PhysicsStepper, Rig,
    };
    pub use tether_core::{
        ControlConfig, DeviceSession, FrameClock, MonotonicClock, PhysicsProvider,
        PresentationSink,
    };
    pub use tether_infra::{
        HeadlessDisplay, MockConnector, MockTransport, RapierPhysicsWorld, SyntheticConnector,
        VirtualDisplay,
    };
    pub use tether_telemetry::MetricsRegistry;
}
