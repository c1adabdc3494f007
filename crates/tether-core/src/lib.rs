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

//! # Tether Core
//!
//! Foundational crate containing traits, core types, and interface contracts
//! for the sampled-input control loop: device framing, frame-period
//! calibration, sample-to-command mapping and the physics and presentation
//! seams the loop drives.

#![warn(missing_docs)]

pub mod clock;
pub mod config;
pub mod control;
pub mod device;
pub mod input;
pub mod math;
pub mod physics;
pub mod presentation;
pub mod telemetry;
pub mod utils;

pub use clock::{ClockError, FrameClock, FramePeriodHandle};
pub use config::{ConfigError, ControlConfig};
pub use control::{Command, CommandMapper};
pub use device::{DeviceConnector, DeviceError, DeviceSession, Transport, TransportError};
pub use input::{DecodeError, NormalizedSample, Sample, SampleDecoder};
pub use math::Vec2;
pub use physics::{BodyHandle, BodyState, PhysicsError, PhysicsProvider};
pub use presentation::{Pose, PresentationSink, RenderSlot};
pub use utils::timer::{MonotonicClock, Stopwatch, TimeSource};
