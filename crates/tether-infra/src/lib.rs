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

//! # Tether Infra
//!
//! Concrete implementations of the contracts defined in `tether-core`: the
//! serial input device and its discovery, synthetic and mock transports, the
//! rapier-backed planar physics world and paced displays for running without a
//! window.

#![warn(missing_docs)]

pub mod device;
#[cfg(feature = "physics")]
pub mod physics;
pub mod presentation;

pub use device::mock::{MockConnector, MockTransport};
pub use device::synthetic::{SyntheticConnector, SyntheticTransport};
pub use device::{DeviceMatch, PortListing};
#[cfg(feature = "serial")]
pub use device::serial::{discover_port, SerialConnector, SerialTransport};
#[cfg(feature = "physics")]
pub use physics::rapier::RapierPhysicsWorld;
pub use presentation::{HeadlessDisplay, VirtualDisplay};
