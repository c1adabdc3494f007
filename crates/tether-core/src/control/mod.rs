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

//! Mapping normalized device samples to kinematic commands.

use serde::{Deserialize, Serialize};

use crate::input::NormalizedSample;
use crate::math::Vec2;

/// Velocity command for the control body. Replaces the previous command.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Command {
    /// Linear velocity in world units per second.
    pub linear_velocity: Vec2,
    /// Angular velocity in radians per second.
    pub angular_velocity: f32,
}

impl Command {
    /// A command that holds the body still.
    pub const STOP: Self = Self {
        linear_velocity: Vec2::ZERO,
        angular_velocity: 0.0,
    };
}

/// Which channels drive which axis.
///
/// Linear drive is `drive_a - drive_b`, rotation is `turn_a - turn_b`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelMap {
    /// Positive linear drive.
    pub drive_a: usize,
    /// Negative linear drive.
    pub drive_b: usize,
    /// Positive (counter-clockwise) rotation.
    pub turn_a: usize,
    /// Negative rotation.
    pub turn_b: usize,
}

impl ChannelMap {
    /// Highest channel index referenced.
    pub fn max_index(&self) -> usize {
        self.drive_a
            .max(self.drive_b)
            .max(self.turn_a)
            .max(self.turn_b)
    }

    /// Whether every referenced channel exists in an `arity`-channel sample.
    pub fn fits(&self, arity: usize) -> bool {
        self.max_index() < arity
    }
}

impl Default for ChannelMap {
    fn default() -> Self {
        Self {
            drive_a: 0,
            drive_b: 1,
            turn_a: 2,
            turn_b: 3,
        }
    }
}

/// Stateless transform from a normalized sample and orientation to a [`Command`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CommandMapper {
    channels: ChannelMap,
    angular_gain: f32,
    linear_gain: f32,
}

impl CommandMapper {
    /// Creates a mapper.
    pub fn new(channels: ChannelMap, angular_gain: f32, linear_gain: f32) -> Self {
        Self {
            channels,
            angular_gain,
            linear_gain,
        }
    }

    /// The channel roles in use.
    pub fn channels(&self) -> &ChannelMap {
        &self.channels
    }

    /// Computes the command for `sample` with the body facing `orientation` radians.
    ///
    /// Channels outside the sample's arity read as zero; callers check
    /// [`ChannelMap::fits`] up front.
    pub fn map<const N: usize>(&self, sample: &NormalizedSample<N>, orientation: f32) -> Command {
        let c = |i: usize| sample.get(i).unwrap_or(0.0);
        let angular_velocity = (c(self.channels.turn_a) - c(self.channels.turn_b)) * self.angular_gain;
        let diff = (c(self.channels.drive_a) - c(self.channels.drive_b)) * self.linear_gain;
        Command {
            linear_velocity: Vec2::from_angle(orientation) * diff,
            angular_velocity,
        }
    }
}
