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

//! Contract for the display the loop presents poses to.

use crate::math::{radians_to_degrees, Vec2};

/// Index of a drawable in the sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RenderSlot(pub usize);

/// Where and how a drawable is placed for the next frame.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Pose {
    /// Position in world units.
    pub position: Vec2,
    /// Rotation in radians.
    pub rotation: f32,
}

impl Pose {
    /// Creates a pose.
    pub fn new(position: Vec2, rotation: f32) -> Self {
        Self { position, rotation }
    }

    /// Rotation in degrees, as most drawing APIs expect.
    pub fn rotation_degrees(&self) -> f32 {
        radians_to_degrees(self.rotation)
    }
}

/// A display synchronized to a vertical refresh.
pub trait PresentationSink {
    /// Drawable width in pixels.
    fn width(&self) -> u32;

    /// Drawable height in pixels.
    fn height(&self) -> u32;

    /// Places a drawable for the next frame.
    fn set_pose(&mut self, slot: RenderSlot, pose: Pose);

    /// Blocks until the next vertical sync boundary and returns the clock
    /// reading, in seconds, taken immediately after.
    fn flip(&mut self) -> f64;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::PI;
    use approx::assert_relative_eq;

    #[test]
    fn pose_degrees() {
        let pose = Pose::new(Vec2::ZERO, PI / 2.0);
        assert_relative_eq!(pose.rotation_degrees(), 90.0, epsilon = 1e-4);
    }
}
