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

//! # Physics Abstractions
//!
//! Traits and types for the planar physics collaborator the loop advances.
//! The solver itself lives behind [`PhysicsProvider`]; the loop only registers
//! bodies, colliders and joints up front, then writes the control body's
//! velocity and calls [`PhysicsProvider::advance`].

use std::fmt;

use crate::math::Vec2;

/// Opaque handle to a body in the physics world.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BodyHandle(pub u32);

/// Opaque handle to a joint in the physics world.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JointHandle(pub u32);

/// Opaque handle to a collider in the physics world.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ColliderHandle(pub u32);

/// Defines how a body is moved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyKind {
    /// Never moves. Infinite mass.
    Static,
    /// Moved only by its velocity, which the user sets. Infinite mass.
    Kinematic,
    /// Moved by gravity and joint impulses.
    Dynamic,
}

/// Description for creating a body.
#[derive(Debug, Clone, PartialEq)]
pub struct BodyDesc {
    /// Body kind.
    pub kind: BodyKind,
    /// Initial position of the center of mass.
    pub position: Vec2,
    /// Initial orientation in radians.
    pub angle: f32,
    /// Mass (dynamic only).
    pub mass: f32,
    /// Moment of inertia (dynamic only).
    pub moment: f32,
}

impl BodyDesc {
    /// A static anchor at `position`.
    pub fn fixed(position: Vec2) -> Self {
        Self {
            kind: BodyKind::Static,
            position,
            angle: 0.0,
            mass: f32::INFINITY,
            moment: f32::INFINITY,
        }
    }

    /// A kinematic body at `position`.
    pub fn kinematic(position: Vec2) -> Self {
        Self {
            kind: BodyKind::Kinematic,
            position,
            angle: 0.0,
            mass: f32::INFINITY,
            moment: f32::INFINITY,
        }
    }

    /// A dynamic body with explicit mass and moment.
    pub fn dynamic(position: Vec2, mass: f32, moment: f32) -> Self {
        Self {
            kind: BodyKind::Dynamic,
            position,
            angle: 0.0,
            mass,
            moment,
        }
    }

    /// A dynamic solid box of `size` (width, height).
    pub fn dynamic_box(position: Vec2, mass: f32, size: Vec2) -> Self {
        Self::dynamic(position, mass, moment_for_box(mass, size))
    }

    /// A dynamic solid disc of `radius`.
    pub fn dynamic_circle(position: Vec2, mass: f32, radius: f32) -> Self {
        Self::dynamic(position, mass, moment_for_circle(mass, radius))
    }
}

/// Moment of inertia of a solid box about its center.
pub fn moment_for_box(mass: f32, size: Vec2) -> f32 {
    mass * (size.x * size.x + size.y * size.y) / 12.0
}

/// Moment of inertia of a solid disc about its center.
pub fn moment_for_circle(mass: f32, radius: f32) -> f32 {
    0.5 * mass * radius * radius
}

/// Snapshot of a body's kinematic state.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct BodyState {
    /// Position of the center of mass.
    pub position: Vec2,
    /// Orientation in radians.
    pub angle: f32,
    /// Linear velocity.
    pub linear_velocity: Vec2,
    /// Angular velocity in radians per second.
    pub angular_velocity: f32,
}

impl BodyState {
    /// Whether every component is finite.
    pub fn is_finite(&self) -> bool {
        self.position.is_finite()
            && self.angle.is_finite()
            && self.linear_velocity.is_finite()
            && self.angular_velocity.is_finite()
    }
}

/// Default fraction of joint error left uncorrected after one second.
pub const DEFAULT_ERROR_BIAS: f32 = 0.001_797_010_5; // 0.9^60

/// Correction limits shared by every joint kind.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JointLimits {
    /// Largest force the joint may apply.
    pub max_force: f32,
    /// Largest speed at which positional error is corrected.
    pub max_bias: f32,
    /// Fraction of error left uncorrected after one second (0 corrects fully each step).
    pub error_bias: f32,
}

impl Default for JointLimits {
    fn default() -> Self {
        Self {
            max_force: f32::INFINITY,
            max_bias: f32::INFINITY,
            error_bias: DEFAULT_ERROR_BIAS,
        }
    }
}

impl JointLimits {
    /// Sets the force ceiling.
    pub fn with_max_force(mut self, max_force: f32) -> Self {
        self.max_force = max_force;
        self
    }

    /// Sets the correction speed ceiling.
    pub fn with_max_bias(mut self, max_bias: f32) -> Self {
        self.max_bias = max_bias;
        self
    }

    /// Sets the error bias.
    pub fn with_error_bias(mut self, error_bias: f32) -> Self {
        self.error_bias = error_bias;
        self
    }
}

/// Description for creating a joint.
#[derive(Debug, Clone, PartialEq)]
pub enum JointDesc {
    /// Pins a point on `a` to a point on `b`.
    Pivot {
        /// First body.
        a: BodyHandle,
        /// Second body.
        b: BodyHandle,
        /// Anchor in `a`'s local frame.
        anchor_a: Vec2,
        /// Anchor in `b`'s local frame.
        anchor_b: Vec2,
        /// Correction limits.
        limits: JointLimits,
    },
    /// Locks the relative orientation `b.angle - a.angle` to `phase`.
    Gear {
        /// First body.
        a: BodyHandle,
        /// Second body.
        b: BodyHandle,
        /// Target angular offset.
        phase: f32,
        /// Correction limits.
        limits: JointLimits,
    },
}

impl JointDesc {
    /// A pivot joining the two bodies' centers.
    pub fn pivot(a: BodyHandle, b: BodyHandle, limits: JointLimits) -> Self {
        JointDesc::Pivot {
            a,
            b,
            anchor_a: Vec2::ZERO,
            anchor_b: Vec2::ZERO,
            limits,
        }
    }

    /// A gear with no phase offset.
    pub fn gear(a: BodyHandle, b: BodyHandle, limits: JointLimits) -> Self {
        JointDesc::Gear {
            a,
            b,
            phase: 0.0,
            limits,
        }
    }

    /// The two bodies the joint relates.
    pub fn bodies(&self) -> (BodyHandle, BodyHandle) {
        match *self {
            JointDesc::Pivot { a, b, .. } | JointDesc::Gear { a, b, .. } => (a, b),
        }
    }

    /// The joint's correction limits.
    pub fn limits(&self) -> &JointLimits {
        match self {
            JointDesc::Pivot { limits, .. } | JointDesc::Gear { limits, .. } => limits,
        }
    }
}

/// Geometry of a collider, in its parent's local frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ColliderShape {
    /// An axis-aligned box centered on the parent.
    Box {
        /// Half width and half height.
        half_extents: Vec2,
    },
    /// A segment from `a` to `b`, thickened by `radius`.
    Segment {
        /// First endpoint.
        a: Vec2,
        /// Second endpoint.
        b: Vec2,
        /// Rounding radius (0 for a bare segment).
        radius: f32,
    },
}

/// Contact response of a collider.
///
/// When two colliders touch, the contact uses the product of their
/// coefficients.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Material {
    /// Coulomb friction coefficient.
    pub friction: f32,
    /// Restitution: 0 absorbs the impact, 1 bounces back at full speed.
    pub elasticity: f32,
}

impl Default for Material {
    fn default() -> Self {
        Self {
            friction: 0.0,
            elasticity: 0.0,
        }
    }
}

/// Description for creating a collider.
#[derive(Debug, Clone, PartialEq)]
pub struct ColliderDesc {
    /// The body the collider moves with; `None` attaches it to the world.
    pub parent: Option<BodyHandle>,
    /// Geometry.
    pub shape: ColliderShape,
    /// Contact response.
    pub material: Material,
}

impl ColliderDesc {
    /// A box of `size` (width, height) attached to `parent`.
    pub fn cuboid(parent: BodyHandle, size: Vec2) -> Self {
        Self {
            parent: Some(parent),
            shape: ColliderShape::Box {
                half_extents: size * 0.5,
            },
            material: Material::default(),
        }
    }

    /// A static segment wall in world coordinates.
    pub fn segment(a: Vec2, b: Vec2, radius: f32) -> Self {
        Self {
            parent: None,
            shape: ColliderShape::Segment { a, b, radius },
            material: Material::default(),
        }
    }

    /// Sets the contact response.
    pub fn with_material(mut self, friction: f32, elasticity: f32) -> Self {
        self.material = Material {
            friction,
            elasticity,
        };
        self
    }
}

/// Errors produced by a physics provider.
#[derive(Debug, Clone, PartialEq)]
pub enum PhysicsError {
    /// The handle does not name a body in this world.
    UnknownBody(BodyHandle),
    /// The joint description is unusable.
    InvalidJoint(String),
    /// The collider description is unusable.
    InvalidCollider(String),
    /// The velocity of a static or dynamic body was written directly.
    NotKinematic(BodyHandle),
    /// `advance` was given a non-positive or non-finite step.
    InvalidTimeStep(f32),
    /// A body's state became non-finite during a step.
    Diverged {
        /// The first body found with non-finite state.
        body: BodyHandle,
    },
}

impl fmt::Display for PhysicsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PhysicsError::UnknownBody(h) => write!(f, "Unknown body {}", h.0),
            PhysicsError::InvalidJoint(msg) => write!(f, "Invalid joint: {msg}"),
            PhysicsError::InvalidCollider(msg) => write!(f, "Invalid collider: {msg}"),
            PhysicsError::NotKinematic(h) => write!(f, "Body {} is not kinematic", h.0),
            PhysicsError::InvalidTimeStep(dt) => write!(f, "Invalid time step: {dt}"),
            PhysicsError::Diverged { body } => write!(f, "Simulation diverged at body {}", body.0),
        }
    }
}

impl std::error::Error for PhysicsError {}

/// Interface contract for the planar physics collaborator.
pub trait PhysicsProvider: Send {
    /// Advances the simulation by `dt` seconds.
    fn advance(&mut self, dt: f32) -> Result<(), PhysicsError>;

    /// Sets the global gravity vector.
    fn set_gravity(&mut self, gravity: Vec2);

    /// Adds a body to the simulation.
    fn add_body(&mut self, desc: BodyDesc) -> BodyHandle;

    /// Adds a joint between two existing bodies.
    fn add_joint(&mut self, desc: JointDesc) -> Result<JointHandle, PhysicsError>;

    /// Adds a collider, attached to a body or to the world.
    fn add_collider(&mut self, desc: ColliderDesc) -> Result<ColliderHandle, PhysicsError>;

    /// Reads a body's current state.
    fn body_state(&self, handle: BodyHandle) -> Result<BodyState, PhysicsError>;

    /// Writes both velocity components of a kinematic body in one call.
    fn set_velocity(
        &mut self,
        handle: BodyHandle,
        linear: Vec2,
        angular: f32,
    ) -> Result<(), PhysicsError>;

    /// Number of bodies, static ones included.
    fn body_count(&self) -> usize;
}
