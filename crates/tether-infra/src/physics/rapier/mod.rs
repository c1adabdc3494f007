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

//! Rapier implementation of the physics provider.
//!
//! Joints are generic rapier joints driven by motors: each coupled axis gets
//! a velocity motor whose force is capped by the joint's `max_force` and
//! whose stiffness encodes how fast positional error is corrected.

mod conversions;

use rapier2d::prelude::*;
use tether_core::math::Vec2;
use tether_core::physics::{
    BodyDesc, BodyHandle, BodyKind, BodyState, ColliderDesc, ColliderHandle as TetherColliderHandle,
    ColliderShape, JointDesc, JointHandle, JointLimits, Material, PhysicsError, PhysicsProvider,
};

use self::conversions::{from_rapier_vec, to_rapier_point, to_rapier_vec};

/// Damping of every joint motor, in force per unit of velocity error.
const MOTOR_DAMPING: Real = 1.0e6;

/// Correction rate, per second, used when a joint asks for full correction.
const MAX_CORRECTION_RATE: Real = 60.0;

/// Implementation of the `PhysicsProvider` trait using the Rapier2D physics engine.
pub struct RapierPhysicsWorld {
    rigid_body_set: RigidBodySet,
    collider_set: ColliderSet,
    gravity: Vector<Real>,
    integration_parameters: IntegrationParameters,
    physics_pipeline: PhysicsPipeline,
    island_manager: IslandManager,
    broad_phase: BroadPhaseMultiSap,
    narrow_phase: NarrowPhase,
    impulse_joint_set: ImpulseJointSet,
    multibody_joint_set: MultibodyJointSet,
    ccd_solver: CCDSolver,
    bodies: Vec<RigidBodyHandle>,
    joints: Vec<ImpulseJointHandle>,
    colliders: Vec<ColliderHandle>,
    steps: u64,
}

impl Default for RapierPhysicsWorld {
    fn default() -> Self {
        Self {
            rigid_body_set: RigidBodySet::new(),
            collider_set: ColliderSet::new(),
            gravity: vector![0.0, 0.0],
            integration_parameters: IntegrationParameters::default(),
            physics_pipeline: PhysicsPipeline::new(),
            island_manager: IslandManager::new(),
            broad_phase: BroadPhaseMultiSap::new(),
            narrow_phase: NarrowPhase::new(),
            impulse_joint_set: ImpulseJointSet::new(),
            multibody_joint_set: MultibodyJointSet::new(),
            ccd_solver: CCDSolver::new(),
            bodies: Vec::new(),
            joints: Vec::new(),
            colliders: Vec::new(),
            steps: 0,
        }
    }
}

impl RapierPhysicsWorld {
    /// Creates an empty world with zero gravity.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of joints.
    pub fn joint_count(&self) -> usize {
        self.joints.len()
    }

    /// Number of colliders, world-attached ones included.
    pub fn collider_count(&self) -> usize {
        self.colliders.len()
    }

    /// Number of successful `advance` calls.
    pub fn step_count(&self) -> u64 {
        self.steps
    }

    fn rapier_handle(&self, handle: BodyHandle) -> Result<RigidBodyHandle, PhysicsError> {
        self.bodies
            .get(handle.0 as usize)
            .copied()
            .ok_or(PhysicsError::UnknownBody(handle))
    }

    fn rigid_body(&self, handle: BodyHandle) -> Result<&RigidBody, PhysicsError> {
        let rb_handle = self.rapier_handle(handle)?;
        self.rigid_body_set
            .get(rb_handle)
            .ok_or(PhysicsError::UnknownBody(handle))
    }

    fn check_finite(&self) -> Result<(), PhysicsError> {
        for index in 0..self.bodies.len() {
            let handle = BodyHandle(index as u32);
            if !self.body_state(handle)?.is_finite() {
                return Err(PhysicsError::Diverged { body: handle });
            }
        }
        Ok(())
    }
}

fn validate_limits(limits: &JointLimits) -> Result<(), PhysicsError> {
    if limits.max_force.is_nan() || limits.max_force < 0.0 {
        return Err(PhysicsError::InvalidJoint(format!(
            "max_force must be non-negative, got {}",
            limits.max_force
        )));
    }
    if limits.max_bias.is_nan() || limits.max_bias < 0.0 {
        return Err(PhysicsError::InvalidJoint(format!(
            "max_bias must be non-negative, got {}",
            limits.max_bias
        )));
    }
    if !(0.0..=1.0).contains(&limits.error_bias) {
        return Err(PhysicsError::InvalidJoint(format!(
            "error_bias must lie in [0, 1], got {}",
            limits.error_bias
        )));
    }
    Ok(())
}

fn validate_material(material: &Material) -> Result<(), PhysicsError> {
    let valid = |c: f32| c.is_finite() && c >= 0.0;
    if !valid(material.friction) || !valid(material.elasticity) {
        return Err(PhysicsError::InvalidCollider(format!(
            "friction and elasticity must be finite and non-negative, got {} and {}",
            material.friction, material.elasticity
        )));
    }
    Ok(())
}

/// Positional correction rate of a joint, per second.
///
/// A zero `max_bias` disables correction and leaves a pure velocity motor.
fn correction_rate(limits: &JointLimits) -> Real {
    if limits.max_bias == 0.0 {
        return 0.0;
    }
    (-limits.error_bias.ln()).clamp(0.0, MAX_CORRECTION_RATE)
}

/// Drives `axis` towards `target` with the joint's force ceiling.
fn drive_axis(joint: &mut GenericJoint, axis: JointAxis, target: Real, limits: &JointLimits) {
    let stiffness = MOTOR_DAMPING * correction_rate(limits);
    joint
        .set_motor_model(axis, MotorModel::ForceBased)
        .set_motor(axis, target, 0.0, stiffness, MOTOR_DAMPING)
        .set_motor_max_force(axis, limits.max_force.min(Real::MAX));
}

fn build_shape(shape: &ColliderShape) -> Result<ColliderBuilder, PhysicsError> {
    match *shape {
        ColliderShape::Box { half_extents } => {
            if !(half_extents.x > 0.0 && half_extents.y > 0.0) || !half_extents.is_finite() {
                return Err(PhysicsError::InvalidCollider(format!(
                    "box half extents must be positive, got {half_extents:?}"
                )));
            }
            Ok(ColliderBuilder::cuboid(half_extents.x, half_extents.y))
        }
        ColliderShape::Segment { a, b, radius } => {
            if !a.is_finite() || !b.is_finite() || !radius.is_finite() || radius < 0.0 {
                return Err(PhysicsError::InvalidCollider(format!(
                    "segment {a:?}-{b:?} with radius {radius} is not usable"
                )));
            }
            if radius > 0.0 {
                Ok(ColliderBuilder::capsule_from_endpoints(
                    to_rapier_point(a),
                    to_rapier_point(b),
                    radius,
                ))
            } else {
                Ok(ColliderBuilder::segment(to_rapier_point(a), to_rapier_point(b)))
            }
        }
    }
}

impl PhysicsProvider for RapierPhysicsWorld {
    fn advance(&mut self, dt: f32) -> Result<(), PhysicsError> {
        if !dt.is_finite() || dt <= 0.0 {
            return Err(PhysicsError::InvalidTimeStep(dt));
        }
        self.integration_parameters.dt = dt;
        self.physics_pipeline.step(
            &self.gravity,
            &self.integration_parameters,
            &mut self.island_manager,
            &mut self.broad_phase,
            &mut self.narrow_phase,
            &mut self.rigid_body_set,
            &mut self.collider_set,
            &mut self.impulse_joint_set,
            &mut self.multibody_joint_set,
            &mut self.ccd_solver,
            None,
            &(),
            &(),
        );
        self.steps += 1;
        self.check_finite()
    }

    fn set_gravity(&mut self, gravity: Vec2) {
        self.gravity = to_rapier_vec(gravity);
    }

    fn add_body(&mut self, desc: BodyDesc) -> BodyHandle {
        let rb_type = match desc.kind {
            BodyKind::Dynamic => RigidBodyType::Dynamic,
            BodyKind::Static => RigidBodyType::Fixed,
            BodyKind::Kinematic => RigidBodyType::KinematicVelocityBased,
        };

        let mut builder = RigidBodyBuilder::new(rb_type)
            .translation(to_rapier_vec(desc.position))
            .rotation(desc.angle)
            .can_sleep(false);
        if desc.kind == BodyKind::Dynamic {
            if desc.moment.is_finite() {
                builder = builder.additional_mass_properties(MassProperties::new(
                    point![0.0, 0.0],
                    desc.mass,
                    desc.moment,
                ));
            } else {
                builder = builder.additional_mass(desc.mass).lock_rotations();
            }
        }

        let rb_handle = self.rigid_body_set.insert(builder.build());
        let handle = BodyHandle(self.bodies.len() as u32);
        self.bodies.push(rb_handle);
        log::trace!("Added {:?} body {:?} at {:?}", desc.kind, handle, desc.position);
        handle
    }

    fn add_joint(&mut self, desc: JointDesc) -> Result<JointHandle, PhysicsError> {
        let (a, b) = desc.bodies();
        if a == b {
            return Err(PhysicsError::InvalidJoint(format!(
                "joint connects body {} to itself",
                a.0
            )));
        }
        validate_limits(desc.limits())?;
        if !self.rigid_body(a)?.is_dynamic() && !self.rigid_body(b)?.is_dynamic() {
            return Err(PhysicsError::InvalidJoint(format!(
                "bodies {} and {} cannot both be immovable",
                a.0, b.0
            )));
        }

        let mut joint = GenericJointBuilder::new(JointAxesMask::empty()).build();
        match desc {
            JointDesc::Pivot {
                anchor_a,
                anchor_b,
                limits,
                ..
            } => {
                joint
                    .set_local_anchor1(to_rapier_point(anchor_a))
                    .set_local_anchor2(to_rapier_point(anchor_b));
                drive_axis(&mut joint, JointAxis::LinX, 0.0, &limits);
                drive_axis(&mut joint, JointAxis::LinY, 0.0, &limits);
            }
            JointDesc::Gear { phase, limits, .. } => {
                drive_axis(&mut joint, JointAxis::AngX, phase, &limits);
            }
        }

        let (body1, body2) = (self.rapier_handle(a)?, self.rapier_handle(b)?);
        let joint_handle = self.impulse_joint_set.insert(body1, body2, joint, true);
        let handle = JointHandle(self.joints.len() as u32);
        self.joints.push(joint_handle);
        Ok(handle)
    }

    fn add_collider(&mut self, desc: ColliderDesc) -> Result<TetherColliderHandle, PhysicsError> {
        validate_material(&desc.material)?;
        let collider = build_shape(&desc.shape)?
            .density(0.0)
            .friction(desc.material.friction)
            .friction_combine_rule(CoefficientCombineRule::Multiply)
            .restitution(desc.material.elasticity)
            .restitution_combine_rule(CoefficientCombineRule::Multiply)
            .build();

        let collider_handle = match desc.parent {
            Some(parent) => {
                let rb_handle = self.rapier_handle(parent)?;
                self.collider_set
                    .insert_with_parent(collider, rb_handle, &mut self.rigid_body_set)
            }
            None => self.collider_set.insert(collider),
        };
        let handle = TetherColliderHandle(self.colliders.len() as u32);
        self.colliders.push(collider_handle);
        Ok(handle)
    }

    fn body_state(&self, handle: BodyHandle) -> Result<BodyState, PhysicsError> {
        let rb = self.rigid_body(handle)?;
        Ok(BodyState {
            position: from_rapier_vec(rb.translation()),
            angle: rb.rotation().angle(),
            linear_velocity: from_rapier_vec(rb.linvel()),
            angular_velocity: rb.angvel(),
        })
    }

    fn set_velocity(
        &mut self,
        handle: BodyHandle,
        linear: Vec2,
        angular: f32,
    ) -> Result<(), PhysicsError> {
        let rb_handle = self.rapier_handle(handle)?;
        let rb = self
            .rigid_body_set
            .get_mut(rb_handle)
            .ok_or(PhysicsError::UnknownBody(handle))?;
        if rb.body_type() != RigidBodyType::KinematicVelocityBased {
            return Err(PhysicsError::NotKinematic(handle));
        }
        rb.set_linvel(to_rapier_vec(linear), true);
        rb.set_angvel(angular, true);
        Ok(())
    }

    fn body_count(&self) -> usize {
        self.bodies.len()
    }
}
