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

//! Builds the scene the loop drives: an actuated pair, anchored pucks and the
//! walls around them.

use tether_core::config::{PuckConfig, SceneConfig, TankConfig, WallConfig};
use tether_core::math::Vec2;
use tether_core::physics::{
    BodyDesc, BodyHandle, ColliderDesc, ColliderHandle, JointDesc, JointHandle, JointLimits,
    PhysicsError, PhysicsProvider,
};
use tether_core::presentation::RenderSlot;

/// A kinematic control body dragging a dynamic body through a pivot and a gear.
///
/// Commands are applied to `control`. `body` follows it through the
/// force-limited joints and is what gets rendered.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ActuatedPair {
    /// The kinematic body receiving velocity commands.
    pub control: BodyHandle,
    /// The dynamic body that follows.
    pub body: BodyHandle,
    /// Linear coupling.
    pub pivot: JointHandle,
    /// Angular coupling.
    pub gear: JointHandle,
}

impl ActuatedPair {
    /// Adds both bodies, the hull's collider and both joints to `provider`.
    ///
    /// The control body has no collider, so only the hull takes contacts.
    pub fn spawn(
        provider: &mut dyn PhysicsProvider,
        config: &TankConfig,
    ) -> Result<Self, PhysicsError> {
        let control = provider.add_body(BodyDesc::kinematic(config.position));
        let body = provider.add_body(BodyDesc::dynamic_box(
            config.position,
            config.mass,
            config.size,
        ));
        provider.add_collider(
            ColliderDesc::cuboid(body, config.size).with_material(config.friction, config.elasticity),
        )?;

        let pivot = provider.add_joint(JointDesc::pivot(
            control,
            body,
            JointLimits::default()
                .with_max_bias(0.0)
                .with_max_force(config.pivot_max_force),
        ))?;
        let gear = provider.add_joint(JointDesc::gear(
            control,
            body,
            JointLimits::default()
                .with_error_bias(0.0)
                .with_max_bias(config.gear_max_bias)
                .with_max_force(config.gear_max_force),
        ))?;

        Ok(Self {
            control,
            body,
            pivot,
            gear,
        })
    }
}

/// Ties a body to the presentation slot that shows it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderBinding {
    /// Where the pose goes.
    pub slot: RenderSlot,
    /// Whose pose.
    pub body: BodyHandle,
}

/// Handles to everything [`build_rig`] created.
#[derive(Debug, Clone, PartialEq)]
pub struct Rig {
    /// The actuated pair.
    pub tank: ActuatedPair,
    /// Passive bodies, in configuration order.
    pub pucks: Vec<BodyHandle>,
    /// Slot 0 shows the tank, slots 1.. the pucks.
    pub bindings: Vec<RenderBinding>,
    /// World-attached boundary colliders, in configuration order.
    pub walls: Vec<ColliderHandle>,
}

impl Rig {
    /// The body velocity commands are applied to.
    pub fn control_body(&self) -> BodyHandle {
        self.tank.control
    }
}

fn spawn_puck(
    provider: &mut dyn PhysicsProvider,
    config: &PuckConfig,
) -> Result<BodyHandle, PhysicsError> {
    let anchor = provider.add_body(BodyDesc::fixed(config.position));
    let puck = provider.add_body(BodyDesc::dynamic_box(
        config.position,
        config.mass,
        config.size,
    ));
    provider.add_collider(
        ColliderDesc::cuboid(puck, config.size).with_material(config.friction, config.elasticity),
    )?;
    provider.add_joint(JointDesc::pivot(
        anchor,
        puck,
        JointLimits::default()
            .with_max_bias(0.0)
            .with_max_force(config.max_force),
    ))?;
    Ok(puck)
}

fn spawn_wall(
    provider: &mut dyn PhysicsProvider,
    config: &WallConfig,
) -> Result<ColliderHandle, PhysicsError> {
    provider.add_collider(
        ColliderDesc::segment(config.start, config.end, config.radius)
            .with_material(config.friction, config.elasticity),
    )
}

/// Populates `provider` from `scene` in a gravity-free world.
pub fn build_rig(
    provider: &mut dyn PhysicsProvider,
    scene: &SceneConfig,
) -> Result<Rig, PhysicsError> {
    provider.set_gravity(Vec2::ZERO);

    let tank = ActuatedPair::spawn(provider, &scene.tank)?;
    let mut bindings = vec![RenderBinding {
        slot: RenderSlot(0),
        body: tank.body,
    }];

    let mut pucks = Vec::with_capacity(scene.pucks.len());
    for (i, config) in scene.pucks.iter().enumerate() {
        let puck = spawn_puck(provider, config)?;
        bindings.push(RenderBinding {
            slot: RenderSlot(i + 1),
            body: puck,
        });
        pucks.push(puck);
    }

    let walls = scene
        .walls
        .iter()
        .map(|wall| spawn_wall(provider, wall))
        .collect::<Result<Vec<_>, _>>()?;

    log::debug!(
        "Rig built: {} bodies, {} pucks, {} walls",
        provider.body_count(),
        pucks.len(),
        walls.len()
    );
    Ok(Rig {
        tank,
        pucks,
        bindings,
        walls,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use tether_infra::RapierPhysicsWorld;

    const DT: f32 = 1.0 / 240.0;

    #[test]
    fn default_scene_layout() {
        let mut world = RapierPhysicsWorld::new();
        let rig = build_rig(&mut world, &SceneConfig::default()).unwrap();

        // control + hull + (anchor + puck)
        assert_eq!(world.body_count(), 4);
        assert_eq!(world.joint_count(), 3);
        // hull + puck + four walls
        assert_eq!(world.collider_count(), 6);
        assert_eq!(rig.walls.len(), 4);
        assert_eq!(rig.pucks.len(), 1);
        assert_eq!(rig.bindings.len(), 2);
        assert_eq!(rig.bindings[0].body, rig.tank.body);
        assert_eq!(rig.bindings[1].slot, RenderSlot(1));
        assert_eq!(rig.control_body(), rig.tank.control);

        let hull = world.body_state(rig.tank.body).unwrap();
        assert_eq!(hull.position, Vec2::new(0.1, 0.0));
        let puck = world.body_state(rig.pucks[0]).unwrap();
        assert_eq!(puck.position, Vec2::new(0.2, 0.2));
    }

    #[test]
    fn hull_follows_control_body() {
        let mut world = RapierPhysicsWorld::new();
        let rig = build_rig(&mut world, &SceneConfig::default()).unwrap();
        world
            .set_velocity(rig.tank.control, Vec2::new(0.5, 0.0), 0.0)
            .unwrap();
        for _ in 0..240 {
            world.advance(DT).unwrap();
        }
        let control = world.body_state(rig.tank.control).unwrap();
        let hull = world.body_state(rig.tank.body).unwrap();
        assert_relative_eq!(control.position.x, 0.6, epsilon = 1e-3);
        assert_relative_eq!(hull.linear_velocity.x, 0.5, epsilon = 1e-2);
        assert!(hull.position.x > 0.5);
    }

    #[test]
    fn empty_scene_has_only_the_tank() {
        let mut world = RapierPhysicsWorld::new();
        let scene = SceneConfig {
            pucks: Vec::new(),
            walls: Vec::new(),
            ..Default::default()
        };
        let rig = build_rig(&mut world, &scene).unwrap();
        assert_eq!(world.body_count(), 2);
        assert_eq!(world.collider_count(), 1);
        assert_eq!(rig.bindings.len(), 1);
        assert!(rig.walls.is_empty());
    }

    fn drive(world: &mut RapierPhysicsWorld, rig: &Rig, velocity: Vec2, steps: usize) {
        world.set_velocity(rig.tank.control, velocity, 0.0).unwrap();
        for _ in 0..steps {
            world.advance(DT).unwrap();
        }
    }

    #[test]
    fn tank_stops_at_the_right_wall() {
        let mut world = RapierPhysicsWorld::new();
        let rig = build_rig(&mut world, &SceneConfig::default()).unwrap();
        drive(&mut world, &rig, Vec2::new(2.0, 0.0), 480);

        let control = world.body_state(rig.tank.control).unwrap();
        let hull = world.body_state(rig.tank.body).unwrap();
        assert!(control.position.x > 4.0);
        // Inner face of the wall at 0.75, minus the hull's half width.
        assert!(hull.position.x < 0.75, "hull escaped to {}", hull.position.x);
        assert!(hull.position.x > 0.55, "hull stopped at {}", hull.position.x);
        assert!(hull.position.is_finite());
    }

    #[test]
    fn tank_pushes_a_puck_in_its_path() {
        let mut world = RapierPhysicsWorld::new();
        let scene = SceneConfig {
            pucks: vec![PuckConfig {
                position: Vec2::new(0.4, 0.0),
                ..Default::default()
            }],
            ..Default::default()
        };
        let rig = build_rig(&mut world, &scene).unwrap();
        drive(&mut world, &rig, Vec2::new(0.5, 0.0), 480);

        let puck = world.body_state(rig.pucks[0]).unwrap();
        let hull = world.body_state(rig.tank.body).unwrap();
        assert!(puck.position.x > 0.5, "puck stayed at {}", puck.position.x);
        assert!(hull.position.x < puck.position.x);
        assert!(puck.position.x < 0.75);
    }
}
