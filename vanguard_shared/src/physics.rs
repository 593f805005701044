//! Physics abstraction.
//!
//! The simulation treats physics as a black box: step the world by dt,
//! ask for raycasts. Engine integration lives behind this trait.

use crate::archetype::ComponentKind;
use crate::math::Vec3;
use crate::world::{EntityId, EntityWorld};

/// Result of a raycast query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RaycastHit {
    pub entity: EntityId,
    pub point: Vec3,
    pub distance: f32,
}

/// Physics stepper trait.
pub trait PhysicsBackend: Send {
    /// Advances all physical bodies by `dt_sec`, marking moved transforms
    /// dirty.
    fn step(&mut self, world: &mut EntityWorld, dt_sec: f32);

    /// Casts a ray; the default backend has no collision geometry.
    fn raycast(&self, _world: &EntityWorld, _from: Vec3, _dir: Vec3) -> Option<RaycastHit> {
        None
    }
}

/// No-op physics.
#[derive(Default)]
pub struct NullPhysics;

impl PhysicsBackend for NullPhysics {
    fn step(&mut self, _world: &mut EntityWorld, _dt_sec: f32) {}
}

/// Collision-free integrator: position += velocity * dt.
#[derive(Default)]
pub struct LinearPhysics;

impl PhysicsBackend for LinearPhysics {
    fn step(&mut self, world: &mut EntityWorld, dt_sec: f32) {
        for id in world.ids_with(ComponentKind::PhysicsBody) {
            let velocity = match world.entity(id).and_then(|e| e.physics_body()) {
                Some(body) if body.velocity.len_sq() > 0.0 => body.velocity,
                _ => continue,
            };
            if let Some(t) = world.entity_mut(id).and_then(|e| e.transform_mut()) {
                t.position = t.position.add(velocity.scale(dt_sec));
                t.dirty = true;
            }
        }
    }
}
