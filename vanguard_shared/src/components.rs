//! Component definitions and their handler registrations.
//!
//! Components are a closed tagged union keyed by [`ComponentKind`]. Each kind
//! contributes its event handlers and named inputs to the
//! [`HandlerRegistry`] in [`default_registry`]; archetypes snapshot the
//! relevant subset per composition. Key/value pairs from level data are
//! folded into staged components by [`apply_key_value`].

use tracing::debug;

use crate::archetype::{
    ComponentKind, ComponentMask, EntityEvent, EventKind, HandlerRegistry,
};
use crate::math::{Angles, Vec3};
use crate::outputs::EntityOutputEntry;
use crate::world::{EntityId, EntityWorld};

/// How far a door travels between closed and fully open, world units.
const DOOR_LIFT: f32 = 64.0;

/// World placement. `dirty` is set whenever position or angles change during
/// a simulation tick and cleared at the end of the tick.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Transform {
    pub position: Vec3,
    pub angles: Angles,
    pub dirty: bool,
}

/// Velocity integrated by the physics backend.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PhysicsBody {
    pub velocity: Vec3,
}

/// Marks an entity as a connected player's avatar.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Player {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Health {
    pub current: i32,
    pub max: i32,
}

impl Default for Health {
    fn default() -> Self {
        Self {
            current: 100,
            max: 100,
        }
    }
}

/// A lift-style door. `progress` runs 0 (closed) to 1 (open).
#[derive(Debug, Clone, PartialEq)]
pub struct Door {
    /// Fraction of full travel per second.
    pub speed: f32,
    pub open: bool,
    pub progress: f32,
}

impl Default for Door {
    fn default() -> Self {
        Self {
            speed: 1.0,
            open: false,
            progress: 0.0,
        }
    }
}

/// A scripted trigger volume. Disabled triggers ignore `Trigger.Fire`.
#[derive(Debug, Clone, PartialEq)]
pub struct Trigger {
    pub enabled: bool,
}

impl Default for Trigger {
    fn default() -> Self {
        Self { enabled: true }
    }
}

/// Targetname other entities address outputs at.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Name(pub String);

/// Scripted output links, sorted ascending by delay.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct OutputList {
    pub entries: Vec<EntityOutputEntry>,
}

/// Tagged-union component storage.
#[derive(Debug, Clone, PartialEq)]
pub enum Component {
    Transform(Transform),
    PhysicsBody(PhysicsBody),
    Player(Player),
    Health(Health),
    Door(Door),
    Trigger(Trigger),
    Name(Name),
    Outputs(OutputList),
}

impl Component {
    pub fn kind(&self) -> ComponentKind {
        match self {
            Component::Transform(_) => ComponentKind::Transform,
            Component::PhysicsBody(_) => ComponentKind::PhysicsBody,
            Component::Player(_) => ComponentKind::Player,
            Component::Health(_) => ComponentKind::Health,
            Component::Door(_) => ComponentKind::Door,
            Component::Trigger(_) => ComponentKind::Trigger,
            Component::Name(_) => ComponentKind::Name,
            Component::Outputs(_) => ComponentKind::Outputs,
        }
    }
}

/// Folds one level key/value pair into a staged component list.
/// Returns false for unrecognized keys, which the builder ignores.
pub fn apply_key_value(staged: &mut Vec<Component>, key: &str, value: &str) -> bool {
    fn ensure<'a>(staged: &'a mut Vec<Component>, kind: ComponentKind, make: fn() -> Component) -> &'a mut Component {
        if let Some(pos) = staged.iter().position(|c| c.kind() == kind) {
            return &mut staged[pos];
        }
        staged.push(make());
        staged.last_mut().unwrap()
    }

    match key {
        "origin" => {
            if let Component::Transform(t) =
                ensure(staged, ComponentKind::Transform, || Component::Transform(Transform::default()))
            {
                t.position = Vec3::parse_triple(value);
            }
            true
        }
        "angles" => {
            if let Component::Transform(t) =
                ensure(staged, ComponentKind::Transform, || Component::Transform(Transform::default()))
            {
                let v = Vec3::parse_triple(value);
                t.angles = Angles::new(v.x, v.y, v.z);
            }
            true
        }
        "targetname" => {
            staged.retain(|c| c.kind() != ComponentKind::Name);
            staged.push(Component::Name(Name(value.to_string())));
            true
        }
        "health" => {
            let amount = value.parse::<i32>().unwrap_or(100);
            staged.retain(|c| c.kind() != ComponentKind::Health);
            staged.push(Component::Health(Health {
                current: amount,
                max: amount,
            }));
            true
        }
        "speed" => {
            if let Component::Door(d) =
                ensure(staged, ComponentKind::Door, || Component::Door(Door::default()))
            {
                d.speed = value.parse::<f32>().unwrap_or(1.0);
            }
            true
        }
        "outputs" => {
            let parsed = EntityOutputEntry::parse_outputs(value);
            if let Component::Outputs(list) =
                ensure(staged, ComponentKind::Outputs, || Component::Outputs(OutputList::default()))
            {
                list.entries.extend(parsed);
                list.entries.sort_by(|a, b| a.delay.total_cmp(&b.delay));
            }
            true
        }
        _ => false,
    }
}

// ─── Event handlers ───

fn player_spawned(world: &mut EntityWorld, id: EntityId, _ev: &EntityEvent) -> bool {
    if let Some(name) = world.entity(id).and_then(|e| e.player()).map(|p| p.name.clone()) {
        debug!(entity = ?id, player = %name, "player entity spawned");
    }
    true
}

fn door_server_update(world: &mut EntityWorld, id: EntityId, ev: &EntityEvent) -> bool {
    let dt = match ev {
        EntityEvent::ServerUpdate { dt } => *dt,
        _ => return false,
    };

    let delta = {
        let Some(door) = world.entity_mut(id).and_then(|e| e.door_mut()) else {
            return false;
        };
        let before = door.progress;
        if door.open {
            door.progress = (door.progress + door.speed * dt).min(1.0);
        } else {
            door.progress = (door.progress - door.speed * dt).max(0.0);
        }
        (door.progress - before) * DOOR_LIFT
    };

    if delta != 0.0 {
        if let Some(t) = world.entity_mut(id).and_then(|e| e.transform_mut()) {
            t.position.z += delta;
            t.dirty = true;
        }
    }
    true
}

fn door_transform_changed(world: &mut EntityWorld, id: EntityId, _ev: &EntityEvent) -> bool {
    if let Some(door) = world.entity(id).and_then(|e| e.door()) {
        debug!(entity = ?id, progress = door.progress, "door moved");
    }
    true
}

fn door_map_loaded(world: &mut EntityWorld, id: EntityId, _ev: &EntityEvent) -> bool {
    // Doors start a round closed regardless of editor state.
    if let Some(door) = world.entity_mut(id).and_then(|e| e.door_mut()) {
        door.open = false;
        door.progress = 0.0;
        return true;
    }
    false
}

fn trigger_map_loaded(world: &mut EntityWorld, id: EntityId, _ev: &EntityEvent) -> bool {
    if let Some(trigger) = world.entity_mut(id).and_then(|e| e.trigger_mut()) {
        trigger.enabled = true;
        return true;
    }
    false
}

// ─── Named inputs ───

fn door_open(world: &mut EntityWorld, id: EntityId, _param: Option<&str>) -> bool {
    let newly_opened = match world.entity_mut(id).and_then(|e| e.door_mut()) {
        Some(door) if !door.open => {
            door.open = true;
            true
        }
        Some(_) => false,
        None => return false,
    };
    if newly_opened {
        world.fire_entity_outputs(id);
    }
    true
}

fn door_close(world: &mut EntityWorld, id: EntityId, _param: Option<&str>) -> bool {
    match world.entity_mut(id).and_then(|e| e.door_mut()) {
        Some(door) => {
            door.open = false;
            true
        }
        None => false,
    }
}

fn door_toggle(world: &mut EntityWorld, id: EntityId, param: Option<&str>) -> bool {
    let open = match world.entity(id).and_then(|e| e.door()) {
        Some(door) => door.open,
        None => return false,
    };
    if open {
        door_close(world, id, param)
    } else {
        door_open(world, id, param)
    }
}

fn trigger_enable(world: &mut EntityWorld, id: EntityId, _param: Option<&str>) -> bool {
    match world.entity_mut(id).and_then(|e| e.trigger_mut()) {
        Some(t) => {
            t.enabled = true;
            true
        }
        None => false,
    }
}

fn trigger_disable(world: &mut EntityWorld, id: EntityId, _param: Option<&str>) -> bool {
    match world.entity_mut(id).and_then(|e| e.trigger_mut()) {
        Some(t) => {
            t.enabled = false;
            true
        }
        None => false,
    }
}

fn trigger_fire(world: &mut EntityWorld, id: EntityId, _param: Option<&str>) -> bool {
    let enabled = match world.entity(id).and_then(|e| e.trigger()) {
        Some(t) => t.enabled,
        None => return false,
    };
    if enabled {
        world.fire_entity_outputs(id);
    }
    enabled
}

fn health_hurt(world: &mut EntityWorld, id: EntityId, param: Option<&str>) -> bool {
    let damage = param.and_then(|p| p.parse::<i32>().ok()).unwrap_or(10);
    match world.entity_mut(id).and_then(|e| e.health_mut()) {
        Some(h) => {
            h.current = (h.current - damage).max(0);
            true
        }
        None => false,
    }
}

fn health_set(world: &mut EntityWorld, id: EntityId, param: Option<&str>) -> bool {
    let Some(amount) = param.and_then(|p| p.parse::<i32>().ok()) else {
        return false;
    };
    match world.entity_mut(id).and_then(|e| e.health_mut()) {
        Some(h) => {
            h.current = amount.clamp(0, h.max);
            true
        }
        None => false,
    }
}

/// Builds the registry every [`EntityWorld`] starts from.
pub fn default_registry() -> HandlerRegistry {
    let mut reg = HandlerRegistry::new();

    reg.on_event(ComponentKind::Player, EventKind::Spawned, player_spawned);
    reg.on_event(ComponentKind::Door, EventKind::ServerUpdate, door_server_update);
    reg.on_event(
        ComponentKind::Door,
        EventKind::TransformChanged,
        door_transform_changed,
    );

    reg.on_group_event(ComponentKind::Door, EventKind::MapLoaded, door_map_loaded);
    reg.on_group_event(ComponentKind::Trigger, EventKind::MapLoaded, trigger_map_loaded);

    reg.on_named_input("Door.Open", door_open);
    reg.on_named_input("Door.Close", door_close);
    reg.on_named_input("Door.Toggle", door_toggle);
    reg.on_named_input("Trigger.Enable", trigger_enable);
    reg.on_named_input("Trigger.Disable", trigger_disable);
    reg.on_named_input("Trigger.Fire", trigger_fire);
    reg.on_named_input("Health.Hurt", health_hurt);
    reg.on_named_input("Health.SetHealth", health_set);

    reg
}

/// Mask helper for a staged component list.
pub fn mask_of(components: &[Component]) -> ComponentMask {
    components
        .iter()
        .fold(ComponentMask::empty(), |m, c| m | c.kind().mask())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_values_fold_into_components() {
        let mut staged = Vec::new();
        assert!(apply_key_value(&mut staged, "origin", "1 2 3"));
        assert!(apply_key_value(&mut staged, "angles", "0 90 0"));
        assert!(apply_key_value(&mut staged, "targetname", "exit_door"));
        assert!(!apply_key_value(&mut staged, "rendercolor", "255 255 255"));

        // origin and angles merge into a single transform
        assert_eq!(staged.len(), 2);
        let mask = mask_of(&staged);
        assert!(mask.contains(ComponentMask::TRANSFORM));
        assert!(mask.contains(ComponentMask::NAME));
    }

    #[test]
    fn outputs_key_parses_and_sorts() {
        let mut staged = Vec::new();
        apply_key_value(&mut staged, "outputs", "a,Foo.Bar,1.0;b,Baz.Qux,0.2");
        let Component::Outputs(list) = &staged[0] else {
            panic!("expected outputs");
        };
        assert_eq!(list.entries[0].delay, 0.2);
        assert_eq!(list.entries[1].delay, 1.0);
    }
}
