//! The live simulation store.
//!
//! `EntityWorld` owns a growable slot table of entities. Construction is
//! staged: reserve a slot, attach components (typed or from level key/value
//! pairs), freeze the composition into an archetype, then fire spawn
//! callbacks. Slots are recycled after despawn, so ids are unique only while
//! an entity is alive.
//!
//! The world is exclusively owned by the server's update thread; nothing
//! here is shared or locked.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::archetype::{
    Archetype, ArchetypeCache, ComponentKind, ComponentMask, Dispatch, EntityEvent, EventKind,
    HandlerRegistry,
};
use crate::components::{
    apply_key_value, default_registry, mask_of, Component, Door, Health, Name, OutputList,
    PhysicsBody, Player, Transform, Trigger,
};

/// Slot index into the world's entity table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityId(pub u32);

/// One simulation object: an id, its components, and its archetype.
pub struct Entity {
    id: EntityId,
    components: Vec<Component>,
    archetype: Arc<Archetype>,
}

macro_rules! component_accessors {
    ($get:ident, $get_mut:ident, $variant:ident, $ty:ty) => {
        pub fn $get(&self) -> Option<&$ty> {
            self.components.iter().find_map(|c| match c {
                Component::$variant(v) => Some(v),
                _ => None,
            })
        }

        pub fn $get_mut(&mut self) -> Option<&mut $ty> {
            self.components.iter_mut().find_map(|c| match c {
                Component::$variant(v) => Some(v),
                _ => None,
            })
        }
    };
}

impl Entity {
    pub fn id(&self) -> EntityId {
        self.id
    }

    pub fn mask(&self) -> ComponentMask {
        self.archetype.mask()
    }

    pub fn archetype(&self) -> &Arc<Archetype> {
        &self.archetype
    }

    pub fn component(&self, kind: ComponentKind) -> Option<&Component> {
        self.components.iter().find(|c| c.kind() == kind)
    }

    component_accessors!(transform, transform_mut, Transform, Transform);
    component_accessors!(physics_body, physics_body_mut, PhysicsBody, PhysicsBody);
    component_accessors!(player, player_mut, Player, Player);
    component_accessors!(health, health_mut, Health, Health);
    component_accessors!(door, door_mut, Door, Door);
    component_accessors!(trigger, trigger_mut, Trigger, Trigger);
    component_accessors!(name, name_mut, Name, Name);
    component_accessors!(outputs, outputs_mut, Outputs, OutputList);
}

/// A scripted output waiting for its delay to elapse.
#[derive(Debug, Clone)]
struct PendingOutput {
    target: String,
    input: String,
    parameter: Option<String>,
    remaining: f32,
}

/// The entity table plus archetype cache and scripted-output queue.
pub struct EntityWorld {
    slots: Vec<Option<Entity>>,
    free: Vec<u32>,
    archetypes: ArchetypeCache,
    registry: Arc<HandlerRegistry>,
    pending_outputs: Vec<PendingOutput>,
    unknown_input: Box<dyn Fn(&str) + Send + Sync>,
}

impl Default for EntityWorld {
    fn default() -> Self {
        Self::new()
    }
}

impl EntityWorld {
    /// A world wired to the default component registry.
    pub fn new() -> Self {
        Self::with_registry(default_registry())
    }

    pub fn with_registry(registry: HandlerRegistry) -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            archetypes: ArchetypeCache::default(),
            registry: Arc::new(registry),
            pending_outputs: Vec::new(),
            unknown_input: Box::new(|name| {
                warn!(input = %name, "no handler registered for named input");
            }),
        }
    }

    /// Replaces the unknown-named-input warning callback.
    pub fn set_unknown_input_warning(&mut self, cb: impl Fn(&str) + Send + Sync + 'static) {
        self.unknown_input = Box::new(cb);
    }

    /// Reserves a slot and starts staged construction.
    pub fn build(&mut self) -> EntityBuilder<'_> {
        let index = match self.free.pop() {
            Some(i) => i,
            None => {
                self.slots.push(None);
                (self.slots.len() - 1) as u32
            }
        };
        EntityBuilder {
            world: self,
            id: EntityId(index),
            components: Vec::new(),
        }
    }

    pub fn entity(&self, id: EntityId) -> Option<&Entity> {
        self.slots.get(id.0 as usize).and_then(Option::as_ref)
    }

    pub fn entity_mut(&mut self, id: EntityId) -> Option<&mut Entity> {
        self.slots.get_mut(id.0 as usize).and_then(Option::as_mut)
    }

    /// Live entity count.
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn archetype_count(&self) -> usize {
        self.archetypes.len()
    }

    /// Ids of all live entities, in stable slot order.
    pub fn ids(&self) -> Vec<EntityId> {
        self.slots
            .iter()
            .filter_map(|s| s.as_ref().map(|e| e.id))
            .collect()
    }

    /// Ids of live entities carrying `kind`, in stable slot order.
    pub fn ids_with(&self, kind: ComponentKind) -> Vec<EntityId> {
        self.slots
            .iter()
            .filter_map(|s| s.as_ref())
            .filter(|e| e.mask().contains(kind.mask()))
            .map(|e| e.id)
            .collect()
    }

    /// Ids of entities whose targetname matches.
    pub fn find_by_name(&self, name: &str) -> Vec<EntityId> {
        self.slots
            .iter()
            .filter_map(|s| s.as_ref())
            .filter(|e| e.name().map(|n| n.0 == name).unwrap_or(false))
            .map(|e| e.id)
            .collect()
    }

    /// Fires a typed event on one entity through its archetype table.
    /// A missing entity or an empty handler list is a no-op.
    pub fn dispatch(&mut self, id: EntityId, event: &EntityEvent) -> Dispatch {
        let archetype = match self.entity(id) {
            Some(e) => Arc::clone(&e.archetype),
            None => return Dispatch::Unhandled,
        };
        let mut handled = false;
        for func in archetype.handlers_for(event.kind()) {
            handled |= func(self, id, event);
        }
        if handled {
            Dispatch::Handled
        } else {
            Dispatch::Unhandled
        }
    }

    /// Fires a typed event on every live entity.
    pub fn dispatch_to_all(&mut self, event: &EntityEvent) {
        for id in self.ids() {
            self.dispatch(id, event);
        }
    }

    /// Fires a group/world event through the per-component-kind query
    /// handlers. Entities spawned after registry construction are reached
    /// because membership is queried at dispatch time.
    pub fn dispatch_group(&mut self, event: &EntityEvent) {
        let registry = Arc::clone(&self.registry);
        for entry in registry.group_handlers() {
            if entry.event != event.kind() {
                continue;
            }
            for id in self.ids_with(entry.component) {
                (entry.func)(self, id, event);
            }
        }
    }

    /// Resolves a `"Component.Input"` name through the switch table and
    /// fires it on every entity named `target`. Unknown names invoke the
    /// warning callback and return false.
    pub fn fire_named_input(
        &mut self,
        target: &str,
        input: &str,
        parameter: Option<&str>,
    ) -> bool {
        let Some(func) = self.registry.named_input(input) else {
            (self.unknown_input)(input);
            return false;
        };
        let targets = self.find_by_name(target);
        if targets.is_empty() {
            debug!(target = %target, input = %input, "named input target not found");
            return false;
        }
        let mut handled = false;
        for id in targets {
            handled |= func(self, id, parameter);
        }
        handled
    }

    /// Schedules the entity's scripted outputs, honoring their delays.
    pub fn fire_entity_outputs(&mut self, id: EntityId) {
        let entries = match self.entity(id).and_then(|e| e.outputs()) {
            Some(list) => list.entries.clone(),
            None => return,
        };
        for entry in entries {
            self.pending_outputs.push(PendingOutput {
                target: entry.target,
                input: entry.input,
                parameter: entry.parameter,
                remaining: entry.delay,
            });
        }
    }

    /// Advances scheduled outputs by `dt` and delivers the due ones.
    pub fn service_outputs(&mut self, dt: f32) {
        for p in &mut self.pending_outputs {
            p.remaining -= dt;
        }
        let mut due = Vec::new();
        self.pending_outputs.retain(|p| {
            if p.remaining <= 0.0 {
                due.push(p.clone());
                false
            } else {
                true
            }
        });
        for p in due {
            self.fire_named_input(&p.target, &p.input, p.parameter.as_deref());
        }
    }

    pub fn pending_output_count(&self) -> usize {
        self.pending_outputs.len()
    }

    /// Ids whose transform was dirtied this tick, in stable slot order.
    pub fn dirty_ids(&self) -> Vec<EntityId> {
        self.slots
            .iter()
            .filter_map(|s| s.as_ref())
            .filter(|e| e.transform().map(|t| t.dirty).unwrap_or(false))
            .map(|e| e.id)
            .collect()
    }

    /// Clears all transform dirty flags. Must run after the listener
    /// dispatch so no change is missed or double-counted.
    pub fn clear_dirty_flags(&mut self) {
        for slot in self.slots.iter_mut().filter_map(Option::as_mut) {
            if let Some(t) = slot.transform_mut() {
                t.dirty = false;
            }
        }
    }

    /// Despawns an entity: pre-destroy notification, slot reclaim, then the
    /// post-destroy notification (handlers see only the id).
    pub fn despawn(&mut self, id: EntityId) -> bool {
        if self.entity(id).is_none() {
            return false;
        }
        self.dispatch(id, &EntityEvent::Despawning);

        // A Despawning handler may already have removed the entity.
        let Some(entity) = self.slots.get_mut(id.0 as usize).and_then(Option::take) else {
            return true;
        };
        self.free.push(id.0);

        let archetype = entity.archetype;
        for func in archetype.handlers_for(EventKind::Despawned) {
            func(self, id, &EntityEvent::Despawned);
        }
        true
    }
}

/// Staged entity construction: reserve → compose → classify → spawn.
pub struct EntityBuilder<'w> {
    world: &'w mut EntityWorld,
    id: EntityId,
    components: Vec<Component>,
}

impl<'w> EntityBuilder<'w> {
    /// The reserved id; stable through `spawn`.
    pub fn id(&self) -> EntityId {
        self.id
    }

    /// Attaches a component, replacing any staged one of the same kind.
    pub fn with(mut self, component: Component) -> Self {
        self.components.retain(|c| c.kind() != component.kind());
        self.components.push(component);
        self
    }

    /// Folds a level key/value pair into the staged components.
    /// Unrecognized keys are logged and ignored.
    pub fn with_key_value(mut self, key: &str, value: &str) -> Self {
        if !apply_key_value(&mut self.components, key, value) {
            debug!(key = %key, value = %value, "ignoring unknown entity key");
        }
        self
    }

    /// Classifies the composition into an archetype, makes the entity live,
    /// and fires spawn callbacks in registration order.
    pub fn spawn(self) -> EntityId {
        let mask = mask_of(&self.components);
        let world = self.world;
        let archetype = world.archetypes.classify(mask, &world.registry);

        world.slots[self.id.0 as usize] = Some(Entity {
            id: self.id,
            components: self.components,
            archetype,
        });
        world.dispatch(self.id, &EntityEvent::Spawned);
        self.id
    }

    /// Releases the reserved slot without spawning.
    pub fn cancel(self) {
        self.world.free.push(self.id.0);
    }
}
