//! Archetype classification and event dispatch.
//!
//! Entities are composed from components at build time; their component set
//! is encoded as a bitmask. All entities sharing a bit-identical mask share
//! one `Archetype` instance, which carries the precomputed table from event
//! kind to the handlers contributed by its components. Firing an event on an
//! entity is therefore a table walk, with no per-call inspection of the
//! component list and no reflection.
//!
//! Handlers are plain function pointers registered once per component kind
//! at registry construction. Group events skip the per-entity tables and run
//! per-component-kind queries over live entities, so instances created after
//! the registry was built are still reached.

use std::collections::HashMap;
use std::sync::Arc;

use bitflags::bitflags;

use crate::world::{EntityId, EntityWorld};

/// Component kinds an entity can be composed from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComponentKind {
    Transform,
    PhysicsBody,
    Player,
    Health,
    Door,
    Trigger,
    Name,
    Outputs,
}

impl ComponentKind {
    pub const ALL: [ComponentKind; 8] = [
        ComponentKind::Transform,
        ComponentKind::PhysicsBody,
        ComponentKind::Player,
        ComponentKind::Health,
        ComponentKind::Door,
        ComponentKind::Trigger,
        ComponentKind::Name,
        ComponentKind::Outputs,
    ];

    pub fn mask(self) -> ComponentMask {
        match self {
            ComponentKind::Transform => ComponentMask::TRANSFORM,
            ComponentKind::PhysicsBody => ComponentMask::PHYSICS_BODY,
            ComponentKind::Player => ComponentMask::PLAYER,
            ComponentKind::Health => ComponentMask::HEALTH,
            ComponentKind::Door => ComponentMask::DOOR,
            ComponentKind::Trigger => ComponentMask::TRIGGER,
            ComponentKind::Name => ComponentMask::NAME,
            ComponentKind::Outputs => ComponentMask::OUTPUTS,
        }
    }
}

bitflags! {
    /// Bit-encoded component composition of one entity.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ComponentMask: u32 {
        const TRANSFORM    = 1 << 0;
        const PHYSICS_BODY = 1 << 1;
        const PLAYER       = 1 << 2;
        const HEALTH       = 1 << 3;
        const DOOR         = 1 << 4;
        const TRIGGER      = 1 << 5;
        const NAME         = 1 << 6;
        const OUTPUTS      = 1 << 7;
    }
}

/// Event identity used as the dispatch-table key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Spawned,
    Despawning,
    Despawned,
    ServerUpdate,
    TransformChanged,
    MapLoaded,
}

/// Typed event payload delivered to handlers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EntityEvent {
    /// Fired once when the builder finishes, in handler-registration order.
    Spawned,
    /// Fired immediately before the entity slot is reclaimed.
    Despawning,
    /// Fired after the slot is reclaimed; the entity is gone, only the id
    /// remains valid for external teardown.
    Despawned,
    /// One fixed simulation step.
    ServerUpdate { dt: f32 },
    /// The entity's transform was dirtied during this tick.
    TransformChanged,
    /// Group event: the level finished loading.
    MapLoaded,
}

impl EntityEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            EntityEvent::Spawned => EventKind::Spawned,
            EntityEvent::Despawning => EventKind::Despawning,
            EntityEvent::Despawned => EventKind::Despawned,
            EntityEvent::ServerUpdate { .. } => EventKind::ServerUpdate,
            EntityEvent::TransformChanged => EventKind::TransformChanged,
            EntityEvent::MapLoaded => EventKind::MapLoaded,
        }
    }
}

/// Outcome of a dispatch call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    Handled,
    Unhandled,
}

/// Handler bound to a component kind. Receives the owning world so it can
/// reach its component data and mutate neighbours.
pub type EventHandlerFn = fn(&mut EntityWorld, EntityId, &EntityEvent) -> bool;

/// Handler for a string-keyed entity input (`"Component.Input"`).
pub type NamedInputFn = fn(&mut EntityWorld, EntityId, Option<&str>) -> bool;

struct HandlerEntry {
    component: ComponentKind,
    event: EventKind,
    func: EventHandlerFn,
}

/// Per-component-kind handler for group/world events.
pub struct GroupEntry {
    pub component: ComponentKind,
    pub event: EventKind,
    pub func: EventHandlerFn,
}

/// All handlers known to the world, collected once at start-up.
///
/// This is the registration step that replaces generated dispatch code: each
/// component kind contributes its handlers here, and archetypes snapshot the
/// relevant subset when first built.
#[derive(Default)]
pub struct HandlerRegistry {
    entity_handlers: Vec<HandlerEntry>,
    group_handlers: Vec<GroupEntry>,
    named_inputs: HashMap<&'static str, NamedInputFn>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a per-entity handler for `component` on `event`.
    pub fn on_event(&mut self, component: ComponentKind, event: EventKind, func: EventHandlerFn) {
        self.entity_handlers.push(HandlerEntry {
            component,
            event,
            func,
        });
    }

    /// Registers a group handler: runs for every live entity carrying
    /// `component` when the group event fires.
    pub fn on_group_event(
        &mut self,
        component: ComponentKind,
        event: EventKind,
        func: EventHandlerFn,
    ) {
        self.group_handlers.push(GroupEntry {
            component,
            event,
            func,
        });
    }

    /// Registers a string-keyed input. Names follow `"Component.Input"`.
    pub fn on_named_input(&mut self, name: &'static str, func: NamedInputFn) {
        self.named_inputs.insert(name, func);
    }

    pub fn named_input(&self, name: &str) -> Option<NamedInputFn> {
        self.named_inputs.get(name).copied()
    }

    pub fn group_handlers(&self) -> &[GroupEntry] {
        &self.group_handlers
    }

    /// Builds the dispatch table for one component composition.
    fn build_tables(&self, mask: ComponentMask) -> HashMap<EventKind, Vec<EventHandlerFn>> {
        let mut tables: HashMap<EventKind, Vec<EventHandlerFn>> = HashMap::new();
        for entry in &self.entity_handlers {
            if mask.contains(entry.component.mask()) {
                tables.entry(entry.event).or_default().push(entry.func);
            }
        }
        tables
    }
}

/// A deduplicated component-composition class with precomputed dispatch
/// tables. Entities hold an `Arc` to their archetype; two entities share the
/// same instance iff their masks are bit-identical.
pub struct Archetype {
    mask: ComponentMask,
    tables: HashMap<EventKind, Vec<EventHandlerFn>>,
}

impl Archetype {
    pub fn mask(&self) -> ComponentMask {
        self.mask
    }

    /// Handlers for one event kind, in registration order.
    pub fn handlers_for(&self, kind: EventKind) -> &[EventHandlerFn] {
        self.tables.get(&kind).map(Vec::as_slice).unwrap_or(&[])
    }
}

/// Cache of archetypes keyed by exact mask.
#[derive(Default)]
pub struct ArchetypeCache {
    by_mask: HashMap<u32, Arc<Archetype>>,
}

impl ArchetypeCache {
    /// Returns the archetype for `mask`, building its tables on first
    /// encounter of a novel composition.
    pub fn classify(&mut self, mask: ComponentMask, registry: &HandlerRegistry) -> Arc<Archetype> {
        self.by_mask
            .entry(mask.bits())
            .or_insert_with(|| {
                Arc::new(Archetype {
                    mask,
                    tables: registry.build_tables(mask),
                })
            })
            .clone()
    }

    pub fn len(&self) -> usize {
        self.by_mask.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_mask.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop(_: &mut EntityWorld, _: EntityId, _: &EntityEvent) -> bool {
        true
    }

    #[test]
    fn identical_masks_share_one_archetype() {
        let registry = HandlerRegistry::new();
        let mut cache = ArchetypeCache::default();
        let mask = ComponentMask::TRANSFORM | ComponentMask::DOOR;

        let a = cache.classify(mask, &registry);
        let b = cache.classify(ComponentMask::DOOR | ComponentMask::TRANSFORM, &registry);
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn differing_masks_get_distinct_archetypes() {
        let registry = HandlerRegistry::new();
        let mut cache = ArchetypeCache::default();
        let a = cache.classify(ComponentMask::TRANSFORM, &registry);
        let b = cache.classify(ComponentMask::TRANSFORM | ComponentMask::NAME, &registry);
        assert!(!Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn tables_only_include_attached_components() {
        let mut registry = HandlerRegistry::new();
        registry.on_event(ComponentKind::Door, EventKind::ServerUpdate, noop);
        registry.on_event(ComponentKind::Trigger, EventKind::ServerUpdate, noop);

        let mut cache = ArchetypeCache::default();
        let arch = cache.classify(ComponentMask::DOOR, &registry);
        assert_eq!(arch.handlers_for(EventKind::ServerUpdate).len(), 1);
        assert!(arch.handlers_for(EventKind::Spawned).is_empty());
    }
}
