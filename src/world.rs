use glam::Vec3;
use std::collections::{HashMap, HashSet};

use crate::registry::class_name_hash;

/// Stable index into the host's entity store.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Entity(pub i32);

/// Component type id, derived from the registered type name.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ComponentType(u32);

impl ComponentType {
    pub fn named(name: &str) -> Self {
        Self(class_name_hash(name))
    }
}

/// Opaque component reference handed back to the host. Numerically identical
/// to the owning entity index.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ComponentHandle(pub i32);

impl ComponentHandle {
    pub const INVALID: ComponentHandle = ComponentHandle(-1);

    pub fn is_valid(self) -> bool {
        self.0 >= 0
    }

    pub fn entity(self) -> Entity {
        Entity(self.0)
    }
}

/// Minimal stand-in for the host entity/component registry: entity positions
/// plus component membership bookkeeping. Everything else the host world does
/// is outside this crate.
#[derive(Default)]
pub struct World {
    positions: HashMap<Entity, Vec3>,
    components: HashSet<(Entity, ComponentType)>,
}

impl World {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_position(&mut self, entity: Entity, position: Vec3) {
        self.positions.insert(entity, position);
    }

    pub fn position(&self, entity: Entity) -> Option<Vec3> {
        self.positions.get(&entity).copied()
    }

    pub fn add_component(&mut self, entity: Entity, ty: ComponentType) {
        self.components.insert((entity, ty));
    }

    pub fn destroy_component(&mut self, entity: Entity, ty: ComponentType) {
        self.components.remove(&(entity, ty));
    }

    pub fn has_component(&self, entity: Entity, ty: ComponentType) -> bool {
        self.components.contains(&(entity, ty))
    }
}
