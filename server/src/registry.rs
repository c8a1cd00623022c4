//! Authoritative id → entity map with deferred removal.
//!
//! Removal is two-phase: [`EntityRegistry::mark_for_removal`] only queues an id,
//! and [`EntityRegistry::flush_removals`] purges the queue once per tick after
//! collision resolution. Between those points a marked entity is still
//! present, so every id looked up during the tick resolves consistently.

use crate::entity::Entity;
use shared::{EntityKind, EntityView};
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug)]
pub struct EntityRegistry {
    entities: BTreeMap<u32, Entity>,
    pending_removal: BTreeSet<u32>,
    next_id: u32,
}

impl EntityRegistry {
    pub fn new() -> Self {
        Self {
            entities: BTreeMap::new(),
            pending_removal: BTreeSet::new(),
            next_id: 1,
        }
    }

    /// Hands out the next id. Ids are never reused within one registry.
    pub fn allocate(&mut self) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    /// Inserts an entity under the id it was built with, which must come
    /// from [`EntityRegistry::allocate`].
    pub fn add(&mut self, entity: Entity) {
        debug_assert!(
            !self.entities.contains_key(&entity.id),
            "entity id {} registered twice",
            entity.id
        );
        self.entities.insert(entity.id, entity);
    }

    pub fn get(&self, id: u32) -> Option<&Entity> {
        self.entities.get(&id)
    }

    pub fn get_mut(&mut self, id: u32) -> Option<&mut Entity> {
        self.entities.get_mut(&id)
    }

    pub fn contains(&self, id: u32) -> bool {
        self.entities.contains_key(&id)
    }

    /// Queues `id` for the next flush. Unknown ids and repeats are ignored.
    pub fn mark_for_removal(&mut self, id: u32) {
        if self.entities.contains_key(&id) {
            self.pending_removal.insert(id);
        }
    }

    pub fn is_pending_removal(&self, id: u32) -> bool {
        self.pending_removal.contains(&id)
    }

    /// True when the entity exists and is not already on its way out.
    pub fn is_live(&self, id: u32) -> bool {
        self.contains(id) && !self.is_pending_removal(id)
    }

    /// Applies every queued removal and returns the ids that were purged.
    pub fn flush_removals(&mut self) -> Vec<u32> {
        std::mem::take(&mut self.pending_removal)
            .into_iter()
            .filter(|id| self.entities.remove(id).is_some())
            .collect()
    }

    /// Ids in ascending order, which is also snapshot order.
    pub fn ids(&self) -> Vec<u32> {
        self.entities.keys().copied().collect()
    }

    /// Live ids of the given kind, ascending.
    pub fn live_ids_of(&self, kind: EntityKind) -> Vec<u32> {
        self.entities
            .values()
            .filter(|e| e.kind() == kind && !self.pending_removal.contains(&e.id))
            .map(|e| e.id)
            .collect()
    }

    /// Every entity, pending removals included.
    pub fn iter(&self) -> impl Iterator<Item = &Entity> {
        self.entities.values()
    }

    /// Owned copy of every entity for broadcasting.
    pub fn snapshot(&self) -> Vec<EntityView> {
        self.entities.values().map(Entity::view).collect()
    }

    /// Entity count, pending removals included.
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}

impl Default for EntityRegistry {
    fn default() -> Self {
        Self::new()
    }
}
