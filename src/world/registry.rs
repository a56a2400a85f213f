//! Local mirror of server entities
//!
//! Owns every [`EntityState`] by id and keeps a paint order alongside it.
//! Paint order is a `BTreeMap` keyed by a signed counter: foreground kinds
//! take increasing keys (appended on top), background kinds take decreasing
//! keys (slid underneath). Insert and remove are O(log n), lookup is O(1).

use std::collections::BTreeMap;

use hashbrown::HashMap;
use rustc_hash::FxHashSet;
use smallvec::SmallVec;
use tracing::debug;

use crate::util::vec2::Vec2;
use crate::world::behavior::{behavior_for, PaintLayer};
use crate::world::entity::{EntityId, EntityState, ServerRecord};

/// Result of applying one record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Created,
    Updated,
    Removed,
    /// Removal of an id we never had (late or duplicate removal)
    Ignored,
}

/// Counts from one full-sync reconcile
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReconcileStats {
    pub created: usize,
    pub updated: usize,
    pub removed: usize,
}

/// The authoritative local mirror of server entities
#[derive(Debug, Default)]
pub struct EntityRegistry {
    entities: HashMap<EntityId, EntityState>,
    paint_order: BTreeMap<i64, EntityId>,
    next_foreground: i64,
    next_background: i64,
}

impl EntityRegistry {
    pub fn new() -> Self {
        Self {
            entities: HashMap::new(),
            paint_order: BTreeMap::new(),
            next_foreground: 0,
            next_background: -1,
        }
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entities.contains_key(id)
    }

    pub fn get(&self, id: &str) -> Option<&EntityState> {
        self.entities.get(id)
    }

    pub fn ids(&self) -> impl Iterator<Item = &EntityId> {
        self.entities.keys()
    }

    /// Entities from bottom-most to top-most
    pub fn iter_paint_order(&self) -> impl DoubleEndedIterator<Item = &EntityState> {
        self.paint_order
            .values()
            .filter_map(|id| self.entities.get(id.as_str()))
    }

    /// Apply one record: create, merge, or remove when flagged.
    pub fn upsert(&mut self, record: ServerRecord, now_ms: u64) -> UpsertOutcome {
        if record.remove {
            return match self.remove(&record.id) {
                Some(_) => UpsertOutcome::Removed,
                None => UpsertOutcome::Ignored,
            };
        }

        if let Some(entity) = self.entities.get_mut(record.id.as_str()) {
            entity.apply(record, now_ms);
            return UpsertOutcome::Updated;
        }

        self.insert(EntityState::from_record(record, now_ms));
        UpsertOutcome::Created
    }

    fn insert(&mut self, mut entity: EntityState) {
        let key = match behavior_for(entity.kind).layer {
            PaintLayer::Foreground => {
                let key = self.next_foreground;
                self.next_foreground += 1;
                key
            }
            PaintLayer::Background => {
                let key = self.next_background;
                self.next_background -= 1;
                key
            }
        };

        debug!("Adding {} {} (paint key {})", entity.kind, entity.id, key);
        entity.paint_key = key;
        self.paint_order.insert(key, entity.id.clone());
        self.entities.insert(entity.id.clone(), entity);
    }

    /// Detach and return an entity. Unknown ids are logged and ignored.
    pub fn remove(&mut self, id: &str) -> Option<EntityState> {
        match self.entities.remove(id) {
            Some(entity) => {
                self.paint_order.remove(&entity.paint_key);
                debug!("Removed {} {}", entity.kind, entity.id);
                Some(entity)
            }
            None => {
                debug!("Entity {} not found for removal", id);
                None
            }
        }
    }

    /// Bring the registry in line with a full snapshot.
    ///
    /// Afterwards the held id set equals the snapshot's id set. Records
    /// flagged `remove` count as absent. Repeating the same snapshot changes
    /// nothing but timestamps.
    pub fn reconcile(&mut self, snapshot: Vec<ServerRecord>, now_ms: u64) -> ReconcileStats {
        let mut stats = ReconcileStats::default();

        // Collect first; removal must not run while iterating the map
        let stale: SmallVec<[EntityId; 16]> = {
            let live: FxHashSet<&str> = snapshot
                .iter()
                .filter(|record| !record.remove)
                .map(|record| record.id.as_str())
                .collect();
            self.entities
                .keys()
                .filter(|id| !live.contains(id.as_str()))
                .cloned()
                .collect()
        };

        for id in stale {
            if self.remove(&id).is_some() {
                stats.removed += 1;
            }
        }

        for record in snapshot.into_iter().filter(|record| !record.remove) {
            match self.upsert(record, now_ms) {
                UpsertOutcome::Created => stats.created += 1,
                UpsertOutcome::Updated => stats.updated += 1,
                UpsertOutcome::Removed | UpsertOutcome::Ignored => {}
            }
        }

        stats
    }

    /// Top-most clickable entity whose centred bounds contain `point`
    pub fn hit_test(&self, point: Vec2, now_ms: u64) -> Option<&EntityState> {
        self.iter_paint_order().rev().find(|entity| {
            if !behavior_for(entity.kind).is_clickable() {
                return false;
            }
            let Some(size) = entity.attributes.size() else {
                return false;
            };
            let offset = point - entity.position_at(now_ms);
            offset.x.abs() <= size.x / 2.0 && offset.y.abs() <= size.y / 2.0
        })
    }
}
