//! Protected item maps
//!
//! Concurrent identity -> owner maps shared by the registry and the
//! visibility backends. Stable UUIDs and network entity ids are separate
//! keyspaces; each map is bound to exactly one of them through `ItemKey`.

use std::fmt;
use std::hash::Hash;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tracing::debug;

use crate::host::entity::{EntityId, EntityUuid, ItemEntity, PlayerId};
use crate::host::world::WorldView;

use super::janitor::SweepTarget;

/// An identity scheme for dropped items
pub trait ItemKey: Copy + Eq + Hash + fmt::Display + fmt::Debug + Send + Sync + 'static {
    /// Key of an item under this scheme
    fn of(item: &ItemEntity) -> Self;

    /// Whether the entity behind the key is still alive
    fn exists_in(self, world: &dyn WorldView) -> bool;
}

impl ItemKey for EntityUuid {
    fn of(item: &ItemEntity) -> Self {
        item.uuid
    }

    fn exists_in(self, world: &dyn WorldView) -> bool {
        world.contains_uuid(self)
    }
}

impl ItemKey for EntityId {
    fn of(item: &ItemEntity) -> Self {
        item.id
    }

    fn exists_in(self, world: &dyn WorldView) -> bool {
        world.contains_entity_id(self)
    }
}

/// Ownership of one protected item
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProtectedItemRecord<K> {
    pub entity: K,
    pub owner: PlayerId,
    pub registered_at: DateTime<Utc>,
}

/// Concurrent map from item identity to owner
pub struct ProtectedItems<K: ItemKey> {
    label: &'static str,
    records: DashMap<K, ProtectedItemRecord<K>>,
}

impl<K: ItemKey> ProtectedItems<K> {
    /// Create an empty map; `label` names it in logs
    pub fn new(label: &'static str) -> Self {
        Self {
            label,
            records: DashMap::new(),
        }
    }

    /// Record an owner, replacing any previous one; returns the previous owner
    pub fn insert(&self, entity: K, owner: PlayerId) -> Option<PlayerId> {
        let record = ProtectedItemRecord {
            entity,
            owner,
            registered_at: Utc::now(),
        };
        self.records.insert(entity, record).map(|previous| previous.owner)
    }

    pub fn remove(&self, entity: K) -> Option<ProtectedItemRecord<K>> {
        self.records.remove(&entity).map(|(_, record)| record)
    }

    pub fn owner_of(&self, entity: K) -> Option<PlayerId> {
        self.records.get(&entity).map(|r| r.owner)
    }

    pub fn record(&self, entity: K) -> Option<ProtectedItemRecord<K>> {
        self.records.get(&entity).map(|r| *r)
    }

    pub fn contains(&self, entity: K) -> bool {
        self.records.contains_key(&entity)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Snapshot of tracked keys
    pub fn keys(&self) -> Vec<K> {
        self.records.iter().map(|r| *r.key()).collect()
    }

    /// Evict keys whose entity is gone. The key set is snapshotted first;
    /// each candidate is checked again under its entry lock before removal so
    /// a key re-registered in between survives.
    pub fn evict_missing(&self, world: &dyn WorldView) -> usize {
        let missing: Vec<K> = self
            .keys()
            .into_iter()
            .filter(|key| !key.exists_in(world))
            .collect();

        let mut evicted = 0;
        for key in missing {
            if self.records.remove_if(&key, |k, _| !k.exists_in(world)).is_some() {
                evicted += 1;
            }
        }
        if evicted > 0 {
            debug!(map = self.label, evicted, remaining = self.len(), "Evicted stale protected items");
        }
        evicted
    }
}

impl<K: ItemKey> SweepTarget for ProtectedItems<K> {
    fn label(&self) -> &str {
        self.label
    }

    fn sweep(&self, world: &dyn WorldView) -> usize {
        self.evict_missing(world)
    }

    fn tracked(&self) -> usize {
        self.len()
    }
}
