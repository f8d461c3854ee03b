//! Live worlds module
//!
//! Tracks the item entities currently lying in each loaded world:
//! - Item spawn with fresh stable and network identities
//! - Item removal (pickup, despawn, world unload)
//! - Existence queries by either identity scheme

use std::collections::HashMap;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, info};

use super::entity::{EntityId, EntityUuid, ItemEntity, ItemStack, Location};

/// Name of the world created by default
pub const DEFAULT_WORLD: &str = "overworld";

/// Read access to the set of live worlds
pub trait WorldView: Send + Sync {
    /// Whether an entity with this stable identity exists in any world
    fn contains_uuid(&self, uuid: EntityUuid) -> bool;

    /// Whether an entity with this network identity exists in any world
    fn contains_entity_id(&self, id: EntityId) -> bool;
}

/// A single loaded world
#[derive(Debug)]
pub struct World {
    /// World name
    pub name: String,
    /// Items by stable id
    items: RwLock<HashMap<EntityUuid, ItemEntity>>,
    /// Network id index
    by_entity_id: RwLock<HashMap<EntityId, EntityUuid>>,
}

impl World {
    /// Create an empty world
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            items: RwLock::new(HashMap::with_capacity(256)),
            by_entity_id: RwLock::new(HashMap::with_capacity(256)),
        }
    }

    // Lock order: items, then by_entity_id
    fn insert(&self, item: ItemEntity) {
        let mut items = self.items.write();
        self.by_entity_id.write().insert(item.id, item.uuid);
        items.insert(item.uuid, item);
    }

    fn remove(&self, uuid: EntityUuid) -> Option<ItemEntity> {
        let mut items = self.items.write();
        let item = items.remove(&uuid)?;
        self.by_entity_id.write().remove(&item.id);
        Some(item)
    }

    /// Get an item by stable id
    pub fn get(&self, uuid: EntityUuid) -> Option<ItemEntity> {
        self.items.read().get(&uuid).cloned()
    }

    /// Whether this world holds the entity
    pub fn contains_uuid(&self, uuid: EntityUuid) -> bool {
        self.items.read().contains_key(&uuid)
    }

    /// Whether this world holds the network id
    pub fn contains_entity_id(&self, id: EntityId) -> bool {
        self.by_entity_id.read().contains_key(&id)
    }

    /// Number of items in this world
    pub fn item_count(&self) -> usize {
        self.items.read().len()
    }
}

/// All loaded worlds
#[derive(Debug)]
pub struct WorldSet {
    worlds: RwLock<Vec<Arc<World>>>,
    /// Next network entity id
    next_entity_id: AtomicI32,
}

impl Default for WorldSet {
    fn default() -> Self {
        Self::new()
    }
}

impl WorldSet {
    /// Create a world set holding the default world
    pub fn new() -> Self {
        Self {
            worlds: RwLock::new(vec![Arc::new(World::new(DEFAULT_WORLD))]),
            next_entity_id: AtomicI32::new(1),
        }
    }

    /// Load an additional world; returns the existing one if already loaded
    pub fn load_world(&self, name: &str) -> Arc<World> {
        let mut worlds = self.worlds.write();
        if let Some(world) = worlds.iter().find(|w| w.name == name) {
            return world.clone();
        }
        let world = Arc::new(World::new(name));
        worlds.push(world.clone());
        info!(world = %name, "World loaded");
        world
    }

    /// Unload a world and every item in it
    pub fn unload_world(&self, name: &str) -> bool {
        let mut worlds = self.worlds.write();
        let before = worlds.len();
        worlds.retain(|w| w.name != name);
        let unloaded = worlds.len() != before;
        if unloaded {
            info!(world = %name, "World unloaded");
        }
        unloaded
    }

    /// Get a loaded world by name
    pub fn world(&self, name: &str) -> Option<Arc<World>> {
        self.worlds.read().iter().find(|w| w.name == name).cloned()
    }

    /// Snapshot of loaded worlds
    pub fn worlds(&self) -> Vec<Arc<World>> {
        self.worlds.read().clone()
    }

    /// Spawn a dropped item in a world, loading the world if needed
    pub fn spawn_item(&self, world: &str, stack: ItemStack, location: Location) -> ItemEntity {
        let id = EntityId(self.next_entity_id.fetch_add(1, Ordering::SeqCst));
        let item = ItemEntity {
            uuid: EntityUuid::new_v4(),
            id,
            world: world.to_string(),
            stack,
            location,
        };
        self.load_world(world).insert(item.clone());

        debug!(
            entity = %item.id,
            uuid = %item.uuid,
            world = %world,
            item_id = stack.item_id,
            amount = stack.amount,
            location = %location,
            "Spawned item entity"
        );
        item
    }

    /// Remove an item from whichever world holds it
    pub fn remove_item(&self, uuid: EntityUuid) -> Option<ItemEntity> {
        let worlds = self.worlds();
        let removed = worlds.iter().find_map(|w| w.remove(uuid));
        if let Some(item) = &removed {
            debug!(entity = %item.id, uuid = %uuid, "Removed item entity");
        }
        removed
    }

    /// Find an item by stable id
    pub fn find_item(&self, uuid: EntityUuid) -> Option<ItemEntity> {
        self.worlds().iter().find_map(|w| w.get(uuid))
    }

    /// Total items across all worlds
    pub fn item_count(&self) -> usize {
        self.worlds().iter().map(|w| w.item_count()).sum()
    }
}

impl WorldView for WorldSet {
    fn contains_uuid(&self, uuid: EntityUuid) -> bool {
        self.worlds.read().iter().any(|w| w.contains_uuid(uuid))
    }

    fn contains_entity_id(&self, id: EntityId) -> bool {
        self.worlds.read().iter().any(|w| w.contains_entity_id(id))
    }
}
