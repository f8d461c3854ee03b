//! Host module
//!
//! The in-process game host the protection core runs against:
//! - Entity and player identities
//! - Live worlds and the dropped items inside them
//! - Plugin registry used for capability probing
//! - Two optional outbound packet libraries

pub mod entity;
pub mod packetfilter;
pub mod packetwire;
pub mod plugins;
pub mod world;

use std::sync::Arc;

use tracing::warn;

use crate::net::session::SessionManager;
use crate::protocol::packets::{
    DestroyEntitiesPacket, EntityKind, EntityMetadataPacket, OutboundPacket, SpawnEntityPacket,
};

use self::entity::{EntityUuid, ItemEntity, ItemStack, Location};
use self::packetfilter::PacketFilterManager;
use self::packetwire::PacketWire;
use self::plugins::PluginRegistry;
use self::world::WorldSet;

/// Shared handles to the host services
#[derive(Clone)]
pub struct HostServices {
    pub worlds: Arc<WorldSet>,
    pub sessions: Arc<SessionManager>,
    pub plugins: Arc<PluginRegistry>,
}

impl Default for HostServices {
    fn default() -> Self {
        Self::new()
    }
}

impl HostServices {
    /// A host with one default world and no packet library
    pub fn new() -> Self {
        Self {
            worlds: Arc::new(WorldSet::new()),
            sessions: Arc::new(SessionManager::new()),
            plugins: Arc::new(PluginRegistry::new()),
        }
    }

    /// Install packet libraries by name (`packetfilter`, `packetwire`)
    pub fn install_libraries<'a>(&self, names: impl IntoIterator<Item = &'a str>) {
        for name in names {
            match name.trim().to_lowercase().as_str() {
                "" => {}
                packetfilter::PLUGIN_NAME => {
                    PacketFilterManager::install(&self.plugins, self.sessions.clone());
                }
                packetwire::PLUGIN_NAME => {
                    PacketWire::install(&self.plugins, self.sessions.clone());
                }
                other => warn!(library = %other, "Unknown host library, skipping"),
            }
        }
    }

    /// Spawn a dropped item and announce it to every client
    pub fn drop_item(&self, world: &str, stack: ItemStack, location: Location) -> ItemEntity {
        let item = self.worlds.spawn_item(world, stack, location);
        self.sessions.broadcast(&OutboundPacket::from(SpawnEntityPacket {
            entity_id: item.id,
            uuid: item.uuid,
            kind: EntityKind::Item,
            location,
        }));
        self.sessions
            .broadcast(&OutboundPacket::from(EntityMetadataPacket::for_item(item.id, stack)));
        item
    }

    /// Remove a collected item and tell every client it is gone
    pub fn collect_item(&self, uuid: EntityUuid) -> Option<ItemEntity> {
        let item = self.worlds.remove_item(uuid)?;
        self.sessions
            .broadcast(&OutboundPacket::from(DestroyEntitiesPacket::single(item.id)));
        Some(item)
    }
}
