//! Backend on the `packetfilter` library
//!
//! Suppresses spawn and metadata packets of protected items sent to
//! non-owners, and retroactively destroys items that were already announced
//! before they were registered.

use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::{debug, error, info, warn};

use crate::error::BackendError;
use crate::host::entity::{EntityId, ItemEntity, PlayerId};
use crate::host::packetfilter::{
    ListenerId, PacketAdapter, PacketEvent, PacketFilterManager, PacketTypes, MANAGER_SYMBOL, PLUGIN_NAME,
};
use crate::host::plugins::PluginRegistry;
use crate::net::session::Delivery;
use crate::protocol::packets::{DestroyEntitiesPacket, OutboundPacket};

use super::items::ProtectedItems;
use super::janitor::SweepTarget;
use super::{BackendKind, DecisionCounter, DecisionStats, SuppressionRule, VisibilityBackend, VisibilitySettings};

struct ItemVisibilityAdapter {
    rule: SuppressionRule,
}

impl PacketAdapter for ItemVisibilityAdapter {
    fn sending_whitelist(&self) -> PacketTypes {
        PacketTypes::SPAWN_ENTITY | PacketTypes::ENTITY_METADATA
    }

    fn on_packet_sending(&self, event: &mut PacketEvent<'_>) {
        let (Some(viewer), Some(entity)) = (event.player(), event.packet().entity_id()) else {
            return;
        };
        if self.rule.should_suppress(entity, viewer, event.player_name()) {
            event.set_cancelled(true);
        }
    }
}

/// Visibility through typed packet listeners
pub struct PacketFilterBackend {
    manager: Arc<PacketFilterManager>,
    items: Arc<ProtectedItems<EntityId>>,
    stats: Arc<DecisionCounter>,
    settings: RwLock<VisibilitySettings>,
    /// Installed listener; the lock also serializes reinitialization
    listener: Mutex<Option<ListenerId>>,
}

impl PacketFilterBackend {
    /// Resolve the library and install the listener
    pub fn connect(plugins: &PluginRegistry, settings: VisibilitySettings) -> Result<Self, BackendError> {
        let plugin = plugins.get(PLUGIN_NAME).ok_or(BackendError::LibraryMissing(PLUGIN_NAME))?;
        if !plugin.enabled {
            return Err(BackendError::LibraryDisabled(PLUGIN_NAME));
        }
        let manager = plugin
            .resolve::<PacketFilterManager>(MANAGER_SYMBOL)
            .ok_or(BackendError::ApiMismatch {
                library: PLUGIN_NAME,
                symbol: MANAGER_SYMBOL,
            })?;
        if manager.is_closed() {
            return Err(BackendError::InitializationFailed {
                library: PLUGIN_NAME,
                reason: "manager is closed".to_string(),
            });
        }

        let backend = Self {
            manager,
            items: Arc::new(ProtectedItems::new("packetfilter")),
            stats: Arc::new(DecisionCounter::default()),
            settings: RwLock::new(settings),
            listener: Mutex::new(None),
        };
        backend.reinitialize(settings)?;
        Ok(backend)
    }

    fn install(&self, settings: VisibilitySettings) -> Result<ListenerId, BackendError> {
        let adapter = ItemVisibilityAdapter {
            rule: SuppressionRule {
                items: self.items.clone(),
                settings,
                stats: self.stats.clone(),
            },
        };
        self.manager
            .add_packet_listener(Arc::new(adapter))
            .map_err(|e| BackendError::ListenerInstall(e.to_string()))
    }

    /// Destroy an already announced item on every non-owner client
    fn destroy_for_non_owners(&self, item: &ItemEntity, owner: PlayerId, debug_enabled: bool) {
        let packet = OutboundPacket::from(DestroyEntitiesPacket::single(item.id));
        let mut sent = 0;
        for player in self.manager.online_players() {
            if player == owner {
                continue;
            }
            match self.manager.send_server_packet(player, &packet) {
                Ok(Delivery::Queued) => sent += 1,
                Ok(Delivery::Suppressed) => {}
                Err(e) => {
                    if debug_enabled {
                        debug!(player = %player, error = %e, "Failed to send destroy packet");
                    }
                }
            }
        }
        if debug_enabled {
            debug!(entity = %item.id, recipients = sent, "Sent destroy packet to non-owners");
        }
    }
}

impl VisibilityBackend for PacketFilterBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::PacketFilter
    }

    fn register_protected_item(&self, item: &ItemEntity, owner: PlayerId) {
        self.items.insert(item.id, owner);
        let settings = self.settings();
        if settings.debug {
            debug!(entity = %item.id, owner = %owner, "Registered protected item");
        }
        if !settings.visible_to_others {
            self.destroy_for_non_owners(item, owner, settings.debug);
        }
    }

    fn unregister_protected_item(&self, item: &ItemEntity) {
        self.items.remove(item.id);
    }

    fn owner_of(&self, item: &ItemEntity) -> Option<PlayerId> {
        self.items.owner_of(item.id)
    }

    fn reinitialize(&self, settings: VisibilitySettings) -> Result<(), BackendError> {
        let mut listener = self.listener.lock();
        if let Some(previous) = listener.take() {
            self.manager.remove_packet_listener(previous);
        }

        let previous_settings = self.settings();
        match self.install(settings) {
            Ok(id) => {
                *listener = Some(id);
                *self.settings.write() = settings;
                info!(
                    backend = %self.kind(),
                    visible_to_others = settings.visible_to_others,
                    "Packet listener installed"
                );
                Ok(())
            }
            Err(e) => {
                error!(error = %e, "Failed to install packet listener");
                match self.install(previous_settings) {
                    Ok(id) => *listener = Some(id),
                    Err(restore) => warn!(error = %restore, "Previous packet listener could not be restored"),
                }
                Err(e)
            }
        }
    }

    fn settings(&self) -> VisibilitySettings {
        *self.settings.read()
    }

    fn on_player_join(&self, _player: PlayerId, name: &str) {
        if self.settings().debug {
            debug!(player = %name, tracked = self.items.len(), "Player joined, packets will be filtered");
        }
    }

    fn tracked_count(&self) -> usize {
        self.items.len()
    }

    fn sweep_target(&self) -> Arc<dyn SweepTarget> {
        self.items.clone()
    }

    fn decision_stats(&self) -> DecisionStats {
        self.stats.snapshot()
    }

    fn shutdown(&self) {
        if let Some(id) = self.listener.lock().take() {
            self.manager.remove_packet_listener(id);
            info!(backend = %self.kind(), "Packet listener removed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::entity::{ItemStack, Location};
    use crate::host::plugins::PluginHandle;
    use crate::host::world::DEFAULT_WORLD;
    use crate::host::HostServices;
    use crate::net::session::SessionPlayer;
    use crate::protocol::packets::EntityMetadataPacket;
    use tokio::sync::mpsc;

    fn join(host: &HostServices, name: &str) -> (PlayerId, mpsc::Receiver<bytes::Bytes>) {
        let (tx, rx) = mpsc::channel(16);
        let session = host.sessions.create_session("127.0.0.1:3".parse().unwrap(), tx);
        let player = PlayerId::from_name(name);
        host.sessions
            .login(
                session.id,
                SessionPlayer {
                    id: player,
                    name: name.to_string(),
                    admin: false,
                },
            )
            .unwrap();
        (player, rx)
    }

    fn drain(rx: &mut mpsc::Receiver<bytes::Bytes>) -> Vec<OutboundPacket> {
        let mut packets = Vec::new();
        while let Ok(frame) = rx.try_recv() {
            packets.push(OutboundPacket::decode_frame(&frame).unwrap());
        }
        packets
    }

    #[test]
    fn test_connect_errors() {
        let plugins = PluginRegistry::new();
        assert_eq!(
            PacketFilterBackend::connect(&plugins, VisibilitySettings::default()).err(),
            Some(BackendError::LibraryMissing(PLUGIN_NAME))
        );

        plugins.register(PluginHandle::new(PLUGIN_NAME, "0.0").with_export(MANAGER_SYMBOL, Arc::new(1u8)));
        assert!(matches!(
            PacketFilterBackend::connect(&plugins, VisibilitySettings::default()),
            Err(BackendError::ApiMismatch { .. })
        ));
    }

    #[test]
    fn test_hides_item_from_non_owner() {
        let host = HostServices::new();
        host.install_libraries(["packetfilter"]);
        let backend = PacketFilterBackend::connect(&host.plugins, VisibilitySettings::default()).unwrap();
        let (alice, mut alice_rx) = join(&host, "alice");
        let (bob, mut bob_rx) = join(&host, "bob");

        let item = host.worlds.spawn_item(DEFAULT_WORLD, ItemStack::new(1, 1), Location::default());
        backend.register_protected_item(&item, alice);

        assert!(drain(&mut alice_rx).is_empty());
        assert_eq!(
            drain(&mut bob_rx),
            vec![OutboundPacket::from(DestroyEntitiesPacket::single(item.id))]
        );

        let metadata = OutboundPacket::from(EntityMetadataPacket::for_item(item.id, item.stack));
        assert_eq!(host.sessions.send_packet(alice, &metadata).unwrap(), Delivery::Queued);
        assert_eq!(host.sessions.send_packet(bob, &metadata).unwrap(), Delivery::Suppressed);
        assert_eq!(backend.decision_stats(), DecisionStats { suppressed: 1, allowed: 1 });
    }

    #[test]
    fn test_reinitialize_swaps_listener() {
        let host = HostServices::new();
        host.install_libraries(["packetfilter"]);
        let backend = PacketFilterBackend::connect(&host.plugins, VisibilitySettings::default()).unwrap();
        let manager = host
            .plugins
            .get(PLUGIN_NAME)
            .and_then(|p| p.resolve::<PacketFilterManager>(MANAGER_SYMBOL))
            .unwrap();
        let (_alice, _arx) = join(&host, "alice");
        let (bob, _brx) = join(&host, "bob");
        let item = host.worlds.spawn_item(DEFAULT_WORLD, ItemStack::new(1, 1), Location::default());
        backend.register_protected_item(&item, PlayerId::from_name("alice"));
        let metadata = OutboundPacket::from(EntityMetadataPacket::for_item(item.id, item.stack));

        backend
            .reinitialize(VisibilitySettings {
                visible_to_others: true,
                debug: false,
            })
            .unwrap();
        assert_eq!(manager.listener_count(), 1);
        assert_eq!(host.sessions.send_packet(bob, &metadata).unwrap(), Delivery::Queued);

        backend.reinitialize(VisibilitySettings::default()).unwrap();
        assert_eq!(manager.listener_count(), 1);
        assert_eq!(host.sessions.send_packet(bob, &metadata).unwrap(), Delivery::Suppressed);

        backend.shutdown();
        assert_eq!(manager.listener_count(), 0);
    }

    #[test]
    fn test_reinitialize_failure_reports_error() {
        let host = HostServices::new();
        host.install_libraries(["packetfilter"]);
        let backend = PacketFilterBackend::connect(&host.plugins, VisibilitySettings::default()).unwrap();
        let manager = host
            .plugins
            .get(PLUGIN_NAME)
            .and_then(|p| p.resolve::<PacketFilterManager>(MANAGER_SYMBOL))
            .unwrap();

        manager.close();
        let result = backend.reinitialize(VisibilitySettings {
            visible_to_others: true,
            debug: false,
        });
        assert!(matches!(result, Err(BackendError::ListenerInstall(_))));
        assert!(!backend.settings().visible_to_others);
    }
}
