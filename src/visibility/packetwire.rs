//! Backend on the `packetwire` library
//!
//! The library is only reached through its plugin exports, resolved and
//! type-checked at startup. Any missing or mistyped export, or an API that
//! refuses to initialize, makes the backend unavailable. Destroy packets for
//! already announced items go out through the API's silent send so they never
//! reach our own listener.

use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::{debug, error, info, warn};

use crate::error::BackendError;
use crate::host::entity::{EntityId, ItemEntity, PlayerId};
use crate::host::packetwire::{
    packet_ids, EventManager, ListenerPriority, PacketListener, PacketSendEvent, PacketWireApi,
    WrapperEntityMetadata, WrapperSpawnEntity, API_SYMBOL, EVENT_MANAGER_SYMBOL, PLUGIN_NAME,
};
use crate::host::plugins::PluginRegistry;
use crate::protocol::packets::{DestroyEntitiesPacket, EntityKind, OutboundPacket};

use super::items::ProtectedItems;
use super::janitor::SweepTarget;
use super::{BackendKind, DecisionCounter, DecisionStats, SuppressionRule, VisibilityBackend, VisibilitySettings};

struct WireVisibilityListener {
    rule: SuppressionRule,
}

impl WireVisibilityListener {
    /// Protected-item candidate carried by the packet, if any
    fn entity_of(&self, event: &PacketSendEvent<'_>) -> Option<EntityId> {
        let decoded = match event.packet_id() {
            packet_ids::SPAWN_ENTITY => WrapperSpawnEntity::read(event.payload())
                .map(|w| (w.entity_kind() == EntityKind::Item).then(|| w.entity_id())),
            packet_ids::ENTITY_METADATA => WrapperEntityMetadata::read(event.payload()).map(|w| Some(w.entity_id())),
            _ => return None,
        };

        match decoded {
            Ok(entity) => entity,
            Err(e) => {
                if self.rule.settings.debug {
                    debug!(packet_id = event.packet_id(), error = %e, "Malformed packet passed through");
                }
                None
            }
        }
    }
}

impl PacketListener for WireVisibilityListener {
    fn on_packet_send(&self, event: &mut PacketSendEvent<'_>) {
        if self.rule.settings.visible_to_others {
            return;
        }
        let Some(viewer) = event.user().uuid.filter(|uuid| !uuid.is_nil()) else {
            return;
        };
        let Some(entity) = self.entity_of(event) else {
            return;
        };
        if self.rule.should_suppress(entity, viewer, &event.user().name) {
            event.set_cancelled(true);
        }
    }
}

/// Visibility through raw packet listeners
pub struct PacketWireBackend {
    api: Arc<PacketWireApi>,
    events: Arc<EventManager>,
    items: Arc<ProtectedItems<EntityId>>,
    stats: Arc<DecisionCounter>,
    settings: RwLock<VisibilitySettings>,
    /// Installed listener; the lock also serializes reinitialization
    listener: Mutex<Option<u64>>,
}

impl PacketWireBackend {
    /// Resolve the library exports, initialize the API and install the listener
    pub fn connect(plugins: &PluginRegistry, settings: VisibilitySettings) -> Result<Self, BackendError> {
        let plugin = plugins.get(PLUGIN_NAME).ok_or(BackendError::LibraryMissing(PLUGIN_NAME))?;
        if !plugin.enabled {
            return Err(BackendError::LibraryDisabled(PLUGIN_NAME));
        }
        let api = plugin
            .resolve::<PacketWireApi>(API_SYMBOL)
            .ok_or(BackendError::ApiMismatch {
                library: PLUGIN_NAME,
                symbol: API_SYMBOL,
            })?;
        let events = plugin
            .resolve::<EventManager>(EVENT_MANAGER_SYMBOL)
            .ok_or(BackendError::ApiMismatch {
                library: PLUGIN_NAME,
                symbol: EVENT_MANAGER_SYMBOL,
            })?;

        if !api.is_initialized() {
            warn!("packetwire API not initialized, initializing");
            api.init().map_err(|reason| BackendError::InitializationFailed {
                library: PLUGIN_NAME,
                reason,
            })?;
        }

        let backend = Self {
            api,
            events,
            items: Arc::new(ProtectedItems::new("packetwire")),
            stats: Arc::new(DecisionCounter::default()),
            settings: RwLock::new(settings),
            listener: Mutex::new(None),
        };
        backend.reinitialize(settings)?;
        Ok(backend)
    }

    fn install(&self, settings: VisibilitySettings) -> u64 {
        let listener = WireVisibilityListener {
            rule: SuppressionRule {
                items: self.items.clone(),
                settings,
                stats: self.stats.clone(),
            },
        };
        self.events.register_listener(Arc::new(listener), ListenerPriority::Normal)
    }

    /// Destroy an already announced item on every non-owner client
    fn destroy_for_non_owners(&self, item: &ItemEntity, owner: PlayerId, debug_enabled: bool) {
        let packet = OutboundPacket::from(DestroyEntitiesPacket::single(item.id));
        let mut sent = 0;
        for player in self.api.online_players() {
            if player == owner {
                continue;
            }
            match self.api.send_packet_silently(player, &packet) {
                Ok(()) => sent += 1,
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

impl VisibilityBackend for PacketWireBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::PacketWire
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
            if !self.events.unregister_listener(previous) {
                error!(listener_id = previous, "packetwire listener was already gone");
            }
        }
        *listener = Some(self.install(settings));
        *self.settings.write() = settings;
        info!(
            backend = %self.kind(),
            visible_to_others = settings.visible_to_others,
            "Packet listener installed"
        );
        Ok(())
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
            self.events.unregister_listener(id);
            info!(backend = %self.kind(), "Packet listener removed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::entity::{EntityUuid, ItemStack, Location};
    use crate::host::packetwire::{PacketWire, User};
    use crate::host::plugins::PluginHandle;
    use crate::host::world::DEFAULT_WORLD;
    use crate::host::HostServices;
    use crate::net::session::{Delivery, SessionPlayer};
    use crate::protocol::packets::{EntityMetadataPacket, OutboundPacket, OutgoingPacket, SpawnEntityPacket};
    use tokio::sync::mpsc;

    fn join(host: &HostServices, name: &str) -> (PlayerId, mpsc::Receiver<bytes::Bytes>) {
        let (tx, rx) = mpsc::channel(16);
        let session = host.sessions.create_session("127.0.0.1:4".parse().unwrap(), tx);
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

    fn spawn(entity_id: EntityId, kind: EntityKind) -> OutboundPacket {
        OutboundPacket::from(SpawnEntityPacket {
            entity_id,
            uuid: EntityUuid::new_v4(),
            kind,
            location: Location::default(),
        })
    }

    #[test]
    fn test_fails_closed_on_missing_or_mistyped_exports() {
        let plugins = PluginRegistry::new();
        assert_eq!(
            PacketWireBackend::connect(&plugins, VisibilitySettings::default()).err(),
            Some(BackendError::LibraryMissing(PLUGIN_NAME))
        );

        plugins.register(PluginHandle::new(PLUGIN_NAME, "0.0").with_export(API_SYMBOL, Arc::new("wrong")));
        assert_eq!(
            PacketWireBackend::connect(&plugins, VisibilitySettings::default()).err(),
            Some(BackendError::ApiMismatch {
                library: PLUGIN_NAME,
                symbol: API_SYMBOL,
            })
        );

        plugins.register(PluginHandle::new(PLUGIN_NAME, "0.0").disabled());
        assert_eq!(
            PacketWireBackend::connect(&plugins, VisibilitySettings::default()).err(),
            Some(BackendError::LibraryDisabled(PLUGIN_NAME))
        );
    }

    #[test]
    fn test_fails_closed_when_init_fails() {
        let host = HostServices::new();
        PacketWire::install_broken(&host.plugins, host.sessions.clone(), "no channel");
        assert!(matches!(
            PacketWireBackend::connect(&host.plugins, VisibilitySettings::default()),
            Err(BackendError::InitializationFailed { .. })
        ));
    }

    #[test]
    fn test_filters_item_spawns_and_metadata() {
        let host = HostServices::new();
        let wire = PacketWire::install(&host.plugins, host.sessions.clone());
        let backend = PacketWireBackend::connect(&host.plugins, VisibilitySettings::default()).unwrap();
        assert!(wire.api.is_initialized());

        let (alice, _arx) = join(&host, "alice");
        let (bob, _brx) = join(&host, "bob");
        let item = host.worlds.spawn_item(DEFAULT_WORLD, ItemStack::new(1, 1), Location::default());
        backend.register_protected_item(&item, alice);

        let item_spawn = spawn(item.id, EntityKind::Item);
        let mob_spawn = spawn(item.id, EntityKind::Mob);
        let metadata = OutboundPacket::from(EntityMetadataPacket::for_item(item.id, item.stack));

        assert_eq!(host.sessions.send_packet(bob, &item_spawn).unwrap(), Delivery::Suppressed);
        assert_eq!(host.sessions.send_packet(bob, &mob_spawn).unwrap(), Delivery::Queued);
        assert_eq!(host.sessions.send_packet(bob, &metadata).unwrap(), Delivery::Suppressed);
        assert_eq!(host.sessions.send_packet(alice, &item_spawn).unwrap(), Delivery::Queued);
    }

    #[test]
    fn test_registration_destroys_announced_item_for_non_owners() {
        let host = HostServices::new();
        PacketWire::install(&host.plugins, host.sessions.clone());
        let backend = PacketWireBackend::connect(&host.plugins, VisibilitySettings::default()).unwrap();
        let (alice, mut arx) = join(&host, "alice");
        let (_bob, mut brx) = join(&host, "bob");

        let item = host.drop_item(DEFAULT_WORLD, ItemStack::new(7, 1), Location::default());
        while brx.try_recv().is_ok() {}
        while arx.try_recv().is_ok() {}

        backend.register_protected_item(&item, alice);

        let destroy = OutboundPacket::from(DestroyEntitiesPacket::single(item.id));
        let frame = brx.try_recv().unwrap();
        assert_eq!(OutboundPacket::decode_frame(&frame).unwrap(), destroy);
        assert!(arx.try_recv().is_err());
    }

    #[test]
    fn test_visible_registration_sends_nothing() {
        let host = HostServices::new();
        PacketWire::install(&host.plugins, host.sessions.clone());
        let backend = PacketWireBackend::connect(
            &host.plugins,
            VisibilitySettings {
                visible_to_others: true,
                debug: false,
            },
        )
        .unwrap();
        let (alice, _arx) = join(&host, "alice");
        let (_bob, mut brx) = join(&host, "bob");
        let item = host.worlds.spawn_item(DEFAULT_WORLD, ItemStack::new(7, 1), Location::default());

        backend.register_protected_item(&item, alice);
        assert!(brx.try_recv().is_err());
    }

    #[test]
    fn test_truncated_packet_and_unknown_user_pass_through() {
        let host = HostServices::new();
        let wire = PacketWire::install(&host.plugins, host.sessions.clone());
        let backend = PacketWireBackend::connect(
            &host.plugins,
            VisibilitySettings {
                visible_to_others: false,
                debug: true,
            },
        )
        .unwrap();
        let item = host.worlds.spawn_item(DEFAULT_WORLD, ItemStack::new(1, 1), Location::default());
        backend.register_protected_item(&item, PlayerId::from_name("alice"));

        let bob = User {
            uuid: Some(PlayerId::from_name("bob")),
            name: Arc::from("bob"),
        };
        let payload = EntityMetadataPacket::for_item(item.id, item.stack).to_buffer();
        assert!(wire.events.call_send(&bob, packet_ids::ENTITY_METADATA, payload.as_bytes()));
        assert!(!wire.events.call_send(&bob, packet_ids::ENTITY_METADATA, &payload.as_bytes()[..2]));

        let anonymous = User {
            uuid: None,
            name: Arc::from(""),
        };
        assert!(!wire.events.call_send(&anonymous, packet_ids::ENTITY_METADATA, payload.as_bytes()));
    }

    #[test]
    fn test_reinitialize_keeps_single_listener() {
        let host = HostServices::new();
        let wire = PacketWire::install(&host.plugins, host.sessions.clone());
        let backend = PacketWireBackend::connect(&host.plugins, VisibilitySettings::default()).unwrap();

        for visible in [true, false, true] {
            backend
                .reinitialize(VisibilitySettings {
                    visible_to_others: visible,
                    debug: false,
                })
                .unwrap();
            assert_eq!(wire.events.listener_count(), 1);
        }
        assert!(backend.settings().visible_to_others);

        backend.shutdown();
        assert_eq!(wire.events.listener_count(), 0);
    }
}
