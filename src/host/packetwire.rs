//! `packetwire` host library
//!
//! Alternate outbound packet interception with a lower-level API than
//! `packetfilter`:
//! - Listeners see the raw packet id and payload and decode it themselves
//!   through wrapper types
//! - The destination is a `User` handle whose UUID may not be known yet
//! - Listeners carry a priority; higher priorities run later and see earlier
//!   cancellations
//! - Events only flow once the API has been initialized
//! - Only entity spawn and metadata packets reach listeners

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, info};

use crate::error::NetworkError;
use crate::net::buffer::PacketBuffer;
use crate::net::pipeline::{HookVerdict, OutboundContext, OutboundHook};
use crate::net::session::SessionManager;
use crate::protocol::packets::{
    EntityKind, EntityMetadataPacket, OutboundPacket, OutgoingPacket, PacketDecodeError, PacketKind,
    SpawnEntityPacket,
};

use super::entity::{EntityId, PlayerId};
use super::plugins::{PluginHandle, PluginRegistry};

/// Name under which the library registers itself
pub const PLUGIN_NAME: &str = "packetwire";

/// Export holding the `PacketWireApi`
pub const API_SYMBOL: &str = "api";

/// Export holding the `EventManager`
pub const EVENT_MANAGER_SYMBOL: &str = "event-manager";

/// Raw packet ids as seen by listeners
pub mod packet_ids {
    use crate::protocol::packets::{
        DestroyEntitiesPacket, EntityMetadataPacket, OutgoingPacket, SpawnEntityPacket,
        SystemMessagePacket,
    };

    pub const SPAWN_ENTITY: u8 = SpawnEntityPacket::OPCODE;
    pub const ENTITY_METADATA: u8 = EntityMetadataPacket::OPCODE;
    pub const DESTROY_ENTITIES: u8 = DestroyEntitiesPacket::OPCODE;
    pub const SYSTEM_MESSAGE: u8 = SystemMessagePacket::OPCODE;
}

/// Connection handle passed to listeners
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    /// Player UUID, unknown until login completes
    pub uuid: Option<PlayerId>,
    pub name: Arc<str>,
}

/// Listener ordering
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ListenerPriority {
    Lowest,
    Low,
    Normal,
    High,
    Highest,
    Monitor,
}

/// Raw outbound packet event
pub struct PacketSendEvent<'a> {
    user: &'a User,
    packet_id: u8,
    payload: &'a [u8],
    cancelled: bool,
}

impl<'a> PacketSendEvent<'a> {
    pub fn user(&self) -> &User {
        self.user
    }

    pub fn packet_id(&self) -> u8 {
        self.packet_id
    }

    pub fn payload(&self) -> &[u8] {
        self.payload
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }

    pub fn set_cancelled(&mut self, cancelled: bool) {
        self.cancelled = cancelled;
    }
}

/// Outbound packet listener
pub trait PacketListener: Send + Sync {
    fn on_packet_send(&self, event: &mut PacketSendEvent<'_>);
}

/// Decoded view of a spawn packet payload
#[derive(Debug, Clone)]
pub struct WrapperSpawnEntity {
    inner: SpawnEntityPacket,
}

impl WrapperSpawnEntity {
    pub fn read(payload: &[u8]) -> Result<Self, PacketDecodeError> {
        let mut buffer = PacketBuffer::from_bytes(payload);
        Ok(Self {
            inner: SpawnEntityPacket::decode(&mut buffer)?,
        })
    }

    pub fn entity_id(&self) -> EntityId {
        self.inner.entity_id
    }

    pub fn entity_kind(&self) -> EntityKind {
        self.inner.kind
    }
}

/// Decoded view of a metadata packet payload
#[derive(Debug, Clone)]
pub struct WrapperEntityMetadata {
    inner: EntityMetadataPacket,
}

impl WrapperEntityMetadata {
    pub fn read(payload: &[u8]) -> Result<Self, PacketDecodeError> {
        let mut buffer = PacketBuffer::from_bytes(payload);
        Ok(Self {
            inner: EntityMetadataPacket::decode(&mut buffer)?,
        })
    }

    pub fn entity_id(&self) -> EntityId {
        self.inner.entity_id
    }
}

/// Listener registry of the library
#[derive(Default)]
pub struct EventManager {
    listeners: RwLock<Vec<(u64, ListenerPriority, Arc<dyn PacketListener>)>>,
    next_id: AtomicU64,
}

impl EventManager {
    /// Register a listener; returns a handle for unregistering
    pub fn register_listener(&self, listener: Arc<dyn PacketListener>, priority: ListenerPriority) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let mut listeners = self.listeners.write();
        listeners.push((id, priority, listener));
        listeners.sort_by_key(|(_, priority, _)| *priority);
        debug!(listener_id = id, priority = ?priority, "packetwire listener registered");
        id
    }

    pub fn unregister_listener(&self, id: u64) -> bool {
        let mut listeners = self.listeners.write();
        let before = listeners.len();
        listeners.retain(|(listener_id, _, _)| *listener_id != id);
        listeners.len() != before
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.read().len()
    }

    /// Run a raw packet through every listener; returns whether it was cancelled
    pub fn call_send(&self, user: &User, packet_id: u8, payload: &[u8]) -> bool {
        let listeners = self.listeners.read();
        let mut event = PacketSendEvent {
            user,
            packet_id,
            payload,
            cancelled: false,
        };
        for (_, _, listener) in listeners.iter() {
            listener.on_packet_send(&mut event);
        }
        event.cancelled
    }
}

struct PacketWireHook {
    initialized: Arc<AtomicBool>,
    events: Arc<EventManager>,
}

impl OutboundHook for PacketWireHook {
    fn name(&self) -> &str {
        PLUGIN_NAME
    }

    fn on_outbound(&self, ctx: &OutboundContext, packet: &OutboundPacket) -> HookVerdict {
        if !self.initialized.load(Ordering::Acquire) || self.events.listener_count() == 0 {
            return HookVerdict::Forward;
        }
        if !matches!(packet.kind(), PacketKind::SpawnEntity | PacketKind::EntityMetadata) {
            return HookVerdict::Forward;
        }

        let user = User {
            uuid: ctx.player,
            name: ctx.player_name.clone(),
        };
        let payload = packet.encode_payload();
        if self.events.call_send(&user, packet.kind().opcode(), payload.as_bytes()) {
            HookVerdict::Cancel
        } else {
            HookVerdict::Forward
        }
    }
}

/// Library API entry point
pub struct PacketWireApi {
    sessions: Arc<SessionManager>,
    initialized: Arc<AtomicBool>,
    init_failure: Option<String>,
}

impl PacketWireApi {
    /// Initialize the API; required before events flow
    pub fn init(&self) -> Result<(), String> {
        if let Some(reason) = &self.init_failure {
            return Err(reason.clone());
        }
        if !self.initialized.swap(true, Ordering::AcqRel) {
            info!("packetwire API initialized");
        }
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    /// Send a packet to a player without running any listener
    pub fn send_packet_silently(&self, player: PlayerId, packet: &OutboundPacket) -> Result<(), NetworkError> {
        let session = self
            .sessions
            .get_by_player(player)
            .ok_or(NetworkError::PlayerNotConnected(player))?;
        session.try_send(packet.encode_frame())
    }

    /// Online players as seen by the library
    pub fn online_players(&self) -> Vec<PlayerId> {
        self.sessions.online_players()
    }
}

/// Handles returned when the library is installed
pub struct PacketWire {
    pub api: Arc<PacketWireApi>,
    pub events: Arc<EventManager>,
}

impl PacketWire {
    /// Hook into the session pipeline and announce the library
    pub fn install(plugins: &PluginRegistry, sessions: Arc<SessionManager>) -> Self {
        Self::install_with(plugins, sessions, None)
    }

    /// Install a copy of the library whose API refuses to initialize
    pub fn install_broken(plugins: &PluginRegistry, sessions: Arc<SessionManager>, reason: &str) -> Self {
        Self::install_with(plugins, sessions, Some(reason.to_string()))
    }

    fn install_with(plugins: &PluginRegistry, sessions: Arc<SessionManager>, init_failure: Option<String>) -> Self {
        let initialized = Arc::new(AtomicBool::new(false));
        let events = Arc::new(EventManager::default());
        sessions.pipeline().install(Arc::new(PacketWireHook {
            initialized: initialized.clone(),
            events: events.clone(),
        }));

        let api = Arc::new(PacketWireApi {
            sessions,
            initialized,
            init_failure,
        });
        plugins.register(
            PluginHandle::new(PLUGIN_NAME, env!("CARGO_PKG_VERSION"))
                .with_export(API_SYMBOL, api.clone())
                .with_export(EVENT_MANAGER_SYMBOL, events.clone()),
        );
        info!("packetwire library installed");

        Self { api, events }
    }
}
