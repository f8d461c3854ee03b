//! `packetfilter` host library
//!
//! Typed outbound packet interception. Listeners declare which packet types
//! they want, receive a mutable event wrapping the decoded packet and may
//! cancel it. The library installs a single hook on the session pipeline.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use bitflags::bitflags;
use parking_lot::RwLock;
use tracing::{debug, info};

use crate::error::NetworkError;
use crate::net::pipeline::{HookId, HookVerdict, OutboundContext, OutboundHook};
use crate::net::session::{Delivery, SessionManager};
use crate::protocol::packets::{OutboundPacket, PacketKind};

use super::entity::PlayerId;
use super::plugins::{PluginHandle, PluginRegistry};

/// Name under which the library registers itself
pub const PLUGIN_NAME: &str = "packetfilter";

/// Export holding the `PacketFilterManager`
pub const MANAGER_SYMBOL: &str = "manager";

bitflags! {
    /// Set of packet types a listener subscribes to
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct PacketTypes: u8 {
        const SPAWN_ENTITY = 1 << 0;
        const ENTITY_METADATA = 1 << 1;
        const DESTROY_ENTITIES = 1 << 2;
        const SYSTEM_MESSAGE = 1 << 3;
    }
}

impl PacketTypes {
    /// Flag for a packet kind
    pub fn of(kind: PacketKind) -> Self {
        match kind {
            PacketKind::SpawnEntity => PacketTypes::SPAWN_ENTITY,
            PacketKind::EntityMetadata => PacketTypes::ENTITY_METADATA,
            PacketKind::DestroyEntities => PacketTypes::DESTROY_ENTITIES,
            PacketKind::SystemMessage => PacketTypes::SYSTEM_MESSAGE,
        }
    }
}

/// Identifier of a registered listener
pub type ListenerId = u64;

/// A packet on its way to a player
pub struct PacketEvent<'a> {
    player: Option<PlayerId>,
    player_name: &'a str,
    packet: &'a OutboundPacket,
    cancelled: bool,
}

impl<'a> PacketEvent<'a> {
    /// Destination player, if the session is logged in
    pub fn player(&self) -> Option<PlayerId> {
        self.player
    }

    pub fn player_name(&self) -> &str {
        self.player_name
    }

    pub fn packet(&self) -> &OutboundPacket {
        self.packet
    }

    pub fn packet_type(&self) -> PacketKind {
        self.packet.kind()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }

    pub fn set_cancelled(&mut self, cancelled: bool) {
        self.cancelled = cancelled;
    }
}

/// Outbound packet listener
pub trait PacketAdapter: Send + Sync {
    /// Packet types this listener wants to see
    fn sending_whitelist(&self) -> PacketTypes;

    /// Called for every whitelisted packet before it is sent
    fn on_packet_sending(&self, event: &mut PacketEvent<'_>);
}

/// Listener table shared between the manager and its pipeline hook
#[derive(Default)]
struct ListenerTable {
    listeners: RwLock<Vec<(ListenerId, PacketTypes, Arc<dyn PacketAdapter>)>>,
}

impl ListenerTable {
    fn dispatch(&self, ctx: &OutboundContext, packet: &OutboundPacket) -> HookVerdict {
        let listeners = self.listeners.read();
        if listeners.is_empty() {
            return HookVerdict::Forward;
        }

        let wanted = PacketTypes::of(packet.kind());
        let mut event = PacketEvent {
            player: ctx.player,
            player_name: &ctx.player_name,
            packet,
            cancelled: false,
        };
        for (_, whitelist, listener) in listeners.iter() {
            if whitelist.contains(wanted) {
                listener.on_packet_sending(&mut event);
            }
        }

        if event.cancelled {
            HookVerdict::Cancel
        } else {
            HookVerdict::Forward
        }
    }
}

struct PacketFilterHook {
    table: Arc<ListenerTable>,
}

impl OutboundHook for PacketFilterHook {
    fn name(&self) -> &str {
        PLUGIN_NAME
    }

    fn on_outbound(&self, ctx: &OutboundContext, packet: &OutboundPacket) -> HookVerdict {
        self.table.dispatch(ctx, packet)
    }
}

/// Entry point of the library
pub struct PacketFilterManager {
    sessions: Arc<SessionManager>,
    table: Arc<ListenerTable>,
    hook_id: HookId,
    next_listener_id: AtomicU64,
    closed: AtomicBool,
}

impl PacketFilterManager {
    /// Hook into the session pipeline and return the manager
    pub fn attach(sessions: Arc<SessionManager>) -> Arc<Self> {
        let table = Arc::new(ListenerTable::default());
        let hook_id = sessions.pipeline().install(Arc::new(PacketFilterHook {
            table: table.clone(),
        }));

        Arc::new(Self {
            sessions,
            table,
            hook_id,
            next_listener_id: AtomicU64::new(1),
            closed: AtomicBool::new(false),
        })
    }

    /// Attach the library and announce it in the plugin registry
    pub fn install(plugins: &PluginRegistry, sessions: Arc<SessionManager>) -> Arc<Self> {
        let manager = Self::attach(sessions);
        plugins.register(
            PluginHandle::new(PLUGIN_NAME, env!("CARGO_PKG_VERSION"))
                .with_export(MANAGER_SYMBOL, manager.clone()),
        );
        info!("packetfilter library installed");
        manager
    }

    /// Register a listener
    pub fn add_packet_listener(&self, listener: Arc<dyn PacketAdapter>) -> Result<ListenerId, NetworkError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(NetworkError::ConnectionClosed);
        }
        let id = self.next_listener_id.fetch_add(1, Ordering::SeqCst);
        let whitelist = listener.sending_whitelist();
        self.table.listeners.write().push((id, whitelist, listener));
        debug!(listener_id = id, whitelist = ?whitelist, "packetfilter listener added");
        Ok(id)
    }

    /// Unregister a listener; packets already inside it finish first
    pub fn remove_packet_listener(&self, id: ListenerId) -> bool {
        let mut listeners = self.table.listeners.write();
        let before = listeners.len();
        listeners.retain(|(listener_id, _, _)| *listener_id != id);
        let removed = listeners.len() != before;
        if removed {
            debug!(listener_id = id, "packetfilter listener removed");
        }
        removed
    }

    /// Number of registered listeners
    pub fn listener_count(&self) -> usize {
        self.table.listeners.read().len()
    }

    /// Send a packet to a player through the normal outbound path
    pub fn send_server_packet(&self, player: PlayerId, packet: &OutboundPacket) -> Result<Delivery, NetworkError> {
        self.sessions.send_packet(player, packet)
    }

    /// Online players as seen by the library
    pub fn online_players(&self) -> Vec<PlayerId> {
        self.sessions.online_players()
    }

    /// Detach from the session pipeline; later listener registrations fail
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.table.listeners.write().clear();
            self.sessions.pipeline().remove(self.hook_id);
            info!("packetfilter library closed");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}
