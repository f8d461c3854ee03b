//! Session management module
//!
//! Manages connected client sessions:
//! - Session lifecycle (creation, login, removal)
//! - Player lookup by id
//! - Outbound packet delivery through the hook pipeline

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use dashmap::DashMap;
use parking_lot::RwLock;
use tokio::sync::mpsc;
use tracing::{debug, info, trace};

use crate::error::NetworkError;
use crate::host::entity::PlayerId;
use crate::protocol::packets::OutboundPacket;

use super::pipeline::{HookVerdict, OutboundContext, OutboundPipeline};

/// Unique session identifier
pub type SessionId = u64;

/// Default capacity of a session's outbound queue
pub const OUTBOUND_QUEUE_CAPACITY: usize = 256;

/// Session state in the connection lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    /// Connected, login not completed
    Connected,
    /// Fully authenticated and in-game
    InGame,
    /// Session has been disconnected
    Disconnected,
}

impl SessionState {
    /// Get a human-readable name for the state
    pub fn name(&self) -> &'static str {
        match self {
            SessionState::Connected => "Connected",
            SessionState::InGame => "InGame",
            SessionState::Disconnected => "Disconnected",
        }
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Player bound to a session after login
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionPlayer {
    pub id: PlayerId,
    pub name: String,
    /// Whether the player may run admin commands
    pub admin: bool,
}

/// Result of sending a packet to a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Encoded and queued
    Queued,
    /// Dropped by an outbound hook
    Suppressed,
}

/// A connected client session
pub struct Session {
    /// Unique session identifier
    pub id: SessionId,
    /// Remote address of the client
    pub address: SocketAddr,
    /// Current session state
    state: RwLock<SessionState>,
    /// Player bound to this session
    player: RwLock<Option<SessionPlayer>>,
    /// Destination descriptor cached at login
    outbound: RwLock<OutboundContext>,
    /// Time of session creation
    pub created_at: Instant,
    /// Outbound frame channel
    outbound_tx: Option<mpsc::Sender<Bytes>>,
}

impl Session {
    /// Create a new session
    pub fn new(id: SessionId, address: SocketAddr) -> Self {
        Self {
            id,
            address,
            state: RwLock::new(SessionState::Connected),
            player: RwLock::new(None),
            outbound: RwLock::new(OutboundContext {
                session_id: id,
                player: None,
                player_name: Arc::from(""),
            }),
            created_at: Instant::now(),
            outbound_tx: None,
        }
    }

    /// Create a new session with an outbound channel
    pub fn with_channel(id: SessionId, address: SocketAddr, outbound_tx: mpsc::Sender<Bytes>) -> Self {
        let mut session = Self::new(id, address);
        session.outbound_tx = Some(outbound_tx);
        session
    }

    /// Get the current session state
    pub fn state(&self) -> SessionState {
        *self.state.read()
    }

    /// Set the session state
    pub fn set_state(&self, new_state: SessionState) {
        let old_state = std::mem::replace(&mut *self.state.write(), new_state);
        debug!(
            session_id = self.id,
            old_state = %old_state,
            new_state = %new_state,
            "Session state changed"
        );
    }

    /// Player bound to this session
    pub fn player(&self) -> Option<SessionPlayer> {
        self.player.read().clone()
    }

    /// Player id bound to this session
    pub fn player_id(&self) -> Option<PlayerId> {
        self.player.read().as_ref().map(|p| p.id)
    }

    fn bind_player(&self, player: SessionPlayer) {
        {
            let mut outbound = self.outbound.write();
            outbound.player = Some(player.id);
            outbound.player_name = Arc::from(player.name.as_str());
        }
        *self.player.write() = Some(player);
        self.set_state(SessionState::InGame);
    }

    /// Destination descriptor handed to outbound hooks
    pub fn outbound_context(&self) -> OutboundContext {
        self.outbound.read().clone()
    }

    /// Queue an encoded frame without blocking
    pub fn try_send(&self, frame: Bytes) -> Result<(), NetworkError> {
        if let Some(tx) = &self.outbound_tx {
            tx.try_send(frame).map_err(|e| match e {
                mpsc::error::TrySendError::Full(_) => NetworkError::WriteBufferFull,
                mpsc::error::TrySendError::Closed(_) => NetworkError::ConnectionClosed,
            })?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("address", &self.address)
            .field("state", &self.state())
            .field("player", &self.player())
            .field("created_at", &self.created_at)
            .finish()
    }
}

/// Thread-safe session manager
pub struct SessionManager {
    /// Map of session ID to session
    sessions: DashMap<SessionId, Arc<Session>>,
    /// Map of player ID to session ID (for logged-in players)
    player_to_session: DashMap<PlayerId, SessionId>,
    /// Hooks every outbound packet passes through
    pipeline: Arc<OutboundPipeline>,
    /// Next session ID to assign
    next_id: AtomicU64,
}

impl Default for SessionManager {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionManager {
    /// Create a new session manager
    pub fn new() -> Self {
        Self {
            sessions: DashMap::new(),
            player_to_session: DashMap::new(),
            pipeline: Arc::new(OutboundPipeline::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// The outbound hook pipeline
    pub fn pipeline(&self) -> &Arc<OutboundPipeline> {
        &self.pipeline
    }

    /// Create a session with an outbound channel
    pub fn create_session(&self, address: SocketAddr, outbound_tx: mpsc::Sender<Bytes>) -> Arc<Session> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let session = Arc::new(Session::with_channel(id, address, outbound_tx));
        self.sessions.insert(id, session.clone());

        info!(session_id = id, address = %address, "Session created");
        session
    }

    /// Bind a player to a session after login
    pub fn login(&self, session_id: SessionId, player: SessionPlayer) -> Result<(), NetworkError> {
        let session = self
            .get(session_id)
            .ok_or(NetworkError::SessionNotFound(session_id))?;

        self.player_to_session.insert(player.id, session_id);

        info!(
            session_id = session_id,
            player = %player.id,
            name = %player.name,
            "Player logged in"
        );
        session.bind_player(player);
        Ok(())
    }

    /// Get a session by ID
    pub fn get(&self, id: SessionId) -> Option<Arc<Session>> {
        self.sessions.get(&id).map(|r| r.clone())
    }

    /// Get the session of an online player
    pub fn get_by_player(&self, player: PlayerId) -> Option<Arc<Session>> {
        self.player_to_session
            .get(&player)
            .and_then(|id| self.get(*id))
    }

    /// Snapshot of online player ids
    pub fn online_players(&self) -> Vec<PlayerId> {
        self.player_to_session.iter().map(|r| *r.key()).collect()
    }

    /// Remove a session
    pub fn remove(&self, id: SessionId) {
        if let Some((_, session)) = self.sessions.remove(&id) {
            if let Some(player) = session.player() {
                self.player_to_session.remove(&player.id);
            }
            session.set_state(SessionState::Disconnected);

            info!(session_id = id, player = ?session.player_id(), "Session removed");
        }
    }

    /// Get the count of logged-in players
    pub fn player_count(&self) -> usize {
        self.player_to_session.len()
    }

    /// Send a packet to a session through the hook pipeline
    pub fn send_to_session(
        &self,
        session: &Session,
        packet: &OutboundPacket,
    ) -> Result<Delivery, NetworkError> {
        let ctx = session.outbound_context();
        if self.pipeline.process(&ctx, packet) == HookVerdict::Cancel {
            trace!(session_id = session.id, kind = ?packet.kind(), "Outbound packet suppressed");
            return Ok(Delivery::Suppressed);
        }
        session.try_send(packet.encode_frame())?;
        Ok(Delivery::Queued)
    }

    /// Send a packet to an online player through the hook pipeline
    pub fn send_packet(&self, player: PlayerId, packet: &OutboundPacket) -> Result<Delivery, NetworkError> {
        let session = self
            .get_by_player(player)
            .ok_or(NetworkError::PlayerNotConnected(player))?;
        self.send_to_session(&session, packet)
    }

    /// Send a packet to every session; returns how many were queued
    pub fn broadcast(&self, packet: &OutboundPacket) -> usize {
        let sessions: Vec<Arc<Session>> = self.sessions.iter().map(|r| r.value().clone()).collect();
        let mut queued = 0;
        for session in sessions {
            match self.send_to_session(&session, packet) {
                Ok(Delivery::Queued) => queued += 1,
                Ok(Delivery::Suppressed) => {}
                Err(e) => debug!(session_id = session.id, error = %e, "Broadcast send failed"),
            }
        }
        queued
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::pipeline::OutboundHook;
    use crate::protocol::packets::SystemMessagePacket;

    fn test_address() -> SocketAddr {
        "127.0.0.1:25565".parse().unwrap()
    }

    fn player(name: &str) -> SessionPlayer {
        SessionPlayer {
            id: PlayerId::from_name(name),
            name: name.to_string(),
            admin: false,
        }
    }

    struct DropSystemMessages;

    impl OutboundHook for DropSystemMessages {
        fn name(&self) -> &str {
            "drop-system-messages"
        }

        fn on_outbound(&self, _ctx: &OutboundContext, packet: &OutboundPacket) -> HookVerdict {
            match packet {
                OutboundPacket::SystemMessage(_) => HookVerdict::Cancel,
                _ => HookVerdict::Forward,
            }
        }
    }

    #[test]
    fn test_session_login_and_lookup() {
        let manager = SessionManager::new();
        let (tx, _rx) = mpsc::channel(8);
        let session = manager.create_session(test_address(), tx);
        assert_eq!(session.state(), SessionState::Connected);
        assert!(session.player_id().is_none());

        manager.login(session.id, player("Alice")).unwrap();

        let id = PlayerId::from_name("alice");
        assert_eq!(session.state(), SessionState::InGame);
        assert_eq!(manager.online_players(), vec![id]);
        assert_eq!(&*session.outbound_context().player_name, "Alice");
        assert_eq!(manager.get_by_player(id).unwrap().id, session.id);
    }

    #[test]
    fn test_login_unknown_session() {
        let manager = SessionManager::new();
        assert_eq!(
            manager.login(99, player("bob")),
            Err(NetworkError::SessionNotFound(99))
        );
    }

    #[test]
    fn test_remove_session() {
        let manager = SessionManager::new();
        let (tx, _rx) = mpsc::channel(8);
        let session = manager.create_session(test_address(), tx);
        manager.login(session.id, player("bob")).unwrap();

        manager.remove(session.id);

        assert!(manager.get(session.id).is_none());
        assert_eq!(manager.player_count(), 0);
        assert!(manager.get_by_player(PlayerId::from_name("bob")).is_none());
        assert_eq!(session.state(), SessionState::Disconnected);
    }

    #[test]
    fn test_send_packet_queues_frame() {
        let manager = SessionManager::new();
        let (tx, mut rx) = mpsc::channel(8);
        let session = manager.create_session(test_address(), tx);
        manager.login(session.id, player("carol")).unwrap();

        let packet = OutboundPacket::from(SystemMessagePacket::new("hello"));
        let delivery = manager
            .send_packet(PlayerId::from_name("carol"), &packet)
            .unwrap();

        assert_eq!(delivery, Delivery::Queued);
        let frame = rx.try_recv().unwrap();
        assert_eq!(OutboundPacket::decode_frame(&frame).unwrap(), packet);
    }

    #[test]
    fn test_send_packet_offline_player() {
        let manager = SessionManager::new();
        let packet = OutboundPacket::from(SystemMessagePacket::new("hello"));
        let offline = PlayerId::from_name("nobody");
        assert_eq!(
            manager.send_packet(offline, &packet),
            Err(NetworkError::PlayerNotConnected(offline))
        );
    }

    #[test]
    fn test_hook_suppresses_delivery() {
        let manager = SessionManager::new();
        manager.pipeline().install(Arc::new(DropSystemMessages));
        let (tx, mut rx) = mpsc::channel(8);
        let session = manager.create_session(test_address(), tx);

        let packet = OutboundPacket::from(SystemMessagePacket::new("hello"));
        assert_eq!(
            manager.send_to_session(&session, &packet).unwrap(),
            Delivery::Suppressed
        );
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_full_queue_reports_error() {
        let manager = SessionManager::new();
        let (tx, _rx) = mpsc::channel(1);
        let session = manager.create_session(test_address(), tx);
        let packet = OutboundPacket::from(SystemMessagePacket::new("hello"));

        assert!(manager.send_to_session(&session, &packet).is_ok());
        assert_eq!(
            manager.send_to_session(&session, &packet),
            Err(NetworkError::WriteBufferFull)
        );
    }
}
