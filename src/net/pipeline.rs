//! Outbound packet pipeline
//!
//! Every packet a session sends passes through the installed hooks before it
//! is encoded and queued. Packet libraries install exactly one hook each and
//! fan the packet out to their own listeners.
//!
//! Hooks run on whichever thread is sending, so they must not block.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

use crate::host::entity::PlayerId;
use crate::protocol::packets::OutboundPacket;

use super::session::SessionId;

/// Identifier of an installed hook
pub type HookId = u64;

/// Outcome of running a packet through a hook
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookVerdict {
    /// Let the packet continue
    Forward,
    /// Drop the packet
    Cancel,
}

/// Destination of an outbound packet
#[derive(Debug, Clone)]
pub struct OutboundContext {
    /// Session the packet is written to
    pub session_id: SessionId,
    /// Player bound to the session (None before login completes)
    pub player: Option<PlayerId>,
    /// Player name (empty before login completes)
    pub player_name: Arc<str>,
}

/// A hook on the outbound packet path
pub trait OutboundHook: Send + Sync {
    /// Name used in logs
    fn name(&self) -> &str;

    /// Inspect a packet about to be sent
    fn on_outbound(&self, ctx: &OutboundContext, packet: &OutboundPacket) -> HookVerdict;
}

/// Ordered set of outbound hooks
pub struct OutboundPipeline {
    hooks: RwLock<Vec<(HookId, Arc<dyn OutboundHook>)>>,
    next_id: AtomicU64,
}

impl Default for OutboundPipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl OutboundPipeline {
    /// Create an empty pipeline
    pub fn new() -> Self {
        Self {
            hooks: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Install a hook at the end of the pipeline
    pub fn install(&self, hook: Arc<dyn OutboundHook>) -> HookId {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        debug!(hook_id = id, hook = hook.name(), "Installing outbound hook");
        self.hooks.write().push((id, hook));
        id
    }

    /// Remove a hook. Waits for packets currently inside the hook to finish.
    pub fn remove(&self, id: HookId) -> bool {
        let mut hooks = self.hooks.write();
        let before = hooks.len();
        hooks.retain(|(hook_id, _)| *hook_id != id);
        let removed = hooks.len() != before;
        if removed {
            debug!(hook_id = id, "Removed outbound hook");
        }
        removed
    }

    /// Number of installed hooks
    pub fn len(&self) -> usize {
        self.hooks.read().len()
    }

    /// Check if no hook is installed
    pub fn is_empty(&self) -> bool {
        self.hooks.read().is_empty()
    }

    /// Run a packet through every hook; the first cancel wins
    pub fn process(&self, ctx: &OutboundContext, packet: &OutboundPacket) -> HookVerdict {
        let hooks = self.hooks.read();
        for (_, hook) in hooks.iter() {
            if hook.on_outbound(ctx, packet) == HookVerdict::Cancel {
                return HookVerdict::Cancel;
            }
        }
        HookVerdict::Forward
    }
}
