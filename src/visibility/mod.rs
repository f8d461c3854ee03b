//! Visibility module
//!
//! Hides protected items from everyone but their owner at the packet level.
//! Exactly one backend is active, chosen once at startup by probing which
//! packet library the host has installed:
//! 1. `packetfilter` (typed listeners)
//! 2. `packetwire` (raw listeners, resolved through plugin exports)
//! 3. fallback (no interception, bookkeeping only)

pub mod fallback;
pub mod items;
pub mod janitor;
pub mod packetfilter;
pub mod packetwire;

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::error::BackendError;
use crate::host::entity::{EntityId, ItemEntity, PlayerId};
use crate::host::HostServices;

use self::fallback::FallbackBackend;
use self::items::ProtectedItems;
use self::janitor::SweepTarget;
use self::packetfilter::PacketFilterBackend;
use self::packetwire::PacketWireBackend;

/// Which backend is active
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendKind {
    PacketFilter,
    PacketWire,
    Fallback,
}

impl BackendKind {
    pub fn name(&self) -> &'static str {
        match self {
            BackendKind::PacketFilter => "packetfilter",
            BackendKind::PacketWire => "packetwire",
            BackendKind::Fallback => "fallback",
        }
    }

    /// Whether the backend can actually hide items
    pub fn intercepts_packets(&self) -> bool {
        !matches!(self, BackendKind::Fallback)
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Settings a backend listener is installed with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct VisibilitySettings {
    pub visible_to_others: bool,
    pub debug: bool,
}

/// Suppress/allow counters of a backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DecisionStats {
    pub suppressed: u64,
    pub allowed: u64,
}

#[derive(Debug, Default)]
pub(crate) struct DecisionCounter {
    suppressed: AtomicU64,
    allowed: AtomicU64,
}

impl DecisionCounter {
    pub(crate) fn suppress(&self) {
        self.suppressed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn allow(&self) {
        self.allowed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> DecisionStats {
        DecisionStats {
            suppressed: self.suppressed.load(Ordering::Relaxed),
            allowed: self.allowed.load(Ordering::Relaxed),
        }
    }
}

/// A strategy for hiding protected items
pub trait VisibilityBackend: Send + Sync {
    fn kind(&self) -> BackendKind;

    /// Start hiding an item from everyone but its owner
    fn register_protected_item(&self, item: &ItemEntity, owner: PlayerId);

    /// Stop tracking an item
    fn unregister_protected_item(&self, item: &ItemEntity);

    /// Owner as known to this backend
    fn owner_of(&self, item: &ItemEntity) -> Option<PlayerId>;

    /// Remove the current listener, then install one for `settings`
    fn reinitialize(&self, settings: VisibilitySettings) -> Result<(), BackendError>;

    /// Settings of the installed listener
    fn settings(&self) -> VisibilitySettings;

    fn on_player_join(&self, player: PlayerId, name: &str);

    /// Number of items this backend tracks
    fn tracked_count(&self) -> usize;

    /// Map the janitor should sweep
    fn sweep_target(&self) -> Arc<dyn SweepTarget>;

    fn decision_stats(&self) -> DecisionStats;

    /// Remove the listener for good
    fn shutdown(&self);
}

/// Suppression decision shared by the packet backends. Captures the settings
/// the listener was installed with.
pub(crate) struct SuppressionRule {
    pub(crate) items: Arc<ProtectedItems<EntityId>>,
    pub(crate) settings: VisibilitySettings,
    pub(crate) stats: Arc<DecisionCounter>,
}

impl SuppressionRule {
    pub(crate) fn should_suppress(&self, entity: EntityId, viewer: PlayerId, viewer_name: &str) -> bool {
        if self.settings.visible_to_others {
            return false;
        }
        let Some(owner) = self.items.owner_of(entity) else {
            return false;
        };

        if owner == viewer {
            self.stats.allow();
            false
        } else {
            self.stats.suppress();
            if self.settings.debug {
                debug!(entity = %entity, viewer = %viewer_name, "Suppressed packet for protected item");
            }
            true
        }
    }
}

/// Probe the host for packet libraries and build the best available backend
pub fn select_backend(host: &HostServices, settings: VisibilitySettings) -> Arc<dyn VisibilityBackend> {
    match PacketFilterBackend::connect(&host.plugins, settings) {
        Ok(backend) => {
            info!(backend = %BackendKind::PacketFilter, "Visibility backend selected");
            return Arc::new(backend);
        }
        Err(e) => warn!(error = %e, "packetfilter backend unavailable"),
    }

    match PacketWireBackend::connect(&host.plugins, settings) {
        Ok(backend) => {
            info!(backend = %BackendKind::PacketWire, "Visibility backend selected");
            return Arc::new(backend);
        }
        Err(e) => warn!(error = %e, "packetwire backend unavailable"),
    }

    warn!("No packet library found, protected items will stay visible to other players");
    Arc::new(FallbackBackend::new(settings))
}

/// Janitor interval for the active backend
pub fn sweep_interval(kind: BackendKind, registry_interval: Duration, packet_interval: Duration) -> Duration {
    if kind.intercepts_packets() {
        packet_interval
    } else {
        registry_interval
    }
}
