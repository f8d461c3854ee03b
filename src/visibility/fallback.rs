//! Fallback backend
//!
//! Used when no packet library is installed. It keeps its own UUID-keyed
//! record of protected items so the janitor and diagnostics still work, but
//! it cannot hide anything from other players.

use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, info};

use crate::error::BackendError;
use crate::host::entity::{EntityUuid, ItemEntity, PlayerId};

use super::items::ProtectedItems;
use super::janitor::SweepTarget;
use super::{BackendKind, DecisionStats, VisibilityBackend, VisibilitySettings};

/// Bookkeeping-only backend
pub struct FallbackBackend {
    items: Arc<ProtectedItems<EntityUuid>>,
    settings: RwLock<VisibilitySettings>,
}

impl FallbackBackend {
    pub fn new(settings: VisibilitySettings) -> Self {
        Self {
            items: Arc::new(ProtectedItems::new("fallback")),
            settings: RwLock::new(settings),
        }
    }
}

impl VisibilityBackend for FallbackBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Fallback
    }

    fn register_protected_item(&self, item: &ItemEntity, owner: PlayerId) {
        self.items.insert(item.uuid, owner);
        let settings = self.settings();
        if settings.debug {
            debug!(entity = %item.uuid, owner = %owner, "Registered protected item");
            if !settings.visible_to_others {
                debug!(entity = %item.uuid, "Cannot hide item without a packet library");
            }
        }
    }

    fn unregister_protected_item(&self, item: &ItemEntity) {
        if self.items.remove(item.uuid).is_some() && self.settings().debug {
            debug!(entity = %item.uuid, "Unregistered protected item");
        }
    }

    fn owner_of(&self, item: &ItemEntity) -> Option<PlayerId> {
        self.items.owner_of(item.uuid)
    }

    fn reinitialize(&self, settings: VisibilitySettings) -> Result<(), BackendError> {
        *self.settings.write() = settings;
        if settings.debug {
            debug!(visible_to_others = settings.visible_to_others, "Fallback backend reinitialized");
        }
        Ok(())
    }

    fn settings(&self) -> VisibilitySettings {
        *self.settings.read()
    }

    fn on_player_join(&self, player: PlayerId, name: &str) {
        if self.settings().visible_to_others {
            return;
        }
        let foreign = self
            .items
            .keys()
            .into_iter()
            .filter(|uuid| self.items.owner_of(*uuid).is_some_and(|owner| owner != player))
            .count();
        if foreign > 0 {
            info!(
                player = %name,
                items = foreign,
                "Protected items cannot be hidden from joining player without a packet library"
            );
        }
    }

    fn tracked_count(&self) -> usize {
        self.items.len()
    }

    fn sweep_target(&self) -> Arc<dyn SweepTarget> {
        self.items.clone()
    }

    fn decision_stats(&self) -> DecisionStats {
        DecisionStats::default()
    }

    fn shutdown(&self) {}
}
