//! Pickup decisions

use std::sync::Arc;

use crate::host::entity::{EntityUuid, PlayerId};

use super::registry::OwnershipRegistry;

/// Decides whether a player may collect a dropped item
#[derive(Clone)]
pub struct PickupArbiter {
    registry: Arc<OwnershipRegistry>,
}

impl PickupArbiter {
    pub fn new(registry: Arc<OwnershipRegistry>) -> Self {
        Self { registry }
    }

    /// Unprotected items are free for all; protected items only for their owner
    pub fn can_pickup(&self, player: PlayerId, entity: EntityUuid) -> bool {
        match self.registry.owner_of(entity) {
            None => true,
            Some(owner) => owner == player,
        }
    }
}
