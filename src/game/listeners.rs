//! Gameplay event handlers
//!
//! Entry points the host calls for item drops, pickup attempts and player
//! joins.

use std::sync::Arc;

use tracing::debug;

use crate::host::entity::{ItemEntity, PlayerId};
use crate::state::GuardContext;

use super::notice::{send_notice, Notice};

/// Result of a pickup attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PickupOutcome {
    /// Pickup goes ahead
    Allowed,
    /// Cancelled without a message (item is hidden from the player)
    DeniedSilently,
    /// Cancelled; `notified` tells whether a message was sent
    Denied { notified: bool },
}

impl PickupOutcome {
    pub fn is_allowed(&self) -> bool {
        matches!(self, PickupOutcome::Allowed)
    }
}

/// Handles drop, pickup and join events
#[derive(Clone)]
pub struct ProtectionListener {
    ctx: Arc<GuardContext>,
}

impl ProtectionListener {
    pub fn new(ctx: Arc<GuardContext>) -> Self {
        Self { ctx }
    }

    /// A player dropped an item; returns whether it became protected
    pub fn on_item_drop(&self, player: PlayerId, player_name: &str, item: &ItemEntity) -> bool {
        let debug_enabled = self.ctx.debug();
        if debug_enabled {
            debug!(player = %player_name, item = %item, "Item dropped");
        }

        if !self.ctx.registry.is_protection_enabled(player) {
            if debug_enabled {
                debug!(player = %player_name, "Protection disabled, drop left unprotected");
            }
            return false;
        }

        self.ctx.mark_protected(item, player);
        if self.ctx.notify_on_drop() {
            send_notice(&self.ctx.host.sessions, player, &Notice::ItemProtected);
        }
        true
    }

    /// A player tries to pick up an item
    pub fn on_item_pickup(&self, player: PlayerId, player_name: &str, item: &ItemEntity) -> PickupOutcome {
        let Some(owner) = self.ctx.registry.owner_of(item.uuid) else {
            return PickupOutcome::Allowed;
        };

        if owner != player && !self.ctx.visible_to_others() {
            return PickupOutcome::DeniedSilently;
        }

        if !self.ctx.arbiter.can_pickup(player, item.uuid) {
            let notified = self.ctx.throttle.should_notify(player);
            if notified {
                send_notice(&self.ctx.host.sessions, player, &Notice::PickupDenied);
            }
            if self.ctx.debug() {
                debug!(player = %player_name, entity = %item.uuid, "Pickup denied, item is protected");
            }
            return PickupOutcome::Denied { notified };
        }

        if self.ctx.debug() {
            debug!(player = %player_name, entity = %item.uuid, "Owner collecting protected item");
        }
        self.ctx.release(item);
        PickupOutcome::Allowed
    }

    /// A player finished joining
    pub fn on_player_join(&self, player: PlayerId, player_name: &str) {
        self.ctx.backend().on_player_join(player, player_name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GuardConfig;
    use crate::host::entity::{ItemStack, Location};
    use crate::host::world::DEFAULT_WORLD;
    use crate::host::HostServices;

    fn setup(visible_to_others: bool) -> (Arc<GuardContext>, ProtectionListener, ItemEntity) {
        let mut config = GuardConfig::default();
        config.protection.visibility.visible_to_others = visible_to_others;
        let ctx = GuardContext::new(HostServices::new(), config);
        let item = ctx
            .host
            .drop_item(DEFAULT_WORLD, ItemStack::new(1, 1), Location::default());
        let listener = ProtectionListener::new(ctx.clone());
        (ctx, listener, item)
    }

    #[test]
    fn test_drop_respects_preference() {
        let (ctx, listener, item) = setup(false);
        let alice = PlayerId::from_name("alice");

        ctx.registry.set_preference(alice, false);
        assert!(!listener.on_item_drop(alice, "alice", &item));
        assert!(!ctx.registry.is_protected(item.uuid));

        ctx.registry.set_preference(alice, true);
        assert!(listener.on_item_drop(alice, "alice", &item));
        assert_eq!(ctx.registry.owner_of(item.uuid), Some(alice));
    }

    #[test]
    fn test_hidden_item_denied_silently() {
        let (_ctx, listener, item) = setup(false);
        let alice = PlayerId::from_name("alice");
        listener.on_item_drop(alice, "alice", &item);

        assert_eq!(
            listener.on_item_pickup(PlayerId::from_name("bob"), "bob", &item),
            PickupOutcome::DeniedSilently
        );
    }

    #[test]
    fn test_visible_item_denied_with_throttled_notice() {
        let (_ctx, listener, item) = setup(true);
        let alice = PlayerId::from_name("alice");
        let bob = PlayerId::from_name("bob");
        listener.on_item_drop(alice, "alice", &item);

        assert_eq!(
            listener.on_item_pickup(bob, "bob", &item),
            PickupOutcome::Denied { notified: true }
        );
        assert_eq!(
            listener.on_item_pickup(bob, "bob", &item),
            PickupOutcome::Denied { notified: false }
        );
    }

    #[test]
    fn test_owner_pickup_releases_item() {
        let (ctx, listener, item) = setup(false);
        let alice = PlayerId::from_name("alice");
        listener.on_item_drop(alice, "alice", &item);
        assert!(ctx.glow.contains(item.uuid));

        assert!(listener.on_item_pickup(alice, "alice", &item).is_allowed());
        assert!(!ctx.registry.is_protected(item.uuid));
        assert!(!ctx.glow.contains(item.uuid));
        assert_eq!(ctx.backend().tracked_count(), 0);
    }

    #[test]
    fn test_unprotected_item_allowed() {
        let (_ctx, listener, item) = setup(false);
        assert!(listener
            .on_item_pickup(PlayerId::from_name("bob"), "bob", &item)
            .is_allowed());
    }
}
