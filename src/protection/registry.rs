//! Ownership registry
//!
//! Authoritative record of which dropped item belongs to which player,
//! together with each player's protection preference. Written from gameplay
//! events and read from network callbacks; every operation is safe under
//! concurrent callers and none blocks on I/O.

use std::sync::atomic::{AtomicBool, Ordering};

use dashmap::DashMap;
use tracing::trace;

use crate::host::entity::{EntityUuid, PlayerId};
use crate::host::world::WorldView;
use crate::visibility::items::{ProtectedItemRecord, ProtectedItems};
use crate::visibility::janitor::SweepTarget;

/// Snapshot of registry counters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistryStats {
    pub protected_items: usize,
    pub players_opted_in: usize,
    pub players_opted_out: usize,
    pub default_enabled: bool,
}

/// Item ownership and player preferences
pub struct OwnershipRegistry {
    items: ProtectedItems<EntityUuid>,
    /// Explicit per-player choices; absent means the default applies
    preferences: DashMap<PlayerId, bool>,
    default_enabled: AtomicBool,
}

impl OwnershipRegistry {
    pub fn new(default_enabled: bool) -> Self {
        Self {
            items: ProtectedItems::new("registry"),
            preferences: DashMap::new(),
            default_enabled: AtomicBool::new(default_enabled),
        }
    }

    /// Record the owner of an item, replacing any previous owner
    pub fn register(&self, entity: EntityUuid, owner: PlayerId) {
        if let Some(previous) = self.items.insert(entity, owner) {
            if previous != owner {
                trace!(entity = %entity, previous = %previous, owner = %owner, "Item owner replaced");
            }
        }
    }

    /// Forget an item; absent items are ignored
    pub fn unregister(&self, entity: EntityUuid) -> Option<ProtectedItemRecord<EntityUuid>> {
        self.items.remove(entity)
    }

    pub fn is_protected(&self, entity: EntityUuid) -> bool {
        self.items.contains(entity)
    }

    pub fn owner_of(&self, entity: EntityUuid) -> Option<PlayerId> {
        self.items.owner_of(entity)
    }

    pub fn record(&self, entity: EntityUuid) -> Option<ProtectedItemRecord<EntityUuid>> {
        self.items.record(entity)
    }

    /// Number of protected items
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Snapshot of protected item identities
    pub fn identities(&self) -> Vec<EntityUuid> {
        self.items.keys()
    }

    /// Record an explicit protection choice for a player
    pub fn set_preference(&self, player: PlayerId, enabled: bool) {
        self.preferences.insert(player, enabled);
    }

    /// Whether drops by this player are protected
    pub fn is_protection_enabled(&self, player: PlayerId) -> bool {
        self.preferences
            .get(&player)
            .map(|choice| *choice)
            .unwrap_or_else(|| self.default_enabled())
    }

    /// Flip a player's preference; returns the new state
    pub fn toggle_preference(&self, player: PlayerId) -> bool {
        let default = self.default_enabled();
        let mut entry = self.preferences.entry(player).or_insert(default);
        *entry = !*entry;
        *entry
    }

    pub fn default_enabled(&self) -> bool {
        self.default_enabled.load(Ordering::Acquire)
    }

    pub fn set_default_enabled(&self, enabled: bool) {
        self.default_enabled.store(enabled, Ordering::Release);
    }

    /// Drop every explicit preference
    pub fn clear_preferences(&self) {
        self.preferences.clear();
    }

    pub fn stats(&self) -> RegistryStats {
        let opted_out = self.preferences.iter().filter(|p| !*p.value()).count();
        RegistryStats {
            protected_items: self.items.len(),
            players_opted_in: self.preferences.len() - opted_out,
            players_opted_out: opted_out,
            default_enabled: self.default_enabled(),
        }
    }
}

impl SweepTarget for OwnershipRegistry {
    fn label(&self) -> &str {
        "registry"
    }

    fn sweep(&self, world: &dyn WorldView) -> usize {
        self.items.evict_missing(world)
    }

    fn tracked(&self) -> usize {
        self.items.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_register_and_unregister() {
        let registry = OwnershipRegistry::new(true);
        let item = EntityUuid::new_v4();
        let alice = PlayerId::from_name("alice");

        registry.register(item, alice);
        assert!(registry.is_protected(item));
        assert_eq!(registry.owner_of(item), Some(alice));
        assert_eq!(registry.record(item).unwrap().owner, alice);

        assert!(registry.unregister(item).is_some());
        assert!(!registry.is_protected(item));
        assert!(registry.unregister(item).is_none());
    }

    #[test]
    fn test_preferences_fall_back_to_default() {
        let registry = OwnershipRegistry::new(true);
        let alice = PlayerId::from_name("alice");

        assert!(registry.is_protection_enabled(alice));
        registry.set_preference(alice, false);
        assert!(!registry.is_protection_enabled(alice));

        registry.clear_preferences();
        registry.set_default_enabled(false);
        assert!(!registry.is_protection_enabled(alice));
    }

    #[test]
    fn test_toggle_with_default_disabled() {
        let registry = OwnershipRegistry::new(false);
        let bob = PlayerId::from_name("bob");

        assert!(registry.toggle_preference(bob));
        assert!(registry.is_protection_enabled(bob));
        assert!(!registry.toggle_preference(bob));
        assert!(!registry.is_protection_enabled(bob));
    }

    #[test]
    fn test_stats() {
        let registry = OwnershipRegistry::new(true);
        registry.register(EntityUuid::new_v4(), PlayerId::from_name("a"));
        registry.set_preference(PlayerId::from_name("a"), false);
        registry.set_preference(PlayerId::from_name("b"), true);

        let stats = registry.stats();
        assert_eq!(stats.protected_items, 1);
        assert_eq!(stats.players_opted_in, 1);
        assert_eq!(stats.players_opted_out, 1);
        assert!(stats.default_enabled);
    }

    #[test]
    fn test_concurrent_register_last_writer_wins() {
        let registry = Arc::new(OwnershipRegistry::new(true));
        let item = EntityUuid::new_v4();

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let registry = registry.clone();
                thread::spawn(move || registry.register(item, PlayerId::from_name(&format!("p{}", i))))
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(registry.len(), 1);
        let owner = registry.owner_of(item).unwrap();
        assert!((0..8).any(|i| PlayerId::from_name(&format!("p{}", i)) == owner));
    }
}
