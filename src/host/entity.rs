//! Entity identities and item entities
//!
//! Two identity schemes exist for the same item entity:
//! - `EntityUuid`: stable for the lifetime of the entity, used by gameplay code
//! - `EntityId`: transient numeric id the network protocol refers to
//!
//! They are distinct types so the two keyspaces can never be mixed.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Stable identity of a player
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PlayerId(pub Uuid);

impl PlayerId {
    pub fn new_v4() -> Self {
        Self(Uuid::new_v4())
    }

    /// Deterministic id derived from a player name (offline-mode style)
    pub fn from_name(name: &str) -> Self {
        Self(Uuid::new_v5(&Uuid::NAMESPACE_OID, name.to_lowercase().as_bytes()))
    }

    /// The all-zero id some clients report before login completes
    pub fn is_nil(&self) -> bool {
        self.0.is_nil()
    }
}

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Stable identity of an entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityUuid(pub Uuid);

impl EntityUuid {
    pub fn new_v4() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for EntityUuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Network entity id, valid only while the entity is alive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityId(pub i32);

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A location in a world
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Location {
    /// X coordinate
    pub x: i32,
    /// Y (height) coordinate
    pub y: i32,
    /// Z coordinate
    pub z: i32,
}

impl Location {
    /// Create a new location
    pub fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    /// Check if within a horizontal square distance of another location
    pub fn within_distance(&self, other: &Location, distance: i32) -> bool {
        (self.x - other.x).abs() <= distance && (self.z - other.z).abs() <= distance
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.x, self.y, self.z)
    }
}

/// An item type and amount
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ItemStack {
    /// Item type id
    pub item_id: u16,
    /// Stack size
    pub amount: u32,
}

impl ItemStack {
    pub fn new(item_id: u16, amount: u32) -> Self {
        Self { item_id, amount }
    }
}

/// A dropped item entity lying in a world
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemEntity {
    /// Stable identity
    pub uuid: EntityUuid,
    /// Network identity
    pub id: EntityId,
    /// Name of the world the item lies in
    pub world: String,
    /// The dropped stack
    pub stack: ItemStack,
    /// Position in the world
    pub location: Location,
}

impl fmt::Display for ItemEntity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "item {} x{} {} in {} at {}",
            self.stack.item_id, self.stack.amount, self.id, self.world, self.location
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_player_id_from_name_is_case_insensitive() {
        assert_eq!(PlayerId::from_name("Steve"), PlayerId::from_name("steve"));
        assert_ne!(PlayerId::from_name("Steve"), PlayerId::from_name("Alex"));
        assert!(!PlayerId::from_name("Steve").is_nil());
        assert!(PlayerId(Uuid::nil()).is_nil());
    }

    #[test]
    fn test_location_distance() {
        let a = Location::new(0, 64, 0);
        assert!(a.within_distance(&Location::new(10, 70, -10), 10));
        assert!(!a.within_distance(&Location::new(11, 64, 0), 10));
    }

    #[test]
    fn test_display() {
        assert_eq!(EntityId(42).to_string(), "#42");
        assert_eq!(Location::new(1, 2, 3).to_string(), "(1, 2, 3)");
    }
}
