//! Protection module
//!
//! Gameplay-side protection of dropped items:
//! - Ownership registry and player preferences
//! - Pickup decisions
//! - Denied-pickup notification throttle
//! - Cosmetic glow for protected items

pub mod arbiter;
pub mod glow;
pub mod registry;
pub mod throttle;

pub use arbiter::PickupArbiter;
pub use glow::{GlowColor, GlowEffect};
pub use registry::OwnershipRegistry;
pub use throttle::NotificationThrottle;
