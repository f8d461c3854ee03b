//! Lootguard Library
//!
//! Protects player-dropped items in a shared world: remembers who dropped
//! what, keeps other players from picking it up and, when the host has a
//! packet library installed, hides the item from everyone but its owner.
//!
//! ## Modules
//!
//! - `config` - Configuration loading and validation
//! - `error` - Error types and result definitions
//! - `game` - Event handlers, commands and player notices
//! - `host` - In-process game host (worlds, plugins, packet libraries)
//! - `net` - Sessions, packet buffer and the outbound hook pipeline
//! - `protection` - Ownership registry, pickup rules, throttle and glow
//! - `protocol` - Entity packet codec
//! - `state` - Shared protection context
//! - `visibility` - Packet-level visibility backends and the janitor

pub mod config;
pub mod error;
pub mod game;
pub mod host;
pub mod net;
pub mod protection;
pub mod protocol;
pub mod state;
pub mod visibility;

// Re-export commonly used types
pub use config::GuardConfig;
pub use error::{GuardError, Result};
pub use state::GuardContext;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
