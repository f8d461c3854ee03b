//! Game module
//!
//! Glue between host events and the protection core:
//! - Event handlers for drops, pickups and joins
//! - Player and admin commands
//! - Player-facing notices

pub mod commands;
pub mod listeners;
pub mod notice;

pub use commands::{CommandDispatcher, CommandSender};
pub use listeners::{PickupOutcome, ProtectionListener};
pub use notice::Notice;
