//! Networking module
//!
//! This module handles the network side of the host:
//! - Packet buffer with checked reads
//! - Session management and outbound queues
//! - Outbound hook pipeline used by packet libraries

pub mod buffer;
pub mod pipeline;
pub mod session;
