//! Protocol module
//!
//! Entity packets sent from the server to clients and their frame format.

pub mod packets;
