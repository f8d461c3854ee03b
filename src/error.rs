//! Error handling module
//!
//! Defines custom error types for the Lootguard server.

use std::io;

use thiserror::Error;

use crate::host::entity::PlayerId;
use crate::protocol::packets::PacketDecodeError;

/// Main error type for Lootguard
#[derive(Error, Debug)]
pub enum GuardError {
    /// Network-related errors
    #[error("Network error: {0}")]
    Network(#[from] NetworkError),

    /// Packet encoding/decoding errors
    #[error("Protocol error: {0}")]
    Protocol(#[from] PacketDecodeError),

    /// Visibility backend errors
    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    /// Glow rendering errors
    #[error("Glow error: {0}")]
    Glow(#[from] GlowError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Generic internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Network-specific errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NetworkError {
    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Write buffer full")]
    WriteBufferFull,

    #[error("Player not connected: {0}")]
    PlayerNotConnected(PlayerId),

    #[error("Session not found: {0}")]
    SessionNotFound(u64),
}

/// Errors raised while probing, initializing or reinstalling a visibility backend
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    #[error("Packet library '{0}' is not installed")]
    LibraryMissing(&'static str),

    #[error("Packet library '{0}' is installed but disabled")]
    LibraryDisabled(&'static str),

    #[error("Packet library '{library}' does not export '{symbol}' with the expected type")]
    ApiMismatch {
        library: &'static str,
        symbol: &'static str,
    },

    #[error("Packet library '{library}' failed to initialize: {reason}")]
    InitializationFailed {
        library: &'static str,
        reason: String,
    },

    #[error("Failed to install packet listener: {0}")]
    ListenerInstall(String),
}

/// Errors raised by the cosmetic glow effect
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GlowError {
    #[error("Glow effect is disabled")]
    Disabled,

    #[error("Unknown glow color: {0}")]
    UnknownColor(String),
}

/// Result type alias for Lootguard operations
pub type Result<T> = std::result::Result<T, GuardError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = NetworkError::ConnectionClosed;
        assert_eq!(err.to_string(), "Connection closed");

        let err = BackendError::ApiMismatch {
            library: "packetwire",
            symbol: "api",
        };
        assert_eq!(
            err.to_string(),
            "Packet library 'packetwire' does not export 'api' with the expected type"
        );

        let err = GlowError::UnknownColor("PINK".to_string());
        assert_eq!(err.to_string(), "Unknown glow color: PINK");
    }

    #[test]
    fn test_error_conversion() {
        let err: GuardError = BackendError::LibraryMissing("packetfilter").into();
        assert!(matches!(err, GuardError::Backend(_)));
        assert_eq!(
            err.to_string(),
            "Backend error: Packet library 'packetfilter' is not installed"
        );

        let err: GuardError = NetworkError::WriteBufferFull.into();
        assert!(matches!(err, GuardError::Network(NetworkError::WriteBufferFull)));
    }
}
