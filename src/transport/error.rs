//! Transport layer error types.
//!
//! Per-packet errors are dropped silently and counted; only connection-level
//! failures change the session state.

use std::io;

use thiserror::Error;

use super::connection::SessionState;
use super::packet::PacketError;
use super::packetizer::PacketizeError;
use crate::core::{CryptoError, MediaKind, SourceError, VoiceError};

/// Failures while establishing the media path.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HandshakeError {
    /// The remote host did not resolve to any address.
    #[error("could not resolve voice server {host}")]
    Resolve {
        /// Host as given in the session parameters.
        host: String,
    },

    /// No discovery response after every retry.
    #[error("IP discovery timed out after {attempts} attempts")]
    Timeout {
        /// Attempts made.
        attempts: u32,
    },

    /// Discovery response could not be parsed.
    #[error("invalid discovery response: {0}")]
    InvalidResponse(String),

    /// Session key does not fit the negotiated encryption mode.
    #[error("invalid session key: {0}")]
    InvalidKey(#[from] CryptoError),
}

/// Transport layer errors.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Malformed or foreign datagram (protocol error).
    #[error("packet error: {0}")]
    Packet(#[from] PacketError),

    /// Encryption or authentication failure.
    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),

    /// A frame could not be packetized.
    #[error("packetize error: {0}")]
    Packetize(#[from] PacketizeError),

    /// Socket failure (network error).
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),

    /// Session setup failed.
    #[error("handshake failed: {0}")]
    Handshake(#[from] HandshakeError),

    /// Media source failed mid-stream.
    #[error("media source error: {0}")]
    Source(#[from] SourceError),

    /// Connection settings were rejected before any I/O.
    #[error(transparent)]
    Config(#[from] VoiceError),

    /// Track queue stayed full for the whole admission timeout.
    #[error("{0:?} queue full")]
    QueueFull(MediaKind),

    /// Frame kind not carried by this session.
    #[error("session does not carry {0:?} frames")]
    UnsupportedMediaKind(MediaKind),

    /// Operation not allowed in the current state.
    #[error("invalid transition from {from:?} to {to:?}")]
    InvalidTransition {
        /// State at the time of the call.
        from: SessionState,
        /// Requested state.
        to: SessionState,
    },

    /// Connection is closed.
    #[error("connection closed")]
    ConnectionClosed,
}

impl TransportError {
    /// Check if this error is dropped without any effect on the session.
    pub fn is_silent_drop(&self) -> bool {
        matches!(
            self,
            TransportError::Packet(_) | TransportError::Crypto(CryptoError::AuthenticationFailed)
        )
    }

    /// Check if this error is fatal to the connection.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            TransportError::Io(_)
                | TransportError::Handshake(_)
                | TransportError::Source(_)
                | TransportError::Config(_)
                | TransportError::ConnectionClosed
                | TransportError::Crypto(CryptoError::CounterExhaustion)
                | TransportError::Crypto(CryptoError::EncryptionFailed)
        )
    }

    /// Check if this error is a security-related error.
    pub fn is_security_error(&self) -> bool {
        matches!(
            self,
            TransportError::Crypto(CryptoError::AuthenticationFailed)
                | TransportError::Crypto(CryptoError::CounterExhaustion)
                | TransportError::Handshake(HandshakeError::InvalidKey(_))
        )
    }
}

/// Result type for transport operations.
pub type TransportResult<T> = Result<T, TransportError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_silent_drop_errors() {
        assert!(TransportError::Crypto(CryptoError::AuthenticationFailed).is_silent_drop());
        assert!(TransportError::Packet(PacketError::Rtcp(200)).is_silent_drop());
        assert!(TransportError::Packet(PacketError::UnsupportedVersion(1)).is_silent_drop());

        assert!(!TransportError::ConnectionClosed.is_silent_drop());
        assert!(!TransportError::Io(io::Error::other("test")).is_silent_drop());
    }

    #[test]
    fn test_fatal_errors() {
        assert!(TransportError::Io(io::Error::other("test")).is_fatal());
        assert!(TransportError::ConnectionClosed.is_fatal());
        assert!(TransportError::Crypto(CryptoError::CounterExhaustion).is_fatal());
        assert!(TransportError::Handshake(HandshakeError::Timeout { attempts: 5 }).is_fatal());

        assert!(!TransportError::Crypto(CryptoError::AuthenticationFailed).is_fatal());
        assert!(!TransportError::QueueFull(MediaKind::Audio).is_fatal());
        assert!(!TransportError::UnsupportedMediaKind(MediaKind::Video).is_fatal());
    }

    #[test]
    fn test_security_errors() {
        assert!(TransportError::Crypto(CryptoError::AuthenticationFailed).is_security_error());
        assert!(TransportError::Crypto(CryptoError::CounterExhaustion).is_security_error());

        assert!(!TransportError::ConnectionClosed.is_security_error());
        assert!(!TransportError::Packet(PacketError::Rtcp(201)).is_security_error());
    }
}
