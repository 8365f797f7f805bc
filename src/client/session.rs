//! Session parameters and the established session.

use std::fmt;
use std::net::SocketAddr;

use zeroize::Zeroizing;

use crate::core::StreamKind;
use crate::crypto::{EncryptionMode, SessionKey};

/// Everything the control plane hands over before the media path opens.
#[derive(Clone)]
pub struct SessionParams {
    /// Our source id on the voice server.
    pub source_id: u32,
    /// Voice server host name or address.
    pub remote_host: String,
    /// Voice server UDP port.
    pub remote_port: u16,
    /// Negotiated encryption mode.
    pub encryption_mode: EncryptionMode,
    /// Raw session secret; validated against the mode during the handshake.
    /// Wiped when the params (and every clone) drop.
    pub session_key: Zeroizing<Vec<u8>>,
    /// Media layout.
    pub stream_kind: StreamKind,
}

impl SessionParams {
    /// Audio-only parameters with the default encryption mode.
    pub fn new(
        source_id: u32,
        remote_host: impl Into<String>,
        remote_port: u16,
        session_key: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            source_id,
            remote_host: remote_host.into(),
            remote_port,
            encryption_mode: EncryptionMode::default(),
            session_key: Zeroizing::new(session_key.into()),
            stream_kind: StreamKind::AudioOnly,
        }
    }

    /// Set the encryption mode.
    pub fn with_encryption_mode(mut self, mode: EncryptionMode) -> Self {
        self.encryption_mode = mode;
        self
    }

    /// Set the media layout.
    pub fn with_stream_kind(mut self, kind: StreamKind) -> Self {
        self.stream_kind = kind;
        self
    }
}

impl fmt::Debug for SessionParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionParams")
            .field("source_id", &self.source_id)
            .field("remote_host", &self.remote_host)
            .field("remote_port", &self.remote_port)
            .field("encryption_mode", &self.encryption_mode)
            .field("session_key", &"[REDACTED]")
            .field("stream_kind", &self.stream_kind)
            .finish()
    }
}

/// An established session. Immutable after the handshake.
#[derive(Debug)]
pub struct Session {
    pub(crate) source_id: u32,
    pub(crate) session_key: SessionKey,
    pub(crate) remote_address: SocketAddr,
    pub(crate) external_address: SocketAddr,
    pub(crate) encryption_mode: EncryptionMode,
    pub(crate) stream_kind: StreamKind,
}

impl Session {
    /// Our audio source id (video uses the next one).
    pub fn source_id(&self) -> u32 {
        self.source_id
    }

    /// Session secret.
    pub fn session_key(&self) -> &SessionKey {
        &self.session_key
    }

    /// Voice server address the socket is connected to.
    pub fn remote_address(&self) -> SocketAddr {
        self.remote_address
    }

    /// Our address as seen by the voice server.
    pub fn external_address(&self) -> SocketAddr {
        self.external_address
    }

    /// Encryption mode in use.
    pub fn encryption_mode(&self) -> EncryptionMode {
        self.encryption_mode
    }

    /// Media layout.
    pub fn stream_kind(&self) -> StreamKind {
        self.stream_kind
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_params_debug_redacts_key() {
        let params = SessionParams::new(1, "voice.example", 50000, vec![0xAB; 32])
            .with_stream_kind(StreamKind::AudioVideo { fps: 30 });

        let printed = format!("{params:?}");
        assert!(printed.contains("REDACTED"));
        assert!(!printed.contains("171"));
        assert_eq!(params.encryption_mode, EncryptionMode::XChaCha20Poly1305RtpSize);
    }

    #[test]
    fn test_params_key_zeroizes_per_clone() {
        let params = SessionParams::new(1, "voice.example", 50000, vec![0xAB; 32]);
        let copy = params.clone();
        assert_eq!(copy.session_key, params.session_key);

        let mut key: Zeroizing<Vec<u8>> = copy.session_key;
        zeroize::Zeroize::zeroize(&mut *key);
        assert!(key.is_empty());
        assert_eq!(params.session_key.len(), 32);
    }
}
