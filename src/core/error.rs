//! Error types shared across the voice transport.

use thiserror::Error;

/// Errors in the crypto layer.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CryptoError {
    /// Encryption mode name not recognised.
    #[error("unsupported encryption mode: {0}")]
    UnsupportedMode(String),

    /// Session key has the wrong length for the mode.
    #[error("invalid session key length: expected {expected}, got {actual}")]
    InvalidKeyLength {
        /// Expected key length.
        expected: usize,
        /// Actual key length.
        actual: usize,
    },

    /// AEAD encryption failed.
    #[error("AEAD encryption failed")]
    EncryptionFailed,

    /// AEAD decryption failed (invalid tag or corrupted).
    #[error("authentication failed (invalid tag or corrupted packet)")]
    AuthenticationFailed,

    /// Nonce counter exhausted - session must terminate.
    #[error("nonce counter exhausted - session must terminate")]
    CounterExhaustion,
}

/// Errors raised by a media source adapter.
#[derive(Debug, Error)]
pub enum SourceError {
    /// Reading from the underlying stream failed.
    #[error("source i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// The container or bitstream is malformed.
    #[error("malformed media stream: {0}")]
    Malformed(String),
}

/// Top-level voicewire errors.
#[derive(Debug, Error)]
pub enum VoiceError {
    /// Crypto error.
    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),

    /// Media source error.
    #[error("source error: {0}")]
    Source(#[from] SourceError),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// I/O error.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}
