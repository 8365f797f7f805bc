//! Voicewire - Security Layer
//!
//! Per-packet authenticated encryption keyed by the session secret:
//! - [`PacketCipher`]: XChaCha20-Poly1305 or AES-256-GCM with the RTP header as
//!   AAD, or the legacy XSalsa20-Poly1305 lite mode
//! - [`NonceCounter`]: monotonic 32-bit nonce counter, never reused
//! - [`SessionKey`]: zeroize-on-drop session secret

mod aead;
mod keys;
mod nonce;

pub use aead::{EncryptionMode, PacketCipher};
pub use keys::SessionKey;
pub use nonce::{NonceCounter, construct_nonce, parse_nonce_suffix};
