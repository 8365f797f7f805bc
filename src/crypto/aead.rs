//! Per-packet authenticated encryption.
//!
//! Every media packet is sealed as
//! ```text
//! [ RTP header | sealed payload (payload + 16-byte tag) | nonce counter (4, BE) ]
//! ```
//! The RTP header always travels in clear. The AEAD modes authenticate it as
//! associated data; the legacy `xsalsa20_poly1305_lite` secretbox mode does
//! not, and puts its tag in front of the ciphertext.

use std::fmt;
use std::str::FromStr;

use aes_gcm::Aes256Gcm;
use chacha20poly1305::{
    XChaCha20Poly1305, XNonce,
    aead::{Aead, KeyInit, Payload},
};
use crypto_secretbox::XSalsa20Poly1305;

use super::keys::SessionKey;
use super::nonce::{construct_nonce, parse_nonce_suffix};
use crate::core::{
    AEAD_TAG_SIZE, AES_GCM_NONCE_SIZE, CryptoError, NONCE_SUFFIX_SIZE, XCHACHA_NONCE_SIZE,
};

/// Encryption modes the voice server may select.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum EncryptionMode {
    /// XChaCha20-Poly1305, 24-byte counter nonce.
    #[default]
    XChaCha20Poly1305RtpSize,
    /// AES-256-GCM, 12-byte counter nonce.
    Aes256GcmRtpSize,
    /// XSalsa20-Poly1305 secretbox, 24-byte counter nonce, header not
    /// authenticated.
    XSalsa20Poly1305Lite,
}

impl EncryptionMode {
    /// Every supported mode, in order of preference.
    pub const ALL: [EncryptionMode; 3] = [
        EncryptionMode::XChaCha20Poly1305RtpSize,
        EncryptionMode::Aes256GcmRtpSize,
        EncryptionMode::XSalsa20Poly1305Lite,
    ];

    /// Wire name used during protocol selection.
    pub fn as_str(self) -> &'static str {
        match self {
            EncryptionMode::XChaCha20Poly1305RtpSize => "aead_xchacha20_poly1305_rtpsize",
            EncryptionMode::Aes256GcmRtpSize => "aead_aes256_gcm_rtpsize",
            EncryptionMode::XSalsa20Poly1305Lite => "xsalsa20_poly1305_lite",
        }
    }

    /// Whether the RTP header is covered by the tag.
    pub fn authenticates_header(self) -> bool {
        !matches!(self, EncryptionMode::XSalsa20Poly1305Lite)
    }

    /// Bytes a sealed packet adds on top of header and plaintext.
    pub fn overhead(self) -> usize {
        AEAD_TAG_SIZE + NONCE_SUFFIX_SIZE
    }
}

impl fmt::Display for EncryptionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EncryptionMode {
    type Err = CryptoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EncryptionMode::ALL
            .into_iter()
            .find(|mode| mode.as_str() == s)
            .ok_or_else(|| CryptoError::UnsupportedMode(s.to_string()))
    }
}

enum Cipher {
    XChaCha(XChaCha20Poly1305),
    Aes(Box<Aes256Gcm>),
    Salsa(XSalsa20Poly1305),
}

/// Keyed cipher for one session.
///
/// Immutable after construction, so both the transmit and receive paths can
/// share it behind an `Arc`.
pub struct PacketCipher {
    mode: EncryptionMode,
    cipher: Cipher,
}

impl fmt::Debug for PacketCipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PacketCipher")
            .field("mode", &self.mode)
            .finish_non_exhaustive()
    }
}

impl PacketCipher {
    /// Key a cipher for the given mode.
    pub fn new(mode: EncryptionMode, key: &SessionKey) -> Self {
        let cipher = match mode {
            EncryptionMode::XChaCha20Poly1305RtpSize => {
                Cipher::XChaCha(XChaCha20Poly1305::new(key.as_bytes().into()))
            }
            EncryptionMode::Aes256GcmRtpSize => {
                Cipher::Aes(Box::new(Aes256Gcm::new(key.as_bytes().into())))
            }
            EncryptionMode::XSalsa20Poly1305Lite => {
                Cipher::Salsa(XSalsa20Poly1305::new(key.as_bytes().into()))
            }
        };
        Self { mode, cipher }
    }

    /// The mode this cipher was keyed for.
    pub fn mode(&self) -> EncryptionMode {
        self.mode
    }

    /// Encrypt `plaintext`, authenticating `header` where the mode allows.
    ///
    /// # Returns
    /// Ciphertext plus the 16-byte tag (appended for AEAD modes, prepended
    /// for secretbox).
    pub fn encrypt(
        &self,
        counter: u32,
        header: &[u8],
        plaintext: &[u8],
    ) -> Result<Vec<u8>, CryptoError> {
        let payload = Payload {
            msg: plaintext,
            aad: header,
        };
        let sealed = match &self.cipher {
            Cipher::XChaCha(cipher) => {
                let nonce: [u8; XCHACHA_NONCE_SIZE] = construct_nonce(counter);
                cipher.encrypt(XNonce::from_slice(&nonce), payload)
            }
            Cipher::Aes(cipher) => {
                let nonce: [u8; AES_GCM_NONCE_SIZE] = construct_nonce(counter);
                cipher.encrypt(aes_gcm::Nonce::from_slice(&nonce), payload)
            }
            Cipher::Salsa(cipher) => {
                let nonce: [u8; XCHACHA_NONCE_SIZE] = construct_nonce(counter);
                cipher.encrypt(XNonce::from_slice(&nonce), plaintext)
            }
        };
        sealed.map_err(|_| CryptoError::EncryptionFailed)
    }

    /// Decrypt `ciphertext` (with trailing tag), verifying `header`.
    pub fn decrypt(
        &self,
        counter: u32,
        header: &[u8],
        ciphertext: &[u8],
    ) -> Result<Vec<u8>, CryptoError> {
        if ciphertext.len() < AEAD_TAG_SIZE {
            return Err(CryptoError::AuthenticationFailed);
        }

        let payload = Payload {
            msg: ciphertext,
            aad: header,
        };
        let opened = match &self.cipher {
            Cipher::XChaCha(cipher) => {
                let nonce: [u8; XCHACHA_NONCE_SIZE] = construct_nonce(counter);
                cipher.decrypt(XNonce::from_slice(&nonce), payload)
            }
            Cipher::Aes(cipher) => {
                let nonce: [u8; AES_GCM_NONCE_SIZE] = construct_nonce(counter);
                cipher.decrypt(aes_gcm::Nonce::from_slice(&nonce), payload)
            }
            Cipher::Salsa(cipher) => {
                let nonce: [u8; XCHACHA_NONCE_SIZE] = construct_nonce(counter);
                cipher.decrypt(XNonce::from_slice(&nonce), ciphertext)
            }
        };
        opened.map_err(|_| CryptoError::AuthenticationFailed)
    }

    /// Build a complete datagram: header, sealed payload, nonce suffix.
    pub fn seal_packet(
        &self,
        counter: u32,
        header: &[u8],
        plaintext: &[u8],
    ) -> Result<Vec<u8>, CryptoError> {
        let sealed = self.encrypt(counter, header, plaintext)?;

        let mut packet = Vec::with_capacity(header.len() + sealed.len() + NONCE_SUFFIX_SIZE);
        packet.extend_from_slice(header);
        packet.extend_from_slice(&sealed);
        packet.extend_from_slice(&counter.to_be_bytes());
        Ok(packet)
    }

    /// Open a datagram whose first `header_len` bytes are the clear header.
    pub fn open_packet(&self, header_len: usize, datagram: &[u8]) -> Result<Vec<u8>, CryptoError> {
        if datagram.len() < header_len + AEAD_TAG_SIZE + NONCE_SUFFIX_SIZE {
            return Err(CryptoError::AuthenticationFailed);
        }

        let (body, suffix) = datagram.split_at(datagram.len() - NONCE_SUFFIX_SIZE);
        let counter = parse_nonce_suffix(suffix).ok_or(CryptoError::AuthenticationFailed)?;
        let (header, sealed) = body.split_at(header_len);
        self.decrypt(counter, header, sealed)
    }
}
