//! Session key handling.
//!
//! The voice server hands out one 32-byte secret per session. It is kept in
//! a zeroize-on-drop wrapper and never printed.

use zeroize::Zeroize;

use crate::core::{CryptoError, SESSION_KEY_SIZE};

/// The symmetric secret for a session.
///
/// Zeroized on drop for security.
#[derive(Clone, PartialEq, Eq)]
pub struct SessionKey {
    key: [u8; SESSION_KEY_SIZE],
}

impl SessionKey {
    /// Create a session key from bytes.
    pub fn from_bytes(key: [u8; SESSION_KEY_SIZE]) -> Self {
        Self { key }
    }

    /// Create a session key from a slice as delivered by the control plane.
    pub fn from_slice(key: &[u8]) -> Result<Self, CryptoError> {
        let key: [u8; SESSION_KEY_SIZE] =
            key.try_into().map_err(|_| CryptoError::InvalidKeyLength {
                expected: SESSION_KEY_SIZE,
                actual: key.len(),
            })?;
        Ok(Self { key })
    }

    /// Get the raw key bytes.
    ///
    /// # Security
    /// Handle with care - this exposes sensitive key material.
    pub fn as_bytes(&self) -> &[u8; SESSION_KEY_SIZE] {
        &self.key
    }
}

impl Drop for SessionKey {
    fn drop(&mut self) {
        self.key.zeroize();
    }
}

impl std::fmt::Debug for SessionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SessionKey([REDACTED])")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{RngCore, rngs::OsRng};

    fn random_key() -> SessionKey {
        let mut key = [0u8; SESSION_KEY_SIZE];
        OsRng.fill_bytes(&mut key);
        SessionKey::from_bytes(key)
    }

    #[test]
    fn test_distinct_keys_compare_unequal() {
        let k1 = random_key();
        let k2 = random_key();
        assert_ne!(k1, k2);
        assert_eq!(k1.clone(), k1);
    }

    #[test]
    fn test_from_slice_length() {
        assert!(SessionKey::from_slice(&[0u8; 32]).is_ok());
        assert_eq!(
            SessionKey::from_slice(&[0u8; 16]),
            Err(CryptoError::InvalidKeyLength {
                expected: 32,
                actual: 16
            })
        );
    }

    #[test]
    fn test_debug_redacted() {
        let key = SessionKey::from_bytes([0x42; SESSION_KEY_SIZE]);
        let printed = format!("{:?}", key);
        assert!(!printed.contains("42"));
        assert!(printed.contains("REDACTED"));
    }
}
