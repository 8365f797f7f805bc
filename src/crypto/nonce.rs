//! Counter-derived nonces.
//!
//! Both AEAD modes build their nonce from a 32-bit packet counter:
//! ```text
//! [ counter (4, BE) | zeros (N - 4) ]
//! ```
//! The same 4 counter bytes travel after the tag so the receiver can rebuild
//! the nonce. One counter is shared by every track of a session: the key is
//! shared too, and a nonce must never repeat under one key.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::core::{CryptoError, NONCE_SUFFIX_SIZE};

/// Construct an `N`-byte nonce from a packet counter.
pub fn construct_nonce<const N: usize>(counter: u32) -> [u8; N] {
    let mut nonce = [0u8; N];
    nonce[..NONCE_SUFFIX_SIZE].copy_from_slice(&counter.to_be_bytes());
    nonce
}

/// Parse the trailing counter suffix of a packet.
pub fn parse_nonce_suffix(suffix: &[u8]) -> Option<u32> {
    let bytes: [u8; NONCE_SUFFIX_SIZE] = suffix.try_into().ok()?;
    Some(u32::from_be_bytes(bytes))
}

/// Monotonic per-session nonce counter.
///
/// Hands out 1, 2, 3, ... and refuses to wrap: after `u32::MAX` every call
/// fails with [`CryptoError::CounterExhaustion`].
#[derive(Debug)]
pub struct NonceCounter {
    next: AtomicU64,
}

impl Default for NonceCounter {
    fn default() -> Self {
        Self::new()
    }
}

impl NonceCounter {
    /// Create a counter whose first value is 1.
    pub fn new() -> Self {
        Self::starting_at(1)
    }

    /// Create a counter with a custom first value.
    pub fn starting_at(first: u32) -> Self {
        Self {
            next: AtomicU64::new(u64::from(first)),
        }
    }

    /// Take the next counter value.
    pub fn next(&self) -> Result<u32, CryptoError> {
        let value = self.next.fetch_add(1, Ordering::Relaxed);
        u32::try_from(value).map_err(|_| CryptoError::CounterExhaustion)
    }

    /// Number of values handed out so far (including exhausted attempts).
    pub fn issued(&self) -> u64 {
        self.next.load(Ordering::Relaxed).saturating_sub(1)
    }
}
