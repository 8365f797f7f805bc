//! # Voicewire
//!
//! Real-time voice and video transport over encrypted RTP/UDP.
//!
//! Voicewire takes encoded media frames (Opus audio, H.264 video), wraps them
//! in RTP, seals every packet with an AEAD cipher and paces them onto a UDP
//! socket at the media frame rate. In the other direction it authenticates,
//! demultiplexes and reorders packets from many remote speakers and hands
//! whole frames to a sink.
//!
//! - **Security**: per-packet XChaCha20-Poly1305 or AES-256-GCM, header as AAD
//! - **Timing**: absolute-deadline pacing with drift correction
//! - **Reception**: per-source reorder windows, silent drop of forged packets
//! - **Lifecycle**: explicit session state machine, idempotent close
//!
//! ## Feature Flags
//!
//! - `crypto` (default): packet ciphers and nonce management
//! - `transport` (default): RTP framing, packetizer, pacer, demultiplexer, sockets
//! - `media` (default): Ogg/Opus and H.264 Annex-B readers
//! - `client` (default): [`VoiceConnection`] high-level API
//!
//! ## Modules
//!
//! - [`core`]: Core traits, constants, and error types (always included)
//! - [`crypto`]: Security layer (requires `crypto` feature)
//! - [`transport`]: Transport layer (requires `transport` feature)
//! - [`media`]: Media source adapters (requires `media` feature)
//! - [`client`]: Connection API (requires `client` feature)
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use voicewire::prelude::*;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let params = SessionParams::new(12345, "voice.example.net", 50001, vec![0u8; 32]);
//! let config = ConnectionConfig::builder().build()?;
//!
//! let connection = VoiceConnection::open(params, config).await?;
//! let file = tokio::fs::File::open("speech.ogg").await?;
//! connection.stream(OggOpusReader::new(file)).await?;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

// Core module (always included)
pub mod core;

// Crypto layer (feature-gated)
#[cfg(feature = "crypto")]
#[cfg_attr(docsrs, doc(cfg(feature = "crypto")))]
pub mod crypto;

// Transport layer (feature-gated)
#[cfg(feature = "transport")]
#[cfg_attr(docsrs, doc(cfg(feature = "transport")))]
pub mod transport;

// Media sources (feature-gated)
#[cfg(feature = "media")]
#[cfg_attr(docsrs, doc(cfg(feature = "media")))]
pub mod media;

// Client API (feature-gated)
#[cfg(feature = "client")]
#[cfg_attr(docsrs, doc(cfg(feature = "client")))]
pub mod client;

/// Prelude module for convenient imports.
pub mod prelude {
    // Core traits and types
    pub use crate::core::{
        FrameSink, MediaFrame, MediaKind, MediaSource, NullSink, ReceivedFrame, SourceError,
        StreamKind, VoiceError,
    };

    #[cfg(feature = "crypto")]
    pub use crate::crypto::{EncryptionMode, PacketCipher, SessionKey};

    #[cfg(feature = "transport")]
    pub use crate::transport::{
        HandshakeError, SessionState, StatsSnapshot, TransportError, TransportResult,
    };

    #[cfg(feature = "media")]
    pub use crate::media::{AnnexBReader, OggOpusReader, VecSource};

    #[cfg(feature = "client")]
    pub use crate::client::{
        ChannelSink, ConnectionConfig, Session, SessionParams, SinkEvent, VoiceConnection,
    };
}

// Re-export commonly used items at crate root
pub use crate::core::{FrameSink, MediaFrame, MediaKind, MediaSource, VoiceError};

#[cfg(feature = "transport")]
pub use crate::transport::{SessionState, TransportError};

#[cfg(feature = "client")]
pub use crate::client::{ConnectionConfig, SessionParams, VoiceConnection};
