//! Protocol constants for the voice transport.
//!
//! These values are fixed by the wire protocol and MUST NOT be changed.

use std::time::Duration;

// =============================================================================
// CRYPTOGRAPHIC CONSTANTS
// =============================================================================

/// Session key size (32 bytes for both AEAD modes).
pub const SESSION_KEY_SIZE: usize = 32;

/// Authentication tag size (Poly1305 and GCM).
pub const AEAD_TAG_SIZE: usize = 16;

/// XChaCha20-Poly1305 nonce size.
pub const XCHACHA_NONCE_SIZE: usize = 24;

/// AES-256-GCM nonce size.
pub const AES_GCM_NONCE_SIZE: usize = 12;

/// Size of the nonce counter suffix appended after the tag.
pub const NONCE_SUFFIX_SIZE: usize = 4;

// =============================================================================
// RTP HEADER
// =============================================================================

/// Fixed RTP header size (without CSRC list).
pub const RTP_HEADER_SIZE: usize = 12;

/// First header byte: RTP version 2, no padding, no extension, no CSRCs.
pub const RTP_VERSION_BYTE: u8 = 0x80;

/// Version/flags bit announcing a header extension.
pub const RTP_EXTENSION_BIT: u8 = 0x10;

/// Marker bit in the payload type byte (last packet of a frame).
pub const RTP_MARKER_BIT: u8 = 0x80;

/// Payload type for Opus audio.
pub const PAYLOAD_TYPE_OPUS: u8 = 0x78;

/// Payload type for H.264 video.
pub const PAYLOAD_TYPE_H264: u8 = 0x65;

/// RTCP packet types share the socket; byte 1 falls in this range.
pub const RTCP_PACKET_TYPES: std::ops::RangeInclusive<u8> = 200..=204;

/// One-byte header extension profile marker.
pub const EXTENSION_PROFILE_ONE_BYTE: u16 = 0xBEDE;

// =============================================================================
// SIZES
// =============================================================================

/// Maximum datagram size on the wire.
pub const MTU: usize = 1200;

/// Maximum plaintext that fits one datagram (header + tag + nonce suffix).
pub const MAX_PLAINTEXT_SIZE: usize = MTU - RTP_HEADER_SIZE - AEAD_TAG_SIZE - NONCE_SUFFIX_SIZE;

/// Smallest datagram that can carry an encrypted packet.
pub const MIN_PACKET_SIZE: usize = RTP_HEADER_SIZE + AEAD_TAG_SIZE + NONCE_SUFFIX_SIZE;

/// Receive buffer size. Larger than the MTU so oversized datagrams are detected.
pub const RECV_BUFFER_SIZE: usize = 2048;

// =============================================================================
// MEDIA CLOCKS
// =============================================================================

/// Opus sample rate.
pub const OPUS_SAMPLE_RATE: u32 = 48_000;

/// Duration of one audio frame.
pub const AUDIO_FRAME_DURATION: Duration = Duration::from_millis(20);

/// Samples in one 20 ms Opus frame.
pub const OPUS_FRAME_SAMPLES: u32 = 960;

/// H.264 RTP clock rate.
pub const VIDEO_CLOCK_RATE: u32 = 90_000;

/// Default video frame rate.
pub const DEFAULT_VIDEO_FPS: u32 = 30;

/// Opus silence frame sent as end-of-stream marker.
pub const OPUS_SILENCE_FRAME: [u8; 3] = [0xF8, 0xFF, 0xFE];

/// Number of silence frames sent before stopping an audio track.
pub const SILENCE_FRAME_COUNT: usize = 5;

// =============================================================================
// IP DISCOVERY
// =============================================================================

/// IP discovery packet size.
pub const DISCOVERY_PACKET_SIZE: usize = 74;

/// IP discovery request type.
pub const DISCOVERY_REQUEST: u16 = 0x0001;

/// IP discovery response type.
pub const DISCOVERY_RESPONSE: u16 = 0x0002;

/// Length field value (packet size minus type and length).
pub const DISCOVERY_LENGTH: u16 = 70;

/// Size of the NUL-padded address field.
pub const DISCOVERY_ADDRESS_SIZE: usize = 64;

// =============================================================================
// HANDSHAKE TIMING
// =============================================================================

/// Discovery timeout per attempt (initial).
pub const HANDSHAKE_TIMEOUT: Duration = Duration::from_millis(1000);

/// Maximum discovery attempts.
pub const HANDSHAKE_MAX_RETRIES: u32 = 5;

/// Backoff multiplier between attempts.
pub const HANDSHAKE_BACKOFF: u32 = 2;

// =============================================================================
// RECEPTION
// =============================================================================

/// Default reorder window (sequence numbers).
pub const DEFAULT_REORDER_WINDOW: usize = 8;

/// Largest supported reorder window (bits in the seen bitmap).
pub const MAX_REORDER_WINDOW: usize = 64;

/// Longest a packet waits in the reorder buffer for a gap to fill.
pub const DEFAULT_REORDER_HOLD: Duration = Duration::from_millis(60);

/// Remote streams idle this long are evicted.
pub const DEFAULT_SOURCE_TIMEOUT: Duration = Duration::from_secs(5);

/// Housekeeping tick of the receive loop.
pub const RECEIVE_TICK: Duration = Duration::from_millis(20);
