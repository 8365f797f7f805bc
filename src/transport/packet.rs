//! RTP packet header encoding and decoding.
//!
//! Wire format (12 bytes, big-endian):
//! ```text
//! +--------+--------+----------+------------+------------+
//! | V/P/X  | M/PT   | Sequence | Timestamp  | Source ID  |
//! | 1 byte | 1 byte | 2 bytes  | 4 bytes    | 4 bytes    |
//! +--------+--------+----------+------------+------------+
//! ```
//! followed by the sealed payload, the 16-byte tag and the 4-byte nonce
//! counter. Inbound packets may carry a CSRC list, which is part of the
//! authenticated header.

use bytes::Bytes;
use thiserror::Error;

use crate::core::{
    AEAD_TAG_SIZE, EXTENSION_PROFILE_ONE_BYTE, MIN_PACKET_SIZE, MTU, NONCE_SUFFIX_SIZE,
    RTCP_PACKET_TYPES, RTP_EXTENSION_BIT, RTP_HEADER_SIZE, RTP_MARKER_BIT, RTP_VERSION_BYTE,
};

/// RTP version carried in the top two bits of byte 0.
const RTP_VERSION: u8 = 2;

/// Errors that can occur during packet parsing (protocol errors).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PacketError {
    /// Packet is too short.
    #[error("packet too short: expected at least {expected} bytes, got {actual}")]
    TooShort {
        /// Minimum expected size.
        expected: usize,
        /// Actual size received.
        actual: usize,
    },

    /// Datagram exceeds the MTU.
    #[error("packet too large: {0} bytes exceeds the {MTU}-byte MTU")]
    TooLarge(usize),

    /// RTP version is not 2.
    #[error("unsupported RTP version: {0}")]
    UnsupportedVersion(u8),

    /// RTCP packet on the media socket.
    #[error("RTCP packet type {0} ignored")]
    Rtcp(u8),

    /// Header extension length runs past the payload.
    #[error("malformed header extension")]
    MalformedExtension,
}

/// RTP fixed header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RtpHeader {
    /// A header extension precedes the payload (inside the sealed part).
    pub extension: bool,
    /// Number of CSRC identifiers after the fixed header.
    pub csrc_count: u8,
    /// Last packet of a media frame.
    pub marker: bool,
    /// Payload type (7 bits).
    pub payload_type: u8,
    /// Sequence number.
    pub sequence: u16,
    /// Media timestamp.
    pub timestamp: u32,
    /// Sender's source id.
    pub source_id: u32,
}

impl RtpHeader {
    /// Create a header without extension or marker.
    pub fn new(payload_type: u8, sequence: u16, timestamp: u32, source_id: u32) -> Self {
        Self {
            extension: false,
            csrc_count: 0,
            marker: false,
            payload_type,
            sequence,
            timestamp,
            source_id,
        }
    }

    /// Set the marker bit.
    pub fn with_marker(mut self, marker: bool) -> Self {
        self.marker = marker;
        self
    }

    /// Set the extension bit.
    pub fn with_extension(mut self, extension: bool) -> Self {
        self.extension = extension;
        self
    }

    /// Length of the clear header on the wire, CSRC list included.
    pub fn header_len(&self) -> usize {
        RTP_HEADER_SIZE + 4 * usize::from(self.csrc_count)
    }

    /// Serialize the fixed header (12 bytes). CSRCs are never sent.
    pub fn to_bytes(&self) -> [u8; RTP_HEADER_SIZE] {
        let mut buf = [0u8; RTP_HEADER_SIZE];
        buf[0] = RTP_VERSION_BYTE;
        if self.extension {
            buf[0] |= RTP_EXTENSION_BIT;
        }
        buf[1] = self.payload_type & !RTP_MARKER_BIT;
        if self.marker {
            buf[1] |= RTP_MARKER_BIT;
        }
        buf[2..4].copy_from_slice(&self.sequence.to_be_bytes());
        buf[4..8].copy_from_slice(&self.timestamp.to_be_bytes());
        buf[8..12].copy_from_slice(&self.source_id.to_be_bytes());
        buf
    }

    /// Parse a header from the start of a datagram.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, PacketError> {
        if bytes.len() < RTP_HEADER_SIZE {
            return Err(PacketError::TooShort {
                expected: RTP_HEADER_SIZE,
                actual: bytes.len(),
            });
        }

        let version = bytes[0] >> 6;
        if version != RTP_VERSION {
            return Err(PacketError::UnsupportedVersion(version));
        }
        if RTCP_PACKET_TYPES.contains(&bytes[1]) {
            return Err(PacketError::Rtcp(bytes[1]));
        }

        Ok(Self {
            extension: bytes[0] & RTP_EXTENSION_BIT != 0,
            csrc_count: bytes[0] & 0x0F,
            marker: bytes[1] & RTP_MARKER_BIT != 0,
            payload_type: bytes[1] & !RTP_MARKER_BIT,
            sequence: u16::from_be_bytes([bytes[2], bytes[3]]),
            timestamp: u32::from_be_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]),
            source_id: u32::from_be_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]),
        })
    }
}

/// An unencrypted packet produced by the packetizer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    /// Clear header (used as AAD).
    pub header: RtpHeader,
    /// Plaintext payload (will be sealed).
    pub payload: Bytes,
}

impl Packet {
    /// Size on the wire once sealed.
    pub fn sealed_len(&self) -> usize {
        self.header.header_len() + self.payload.len() + AEAD_TAG_SIZE + NONCE_SUFFIX_SIZE
    }
}

/// The one-byte header extension sent in front of every video payload.
///
/// Profile `0xBEDE`, one element: id 5, two bytes of value 0.
pub fn video_header_extension() -> [u8; 8] {
    let profile = EXTENSION_PROFILE_ONE_BYTE.to_be_bytes();
    let id: u8 = 5;
    let len: u8 = 2;
    [
        profile[0],
        profile[1],
        0x00,
        0x01, // one 32-bit word follows
        ((id & 0x0F) << 4) | ((len - 1) & 0x0F),
        0x00,
        0x00,
        0x00,
    ]
}

/// Remove an RTP header extension from the front of a decrypted payload.
pub fn strip_header_extension(payload: &[u8]) -> Result<&[u8], PacketError> {
    if payload.len() < 4 {
        return Err(PacketError::MalformedExtension);
    }
    let words = usize::from(u16::from_be_bytes([payload[2], payload[3]]));
    let end = 4 + words * 4;
    payload.get(end..).ok_or(PacketError::MalformedExtension)
}

/// Parse a received datagram's clear header and check its length bounds.
///
/// Only the header is parsed; the rest must be opened by the cipher.
pub fn parse_packet_header(data: &[u8]) -> Result<RtpHeader, PacketError> {
    if data.len() < MIN_PACKET_SIZE {
        return Err(PacketError::TooShort {
            expected: MIN_PACKET_SIZE,
            actual: data.len(),
        });
    }
    if data.len() > MTU {
        return Err(PacketError::TooLarge(data.len()));
    }

    let header = RtpHeader::from_bytes(data)?;
    let needed = header.header_len() + AEAD_TAG_SIZE + NONCE_SUFFIX_SIZE;
    if data.len() < needed {
        return Err(PacketError::TooShort {
            expected: needed,
            actual: data.len(),
        });
    }
    Ok(header)
}
