//! Frame to packet conversion for one transmit track.
//!
//! Each track owns its sequence and timestamp counters. Sequence numbers
//! advance per wire packet, timestamps per logical frame, so a fragmented
//! video frame shares one timestamp across consecutive sequence numbers.

use std::time::Duration;

use bytes::{BufMut, Bytes, BytesMut};
use thiserror::Error;

use super::packet::{Packet, RtpHeader, video_header_extension};
use crate::core::{
    AUDIO_FRAME_DURATION, MAX_PLAINTEXT_SIZE, MediaFrame, MediaKind, PAYLOAD_TYPE_H264,
    PAYLOAD_TYPE_OPUS,
};

/// Length prefix in front of each NAL unit of an access unit.
const NAL_LENGTH_PREFIX: usize = 4;

/// FU-A NAL unit type.
const FU_A_TYPE: u8 = 28;

/// FU header start bit.
const FU_START: u8 = 0x80;

/// FU header end bit.
const FU_END: u8 = 0x40;

/// Errors raised while building packets.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PacketizeError {
    /// Audio frame does not fit one datagram.
    #[error("audio frame of {size} bytes exceeds the {max}-byte packet limit")]
    AudioFrameTooLarge {
        /// Frame size.
        size: usize,
        /// Largest payload a packet can carry.
        max: usize,
    },

    /// Audio frame is not one 20 ms Opus packet.
    #[error("audio frame lasts {duration:?}, expected {expected:?}")]
    AudioDurationMismatch {
        /// The frame's duration.
        duration: Duration,
        /// The audio track's frame interval.
        expected: Duration,
    },

    /// Length-prefixed access unit is inconsistent.
    #[error("malformed access unit: {0}")]
    MalformedAccessUnit(&'static str),

    /// Frame handed to the wrong track.
    #[error("{actual:?} frame given to the {expected:?} track")]
    WrongKind {
        /// The track's kind.
        expected: MediaKind,
        /// The frame's kind.
        actual: MediaKind,
    },
}

/// Source id used by a track: video goes out as `source_id + 1`.
pub fn track_source_id(session_source_id: u32, kind: MediaKind) -> u32 {
    match kind {
        MediaKind::Audio => session_source_id,
        MediaKind::Video => session_source_id.wrapping_add(1),
    }
}

/// Check that a frame can be packetized.
///
/// Audio must be one 20 ms frame that fits one packet; video must be a
/// well-formed length-prefixed access unit.
pub fn validate_frame(frame: &MediaFrame) -> Result<(), PacketizeError> {
    match frame.kind {
        MediaKind::Audio if frame.data.len() > MAX_PLAINTEXT_SIZE => {
            Err(PacketizeError::AudioFrameTooLarge {
                size: frame.data.len(),
                max: MAX_PLAINTEXT_SIZE,
            })
        }
        // audio is paced at a fixed 20 ms interval
        MediaKind::Audio if frame.duration != AUDIO_FRAME_DURATION => {
            Err(PacketizeError::AudioDurationMismatch {
                duration: frame.duration,
                expected: AUDIO_FRAME_DURATION,
            })
        }
        MediaKind::Audio => Ok(()),
        MediaKind::Video => split_access_unit(&frame.data).map(|_| ()),
    }
}

/// Builds wire packets for one track.
#[derive(Debug, Clone)]
pub struct Packetizer {
    kind: MediaKind,
    source_id: u32,
    payload_type: u8,
    /// Last sequence number issued.
    sequence: u16,
    /// Timestamp of the next frame.
    timestamp: u32,
    frames: u64,
}

impl Packetizer {
    /// Create the packetizer for a session's `kind` track.
    ///
    /// The first packet carries sequence 1, the first frame timestamp 0.
    pub fn new(kind: MediaKind, session_source_id: u32) -> Self {
        Self::with_counters(kind, session_source_id, 0, 0)
    }

    /// Create a packetizer with explicit starting counters.
    ///
    /// `last_sequence` is the number before the first one sent.
    pub fn with_counters(
        kind: MediaKind,
        session_source_id: u32,
        last_sequence: u16,
        first_timestamp: u32,
    ) -> Self {
        let payload_type = match kind {
            MediaKind::Audio => PAYLOAD_TYPE_OPUS,
            MediaKind::Video => PAYLOAD_TYPE_H264,
        };
        Self {
            kind,
            source_id: track_source_id(session_source_id, kind),
            payload_type,
            sequence: last_sequence,
            timestamp: first_timestamp,
            frames: 0,
        }
    }

    /// The track's media kind.
    pub fn kind(&self) -> MediaKind {
        self.kind
    }

    /// Source id written into this track's packets.
    pub fn source_id(&self) -> u32 {
        self.source_id
    }

    /// Last sequence number issued.
    pub fn last_sequence(&self) -> u16 {
        self.sequence
    }

    /// Timestamp the next frame will carry.
    pub fn next_timestamp(&self) -> u32 {
        self.timestamp
    }

    /// Frames packetized so far.
    pub fn frames_built(&self) -> u64 {
        self.frames
    }

    /// Check a frame without touching the counters.
    pub fn validate(&self, frame: &MediaFrame) -> Result<(), PacketizeError> {
        if frame.kind != self.kind {
            return Err(PacketizeError::WrongKind {
                expected: self.kind,
                actual: frame.kind,
            });
        }
        validate_frame(frame)
    }

    /// Turn one frame into its wire packets.
    ///
    /// Counters only advance when the frame is accepted.
    pub fn build(&mut self, frame: &MediaFrame) -> Result<Vec<Packet>, PacketizeError> {
        self.validate(frame)?;

        let packets = match self.kind {
            MediaKind::Audio => vec![self.next_packet(frame.data.clone(), true, false)],
            MediaKind::Video => self.build_video(&frame.data)?,
        };

        self.timestamp = self.timestamp.wrapping_add(frame.timestamp_units());
        self.frames += 1;
        Ok(packets)
    }

    fn build_video(&mut self, access_unit: &Bytes) -> Result<Vec<Packet>, PacketizeError> {
        let extension = video_header_extension();
        let single_max = MAX_PLAINTEXT_SIZE - extension.len();
        let fragment_max = single_max - 2;

        let nal_units = split_access_unit(access_unit)?;
        let mut payloads = Vec::new();

        for nal in &nal_units {
            if nal.len() <= single_max {
                let mut buf = BytesMut::with_capacity(extension.len() + nal.len());
                buf.put_slice(&extension);
                buf.put_slice(nal);
                payloads.push(buf.freeze());
                continue;
            }

            let nal_header = nal[0];
            let indicator = (nal_header & 0xE0) | FU_A_TYPE;
            let nal_type = nal_header & 0x1F;
            let chunks: Vec<&[u8]> = nal[1..].chunks(fragment_max).collect();
            let last = chunks.len() - 1;

            for (i, chunk) in chunks.iter().enumerate() {
                let mut fu_header = nal_type;
                if i == 0 {
                    fu_header |= FU_START;
                }
                if i == last {
                    fu_header |= FU_END;
                }
                let mut buf = BytesMut::with_capacity(extension.len() + 2 + chunk.len());
                buf.put_slice(&extension);
                buf.put_u8(indicator);
                buf.put_u8(fu_header);
                buf.put_slice(chunk);
                payloads.push(buf.freeze());
            }
        }

        let last = payloads.len() - 1;
        Ok(payloads
            .into_iter()
            .enumerate()
            .map(|(i, payload)| self.next_packet(payload, i == last, true))
            .collect())
    }

    fn next_packet(&mut self, payload: Bytes, marker: bool, extension: bool) -> Packet {
        self.sequence = self.sequence.wrapping_add(1);
        let header =
            RtpHeader::new(self.payload_type, self.sequence, self.timestamp, self.source_id)
                .with_marker(marker)
                .with_extension(extension);
        Packet { header, payload }
    }
}

/// Split a length-prefixed access unit into its NAL units.
fn split_access_unit(data: &[u8]) -> Result<Vec<&[u8]>, PacketizeError> {
    let mut nal_units = Vec::new();
    let mut rest = data;

    while !rest.is_empty() {
        if rest.len() < NAL_LENGTH_PREFIX {
            return Err(PacketizeError::MalformedAccessUnit("truncated length prefix"));
        }
        let len = u32::from_be_bytes([rest[0], rest[1], rest[2], rest[3]]) as usize;
        rest = &rest[NAL_LENGTH_PREFIX..];
        if len == 0 {
            return Err(PacketizeError::MalformedAccessUnit("empty NAL unit"));
        }
        if len > rest.len() {
            return Err(PacketizeError::MalformedAccessUnit("NAL length exceeds access unit"));
        }
        let (nal, tail) = rest.split_at(len);
        nal_units.push(nal);
        rest = tail;
    }

    if nal_units.is_empty() {
        return Err(PacketizeError::MalformedAccessUnit("empty access unit"));
    }
    Ok(nal_units)
}
