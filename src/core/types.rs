//! Media types exchanged with the source and sink collaborators.

use std::time::Duration;

use bytes::Bytes;

use super::constants::{AUDIO_FRAME_DURATION, OPUS_SAMPLE_RATE, VIDEO_CLOCK_RATE};

/// Kind of media carried by a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaKind {
    /// Opus audio.
    Audio,
    /// H.264 video.
    Video,
}

impl MediaKind {
    /// RTP clock rate for this kind.
    pub fn clock_rate(self) -> u32 {
        match self {
            MediaKind::Audio => OPUS_SAMPLE_RATE,
            MediaKind::Video => VIDEO_CLOCK_RATE,
        }
    }

    /// Timestamp units covered by a frame of the given duration.
    pub fn units_for(self, duration: Duration) -> u32 {
        let units = duration.as_secs_f64() * f64::from(self.clock_rate());
        units.round() as u32
    }
}

/// Media layout of a session, fixed when the session starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StreamKind {
    /// Only an audio track.
    #[default]
    AudioOnly,
    /// Audio track plus a video track.
    AudioVideo {
        /// Nominal video frame rate.
        fps: u32,
    },
}

impl StreamKind {
    /// Whether the session carries a track for `kind`.
    pub fn carries(self, kind: MediaKind) -> bool {
        match (self, kind) {
            (_, MediaKind::Audio) => true,
            (StreamKind::AudioVideo { .. }, MediaKind::Video) => true,
            (StreamKind::AudioOnly, MediaKind::Video) => false,
        }
    }

    /// Tracks carried by this session.
    pub fn kinds(self) -> &'static [MediaKind] {
        match self {
            StreamKind::AudioOnly => &[MediaKind::Audio],
            StreamKind::AudioVideo { .. } => &[MediaKind::Audio, MediaKind::Video],
        }
    }

    /// Nominal frame interval for a track.
    pub fn frame_interval(self, kind: MediaKind) -> Duration {
        match (self, kind) {
            (StreamKind::AudioVideo { fps }, MediaKind::Video) if fps > 0 => {
                Duration::from_secs_f64(1.0 / f64::from(fps))
            }
            _ => AUDIO_FRAME_DURATION,
        }
    }
}

/// One encoded media unit produced by a source.
///
/// Audio frames hold a single Opus packet. Video frames hold one H.264 access
/// unit as NAL units, each prefixed with its 4-byte big-endian length.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaFrame {
    /// Encoded bytes.
    pub data: Bytes,
    /// Media kind.
    pub kind: MediaKind,
    /// Nominal playback duration.
    pub duration: Duration,
}

impl MediaFrame {
    /// Create an audio frame of the standard 20 ms duration.
    pub fn audio(data: impl Into<Bytes>) -> Self {
        Self {
            data: data.into(),
            kind: MediaKind::Audio,
            duration: AUDIO_FRAME_DURATION,
        }
    }

    /// Create a video frame from a length-prefixed access unit.
    pub fn video(data: impl Into<Bytes>, duration: Duration) -> Self {
        Self {
            data: data.into(),
            kind: MediaKind::Video,
            duration,
        }
    }

    /// Create a video frame from raw NAL units.
    pub fn video_from_nal_units<'a, I>(nal_units: I, duration: Duration) -> Self
    where
        I: IntoIterator<Item = &'a [u8]>,
    {
        let mut data = Vec::new();
        for nal in nal_units {
            data.extend_from_slice(&(nal.len() as u32).to_be_bytes());
            data.extend_from_slice(nal);
        }
        Self::video(data, duration)
    }

    /// Timestamp units this frame advances the RTP clock by.
    pub fn timestamp_units(&self) -> u32 {
        self.kind.units_for(self.duration)
    }
}

/// A decrypted, in-order frame delivered to a sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedFrame {
    /// Sender's source id.
    pub source_id: u32,
    /// RTP sequence number.
    pub sequence: u16,
    /// RTP timestamp.
    pub timestamp: u32,
    /// RTP payload type (marker bit stripped).
    pub payload_type: u8,
    /// Marker bit (last packet of a frame).
    pub marker: bool,
    /// Decrypted payload with any header extension removed.
    pub payload: Bytes,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_audio_units() {
        let frame = MediaFrame::audio(vec![1, 2, 3]);
        assert_eq!(frame.timestamp_units(), 960);
    }

    #[test]
    fn test_video_units() {
        let frame = MediaFrame::video(vec![], Duration::from_secs_f64(1.0 / 30.0));
        assert_eq!(frame.timestamp_units(), 3000);
    }

    #[test]
    fn test_video_from_nal_units() {
        let a: &[u8] = &[0x65, 0x01];
        let b: &[u8] = &[0x41];
        let frame = MediaFrame::video_from_nal_units([a, b], Duration::from_millis(40));
        assert_eq!(&frame.data[..], &[0, 0, 0, 2, 0x65, 0x01, 0, 0, 0, 1, 0x41]);
    }

    #[test]
    fn test_stream_kind() {
        assert!(StreamKind::AudioOnly.carries(MediaKind::Audio));
        assert!(!StreamKind::AudioOnly.carries(MediaKind::Video));

        let av = StreamKind::AudioVideo { fps: 25 };
        assert!(av.carries(MediaKind::Video));
        assert_eq!(av.frame_interval(MediaKind::Video), Duration::from_millis(40));
        assert_eq!(av.frame_interval(MediaKind::Audio), Duration::from_millis(20));
        assert_eq!(av.kinds().len(), 2);
    }
}
