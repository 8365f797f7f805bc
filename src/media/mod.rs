//! Voicewire - Media Sources
//!
//! Adapters that turn encoded files and in-memory buffers into
//! [`MediaSource`]s:
//!
//! - [`OggOpusReader`]: Opus packets from an Ogg container, 20 ms each
//! - [`AnnexBReader`]: H.264 access units from an Annex-B stream
//! - [`VecSource`]: pre-built frames, mostly for tests and tooling

pub mod h264;
mod ogg;

use std::collections::VecDeque;

use async_trait::async_trait;

pub use crate::core::{MediaFrame, MediaKind, MediaSource, SourceError};
pub use h264::AnnexBReader;
pub use ogg::OggOpusReader;

/// Source replaying a fixed list of frames.
#[derive(Debug, Clone, Default)]
pub struct VecSource {
    frames: VecDeque<MediaFrame>,
}

impl VecSource {
    /// Source yielding `frames` in order.
    pub fn new(frames: impl IntoIterator<Item = MediaFrame>) -> Self {
        Self {
            frames: frames.into_iter().collect(),
        }
    }

    /// Frames not yet yielded.
    pub fn remaining(&self) -> usize {
        self.frames.len()
    }
}

impl From<Vec<MediaFrame>> for VecSource {
    fn from(frames: Vec<MediaFrame>) -> Self {
        Self::new(frames)
    }
}

#[async_trait]
impl MediaSource for VecSource {
    async fn next_frame(&mut self) -> Result<Option<MediaFrame>, SourceError> {
        Ok(self.frames.pop_front())
    }
}
