//! H.264 Annex-B elementary stream reader.
//!
//! NAL units are split on `00 00 01` start codes and grouped into access
//! units on access unit delimiters (type 9). The delimiters themselves are
//! not forwarded. SPS and SEI units have their emulation prevention bytes
//! removed before packetization.

use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::core::{DEFAULT_VIDEO_FPS, MediaFrame, MediaSource, SourceError};

/// Bytes requested from the reader per refill.
pub const READ_CHUNK_SIZE: usize = 8192;

const START_CODE: [u8; 3] = [0, 0, 1];

/// NAL unit types the reader cares about.
pub mod nal_type {
    /// Supplemental enhancement information.
    pub const SEI: u8 = 6;
    /// Sequence parameter set.
    pub const SPS: u8 = 7;
    /// Access unit delimiter.
    pub const AUD: u8 = 9;
}

fn find_start_code(data: &[u8]) -> Option<usize> {
    data.windows(START_CODE.len()).position(|w| w == START_CODE)
}

/// Strip `00 00 03` emulation prevention bytes.
pub fn remove_emulation_prevention(nal: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(nal.len());
    let mut zeros = 0;
    for &byte in nal {
        if zeros >= 2 && byte == 0x03 {
            zeros = 0;
            continue;
        }
        zeros = if byte == 0 { zeros + 1 } else { 0 };
        out.push(byte);
    }
    out
}

/// Reads access units from an Annex-B byte stream.
pub struct AnnexBReader<R> {
    reader: R,
    buffer: Vec<u8>,
    access_unit: Vec<Bytes>,
    ready: VecDeque<MediaFrame>,
    frame_duration: Duration,
    eof: bool,
}

impl<R> std::fmt::Debug for AnnexBReader<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnnexBReader")
            .field("buffered", &self.buffer.len())
            .field("pending_nals", &self.access_unit.len())
            .field("frame_duration", &self.frame_duration)
            .field("eof", &self.eof)
            .finish_non_exhaustive()
    }
}

impl<R: AsyncRead + Unpin + Send> AnnexBReader<R> {
    /// Reader producing frames at the default 30 fps.
    pub fn new(reader: R) -> Self {
        Self::with_fps(reader, DEFAULT_VIDEO_FPS)
    }

    /// Reader producing frames of `1/fps` seconds. Zero falls back to the
    /// default rate.
    pub fn with_fps(reader: R, fps: u32) -> Self {
        let fps = if fps == 0 { DEFAULT_VIDEO_FPS } else { fps };
        Self {
            reader,
            buffer: Vec::with_capacity(READ_CHUNK_SIZE),
            access_unit: Vec::new(),
            ready: VecDeque::new(),
            frame_duration: Duration::from_secs_f64(1.0 / f64::from(fps)),
            eof: false,
        }
    }

    /// Duration stamped on every produced frame.
    pub fn frame_duration(&self) -> Duration {
        self.frame_duration
    }

    /// Move every NAL unit terminated by a start code out of the buffer.
    fn drain_complete_nals(&mut self) {
        let mut consumed = 0;
        while let Some(pos) = find_start_code(&self.buffer[consumed..]) {
            let nal = Bytes::copy_from_slice(&self.buffer[consumed..consumed + pos]);
            consumed += pos + START_CODE.len();
            self.push_nal(nal);
        }
        self.buffer.drain(..consumed);
    }

    fn push_nal(&mut self, mut nal: Bytes) {
        // the leading zero of a four-byte start code trails the previous unit
        while nal.last() == Some(&0) {
            nal.truncate(nal.len() - 1);
        }
        let Some(&header) = nal.first() else {
            return;
        };

        match header & 0x1F {
            nal_type::AUD => self.finish_access_unit(),
            nal_type::SPS | nal_type::SEI => {
                self.access_unit.push(remove_emulation_prevention(&nal).into());
            }
            _ => self.access_unit.push(nal),
        }
    }

    fn finish_access_unit(&mut self) {
        if self.access_unit.is_empty() {
            return;
        }
        let frame = MediaFrame::video_from_nal_units(
            self.access_unit.iter().map(|nal| nal.as_ref()),
            self.frame_duration,
        );
        tracing::trace!(nals = self.access_unit.len(), bytes = frame.data.len(), "access unit");
        self.access_unit.clear();
        self.ready.push_back(frame);
    }

    async fn fill(&mut self) -> Result<(), SourceError> {
        let mut chunk = [0u8; READ_CHUNK_SIZE];
        let n = self.reader.read(&mut chunk).await?;
        if n == 0 {
            self.eof = true;
            let tail = Bytes::from(std::mem::take(&mut self.buffer));
            self.push_nal(tail);
            self.finish_access_unit();
        } else {
            self.buffer.extend_from_slice(&chunk[..n]);
            self.drain_complete_nals();
        }
        Ok(())
    }
}

#[async_trait]
impl<R: AsyncRead + Unpin + Send> MediaSource for AnnexBReader<R> {
    async fn next_frame(&mut self) -> Result<Option<MediaFrame>, SourceError> {
        loop {
            if let Some(frame) = self.ready.pop_front() {
                return Ok(Some(frame));
            }
            if self.eof {
                return Ok(None);
            }
            self.fill().await?;
        }
    }
}
