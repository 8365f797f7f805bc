//! Ogg Opus demuxer.
//!
//! Page layout:
//! ```text
//! "OggS" | version (1) | flags (1) | granule (8) | serial (4) | page no (4)
//!        | crc (4) | segment count (1) | segment table | segment data
//! ```
//! A packet ends at the first segment shorter than 255 bytes; a page ending
//! in a 255-byte segment continues its last packet on the next page.

use std::collections::VecDeque;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::core::{MediaFrame, MediaSource, SourceError};

const CAPTURE_PATTERN: &[u8; 4] = b"OggS";

/// Page header bytes after the capture pattern.
const PAGE_HEADER_REST: usize = 23;

const LACING_CONTINUE: u8 = 0xFF;

/// Reads Opus packets out of an Ogg stream as 20 ms audio frames.
///
/// The `OpusHead` and `OpusTags` header packets are skipped.
pub struct OggOpusReader<R> {
    reader: R,
    packets: VecDeque<Bytes>,
    partial: Vec<u8>,
    pages: u64,
}

impl<R> std::fmt::Debug for OggOpusReader<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OggOpusReader")
            .field("queued", &self.packets.len())
            .field("pages", &self.pages)
            .finish_non_exhaustive()
    }
}

impl<R: AsyncRead + Unpin + Send> OggOpusReader<R> {
    /// Wrap an Ogg byte stream.
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            packets: VecDeque::new(),
            partial: Vec::new(),
            pages: 0,
        }
    }

    /// Pages read so far.
    pub fn pages_read(&self) -> u64 {
        self.pages
    }

    /// Scan forward to the next capture pattern. `false` at end of stream.
    async fn sync(&mut self) -> Result<bool, SourceError> {
        let mut window = [0u8; 4];
        let mut filled = 0;
        loop {
            let mut byte = [0u8; 1];
            if self.reader.read(&mut byte).await? == 0 {
                return Ok(false);
            }
            if filled < 4 {
                window[filled] = byte[0];
                filled += 1;
            } else {
                window.rotate_left(1);
                window[3] = byte[0];
            }
            if filled == 4 && &window == CAPTURE_PATTERN {
                return Ok(true);
            }
        }
    }

    /// Read one page and queue its complete packets. `false` at end of stream.
    async fn read_page(&mut self) -> Result<bool, SourceError> {
        if !self.sync().await? {
            return Ok(false);
        }

        let mut header = [0u8; PAGE_HEADER_REST];
        self.read_exact(&mut header).await?;
        let segments = usize::from(header[PAGE_HEADER_REST - 1]);

        let mut table = vec![0u8; segments];
        self.read_exact(&mut table).await?;

        let body_len = table.iter().map(|&s| usize::from(s)).sum();
        let mut body = vec![0u8; body_len];
        self.read_exact(&mut body).await?;

        let mut offset = 0;
        let mut packet_len = 0;
        for &segment in &table {
            packet_len += usize::from(segment);
            if segment == LACING_CONTINUE {
                continue;
            }
            self.partial.extend_from_slice(&body[offset..offset + packet_len]);
            offset += packet_len;
            packet_len = 0;

            let packet = std::mem::take(&mut self.partial);
            if !is_header_packet(&packet) {
                self.packets.push_back(Bytes::from(packet));
            }
        }
        if packet_len > 0 {
            self.partial.extend_from_slice(&body[offset..]);
        }

        self.pages += 1;
        Ok(true)
    }

    async fn read_exact(&mut self, buf: &mut [u8]) -> Result<(), SourceError> {
        match self.reader.read_exact(buf).await {
            Ok(_) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                Err(SourceError::Malformed("truncated Ogg page".into()))
            }
            Err(e) => Err(e.into()),
        }
    }
}

fn is_header_packet(packet: &[u8]) -> bool {
    packet.starts_with(b"OpusHead") || packet.starts_with(b"OpusTags")
}

#[async_trait]
impl<R: AsyncRead + Unpin + Send> MediaSource for OggOpusReader<R> {
    async fn next_frame(&mut self) -> Result<Option<MediaFrame>, SourceError> {
        loop {
            if let Some(packet) = self.packets.pop_front() {
                return Ok(Some(MediaFrame::audio(packet)));
            }
            if !self.read_page().await? {
                if !self.partial.is_empty() {
                    tracing::debug!(
                        bytes = self.partial.len(),
                        "discarding unterminated Ogg packet"
                    );
                }
                return Ok(None);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::MediaKind;

    /// Build one Ogg page holding `packets`; `close_last = false` leaves the
    /// last packet open.
    fn page(packets: &[&[u8]], close_last: bool) -> Vec<u8> {
        let mut table = Vec::new();
        let mut body = Vec::new();
        for (i, packet) in packets.iter().enumerate() {
            let mut len = packet.len();
            while len >= 255 {
                table.push(255);
                len -= 255;
            }
            let last = i == packets.len() - 1;
            if !last || close_last {
                table.push(len as u8);
            } else {
                assert_eq!(len, 0, "open packets must be a multiple of 255 bytes");
            }
            body.extend_from_slice(packet);
        }

        let mut out = b"OggS".to_vec();
        out.push(0); // version
        out.push(0); // flags
        out.extend_from_slice(&[0u8; 8 + 4 + 4 + 4]);
        out.push(table.len() as u8);
        out.extend_from_slice(&table);
        out.extend_from_slice(&body);
        out
    }

    async fn collect(data: Vec<u8>) -> Vec<MediaFrame> {
        let mut reader = OggOpusReader::new(std::io::Cursor::new(data));
        let mut frames = Vec::new();
        while let Some(frame) = reader.next_frame().await.unwrap() {
            frames.push(frame);
        }
        frames
    }

    #[tokio::test]
    async fn test_packets_split_on_lacing() {
        let big = vec![7u8; 300];
        let mut data = page(&[b"OpusHead....", b"OpusTags"], true);
        data.extend(page(&[b"a", &big, b"bc"], true));

        let frames = collect(data).await;
        assert_eq!(frames.len(), 3);
        assert_eq!(frames[0].data, Bytes::from_static(b"a"));
        assert_eq!(frames[1].data.len(), 300);
        assert_eq!(frames[2].data, Bytes::from_static(b"bc"));
        assert!(frames.iter().all(|f| f.kind == MediaKind::Audio));
    }

    #[tokio::test]
    async fn test_packet_continues_across_pages() {
        let head = vec![1u8; 255];
        let mut data = page(&[&head], false);
        data.extend(page(&[b"tail"], true));

        let frames = collect(data).await;
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].data.len(), 259);
        assert_eq!(&frames[0].data[255..], b"tail");
    }

    #[tokio::test]
    async fn test_resync_after_garbage() {
        let mut data = b"junkOg".to_vec();
        data.extend(page(&[b"x"], true));

        let frames = collect(data).await;
        assert_eq!(frames.len(), 1);
    }

    #[tokio::test]
    async fn test_truncated_page() {
        let mut data = page(&[b"hello"], true);
        data.truncate(data.len() - 2);

        let mut reader = OggOpusReader::new(std::io::Cursor::new(data));
        assert!(matches!(
            reader.next_frame().await,
            Err(SourceError::Malformed(_))
        ));
    }
}
