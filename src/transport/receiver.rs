//! Receive-side demultiplexing of remote streams.
//!
//! Every inbound datagram is parsed, authenticated and routed to the
//! [`RemoteStream`] of its source id. Streams are created on first contact
//! and evicted once idle. Nothing reaches the sink before it has been
//! authenticated.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::time::Instant;

use super::error::TransportResult;
use super::packet::{parse_packet_header, strip_header_extension};
use super::reorder::{ReorderStats, ReorderWindow};
use super::stats::ConnectionStats;
use crate::core::{
    CryptoError, FrameSink, ReceivedFrame, DEFAULT_REORDER_HOLD, DEFAULT_REORDER_WINDOW,
    DEFAULT_SOURCE_TIMEOUT,
};
use crate::crypto::PacketCipher;

/// Tunables for the receive path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReceiveConfig {
    /// Reorder window in sequence numbers (1..=64).
    pub reorder_window: usize,
    /// Longest a packet waits for a gap to fill.
    pub reorder_hold: Duration,
    /// Idle time after which a remote stream is evicted.
    pub source_timeout: Duration,
}

impl Default for ReceiveConfig {
    fn default() -> Self {
        Self {
            reorder_window: DEFAULT_REORDER_WINDOW,
            reorder_hold: DEFAULT_REORDER_HOLD,
            source_timeout: DEFAULT_SOURCE_TIMEOUT,
        }
    }
}

/// State kept per remote source id.
#[derive(Debug)]
pub struct RemoteStream {
    source_id: u32,
    window: ReorderWindow<ReceivedFrame>,
    last_timestamp: Option<u32>,
    last_activity: Instant,
    packets: u64,
}

impl RemoteStream {
    fn new(source_id: u32, config: &ReceiveConfig, now: Instant) -> Self {
        Self {
            source_id,
            window: ReorderWindow::new(config.reorder_window, config.reorder_hold),
            last_timestamp: None,
            last_activity: now,
            packets: 0,
        }
    }

    /// Remote source id.
    pub fn source_id(&self) -> u32 {
        self.source_id
    }

    /// Timestamp of the last frame delivered.
    pub fn last_timestamp(&self) -> Option<u32> {
        self.last_timestamp
    }

    /// When the last authenticated packet arrived.
    pub fn last_activity(&self) -> Instant {
        self.last_activity
    }

    /// Authenticated packets received.
    pub fn packets(&self) -> u64 {
        self.packets
    }

    /// Reorder counters.
    pub fn reorder_stats(&self) -> ReorderStats {
        self.window.stats()
    }

    fn deliver(&mut self, frames: Vec<ReceivedFrame>, sink: &mut dyn FrameSink) -> usize {
        let count = frames.len();
        for frame in frames {
            self.last_timestamp = Some(frame.timestamp);
            sink.on_frame(frame);
        }
        count
    }
}

/// Routes decrypted packets to per-source reorder windows.
#[derive(Debug)]
pub struct Demultiplexer {
    cipher: Arc<PacketCipher>,
    config: ReceiveConfig,
    streams: HashMap<u32, RemoteStream>,
    stats: Arc<ConnectionStats>,
}

impl Demultiplexer {
    /// Create a demultiplexer sharing the session cipher and counters.
    pub fn new(
        cipher: Arc<PacketCipher>,
        config: ReceiveConfig,
        stats: Arc<ConnectionStats>,
    ) -> Self {
        Self {
            cipher,
            config,
            streams: HashMap::new(),
            stats,
        }
    }

    /// Number of live remote streams.
    pub fn source_count(&self) -> usize {
        self.streams.len()
    }

    /// Look up a remote stream.
    pub fn stream(&self, source_id: u32) -> Option<&RemoteStream> {
        self.streams.get(&source_id)
    }

    /// Process one datagram.
    ///
    /// Returns the number of frames delivered. Errors are per packet: the
    /// packet has been dropped and counted, the caller carries on.
    pub fn handle_datagram(
        &mut self,
        datagram: &[u8],
        now: Instant,
        sink: &mut dyn FrameSink,
    ) -> TransportResult<usize> {
        self.stats.record_packet_received(datagram.len());

        let header = parse_packet_header(datagram).inspect_err(|_| {
            self.stats.record_protocol_error();
        })?;

        let plaintext = self
            .cipher
            .open_packet(header.header_len(), datagram)
            .inspect_err(|e| {
                if *e == CryptoError::AuthenticationFailed {
                    self.stats.record_auth_failure();
                }
            })?;

        let payload = if header.extension {
            let stripped = strip_header_extension(&plaintext).inspect_err(|_| {
                self.stats.record_protocol_error();
            })?;
            Bytes::copy_from_slice(stripped)
        } else {
            Bytes::from(plaintext)
        };

        let frame = ReceivedFrame {
            source_id: header.source_id,
            sequence: header.sequence,
            timestamp: header.timestamp,
            payload_type: header.payload_type,
            marker: header.marker,
            payload,
        };

        let config = self.config;
        let stream = self.streams.entry(header.source_id).or_insert_with(|| {
            tracing::debug!(source_id = header.source_id, "new remote stream");
            RemoteStream::new(header.source_id, &config, now)
        });
        stream.last_activity = now;
        stream.packets += 1;

        tracing::trace!(
            source_id = header.source_id,
            sequence = header.sequence,
            timestamp = header.timestamp,
            "packet received"
        );

        let before = stream.window.stats();
        let released = stream.window.push(header.sequence, now, frame);
        self.stats.record_reorder(before, stream.window.stats());

        let delivered = stream.deliver(released, sink);
        self.stats.record_delivered(delivered);
        Ok(delivered)
    }

    /// Housekeeping: release expired holds and evict idle streams.
    pub fn tick(&mut self, now: Instant, sink: &mut dyn FrameSink) {
        let timeout = self.config.source_timeout;
        let mut idle = Vec::new();

        for (source_id, stream) in self.streams.iter_mut() {
            if now.saturating_duration_since(stream.last_activity) >= timeout {
                idle.push(*source_id);
                continue;
            }
            let before = stream.window.stats();
            let released = stream.window.tick(now);
            self.stats.record_reorder(before, stream.window.stats());
            let delivered = stream.deliver(released, sink);
            self.stats.record_delivered(delivered);
        }

        for source_id in idle {
            self.evict(source_id, sink);
        }
    }

    /// Flush every stream (used on shutdown).
    pub fn flush_all(&mut self, sink: &mut dyn FrameSink) {
        for stream in self.streams.values_mut() {
            let before = stream.window.stats();
            let released = stream.window.flush();
            self.stats.record_reorder(before, stream.window.stats());
            let delivered = stream.deliver(released, sink);
            self.stats.record_delivered(delivered);
        }
    }

    fn evict(&mut self, source_id: u32, sink: &mut dyn FrameSink) {
        let Some(mut stream) = self.streams.remove(&source_id) else {
            return;
        };

        let before = stream.window.stats();
        let released = stream.window.flush();
        self.stats.record_reorder(before, stream.window.stats());
        let delivered = stream.deliver(released, sink);
        self.stats.record_delivered(delivered);
        self.stats.record_eviction();

        tracing::debug!(source_id, packets = stream.packets, "remote stream evicted");
        sink.on_source_timeout(source_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{PAYLOAD_TYPE_H264, PAYLOAD_TYPE_OPUS, SESSION_KEY_SIZE};
    use crate::crypto::{EncryptionMode, SessionKey};
    use crate::transport::packet::{RtpHeader, video_header_extension};

    #[derive(Default)]
    struct Recorder {
        frames: Vec<ReceivedFrame>,
        timeouts: Vec<u32>,
    }

    impl FrameSink for Recorder {
        fn on_frame(&mut self, frame: ReceivedFrame) {
            self.frames.push(frame);
        }

        fn on_source_timeout(&mut self, source_id: u32) {
            self.timeouts.push(source_id);
        }
    }

    fn cipher() -> Arc<PacketCipher> {
        Arc::new(PacketCipher::new(
            EncryptionMode::default(),
            &SessionKey::from_bytes([0; SESSION_KEY_SIZE]),
        ))
    }

    fn demux(cipher: Arc<PacketCipher>) -> Demultiplexer {
        Demultiplexer::new(cipher, ReceiveConfig::default(), Arc::new(ConnectionStats::new()))
    }

    fn datagram(cipher: &PacketCipher, source_id: u32, sequence: u16, payload: &[u8]) -> Vec<u8> {
        let timestamp = u32::from(sequence) * 960;
        let header = RtpHeader::new(PAYLOAD_TYPE_OPUS, sequence, timestamp, source_id);
        cipher
            .seal_packet(u32::from(sequence), &header.to_bytes(), payload)
            .unwrap()
    }

    #[test]
    fn test_out_of_order_scenario() {
        let cipher = cipher();
        let mut demux = demux(cipher.clone());
        let mut sink = Recorder::default();
        let now = Instant::now();

        demux.handle_datagram(&datagram(&cipher, 9, 10, b"ten"), now, &mut sink).unwrap();
        demux.handle_datagram(&datagram(&cipher, 9, 8, b"eight"), now, &mut sink).unwrap();

        let sequences: Vec<u16> = sink.frames.iter().map(|f| f.sequence).collect();
        assert_eq!(sequences, vec![10, 8]);
        assert_eq!(sink.frames[1].payload, Bytes::from_static(b"eight"));
        assert_eq!(sink.frames[0].source_id, 9);
    }

    #[test]
    fn test_sources_demultiplexed() {
        let cipher = cipher();
        let mut demux = demux(cipher.clone());
        let mut sink = Recorder::default();
        let now = Instant::now();

        for seq in 1..=3 {
            demux.handle_datagram(&datagram(&cipher, 1, seq, b"a"), now, &mut sink).unwrap();
            demux.handle_datagram(&datagram(&cipher, 2, seq + 100, b"b"), now, &mut sink).unwrap();
        }

        assert_eq!(demux.source_count(), 2);
        assert_eq!(demux.stream(1).unwrap().packets(), 3);
        assert_eq!(demux.stream(2).unwrap().last_timestamp(), Some(103 * 960));
        assert_eq!(sink.frames.len(), 6);
    }

    #[test]
    fn test_tampered_packet_never_delivered() {
        let cipher = cipher();
        let stats = Arc::new(ConnectionStats::new());
        let mut demux = Demultiplexer::new(cipher.clone(), ReceiveConfig::default(), stats.clone());
        let mut sink = Recorder::default();

        let mut packet = datagram(&cipher, 5, 1, b"payload");
        let tag_byte = packet.len() - 5;
        packet[tag_byte] ^= 0xFF;

        let result = demux.handle_datagram(&packet, Instant::now(), &mut sink);
        assert!(result.unwrap_err().is_silent_drop());
        assert!(sink.frames.is_empty());
        assert_eq!(demux.source_count(), 0);
        assert_eq!(stats.snapshot().auth_failures, 1);
    }

    #[test]
    fn test_rtcp_dropped() {
        let cipher = cipher();
        let stats = Arc::new(ConnectionStats::new());
        let mut demux = Demultiplexer::new(cipher, ReceiveConfig::default(), stats.clone());
        let mut sink = Recorder::default();

        let mut rtcp = vec![0u8; 40];
        rtcp[0] = 0x81;
        rtcp[1] = 200;

        assert!(demux.handle_datagram(&rtcp, Instant::now(), &mut sink).is_err());
        assert_eq!(stats.snapshot().protocol_errors, 1);
        assert!(sink.frames.is_empty());
    }

    #[test]
    fn test_extension_stripped() {
        let cipher = cipher();
        let mut demux = demux(cipher.clone());
        let mut sink = Recorder::default();

        let header = RtpHeader::new(PAYLOAD_TYPE_H264, 1, 0, 44)
            .with_extension(true)
            .with_marker(true);
        let mut plaintext = video_header_extension().to_vec();
        plaintext.extend_from_slice(&[0x65, 1, 2, 3]);
        let packet = cipher.seal_packet(1, &header.to_bytes(), &plaintext).unwrap();

        demux.handle_datagram(&packet, Instant::now(), &mut sink).unwrap();
        assert_eq!(sink.frames[0].payload, Bytes::from_static(&[0x65, 1, 2, 3]));
        assert_eq!(sink.frames[0].payload_type, PAYLOAD_TYPE_H264);
        assert!(sink.frames[0].marker);
    }

    #[test]
    fn test_idle_source_evicted_after_flush() {
        let cipher = cipher();
        let stats = Arc::new(ConnectionStats::new());
        let mut demux = Demultiplexer::new(cipher.clone(), ReceiveConfig::default(), stats.clone());
        let mut sink = Recorder::default();
        let start = Instant::now();

        demux.handle_datagram(&datagram(&cipher, 3, 1, b"1"), start, &mut sink).unwrap();
        demux.handle_datagram(&datagram(&cipher, 3, 3, b"3"), start, &mut sink).unwrap();
        assert_eq!(sink.frames.len(), 1);

        demux.tick(start + Duration::from_secs(1), &mut sink);
        assert_eq!(sink.frames.len(), 2);
        assert!(sink.timeouts.is_empty());

        demux.tick(start + DEFAULT_SOURCE_TIMEOUT, &mut sink);
        assert_eq!(sink.timeouts, vec![3]);
        assert_eq!(demux.source_count(), 0);
        assert_eq!(stats.snapshot().sources_evicted, 1);
        assert_eq!(stats.snapshot().packets_lost, 1);
    }

    #[test]
    fn test_eviction_flushes_held_frames_first() {
        let cipher = cipher();
        let config = ReceiveConfig {
            reorder_hold: Duration::from_secs(60),
            ..ReceiveConfig::default()
        };
        let stats = Arc::new(ConnectionStats::new());
        let mut demux = Demultiplexer::new(cipher.clone(), config, stats);
        let mut sink = Recorder::default();
        let start = Instant::now();

        demux.handle_datagram(&datagram(&cipher, 7, 1, b"1"), start, &mut sink).unwrap();
        demux.handle_datagram(&datagram(&cipher, 7, 4, b"4"), start, &mut sink).unwrap();
        assert_eq!(sink.frames.len(), 1);

        demux.tick(start + DEFAULT_SOURCE_TIMEOUT, &mut sink);
        assert_eq!(sink.frames.len(), 2);
        assert_eq!(sink.frames[1].sequence, 4);
        assert_eq!(sink.timeouts, vec![7]);
    }
}
