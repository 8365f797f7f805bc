//! Connection counters shared by the transmit and receive paths.

use std::sync::atomic::{AtomicU64, Ordering};

use super::reorder::ReorderStats;

/// Lock-free counters for one connection.
#[derive(Debug, Default)]
pub struct ConnectionStats {
    packets_sent: AtomicU64,
    bytes_sent: AtomicU64,
    frames_sent: AtomicU64,
    frames_rejected: AtomicU64,
    pacing_drift: AtomicU64,
    packets_received: AtomicU64,
    bytes_received: AtomicU64,
    frames_delivered: AtomicU64,
    auth_failures: AtomicU64,
    protocol_errors: AtomicU64,
    packets_lost: AtomicU64,
    packets_recovered: AtomicU64,
    late_packets: AtomicU64,
    duplicate_packets: AtomicU64,
    sources_evicted: AtomicU64,
}

/// Point-in-time copy of [`ConnectionStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    /// Datagrams written to the socket.
    pub packets_sent: u64,
    /// Bytes written to the socket.
    pub bytes_sent: u64,
    /// Media frames fully sent.
    pub frames_sent: u64,
    /// Frames refused at admission (too large, wrong kind, queue full).
    pub frames_rejected: u64,
    /// Pacing schedule rebases.
    pub pacing_drift: u64,
    /// Datagrams read from the socket.
    pub packets_received: u64,
    /// Bytes read from the socket.
    pub bytes_received: u64,
    /// Frames handed to the sink.
    pub frames_delivered: u64,
    /// Packets that failed authentication.
    pub auth_failures: u64,
    /// Malformed, RTCP or non-v2 packets.
    pub protocol_errors: u64,
    /// Sequences skipped by reorder windows.
    pub packets_lost: u64,
    /// Skipped sequences that arrived late and were delivered.
    pub packets_recovered: u64,
    /// Packets older than the reorder window.
    pub late_packets: u64,
    /// Duplicate packets.
    pub duplicate_packets: u64,
    /// Remote streams evicted after going idle.
    pub sources_evicted: u64,
}

fn bump(counter: &AtomicU64, by: u64) {
    counter.fetch_add(by, Ordering::Relaxed);
}

impl ConnectionStats {
    /// Create zeroed counters.
    pub fn new() -> Self {
        Self::default()
    }

    /// A datagram of `bytes` went out.
    pub fn record_packet_sent(&self, bytes: usize) {
        bump(&self.packets_sent, 1);
        bump(&self.bytes_sent, bytes as u64);
    }

    /// A whole frame went out.
    pub fn record_frame_sent(&self) {
        bump(&self.frames_sent, 1);
    }

    /// A frame was refused.
    pub fn record_frame_rejected(&self) {
        bump(&self.frames_rejected, 1);
    }

    /// The pacer rebased its schedule.
    pub fn record_pacing_drift(&self) {
        bump(&self.pacing_drift, 1);
    }

    /// A datagram of `bytes` came in.
    pub fn record_packet_received(&self, bytes: usize) {
        bump(&self.packets_received, 1);
        bump(&self.bytes_received, bytes as u64);
    }

    /// Frames handed to the sink.
    pub fn record_delivered(&self, frames: usize) {
        bump(&self.frames_delivered, frames as u64);
    }

    /// A packet failed authentication.
    pub fn record_auth_failure(&self) {
        bump(&self.auth_failures, 1);
    }

    /// A packet was malformed or not media.
    pub fn record_protocol_error(&self) {
        bump(&self.protocol_errors, 1);
    }

    /// A remote stream was evicted.
    pub fn record_eviction(&self) {
        bump(&self.sources_evicted, 1);
    }

    /// Fold the change of one reorder window's counters in.
    pub fn record_reorder(&self, before: ReorderStats, after: ReorderStats) {
        let skipped = |s: ReorderStats| s.lost + s.recovered;
        bump(&self.packets_lost, skipped(after).saturating_sub(skipped(before)));
        bump(
            &self.packets_recovered,
            after.recovered.saturating_sub(before.recovered),
        );
        bump(&self.late_packets, after.late.saturating_sub(before.late));
        bump(
            &self.duplicate_packets,
            after.duplicates.saturating_sub(before.duplicates),
        );
    }

    /// Copy the counters.
    pub fn snapshot(&self) -> StatsSnapshot {
        let load = |counter: &AtomicU64| counter.load(Ordering::Relaxed);
        StatsSnapshot {
            packets_sent: load(&self.packets_sent),
            bytes_sent: load(&self.bytes_sent),
            frames_sent: load(&self.frames_sent),
            frames_rejected: load(&self.frames_rejected),
            pacing_drift: load(&self.pacing_drift),
            packets_received: load(&self.packets_received),
            bytes_received: load(&self.bytes_received),
            frames_delivered: load(&self.frames_delivered),
            auth_failures: load(&self.auth_failures),
            protocol_errors: load(&self.protocol_errors),
            packets_lost: load(&self.packets_lost),
            packets_recovered: load(&self.packets_recovered),
            late_packets: load(&self.late_packets),
            duplicate_packets: load(&self.duplicate_packets),
            sources_evicted: load(&self.sources_evicted),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters() {
        let stats = ConnectionStats::new();
        stats.record_packet_sent(100);
        stats.record_packet_sent(50);
        stats.record_auth_failure();

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.packets_sent, 2);
        assert_eq!(snapshot.bytes_sent, 150);
        assert_eq!(snapshot.auth_failures, 1);
        assert_eq!(snapshot.frames_delivered, 0);
    }

    #[test]
    fn test_reorder_delta() {
        let stats = ConnectionStats::new();
        let before = ReorderStats {
            lost: 3,
            ..Default::default()
        };
        // one of the three lost packets turned up late
        let after = ReorderStats {
            lost: 2,
            recovered: 1,
            late: 1,
            ..Default::default()
        };
        stats.record_reorder(before, after);

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.packets_lost, 0);
        assert_eq!(snapshot.packets_recovered, 1);
        assert_eq!(snapshot.late_packets, 1);
    }
}
