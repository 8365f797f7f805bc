//! Channel-backed frame sink.

use tokio::sync::mpsc;

use crate::core::{FrameSink, ReceivedFrame};

/// Event forwarded by a [`ChannelSink`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkEvent {
    /// A frame from a remote speaker.
    Frame(ReceivedFrame),
    /// A remote source was evicted after going idle.
    SourceTimeout(u32),
}

/// Sink that forwards everything over a bounded channel.
///
/// When the consumer falls behind, frames are dropped with a warning rather
/// than stalling the receive loop.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::Sender<SinkEvent>,
}

impl ChannelSink {
    /// Create a sink and the receiver for its events.
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<SinkEvent>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }

    fn forward(&self, event: SinkEvent) {
        match self.tx.try_send(event) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(event)) => {
                tracing::warn!(?event, "sink channel full, dropping event");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {}
        }
    }
}

impl FrameSink for ChannelSink {
    fn on_frame(&mut self, frame: ReceivedFrame) {
        self.forward(SinkEvent::Frame(frame));
    }

    fn on_source_timeout(&mut self, source_id: u32) {
        self.forward(SinkEvent::SourceTimeout(source_id));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn frame(sequence: u16) -> ReceivedFrame {
        ReceivedFrame {
            source_id: 1,
            sequence,
            timestamp: 0,
            payload_type: 0x78,
            marker: false,
            payload: Bytes::from_static(b"x"),
        }
    }

    #[tokio::test]
    async fn test_events_forwarded() {
        let (mut sink, mut rx) = ChannelSink::new(8);
        sink.on_frame(frame(1));
        sink.on_source_timeout(1);

        assert_eq!(rx.recv().await, Some(SinkEvent::Frame(frame(1))));
        assert_eq!(rx.recv().await, Some(SinkEvent::SourceTimeout(1)));
    }

    #[tokio::test]
    async fn test_full_channel_drops() {
        let (mut sink, mut rx) = ChannelSink::new(1);
        sink.on_frame(frame(1));
        sink.on_frame(frame(2));
        drop(sink);

        assert_eq!(rx.recv().await, Some(SinkEvent::Frame(frame(1))));
        assert_eq!(rx.recv().await, None);
    }
}
