//! Transmit task: one per media track.
//!
//! Frames leave the track queue one at a time. Each one waits for its pacing
//! deadline, is packetized, sealed with the next session nonce and written
//! to the socket.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{Instant, sleep_until};

use super::shared::Shared;
use crate::core::{MediaFrame, MediaKind};
use crate::crypto::{NonceCounter, PacketCipher};
use crate::transport::{
    ConnectionStats, Pacer, PacerAction, Packetizer, TransportResult, VoiceSocket,
};

/// Item on a track queue.
#[derive(Debug)]
pub(crate) enum TrackCommand {
    /// A frame to send.
    Frame(MediaFrame),
    /// Reply once every earlier item has been handled.
    Flush(oneshot::Sender<()>),
}

/// Everything a transmit task owns.
pub(crate) struct Track {
    pub(crate) packetizer: Packetizer,
    pub(crate) pacer: Pacer,
    pub(crate) queue: mpsc::Receiver<TrackCommand>,
    pub(crate) socket: VoiceSocket,
    pub(crate) cipher: Arc<PacketCipher>,
    pub(crate) nonce: Arc<NonceCounter>,
    pub(crate) stats: Arc<ConnectionStats>,
    pub(crate) shared: Arc<Shared>,
}

impl Track {
    fn kind(&self) -> MediaKind {
        self.packetizer.kind()
    }

    /// Run until shutdown or a fatal error.
    pub(crate) async fn run(mut self) {
        let mut shutdown = self.shared.shutdown_signal();
        let mut paused = self.shared.pause_signal();
        let kind = self.kind();

        loop {
            let command = tokio::select! {
                biased;
                _ = shutdown.wait_for(|&stop| stop) => break,
                command = self.queue.recv() => match command {
                    Some(command) => command,
                    None => break,
                },
            };

            let frame = match command {
                TrackCommand::Frame(frame) => frame,
                TrackCommand::Flush(done) => {
                    let _ = done.send(());
                    continue;
                }
            };

            if !self.wait_for_deadline(&mut shutdown, &mut paused).await {
                break;
            }

            if let Err(e) = self.send_frame(&frame).await {
                if e.is_fatal() {
                    self.shared.fail(e);
                    break;
                }
                self.stats.record_frame_rejected();
                tracing::warn!(?kind, error = %e, "dropping frame");
            }
        }

        tracing::debug!(?kind, frames = self.pacer.frames_sent(), "transmit task stopped");
    }

    /// Suspend until the pacer allows the next send.
    ///
    /// Returns `false` on shutdown.
    async fn wait_for_deadline(
        &mut self,
        shutdown: &mut watch::Receiver<bool>,
        paused: &mut watch::Receiver<bool>,
    ) -> bool {
        loop {
            let want_paused = *paused.borrow_and_update();
            let now = Instant::now();
            if want_paused {
                self.pacer.pause(now);
            } else if let Some(paused_for) = self.pacer.resume(now) {
                tracing::debug!(
                    kind = ?self.kind(),
                    paused_ms = paused_for.as_millis() as u64,
                    "transmit resumed"
                );
            }

            match self.pacer.poll(now) {
                PacerAction::SendNow => return true,
                PacerAction::WaitUntil(deadline) => {
                    tokio::select! {
                        biased;
                        _ = shutdown.wait_for(|&stop| stop) => return false,
                        changed = paused.changed() => if changed.is_err() { return false },
                        _ = sleep_until(deadline) => {}
                    }
                }
                PacerAction::Paused => {
                    tokio::select! {
                        biased;
                        _ = shutdown.wait_for(|&stop| stop) => return false,
                        changed = paused.changed() => if changed.is_err() { return false },
                    }
                }
            }
        }
    }

    async fn send_frame(&mut self, frame: &MediaFrame) -> TransportResult<()> {
        let packets = self.packetizer.build(frame)?;

        for packet in &packets {
            let counter = self.nonce.next()?;
            let header = packet.header.to_bytes();
            let datagram = self.cipher.seal_packet(counter, &header, &packet.payload)?;
            let sent = self.socket.send(&datagram).await?;

            self.stats.record_packet_sent(sent);
            tracing::trace!(
                source_id = packet.header.source_id,
                sequence = packet.header.sequence,
                timestamp = packet.header.timestamp,
                bytes = sent,
                "packet sent"
            );
        }

        if self.pacer.on_frame_sent(Instant::now()).is_some() {
            self.stats.record_pacing_drift();
        }
        self.stats.record_frame_sent();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{AUDIO_FRAME_DURATION, SESSION_KEY_SIZE};
    use crate::crypto::{EncryptionMode, SessionKey};
    use tokio::net::UdpSocket;

    async fn track(capacity: usize) -> (Track, mpsc::Sender<TrackCommand>, UdpSocket) {
        let peer = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let socket = VoiceSocket::connect(peer.local_addr().unwrap()).await.unwrap();
        let shared = Arc::new(Shared::new());
        let (tx, queue) = mpsc::channel(capacity);
        let key = SessionKey::from_bytes([7; SESSION_KEY_SIZE]);

        let track = Track {
            packetizer: Packetizer::new(MediaKind::Audio, 1),
            pacer: Pacer::new(AUDIO_FRAME_DURATION),
            queue,
            socket,
            cipher: Arc::new(PacketCipher::new(EncryptionMode::default(), &key)),
            nonce: Arc::new(NonceCounter::new()),
            stats: Arc::clone(&shared.stats),
            shared,
        };
        (track, tx, peer)
    }

    async fn flush(tx: &mpsc::Sender<TrackCommand>) {
        let (done_tx, done_rx) = oneshot::channel();
        tx.send(TrackCommand::Flush(done_tx)).await.unwrap();
        done_rx.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_frames_paced_on_schedule() {
        let (track, tx, _peer) = track(128).await;
        let stats = Arc::clone(&track.stats);
        tokio::spawn(track.run());

        let start = Instant::now();
        for _ in 0..100 {
            tx.send(TrackCommand::Frame(MediaFrame::audio(vec![0xF8])))
                .await
                .unwrap();
        }
        flush(&tx).await;

        let elapsed = start.elapsed();
        assert!(elapsed >= AUDIO_FRAME_DURATION * 99);
        assert!(elapsed <= AUDIO_FRAME_DURATION * 100);
        assert_eq!(stats.snapshot().frames_sent, 100);
    }

    #[tokio::test(start_paused = true)]
    async fn test_long_audio_frames_rejected() {
        let (track, tx, _peer) = track(16).await;
        let stats = Arc::clone(&track.stats);
        tokio::spawn(track.run());

        for _ in 0..10 {
            let mut frame = MediaFrame::audio(vec![0xF8]);
            frame.duration = AUDIO_FRAME_DURATION * 3;
            tx.send(TrackCommand::Frame(frame)).await.unwrap();
        }
        flush(&tx).await;

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.frames_rejected, 10);
        assert_eq!(snapshot.frames_sent, 0);
        assert_eq!(snapshot.packets_sent, 0);
    }

    #[tokio::test]
    async fn test_shutdown_stops_task() {
        let (track, tx, _peer) = track(4).await;
        let shared = Arc::clone(&track.shared);
        let handle = tokio::spawn(track.run());

        shared.begin_close();
        handle.await.unwrap();
        assert!(tx.is_closed());
    }

    #[tokio::test]
    async fn test_invalid_frame_counted_not_fatal() {
        let (track, tx, peer) = track(4).await;
        let shared = Arc::clone(&track.shared);
        tokio::spawn(track.run());

        tx.send(TrackCommand::Frame(MediaFrame::video(vec![0, 0, 0, 9, 1], AUDIO_FRAME_DURATION)))
            .await
            .unwrap();
        tx.send(TrackCommand::Frame(MediaFrame::audio(vec![1, 2, 3])))
            .await
            .unwrap();
        flush(&tx).await;

        let mut buf = [0u8; 256];
        let len = peer.recv(&mut buf).await.unwrap();
        assert!(len > 12);
        let stats = shared.stats.snapshot();
        assert_eq!(stats.frames_rejected, 1);
        assert_eq!(stats.frames_sent, 1);
        assert!(shared.last_error().is_none());
    }
}
