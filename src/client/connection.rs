//! High-level voice connection.
//!
//! [`VoiceConnection::open`] performs the handshake and spawns the I/O
//! tasks:
//!
//! ```text
//!  send()/stream() ─► audio queue ─► transmit task ─┐
//!                 └─► video queue ─► transmit task ─┼─► VoiceSocket ◄─ receive task ─► sink
//!                                                   │
//!                           shared NonceCounter ────┘
//! ```
//!
//! A supervisor task joins them all after shutdown and moves the session to
//! `Closed`. The socket is released when the last task drops its handle.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::timeout;

use super::config::ConnectionConfig;
use super::receive::run_receive;
use super::session::{Session, SessionParams};
use super::shared::Shared;
use super::transmit::{Track, TrackCommand};
use crate::core::{
    FrameSink, MediaFrame, MediaKind, MediaSource, NullSink, OPUS_SILENCE_FRAME,
    SILENCE_FRAME_COUNT,
};
use crate::crypto::{NonceCounter, PacketCipher, SessionKey};
use crate::transport::{
    Demultiplexer, HandshakeError, Pacer, Packetizer, SessionState, StatsSnapshot,
    TransportError, TransportResult, VoiceSocket, discover, validate_frame,
};

struct Inner {
    session: Session,
    config: ConnectionConfig,
    shared: Arc<Shared>,
    audio_tx: mpsc::Sender<TrackCommand>,
    video_tx: Option<mpsc::Sender<TrackCommand>>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        // last handle gone: stop the tasks, the supervisor finishes the close
        self.shared.begin_close();
    }
}

/// Handle to an open voice connection.
///
/// Cheap to clone; every clone controls the same session. Dropping the last
/// clone closes the connection in the background.
#[derive(Clone)]
pub struct VoiceConnection {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for VoiceConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VoiceConnection")
            .field("session", &self.inner.session)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

/// Socket and keys produced by a successful handshake.
struct Established {
    socket: VoiceSocket,
    session: Session,
    cipher: Arc<PacketCipher>,
}

impl VoiceConnection {
    /// Open a transmit-only connection; received media is discarded.
    pub async fn open(params: SessionParams, config: ConnectionConfig) -> TransportResult<Self> {
        Self::open_with_sink(params, config, NullSink).await
    }

    /// Open a connection delivering received media to `sink`.
    ///
    /// Rejects an invalid `config` before any I/O. Then resolves the server,
    /// performs IP discovery with retries, validates the session key and
    /// spawns the receive task plus one transmit task per track.
    pub async fn open_with_sink<K>(
        params: SessionParams,
        config: ConnectionConfig,
        sink: K,
    ) -> TransportResult<Self>
    where
        K: FrameSink + 'static,
    {
        config.validate()?;

        let shared = Arc::new(Shared::new());
        shared.transition(SessionState::Handshaking)?;

        let established = match handshake(&params, &config).await {
            Ok(established) => established,
            Err(e) => {
                tracing::warn!(source_id = params.source_id, error = %e, "handshake failed");
                shared.fail(recorded_copy(&e));
                shared.finish_close();
                return Err(e);
            }
        };
        shared.transition(SessionState::Ready)?;

        let Established {
            socket,
            session,
            cipher,
        } = established;

        tracing::info!(
            source_id = session.source_id,
            remote = %session.remote_address,
            external = %session.external_address,
            mode = %session.encryption_mode,
            "voice connection ready"
        );

        let nonce = Arc::new(NonceCounter::new());
        let mut handles = Vec::new();
        let mut senders = Vec::new();

        for &kind in session.stream_kind.kinds() {
            let (tx, rx) = mpsc::channel(config.queue_capacity);
            senders.push((kind, tx));

            let track = Track {
                packetizer: Packetizer::new(kind, session.source_id),
                pacer: Pacer::with_drift_threshold(
                    session.stream_kind.frame_interval(kind),
                    config.drift_threshold,
                ),
                queue: rx,
                socket: socket.clone(),
                cipher: Arc::clone(&cipher),
                nonce: Arc::clone(&nonce),
                stats: Arc::clone(&shared.stats),
                shared: Arc::clone(&shared),
            };
            handles.push(tokio::spawn(track.run()));
        }

        let demux = Demultiplexer::new(cipher, config.receive, Arc::clone(&shared.stats));
        handles.push(tokio::spawn(run_receive(
            socket,
            demux,
            Box::new(sink),
            Arc::clone(&shared),
        )));

        tokio::spawn(supervise(Arc::clone(&shared), handles));

        let mut audio_tx = None;
        let mut video_tx = None;
        for (kind, tx) in senders {
            match kind {
                MediaKind::Audio => audio_tx = Some(tx),
                MediaKind::Video => video_tx = Some(tx),
            }
        }
        let audio_tx = audio_tx.ok_or(TransportError::UnsupportedMediaKind(MediaKind::Audio))?;

        Ok(Self {
            inner: Arc::new(Inner {
                session,
                config,
                shared,
                audio_tx,
                video_tx,
            }),
        })
    }

    /// The established session.
    pub fn session(&self) -> &Session {
        &self.inner.session
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        self.inner.shared.state()
    }

    /// Watch lifecycle changes.
    pub fn subscribe_state(&self) -> watch::Receiver<SessionState> {
        self.inner.shared.subscribe_state()
    }

    /// The fatal error that ended the session, if any.
    pub fn last_error(&self) -> Option<Arc<TransportError>> {
        self.inner.shared.last_error()
    }

    /// Our address as seen by the voice server.
    pub fn external_address(&self) -> SocketAddr {
        self.inner.session.external_address
    }

    /// Snapshot of the connection counters.
    pub fn stats(&self) -> StatsSnapshot {
        self.inner.shared.stats.snapshot()
    }

    fn track(&self, kind: MediaKind) -> Option<&mpsc::Sender<TrackCommand>> {
        match kind {
            MediaKind::Audio => Some(&self.inner.audio_tx),
            MediaKind::Video => self.inner.video_tx.as_ref(),
        }
    }

    fn reject(&self, error: TransportError) -> TransportError {
        self.inner.shared.stats.record_frame_rejected();
        error
    }

    /// Queue a frame on its track.
    ///
    /// Waits at most the admission timeout for queue space. Oversized audio
    /// and malformed video are refused before queueing. The first admitted
    /// frame moves the session to `Streaming`.
    pub async fn send(&self, frame: MediaFrame) -> TransportResult<()> {
        if !self.state().is_established() {
            return Err(TransportError::ConnectionClosed);
        }

        let kind = frame.kind;
        let Some(track) = self.track(kind) else {
            return Err(self.reject(TransportError::UnsupportedMediaKind(kind)));
        };
        validate_frame(&frame).map_err(|e| self.reject(e.into()))?;

        match timeout(
            self.inner.config.admission_timeout,
            track.send(TrackCommand::Frame(frame)),
        )
        .await
        {
            Ok(Ok(())) => {}
            Ok(Err(_)) => return Err(TransportError::ConnectionClosed),
            Err(_) => return Err(self.reject(TransportError::QueueFull(kind))),
        }

        self.inner.shared.mark_streaming();
        Ok(())
    }

    /// Wait until every frame queued so far has been sent.
    pub async fn flush(&self) {
        let tracks = [Some(&self.inner.audio_tx), self.inner.video_tx.as_ref()];
        for track in tracks.into_iter().flatten() {
            let (done_tx, done_rx) = oneshot::channel();
            if track.send(TrackCommand::Flush(done_tx)).await.is_ok() {
                let _ = done_rx.await;
            }
        }
    }

    /// Pump frames from `source` until it is exhausted.
    ///
    /// At the end of the stream five Opus silence frames are sent and the
    /// connection closes. A failing source closes the connection with the
    /// source error recorded.
    pub fn stream<S>(&self, source: S) -> JoinHandle<()>
    where
        S: MediaSource + 'static,
    {
        let connection = self.clone();
        tokio::spawn(async move { connection.pump(source).await })
    }

    async fn pump<S: MediaSource>(&self, mut source: S) {
        loop {
            match source.next_frame().await {
                Ok(Some(frame)) => match self.send(frame).await {
                    Ok(()) => {}
                    Err(e) if e.is_fatal() => {
                        tracing::debug!(error = %e, "stream stopped");
                        return;
                    }
                    Err(e) => tracing::warn!(error = %e, "frame dropped"),
                },
                Ok(None) => break,
                Err(e) => {
                    self.inner.shared.fail(e.into());
                    return;
                }
            }
        }

        tracing::info!("media source exhausted");
        for _ in 0..SILENCE_FRAME_COUNT {
            if self.send(MediaFrame::audio(OPUS_SILENCE_FRAME.to_vec())).await.is_err() {
                break;
            }
        }
        self.flush().await;
        self.close().await;
    }

    /// Suspend transmit pacing: `Streaming -> Paused`.
    pub fn pause(&self) -> TransportResult<()> {
        self.inner.shared.pause()
    }

    /// Resume transmit pacing: `Paused -> Streaming`.
    pub fn resume(&self) -> TransportResult<()> {
        self.inner.shared.resume()
    }

    /// Close the connection and wait until every task has stopped.
    ///
    /// Safe to call repeatedly and concurrently.
    pub async fn close(&self) {
        if self.inner.shared.begin_close() {
            tracing::debug!(source_id = self.inner.session.source_id, "closing voice connection");
        }
        let mut state = self.subscribe_state();
        let _ = state.wait_for(|s| s.is_terminal()).await;
    }
}

async fn handshake(
    params: &SessionParams,
    config: &ConnectionConfig,
) -> TransportResult<Established> {
    let session_key =
        SessionKey::from_slice(&params.session_key).map_err(HandshakeError::InvalidKey)?;

    let host = params.remote_host.as_str();
    let remote = tokio::net::lookup_host((host, params.remote_port))
        .await
        .ok()
        .and_then(|mut addrs| addrs.next())
        .ok_or_else(|| HandshakeError::Resolve {
            host: params.remote_host.clone(),
        })?;

    let socket = VoiceSocket::connect(remote).await?;
    let external_address = discover(&socket, params.source_id, config.discovery).await?;

    let cipher = Arc::new(PacketCipher::new(params.encryption_mode, &session_key));
    let session = Session {
        source_id: params.source_id,
        session_key,
        remote_address: remote,
        external_address,
        encryption_mode: params.encryption_mode,
        stream_kind: params.stream_kind,
    };

    Ok(Established {
        socket,
        session,
        cipher,
    })
}

/// Copy of a handshake failure for the state machine; the original goes back
/// to the caller.
fn recorded_copy(error: &TransportError) -> TransportError {
    match error {
        TransportError::Handshake(e) => TransportError::Handshake(e.clone()),
        TransportError::Crypto(e) => TransportError::Crypto(e.clone()),
        TransportError::Io(e) => TransportError::Io(io::Error::new(e.kind(), e.to_string())),
        other => TransportError::Io(io::Error::other(other.to_string())),
    }
}

/// Join every task, then mark the session closed.
async fn supervise(shared: Arc<Shared>, handles: Vec<JoinHandle<()>>) {
    for handle in handles {
        if let Err(e) = handle.await {
            tracing::warn!(error = %e, "voice task panicked");
        }
    }
    shared.finish_close();

    let stats = shared.stats.snapshot();
    tracing::info!(
        packets_sent = stats.packets_sent,
        packets_received = stats.packets_received,
        frames_delivered = stats.frames_delivered,
        "voice connection closed"
    );
}
