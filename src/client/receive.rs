//! Receive task: socket to sink.

use std::io;
use std::sync::Arc;

use tokio::time::{Instant, MissedTickBehavior, interval};

use super::shared::Shared;
use crate::core::{FrameSink, RECEIVE_TICK, RECV_BUFFER_SIZE};
use crate::transport::{Demultiplexer, VoiceSocket};

/// Errors caused by an ICMP report for an earlier datagram, not by the
/// socket itself.
fn is_transient(error: &io::Error) -> bool {
    matches!(
        error.kind(),
        io::ErrorKind::ConnectionRefused
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::Interrupted
            | io::ErrorKind::WouldBlock
    )
}

/// Run the receive loop until shutdown or a fatal socket error.
pub(crate) async fn run_receive(
    socket: VoiceSocket,
    mut demux: Demultiplexer,
    mut sink: Box<dyn FrameSink>,
    shared: Arc<Shared>,
) {
    let mut shutdown = shared.shutdown_signal();
    let mut buf = vec![0u8; RECV_BUFFER_SIZE];
    let mut tick = interval(RECEIVE_TICK);
    tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            biased;
            _ = shutdown.wait_for(|&stop| stop) => break,
            _ = tick.tick() => demux.tick(Instant::now(), sink.as_mut()),
            received = socket.recv(&mut buf) => match received {
                Ok(len) => {
                    let now = Instant::now();
                    if let Err(e) = demux.handle_datagram(&buf[..len], now, sink.as_mut()) {
                        tracing::trace!(error = %e, bytes = len, "dropped inbound packet");
                    }
                }
                Err(e) if is_transient(&e) => {
                    tracing::debug!(error = %e, "transient receive error");
                }
                Err(e) => {
                    shared.fail(e.into());
                    break;
                }
            },
        }
    }

    demux.flush_all(sink.as_mut());
    tracing::debug!(sources = demux.source_count(), "receive task stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_errors() {
        assert!(is_transient(&io::Error::from(io::ErrorKind::ConnectionRefused)));
        assert!(!is_transient(&io::Error::from(io::ErrorKind::PermissionDenied)));
    }
}
