//! State shared between the connection handle and its tasks.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::watch;

use crate::transport::{
    ConnectionStats, SessionState, StateMachine, TransportError, TransportResult,
};

/// State cell plus the signals tasks listen on.
///
/// The mutex is never held across an `.await`. The state watch is only
/// written while it is held.
#[derive(Debug)]
pub(crate) struct Shared {
    machine: Mutex<StateMachine>,
    state_tx: watch::Sender<SessionState>,
    shutdown_tx: watch::Sender<bool>,
    pause_tx: watch::Sender<bool>,
    pub(crate) stats: Arc<ConnectionStats>,
}

impl Shared {
    pub(crate) fn new() -> Self {
        Self {
            machine: Mutex::new(StateMachine::new()),
            state_tx: watch::Sender::new(SessionState::Idle),
            shutdown_tx: watch::Sender::new(false),
            pause_tx: watch::Sender::new(false),
            stats: Arc::new(ConnectionStats::new()),
        }
    }

    pub(crate) fn state(&self) -> SessionState {
        self.machine.lock().state()
    }

    pub(crate) fn last_error(&self) -> Option<Arc<TransportError>> {
        self.machine.lock().last_error()
    }

    pub(crate) fn subscribe_state(&self) -> watch::Receiver<SessionState> {
        self.state_tx.subscribe()
    }

    pub(crate) fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.shutdown_tx.subscribe()
    }

    pub(crate) fn pause_signal(&self) -> watch::Receiver<bool> {
        self.pause_tx.subscribe()
    }

    /// Apply `f` to the state machine and publish the resulting state.
    ///
    /// Publishing happens under the machine lock so concurrent updates reach
    /// watchers in the order they were applied.
    fn update<T>(&self, f: impl FnOnce(&mut StateMachine) -> T) -> T {
        let mut machine = self.machine.lock();
        let result = f(&mut machine);
        let state = machine.state();
        self.state_tx.send_if_modified(|current| {
            let changed = *current != state;
            *current = state;
            changed
        });
        result
    }

    pub(crate) fn transition(&self, to: SessionState) -> TransportResult<SessionState> {
        self.update(|machine| machine.transition(to))
    }

    /// `Ready -> Streaming` on the first admitted frame.
    pub(crate) fn mark_streaming(&self) {
        if self.update(StateMachine::mark_streaming) {
            tracing::info!("streaming started");
        }
    }

    /// Enter `Paused` and signal the transmit tasks.
    pub(crate) fn pause(&self) -> TransportResult<()> {
        self.update(|machine| machine.transition(SessionState::Paused))?;
        self.pause_tx.send_replace(true);
        Ok(())
    }

    /// Return to `Streaming` and signal the transmit tasks.
    pub(crate) fn resume(&self) -> TransportResult<()> {
        self.update(|machine| machine.transition(SessionState::Streaming))?;
        self.pause_tx.send_replace(false);
        Ok(())
    }

    /// Begin an orderly close and stop every task.
    pub(crate) fn begin_close(&self) -> bool {
        let began = self.update(StateMachine::begin_close);
        self.shutdown_tx.send_replace(true);
        began
    }

    /// Record a fatal error and stop every task.
    pub(crate) fn fail(&self, error: TransportError) {
        self.update(|machine| machine.fail(error));
        self.shutdown_tx.send_replace(true);
    }

    /// All tasks are gone: `Closing -> Closed`.
    pub(crate) fn finish_close(&self) {
        self.update(|machine| {
            machine.begin_close();
            machine.finish_close()
        });
    }
}
