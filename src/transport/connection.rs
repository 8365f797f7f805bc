//! Session lifecycle state machine.
//!
//! ```text
//! Idle -> Handshaking -> Ready -> Streaming <-> Paused
//!   \__________\___________\_________\___________\____-> Closing -> Closed
//! ```
//!
//! The machine is plain data; the connection keeps it behind a mutex and
//! publishes every change.

use std::fmt;
use std::sync::Arc;

use super::error::{TransportError, TransportResult};

/// Connection lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SessionState {
    /// Created, nothing sent.
    #[default]
    Idle,
    /// IP discovery and key validation in progress.
    Handshaking,
    /// Media path established, no frame sent yet.
    Ready,
    /// Transmitting media.
    Streaming,
    /// Transmit pacing suspended; reception continues.
    Paused,
    /// Shutting down.
    Closing,
    /// Closed (terminal).
    Closed,
}

impl SessionState {
    /// Whether `self -> to` is a legal transition.
    pub fn can_transition_to(self, to: SessionState) -> bool {
        use SessionState::*;
        match (self, to) {
            (Idle, Handshaking)
            | (Handshaking, Ready)
            | (Ready, Streaming)
            | (Streaming, Paused)
            | (Paused, Streaming)
            | (Closing, Closed) => true,
            (from, Closing) => !matches!(from, Closing | Closed),
            _ => false,
        }
    }

    /// No further transitions possible.
    pub fn is_terminal(self) -> bool {
        self == SessionState::Closed
    }

    /// Established and not shutting down.
    pub fn is_established(self) -> bool {
        matches!(
            self,
            SessionState::Ready | SessionState::Streaming | SessionState::Paused
        )
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Idle => "idle",
            SessionState::Handshaking => "handshaking",
            SessionState::Ready => "ready",
            SessionState::Streaming => "streaming",
            SessionState::Paused => "paused",
            SessionState::Closing => "closing",
            SessionState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Current state plus the fatal error that ended the session, if any.
#[derive(Debug, Default)]
pub struct StateMachine {
    state: SessionState,
    last_error: Option<Arc<TransportError>>,
}

impl StateMachine {
    /// Start in `Idle`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// The fatal error recorded when the session failed.
    pub fn last_error(&self) -> Option<Arc<TransportError>> {
        self.last_error.clone()
    }

    /// Move to `to`, returning the previous state.
    ///
    /// Illegal transitions leave the state unchanged.
    pub fn transition(&mut self, to: SessionState) -> TransportResult<SessionState> {
        let from = self.state;
        if !from.can_transition_to(to) {
            return Err(TransportError::InvalidTransition { from, to });
        }
        self.state = to;
        tracing::debug!(%from, %to, "session state changed");
        Ok(from)
    }

    /// First frame admitted: `Ready -> Streaming`. Other states are kept.
    pub fn mark_streaming(&mut self) -> bool {
        self.state == SessionState::Ready && self.transition(SessionState::Streaming).is_ok()
    }

    /// Begin an orderly close. Returns `false` if already closing or closed.
    pub fn begin_close(&mut self) -> bool {
        self.transition(SessionState::Closing).is_ok()
    }

    /// Record a fatal error and begin closing.
    ///
    /// Only the first fatal error is kept.
    pub fn fail(&mut self, error: TransportError) -> bool {
        if self.state.is_terminal() {
            return false;
        }
        tracing::warn!(state = %self.state, error = %error, "session failed");
        if self.last_error.is_none() {
            self.last_error = Some(Arc::new(error));
        }
        self.begin_close()
    }

    /// Finish closing: `Closing -> Closed`.
    pub fn finish_close(&mut self) -> bool {
        self.transition(SessionState::Closed).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::HandshakeError;

    #[test]
    fn test_happy_path() {
        let mut machine = StateMachine::new();
        assert_eq!(machine.state(), SessionState::Idle);

        machine.transition(SessionState::Handshaking).unwrap();
        machine.transition(SessionState::Ready).unwrap();
        assert!(machine.mark_streaming());
        assert!(!machine.mark_streaming());

        machine.transition(SessionState::Paused).unwrap();
        machine.transition(SessionState::Streaming).unwrap();

        assert!(machine.begin_close());
        assert!(!machine.begin_close());
        assert!(machine.finish_close());
        assert!(machine.state().is_terminal());
        assert!(machine.last_error().is_none());
    }

    #[test]
    fn test_invalid_transition_keeps_state() {
        let mut machine = StateMachine::new();
        machine.transition(SessionState::Handshaking).unwrap();

        let err = machine.transition(SessionState::Paused).unwrap_err();
        assert!(matches!(
            err,
            TransportError::InvalidTransition {
                from: SessionState::Handshaking,
                to: SessionState::Paused
            }
        ));
        assert_eq!(machine.state(), SessionState::Handshaking);

        // Ready cannot pause before streaming
        machine.transition(SessionState::Ready).unwrap();
        assert!(machine.transition(SessionState::Paused).is_err());
        assert!(machine.transition(SessionState::Idle).is_err());
    }

    #[test]
    fn test_fail_records_first_error() {
        let mut machine = StateMachine::new();
        machine.transition(SessionState::Handshaking).unwrap();

        assert!(machine.fail(HandshakeError::Timeout { attempts: 5 }.into()));
        assert_eq!(machine.state(), SessionState::Closing);
        assert!(!machine.fail(TransportError::ConnectionClosed));
        machine.finish_close();

        let error = machine.last_error().unwrap();
        assert!(matches!(
            *error,
            TransportError::Handshake(HandshakeError::Timeout { attempts: 5 })
        ));
        assert!(!machine.fail(TransportError::ConnectionClosed));
    }

    #[test]
    fn test_closed_is_terminal() {
        for state in [
            SessionState::Idle,
            SessionState::Handshaking,
            SessionState::Ready,
            SessionState::Streaming,
            SessionState::Paused,
            SessionState::Closing,
            SessionState::Closed,
        ] {
            assert!(!SessionState::Closed.can_transition_to(state));
        }
        assert!(SessionState::Paused.can_transition_to(SessionState::Closing));
        assert!(SessionState::Idle.can_transition_to(SessionState::Closing));
    }
}
