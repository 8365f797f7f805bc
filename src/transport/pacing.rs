//! Real-time frame pacing for one transmit track.
//!
//! Frame `n` is due at `origin + n * interval`. Deadlines are computed from
//! the origin, never from the previous send, so small scheduling delays do
//! not accumulate. A send that lands later than the drift threshold moves
//! the origin instead of bursting to catch up.

use std::time::Duration;

use tokio::time::Instant;

/// Pacing constants.
pub mod constants {
    use std::time::Duration;

    /// Lateness beyond which the origin is rebased to the wall clock.
    pub const DEFAULT_DRIFT_THRESHOLD: Duration = Duration::from_millis(10);
}

/// Action the pacer recommends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacerAction {
    /// Send the next frame now.
    SendNow,
    /// Wait until the specified instant before sending.
    WaitUntil(Instant),
    /// Track is paused; wait for resume.
    Paused,
}

/// Deadline scheduler for one track.
#[derive(Debug, Clone)]
pub struct Pacer {
    interval: Duration,
    /// Instant of frame 0. Set by the first send.
    origin: Option<Instant>,
    /// Frames sent so far (`n`).
    sent: u64,
    paused_at: Option<Instant>,
    drift_threshold: Duration,
    drift_corrections: u64,
}

impl Pacer {
    /// Create a pacer for frames of the given interval.
    pub fn new(interval: Duration) -> Self {
        Self::with_drift_threshold(interval, constants::DEFAULT_DRIFT_THRESHOLD)
    }

    /// Create a pacer with a custom drift threshold.
    pub fn with_drift_threshold(interval: Duration, drift_threshold: Duration) -> Self {
        Self {
            interval,
            origin: None,
            sent: 0,
            paused_at: None,
            drift_threshold,
            drift_corrections: 0,
        }
    }

    /// Frame interval.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Frames sent so far.
    pub fn frames_sent(&self) -> u64 {
        self.sent
    }

    /// Number of times the origin was rebased.
    pub fn drift_corrections(&self) -> u64 {
        self.drift_corrections
    }

    /// Whether the track is paused.
    pub fn is_paused(&self) -> bool {
        self.paused_at.is_some()
    }

    /// Deadline of the next frame, once the first frame has gone out.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.origin.map(|origin| origin + self.offset(self.sent))
    }

    /// Determine what to do with the next frame at `now`.
    pub fn poll(&self, now: Instant) -> PacerAction {
        if self.is_paused() {
            return PacerAction::Paused;
        }
        match self.next_deadline() {
            Some(deadline) if now < deadline => PacerAction::WaitUntil(deadline),
            _ => PacerAction::SendNow,
        }
    }

    /// Record a send at `now`.
    ///
    /// Returns the lateness when it exceeded the drift threshold and the
    /// origin was rebased.
    pub fn on_frame_sent(&mut self, now: Instant) -> Option<Duration> {
        let Some(deadline) = self.next_deadline() else {
            self.origin = Some(now);
            self.sent = 1;
            return None;
        };

        let lateness = now.saturating_duration_since(deadline);
        let drifted = lateness > self.drift_threshold;
        if drifted {
            match now.checked_sub(self.offset(self.sent)) {
                Some(origin) => self.origin = Some(origin),
                None => {
                    self.origin = Some(now);
                    self.sent = 0;
                }
            }
            self.drift_corrections += 1;
            tracing::warn!(
                lateness_ms = lateness.as_millis() as u64,
                frame = self.sent,
                "pacing drift, rebasing schedule"
            );
        }

        self.sent += 1;
        drifted.then_some(lateness)
    }

    /// Freeze the schedule at `now`.
    pub fn pause(&mut self, now: Instant) {
        if self.paused_at.is_none() {
            self.paused_at = Some(now);
        }
    }

    /// Resume at `now`, shifting the origin by the paused duration.
    ///
    /// Returns how long the track was paused.
    pub fn resume(&mut self, now: Instant) -> Option<Duration> {
        let paused_at = self.paused_at.take()?;
        let paused_for = now.saturating_duration_since(paused_at);
        if let Some(origin) = self.origin.as_mut() {
            *origin += paused_for;
        }
        Some(paused_for)
    }

    fn offset(&self, frames: u64) -> Duration {
        let nanos = self.interval.as_nanos().saturating_mul(u128::from(frames));
        Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX))
    }
}
