//! Connection configuration.

use std::time::Duration;

use crate::core::{AUDIO_FRAME_DURATION, MAX_REORDER_WINDOW, VoiceError};
use crate::transport::{DiscoveryConfig, ReceiveConfig, pacing_constants};

/// Default per-track queue depth, in frames.
pub const DEFAULT_QUEUE_CAPACITY: usize = 16;

/// Tunables of a voice connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionConfig {
    /// IP discovery retry policy.
    pub discovery: DiscoveryConfig,

    /// Reorder and eviction settings.
    pub receive: ReceiveConfig,

    /// Frames buffered per track ahead of the pacer.
    pub queue_capacity: usize,

    /// How long `send` waits for queue space.
    pub admission_timeout: Duration,

    /// Lateness that makes the pacer rebase its schedule.
    pub drift_threshold: Duration,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            discovery: DiscoveryConfig::default(),
            receive: ReceiveConfig::default(),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            admission_timeout: AUDIO_FRAME_DURATION * 5,
            drift_threshold: pacing_constants::DEFAULT_DRIFT_THRESHOLD,
        }
    }
}

impl ConnectionConfig {
    /// Start building a configuration from the defaults.
    pub fn builder() -> ConnectionConfigBuilder {
        ConnectionConfigBuilder::new()
    }

    /// Check that every value is usable.
    pub fn validate(&self) -> Result<(), VoiceError> {
        let window = self.receive.reorder_window;
        if !(1..=MAX_REORDER_WINDOW).contains(&window) {
            return Err(VoiceError::Config(format!(
                "reorder window must be within 1..={MAX_REORDER_WINDOW}, got {window}"
            )));
        }
        if self.queue_capacity == 0 {
            return Err(VoiceError::Config("queue capacity must be non-zero".into()));
        }
        if self.discovery.max_attempts == 0 {
            return Err(VoiceError::Config("at least one discovery attempt is required".into()));
        }
        if self.discovery.timeout.is_zero() {
            return Err(VoiceError::Config("discovery timeout must be non-zero".into()));
        }
        Ok(())
    }
}

/// Builder for [`ConnectionConfig`].
#[derive(Debug, Default)]
pub struct ConnectionConfigBuilder {
    config: ConnectionConfig,
}

impl ConnectionConfigBuilder {
    /// Create a new builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the reorder window (sequence numbers).
    pub fn reorder_window(mut self, window: usize) -> Self {
        self.config.receive.reorder_window = window;
        self
    }

    /// Set how long a packet may wait for a gap to fill.
    pub fn reorder_hold(mut self, hold: Duration) -> Self {
        self.config.receive.reorder_hold = hold;
        self
    }

    /// Set the idle time after which a remote stream is evicted.
    pub fn source_timeout(mut self, timeout: Duration) -> Self {
        self.config.receive.source_timeout = timeout;
        self
    }

    /// Set the first discovery attempt's timeout.
    pub fn discovery_timeout(mut self, timeout: Duration) -> Self {
        self.config.discovery.timeout = timeout;
        self
    }

    /// Set the number of discovery attempts.
    pub fn discovery_attempts(mut self, attempts: u32) -> Self {
        self.config.discovery.max_attempts = attempts;
        self
    }

    /// Set the discovery timeout multiplier.
    pub fn discovery_backoff(mut self, backoff: u32) -> Self {
        self.config.discovery.backoff = backoff;
        self
    }

    /// Set the per-track queue depth.
    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.config.queue_capacity = capacity;
        self
    }

    /// Set how long `send` waits for queue space.
    pub fn admission_timeout(mut self, timeout: Duration) -> Self {
        self.config.admission_timeout = timeout;
        self
    }

    /// Set the pacing drift threshold.
    pub fn drift_threshold(mut self, threshold: Duration) -> Self {
        self.config.drift_threshold = threshold;
        self
    }

    /// Validate and build the configuration.
    pub fn build(self) -> Result<ConnectionConfig, VoiceError> {
        self.config.validate()?;
        Ok(self.config)
    }
}
