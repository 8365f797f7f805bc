//! Voicewire - Client Library
//!
//! High-level API: open a [`VoiceConnection`] from [`SessionParams`], feed it
//! media frames, receive remote speakers through a [`FrameSink`].
//!
//! [`FrameSink`]: crate::core::FrameSink

mod config;
mod connection;
mod receive;
mod session;
mod shared;
mod sink;
mod transmit;

pub use config::{ConnectionConfig, ConnectionConfigBuilder, DEFAULT_QUEUE_CAPACITY};
pub use connection::VoiceConnection;
pub use session::{Session, SessionParams};
pub use sink::{ChannelSink, SinkEvent};
