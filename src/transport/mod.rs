//! Voicewire - Transport Layer
//!
//! Everything between the encoded media frame and the UDP datagram:
//!
//! - **Packet framing**: [`RtpHeader`] and the sealed wire layout
//! - **Packetization**: [`Packetizer`] assigns sequence numbers and
//!   timestamps, fragments H.264 access units
//! - **Pacing**: [`Pacer`] schedules frames on an absolute timeline
//! - **Reception**: [`Demultiplexer`] authenticates, routes and reorders
//!   packets per remote source
//! - **Session lifecycle**: [`StateMachine`] over [`SessionState`]
//! - **Sockets and discovery**: [`VoiceSocket`], [`discover`]
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │      Media sources / frame sinks        │
//! ├─────────────────────────────────────────┤
//! │         Transport Layer                 │  ← This module
//! │  packetize, pace, demux, reorder        │
//! ├─────────────────────────────────────────┤
//! │         Security Layer                  │
//! ├─────────────────────────────────────────┤
//! │              UDP                        │
//! └─────────────────────────────────────────┘
//! ```

mod connection;
mod discovery;
mod error;
mod packet;
mod packetizer;
mod pacing;
mod receiver;
mod reorder;
mod socket;
mod stats;

pub use connection::{SessionState, StateMachine};
pub use discovery::{DiscoveryConfig, discover, encode_request, encode_response, parse_response};
pub use error::{HandshakeError, TransportError, TransportResult};
pub use packet::{
    Packet, PacketError, RtpHeader, parse_packet_header, strip_header_extension,
    video_header_extension,
};
pub use packetizer::{PacketizeError, Packetizer, track_source_id, validate_frame};
pub use pacing::{Pacer, PacerAction, constants as pacing_constants};
pub use receiver::{Demultiplexer, ReceiveConfig, RemoteStream};
pub use reorder::{ReorderStats, ReorderWindow};
pub use socket::{VoiceSocket, VoiceSocketBuilder};
pub use stats::{ConnectionStats, StatsSnapshot};
