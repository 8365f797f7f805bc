//! IP discovery: learn the external address the voice server sees.
//!
//! Packet layout (74 bytes, big-endian):
//! ```text
//! +--------+--------+-----------+------------------------+--------+
//! | Type   | Length | Source ID | Address (NUL-padded)   | Port   |
//! | 2 bytes| 2 bytes| 4 bytes   | 64 bytes               | 2 bytes|
//! +--------+--------+-----------+------------------------+--------+
//! ```

use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use tokio::time::{Instant, timeout_at};

use super::error::{HandshakeError, TransportResult};
use super::socket::VoiceSocket;
use crate::core::{
    DISCOVERY_ADDRESS_SIZE, DISCOVERY_LENGTH, DISCOVERY_PACKET_SIZE, DISCOVERY_REQUEST,
    DISCOVERY_RESPONSE, HANDSHAKE_BACKOFF, HANDSHAKE_MAX_RETRIES, HANDSHAKE_TIMEOUT,
};

const ADDRESS_OFFSET: usize = 8;
const PORT_OFFSET: usize = ADDRESS_OFFSET + DISCOVERY_ADDRESS_SIZE;

/// Retry policy for discovery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiscoveryConfig {
    /// Timeout of the first attempt.
    pub timeout: Duration,
    /// Attempts before giving up.
    pub max_attempts: u32,
    /// Timeout multiplier between attempts.
    pub backoff: u32,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            timeout: HANDSHAKE_TIMEOUT,
            max_attempts: HANDSHAKE_MAX_RETRIES,
            backoff: HANDSHAKE_BACKOFF,
        }
    }
}

impl DiscoveryConfig {
    /// Timeout of the zero-based `attempt`.
    pub fn attempt_timeout(&self, attempt: u32) -> Duration {
        let factor = self.backoff.max(1).saturating_pow(attempt);
        self.timeout.saturating_mul(factor)
    }
}

/// Build a discovery request for `source_id`.
pub fn encode_request(source_id: u32) -> [u8; DISCOVERY_PACKET_SIZE] {
    let mut packet = [0u8; DISCOVERY_PACKET_SIZE];
    packet[0..2].copy_from_slice(&DISCOVERY_REQUEST.to_be_bytes());
    packet[2..4].copy_from_slice(&DISCOVERY_LENGTH.to_be_bytes());
    packet[4..8].copy_from_slice(&source_id.to_be_bytes());
    packet
}

/// Build a discovery response (what the voice server sends back).
pub fn encode_response(source_id: u32, external: SocketAddr) -> [u8; DISCOVERY_PACKET_SIZE] {
    let mut packet = encode_request(source_id);
    packet[0..2].copy_from_slice(&DISCOVERY_RESPONSE.to_be_bytes());

    let address = external.ip().to_string();
    let len = address.len().min(DISCOVERY_ADDRESS_SIZE - 1);
    packet[ADDRESS_OFFSET..ADDRESS_OFFSET + len].copy_from_slice(&address.as_bytes()[..len]);
    packet[PORT_OFFSET..].copy_from_slice(&external.port().to_be_bytes());
    packet
}

/// Parse a discovery response for `source_id`.
pub fn parse_response(packet: &[u8], source_id: u32) -> Result<SocketAddr, HandshakeError> {
    let invalid = |reason: &str| HandshakeError::InvalidResponse(reason.to_string());

    if packet.len() != DISCOVERY_PACKET_SIZE {
        return Err(invalid("wrong length"));
    }
    if u16::from_be_bytes([packet[0], packet[1]]) != DISCOVERY_RESPONSE {
        return Err(invalid("not a response"));
    }
    if u16::from_be_bytes([packet[2], packet[3]]) != DISCOVERY_LENGTH {
        return Err(invalid("bad length field"));
    }
    if u32::from_be_bytes([packet[4], packet[5], packet[6], packet[7]]) != source_id {
        return Err(invalid("source id mismatch"));
    }

    let field = &packet[ADDRESS_OFFSET..PORT_OFFSET];
    let end = field.iter().position(|&b| b == 0).unwrap_or(field.len());
    let address = std::str::from_utf8(&field[..end]).map_err(|_| invalid("address not ASCII"))?;
    let ip: IpAddr = address.parse().map_err(|_| invalid("unparseable address"))?;
    let port = u16::from_be_bytes([packet[PORT_OFFSET], packet[PORT_OFFSET + 1]]);

    Ok(SocketAddr::new(ip, port))
}

/// Run discovery over a connected socket.
///
/// Datagrams that are not a valid response are ignored until the attempt
/// times out.
pub async fn discover(
    socket: &VoiceSocket,
    source_id: u32,
    config: DiscoveryConfig,
) -> TransportResult<SocketAddr> {
    let request = encode_request(source_id);
    let mut buf = [0u8; DISCOVERY_PACKET_SIZE * 2];

    for attempt in 0..config.max_attempts {
        socket.send(&request).await?;
        let deadline = Instant::now() + config.attempt_timeout(attempt);
        tracing::debug!(source_id, attempt, "IP discovery request sent");

        loop {
            let Ok(received) = timeout_at(deadline, socket.recv(&mut buf)).await else {
                break;
            };
            let len = received?;
            match parse_response(&buf[..len], source_id) {
                Ok(external) => return Ok(external),
                Err(e) => tracing::trace!(error = %e, "ignoring datagram during discovery"),
            }
        }
    }

    Err(HandshakeError::Timeout {
        attempts: config.max_attempts,
    }
    .into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::UdpSocket;

    #[test]
    fn test_request_layout() {
        let packet = encode_request(12345);
        assert_eq!(packet.len(), 74);
        assert_eq!(hex::encode(&packet[..8]), "0001004600003039");
        assert!(packet[8..].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_response_parse() {
        let external: SocketAddr = "203.0.113.7:50004".parse().unwrap();
        let packet = encode_response(12345, external);

        assert_eq!(&packet[8..19], b"203.0.113.7");
        assert_eq!(packet[19], 0);
        assert_eq!(hex::encode(&packet[72..]), "c354");
        assert_eq!(parse_response(&packet, 12345), Ok(external));
    }

    #[test]
    fn test_response_rejected() {
        let packet = encode_response(1, "10.0.0.1:9".parse().unwrap());
        assert!(parse_response(&packet, 2).is_err());
        assert!(parse_response(&packet[..70], 1).is_err());
        assert!(parse_response(&encode_request(1), 1).is_err());

        let mut garbage = packet;
        garbage[8..12].copy_from_slice(b"nope");
        assert!(parse_response(&garbage, 1).is_err());
    }

    #[test]
    fn test_backoff_schedule() {
        let config = DiscoveryConfig::default();
        assert_eq!(config.attempt_timeout(0), Duration::from_secs(1));
        assert_eq!(config.attempt_timeout(1), Duration::from_secs(2));
        assert_eq!(config.attempt_timeout(4), Duration::from_secs(16));
    }

    #[tokio::test]
    async fn test_discover_after_lost_request() {
        let server = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let socket = VoiceSocket::connect(server.local_addr().unwrap()).await.unwrap();
        let external: SocketAddr = "198.51.100.2:40000".parse().unwrap();

        let responder = tokio::spawn(async move {
            let mut buf = [0u8; 128];
            // first request is "lost"
            server.recv_from(&mut buf).await.unwrap();
            let (_, from) = server.recv_from(&mut buf).await.unwrap();
            server.send_to(b"stray", from).await.unwrap();
            server.send_to(&encode_response(77, external), from).await.unwrap();
        });

        let config = DiscoveryConfig {
            timeout: Duration::from_millis(50),
            ..DiscoveryConfig::default()
        };
        assert_eq!(discover(&socket, 77, config).await.unwrap(), external);
        responder.await.unwrap();
    }

    #[tokio::test]
    async fn test_discover_times_out() {
        let server = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let socket = VoiceSocket::connect(server.local_addr().unwrap()).await.unwrap();

        let config = DiscoveryConfig {
            timeout: Duration::from_millis(10),
            max_attempts: 2,
            backoff: 2,
        };
        let err = discover(&socket, 1, config).await.unwrap_err();
        assert!(matches!(
            err,
            crate::transport::TransportError::Handshake(HandshakeError::Timeout { attempts: 2 })
        ));
        assert!(err.is_fatal());
    }
}
