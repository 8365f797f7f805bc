//! Async UDP socket for the voice media path.
//!
//! The socket is connected to the voice server, so only its datagrams are
//! received. It is cheap to clone: every clone shares one `Arc<UdpSocket>`,
//! and the descriptor is released when the last clone drops.

use std::io;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::Arc;

use tokio::net::UdpSocket;

use super::error::TransportResult;
use super::packet::PacketError;
use crate::core::MTU;

/// Connected UDP socket shared by the transmit and receive tasks.
#[derive(Debug, Clone)]
pub struct VoiceSocket {
    socket: Arc<UdpSocket>,
    remote: SocketAddr,
    mtu: usize,
}

impl VoiceSocket {
    /// Bind an ephemeral local port and connect it to `remote`.
    pub async fn connect(remote: SocketAddr) -> io::Result<Self> {
        VoiceSocketBuilder::new().connect(remote).await
    }

    /// Get the local address.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// The voice server's address.
    pub fn remote_addr(&self) -> SocketAddr {
        self.remote
    }

    /// Largest datagram this socket will send.
    pub fn mtu(&self) -> usize {
        self.mtu
    }

    /// Send one datagram to the voice server.
    pub async fn send(&self, datagram: &[u8]) -> TransportResult<usize> {
        if datagram.len() > self.mtu {
            return Err(PacketError::TooLarge(datagram.len()).into());
        }
        Ok(self.socket.send(datagram).await?)
    }

    /// Receive one datagram into `buf`.
    pub async fn recv(&self, buf: &mut [u8]) -> io::Result<usize> {
        self.socket.recv(buf).await
    }

    /// Number of handles sharing the underlying socket.
    pub fn handle_count(&self) -> usize {
        Arc::strong_count(&self.socket)
    }
}

/// Builder for voice sockets with custom options.
#[derive(Debug, Clone)]
pub struct VoiceSocketBuilder {
    local_addr: Option<SocketAddr>,
    mtu: usize,
}

impl Default for VoiceSocketBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl VoiceSocketBuilder {
    /// Create a new socket builder with default options.
    pub fn new() -> Self {
        Self {
            local_addr: None,
            mtu: MTU,
        }
    }

    /// Bind to a specific local address instead of an ephemeral one.
    pub fn local_addr(mut self, addr: SocketAddr) -> Self {
        self.local_addr = Some(addr);
        self
    }

    /// Set the maximum datagram size.
    pub fn mtu(mut self, mtu: usize) -> Self {
        self.mtu = mtu;
        self
    }

    /// Bind and connect to `remote`.
    pub async fn connect(self, remote: SocketAddr) -> io::Result<VoiceSocket> {
        let local = self.local_addr.unwrap_or_else(|| match remote {
            SocketAddr::V4(_) => SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0)),
            SocketAddr::V6(_) => SocketAddr::from((Ipv6Addr::UNSPECIFIED, 0)),
        });
        let socket = UdpSocket::bind(local).await?;
        socket.connect(remote).await?;
        Ok(self.from_socket(socket, remote))
    }

    /// Wrap an already connected UDP socket.
    pub fn from_socket(self, socket: UdpSocket, remote: SocketAddr) -> VoiceSocket {
        VoiceSocket {
            socket: Arc::new(socket),
            remote,
            mtu: self.mtu,
        }
    }
}
