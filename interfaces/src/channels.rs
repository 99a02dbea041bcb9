//! UDP Channels to the Baseband Core
//!
//! Three duplex datagram channels on consecutive ports: control,
//! data and clock. Each channel is a connected UDP socket so sends and
//! receives only ever talk to the configured peer.

use crate::InterfaceError;
use std::net::SocketAddr;
use tokio::net::UdpSocket;
use tracing::{debug, info};

/// Port offset of the control channel from the base port
pub const CONTROL_PORT_OFFSET: u16 = 0;
/// Port offset of the data channel from the base port
pub const DATA_PORT_OFFSET: u16 = 1;
/// Port offset of the clock channel from the base port
pub const CLOCK_PORT_OFFSET: u16 = 2;

/// One connected datagram channel towards the baseband core
pub struct UdpChannel {
    socket: UdpSocket,
    name: &'static str,
}

impl UdpChannel {
    /// Bind a channel locally and connect it to its peer
    pub async fn bind(
        name: &'static str,
        local: SocketAddr,
        peer: SocketAddr,
    ) -> Result<Self, InterfaceError> {
        let socket = UdpSocket::bind(local).await?;
        socket.connect(peer).await?;
        info!(
            "{} channel bound to {} (peer {})",
            name,
            socket.local_addr()?,
            peer
        );
        Ok(Self { socket, name })
    }

    /// Receive one datagram; returns the record length
    pub async fn recv(&self, buf: &mut [u8]) -> Result<usize, InterfaceError> {
        let n = self.socket.recv(buf).await?;
        debug!("{} channel received {} bytes", self.name, n);
        Ok(n)
    }

    /// Send one datagram
    pub async fn send(&self, data: &[u8]) -> Result<(), InterfaceError> {
        self.socket.send(data).await?;
        debug!("{} channel sent {} bytes", self.name, data.len());
        Ok(())
    }

    /// Local address the channel is bound to
    pub fn local_addr(&self) -> Result<SocketAddr, InterfaceError> {
        Ok(self.socket.local_addr()?)
    }
}

/// The full set of channels towards the baseband core
pub struct ChannelSet {
    /// Synchronous command/response channel
    pub control: UdpChannel,
    /// Burst records downstream, receive records upstream
    pub data: UdpChannel,
    /// One-way clock indications upstream
    pub clock: UdpChannel,
}

impl ChannelSet {
    /// Bind all three channels on consecutive ports starting at
    /// `local_base` / `peer_base`.
    pub async fn bind(
        local_base: SocketAddr,
        peer_base: SocketAddr,
    ) -> Result<Self, InterfaceError> {
        let at = |base: SocketAddr, offset: u16| -> Result<SocketAddr, InterfaceError> {
            let port = base.port().checked_add(offset).ok_or_else(|| {
                InterfaceError::InvalidAddress(format!(
                    "base port {} leaves no room for the channel offsets",
                    base.port()
                ))
            })?;
            let mut addr = base;
            addr.set_port(port);
            Ok(addr)
        };
        // Validate the whole port range before binding anything
        let control_local = at(local_base, CONTROL_PORT_OFFSET)?;
        let control_peer = at(peer_base, CONTROL_PORT_OFFSET)?;
        let data_local = at(local_base, DATA_PORT_OFFSET)?;
        let data_peer = at(peer_base, DATA_PORT_OFFSET)?;
        let clock_local = at(local_base, CLOCK_PORT_OFFSET)?;
        let clock_peer = at(peer_base, CLOCK_PORT_OFFSET)?;

        Ok(Self {
            control: UdpChannel::bind("control", control_local, control_peer).await?,
            data: UdpChannel::bind("data", data_local, data_peer).await?,
            clock: UdpChannel::bind("clock", clock_local, clock_peer).await?,
        })
    }
}
