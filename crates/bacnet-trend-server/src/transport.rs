//! BACnet/IP datagram transport.
//!
//! Addresses cross the engine boundary in the 6-byte BACnet/IP form: four
//! IPv4 octets followed by the UDP port, low byte first.

use std::io;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};

use tokio::net::UdpSocket;
use tracing::{debug, info, warn};

use crate::server::ServerError;

/// Length of a BACnet/IP address.
pub const ADDRESS_LEN: usize = 6;

/// Datagram transport a protocol engine sends and receives through.
pub trait Transport {
    /// Send `message` to `destination` (or broadcast on its port).
    ///
    /// Returns the number of bytes sent, 0 on failure.
    fn send(&mut self, message: &[u8], destination: &[u8], broadcast: bool) -> usize;

    /// Non-blocking receive into `buffer`.
    ///
    /// Returns the datagram length and the sender address, or `None` when
    /// nothing is pending.
    fn try_receive(&mut self, buffer: &mut [u8]) -> Option<(usize, Vec<u8>)>;
}

/// Encode an IPv4 socket address into its 6-byte BACnet/IP form.
pub fn encode_address(addr: SocketAddrV4) -> [u8; ADDRESS_LEN] {
    let [a, b, c, d] = addr.ip().octets();
    let [lo, hi] = addr.port().to_le_bytes();
    [a, b, c, d, lo, hi]
}

/// Decode a 6-byte BACnet/IP address. Other lengths are rejected.
pub fn decode_address(bytes: &[u8]) -> Option<SocketAddrV4> {
    let &[a, b, c, d, lo, hi] = bytes else {
        return None;
    };
    Some(SocketAddrV4::new(
        Ipv4Addr::new(a, b, c, d),
        u16::from_le_bytes([lo, hi]),
    ))
}

/// UDP transport on a tokio socket, used without awaiting.
#[derive(Debug)]
pub struct UdpTransport {
    socket: UdpSocket,
}

impl UdpTransport {
    /// Bind a broadcast-capable socket on `address:port`.
    pub async fn bind(address: &str, port: u16) -> Result<Self, ServerError> {
        let ip: Ipv4Addr = address
            .parse()
            .map_err(|_| ServerError::InvalidAddress(address.to_string()))?;
        let addr = SocketAddr::V4(SocketAddrV4::new(ip, port));

        let socket = UdpSocket::bind(addr)
            .await
            .map_err(|source| ServerError::Bind { addr, source })?;
        socket
            .set_broadcast(true)
            .map_err(|source| ServerError::Bind { addr, source })?;

        info!("BACnet/IP transport bound on {}", addr);
        Ok(Self { socket })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }
}

impl Transport for UdpTransport {
    fn send(&mut self, message: &[u8], destination: &[u8], broadcast: bool) -> usize {
        let Some(dest) = decode_address(destination) else {
            warn!(len = destination.len(), "Invalid destination address");
            return 0;
        };
        let dest = if broadcast {
            SocketAddrV4::new(Ipv4Addr::BROADCAST, dest.port())
        } else {
            dest
        };

        match self.socket.try_send_to(message, SocketAddr::V4(dest)) {
            Ok(sent) => {
                debug!(%dest, sent, "Datagram sent");
                sent
            }
            Err(e) => {
                warn!(%dest, error = %e, "Failed to send datagram");
                0
            }
        }
    }

    fn try_receive(&mut self, buffer: &mut [u8]) -> Option<(usize, Vec<u8>)> {
        match self.socket.try_recv_from(buffer) {
            Ok((len, SocketAddr::V4(from))) => Some((len, encode_address(from).to_vec())),
            Ok((_, from)) => {
                debug!(%from, "Ignoring datagram from non-IPv4 peer");
                None
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => None,
            Err(e) => {
                warn!(error = %e, "Failed to receive datagram");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_address_layout() {
        let addr = SocketAddrV4::new(Ipv4Addr::new(192, 168, 1, 20), 47808);
        assert_eq!(encode_address(addr), [192, 168, 1, 20, 0xC0, 0xBA]);
        assert_eq!(decode_address(&encode_address(addr)), Some(addr));
    }

    #[test]
    fn test_decode_rejects_wrong_length() {
        assert_eq!(decode_address(&[127, 0, 0, 1, 0]), None);
        assert_eq!(decode_address(&[127, 0, 0, 1, 0, 0, 0]), None);
    }

    #[tokio::test]
    async fn test_invalid_bind_address() {
        let err = UdpTransport::bind("not-an-ip", 0).await.unwrap_err();
        assert!(matches!(err, ServerError::InvalidAddress(_)));
    }

    #[tokio::test]
    async fn test_loopback_exchange() {
        let mut a = UdpTransport::bind("127.0.0.1", 0).await.unwrap();
        let mut b = UdpTransport::bind("127.0.0.1", 0).await.unwrap();
        let SocketAddr::V4(b_addr) = b.local_addr().unwrap() else {
            panic!("expected IPv4");
        };

        let mut buffer = [0u8; 64];
        assert_eq!(b.try_receive(&mut buffer), None);

        assert_eq!(a.send(b"who-is", &encode_address(b_addr), false), 6);
        assert_eq!(a.send(b"x", &[1, 2, 3], false), 0);

        b.socket.readable().await.unwrap();
        let (len, from) = b.try_receive(&mut buffer).unwrap();
        assert_eq!(&buffer[..len], b"who-is");
        assert_eq!(
            decode_address(&from),
            match a.local_addr().unwrap() {
                SocketAddr::V4(a) => Some(a),
                SocketAddr::V6(_) => None,
            }
        );
    }
}
