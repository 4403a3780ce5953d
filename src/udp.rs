use crate::{
    errors::{Error, Result},
    net::{Datagram, Dialer},
    util,
};

use bytes::Bytes;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, error, trace};

/// Largest single-packet response a Source server sends.
pub const MAX_PACKET_SIZE: usize = 1500;

/// Lead byte of a response fragmented over several datagrams (`0xFFFFFFFE` prefix).
const SPLIT_MARKER: u8 = 0xFE;

const PREFIX_LEN: usize = 4;

pub struct UdpTransport {
    addr: String,
    socket: Option<Box<dyn Datagram>>,
    read_timeout: Duration,
}

impl UdpTransport {
    pub fn new(socket: Box<dyn Datagram>, addr: impl Into<String>, read_timeout: Duration) -> Self {
        Self {
            addr: addr.into(),
            socket: Some(socket),
            read_timeout,
        }
    }

    pub async fn open(dialer: &dyn Dialer, addr: &str, read_timeout: Duration) -> Result<Self> {
        let socket = dialer.dial_udp(addr).await.map_err(|e| {
            error!(addr, error = %e, "could not dial udp");
            e
        })?;
        Ok(Self::new(socket, addr, read_timeout))
    }

    fn socket(&self) -> Result<&dyn Datagram> {
        self.socket.as_deref().ok_or(Error::NotInitialized)
    }

    pub async fn send(&self, payload: &[u8]) -> Result<()> {
        let socket = self.socket()?;
        debug!(addr = %self.addr, bytes = payload.len(), "sending udp payload");
        trace!(payload = %util::hex_str(payload), "udp payload");

        let sent = socket.send(payload).await?;
        if sent != payload.len() {
            return Err(Error::ShortWrite {
                sent,
                expected: payload.len(),
            });
        }
        Ok(())
    }

    /// Receives one datagram and returns it without the 4-byte connectionless prefix.
    pub async fn receive(&self) -> Result<Bytes> {
        let socket = self.socket()?;
        let mut buf = [0u8; MAX_PACKET_SIZE];

        let n = timeout(self.read_timeout, socket.recv(&mut buf))
            .await
            .map_err(|_| Error::Timeout)??;
        let packet = &buf[..n];
        debug!(addr = %self.addr, bytes = n, "received udp payload");
        trace!(payload = %util::hex_str(packet), "udp payload");

        if packet.first() == Some(&SPLIT_MARKER) {
            return Err(Error::UnsupportedSplitPacket);
        }
        if n < PREFIX_LEN {
            return Err(Error::TruncatedData {
                needed: PREFIX_LEN,
                remaining: n,
            });
        }

        Ok(Bytes::copy_from_slice(&packet[PREFIX_LEN..]))
    }

    pub fn close(&mut self) {
        if self.socket.take().is_some() {
            debug!(addr = %self.addr, "closing udp connection");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{self, ScriptedDatagram};

    fn transport(socket: ScriptedDatagram) -> UdpTransport {
        UdpTransport::new(Box::new(socket), "test", Duration::from_millis(50))
    }

    #[tokio::test]
    async fn test_strips_prefix() {
        let t = transport(ScriptedDatagram::new(|_| {
            vec![testing::packet(&[b'A', 1, 2, 3, 4])]
        }));

        t.send(b"hello").await.unwrap();

        assert_eq!(&t.receive().await.unwrap()[..], &[b'A', 1, 2, 3, 4][..]);
    }

    #[tokio::test]
    async fn test_rejects_split_packet() {
        let t = transport(ScriptedDatagram::new(|_| {
            vec![vec![0xFE, 0xFF, 0xFF, 0xFF, 0x01, 0x02]]
        }));

        t.send(b"hello").await.unwrap();

        assert!(matches!(
            t.receive().await,
            Err(Error::UnsupportedSplitPacket)
        ));
    }

    #[tokio::test]
    async fn test_short_datagram() {
        let t = transport(ScriptedDatagram::new(|_| vec![vec![0xFF, 0xFF]]));

        t.send(b"hello").await.unwrap();

        assert!(matches!(
            t.receive().await,
            Err(Error::TruncatedData {
                needed: 4,
                remaining: 2
            })
        ));
    }

    #[tokio::test]
    async fn test_receive_times_out() {
        let t = transport(ScriptedDatagram::new(|_| vec![]));

        t.send(b"hello").await.unwrap();

        assert!(matches!(t.receive().await, Err(Error::Timeout)));
    }

    #[tokio::test]
    async fn test_short_write() {
        let t = transport(ScriptedDatagram::new(|_| vec![]).with_send_limit(3));

        assert!(matches!(
            t.send(b"hello").await,
            Err(Error::ShortWrite {
                sent: 3,
                expected: 5
            })
        ));
    }

    #[tokio::test]
    async fn test_closed_transport() {
        let mut t = transport(ScriptedDatagram::new(|_| vec![]));
        t.close();
        t.close();

        assert!(matches!(t.send(b"x").await, Err(Error::NotInitialized)));
        assert!(matches!(t.receive().await, Err(Error::NotInitialized)));
    }
}
