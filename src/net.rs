//! Pluggable connection factory. Everything that touches a real socket goes through a
//! [`Dialer`], so custom environments (proxies, sandboxes, tests) can bring their own.

use crate::{
    dns::Resolver,
    errors::{Error, Result},
    models::Host,
};

use futures::future::BoxFuture;
use std::{io, net::SocketAddr, time::Duration};
use tokio::{
    io::{AsyncRead, AsyncWrite},
    net::{TcpStream, UdpSocket},
    time::timeout,
};
use tracing::debug;

/// A datagram endpoint already connected to one remote address.
pub trait Datagram: Send + Sync {
    fn send<'a>(&'a self, buf: &'a [u8]) -> BoxFuture<'a, io::Result<usize>>;
    fn recv<'a>(&'a self, buf: &'a mut [u8]) -> BoxFuture<'a, io::Result<usize>>;
}

impl Datagram for UdpSocket {
    fn send<'a>(&'a self, buf: &'a [u8]) -> BoxFuture<'a, io::Result<usize>> {
        Box::pin(UdpSocket::send(self, buf))
    }

    fn recv<'a>(&'a self, buf: &'a mut [u8]) -> BoxFuture<'a, io::Result<usize>> {
        Box::pin(UdpSocket::recv(self, buf))
    }
}

pub trait ByteStream: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T> ByteStream for T where T: AsyncRead + AsyncWrite + Send + Unpin {}

pub trait Dialer: Send + Sync {
    fn dial_udp<'a>(&'a self, addr: &'a str) -> BoxFuture<'a, Result<Box<dyn Datagram>>>;
    fn dial_tcp<'a>(&'a self, addr: &'a str) -> BoxFuture<'a, Result<Box<dyn ByteStream>>>;
}

/// Resolves the address and opens plain tokio sockets, giving up after `connect_timeout`.
pub struct DefaultDialer {
    resolver: Resolver,
    connect_timeout: Duration,
}

impl DefaultDialer {
    pub fn new(connect_timeout: Duration) -> Self {
        Self {
            resolver: Resolver::default(),
            connect_timeout,
        }
    }

    pub fn with_resolver(mut self, resolver: Resolver) -> Self {
        self.resolver = resolver;
        self
    }

    async fn resolve(&self, addr: &str) -> Result<SocketAddr> {
        let host = addr.parse::<Host>()?;
        self.resolver.resolve(&host).await
    }

    async fn open_udp(&self, addr: &str) -> Result<Box<dyn Datagram>> {
        let remote = self.resolve(addr).await?;
        let local = if remote.is_ipv4() { "0.0.0.0:0" } else { "[::]:0" };
        let socket = UdpSocket::bind(local).await?;
        socket.connect(remote).await?;
        debug!(%remote, "created udp connection");
        Ok(Box::new(socket))
    }

    async fn open_tcp(&self, addr: &str) -> Result<Box<dyn ByteStream>> {
        let remote = self.resolve(addr).await?;
        let stream = TcpStream::connect(remote).await?;
        stream.set_nodelay(true)?;
        debug!(%remote, "created tcp connection");
        Ok(Box::new(stream))
    }
}

impl Default for DefaultDialer {
    fn default() -> Self {
        Self::new(Duration::from_secs(1))
    }
}

impl Dialer for DefaultDialer {
    fn dial_udp<'a>(&'a self, addr: &'a str) -> BoxFuture<'a, Result<Box<dyn Datagram>>> {
        Box::pin(async move {
            timeout(self.connect_timeout, self.open_udp(addr))
                .await
                .map_err(|_| Error::Timeout)?
        })
    }

    fn dial_tcp<'a>(&'a self, addr: &'a str) -> BoxFuture<'a, Result<Box<dyn ByteStream>>> {
        Box::pin(async move {
            timeout(self.connect_timeout, self.open_tcp(addr))
                .await
                .map_err(|_| Error::Timeout)?
        })
    }
}
