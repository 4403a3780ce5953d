//! Test doubles: a scripted datagram socket, an in-memory RCON server and a dialer handing
//! both out.

use crate::{
    errors::{Error, Result},
    net::{ByteStream, Datagram, Dialer},
    protocols::rcon::{PacketType, Request, TRAILER},
    util::REQUEST_PREFIX,
};

use futures::future::{self, BoxFuture};
use std::{
    collections::VecDeque,
    io,
    sync::{Arc, Mutex},
};
use tokio::{
    io::{duplex, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt},
    task::JoinHandle,
};

pub type Responder = Box<dyn Fn(&[u8]) -> Vec<Vec<u8>> + Send + Sync>;

/// Prepends the connectionless prefix to a response payload.
pub fn packet(payload: &[u8]) -> Vec<u8> {
    let mut out = REQUEST_PREFIX.to_vec();
    out.extend_from_slice(payload);
    out
}

/// Answers every datagram sent to it with whatever the responder returns. A `recv` with
/// nothing queued never completes.
pub struct ScriptedDatagram {
    responder: Responder,
    queue: Mutex<VecDeque<Vec<u8>>>,
    sent: Arc<Mutex<Vec<Vec<u8>>>>,
    send_limit: Option<usize>,
}

impl ScriptedDatagram {
    pub fn new<F>(responder: F) -> Self
    where
        F: Fn(&[u8]) -> Vec<Vec<u8>> + Send + Sync + 'static,
    {
        Self {
            responder: Box::new(responder),
            queue: Mutex::new(VecDeque::new()),
            sent: Arc::default(),
            send_limit: None,
        }
    }

    /// Pretends the socket accepted at most `limit` bytes per datagram.
    pub fn with_send_limit(mut self, limit: usize) -> Self {
        self.send_limit = Some(limit);
        self
    }

    pub fn sent(&self) -> Arc<Mutex<Vec<Vec<u8>>>> {
        Arc::clone(&self.sent)
    }
}

impl Datagram for ScriptedDatagram {
    fn send<'a>(&'a self, buf: &'a [u8]) -> BoxFuture<'a, io::Result<usize>> {
        self.sent.lock().unwrap().push(buf.to_vec());
        let replies = (self.responder)(buf);
        self.queue.lock().unwrap().extend(replies);
        let n = self.send_limit.map_or(buf.len(), |limit| limit.min(buf.len()));
        Box::pin(future::ready(Ok(n)))
    }

    fn recv<'a>(&'a self, buf: &'a mut [u8]) -> BoxFuture<'a, io::Result<usize>> {
        let next = self.queue.lock().unwrap().pop_front();
        match next {
            Some(reply) => {
                let n = reply.len().min(buf.len());
                buf[..n].copy_from_slice(&reply[..n]);
                Box::pin(future::ready(Ok(n)))
            }
            None => Box::pin(future::pending()),
        }
    }
}

/// Dialer handing out one prepared socket and one prepared stream.
#[derive(Default)]
pub struct TestDialer {
    datagram: Mutex<Option<Box<dyn Datagram>>>,
    stream: Mutex<Option<Box<dyn ByteStream>>>,
}

impl TestDialer {
    pub fn new(datagram: impl Datagram + 'static) -> Self {
        Self {
            datagram: Mutex::new(Some(Box::new(datagram))),
            stream: Mutex::new(None),
        }
    }

    pub fn with_stream(self, stream: Box<dyn ByteStream>) -> Self {
        *self.stream.lock().unwrap() = Some(stream);
        self
    }
}

fn refused() -> Error {
    io::Error::new(io::ErrorKind::ConnectionRefused, "nothing to dial").into()
}

impl Dialer for TestDialer {
    fn dial_udp<'a>(&'a self, _addr: &'a str) -> BoxFuture<'a, Result<Box<dyn Datagram>>> {
        let datagram = self.datagram.lock().unwrap().take();
        Box::pin(future::ready(datagram.ok_or_else(refused)))
    }

    fn dial_tcp<'a>(&'a self, _addr: &'a str) -> BoxFuture<'a, Result<Box<dyn ByteStream>>> {
        let stream = self.stream.lock().unwrap().take();
        Box::pin(future::ready(stream.ok_or_else(refused)))
    }
}

pub async fn read_request<S: AsyncRead + Unpin>(stream: &mut S) -> io::Result<Request> {
    let size = stream.read_i32_le().await?;
    let id = stream.read_i32_le().await?;
    let kind = PacketType(stream.read_i32_le().await?);
    let mut body = vec![0u8; (size - 8) as usize];
    stream.read_exact(&mut body).await?;
    body.truncate(body.len() - 2);

    Ok(Request {
        id,
        kind,
        body: String::from_utf8_lossy(&body).into_owned(),
    })
}

pub async fn write_response<S: AsyncWrite + Unpin>(
    stream: &mut S,
    id: i32,
    kind: PacketType,
    body: &[u8],
) {
    let mut out = Vec::new();
    out.extend_from_slice(&(body.len() as i32 + 10).to_le_bytes());
    out.extend_from_slice(&id.to_le_bytes());
    out.extend_from_slice(&kind.0.to_le_bytes());
    out.extend_from_slice(body);
    out.extend_from_slice(&[0, 0]);
    // the client may already have hung up
    let _ = stream.write_all(&out).await;
}

/// Spawns an in-memory RCON server behaving like SRCDS: auth echo, command output split in
/// the chunks `handler` returns, mirror echo followed by the trailer packet.
pub fn rcon_pair<F>(password: &str, handler: F) -> (Box<dyn ByteStream>, JoinHandle<()>)
where
    F: Fn(&str) -> Vec<String> + Send + 'static,
{
    let (client, mut server) = duplex(4096);
    let password = password.to_string();

    let task = tokio::spawn(async move {
        while let Ok(req) = read_request(&mut server).await {
            match req.kind {
                PacketType::AUTH => {
                    write_response(&mut server, req.id, PacketType::RESPONSE_VALUE, b"").await;
                    let id = if req.body == password { req.id } else { -1 };
                    write_response(&mut server, id, PacketType::AUTH_RESPONSE, b"").await;
                }
                PacketType::EXEC_COMMAND => {
                    for chunk in handler(&req.body) {
                        write_response(
                            &mut server,
                            req.id,
                            PacketType::RESPONSE_VALUE,
                            chunk.as_bytes(),
                        )
                        .await;
                    }
                }
                _ => {
                    write_response(&mut server, req.id, PacketType::RESPONSE_VALUE, b"").await;
                    write_response(&mut server, req.id, PacketType::RESPONSE_VALUE, &TRAILER)
                        .await;
                }
            }
        }
    });

    (Box::new(client), task)
}
