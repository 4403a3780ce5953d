//! Source engine remote console protocol.
//!
//! A command's output may be split over several response packets and the protocol has no
//! "more data" flag. After every command we send an empty `RESPONSE_VALUE` packet (the
//! mirror). The server answers requests in order, so once the mirror's echo shows up the
//! command output is complete; the echo is followed by a packet carrying [`TRAILER`].

use crate::{
    errors::{Error, Result},
    tcp::TcpTransport,
    util::{self, Reader},
};

use bytes::{Bytes, BytesMut};
use rand::Rng;
use std::fmt;
use tracing::debug;

/// Body of the packet the server sends after echoing the mirror.
pub const TRAILER: [u8; 4] = [0x00, 0x01, 0x00, 0x00];

/// id, type and the two NUL terminators
const FRAME_OVERHEAD: i32 = 10;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PacketType(pub i32);

impl PacketType {
    pub const AUTH: Self = Self(3);
    pub const EXEC_COMMAND: Self = Self(2);
    /// Same value as `EXEC_COMMAND`, only the direction tells them apart.
    pub const AUTH_RESPONSE: Self = Self(2);
    pub const RESPONSE_VALUE: Self = Self(0);
}

impl fmt::Display for PacketType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

fn random_id() -> i32 {
    // -1 is what servers send back on a bad password
    rand::thread_rng().gen_range(0..=i32::MAX)
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Request {
    pub id: i32,
    pub kind: PacketType,
    pub body: String,
}

impl Request {
    pub fn new(kind: PacketType, body: impl Into<String>) -> Self {
        Self {
            id: random_id(),
            kind,
            body: body.into(),
        }
    }

    /// Value of the size field: everything after the field itself.
    pub fn size(&self) -> i32 {
        self.body.len() as i32 + FRAME_OVERHEAD
    }

    pub fn write_bytes(&self, out: &mut BytesMut) {
        util::write_i32(out, self.size());
        util::write_i32(out, self.id);
        util::write_i32(out, self.kind.0);
        out.extend_from_slice(self.body.as_bytes());
        util::write_null(out);
        util::write_null(out);
    }

    pub fn to_bytes(&self) -> Bytes {
        let mut out = BytesMut::with_capacity(self.size() as usize + 4);
        self.write_bytes(&mut out);
        out.freeze()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Response {
    pub size: i32,
    pub id: i32,
    pub kind: PacketType,
    pub body: Bytes,
}

impl Response {
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let mut r = Reader::new(data);
        let size = r.read_i32()?;
        if size < FRAME_OVERHEAD {
            return Err(Error::InvalidFrameSize(size));
        }
        let id = r.read_i32()?;
        let kind = PacketType(r.read_i32()?);
        let body = Bytes::copy_from_slice(r.read_bytes((size - FRAME_OVERHEAD) as usize)?);

        Ok(Self {
            size,
            id,
            kind,
            body,
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Progress {
    Pending,
    Done,
}

/// Collects the output of one command from the frames that follow it.
#[derive(Debug)]
pub struct MirrorCollector {
    exec_id: i32,
    mirror_id: i32,
    saw_mirror: bool,
    output: BytesMut,
}

impl MirrorCollector {
    pub fn new(exec_id: i32, mirror_id: i32) -> Self {
        Self {
            exec_id,
            mirror_id,
            saw_mirror: false,
            output: BytesMut::new(),
        }
    }

    pub fn accept(&mut self, resp: &Response) -> Result<Progress> {
        if resp.kind != PacketType::RESPONSE_VALUE {
            return Err(Error::InvalidResponseType {
                expected: PacketType::RESPONSE_VALUE.0,
                found: resp.kind.0,
            });
        }

        if self.saw_mirror {
            if resp.body[..] == TRAILER[..] {
                return Ok(Progress::Done);
            }
            return Err(Error::InvalidResponseTrailer);
        }

        if resp.id == self.mirror_id {
            self.saw_mirror = true;
            return Ok(Progress::Pending);
        }

        if resp.id != self.exec_id {
            return Err(Error::InvalidResponseId {
                expected: self.exec_id,
                found: resp.id,
            });
        }

        self.output.extend_from_slice(&resp.body);
        Ok(Progress::Pending)
    }

    pub fn into_output(self) -> String {
        String::from_utf8_lossy(&self.output).into_owned()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum State {
    Unauthenticated,
    Authenticated,
    /// A failed login poisons the connection for good.
    Rejected,
}

/// One RCON session. Commands are only accepted after a successful [`Client::authenticate`].
pub struct Client {
    transport: TcpTransport,
    state: State,
}

impl Client {
    pub fn new(transport: TcpTransport) -> Self {
        Self {
            transport,
            state: State::Unauthenticated,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.state == State::Authenticated
    }

    async fn send(&mut self, req: &Request) -> Result<()> {
        debug!(id = req.id, kind = %req.kind, "sending rcon request");
        self.transport.send(&req.to_bytes()).await?;
        debug!(id = req.id, "sent rcon request");
        Ok(())
    }

    async fn receive(&mut self) -> Result<Response> {
        let frame = self.transport.receive().await?;
        let resp = Response::from_bytes(&frame)?;
        debug!(
            id = resp.id,
            kind = %resp.kind,
            bytes = resp.body.len(),
            "received rcon response"
        );
        Ok(resp)
    }

    /// Logs in. Any failure leaves the session rejected: later logins and commands on the same
    /// connection are refused.
    pub async fn authenticate(&mut self, password: &str) -> Result<()> {
        if self.state == State::Rejected {
            return Err(Error::AuthenticationFailed);
        }

        match self.login(password).await {
            Ok(()) => {
                debug!("authenticated");
                self.state = State::Authenticated;
                Ok(())
            }
            Err(e) => {
                self.state = State::Rejected;
                Err(e)
            }
        }
    }

    async fn login(&mut self, password: &str) -> Result<()> {
        debug!("authenticating");
        let req = Request::new(PacketType::AUTH, password);
        self.send(&req).await?;

        let resp = self.receive().await?;
        if resp.kind != PacketType::RESPONSE_VALUE {
            return Err(Error::InvalidResponseType {
                expected: PacketType::RESPONSE_VALUE.0,
                found: resp.kind.0,
            });
        }
        if resp.id != req.id {
            return Err(Error::InvalidResponseId {
                expected: req.id,
                found: resp.id,
            });
        }

        let resp = self.receive().await?;
        if resp.kind != PacketType::AUTH_RESPONSE || resp.id != req.id {
            debug!(id = resp.id, "authentication rejected");
            return Err(Error::AuthenticationFailed);
        }

        Ok(())
    }

    pub async fn exec(&mut self, cmd: &str) -> Result<String> {
        if !self.is_authenticated() {
            return Err(Error::RconNotInitialized);
        }

        let req = Request::new(PacketType::EXEC_COMMAND, cmd);
        let mut mirror = Request::new(PacketType::RESPONSE_VALUE, "");
        while mirror.id == req.id {
            mirror.id = random_id();
        }

        self.send(&req).await?;
        self.send(&mirror).await?;

        let mut collector = MirrorCollector::new(req.id, mirror.id);
        loop {
            let resp = self.receive().await?;
            if collector.accept(&resp)? == Progress::Done {
                debug!("received mirror trailer");
                break;
            }
        }

        Ok(collector.into_output())
    }

    pub async fn close(&mut self) {
        if self.state == State::Authenticated {
            self.state = State::Unauthenticated;
        }
        self.transport.close().await;
    }
}
