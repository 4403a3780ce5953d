use crate::{
    errors::{Error, Result},
    net::{ByteStream, Dialer},
};

use byteorder::{ByteOrder, LittleEndian};
use bytes::{Bytes, BytesMut};
use futures::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::{io::AsyncWriteExt, time::timeout};
use tokio_util::codec::{Decoder, Encoder, Framed};
use tracing::{debug, error};

/// Smallest legal size field: id, type and two NULs.
const MIN_FRAME_SIZE: i32 = 10;

/// Upper bound on a single frame; anything above means the stream is out of sync.
pub const MAX_FRAME_SIZE: i32 = 1 << 20;

const SIZE_LEN: usize = 4;

/// Splits an RCON byte stream back into frames using their little-endian size prefix.
/// Each decoded item is a whole frame, size field included.
#[derive(Clone, Copy, Debug, Default)]
pub struct RconCodec;

impl Decoder for RconCodec {
    type Item = BytesMut;
    type Error = Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<BytesMut>> {
        if src.len() < SIZE_LEN {
            return Ok(None);
        }

        let size = LittleEndian::read_i32(&src[..SIZE_LEN]);
        if !(MIN_FRAME_SIZE..=MAX_FRAME_SIZE).contains(&size) {
            return Err(Error::InvalidFrameSize(size));
        }

        let total = SIZE_LEN + size as usize;
        if src.len() < total {
            src.reserve(total - src.len());
            return Ok(None);
        }

        Ok(Some(src.split_to(total)))
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<BytesMut>> {
        match self.decode(src)? {
            Some(frame) => Ok(Some(frame)),
            None if src.is_empty() => Ok(None),
            None => Err(Error::ConnectionClosed),
        }
    }
}

impl Encoder<Bytes> for RconCodec {
    type Error = Error;

    fn encode(&mut self, item: Bytes, dst: &mut BytesMut) -> Result<()> {
        dst.extend_from_slice(&item);
        Ok(())
    }
}

pub struct TcpTransport {
    framed: Option<Framed<Box<dyn ByteStream>, RconCodec>>,
    read_timeout: Duration,
    write_timeout: Duration,
}

impl TcpTransport {
    pub fn new(stream: Box<dyn ByteStream>, read_timeout: Duration, write_timeout: Duration) -> Self {
        Self {
            framed: Some(Framed::new(stream, RconCodec)),
            read_timeout,
            write_timeout,
        }
    }

    pub async fn open(
        dialer: &dyn Dialer,
        addr: &str,
        read_timeout: Duration,
        write_timeout: Duration,
    ) -> Result<Self> {
        let stream = dialer.dial_tcp(addr).await.map_err(|e| {
            error!(addr, error = %e, "could not dial tcp");
            e
        })?;
        Ok(Self::new(stream, read_timeout, write_timeout))
    }

    fn framed(&mut self) -> Result<&mut Framed<Box<dyn ByteStream>, RconCodec>> {
        self.framed.as_mut().ok_or(Error::NotInitialized)
    }

    pub async fn send(&mut self, payload: &[u8]) -> Result<()> {
        let write_timeout = self.write_timeout;
        let framed = self.framed()?;

        timeout(write_timeout, framed.send(Bytes::copy_from_slice(payload)))
            .await
            .map_err(|_| Error::Timeout)?
            .map_err(|e| {
                error!(error = %e, "could not write rcon request");
                e
            })
    }

    /// Reads exactly one frame, however many reads it takes.
    pub async fn receive(&mut self) -> Result<BytesMut> {
        let read_timeout = self.read_timeout;
        let framed = self.framed()?;

        match timeout(read_timeout, framed.next())
            .await
            .map_err(|_| Error::Timeout)?
        {
            Some(frame) => {
                let frame = frame?;
                debug!(size = frame.len(), "read rcon packet");
                Ok(frame)
            }
            None => Err(Error::ConnectionClosed),
        }
    }

    pub async fn close(&mut self) {
        if let Some(mut framed) = self.framed.take() {
            if let Err(e) = framed.get_mut().shutdown().await {
                debug!(error = %e, "error while closing tcp connection");
            }
        }
    }
}
