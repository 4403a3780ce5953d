//! Little-endian wire primitives shared by the query and RCON protocols.

use crate::errors::{Error, Result};

use byteorder::{LittleEndian, ReadBytesExt};
use bytes::{BufMut, BytesMut};
use std::io::Cursor;

/// Connectionless packet marker, both on requests and on single-packet responses.
pub const REQUEST_PREFIX: [u8; 4] = [0xFF, 0xFF, 0xFF, 0xFF];

/// Cursor over a received buffer. Every read fails with [`Error::TruncatedData`]
/// instead of producing a zero value when the buffer runs out.
#[derive(Clone, Debug)]
pub struct Reader<'a> {
    inner: Cursor<&'a [u8]>,
}

impl<'a> Reader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self {
            inner: Cursor::new(buf),
        }
    }

    pub fn remaining(&self) -> usize {
        let len = self.inner.get_ref().len() as u64;
        len.saturating_sub(self.inner.position()) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    fn ensure(&self, needed: usize) -> Result<()> {
        let remaining = self.remaining();
        if remaining < needed {
            return Err(Error::TruncatedData { needed, remaining });
        }
        Ok(())
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        self.ensure(1)?;
        Ok(self.inner.read_u8()?)
    }

    pub fn read_bytes(&mut self, n: usize) -> Result<&'a [u8]> {
        self.ensure(n)?;
        let start = self.inner.position() as usize;
        let buf: &'a [u8] = *self.inner.get_ref();
        self.inner.set_position((start + n) as u64);
        Ok(&buf[start..start + n])
    }

    pub fn read_i16(&mut self) -> Result<i16> {
        self.ensure(2)?;
        Ok(self.inner.read_i16::<LittleEndian>()?)
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        self.ensure(2)?;
        Ok(self.inner.read_u16::<LittleEndian>()?)
    }

    pub fn read_i32(&mut self) -> Result<i32> {
        self.ensure(4)?;
        Ok(self.inner.read_i32::<LittleEndian>()?)
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        self.ensure(4)?;
        Ok(self.inner.read_u32::<LittleEndian>()?)
    }

    pub fn read_i64(&mut self) -> Result<i64> {
        self.ensure(8)?;
        Ok(self.inner.read_i64::<LittleEndian>()?)
    }

    pub fn read_u64(&mut self) -> Result<u64> {
        self.ensure(8)?;
        Ok(self.inner.read_u64::<LittleEndian>()?)
    }

    /// IEEE-754 single, sent as the bit pattern of a little-endian `u32`.
    pub fn read_f32(&mut self) -> Result<f32> {
        Ok(f32::from_bits(self.read_u32()?))
    }

    /// Reads up to the first NUL and drops it. A string without a terminator is truncated data.
    pub fn read_cstring(&mut self) -> Result<String> {
        let start = self.inner.position() as usize;
        let buf: &'a [u8] = *self.inner.get_ref();
        let rest = buf.get(start..).unwrap_or_default();
        match rest.iter().position(|&c| c == 0) {
            Some(end) => {
                self.inner.set_position((start + end + 1) as u64);
                Ok(String::from_utf8_lossy(&rest[..end]).into_owned())
            }
            None => Err(Error::TruncatedData {
                needed: rest.len() + 1,
                remaining: rest.len(),
            }),
        }
    }
}

pub fn write_request_prefix(buf: &mut BytesMut) {
    buf.put_slice(&REQUEST_PREFIX);
}

pub fn write_u8(buf: &mut BytesMut, v: u8) {
    buf.put_u8(v);
}

pub fn write_i32(buf: &mut BytesMut, v: i32) {
    buf.put_i32_le(v);
}

pub fn write_null(buf: &mut BytesMut) {
    buf.put_u8(0);
}

pub fn write_cstring(buf: &mut BytesMut, v: &str) {
    buf.put_slice(v.as_bytes());
    write_null(buf);
}

pub fn hex_str(v: &[u8]) -> String {
    hex::encode_upper(v)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_fixed_width() {
        let data = [
            0x2A, 0x34, 0x12, 0xFE, 0xFF, 0xFF, 0xFF, 0x00, 0x00, 0x80, 0x3F, 0x01, 0x00, 0x00,
            0x00, 0x00, 0x00, 0x00, 0x00,
        ];
        let mut r = Reader::new(&data);

        assert_eq!(r.read_u8().unwrap(), 0x2A);
        assert_eq!(r.read_u16().unwrap(), 0x1234);
        assert_eq!(r.read_i32().unwrap(), -2);
        assert_eq!(r.read_f32().unwrap(), 1.0);
        assert_eq!(r.read_u64().unwrap(), 1);
        assert!(r.is_empty());
    }

    #[test]
    fn test_read_cstring() {
        let data = b"de_dust2\0cstrike\0";
        let mut r = Reader::new(data);

        assert_eq!(r.read_cstring().unwrap(), "de_dust2");
        assert_eq!(r.read_cstring().unwrap(), "cstrike");
        assert_eq!(r.remaining(), 0);
    }

    #[test]
    fn test_unterminated_string_is_truncated() {
        let mut r = Reader::new(b"abc");

        match r.read_cstring() {
            Err(Error::TruncatedData { needed, remaining }) => {
                assert_eq!(needed, 4);
                assert_eq!(remaining, 3);
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_short_reads_fail() {
        assert!(matches!(
            Reader::new(&[0x01]).read_i16(),
            Err(Error::TruncatedData {
                needed: 2,
                remaining: 1
            })
        ));
        assert!(matches!(
            Reader::new(&[0x01, 0x02, 0x03]).read_u32(),
            Err(Error::TruncatedData { .. })
        ));
        assert!(matches!(
            Reader::new(&[0; 7]).read_i64(),
            Err(Error::TruncatedData { .. })
        ));
        assert!(matches!(
            Reader::new(&[0; 2]).read_bytes(3),
            Err(Error::TruncatedData { .. })
        ));
        assert!(matches!(
            Reader::new(&[]).read_u8(),
            Err(Error::TruncatedData { .. })
        ));
    }

    #[test]
    fn test_writers() {
        let mut buf = BytesMut::new();
        write_request_prefix(&mut buf);
        write_u8(&mut buf, b'U');
        write_i32(&mut buf, -1);
        write_cstring(&mut buf, "hi");

        assert_eq!(
            &buf[..],
            &[0xFF, 0xFF, 0xFF, 0xFF, b'U', 0xFF, 0xFF, 0xFF, 0xFF, b'h', b'i', 0x00][..]
        );
    }
}
