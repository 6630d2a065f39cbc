//! Big-endian primitive IO over `std::io` streams.
//!
//! Every multi-byte value in the design file format is written most
//! significant byte first, so files are byte-identical across hosts.

use std::io::{self, Read, Write};

use opencell_core::{Handle, Point};

/// Length words come from untrusted streams; preallocation is capped so a
/// corrupt length cannot exhaust memory before the read hits end of stream.
const PREALLOC_LIMIT: usize = 4096;

pub struct StreamWriter<W: Write> {
    inner: W,
}

impl<W: Write> StreamWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner }
    }

    pub fn into_inner(self) -> W {
        self.inner
    }

    pub fn write_u8(&mut self, value: u8) -> io::Result<()> {
        self.inner.write_all(&[value])
    }

    pub fn write_u32(&mut self, value: u32) -> io::Result<()> {
        self.inner.write_all(&value.to_be_bytes())
    }

    pub fn write_i32(&mut self, value: i32) -> io::Result<()> {
        self.inner.write_all(&value.to_be_bytes())
    }

    pub fn write_bool(&mut self, value: bool) -> io::Result<()> {
        self.write_u8(value as u8)
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.inner.write_all(bytes)
    }

    /// Length-prefixed UTF-8 string.
    pub fn write_string(&mut self, value: &str) -> io::Result<()> {
        self.write_u32(value.len() as u32)?;
        self.inner.write_all(value.as_bytes())
    }

    pub fn write_point(&mut self, point: Point) -> io::Result<()> {
        self.write_i32(point.x)?;
        self.write_i32(point.y)
    }

    pub fn write_handle<T>(&mut self, handle: Handle<T>) -> io::Result<()> {
        self.write_u32(handle.raw())
    }

    pub fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

pub struct StreamReader<R: Read> {
    inner: R,
}

impl<R: Read> StreamReader<R> {
    pub fn new(inner: R) -> Self {
        Self { inner }
    }

    pub fn read_u8(&mut self) -> io::Result<u8> {
        let mut buf = [0u8; 1];
        self.inner.read_exact(&mut buf)?;
        Ok(buf[0])
    }

    pub fn read_u32(&mut self) -> io::Result<u32> {
        let mut buf = [0u8; 4];
        self.inner.read_exact(&mut buf)?;
        Ok(u32::from_be_bytes(buf))
    }

    pub fn read_i32(&mut self) -> io::Result<i32> {
        let mut buf = [0u8; 4];
        self.inner.read_exact(&mut buf)?;
        Ok(i32::from_be_bytes(buf))
    }

    pub fn read_bool(&mut self) -> io::Result<bool> {
        Ok(self.read_u8()? != 0)
    }

    pub fn read_bytes(&mut self, buf: &mut [u8]) -> io::Result<()> {
        self.inner.read_exact(buf)
    }

    pub fn read_string(&mut self) -> io::Result<String> {
        let len = self.read_u32()? as usize;
        let mut buf = Vec::with_capacity(len.min(PREALLOC_LIMIT));
        let got = (&mut self.inner).take(len as u64).read_to_end(&mut buf)?;
        if got < len {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "string body truncated",
            ));
        }
        String::from_utf8(buf)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }

    pub fn read_point(&mut self) -> io::Result<Point> {
        let x = self.read_i32()?;
        let y = self.read_i32()?;
        Ok(Point::new(x, y))
    }

    pub fn read_handle<T>(&mut self) -> io::Result<Handle<T>> {
        Ok(Handle::from_raw(self.read_u32()?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opencell_core::Layer;

    #[test]
    fn test_primitives_roundtrip_big_endian() {
        let mut w = StreamWriter::new(Vec::new());
        w.write_u32(0xDEAD_BEEF).unwrap();
        w.write_i32(-42).unwrap();
        w.write_string("metal1").unwrap();
        w.write_bool(true).unwrap();
        w.write_point(Point::new(-7, 12)).unwrap();
        w.write_handle(Handle::<Layer>::from_raw(9)).unwrap();
        let bytes = w.into_inner();

        // Spot-check byte order on the first word.
        assert_eq!(&bytes[..4], &[0xDE, 0xAD, 0xBE, 0xEF]);

        let mut r = StreamReader::new(bytes.as_slice());
        assert_eq!(r.read_u32().unwrap(), 0xDEAD_BEEF);
        assert_eq!(r.read_i32().unwrap(), -42);
        assert_eq!(r.read_string().unwrap(), "metal1");
        assert!(r.read_bool().unwrap());
        assert_eq!(r.read_point().unwrap(), Point::new(-7, 12));
        assert_eq!(r.read_handle::<Layer>().unwrap().raw(), 9);
    }

    #[test]
    fn test_oversized_string_length_reports_eof() {
        // The length word claims 1 GiB but only three bytes follow.
        let mut w = StreamWriter::new(Vec::new());
        w.write_u32(1 << 30).unwrap();
        w.write_bytes(b"abc").unwrap();
        let bytes = w.into_inner();
        let mut r = StreamReader::new(bytes.as_slice());
        assert_eq!(
            r.read_string().unwrap_err().kind(),
            io::ErrorKind::UnexpectedEof
        );
    }

    #[test]
    fn test_truncated_stream_reports_eof() {
        let mut r = StreamReader::new([0u8, 1].as_slice());
        assert_eq!(
            r.read_u32().unwrap_err().kind(),
            io::ErrorKind::UnexpectedEof
        );
    }
}
