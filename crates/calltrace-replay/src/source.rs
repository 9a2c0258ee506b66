//! Random-access byte sources the decoder reads from.
//!
//! [`ByteSource`] is the decoder's only view of the underlying data: byte
//! and varint reads, a current offset, progress, and an optional seek
//! capability. Three implementations cover the common cases:
//!
//! - [`SliceSource`] for in-memory traces (seekable)
//! - [`IoSource`] for any `Read + Seek`, e.g. a `File` (seekable)
//! - [`StreamSource`] for forward-only readers such as pipes

use std::borrow::Cow;
use std::fs::File;
use std::io::{self, BufReader, Read, Seek, SeekFrom};
use std::path::Path;

use crate::error::TraceError;

/// Longest encoding of a 64-bit LEB128 varint.
const MAX_VARINT_LEN: usize = 10;

/// A byte-addressed input with varint helpers.
///
/// Implementors provide the raw primitives; the varint and convenience
/// readers are provided on top of them so every source decodes the
/// encoding identically.
pub trait ByteSource {
    /// Read the next byte, or `None` at a clean end of data.
    fn next_byte(&mut self) -> Result<Option<u8>, TraceError>;

    /// Fill `buf` completely or fail with a truncation error.
    fn read_exact(&mut self, buf: &mut [u8]) -> Result<(), TraceError>;

    /// Advance past `n` bytes without returning them.
    fn skip(&mut self, n: u64) -> Result<(), TraceError>;

    /// Current offset from the start of the data.
    fn tell(&self) -> u64;

    /// Reposition to an absolute offset.
    fn seek(&mut self, offset: u64) -> Result<(), TraceError>;

    /// True if [`seek`](Self::seek) is supported.
    fn supports_seek(&self) -> bool;

    /// Total length in bytes, if known.
    fn len(&self) -> Option<u64>;

    /// Read one byte that must be present.
    fn read_byte(&mut self) -> Result<u8, TraceError> {
        let at = self.tell();
        self.next_byte()?.ok_or_else(|| TraceError::truncated(at))
    }

    /// Read an unsigned LEB128 varint.
    fn read_uint(&mut self) -> Result<u64, TraceError> {
        let start = self.tell();
        let mut result = 0u64;
        let mut shift = 0u32;
        loop {
            let byte = self.read_byte()?;
            if shift >= 64 || (shift == 63 && byte & 0x7e != 0) {
                return Err(TraceError::corrupt(start, "varint overflows 64 bits"));
            }
            result |= u64::from(byte & 0x7f) << shift;
            if byte & 0x80 == 0 {
                return Ok(result);
            }
            shift += 7;
        }
    }

    /// Read a signed LEB128 varint.
    fn read_sint(&mut self) -> Result<i64, TraceError> {
        let start = self.tell();
        let mut result = 0i64;
        let mut shift = 0u32;
        loop {
            let byte = self.read_byte()?;
            if shift >= 64 {
                return Err(TraceError::corrupt(start, "varint overflows 64 bits"));
            }
            result |= i64::from(byte & 0x7f) << shift;
            shift += 7;
            if byte & 0x80 == 0 {
                if shift < 64 && byte & 0x40 != 0 {
                    result |= -1i64 << shift;
                }
                return Ok(result);
            }
        }
    }

    /// Advance past one varint of either signedness.
    fn skip_varint(&mut self) -> Result<(), TraceError> {
        let start = self.tell();
        for _ in 0..MAX_VARINT_LEN {
            if self.read_byte()? & 0x80 == 0 {
                return Ok(());
            }
        }
        Err(TraceError::corrupt(start, "varint overflows 64 bits"))
    }

    /// Read exactly `n` bytes into a new buffer.
    ///
    /// Lengths larger than the remaining data are rejected before
    /// allocating, so a corrupt length cannot trigger a huge allocation.
    fn read_bytes(&mut self, n: u64) -> Result<Vec<u8>, TraceError> {
        let at = self.tell();
        if let Some(len) = self.len() {
            if n > len.saturating_sub(at) {
                return Err(TraceError::truncated(at));
            }
        }
        let n = usize::try_from(n).map_err(|_| TraceError::corrupt(at, "length overflows usize"))?;
        let mut buf = vec![0u8; n];
        self.read_exact(&mut buf)?;
        Ok(buf)
    }

    /// Progress through the data as a percentage in `0..=100`.
    ///
    /// Sources of unknown length report 0.
    fn percent_consumed(&self) -> u8 {
        match self.len() {
            Some(0) => 100,
            Some(len) => (self.tell().min(len) * 100 / len) as u8,
            None => 0,
        }
    }
}

// ── SliceSource ─────────────────────────────────────────────────

/// An in-memory, seekable source over borrowed or owned bytes.
#[derive(Clone, Debug)]
pub struct SliceSource<'a> {
    data: Cow<'a, [u8]>,
    pos: usize,
}

impl<'a> SliceSource<'a> {
    /// Read from borrowed bytes.
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data: Cow::Borrowed(data),
            pos: 0,
        }
    }
}

impl SliceSource<'static> {
    /// Read from an owned buffer.
    pub fn owned(data: Vec<u8>) -> Self {
        Self {
            data: Cow::Owned(data),
            pos: 0,
        }
    }
}

impl ByteSource for SliceSource<'_> {
    fn next_byte(&mut self) -> Result<Option<u8>, TraceError> {
        let byte = self.data.get(self.pos).copied();
        if byte.is_some() {
            self.pos += 1;
        }
        Ok(byte)
    }

    fn read_exact(&mut self, buf: &mut [u8]) -> Result<(), TraceError> {
        let end = self.pos + buf.len();
        if end > self.data.len() {
            return Err(TraceError::truncated(self.data.len() as u64));
        }
        buf.copy_from_slice(&self.data[self.pos..end]);
        self.pos = end;
        Ok(())
    }

    fn skip(&mut self, n: u64) -> Result<(), TraceError> {
        let remaining = (self.data.len() - self.pos) as u64;
        if n > remaining {
            self.pos = self.data.len();
            return Err(TraceError::truncated(self.pos as u64));
        }
        self.pos += n as usize;
        Ok(())
    }

    fn tell(&self) -> u64 {
        self.pos as u64
    }

    fn seek(&mut self, offset: u64) -> Result<(), TraceError> {
        if offset > self.data.len() as u64 {
            return Err(TraceError::corrupt(offset, "seek past end of data"));
        }
        self.pos = offset as usize;
        Ok(())
    }

    fn supports_seek(&self) -> bool {
        true
    }

    fn len(&self) -> Option<u64> {
        Some(self.data.len() as u64)
    }
}

// ── Reader-backed sources ───────────────────────────────────────

/// Read one byte from a reader, distinguishing clean EOF from errors.
fn next_byte_from(reader: &mut dyn Read) -> Result<Option<u8>, TraceError> {
    let mut buf = [0u8; 1];
    loop {
        match reader.read(&mut buf) {
            Ok(0) => return Ok(None),
            Ok(_) => return Ok(Some(buf[0])),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(TraceError::Io(e)),
        }
    }
}

fn read_exact_from(reader: &mut dyn Read, buf: &mut [u8], at: u64) -> Result<(), TraceError> {
    reader.read_exact(buf).map_err(|e| match e.kind() {
        io::ErrorKind::UnexpectedEof => TraceError::truncated(at),
        _ => TraceError::Io(e),
    })
}

/// A seekable source over any `Read + Seek`, buffered internally.
pub struct IoSource<R: Read + Seek> {
    reader: BufReader<R>,
    pos: u64,
    len: u64,
}

impl<R: Read + Seek> IoSource<R> {
    /// Wrap a reader, starting at its current position.
    pub fn new(mut inner: R) -> Result<Self, TraceError> {
        let pos = inner.stream_position()?;
        let len = inner.seek(SeekFrom::End(0))?;
        inner.seek(SeekFrom::Start(pos))?;
        Ok(Self {
            reader: BufReader::new(inner),
            pos,
            len,
        })
    }
}

impl IoSource<File> {
    /// Open a trace file.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, TraceError> {
        Self::new(File::open(path)?)
    }
}

impl<R: Read + Seek> ByteSource for IoSource<R> {
    fn next_byte(&mut self) -> Result<Option<u8>, TraceError> {
        let byte = next_byte_from(&mut self.reader)?;
        if byte.is_some() {
            self.pos += 1;
        }
        Ok(byte)
    }

    fn read_exact(&mut self, buf: &mut [u8]) -> Result<(), TraceError> {
        read_exact_from(&mut self.reader, buf, self.pos)?;
        self.pos += buf.len() as u64;
        Ok(())
    }

    fn skip(&mut self, n: u64) -> Result<(), TraceError> {
        if n > self.len.saturating_sub(self.pos) {
            return Err(TraceError::truncated(self.len));
        }
        let delta = i64::try_from(n).map_err(|_| TraceError::corrupt(self.pos, "skip too large"))?;
        self.reader.seek_relative(delta)?;
        self.pos += n;
        Ok(())
    }

    fn tell(&self) -> u64 {
        self.pos
    }

    fn seek(&mut self, offset: u64) -> Result<(), TraceError> {
        if offset > self.len {
            return Err(TraceError::corrupt(offset, "seek past end of data"));
        }
        self.reader.seek(SeekFrom::Start(offset))?;
        self.pos = offset;
        Ok(())
    }

    fn supports_seek(&self) -> bool {
        true
    }

    fn len(&self) -> Option<u64> {
        Some(self.len)
    }
}

/// A forward-only source over any `Read`. Bookmarks cannot be restored.
pub struct StreamSource<R: Read> {
    reader: BufReader<R>,
    pos: u64,
}

impl<R: Read> StreamSource<R> {
    /// Wrap a reader.
    pub fn new(inner: R) -> Self {
        Self {
            reader: BufReader::new(inner),
            pos: 0,
        }
    }
}

impl<R: Read> ByteSource for StreamSource<R> {
    fn next_byte(&mut self) -> Result<Option<u8>, TraceError> {
        let byte = next_byte_from(&mut self.reader)?;
        if byte.is_some() {
            self.pos += 1;
        }
        Ok(byte)
    }

    fn read_exact(&mut self, buf: &mut [u8]) -> Result<(), TraceError> {
        read_exact_from(&mut self.reader, buf, self.pos)?;
        self.pos += buf.len() as u64;
        Ok(())
    }

    fn skip(&mut self, n: u64) -> Result<(), TraceError> {
        let copied = io::copy(&mut (&mut self.reader).take(n), &mut io::sink())?;
        self.pos += copied;
        if copied < n {
            return Err(TraceError::truncated(self.pos));
        }
        Ok(())
    }

    fn tell(&self) -> u64 {
        self.pos
    }

    fn seek(&mut self, _offset: u64) -> Result<(), TraceError> {
        Err(TraceError::UnsupportedSeek)
    }

    fn supports_seek(&self) -> bool {
        false
    }

    fn len(&self) -> Option<u64> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{write_sint, write_uint};
    use proptest::prelude::*;
    use std::io::Cursor;

    proptest! {
        #[test]
        fn uint_varints_decode(v in any::<u64>()) {
            let mut buf = Vec::new();
            write_uint(&mut buf, v);
            let mut src = SliceSource::new(&buf);
            prop_assert_eq!(src.read_uint().unwrap(), v);
            prop_assert_eq!(src.tell(), buf.len() as u64);
        }

        #[test]
        fn sint_varints_decode(v in any::<i64>()) {
            let mut buf = Vec::new();
            write_sint(&mut buf, v);
            let mut src = SliceSource::new(&buf);
            prop_assert_eq!(src.read_sint().unwrap(), v);
            let mut skipper = SliceSource::new(&buf);
            skipper.skip_varint().unwrap();
            prop_assert_eq!(skipper.tell(), buf.len() as u64);
        }
    }

    #[test]
    fn overlong_varint_is_corrupt() {
        let data = [0xffu8; 11];
        let mut src = SliceSource::new(&data);
        assert!(matches!(
            src.read_uint(),
            Err(TraceError::CorruptStream { offset: 0, .. })
        ));
    }

    #[test]
    fn truncated_varint_is_corrupt() {
        let data = [0x80u8, 0x80];
        let mut src = SliceSource::new(&data);
        assert!(matches!(
            src.read_uint(),
            Err(TraceError::CorruptStream { offset: 2, .. })
        ));
    }

    #[test]
    fn read_bytes_rejects_lengths_past_end() {
        let data = [1u8, 2, 3];
        let mut src = SliceSource::new(&data);
        assert!(src.read_bytes(1 << 40).is_err());
        assert_eq!(src.read_bytes(3).unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn io_source_tracks_offsets_and_seeks() {
        let data: Vec<u8> = (0u8..100).collect();
        let mut src = IoSource::new(Cursor::new(data)).unwrap();
        assert_eq!(src.len(), Some(100));
        src.skip(10).unwrap();
        assert_eq!(src.read_byte().unwrap(), 10);
        assert_eq!(src.percent_consumed(), 11);
        src.seek(50).unwrap();
        assert_eq!(src.tell(), 50);
        assert_eq!(src.read_byte().unwrap(), 50);
        assert!(src.skip(100).is_err());
    }

    #[test]
    fn stream_source_cannot_seek() {
        let data = [1u8, 2, 3, 4];
        let mut src = StreamSource::new(&data[..]);
        assert!(!src.supports_seek());
        src.skip(2).unwrap();
        assert_eq!(src.tell(), 2);
        assert!(matches!(src.seek(0), Err(TraceError::UnsupportedSeek)));
        assert_eq!(src.read_byte().unwrap(), 3);
        assert_eq!(src.next_byte().unwrap(), Some(4));
        assert_eq!(src.next_byte().unwrap(), None);
    }
}
