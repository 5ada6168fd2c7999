//! Input seam for the pack parser.
//!
//! The parser buffers its own read-ahead. When the caller declares that
//! data may follow the pack footer and must stay in their stream, the
//! parser has to push its buffered over-read back — which only works if
//! the source supports a bounded rewind. Sources that cannot rewind are
//! rejected before any object is read.

use std::io::{self, Read, Seek, SeekFrom};

/// A byte source the pack parser can consume.
pub trait PackInput: Read {
    /// Can `rewind` be called on this source?
    fn can_rewind(&self) -> bool;

    /// Step the source back `n` bytes, so the bytes are readable again
    /// (by this parser or by the caller afterwards).
    fn rewind(&mut self, n: u64) -> io::Result<()>;
}

/// Input over a seekable source; rewind is a relative seek.
pub struct SeekableInput<R: Read + Seek>(pub R);

impl<R: Read + Seek> Read for SeekableInput<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.0.read(buf)
    }
}

impl<R: Read + Seek> PackInput for SeekableInput<R> {
    fn can_rewind(&self) -> bool {
        true
    }

    fn rewind(&mut self, n: u64) -> io::Result<()> {
        self.0.seek(SeekFrom::Current(-(n as i64)))?;
        Ok(())
    }
}

impl<R: Read + Seek> SeekableInput<R> {
    /// Recover the underlying source.
    pub fn into_inner(self) -> R {
        self.0
    }
}

/// Input over a forward-only source.
pub struct StreamInput<R: Read>(pub R);

impl<R: Read> Read for StreamInput<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.0.read(buf)
    }
}

impl<R: Read> PackInput for StreamInput<R> {
    fn can_rewind(&self) -> bool {
        false
    }

    fn rewind(&mut self, _n: u64) -> io::Result<()> {
        Err(io::Error::other("stream input cannot rewind"))
    }
}
