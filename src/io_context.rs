//! Custom I/O for the codec library.
//!
//! The codec library reads through two callbacks (read + seek) bound to an opaque
//! handle. `FileStreamIo` implements those callbacks over the session's byte
//! source, and `IoContext` bundles them with the scratch buffer the library reads
//! into.

use std::io::{self, Read, Seek, SeekFrom};

use symphonia::core::io::MediaSource;
use tracing::trace;

use crate::byte_source::{ByteSourceHandle, WeakByteSource};

/// Size of the custom I/O scratch buffer.
pub const IO_BUFFER_SIZE: usize = 16 * 1024;

/// Seek origins, in the codec library's conventions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Whence {
    /// Absolute offset.
    Set,
    /// Relative to the current position.
    Current,
    /// Relative to the end of the stream.
    End,
    /// Report the total stream length without moving the cursor.
    Size,
}

/// Why a callback produced no data.
#[derive(Debug)]
pub enum IoStatus {
    /// Zero bytes were produced.
    Eof,
    /// The underlying source failed.
    External(io::Error),
}

impl IoStatus {
    fn into_io_error(self) -> io::Error {
        match self {
            IoStatus::Eof => io::Error::from(io::ErrorKind::UnexpectedEof),
            IoStatus::External(err) => err,
        }
    }
}

/// The read/seek callbacks handed to the codec library.
///
/// Both are synchronous: the codec library does not tolerate asynchronous
/// completion from custom I/O.
#[derive(Clone)]
pub struct FileStreamIo {
    source: WeakByteSource,
}

impl FileStreamIo {
    pub(crate) fn new(source: &ByteSourceHandle) -> Self {
        Self {
            source: source.downgrade(),
        }
    }

    /// Read up to `buf.len()` bytes.
    ///
    /// Assume we've reached EOF if we didn't read any bytes.
    pub fn read(&self, buf: &mut [u8]) -> Result<usize, IoStatus> {
        match self.source.with(|s| s.read(buf)) {
            Ok(0) => Err(IoStatus::Eof),
            Ok(n) => Ok(n),
            Err(err) => Err(IoStatus::External(err)),
        }
    }

    /// Seek and return the resulting absolute position.
    ///
    /// `Whence::Size` returns the total length instead and leaves the cursor alone.
    pub fn seek(&self, offset: i64, whence: Whence) -> Result<u64, IoStatus> {
        let result = self.source.with(|s| match whence {
            Whence::Set => {
                let offset = u64::try_from(offset).map_err(|_| {
                    io::Error::new(io::ErrorKind::InvalidInput, "negative absolute seek")
                })?;
                s.seek(SeekFrom::Start(offset))
            }
            Whence::Current => s.seek(SeekFrom::Current(offset)),
            Whence::End => s.seek(SeekFrom::End(offset)),
            Whence::Size => s.size(),
        });
        result.map_err(IoStatus::External)
    }
}

/// A custom I/O context: the callbacks plus the scratch buffer reads go through.
///
/// The buffer is allocated once at construction and is owned by the context
/// from then on; it is freed exactly once, when the context is dropped (which is
/// whenever the codec library drops its input).
pub struct IoContext {
    io: FileStreamIo,
    buffer: Box<[u8]>,
    pos: usize,
    filled: usize,
}

impl IoContext {
    pub(crate) fn new(source: &ByteSourceHandle) -> Self {
        Self::with_io(FileStreamIo::new(source))
    }

    fn with_io(io: FileStreamIo) -> Self {
        let buffer = vec![0u8; IO_BUFFER_SIZE].into_boxed_slice();
        Self {
            io,
            buffer,
            pos: 0,
            filled: 0,
        }
    }

    /// The callbacks this context reads through.
    pub fn io(&self) -> &FileStreamIo {
        &self.io
    }

    pub fn buffer_size(&self) -> usize {
        self.buffer.len()
    }

    fn buffered(&self) -> usize {
        self.filled - self.pos
    }

    fn discard_buffer(&mut self) {
        self.pos = 0;
        self.filled = 0;
    }
}

impl Read for IoContext {
    fn read(&mut self, dst: &mut [u8]) -> io::Result<usize> {
        if dst.is_empty() {
            return Ok(0);
        }

        // Large reads bypass the scratch buffer entirely.
        if self.buffered() == 0 && dst.len() >= self.buffer.len() {
            return match self.io.read(dst) {
                Ok(n) => Ok(n),
                Err(IoStatus::Eof) => Ok(0),
                Err(IoStatus::External(err)) => Err(err),
            };
        }

        if self.buffered() == 0 {
            match self.io.read(&mut self.buffer) {
                Ok(n) => {
                    self.pos = 0;
                    self.filled = n;
                }
                Err(IoStatus::Eof) => return Ok(0),
                Err(IoStatus::External(err)) => return Err(err),
            }
        }

        let n = dst.len().min(self.buffered());
        dst[..n].copy_from_slice(&self.buffer[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }
}

impl Seek for IoContext {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        // The source cursor is ahead of ours by whatever is still buffered.
        let buffered = self.buffered() as i64;
        let result = match pos {
            SeekFrom::Start(offset) => {
                let offset = i64::try_from(offset).map_err(|_| {
                    io::Error::new(io::ErrorKind::InvalidInput, "seek offset out of range")
                })?;
                self.io.seek(offset, Whence::Set)
            }
            SeekFrom::Current(offset) => self.io.seek(offset - buffered, Whence::Current),
            SeekFrom::End(offset) => self.io.seek(offset, Whence::End),
        };
        self.discard_buffer();
        result.map_err(IoStatus::into_io_error)
    }
}

impl MediaSource for IoContext {
    fn is_seekable(&self) -> bool {
        self.io.seek(0, Whence::Size).is_ok()
    }

    fn byte_len(&self) -> Option<u64> {
        match self.io.seek(0, Whence::Size) {
            Ok(len) => Some(len),
            Err(status) => {
                trace!(?status, "byte source cannot report its size");
                None
            }
        }
    }
}
