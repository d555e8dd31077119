//! Host-provided random-access byte streams.
//!
//! A `ByteSource` is what the host hands us when it wants the codec library to
//! read from something other than a URL: an app-private file, a memory buffer,
//! a download in progress. The adapter keeps the only strong reference
//! (`ByteSourceHandle`); the I/O shim reaches it through a weak one, so closing
//! the session really releases the source.

use std::fs::File;
use std::io::{self, Cursor, Read, Seek, SeekFrom};
use std::sync::{Arc, Mutex, Weak};

/// A synchronous, seekable byte stream.
///
/// The codec library calls into this from its own read loop and does not
/// tolerate asynchronous completion, so every call must block until done.
/// Natively asynchronous sources go through `AsyncByteSource`.
pub trait ByteSource: Read + Seek + Send {
    /// Total length in bytes, without moving the cursor.
    ///
    /// Return `ErrorKind::Unsupported` when the source can't answer.
    fn size(&mut self) -> io::Result<u64> {
        let pos = self.stream_position()?;
        let len = self.seek(SeekFrom::End(0))?;
        if len != pos {
            self.seek(SeekFrom::Start(pos))?;
        }
        Ok(len)
    }
}

impl ByteSource for File {
    fn size(&mut self) -> io::Result<u64> {
        Ok(self.metadata()?.len())
    }
}

impl<T: AsRef<[u8]> + Send> ByteSource for Cursor<T> {
    fn size(&mut self) -> io::Result<u64> {
        Ok(self.get_ref().as_ref().len() as u64)
    }
}

impl ByteSource for Box<dyn ByteSource> {
    fn size(&mut self) -> io::Result<u64> {
        (**self).size()
    }
}

type SharedSource = Arc<Mutex<Box<dyn ByteSource>>>;

/// Strong ownership of the session's byte source.
#[derive(Clone)]
pub(crate) struct ByteSourceHandle {
    inner: SharedSource,
}

impl ByteSourceHandle {
    pub(crate) fn new(source: impl ByteSource + 'static) -> Self {
        let source: Box<dyn ByteSource> = Box::new(source);
        Self {
            inner: Arc::new(Mutex::new(source)),
        }
    }

    pub(crate) fn downgrade(&self) -> WeakByteSource {
        WeakByteSource(Arc::downgrade(&self.inner))
    }
}

/// The shim's non-owning view of the byte source.
#[derive(Clone)]
pub(crate) struct WeakByteSource(Weak<Mutex<Box<dyn ByteSource>>>);

impl WeakByteSource {
    /// Run `f` against the source, failing once the owner has released it.
    pub(crate) fn with<T>(
        &self,
        f: impl FnOnce(&mut dyn ByteSource) -> io::Result<T>,
    ) -> io::Result<T> {
        let source = self
            .0
            .upgrade()
            .ok_or_else(|| io::Error::other("byte source released"))?;
        let mut guard = source
            .lock()
            .map_err(|_| io::Error::other("byte source mutex poisoned"))?;
        f(&mut **guard)
    }
}

/// A synchronous bridge over a tokio `AsyncRead + AsyncSeek` stream.
///
/// Every call blocks on the runtime handle, so this must only be driven from a
/// blocking thread (e.g. inside `spawn_blocking`), never from async code.
#[cfg(feature = "async-source")]
pub struct AsyncByteSource<T> {
    inner: T,
    handle: tokio::runtime::Handle,
}

#[cfg(feature = "async-source")]
impl<T> AsyncByteSource<T> {
    /// Bridge `inner` using the runtime we're currently inside of.
    pub fn new(inner: T) -> io::Result<Self> {
        let handle = tokio::runtime::Handle::try_current().map_err(io::Error::other)?;
        Ok(Self::with_handle(inner, handle))
    }

    pub fn with_handle(inner: T, handle: tokio::runtime::Handle) -> Self {
        Self { inner, handle }
    }

    pub fn into_inner(self) -> T {
        self.inner
    }
}

#[cfg(feature = "async-source")]
impl<T: tokio::io::AsyncRead + Unpin> Read for AsyncByteSource<T> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        use tokio::io::AsyncReadExt;
        self.handle.block_on(self.inner.read(buf))
    }
}

#[cfg(feature = "async-source")]
impl<T: tokio::io::AsyncSeek + Unpin> Seek for AsyncByteSource<T> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        use tokio::io::AsyncSeekExt;
        self.handle.block_on(self.inner.seek(pos))
    }
}

#[cfg(feature = "async-source")]
impl<T> ByteSource for AsyncByteSource<T> where
    T: tokio::io::AsyncRead + tokio::io::AsyncSeek + Unpin + Send
{
}
