//! Message bodies.
//!
//! # Design
//! A `Stream` owns a single `Resource` (an open I/O handle plus its open
//! mode) and performs every primitive operation through a `StreamAdapter`,
//! so tests can substitute failing primitives. Streams are the one stateful
//! piece of the message model: the read position moves, and the handle can
//! be closed or detached. Operations on a detached stream fail with an error
//! or report a neutral value (`size()` is `None`, `eof()` is `true`); they
//! never panic.
//!
//! Bodies are shared between message clones through `Arc<Stream>`, so the
//! handle sits behind a mutex and every method takes `&self`.

use std::fmt;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tempfile::SpooledTempFile;

use crate::error::StreamError;

/// Bytes kept in memory before a temporary resource spills to disk.
pub const TEMP_MEMORY_LIMIT: usize = 2 * 1024 * 1024;

/// Anything a `Resource` can wrap.
pub trait ResourceIo: Read + Write + Seek + Send + fmt::Debug {}

impl<T> ResourceIo for T where T: Read + Write + Seek + Send + fmt::Debug {}

/// An open I/O handle together with the mode it was opened in.
///
/// A resource stops being valid once it has been closed through an adapter.
#[derive(Debug)]
pub struct Resource {
    io: Option<Box<dyn ResourceIo>>,
    mode: String,
    uri: String,
    seekable: bool,
    eof: bool,
}

impl Resource {
    pub fn new(io: impl ResourceIo + 'static, mode: &str, uri: &str, seekable: bool) -> Self {
        Self {
            io: Some(Box::new(io)),
            mode: mode.to_string(),
            uri: uri.to_string(),
            seekable,
            eof: false,
        }
    }

    /// A temporary resource: memory-backed, spilling to a file past
    /// `TEMP_MEMORY_LIMIT`.
    pub fn temp(mode: &str) -> Self {
        Self::new(SpooledTempFile::new(TEMP_MEMORY_LIMIT), mode, "temp", true)
    }

    pub fn is_open(&self) -> bool {
        self.io.is_some()
    }

    fn io(&mut self) -> io::Result<&mut Box<dyn ResourceIo>> {
        self.io
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "resource is closed"))
    }
}

/// Metadata captured when a stream is constructed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamMetadata {
    pub mode: String,
    pub seekable: bool,
    pub uri: String,
}

impl StreamMetadata {
    pub fn is_readable(&self) -> bool {
        self.mode.contains('r') || self.mode.contains('+')
    }

    pub fn is_writable(&self) -> bool {
        self.mode.contains(['w', 'a', 'x', 'c', '+'])
    }
}

/// Primitive I/O operations used by `Stream` and `TempStreamFactory`.
pub trait StreamAdapter: Send + Sync + fmt::Debug {
    fn open_temp(&self, mode: &str) -> io::Result<Resource>;
    fn is_resource(&self, resource: &Resource) -> bool;
    fn read(&self, resource: &mut Resource, length: usize) -> io::Result<Vec<u8>>;
    fn write(&self, resource: &mut Resource, data: &[u8]) -> io::Result<usize>;
    /// Total size of the underlying data.
    fn size(&self, resource: &mut Resource) -> io::Result<u64>;
    fn tell(&self, resource: &mut Resource) -> io::Result<u64>;
    fn eof(&self, resource: &Resource) -> bool;
    fn seek(&self, resource: &mut Resource, pos: SeekFrom) -> io::Result<u64>;
    fn rewind(&self, resource: &mut Resource) -> io::Result<()>;
    /// Everything from the current position to the end.
    fn read_to_end(&self, resource: &mut Resource) -> io::Result<Vec<u8>>;
    fn metadata(&self, resource: &Resource) -> StreamMetadata;
    fn close(&self, resource: &mut Resource) -> io::Result<()>;
}

/// `StreamAdapter` over the resource's own `Read + Write + Seek`.
#[derive(Debug, Clone, Copy, Default)]
pub struct IoStreamAdapter;

impl StreamAdapter for IoStreamAdapter {
    fn open_temp(&self, mode: &str) -> io::Result<Resource> {
        Ok(Resource::temp(mode))
    }

    fn is_resource(&self, resource: &Resource) -> bool {
        resource.is_open()
    }

    fn read(&self, resource: &mut Resource, length: usize) -> io::Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(length.min(64 * 1024));
        let read = resource.io()?.take(length as u64).read_to_end(&mut buf)?;
        if read < length {
            resource.eof = true;
        }
        Ok(buf)
    }

    fn write(&self, resource: &mut Resource, data: &[u8]) -> io::Result<usize> {
        let io = resource.io()?;
        io.write_all(data)?;
        io.flush()?;
        resource.eof = false;
        Ok(data.len())
    }

    fn size(&self, resource: &mut Resource) -> io::Result<u64> {
        let io = resource.io()?;
        let pos = io.stream_position()?;
        let end = io.seek(SeekFrom::End(0))?;
        io.seek(SeekFrom::Start(pos))?;
        Ok(end)
    }

    fn tell(&self, resource: &mut Resource) -> io::Result<u64> {
        resource.io()?.stream_position()
    }

    fn eof(&self, resource: &Resource) -> bool {
        !resource.is_open() || resource.eof
    }

    fn seek(&self, resource: &mut Resource, pos: SeekFrom) -> io::Result<u64> {
        let offset = resource.io()?.seek(pos)?;
        resource.eof = false;
        Ok(offset)
    }

    fn rewind(&self, resource: &mut Resource) -> io::Result<()> {
        self.seek(resource, SeekFrom::Start(0)).map(|_| ())
    }

    fn read_to_end(&self, resource: &mut Resource) -> io::Result<Vec<u8>> {
        let mut buf = Vec::new();
        resource.io()?.read_to_end(&mut buf)?;
        resource.eof = true;
        Ok(buf)
    }

    fn metadata(&self, resource: &Resource) -> StreamMetadata {
        StreamMetadata {
            mode: resource.mode.clone(),
            seekable: resource.seekable,
            uri: resource.uri.clone(),
        }
    }

    fn close(&self, resource: &mut Resource) -> io::Result<()> {
        match resource.io.take() {
            Some(mut io) => io.flush(),
            None => Ok(()),
        }
    }
}

pub struct Stream {
    handle: Mutex<Option<Resource>>,
    adapter: Arc<dyn StreamAdapter>,
    metadata: StreamMetadata,
}

impl Stream {
    /// Wrap an open resource. Closed resources are rejected.
    pub fn new(resource: Resource, adapter: Arc<dyn StreamAdapter>) -> Result<Self, StreamError> {
        if !adapter.is_resource(&resource) {
            return Err(StreamError::InvalidResource);
        }
        let metadata = adapter.metadata(&resource);
        Ok(Self {
            handle: Mutex::new(Some(resource)),
            adapter,
            metadata,
        })
    }

    /// An empty, readable and writable temporary stream.
    pub fn empty() -> Self {
        let resource = Resource::temp("r+");
        let adapter: Arc<dyn StreamAdapter> = Arc::new(IoStreamAdapter);
        let metadata = adapter.metadata(&resource);
        Self {
            handle: Mutex::new(Some(resource)),
            adapter,
            metadata,
        }
    }

    /// A temporary stream holding `content`, positioned at the start.
    pub fn from_bytes(content: &[u8]) -> Result<Self, StreamError> {
        let stream = Self::empty();
        if !content.is_empty() {
            stream.write(content)?;
            stream.rewind()?;
        }
        Ok(stream)
    }

    fn lock(&self) -> MutexGuard<'_, Option<Resource>> {
        self.handle.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn with_resource<T>(
        &self,
        f: impl FnOnce(&dyn StreamAdapter, &mut Resource) -> Result<T, StreamError>,
    ) -> Result<T, StreamError> {
        let mut guard = self.lock();
        let resource = guard.as_mut().ok_or(StreamError::Detached)?;
        f(self.adapter.as_ref(), resource)
    }

    fn is_attached(&self) -> bool {
        self.lock().is_some()
    }

    /// Close the underlying resource. Later calls are no-ops.
    pub fn close(&self) {
        if let Some(mut resource) = self.lock().take() {
            if let Err(err) = self.adapter.close(&mut resource) {
                tracing::debug!(error = %err, "closing stream resource failed");
            }
        }
    }

    /// Hand the underlying resource to the caller without closing it.
    pub fn detach(&self) -> Option<Resource> {
        self.lock().take()
    }

    pub fn size(&self) -> Option<u64> {
        self.with_resource(|adapter, r| adapter.size(r).map_err(StreamError::io("Unable to stat stream")))
            .ok()
    }

    pub fn tell(&self) -> Result<u64, StreamError> {
        self.with_resource(|adapter, r| {
            adapter
                .tell(r)
                .map_err(StreamError::io("Unable to determine position of pointer"))
        })
    }

    pub fn eof(&self) -> bool {
        self.lock().as_ref().is_none_or(|r| self.adapter.eof(r))
    }

    pub fn is_seekable(&self) -> bool {
        self.is_attached() && self.metadata.seekable
    }

    pub fn seek(&self, pos: SeekFrom) -> Result<(), StreamError> {
        if !self.is_seekable() {
            return Err(StreamError::NotSeekable);
        }
        self.with_resource(|adapter, r| {
            adapter
                .seek(r, pos)
                .map(|_| ())
                .map_err(StreamError::io("Unable to seek in stream"))
        })
    }

    pub fn rewind(&self) -> Result<(), StreamError> {
        self.with_resource(|adapter, r| adapter.rewind(r).map_err(StreamError::io("Unable to rewind the stream")))
    }

    pub fn is_writable(&self) -> bool {
        self.is_attached() && self.metadata.is_writable()
    }

    pub fn write(&self, data: &[u8]) -> Result<usize, StreamError> {
        if !self.is_writable() {
            return Err(StreamError::NotWritable);
        }
        self.with_resource(|adapter, r| {
            adapter
                .write(r, data)
                .map_err(StreamError::io("Failed to write to the stream"))
        })
    }

    pub fn is_readable(&self) -> bool {
        self.is_attached() && self.metadata.is_readable()
    }

    pub fn read(&self, length: usize) -> Result<Vec<u8>, StreamError> {
        if !self.is_readable() {
            return Err(StreamError::NotReadable);
        }
        self.with_resource(|adapter, r| {
            adapter
                .read(r, length)
                .map_err(StreamError::io("Failed to read from the stream"))
        })
    }

    /// The remaining contents from the current position.
    pub fn contents(&self) -> Result<Vec<u8>, StreamError> {
        if !self.is_readable() {
            return Err(StreamError::NotReadable);
        }
        self.with_resource(|adapter, r| {
            adapter
                .read_to_end(r)
                .map_err(StreamError::io("Unable to read stream contents"))
        })
    }

    /// `None` once the stream is detached.
    pub fn metadata(&self) -> Option<&StreamMetadata> {
        self.is_attached().then_some(&self.metadata)
    }

    /// The whole stream from the start, or empty if it is not both readable
    /// and seekable. Never fails.
    pub fn to_bytes(&self) -> Vec<u8> {
        if !self.is_readable() || !self.is_seekable() {
            return Vec::new();
        }
        self.with_resource(|adapter, r| {
            adapter.rewind(r).map_err(StreamError::io("Unable to rewind the stream"))?;
            adapter
                .read_to_end(r)
                .map_err(StreamError::io("Unable to read stream contents"))
        })
        .unwrap_or_default()
    }
}

impl fmt::Display for Stream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&String::from_utf8_lossy(&self.to_bytes()))
    }
}

impl fmt::Debug for Stream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stream")
            .field("attached", &self.is_attached())
            .field("metadata", &self.metadata)
            .finish()
    }
}

impl Drop for Stream {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn write_rewind_read() {
        let stream = Stream::empty();
        assert_eq!(stream.write(b"Hello, World!").unwrap(), 13);
        stream.rewind().unwrap();
        assert_eq!(stream.read(13).unwrap(), b"Hello, World!");
    }

    #[test]
    fn from_bytes_is_positioned_at_start() {
        let stream = Stream::from_bytes(b"abc").unwrap();
        assert_eq!(stream.tell().unwrap(), 0);
        assert_eq!(stream.size(), Some(3));
        assert_eq!(stream.contents().unwrap(), b"abc");
    }

    #[test]
    fn eof_after_reading_past_end() {
        let stream = Stream::from_bytes(b"abc").unwrap();
        assert!(!stream.eof());
        assert_eq!(stream.read(10).unwrap(), b"abc");
        assert!(stream.eof());
        stream.rewind().unwrap();
        assert!(!stream.eof());
    }

    #[test]
    fn seek_and_tell() {
        let stream = Stream::from_bytes(b"0123456789").unwrap();
        stream.seek(SeekFrom::Start(4)).unwrap();
        assert_eq!(stream.tell().unwrap(), 4);
        assert_eq!(stream.read(2).unwrap(), b"45");
        stream.seek(SeekFrom::End(-1)).unwrap();
        assert_eq!(stream.read(5).unwrap(), b"9");
    }

    #[test]
    fn display_reads_from_start() {
        let stream = Stream::from_bytes(b"payload").unwrap();
        stream.read(3).unwrap();
        assert_eq!(stream.to_string(), "payload");
    }

    #[test]
    fn closed_resource_is_rejected() {
        let adapter = IoStreamAdapter;
        let mut resource = adapter.open_temp("r+").unwrap();
        adapter.close(&mut resource).unwrap();
        let err = Stream::new(resource, Arc::new(adapter)).unwrap_err();
        assert!(matches!(err, StreamError::InvalidResource));
        assert_eq!(err.to_string(), "Stream must be a valid resource");
    }

    #[test]
    fn detached_stream_fails_predictably() {
        let stream = Stream::from_bytes(b"abc").unwrap();
        let resource = stream.detach().unwrap();
        assert!(resource.is_open());
        assert_eq!(stream.size(), None);
        assert!(stream.eof());
        assert!(stream.tell().is_err());
        assert!(matches!(stream.read(1), Err(StreamError::NotReadable)));
        assert!(matches!(stream.write(b"x"), Err(StreamError::NotWritable)));
        assert!(stream.metadata().is_none());
        assert_eq!(stream.to_string(), "");
        assert!(stream.detach().is_none());
    }

    #[test]
    fn detached_resource_can_back_a_new_stream() {
        let stream = Stream::from_bytes(b"moved").unwrap();
        let resource = stream.detach().unwrap();
        let moved = Stream::new(resource, Arc::new(IoStreamAdapter)).unwrap();
        assert_eq!(moved.to_string(), "moved");
    }

    #[test]
    fn close_is_idempotent() {
        let stream = Stream::from_bytes(b"abc").unwrap();
        stream.close();
        stream.close();
        assert!(stream.eof());
        assert!(matches!(stream.rewind(), Err(StreamError::Detached)));
    }

    #[test]
    fn read_only_mode_rejects_writes() {
        let resource = Resource::new(Cursor::new(b"data".to_vec()), "r", "memory", true);
        let stream = Stream::new(resource, Arc::new(IoStreamAdapter)).unwrap();
        assert!(stream.is_readable());
        assert!(!stream.is_writable());
        assert!(matches!(stream.write(b"x"), Err(StreamError::NotWritable)));
        assert_eq!(stream.read(4).unwrap(), b"data");
    }

    #[test]
    fn write_only_mode_renders_empty() {
        let resource = Resource::new(Cursor::new(Vec::new()), "w", "memory", true);
        let stream = Stream::new(resource, Arc::new(IoStreamAdapter)).unwrap();
        stream.write(b"hidden").unwrap();
        assert!(matches!(stream.read(1), Err(StreamError::NotReadable)));
        assert_eq!(stream.to_string(), "");
    }

    #[test]
    fn non_seekable_stream_refuses_seek() {
        let resource = Resource::new(Cursor::new(b"x".to_vec()), "r", "pipe", false);
        let stream = Stream::new(resource, Arc::new(IoStreamAdapter)).unwrap();
        assert!(matches!(stream.seek(SeekFrom::Start(0)), Err(StreamError::NotSeekable)));
        assert_eq!(stream.to_string(), "");
    }

    #[derive(Debug)]
    struct FailingWrites;

    impl StreamAdapter for FailingWrites {
        fn open_temp(&self, mode: &str) -> io::Result<Resource> {
            IoStreamAdapter.open_temp(mode)
        }
        fn is_resource(&self, resource: &Resource) -> bool {
            IoStreamAdapter.is_resource(resource)
        }
        fn read(&self, resource: &mut Resource, length: usize) -> io::Result<Vec<u8>> {
            IoStreamAdapter.read(resource, length)
        }
        fn write(&self, _: &mut Resource, _: &[u8]) -> io::Result<usize> {
            Err(io::Error::other("disk full"))
        }
        fn size(&self, resource: &mut Resource) -> io::Result<u64> {
            IoStreamAdapter.size(resource)
        }
        fn tell(&self, _: &mut Resource) -> io::Result<u64> {
            Err(io::Error::other("no position"))
        }
        fn eof(&self, resource: &Resource) -> bool {
            IoStreamAdapter.eof(resource)
        }
        fn seek(&self, resource: &mut Resource, pos: SeekFrom) -> io::Result<u64> {
            IoStreamAdapter.seek(resource, pos)
        }
        fn rewind(&self, resource: &mut Resource) -> io::Result<()> {
            IoStreamAdapter.rewind(resource)
        }
        fn read_to_end(&self, resource: &mut Resource) -> io::Result<Vec<u8>> {
            IoStreamAdapter.read_to_end(resource)
        }
        fn metadata(&self, resource: &Resource) -> StreamMetadata {
            IoStreamAdapter.metadata(resource)
        }
        fn close(&self, resource: &mut Resource) -> io::Result<()> {
            IoStreamAdapter.close(resource)
        }
    }

    #[test]
    fn primitive_failures_are_described() {
        let adapter = FailingWrites;
        let resource = adapter.open_temp("r+").unwrap();
        let stream = Stream::new(resource, Arc::new(adapter)).unwrap();
        let err = stream.write(b"x").unwrap_err();
        assert!(err.to_string().starts_with("Failed to write to the stream"));
        let err = stream.tell().unwrap_err();
        assert!(err.to_string().starts_with("Unable to determine position of pointer"));
    }
}
