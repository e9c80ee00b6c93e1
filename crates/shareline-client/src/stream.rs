//! Byte streams over remote files
//!
//! A stream owns both the transport stream and the file handle it was opened
//! from. Closing releases the stream first, then the handle, and that happens
//! exactly once: either through an explicit `close` or on drop.

use std::io::{self, Read, Write};

use tracing::warn;

use shareline_core::{ReadStream, RemoteFile, TransportError, TransportResult, WriteStream};

/// An open remote handle that is closed when the guard goes away
pub(crate) struct OpenFile {
    file: Option<Box<dyn RemoteFile>>,
}

impl OpenFile {
    pub(crate) fn new(file: Box<dyn RemoteFile>) -> Self {
        Self { file: Some(file) }
    }

    pub(crate) fn get_mut(&mut self) -> TransportResult<&mut dyn RemoteFile> {
        match self.file.as_mut() {
            Some(file) => Ok(file.as_mut()),
            None => Err(TransportError::Closed),
        }
    }

    /// Close the handle now and report the result
    pub(crate) fn close(mut self) -> TransportResult<()> {
        self.close_inner()
    }

    fn close_inner(&mut self) -> TransportResult<()> {
        match self.file.take() {
            Some(mut file) => file.close(),
            None => Ok(()),
        }
    }
}

impl Drop for OpenFile {
    fn drop(&mut self) {
        if let Some(file) = self.file.as_ref() {
            let path = file.path().to_string();
            if let Err(e) = self.close_inner() {
                warn!("Failed to close remote handle for '{}': {}", path, e);
            }
        }
    }
}

/// Close a stream, then its file; the first failure is reported but both
/// are always attempted
fn close_pair(stream: io::Result<()>, file: OpenFile) -> io::Result<()> {
    let file = file.close().map_err(io::Error::from);
    stream.and(file)
}

/// Reader over a remote file
pub struct ShareReader {
    inner: Option<(Box<dyn ReadStream>, OpenFile)>,
    path: String,
}

impl ShareReader {
    pub(crate) fn new(stream: Box<dyn ReadStream>, file: OpenFile, path: String) -> Self {
        Self {
            inner: Some((stream, file)),
            path,
        }
    }

    /// Share-relative path of the file being read
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Close the stream and the file handle.
    ///
    /// Calling it again after a successful close is a no-op.
    pub fn close(&mut self) -> io::Result<()> {
        match self.inner.take() {
            Some((mut stream, file)) => close_pair(stream.close(), file),
            None => Ok(()),
        }
    }
}

impl Read for ShareReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.inner.as_mut() {
            Some((stream, _)) => stream.read(buf),
            None => Err(TransportError::Closed.into()),
        }
    }
}

impl Drop for ShareReader {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!("Failed to close reader for '{}': {}", self.path, e);
        }
    }
}

impl std::fmt::Debug for ShareReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShareReader")
            .field("path", &self.path)
            .field("open", &self.inner.is_some())
            .finish()
    }
}

/// Writer over a remote file
pub struct ShareWriter {
    inner: Option<(Box<dyn WriteStream>, OpenFile)>,
    path: String,
    append: bool,
}

impl ShareWriter {
    pub(crate) fn new(stream: Box<dyn WriteStream>, file: OpenFile, path: String, append: bool) -> Self {
        Self {
            inner: Some((stream, file)),
            path,
            append,
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Whether every write lands at the end of the file
    pub fn is_append(&self) -> bool {
        self.append
    }

    /// Write at an absolute offset.
    ///
    /// Not available on append streams, where the server places every write
    /// at the end of the file.
    pub fn write_at(&mut self, offset: u64, buf: &[u8]) -> io::Result<usize> {
        if self.append {
            return Err(io::Error::new(
                io::ErrorKind::Unsupported,
                "positional writes are not available on an append stream",
            ));
        }
        self.stream()?.write_at(offset, buf)
    }

    /// Flush, then close the stream and the file handle.
    ///
    /// Calling it again after a close is a no-op.
    pub fn close(&mut self) -> io::Result<()> {
        match self.inner.take() {
            Some((mut stream, file)) => {
                let flushed = stream.flush();
                let closed = stream.close();
                close_pair(flushed.and(closed), file)
            }
            None => Ok(()),
        }
    }

    fn stream(&mut self) -> io::Result<&mut Box<dyn WriteStream>> {
        match self.inner.as_mut() {
            Some((stream, _)) => Ok(stream),
            None => Err(TransportError::Closed.into()),
        }
    }
}

impl Write for ShareWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.stream()?.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.stream()?.flush()
    }
}

impl Drop for ShareWriter {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!("Failed to close writer for '{}': {}", self.path, e);
        }
    }
}

impl std::fmt::Debug for ShareWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShareWriter")
            .field("path", &self.path)
            .field("append", &self.append)
            .field("open", &self.inner.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryTransport;
    use shareline_core::{ConnectionConfig, Credentials, OpenDisposition, SharePath, ShareTransport};

    fn open(transport: &MemoryTransport, path: &str, disposition: OpenDisposition) -> OpenFile {
        let mut session = transport
            .connect("fileserver", &ConnectionConfig::default())
            .unwrap();
        let share = session
            .authenticate_and_bind(&Credentials::anonymous(), "data")
            .unwrap();
        let file = share
            .open_file(&SharePath::parse(path).unwrap(), disposition)
            .unwrap();
        OpenFile::new(file)
    }

    fn reader(transport: &MemoryTransport, path: &str) -> ShareReader {
        let mut file = open(transport, path, OpenDisposition::Open);
        let stream = file.get_mut().unwrap().read_stream().unwrap();
        ShareReader::new(stream, file, path.to_string())
    }

    fn writer(transport: &MemoryTransport, path: &str, append: bool) -> ShareWriter {
        let disposition = if append {
            OpenDisposition::OpenIf
        } else {
            OpenDisposition::OverwriteIf
        };
        let mut file = open(transport, path, disposition);
        let stream = file.get_mut().unwrap().write_stream(append).unwrap();
        ShareWriter::new(stream, file, path.to_string(), append)
    }

    fn transport() -> MemoryTransport {
        MemoryTransport::new("fileserver").with_share("data")
    }

    #[test]
    fn test_open_file_guard_closes_on_drop() {
        let transport = transport();
        transport.put_file("data", "a.txt", b"a").unwrap();
        drop(open(&transport, "a.txt", OpenDisposition::Open));

        let stats = transport.stats();
        assert_eq!(stats.files_opened, 1);
        assert_eq!(stats.files_closed, 1);
    }

    #[test]
    fn test_reader_closes_stream_and_file_once() {
        let transport = transport();
        transport.put_file("data", "a.txt", b"hello").unwrap();

        let mut reader = reader(&transport, "a.txt");
        let mut content = String::new();
        reader.read_to_string(&mut content).unwrap();
        assert_eq!(content, "hello");

        reader.close().unwrap();
        reader.close().unwrap();
        assert!(reader.read(&mut [0u8; 4]).is_err());
        drop(reader);

        let stats = transport.stats();
        assert_eq!(stats.streams_closed, 1);
        assert_eq!(stats.files_closed, 1);
    }

    #[test]
    fn test_writer_closes_after_failed_write() {
        let transport = transport();
        let mut writer = writer(&transport, "out.bin", false);
        writer.write_all(b"first").unwrap();

        transport.set_fail_writes(true);
        assert!(writer.write_all(b"second").is_err());
        transport.set_fail_writes(false);
        drop(writer);

        let stats = transport.stats();
        assert_eq!(stats.open_streams(), 0);
        assert_eq!(stats.open_files(), 0);
        assert_eq!(transport.file_content("data", "out.bin"), Some(b"first".to_vec()));
    }

    #[test]
    fn test_append_writer_rejects_positional_writes() {
        let transport = transport();
        transport.put_file("data", "log.txt", b"one").unwrap();

        let mut writer = writer(&transport, "log.txt", true);
        assert!(writer.is_append());
        let err = writer.write_at(0, b"x").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::Unsupported);

        writer.write_all(b"two").unwrap();
        writer.close().unwrap();
        assert_eq!(transport.file_content("data", "log.txt"), Some(b"onetwo".to_vec()));
    }

    #[test]
    fn test_positional_write() {
        let transport = transport();
        let mut writer = writer(&transport, "block.bin", false);
        writer.write_all(b"aaaa").unwrap();
        writer.write_at(1, b"bb").unwrap();
        writer.close().unwrap();

        assert_eq!(transport.file_content("data", "block.bin"), Some(b"abba".to_vec()));
    }

    #[test]
    fn test_write_far_past_end_fails() {
        let transport = transport();
        let mut writer = writer(&transport, "big.bin", false);
        writer.write_all(b"ab").unwrap();

        assert!(writer.write_at(u64::MAX, b"x").is_err());
        assert!(writer.write_at(u64::MAX - 1, b"xyz").is_err());
        assert!(writer.write_at(1 << 40, b"x").is_err());
        writer.close().unwrap();

        assert_eq!(transport.file_content("data", "big.bin"), Some(b"ab".to_vec()));
        assert_eq!(transport.stats().open_files(), 0);
    }
}
