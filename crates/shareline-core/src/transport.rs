//! Share transport traits
//!
//! The transport owns the wire protocol: handshake, authentication, framing
//! and signing. Shareline consumes it through the traits below, from the
//! outside in:
//!
//! ```text
//! ShareTransport ──connect──▶ TransportSession ──authenticate_and_bind──▶ ShareHandle
//!                                                                          │
//!                                              open_file / open_directory  ▼
//!                                                                      RemoteFile
//!                                                        read_stream / write_stream
//!                                                                          ▼
//!                                                              ReadStream / WriteStream
//! ```
//!
//! Every call blocks until the server answered. A transport reports failures
//! as [`TransportError`]; the client wraps them with the operation and path.

use std::io;
use std::sync::Arc;

use crate::config::ConnectionConfig;
use crate::error::TransportError;
use crate::path::SharePath;
use crate::types::{Credentials, EntryKind, FileInfo, OpenDisposition, RawEntry};

/// Result type for transport calls
pub type TransportResult<T> = Result<T, TransportError>;

/// Entry point of a transport: opens sessions to servers
pub trait ShareTransport: Send + Sync {
    /// Open an unauthenticated session to `server`
    fn connect(&self, server: &str, config: &ConnectionConfig) -> TransportResult<Box<dyn TransportSession>>;
}

/// A transport-level connection to one server
pub trait TransportSession: Send + Sync {
    /// Whether the underlying connection is still up
    fn is_connected(&self) -> bool;

    /// Authenticate and bind a share, yielding the handle all remote
    /// operations are issued through
    fn authenticate_and_bind(
        &mut self,
        credentials: &Credentials,
        share: &str,
    ) -> TransportResult<Arc<dyn ShareHandle>>;

    /// Close the connection and everything bound through it
    fn close(&mut self) -> TransportResult<()>;
}

/// A connected share
pub trait ShareHandle: Send + Sync {
    fn share_name(&self) -> &str;

    /// Whether the share binding is still up
    fn is_connected(&self) -> bool;

    /// Enumerate the raw entries of a directory, `.` and `..` included if the
    /// server reports them
    fn list(&self, path: &SharePath) -> TransportResult<Vec<RawEntry>>;

    fn stat(&self, path: &SharePath) -> TransportResult<FileInfo>;

    /// Kind of the entry at `path`, `None` if nothing is there
    fn probe(&self, path: &SharePath) -> TransportResult<Option<EntryKind>> {
        match self.stat(path) {
            Ok(info) => Ok(Some(info.kind)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn mkdir(&self, path: &SharePath) -> TransportResult<()>;

    fn rmdir(&self, path: &SharePath, recursive: bool) -> TransportResult<()>;

    fn delete_file(&self, path: &SharePath) -> TransportResult<()>;

    fn open_file(&self, path: &SharePath, disposition: OpenDisposition) -> TransportResult<Box<dyn RemoteFile>>;

    fn open_directory(&self, path: &SharePath) -> TransportResult<Box<dyn RemoteFile>>;
}

/// An open remote file or directory handle.
///
/// Handles consume server resources until closed; callers must call
/// [`RemoteFile::close`] on every path.
pub trait RemoteFile: Send {
    fn share_name(&self) -> &str;

    fn path(&self) -> &SharePath;

    fn kind(&self) -> EntryKind;

    fn read_stream(&mut self) -> TransportResult<Box<dyn ReadStream>>;

    /// Open a write stream. With `append` every write lands at the end of the
    /// file regardless of offsets.
    fn write_stream(&mut self, append: bool) -> TransportResult<Box<dyn WriteStream>>;

    /// Rename the entry behind this handle to `target` (same share)
    fn rename(&mut self, target: &SharePath, replace: bool) -> TransportResult<()>;

    /// Have the server copy this file's content into `destination`
    fn remote_copy_to(&mut self, destination: &mut dyn RemoteFile) -> TransportResult<()>;

    fn close(&mut self) -> TransportResult<()>;
}

/// Sequential read stream of an open file
pub trait ReadStream: io::Read + Send {
    fn close(&mut self) -> io::Result<()>;
}

/// Write stream of an open file
pub trait WriteStream: io::Write + Send {
    /// Write at an absolute file offset
    fn write_at(&mut self, offset: u64, buf: &[u8]) -> io::Result<usize>;

    fn close(&mut self) -> io::Result<()>;
}
