//! Files on a share

use std::sync::Arc;

use tracing::debug;

use shareline_core::{
    EntryKind, OpenDisposition, Operation, Result, ShareError, SharePath, TransportError,
};

use crate::connection::Connection;
use crate::item::{rename_entry, Location, ShareNode};
use crate::stream::{OpenFile, ShareReader, ShareWriter};

/// A file at a path within one connection's share
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ShareFile {
    location: Location,
}

impl ShareFile {
    /// Parse `path` and address the file there; nothing is checked remotely
    pub fn new(connection: Arc<Connection>, path: &str) -> Result<Self> {
        Ok(Self::at(connection, SharePath::parse(path)?))
    }

    pub fn at(connection: Arc<Connection>, path: SharePath) -> Self {
        Self::from_location(Location::new(connection, path))
    }

    pub(crate) fn from_location(location: Location) -> Self {
        Self { location }
    }

    /// Create the file, truncating it if it exists
    pub fn create_file(&self) -> Result<()> {
        let file = self.open(OpenDisposition::OverwriteIf, Operation::CreateFile)?;
        file.close()
            .map_err(|e| self.error(Operation::Close, e))?;
        debug!("Created file '{}'", self.location.path());
        Ok(())
    }

    pub fn delete_file(&self) -> Result<()> {
        let path = self.location.path();
        self.location
            .share()?
            .delete_file(path)
            .map_err(|e| self.error(Operation::DeleteFile, e))?;
        debug!("Deleted file '{}'", path);
        Ok(())
    }

    /// Open the file for reading
    pub fn input_stream(&self) -> Result<ShareReader> {
        let mut file = self.open(OpenDisposition::Open, Operation::Read)?;
        let stream = file
            .get_mut()
            .and_then(|f| f.read_stream())
            .map_err(|e| self.error(Operation::Read, e))?;
        Ok(ShareReader::new(stream, file, self.path()))
    }

    /// Open the file for writing, replacing its content
    pub fn output_stream(&self) -> Result<ShareWriter> {
        self.output_stream_with(false)
    }

    /// Open the file for writing.
    ///
    /// With `append` the file is created if missing and every write lands at
    /// its end; otherwise the file is created or truncated.
    pub fn output_stream_with(&self, append: bool) -> Result<ShareWriter> {
        let disposition = if append {
            OpenDisposition::OpenIf
        } else {
            OpenDisposition::OverwriteIf
        };
        let mut file = self.open(disposition, Operation::Write)?;
        let stream = file
            .get_mut()
            .and_then(|f| f.write_stream(append))
            .map_err(|e| self.error(Operation::Write, e))?;
        Ok(ShareWriter::new(stream, file, self.path(), append))
    }

    /// Have the server copy this file's content into `destination`.
    ///
    /// Both files must live on the same server and share. The destination is
    /// created or truncated.
    pub fn copy_via_server_side_copy(&self, destination: &ShareFile) -> Result<()> {
        if self.server_name() != destination.server_name()
            || self.share_name() != destination.share_name()
        {
            return Err(self.error(
                Operation::Copy,
                TransportError::CrossShare(destination.full_address()),
            ));
        }

        let mut source = self.open(OpenDisposition::Open, Operation::Copy)?;
        let mut target = destination.open(OpenDisposition::OverwriteIf, Operation::Copy)?;

        let copied = match (source.get_mut(), target.get_mut()) {
            (Ok(src), Ok(dst)) => src.remote_copy_to(dst),
            (Err(e), _) | (_, Err(e)) => Err(e),
        };
        let target_closed = target.close();
        let source_closed = source.close();

        copied
            .and(target_closed)
            .and(source_closed)
            .map_err(|e| self.error(Operation::Copy, e))?;
        debug!(
            "Copied '{}' to '{}' on the server",
            self.location.path(),
            destination.location.path()
        );
        Ok(())
    }

    /// End-of-file offset in bytes
    pub fn size(&self) -> Result<u64> {
        Ok(self.location.stat()?.size)
    }

    /// Rename this file within its directory.
    ///
    /// Returns the file at its new path; `self` keeps addressing the old one.
    pub fn rename_to(&self, new_name: &str, replace_if_exists: bool) -> Result<ShareFile> {
        let target = rename_entry(&self.location, EntryKind::File, new_name, replace_if_exists)?;
        Ok(Self::from_location(self.location.with_path(target)))
    }

    fn open(&self, disposition: OpenDisposition, operation: Operation) -> Result<OpenFile> {
        let file = self
            .location
            .share()?
            .open_file(self.location.path(), disposition)
            .map_err(|e| self.error(operation, e))?;
        Ok(OpenFile::new(file))
    }

    fn error(&self, operation: Operation, source: TransportError) -> ShareError {
        ShareError::remote(operation, self.location.path().as_string(), source)
    }
}

impl ShareNode for ShareFile {
    fn location(&self) -> &Location {
        &self.location
    }

    fn kind(&self) -> EntryKind {
        EntryKind::File
    }
}
