//! Item model shared by directories and files
//!
//! Items are cheap values: an `Arc<Connection>` plus a [`SharePath`]. They
//! never hold a share handle; every remote call fetches the live handle from
//! the connection. Identity is the full address (server, share, path), so
//! two items built over different connections to the same share are equal.

use std::hash::{Hash, Hasher};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use shareline_core::{
    EntryKind, FileInfo, OpenDisposition, Operation, Result, ShareAddress, ShareError, ShareHandle,
    SharePath,
};

use crate::connection::Connection;
use crate::directory::ShareDirectory;
use crate::file::ShareFile;
use crate::stream::OpenFile;

/// Where an item lives: its connection and its path
#[derive(Clone)]
pub struct Location {
    connection: Arc<Connection>,
    path: SharePath,
}

impl Location {
    pub(crate) fn new(connection: Arc<Connection>, path: SharePath) -> Self {
        Self { connection, path }
    }

    pub fn connection(&self) -> &Arc<Connection> {
        &self.connection
    }

    pub fn path(&self) -> &SharePath {
        &self.path
    }

    pub fn address(&self) -> ShareAddress {
        ShareAddress::new(
            self.connection.server_name(),
            self.connection.share_name(),
            self.path.clone(),
        )
    }

    /// A location on the same connection
    pub(crate) fn with_path(&self, path: SharePath) -> Self {
        Self::new(Arc::clone(&self.connection), path)
    }

    pub(crate) fn share(&self) -> Result<Arc<dyn ShareHandle>> {
        self.connection.share()
    }

    pub(crate) fn stat(&self) -> Result<FileInfo> {
        self.share()?
            .stat(&self.path)
            .map_err(|e| ShareError::remote(Operation::Stat, self.path.as_string(), e))
    }

    /// Kind of whatever sits at this path, `None` if nothing does
    pub(crate) fn probe(&self) -> Result<Option<EntryKind>> {
        self.share()?
            .probe(&self.path)
            .map_err(|e| ShareError::remote(Operation::Stat, self.path.as_string(), e))
    }
}

impl PartialEq for Location {
    fn eq(&self, other: &Self) -> bool {
        self.connection.server_name() == other.connection.server_name()
            && self.connection.share_name() == other.connection.share_name()
            && self.path == other.path
    }
}

impl Eq for Location {}

impl Hash for Location {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.connection.server_name().hash(state);
        self.connection.share_name().hash(state);
        self.path.hash(state);
    }
}

impl std::fmt::Debug for Location {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.address().to_unc())
    }
}

/// Behaviour common to directories and files
pub trait ShareNode {
    fn location(&self) -> &Location;

    /// The kind this item was built as
    fn kind(&self) -> EntryKind;

    /// Whether an entry of this item's kind exists at its path
    fn exists(&self) -> Result<bool> {
        Ok(self.location().probe()? == Some(self.kind()))
    }

    /// Whether anything, of either kind, exists at this item's path
    fn is_present(&self) -> Result<bool> {
        Ok(self.location().probe()?.is_some())
    }

    /// Whether a directory exists at this item's path, whatever its kind
    fn is_directory(&self) -> Result<bool> {
        Ok(self.location().probe()? == Some(EntryKind::Directory))
    }

    /// Whether a file exists at this item's path, whatever its kind
    fn is_file(&self) -> Result<bool> {
        Ok(self.location().probe()? == Some(EntryKind::File))
    }

    /// Hidden attribute as the server reports it; `false` if it cannot be
    /// read
    fn is_hidden(&self) -> bool {
        match self.location().stat() {
            Ok(info) => info.hidden,
            Err(e) => {
                debug!("Cannot read attributes of {:?}: {}", self.location(), e);
                false
            }
        }
    }

    /// Last path segment, `""` for the share root
    fn name(&self) -> &str {
        self.location().path().name()
    }

    /// Share-relative path with `/` separators, `""` for the share root
    fn path(&self) -> String {
        self.location().path().as_string()
    }

    fn share_path(&self) -> &SharePath {
        self.location().path()
    }

    fn server_name(&self) -> &str {
        self.location().connection().server_name()
    }

    fn share_name(&self) -> &str {
        self.location().connection().share_name()
    }

    /// `\\server\share\path` with the share's native separator
    fn full_address(&self) -> String {
        self.location().address().to_unc()
    }

    fn address(&self) -> ShareAddress {
        self.location().address()
    }

    /// The enclosing directory. The share root is its own parent.
    fn parent(&self) -> ShareDirectory {
        let location = self.location();
        ShareDirectory::from_location(location.with_path(location.path().parent()))
    }

    /// The share root directory
    fn root(&self) -> ShareDirectory {
        ShareDirectory::from_location(self.location().with_path(SharePath::root()))
    }

    /// True for the share root and for entries directly inside it
    fn is_root(&self) -> bool {
        self.location().path().depth() <= 1
    }

    fn connection(&self) -> &Arc<Connection> {
        self.location().connection()
    }

    fn creation_time(&self) -> Result<DateTime<Utc>> {
        Ok(self.location().stat()?.created)
    }

    fn last_access_time(&self) -> Result<DateTime<Utc>> {
        Ok(self.location().stat()?.accessed)
    }

    fn last_write_time(&self) -> Result<DateTime<Utc>> {
        Ok(self.location().stat()?.written)
    }

    fn change_time(&self) -> Result<DateTime<Utc>> {
        Ok(self.location().stat()?.changed)
    }
}

/// A directory or a file
#[derive(Clone, Debug)]
pub enum ShareItem {
    Directory(ShareDirectory),
    File(ShareFile),
}

impl ShareItem {
    pub fn as_directory(&self) -> Option<&ShareDirectory> {
        match self {
            ShareItem::Directory(dir) => Some(dir),
            ShareItem::File(_) => None,
        }
    }

    pub fn as_file(&self) -> Option<&ShareFile> {
        match self {
            ShareItem::File(file) => Some(file),
            ShareItem::Directory(_) => None,
        }
    }

    pub fn into_directory(self) -> Option<ShareDirectory> {
        match self {
            ShareItem::Directory(dir) => Some(dir),
            ShareItem::File(_) => None,
        }
    }

    pub fn into_file(self) -> Option<ShareFile> {
        match self {
            ShareItem::File(file) => Some(file),
            ShareItem::Directory(_) => None,
        }
    }

    pub(crate) fn build(location: Location, kind: EntryKind) -> Self {
        match kind {
            EntryKind::Directory => ShareItem::Directory(ShareDirectory::from_location(location)),
            EntryKind::File => ShareItem::File(ShareFile::from_location(location)),
        }
    }
}

impl ShareNode for ShareItem {
    fn location(&self) -> &Location {
        match self {
            ShareItem::Directory(dir) => dir.location(),
            ShareItem::File(file) => file.location(),
        }
    }

    fn kind(&self) -> EntryKind {
        match self {
            ShareItem::Directory(_) => EntryKind::Directory,
            ShareItem::File(_) => EntryKind::File,
        }
    }
}

impl PartialEq for ShareItem {
    fn eq(&self, other: &Self) -> bool {
        self.location() == other.location()
    }
}

impl Eq for ShareItem {}

impl Hash for ShareItem {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.location().hash(state);
    }
}

impl From<ShareDirectory> for ShareItem {
    fn from(dir: ShareDirectory) -> Self {
        ShareItem::Directory(dir)
    }
}

impl From<ShareFile> for ShareItem {
    fn from(file: ShareFile) -> Self {
        ShareItem::File(file)
    }
}

/// Rename the entry at `location` to `new_name` in the same directory.
///
/// The rename is issued through a handle opened for it and closed right
/// after. Returns the new path; `location` itself is left untouched.
pub(crate) fn rename_entry(
    location: &Location,
    kind: EntryKind,
    new_name: &str,
    replace: bool,
) -> Result<SharePath> {
    let path = location.path();
    if path.is_root() {
        return Err(ShareError::InvalidName {
            path: String::new(),
            name: new_name.to_string(),
            reason: "the share root cannot be renamed",
        });
    }
    let target = path.sibling(new_name)?;

    let share = location.share()?;
    let opened = match kind {
        EntryKind::Directory => share.open_directory(path),
        EntryKind::File => share.open_file(path, OpenDisposition::Open),
    }
    .map_err(|e| ShareError::remote(Operation::Rename, path.as_string(), e))?;

    let mut handle = OpenFile::new(opened);
    let renamed = handle
        .get_mut()
        .and_then(|file| file.rename(&target, replace));
    if let Err(e) = handle.close() {
        warn!("Failed to close handle after renaming '{}': {}", path, e);
    }

    match renamed {
        Ok(()) => {
            debug!("Renamed '{}' to '{}'", path, target);
            Ok(target)
        }
        Err(e) if e.is_collision() => Err(ShareError::RenameConflict {
            path: path.as_string(),
            target: target.as_string(),
            source: e,
        }),
        Err(e) => Err(ShareError::remote(Operation::Rename, path.as_string(), e)),
    }
}
