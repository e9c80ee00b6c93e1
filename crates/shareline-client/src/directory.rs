//! Directories on a share

use std::sync::Arc;

use regex::Regex;
use tracing::{debug, info};

use shareline_core::{EntryKind, Operation, Result, ShareError, SharePath, TransportError};

use crate::connection::Connection;
use crate::file::ShareFile;
use crate::item::{rename_entry, Location, ShareItem, ShareNode};
use crate::traversal;

/// A directory at a path within one connection's share
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ShareDirectory {
    location: Location,
}

impl ShareDirectory {
    /// The share root
    pub fn root(connection: Arc<Connection>) -> Self {
        Self::at(connection, SharePath::root())
    }

    /// Parse `path` and address the directory there; nothing is checked
    /// remotely
    pub fn new(connection: Arc<Connection>, path: &str) -> Result<Self> {
        Ok(Self::at(connection, SharePath::parse(path)?))
    }

    pub fn at(connection: Arc<Connection>, path: SharePath) -> Self {
        Self::from_location(Location::new(connection, path))
    }

    pub(crate) fn from_location(location: Location) -> Self {
        Self { location }
    }

    /// Create this directory. Its parent must exist.
    pub fn create_directory(&self) -> Result<()> {
        let path = self.location.path();
        self.location
            .share()?
            .mkdir(path)
            .map_err(|e| ShareError::remote(Operation::CreateDirectory, path.as_string(), e))?;
        debug!("Created directory '{}'", path);
        Ok(())
    }

    /// Create the directory `name` inside this one
    pub fn create_directory_in_current_directory(&self, name: &str) -> Result<ShareDirectory> {
        let dir = self.child_directory(name)?;
        dir.create_directory()?;
        Ok(dir)
    }

    /// Create (or truncate) the file `name` inside this one
    pub fn create_file_in_current_directory(&self, name: &str) -> Result<ShareFile> {
        let file = ShareFile::from_location(self.location.with_path(self.location.path().child(name)?));
        file.create_file()?;
        Ok(file)
    }

    /// Create this directory if nothing is there yet.
    ///
    /// Fails with [`ShareError::StateConflict`] if a file occupies the path.
    pub fn ensure_exists(&self) -> Result<()> {
        match self.location.probe()? {
            Some(EntryKind::Directory) => Ok(()),
            Some(EntryKind::File) => Err(ShareError::StateConflict {
                path: self.location.path().as_string(),
                expected: EntryKind::Directory,
            }),
            None => self.create_directory(),
        }
    }

    /// Delete this directory and everything beneath it
    pub fn delete_directory_recursively(&self) -> Result<()> {
        let path = self.location.path();
        if path.is_root() {
            return Err(ShareError::remote(
                Operation::DeleteDirectory,
                "",
                TransportError::AccessDenied("the share root cannot be deleted".into()),
            ));
        }
        self.location
            .share()?
            .rmdir(path, true)
            .map_err(|e| ShareError::remote(Operation::DeleteDirectory, path.as_string(), e))?;
        info!("Deleted directory '{}' recursively", path);
        Ok(())
    }

    /// Immediate subdirectories, sorted by path
    pub fn get_directories(&self) -> Result<Vec<ShareDirectory>> {
        Ok(self
            .list_files(|item: &ShareItem| item.kind() == EntryKind::Directory, false)?
            .into_iter()
            .filter_map(ShareItem::into_directory)
            .collect())
    }

    /// Immediate files, sorted by path
    pub fn get_files(&self) -> Result<Vec<ShareFile>> {
        Ok(self
            .list_files(|item: &ShareItem| item.kind() == EntryKind::File, false)?
            .into_iter()
            .filter_map(ShareItem::into_file)
            .collect())
    }

    /// Entries accepted by `predicate`, optionally descending into every
    /// subdirectory. Subdirectories are descended whether or not the
    /// predicate accepts them.
    pub fn list_files<P>(&self, predicate: P, recursive: bool) -> Result<Vec<ShareItem>>
    where
        P: Fn(&ShareItem) -> bool,
    {
        traversal::list(&self.location, &predicate, recursive)
    }

    /// Entries whose name fully matches the regular expression `pattern`
    pub fn list_files_matching(&self, pattern: &str, recursive: bool) -> Result<Vec<ShareItem>> {
        let regex = Regex::new(&format!("^(?:{})$", pattern)).map_err(|e| ShareError::InvalidPattern {
            pattern: pattern.to_string(),
            reason: e.to_string(),
        })?;
        self.list_files(|item: &ShareItem| regex.is_match(item.name()), recursive)
    }

    /// Rename this directory within its parent.
    ///
    /// Returns the directory at its new path; `self` keeps addressing the
    /// old one.
    pub fn rename_to(&self, new_name: &str, replace_if_exists: bool) -> Result<ShareDirectory> {
        let target = rename_entry(&self.location, EntryKind::Directory, new_name, replace_if_exists)?;
        Ok(Self::from_location(self.location.with_path(target)))
    }

    fn child_directory(&self, name: &str) -> Result<ShareDirectory> {
        Ok(Self::from_location(self.location.with_path(self.location.path().child(name)?)))
    }
}

impl ShareNode for ShareDirectory {
    fn location(&self) -> &Location {
        &self.location
    }

    fn kind(&self) -> EntryKind {
        EntryKind::Directory
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shareline_core::Credentials;

    use crate::memory::MemoryTransport;

    fn setup() -> (MemoryTransport, ShareDirectory) {
        let transport = MemoryTransport::new("fileserver").with_share("data");
        let conn = transport
            .open_connection("data", Credentials::anonymous())
            .unwrap();
        (transport, ShareDirectory::root(conn))
    }

    fn names(items: &[ShareItem]) -> Vec<String> {
        items.iter().map(|item| item.path()).collect()
    }

    #[test]
    fn test_create_and_list_children() {
        let (transport, root) = setup();
        let dir = root.create_directory_in_current_directory("Dir1").unwrap();
        dir.create_file_in_current_directory("b.txt").unwrap();
        dir.create_file_in_current_directory("a.txt").unwrap();
        dir.create_directory_in_current_directory("Sub").unwrap();

        let files: Vec<String> = dir.get_files().unwrap().iter().map(|f| f.path()).collect();
        assert_eq!(files, vec!["Dir1/a.txt", "Dir1/b.txt"]);

        let dirs: Vec<String> = dir.get_directories().unwrap().iter().map(|d| d.path()).collect();
        assert_eq!(dirs, vec!["Dir1/Sub"]);

        assert_eq!(transport.stats().open_files(), 0);
    }

    #[test]
    fn test_create_file_overwrites() {
        let (transport, root) = setup();
        transport.put_file("data", "a.txt", b"old content").unwrap();

        let file = root.create_file_in_current_directory("a.txt").unwrap();
        assert_eq!(file.size().unwrap(), 0);
    }

    #[test]
    fn test_create_rejects_invalid_names() {
        let (_transport, root) = setup();
        for bad in ["", ".", "..", "a/b", "a\\b"] {
            assert!(matches!(
                root.create_directory_in_current_directory(bad),
                Err(ShareError::InvalidName { .. })
            ));
        }
    }

    #[test]
    fn test_create_existing_directory_fails() {
        let (_transport, root) = setup();
        root.create_directory_in_current_directory("Dir1").unwrap();
        assert!(matches!(
            root.create_directory_in_current_directory("Dir1"),
            Err(ShareError::RemoteOperation {
                operation: Operation::CreateDirectory,
                source: TransportError::AlreadyExists(_),
                ..
            })
        ));
    }

    #[test]
    fn test_ensure_exists_is_idempotent() {
        let (_transport, root) = setup();
        let dir = ShareDirectory::new(Arc::clone(root.connection()), "Dir1").unwrap();

        dir.ensure_exists().unwrap();
        dir.ensure_exists().unwrap();
        assert!(dir.exists().unwrap());
        assert!(root.ensure_exists().is_ok());
    }

    #[test]
    fn test_ensure_exists_conflicts_with_file() {
        let (transport, root) = setup();
        transport.put_file("data", "occupied", b"").unwrap();
        let dir = ShareDirectory::new(Arc::clone(root.connection()), "occupied").unwrap();

        assert!(matches!(
            dir.ensure_exists(),
            Err(ShareError::StateConflict {
                expected: EntryKind::Directory,
                ..
            })
        ));
    }

    #[test]
    fn test_delete_recursively() {
        let (transport, root) = setup();
        transport.put_dir("data", "Dir1/Dir2").unwrap();
        transport.put_file("data", "Dir1/Dir2/f.txt", b"x").unwrap();

        let dir = ShareDirectory::new(Arc::clone(root.connection()), "Dir1").unwrap();
        dir.delete_directory_recursively().unwrap();
        assert!(!dir.exists().unwrap());
        assert!(root.delete_directory_recursively().is_err());
    }

    #[test]
    fn test_list_missing_directory_fails() {
        let (_transport, root) = setup();
        let dir = ShareDirectory::new(Arc::clone(root.connection()), "missing").unwrap();
        assert!(matches!(
            dir.get_files(),
            Err(ShareError::RemoteOperation {
                operation: Operation::List,
                ..
            })
        ));
    }

    #[test]
    fn test_pattern_is_full_match() {
        let (transport, root) = setup();
        transport.put_dir("data", "Dir1").unwrap();
        transport.put_dir("data", "Dir10").unwrap();
        transport.put_dir("data", "MyDir1").unwrap();

        let found = root.list_files_matching("Dir1", false).unwrap();
        assert_eq!(names(&found), vec!["Dir1"]);

        let found = root.list_files_matching("Dir1.*", false).unwrap();
        assert_eq!(names(&found), vec!["Dir1", "Dir10"]);

        assert!(matches!(
            root.list_files_matching("(", false),
            Err(ShareError::InvalidPattern { .. })
        ));
    }

    #[test]
    fn test_rename_directory() {
        let (transport, root) = setup();
        transport.put_dir("data", "Old/Inner").unwrap();
        let old = ShareDirectory::new(Arc::clone(root.connection()), "Old").unwrap();

        let renamed = old.rename_to("New", false).unwrap();
        assert_eq!(renamed.path(), "New");
        assert_eq!(old.path(), "Old");
        assert!(!old.exists().unwrap());
        assert!(ShareDirectory::new(Arc::clone(root.connection()), "New/Inner")
            .unwrap()
            .exists()
            .unwrap());

        let back = renamed.rename_to("Old", false).unwrap();
        assert_eq!(back, old);
        assert!(old.exists().unwrap());
        assert_eq!(transport.stats().open_files(), 0);
    }

    #[test]
    fn test_rename_conflicts() {
        let (transport, root) = setup();
        transport.put_dir("data", "A").unwrap();
        transport.put_dir("data", "B").unwrap();
        transport.put_file("data", "F", b"").unwrap();
        let a = ShareDirectory::new(Arc::clone(root.connection()), "A").unwrap();

        assert!(matches!(
            a.rename_to("B", false),
            Err(ShareError::RenameConflict { .. })
        ));
        assert!(matches!(
            a.rename_to("F", true),
            Err(ShareError::RenameConflict {
                source: TransportError::KindMismatch { .. },
                ..
            })
        ));
        assert!(a.exists().unwrap());

        let replaced = a.rename_to("B", true).unwrap();
        assert_eq!(replaced.path(), "B");
        assert!(!a.exists().unwrap());
        assert_eq!(transport.stats().open_files(), 0);
    }

    #[test]
    fn test_rename_root_rejected() {
        let (_transport, root) = setup();
        assert!(matches!(
            root.rename_to("x", false),
            Err(ShareError::InvalidName { .. })
        ));
    }
}
