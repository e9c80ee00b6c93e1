//! Local directory transport
//!
//! Serves every subdirectory of a root directory as a share, so
//! `\\<any server>\docs\a.txt` maps to `<root>/docs/a.txt`. Credentials are
//! accepted as given. Entries are resolved only below the share directory;
//! symlinks that lead outside it are refused.

use std::fs;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::SystemTime;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use shareline_core::path::validate_segment;
use shareline_core::{
    ConnectionConfig, Credentials, EntryKind, FileInfo, OpenDisposition, RawEntry, ReadStream,
    RemoteFile, ShareHandle, SharePath, ShareTransport, TransportError, TransportResult,
    TransportSession, WriteStream,
};

/// Transport over a local root directory
#[derive(Clone, Debug)]
pub struct LocalTransport {
    root: PathBuf,
}

impl LocalTransport {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl ShareTransport for LocalTransport {
    fn connect(&self, server: &str, _config: &ConnectionConfig) -> TransportResult<Box<dyn TransportSession>> {
        if !self.root.is_dir() {
            return Err(TransportError::Unreachable(format!(
                "{} (root {} is not a directory)",
                server,
                self.root.display()
            )));
        }
        debug!("Opened local session for {} at {}", server, self.root.display());
        Ok(Box::new(LocalSession {
            root: self.root.clone(),
            alive: Arc::new(AtomicBool::new(true)),
        }))
    }
}

struct LocalSession {
    root: PathBuf,
    alive: Arc<AtomicBool>,
}

impl TransportSession for LocalSession {
    fn is_connected(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    fn authenticate_and_bind(
        &mut self,
        _credentials: &Credentials,
        share: &str,
    ) -> TransportResult<Arc<dyn ShareHandle>> {
        if !self.is_connected() {
            return Err(TransportError::NotConnected);
        }
        if let Err(reason) = validate_segment(share) {
            debug!("Rejecting share name '{}': {}", share, reason);
            return Err(TransportError::ShareNotFound(share.to_string()));
        }
        let dir = self.root.join(share);
        if !dir.is_dir() {
            return Err(TransportError::ShareNotFound(share.to_string()));
        }
        let root = self.root.canonicalize()?;
        let dir = dir.canonicalize()?;
        if !dir.starts_with(&root) || dir == root {
            warn!("Refusing share escaping the root: {}", share);
            return Err(TransportError::ShareNotFound(share.to_string()));
        }
        Ok(Arc::new(LocalShare {
            name: share.to_string(),
            dir,
            alive: Arc::clone(&self.alive),
        }))
    }

    fn close(&mut self) -> TransportResult<()> {
        if !self.alive.swap(false, Ordering::SeqCst) {
            return Err(TransportError::NotConnected);
        }
        Ok(())
    }
}

/// Attach the share path to an I/O failure
fn map_io(path: &SharePath, err: io::Error) -> TransportError {
    let shown = path.to_string();
    match TransportError::from(err) {
        TransportError::NotFound(_) => TransportError::NotFound(shown),
        TransportError::AlreadyExists(_) => TransportError::AlreadyExists(shown),
        TransportError::AccessDenied(_) => TransportError::AccessDenied(shown),
        other => other,
    }
}

fn timestamp(time: io::Result<SystemTime>, fallback: SystemTime) -> DateTime<Utc> {
    DateTime::<Utc>::from(time.unwrap_or(fallback))
}

fn file_info(path: &SharePath, meta: &fs::Metadata) -> FileInfo {
    let kind = if meta.is_dir() {
        EntryKind::Directory
    } else {
        EntryKind::File
    };
    let modified = meta.modified().unwrap_or(SystemTime::UNIX_EPOCH);

    FileInfo {
        kind,
        size: if meta.is_dir() { 0 } else { meta.len() },
        hidden: path.name().starts_with('.'),
        created: timestamp(meta.created(), modified),
        accessed: timestamp(meta.accessed(), modified),
        written: DateTime::<Utc>::from(modified),
        changed: DateTime::<Utc>::from(modified),
    }
}

/// Shares resolve below one canonical directory
#[derive(Clone)]
struct ShareRoot {
    dir: PathBuf,
}

impl ShareRoot {
    fn host_path(&self, path: &SharePath) -> PathBuf {
        path.segments().iter().fold(self.dir.clone(), |acc, s| acc.join(s))
    }

    /// Host path of `path`, refusing symlinks that escape the share
    fn resolve(&self, path: &SharePath) -> TransportResult<PathBuf> {
        let host = self.host_path(path);
        match host.canonicalize() {
            Ok(real) if !real.starts_with(&self.dir) => {
                warn!("Refusing path escaping share via symlink: {}", host.display());
                Err(TransportError::AccessDenied(path.to_string()))
            }
            _ => Ok(host),
        }
    }

    fn metadata(&self, path: &SharePath) -> TransportResult<fs::Metadata> {
        fs::metadata(self.resolve(path)?).map_err(|e| map_io(path, e))
    }

    fn kind(&self, path: &SharePath) -> TransportResult<Option<EntryKind>> {
        match self.metadata(path) {
            Ok(meta) if meta.is_dir() => Ok(Some(EntryKind::Directory)),
            Ok(_) => Ok(Some(EntryKind::File)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }
}

struct LocalShare {
    name: String,
    dir: PathBuf,
    alive: Arc<AtomicBool>,
}

impl LocalShare {
    fn check(&self) -> TransportResult<ShareRoot> {
        if !self.is_connected() {
            return Err(TransportError::NotConnected);
        }
        Ok(ShareRoot {
            dir: self.dir.clone(),
        })
    }
}

impl ShareHandle for LocalShare {
    fn share_name(&self) -> &str {
        &self.name
    }

    fn is_connected(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    fn list(&self, path: &SharePath) -> TransportResult<Vec<RawEntry>> {
        let root = self.check()?;
        let host = root.resolve(path)?;
        let mut entries = Vec::new();
        for entry in fs::read_dir(&host).map_err(|e| map_io(path, e))? {
            let entry = entry.map_err(|e| map_io(path, e))?;
            match entry.file_name().into_string() {
                Ok(name) => entries.push(RawEntry::new(name)),
                Err(raw) => debug!("Skipping non UTF-8 entry {:?} in '{}'", raw, path),
            }
        }
        Ok(entries)
    }

    fn stat(&self, path: &SharePath) -> TransportResult<FileInfo> {
        let meta = self.check()?.metadata(path)?;
        Ok(file_info(path, &meta))
    }

    fn mkdir(&self, path: &SharePath) -> TransportResult<()> {
        let root = self.check()?;
        fs::create_dir(root.resolve(path)?).map_err(|e| map_io(path, e))
    }

    fn rmdir(&self, path: &SharePath, recursive: bool) -> TransportResult<()> {
        let root = self.check()?;
        if path.is_root() {
            return Err(TransportError::AccessDenied("share root".into()));
        }
        match root.kind(path)? {
            Some(EntryKind::Directory) => {}
            Some(EntryKind::File) => return Err(TransportError::NotADirectory(path.to_string())),
            None => return Err(TransportError::NotFound(path.to_string())),
        }
        let host = root.resolve(path)?;
        if recursive {
            fs::remove_dir_all(&host).map_err(|e| map_io(path, e))
        } else {
            if fs::read_dir(&host).map_err(|e| map_io(path, e))?.next().is_some() {
                return Err(TransportError::NotEmpty(path.to_string()));
            }
            fs::remove_dir(&host).map_err(|e| map_io(path, e))
        }
    }

    fn delete_file(&self, path: &SharePath) -> TransportResult<()> {
        let root = self.check()?;
        match root.kind(path)? {
            Some(EntryKind::File) => fs::remove_file(root.resolve(path)?).map_err(|e| map_io(path, e)),
            Some(EntryKind::Directory) => Err(TransportError::IsADirectory(path.to_string())),
            None => Err(TransportError::NotFound(path.to_string())),
        }
    }

    fn open_file(&self, path: &SharePath, disposition: OpenDisposition) -> TransportResult<Box<dyn RemoteFile>> {
        let root = self.check()?;
        if root.kind(path)? == Some(EntryKind::Directory) {
            return Err(TransportError::IsADirectory(path.to_string()));
        }
        let host = root.resolve(path)?;
        let mut options = fs::OpenOptions::new();
        options.read(true).write(true);
        match disposition {
            OpenDisposition::Open => {}
            OpenDisposition::OpenIf => {
                options.create(true);
            }
            OpenDisposition::OverwriteIf => {
                options.create(true).truncate(true);
            }
        }
        options.open(&host).map_err(|e| map_io(path, e))?;

        Ok(Box::new(LocalFile {
            share: self.name.clone(),
            path: path.clone(),
            kind: EntryKind::File,
            root,
            open: Arc::new(AtomicBool::new(true)),
        }))
    }

    fn open_directory(&self, path: &SharePath) -> TransportResult<Box<dyn RemoteFile>> {
        let root = self.check()?;
        match root.kind(path)? {
            Some(EntryKind::Directory) => Ok(Box::new(LocalFile {
                share: self.name.clone(),
                path: path.clone(),
                kind: EntryKind::Directory,
                root,
                open: Arc::new(AtomicBool::new(true)),
            })),
            Some(EntryKind::File) => Err(TransportError::NotADirectory(path.to_string())),
            None => Err(TransportError::NotFound(path.to_string())),
        }
    }
}

struct LocalFile {
    share: String,
    path: SharePath,
    kind: EntryKind,
    root: ShareRoot,
    open: Arc<AtomicBool>,
}

impl LocalFile {
    fn check(&self) -> TransportResult<PathBuf> {
        if !self.open.load(Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }
        if self.kind == EntryKind::Directory {
            return Err(TransportError::IsADirectory(self.path.to_string()));
        }
        self.root.resolve(&self.path)
    }
}

impl RemoteFile for LocalFile {
    fn share_name(&self) -> &str {
        &self.share
    }

    fn path(&self) -> &SharePath {
        &self.path
    }

    fn kind(&self) -> EntryKind {
        self.kind
    }

    fn read_stream(&mut self) -> TransportResult<Box<dyn ReadStream>> {
        let host = self.check()?;
        let file = fs::File::open(&host).map_err(|e| map_io(&self.path, e))?;
        Ok(Box::new(LocalReader {
            file: Some(file),
            file_open: Arc::clone(&self.open),
        }))
    }

    fn write_stream(&mut self, append: bool) -> TransportResult<Box<dyn WriteStream>> {
        let host = self.check()?;
        let file = fs::OpenOptions::new()
            .write(true)
            .append(append)
            .open(&host)
            .map_err(|e| map_io(&self.path, e))?;
        Ok(Box::new(LocalWriter {
            file: Some(file),
            file_open: Arc::clone(&self.open),
        }))
    }

    fn rename(&mut self, target: &SharePath, replace: bool) -> TransportResult<()> {
        if !self.open.load(Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }
        if *target == self.path {
            return Ok(());
        }
        if self.path.is_root() || target.starts_with(&self.path) {
            return Err(TransportError::AccessDenied(target.to_string()));
        }

        let from = self.root.resolve(&self.path)?;
        let to = self.root.resolve(target)?;
        if let Some(existing) = self.root.kind(target)? {
            if !replace {
                return Err(TransportError::AlreadyExists(target.to_string()));
            }
            if existing != self.kind {
                return Err(TransportError::KindMismatch {
                    path: target.to_string(),
                    existing,
                    replacement: self.kind,
                });
            }
            if existing == EntryKind::Directory {
                if fs::read_dir(&to).map_err(|e| map_io(target, e))?.next().is_some() {
                    return Err(TransportError::NotEmpty(target.to_string()));
                }
                fs::remove_dir(&to).map_err(|e| map_io(target, e))?;
            }
        }

        fs::rename(&from, &to).map_err(|e| map_io(&self.path, e))?;
        self.path = target.clone();
        Ok(())
    }

    fn remote_copy_to(&mut self, destination: &mut dyn RemoteFile) -> TransportResult<()> {
        let source = self.check()?;
        if destination.share_name() != self.share {
            return Err(TransportError::CrossShare(destination.path().to_string()));
        }
        if destination.kind() != EntryKind::File {
            return Err(TransportError::IsADirectory(destination.path().to_string()));
        }
        let target = self.root.resolve(destination.path())?;
        fs::copy(&source, &target).map_err(|e| map_io(destination.path(), e))?;
        Ok(())
    }

    fn close(&mut self) -> TransportResult<()> {
        if !self.open.swap(false, Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }
        Ok(())
    }
}

struct LocalReader {
    file: Option<fs::File>,
    file_open: Arc<AtomicBool>,
}

impl Read for LocalReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.file.as_mut() {
            Some(file) if self.file_open.load(Ordering::SeqCst) => file.read(buf),
            _ => Err(TransportError::Closed.into()),
        }
    }
}

impl ReadStream for LocalReader {
    fn close(&mut self) -> io::Result<()> {
        match self.file.take() {
            Some(_) => Ok(()),
            None => Err(TransportError::Closed.into()),
        }
    }
}

struct LocalWriter {
    file: Option<fs::File>,
    file_open: Arc<AtomicBool>,
}

impl LocalWriter {
    fn file(&mut self) -> io::Result<&mut fs::File> {
        match self.file.as_mut() {
            Some(file) if self.file_open.load(Ordering::SeqCst) => Ok(file),
            _ => Err(TransportError::Closed.into()),
        }
    }
}

impl Write for LocalWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.file()?.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file()?.flush()
    }
}

impl WriteStream for LocalWriter {
    fn write_at(&mut self, offset: u64, buf: &[u8]) -> io::Result<usize> {
        let file = self.file()?;
        let resume = file.stream_position()?;
        file.seek(SeekFrom::Start(offset))?;
        file.write_all(buf)?;
        file.seek(SeekFrom::Start(resume))?;
        Ok(buf.len())
    }

    fn close(&mut self) -> io::Result<()> {
        match self.file.take() {
            Some(file) => file.sync_all(),
            None => Err(TransportError::Closed.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    use crate::connection::Connection;
    use crate::directory::ShareDirectory;
    use crate::file::ShareFile;
    use crate::item::{ShareItem, ShareNode};
    use shareline_core::ShareError;

    fn setup() -> (TempDir, Arc<Connection>) {
        let temp = TempDir::new().unwrap();
        fs::create_dir(temp.path().join("data")).unwrap();
        let conn = Connection::open(
            Arc::new(LocalTransport::new(temp.path())),
            "localhost",
            "data",
            Credentials::anonymous(),
            ConnectionConfig::default(),
        )
        .unwrap();
        (temp, Arc::new(conn))
    }

    #[test]
    fn test_missing_share_and_root() {
        let temp = TempDir::new().unwrap();
        let err = Connection::open(
            Arc::new(LocalTransport::new(temp.path())),
            "localhost",
            "nope",
            Credentials::anonymous(),
            ConnectionConfig::default(),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            ShareError::Connection {
                source: TransportError::ShareNotFound(_),
                ..
            }
        ));

        let err = Connection::open(
            Arc::new(LocalTransport::new(temp.path().join("absent"))),
            "localhost",
            "data",
            Credentials::anonymous(),
            ConnectionConfig::default(),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            ShareError::Connection {
                source: TransportError::Unreachable(_),
                ..
            }
        ));
    }

    #[test]
    fn test_tree_operations() {
        let (temp, conn) = setup();
        let root = ShareDirectory::root(Arc::clone(&conn));

        let dir = root.create_directory_in_current_directory("Dir1").unwrap();
        let nested = dir.create_directory_in_current_directory("Dir2").unwrap();
        nested.create_file_in_current_directory("a.txt").unwrap();
        assert!(temp.path().join("data/Dir1/Dir2/a.txt").is_file());

        let found = root
            .list_files(|item: &ShareItem| item.kind() == EntryKind::File, true)
            .unwrap();
        let paths: Vec<String> = found.iter().map(|item| item.path()).collect();
        assert_eq!(paths, vec!["Dir1/Dir2/a.txt"]);

        dir.delete_directory_recursively().unwrap();
        assert!(!temp.path().join("data/Dir1").exists());
    }

    #[test]
    fn test_streams_and_copy() {
        let (temp, conn) = setup();
        let file = ShareFile::new(Arc::clone(&conn), "a.txt").unwrap();

        let mut writer = file.output_stream().unwrap();
        writer.write_all(b"hello").unwrap();
        writer.write_at(0, b"J").unwrap();
        writer.close().unwrap();

        let mut writer = file.output_stream_with(true).unwrap();
        writer.write_all(b" world").unwrap();
        writer.close().unwrap();

        let mut content = String::new();
        file.input_stream().unwrap().read_to_string(&mut content).unwrap();
        assert_eq!(content, "Jello world");
        assert_eq!(file.size().unwrap(), 11);

        let copy = ShareFile::new(conn, "b.txt").unwrap();
        file.copy_via_server_side_copy(&copy).unwrap();
        assert_eq!(fs::read(temp.path().join("data/b.txt")).unwrap(), b"Jello world");
    }

    #[test]
    fn test_rename_rules() {
        let (temp, conn) = setup();
        fs::write(temp.path().join("data/a.txt"), b"a").unwrap();
        fs::write(temp.path().join("data/b.txt"), b"b").unwrap();
        fs::create_dir(temp.path().join("data/dir")).unwrap();
        let a = ShareFile::new(Arc::clone(&conn), "a.txt").unwrap();

        assert!(matches!(
            a.rename_to("b.txt", false),
            Err(ShareError::RenameConflict { .. })
        ));
        assert!(matches!(
            a.rename_to("dir", true),
            Err(ShareError::RenameConflict {
                source: TransportError::KindMismatch { .. },
                ..
            })
        ));

        let renamed = a.rename_to("b.txt", true).unwrap();
        assert_eq!(renamed.name(), "b.txt");
        assert_eq!(fs::read(temp.path().join("data/b.txt")).unwrap(), b"a");
        assert!(!a.exists().unwrap());
    }

    #[test]
    fn test_hidden_and_kind_checks() {
        let (temp, conn) = setup();
        fs::write(temp.path().join("data/.profile"), b"").unwrap();
        let hidden = ShareFile::new(Arc::clone(&conn), ".profile").unwrap();
        assert!(hidden.is_hidden());

        let dir = ShareDirectory::new(conn, ".profile").unwrap();
        assert!(matches!(
            dir.ensure_exists(),
            Err(ShareError::StateConflict { .. })
        ));
    }

    #[test]
    fn test_share_name_cannot_leave_root() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().join("shares");
        fs::create_dir_all(root.join("data")).unwrap();
        fs::write(temp.path().join("outside.txt"), b"o").unwrap();
        let transport = Arc::new(LocalTransport::new(&root));

        for share in ["..", ".", "data/..", ""] {
            let err = Connection::open(
                transport.clone(),
                "localhost",
                share,
                Credentials::anonymous(),
                ConnectionConfig::default(),
            )
            .unwrap_err();
            assert!(
                matches!(
                    err,
                    ShareError::Connection {
                        source: TransportError::ShareNotFound(_),
                        ..
                    }
                ),
                "{:?}",
                share
            );
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_share_symlinked_outside_root_refused() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().join("shares");
        fs::create_dir_all(&root).unwrap();
        std::os::unix::fs::symlink(temp.path(), root.join("up")).unwrap();

        let err = Connection::open(
            Arc::new(LocalTransport::new(&root)),
            "localhost",
            "up",
            Credentials::anonymous(),
            ConnectionConfig::default(),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            ShareError::Connection {
                source: TransportError::ShareNotFound(_),
                ..
            }
        ));
    }

    #[cfg(unix)]
    #[test]
    fn test_non_utf8_names_are_skipped() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let (temp, conn) = setup();
        fs::write(temp.path().join("data/ok.txt"), b"ok").unwrap();
        let odd = temp.path().join("data").join(OsStr::from_bytes(b"bad\xff.txt"));
        if fs::write(&odd, b"x").is_err() {
            // Filesystem refuses such names
            return;
        }

        let files = ShareDirectory::root(conn).get_files().unwrap();
        let names: Vec<&str> = files.iter().map(|f| f.name()).collect();
        assert_eq!(names, vec!["ok.txt"]);
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_escape_refused() {
        let (temp, conn) = setup();
        let outside = TempDir::new().unwrap();
        fs::write(outside.path().join("secret"), b"s").unwrap();
        std::os::unix::fs::symlink(outside.path().join("secret"), temp.path().join("data/link")).unwrap();

        let file = ShareFile::new(conn, "link").unwrap();
        assert!(matches!(
            file.input_stream(),
            Err(ShareError::RemoteOperation {
                source: TransportError::AccessDenied(_),
                ..
            })
        ));
    }
}
