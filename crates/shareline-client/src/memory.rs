//! In-memory share transport
//!
//! A complete [`ShareTransport`] that keeps every share as a tree in process
//! memory. It behaves like a small file server: listings include `.` and
//! `..`, operations on a dropped session fail with `NotConnected`, and every
//! opened handle and stream is counted so leaks show up in
//! [`MemoryTransport::stats`].
//!
//! Fault injection:
//! - [`MemoryTransport::drop_sessions`] marks all live sessions as
//!   disconnected, like a server-side idle timeout
//! - [`MemoryTransport::set_unreachable`] makes `connect` fail
//! - [`MemoryTransport::set_fail_reads`] / [`MemoryTransport::set_fail_writes`]
//!   make stream I/O fail mid-transfer

use std::collections::{BTreeMap, HashMap};
use std::io::{self, Read, Write};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;
use tracing::debug;

use shareline_core::{
    ConnectionConfig, Credentials, EntryKind, FileInfo, OpenDisposition, RawEntry, ReadStream,
    RemoteFile, Result, ShareHandle, SharePath, ShareTransport, TransportError, TransportResult,
    TransportSession, WriteStream,
};

use crate::connection::Connection;

/// Largest file the in-memory tree will grow to
const MAX_FILE_LEN: usize = 1 << 30;

/// Handle and session accounting
#[derive(Default)]
struct Counters {
    connects: AtomicUsize,
    sessions_closed: AtomicUsize,
    files_opened: AtomicUsize,
    files_closed: AtomicUsize,
    streams_opened: AtomicUsize,
    streams_closed: AtomicUsize,
}

/// Snapshot of transport counters
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MemoryStatsSnapshot {
    /// Sessions opened by `connect`
    pub connects: usize,
    /// Sessions closed by their owner
    pub sessions_closed: usize,
    pub files_opened: usize,
    pub files_closed: usize,
    pub streams_opened: usize,
    pub streams_closed: usize,
}

impl MemoryStatsSnapshot {
    /// Handles opened but not closed yet
    pub fn open_files(&self) -> usize {
        self.files_opened.saturating_sub(self.files_closed)
    }

    /// Streams opened but not closed yet
    pub fn open_streams(&self) -> usize {
        self.streams_opened.saturating_sub(self.streams_closed)
    }
}

struct Node {
    info: FileInfo,
    data: Vec<u8>,
}

impl Node {
    fn new(kind: EntryKind) -> Self {
        Self {
            info: FileInfo::new(kind),
            data: Vec::new(),
        }
    }

    fn touch(&mut self) {
        let now = Utc::now();
        self.info.written = now;
        self.info.changed = now;
    }
}

/// Where a write lands
#[derive(Clone, Copy)]
enum WritePos {
    At(u64),
    Append,
}

/// One share's entries keyed by path
struct Tree {
    entries: BTreeMap<SharePath, Node>,
}

impl Tree {
    fn new() -> Self {
        let mut entries = BTreeMap::new();
        entries.insert(SharePath::root(), Node::new(EntryKind::Directory));
        Self { entries }
    }

    fn kind(&self, path: &SharePath) -> Option<EntryKind> {
        self.entries.get(path).map(|node| node.info.kind)
    }

    fn require(&self, path: &SharePath, kind: EntryKind) -> TransportResult<()> {
        match self.kind(path) {
            Some(found) if found == kind => Ok(()),
            Some(EntryKind::Directory) => Err(TransportError::IsADirectory(path.to_string())),
            Some(EntryKind::File) => Err(TransportError::NotADirectory(path.to_string())),
            None => Err(TransportError::NotFound(path.to_string())),
        }
    }

    fn insert(&mut self, path: &SharePath, kind: EntryKind) -> TransportResult<()> {
        if self.entries.contains_key(path) {
            return Err(TransportError::AlreadyExists(path.to_string()));
        }
        self.require(&path.parent(), EntryKind::Directory)?;
        self.entries.insert(path.clone(), Node::new(kind));
        if let Some(parent) = self.entries.get_mut(&path.parent()) {
            parent.touch();
        }
        Ok(())
    }

    fn has_children(&self, path: &SharePath) -> bool {
        self.entries
            .keys()
            .any(|key| key.depth() > path.depth() && key.starts_with(path))
    }

    fn remove_tree(&mut self, path: &SharePath) {
        self.entries.retain(|key, _| !key.starts_with(path));
    }

    fn children(&self, path: &SharePath) -> Vec<RawEntry> {
        let mut entries = vec![RawEntry::new("."), RawEntry::new("..")];
        entries.extend(
            self.entries
                .keys()
                .filter(|key| key.depth() == path.depth() + 1 && key.starts_with(path))
                .map(|key| RawEntry::new(key.name())),
        );
        entries
    }

    fn rename(&mut self, from: &SharePath, to: &SharePath, replace: bool) -> TransportResult<()> {
        let kind = self
            .kind(from)
            .ok_or_else(|| TransportError::NotFound(from.to_string()))?;
        if from == to {
            return Ok(());
        }
        if from.is_root() || to.starts_with(from) {
            return Err(TransportError::AccessDenied(to.to_string()));
        }
        self.require(&to.parent(), EntryKind::Directory)?;

        if let Some(existing) = self.kind(to) {
            if !replace {
                return Err(TransportError::AlreadyExists(to.to_string()));
            }
            if existing != kind {
                return Err(TransportError::KindMismatch {
                    path: to.to_string(),
                    existing,
                    replacement: kind,
                });
            }
            if existing == EntryKind::Directory && self.has_children(to) {
                return Err(TransportError::NotEmpty(to.to_string()));
            }
            self.entries.remove(to);
        }

        let moved: Vec<SharePath> = self
            .entries
            .keys()
            .filter(|key| key.starts_with(from))
            .cloned()
            .collect();
        for old in moved {
            if let (Some(node), Some(new)) = (self.entries.remove(&old), old.rebase(from, to)) {
                self.entries.insert(new, node);
            }
        }
        if let Some(node) = self.entries.get_mut(to) {
            node.info.changed = Utc::now();
        }
        Ok(())
    }

    fn file_mut(&mut self, path: &SharePath) -> TransportResult<&mut Node> {
        self.require(path, EntryKind::File)?;
        self.entries
            .get_mut(path)
            .ok_or_else(|| TransportError::NotFound(path.to_string()))
    }

    fn truncate(&mut self, path: &SharePath) -> TransportResult<()> {
        let node = self.file_mut(path)?;
        node.data.clear();
        node.info.size = 0;
        node.touch();
        Ok(())
    }

    fn write(&mut self, path: &SharePath, pos: WritePos, buf: &[u8]) -> TransportResult<u64> {
        let node = self.file_mut(path)?;
        let start = match pos {
            WritePos::At(offset) => usize::try_from(offset)
                .map_err(|_| TransportError::Io(format!("offset {} out of range", offset)))?,
            WritePos::Append => node.data.len(),
        };
        let end = start
            .checked_add(buf.len())
            .filter(|end| *end <= MAX_FILE_LEN)
            .ok_or_else(|| TransportError::Io(format!("write past {} bytes", MAX_FILE_LEN)))?;
        if node.data.len() < end {
            node.data.resize(end, 0);
        }
        node.data[start..end].copy_from_slice(buf);
        node.info.size = node.data.len() as u64;
        node.touch();
        Ok(end as u64)
    }

    fn read(&mut self, path: &SharePath, offset: usize, buf: &mut [u8]) -> TransportResult<usize> {
        let node = self.file_mut(path)?;
        node.info.accessed = Utc::now();
        let available = node.data.get(offset..).unwrap_or(&[]);
        let n = available.len().min(buf.len());
        buf[..n].copy_from_slice(&available[..n]);
        Ok(n)
    }
}

struct ServerState {
    name: String,
    users: Mutex<HashMap<String, String>>,
    shares: Mutex<HashMap<String, Arc<Mutex<Tree>>>>,
    live_sessions: Mutex<Vec<Arc<AtomicBool>>>,
    unreachable: AtomicBool,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
    counters: Counters,
}

impl ServerState {
    fn tree(&self, share: &str) -> Option<Arc<Mutex<Tree>>> {
        self.shares.lock().get(share).cloned()
    }
}

/// In-process file server.
///
/// Cloning is cheap; clones serve the same shares and share counters.
#[derive(Clone)]
pub struct MemoryTransport {
    state: Arc<ServerState>,
}

impl MemoryTransport {
    /// A server reachable under `server_name` with no shares and no users
    /// (any credentials are accepted until a user is added)
    pub fn new(server_name: impl Into<String>) -> Self {
        Self {
            state: Arc::new(ServerState {
                name: server_name.into(),
                users: Mutex::new(HashMap::new()),
                shares: Mutex::new(HashMap::new()),
                live_sessions: Mutex::new(Vec::new()),
                unreachable: AtomicBool::new(false),
                fail_reads: AtomicBool::new(false),
                fail_writes: AtomicBool::new(false),
                counters: Counters::default(),
            }),
        }
    }

    pub fn with_share(self, name: &str) -> Self {
        self.add_share(name);
        self
    }

    pub fn with_user(self, username: &str, password: &str) -> Self {
        self.state
            .users
            .lock()
            .insert(username.to_string(), password.to_string());
        self
    }

    /// Add an empty share; an existing share of that name is kept
    pub fn add_share(&self, name: &str) {
        self.state
            .shares
            .lock()
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(Tree::new())));
    }

    /// Disconnect every live session, as a server-side timeout would
    pub fn drop_sessions(&self) {
        let sessions = std::mem::take(&mut *self.state.live_sessions.lock());
        debug!("Dropping {} live session(s)", sessions.len());
        for alive in sessions {
            alive.store(false, Ordering::SeqCst);
        }
    }

    pub fn set_unreachable(&self, unreachable: bool) {
        self.state.unreachable.store(unreachable, Ordering::SeqCst);
    }

    pub fn set_fail_reads(&self, fail: bool) {
        self.state.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.state.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn stats(&self) -> MemoryStatsSnapshot {
        let c = &self.state.counters;
        MemoryStatsSnapshot {
            connects: c.connects.load(Ordering::SeqCst),
            sessions_closed: c.sessions_closed.load(Ordering::SeqCst),
            files_opened: c.files_opened.load(Ordering::SeqCst),
            files_closed: c.files_closed.load(Ordering::SeqCst),
            streams_opened: c.streams_opened.load(Ordering::SeqCst),
            streams_closed: c.streams_closed.load(Ordering::SeqCst),
        }
    }

    /// Open an eager connection to one of this server's shares
    pub fn open_connection(&self, share: &str, credentials: Credentials) -> Result<Arc<Connection>> {
        let connection = Connection::open(
            Arc::new(self.clone()),
            self.state.name.clone(),
            share,
            credentials,
            ConnectionConfig::default(),
        )?;
        Ok(Arc::new(connection))
    }

    /// Create a directory (and any missing parents) directly on the server
    pub fn put_dir(&self, share: &str, path: &str) -> TransportResult<()> {
        let tree = self.tree(share)?;
        let mut tree = tree.lock();
        let path = parse(path)?;
        let mut current = SharePath::root();
        for segment in path.segments() {
            current = current
                .child(segment)
                .map_err(|e| TransportError::Io(e.to_string()))?;
            match tree.kind(&current) {
                Some(EntryKind::Directory) => {}
                Some(EntryKind::File) => {
                    return Err(TransportError::NotADirectory(current.to_string()))
                }
                None => tree.insert(&current, EntryKind::Directory)?,
            }
        }
        Ok(())
    }

    /// Create or replace a file directly on the server
    pub fn put_file(&self, share: &str, path: &str, content: &[u8]) -> TransportResult<()> {
        let tree = self.tree(share)?;
        let mut tree = tree.lock();
        let path = parse(path)?;
        if tree.kind(&path).is_none() {
            tree.insert(&path, EntryKind::File)?;
        }
        tree.truncate(&path)?;
        tree.write(&path, WritePos::At(0), content)?;
        Ok(())
    }

    /// Content of a file, `None` if absent or a directory
    pub fn file_content(&self, share: &str, path: &str) -> Option<Vec<u8>> {
        let tree = self.state.tree(share)?;
        let tree = tree.lock();
        let path = SharePath::parse(path).ok()?;
        tree.entries
            .get(&path)
            .filter(|node| node.info.is_file())
            .map(|node| node.data.clone())
    }

    pub fn set_hidden(&self, share: &str, path: &str, hidden: bool) -> TransportResult<()> {
        let tree = self.tree(share)?;
        let mut tree = tree.lock();
        let path = parse(path)?;
        let node = tree
            .entries
            .get_mut(&path)
            .ok_or_else(|| TransportError::NotFound(path.to_string()))?;
        node.info.hidden = hidden;
        Ok(())
    }

    fn tree(&self, share: &str) -> TransportResult<Arc<Mutex<Tree>>> {
        self.state
            .tree(share)
            .ok_or_else(|| TransportError::ShareNotFound(share.to_string()))
    }
}

fn parse(path: &str) -> TransportResult<SharePath> {
    SharePath::parse(path).map_err(|e| TransportError::Io(e.to_string()))
}

impl ShareTransport for MemoryTransport {
    fn connect(&self, server: &str, _config: &ConnectionConfig) -> TransportResult<Box<dyn TransportSession>> {
        if self.state.unreachable.load(Ordering::SeqCst)
            || !server.eq_ignore_ascii_case(&self.state.name)
        {
            return Err(TransportError::Unreachable(server.to_string()));
        }

        let alive = Arc::new(AtomicBool::new(true));
        self.state.live_sessions.lock().push(Arc::clone(&alive));
        self.state.counters.connects.fetch_add(1, Ordering::SeqCst);

        Ok(Box::new(MemorySession {
            server: Arc::clone(&self.state),
            alive,
        }))
    }
}

struct MemorySession {
    server: Arc<ServerState>,
    alive: Arc<AtomicBool>,
}

impl TransportSession for MemorySession {
    fn is_connected(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    fn authenticate_and_bind(
        &mut self,
        credentials: &Credentials,
        share: &str,
    ) -> TransportResult<Arc<dyn ShareHandle>> {
        if !self.is_connected() {
            return Err(TransportError::NotConnected);
        }

        {
            let users = self.server.users.lock();
            if !users.is_empty() && users.get(&credentials.username) != Some(&credentials.password) {
                return Err(TransportError::AuthenticationFailed(credentials.username.clone()));
            }
        }

        let tree = self
            .server
            .tree(share)
            .ok_or_else(|| TransportError::ShareNotFound(share.to_string()))?;

        Ok(Arc::new(MemoryShare {
            name: share.to_string(),
            tree,
            alive: Arc::clone(&self.alive),
            server: Arc::clone(&self.server),
        }))
    }

    fn close(&mut self) -> TransportResult<()> {
        if !self.alive.swap(false, Ordering::SeqCst) {
            return Err(TransportError::NotConnected);
        }
        self.server
            .live_sessions
            .lock()
            .retain(|flag| !Arc::ptr_eq(flag, &self.alive));
        self.server.counters.sessions_closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

struct MemoryShare {
    name: String,
    tree: Arc<Mutex<Tree>>,
    alive: Arc<AtomicBool>,
    server: Arc<ServerState>,
}

impl MemoryShare {
    fn check(&self) -> TransportResult<()> {
        if self.is_connected() {
            Ok(())
        } else {
            Err(TransportError::NotConnected)
        }
    }

    fn open(&self, path: &SharePath, kind: EntryKind) -> Box<dyn RemoteFile> {
        self.server.counters.files_opened.fetch_add(1, Ordering::SeqCst);
        Box::new(MemoryFile {
            share: self.name.clone(),
            path: path.clone(),
            kind,
            tree: Arc::clone(&self.tree),
            server: Arc::clone(&self.server),
            open: Arc::new(AtomicBool::new(true)),
        })
    }
}

impl ShareHandle for MemoryShare {
    fn share_name(&self) -> &str {
        &self.name
    }

    fn is_connected(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    fn list(&self, path: &SharePath) -> TransportResult<Vec<RawEntry>> {
        self.check()?;
        let tree = self.tree.lock();
        tree.require(path, EntryKind::Directory)?;
        Ok(tree.children(path))
    }

    fn stat(&self, path: &SharePath) -> TransportResult<FileInfo> {
        self.check()?;
        self.tree
            .lock()
            .entries
            .get(path)
            .map(|node| node.info.clone())
            .ok_or_else(|| TransportError::NotFound(path.to_string()))
    }

    fn mkdir(&self, path: &SharePath) -> TransportResult<()> {
        self.check()?;
        self.tree.lock().insert(path, EntryKind::Directory)
    }

    fn rmdir(&self, path: &SharePath, recursive: bool) -> TransportResult<()> {
        self.check()?;
        if path.is_root() {
            return Err(TransportError::AccessDenied("share root".into()));
        }
        let mut tree = self.tree.lock();
        tree.require(path, EntryKind::Directory)?;
        if !recursive && tree.has_children(path) {
            return Err(TransportError::NotEmpty(path.to_string()));
        }
        tree.remove_tree(path);
        Ok(())
    }

    fn delete_file(&self, path: &SharePath) -> TransportResult<()> {
        self.check()?;
        let mut tree = self.tree.lock();
        tree.require(path, EntryKind::File)?;
        tree.entries.remove(path);
        Ok(())
    }

    fn open_file(&self, path: &SharePath, disposition: OpenDisposition) -> TransportResult<Box<dyn RemoteFile>> {
        self.check()?;
        let mut tree = self.tree.lock();
        match (tree.kind(path), disposition) {
            (Some(EntryKind::Directory), _) => {
                return Err(TransportError::IsADirectory(path.to_string()))
            }
            (None, OpenDisposition::Open) => return Err(TransportError::NotFound(path.to_string())),
            (None, _) => tree.insert(path, EntryKind::File)?,
            (Some(EntryKind::File), OpenDisposition::OverwriteIf) => tree.truncate(path)?,
            (Some(EntryKind::File), _) => {}
        }
        Ok(self.open(path, EntryKind::File))
    }

    fn open_directory(&self, path: &SharePath) -> TransportResult<Box<dyn RemoteFile>> {
        self.check()?;
        self.tree.lock().require(path, EntryKind::Directory)?;
        Ok(self.open(path, EntryKind::Directory))
    }
}

struct MemoryFile {
    share: String,
    path: SharePath,
    kind: EntryKind,
    tree: Arc<Mutex<Tree>>,
    server: Arc<ServerState>,
    open: Arc<AtomicBool>,
}

impl MemoryFile {
    fn check(&self) -> TransportResult<()> {
        if self.open.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(TransportError::Closed)
        }
    }

    fn require_file(&self) -> TransportResult<()> {
        match self.kind {
            EntryKind::File => Ok(()),
            EntryKind::Directory => Err(TransportError::IsADirectory(self.path.to_string())),
        }
    }
}

impl RemoteFile for MemoryFile {
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
        self.check()?;
        self.require_file()?;
        self.server.counters.streams_opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MemoryReader {
            tree: Arc::clone(&self.tree),
            path: self.path.clone(),
            position: 0,
            file_open: Arc::clone(&self.open),
            server: Arc::clone(&self.server),
            closed: false,
        }))
    }

    fn write_stream(&mut self, append: bool) -> TransportResult<Box<dyn WriteStream>> {
        self.check()?;
        self.require_file()?;
        self.server.counters.streams_opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MemoryWriter {
            tree: Arc::clone(&self.tree),
            path: self.path.clone(),
            position: 0,
            append,
            file_open: Arc::clone(&self.open),
            server: Arc::clone(&self.server),
            closed: false,
        }))
    }

    fn rename(&mut self, target: &SharePath, replace: bool) -> TransportResult<()> {
        self.check()?;
        self.tree.lock().rename(&self.path, target, replace)?;
        self.path = target.clone();
        Ok(())
    }

    fn remote_copy_to(&mut self, destination: &mut dyn RemoteFile) -> TransportResult<()> {
        self.check()?;
        self.require_file()?;
        if destination.share_name() != self.share {
            return Err(TransportError::CrossShare(destination.path().to_string()));
        }
        if destination.kind() != EntryKind::File {
            return Err(TransportError::IsADirectory(destination.path().to_string()));
        }

        let mut tree = self.tree.lock();
        let content = tree.file_mut(&self.path)?.data.clone();
        tree.truncate(destination.path())?;
        tree.write(destination.path(), WritePos::At(0), &content)?;
        Ok(())
    }

    fn close(&mut self) -> TransportResult<()> {
        if !self.open.swap(false, Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }
        self.server.counters.files_closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

fn injected(what: &str) -> io::Error {
    io::Error::new(io::ErrorKind::Other, format!("injected {} failure", what))
}

struct MemoryReader {
    tree: Arc<Mutex<Tree>>,
    path: SharePath,
    position: usize,
    file_open: Arc<AtomicBool>,
    server: Arc<ServerState>,
    closed: bool,
}

impl Read for MemoryReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.closed || !self.file_open.load(Ordering::SeqCst) {
            return Err(TransportError::Closed.into());
        }
        if self.server.fail_reads.load(Ordering::SeqCst) {
            return Err(injected("read"));
        }
        let n = self.tree.lock().read(&self.path, self.position, buf)?;
        self.position += n;
        Ok(n)
    }
}

impl ReadStream for MemoryReader {
    fn close(&mut self) -> io::Result<()> {
        if self.closed {
            return Err(TransportError::Closed.into());
        }
        self.closed = true;
        self.server.counters.streams_closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

struct MemoryWriter {
    tree: Arc<Mutex<Tree>>,
    path: SharePath,
    position: u64,
    append: bool,
    file_open: Arc<AtomicBool>,
    server: Arc<ServerState>,
    closed: bool,
}

impl MemoryWriter {
    fn put(&mut self, pos: WritePos, buf: &[u8]) -> io::Result<u64> {
        if self.closed || !self.file_open.load(Ordering::SeqCst) {
            return Err(TransportError::Closed.into());
        }
        if self.server.fail_writes.load(Ordering::SeqCst) {
            return Err(injected("write"));
        }
        let pos = if self.append { WritePos::Append } else { pos };
        Ok(self.tree.lock().write(&self.path, pos, buf)?)
    }
}

impl Write for MemoryWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.position = self.put(WritePos::At(self.position), buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        if self.closed {
            return Err(TransportError::Closed.into());
        }
        Ok(())
    }
}

impl WriteStream for MemoryWriter {
    fn write_at(&mut self, offset: u64, buf: &[u8]) -> io::Result<usize> {
        self.put(WritePos::At(offset), buf)?;
        Ok(buf.len())
    }

    fn close(&mut self) -> io::Result<()> {
        if self.closed {
            return Err(TransportError::Closed.into());
        }
        self.closed = true;
        self.server.counters.streams_closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
