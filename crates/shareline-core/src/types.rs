//! Core type definitions for Shareline
//!
//! These types are exchanged between the client and a share transport.

use std::fmt;

use chrono::{DateTime, Utc};

/// Type of share entry
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EntryKind {
    File,
    Directory,
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntryKind::File => f.write_str("file"),
            EntryKind::Directory => f.write_str("directory"),
        }
    }
}

/// Raw directory entry as enumerated by the transport.
///
/// The kind is deliberately absent: listing callers probe each entry with
/// [`crate::ShareHandle::stat`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RawEntry {
    pub name: String,
}

impl RawEntry {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// Entry metadata (the subset of a remote stat the client consumes)
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileInfo {
    pub kind: EntryKind,
    /// End-of-file offset; 0 for directories
    pub size: u64,
    /// Hidden attribute as reported by the server
    pub hidden: bool,
    pub created: DateTime<Utc>,
    pub accessed: DateTime<Utc>,
    pub written: DateTime<Utc>,
    pub changed: DateTime<Utc>,
}

impl FileInfo {
    /// Metadata for an entry created right now
    pub fn new(kind: EntryKind) -> Self {
        let now = Utc::now();
        Self {
            kind,
            size: 0,
            hidden: false,
            created: now,
            accessed: now,
            written: now,
            changed: now,
        }
    }

    pub fn is_directory(&self) -> bool {
        self.kind == EntryKind::Directory
    }

    pub fn is_file(&self) -> bool {
        self.kind == EntryKind::File
    }
}

/// Credentials presented when binding a share.
///
/// An empty user name requests an anonymous session.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
    pub domain: Option<String>,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            domain: None,
        }
    }

    /// Anonymous (null session) credentials
    pub fn anonymous() -> Self {
        Self::default()
    }

    /// Credentials for the guest account
    pub fn guest() -> Self {
        Self::new("Guest", "")
    }

    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = Some(domain.into());
        self
    }

    pub fn is_anonymous(&self) -> bool {
        self.username.is_empty()
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("domain", &self.domain)
            .finish()
    }
}

/// How a remote file is opened
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OpenDisposition {
    /// Open an existing file; fail if absent
    Open,
    /// Open an existing file or create it
    OpenIf,
    /// Truncate an existing file or create it
    OverwriteIf,
}

/// How build-from-address classifies a path that does not exist yet
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum CreationStrategy {
    AsDirectory,
    AsFile,
    #[default]
    FailIfAbsent,
}

/// Liveness of a connection's share handle, recomputed on every probe
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LivenessState {
    NeverConnected,
    Connected,
    Stale,
}
