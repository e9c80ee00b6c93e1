//! Error types for Shareline

use std::fmt;
use std::io;

use thiserror::Error;

use crate::types::EntryKind;

/// Errors reported by a share transport for a single primitive call
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("server unreachable: {0}")]
    Unreachable(String),

    #[error("authentication failed for user '{0}'")]
    AuthenticationFailed(String),

    #[error("share not found: {0}")]
    ShareNotFound(String),

    #[error("not connected")]
    NotConnected,

    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("access denied: {0}")]
    AccessDenied(String),

    #[error("not a directory: {0}")]
    NotADirectory(String),

    #[error("is a directory: {0}")]
    IsADirectory(String),

    #[error("directory not empty: {0}")]
    NotEmpty(String),

    #[error("cannot replace {existing} '{path}' with a {replacement}")]
    KindMismatch {
        path: String,
        existing: EntryKind,
        replacement: EntryKind,
    },

    #[error("not on the same share: {0}")]
    CrossShare(String),

    #[error("handle already closed")]
    Closed,

    #[error("timeout")]
    Timeout,

    #[error("io error: {0}")]
    Io(String),
}

impl TransportError {
    /// True when the path the call addressed does not exist
    pub fn is_not_found(&self) -> bool {
        matches!(self, TransportError::NotFound(_))
    }

    /// True when the call failed because its target is already taken
    pub fn is_collision(&self) -> bool {
        matches!(
            self,
            TransportError::AlreadyExists(_)
                | TransportError::KindMismatch { .. }
                | TransportError::NotEmpty(_)
        )
    }
}

impl From<io::Error> for TransportError {
    fn from(err: io::Error) -> Self {
        use io::ErrorKind;
        match err.kind() {
            ErrorKind::NotFound => TransportError::NotFound(err.to_string()),
            ErrorKind::AlreadyExists => TransportError::AlreadyExists(err.to_string()),
            ErrorKind::PermissionDenied => TransportError::AccessDenied(err.to_string()),
            ErrorKind::TimedOut => TransportError::Timeout,
            ErrorKind::NotConnected => TransportError::NotConnected,
            _ => TransportError::Io(err.to_string()),
        }
    }
}

impl From<TransportError> for io::Error {
    fn from(err: TransportError) -> Self {
        use io::ErrorKind;
        let kind = match &err {
            TransportError::NotFound(_) => ErrorKind::NotFound,
            TransportError::AlreadyExists(_) => ErrorKind::AlreadyExists,
            TransportError::AccessDenied(_) => ErrorKind::PermissionDenied,
            TransportError::Timeout => ErrorKind::TimedOut,
            TransportError::NotConnected | TransportError::Closed => ErrorKind::NotConnected,
            _ => ErrorKind::Other,
        };
        io::Error::new(kind, err)
    }
}

/// The remote operation an error was raised from
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Operation {
    List,
    Stat,
    CreateDirectory,
    CreateFile,
    DeleteDirectory,
    DeleteFile,
    Rename,
    Copy,
    Open,
    Read,
    Write,
    Close,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Operation::List => "list",
            Operation::Stat => "stat",
            Operation::CreateDirectory => "create directory",
            Operation::CreateFile => "create file",
            Operation::DeleteDirectory => "delete directory",
            Operation::DeleteFile => "delete file",
            Operation::Rename => "rename",
            Operation::Copy => "server-side copy",
            Operation::Open => "open",
            Operation::Read => "read",
            Operation::Write => "write",
            Operation::Close => "close",
        };
        f.write_str(name)
    }
}

/// Errors surfaced by share items and connections
#[derive(Error, Debug)]
pub enum ShareError {
    /// Connecting, authenticating, or binding the share failed
    #[error("cannot connect to \\\\{server}\\{share}: {source}")]
    Connection {
        server: String,
        share: String,
        #[source]
        source: TransportError,
    },

    /// A path segment is ".", "..", a separator, or otherwise unusable
    #[error("invalid name '{name}' in path '{path}': {reason}")]
    InvalidName {
        path: String,
        name: String,
        reason: &'static str,
    },

    /// A remote round-trip failed
    #[error("{operation} failed for '{path}': {source}")]
    RemoteOperation {
        operation: Operation,
        path: String,
        #[source]
        source: TransportError,
    },

    /// The rename target is taken and may not (or cannot) be replaced
    #[error("cannot rename '{path}' to '{target}': {source}")]
    RenameConflict {
        path: String,
        target: String,
        #[source]
        source: TransportError,
    },

    /// The path exists, but as the wrong kind of entry
    #[error("'{path}' already exists but is not a {expected}")]
    StateConflict { path: String, expected: EntryKind },

    /// An address could not be parsed or classified
    #[error("cannot resolve '{address}': {reason}")]
    PathResolution { address: String, reason: String },

    #[error("invalid search pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl ShareError {
    /// Wrap a transport failure with the operation and path it belongs to
    pub fn remote(operation: Operation, path: impl Into<String>, source: TransportError) -> Self {
        ShareError::RemoteOperation {
            operation,
            path: path.into(),
            source,
        }
    }

    /// The transport error underneath, if there is one
    pub fn transport_error(&self) -> Option<&TransportError> {
        match self {
            ShareError::Connection { source, .. }
            | ShareError::RemoteOperation { source, .. }
            | ShareError::RenameConflict { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Result type alias for Shareline operations
pub type Result<T> = std::result::Result<T, ShareError>;

/// Configuration errors
#[derive(Error, Debug, Clone)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(String),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("serialization error: {0}")]
    Serialize(String),

    #[error("no configuration directory available")]
    NoConfigDir,
}
